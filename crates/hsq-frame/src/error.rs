//! Frame decoding errors.

/// Errors that can occur while decoding a wire frame.
#[derive(Clone, Copy, Debug, PartialEq, Eq, thiserror::Error)]
pub enum FrameError {
    /// The type byte does not name a known message kind.
    #[error("unknown message type: 0x{0:02x}")]
    UnknownType(u8),
}
