//! Operand-opcode handlers.
//!
//! Execute and compute frames carry `[opcode, a, b, flags]`. The kernel looks
//! the opcode up in its handler table, which starts with the builtin
//! arithmetic/logic set below and can be extended at node-setup time with
//! any closure of shape `(Operands, &mut Memory) -> HandlerResult`.

use std::collections::BTreeMap;

use hsq_frame::{opcode, Message};

use crate::error::HandlerFault;
use crate::memory::Memory;

/// Result of running an operation: `(result, extra)` or a fault.
pub type HandlerResult = Result<(u8, u8), HandlerFault>;

/// The two byte operands and flag byte of an execute/compute frame.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct Operands {
    pub a: u8,
    pub b: u8,
    pub flags: u8,
}

impl Operands {
    pub fn new(a: u8, b: u8, flags: u8) -> Self {
        Self { a, b, flags }
    }

    /// Operands from payload bytes 1..=3.
    pub fn from_frame(msg: &Message) -> Self {
        Self::new(msg.arg(1), msg.arg(2), msg.arg(3))
    }
}

/// An extension operation handler.
///
/// Handlers may read and write the owning node's memory as a side effect.
pub trait OpHandler {
    fn call(&mut self, args: Operands, memory: &mut Memory) -> HandlerResult;
}

impl<F> OpHandler for F
where
    F: FnMut(Operands, &mut Memory) -> HandlerResult,
{
    fn call(&mut self, args: Operands, memory: &mut Memory) -> HandlerResult {
        self(args, memory)
    }
}

/// Optional co-processor consulted by compute frames.
pub trait CoProcessor {
    fn compute(&mut self, op: u8, args: Operands) -> HandlerResult;
}

/// Builtin operation: pure function of the operands.
pub type BuiltinOp = fn(Operands) -> (u8, u8);

enum Handler {
    Builtin(BuiltinOp),
    Extension(Box<dyn OpHandler>),
}

/// Opcode → handler map owned by one kernel.
pub struct HandlerTable {
    handlers: BTreeMap<u8, Handler>,
}

impl HandlerTable {
    /// Table pre-populated with the builtin arithmetic/logic set.
    pub fn with_builtins() -> Self {
        let handlers = BUILTINS
            .iter()
            .map(|(op, f)| (*op, Handler::Builtin(*f)))
            .collect();
        Self { handlers }
    }

    /// Register (or replace) the handler for `op`.
    pub fn register(&mut self, op: u8, handler: Box<dyn OpHandler>) {
        self.handlers.insert(op, Handler::Extension(handler));
    }

    /// Drop the handler for `op`. Returns whether one was present.
    pub fn unregister(&mut self, op: u8) -> bool {
        self.handlers.remove(&op).is_some()
    }

    pub fn contains(&self, op: u8) -> bool {
        self.handlers.contains_key(&op)
    }

    /// Registered opcodes in ascending order.
    pub fn opcodes(&self) -> Vec<u8> {
        self.handlers.keys().copied().collect()
    }

    /// Run the handler for `op`.
    pub fn run(&mut self, op: u8, args: Operands, memory: &mut Memory) -> HandlerResult {
        match self.handlers.get_mut(&op) {
            Some(Handler::Builtin(f)) => Ok(f(args)),
            Some(Handler::Extension(h)) => h.call(args, memory),
            None => Err(HandlerFault::unknown_opcode(op)),
        }
    }
}

impl Default for HandlerTable {
    fn default() -> Self {
        Self::with_builtins()
    }
}

// ============================================================================
// Builtin arithmetic / logic
// ============================================================================

const BUILTINS: [(u8, BuiltinOp); 9] = [
    (opcode::NOP, op_nop),
    (opcode::ADD, op_add),
    (opcode::SUB, op_sub),
    (opcode::CMP, op_cmp),
    (opcode::AND, op_and),
    (opcode::OR, op_or),
    (opcode::XOR, op_xor),
    (opcode::SHL, op_shl),
    (opcode::SHR, op_shr),
];

pub fn op_nop(_: Operands) -> (u8, u8) {
    (0, 0)
}

/// ((a + b) mod 256, carry)
pub fn op_add(o: Operands) -> (u8, u8) {
    let (sum, carry) = o.a.overflowing_add(o.b);
    (sum, carry as u8)
}

/// ((a - b) mod 256, borrow)
pub fn op_sub(o: Operands) -> (u8, u8) {
    let (diff, borrow) = o.a.overflowing_sub(o.b);
    (diff, borrow as u8)
}

/// (a == b, (a < b) | (a > b) << 1)
pub fn op_cmp(o: Operands) -> (u8, u8) {
    let eq = (o.a == o.b) as u8;
    let lt = (o.a < o.b) as u8;
    let gt = (o.a > o.b) as u8;
    (eq, lt | (gt << 1))
}

pub fn op_and(o: Operands) -> (u8, u8) {
    (o.a & o.b, 0)
}

pub fn op_or(o: Operands) -> (u8, u8) {
    (o.a | o.b, 0)
}

pub fn op_xor(o: Operands) -> (u8, u8) {
    (o.a ^ o.b, 0)
}

/// ((a << 1) mod 256, top bit of a)
pub fn op_shl(o: Operands) -> (u8, u8) {
    (o.a << 1, o.a >> 7)
}

/// (a >> 1, bottom bit of a)
pub fn op_shr(o: Operands) -> (u8, u8) {
    (o.a >> 1, o.a & 1)
}

// ============================================================================
// Memory opcodes (installed on demand)
// ============================================================================

/// PEEK: `(mem[a | b << 8], 0)`
pub fn peek_handler() -> impl OpHandler {
    |args: Operands, memory: &mut Memory| -> HandlerResult {
        let addr = usize::from(u16::from_le_bytes([args.a, args.b]));
        Ok((memory.peek(addr), 0))
    }
}

/// POKE: `mem[a | b << 8] = flags`, returns `(flags, 0)`
pub fn poke_handler() -> impl OpHandler {
    |args: Operands, memory: &mut Memory| -> HandlerResult {
        let addr = usize::from(u16::from_le_bytes([args.a, args.b]));
        memory.poke(addr, args.flags);
        Ok((args.flags, 0))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn run(op: u8, a: u8, b: u8) -> (u8, u8) {
        let mut table = HandlerTable::with_builtins();
        let mut mem = Memory::new();
        table.run(op, Operands::new(a, b, 0), &mut mem).unwrap()
    }

    #[test]
    fn test_add_carry_boundary() {
        assert_eq!(run(opcode::ADD, 50, 10), (60, 0));
        assert_eq!(run(opcode::ADD, 255, 1), (0, 1));
    }

    #[test]
    fn test_sub_borrow_boundary() {
        assert_eq!(run(opcode::SUB, 10, 3), (7, 0));
        assert_eq!(run(opcode::SUB, 0, 1), (255, 1));
    }

    #[test]
    fn test_cmp_bits() {
        assert_eq!(run(opcode::CMP, 5, 5), (1, 0));
        assert_eq!(run(opcode::CMP, 4, 5), (0, 1));
        assert_eq!(run(opcode::CMP, 6, 5), (0, 2));
    }

    #[test]
    fn test_shifts_carry_out() {
        assert_eq!(run(opcode::SHL, 0x81, 0), (0x02, 1));
        assert_eq!(run(opcode::SHR, 0x81, 0), (0x40, 1));
    }

    #[test]
    fn test_unknown_opcode_faults() {
        let mut table = HandlerTable::with_builtins();
        let mut mem = Memory::new();
        let err = table.run(0x99, Operands::default(), &mut mem).unwrap_err();
        assert_eq!(err.code, hsq_frame::error_code::UNKNOWN_OPCODE);
    }

    #[test]
    fn test_extension_touches_memory() {
        let mut table = HandlerTable::with_builtins();
        table.register(opcode::POKE, Box::new(poke_handler()));
        table.register(opcode::PEEK, Box::new(peek_handler()));
        let mut mem = Memory::new();

        table.run(opcode::POKE, Operands::new(0x34, 0x12, 0x77), &mut mem).unwrap();
        assert_eq!(mem.peek(0x1234), 0x77);
        assert_eq!(
            table.run(opcode::PEEK, Operands::new(0x34, 0x12, 0), &mut mem).unwrap(),
            (0x77, 0)
        );
    }

    #[test]
    fn test_register_replaces_builtin() {
        let mut table = HandlerTable::with_builtins();
        table.register(opcode::ADD, Box::new(|_: Operands, _: &mut Memory| -> HandlerResult { Ok((9, 9)) }));
        let mut mem = Memory::new();
        assert_eq!(table.run(opcode::ADD, Operands::new(1, 1, 0), &mut mem), Ok((9, 9)));
    }
}
