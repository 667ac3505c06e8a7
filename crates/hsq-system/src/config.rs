//! System configuration.
//!
//! Every field has a default, so a config file only needs the values it
//! changes:
//!
//! ```json
//! { "num_workers": 4, "auto_supervise": true }
//! ```

use std::path::Path;

use hsq_fabric::FabricConfig;
use hsq_kernel::KernelConfig;
use serde::{Deserialize, Serialize};

use crate::error::SystemError;

pub const DEFAULT_NUM_WORKERS: u8 = 8;
pub const DEFAULT_QUEUE_CAPACITY: usize = hsq_kernel::DEFAULT_QUEUE_CAPACITY;
pub const DEFAULT_HEARTBEAT_INTERVAL: u64 = hsq_fabric::DEFAULT_HEARTBEAT_INTERVAL;
pub const DEFAULT_HEARTBEAT_TIMEOUT: u64 = hsq_fabric::DEFAULT_HEARTBEAT_TIMEOUT;
pub const DEFAULT_TRACE_CAPACITY: usize = hsq_fabric::DEFAULT_TRACE_CAPACITY;
/// Ticks allowed for the whole boot sequence.
pub const DEFAULT_BOOT_BUDGET: u64 = 100;
/// Ticks a reset or halt is given to settle.
pub const SETTLE_TICKS: u64 = 10;

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SystemConfig {
    /// Workers, numbered 1..=num_workers
    pub num_workers: u8,
    /// Inbound and outbound queue capacity of every kernel
    pub queue_capacity: usize,
    pub heartbeat_interval: u64,
    pub heartbeat_timeout: u64,
    pub trace_capacity: usize,
    pub boot_budget: u64,
    /// Run a supervisor pass after every tick
    pub auto_supervise: bool,
}

impl Default for SystemConfig {
    fn default() -> Self {
        Self {
            num_workers: DEFAULT_NUM_WORKERS,
            queue_capacity: DEFAULT_QUEUE_CAPACITY,
            heartbeat_interval: DEFAULT_HEARTBEAT_INTERVAL,
            heartbeat_timeout: DEFAULT_HEARTBEAT_TIMEOUT,
            trace_capacity: DEFAULT_TRACE_CAPACITY,
            boot_budget: DEFAULT_BOOT_BUDGET,
            auto_supervise: false,
        }
    }
}

impl SystemConfig {
    pub fn with_workers(num_workers: u8) -> Self {
        Self {
            num_workers,
            ..Self::default()
        }
    }

    pub fn from_json_str(json: &str) -> Result<Self, SystemError> {
        let config: SystemConfig = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    pub fn from_json_file(path: impl AsRef<Path>) -> Result<Self, SystemError> {
        let text = std::fs::read_to_string(path)?;
        Self::from_json_str(&text)
    }

    pub fn validate(&self) -> Result<(), SystemError> {
        if self.num_workers == 0 {
            return Err(SystemError::InvalidConfig("num_workers must be at least 1".into()));
        }
        if self.queue_capacity == 0 {
            return Err(SystemError::InvalidConfig("queue_capacity must be positive".into()));
        }
        if self.trace_capacity == 0 {
            return Err(SystemError::InvalidConfig("trace_capacity must be positive".into()));
        }
        if self.boot_budget == 0 {
            return Err(SystemError::InvalidConfig("boot_budget must be positive".into()));
        }
        Ok(())
    }

    pub fn kernel_config(&self) -> KernelConfig {
        KernelConfig {
            inbox_capacity: self.queue_capacity,
            outbox_capacity: self.queue_capacity,
        }
    }

    pub fn fabric_config(&self) -> FabricConfig {
        FabricConfig {
            num_workers: self.num_workers,
            heartbeat_interval: self.heartbeat_interval,
            heartbeat_timeout: self.heartbeat_timeout,
            trace_capacity: self.trace_capacity,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_partial_json_keeps_defaults() {
        let config = SystemConfig::from_json_str(r#"{ "num_workers": 4, "auto_supervise": true }"#).unwrap();
        assert_eq!(config.num_workers, 4);
        assert!(config.auto_supervise);
        assert_eq!(config.queue_capacity, 16);
        assert_eq!(config.heartbeat_interval, 256);
        assert_eq!(config.heartbeat_timeout, 1024);
        assert_eq!(config.trace_capacity, 1000);
        assert_eq!(config.boot_budget, 100);
    }

    #[test]
    fn test_validation_rejects_zero() {
        assert!(matches!(
            SystemConfig::from_json_str(r#"{ "num_workers": 0 }"#),
            Err(SystemError::InvalidConfig(_))
        ));
        assert!(matches!(
            SystemConfig::from_json_str(r#"{ "queue_capacity": 0 }"#),
            Err(SystemError::InvalidConfig(_))
        ));
        assert!(matches!(
            SystemConfig::from_json_str("{ not json"),
            Err(SystemError::Json(_))
        ));
    }

    #[test]
    fn test_missing_file() {
        assert!(matches!(
            SystemConfig::from_json_file("/nonexistent/hsquares.json"),
            Err(SystemError::Io(_))
        ));
    }
}
