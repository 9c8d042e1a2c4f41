//! Server configuration.
//!
//! The exposed configuration applies to newly created sessions; existing
//! sessions keep the values they were created with.

use armlet::core::vm::Layout;
use serde::{Deserialize, Serialize};

/// Hard cap on `GET /memory` read lengths.
pub const MAX_READ_LEN: usize = 1 << 20;
/// Hard cap on submitted source size.
pub const MAX_SOURCE_LEN: usize = 512 * 1024;
/// Hard cap on disassembly window size.
pub const MAX_DISASM: usize = 4096;
/// Hard cap on one stdin submission.
pub const MAX_STDIN: usize = 64 * 1024;
/// Instructions executed per lock acquisition by the run executor.
pub const RUN_BATCH: u64 = 8192;

/// Tunable server configuration.
#[derive(Clone, Copy, Debug, Deserialize, Serialize)]
#[serde(default, rename_all = "camelCase")]
pub struct Config {
    /// Cycle budget for a single Run.
    pub max_cycles: u64,
    /// Size of a session's data window, stack included.
    pub memory_size: u32,
    /// Size of the stack carved off the top of the data window.
    pub stack_size: u32,
    /// Trace ring capacity.
    pub trace_capacity: usize,
    /// Idle eviction timeout in seconds.
    pub session_timeout_secs: u64,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            max_cycles: 1_000_000,
            memory_size: 0x0004_0000,
            stack_size: 0x0000_8000,
            trace_capacity: 10_000,
            session_timeout_secs: 1800,
        }
    }
}

impl Config {
    /// Validates the tunables.
    ///
    /// # Errors
    ///
    /// Errors with a human-readable reason on out-of-range values.
    pub fn validate(&self) -> Result<(), String> {
        if self.max_cycles == 0 {
            return Err("maxCycles must be positive".to_string());
        }
        if !(0x1_0000..=0x100_0000).contains(&self.memory_size) {
            return Err("memorySize must be between 64 KiB and 16 MiB".to_string());
        }
        if self.stack_size < 0x1000 || self.stack_size > self.memory_size / 2 {
            return Err("stackSize must be at least 4 KiB and at most half of memorySize".to_string());
        }
        if self.trace_capacity == 0 || self.trace_capacity > 1_000_000 {
            return Err("traceCapacity must be between 1 and 1000000".to_string());
        }
        if self.session_timeout_secs < 10 {
            return Err("sessionTimeoutSecs must be at least 10".to_string());
        }
        Ok(())
    }

    /// Memory layout for a new session, with an optional per-session
    /// data-window override.
    #[must_use]
    pub fn layout(&self, memory_size: Option<u32>) -> Layout {
        let data_size = memory_size.unwrap_or(self.memory_size);
        Layout {
            data_base: 0x0001_0000,
            data_size,
            stack_size: self.stack_size.min(data_size / 2),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_validate() {
        assert_eq!(Config::default().validate(), Ok(()));
    }

    #[test]
    fn rejects_degenerate_values() {
        let mut cfg = Config::default();
        cfg.memory_size = 0x100;
        assert!(cfg.validate().is_err());
        let mut cfg = Config::default();
        cfg.max_cycles = 0;
        assert!(cfg.validate().is_err());
    }
}
