//! Error taxonomy for configuration, resource, runtime, and host-I/O failures.
//!
//! Mirrors the original tool's `enum error` (13 named kinds) collapsed into four
//! variant families; every fallible constructor in this crate returns
//! `Result<_, EmulatorError>` and `main` is the sole place an `Err` is mapped to a
//! process exit code.

use std::io;

#[derive(Debug, thiserror::Error)]
pub enum EmulatorError {
    #[error("configuration error: {0}")]
    Config(String),

    #[error("memory range ${start:04X}-${end:04X} is invalid or overlaps an existing device")]
    InvalidMemoryRange { start: u16, end: u16 },

    #[error("data of {len} bytes does not fit in the target range")]
    DataTooLarge { len: usize },

    #[error("too many chips attached to one clock (limit {limit})")]
    TooManyChipsOnClock { limit: usize },

    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    #[error("failed to spawn thread: {0}")]
    ThreadSpawn(io::Error),

    #[error("CPU halted: unimplemented or illegal opcode ${opcode:02X} at ${pc:04X}")]
    CpuCrash { opcode: u8, pc: u16 },
}

pub type Result<T> = std::result::Result<T, EmulatorError>;

impl EmulatorError {
    /// Process exit code for this error, per the external-interface exit-code contract.
    pub fn exit_code(&self) -> i32 {
        match self {
            EmulatorError::Config(_) => 1,
            EmulatorError::InvalidMemoryRange { .. } => 2,
            EmulatorError::DataTooLarge { .. } => 2,
            EmulatorError::TooManyChipsOnClock { .. } => 3,
            EmulatorError::Io(_) => 4,
            EmulatorError::ThreadSpawn(_) => 5,
            EmulatorError::CpuCrash { .. } => 6,
        }
    }
}
