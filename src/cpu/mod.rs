//! CPU emulation for RV32IM.
//!
//! This module implements the complete machine:
//! - 32 general-purpose 32-bit registers, x0 hardwired to zero
//! - Byte-addressable little-endian data memory
//! - RV32I base integer instructions plus the M extension
//! - A fetch-execute loop over a word-indexed program

pub mod memory;
pub mod registers;
pub mod decode;
pub mod execute;
pub mod machine;

pub use memory::{Memory, MemoryError};
pub use registers::Registers;
pub use decode::{Instruction, DecodeError};
pub use execute::{execute, CpuError, StepEffect};
pub use machine::{run, run_collect, Cpu, CpuState, ExitReason, RunOutcome};
