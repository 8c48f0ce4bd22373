//! # rv32-sim
//!
//! An instruction-set simulator for the RISC-V RV32I base integer ISA
//! with the M (multiply/divide) extension.
//!
//! The simulator interprets a flat stream of pre-assembled 32-bit words.
//! The program counter is a word index into that stream, data lives in a
//! separate byte-addressable memory, and a single exit trap (`ecall`)
//! stops the machine.

pub mod cpu;
pub mod config;
pub mod image;
pub mod runner;
pub mod trace;

#[cfg(feature = "tui")]
pub mod tui;

// Re-export commonly used types
pub use cpu::{Cpu, CpuError, CpuState, ExitReason, Instruction, Memory, Registers, RunOutcome, StepEffect};
pub use config::{ConfigError, SimConfig};
pub use image::{disassemble, load_program, save_registers, Endianness, ImageError};
pub use runner::{run_and_save, RunError};
pub use trace::{LogSink, TableWriter, TraceEntry, TraceSink};

#[cfg(feature = "tui")]
pub use tui::run_debugger;
