//! TUI debugger for the RV32IM simulator.
//!
//! Provides an interactive terminal-based debugger with:
//! - Live register file view
//! - Memory view as little-endian words
//! - Step/run/breakpoint controls
//! - Disassembly view

mod app;
mod ui;

pub use app::{DebuggerApp, run_debugger};
