//! Program images and their textual forms.
//!
//! This module provides:
//! - Loading raw instruction words from a binary file
//! - Writing the final register file back out
//! - A disassembler (words → readable text)

pub mod binary;
pub mod disasm;

pub use binary::{load_program, save_registers, Endianness, ImageError};
pub use disasm::disassemble;
