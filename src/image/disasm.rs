//! Disassembler for RV32IM programs.
//!
//! Converts instruction words back to readable assembly.

use crate::cpu::decode::{decode, Instruction};
use std::fmt;

/// Disassemble a single instruction word to text.
pub fn disassemble_word(word: u32) -> String {
    match decode(word) {
        Ok(decoded) => format_instruction(&decoded),
        Err(_) => format!(".word {:#010x}", word),
    }
}

/// Disassemble a slice of instruction words, one line per word.
pub fn disassemble(words: &[u32]) -> String {
    let mut output = String::new();
    output.push_str("; RV32IM Disassembly\n");
    output.push_str("; ------------------\n\n");

    for (index, word) in words.iter().enumerate() {
        let line = disassemble_word(*word);
        output.push_str(&format!("{:04}: {:08x}  {}\n", index, word, line));
    }

    output
}

/// Format a decoded instruction as assembly text.
pub fn format_instruction(instr: &Instruction) -> String {
    let m = instr.mnemonic();

    match *instr {
        Instruction::Lui { rd, imm } | Instruction::Auipc { rd, imm } => {
            format!("{} x{}, {:#x}", m, rd, imm >> 12)
        }
        Instruction::Jal { rd, offset } => format!("{} x{}, {}", m, rd, offset),
        Instruction::Jalr { rd, rs1, offset } => format!("{} x{}, {}(x{})", m, rd, offset, rs1),
        Instruction::Branch { rs1, rs2, offset, .. } => {
            format!("{} x{}, x{}, {}", m, rs1, rs2, offset)
        }
        Instruction::Load { rd, rs1, offset, .. } => format!("{} x{}, {}(x{})", m, rd, offset, rs1),
        Instruction::Store { rs1, rs2, offset, .. } => {
            format!("{} x{}, {}(x{})", m, rs2, offset, rs1)
        }
        Instruction::OpImm { rd, rs1, imm, .. } => format!("{} x{}, x{}, {}", m, rd, rs1, imm),
        Instruction::Op { rd, rs1, rs2, .. } => format!("{} x{}, x{}, x{}", m, rd, rs1, rs2),
        Instruction::Ecall => m.to_string(),
    }
}

impl fmt::Display for Instruction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&format_instruction(self))
    }
}
