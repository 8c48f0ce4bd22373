//! Instruction execution for RV32IM.
//!
//! [`execute`] is a pure function of its inputs: it decodes one word,
//! applies its effect to the register file and memory it is lent, and
//! reports how control flow should proceed. It holds no state between
//! calls and never performs output.
//!
//! Division policy (no division ever traps):
//!
//! | op   | divisor 0   | `i32::MIN` / -1 |
//! |------|-------------|-----------------|
//! | DIV  | `u32::MAX`  | `i32::MIN`      |
//! | REM  | dividend    | 0               |
//! | DIVU | `u32::MAX`  | n/a             |
//! | REMU | dividend    | n/a             |

use crate::cpu::{Memory, Registers};
use crate::cpu::decode::{self, AluOp, DecodeError, ImmOp, Instruction, LoadOp, StoreOp};
use crate::cpu::machine::CpuState;
use crate::cpu::memory::MemoryError;
use serde::{Serialize, Deserialize};
use thiserror::Error;

/// Control-flow outcome of one executed instruction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum StepEffect {
    /// Advance to the next instruction.
    Continue,
    /// Move the program counter by this many bytes (a multiple of 4 for
    /// well-formed programs).
    Branch(i32),
    /// Stop the machine.
    Terminate,
}

/// Decode and execute one instruction word.
///
/// `pc` is the word index of `word` in the program.
pub fn execute(
    pc: u32,
    word: u32,
    regs: &mut Registers,
    mem: &mut Memory,
) -> Result<StepEffect, CpuError> {
    let instr = decode::decode(word).map_err(|source| CpuError::Decode { pc, source })?;
    apply(pc, instr, regs, mem)
}

/// Execute an already decoded instruction.
///
/// x0 is forced back to zero once the instruction's effect is applied,
/// on both the success and the fault path.
pub fn apply(
    pc: u32,
    instr: Instruction,
    regs: &mut Registers,
    mem: &mut Memory,
) -> Result<StepEffect, CpuError> {
    let result = dispatch(pc, instr, regs, mem);
    regs.clear_zero();
    result
}

fn dispatch(
    pc: u32,
    instr: Instruction,
    regs: &mut Registers,
    mem: &mut Memory,
) -> Result<StepEffect, CpuError> {
    let fault = |source: MemoryError| CpuError::MemoryFault {
        pc,
        mnemonic: instr.mnemonic(),
        source,
    };

    match instr {
        Instruction::Lui { rd, imm } => {
            regs.write(rd, imm);
        }

        Instruction::Auipc { rd, imm } => {
            regs.write(rd, pc.wrapping_add(imm));
        }

        Instruction::Jal { rd, offset } => {
            regs.write(rd, pc.wrapping_add(1));
            return Ok(StepEffect::Branch(offset));
        }

        Instruction::Jalr { rd, rs1, offset } => {
            // Registers hold word indices, immediates are bytes.
            let base = regs.read(rs1).wrapping_mul(4);
            let target = base.wrapping_add(offset as u32) & !1;
            regs.write(rd, pc.wrapping_add(1));
            let delta = target.wrapping_sub(pc.wrapping_mul(4)) as i32;
            return Ok(StepEffect::Branch(delta));
        }

        Instruction::Branch { cond, rs1, rs2, offset } => {
            if cond.holds(regs.read(rs1), regs.read(rs2)) {
                return Ok(StepEffect::Branch(offset));
            }
        }

        Instruction::Load { op, rd, rs1, offset } => {
            let addr = regs.read(rs1).wrapping_add(offset as u32);
            let value = match op {
                LoadOp::Lb => mem.read_u8(addr).map(|b| b as i8 as i32 as u32),
                LoadOp::Lh => mem.read_u16(addr).map(|h| h as i16 as i32 as u32),
                LoadOp::Lw => mem.read_u32(addr),
                LoadOp::Lbu => mem.read_u8(addr).map(u32::from),
                LoadOp::Lhu => mem.read_u16(addr).map(u32::from),
            }
            .map_err(fault)?;
            regs.write(rd, value);
        }

        Instruction::Store { op, rs1, rs2, offset } => {
            let addr = regs.read(rs1).wrapping_add(offset as u32);
            let value = regs.read(rs2);
            match op {
                StoreOp::Sb => mem.write_u8(addr, value as u8),
                StoreOp::Sh => mem.write_u16(addr, value as u16),
                StoreOp::Sw => mem.write_u32(addr, value),
            }
            .map_err(fault)?;
        }

        Instruction::OpImm { op, rd, rs1, imm } => {
            let value = op_imm(op, regs.read(rs1), imm);
            regs.write(rd, value);
        }

        Instruction::Op { op, rd, rs1, rs2 } => {
            let value = op_reg(op, regs.read(rs1), regs.read(rs2));
            regs.write(rd, value);
        }

        Instruction::Ecall => {
            return Ok(StepEffect::Terminate);
        }
    }

    Ok(StepEffect::Continue)
}

fn op_imm(op: ImmOp, a: u32, imm: i32) -> u32 {
    let b = imm as u32;
    let shamt = b & 0x1f;

    match op {
        ImmOp::Addi => a.wrapping_add(b),
        ImmOp::Slti => ((a as i32) < imm) as u32,
        ImmOp::Sltiu => (a < b) as u32,
        ImmOp::Xori => a ^ b,
        ImmOp::Ori => a | b,
        ImmOp::Andi => a & b,
        ImmOp::Slli => a << shamt,
        ImmOp::Srli => a >> shamt,
        ImmOp::Srai => ((a as i32) >> shamt) as u32,
    }
}

fn op_reg(op: AluOp, a: u32, b: u32) -> u32 {
    let shamt = b & 0x1f;

    match op {
        AluOp::Add => a.wrapping_add(b),
        AluOp::Sub => a.wrapping_sub(b),
        AluOp::Sll => a << shamt,
        AluOp::Slt => ((a as i32) < (b as i32)) as u32,
        AluOp::Sltu => (a < b) as u32,
        AluOp::Xor => a ^ b,
        AluOp::Srl => a >> shamt,
        AluOp::Sra => ((a as i32) >> shamt) as u32,
        AluOp::Or => a | b,
        AluOp::And => a & b,

        // ==================== M extension ====================

        AluOp::Mul => a.wrapping_mul(b),
        AluOp::Mulh => {
            let product = (a as i32 as i64) * (b as i32 as i64);
            (product >> 32) as u32
        }
        AluOp::Mulhsu => {
            let product = (a as i32 as i64 as i128) * (b as u64 as i128);
            (product >> 32) as u32
        }
        AluOp::Mulhu => {
            let product = (a as u64) * (b as u64);
            (product >> 32) as u32
        }
        AluOp::Div => {
            if b == 0 {
                u32::MAX
            } else {
                (a as i32).wrapping_div(b as i32) as u32
            }
        }
        AluOp::Divu => {
            if b == 0 {
                u32::MAX
            } else {
                a / b
            }
        }
        AluOp::Rem => {
            if b == 0 {
                a
            } else {
                (a as i32).wrapping_rem(b as i32) as u32
            }
        }
        AluOp::Remu => {
            if b == 0 {
                a
            } else {
                a % b
            }
        }
    }
}

/// Errors that can occur during CPU execution.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CpuError {
    #[error("CPU not running: {0:?}")]
    NotRunning(CpuState),

    #[error("decode fault at pc {pc}: {source}")]
    Decode {
        pc: u32,
        #[source]
        source: DecodeError,
    },

    #[error("memory fault at pc {pc} ({mnemonic}): {source}")]
    MemoryFault {
        pc: u32,
        mnemonic: &'static str,
        #[source]
        source: MemoryError,
    },

    #[error("program counter {pc} is outside the program ({len} instructions)")]
    PcOutOfBounds { pc: i64, len: usize },

    #[error("step limit of {limit} instructions exceeded")]
    StepLimitExceeded { limit: u64 },
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cpu::decode::{encode, BranchCond};

    fn exec(pc: u32, instr: Instruction, regs: &mut Registers, mem: &mut Memory) -> StepEffect {
        execute(pc, encode(&instr), regs, mem).unwrap()
    }

    fn addi(rd: u8, rs1: u8, imm: i32) -> Instruction {
        Instruction::OpImm { op: ImmOp::Addi, rd, rs1, imm }
    }

    fn alu(op: AluOp, a: u32, b: u32) -> u32 {
        let mut regs = Registers::new();
        let mut mem = Memory::new();
        regs.write(1, a);
        regs.write(2, b);
        exec(0, Instruction::Op { op, rd: 3, rs1: 1, rs2: 2 }, &mut regs, &mut mem);
        regs.read(3)
    }

    #[test]
    fn test_addi_sign_extension() {
        let mut regs = Registers::new();
        let mut mem = Memory::new();
        let effect = exec(0, addi(1, 0, -1), &mut regs, &mut mem);
        assert_eq!(effect, StepEffect::Continue);
        assert_eq!(regs.read(1), 0xffff_ffff);
    }

    #[test]
    fn test_write_to_x0_discarded() {
        let mut regs = Registers::new();
        let mut mem = Memory::new();
        exec(0, addi(0, 0, 123), &mut regs, &mut mem);
        assert_eq!(regs.read(0), 0);
    }

    #[test]
    fn test_slli_31() {
        let mut regs = Registers::new();
        let mut mem = Memory::new();
        regs.write(1, 1);
        exec(0, Instruction::OpImm { op: ImmOp::Slli, rd: 1, rs1: 1, imm: 31 }, &mut regs, &mut mem);
        assert_eq!(regs.read(1), 0x8000_0000);
    }

    #[test]
    fn test_srai_preserves_sign() {
        let mut regs = Registers::new();
        let mut mem = Memory::new();
        regs.write(1, 0x8000_0000);
        exec(0, Instruction::OpImm { op: ImmOp::Srai, rd: 2, rs1: 1, imm: 4 }, &mut regs, &mut mem);
        exec(0, Instruction::OpImm { op: ImmOp::Srli, rd: 3, rs1: 1, imm: 4 }, &mut regs, &mut mem);
        assert_eq!(regs.read(2), 0xf800_0000);
        assert_eq!(regs.read(3), 0x0800_0000);
    }

    #[test]
    fn test_slti_vs_sltiu() {
        let mut regs = Registers::new();
        let mut mem = Memory::new();
        regs.write(1, u32::MAX); // -1
        exec(0, Instruction::OpImm { op: ImmOp::Slti, rd: 2, rs1: 1, imm: 0 }, &mut regs, &mut mem);
        exec(0, Instruction::OpImm { op: ImmOp::Sltiu, rd: 3, rs1: 1, imm: 0 }, &mut regs, &mut mem);
        // sltiu with imm -1 compares against 0xffffffff
        exec(0, Instruction::OpImm { op: ImmOp::Sltiu, rd: 4, rs1: 0, imm: -1 }, &mut regs, &mut mem);
        assert_eq!(regs.read(2), 1);
        assert_eq!(regs.read(3), 0);
        assert_eq!(regs.read(4), 1);
    }

    #[test]
    fn test_xori_uses_register_value() {
        let mut regs = Registers::new();
        let mut mem = Memory::new();
        regs.write(5, 0b1010);
        exec(0, Instruction::OpImm { op: ImmOp::Xori, rd: 6, rs1: 5, imm: 0b0110 }, &mut regs, &mut mem);
        assert_eq!(regs.read(6), 0b1100);
    }

    #[test]
    fn test_register_ops() {
        assert_eq!(alu(AluOp::Add, 5, 3), 8);
        assert_eq!(alu(AluOp::Add, u32::MAX, 1), 0);
        assert_eq!(alu(AluOp::Sub, 3, 5), (-2i32) as u32);
        assert_eq!(alu(AluOp::Sll, 1, 33), 2);
        assert_eq!(alu(AluOp::Slt, (-1i32) as u32, 0), 1);
        assert_eq!(alu(AluOp::Sltu, (-1i32) as u32, 0), 0);
        assert_eq!(alu(AluOp::Sra, 0x8000_0000, 31), u32::MAX);
        assert_eq!(alu(AluOp::Srl, 0x8000_0000, 31), 1);
        assert_eq!(alu(AluOp::And, 0b1100, 0b1010), 0b1000);
        assert_eq!(alu(AluOp::Or, 0b1100, 0b1010), 0b1110);
        assert_eq!(alu(AluOp::Xor, 0b1100, 0b1010), 0b0110);
    }

    #[test]
    fn test_multiply_high() {
        assert_eq!(alu(AluOp::Mul, 0xffff_ffff, 0xffff_ffff), 1);
        assert_eq!(alu(AluOp::Mulh, (-2i32) as u32, 3), u32::MAX);
        assert_eq!(alu(AluOp::Mulhu, 0xffff_ffff, 0xffff_ffff), 0xffff_fffe);
        // -1 * 0xffffffff (unsigned) = -0xffffffff, high word 0xffffffff
        assert_eq!(alu(AluOp::Mulhsu, u32::MAX, u32::MAX), u32::MAX);
        assert_eq!(alu(AluOp::Mulhsu, 2, u32::MAX), 1);
    }

    #[test]
    fn test_division_by_zero() {
        assert_eq!(alu(AluOp::Div, 42, 0), 0xffff_ffff);
        assert_eq!(alu(AluOp::Rem, 42, 0), 42);
        assert_eq!(alu(AluOp::Divu, 42, 0), 0xffff_ffff);
        assert_eq!(alu(AluOp::Remu, 42, 0), 42);
    }

    #[test]
    fn test_signed_division_overflow_wraps() {
        let min = i32::MIN as u32;
        let neg_one = (-1i32) as u32;
        assert_eq!(alu(AluOp::Div, min, neg_one), min);
        assert_eq!(alu(AluOp::Rem, min, neg_one), 0);
    }

    #[test]
    fn test_signed_division_truncates() {
        assert_eq!(alu(AluOp::Div, (-7i32) as u32, 2), (-3i32) as u32);
        assert_eq!(alu(AluOp::Rem, (-7i32) as u32, 2), (-1i32) as u32);
        assert_eq!(alu(AluOp::Divu, 7, 2), 3);
        assert_eq!(alu(AluOp::Remu, 7, 2), 1);
    }

    #[test]
    fn test_lui_and_auipc_use_word_index() {
        let mut regs = Registers::new();
        let mut mem = Memory::new();
        exec(7, Instruction::Lui { rd: 1, imm: 0x1234_5000 }, &mut regs, &mut mem);
        exec(7, Instruction::Auipc { rd: 2, imm: 0x1000 }, &mut regs, &mut mem);
        assert_eq!(regs.read(1), 0x1234_5000);
        assert_eq!(regs.read(2), 0x1007);
    }

    #[test]
    fn test_store_load_roundtrip() {
        let mut regs = Registers::new();
        let mut mem = Memory::new();
        regs.write(1, 0x0102_0304);
        regs.write(2, 100);

        let sw = Instruction::Store { op: StoreOp::Sw, rs1: 2, rs2: 1, offset: 4 };
        exec(0, sw, &mut regs, &mut mem);

        for (op, rd) in [(LoadOp::Lw, 3), (LoadOp::Lb, 4), (LoadOp::Lbu, 5)] {
            exec(0, Instruction::Load { op, rd, rs1: 2, offset: 4 }, &mut regs, &mut mem);
        }

        assert_eq!(regs.read(3), 0x0102_0304);
        assert_eq!(regs.read(4), 0x04);
        assert_eq!(regs.read(5), 0x04);
    }

    #[test]
    fn test_load_sign_vs_zero_extension() {
        let mut regs = Registers::new();
        let mut mem = Memory::new();
        mem.write_u32(16, 0x0000_8080).unwrap();
        regs.write(1, 16);

        let loads = [(LoadOp::Lb, 2), (LoadOp::Lbu, 3), (LoadOp::Lh, 4), (LoadOp::Lhu, 5)];
        for (op, rd) in loads {
            exec(0, Instruction::Load { op, rd, rs1: 1, offset: 0 }, &mut regs, &mut mem);
        }

        assert_eq!(regs.read(2), 0xffff_ff80);
        assert_eq!(regs.read(3), 0x80);
        assert_eq!(regs.read(4), 0xffff_8080);
        assert_eq!(regs.read(5), 0x8080);
    }

    #[test]
    fn test_store_negative_offset() {
        let mut regs = Registers::new();
        let mut mem = Memory::new();
        regs.write(2, 4096);
        regs.write(1, 0xabcd);
        exec(0, Instruction::Store { op: StoreOp::Sh, rs1: 2, rs2: 1, offset: -2 }, &mut regs, &mut mem);
        assert_eq!(mem.read_u16(4094).unwrap(), 0xabcd);
    }

    #[test]
    fn test_load_out_of_bounds_is_fault() {
        let mut regs = Registers::new();
        let mut mem = Memory::new();
        regs.write(1, 4096);
        let word = encode(&Instruction::Load { op: LoadOp::Lw, rd: 2, rs1: 1, offset: 0 });
        let err = execute(3, word, &mut regs, &mut mem).unwrap_err();
        assert_eq!(
            err,
            CpuError::MemoryFault {
                pc: 3,
                mnemonic: "lw",
                source: MemoryError::OutOfBounds { addr: 4096, width: 4, capacity: 4096 },
            }
        );
    }

    #[test]
    fn test_negative_address_does_not_wrap() {
        let mut regs = Registers::new();
        let mut mem = Memory::new();
        let word = encode(&Instruction::Store { op: StoreOp::Sb, rs1: 0, rs2: 0, offset: -1 });
        assert!(matches!(
            execute(0, word, &mut regs, &mut mem),
            Err(CpuError::MemoryFault { mnemonic: "sb", .. })
        ));
    }

    #[test]
    fn test_branch_taken_and_not_taken() {
        let mut regs = Registers::new();
        let mut mem = Memory::new();
        regs.write(1, 9);

        let beq = Instruction::Branch { cond: BranchCond::Eq, rs1: 1, rs2: 1, offset: 12 };
        let bne = Instruction::Branch { cond: BranchCond::Ne, rs1: 1, rs2: 1, offset: 12 };
        assert_eq!(exec(0, beq, &mut regs, &mut mem), StepEffect::Branch(12));
        assert_eq!(exec(0, bne, &mut regs, &mut mem), StepEffect::Continue);
    }

    #[test]
    fn test_branch_signed_vs_unsigned() {
        let mut regs = Registers::new();
        let mut mem = Memory::new();
        regs.write(1, u32::MAX); // -1

        let blt = Instruction::Branch { cond: BranchCond::Lt, rs1: 1, rs2: 0, offset: -8 };
        let bltu = Instruction::Branch { cond: BranchCond::Ltu, rs1: 1, rs2: 0, offset: -8 };
        let bgeu = Instruction::Branch { cond: BranchCond::Geu, rs1: 1, rs2: 0, offset: -8 };
        assert_eq!(exec(0, blt, &mut regs, &mut mem), StepEffect::Branch(-8));
        assert_eq!(exec(0, bltu, &mut regs, &mut mem), StepEffect::Continue);
        assert_eq!(exec(0, bgeu, &mut regs, &mut mem), StepEffect::Branch(-8));
    }

    #[test]
    fn test_jal_links_next_index() {
        let mut regs = Registers::new();
        let mut mem = Memory::new();
        let effect = exec(5, Instruction::Jal { rd: 1, offset: -16 }, &mut regs, &mut mem);
        assert_eq!(effect, StepEffect::Branch(-16));
        assert_eq!(regs.read(1), 6);
    }

    #[test]
    fn test_jalr_returns_to_link() {
        let mut regs = Registers::new();
        let mut mem = Memory::new();
        regs.write(1, 3);
        // jalr x0, 0(x1) from index 10 must land on index 3
        let effect = exec(10, Instruction::Jalr { rd: 0, rs1: 1, offset: 0 }, &mut regs, &mut mem);
        assert_eq!(effect, StepEffect::Branch(-28));
        assert_eq!(regs.read(0), 0);
    }

    #[test]
    fn test_jalr_reads_rs1_before_link() {
        let mut regs = Registers::new();
        let mut mem = Memory::new();
        regs.write(1, 2);
        let effect = exec(0, Instruction::Jalr { rd: 1, rs1: 1, offset: 4 }, &mut regs, &mut mem);
        // target byte 2*4 + 4 = 12 -> index 3
        assert_eq!(effect, StepEffect::Branch(12));
        assert_eq!(regs.read(1), 1);
    }

    #[test]
    fn test_ecall_terminates() {
        let mut regs = Registers::new();
        let mut mem = Memory::new();
        assert_eq!(exec(0, Instruction::Ecall, &mut regs, &mut mem), StepEffect::Terminate);
    }

    #[test]
    fn test_decode_fault_reports_pc() {
        let mut regs = Registers::new();
        let mut mem = Memory::new();
        let err = execute(4, 0xffff_ffff, &mut regs, &mut mem).unwrap_err();
        assert!(matches!(
            err,
            CpuError::Decode { pc: 4, source: DecodeError::UnknownOpcode { opcode: 0x7f, .. } }
        ));
    }
}
