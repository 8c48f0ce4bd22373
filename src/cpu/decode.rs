//! Instruction decoder for RV32IM.
//!
//! Fields are extracted purely by bit position from the 32-bit word and
//! turned into a typed [`Instruction`]. Decoding is pure; execution lives
//! in [`crate::cpu::execute`].

use serde::{Serialize, Deserialize};
use thiserror::Error;

/// Major opcode values (bits [6:0]).
pub struct Opcode;

impl Opcode {
    pub const LOAD: u32 = 0x03;
    pub const OP_IMM: u32 = 0x13;
    pub const AUIPC: u32 = 0x17;
    pub const STORE: u32 = 0x23;
    pub const OP: u32 = 0x33;
    pub const LUI: u32 = 0x37;
    pub const BRANCH: u32 = 0x63;
    pub const JALR: u32 = 0x67;
    pub const JAL: u32 = 0x6f;
    pub const SYSTEM: u32 = 0x73;
}

// ==================== Field extraction ====================

/// Opcode field [6:0].
#[inline]
pub fn opcode(word: u32) -> u32 {
    word & 0x7f
}

/// rd field [11:7].
#[inline]
pub fn rd(word: u32) -> u8 {
    ((word >> 7) & 0x1f) as u8
}

/// funct3 field [14:12].
#[inline]
pub fn funct3(word: u32) -> u32 {
    (word >> 12) & 0x7
}

/// rs1 field [19:15].
#[inline]
pub fn rs1(word: u32) -> u8 {
    ((word >> 15) & 0x1f) as u8
}

/// rs2 field [24:20].
#[inline]
pub fn rs2(word: u32) -> u8 {
    ((word >> 20) & 0x1f) as u8
}

/// funct7 field [31:25].
#[inline]
pub fn funct7(word: u32) -> u32 {
    (word >> 25) & 0x7f
}

/// Sign-extend a raw 12-bit immediate: if bit 11 is set, set every bit
/// above it.
#[inline]
pub fn sext12(raw: u32) -> u32 {
    let raw = raw & 0xfff;
    if raw & 0x800 != 0 {
        raw | 0xffff_f000
    } else {
        raw
    }
}

/// I-type immediate: [31:20], sign-extended from bit 11.
#[inline]
pub fn imm_i(word: u32) -> i32 {
    sext12(word >> 20) as i32
}

/// S-type immediate: {[31:25], [11:7]}, sign-extended from bit 11.
#[inline]
pub fn imm_s(word: u32) -> i32 {
    let raw = (funct7(word) << 5) | ((word >> 7) & 0x1f);
    sext12(raw) as i32
}

/// B-type immediate: {[31], [7], [30:25], [11:8]} << 1, sign-extended
/// from bit 12. Always even.
#[inline]
pub fn imm_b(word: u32) -> i32 {
    let imm = ((word >> 31) & 0x1) << 12
        | ((word >> 7) & 0x1) << 11
        | ((word >> 25) & 0x3f) << 5
        | ((word >> 8) & 0xf) << 1;
    ((imm << 19) as i32) >> 19
}

/// U-type immediate: [31:12] << 12.
#[inline]
pub fn imm_u(word: u32) -> u32 {
    word & 0xffff_f000
}

/// J-type immediate: {[31], [19:12], [20], [30:21]} << 1, sign-extended
/// from bit 20. Always even.
#[inline]
pub fn imm_j(word: u32) -> i32 {
    let imm = ((word >> 31) & 0x1) << 20
        | ((word >> 12) & 0xff) << 12
        | ((word >> 20) & 0x1) << 11
        | ((word >> 21) & 0x3ff) << 1;
    ((imm << 11) as i32) >> 11
}

// ==================== Typed instructions ====================

/// Register-register operations (opcode OP), including the M extension.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum AluOp {
    Add,
    Sub,
    Sll,
    Slt,
    Sltu,
    Xor,
    Srl,
    Sra,
    Or,
    And,
    Mul,
    Mulh,
    Mulhsu,
    Mulhu,
    Div,
    Divu,
    Rem,
    Remu,
}

impl AluOp {
    fn from_fields(funct7: u32, funct3: u32) -> Option<Self> {
        let op = match (funct7, funct3) {
            (0x00, 0) => AluOp::Add,
            (0x20, 0) => AluOp::Sub,
            (0x00, 1) => AluOp::Sll,
            (0x00, 2) => AluOp::Slt,
            (0x00, 3) => AluOp::Sltu,
            (0x00, 4) => AluOp::Xor,
            (0x00, 5) => AluOp::Srl,
            (0x20, 5) => AluOp::Sra,
            (0x00, 6) => AluOp::Or,
            (0x00, 7) => AluOp::And,
            (0x01, 0) => AluOp::Mul,
            (0x01, 1) => AluOp::Mulh,
            (0x01, 2) => AluOp::Mulhsu,
            (0x01, 3) => AluOp::Mulhu,
            (0x01, 4) => AluOp::Div,
            (0x01, 5) => AluOp::Divu,
            (0x01, 6) => AluOp::Rem,
            (0x01, 7) => AluOp::Remu,
            _ => return None,
        };
        Some(op)
    }

    /// (funct7, funct3) pair for this operation.
    pub fn fields(self) -> (u32, u32) {
        match self {
            AluOp::Add => (0x00, 0),
            AluOp::Sub => (0x20, 0),
            AluOp::Sll => (0x00, 1),
            AluOp::Slt => (0x00, 2),
            AluOp::Sltu => (0x00, 3),
            AluOp::Xor => (0x00, 4),
            AluOp::Srl => (0x00, 5),
            AluOp::Sra => (0x20, 5),
            AluOp::Or => (0x00, 6),
            AluOp::And => (0x00, 7),
            AluOp::Mul => (0x01, 0),
            AluOp::Mulh => (0x01, 1),
            AluOp::Mulhsu => (0x01, 2),
            AluOp::Mulhu => (0x01, 3),
            AluOp::Div => (0x01, 4),
            AluOp::Divu => (0x01, 5),
            AluOp::Rem => (0x01, 6),
            AluOp::Remu => (0x01, 7),
        }
    }

    pub fn mnemonic(self) -> &'static str {
        match self {
            AluOp::Add => "add",
            AluOp::Sub => "sub",
            AluOp::Sll => "sll",
            AluOp::Slt => "slt",
            AluOp::Sltu => "sltu",
            AluOp::Xor => "xor",
            AluOp::Srl => "srl",
            AluOp::Sra => "sra",
            AluOp::Or => "or",
            AluOp::And => "and",
            AluOp::Mul => "mul",
            AluOp::Mulh => "mulh",
            AluOp::Mulhsu => "mulhsu",
            AluOp::Mulhu => "mulhu",
            AluOp::Div => "div",
            AluOp::Divu => "divu",
            AluOp::Rem => "rem",
            AluOp::Remu => "remu",
        }
    }
}

/// Register-immediate operations (opcode OP-IMM).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ImmOp {
    Addi,
    Slti,
    Sltiu,
    Xori,
    Ori,
    Andi,
    Slli,
    Srli,
    Srai,
}

impl ImmOp {
    pub fn funct3(self) -> u32 {
        match self {
            ImmOp::Addi => 0,
            ImmOp::Slli => 1,
            ImmOp::Slti => 2,
            ImmOp::Sltiu => 3,
            ImmOp::Xori => 4,
            ImmOp::Srli | ImmOp::Srai => 5,
            ImmOp::Ori => 6,
            ImmOp::Andi => 7,
        }
    }

    /// Shift-immediate forms carry a 5-bit shift amount instead of a
    /// sign-extended immediate.
    pub fn is_shift(self) -> bool {
        matches!(self, ImmOp::Slli | ImmOp::Srli | ImmOp::Srai)
    }

    pub fn mnemonic(self) -> &'static str {
        match self {
            ImmOp::Addi => "addi",
            ImmOp::Slti => "slti",
            ImmOp::Sltiu => "sltiu",
            ImmOp::Xori => "xori",
            ImmOp::Ori => "ori",
            ImmOp::Andi => "andi",
            ImmOp::Slli => "slli",
            ImmOp::Srli => "srli",
            ImmOp::Srai => "srai",
        }
    }
}

/// Load widths (opcode LOAD).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum LoadOp {
    Lb,
    Lh,
    Lw,
    Lbu,
    Lhu,
}

impl LoadOp {
    fn from_funct3(funct3: u32) -> Option<Self> {
        match funct3 {
            0 => Some(LoadOp::Lb),
            1 => Some(LoadOp::Lh),
            2 => Some(LoadOp::Lw),
            4 => Some(LoadOp::Lbu),
            5 => Some(LoadOp::Lhu),
            _ => None,
        }
    }

    pub fn funct3(self) -> u32 {
        match self {
            LoadOp::Lb => 0,
            LoadOp::Lh => 1,
            LoadOp::Lw => 2,
            LoadOp::Lbu => 4,
            LoadOp::Lhu => 5,
        }
    }

    pub fn mnemonic(self) -> &'static str {
        match self {
            LoadOp::Lb => "lb",
            LoadOp::Lh => "lh",
            LoadOp::Lw => "lw",
            LoadOp::Lbu => "lbu",
            LoadOp::Lhu => "lhu",
        }
    }
}

/// Store widths (opcode STORE).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum StoreOp {
    Sb,
    Sh,
    Sw,
}

impl StoreOp {
    fn from_funct3(funct3: u32) -> Option<Self> {
        match funct3 {
            0 => Some(StoreOp::Sb),
            1 => Some(StoreOp::Sh),
            2 => Some(StoreOp::Sw),
            _ => None,
        }
    }

    pub fn funct3(self) -> u32 {
        match self {
            StoreOp::Sb => 0,
            StoreOp::Sh => 1,
            StoreOp::Sw => 2,
        }
    }

    pub fn mnemonic(self) -> &'static str {
        match self {
            StoreOp::Sb => "sb",
            StoreOp::Sh => "sh",
            StoreOp::Sw => "sw",
        }
    }
}

/// Branch comparisons (opcode BRANCH).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum BranchCond {
    Eq,
    Ne,
    Lt,
    Ge,
    Ltu,
    Geu,
}

impl BranchCond {
    fn from_funct3(funct3: u32) -> Option<Self> {
        match funct3 {
            0 => Some(BranchCond::Eq),
            1 => Some(BranchCond::Ne),
            4 => Some(BranchCond::Lt),
            5 => Some(BranchCond::Ge),
            6 => Some(BranchCond::Ltu),
            7 => Some(BranchCond::Geu),
            _ => None,
        }
    }

    pub fn funct3(self) -> u32 {
        match self {
            BranchCond::Eq => 0,
            BranchCond::Ne => 1,
            BranchCond::Lt => 4,
            BranchCond::Ge => 5,
            BranchCond::Ltu => 6,
            BranchCond::Geu => 7,
        }
    }

    /// Evaluate the comparison.
    pub fn holds(self, a: u32, b: u32) -> bool {
        match self {
            BranchCond::Eq => a == b,
            BranchCond::Ne => a != b,
            BranchCond::Lt => (a as i32) < (b as i32),
            BranchCond::Ge => (a as i32) >= (b as i32),
            BranchCond::Ltu => a < b,
            BranchCond::Geu => a >= b,
        }
    }

    pub fn mnemonic(self) -> &'static str {
        match self {
            BranchCond::Eq => "beq",
            BranchCond::Ne => "bne",
            BranchCond::Lt => "blt",
            BranchCond::Ge => "bge",
            BranchCond::Ltu => "bltu",
            BranchCond::Geu => "bgeu",
        }
    }
}

/// A decoded RV32IM instruction.
///
/// Offsets on `Jal`, `Jalr`, `Branch`, `Load` and `Store` are the
/// sign-extended byte immediates exactly as encoded.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Instruction {
    /// rd := imm
    Lui { rd: u8, imm: u32 },

    /// rd := pc + imm
    Auipc { rd: u8, imm: u32 },

    /// rd := pc + 1; jump by `offset` bytes
    Jal { rd: u8, offset: i32 },

    /// rd := pc + 1; jump to rs1 + offset
    Jalr { rd: u8, rs1: u8, offset: i32 },

    /// if cond(rs1, rs2) jump by `offset` bytes
    Branch { cond: BranchCond, rs1: u8, rs2: u8, offset: i32 },

    /// rd := mem[rs1 + offset]
    Load { op: LoadOp, rd: u8, rs1: u8, offset: i32 },

    /// mem[rs1 + offset] := rs2
    Store { op: StoreOp, rs1: u8, rs2: u8, offset: i32 },

    /// rd := rs1 op imm (`imm` is the shift amount for shifts)
    OpImm { op: ImmOp, rd: u8, rs1: u8, imm: i32 },

    /// rd := rs1 op rs2
    Op { op: AluOp, rd: u8, rs1: u8, rs2: u8 },

    /// Program exit trap
    Ecall,
}

impl Instruction {
    /// Assembly mnemonic of the instruction.
    pub fn mnemonic(&self) -> &'static str {
        match self {
            Instruction::Lui { .. } => "lui",
            Instruction::Auipc { .. } => "auipc",
            Instruction::Jal { .. } => "jal",
            Instruction::Jalr { .. } => "jalr",
            Instruction::Branch { cond, .. } => cond.mnemonic(),
            Instruction::Load { op, .. } => op.mnemonic(),
            Instruction::Store { op, .. } => op.mnemonic(),
            Instruction::OpImm { op, .. } => op.mnemonic(),
            Instruction::Op { op, .. } => op.mnemonic(),
            Instruction::Ecall => "ecall",
        }
    }
}

/// Decode a 32-bit instruction word.
pub fn decode(word: u32) -> Result<Instruction, DecodeError> {
    let op = opcode(word);
    let f3 = funct3(word);

    let invalid_funct = || DecodeError::InvalidFunct {
        opcode: op,
        funct3: f3,
        funct7: funct7(word),
        word,
    };

    let instruction = match op {
        Opcode::LUI => Instruction::Lui { rd: rd(word), imm: imm_u(word) },
        Opcode::AUIPC => Instruction::Auipc { rd: rd(word), imm: imm_u(word) },
        Opcode::JAL => Instruction::Jal { rd: rd(word), offset: imm_j(word) },
        Opcode::JALR => {
            if f3 != 0 {
                return Err(invalid_funct());
            }
            Instruction::Jalr { rd: rd(word), rs1: rs1(word), offset: imm_i(word) }
        }
        Opcode::BRANCH => Instruction::Branch {
            cond: BranchCond::from_funct3(f3).ok_or_else(invalid_funct)?,
            rs1: rs1(word),
            rs2: rs2(word),
            offset: imm_b(word),
        },
        Opcode::LOAD => Instruction::Load {
            op: LoadOp::from_funct3(f3).ok_or_else(invalid_funct)?,
            rd: rd(word),
            rs1: rs1(word),
            offset: imm_i(word),
        },
        Opcode::STORE => Instruction::Store {
            op: StoreOp::from_funct3(f3).ok_or_else(invalid_funct)?,
            rs1: rs1(word),
            rs2: rs2(word),
            offset: imm_s(word),
        },
        Opcode::OP_IMM => decode_op_imm(word)?,
        Opcode::OP => Instruction::Op {
            op: AluOp::from_fields(funct7(word), f3).ok_or_else(invalid_funct)?,
            rd: rd(word),
            rs1: rs1(word),
            rs2: rs2(word),
        },
        Opcode::SYSTEM => Instruction::Ecall,
        _ => return Err(DecodeError::UnknownOpcode { opcode: op, word }),
    };

    Ok(instruction)
}

/// OP-IMM needs its own path: shift forms reuse imm[11:5] as a selector
/// that must be exactly 0 (SLLI, SRLI) or 0b0100000 (SRAI).
fn decode_op_imm(word: u32) -> Result<Instruction, DecodeError> {
    let f3 = funct3(word);
    let upper = funct7(word);

    let op = match f3 {
        0 => ImmOp::Addi,
        2 => ImmOp::Slti,
        3 => ImmOp::Sltiu,
        4 => ImmOp::Xori,
        6 => ImmOp::Ori,
        7 => ImmOp::Andi,
        1 if upper == 0x00 => ImmOp::Slli,
        5 if upper == 0x00 => ImmOp::Srli,
        5 if upper == 0x20 => ImmOp::Srai,
        _ => {
            return Err(DecodeError::InvalidShiftEncoding { funct3: f3, upper, word });
        }
    };

    let imm = if op.is_shift() {
        ((word >> 20) & 0x1f) as i32
    } else {
        imm_i(word)
    };

    Ok(Instruction::OpImm { op, rd: rd(word), rs1: rs1(word), imm })
}

// ==================== Encoding ====================

fn encode_r(opcode: u32, rd: u8, funct3: u32, rs1: u8, rs2: u8, funct7: u32) -> u32 {
    (funct7 & 0x7f) << 25
        | (rs2 as u32 & 0x1f) << 20
        | (rs1 as u32 & 0x1f) << 15
        | (funct3 & 0x7) << 12
        | (rd as u32 & 0x1f) << 7
        | opcode
}

fn encode_i(opcode: u32, rd: u8, funct3: u32, rs1: u8, imm: i32) -> u32 {
    ((imm as u32) & 0xfff) << 20
        | (rs1 as u32 & 0x1f) << 15
        | (funct3 & 0x7) << 12
        | (rd as u32 & 0x1f) << 7
        | opcode
}

fn encode_s(opcode: u32, funct3: u32, rs1: u8, rs2: u8, imm: i32) -> u32 {
    let imm = imm as u32;
    ((imm >> 5) & 0x7f) << 25
        | (rs2 as u32 & 0x1f) << 20
        | (rs1 as u32 & 0x1f) << 15
        | (funct3 & 0x7) << 12
        | (imm & 0x1f) << 7
        | opcode
}

fn encode_b(opcode: u32, funct3: u32, rs1: u8, rs2: u8, imm: i32) -> u32 {
    let imm = imm as u32;
    ((imm >> 12) & 0x1) << 31
        | ((imm >> 5) & 0x3f) << 25
        | (rs2 as u32 & 0x1f) << 20
        | (rs1 as u32 & 0x1f) << 15
        | (funct3 & 0x7) << 12
        | ((imm >> 1) & 0xf) << 8
        | ((imm >> 11) & 0x1) << 7
        | opcode
}

fn encode_j(opcode: u32, rd: u8, imm: i32) -> u32 {
    let imm = imm as u32;
    ((imm >> 20) & 0x1) << 31
        | ((imm >> 1) & 0x3ff) << 21
        | ((imm >> 11) & 0x1) << 20
        | ((imm >> 12) & 0xff) << 12
        | (rd as u32 & 0x1f) << 7
        | opcode
}

/// Encode an instruction back to its 32-bit word.
///
/// Immediates are truncated to the width of their field.
pub fn encode(instr: &Instruction) -> u32 {
    match *instr {
        Instruction::Lui { rd, imm } => imm_u(imm) | (rd as u32 & 0x1f) << 7 | Opcode::LUI,
        Instruction::Auipc { rd, imm } => imm_u(imm) | (rd as u32 & 0x1f) << 7 | Opcode::AUIPC,
        Instruction::Jal { rd, offset } => encode_j(Opcode::JAL, rd, offset),
        Instruction::Jalr { rd, rs1, offset } => encode_i(Opcode::JALR, rd, 0, rs1, offset),
        Instruction::Branch { cond, rs1, rs2, offset } => {
            encode_b(Opcode::BRANCH, cond.funct3(), rs1, rs2, offset)
        }
        Instruction::Load { op, rd, rs1, offset } => {
            encode_i(Opcode::LOAD, rd, op.funct3(), rs1, offset)
        }
        Instruction::Store { op, rs1, rs2, offset } => {
            encode_s(Opcode::STORE, op.funct3(), rs1, rs2, offset)
        }
        Instruction::OpImm { op, rd, rs1, imm } => {
            let imm = match op {
                ImmOp::Slli | ImmOp::Srli => imm & 0x1f,
                ImmOp::Srai => 0x400 | (imm & 0x1f),
                _ => imm,
            };
            encode_i(Opcode::OP_IMM, rd, op.funct3(), rs1, imm)
        }
        Instruction::Op { op, rd, rs1, rs2 } => {
            let (funct7, funct3) = op.fields();
            encode_r(Opcode::OP, rd, funct3, rs1, rs2, funct7)
        }
        Instruction::Ecall => Opcode::SYSTEM,
    }
}

/// Errors that can occur during instruction decoding.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DecodeError {
    #[error("unknown opcode {opcode:#04x} in instruction {word:#010x}")]
    UnknownOpcode { opcode: u32, word: u32 },

    #[error("invalid shift-immediate encoding (imm[11:5] = {upper:#04x}, funct3 {funct3}) in instruction {word:#010x}")]
    InvalidShiftEncoding { funct3: u32, upper: u32, word: u32 },

    #[error("invalid funct3 {funct3} / funct7 {funct7:#04x} for opcode {opcode:#04x} in instruction {word:#010x}")]
    InvalidFunct { opcode: u32, funct3: u32, funct7: u32, word: u32 },
}
