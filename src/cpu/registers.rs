//! RV32 integer register file.
//!
//! 32 general-purpose registers, each 32 bits wide:
//! - x0: hardwired zero
//! - x1: return address (by convention)
//! - x2: stack pointer (initialised to the top of memory)

use serde::{Serialize, Deserialize};

/// Number of general-purpose registers.
pub const NUM_REGS: usize = 32;

/// Index of the stack pointer register.
pub const SP: usize = 2;

/// The integer register file.
#[derive(Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Registers {
    x: [u32; NUM_REGS],
}

impl Registers {
    /// Create a register file with every register zeroed.
    pub const fn new() -> Self {
        Self { x: [0; NUM_REGS] }
    }

    /// Create a register file with the stack pointer set to `stack_top`.
    pub fn with_stack_pointer(stack_top: u32) -> Self {
        let mut regs = Self::new();
        regs.x[SP] = stack_top;
        regs
    }

    /// Build a register file from raw values.
    ///
    /// x0 is cleared regardless of `values[0]`.
    pub fn from_array(values: [u32; NUM_REGS]) -> Self {
        let mut regs = Self { x: values };
        regs.clear_zero();
        regs
    }

    /// Read register `idx`. Only the low 5 bits of the index are used.
    #[inline]
    pub fn read(&self, idx: u8) -> u32 {
        self.x[(idx & 0x1f) as usize]
    }

    /// Write register `idx`.
    ///
    /// Writes to x0 land in the array and stay visible until
    /// [`Registers::clear_zero`] runs at the end of the instruction.
    #[inline]
    pub fn write(&mut self, idx: u8, value: u32) {
        self.x[(idx & 0x1f) as usize] = value;
    }

    /// Force x0 back to zero.
    #[inline]
    pub fn clear_zero(&mut self) {
        self.x[0] = 0;
    }

    /// Borrow the raw register values.
    pub fn as_array(&self) -> &[u32; NUM_REGS] {
        &self.x
    }

    /// Copy out the raw register values.
    pub fn to_array(&self) -> [u32; NUM_REGS] {
        self.x
    }

    /// ABI name of register `idx` (`zero`, `ra`, `sp`, ...).
    pub fn abi_name(idx: u8) -> &'static str {
        const NAMES: [&str; NUM_REGS] = [
            "zero", "ra", "sp", "gp", "tp", "t0", "t1", "t2",
            "s0", "s1", "a0", "a1", "a2", "a3", "a4", "a5",
            "a6", "a7", "s2", "s3", "s4", "s5", "s6", "s7",
            "s8", "s9", "s10", "s11", "t3", "t4", "t5", "t6",
        ];
        NAMES[(idx & 0x1f) as usize]
    }
}

impl Default for Registers {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for Registers {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        // Only show non-zero registers
        let mut map = f.debug_map();
        for (i, value) in self.x.iter().enumerate() {
            if *value != 0 {
                map.entry(&format_args!("x{}", i), &format_args!("{:#010x}", value));
            }
        }
        map.finish()
    }
}
