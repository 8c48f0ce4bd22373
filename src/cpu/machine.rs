//! The fetch-execute loop.
//!
//! [`Cpu`] owns the program counter, the register file and memory. Each
//! step fetches the word at `pc`, hands it to the executor together with
//! exclusive access to the machine state, and applies the reported
//! [`StepEffect`].
//!
//! The program counter is a word index into the program, not a byte
//! address. Branch and jump effects carry byte offsets and are divided by
//! 4 when applied.

use crate::config::SimConfig;
use crate::cpu::{Memory, Registers};
use crate::cpu::execute::{self, CpuError, StepEffect};
use crate::trace::{NullSink, TraceEntry, TraceSink};
use serde::{Serialize, Deserialize};
use tracing::{debug, info, trace, warn};

/// Why a run finished normally.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ExitReason {
    /// Execution advanced past the last instruction.
    EndOfProgram,
    /// The program-exit trap executed.
    Ecall,
}

/// CPU execution state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum CpuState {
    /// CPU is running normally.
    Running,
    /// CPU has stopped without a fault.
    Exited(ExitReason),
    /// CPU encountered a fatal error.
    Faulted,
}

/// Final state of a completed run.
#[derive(Debug, Clone)]
pub struct RunOutcome {
    pub registers: Registers,
    pub memory: Memory,
    /// Number of instructions executed.
    pub steps: u64,
    pub exit: ExitReason,
}

/// An RV32IM hart with its program and data memory.
#[derive(Clone, Serialize, Deserialize)]
pub struct Cpu {
    /// Integer registers.
    pub regs: Registers,
    /// Data memory.
    pub mem: Memory,
    /// Current execution state.
    pub state: CpuState,
    /// Instruction count.
    pub cycles: u64,
    program: Vec<u32>,
    pc: u32,
    max_steps: Option<u64>,
}

impl Cpu {
    /// Create a CPU with default memory and `sp` at the top of memory.
    pub fn new(program: Vec<u32>) -> Self {
        Self::with_config(program, &SimConfig::default())
    }

    /// Create a CPU sized and limited by `config`.
    ///
    /// `config` is expected to have passed [`SimConfig::validate`].
    pub fn with_config(program: Vec<u32>, config: &SimConfig) -> Self {
        let mem = Memory::with_capacity(config.memory_size);
        let regs = Registers::with_stack_pointer(config.memory_size as u32);
        let mut cpu = Self::from_parts(program, regs, mem);
        cpu.max_steps = config.max_steps;
        cpu
    }

    /// Create a CPU from explicit initial state.
    pub fn from_parts(program: Vec<u32>, regs: Registers, mem: Memory) -> Self {
        Self {
            regs,
            mem,
            state: CpuState::Running,
            cycles: 0,
            program,
            pc: 0,
            max_steps: None,
        }
    }

    /// Reset registers, memory and the program counter, keeping the
    /// program and memory capacity.
    pub fn reset(&mut self) {
        let size = self.mem.len();
        self.regs = Registers::with_stack_pointer(size as u32);
        self.mem.clear();
        self.state = CpuState::Running;
        self.cycles = 0;
        self.pc = 0;
    }

    /// Current program counter (word index).
    pub fn pc(&self) -> u32 {
        self.pc
    }

    /// The loaded program.
    pub fn program(&self) -> &[u32] {
        &self.program
    }

    /// Execute a single instruction without tracing.
    pub fn step(&mut self) -> Result<StepEffect, CpuError> {
        self.step_traced(&mut NullSink)
    }

    /// Execute a single instruction, reporting it to `sink`.
    pub fn step_traced(&mut self, sink: &mut dyn TraceSink) -> Result<StepEffect, CpuError> {
        if self.state != CpuState::Running {
            return Err(CpuError::NotRunning(self.state));
        }

        let result = self.fetch_execute(sink);
        if result.is_err() {
            self.state = CpuState::Faulted;
        }
        result
    }

    fn fetch_execute(&mut self, sink: &mut dyn TraceSink) -> Result<StepEffect, CpuError> {
        let pc = self.pc;
        let len = self.program.len();

        // Fetch
        let word = *self
            .program
            .get(pc as usize)
            .ok_or(CpuError::PcOutOfBounds { pc: pc as i64, len })?;

        trace!(pc, word, "fetch");

        // Decode and execute
        let effect = execute::execute(pc, word, &mut self.regs, &mut self.mem)?;
        self.cycles += 1;
        sink.record(&TraceEntry::new(pc, &self.regs));

        match effect {
            StepEffect::Continue => {
                self.pc = pc.wrapping_add(1);
                if self.pc as usize >= len {
                    debug!(pc, "ran off the end of the program");
                    self.state = CpuState::Exited(ExitReason::EndOfProgram);
                }
            }
            StepEffect::Branch(offset) => {
                let target = pc as i64 + (offset / 4) as i64;
                if target < 0 || target >= len as i64 {
                    return Err(CpuError::PcOutOfBounds { pc: target, len });
                }
                trace!(pc, offset, target, "branch");
                self.pc = target as u32;
            }
            StepEffect::Terminate => {
                debug!(pc, "exit trap");
                sink.on_exit(pc, &self.regs);
                self.state = CpuState::Exited(ExitReason::Ecall);
            }
        }

        Ok(effect)
    }

    /// Run until exit or error.
    ///
    /// Returns the number of instructions executed.
    pub fn run(&mut self) -> Result<u64, CpuError> {
        self.run_traced(&mut NullSink)
    }

    /// Run until exit or error, reporting every step to `sink`.
    ///
    /// Exceeding the configured step ceiling is a fatal error.
    pub fn run_traced(&mut self, sink: &mut dyn TraceSink) -> Result<u64, CpuError> {
        let start_cycles = self.cycles;

        while self.state == CpuState::Running {
            if let Some(limit) = self.max_steps {
                if self.cycles >= limit {
                    warn!(limit, pc = self.pc, "step limit exceeded");
                    self.state = CpuState::Faulted;
                    return Err(CpuError::StepLimitExceeded { limit });
                }
            }
            self.step_traced(sink)?;
        }

        info!(steps = self.cycles - start_cycles, state = ?self.state, "run finished");
        Ok(self.cycles - start_cycles)
    }

    /// Run for at most `max_cycles` instructions, stopping quietly when
    /// the budget runs out.
    pub fn run_limited(&mut self, max_cycles: u64) -> Result<u64, CpuError> {
        let start_cycles = self.cycles;
        let limit = self.cycles + max_cycles;

        while self.state == CpuState::Running && self.cycles < limit {
            self.step()?;
        }

        Ok(self.cycles - start_cycles)
    }

    /// Why the CPU stopped, if it exited normally.
    pub fn exit_reason(&self) -> Option<ExitReason> {
        match self.state {
            CpuState::Exited(reason) => Some(reason),
            _ => None,
        }
    }

    /// Check if the CPU has exited.
    pub fn is_halted(&self) -> bool {
        matches!(self.state, CpuState::Exited(_))
    }

    /// Check if the CPU is running.
    pub fn is_running(&self) -> bool {
        self.state == CpuState::Running
    }

    /// Consume a finished CPU into its outcome.
    pub fn into_outcome(self) -> Option<RunOutcome> {
        let exit = self.exit_reason()?;
        Some(RunOutcome {
            registers: self.regs,
            memory: self.mem,
            steps: self.cycles,
            exit,
        })
    }
}

impl std::fmt::Debug for Cpu {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Cpu")
            .field("state", &self.state)
            .field("pc", &self.pc)
            .field("cycles", &self.cycles)
            .field("regs", &self.regs)
            .finish()
    }
}

/// Run `program` to completion from the given initial state.
pub fn run(
    program: &[u32],
    registers: Registers,
    memory: Memory,
    sink: &mut dyn TraceSink,
    max_steps: Option<u64>,
) -> Result<RunOutcome, CpuError> {
    let mut cpu = Cpu::from_parts(program.to_vec(), registers, memory);
    cpu.max_steps = max_steps;
    cpu.run_traced(sink)?;

    let state = cpu.state;
    cpu.into_outcome().ok_or(CpuError::NotRunning(state))
}

/// Run `program` and collect the final registers plus one trace entry per
/// executed instruction.
pub fn run_collect(
    program: &[u32],
    registers: Registers,
    memory: Memory,
) -> Result<(Registers, Vec<TraceEntry>), CpuError> {
    let mut entries = Vec::new();
    let outcome = run(program, registers, memory, &mut entries, None)?;
    Ok((outcome.registers, entries))
}
