//! Running a loaded program to completion and saving its register file.

use crate::cpu::{Cpu, CpuError};
use crate::image::{save_registers, ImageError};
use crate::trace::TraceSink;
use std::path::Path;
use thiserror::Error;
use tracing::info;

/// Run `cpu` until it exits, then write the final register file to
/// `output`.
///
/// A run that ends in an error leaves `output` untouched.
pub fn run_and_save(
    cpu: &mut Cpu,
    sink: &mut dyn TraceSink,
    output: &Path,
) -> Result<u64, RunError> {
    let steps = cpu.run_traced(sink)?;
    save_registers(output, &cpu.regs)?;
    info!(steps, output = %output.display(), "saved register file");
    Ok(steps)
}

/// Errors from a complete run.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RunError {
    #[error(transparent)]
    Cpu(#[from] CpuError),

    #[error(transparent)]
    Image(#[from] ImageError),
}
