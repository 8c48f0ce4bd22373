//! Execution trace records and sinks.
//!
//! The fetch-execute loop reports every executed instruction to a
//! [`TraceSink`]; formatting is left entirely to the sink.

use crate::cpu::registers::{Registers, NUM_REGS};
use serde::{Serialize, Deserialize};
use std::io::{self, Write};

/// Register state right after the instruction at `pc` executed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TraceEntry {
    pub pc: u32,
    pub regs: [u32; NUM_REGS],
}

impl TraceEntry {
    pub fn new(pc: u32, regs: &Registers) -> Self {
        Self { pc, regs: regs.to_array() }
    }
}

/// Receiver of per-step trace records.
pub trait TraceSink {
    /// Called once per executed instruction, in execution order.
    fn record(&mut self, entry: &TraceEntry);

    /// Called when the program-exit trap at `pc` executes.
    fn on_exit(&mut self, _pc: u32, _regs: &Registers) {}
}

/// Sink that drops everything.
#[derive(Debug, Clone, Copy, Default)]
pub struct NullSink;

impl TraceSink for NullSink {
    fn record(&mut self, _entry: &TraceEntry) {}
}

impl TraceSink for Vec<TraceEntry> {
    fn record(&mut self, entry: &TraceEntry) {
        self.push(*entry);
    }
}

impl<S: TraceSink + ?Sized> TraceSink for &mut S {
    fn record(&mut self, entry: &TraceEntry) {
        (**self).record(entry);
    }

    fn on_exit(&mut self, pc: u32, regs: &Registers) {
        (**self).on_exit(pc, regs);
    }
}

/// Writes the register file as one line of 32 space-separated decimals.
fn write_registers<W: Write>(out: &mut W, regs: &Registers) -> io::Result<()> {
    let values: Vec<String> = regs.as_array().iter().map(u32::to_string).collect();
    writeln!(out, "{}", values.join(" "))
}

/// Sink for quiet runs: steps go to `tracing` at TRACE level, and the
/// register file is written to `out` whenever the exit trap executes.
///
/// Write errors are held until [`LogSink::finish`].
pub struct LogSink<W: Write> {
    out: W,
    error: Option<io::Error>,
}

impl<W: Write> LogSink<W> {
    pub fn new(out: W) -> Self {
        Self { out, error: None }
    }

    /// Flush and hand back the writer, or the first write error.
    pub fn finish(mut self) -> io::Result<W> {
        if let Some(err) = self.error.take() {
            return Err(err);
        }
        self.out.flush()?;
        Ok(self.out)
    }
}

impl<W: Write> TraceSink for LogSink<W> {
    fn record(&mut self, entry: &TraceEntry) {
        tracing::trace!(pc = entry.pc, regs = ?entry.regs, "step");
    }

    fn on_exit(&mut self, pc: u32, regs: &Registers) {
        tracing::debug!(pc, "exit trap");
        if self.error.is_none() {
            self.error = write_registers(&mut self.out, regs).err();
        }
    }
}

/// Renders the trace as a right-aligned table: a `PC` column followed by
/// one column per register `x0`..`x31`.
///
/// Rows are buffered so column widths fit the widest value; the table is
/// written by [`TableWriter::finish`]. Exit-trap dumps are written as soon
/// as the trap executes.
pub struct TableWriter<W: Write> {
    out: W,
    rows: Vec<TraceEntry>,
    padding: usize,
    error: Option<io::Error>,
}

impl<W: Write> TableWriter<W> {
    pub fn new(out: W) -> Self {
        Self {
            out,
            rows: Vec::new(),
            padding: 2,
            error: None,
        }
    }

    /// Write the table and hand back the writer, or the first write error.
    pub fn finish(mut self) -> io::Result<W> {
        if let Some(err) = self.error.take() {
            return Err(err);
        }

        let mut header = Vec::with_capacity(NUM_REGS + 1);
        header.push("PC".to_string());
        header.extend((0..NUM_REGS).map(|i| format!("x{}", i)));

        let body: Vec<Vec<String>> = self
            .rows
            .iter()
            .map(|entry| {
                let mut cells = Vec::with_capacity(NUM_REGS + 1);
                cells.push(entry.pc.to_string());
                cells.extend(entry.regs.iter().map(|v| v.to_string()));
                cells
            })
            .collect();

        let mut widths: Vec<usize> = header.iter().map(String::len).collect();
        for cells in &body {
            for (w, cell) in widths.iter_mut().zip(cells) {
                *w = (*w).max(cell.len());
            }
        }

        for cells in std::iter::once(&header).chain(body.iter()) {
            let line: String = cells
                .iter()
                .zip(&widths)
                .map(|(cell, w)| format!("{:>width$}", cell, width = w + self.padding))
                .collect();
            writeln!(self.out, "{}", line)?;
        }

        self.out.flush()?;
        Ok(self.out)
    }
}

impl<W: Write> TraceSink for TableWriter<W> {
    fn record(&mut self, entry: &TraceEntry) {
        self.rows.push(*entry);
    }

    fn on_exit(&mut self, _pc: u32, regs: &Registers) {
        if self.error.is_none() {
            self.error = write_registers(&mut self.out, regs).err();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_vec_sink_collects_in_order() {
        let mut sink: Vec<TraceEntry> = Vec::new();
        let mut regs = Registers::new();
        sink.record(&TraceEntry::new(0, &regs));
        regs.write(1, 5);
        sink.record(&TraceEntry::new(1, &regs));

        assert_eq!(sink.len(), 2);
        assert_eq!(sink[1].pc, 1);
        assert_eq!(sink[1].regs[1], 5);
    }

    #[test]
    fn test_table_layout() {
        let mut table = TableWriter::new(Vec::new());
        let mut regs = Registers::new();
        regs.write(3, 12345);
        table.record(&TraceEntry::new(0, &regs));
        table.record(&TraceEntry::new(10, &regs));

        let out = String::from_utf8(table.finish().unwrap()).unwrap();
        let lines: Vec<&str> = out.lines().collect();
        assert_eq!(lines.len(), 3);

        let header: Vec<&str> = lines[0].split_whitespace().collect();
        assert_eq!(header.len(), 33);
        assert_eq!(header[0], "PC");
        assert_eq!(header[32], "x31");

        // Every line has the same width and the x3 column is wide enough.
        assert!(lines.iter().all(|l| l.len() == lines[0].len()));
        assert!(lines[2].starts_with("  10"));
        assert!(lines[1].contains("  12345"));
    }

    #[test]
    fn test_exit_dump_written_when_trap_executes() {
        let mut table = TableWriter::new(Vec::new());
        let mut regs = Registers::new();
        regs.write(31, 7);
        table.record(&TraceEntry::new(0, &regs));
        table.on_exit(0, &regs);

        let out = String::from_utf8(table.finish().unwrap()).unwrap();
        let lines: Vec<&str> = out.lines().collect();
        assert_eq!(lines.len(), 3);
        assert!(lines[0].starts_with("0 0 0"));
        assert!(lines[0].ends_with(" 7"));
        assert_eq!(lines[0].split(' ').count(), 32);
        assert!(lines[1].trim_start().starts_with("PC"));
    }

    #[test]
    fn test_log_sink_dumps_registers_on_exit() {
        let mut sink = LogSink::new(Vec::new());
        let mut regs = Registers::new();
        regs.write(1, 5);
        sink.record(&TraceEntry::new(0, &regs));
        sink.on_exit(1, &regs);

        let out = String::from_utf8(sink.finish().unwrap()).unwrap();
        assert_eq!(out.lines().count(), 1);
        assert!(out.starts_with("0 5 0"));
    }

    #[test]
    fn test_log_sink_silent_without_exit() {
        let mut sink = LogSink::new(Vec::new());
        sink.record(&TraceEntry::new(0, &Registers::new()));
        assert!(sink.finish().unwrap().is_empty());
    }
}
