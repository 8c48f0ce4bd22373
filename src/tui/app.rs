//! Debugger application state and logic.

use crate::config::SimConfig;
use crate::cpu::Cpu;
use crate::image::disasm::disassemble_word;
use std::collections::HashSet;

/// Instructions executed per tick while running continuously.
const STEPS_PER_TICK: usize = 64;

/// Debugger application state.
pub struct DebuggerApp {
    /// The CPU being debugged.
    pub cpu: Cpu,
    /// Configuration used to rebuild the CPU on reset.
    pub config: SimConfig,
    /// Breakpoints (by word index).
    pub breakpoints: HashSet<u32>,
    /// Is the debugger running continuously?
    pub running: bool,
    /// Should we quit?
    pub should_quit: bool,
    /// Status message to display.
    pub status: String,
    /// Memory view scroll offset, in words.
    pub mem_scroll: usize,
    /// Set when a run starts so a breakpoint under the PC is stepped over.
    resuming: bool,
}

impl DebuggerApp {
    /// Create a new debugger with a loaded program.
    pub fn new(program: Vec<u32>, config: SimConfig) -> Self {
        let cpu = Cpu::with_config(program, &config);

        Self {
            cpu,
            config,
            breakpoints: HashSet::new(),
            running: false,
            should_quit: false,
            status: "Ready. Press 's' to step, 'r' to run, 'q' to quit.".into(),
            mem_scroll: 0,
            resuming: false,
        }
    }

    /// Step one instruction.
    pub fn step(&mut self) {
        if !self.cpu.is_running() {
            self.status = format!("CPU stopped: {:?}", self.cpu.state);
            self.running = false;
            return;
        }

        let pc = self.cpu.pc();
        let word = self.cpu.program().get(pc as usize).copied();
        match self.cpu.step() {
            Ok(effect) => {
                let disasm = word.map(disassemble_word).unwrap_or_default();
                self.status = format!("PC={:04}: {}  -> {:?}", pc, disasm, effect);
            }
            Err(e) => {
                self.status = format!("Error: {}", e);
                self.running = false;
            }
        }
    }

    /// Run until exit, breakpoint, or error.
    pub fn run(&mut self) {
        self.running = true;
        self.resuming = true;
        self.status = "Running...".into();
    }

    /// Run one batch of continuous execution.
    pub fn tick(&mut self) {
        for _ in 0..STEPS_PER_TICK {
            if !self.running {
                return;
            }

            if !self.cpu.is_running() {
                self.running = false;
                self.status = format!("Stopped after {} instructions: {:?}", self.cpu.cycles, self.cpu.state);
                return;
            }

            if let Some(limit) = self.config.max_steps {
                if self.cpu.cycles >= limit {
                    self.running = false;
                    self.status = format!("Step limit of {} reached", limit);
                    return;
                }
            }

            let pc = self.cpu.pc();
            let resuming = std::mem::replace(&mut self.resuming, false);
            if self.breakpoints.contains(&pc) && !resuming {
                self.running = false;
                self.status = format!("Breakpoint at PC={}", pc);
                return;
            }

            self.step();
        }
    }

    /// Toggle breakpoint at the current PC.
    pub fn toggle_breakpoint(&mut self) {
        let pc = self.cpu.pc();
        if self.breakpoints.remove(&pc) {
            self.status = format!("Removed breakpoint at PC={}", pc);
        } else {
            self.breakpoints.insert(pc);
            self.status = format!("Set breakpoint at PC={}", pc);
        }
    }

    /// Reset CPU to initial state.
    pub fn reset(&mut self) {
        self.cpu.reset();
        self.running = false;
        self.status = "Reset. Ready.".into();
    }

    /// Scroll the memory view, clamped to the memory size.
    pub fn scroll_memory(&mut self, delta: isize) {
        let max = (self.cpu.mem.len() / 4).saturating_sub(1);
        self.mem_scroll = self.mem_scroll.saturating_add_signed(delta).min(max);
    }

    /// Get disassembly around the current PC as `(index, text, is_current)`.
    pub fn get_disassembly(&self, lines: usize) -> Vec<(u32, String, bool)> {
        let pc = self.cpu.pc() as usize;
        let start = pc.saturating_sub(lines / 2);

        self.cpu
            .program()
            .iter()
            .enumerate()
            .skip(start)
            .take(lines)
            .map(|(idx, word)| (idx as u32, disassemble_word(*word), idx == pc))
            .collect()
    }
}

/// Run the debugger with a program.
pub fn run_debugger(program: Vec<u32>, config: SimConfig) -> std::io::Result<()> {
    use crossterm::{
        event::{self, Event, KeyCode, KeyEventKind},
        terminal::{disable_raw_mode, enable_raw_mode, EnterAlternateScreen, LeaveAlternateScreen},
        ExecutableCommand,
    };
    use ratatui::prelude::*;
    use std::io::stdout;
    use std::time::Duration;

    // Setup terminal
    enable_raw_mode()?;
    stdout().execute(EnterAlternateScreen)?;
    let mut terminal = Terminal::new(CrosstermBackend::new(stdout()))?;

    let mut app = DebuggerApp::new(program, config);

    loop {
        terminal.draw(|frame| {
            super::ui::draw(frame, &app);
        })?;

        if event::poll(Duration::from_millis(50))? {
            if let Event::Key(key) = event::read()? {
                if key.kind == KeyEventKind::Press {
                    match key.code {
                        KeyCode::Char('q') => app.should_quit = true,
                        KeyCode::Char('s') => {
                            app.running = false;
                            app.step();
                        }
                        KeyCode::Char('r') => app.run(),
                        KeyCode::Char('p') => {
                            app.running = false;
                            app.status = "Paused.".into();
                        }
                        KeyCode::Char('b') => app.toggle_breakpoint(),
                        KeyCode::Char('x') => app.reset(),
                        KeyCode::Up => app.scroll_memory(-1),
                        KeyCode::Down => app.scroll_memory(1),
                        KeyCode::PageUp => app.scroll_memory(-16),
                        KeyCode::PageDown => app.scroll_memory(16),
                        _ => {}
                    }
                }
            }
        }

        if app.running {
            app.tick();
        }

        if app.should_quit {
            break;
        }
    }

    // Restore terminal
    disable_raw_mode()?;
    stdout().execute(LeaveAlternateScreen)?;

    Ok(())
}
