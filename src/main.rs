//! rv32-sim - CLI Entry Point
//!
//! Commands:
//! - `rv32-sim run <program.bin>` - Run a program and write `out.res`
//! - `rv32-sim debug <program.bin>` - Interactive debugger
//! - `rv32-sim disasm <program.bin>` - Disassemble a program
//! - `rv32-sim dump <program.bin>` - Print the raw words
//! - `rv32-sim convert <in> <out>` - Big-endian to little-endian image

use anyhow::{Context, Result};
use clap::{ArgAction, Args, Parser, Subcommand};
use rvsim::image::binary::{self, parse_bin_path, DEFAULT_OUTPUT};
use rvsim::image::disasm::disassemble_word;
use rvsim::{run_and_save, Cpu, Endianness, ExitReason, LogSink, SimConfig, TableWriter};
use serde::Serialize;
use std::path::{Path, PathBuf};
use tracing::info;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "rv32-sim")]
#[command(version)]
#[command(about = "An instruction-set simulator for RISC-V RV32IM")]
struct Cli {
    /// Increase log verbosity (-v, -vv, -vvv); RUST_LOG overrides
    #[arg(short, long, action = ArgAction::Count, global = true)]
    verbose: u8,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run a program until it exits
    Run(RunArgs),
    /// Interactive debugger
    #[cfg(feature = "tui")]
    Debug {
        /// Path to the binary instruction file
        #[arg(value_parser = parse_bin_path)]
        program: PathBuf,
        #[command(flatten)]
        image: ImageArgs,
        /// Maximum number of instructions to run continuously
        #[arg(long)]
        max_steps: Option<u64>,
    },
    /// Disassemble a program to readable text
    Disasm {
        /// Path to the binary instruction file
        program: PathBuf,
        #[command(flatten)]
        image: ImageArgs,
    },
    /// Print every instruction word as a decimal number
    Dump {
        /// Path to the binary instruction file
        program: PathBuf,
        /// Text placed between words
        #[arg(short, long, default_value = "\n")]
        separator: String,
        #[command(flatten)]
        image: ImageArgs,
    },
    /// Rewrite a big-endian image as little-endian
    Convert {
        /// Big-endian input image
        input: PathBuf,
        /// Little-endian output image
        output: PathBuf,
    },
}

#[derive(Args)]
struct ImageArgs {
    /// Read instruction words as big-endian
    #[arg(long)]
    big_endian: bool,
}

impl ImageArgs {
    fn endianness(&self) -> Endianness {
        if self.big_endian {
            Endianness::Big
        } else {
            Endianness::Little
        }
    }
}

#[derive(Args)]
struct RunArgs {
    /// Path to the binary instruction file (must end in .bin)
    #[arg(value_parser = parse_bin_path)]
    program: PathBuf,
    /// Print the program listing and a per-step register table
    #[arg(short, long)]
    debug: bool,
    /// Where to write the final register file
    #[arg(short, long, default_value = DEFAULT_OUTPUT)]
    output: PathBuf,
    /// Abort after this many instructions
    #[arg(long)]
    max_steps: Option<u64>,
    /// Data memory size in bytes
    #[arg(long)]
    memory_size: Option<usize>,
    /// JSON configuration file; flags override its values
    #[arg(long)]
    config: Option<PathBuf>,
    /// Print the final state as JSON on stdout
    #[arg(long)]
    json: bool,
    #[command(flatten)]
    image: ImageArgs,
}

/// Final machine state printed by `run --json`.
#[derive(Serialize)]
struct RunReport {
    program: String,
    steps: u64,
    exit: Option<ExitReason>,
    pc: u32,
    registers: [u32; 32],
}

fn init_logging(verbose: u8) {
    let default = match verbose {
        0 => "warn",
        1 => "info",
        2 => "debug",
        _ => "trace",
    };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .compact()
        .init();
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    init_logging(cli.verbose);

    match cli.command {
        Commands::Run(args) => run_program(args),
        #[cfg(feature = "tui")]
        Commands::Debug { program, image, max_steps } => {
            debug_program(&program, image.endianness(), max_steps)
        }
        Commands::Disasm { program, image } => {
            let words = load(&program, image.endianness())?;
            println!("{}", rvsim::disassemble(&words));
            Ok(())
        }
        Commands::Dump { program, separator, image } => {
            let words = load(&program, image.endianness())?;
            println!("{}", binary::dump_words(&words, &separator));
            Ok(())
        }
        Commands::Convert { input, output } => {
            let bytes = std::fs::read(&input)
                .with_context(|| format!("failed to read {}", input.display()))?;
            let converted = binary::convert_endianness(&bytes)
                .with_context(|| format!("failed to convert {}", input.display()))?;
            std::fs::write(&output, &converted)
                .with_context(|| format!("failed to write {}", output.display()))?;
            info!(words = converted.len() / 4, output = %output.display(), "converted image");
            Ok(())
        }
    }
}

fn load(path: &Path, endianness: Endianness) -> Result<Vec<u32>> {
    let words = rvsim::load_program(path, endianness)
        .with_context(|| format!("failed to load {}", path.display()))?;
    info!(path = %path.display(), words = words.len(), "loaded program");
    Ok(words)
}

fn build_config(args: &RunArgs) -> Result<SimConfig> {
    let mut config = match &args.config {
        Some(path) => SimConfig::from_json_file(path)?,
        None => SimConfig::default(),
    };

    if let Some(size) = args.memory_size {
        config.memory_size = size;
    }
    if let Some(limit) = args.max_steps {
        config.max_steps = Some(limit);
    }
    config.trace |= args.debug;
    config.validate()?;

    Ok(config)
}

fn run_program(args: RunArgs) -> Result<()> {
    let config = build_config(&args)?;
    let program = load(&args.program, args.image.endianness())?;

    if config.trace {
        print_listing(&args.program, &program);
    }

    let mut cpu = Cpu::with_config(program, &config);

    let result = if config.trace {
        let mut table = TableWriter::new(std::io::stdout().lock());
        let result = run_and_save(&mut cpu, &mut table, &args.output);
        // The table is printed even for a faulted run.
        let _out = table.finish().context("failed to write trace")?;
        result
    } else {
        let mut sink = LogSink::new(std::io::stdout().lock());
        let result = run_and_save(&mut cpu, &mut sink, &args.output);
        let _out = sink.finish().context("failed to write register dump")?;
        result
    };

    let steps = result.with_context(|| format!("simulation of {} failed", args.program.display()))?;
    info!(steps, exit = ?cpu.exit_reason(), "simulation finished");

    if args.json {
        let report = RunReport {
            program: args.program.display().to_string(),
            steps,
            exit: cpu.exit_reason(),
            pc: cpu.pc(),
            registers: cpu.regs.to_array(),
        };
        println!("{}", serde_json::to_string_pretty(&report)?);
    }

    Ok(())
}

fn print_listing(path: &Path, program: &[u32]) {
    let name = path.file_name().map(|n| n.to_string_lossy()).unwrap_or_default();

    println!("rv32-sim: RISC-V RV32IM simulator");
    println!("Running program: {}", name);
    println!("Instructions:");
    for (i, word) in program.iter().enumerate() {
        println!("{:>4}: {:>10}  {}", i, word, disassemble_word(*word));
    }
    println!();
}

#[cfg(feature = "tui")]
fn debug_program(path: &Path, endianness: Endianness, max_steps: Option<u64>) -> Result<()> {
    let program = load(path, endianness)?;
    if program.is_empty() {
        anyhow::bail!("{} contains no instructions", path.display());
    }

    let config = SimConfig { max_steps, ..SimConfig::default() };
    rvsim::run_debugger(program, config).context("debugger error")?;
    Ok(())
}
