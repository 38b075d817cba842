//! vm-sim - runs a command script against a simulated hierarchical MMU
//!
//! Usage: vm-sim [OPTIONS] <INPUT> [OUTPUT]
//!
//! Each script line is `read <addr>`, `write <addr> <value>`, `reset` or
//! `full-reset`. One result line is written per command: the value read,
//! `ok`, or `fail` for an address outside virtual memory.

mod logger;

use std::path::PathBuf;
use std::process::ExitCode;

use anyhow::{Context, Result};
use clap::{ArgAction, Parser};

use hierarchical_vm::io::{format_results, read_script, run_script, write_results};
use hierarchical_vm::{MemoryConfig, VmManager};

#[derive(Parser, Debug)]
#[command(name = "vm-sim", version, about = "Hierarchical page-table virtual memory simulator")]
struct Cli {
    /// Command script to run
    input: PathBuf,

    /// Where to write results (stdout if omitted)
    output: Option<PathBuf>,

    /// JSON file with offset/physical/virtual widths
    #[arg(long)]
    config: Option<PathBuf>,

    /// Use the small 2-word-page geometry
    #[arg(long, conflicts_with = "config")]
    test_constants: bool,

    #[arg(long)]
    offset_width: Option<u32>,

    #[arg(long)]
    physical_width: Option<u32>,

    #[arg(long)]
    virtual_width: Option<u32>,

    /// Unlink tables emptied by an eviction immediately
    #[arg(long)]
    prune_empty_tables: bool,

    /// Print every physical memory primitive call to stderr
    #[arg(long)]
    trace: bool,

    /// More output (-v info, -vv debug, -vvv trace)
    #[arg(short, long, action = ArgAction::Count)]
    verbose: u8,
}

impl Cli {
    fn memory_config(&self) -> Result<MemoryConfig> {
        let mut config = match &self.config {
            Some(path) => MemoryConfig::from_json_file(path)
                .with_context(|| format!("loading config {}", path.display()))?,
            None if self.test_constants => MemoryConfig::test_constants(),
            None => MemoryConfig::default(),
        };
        if let Some(width) = self.offset_width {
            config.offset_width = width;
        }
        if let Some(width) = self.physical_width {
            config.physical_address_width = width;
        }
        if let Some(width) = self.virtual_width {
            config.virtual_address_width = width;
        }
        config.prune_empty_tables |= self.prune_empty_tables;
        config.validate()?;
        Ok(config)
    }
}

fn main() -> ExitCode {
    let cli = Cli::parse();

    if let Err(e) = logger::init(logger::level_for(cli.verbose)) {
        eprintln!("Error: {}", e);
        return ExitCode::FAILURE;
    }

    match run(&cli) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("Error: {:#}", e);
            ExitCode::FAILURE
        }
    }
}

fn run(cli: &Cli) -> Result<()> {
    let config = cli.memory_config()?;
    let mut vm = if cli.trace {
        VmManager::with_trace(config)?
    } else {
        VmManager::new(config)?
    };

    let commands =
        read_script(&cli.input).with_context(|| format!("reading script {}", cli.input.display()))?;
    log::info!("{} commands from {}", commands.len(), cli.input.display());

    let outcomes = run_script(&mut vm, &commands)?;

    if let Some(trace) = vm.store().trace() {
        eprint!("{}", trace);
    }

    match &cli.output {
        Some(path) => write_results(path, &outcomes)
            .with_context(|| format!("writing results to {}", path.display()))?,
        None => print!("{}", format_results(&outcomes)),
    }
    Ok(())
}
