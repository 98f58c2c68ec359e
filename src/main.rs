//================================================
// [minivm Main]
//================================================
// Author: ZobieLabs
// License: Duality Public License (DPL v1.0)
// Goal: Command-line driver for the minivm assembler and evaluator
// Objective: Run, list, and assemble mini-assembly programs
//================================================

//================================================
// Imports/Modules
//================================================
use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use clap::{ArgAction, Parser, Subcommand};
use minivm::asm::{self, Assembler, Program};
use minivm::config::Config;
use minivm::vm::StackVm;
use minivm::{COUNTING_LOOP, logging};

#[derive(Parser)]
#[command(author, version, about = "minivm assembler and stack evaluator", long_about = None)]
struct Cli {
    /// Raise log verbosity (-v info, -vv debug, -vvv trace)
    #[arg(short, long, action = ArgAction::Count, global = true)]
    verbose: u8,
    /// TOML configuration file
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Assemble (if needed) and execute a program, printing its result
    Run {
        /// Source text or an assembled .mvm file
        input: PathBuf,
        /// Abort after this many dispatched instructions
        #[arg(long)]
        max_steps: Option<u64>,
    },
    /// Print the resolved instruction listing of a program
    List {
        /// Source text or an assembled .mvm file
        input: PathBuf,
        /// Emit the program as JSON instead of a listing
        #[arg(long)]
        json: bool,
    },
    /// Assemble source text into a binary .mvm file
    Assemble {
        /// Input source file
        input: PathBuf,
        /// Output path (defaults to input with .mvm extension)
        #[arg(short, long)]
        output: Option<PathBuf>,
    },
    /// Run the built-in counting loop and show its listing
    Demo,
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    logging::init(cli.verbose);

    let mut config = match &cli.config {
        Some(path) => Config::load(path)?,
        None => Config::default(),
    };

    match cli.command {
        Command::Run { input, max_steps } => {
            if max_steps.is_some() {
                config.vm.max_steps = max_steps;
            }
            let program = load_program(&input, &config)?;
            let value = StackVm::new(config.vm)
                .evaluate(&program)
                .with_context(|| format!("failed to execute {}", input.display()))?;
            println!("{value}");
        }
        Command::List { input, json } => {
            let program = load_program(&input, &config)?;
            if json {
                println!("{}", serde_json::to_string_pretty(&program)?);
            } else {
                print!("{}", asm::disassemble(&program));
            }
        }
        Command::Assemble { input, output } => {
            let program = load_program(&input, &config)?;
            let bytes = program.encode()?;
            let output_path = output.unwrap_or_else(|| input.with_extension("mvm"));
            fs::write(&output_path, &bytes)
                .with_context(|| format!("failed to write {}", output_path.display()))?;
            println!(
                "Assembled {} -> {} ({} instructions, {} bytes)",
                input.display(),
                output_path.display(),
                program.len(),
                bytes.len()
            );
        }
        Command::Demo => {
            let program = Assembler::new(config.assembler).assemble(COUNTING_LOOP)?;
            print!("{}", asm::disassemble(&program));
            let value = StackVm::new(config.vm).evaluate(&program)?;
            println!("{value}");
        }
    }

    Ok(())
}

fn load_program(path: &Path, config: &Config) -> Result<Program> {
    let bytes = fs::read(path).with_context(|| format!("failed to read {}", path.display()))?;
    if Program::is_encoded(&bytes) {
        return Program::decode(&bytes)
            .with_context(|| format!("failed to decode {}", path.display()));
    }
    let source = String::from_utf8(bytes)
        .with_context(|| format!("{} is neither UTF-8 source nor an assembled program", path.display()))?;
    Assembler::new(config.assembler)
        .assemble(&source)
        .with_context(|| format!("failed to assemble {}", path.display()))
}
