//! Intcode runner.
//!
//! Loads a program file and runs it standalone, as a packet network, as an
//! amplifier ring, or prints a listing of it.
//!
//! # Usage
//! ```text
//! intcode [--log-level <LEVEL>] <COMMAND>
//! ```
//!
//! # Commands
//! - `run <file> [--input a,b,..] [--ascii LINE].. [--set ADDR=VALUE].. [--peek ADDR]..`
//! - `network <file> [--machines N] [--idle-threshold K] [--first-broadcast] [--no-boot]`
//! - `amplify <file> --phases a,b,.. [--feedback] [--initial V]`
//! - `disasm <file>`
//!
//! The log threshold defaults to `info` and may also be set through `INTCODE_LOG`.

use clap::{Parser, Subcommand};
use intcode::network::config::{NetworkConfig, StopCondition};
use intcode::network::ring::Ring;
use intcode::network::server::Network;
use intcode::peripheral::{AsciiTerminal, Scripted, drive};
use intcode::utils::log::{self, Level};
use intcode::virtual_machine::config::EngineConfig;
use intcode::virtual_machine::disassembler::listing;
use intcode::virtual_machine::program::Program;
use intcode::virtual_machine::vm::VM;
use intcode::{error, info};
use std::path::{Path, PathBuf};
use std::process;

#[derive(Parser, Debug)]
#[command(name = "intcode", version, about = "Run Intcode programs")]
struct Cli {
    /// Log threshold: debug, info, warn or error. Overrides INTCODE_LOG.
    #[arg(long, global = true)]
    log_level: Option<Level>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Run one engine fed from the command line
    Run {
        /// Program file
        program: PathBuf,

        /// Comma-separated input values
        #[arg(long, value_delimiter = ',', allow_hyphen_values = true)]
        input: Vec<i64>,

        /// Line of text sent as ASCII codes (repeatable)
        #[arg(long, conflicts_with = "input")]
        ascii: Vec<String>,

        /// Patch memory before running, e.g. `--set 1=12`
        #[arg(long = "set", value_parser = parse_patch)]
        patches: Vec<(usize, i64)>,

        /// Print a memory cell after the run
        #[arg(long)]
        peek: Vec<usize>,

        /// Log every executed instruction at debug level
        #[arg(long)]
        trace: bool,
    },

    /// Run a packet network with a NAT
    Network {
        /// Program file shared by every machine
        program: PathBuf,

        #[arg(long, default_value_t = 50)]
        machines: usize,

        #[arg(long, default_value_t = 100)]
        idle_threshold: u32,

        /// Stop at the first packet sent to the NAT
        #[arg(long)]
        first_broadcast: bool,

        /// Do not answer the first input request with the machine address
        #[arg(long)]
        no_boot: bool,
    },

    /// Run a chain of amplifiers
    Amplify {
        /// Program file
        program: PathBuf,

        /// Comma-separated phase settings, one per amplifier
        #[arg(long, value_delimiter = ',', required = true, allow_hyphen_values = true)]
        phases: Vec<i64>,

        /// Feed the last amplifier back into the first
        #[arg(long)]
        feedback: bool,

        /// Signal fed to the first amplifier
        #[arg(long, default_value_t = 0, allow_hyphen_values = true)]
        initial: i64,
    },

    /// Print a listing of a program
    Disasm {
        /// Program file
        program: PathBuf,
    },
}

/// Parses `ADDR=VALUE`.
fn parse_patch(s: &str) -> Result<(usize, i64), String> {
    let (addr, value) = s
        .split_once('=')
        .ok_or_else(|| format!("expected ADDR=VALUE, got '{s}'"))?;
    let addr = addr
        .trim()
        .parse()
        .map_err(|e| format!("invalid address '{addr}': {e}"))?;
    let value = value
        .trim()
        .parse()
        .map_err(|e| format!("invalid value '{value}': {e}"))?;
    Ok((addr, value))
}

fn load(path: &Path) -> Program {
    match Program::from_file(path) {
        Ok(program) => program,
        Err(e) => {
            error!("{e}");
            process::exit(1);
        }
    }
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    if let Err(e) = log::init_from_env() {
        eprintln!("{e}");
        process::exit(1);
    }
    if let Some(level) = cli.log_level {
        log::set_max_level(level);
    }

    let result = match cli.command {
        Command::Run {
            program,
            input,
            ascii,
            patches,
            peek,
            trace,
        } => run(load(&program), input, ascii, patches, peek, trace).await,
        Command::Network {
            program,
            machines,
            idle_threshold,
            first_broadcast,
            no_boot,
        } => {
            let stop_at = if first_broadcast {
                StopCondition::FirstBroadcast
            } else {
                StopCondition::IdleFixedPoint
            };
            let config = NetworkConfig::new()
                .with_machines(machines)
                .with_idle_threshold(idle_threshold)
                .with_boot_address(!no_boot)
                .with_stop_at(stop_at);
            network(load(&program), config).await
        }
        Command::Amplify {
            program,
            phases,
            feedback,
            initial,
        } => Ring::new(load(&program), phases)
            .with_feedback(feedback)
            .with_initial(initial)
            .run()
            .await
            .map(|signal| println!("{signal}"))
            .map_err(|e| e.to_string()),
        Command::Disasm { program } => {
            print!("{}", listing(&load(&program)));
            Ok(())
        }
    };

    if let Err(e) = result {
        error!("{e}");
        process::exit(1);
    }
}

async fn run(
    program: Program,
    input: Vec<i64>,
    ascii: Vec<String>,
    patches: Vec<(usize, i64)>,
    peek: Vec<usize>,
    trace: bool,
) -> Result<(), String> {
    let config = EngineConfig::new()
        .with_label("run")
        .with_trace(trace);
    let (mut vm, ports) = VM::with_ports(&program, config);
    for (addr, value) in patches {
        vm.memory_mut().write(addr, value);
    }

    if ascii.is_empty() {
        let session = drive(&mut vm, ports, Scripted::new(input))
            .await
            .map_err(|e| e.to_string())?;
        for value in session.output {
            println!("{value}");
        }
        info!(
            "{:?} after {} instructions",
            session.summary.exit, session.summary.instructions
        );
    } else {
        let session = drive(&mut vm, ports, AsciiTerminal::new().lines(ascii))
            .await
            .map_err(|e| e.to_string())?;
        print!("{}", session.output.text);
        for value in session.output.values {
            println!("{value}");
        }
    }

    for addr in peek {
        println!("[{addr}] = {}", vm.memory().read(addr));
    }
    Ok(())
}

async fn network(program: Program, config: NetworkConfig) -> Result<(), String> {
    let network = Network::new(program, config).map_err(|e| e.to_string())?;
    let outcome = network.run().await.map_err(|e| e.to_string())?;
    if let Some(y) = outcome.first_broadcast {
        info!("first packet to the NAT had y={y}");
    }
    info!("NAT delivered {} packets", outcome.nat_deliveries);
    println!("{}", outcome.answer);
    Ok(())
}
