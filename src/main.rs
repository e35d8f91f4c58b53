//! simbind - native simulator module binding
//!
//! CLI for checking and driving compiled simulator modules without a host
//! runtime.

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use simbind::config::SimbindConfig;
use simbind::module::{EntryPoint, ModuleRegistry};
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "simbind")]
#[command(version)]
#[command(about = "Load and drive native simulator modules", long_about = None)]
struct Cli {
    /// Configuration file (default: $SIMBIND_CONFIG or simbind.toml found upward)
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Increase log verbosity (-v debug, -vv trace)
    #[arg(short, long, global = true, action = clap::ArgAction::Count)]
    verbose: u8,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Load modules and report whether every entry point resolves
    Probe {
        /// Module paths or bare names looked up in the search paths
        #[arg(required = true)]
        modules: Vec<PathBuf>,
    },

    /// Run one simulation instance of a module
    Run {
        /// Module path or bare name
        module: PathBuf,

        /// Cycles to step
        #[arg(short = 'n', long, default_value = "1")]
        cycles: i32,

        /// Argument passed to the instance before stepping (repeatable)
        #[arg(short, long = "arg", value_name = "ARG")]
        args: Vec<String>,

        /// Signal assignment applied before stepping, as ID=VALUE (repeatable)
        #[arg(long, value_name = "ID=VALUE", value_parser = parse_poke)]
        poke: Vec<(i32, i64)>,

        /// Signal to read after stepping (repeatable)
        #[arg(long, value_name = "ID")]
        peek: Vec<i32>,

        /// Write coverage to this file after stepping
        #[arg(long)]
        coverage: Option<String>,
    },
}

fn parse_poke(s: &str) -> Result<(i32, i64), String> {
    let (id, value) = s
        .split_once('=')
        .ok_or_else(|| format!("expected ID=VALUE, got '{}'", s))?;
    let id = id
        .trim()
        .parse()
        .map_err(|e| format!("bad signal id '{}': {}", id, e))?;
    let value = parse_value(value.trim()).map_err(|e| format!("bad value '{}': {}", value, e))?;
    Ok((id, value))
}

fn parse_value(s: &str) -> Result<i64, std::num::ParseIntError> {
    match s.strip_prefix("0x").or_else(|| s.strip_prefix("0X")) {
        Some(hex) => u64::from_str_radix(hex, 16).map(|v| v as i64),
        None => s.parse(),
    }
}

fn init_logging(verbose: u8) {
    let default = match verbose {
        0 => "simbind=warn",
        1 => "simbind=debug",
        _ => "simbind=trace",
    };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    init_logging(cli.verbose);

    let config = match &cli.config {
        Some(path) => SimbindConfig::load(path)
            .with_context(|| format!("Failed to load config {}", path.display()))?,
        None => SimbindConfig::from_env().context("Failed to load config")?,
    };
    let registry = ModuleRegistry::from_config(&config);

    match cli.command {
        Commands::Probe { modules } => cmd_probe(&registry, &modules),
        Commands::Run {
            module,
            cycles,
            args,
            poke,
            peek,
            coverage,
        } => cmd_run(
            &registry,
            &module,
            cycles,
            &args,
            &poke,
            &peek,
            coverage.as_deref(),
        ),
    }
}

fn cmd_probe(registry: &ModuleRegistry, modules: &[PathBuf]) -> Result<()> {
    let mut failed = 0;
    for path in modules {
        match registry.load(path) {
            Ok(handle) => {
                let resolved = registry.module_path(handle)?;
                let table = registry.entry_points(handle)?;
                println!("{}: handle {} ({})", path.display(), handle, resolved.display());
                for entry in EntryPoint::ALL {
                    println!("  {:<14} {:p}", entry.symbol(), table.address(entry));
                }
            }
            Err(e) => {
                println!("{}: {}", path.display(), e);
                failed += 1;
            }
        }
    }
    if failed > 0 {
        bail!("{} of {} modules failed to load", failed, modules.len());
    }
    Ok(())
}

fn cmd_run(
    registry: &ModuleRegistry,
    module: &PathBuf,
    cycles: i32,
    args: &[String],
    pokes: &[(i32, i64)],
    peeks: &[i32],
    coverage: Option<&str>,
) -> Result<()> {
    let handle = registry
        .load(module)
        .with_context(|| format!("Failed to load {}", module.display()))?;
    let state = registry
        .initialize(handle)
        .context("Failed to start simulation")?;

    let result = (|| -> Result<()> {
        if !args.is_empty() {
            registry
                .set_args(handle, &state, args)
                .context("Failed to pass arguments")?;
        }
        for &(signal, value) in pokes {
            registry.poke(handle, &state, signal, value)?;
        }
        let status = registry.step(handle, &state, cycles)?;
        println!("step({}) = {}", cycles, status);
        for &signal in peeks {
            let value = registry.peek(handle, &state, signal)?;
            println!("signal {} = {} (0x{:x})", signal, value, value);
        }
        if let Some(file) = coverage {
            registry
                .write_coverage(handle, &state, file)
                .context("Failed to write coverage")?;
        }
        Ok(())
    })();

    registry
        .finish(handle, state)
        .context("Failed to finish simulation")?;
    result
}
