//! The Tether lowering driver.
//!
//! Reads a bound program (JSON, as produced by the front end) and provides:
//!
//! - `tetherc check <program>` - Lower the program and report diagnostics only
//! - `tetherc lower <program>` - Print the lowered program (`--emit lir|json`)
//! - `tetherc run <program>` - Lower the program and run it on the reference runtime
//!
//! Options:
//! - `--strategy` - Suspension strategy (`state_machine` or `direct`)
//! - `--cleanup-failure` - What a failing disposal does to a pending exception
//! - `--config` - Path to a `tether.toml` with `[lower]` and `[run]` tables
//! - `--json` - Output diagnostics as JSON (one object per line)
//! - `--no-color` - Disable colorized output
//! - `-v` - Debug logging (`RUST_LOG` overrides)

mod config;

use std::path::{Path, PathBuf};
use std::process;

use clap::{Parser, Subcommand, ValueEnum};
use tracing_subscriber::EnvFilter;

use tether_bound::BoundProgram;
use tether_lower::diagnostics::{diagnostic_json, render_diagnostic, DiagnosticOptions};
use tether_lower::lir::LoweredProgram;
use tether_lower::{lower_program, CleanupFailurePolicy, LowerOptions, SuspensionStrategyKind};
use tether_rt::{run_program, Value};

use config::Config;

#[derive(Parser)]
#[command(name = "tetherc", version, about = "Lowers and runs bound Tether programs")]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Configuration file with [lower] and [run] tables
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Output diagnostics as JSON (one object per line) instead of human-readable format
    #[arg(long, global = true)]
    json: bool,

    /// Disable colorized output
    #[arg(long = "no-color", global = true)]
    no_color: bool,

    /// Enable debug logging
    #[arg(short, long, global = true)]
    verbose: bool,
}

/// Lowering settings that override the config file.
#[derive(clap::Args)]
struct LowerArgs {
    /// Suspension strategy: state_machine or direct
    #[arg(long)]
    strategy: Option<SuspensionStrategyKind>,

    /// Disposal failure while an exception is pending: replace or aggregate
    #[arg(long = "cleanup-failure")]
    cleanup_failure: Option<CleanupFailurePolicy>,
}

#[derive(Clone, Copy, ValueEnum)]
enum Emit {
    /// Pretty-printed lowered program
    Lir,
    /// The lowered program as JSON
    Json,
}

#[derive(Subcommand)]
enum Commands {
    /// Lower a bound program and report diagnostics
    Check {
        /// Path to the bound program (JSON)
        program: PathBuf,

        #[command(flatten)]
        lower: LowerArgs,
    },
    /// Print the lowered form of a bound program
    Lower {
        /// Path to the bound program (JSON)
        program: PathBuf,

        #[command(flatten)]
        lower: LowerArgs,

        /// Output format
        #[arg(long, value_enum, default_value = "lir")]
        emit: Emit,
    },
    /// Lower a bound program and run it
    Run {
        /// Path to the bound program (JSON)
        program: PathBuf,

        #[command(flatten)]
        lower: LowerArgs,

        /// Scheduler turns allowed before the run is abandoned
        #[arg(long = "max-turns")]
        max_turns: Option<usize>,
    },
}

fn main() {
    let cli = Cli::parse();

    let filter = if cli.verbose { "debug" } else { "warn" };
    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_ansi(!cli.no_color)
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(filter)),
        )
        .init();

    let diag_opts = DiagnosticOptions {
        color: !cli.no_color && !cli.json,
        json: cli.json,
    };

    if let Err(e) = dispatch(&cli, &diag_opts) {
        if cli.json {
            // In JSON mode, emit the final error as JSON too.
            let msg = serde_json::json!({
                "code": "C0001",
                "severity": "error",
                "message": e,
                "file": "",
                "spans": [],
                "fix": null
            });
            eprintln!("{}", msg);
        } else {
            eprintln!("error: {}", e);
        }
        process::exit(1);
    }
}

fn dispatch(cli: &Cli, diag_opts: &DiagnosticOptions) -> Result<(), String> {
    let config = Config::load(cli.config.as_deref())?;
    match &cli.command {
        Commands::Check { program, lower } => {
            let options = lower_options(&config, lower);
            let lowered = load_and_lower(program, &options, diag_opts)?;
            println!(
                "ok: {} routine(s) lowered ({})",
                lowered.routines.len(),
                lowered.strategy
            );
            Ok(())
        }
        Commands::Lower {
            program,
            lower,
            emit,
        } => {
            let options = lower_options(&config, lower);
            let lowered = load_and_lower(program, &options, diag_opts)?;
            match emit {
                Emit::Lir => print!("{}", lowered),
                Emit::Json => {
                    let json = serde_json::to_string_pretty(&lowered)
                        .map_err(|e| format!("Failed to serialize lowered program: {}", e))?;
                    println!("{}", json);
                }
            }
            Ok(())
        }
        Commands::Run {
            program,
            lower,
            max_turns,
        } => {
            let options = lower_options(&config, lower);
            let mut run_opts = config.run;
            if let Some(max_turns) = max_turns {
                run_opts.max_turns = *max_turns;
            }
            let lowered = load_and_lower(program, &options, diag_opts)?;
            let outcome = run_program(&lowered, &run_opts).map_err(|e| e.to_string())?;
            for line in &outcome.output {
                println!("{}", line);
            }
            match outcome.result {
                Ok(Value::Unit) => Ok(()),
                Ok(value) => {
                    tracing::info!(%value, "entry returned");
                    Ok(())
                }
                Err(exc) => Err(format!("uncaught exception {}", exc)),
            }
        }
    }
}

fn lower_options(config: &Config, args: &LowerArgs) -> LowerOptions {
    let mut options = config.lower;
    if let Some(strategy) = args.strategy {
        options.strategy = strategy;
    }
    if let Some(policy) = args.cleanup_failure {
        options.cleanup_failure = policy;
    }
    options
}

/// Load the bound program and lower it, reporting every lowering error.
fn load_and_lower(
    path: &Path,
    options: &LowerOptions,
    diag_opts: &DiagnosticOptions,
) -> Result<LoweredProgram, String> {
    let program = tether_bound::load_program_file(path).map_err(|e| e.to_string())?;
    match lower_program(&program, options) {
        Ok(lowered) => Ok(lowered),
        Err(errors) => {
            report_diagnostics(&program, path, &errors, diag_opts);
            Err(format!("Lowering failed with {} error(s).", errors.len()))
        }
    }
}

/// Report lowering diagnostics to stderr.
///
/// When `diag_opts.json` is true, outputs one JSON object per line.
/// Otherwise, outputs colorized (or colorless) human-readable diagnostics.
fn report_diagnostics(
    program: &BoundProgram,
    path: &Path,
    errors: &[tether_lower::LowerError],
    diag_opts: &DiagnosticOptions,
) {
    let file_name = program
        .file
        .clone()
        .unwrap_or_else(|| path.display().to_string());
    for error in errors {
        if diag_opts.json {
            eprintln!("{}", diagnostic_json(error, program.source.as_deref(), &file_name));
        } else {
            eprint!(
                "{}",
                render_diagnostic(error, program.source.as_deref(), &file_name, diag_opts)
            );
        }
    }
}
