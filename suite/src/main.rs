//! Test-suite driver for the survey cleaning pipeline.
//!
//! Loads a suite file, resolves the project root and engine for this machine,
//! runs every check, and writes an HTML report plus a CSV table.

mod checks;
mod cli;
mod suite;

use std::env;
use std::path::PathBuf;

use anyhow::{Context, Result};
use chrono::Utc;
use clap::{Parser, Subcommand};
use harness::exit_codes;
use harness::io::config::{CONFIG_FILE_NAME, load_config};
use harness::io::discovery::{current_username, resolve_root};
use harness::logging;

use crate::cli::Setup;

#[derive(Parser)]
#[command(
    name = "suite",
    version,
    about = "Run the cleaning pipeline test suite and report results"
)]
struct Cli {
    /// Project root (default: config, then per-user table, then cwd).
    #[arg(long, global = true)]
    root: Option<PathBuf>,
    /// Harness config file.
    #[arg(long, global = true)]
    config: Option<PathBuf>,
    /// Engine executable, overriding config and discovery.
    #[arg(long, global = true)]
    engine: Option<String>,
    /// Skip every check that needs the engine.
    #[arg(long, global = true)]
    skip_engine: bool,
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Run the suite and write reports.
    Run {
        #[arg(long)]
        suite: Option<PathBuf>,
        /// Comma-separated check names to run.
        #[arg(long, value_delimiter = ',')]
        only: Vec<String>,
    },
    /// List the checks in the suite.
    List {
        #[arg(long)]
        suite: Option<PathBuf>,
    },
    /// Show the resolved root and engine.
    Detect,
    /// Print the records found in a saved output file.
    Extract {
        file: PathBuf,
        #[arg(long)]
        category: Option<String>,
        #[arg(long)]
        json: bool,
    },
}

fn main() {
    let code = match run() {
        Ok(code) => code,
        Err(err) => {
            eprintln!("{:#}", err);
            exit_codes::INVALID
        }
    };
    std::process::exit(code);
}

fn run() -> Result<i32> {
    let cli = Cli::parse();

    if let Command::Extract {
        file,
        category,
        json,
    } = &cli.command
    {
        logging::init("warn", None)?;
        cli::extract_file(file, category.as_deref(), *json)?;
        return Ok(exit_codes::OK);
    }

    let cwd = env::current_dir().context("read current directory")?;
    let config_path = cli
        .config
        .clone()
        .unwrap_or_else(|| cwd.join(CONFIG_FILE_NAME));
    let config = load_config(&config_path)?;
    let username = current_username();
    let root = resolve_root(cli.root.as_deref(), &config, username.as_deref(), &cwd)?;

    let log_file = matches!(cli.command, Command::Run { .. }).then(|| {
        root.join(&config.project.log_dir).join(format!(
            "test_run_{}.log",
            Utc::now().format("%Y%m%d_%H%M%S")
        ))
    });
    logging::init("info", log_file.as_deref())?;

    let setup = Setup {
        skip_engine: cli.skip_engine || config.engine.skip,
        root,
        config,
        username,
        cli_engine: cli.engine,
    };

    match cli.command {
        Command::Run { suite, only } => cli::run_suite(&setup, suite.as_deref(), &only),
        Command::List { suite } => {
            cli::list_checks(&setup, suite.as_deref())?;
            Ok(exit_codes::OK)
        }
        Command::Detect => {
            cli::detect(&setup)?;
            Ok(exit_codes::OK)
        }
        Command::Extract { .. } => Ok(exit_codes::OK),
    }
}
