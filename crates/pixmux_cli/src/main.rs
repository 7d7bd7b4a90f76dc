//! pixmux - headless driver for the composition engine
//!
//! Runs JSON scenarios against the software device and prints a report of
//! pool occupancy and device activity:
//!
//! ```text
//! pixmux run --config pixmux.toml scenarios/smoke.json
//! pixmux config --config pixmux.toml
//! ```

mod config;
mod report;
mod runner;
mod scenario;

use anyhow::Result;
use clap::{Parser, Subcommand};
use config::PixmuxConfig;
use runner::Runner;
use scenario::Scenario;
use std::path::{Path, PathBuf};
use tracing_subscriber::EnvFilter;

/// Headless driver for the pixmux composition engine
#[derive(Parser, Debug)]
#[command(name = "pixmux")]
#[command(about = "Run composition and video scenarios on a software device")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Run a scenario and print its report
    Run {
        /// Configuration file
        #[arg(short, long)]
        config: Option<PathBuf>,

        /// Scenario file (JSON)
        scenario: PathBuf,

        /// Also write the report to this file
        #[arg(short, long)]
        report: Option<PathBuf>,
    },
    /// Print the resolved configuration
    Config {
        /// Configuration file
        #[arg(short, long)]
        config: Option<PathBuf>,
    },
}

fn load_config(path: Option<&Path>) -> Result<PixmuxConfig> {
    match path {
        Some(path) => PixmuxConfig::load(path),
        None => Ok(PixmuxConfig::default()),
    }
}

fn init_logging(debug: bool) {
    let default = if debug { "debug" } else { "info" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    match cli.command {
        Command::Run {
            config,
            scenario,
            report,
        } => {
            let config = load_config(config.as_deref())?;
            init_logging(config.accel.debug);

            let scenario = Scenario::from_path(&scenario)?;
            tracing::info!("running {} steps", scenario.steps.len());

            let mut runner = Runner::new(&config)?;
            let outcome = runner.run(&scenario);
            let run_report = runner.report();
            runner.shutdown();

            run_report.write_to_writer(&mut std::io::stdout().lock())?;
            if let Some(path) = report {
                run_report.write_to_path(&path)?;
            }
            outcome
        }
        Command::Config { config } => {
            let config = load_config(config.as_deref())?;
            print!("{}", config.to_toml()?);
            Ok(())
        }
    }
}
