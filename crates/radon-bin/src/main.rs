//! `radon`: parallel-beam filtered back-projection reconstruction.
//!
//! Usage: `radon [options] <config-file>`. The configuration file drives
//! everything; see the `core-config` crate for the recognised sections and
//! keys. Exit codes: 0 success, 1 configuration error, 2 runtime (input
//! data, I/O or reconstruction) error, 3 unknown error.

use std::path::PathBuf;
use std::process::ExitCode;

use clap::Parser;
use core_config::{ConfigError, ResolvedConfig};
use tracing::error;
use tracing_subscriber::EnvFilter;

const EXIT_CONFIG: u8 = 1;
const EXIT_RUNTIME: u8 = 2;
const EXIT_UNKNOWN: u8 = 3;

#[derive(Debug, Parser)]
#[command(
    name = "radon",
    version,
    about = "Parallel-beam filtered back-projection CT reconstruction"
)]
struct Cli {
    /// Path to the reconstruction configuration file.
    config_file: PathBuf,

    /// Print the complete resolved configuration and exit.
    #[arg(short = 'c', long = "config")]
    dump_config: bool,
}

fn main() -> ExitCode {
    // RADON_LOG=debug (or any EnvFilter directive) turns up the detail;
    // the default keeps one line per pipeline stage.
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_env("RADON_LOG").unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    println!("radon {}", env!("CARGO_PKG_VERSION"));

    let config = match ResolvedConfig::load(&cli.config_file) {
        Ok(config) => config,
        Err(e) => {
            error!(target: "radon", error = %e, "configuration failed");
            eprintln!("{e}");
            return ExitCode::from(match e {
                ConfigError::InputData(_) => EXIT_RUNTIME,
                _ => EXIT_CONFIG,
            });
        }
    };

    println!("\nComplete configuration:");
    println!("--------------------------------------------------------------------");
    println!("{config}");
    println!("--------------------------------------------------------------------");
    if cli.dump_config {
        return ExitCode::SUCCESS;
    }

    match std::panic::catch_unwind(|| core_runner::launch(&config)) {
        Ok(Ok(())) => ExitCode::SUCCESS,
        Ok(Err(e)) => {
            error!(target: "radon", error = %e, "reconstruction failed");
            eprintln!("{e}");
            ExitCode::from(EXIT_RUNTIME)
        }
        Err(_) => {
            eprintln!("unknown error: reconstruction panicked");
            ExitCode::from(EXIT_UNKNOWN)
        }
    }
}
