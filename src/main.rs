// SPDX-License-Identifier: GPL-3.0-only

use clap::{Parser, Subcommand};
use qrcam::Config;

mod cli;

#[derive(Parser)]
#[command(name = "qrcam")]
#[command(about = "Scan QR codes from the default camera")]
#[command(version = env!("GIT_VERSION"))]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Open the camera and print every QR code it sees
    Scan {
        /// Milliseconds between decode attempts (default from config, else 1000)
        #[arg(short, long)]
        interval_ms: Option<u64>,

        /// Preview height in pixels
        #[arg(long)]
        height: Option<u32>,

        /// Also open the microphone and route it through the low-pass filter
        #[arg(short, long)]
        audio: bool,

        /// Stop after this many seconds
        #[arg(short, long)]
        timeout: Option<u64>,

        /// Exit after the first decoded code
        #[arg(long)]
        once: bool,
    },

    /// Check that a camera stream can be acquired
    Probe {
        /// Seconds to wait for the first frame
        #[arg(short, long, default_value = "10")]
        timeout: u64,
    },
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Initialize logging
    // Set RUST_LOG environment variable to control log level
    // Examples: RUST_LOG=debug, RUST_LOG=qrcam=debug, RUST_LOG=info
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("warn")),
        )
        .with_target(true)
        .with_level(true)
        .init();

    let cli = Cli::parse();
    let config = Config::load()?;
    let runtime = tokio::runtime::Runtime::new()?;

    match cli.command {
        Commands::Scan {
            interval_ms,
            height,
            audio,
            timeout,
            once,
        } => runtime.block_on(cli::scan(
            &config,
            cli::ScanArgs {
                interval_ms,
                height,
                audio,
                timeout,
                once,
            },
        )),
        Commands::Probe { timeout } => runtime.block_on(cli::probe(&config, timeout)),
    }
}
