//! toolrunner - JSON API that runs configured CLI tools as asynchronous jobs.
//!
//! Usage:
//!   toolrunner serve [--port 8450] [--mode demo|live]
//!
//! Modes:
//! - demo (default): simulated jobs with downloadable sample artifacts
//! - live: runs the configured CLI tools as real subprocesses

#[cfg(not(unix))]
compile_error!("toolrunner only runs on Unix platforms.");

mod artifacts;
mod config;
mod demo;
mod http_server;
mod job;
mod ratelimit;
mod runner;
mod state;
mod tools;

use clap::{Parser, Subcommand};

use crate::config::{Config, Mode};
use crate::state::AppState;

#[derive(Parser, Debug)]
#[command(name = "toolrunner")]
#[command(about = "JSON API that runs configured CLI tools as async jobs")]
struct Args {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Start the HTTP server
    Serve {
        /// Port to listen on (overrides PORT / TOOLRUNNER_PORT)
        #[arg(long)]
        port: Option<u16>,

        /// demo or live (overrides TOOLRUNNER_MODE)
        #[arg(long)]
        mode: Option<Mode>,
    },
}

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt::init();

    let args = Args::parse();
    let Commands::Serve { port, mode } = args.command;

    let mut config = Config::from_env();
    if let Some(port) = port {
        config.port = port;
    }
    if let Some(mode) = mode {
        config.mode = mode;
    }

    if let Err(e) = std::fs::create_dir_all(&config.artifact_root) {
        eprintln!(
            "Error: cannot create artifact root {}: {e}",
            config.artifact_root.display()
        );
        std::process::exit(1);
    }

    http_server::run_server(AppState::new(config)).await;
}
