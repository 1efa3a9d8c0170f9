// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! parlord: hosts sandboxed interactive rooms behind WebSocket pages.

use std::path::PathBuf;
use std::process::ExitCode;

use clap::Parser;
use parlor_core::config::ServerConfig;
use tracing::error;

#[derive(Parser)]
#[command(
    name = "parlord",
    about = "Hosts sandboxed interactive rooms behind WebSocket pages",
    version
)]
struct Args {
    /// Path to the JSON configuration file.
    configuration: PathBuf,
}

#[tokio::main]
async fn main() -> ExitCode {
    let args = Args::parse();

    let raw = match std::fs::read_to_string(&args.configuration) {
        Ok(raw) => raw,
        Err(read_error) => {
            eprintln!("error: failed to read {}: {}", args.configuration.display(), read_error);
            return ExitCode::FAILURE;
        }
    };
    let config = match ServerConfig::from_json(&raw) {
        Ok(config) => config,
        Err(config_error) => {
            eprintln!("error: {config_error}");
            return ExitCode::FAILURE;
        }
    };

    init_tracing(config.logging_level.as_deref());

    if let Err(server_error) = parlor_daemon::run(config).await {
        error!(error = %server_error, "server failed");
        eprintln!("error: {server_error}");
        return ExitCode::FAILURE;
    }
    ExitCode::SUCCESS
}

/// `RUST_LOG` wins; the configured `logging_level` is the default.
fn init_tracing(level: Option<&str>) {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .or_else(|_| tracing_subscriber::EnvFilter::try_new(level.unwrap_or("info")))
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info"));
    tracing_subscriber::fmt().with_env_filter(filter).init();
}
