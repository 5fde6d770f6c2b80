// src/main.rs

//! The main entry point for the brokerd server application.

use anyhow::Result;
use brokerd::config::Config;
use brokerd::core::BrokerError;
use brokerd::core::auth::hash_password;
use brokerd::server;
use std::env;
use tracing::error;
use tracing_subscriber::{filter::EnvFilter, prelude::*};

#[tokio::main]
async fn main() -> Result<()> {
    const VERSION: &str = env!("CARGO_PKG_VERSION");

    let args: Vec<String> = env::args().collect();

    if args.contains(&"--version".to_string()) {
        println!("brokerd version {VERSION}");
        return Ok(());
    }

    // Prints a password hash for the `users` section of the config.
    if let Some(i) = args.iter().position(|arg| arg == "--hash-password") {
        let Some(password) = args.get(i + 1) else {
            eprintln!("Usage: brokerd --hash-password <password>");
            std::process::exit(1);
        };
        println!("{}", hash_password(password)?);
        return Ok(());
    }

    // It can be provided via a --config flag; otherwise, it defaults to "config.toml".
    let config_path = args
        .iter()
        .position(|arg| arg == "--config")
        .and_then(|i| args.get(i + 1))
        .map(|s| s.as_str())
        .unwrap_or("config.toml");

    // The server cannot run without a valid configuration.
    let mut config = match Config::from_file(config_path) {
        Ok(cfg) => cfg,
        Err(e) => {
            eprintln!("Failed to load configuration from \"{config_path}\": {e:#}");
            std::process::exit(1);
        }
    };

    if let Some(port_index) = args.iter().position(|arg| arg == "--port") {
        if let Some(port_str) = args.get(port_index + 1) {
            match port_str.parse::<u16>() {
                Ok(port) if port != 0 => config.port = port,
                _ => {
                    eprintln!("Invalid port number: {port_str}");
                    std::process::exit(1);
                }
            }
        } else {
            eprintln!("--port flag requires a value");
            std::process::exit(1);
        }
    }

    let log_level = std::env::var("RUST_LOG").unwrap_or_else(|_| config.log_level.clone());
    tracing_subscriber::registry()
        .with(EnvFilter::new(log_level))
        .with(
            tracing_subscriber::fmt::layer()
                .compact() // Use the compact, single-line format.
                .with_ansi(true),
        )
        .init();

    if let Err(e) = server::run(config).await {
        // Bind failures are already logged with their address by the acceptor.
        if !matches!(e.downcast_ref::<BrokerError>(), Some(BrokerError::Bind { .. })) {
            error!("Server runtime error: {:#}", e);
        }
        std::process::exit(1);
    }

    Ok(())
}
