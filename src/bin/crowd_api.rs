//! crowd_api - read-only train status service
//!
//! This daemon:
//! 1. Serves `/trains` and `/train/{id}/status` from the mapping or state document
//! 2. Serves the frontend bundle for every other path
//! 3. Never writes either document

use anyhow::Result;
use clap::Parser;
use std::path::PathBuf;
use std::sync::mpsc;

use coach_crowd::api::{ApiConfig, ApiServer};
use coach_crowd::CrowdConfig;

#[derive(Parser, Debug)]
#[command(author, version, about)]
struct Args {
    /// Listen address (defaults to the configured api addr).
    #[arg(long)]
    addr: Option<String>,
    /// Frontend directory (defaults to the configured static_dir).
    #[arg(long)]
    static_dir: Option<PathBuf>,
}

fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let args = Args::parse();
    let config = CrowdConfig::load()?;
    let static_dir = args
        .static_dir
        .unwrap_or_else(|| config.paths.static_dir.clone());
    if !static_dir.is_dir() {
        log::warn!(
            "frontend directory {} not found; only API routes will answer",
            static_dir.display()
        );
    }

    let api_config = ApiConfig {
        addr: args.addr.unwrap_or_else(|| config.api_addr.clone()),
        static_dir: Some(static_dir),
    };
    let sources = config.data_sources();
    log::info!("serving train status from {}", sources.describe());
    let api_handle = ApiServer::new(api_config, sources).spawn()?;
    log::info!("train api listening on {}", api_handle.addr);

    let (tx, rx) = mpsc::channel();
    ctrlc::set_handler(move || {
        let _ = tx.send(());
    })
    .expect("error setting Ctrl-C handler");

    log::info!("crowd_api waiting for shutdown signal (Ctrl-C)...");
    let _ = rx.recv();
    log::info!("shutdown signal received, stopping API server...");
    api_handle.stop()?;

    Ok(())
}
