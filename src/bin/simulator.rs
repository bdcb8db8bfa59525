//! simulator - rotate every coach through its image pool on a fixed interval
//!
//! This daemon:
//! 1. Loads the results table and the state document
//! 2. Rotates immediately, then once per interval
//! 3. Rewrites the state document atomically after each round
//! 4. Stops on Ctrl-C or after `--rounds`

use anyhow::Result;
use clap::Parser;
use std::sync::Arc;
use std::time::Duration;

use coach_crowd::{
    shutdown_channel, CrowdConfig, ResultsTable, RotationLoop, RotationSettings, SystemClock,
};

#[derive(Parser, Debug)]
#[command(author, version, about)]
struct Args {
    /// Seconds between rotations (defaults to the configured interval).
    #[arg(long, value_parser = clap::value_parser!(u64).range(1..))]
    interval: Option<u64>,
    /// Stop after this many rounds instead of running until Ctrl-C.
    #[arg(long)]
    rounds: Option<u64>,
}

fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let args = Args::parse();
    let config = CrowdConfig::load()?;
    let interval = args
        .interval
        .map(Duration::from_secs)
        .unwrap_or(config.rotation_interval);

    let results = ResultsTable::load(&config.paths.results)?;
    let store = config.state_store();
    let mut state = store.load()?;
    log::info!(
        "loaded {} trains / {} coaches from {}",
        state.trains.len(),
        state.coach_count(),
        store.path().display()
    );

    let (trigger, mut signal) = shutdown_channel();
    ctrlc::set_handler(move || {
        trigger.fire();
    })
    .expect("error setting Ctrl-C handler");

    let rotation = RotationLoop::new(
        store,
        results,
        Arc::new(SystemClock),
        RotationSettings {
            interval,
            rounds: args.rounds,
        },
    );
    log::info!(
        "simulator running, rotating every {}s (Ctrl-C to stop)",
        interval.as_secs()
    );
    let summary = rotation.run(&mut state, &mut signal);

    if summary.cancelled {
        log::info!("shutdown signal received");
    }
    log::info!(
        "simulator stopped after {} rounds ({} failed saves)",
        summary.rounds,
        summary.failed_saves
    );
    Ok(())
}
