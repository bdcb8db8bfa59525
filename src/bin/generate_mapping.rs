//! generate_mapping - write the alternate train mapping document
//!
//! When present, the API serves this document in preference to the state
//! document. With `--interval` or `--rounds` the document is redrawn on a
//! timer until Ctrl-C, so the served mapping keeps changing.

use anyhow::Result;
use clap::Parser;
use rand::rngs::StdRng;
use rand::SeedableRng;
use std::path::PathBuf;
use std::time::Duration;

use coach_crowd::mapping::{MappingRefresher, MappingShape, DEFAULT_REFRESH_INTERVAL};
use coach_crowd::{shutdown_channel, CrowdConfig, ResultsTable, RotationSettings};

#[derive(Parser, Debug)]
#[command(author, version, about)]
struct Args {
    /// Document shape (keyed|listed).
    #[arg(long, default_value = "listed")]
    shape: MappingShape,
    /// Output path (defaults to the configured mapping path).
    #[arg(long)]
    output: Option<PathBuf>,
    /// Seed for image selection (defaults to the configured seed).
    #[arg(long, conflicts_with = "unseeded")]
    seed: Option<u64>,
    /// Draw images from OS entropy.
    #[arg(long)]
    unseeded: bool,
    /// Regenerate every this many seconds (default 30 when only --rounds is given).
    #[arg(long, value_parser = clap::value_parser!(u64).range(1..))]
    interval: Option<u64>,
    /// Stop refreshing after this many rounds.
    #[arg(long)]
    rounds: Option<u64>,
}

fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let args = Args::parse();
    let config = CrowdConfig::load()?;
    let results = ResultsTable::load(&config.paths.results)?;

    let seed = if args.unseeded {
        None
    } else {
        args.seed.or(config.seed)
    };
    let rng = match seed {
        Some(seed) => StdRng::seed_from_u64(seed),
        None => StdRng::from_entropy(),
    };

    let output = args.output.unwrap_or_else(|| config.paths.mapping.clone());
    let periodic = args.interval.is_some() || args.rounds.is_some();
    let interval = args
        .interval
        .map(Duration::from_secs)
        .unwrap_or(DEFAULT_REFRESH_INTERVAL);
    let mut refresher = MappingRefresher::new(
        output,
        args.shape,
        config.layout.clone(),
        results,
        RotationSettings {
            interval,
            rounds: args.rounds,
        },
        rng,
    );

    if !periodic {
        refresher.refresh()?;
        log::info!(
            "wrote {:?} mapping for {} trains to {}",
            args.shape,
            config.layout.trains,
            refresher.path().display()
        );
        return Ok(());
    }

    let (trigger, mut signal) = shutdown_channel();
    ctrlc::set_handler(move || {
        trigger.fire();
    })
    .expect("error setting Ctrl-C handler");

    log::info!(
        "refreshing {:?} mapping in {} every {}s (Ctrl-C to stop)",
        args.shape,
        refresher.path().display(),
        interval.as_secs()
    );
    let summary = refresher.run(&mut signal);
    log::info!(
        "mapping refresher stopped after {} rounds ({} failed)",
        summary.rounds,
        summary.failed_saves
    );
    Ok(())
}
