//! init_state - assign image pools to every coach and write the state document

use anyhow::{anyhow, Result};
use chrono::Utc;
use clap::Parser;
use rand::rngs::StdRng;
use rand::SeedableRng;
use std::path::PathBuf;

use coach_crowd::images::list_images;
use coach_crowd::{CrowdConfig, ResultsTable, State, StateStore};

#[derive(Parser, Debug)]
#[command(author, version, about)]
struct Args {
    /// Draw pools from this directory listing (defaults to the configured images_dir).
    #[arg(long, conflicts_with = "images_from_results")]
    images_dir: Option<PathBuf>,
    /// Draw pools from the images present in the results table instead of a directory.
    #[arg(long)]
    images_from_results: bool,
    /// Output path for the state document (defaults to the configured state path).
    #[arg(long)]
    output: Option<PathBuf>,
    /// Seed for pool selection (defaults to the configured seed).
    #[arg(long, conflicts_with = "unseeded")]
    seed: Option<u64>,
    /// Draw pools from OS entropy.
    #[arg(long)]
    unseeded: bool,
}

fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let args = Args::parse();
    let config = CrowdConfig::load()?;

    let results = ResultsTable::load(&config.paths.results)?;
    let images = if args.images_from_results {
        results.images()
    } else {
        let dir = args
            .images_dir
            .unwrap_or_else(|| config.paths.images_dir.clone());
        let images = list_images(&dir)?;
        log::info!("found {} images in {}", images.len(), dir.display());
        images
    };
    if images.is_empty() {
        return Err(anyhow!("no images available to assign to coaches"));
    }

    let seed = if args.unseeded {
        None
    } else {
        args.seed.or(config.seed)
    };
    let mut rng = match seed {
        Some(seed) => StdRng::seed_from_u64(seed),
        None => StdRng::from_entropy(),
    };

    let mut state = State::initialize(&config.layout, &images, &results, &mut rng, Utc::now())?;
    let store = match args.output {
        Some(path) => StateStore::new(path),
        None => config.state_store(),
    };
    store.save(&mut state, Utc::now())?;

    match seed {
        Some(seed) => log::info!("pools drawn with seed {}", seed),
        None => log::info!("pools drawn from OS entropy"),
    }
    log::info!(
        "initialized {} trains / {} coaches -> {}",
        state.trains.len(),
        state.coach_count(),
        store.path().display()
    );
    Ok(())
}
