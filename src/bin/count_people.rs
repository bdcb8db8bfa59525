//! count_people - run person detection over the image library
//!
//! Writes the results table (`image -> {count, label}`) consumed by
//! `init_state`, `simulator` and `generate_mapping`.

use anyhow::{anyhow, Result};
use clap::Parser;
use std::io::IsTerminal;
use std::path::PathBuf;

use coach_crowd::detect::{count_images, DetectorBackend, StubBackend};
use coach_crowd::images::list_images;
use coach_crowd::CrowdConfig;

#[path = "../ui.rs"]
mod ui;

#[derive(Parser, Debug)]
#[command(author, version, about)]
struct Args {
    /// Directory of coach photographs (defaults to the configured images_dir).
    #[arg(long)]
    images_dir: Option<PathBuf>,
    /// Output path for the results table (defaults to the configured results path).
    #[arg(long)]
    output: Option<PathBuf>,
    /// Detector backend (stub|tract).
    #[arg(long)]
    backend: Option<String>,
    /// ONNX model used by the tract backend.
    #[arg(long)]
    model: Option<PathBuf>,
    /// Minimum person confidence for the tract backend.
    #[arg(long)]
    confidence: Option<f32>,
    /// UI mode for stderr progress (auto|plain|pretty)
    #[arg(long, default_value = "auto", value_name = "MODE")]
    ui: String,
}

fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let args = Args::parse();
    let is_tty = std::io::stderr().is_terminal();
    let stdout_is_tty = std::io::stdout().is_terminal();
    let ui = ui::Ui::from_args(Some(&args.ui), is_tty, !stdout_is_tty);

    let mut config = CrowdConfig::load()?;
    if let Some(backend) = args.backend {
        config.detection.backend = backend;
    }
    if let Some(model) = args.model {
        config.detection.model_path = model;
    }
    if let Some(confidence) = args.confidence {
        config.detection.confidence = confidence;
    }
    config.detection.validate()?;
    let images_dir = args.images_dir.unwrap_or(config.paths.images_dir.clone());
    let output = args.output.unwrap_or(config.paths.results.clone());

    let images = {
        let _stage = ui.stage("List images");
        list_images(&images_dir)?
    };
    if images.is_empty() {
        log::warn!("no images found in {}", images_dir.display());
    }

    let mut backend = {
        let _stage = ui.stage("Load detector");
        build_backend(&config)?
    };
    backend.warm_up()?;
    log::info!(
        "counting {} images in {} with the {} backend",
        images.len(),
        images_dir.display(),
        backend.name()
    );

    let table = {
        let mut progress = ui.progress(images.len() as u64);
        let mut report = |name: &str, count: Option<u32>| progress.item(name, count);
        count_images(
            backend.as_mut(),
            &images_dir,
            &images,
            config.layout.thresholds,
            &mut report,
        )
    };

    {
        let _stage = ui.stage("Write results");
        table.save(&output)?;
    }
    let skipped = images.len() - table.len();
    if skipped > 0 {
        log::warn!("{} images could not be counted", skipped);
    }
    log::info!("wrote {} counts to {}", table.len(), output.display());
    Ok(())
}

fn build_backend(config: &CrowdConfig) -> Result<Box<dyn DetectorBackend>> {
    match config.detection.backend.as_str() {
        "stub" => Ok(Box::new(StubBackend::new())),
        "tract" => build_tract(config),
        other => Err(anyhow!("unknown detector backend '{}' (stub|tract)", other)),
    }
}

#[cfg(feature = "backend-tract")]
fn build_tract(config: &CrowdConfig) -> Result<Box<dyn DetectorBackend>> {
    use coach_crowd::detect::{TractBackend, YoloParams};

    let params = YoloParams {
        input_size: config.detection.input_size,
        confidence_threshold: config.detection.confidence,
        iou_threshold: config.detection.iou,
        max_detections: config.detection.max_detections,
    };
    Ok(Box::new(TractBackend::new(&config.detection.model_path, params)?))
}

#[cfg(not(feature = "backend-tract"))]
fn build_tract(_config: &CrowdConfig) -> Result<Box<dyn DetectorBackend>> {
    Err(anyhow!(
        "the tract backend requires building with --features backend-tract"
    ))
}
