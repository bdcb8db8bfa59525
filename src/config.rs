use anyhow::{anyhow, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::classify::{Thresholds, DEFAULT_CAPACITY, DEFAULT_EMPTY_MAX, DEFAULT_MODERATE_MAX};
use crate::query::DataSources;
use crate::state::{
    Layout, RosterEntry, DEFAULT_COACHES_PER_TRAIN, DEFAULT_POOL_SIZE, DEFAULT_TRAINS,
};
use crate::storage::StateStore;

const DEFAULT_RESULTS_PATH: &str = "data/results.json";
const DEFAULT_STATE_PATH: &str = "data/state.json";
const DEFAULT_MAPPING_PATH: &str = "data/train_data.json";
const DEFAULT_IMAGES_DIR: &str = "datasets/crowd_dataset/images";
const DEFAULT_STATIC_DIR: &str = "frontend";
const DEFAULT_API_ADDR: &str = "127.0.0.1:5000";
const DEFAULT_SEED: u64 = 42;
const DEFAULT_ROTATION_INTERVAL_SECS: u64 = 240;
const DEFAULT_DETECTOR_BACKEND: &str = "stub";
const DEFAULT_MODEL_PATH: &str = "detection/yolov8n.onnx";
const DEFAULT_CONFIDENCE: f32 = 0.25;
const DEFAULT_IOU: f32 = 0.45;
const DEFAULT_INPUT_SIZE: u32 = 640;
const DEFAULT_MAX_DETECTIONS: usize = 300;

#[derive(Debug, Deserialize, Default)]
struct CrowdConfigFile {
    paths: Option<PathsConfigFile>,
    api: Option<ApiConfigFile>,
    layout: Option<LayoutConfigFile>,
    rotation: Option<RotationConfigFile>,
    detection: Option<DetectionConfigFile>,
}

#[derive(Debug, Deserialize, Default)]
struct PathsConfigFile {
    results: Option<PathBuf>,
    state: Option<PathBuf>,
    mapping: Option<PathBuf>,
    images_dir: Option<PathBuf>,
    static_dir: Option<PathBuf>,
}

#[derive(Debug, Deserialize, Default)]
struct ApiConfigFile {
    addr: Option<String>,
}

#[derive(Debug, Deserialize, Default)]
struct LayoutConfigFile {
    trains: Option<u32>,
    coaches_per_train: Option<u32>,
    pool_size: Option<usize>,
    capacity: Option<u32>,
    empty_max: Option<u32>,
    moderate_max: Option<u32>,
    seed: Option<u64>,
    unseeded: Option<bool>,
    roster: Option<Vec<RosterEntry>>,
}

#[derive(Debug, Deserialize, Default)]
struct RotationConfigFile {
    interval_secs: Option<u64>,
}

#[derive(Debug, Deserialize, Default)]
struct DetectionConfigFile {
    backend: Option<String>,
    model_path: Option<PathBuf>,
    confidence: Option<f32>,
    iou: Option<f32>,
    input_size: Option<u32>,
    max_detections: Option<usize>,
}

#[derive(Debug, Clone)]
pub struct CrowdConfig {
    pub paths: PathSettings,
    pub api_addr: String,
    pub layout: Layout,
    /// `None` draws pools from OS entropy.
    pub seed: Option<u64>,
    pub rotation_interval: Duration,
    pub detection: DetectionSettings,
}

#[derive(Debug, Clone)]
pub struct PathSettings {
    pub results: PathBuf,
    pub state: PathBuf,
    pub mapping: PathBuf,
    pub images_dir: PathBuf,
    pub static_dir: PathBuf,
}

#[derive(Debug, Clone)]
pub struct DetectionSettings {
    pub backend: String,
    pub model_path: PathBuf,
    pub confidence: f32,
    pub iou: f32,
    pub input_size: u32,
    pub max_detections: usize,
}

impl DetectionSettings {
    /// Re-run after command-line overrides; normalizes the backend name.
    pub fn validate(&mut self) -> Result<()> {
        for (name, value) in [("confidence", self.confidence), ("iou", self.iou)] {
            if !(value > 0.0 && value <= 1.0) {
                return Err(anyhow!("detection {} must be in (0, 1], got {}", name, value));
            }
        }
        if self.input_size == 0 {
            return Err(anyhow!("detection input_size must be greater than zero"));
        }
        self.backend = self.backend.trim().to_lowercase();
        Ok(())
    }
}

impl CrowdConfig {
    pub fn load() -> Result<Self> {
        let config_path = std::env::var("CROWD_CONFIG").ok();
        let file_cfg = match config_path.as_deref() {
            Some(path) if !path.trim().is_empty() => Some(read_config_file(Path::new(path))?),
            _ => None,
        };
        let mut cfg = Self::from_file(file_cfg.unwrap_or_default());
        cfg.apply_env()?;
        cfg.validate()?;
        Ok(cfg)
    }

    fn from_file(file: CrowdConfigFile) -> Self {
        let paths = file.paths.unwrap_or_default();
        let layout = file.layout.unwrap_or_default();
        let detection = file.detection.unwrap_or_default();

        let seed = if layout.unseeded.unwrap_or(false) {
            None
        } else {
            Some(layout.seed.unwrap_or(DEFAULT_SEED))
        };

        Self {
            paths: PathSettings {
                results: paths
                    .results
                    .unwrap_or_else(|| PathBuf::from(DEFAULT_RESULTS_PATH)),
                state: paths
                    .state
                    .unwrap_or_else(|| PathBuf::from(DEFAULT_STATE_PATH)),
                mapping: paths
                    .mapping
                    .unwrap_or_else(|| PathBuf::from(DEFAULT_MAPPING_PATH)),
                images_dir: paths
                    .images_dir
                    .unwrap_or_else(|| PathBuf::from(DEFAULT_IMAGES_DIR)),
                static_dir: paths
                    .static_dir
                    .unwrap_or_else(|| PathBuf::from(DEFAULT_STATIC_DIR)),
            },
            api_addr: file
                .api
                .and_then(|api| api.addr)
                .unwrap_or_else(|| DEFAULT_API_ADDR.to_string()),
            layout: Layout {
                trains: layout.trains.unwrap_or(DEFAULT_TRAINS),
                coaches_per_train: layout.coaches_per_train.unwrap_or(DEFAULT_COACHES_PER_TRAIN),
                pool_size: layout.pool_size.unwrap_or(DEFAULT_POOL_SIZE),
                capacity: layout.capacity.unwrap_or(DEFAULT_CAPACITY),
                thresholds: Thresholds {
                    empty_max: layout.empty_max.unwrap_or(DEFAULT_EMPTY_MAX),
                    moderate_max: layout.moderate_max.unwrap_or(DEFAULT_MODERATE_MAX),
                },
                roster: layout.roster.unwrap_or_default(),
            },
            seed,
            rotation_interval: Duration::from_secs(
                file.rotation
                    .and_then(|rotation| rotation.interval_secs)
                    .unwrap_or(DEFAULT_ROTATION_INTERVAL_SECS),
            ),
            detection: DetectionSettings {
                backend: detection
                    .backend
                    .unwrap_or_else(|| DEFAULT_DETECTOR_BACKEND.to_string()),
                model_path: detection
                    .model_path
                    .unwrap_or_else(|| PathBuf::from(DEFAULT_MODEL_PATH)),
                confidence: detection.confidence.unwrap_or(DEFAULT_CONFIDENCE),
                iou: detection.iou.unwrap_or(DEFAULT_IOU),
                input_size: detection.input_size.unwrap_or(DEFAULT_INPUT_SIZE),
                max_detections: detection.max_detections.unwrap_or(DEFAULT_MAX_DETECTIONS),
            },
        }
    }

    fn apply_env(&mut self) -> Result<()> {
        if let Some(addr) = non_empty_env("CROWD_API_ADDR") {
            self.api_addr = addr;
        }
        if let Some(path) = non_empty_env("CROWD_RESULTS_PATH") {
            self.paths.results = PathBuf::from(path);
        }
        if let Some(path) = non_empty_env("CROWD_STATE_PATH") {
            self.paths.state = PathBuf::from(path);
        }
        if let Some(path) = non_empty_env("CROWD_MAPPING_PATH") {
            self.paths.mapping = PathBuf::from(path);
        }
        if let Some(path) = non_empty_env("CROWD_IMAGES_DIR") {
            self.paths.images_dir = PathBuf::from(path);
        }
        if let Some(path) = non_empty_env("CROWD_STATIC_DIR") {
            self.paths.static_dir = PathBuf::from(path);
        }
        if let Some(interval) = non_empty_env("CROWD_ROTATION_INTERVAL_SECS") {
            let seconds: u64 = interval.parse().map_err(|_| {
                anyhow!("CROWD_ROTATION_INTERVAL_SECS must be an integer number of seconds")
            })?;
            self.rotation_interval = Duration::from_secs(seconds);
        }
        if let Some(seed) = non_empty_env("CROWD_SEED") {
            self.seed = if seed.eq_ignore_ascii_case("none") {
                None
            } else {
                Some(
                    seed.parse()
                        .map_err(|_| anyhow!("CROWD_SEED must be an integer or 'none'"))?,
                )
            };
        }
        if let Some(backend) = non_empty_env("CROWD_DETECTOR_BACKEND") {
            self.detection.backend = backend;
        }
        if let Some(path) = non_empty_env("CROWD_MODEL_PATH") {
            self.detection.model_path = PathBuf::from(path);
        }
        Ok(())
    }

    fn validate(&mut self) -> Result<()> {
        if self.layout.trains == 0 || self.layout.coaches_per_train == 0 {
            return Err(anyhow!("layout needs at least one train and one coach"));
        }
        if self.layout.pool_size == 0 {
            return Err(anyhow!("pool_size must be greater than zero"));
        }
        if self.layout.capacity == 0 {
            return Err(anyhow!("capacity must be greater than zero"));
        }
        let thresholds = self.layout.thresholds;
        if thresholds.empty_max > thresholds.moderate_max {
            return Err(anyhow!(
                "empty_max ({}) must not exceed moderate_max ({})",
                thresholds.empty_max,
                thresholds.moderate_max
            ));
        }
        if self.rotation_interval.is_zero() {
            return Err(anyhow!("rotation interval must be greater than zero"));
        }
        self.detection.validate()
    }

    pub fn state_store(&self) -> StateStore {
        StateStore::new(self.paths.state.clone())
    }

    pub fn data_sources(&self) -> DataSources {
        DataSources::new(self.paths.mapping.clone(), self.state_store())
    }
}

fn non_empty_env(key: &str) -> Option<String> {
    std::env::var(key).ok().filter(|value| !value.trim().is_empty())
}

fn read_config_file(path: &Path) -> Result<CrowdConfigFile> {
    let raw = std::fs::read_to_string(path)
        .map_err(|e| anyhow!("failed to read config file {}: {}", path.display(), e))?;
    let is_toml = path
        .extension()
        .and_then(|ext| ext.to_str())
        .is_some_and(|ext| ext.eq_ignore_ascii_case("toml"));
    let cfg = if is_toml {
        toml::from_str(&raw).map_err(|e| anyhow!("invalid config file {}: {}", path.display(), e))?
    } else {
        serde_json::from_str(&raw)
            .map_err(|e| anyhow!("invalid config file {}: {}", path.display(), e))?
    };
    Ok(cfg)
}
