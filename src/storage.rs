use anyhow::{anyhow, Context, Result};
use chrono::{DateTime, Utc};
use serde::de::DeserializeOwned;
use std::fs::{self, File};
use std::io::Write;
use std::path::{Path, PathBuf};

use crate::state::State;

/// Handle to the on-disk coach state document.
///
/// The rotation loop is the only writer; every save replaces the whole file
/// atomically so readers see either the previous or the new document.
#[derive(Clone, Debug)]
pub struct StateStore {
    path: PathBuf,
}

impl StateStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn exists(&self) -> bool {
        self.path.is_file()
    }

    pub fn load(&self) -> Result<State> {
        if !self.exists() {
            return Err(anyhow!(
                "state document not found at {} (run init_state first)",
                self.path.display()
            ));
        }
        read_json(&self.path)
    }

    /// Stamp `generated_at` and replace the document.
    pub fn save(&self, state: &mut State, now: DateTime<Utc>) -> Result<()> {
        state.generated_at = now;
        let json = serde_json::to_vec_pretty(state)?;
        write_atomic(&self.path, &json)
            .with_context(|| format!("failed to write state to {}", self.path.display()))
    }
}

pub(crate) fn read_json<T: DeserializeOwned>(path: &Path) -> Result<T> {
    let raw = fs::read(path).with_context(|| format!("failed to read {}", path.display()))?;
    serde_json::from_slice(&raw).map_err(|e| anyhow!("invalid JSON in {}: {}", path.display(), e))
}

/// Write to a sibling temp file, fsync, then rename over `path`.
pub fn write_atomic(path: &Path, data: &[u8]) -> Result<()> {
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            fs::create_dir_all(parent)?;
        }
    }
    let tmp_path = path.with_extension("tmp");
    {
        let mut file = File::create(&tmp_path)?;
        file.write_all(data)?;
        file.sync_all()?;
    }
    fs::rename(tmp_path, path)?;
    Ok(())
}
