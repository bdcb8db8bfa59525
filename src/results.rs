//! Person-count results table (image identifier -> count).

use anyhow::{anyhow, Result};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::Path;

use crate::classify::CrowdLevel;
use crate::storage::{read_json, write_atomic};

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResultEntry {
    pub count: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub label: Option<CrowdLevel>,
}

/// Counts produced by the detection pass. Read-only once loaded.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ResultsTable {
    entries: BTreeMap<String, ResultEntry>,
}

impl ResultsTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Load the table. A missing file is reported with its path.
    pub fn load(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Err(anyhow!(
                "results table not found at {} (run count_people first)",
                path.display()
            ));
        }
        read_json(path)
    }

    pub fn save(&self, path: &Path) -> Result<()> {
        let json = serde_json::to_vec_pretty(self)?;
        write_atomic(path, &json)
    }

    pub fn from_counts<I, S>(counts: I) -> Self
    where
        I: IntoIterator<Item = (S, u32)>,
        S: Into<String>,
    {
        let entries = counts
            .into_iter()
            .map(|(image, count)| {
                (
                    image.into(),
                    ResultEntry { count, label: None },
                )
            })
            .collect();
        Self { entries }
    }

    pub fn insert(&mut self, image: impl Into<String>, entry: ResultEntry) {
        self.entries.insert(image.into(), entry);
    }

    /// Count for an image; images missing from the table count as zero.
    pub fn count_for(&self, image: &str) -> u32 {
        self.entries.get(image).map(|e| e.count).unwrap_or(0)
    }

    pub fn get(&self, image: &str) -> Option<&ResultEntry> {
        self.entries.get(image)
    }

    /// Image identifiers in name order.
    pub fn images(&self) -> Vec<String> {
        self.entries.keys().cloned().collect()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
