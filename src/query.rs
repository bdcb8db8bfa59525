//! Read path for the train endpoints.
//!
//! Two optional documents back the API: an externally generated mapping
//! document (keyed or listed shape) and the rotating state document. Each
//! request loads them afresh and resolves whichever exists first into a
//! [`Catalog`] of canonical train records.

use anyhow::{anyhow, Result};
use serde::Deserialize;
use serde_json::{Map, Value};
use std::path::{Path, PathBuf};

use crate::state::State;
use crate::storage::{read_json, StateStore};

/// Alternate mapping document as produced by the mapping generators.
#[derive(Clone, Debug, PartialEq, Deserialize)]
#[serde(untagged)]
pub enum MappingDocument {
    /// `[{"train_id": 1, "code": "98122", ...}, ...]`
    Listed(Vec<Value>),
    /// `{"Train1": {"coaches": {...}}, ...}`
    Keyed(Map<String, Value>),
}

impl MappingDocument {
    pub fn load(path: &Path) -> Result<Self> {
        read_json(path)
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum CatalogSource {
    Mapping,
    State,
}

/// One train, addressable by any of its keys.
#[derive(Clone, Debug, PartialEq)]
pub struct TrainRecord {
    pub keys: Vec<String>,
    pub body: Value,
}

#[derive(Clone, Debug, PartialEq)]
pub struct Catalog {
    pub source: CatalogSource,
    listing: Value,
    records: Vec<TrainRecord>,
}

impl Catalog {
    pub fn from_mapping(doc: MappingDocument) -> Self {
        match doc {
            MappingDocument::Keyed(map) => {
                let records = map
                    .iter()
                    .map(|(key, body)| TrainRecord {
                        keys: vec![key.clone()],
                        body: body.clone(),
                    })
                    .collect();
                Self {
                    source: CatalogSource::Mapping,
                    listing: Value::Object(map),
                    records,
                }
            }
            MappingDocument::Listed(items) => {
                let records = items
                    .iter()
                    .map(|body| TrainRecord {
                        keys: ["train_id", "code"]
                            .iter()
                            .filter_map(|field| body.get(*field).and_then(key_text))
                            .collect(),
                        body: body.clone(),
                    })
                    .collect();
                Self {
                    source: CatalogSource::Mapping,
                    listing: Value::Array(items),
                    records,
                }
            }
        }
    }

    pub fn from_state(state: &State) -> Result<Self> {
        let listing = serde_json::to_value(state.summaries())?;
        let records = state
            .trains
            .iter()
            .map(|train| {
                Ok(TrainRecord {
                    keys: vec![train.train_id.to_string(), train.code.clone()],
                    body: serde_json::to_value(train)?,
                })
            })
            .collect::<Result<Vec<_>>>()?;
        Ok(Self {
            source: CatalogSource::State,
            listing,
            records,
        })
    }

    pub fn listing(&self) -> &Value {
        &self.listing
    }

    /// Exact key match first, then case-insensitive.
    pub fn find(&self, id: &str) -> Option<&Value> {
        let exact = self
            .records
            .iter()
            .find(|record| record.keys.iter().any(|key| key == id));
        if let Some(record) = exact {
            return Some(&record.body);
        }
        let wanted = id.to_lowercase();
        self.records
            .iter()
            .find(|record| record.keys.iter().any(|key| key.to_lowercase() == wanted))
            .map(|record| &record.body)
    }
}

fn key_text(value: &Value) -> Option<String> {
    match value {
        Value::String(s) => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        Value::Bool(b) => Some(b.to_string()),
        _ => None,
    }
}

#[derive(Clone, Debug, PartialEq)]
pub enum TrainStatus {
    Found(Value),
    NotFound,
    NoDataSource,
}

/// Locations of the two documents the API reads.
#[derive(Clone, Debug)]
pub struct DataSources {
    pub mapping: PathBuf,
    pub state: StateStore,
}

impl DataSources {
    pub fn new(mapping: impl Into<PathBuf>, state: StateStore) -> Self {
        Self {
            mapping: mapping.into(),
            state,
        }
    }

    /// Mapping document if present, else the state document, else `None`.
    pub fn load_catalog(&self) -> Result<Option<Catalog>> {
        if self.mapping.is_file() {
            let doc = MappingDocument::load(&self.mapping)
                .map_err(|e| anyhow!("invalid data format: {}", e))?;
            return Ok(Some(Catalog::from_mapping(doc)));
        }
        if self.state.exists() {
            let state = self
                .state
                .load()
                .map_err(|e| anyhow!("invalid data format: {}", e))?;
            return Ok(Some(Catalog::from_state(&state)?));
        }
        Ok(None)
    }

    /// Train listing; an empty array when neither document exists.
    pub fn list_trains(&self) -> Result<Value> {
        Ok(match self.load_catalog()? {
            Some(catalog) => catalog.listing,
            None => Value::Array(Vec::new()),
        })
    }

    pub fn train_status(&self, id: &str) -> Result<TrainStatus> {
        let Some(catalog) = self.load_catalog()? else {
            return Ok(TrainStatus::NoDataSource);
        };
        Ok(match catalog.find(id) {
            Some(body) => TrainStatus::Found(body.clone()),
            None => TrainStatus::NotFound,
        })
    }

    /// File names used in the "no data source" message.
    pub fn describe(&self) -> String {
        let name = |p: &Path| {
            p.file_name()
                .map(|n| n.to_string_lossy().into_owned())
                .unwrap_or_else(|| p.display().to_string())
        };
        format!("{} or {}", name(&self.mapping), name(self.state.path()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::state::Layout;
    use crate::ResultsTable;
    use chrono::{TimeZone, Utc};
    use rand::rngs::StdRng;
    use rand::SeedableRng;
    use serde_json::json;

    fn sources(dir: &Path) -> DataSources {
        DataSources::new(
            dir.join("train_data.json"),
            StateStore::new(dir.join("state.json")),
        )
    }

    fn write_state(dir: &Path) -> State {
        let results = ResultsTable::from_counts([("a.jpg", 2), ("b.jpg", 9)]);
        let mut state = State::initialize(
            &Layout::default(),
            &results.images(),
            &results,
            &mut StdRng::seed_from_u64(42),
            Utc.with_ymd_and_hms(2026, 2, 2, 2, 2, 2).unwrap(),
        )
        .unwrap();
        let now = state.generated_at;
        StateStore::new(dir.join("state.json"))
            .save(&mut state, now)
            .unwrap();
        state
    }

    #[test]
    fn nothing_on_disk_gives_empty_listing_and_no_source() -> Result<()> {
        let dir = tempfile::tempdir()?;
        let sources = sources(dir.path());
        assert_eq!(sources.list_trains()?, json!([]));
        assert_eq!(sources.train_status("1")?, TrainStatus::NoDataSource);
        Ok(())
    }

    #[test]
    fn state_listing_is_reduced_projection() -> Result<()> {
        let dir = tempfile::tempdir()?;
        write_state(dir.path());
        let listing = sources(dir.path()).list_trains()?;
        assert_eq!(
            listing[0],
            json!({"train_id": 1, "code": "Train-1 (Demo)", "line": "Dummy-Line"})
        );
        assert_eq!(listing.as_array().map(Vec::len), Some(3));
        Ok(())
    }

    #[test]
    fn state_lookup_by_id_or_code() -> Result<()> {
        let dir = tempfile::tempdir()?;
        let state = write_state(dir.path());
        let sources = sources(dir.path());

        let TrainStatus::Found(by_id) = sources.train_status("2")? else {
            panic!("train 2 should exist");
        };
        assert_eq!(by_id, serde_json::to_value(&state.trains[1])?);

        let TrainStatus::Found(by_code) = sources.train_status("train-3 (demo)")? else {
            panic!("code lookup should be case-insensitive");
        };
        assert_eq!(by_code["train_id"], json!(3));

        assert_eq!(sources.train_status("99")?, TrainStatus::NotFound);
        Ok(())
    }

    #[test]
    fn keyed_mapping_wins_over_state() -> Result<()> {
        let dir = tempfile::tempdir()?;
        write_state(dir.path());
        let mapping = json!({
            "Train1": {"coaches": {"Coach1": {"image": "a.jpg", "count": 2, "status": "Empty"}}},
            "Train2": {"coaches": {}}
        });
        std::fs::write(dir.path().join("train_data.json"), mapping.to_string())?;
        let sources = sources(dir.path());

        assert_eq!(sources.list_trains()?, mapping);
        assert_eq!(
            sources.train_status("train1")?,
            TrainStatus::Found(mapping["Train1"].clone())
        );
        // state ids are not consulted while the mapping exists
        assert_eq!(sources.train_status("3")?, TrainStatus::NotFound);
        Ok(())
    }

    #[test]
    fn keyed_mapping_prefers_exact_key() {
        let catalog = Catalog::from_mapping(MappingDocument::Keyed(
            json!({"TRAIN1": {"n": 1}, "Train1": {"n": 2}})
                .as_object()
                .cloned()
                .unwrap(),
        ));
        assert_eq!(catalog.find("Train1"), Some(&json!({"n": 2})));
        assert_eq!(catalog.find("train1"), Some(&json!({"n": 1})));
    }

    #[test]
    fn listed_mapping_matches_numeric_id_and_code() -> Result<()> {
        let dir = tempfile::tempdir()?;
        let mapping = json!([
            {"train_id": 1, "code": "98122", "line": "Harbour Line", "coaches": []},
            {"train_id": 2, "code": "98124", "line": "Harbour Line", "coaches": []}
        ]);
        std::fs::write(dir.path().join("train_data.json"), mapping.to_string())?;
        let sources = sources(dir.path());

        assert_eq!(sources.train_status("2")?, TrainStatus::Found(mapping[1].clone()));
        assert_eq!(sources.train_status("98122")?, TrainStatus::Found(mapping[0].clone()));
        assert_eq!(sources.train_status("98126")?, TrainStatus::NotFound);
        Ok(())
    }

    #[test]
    fn malformed_documents_are_errors() -> Result<()> {
        let dir = tempfile::tempdir()?;
        std::fs::write(dir.path().join("state.json"), "{\"trains\": [")?;
        let sources = sources(dir.path());
        assert!(sources.list_trains().is_err());
        assert!(sources.train_status("1").is_err());

        std::fs::write(dir.path().join("train_data.json"), "42")?;
        let err = sources.list_trains().unwrap_err();
        assert!(err.to_string().contains("invalid data format"));
        Ok(())
    }
}
