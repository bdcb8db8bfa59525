//! Generators for the alternate train mapping document.
//!
//! Unlike the state document, a mapping assigns one random image to each
//! coach. Two shapes exist: keyed by train name, or a listed array of trains
//! with roster metadata. [`MappingRefresher`] redraws the whole document on
//! an interval.

use anyhow::{anyhow, Result};
use rand::seq::SliceRandom;
use rand::Rng;
use serde::Serialize;
use serde_json::{Map, Value};
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::classify::{occupancy_percent, CrowdLevel};
use crate::results::ResultsTable;
use crate::state::{Layout, RosterEntry};
use crate::rotation::{RotationSettings, RunSummary};
use crate::storage::write_atomic;
use crate::timer::{Tick, Ticker};

pub const DEFAULT_REFRESH_INTERVAL: Duration = Duration::from_secs(30);

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum MappingShape {
    Keyed,
    Listed,
}

impl std::str::FromStr for MappingShape {
    type Err = anyhow::Error;

    fn from_str(value: &str) -> Result<Self> {
        match value.to_ascii_lowercase().as_str() {
            "keyed" | "mapping" => Ok(MappingShape::Keyed),
            "listed" | "array" => Ok(MappingShape::Listed),
            other => Err(anyhow!("unknown mapping shape '{}' (keyed|listed)", other)),
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct KeyedCoach {
    pub image: String,
    pub count: u32,
    pub status: CrowdLevel,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct ListedCoach {
    pub index: u32,
    pub image: String,
    pub count: u32,
    pub status: CrowdLevel,
    pub capacity: u32,
    pub occupancy_percent: u8,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct ListedTrain {
    pub train_id: u32,
    pub code: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub time: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub src: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub dst: Option<String>,
    pub line: String,
    pub coaches: Vec<ListedCoach>,
}

struct Pick {
    image: String,
    count: u32,
    status: CrowdLevel,
}

fn pick<R: Rng + ?Sized>(images: &[String], results: &ResultsTable, layout: &Layout, rng: &mut R) -> Result<Pick> {
    let image = images
        .choose(rng)
        .ok_or_else(|| anyhow!("results table is empty; nothing to map"))?
        .clone();
    let count = results.count_for(&image);
    Ok(Pick {
        status: layout.thresholds.level(count),
        image,
        count,
    })
}

/// `{"Train<t>": {"coaches": {"Coach<c>": {image, count, status}}}}`
pub fn generate_keyed<R: Rng + ?Sized>(layout: &Layout, results: &ResultsTable, rng: &mut R) -> Result<Value> {
    let images = results.images();
    let mut trains = Map::new();
    for t in 1..=layout.trains {
        let mut coaches = Map::new();
        for c in 1..=layout.coaches_per_train {
            let p = pick(&images, results, layout, rng)?;
            let coach = KeyedCoach {
                image: p.image,
                count: p.count,
                status: p.status,
            };
            coaches.insert(format!("Coach{c}"), serde_json::to_value(coach)?);
        }
        let mut train = Map::new();
        train.insert("coaches".to_string(), Value::Object(coaches));
        trains.insert(format!("Train{t}"), Value::Object(train));
    }
    Ok(Value::Object(trains))
}

/// Array of trains carrying roster metadata and per-coach occupancy.
pub fn generate_listed<R: Rng + ?Sized>(
    layout: &Layout,
    results: &ResultsTable,
    rng: &mut R,
) -> Result<Vec<ListedTrain>> {
    let images = results.images();
    let mut trains = Vec::with_capacity(layout.trains as usize);
    for t in 1..=layout.trains {
        let roster = RosterEntry::for_train(&layout.roster, t);
        let mut coaches = Vec::with_capacity(layout.coaches_per_train as usize);
        for c in 1..=layout.coaches_per_train {
            let p = pick(&images, results, layout, rng)?;
            coaches.push(ListedCoach {
                index: c,
                image: p.image,
                count: p.count,
                status: p.status,
                capacity: layout.capacity,
                occupancy_percent: occupancy_percent(p.count, layout.capacity),
            });
        }
        trains.push(ListedTrain {
            train_id: t,
            code: roster.code,
            time: roster.time,
            src: roster.src,
            dst: roster.dst,
            line: roster.line,
            coaches,
        });
    }
    Ok(trains)
}

pub fn generate<R: Rng + ?Sized>(
    shape: MappingShape,
    layout: &Layout,
    results: &ResultsTable,
    rng: &mut R,
) -> Result<Value> {
    match shape {
        MappingShape::Keyed => generate_keyed(layout, results, rng),
        MappingShape::Listed => Ok(serde_json::to_value(generate_listed(layout, results, rng)?)?),
    }
}

pub fn write_mapping(path: &Path, mapping: &Value) -> Result<()> {
    let json = serde_json::to_vec_pretty(mapping)?;
    write_atomic(path, &json)
}

/// Regenerates the mapping document every interval.
pub struct MappingRefresher<R> {
    path: PathBuf,
    shape: MappingShape,
    layout: Layout,
    results: ResultsTable,
    settings: RotationSettings,
    rng: R,
}

impl<R: Rng> MappingRefresher<R> {
    pub fn new(
        path: impl Into<PathBuf>,
        shape: MappingShape,
        layout: Layout,
        results: ResultsTable,
        settings: RotationSettings,
        rng: R,
    ) -> Self {
        Self {
            path: path.into(),
            shape,
            layout,
            results,
            settings,
            rng,
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn refresh(&mut self) -> Result<()> {
        let mapping = generate(self.shape, &self.layout, &self.results, &mut self.rng)?;
        write_mapping(&self.path, &mapping)
    }

    /// Refresh immediately, then once per interval. Failed refreshes are
    /// logged and the previous document stays in place.
    pub fn run(&mut self, ticker: &mut dyn Ticker) -> RunSummary {
        let mut summary = RunSummary::default();
        if self.settings.rounds == Some(0) {
            return summary;
        }
        loop {
            summary.rounds += 1;
            match self.refresh() {
                Ok(()) => log::info!(
                    "[{}] refreshed {} trains in {}",
                    summary.rounds,
                    self.layout.trains,
                    self.path.display()
                ),
                Err(err) => {
                    summary.failed_saves += 1;
                    log::error!("[{}] mapping not refreshed: {:#}", summary.rounds, err);
                }
            }

            if let Some(limit) = self.settings.rounds {
                if summary.rounds >= limit {
                    return summary;
                }
            }

            if ticker.wait(self.settings.interval) == Tick::Cancelled {
                summary.cancelled = true;
                return summary;
            }
        }
    }
}
