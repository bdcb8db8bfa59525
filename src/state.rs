//! Coach state document: trains, coaches and their rotating image pools.

use anyhow::{anyhow, Result};
use chrono::{DateTime, Utc};
use rand::seq::SliceRandom;
use rand::Rng;
use serde::{Deserialize, Serialize};

use crate::classify::{
    occupancy_percent, CrowdLevel, Thresholds, DEFAULT_CAPACITY, DEFAULT_EMPTY_MAX,
    DEFAULT_MODERATE_MAX,
};
use crate::results::ResultsTable;

pub const DEFAULT_TRAINS: u32 = 3;
pub const DEFAULT_COACHES_PER_TRAIN: u32 = 12;
pub const DEFAULT_POOL_SIZE: usize = 4;

/// Schedule metadata for one train slot.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RosterEntry {
    pub code: String,
    pub line: String,
    #[serde(default)]
    pub time: Option<String>,
    #[serde(default)]
    pub src: Option<String>,
    #[serde(default)]
    pub dst: Option<String>,
}

impl RosterEntry {
    /// Roster entry for 1-based train `t`; cycles through `roster`.
    pub fn for_train(roster: &[RosterEntry], t: u32) -> RosterEntry {
        if roster.is_empty() {
            return RosterEntry {
                code: format!("Train-{t} (Demo)"),
                line: "Dummy-Line".to_string(),
                ..RosterEntry::default()
            };
        }
        roster[(t as usize - 1) % roster.len()].clone()
    }
}

/// Shape of the generated train grid.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Layout {
    pub trains: u32,
    pub coaches_per_train: u32,
    pub pool_size: usize,
    pub capacity: u32,
    pub thresholds: Thresholds,
    pub roster: Vec<RosterEntry>,
}

impl Default for Layout {
    fn default() -> Self {
        Self {
            trains: DEFAULT_TRAINS,
            coaches_per_train: DEFAULT_COACHES_PER_TRAIN,
            pool_size: DEFAULT_POOL_SIZE,
            capacity: DEFAULT_CAPACITY,
            thresholds: Thresholds::default(),
            roster: Vec::new(),
        }
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Coach {
    pub coach_id: String,
    pub train_id: u32,
    pub index: u32,
    pub pool: Vec<String>,
    #[serde(default)]
    pub current_index: usize,
    #[serde(default)]
    pub current_image: String,
    #[serde(default)]
    pub count: u32,
    #[serde(default)]
    pub level: CrowdLevel,
    #[serde(default = "default_empty_max")]
    pub empty_max: u32,
    #[serde(default = "default_moderate_max")]
    pub moderate_max: u32,
    #[serde(default = "default_capacity")]
    pub capacity: u32,
    #[serde(default)]
    pub occupancy_percent: u8,
    #[serde(default, with = "timestamp")]
    pub last_updated: DateTime<Utc>,
}

fn default_empty_max() -> u32 {
    DEFAULT_EMPTY_MAX
}

fn default_moderate_max() -> u32 {
    DEFAULT_MODERATE_MAX
}

fn default_capacity() -> u32 {
    DEFAULT_CAPACITY
}

impl Coach {
    pub fn thresholds(&self) -> Thresholds {
        Thresholds {
            empty_max: self.empty_max,
            moderate_max: self.moderate_max,
        }
    }

    /// Move to the next image of the pool, wrapping around.
    pub fn advance(&mut self, results: &ResultsTable, now: DateTime<Utc>) -> Result<()> {
        if self.pool.is_empty() {
            return Err(anyhow!("coach {} has an empty image pool", self.coach_id));
        }
        let next = (self.current_index + 1) % self.pool.len();
        self.select(next, results, now)
    }

    /// Point the coach at `pool[index]` and re-derive count, level and occupancy.
    pub fn select(&mut self, index: usize, results: &ResultsTable, now: DateTime<Utc>) -> Result<()> {
        let image = self.pool.get(index).ok_or_else(|| {
            anyhow!(
                "coach {}: pool index {} out of range (pool size {})",
                self.coach_id,
                index,
                self.pool.len()
            )
        })?;
        self.current_index = index;
        self.current_image = image.clone();
        self.count = results.count_for(image);
        self.level = self.thresholds().level(self.count);
        self.occupancy_percent = occupancy_percent(self.count, self.capacity);
        self.last_updated = now;
        Ok(())
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Train {
    pub train_id: u32,
    pub code: String,
    pub line: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub time: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub src: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub dst: Option<String>,
    #[serde(default)]
    pub coaches: Vec<Coach>,
}

/// Reduced train listing served when only the state document exists.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct TrainSummary {
    pub train_id: u32,
    pub code: String,
    pub line: String,
}

impl Train {
    pub fn summary(&self) -> TrainSummary {
        TrainSummary {
            train_id: self.train_id,
            code: self.code.clone(),
            line: self.line.clone(),
        }
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct State {
    #[serde(with = "timestamp")]
    pub generated_at: DateTime<Utc>,
    #[serde(default)]
    pub trains: Vec<Train>,
}

impl State {
    /// Build the initial state: every coach gets a random pool drawn without
    /// replacement from `images` and starts at `pool[0]`.
    pub fn initialize<R: Rng + ?Sized>(
        layout: &Layout,
        images: &[String],
        results: &ResultsTable,
        rng: &mut R,
        now: DateTime<Utc>,
    ) -> Result<Self> {
        if images.is_empty() {
            return Err(anyhow!("no images available to assign to coaches"));
        }
        if layout.pool_size == 0 {
            return Err(anyhow!("pool size must be greater than zero"));
        }
        let pool_size = layout.pool_size.min(images.len());

        let mut trains = Vec::with_capacity(layout.trains as usize);
        for t in 1..=layout.trains {
            let roster = RosterEntry::for_train(&layout.roster, t);
            let mut coaches = Vec::with_capacity(layout.coaches_per_train as usize);
            for c in 1..=layout.coaches_per_train {
                let pool: Vec<String> = images.choose_multiple(rng, pool_size).cloned().collect();
                let mut coach = Coach {
                    coach_id: format!("{t}-{c}"),
                    train_id: t,
                    index: c,
                    pool,
                    current_index: 0,
                    current_image: String::new(),
                    count: 0,
                    level: CrowdLevel::Empty,
                    empty_max: layout.thresholds.empty_max,
                    moderate_max: layout.thresholds.moderate_max,
                    capacity: layout.capacity,
                    occupancy_percent: 0,
                    last_updated: now,
                };
                coach.select(0, results, now)?;
                coaches.push(coach);
            }
            trains.push(Train {
                train_id: t,
                code: roster.code,
                line: roster.line,
                time: roster.time,
                src: roster.src,
                dst: roster.dst,
                coaches,
            });
        }

        Ok(Self {
            generated_at: now,
            trains,
        })
    }

    pub fn coach_count(&self) -> usize {
        self.trains.iter().map(|t| t.coaches.len()).sum()
    }

    pub fn summaries(&self) -> Vec<TrainSummary> {
        self.trains.iter().map(Train::summary).collect()
    }
}

/// RFC 3339 timestamps; naive ISO-8601 values without an offset read as UTC.
pub(crate) mod timestamp {
    use chrono::{DateTime, NaiveDateTime, SecondsFormat, Utc};
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(value: &DateTime<Utc>, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&value.to_rfc3339_opts(SecondsFormat::Micros, true))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<DateTime<Utc>, D::Error> {
        let raw = String::deserialize(deserializer)?;
        parse(&raw).map_err(serde::de::Error::custom)
    }

    pub fn parse(raw: &str) -> Result<DateTime<Utc>, String> {
        if let Ok(ts) = DateTime::parse_from_rfc3339(raw) {
            return Ok(ts.with_timezone(&Utc));
        }
        NaiveDateTime::parse_from_str(raw, "%Y-%m-%dT%H:%M:%S%.f")
            .map(|naive| naive.and_utc())
            .map_err(|e| format!("invalid timestamp '{raw}': {e}"))
    }
}
