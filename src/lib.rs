//! Coach Crowd Monitor
//!
//! Counts people in a library of coach photographs, keeps a rotating
//! per-coach state document for a small fleet of trains, and serves that
//! state over a read-only HTTP API.
//!
//! # Pipeline
//!
//! 1. `count_people` runs a detector over every image and writes the
//!    results table (`image -> {count, label}`).
//! 2. `init_state` assigns each coach a pool of images and writes the
//!    initial state document.
//! 3. `simulator` advances every coach to the next image in its pool on a
//!    fixed interval, rewriting the state document atomically each round.
//! 4. `crowd_api` answers `/trains` and `/train/{id}/status` from the
//!    alternate mapping document when present, else from the state document.
//!
//! # Module Structure
//!
//! - `classify`: crowd levels, thresholds and occupancy percentage
//! - `detect`: detector backends and the counting pass
//! - `state` / `storage`: the state document and its atomic persistence
//! - `rotation` / `timer`: the rotation loop and its cancellable ticker
//! - `query` / `api`: data-source resolution and the HTTP surface
//! - `mapping`: generators for the alternate mapping document

pub mod api;
pub mod classify;
pub mod config;
pub mod detect;
pub mod images;
pub mod mapping;
pub mod query;
pub mod results;
pub mod rotation;
pub mod state;
pub mod storage;
pub mod timer;

pub use classify::{classify, occupancy_percent, CrowdLevel, Thresholds};
pub use config::CrowdConfig;
pub use query::{Catalog, DataSources, MappingDocument, TrainStatus};
pub use results::{ResultEntry, ResultsTable};
pub use rotation::{rotate_once, RotationLoop, RotationSettings, RunSummary};
pub use state::{Coach, Layout, RosterEntry, State, Train, TrainSummary};
pub use storage::{write_atomic, StateStore};
pub use timer::{
    shutdown_channel, Clock, FixedClock, ManualTicker, ShutdownSignal, ShutdownTrigger,
    SystemClock, Tick, Ticker,
};
