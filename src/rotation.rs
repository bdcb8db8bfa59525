//! Periodic rotation of every coach's current image.

use chrono::{DateTime, Utc};
use std::sync::Arc;
use std::time::Duration;

use crate::results::ResultsTable;
use crate::state::State;
use crate::storage::StateStore;
use crate::timer::{Clock, Tick, Ticker};

pub const DEFAULT_ROTATION_INTERVAL: Duration = Duration::from_secs(240);

/// Outcome of one pass over all coaches.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct RotationReport {
    pub rotated: usize,
    pub skipped: usize,
}

/// Advance every coach by one pool slot. Faulty coaches are logged and skipped.
pub fn rotate_once(state: &mut State, results: &ResultsTable, now: DateTime<Utc>) -> RotationReport {
    let mut report = RotationReport::default();
    for train in &mut state.trains {
        for coach in &mut train.coaches {
            match coach.advance(results, now) {
                Ok(()) => report.rotated += 1,
                Err(err) => {
                    log::warn!("skipping coach: {}", err);
                    report.skipped += 1;
                }
            }
        }
    }
    report
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct RotationSettings {
    pub interval: Duration,
    /// Stop after this many rounds; `None` runs until cancelled.
    pub rounds: Option<u64>,
}

impl Default for RotationSettings {
    fn default() -> Self {
        Self {
            interval: DEFAULT_ROTATION_INTERVAL,
            rounds: None,
        }
    }
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct RunSummary {
    pub rounds: u64,
    pub failed_saves: u64,
    pub cancelled: bool,
}

/// The single writer of the state document.
pub struct RotationLoop {
    store: StateStore,
    results: ResultsTable,
    clock: Arc<dyn Clock>,
    settings: RotationSettings,
}

impl RotationLoop {
    pub fn new(
        store: StateStore,
        results: ResultsTable,
        clock: Arc<dyn Clock>,
        settings: RotationSettings,
    ) -> Self {
        Self {
            store,
            results,
            clock,
            settings,
        }
    }

    pub fn store(&self) -> &StateStore {
        &self.store
    }

    /// Rotate immediately, then once per interval until the round limit is hit
    /// or the ticker reports cancellation. Save failures do not stop the loop.
    pub fn run(&self, state: &mut State, ticker: &mut dyn Ticker) -> RunSummary {
        let mut summary = RunSummary::default();
        if self.settings.rounds == Some(0) {
            return summary;
        }
        loop {
            summary.rounds += 1;
            let now = self.clock.now();
            let report = rotate_once(state, &self.results, now);
            match self.store.save(state, now) {
                Ok(()) => log::info!(
                    "[{}] rotated {} coaches ({} skipped) at {} - saved {}",
                    summary.rounds,
                    report.rotated,
                    report.skipped,
                    now.to_rfc3339(),
                    self.store.path().display()
                ),
                Err(err) => {
                    summary.failed_saves += 1;
                    log::error!("[{}] rotation not persisted: {:#}", summary.rounds, err);
                }
            }

            if let Some(limit) = self.settings.rounds {
                if summary.rounds >= limit {
                    log::info!("completed {} requested rounds", limit);
                    return summary;
                }
            }

            if ticker.wait(self.settings.interval) == Tick::Cancelled {
                log::info!("simulator stopped after {} rounds", summary.rounds);
                summary.cancelled = true;
                return summary;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::state::{Coach, Layout, Train};
    use crate::timer::{FixedClock, ManualTicker};
    use chrono::TimeZone;
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    fn start() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 4, 10, 7, 30, 0).unwrap()
    }

    fn fixture() -> (ResultsTable, State) {
        let names: Vec<String> = (0..6).map(|i| format!("img{i}.jpg")).collect();
        let results = ResultsTable::from_counts(names.iter().enumerate().map(|(i, n)| (n.clone(), i as u32 * 3)));
        let state = State::initialize(
            &Layout::default(),
            &names,
            &results,
            &mut StdRng::seed_from_u64(42),
            start(),
        )
        .unwrap();
        (results, state)
    }

    #[test]
    fn full_cycle_returns_every_coach_to_start() {
        let (results, mut state) = fixture();
        let before: Vec<usize> = state.trains.iter().flat_map(|t| &t.coaches).map(|c| c.current_index).collect();
        for _ in 0..4 {
            let report = rotate_once(&mut state, &results, start());
            assert_eq!(report.rotated, 36);
            assert_eq!(report.skipped, 0);
        }
        let after: Vec<usize> = state.trains.iter().flat_map(|t| &t.coaches).map(|c| c.current_index).collect();
        assert_eq!(before, after);
    }

    #[test]
    fn empty_pool_is_skipped_without_touching_others() {
        let (results, mut state) = fixture();
        state.trains[1].coaches[0].pool.clear();
        let report = rotate_once(&mut state, &results, start());
        assert_eq!(report.rotated, 35);
        assert_eq!(report.skipped, 1);
        assert_eq!(state.trains[0].coaches[0].current_index, 1);
    }

    #[test]
    fn bounded_run_persists_each_round() {
        let dir = tempfile::tempdir().unwrap();
        let store = StateStore::new(dir.path().join("state.json"));
        let (results, mut state) = fixture();
        let clock = Arc::new(FixedClock::new(start()));
        let rotation = RotationLoop::new(
            store.clone(),
            results,
            clock.clone(),
            RotationSettings {
                interval: Duration::from_secs(240),
                rounds: Some(3),
            },
        );

        let mut ticker = ManualTicker::new().with_clock(&clock);
        let summary = rotation.run(&mut state, &mut ticker);
        assert_eq!(summary.rounds, 3);
        assert!(!summary.cancelled);
        assert_eq!(ticker.waits(), 2);

        let saved = store.load().unwrap();
        assert_eq!(saved.generated_at, start() + chrono::Duration::minutes(8));
        assert_eq!(saved.trains[0].coaches[0].current_index, 3);
        assert_eq!(saved, state);
    }

    #[test]
    fn cancellation_stops_between_rounds() {
        let dir = tempfile::tempdir().unwrap();
        let store = StateStore::new(dir.path().join("state.json"));
        let (results, mut state) = fixture();
        let rotation = RotationLoop::new(
            store,
            results,
            Arc::new(FixedClock::new(start())),
            RotationSettings::default(),
        );
        let mut ticker = ManualTicker::new().cancel_after(1);
        let summary = rotation.run(&mut state, &mut ticker);
        assert!(summary.cancelled);
        assert_eq!(summary.rounds, 2);
    }

    #[test]
    fn save_failures_do_not_stop_the_loop() {
        let dir = tempfile::tempdir().unwrap();
        let blocker = dir.path().join("not_a_dir");
        std::fs::write(&blocker, b"x").unwrap();
        let store = StateStore::new(blocker.join("state.json"));

        let mut state = State {
            generated_at: start(),
            trains: vec![Train {
                train_id: 1,
                code: "T1".into(),
                line: "L".into(),
                time: None,
                src: None,
                dst: None,
                coaches: vec![serde_json::from_str::<Coach>(
                    r#"{"coach_id": "1-1", "train_id": 1, "index": 1, "pool": ["a.jpg", "b.jpg"]}"#,
                )
                .unwrap()],
            }],
        };
        let rotation = RotationLoop::new(
            store,
            ResultsTable::from_counts([("b.jpg", 9)]),
            Arc::new(FixedClock::new(start())),
            RotationSettings {
                interval: Duration::from_secs(1),
                rounds: Some(2),
            },
        );
        let summary = rotation.run(&mut state, &mut ManualTicker::new());
        assert_eq!(summary.rounds, 2);
        assert_eq!(summary.failed_saves, 2);
        assert_eq!(state.trains[0].coaches[0].current_image, "a.jpg");
    }

    #[test]
    fn zero_rounds_does_nothing() {
        let dir = tempfile::tempdir().unwrap();
        let store = StateStore::new(dir.path().join("state.json"));
        let (results, mut state) = fixture();
        let rotation = RotationLoop::new(
            store.clone(),
            results,
            Arc::new(FixedClock::new(start())),
            RotationSettings {
                interval: Duration::from_secs(1),
                rounds: Some(0),
            },
        );
        let summary = rotation.run(&mut state, &mut ManualTicker::new());
        assert_eq!(summary.rounds, 0);
        assert!(!store.exists());
    }
}
