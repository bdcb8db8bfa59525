use anyhow::Result;
use chrono::{DateTime, TimeZone, Utc};
use rand::rngs::StdRng;
use rand::SeedableRng;
use std::sync::Arc;
use std::time::Duration;
use tempfile::tempdir;

use coach_crowd::{
    shutdown_channel, CrowdLevel, FixedClock, Layout, ManualTicker, ResultsTable, RotationLoop,
    RotationSettings, State, StateStore, SystemClock,
};

fn start() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2026, 5, 1, 14, 0, 0).unwrap()
}

fn results() -> ResultsTable {
    ResultsTable::from_counts([
        ("p1.jpg", 0),
        ("p2.jpg", 4),
        ("p3.jpg", 9),
        ("p4.jpg", 15),
        ("p5.jpg", 30),
    ])
}

fn initialized(store: &StateStore, results: &ResultsTable) -> Result<State> {
    let mut state = State::initialize(
        &Layout::default(),
        &results.images(),
        results,
        &mut StdRng::seed_from_u64(42),
        start(),
    )?;
    store.save(&mut state, start())?;
    Ok(state)
}

#[test]
fn bounded_run_advances_every_coach_and_persists() -> Result<()> {
    let dir = tempdir()?;
    let store = StateStore::new(dir.path().join("data").join("state.json"));
    let results = results();
    let initial = initialized(&store, &results)?;
    assert_eq!(initial.coach_count(), 36);

    let clock = Arc::new(FixedClock::new(start()));
    let rotation = RotationLoop::new(
        store.clone(),
        results.clone(),
        clock.clone(),
        RotationSettings {
            interval: Duration::from_secs(240),
            rounds: Some(5),
        },
    );
    let mut ticker = ManualTicker::new().with_clock(&clock);
    let mut state = store.load()?;
    let summary = rotation.run(&mut state, &mut ticker);

    assert_eq!(summary.rounds, 5);
    assert_eq!(summary.failed_saves, 0);
    assert!(!summary.cancelled);
    assert_eq!(ticker.waits(), 4);

    let reloaded = store.load()?;
    assert_eq!(reloaded, state);
    assert_eq!(
        reloaded.generated_at,
        start() + chrono::Duration::seconds(4 * 240)
    );
    for (train, before) in reloaded.trains.iter().zip(&initial.trains) {
        for (coach, old) in train.coaches.iter().zip(&before.coaches) {
            assert_eq!(coach.pool, old.pool);
            assert_eq!(coach.current_index, 5 % coach.pool.len());
            assert_eq!(coach.current_image, coach.pool[coach.current_index]);
            assert_eq!(coach.count, results.count_for(&coach.current_image));
            assert_eq!(coach.level, coach.thresholds().level(coach.count));
            assert_eq!(coach.last_updated, reloaded.generated_at);
        }
    }
    Ok(())
}

#[test]
fn single_image_pool_stays_put() -> Result<()> {
    let dir = tempdir()?;
    let store = StateStore::new(dir.path().join("state.json"));
    let results = ResultsTable::from_counts([("img1.jpg", 2)]);
    let layout = Layout {
        trains: 1,
        coaches_per_train: 1,
        ..Layout::default()
    };
    let mut state = State::initialize(
        &layout,
        &results.images(),
        &results,
        &mut StdRng::seed_from_u64(1),
        start(),
    )?;
    let coach = &state.trains[0].coaches[0];
    assert_eq!(coach.pool, vec!["img1.jpg".to_string()]);
    assert_eq!(coach.current_image, "img1.jpg");
    assert_eq!(coach.level, CrowdLevel::Empty);

    let rotation = RotationLoop::new(
        store.clone(),
        results,
        Arc::new(FixedClock::new(start())),
        RotationSettings {
            interval: Duration::from_secs(1),
            rounds: Some(3),
        },
    );
    rotation.run(&mut state, &mut ManualTicker::new());

    let coach = &store.load()?.trains[0].coaches[0];
    assert_eq!(coach.current_index, 0);
    assert_eq!(coach.current_image, "img1.jpg");
    Ok(())
}

#[test]
fn readers_never_observe_a_partial_document() -> Result<()> {
    let dir = tempdir()?;
    let store = StateStore::new(dir.path().join("state.json"));
    let results = results();
    let mut state = initialized(&store, &results)?;

    let (trigger, mut signal) = shutdown_channel();
    let writer_store = store.clone();
    let writer = std::thread::spawn(move || {
        let rotation = RotationLoop::new(
            writer_store,
            results,
            Arc::new(SystemClock),
            RotationSettings {
                interval: Duration::from_millis(1),
                rounds: None,
            },
        );
        rotation.run(&mut state, &mut signal)
    });

    for _ in 0..200 {
        let snapshot = store.load()?;
        assert_eq!(snapshot.trains.len(), 3);
        assert_eq!(snapshot.coach_count(), 36);
    }

    trigger.fire();
    let summary = writer.join().expect("writer thread");
    assert!(summary.cancelled);
    assert!(summary.rounds >= 1);
    assert_eq!(summary.failed_saves, 0);
    assert!(!dir.path().join("state.tmp").exists());
    Ok(())
}
