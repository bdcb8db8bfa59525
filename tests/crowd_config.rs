use std::path::PathBuf;
use std::sync::Mutex;
use std::time::Duration;

use tempfile::NamedTempFile;

use coach_crowd::CrowdConfig;

static ENV_LOCK: Mutex<()> = Mutex::new(());

fn clear_env() {
    for key in [
        "CROWD_CONFIG",
        "CROWD_API_ADDR",
        "CROWD_RESULTS_PATH",
        "CROWD_STATE_PATH",
        "CROWD_MAPPING_PATH",
        "CROWD_IMAGES_DIR",
        "CROWD_STATIC_DIR",
        "CROWD_ROTATION_INTERVAL_SECS",
        "CROWD_SEED",
        "CROWD_DETECTOR_BACKEND",
        "CROWD_MODEL_PATH",
    ] {
        std::env::remove_var(key);
    }
}

#[test]
fn defaults_without_config_file() {
    let _guard = ENV_LOCK.lock().unwrap();
    clear_env();

    let cfg = CrowdConfig::load().expect("load defaults");

    assert_eq!(cfg.api_addr, "127.0.0.1:5000");
    assert_eq!(cfg.paths.results, PathBuf::from("data/results.json"));
    assert_eq!(cfg.paths.state, PathBuf::from("data/state.json"));
    assert_eq!(cfg.paths.mapping, PathBuf::from("data/train_data.json"));
    assert_eq!(cfg.layout.trains, 3);
    assert_eq!(cfg.layout.coaches_per_train, 12);
    assert_eq!(cfg.layout.pool_size, 4);
    assert_eq!(cfg.layout.capacity, 30);
    assert_eq!(cfg.layout.thresholds.empty_max, 3);
    assert_eq!(cfg.layout.thresholds.moderate_max, 7);
    assert!(cfg.layout.roster.is_empty());
    assert_eq!(cfg.seed, Some(42));
    assert_eq!(cfg.rotation_interval, Duration::from_secs(240));
    assert_eq!(cfg.detection.backend, "stub");

    clear_env();
}

#[test]
fn loads_json_config_with_env_overrides() {
    let _guard = ENV_LOCK.lock().unwrap();
    clear_env();

    let mut file = NamedTempFile::new().expect("temp config");
    let json = r#"{
        "paths": {
            "results": "/srv/crowd/results.json",
            "state": "/srv/crowd/state.json"
        },
        "api": { "addr": "0.0.0.0:8080" },
        "layout": {
            "trains": 2,
            "coaches_per_train": 8,
            "capacity": 70,
            "empty_max": 5,
            "moderate_max": 20
        },
        "rotation": { "interval_secs": 60 },
        "detection": { "backend": "Tract", "confidence": 0.4 }
    }"#;
    std::io::Write::write_all(&mut file, json.as_bytes()).expect("write config");

    std::env::set_var("CROWD_CONFIG", file.path());
    std::env::set_var("CROWD_STATE_PATH", "/tmp/override-state.json");
    std::env::set_var("CROWD_ROTATION_INTERVAL_SECS", "5");
    std::env::set_var("CROWD_SEED", "none");

    let cfg = CrowdConfig::load().expect("load config");

    assert_eq!(cfg.api_addr, "0.0.0.0:8080");
    assert_eq!(cfg.paths.results, PathBuf::from("/srv/crowd/results.json"));
    assert_eq!(cfg.paths.state, PathBuf::from("/tmp/override-state.json"));
    assert_eq!(cfg.state_store().path(), PathBuf::from("/tmp/override-state.json"));
    assert_eq!(cfg.layout.trains, 2);
    assert_eq!(cfg.layout.coaches_per_train, 8);
    assert_eq!(cfg.layout.capacity, 70);
    assert_eq!(cfg.layout.thresholds.empty_max, 5);
    assert_eq!(cfg.layout.thresholds.moderate_max, 20);
    assert_eq!(cfg.rotation_interval, Duration::from_secs(5));
    assert_eq!(cfg.seed, None);
    assert_eq!(cfg.detection.backend, "tract");
    assert!((cfg.detection.confidence - 0.4).abs() < f32::EPSILON);

    clear_env();
}

#[test]
fn loads_toml_roster() {
    let _guard = ENV_LOCK.lock().unwrap();
    clear_env();

    let mut file = tempfile::Builder::new()
        .suffix(".toml")
        .tempfile()
        .expect("temp config");
    let toml = r#"
[layout]
trains = 3
seed = 7

[[layout.roster]]
code = "98122"
line = "Harbour Line"
time = "02:05 PM"
src = "Panvel"
dst = "CSMT"

[[layout.roster]]
code = "98124"
line = "Harbour Line"
"#;
    std::io::Write::write_all(&mut file, toml.as_bytes()).expect("write config");
    std::env::set_var("CROWD_CONFIG", file.path());

    let cfg = CrowdConfig::load().expect("load config");

    assert_eq!(cfg.seed, Some(7));
    assert_eq!(cfg.layout.roster.len(), 2);
    assert_eq!(cfg.layout.roster[0].code, "98122");
    assert_eq!(cfg.layout.roster[0].src.as_deref(), Some("Panvel"));
    assert_eq!(cfg.layout.roster[1].time, None);

    clear_env();
}

#[test]
fn rejects_inverted_thresholds_and_bad_env() {
    let _guard = ENV_LOCK.lock().unwrap();
    clear_env();

    let mut file = NamedTempFile::new().expect("temp config");
    std::io::Write::write_all(
        &mut file,
        br#"{"layout": {"empty_max": 9, "moderate_max": 4}}"#,
    )
    .expect("write config");
    std::env::set_var("CROWD_CONFIG", file.path());
    let err = CrowdConfig::load().unwrap_err();
    assert!(err.to_string().contains("empty_max"));

    clear_env();
    std::env::set_var("CROWD_ROTATION_INTERVAL_SECS", "soon");
    assert!(CrowdConfig::load().is_err());

    clear_env();
}

#[test]
fn detection_overrides_are_revalidated() {
    let _guard = ENV_LOCK.lock().unwrap();
    clear_env();

    let cfg = CrowdConfig::load().expect("load defaults");

    for confidence in [0.0, 5.0, -0.3] {
        let mut detection = cfg.detection.clone();
        detection.confidence = confidence;
        let err = detection.validate().unwrap_err();
        assert!(err.to_string().contains("confidence"));
    }

    let mut detection = cfg.detection.clone();
    detection.confidence = 1.0;
    detection.backend = " Tract ".to_string();
    detection.validate().expect("valid override");
    assert_eq!(detection.backend, "tract");

    clear_env();
}
