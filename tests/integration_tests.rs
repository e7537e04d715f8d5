use chrono::{Duration, NaiveDate, NaiveDateTime};
use proptest::prelude::*;
use std::fmt::Write as _;
use std::fs;
use std::path::Path;
use std::sync::Arc;
use tempfile::TempDir;

use runsight::features::build_features;
use runsight::import::summaries::SUMMARIES_FILE;
use runsight::import::synthetic::{ACTIVITIES_FILE, RACES_FILE};
use runsight::training::train_from_directory;
use runsight::{
    normalize, Activity, AnalyticsEngine, EngineConfig, ModelArtifact, ModelHandle,
    RiskLevel, RunsightError, TrainingConfig, TrainingError, TrainingReadiness, FEATURE_ORDER,
};

/// Integration tests for the analytics engine
///
/// These exercise the public entry points end to end, from raw activities or
/// CSV datasets through to predictions.

fn reference_time() -> NaiveDateTime {
    NaiveDate::from_ymd_opt(2024, 6, 1)
        .unwrap()
        .and_hms_opt(12, 0, 0)
        .unwrap()
}

fn heuristic_engine() -> AnalyticsEngine {
    AnalyticsEngine::with_model(EngineConfig::default(), Arc::new(ModelHandle::disabled()))
        .with_reference_time(reference_time())
}

fn days_ago(days: i64) -> NaiveDateTime {
    reference_time() - Duration::days(days)
}

fn small_training_config() -> TrainingConfig {
    let mut config = TrainingConfig::default();
    config.boosting.n_estimators = 30;
    config
}

/// Three athletes, eight weeks of runs each, a race every ten days
fn write_synthetic_dataset(dir: &Path) {
    let start = NaiveDate::from_ymd_opt(2024, 1, 1)
        .unwrap()
        .and_hms_opt(7, 0, 0)
        .unwrap();

    let mut activities = String::from(
        "id,user_id,name,type,distance,duration,average_pace,start_date,average_heart_rate,elevation_gain,is_race\n",
    );
    let mut races = String::from("user_id,race_date,race_distance,race_time_sec\n");

    for athlete in 0..3 {
        let base_pace = 290.0 + athlete as f64 * 35.0;
        for day in 0..56 {
            if day % 7 == 6 {
                continue;
            }
            let distance = 6000.0 + ((day * 3 + athlete * 5) % 9) as f64 * 1000.0;
            let pace = base_pace + ((day + athlete) % 4) as f64 * 6.0;
            let duration = (distance / 1000.0 * pace).round();
            let ts = start + Duration::days(day as i64);
            writeln!(
                activities,
                "a{}-{},u{},Run,Run,{},{},{},{},{},{},False",
                athlete,
                day,
                athlete,
                distance,
                duration,
                pace,
                ts.format("%Y-%m-%d %H:%M:%S"),
                140 + (day % 15),
                (day % 5) * 20
            )
            .unwrap();
        }

        for (i, race_day) in (14..56).step_by(10).enumerate() {
            let distance = [5000.0, 10000.0, 21097.5][i % 3];
            let time = distance / 1000.0 * (base_pace - 15.0) * (1.0 + distance / 200_000.0);
            let ts = start + Duration::days(race_day) + Duration::hours(2);
            writeln!(
                races,
                "u{},{},{},{:.0}",
                athlete,
                ts.format("%Y-%m-%d %H:%M:%S"),
                distance,
                time
            )
            .unwrap();
        }
    }

    fs::write(dir.join(ACTIVITIES_FILE), activities).unwrap();
    fs::write(dir.join(RACES_FILE), races).unwrap();
}

fn write_summaries_dataset(dir: &Path) {
    let mut summaries = String::from(
        "event_id,timestamp_end_run,total_dist,total_time_elapsed,heart_rate_mean,altitude_ascended\n",
    );
    for i in 0..12 {
        let distance = 5000.0 + i as f64 * 800.0;
        writeln!(
            summaries,
            "s{},{},{},{:.0},{},{}",
            i,
            1_700_000_000 + i * 86_400 * 2,
            distance,
            distance / 1000.0 * 320.0,
            150,
            10 * i
        )
        .unwrap();
    }
    fs::write(dir.join(SUMMARIES_FILE), summaries).unwrap();
}

#[test]
fn test_zero_activities_yield_documented_defaults() {
    let engine = heuristic_engine();

    let fatigue = engine.analyze_fatigue(&[], None);
    assert_eq!(fatigue.fatigue_score, 50.0);
    assert_eq!(fatigue.training_readiness, TrainingReadiness::Medium);

    let load = engine.compute_training_load(&[]);
    assert_eq!(load.ratio, 0.0);
    assert_eq!(load.risk_level, RiskLevel::Low);

    let prediction = engine.predict_race_time(&[], 10000.0, None);
    assert_eq!(prediction.predicted_time, 3600.0);
    assert_eq!(prediction.confidence, 0.1);
}

#[test]
fn test_two_run_example() {
    let engine = heuristic_engine();
    let activities = vec![
        Activity::run("r1", "u1", 5000.0, 1800, days_ago(3)),
        Activity::run("r2", "u1", 15000.0, 5400, days_ago(1)),
    ];

    let prediction = engine.predict_race_time(&activities, 10000.0, None);
    assert!(prediction.predicted_time > 0.0);
    assert!((0.0..=1.0).contains(&prediction.confidence));
    assert!(prediction.confidence_interval.min <= prediction.predicted_time);
    assert!(prediction.confidence_interval.max >= prediction.predicted_time);

    let fatigue = engine.analyze_fatigue(&activities, None);
    assert!((0.0..=100.0).contains(&fatigue.fatigue_score));
    assert!(!fatigue.contributing_factors.is_empty());
}

#[test]
fn test_thirty_days_without_rest() {
    let engine = heuristic_engine();
    let activities: Vec<Activity> = (0..30)
        .map(|d| Activity::run(format!("d{}", d), "u1", 10000.0, 3000, days_ago(30 - d)))
        .collect();

    let fatigue = engine.analyze_fatigue(&activities, None);
    assert_ne!(fatigue.training_readiness, TrainingReadiness::High);
    assert!(fatigue
        .contributing_factors
        .iter()
        .any(|f| f == "Lack of rest days"));

    let load = engine.compute_training_load(&activities);
    assert!(!load.insufficient_data);
    assert_eq!(load.risk_level, RiskLevel::Moderate);
}

#[test]
fn test_fatigue_non_decreasing_when_volume_doubles() {
    let engine = heuristic_engine();
    let week = |scale: f64| -> Vec<Activity> {
        (0..5)
            .map(|d| {
                let distance = 8000.0 * scale;
                Activity::run(
                    format!("w{}", d),
                    "u1",
                    distance,
                    (distance / 1000.0 * 330.0) as u32,
                    days_ago(2 * d + 1),
                )
            })
            .collect()
    };

    let base = engine.analyze_fatigue(&week(1.0), None).fatigue_score;
    let doubled = engine.analyze_fatigue(&week(2.0), None).fatigue_score;
    assert!(doubled >= base);
}

#[test]
fn test_features_complete_for_engine_history() {
    let activities: Vec<Activity> = (0..20)
        .map(|d| Activity::run(format!("f{}", d), "u1", 7000.0, 2300, days_ago(d * 2 + 1)))
        .collect();
    let features = build_features(&normalize(&activities), reference_time(), 21097.5);

    let names: Vec<&str> = features.names().collect();
    assert_eq!(names, FEATURE_ORDER.to_vec());
    assert!(features.values().iter().all(|v| v.is_finite()));
}

proptest! {
    #[test]
    fn test_risk_tier_is_function_of_ratio(ratio in 0.0f64..3.0) {
        let tier = RiskLevel::from_ratio(ratio);
        let expected = if ratio < 0.8 {
            RiskLevel::Low
        } else if ratio > 1.3 {
            RiskLevel::High
        } else {
            RiskLevel::Moderate
        };
        prop_assert_eq!(tier, expected);
    }
}

#[test]
fn test_risk_tier_examples() {
    assert_eq!(RiskLevel::from_ratio(0.5), RiskLevel::Low);
    assert_eq!(RiskLevel::from_ratio(1.0), RiskLevel::Moderate);
    assert_eq!(RiskLevel::from_ratio(1.5), RiskLevel::High);
}

#[test]
fn test_training_pipeline_end_to_end() {
    let data = TempDir::new().unwrap();
    write_synthetic_dataset(data.path());
    let artifact_path = data.path().join("out").join("model.bin");

    let report =
        train_from_directory(data.path(), None, &small_training_config(), &artifact_path).unwrap();
    assert!(report.trained);
    assert_eq!(report.row_count, 15);
    assert!(report.validation_error.is_finite());
    assert!(artifact_path.is_file());

    let artifact = ModelArtifact::load(&artifact_path).unwrap();
    assert_eq!(artifact.row_count, 15);
    assert_eq!(
        artifact.feature_order,
        FEATURE_ORDER.iter().map(|s| s.to_string()).collect::<Vec<_>>()
    );

    // engine picks the artifact up lazily and the global term contributes
    let mut config = EngineConfig::default();
    config.model.artifact_path = artifact_path.clone();
    let engine = AnalyticsEngine::new(config).with_reference_time(reference_time());
    let activities: Vec<Activity> = (0..10)
        .map(|d| Activity::run(format!("p{}", d), "u1", 9000.0, 2850, days_ago(d * 2 + 1)))
        .collect();

    let prediction = engine.predict_race_time(&activities, 10000.0, None);
    let global = prediction
        .estimators
        .iter()
        .find(|e| e.estimator == "global_model")
        .unwrap();
    assert!(global.predicted_time.is_finite());
    assert!(global.predicted_time > 0.0);
    assert!(engine.model().is_loaded());
}

#[test]
fn test_training_is_deterministic() {
    let data = TempDir::new().unwrap();
    write_synthetic_dataset(data.path());
    let first_path = data.path().join("first.bin");
    let second_path = data.path().join("second.bin");

    let config = small_training_config();
    let first = train_from_directory(data.path(), None, &config, &first_path).unwrap();
    let second = train_from_directory(data.path(), None, &config, &second_path).unwrap();
    assert_eq!(first.validation_error, second.validation_error);

    let first = ModelArtifact::load(&first_path).unwrap();
    let second = ModelArtifact::load(&second_path).unwrap();
    assert_eq!(first.checksum, second.checksum);

    let activities: Vec<Activity> = (0..8)
        .map(|d| Activity::run(format!("q{}", d), "u1", 12000.0, 3900, days_ago(d * 3 + 1)))
        .collect();
    let features = build_features(&normalize(&activities), reference_time(), 5000.0);
    assert_eq!(
        first.predict(&features).unwrap().to_bits(),
        second.predict(&features).unwrap().to_bits()
    );
}

#[test]
fn test_secondary_summaries_add_rows() {
    let primary = TempDir::new().unwrap();
    let secondary = TempDir::new().unwrap();
    write_synthetic_dataset(primary.path());
    write_summaries_dataset(secondary.path());
    let artifact_path = primary.path().join("model.bin");

    let report = train_from_directory(
        primary.path(),
        Some(secondary.path()),
        &small_training_config(),
        &artifact_path,
    )
    .unwrap();
    assert_eq!(report.row_count, 15 + 12);
}

#[test]
fn test_summaries_alone_can_train() {
    let secondary = TempDir::new().unwrap();
    write_summaries_dataset(secondary.path());
    let artifact_path = secondary.path().join("model.bin");

    let report =
        train_from_directory(secondary.path(), None, &small_training_config(), &artifact_path)
            .unwrap();
    assert_eq!(report.row_count, 12);
}

#[test]
fn test_training_without_dataset_fails() {
    let empty = TempDir::new().unwrap();
    let engine = {
        let mut config = EngineConfig::default();
        config.model.artifact_path = empty.path().join("model.bin");
        AnalyticsEngine::new(config)
    };

    let result = engine.train_from_directory(empty.path(), None);
    assert!(matches!(
        result,
        Err(RunsightError::Training(TrainingError::NoTrainingRows { .. }))
    ));
    assert!(!engine.model().is_loaded());
}

#[test]
fn test_engine_training_publishes_model() {
    let data = TempDir::new().unwrap();
    write_synthetic_dataset(data.path());

    let mut config = EngineConfig::default();
    config.model.artifact_path = data.path().join("engine.bin");
    config.training = small_training_config();
    let engine = AnalyticsEngine::new(config).with_reference_time(reference_time());
    assert!(!engine.model().is_loaded());

    engine.train_from_directory(data.path(), None).unwrap();
    assert!(engine.model().is_loaded());
}
