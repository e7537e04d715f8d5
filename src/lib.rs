// Library interface for the runsight analytics engine
// Integration tests, benches and the CLI all go through these modules

pub mod config;
pub mod engine;
pub mod error;
pub mod fatigue;
pub mod features;
pub mod import;
pub mod logging;
pub mod model;
pub mod models;
pub mod normalizer;
pub mod predictor;
pub mod signals;
pub mod training;
pub mod training_load;
pub mod trends;

use chrono::NaiveDateTime;
use std::path::Path;
use std::sync::OnceLock;

// Re-export commonly used types for convenience
pub use models::*;
pub use config::{EngineConfig, ModelSettings};
pub use engine::AnalyticsEngine;
pub use error::{ImportError, ModelError, Result, RunsightError, TrainingError};
pub use fatigue::{FatigueAnalyzer, FatigueConfig};
pub use features::{FeatureVector, FEATURE_ORDER};
pub use import::{DatasetImporter, ImportManager, ImportedDataset};
pub use logging::{LogConfig, LogFormat, LogLevel};
pub use model::{ModelArtifact, ModelHandle};
pub use normalizer::{normalize, CanonicalRow, CanonicalSeries};
pub use predictor::{PerformancePredictor, PredictorConfig};
pub use training::{TrainingConfig, TrainingReport};
pub use training_load::{TrainingLoadCalculator, TrainingLoadConfig};
pub use trends::{TrainingTrends, WeeklyTrend};

fn default_engine() -> &'static AnalyticsEngine {
    static ENGINE: OnceLock<AnalyticsEngine> = OnceLock::new();
    ENGINE.get_or_init(AnalyticsEngine::default)
}

/// Acute:chronic workload of `activities` using default settings
pub fn compute_training_load(activities: &[Activity]) -> TrainingLoad {
    default_engine().compute_training_load(activities)
}

/// Fatigue as of now using default settings
pub fn analyze_fatigue(activities: &[Activity], profile: Option<&AthleteProfile>) -> FatigueAnalysis {
    default_engine().analyze_fatigue(activities, profile)
}

/// Race time prediction as of now, using the default global model path
pub fn predict_race_time(
    activities: &[Activity],
    race_distance_m: f64,
    race_type: Option<RaceCategory>,
) -> PerformancePrediction {
    default_engine().predict_race_time(activities, race_distance_m, race_type)
}

pub fn build_features(
    series: &CanonicalSeries,
    reference_time: NaiveDateTime,
    race_distance_m: f64,
) -> FeatureVector {
    features::build_features(series, reference_time, race_distance_m)
}

/// Train the global model into the default artifact path
pub fn train_from_directory(
    dataset_dir: &Path,
    secondary_dataset_dir: Option<&Path>,
) -> Result<TrainingReport> {
    default_engine().train_from_directory(dataset_dir, secondary_dataset_dir)
}
