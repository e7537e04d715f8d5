//! Engine facade tying the analytics components to one configuration and one
//! shared global model.

use chrono::{NaiveDateTime, Utc};
use std::path::Path;
use std::sync::Arc;

use crate::config::EngineConfig;
use crate::error::Result;
use crate::fatigue::FatigueAnalyzer;
use crate::features::{self, FeatureVector};
use crate::model::ModelHandle;
use crate::models::{
    Activity, AthleteProfile, FatigueAnalysis, PerformancePrediction, RaceCategory, TrainingLoad,
};
use crate::normalizer::{normalize, CanonicalSeries};
use crate::predictor::PerformancePredictor;
use crate::training::{self, TrainingReport};
use crate::training_load::TrainingLoadCalculator;
use crate::trends::{self, TrainingTrends};

/// Entry point for all analytics operations.
///
/// The reference time is fixed when set, otherwise the wall clock is read once
/// per call.
pub struct AnalyticsEngine {
    config: EngineConfig,
    reference_time: Option<NaiveDateTime>,
    model: Arc<ModelHandle>,
    load: TrainingLoadCalculator,
    fatigue: FatigueAnalyzer,
    predictor: PerformancePredictor,
}

impl AnalyticsEngine {
    pub fn new(config: EngineConfig) -> Self {
        let model = Arc::new(ModelHandle::new(config.model.artifact_path.clone()));
        if !config.model.lazy_load {
            model.try_load();
        }
        Self::with_model(config, model)
    }

    /// Engine sharing an existing model handle
    pub fn with_model(config: EngineConfig, model: Arc<ModelHandle>) -> Self {
        let load = TrainingLoadCalculator::with_config(config.load.clone());
        let fatigue = FatigueAnalyzer::with_config(config.fatigue.clone());
        let predictor =
            PerformancePredictor::with_config(config.predictor.clone()).with_model(Arc::clone(&model));

        Self {
            config,
            reference_time: None,
            model,
            load,
            fatigue,
            predictor,
        }
    }

    /// Pin "now" for reproducible results
    pub fn with_reference_time(mut self, reference_time: NaiveDateTime) -> Self {
        self.reference_time = Some(reference_time);
        self
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn model(&self) -> &Arc<ModelHandle> {
        &self.model
    }

    pub fn reference_time(&self) -> NaiveDateTime {
        self.reference_time
            .unwrap_or_else(|| Utc::now().naive_utc())
    }

    pub fn compute_training_load(&self, activities: &[Activity]) -> TrainingLoad {
        self.load.calculate(activities)
    }

    pub fn analyze_fatigue(
        &self,
        activities: &[Activity],
        profile: Option<&AthleteProfile>,
    ) -> FatigueAnalysis {
        self.fatigue.analyze(activities, profile, self.reference_time())
    }

    pub fn predict_race_time(
        &self,
        activities: &[Activity],
        race_distance_m: f64,
        race_type: Option<RaceCategory>,
    ) -> PerformancePrediction {
        self.predictor
            .predict(activities, race_distance_m, race_type, self.reference_time())
    }

    pub fn build_features(
        &self,
        series: &CanonicalSeries,
        reference_time: NaiveDateTime,
        race_distance_m: f64,
    ) -> FeatureVector {
        features::build_features(series, reference_time, race_distance_m)
    }

    /// Features of raw activities as of the engine's reference time
    pub fn features_for(&self, activities: &[Activity], race_distance_m: f64) -> FeatureVector {
        features::build_features(&normalize(activities), self.reference_time(), race_distance_m)
    }

    pub fn training_trends(&self, activities: &[Activity], days: u32) -> TrainingTrends {
        trends::training_trends(activities, days, self.reference_time(), &self.load)
    }

    /// Train and persist the global model, then publish it to this engine
    pub fn train_from_directory(
        &self,
        dataset_dir: &Path,
        secondary_dataset_dir: Option<&Path>,
    ) -> Result<TrainingReport> {
        let report = training::train_from_directory(
            dataset_dir,
            secondary_dataset_dir,
            &self.config.training,
            &self.config.model.artifact_path,
        )?;
        if !self.model.reload() {
            tracing::warn!(path = %report.artifact_path.display(), "Trained model could not be published");
        }
        Ok(report)
    }
}

impl Default for AnalyticsEngine {
    fn default() -> Self {
        Self::new(EngineConfig::default())
    }
}
