//! Offline training of the global race-time model
//!
//! Imported race results are paired with the feature vector of the athlete's
//! run history as of the race, then a scaler + boosted-tree pipeline is fitted
//! and written out together with the feature order.

use indicatif::{ProgressBar, ProgressStyle};
use ndarray::{Array1, Array2};
use rand::rngs::StdRng;
use rand::seq::{index, SliceRandom};
use rand::SeedableRng;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use crate::error::{ImportError, Result, TrainingError};
use crate::features::{build_features, FEATURE_ORDER};
use crate::import::{ImportManager, ImportedDataset};
use crate::model::{BoostingParams, ModelArtifact, RegressionPipeline};
use crate::models::RaceResult;
use crate::normalizer::{normalize, CanonicalSeries};

/// Offline training configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrainingConfig {
    /// Row cap applied by seeded subsampling
    pub max_rows: usize,
    pub seed: u64,
    /// Fraction of rows held out for validation
    pub validation_fraction: f64,
    pub boosting: BoostingParams,
    /// Summaries directory used when none is passed explicitly
    pub secondary_dataset_dir: Option<PathBuf>,
    pub show_progress: bool,
}

impl Default for TrainingConfig {
    fn default() -> Self {
        TrainingConfig {
            max_rows: 50_000,
            seed: 42,
            validation_fraction: 0.2,
            boosting: BoostingParams::default(),
            secondary_dataset_dir: None,
            show_progress: false,
        }
    }
}

impl TrainingConfig {
    fn validate(&self) -> std::result::Result<(), TrainingError> {
        if !(self.validation_fraction > 0.0 && self.validation_fraction < 1.0) {
            return Err(TrainingError::InvalidParameter {
                parameter: "validation_fraction".to_string(),
                value: self.validation_fraction.to_string(),
            });
        }
        if self.max_rows < 2 {
            return Err(TrainingError::InvalidParameter {
                parameter: "max_rows".to_string(),
                value: self.max_rows.to_string(),
            });
        }
        self.boosting.validate()
    }
}

/// Outcome of a training run
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrainingReport {
    pub trained: bool,
    pub row_count: usize,
    /// Validation mean absolute error, seconds
    pub validation_error: f64,
    pub artifact_path: PathBuf,
}

/// Supervised rows in canonical feature order
#[derive(Debug, Clone, Default, PartialEq)]
pub struct TrainingRows {
    pub features: Vec<Vec<f64>>,
    pub labels: Vec<f64>,
}

impl TrainingRows {
    pub fn len(&self) -> usize {
        self.labels.len()
    }

    pub fn is_empty(&self) -> bool {
        self.labels.is_empty()
    }

    fn extend(&mut self, other: TrainingRows) {
        self.features.extend(other.features);
        self.labels.extend(other.labels);
    }

    fn select(&self, indices: &[usize]) -> TrainingRows {
        TrainingRows {
            features: indices.iter().map(|&i| self.features[i].clone()).collect(),
            labels: indices.iter().map(|&i| self.labels[i]).collect(),
        }
    }

    fn to_arrays(&self) -> std::result::Result<(Array2<f64>, Array1<f64>), TrainingError> {
        let flat: Vec<f64> = self.features.iter().flatten().copied().collect();
        let x = Array2::from_shape_vec((self.len(), FEATURE_ORDER.len()), flat).map_err(|e| {
            TrainingError::InvalidParameter {
                parameter: "feature_matrix".to_string(),
                value: e.to_string(),
            }
        })?;
        Ok((x, Array1::from_vec(self.labels.clone())))
    }
}

/// One row per race result: the athlete's run history as of the race, labelled
/// with the finishing time
pub fn build_training_rows(dataset: &ImportedDataset) -> TrainingRows {
    let mut races_by_athlete: BTreeMap<&str, Vec<&RaceResult>> = BTreeMap::new();
    for race in &dataset.races {
        races_by_athlete
            .entry(race.athlete_id.as_str())
            .or_default()
            .push(race);
    }

    let runs = normalize(&dataset.activities).runs();
    let mut rows = TrainingRows::default();

    for (athlete_id, races) in races_by_athlete {
        let history: CanonicalSeries = runs.for_athlete(athlete_id);
        if history.is_empty() {
            tracing::debug!(athlete_id, "No runs for athlete with race results");
            continue;
        }

        for race in races {
            if !race.race_time_sec.is_finite() || race.race_time_sec <= 0.0 {
                continue;
            }
            let features = build_features(&history, race.race_date, race.race_distance);
            rows.features.push(
                features
                    .ordered_by(&FEATURE_ORDER)
                    .into_iter()
                    .map(|v| if v.is_finite() { v } else { 0.0 })
                    .collect(),
            );
            rows.labels.push(race.race_time_sec);
        }
    }

    rows
}

fn import_rows(manager: &ImportManager, dir: &Path) -> Result<TrainingRows> {
    match manager.import_directory(dir) {
        Ok(dataset) => Ok(build_training_rows(&dataset)),
        Err(ImportError::UnsupportedDataset { path }) => {
            tracing::warn!(path = %path.display(), "No recognised dataset, skipping");
            Ok(TrainingRows::default())
        }
        Err(e) => Err(e.into()),
    }
}

fn progress_bar(config: &TrainingConfig) -> ProgressBar {
    if !config.show_progress {
        return ProgressBar::hidden();
    }
    let pb = ProgressBar::new(config.boosting.n_estimators as u64);
    let style = ProgressStyle::default_bar()
        .template("{spinner:.green} [{elapsed_precise}] [{bar:40.cyan/blue}] {pos}/{len} stages")
        .map(|s| s.progress_chars("#>-"))
        .unwrap_or_else(|_| ProgressStyle::default_bar());
    pb.set_style(style);
    pb
}

/// Build rows from the primary (and optional secondary) dataset directory, fit
/// the pipeline and write the artifact to `artifact_path`
#[tracing::instrument(skip(config))]
pub fn train_from_directory(
    dataset_dir: &Path,
    secondary_dataset_dir: Option<&Path>,
    config: &TrainingConfig,
    artifact_path: &Path,
) -> Result<TrainingReport> {
    config.validate()?;
    let manager = ImportManager::new();

    let mut rows = import_rows(&manager, dataset_dir)?;
    tracing::info!(rows = rows.len(), dir = %dataset_dir.display(), "Built rows from primary dataset");

    let secondary = secondary_dataset_dir
        .map(Path::to_path_buf)
        .or_else(|| {
            config
                .secondary_dataset_dir
                .clone()
                .filter(|dir| manager.can_import(dir))
        });
    if let Some(dir) = secondary {
        let extra = import_rows(&manager, &dir)?;
        tracing::info!(rows = extra.len(), dir = %dir.display(), "Built rows from secondary dataset");
        rows.extend(extra);
    }

    if rows.is_empty() {
        return Err(TrainingError::NoTrainingRows {
            path: dataset_dir.to_path_buf(),
        }
        .into());
    }

    let mut rng = StdRng::seed_from_u64(config.seed);
    if rows.len() > config.max_rows {
        let keep = index::sample(&mut rng, rows.len(), config.max_rows).into_vec();
        tracing::info!(from = rows.len(), to = keep.len(), "Subsampled training rows");
        rows = rows.select(&keep);
    }

    if rows.len() < 2 {
        return Err(TrainingError::InsufficientRows {
            required: 2,
            actual: rows.len(),
        }
        .into());
    }

    let mut order: Vec<usize> = (0..rows.len()).collect();
    order.shuffle(&mut rng);
    let n_validation = ((rows.len() as f64 * config.validation_fraction).ceil() as usize)
        .clamp(1, rows.len() - 1);
    let (validation_idx, train_idx) = order.split_at(n_validation);
    let (x_train, y_train) = rows.select(train_idx).to_arrays()?;
    let (x_val, y_val) = rows.select(validation_idx).to_arrays()?;

    tracing::info!(
        train = train_idx.len(),
        validation = validation_idx.len(),
        stages = config.boosting.n_estimators,
        "Fitting global model"
    );
    let pb = progress_bar(config);
    let pipeline = RegressionPipeline::fit_with_progress(
        x_train.view(),
        y_train.view(),
        &config.boosting,
        |_| pb.inc(1),
    )?;
    pb.finish_and_clear();

    let predictions = pipeline.predict(x_val.view())?;
    let validation_error = (&predictions - &y_val)
        .mapv(f64::abs)
        .mean()
        .unwrap_or(0.0);

    let feature_order = FEATURE_ORDER.iter().map(|s| s.to_string()).collect();
    let artifact = ModelArtifact::new(pipeline, feature_order, rows.len(), validation_error)?;
    artifact.save(artifact_path)?;

    tracing::info!(
        rows = rows.len(),
        validation_mae = validation_error,
        path = %artifact_path.display(),
        "Trained global model"
    );

    Ok(TrainingReport {
        trained: true,
        row_count: rows.len(),
        validation_error,
        artifact_path: artifact_path.to_path_buf(),
    })
}
