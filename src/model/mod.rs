//! Global regression model: standardization followed by gradient-boosted
//! trees, persisted together with the feature order it was trained on.

pub mod artifact;
pub mod gbr;
pub mod handle;
pub mod scaler;

pub use artifact::{ModelArtifact, ARTIFACT_VERSION};
pub use gbr::{BoostingParams, GradientBoostedTrees, RegressionTree};
pub use handle::ModelHandle;
pub use scaler::StandardScaler;

use ndarray::{Array1, ArrayView1, ArrayView2};
use serde::{Deserialize, Serialize};

use crate::error::{ModelError, TrainingError};

/// Scaler and booster fitted together
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RegressionPipeline {
    scaler: StandardScaler,
    booster: GradientBoostedTrees,
}

impl RegressionPipeline {
    pub fn fit(
        x: ArrayView2<'_, f64>,
        y: ArrayView1<'_, f64>,
        params: &BoostingParams,
    ) -> Result<Self, TrainingError> {
        Self::fit_with_progress(x, y, params, |_| {})
    }

    pub fn fit_with_progress<F>(
        x: ArrayView2<'_, f64>,
        y: ArrayView1<'_, f64>,
        params: &BoostingParams,
        on_stage: F,
    ) -> Result<Self, TrainingError>
    where
        F: FnMut(usize),
    {
        let scaler = StandardScaler::fit(x);
        let scaled = scaler.transform(x);
        let booster = GradientBoostedTrees::fit_with_progress(scaled.view(), y, params, on_stage)?;
        Ok(Self { scaler, booster })
    }

    pub fn n_features(&self) -> usize {
        self.scaler.n_features()
    }

    pub fn predict_row(&self, row: ArrayView1<'_, f64>) -> Result<f64, ModelError> {
        if row.len() != self.n_features() {
            return Err(ModelError::InvalidInput(format!(
                "expected {} features, got {}",
                self.n_features(),
                row.len()
            )));
        }
        let scaled = self.scaler.transform_row(row);
        Ok(self.booster.predict_row(scaled.view()))
    }

    /// Predictions for every row of `x`
    pub fn predict(&self, x: ArrayView2<'_, f64>) -> Result<Array1<f64>, ModelError> {
        x.rows().into_iter().map(|row| self.predict_row(row)).collect()
    }

    pub fn booster(&self) -> &GradientBoostedTrees {
        &self.booster
    }
}
