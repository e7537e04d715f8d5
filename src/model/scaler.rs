use ndarray::{Array1, Array2, ArrayView1, ArrayView2, Axis};
use serde::{Deserialize, Serialize};

/// Per-column standardization, `(x - mean) / std`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StandardScaler {
    means: Array1<f64>,
    scales: Array1<f64>,
}

impl StandardScaler {
    /// Fit column means and population standard deviations.
    ///
    /// Constant columns get a scale of 1 so they map to zero.
    pub fn fit(x: ArrayView2<'_, f64>) -> Self {
        let columns = x.ncols();
        if x.nrows() == 0 {
            return Self {
                means: Array1::zeros(columns),
                scales: Array1::ones(columns),
            };
        }

        let means = x.mean_axis(Axis(0)).unwrap_or_else(|| Array1::zeros(columns));
        let scales = x
            .std_axis(Axis(0), 0.0)
            .mapv(|s| if s.is_finite() && s > f64::EPSILON { s } else { 1.0 });

        Self { means, scales }
    }

    pub fn n_features(&self) -> usize {
        self.means.len()
    }

    pub fn transform(&self, x: ArrayView2<'_, f64>) -> Array2<f64> {
        (&x - &self.means) / &self.scales
    }

    pub fn transform_row(&self, row: ArrayView1<'_, f64>) -> Array1<f64> {
        (&row - &self.means) / &self.scales
    }
}
