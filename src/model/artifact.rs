use chrono::{DateTime, Utc};
use flate2::{read::GzDecoder, write::GzEncoder, Compression};
use ndarray::Array1;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::fs;
use std::io::{Read, Write};
use std::path::Path;

use super::RegressionPipeline;
use crate::error::ModelError;
use crate::features::FeatureVector;

/// Current on-disk format version
pub const ARTIFACT_VERSION: u32 = 1;

/// Fitted pipeline paired with the exact feature order it expects
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModelArtifact {
    pub version: u32,
    pub pipeline: RegressionPipeline,
    pub feature_order: Vec<String>,
    pub created_at: DateTime<Utc>,
    /// Rows used for fitting and validation
    pub row_count: usize,
    /// Mean absolute error on the held-out split, seconds
    pub validation_mae: f64,
    /// SHA-256 of the encoded pipeline and feature order
    pub checksum: String,
}

impl ModelArtifact {
    pub fn new(
        pipeline: RegressionPipeline,
        feature_order: Vec<String>,
        row_count: usize,
        validation_mae: f64,
    ) -> Result<Self, ModelError> {
        if pipeline.n_features() != feature_order.len() {
            return Err(ModelError::InvalidInput(format!(
                "pipeline expects {} features but {} names were given",
                pipeline.n_features(),
                feature_order.len()
            )));
        }
        let checksum = Self::compute_checksum(&pipeline, &feature_order)?;
        Ok(Self {
            version: ARTIFACT_VERSION,
            pipeline,
            feature_order,
            created_at: Utc::now(),
            row_count,
            validation_mae,
            checksum,
        })
    }

    fn compute_checksum(
        pipeline: &RegressionPipeline,
        feature_order: &[String],
    ) -> Result<String, ModelError> {
        let mut hasher = Sha256::new();
        hasher.update(bincode::serialize(pipeline)?);
        hasher.update(bincode::serialize(feature_order)?);
        Ok(format!("{:x}", hasher.finalize()))
    }

    /// Predicted seconds for a feature vector, looked up by the stored order
    pub fn predict(&self, features: &FeatureVector) -> Result<f64, ModelError> {
        let row = Array1::from_vec(features.ordered_by(&self.feature_order));
        let prediction = self.pipeline.predict_row(row.view())?;
        if prediction.is_finite() {
            Ok(prediction)
        } else {
            Err(ModelError::InvalidInput(format!(
                "non-finite prediction {}",
                prediction
            )))
        }
    }

    /// Encode as gzip-compressed bincode
    pub fn to_bytes(&self) -> Result<Vec<u8>, ModelError> {
        let serialized = bincode::serialize(self)?;
        let mut encoder = GzEncoder::new(Vec::new(), Compression::default());
        encoder.write_all(&serialized)?;
        Ok(encoder.finish()?)
    }

    /// Decode and verify version and checksum
    pub fn from_bytes(bytes: &[u8]) -> Result<Self, ModelError> {
        let mut decoder = GzDecoder::new(bytes);
        let mut decompressed = Vec::new();
        decoder.read_to_end(&mut decompressed)?;

        let artifact: ModelArtifact = bincode::deserialize(&decompressed)?;
        if artifact.version != ARTIFACT_VERSION {
            return Err(ModelError::UnsupportedVersion {
                version: artifact.version,
            });
        }

        let actual = Self::compute_checksum(&artifact.pipeline, &artifact.feature_order)?;
        if actual != artifact.checksum {
            return Err(ModelError::ChecksumMismatch {
                expected: artifact.checksum,
                actual,
            });
        }
        Ok(artifact)
    }

    pub fn save(&self, path: &Path) -> Result<(), ModelError> {
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent)?;
        }
        let bytes = self.to_bytes()?;
        fs::write(path, &bytes)?;
        tracing::info!(
            path = %path.display(),
            bytes = bytes.len(),
            features = self.feature_order.len(),
            "Saved model artifact"
        );
        Ok(())
    }

    pub fn load(path: &Path) -> Result<Self, ModelError> {
        if !path.exists() {
            return Err(ModelError::NotFound {
                path: path.to_path_buf(),
            });
        }
        let bytes = fs::read(path)?;
        Self::from_bytes(&bytes)
    }
}
