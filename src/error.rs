//! Unified error hierarchy for runsight
//!
//! The online scoring path degrades to documented sentinel results instead of
//! failing, so these errors only surface at the boundaries: activity
//! validation, dataset import, model artifact I/O and offline training.

use std::path::PathBuf;
use thiserror::Error;

/// Top-level error type for all runsight operations
#[derive(Debug, Error)]
pub enum RunsightError {
    /// Malformed activity or profile input
    #[error("Validation error: {0}")]
    Validation(String),

    /// IO errors
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Dataset import errors
    #[error("Import error: {0}")]
    Import(#[from] ImportError),

    /// Model artifact errors
    #[error("Model error: {0}")]
    Model(#[from] ModelError),

    /// Offline training errors
    #[error("Training error: {0}")]
    Training(#[from] TrainingError),

    /// Configuration errors
    #[error("Configuration error: {0}")]
    Configuration(String),
}

/// Dataset import errors
#[derive(Debug, Error)]
pub enum ImportError {
    /// No registered importer recognises the directory
    #[error("No importer found for dataset directory: {path}")]
    UnsupportedDataset { path: PathBuf },

    /// A required column is missing from a dataset file
    #[error("Missing required column '{column}' in {file}")]
    MissingColumn { file: String, column: String },

    /// CSV reader error
    #[error("CSV error in {file}{}: {reason}", .line.map(|l| format!(" at line {}", l)).unwrap_or_default())]
    Csv {
        file: String,
        line: Option<u64>,
        reason: String,
    },

    /// A single row could not be interpreted
    #[error("Invalid row {row} in {file}: {reason}")]
    InvalidRow {
        file: String,
        row: usize,
        reason: String,
    },
}

/// Model artifact errors
#[derive(Debug, Error)]
pub enum ModelError {
    /// Artifact file does not exist
    #[error("Model artifact not found: {path}")]
    NotFound { path: PathBuf },

    /// Artifact file could not be read or written
    #[error("Artifact IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Bundle could not be encoded or decoded
    #[error("Serialization error: {0}")]
    Serialization(String),

    /// Stored checksum does not match the decoded pipeline
    #[error("Checksum mismatch: expected {expected}, got {actual}")]
    ChecksumMismatch { expected: String, actual: String },

    /// Artifact was written by an incompatible format version
    #[error("Unsupported artifact version: {version}")]
    UnsupportedVersion { version: u32 },

    /// Pipeline was asked to predict before being fitted, or with a bad shape
    #[error("Invalid model input: {0}")]
    InvalidInput(String),
}

/// Offline training errors
#[derive(Debug, Error)]
pub enum TrainingError {
    /// Nothing to train on
    #[error("No training rows created. Ensure dataset exists and is non-empty: {path}")]
    NoTrainingRows { path: PathBuf },

    /// Too few rows to hold out a validation split
    #[error("Insufficient training rows: need at least {required}, got {actual}")]
    InsufficientRows { required: usize, actual: usize },

    /// Invalid training parameter
    #[error("Invalid training parameter {parameter}={value}")]
    InvalidParameter { parameter: String, value: String },
}

/// Result type alias for runsight operations
pub type Result<T> = std::result::Result<T, RunsightError>;

impl RunsightError {
    /// Check if error is retryable
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            RunsightError::Io(_) | RunsightError::Model(ModelError::NotFound { .. })
        )
    }

    /// Get error severity level
    pub fn severity(&self) -> ErrorSeverity {
        match self {
            RunsightError::Model(ModelError::NotFound { .. }) => ErrorSeverity::Info,
            RunsightError::Validation(_) => ErrorSeverity::Warning,
            RunsightError::Import(ImportError::InvalidRow { .. }) => ErrorSeverity::Warning,
            RunsightError::Model(ModelError::ChecksumMismatch { .. }) => ErrorSeverity::Critical,
            RunsightError::Training(_) => ErrorSeverity::Error,
            _ => ErrorSeverity::Error,
        }
    }

    /// Log the error at the level its severity calls for
    pub fn report(&self) {
        let retryable = self.is_retryable();
        match self.severity().to_tracing_level() {
            tracing::Level::ERROR => tracing::error!(error = %self, retryable, "Operation failed"),
            tracing::Level::WARN => tracing::warn!(error = %self, retryable, "Operation failed"),
            _ => tracing::info!(error = %self, retryable, "Operation failed"),
        }
    }

    /// Get user-friendly error message
    pub fn user_message(&self) -> String {
        match self {
            RunsightError::Model(ModelError::NotFound { path }) => {
                format!(
                    "No trained model at {}. Predictions will use heuristic estimators only.",
                    path.display()
                )
            }
            RunsightError::Training(TrainingError::NoTrainingRows { path }) => {
                format!(
                    "Could not build any training examples from {}. Check that the dataset files exist and contain races.",
                    path.display()
                )
            }
            RunsightError::Import(ImportError::UnsupportedDataset { path }) => {
                format!("Unrecognised dataset layout in {}", path.display())
            }
            _ => self.to_string(),
        }
    }
}

impl ImportError {
    /// Wrap a CSV reader error for `file`, keeping the line it occurred on
    pub fn csv(file: impl Into<String>, error: csv::Error) -> Self {
        ImportError::Csv {
            file: file.into(),
            line: error.position().map(|p| p.line()),
            reason: error.to_string(),
        }
    }
}

impl From<bincode::Error> for ModelError {
    fn from(error: bincode::Error) -> Self {
        ModelError::Serialization(error.to_string())
    }
}

/// Error severity levels
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorSeverity {
    /// Critical error requiring immediate attention
    Critical,
    /// Error that prevents the operation
    Error,
    /// Warning that doesn't prevent operation
    Warning,
    /// Informational message
    Info,
}

impl ErrorSeverity {
    /// Convert to tracing level
    pub fn to_tracing_level(&self) -> tracing::Level {
        match self {
            ErrorSeverity::Critical => tracing::Level::ERROR,
            ErrorSeverity::Error => tracing::Level::ERROR,
            ErrorSeverity::Warning => tracing::Level::WARN,
            ErrorSeverity::Info => tracing::Level::INFO,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_severity() {
        let err = RunsightError::Model(ModelError::NotFound {
            path: PathBuf::from("/models/global.bin"),
        });
        assert_eq!(err.severity(), ErrorSeverity::Info);

        let err = RunsightError::Model(ModelError::ChecksumMismatch {
            expected: "ab".to_string(),
            actual: "cd".to_string(),
        });
        assert_eq!(err.severity(), ErrorSeverity::Critical);
    }

    #[test]
    fn test_error_retryable() {
        let err = RunsightError::Model(ModelError::NotFound {
            path: PathBuf::from("missing.bin"),
        });
        assert!(err.is_retryable());

        let err = RunsightError::Validation("bad".to_string());
        assert!(!err.is_retryable());
    }

    #[test]
    fn test_severity_maps_to_tracing_level() {
        assert_eq!(ErrorSeverity::Critical.to_tracing_level(), tracing::Level::ERROR);
        assert_eq!(ErrorSeverity::Warning.to_tracing_level(), tracing::Level::WARN);
        assert_eq!(ErrorSeverity::Info.to_tracing_level(), tracing::Level::INFO);

        // logging without a subscriber installed is a no-op
        RunsightError::Validation("bad".to_string()).report();
    }

    #[test]
    fn test_csv_error_keeps_file_and_line() {
        let mut reader = csv::ReaderBuilder::new()
            .has_headers(true)
            .from_reader("a,b\n1,2\n3\n".as_bytes());
        let error = reader
            .records()
            .find_map(|r| r.err())
            .unwrap();

        match ImportError::csv("synthetic_activities.csv", error) {
            ImportError::Csv { file, line, .. } => {
                assert_eq!(file, "synthetic_activities.csv");
                assert_eq!(line, Some(3));
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn test_user_messages() {
        let err = RunsightError::Training(TrainingError::NoTrainingRows {
            path: PathBuf::from("data"),
        });
        assert!(err.user_message().contains("Could not build any training examples"));
    }
}
