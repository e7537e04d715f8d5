use chrono::{DateTime, NaiveDateTime};
use csv::StringRecord;
use std::collections::HashMap;
use std::path::Path;

use crate::error::ImportError;
use crate::models::{Activity, RaceResult};

pub mod summaries;
pub mod synthetic;

/// Canonical activities and labelled race results read from one dataset
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ImportedDataset {
    pub activities: Vec<Activity>,
    pub races: Vec<RaceResult>,
    /// Rows dropped because they could not be interpreted
    pub skipped_rows: usize,
}

impl ImportedDataset {
    pub fn is_empty(&self) -> bool {
        self.activities.is_empty() && self.races.is_empty()
    }

    pub fn merge(&mut self, other: ImportedDataset) {
        self.activities.extend(other.activities);
        self.races.extend(other.races);
        self.skipped_rows += other.skipped_rows;
    }
}

/// Trait for reading one raw dataset layout from a directory
pub trait DatasetImporter {
    /// Check if this importer recognises the directory
    fn can_import(&self, dir: &Path) -> bool;

    /// Read the dataset into canonical activities and race results
    fn import(&self, dir: &Path) -> Result<ImportedDataset, ImportError>;

    /// Get the format name for this importer
    fn format_name(&self) -> &'static str;
}

/// Manager for coordinating the registered dataset importers
pub struct ImportManager {
    importers: Vec<Box<dyn DatasetImporter>>,
}

impl ImportManager {
    /// Create a new import manager with all available importers
    pub fn new() -> Self {
        let importers: Vec<Box<dyn DatasetImporter>> = vec![
            Box::new(synthetic::SyntheticCsvImporter::new()),
            Box::new(summaries::SessionSummaryImporter::new()),
        ];

        Self { importers }
    }

    pub fn with_importers(importers: Vec<Box<dyn DatasetImporter>>) -> Self {
        Self { importers }
    }

    /// Check if any importer recognises the directory
    pub fn can_import(&self, dir: &Path) -> bool {
        self.importers.iter().any(|importer| importer.can_import(dir))
    }

    /// Import with every importer that recognises the directory and merge the results
    pub fn import_directory(&self, dir: &Path) -> Result<ImportedDataset, ImportError> {
        let mut dataset = ImportedDataset::default();
        let mut matched = false;

        for importer in &self.importers {
            if !importer.can_import(dir) {
                continue;
            }
            matched = true;
            let imported = importer.import(dir)?;
            tracing::info!(
                dir = %dir.display(),
                format = importer.format_name(),
                activities = imported.activities.len(),
                races = imported.races.len(),
                skipped = imported.skipped_rows,
                "Imported dataset"
            );
            dataset.merge(imported);
        }

        if !matched {
            return Err(ImportError::UnsupportedDataset {
                path: dir.to_path_buf(),
            });
        }
        Ok(dataset)
    }

    /// Get reference to importers for external use
    pub fn importers(&self) -> &[Box<dyn DatasetImporter>] {
        &self.importers
    }
}

impl Default for ImportManager {
    fn default() -> Self {
        Self::new()
    }
}

/// Header name → column position, with NA-aware field access
pub(crate) struct ColumnIndex {
    file: String,
    positions: HashMap<String, usize>,
}

impl ColumnIndex {
    pub(crate) fn new(file: &str, headers: &StringRecord) -> Self {
        let positions = headers
            .iter()
            .enumerate()
            .map(|(i, name)| (name.trim().to_lowercase(), i))
            .collect();
        Self {
            file: file.to_string(),
            positions,
        }
    }

    pub(crate) fn has(&self, column: &str) -> bool {
        self.positions.contains_key(column)
    }

    pub(crate) fn require(&self, columns: &[&str]) -> Result<(), ImportError> {
        match columns.iter().find(|c| !self.has(c)) {
            Some(missing) => Err(ImportError::MissingColumn {
                file: self.file.clone(),
                column: missing.to_string(),
            }),
            None => Ok(()),
        }
    }

    /// Trimmed field value; empty and NA markers resolve to `None`
    pub(crate) fn text<'r>(&self, record: &'r StringRecord, column: &str) -> Option<&'r str> {
        let value = record.get(*self.positions.get(column)?)?.trim();
        match value {
            "" | "NA" | "NaN" | "nan" | "None" | "null" => None,
            v => Some(v),
        }
    }

    /// Finite numeric field value
    pub(crate) fn number(&self, record: &StringRecord, column: &str) -> Option<f64> {
        self.text(record, column)
            .and_then(|v| v.parse::<f64>().ok())
            .filter(|v| v.is_finite())
    }

    pub(crate) fn flag(&self, record: &StringRecord, column: &str) -> bool {
        matches!(
            self.text(record, column).map(str::to_lowercase).as_deref(),
            Some("true" | "1" | "yes" | "t")
        )
    }

    pub(crate) fn invalid_row(&self, row: usize, reason: impl Into<String>) -> ImportError {
        ImportError::InvalidRow {
            file: self.file.clone(),
            row,
            reason: reason.into(),
        }
    }
}

/// Parse the timestamp spellings found in exported datasets into naive UTC
pub(crate) fn parse_timestamp(value: &str) -> Option<NaiveDateTime> {
    if let Ok(aware) = DateTime::parse_from_rfc3339(value) {
        return Some(aware.naive_utc());
    }

    let formats = [
        "%Y-%m-%d %H:%M:%S",
        "%Y-%m-%dT%H:%M:%S",
        "%Y-%m-%d %H:%M:%S%.f",
        "%Y-%m-%dT%H:%M:%S%.f",
        "%Y-%m-%d_%H-%M-%S",
        "%Y-%m-%d %H:%M:%S%:z",
    ];
    for format in &formats {
        if let Ok(aware) = DateTime::parse_from_str(value, format) {
            return Some(aware.naive_utc());
        }
        if let Ok(naive) = NaiveDateTime::parse_from_str(value, format) {
            return Some(naive);
        }
    }

    if let Ok(date) = chrono::NaiveDate::parse_from_str(value, "%Y-%m-%d") {
        return date.and_hms_opt(0, 0, 0);
    }

    None
}

/// Epoch seconds (possibly fractional) into naive UTC
pub(crate) fn from_epoch_seconds(seconds: f64) -> Option<NaiveDateTime> {
    if !seconds.is_finite() {
        return None;
    }
    let whole = seconds.floor();
    let nanos = ((seconds - whole) * 1e9).round().min(999_999_999.0) as u32;
    DateTime::from_timestamp(whole as i64, nanos).map(|dt| dt.naive_utc())
}
