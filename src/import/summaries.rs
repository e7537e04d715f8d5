use chrono::NaiveDateTime;
use csv::{ReaderBuilder, StringRecord};
use std::path::Path;

use crate::error::ImportError;
use crate::import::{from_epoch_seconds, parse_timestamp, ColumnIndex, DatasetImporter, ImportedDataset};
use crate::models::{Activity, RaceResult};

pub const SUMMARIES_FILE: &str = "s1_summaries.csv";

/// Owner assigned to every session of a summaries export
pub const SUMMARY_ATHLETE_ID: &str = "summary_user_1";

const METERS_PER_MILE: f64 = 1609.34;
const MIN_DISTANCE_M: f64 = 1000.0;
const MIN_DURATION_S: f64 = 60.0;

/// Importer for per-session summary exports from a single runner.
///
/// Every session is a run and doubles as a labelled performance: its own
/// distance and finishing time.
pub struct SessionSummaryImporter;

impl SessionSummaryImporter {
    pub fn new() -> Self {
        Self
    }

    /// Session time: end-of-run stamp, else stop stamp, else the formatted datetime
    fn end_time(columns: &ColumnIndex, record: &StringRecord) -> Option<NaiveDateTime> {
        ["timestamp_end_run", "timestamp_stop", "datetime_ts"]
            .iter()
            .find_map(|column| {
                let value = columns.text(record, column)?;
                match value.parse::<f64>() {
                    Ok(seconds) => from_epoch_seconds(seconds),
                    Err(_) => parse_timestamp(value),
                }
            })
    }

    fn distance_m(columns: &ColumnIndex, record: &StringRecord) -> Option<f64> {
        columns
            .number(record, "total_dist")
            .or_else(|| columns.number(record, "total_distance").map(|mi| mi * METERS_PER_MILE))
    }

    /// Elapsed time, else running time, else distance over average speed.
    ///
    /// Average speed is read as km/h when that gives 10 minutes to 5 hours,
    /// otherwise as m/s.
    fn duration_s(columns: &ColumnIndex, record: &StringRecord, distance_m: f64) -> Option<f64> {
        if let Some(seconds) = columns
            .number(record, "total_time_elapsed")
            .or_else(|| columns.number(record, "total_time_spent_running"))
        {
            return Some(seconds);
        }

        let speed = columns.number(record, "avg_speed").filter(|s| *s > 0.0)?;
        let as_kmh = distance_m / (speed / 3.6);
        if as_kmh > 600.0 && as_kmh < 18000.0 {
            Some(as_kmh)
        } else {
            Some(distance_m / speed)
        }
    }

    fn parse_session(
        columns: &ColumnIndex,
        record: &StringRecord,
        row: usize,
    ) -> Result<Activity, ImportError> {
        let start = Self::end_time(columns, record)
            .ok_or_else(|| columns.invalid_row(row, "no usable timestamp"))?;
        let distance = Self::distance_m(columns, record)
            .filter(|d| *d > MIN_DISTANCE_M)
            .ok_or_else(|| columns.invalid_row(row, "missing or too short distance"))?;
        let duration = Self::duration_s(columns, record, distance)
            .filter(|d| d.is_finite() && *d > MIN_DURATION_S)
            .ok_or_else(|| columns.invalid_row(row, "missing or too short duration"))?;

        let id = columns
            .text(record, "event_id")
            .map(str::to_string)
            .unwrap_or_else(|| row.to_string());

        let mut activity = Activity::run(id, SUMMARY_ATHLETE_ID, distance, duration.round() as u32, start);
        activity.name = "Summary Run".to_string();
        activity.average_heart_rate = columns.number(record, "heart_rate_mean");
        activity.elevation_gain = Some(columns.number(record, "altitude_ascended").unwrap_or(0.0));
        activity.is_race = true;
        Ok(activity)
    }
}

impl Default for SessionSummaryImporter {
    fn default() -> Self {
        Self::new()
    }
}

impl DatasetImporter for SessionSummaryImporter {
    fn can_import(&self, dir: &Path) -> bool {
        dir.join(SUMMARIES_FILE).is_file()
    }

    fn import(&self, dir: &Path) -> Result<ImportedDataset, ImportError> {
        let mut reader = ReaderBuilder::new()
            .has_headers(true)
            .flexible(true)
            .trim(csv::Trim::All)
            .from_path(dir.join(SUMMARIES_FILE))
            .map_err(|e| ImportError::csv(SUMMARIES_FILE, e))?;
        let columns = ColumnIndex::new(
            SUMMARIES_FILE,
            reader.headers().map_err(|e| ImportError::csv(SUMMARIES_FILE, e))?,
        );

        let mut dataset = ImportedDataset::default();
        for (row, record) in reader.records().enumerate() {
            let record = record.map_err(|e| ImportError::csv(SUMMARIES_FILE, e))?;
            match Self::parse_session(&columns, &record, row) {
                Ok(activity) => dataset.activities.push(activity),
                Err(e) => {
                    tracing::debug!(error = %e, "Dropping summary row");
                    dataset.skipped_rows += 1;
                }
            }
        }

        dataset
            .activities
            .sort_by_key(|a| a.start_date.to_naive_utc());
        dataset.races = dataset
            .activities
            .iter()
            .map(|a| RaceResult {
                athlete_id: a.athlete_id.clone(),
                race_date: a.start_date.to_naive_utc(),
                race_distance: a.distance,
                race_time_sec: a.duration as f64,
            })
            .collect();

        if dataset.skipped_rows > 0 {
            tracing::warn!(
                skipped = dataset.skipped_rows,
                kept = dataset.activities.len(),
                "Dropped summary rows without usable time, distance or duration"
            );
        }
        Ok(dataset)
    }

    fn format_name(&self) -> &'static str {
        "session-summaries"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    fn import(contents: &str) -> ImportedDataset {
        let dir = TempDir::new().unwrap();
        fs::write(dir.path().join(SUMMARIES_FILE), contents).unwrap();
        let importer = SessionSummaryImporter::new();
        assert!(importer.can_import(dir.path()));
        importer.import(dir.path()).unwrap()
    }

    #[test]
    fn test_primary_columns() {
        let dataset = import(
            "event_id,timestamp_end_run,total_dist,total_time_elapsed,heart_rate_mean,altitude_ascended\n\
             e2,1506115052,8000,2400,148,55\n\
             e1,1506028652,5000,1500,NA,\n",
        );
        assert_eq!(dataset.activities.len(), 2);
        assert_eq!(dataset.races.len(), 2);

        let first = &dataset.activities[0];
        assert_eq!(first.id, "e1");
        assert_eq!(first.athlete_id, SUMMARY_ATHLETE_ID);
        assert_eq!(first.start_date.to_naive_utc().to_string(), "2017-09-21 21:17:32");
        assert_eq!(first.elevation_gain, Some(0.0));
        assert!(first.is_race);
        assert_eq!(dataset.races[1].race_time_sec, 2400.0);
        assert_eq!(dataset.races[1].race_distance, 8000.0);
    }

    #[test]
    fn test_fallback_columns() {
        let dataset = import(
            "datetime_ts,total_distance,total_dist,avg_speed\n\
             2017-09-21_21-17-32,,10000,12\n\
             2017-09-22 07:00:00,3.1,,\n",
        );
        // second row has no duration source at all
        assert_eq!(dataset.activities.len(), 1);
        assert_eq!(dataset.skipped_rows, 1);
        // 12 km/h over 10 km is 3000 s
        assert_eq!(dataset.activities[0].duration, 3000);
    }

    #[test]
    fn test_speed_in_meters_per_second() {
        let dataset = import("timestamp_stop,total_dist,avg_speed\n1506028652,10000,3.2\n");
        // km/h reading gives 11250 s; still plausible so it is kept
        assert_eq!(dataset.activities[0].duration, 11250);

        let dataset = import("timestamp_stop,total_dist,avg_speed\n1506028652,2000,3.2\n");
        // km/h reading gives 2250 s
        assert_eq!(dataset.activities[0].duration, 2250);

        let dataset = import("timestamp_stop,total_dist,avg_speed\n1506028652,42000,2.0\n");
        // km/h reading gives 75600 s, out of range, so m/s: 21000 s
        assert_eq!(dataset.activities[0].duration, 21000);
    }

    #[test]
    fn test_drops_tiny_sessions() {
        let dataset = import("timestamp_end_run,total_dist,total_time_elapsed\n1506028652,900,400\n1506028652,5000,30\n");
        assert!(dataset.activities.is_empty());
        assert_eq!(dataset.skipped_rows, 2);
    }
}
