use csv::ReaderBuilder;
use std::path::Path;

use crate::error::ImportError;
use crate::import::{parse_timestamp, ColumnIndex, DatasetImporter, ImportedDataset};
use crate::models::{Activity, ActivityKind, RaceResult};

pub const ACTIVITIES_FILE: &str = "synthetic_activities.csv";
pub const RACES_FILE: &str = "synthetic_races.csv";

const ACTIVITY_COLUMNS: [&str; 5] = ["start_date", "type", "distance", "average_pace", "user_id"];
const RACE_COLUMNS: [&str; 4] = ["user_id", "race_date", "race_distance", "race_time_sec"];

/// Importer for the generated activities/races CSV pair
pub struct SyntheticCsvImporter;

impl SyntheticCsvImporter {
    pub fn new() -> Self {
        Self
    }

    fn read_activities(&self, path: &Path, dataset: &mut ImportedDataset) -> Result<(), ImportError> {
        let mut reader = ReaderBuilder::new()
            .has_headers(true)
            .trim(csv::Trim::All)
            .from_path(path)
            .map_err(|e| ImportError::csv(ACTIVITIES_FILE, e))?;
        let columns = ColumnIndex::new(
            ACTIVITIES_FILE,
            reader.headers().map_err(|e| ImportError::csv(ACTIVITIES_FILE, e))?,
        );
        columns.require(&ACTIVITY_COLUMNS)?;

        for (row, record) in reader.records().enumerate() {
            let record = record.map_err(|e| ImportError::csv(ACTIVITIES_FILE, e))?;
            match Self::parse_activity(&columns, &record, row) {
                Ok(activity) => dataset.activities.push(activity),
                Err(e) => {
                    tracing::warn!(error = %e, "Skipping activity row");
                    dataset.skipped_rows += 1;
                }
            }
        }
        Ok(())
    }

    fn parse_activity(
        columns: &ColumnIndex,
        record: &csv::StringRecord,
        row: usize,
    ) -> Result<Activity, ImportError> {
        let start = columns
            .text(record, "start_date")
            .and_then(parse_timestamp)
            .ok_or_else(|| columns.invalid_row(row, "unparsable start_date"))?;
        let athlete_id = columns
            .text(record, "user_id")
            .ok_or_else(|| columns.invalid_row(row, "missing user_id"))?;
        let kind = columns
            .text(record, "type")
            .and_then(ActivityKind::parse)
            .ok_or_else(|| columns.invalid_row(row, "unknown activity type"))?;
        let distance = columns
            .number(record, "distance")
            .filter(|d| *d >= 0.0)
            .ok_or_else(|| columns.invalid_row(row, "invalid distance"))?;
        let average_pace = columns.number(record, "average_pace").filter(|p| *p > 0.0);

        // Duration falls back to pace × distance when the column is absent
        let duration = columns
            .number(record, "duration")
            .or_else(|| average_pace.map(|p| p * distance / 1000.0))
            .filter(|d| *d >= 1.0)
            .ok_or_else(|| columns.invalid_row(row, "missing duration"))?;

        let id = columns
            .text(record, "id")
            .map(str::to_string)
            .unwrap_or_else(|| format!("{}-{}", athlete_id, row));

        let mut activity = Activity::run(id, athlete_id, distance, duration.round() as u32, start);
        activity.kind = kind;
        activity.name = columns.text(record, "name").unwrap_or_default().to_string();
        activity.average_pace = average_pace.or(activity.average_pace);
        activity.average_heart_rate = columns.number(record, "average_heart_rate");
        activity.elevation_gain = columns.number(record, "elevation_gain");
        activity.is_race = columns.flag(record, "is_race");
        Ok(activity)
    }

    fn read_races(&self, path: &Path, dataset: &mut ImportedDataset) -> Result<(), ImportError> {
        let mut reader = ReaderBuilder::new()
            .has_headers(true)
            .trim(csv::Trim::All)
            .from_path(path)
            .map_err(|e| ImportError::csv(RACES_FILE, e))?;
        let columns = ColumnIndex::new(
            RACES_FILE,
            reader.headers().map_err(|e| ImportError::csv(RACES_FILE, e))?,
        );
        columns.require(&RACE_COLUMNS)?;

        for (row, record) in reader.records().enumerate() {
            let record = record.map_err(|e| ImportError::csv(RACES_FILE, e))?;
            let race = (|| {
                Some(RaceResult {
                    athlete_id: columns.text(&record, "user_id")?.to_string(),
                    race_date: columns.text(&record, "race_date").and_then(parse_timestamp)?,
                    race_distance: columns.number(&record, "race_distance").filter(|d| *d > 0.0)?,
                    race_time_sec: columns.number(&record, "race_time_sec").filter(|t| *t > 0.0)?,
                })
            })();

            match race {
                Some(race) => dataset.races.push(race),
                None => {
                    let e = columns.invalid_row(row, "incomplete race result");
                    tracing::warn!(error = %e, "Skipping race row");
                    dataset.skipped_rows += 1;
                }
            }
        }
        Ok(())
    }
}

impl Default for SyntheticCsvImporter {
    fn default() -> Self {
        Self::new()
    }
}

impl DatasetImporter for SyntheticCsvImporter {
    fn can_import(&self, dir: &Path) -> bool {
        dir.join(ACTIVITIES_FILE).is_file()
    }

    fn import(&self, dir: &Path) -> Result<ImportedDataset, ImportError> {
        let mut dataset = ImportedDataset::default();
        self.read_activities(&dir.join(ACTIVITIES_FILE), &mut dataset)?;

        let races_path = dir.join(RACES_FILE);
        if races_path.is_file() {
            self.read_races(&races_path, &mut dataset)?;
        } else {
            tracing::warn!(path = %races_path.display(), "No race results file, activities carry no labels");
        }

        Ok(dataset)
    }

    fn format_name(&self) -> &'static str {
        "synthetic-csv"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    const ACTIVITIES: &str = "\
id,user_id,name,type,distance,duration,average_pace,start_date,average_heart_rate,elevation_gain,is_race
a1,u1,Morning Run,Run,10000,3000,300,2024-03-01 07:00:00,150,40,False
a2,u1,Walk,Walk,3000,1800,600,2024-03-02 07:00:00,,,False
a3,u2,Broken,Run,5000,1500,300,not-a-date,,,False
a4,u2,Race,Run,5000,,270,2024-03-03T08:00:00+01:00,175,,True
";

    const RACES: &str = "\
user_id,race_date,race_distance,race_time_sec
u1,2024-04-01 09:00:00,10000,2700
u2,2024-04-02 09:00:00,,1500
";

    fn write_dataset(activities: &str, races: Option<&str>) -> TempDir {
        let dir = TempDir::new().unwrap();
        fs::write(dir.path().join(ACTIVITIES_FILE), activities).unwrap();
        if let Some(races) = races {
            fs::write(dir.path().join(RACES_FILE), races).unwrap();
        }
        dir
    }

    #[test]
    fn test_imports_rows_and_skips_bad_ones() {
        let dir = write_dataset(ACTIVITIES, Some(RACES));
        let importer = SyntheticCsvImporter::new();
        assert!(importer.can_import(dir.path()));

        let dataset = importer.import(dir.path()).unwrap();
        assert_eq!(dataset.activities.len(), 3);
        assert_eq!(dataset.races.len(), 1);
        assert_eq!(dataset.skipped_rows, 2);

        let first = &dataset.activities[0];
        assert_eq!(first.kind, ActivityKind::Run);
        assert_eq!(first.average_heart_rate, Some(150.0));
        assert_eq!(first.elevation_gain, Some(40.0));
        assert!(!first.is_race);

        assert_eq!(dataset.activities[1].kind, ActivityKind::Walk);

        // duration derived from pace, timestamp shifted to UTC
        let race = &dataset.activities[2];
        assert_eq!(race.duration, 1350);
        assert!(race.is_race);
        assert_eq!(race.start_date.to_naive_utc().to_string(), "2024-03-03 07:00:00");
    }

    #[test]
    fn test_missing_races_file_yields_unlabelled_activities() {
        let dir = write_dataset(ACTIVITIES, None);
        let dataset = SyntheticCsvImporter::new().import(dir.path()).unwrap();
        assert!(dataset.races.is_empty());
        assert_eq!(dataset.activities.len(), 3);
    }

    #[test]
    fn test_ragged_row_reports_file_and_line() {
        let dir = write_dataset(
            "user_id,type,distance,average_pace,start_date\nu1,Run,5000,300,2024-03-01 07:00:00\nu1,Run\n",
            None,
        );
        match SyntheticCsvImporter::new().import(dir.path()) {
            Err(ImportError::Csv { file, line, .. }) => {
                assert_eq!(file, ACTIVITIES_FILE);
                assert_eq!(line, Some(3));
            }
            other => panic!("expected CSV error, got {:?}", other),
        }
    }

    #[test]
    fn test_missing_required_column() {
        let dir = write_dataset("id,user_id,type,distance\n1,u,Run,1000\n", None);
        let result = SyntheticCsvImporter::new().import(dir.path());
        assert!(matches!(result, Err(ImportError::MissingColumn { .. })));
    }
}
