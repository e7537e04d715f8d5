use chrono::{Days, NaiveDate};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use crate::models::{Activity, RiskLevel, TrainingLoad};
use crate::normalizer::{normalize, CanonicalSeries};

/// Daily effort record
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DailyEffort {
    /// Calendar date of the training day
    pub date: NaiveDate,

    /// Sum of effort scores for the day
    pub total_effort: f64,

    /// Number of activities on this day
    pub activity_count: u16,
}

/// Training load configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrainingLoadConfig {
    /// Acute window in days (default: 7)
    pub acute_days: u16,

    /// Chronic window in days (default: 28)
    pub chronic_days: u16,

    /// Minimum number of runs before a ratio is reported
    pub min_activities: usize,

    /// Effort increase per 100 m of climbing (default: 0.1)
    pub elevation_factor_per_100m: f64,
}

impl Default for TrainingLoadConfig {
    fn default() -> Self {
        TrainingLoadConfig {
            acute_days: 7,
            chronic_days: 28,
            min_activities: 7,
            elevation_factor_per_100m: 0.1,
        }
    }
}

/// Acute:chronic load engine
pub struct TrainingLoadCalculator {
    config: TrainingLoadConfig,
}

impl TrainingLoadCalculator {
    /// Create new calculator with default configuration
    pub fn new() -> Self {
        TrainingLoadCalculator {
            config: TrainingLoadConfig::default(),
        }
    }

    /// Create new calculator with custom configuration
    pub fn with_config(config: TrainingLoadConfig) -> Self {
        TrainingLoadCalculator { config }
    }

    /// Effort score per row of `runs`, in row order.
    ///
    /// effort = minutes × (1 + HR / max HR in batch) × (1 + 10% per 100 m climbed)
    pub fn effort_scores(&self, runs: &CanonicalSeries) -> Vec<f64> {
        let batch_max_hr = runs
            .rows()
            .iter()
            .filter_map(|r| r.average_heart_rate)
            .fold(0.0_f64, f64::max);

        runs.rows()
            .iter()
            .map(|row| {
                let mut effort = row.duration_min;
                if let Some(hr) = row.average_heart_rate {
                    if batch_max_hr > 0.0 {
                        effort *= 1.0 + hr / batch_max_hr;
                    }
                }
                let elevation_factor = row.elevation_gain / 100.0;
                effort * (1.0 + elevation_factor * self.config.elevation_factor_per_100m)
            })
            .collect()
    }

    /// Aggregate effort per calendar day
    pub fn aggregate_daily_effort(&self, runs: &CanonicalSeries) -> BTreeMap<NaiveDate, DailyEffort> {
        let mut daily: BTreeMap<NaiveDate, DailyEffort> = BTreeMap::new();

        for (row, effort) in runs.rows().iter().zip(self.effort_scores(runs)) {
            let date = row.start.date();
            daily
                .entry(date)
                .and_modify(|day| {
                    day.total_effort += effort;
                    day.activity_count += 1;
                })
                .or_insert(DailyEffort {
                    date,
                    total_effort: effort,
                    activity_count: 1,
                });
        }

        daily
    }

    /// Daily efforts over the calendar range ending at `end_date`, rest days as 0
    pub fn daily_series(
        &self,
        daily: &BTreeMap<NaiveDate, DailyEffort>,
        end_date: NaiveDate,
    ) -> Vec<f64> {
        let start_date = end_date
            .checked_sub_days(Days::new(self.config.chronic_days as u64))
            .unwrap_or(end_date);

        start_date
            .iter_days()
            .take_while(|d| *d <= end_date)
            .map(|d| daily.get(&d).map(|e| e.total_effort).unwrap_or(0.0))
            .collect()
    }

    /// Acute and chronic load for a batch of activities
    pub fn calculate(&self, activities: &[Activity]) -> TrainingLoad {
        self.calculate_from_series(&normalize(activities))
    }

    pub fn calculate_from_series(&self, series: &CanonicalSeries) -> TrainingLoad {
        let runs = series.runs();
        if runs.len() < self.config.min_activities {
            tracing::debug!(
                runs = runs.len(),
                required = self.config.min_activities,
                "Not enough runs for training load"
            );
            return Self::insufficient_data();
        }

        let daily = self.aggregate_daily_effort(&runs);
        let end_date = match daily.keys().next_back() {
            Some(date) => *date,
            None => return Self::insufficient_data(),
        };

        let values = self.daily_series(&daily, end_date);
        let acute_load = tail_mean(&values, self.config.acute_days as usize);
        let chronic_load = tail_mean(&values, self.config.chronic_days as usize);
        let ratio = if chronic_load > 0.0 {
            acute_load / chronic_load
        } else {
            0.0
        };

        let risk_level = RiskLevel::from_ratio(ratio);
        tracing::debug!(acute_load, chronic_load, ratio, ?risk_level, "Computed training load");

        TrainingLoad {
            acute_load,
            chronic_load,
            ratio,
            risk_level,
            recommendation: risk_level.recommendation().to_string(),
            insufficient_data: false,
        }
    }

    fn insufficient_data() -> TrainingLoad {
        TrainingLoad {
            acute_load: 0.0,
            chronic_load: 0.0,
            ratio: 0.0,
            risk_level: RiskLevel::Low,
            recommendation: "Need more training data for accurate analysis".to_string(),
            insufficient_data: true,
        }
    }
}

impl Default for TrainingLoadCalculator {
    fn default() -> Self {
        Self::new()
    }
}

fn tail_mean(values: &[f64], n: usize) -> f64 {
    let tail = &values[values.len().saturating_sub(n)..];
    if tail.is_empty() {
        0.0
    } else {
        tail.iter().sum::<f64>() / tail.len() as f64
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, NaiveDateTime};

    fn day(d: i64) -> NaiveDateTime {
        NaiveDate::from_ymd_opt(2024, 9, 1)
            .unwrap()
            .and_hms_opt(6, 30, 0)
            .unwrap()
            + Duration::days(d)
    }

    fn easy_run(d: i64, minutes: u32) -> Activity {
        Activity::run(format!("run_{d}"), "athlete", 10000.0, minutes * 60, day(d))
    }

    #[test]
    fn test_empty_input_is_low_risk() {
        let load = TrainingLoadCalculator::new().calculate(&[]);
        assert_eq!(load.ratio, 0.0);
        assert_eq!(load.risk_level, RiskLevel::Low);
        assert!(load.insufficient_data);
    }

    #[test]
    fn test_effort_scores_hr_and_elevation() {
        let mut a = easy_run(0, 60);
        a.average_heart_rate = Some(150.0);
        a.elevation_gain = Some(200.0);
        let mut b = easy_run(1, 30);
        b.average_heart_rate = Some(100.0);

        let calculator = TrainingLoadCalculator::new();
        let efforts = calculator.effort_scores(&normalize(&[a, b]));
        // 60 × (1 + 1.0) × (1 + 0.2)
        assert!((efforts[0] - 144.0).abs() < 1e-9);
        // 30 × (1 + 2/3)
        assert!((efforts[1] - 50.0).abs() < 1e-9);
    }

    #[test]
    fn test_daily_aggregation_sums_same_day() {
        let runs = vec![easy_run(0, 30), easy_run(0, 20), easy_run(2, 40)];
        let calculator = TrainingLoadCalculator::new();
        let daily = calculator.aggregate_daily_effort(&normalize(&runs));

        assert_eq!(daily.len(), 2);
        let first = daily.get(&day(0).date()).unwrap();
        assert_eq!(first.total_effort, 50.0);
        assert_eq!(first.activity_count, 2);
    }

    #[test]
    fn test_steady_daily_training_over_full_window() {
        let runs: Vec<Activity> = (0..29).map(|d| easy_run(d, 60)).collect();
        let load = TrainingLoadCalculator::new().calculate(&runs);
        assert!((load.acute_load - 60.0).abs() < 1e-9);
        assert!((load.chronic_load - 60.0).abs() < 1e-9);
        assert!((load.ratio - 1.0).abs() < 1e-9);
        assert_eq!(load.risk_level, RiskLevel::Moderate);
    }

    #[test]
    fn test_sparse_recent_block_is_high_risk() {
        // Seven runs crammed into the last week: zero-filled chronic window
        let runs: Vec<Activity> = (0..7).map(|d| easy_run(d, 45)).collect();
        let load = TrainingLoadCalculator::new().calculate(&runs);
        // acute = 45, chronic = 7 × 45 / 28
        assert!((load.acute_load - 45.0).abs() < 1e-9);
        assert!((load.chronic_load - 11.25).abs() < 1e-9);
        assert!((load.ratio - 4.0).abs() < 1e-9);
        assert_eq!(load.risk_level, RiskLevel::High);
        assert!(!load.insufficient_data);
    }

    #[test]
    fn test_tapering_is_low_risk() {
        let mut runs: Vec<Activity> = (0..21).map(|d| easy_run(d, 90)).collect();
        runs.push(easy_run(28, 20));
        let load = TrainingLoadCalculator::new().calculate(&runs);
        assert_eq!(load.risk_level, RiskLevel::Low);
        assert!(load.ratio < 0.8);
    }

    #[test]
    fn test_walks_are_ignored() {
        let mut runs: Vec<Activity> = (0..6).map(|d| easy_run(d, 45)).collect();
        let mut walk = easy_run(6, 45);
        walk.kind = crate::models::ActivityKind::Walk;
        runs.push(walk);
        let load = TrainingLoadCalculator::new().calculate(&runs);
        assert!(load.insufficient_data);
    }
}
