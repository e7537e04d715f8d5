//! Fixed-order feature vectors
//!
//! The same vector feeds the offline trainer and the online global model, so
//! the names and their order are defined once in [`FEATURE_ORDER`]. Every value
//! is finite; anything that cannot be computed resolves to `0.0`.

use chrono::{Duration, NaiveDateTime};
use serde::{Deserialize, Serialize};
use statrs::statistics::Statistics;

use crate::normalizer::{CanonicalRow, CanonicalSeries};

/// Canonical feature names, in model input order
pub const FEATURE_ORDER: [&str; 11] = [
    "race_distance_km",
    "total_distance_km_7d",
    "total_distance_km_14d",
    "total_distance_km_28d",
    "runs_count_28d",
    "longest_run_km_28d",
    "avg_pace_min_per_km_28d",
    "avg_hr_28d",
    "elevation_gain_m_28d",
    "acwr",
    "days_since_last_run",
];

/// Ordered name → value mapping
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FeatureVector {
    entries: Vec<(String, f64)>,
}

impl FeatureVector {
    /// Vector in canonical order with every value set to zero
    pub fn zeros() -> Self {
        Self {
            entries: FEATURE_ORDER.iter().map(|n| (n.to_string(), 0.0)).collect(),
        }
    }

    fn set(&mut self, name: &str, value: f64) {
        let value = if value.is_finite() { value } else { 0.0 };
        if let Some(entry) = self.entries.iter_mut().find(|(n, _)| n == name) {
            entry.1 = value;
        }
    }

    /// Value by name; unknown names resolve to 0.0
    pub fn get(&self, name: &str) -> f64 {
        self.entries
            .iter()
            .find(|(n, _)| n == name)
            .map(|(_, v)| *v)
            .unwrap_or(0.0)
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.entries.iter().map(|(n, _)| n.as_str())
    }

    pub fn values(&self) -> Vec<f64> {
        self.entries.iter().map(|(_, v)| *v).collect()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, f64)> {
        self.entries.iter().map(|(n, v)| (n.as_str(), *v))
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Values laid out in an externally supplied order, looked up by name
    pub fn ordered_by<S: AsRef<str>>(&self, order: &[S]) -> Vec<f64> {
        order.iter().map(|name| self.get(name.as_ref())).collect()
    }
}

fn window(
    runs: &CanonicalSeries,
    reference_time: NaiveDateTime,
    days: i64,
) -> impl Iterator<Item = &CanonicalRow> {
    runs.window(reference_time - Duration::days(days), reference_time)
}

fn sum_in_window<F>(runs: &CanonicalSeries, reference_time: NaiveDateTime, days: i64, column: F) -> f64
where
    F: Fn(&CanonicalRow) -> f64,
{
    window(runs, reference_time, days).map(column).sum()
}

fn mean_in_window<F>(runs: &CanonicalSeries, reference_time: NaiveDateTime, days: i64, column: F) -> f64
where
    F: Fn(&CanonicalRow) -> Option<f64>,
{
    let values: Vec<f64> = window(runs, reference_time, days).filter_map(column).collect();
    if values.is_empty() {
        0.0
    } else {
        values.mean()
    }
}

/// Feature vector for `series` as of `reference_time`.
///
/// Only run rows contribute. Windows are half-open, `[reference - N days,
/// reference)`, so a run starting exactly at the reference time is excluded
/// from the rolling sums but still counts as the most recent run.
pub fn build_features(
    series: &CanonicalSeries,
    reference_time: NaiveDateTime,
    race_distance_m: f64,
) -> FeatureVector {
    let mut features = FeatureVector::zeros();
    let race_distance_km = if race_distance_m.is_finite() {
        race_distance_m / 1000.0
    } else {
        0.0
    };
    features.set("race_distance_km", race_distance_km);

    let runs = series.runs();
    if runs.is_empty() {
        return features;
    }

    let distance_7d = sum_in_window(&runs, reference_time, 7, |r| r.distance_km);
    let distance_14d = sum_in_window(&runs, reference_time, 14, |r| r.distance_km);
    let distance_28d = sum_in_window(&runs, reference_time, 28, |r| r.distance_km);
    let runs_count_28d = window(&runs, reference_time, 28).count() as f64;
    let longest_run_28d = window(&runs, reference_time, 28)
        .map(|r| r.distance_km)
        .fold(0.0_f64, f64::max);
    let avg_pace_28d = mean_in_window(&runs, reference_time, 28, |r| r.pace_min_per_km);
    let avg_hr_28d = mean_in_window(&runs, reference_time, 28, |r| r.average_heart_rate);
    let elevation_28d = sum_in_window(&runs, reference_time, 28, |r| r.elevation_gain);

    let chronic = distance_28d / 4.0;
    let acwr = if chronic > 0.0 { distance_7d / chronic } else { 0.0 };

    let days_since_last_run = runs
        .rows()
        .iter()
        .filter(|r| r.start <= reference_time)
        .map(|r| r.start)
        .max()
        .map(|last| (reference_time - last).num_days() as f64)
        .unwrap_or(0.0);

    features.set("total_distance_km_7d", distance_7d);
    features.set("total_distance_km_14d", distance_14d);
    features.set("total_distance_km_28d", distance_28d);
    features.set("runs_count_28d", runs_count_28d);
    features.set("longest_run_km_28d", longest_run_28d);
    features.set("avg_pace_min_per_km_28d", avg_pace_28d);
    features.set("avg_hr_28d", avg_hr_28d);
    features.set("elevation_gain_m_28d", elevation_28d);
    features.set("acwr", acwr);
    features.set("days_since_last_run", days_since_last_run);

    tracing::trace!(?reference_time, runs = runs.len(), acwr, "Built feature vector");
    features
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{Activity, ActivityKind};
    use crate::normalizer::normalize;
    use chrono::NaiveDate;
    use proptest::prelude::*;

    fn day(d: u32) -> NaiveDateTime {
        NaiveDate::from_ymd_opt(2024, 3, 1)
            .unwrap()
            .and_hms_opt(0, 0, 0)
            .unwrap()
            + Duration::days(d as i64)
    }

    fn names(features: &FeatureVector) -> Vec<String> {
        features.names().map(str::to_string).collect()
    }

    #[test]
    fn test_empty_series_has_full_order() {
        let features = build_features(&CanonicalSeries::default(), day(30), 10000.0);
        assert_eq!(names(&features), FEATURE_ORDER.to_vec());
        assert_eq!(features.get("race_distance_km"), 10.0);
        assert!(features.iter().skip(1).all(|(_, v)| v == 0.0));
    }

    #[test]
    fn test_windowed_aggregates() {
        let mut hilly = Activity::run("c", "u", 12000.0, 3960, day(25));
        hilly.elevation_gain = Some(150.0);
        hilly.average_heart_rate = Some(150.0);
        let mut ride = Activity::run("ride", "u", 40000.0, 5400, day(27));
        ride.kind = ActivityKind::Ride;

        let activities = vec![
            Activity::run("old", "u", 20000.0, 7200, day(0)),
            Activity::run("a", "u", 8000.0, 2400, day(10)),
            Activity::run("b", "u", 6000.0, 1800, day(20)),
            hilly,
            ride,
        ];
        let series = normalize(&activities);
        let features = build_features(&series, day(30), 5000.0);

        assert_eq!(features.get("total_distance_km_7d"), 12.0);
        assert_eq!(features.get("total_distance_km_14d"), 18.0);
        assert_eq!(features.get("total_distance_km_28d"), 26.0);
        assert_eq!(features.get("runs_count_28d"), 3.0);
        assert_eq!(features.get("longest_run_km_28d"), 12.0);
        assert_eq!(features.get("elevation_gain_m_28d"), 150.0);
        assert_eq!(features.get("avg_hr_28d"), 150.0);
        assert!((features.get("avg_pace_min_per_km_28d") - (5.0 + 5.0 + 5.5) / 3.0).abs() < 1e-9);
        assert!((features.get("acwr") - 12.0 / 6.5).abs() < 1e-9);
        assert_eq!(features.get("days_since_last_run"), 5.0);
    }

    #[test]
    fn test_acwr_zero_without_chronic_distance() {
        // Only history older than 28 days
        let series = normalize(&[Activity::run("old", "u", 10000.0, 3000, day(0))]);
        let features = build_features(&series, day(40), 10000.0);
        assert_eq!(features.get("acwr"), 0.0);
        assert_eq!(features.get("days_since_last_run"), 40.0);
    }

    #[test]
    fn test_run_at_reference_time_is_excluded_from_sums() {
        let series = normalize(&[Activity::run("now", "u", 10000.0, 3000, day(10))]);
        let features = build_features(&series, day(10), 10000.0);
        assert_eq!(features.get("total_distance_km_7d"), 0.0);
        assert_eq!(features.get("days_since_last_run"), 0.0);
    }

    #[test]
    fn test_ordered_by_external_order() {
        let features = build_features(&CanonicalSeries::default(), day(1), 21097.5);
        let order = ["acwr", "race_distance_km", "not_a_feature"];
        assert_eq!(features.ordered_by(&order), vec![0.0, 21.0975, 0.0]);
    }

    proptest! {
        #[test]
        fn test_features_always_complete_and_finite(
            runs in prop::collection::vec((0u32..60, 0.0f64..45000.0, 1u32..20000, prop::option::of(80.0f64..200.0)), 0..30),
            race_distance in 1000.0f64..50000.0,
            reference_day in 0u32..90,
        ) {
            let activities: Vec<Activity> = runs
                .iter()
                .enumerate()
                .map(|(i, (d, dist, dur, hr))| {
                    let mut a = Activity::run(format!("r{i}"), "u", *dist, *dur, day(*d));
                    a.average_heart_rate = *hr;
                    a
                })
                .collect();
            let series = normalize(&activities);
            let features = build_features(&series, day(reference_day), race_distance);

            prop_assert_eq!(names(&features), FEATURE_ORDER.to_vec());
            prop_assert!(features.iter().all(|(_, v)| v.is_finite()));
            if features.get("total_distance_km_28d") == 0.0 {
                prop_assert_eq!(features.get("acwr"), 0.0);
            }
        }
    }
}
