//! Recent training trends: totals and ISO-week aggregates of running volume.

use chrono::{Datelike, Duration, NaiveDateTime};
use serde::{Deserialize, Serialize};
use statrs::statistics::Statistics;
use std::collections::BTreeMap;

use crate::models::Activity;
use crate::normalizer::normalize;
use crate::training_load::TrainingLoadCalculator;

/// Aggregates for one ISO week
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WeeklyTrend {
    pub iso_year: i32,
    pub iso_week: u32,
    pub distance_km: f64,
    pub effort: f64,
    pub runs: usize,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TrainingTrends {
    pub total_runs: usize,
    pub total_distance_km: f64,
    pub total_time_min: f64,
    /// Mean pace over runs that carry one, 0 when none do
    pub avg_pace_min_per_km: f64,
    pub weekly: Vec<WeeklyTrend>,
}

impl TrainingTrends {
    pub fn is_empty(&self) -> bool {
        self.total_runs == 0
    }
}

/// Trends over the `days` before `reference_time`
pub fn training_trends(
    activities: &[Activity],
    days: u32,
    reference_time: NaiveDateTime,
    calculator: &TrainingLoadCalculator,
) -> TrainingTrends {
    let cutoff = reference_time - Duration::days(days as i64);
    let runs = normalize(activities).runs();
    // Effort is normalized against the whole run history, then windowed
    let efforts = calculator.effort_scores(&runs);
    let recent: Vec<_> = runs
        .rows()
        .iter()
        .zip(efforts)
        .filter(|(row, _)| row.start >= cutoff)
        .collect();
    if recent.is_empty() {
        return TrainingTrends::default();
    }

    let mut weeks: BTreeMap<(i32, u32), WeeklyTrend> = BTreeMap::new();
    for (row, effort) in &recent {
        let iso = row.start.date().iso_week();
        let week = weeks.entry((iso.year(), iso.week())).or_insert(WeeklyTrend {
            iso_year: iso.year(),
            iso_week: iso.week(),
            distance_km: 0.0,
            effort: 0.0,
            runs: 0,
        });
        week.distance_km += row.distance_km;
        week.effort += effort;
        week.runs += 1;
    }

    let paces: Vec<f64> = recent.iter().filter_map(|(r, _)| r.pace_min_per_km).collect();
    let avg_pace_min_per_km = if paces.is_empty() { 0.0 } else { paces.iter().mean() };

    TrainingTrends {
        total_runs: recent.len(),
        total_distance_km: recent.iter().map(|(r, _)| r.distance_km).sum(),
        total_time_min: recent.iter().map(|(r, _)| r.duration_min).sum(),
        avg_pace_min_per_km,
        weekly: weeks.into_values().collect(),
    }
}
