//! Activity normalization
//!
//! Converts raw activity records into the canonical, time-sorted series every
//! other component reads. Timezone handling lives here and nowhere else: every
//! start time leaves this module as a naive UTC wall-clock value.

use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};

use crate::models::{Activity, ActivityKind};

/// One activity with its derived numeric columns
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CanonicalRow {
    pub id: String,
    pub athlete_id: String,
    pub kind: ActivityKind,
    /// Naive UTC start time
    pub start: NaiveDateTime,
    pub distance_km: f64,
    pub duration_sec: f64,
    pub duration_min: f64,
    pub duration_hours: f64,
    pub pace_min_per_km: Option<f64>,
    pub speed_kmh: Option<f64>,
    pub average_heart_rate: Option<f64>,
    pub max_heart_rate: Option<f64>,
    /// Meters, 0 when unknown
    pub elevation_gain: f64,
    pub is_race: bool,
}

impl CanonicalRow {
    fn from_activity(activity: &Activity) -> Self {
        let distance_km = if activity.distance.is_finite() {
            activity.distance.max(0.0) / 1000.0
        } else {
            0.0
        };
        let duration_sec = activity.duration as f64;

        // Prefer the recorded pace; fall back to duration over distance.
        let pace_min_per_km = activity
            .average_pace
            .filter(|p| p.is_finite() && *p > 0.0)
            .map(|p| p / 60.0)
            .or_else(|| {
                (distance_km > 0.0 && duration_sec > 0.0)
                    .then(|| duration_sec / 60.0 / distance_km)
            });

        let speed_kmh = pace_min_per_km.map(|p| 60.0 / p);

        Self {
            id: activity.id.clone(),
            athlete_id: activity.athlete_id.clone(),
            kind: activity.kind,
            start: activity.start_date.to_naive_utc(),
            distance_km,
            duration_sec,
            duration_min: duration_sec / 60.0,
            duration_hours: duration_sec / 3600.0,
            pace_min_per_km,
            speed_kmh,
            average_heart_rate: activity.average_heart_rate.filter(|hr| hr.is_finite()),
            max_heart_rate: activity.max_heart_rate.filter(|hr| hr.is_finite()),
            elevation_gain: activity
                .elevation_gain
                .filter(|e| e.is_finite())
                .unwrap_or(0.0),
            is_race: activity.is_race,
        }
    }

    pub fn is_run(&self) -> bool {
        self.kind == ActivityKind::Run
    }
}

/// Activities sorted ascending by start time
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CanonicalSeries {
    rows: Vec<CanonicalRow>,
}

impl CanonicalSeries {
    /// Build from rows that may be unsorted
    pub fn from_rows(mut rows: Vec<CanonicalRow>) -> Self {
        rows.sort_by_key(|r| r.start);
        Self { rows }
    }

    pub fn rows(&self) -> &[CanonicalRow] {
        &self.rows
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// Run rows only, still in time order
    pub fn runs(&self) -> CanonicalSeries {
        CanonicalSeries {
            rows: self.rows.iter().filter(|r| r.is_run()).cloned().collect(),
        }
    }

    /// Rows starting at or after `since`
    pub fn since(&self, since: NaiveDateTime) -> CanonicalSeries {
        CanonicalSeries {
            rows: self.rows.iter().filter(|r| r.start >= since).cloned().collect(),
        }
    }

    /// Rows in the half-open window `[start, end)`
    pub fn window(&self, start: NaiveDateTime, end: NaiveDateTime) -> impl Iterator<Item = &CanonicalRow> {
        self.rows
            .iter()
            .filter(move |r| r.start >= start && r.start < end)
    }

    /// Rows belonging to one athlete
    pub fn for_athlete(&self, athlete_id: &str) -> CanonicalSeries {
        CanonicalSeries {
            rows: self
                .rows
                .iter()
                .filter(|r| r.athlete_id == athlete_id)
                .cloned()
                .collect(),
        }
    }

    /// The first `n` rows
    pub fn head(&self, n: usize) -> CanonicalSeries {
        CanonicalSeries {
            rows: self.rows.iter().take(n).cloned().collect(),
        }
    }

    pub fn latest_start(&self) -> Option<NaiveDateTime> {
        self.rows.last().map(|r| r.start)
    }

    /// Paces of the last `n` rows that carry one, oldest first
    pub fn recent_paces(&self, n: usize) -> Vec<f64> {
        let skip = self.rows.len().saturating_sub(n);
        self.rows
            .iter()
            .skip(skip)
            .filter_map(|r| r.pace_min_per_km)
            .collect()
    }
}

/// Canonical series for a batch of activities. Never fails; empty in, empty out.
pub fn normalize(activities: &[Activity]) -> CanonicalSeries {
    let aware = activities.iter().filter(|a| a.start_date.is_aware()).count();
    if aware > 0 {
        tracing::debug!(
            aware,
            total = activities.len(),
            "Normalizing timezone-aware start times to naive UTC"
        );
    }

    CanonicalSeries::from_rows(activities.iter().map(CanonicalRow::from_activity).collect())
}
