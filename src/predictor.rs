//! Race time prediction
//!
//! Up to four estimators each produce a finishing time in seconds, or nothing
//! when they do not apply. The present ones are blended with a fixed weight
//! table; pacing splits, a confidence interval and an overall confidence score
//! are derived from the blend.

use chrono::{Duration, NaiveDateTime};
use rust_decimal::prelude::*;
use serde::{Deserialize, Serialize};
use statrs::statistics::Statistics;
use std::sync::Arc;

use crate::features::build_features;
use crate::model::ModelHandle;
use crate::models::{
    Activity, ConfidenceInterval, EstimatorOutput, PaceSplit, PerformancePrediction, RaceCategory,
};
use crate::normalizer::{normalize, CanonicalSeries};
use crate::signals::{blend, present_values, WeightedSignal};

/// Heuristic constants of the ensemble
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PredictorConfig {
    pub weight_global_model: f64,
    pub weight_pace_equivalence: f64,
    pub weight_pace_trend: f64,
    pub weight_distance_model: f64,

    /// Days of history searched for the best pace
    pub lookback_days: u16,
    /// Shortest run (km) considered for the best pace
    pub min_equivalence_distance_km: f64,
    pub multiplier_5k: f64,
    pub multiplier_10k: f64,
    pub multiplier_half: f64,
    pub multiplier_marathon: f64,
    /// Pace slowdown per 10 km for non-standard distances
    pub adjustment_per_10km: f64,

    pub trend_min_runs: usize,
    pub trend_window: usize,
    pub trend_min_paces: usize,
    /// Runs projected ahead along the fitted slope
    pub trend_projection_steps: f64,
    /// Distance (m) at which the trend pace is doubled
    pub trend_distance_scale_m: f64,

    pub distance_model_min_runs: usize,

    /// Flat pace (min/km) used when nothing else applies
    pub default_pace_min_per_km: f64,
    pub default_confidence: f64,

    pub interval_base_margin: f64,
    pub interval_consistency_margin: f64,

    /// Runs needed for full data confidence
    pub full_confidence_runs: f64,
    pub recency_decay_days: f64,
    pub recency_floor: f64,
    pub agreement_floor: f64,
}

impl Default for PredictorConfig {
    fn default() -> Self {
        PredictorConfig {
            weight_global_model: 0.50,
            weight_pace_equivalence: 0.25,
            weight_pace_trend: 0.15,
            weight_distance_model: 0.10,
            lookback_days: 60,
            min_equivalence_distance_km: 3.0,
            multiplier_5k: 0.98,
            multiplier_10k: 1.02,
            multiplier_half: 1.08,
            multiplier_marathon: 1.15,
            adjustment_per_10km: 0.02,
            trend_min_runs: 5,
            trend_window: 10,
            trend_min_paces: 3,
            trend_projection_steps: 2.0,
            trend_distance_scale_m: 50000.0,
            distance_model_min_runs: 3,
            default_pace_min_per_km: 6.0,
            default_confidence: 0.1,
            interval_base_margin: 0.05,
            interval_consistency_margin: 0.05,
            full_confidence_runs: 20.0,
            recency_decay_days: 30.0,
            recency_floor: 0.3,
            agreement_floor: 0.2,
        }
    }
}

/// Ensemble members, in blend preference order
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Estimator {
    GlobalModel,
    PaceEquivalence,
    PaceTrend,
    DistanceModel,
}

impl Estimator {
    pub const ALL: [Estimator; 4] = [
        Estimator::GlobalModel,
        Estimator::PaceEquivalence,
        Estimator::PaceTrend,
        Estimator::DistanceModel,
    ];

    pub fn name(&self) -> &'static str {
        match self {
            Estimator::GlobalModel => "global_model",
            Estimator::PaceEquivalence => "pace_equivalence",
            Estimator::PaceTrend => "pace_trend",
            Estimator::DistanceModel => "distance_model",
        }
    }

    fn weight(&self, config: &PredictorConfig) -> f64 {
        match self {
            Estimator::GlobalModel => config.weight_global_model,
            Estimator::PaceEquivalence => config.weight_pace_equivalence,
            Estimator::PaceTrend => config.weight_pace_trend,
            Estimator::DistanceModel => config.weight_distance_model,
        }
    }
}

/// Category label for a prediction. The distance is authoritative: a supplied
/// category that does not match it is dropped.
fn resolve_race_type(race_type: Option<RaceCategory>, race_distance_m: f64) -> Option<RaceCategory> {
    let inferred = RaceCategory::from_distance(race_distance_m);
    match race_type {
        Some(given) if Some(given) != inferred => {
            tracing::warn!(
                race_type = ?given,
                race_distance_m,
                "Race type does not match distance, ignoring it"
            );
            inferred
        }
        Some(given) => Some(given),
        None => inferred,
    }
}

/// Ordinary least squares fit `y = intercept + slope × x`.
///
/// Degenerate inputs (all x equal) fit a flat line through the mean of y.
pub fn linear_fit(x: &[f64], y: &[f64]) -> Option<(f64, f64)> {
    let n = x.len().min(y.len());
    if n == 0 {
        return None;
    }
    let x = &x[..n];
    let y = &y[..n];

    let mean_x = x.iter().sum::<f64>() / n as f64;
    let mean_y = y.iter().sum::<f64>() / n as f64;
    let sxx: f64 = x.iter().map(|xi| (xi - mean_x).powi(2)).sum();
    let sxy: f64 = x
        .iter()
        .zip(y)
        .map(|(xi, yi)| (xi - mean_x) * (yi - mean_y))
        .sum();

    let slope = if sxx > f64::EPSILON { sxy / sxx } else { 0.0 };
    let intercept = mean_y - slope * mean_x;
    (slope.is_finite() && intercept.is_finite()).then_some((intercept, slope))
}

pub struct PerformancePredictor {
    config: PredictorConfig,
    model: Option<Arc<ModelHandle>>,
}

impl PerformancePredictor {
    pub fn new() -> Self {
        Self {
            config: PredictorConfig::default(),
            model: None,
        }
    }

    pub fn with_config(config: PredictorConfig) -> Self {
        Self {
            config,
            model: None,
        }
    }

    /// Attach the shared global model handle
    pub fn with_model(mut self, model: Arc<ModelHandle>) -> Self {
        self.model = Some(model);
        self
    }

    pub fn config(&self) -> &PredictorConfig {
        &self.config
    }

    /// Predict the finishing time for `race_distance_m` as of `reference_time`
    #[tracing::instrument(skip(self, activities), fields(activities = activities.len()))]
    pub fn predict(
        &self,
        activities: &[Activity],
        race_distance_m: f64,
        race_type: Option<RaceCategory>,
        reference_time: NaiveDateTime,
    ) -> PerformancePrediction {
        let race_type = resolve_race_type(race_type, race_distance_m);

        if activities.is_empty() {
            tracing::debug!("No training data available, using default prediction");
            return self.default_prediction(race_distance_m, race_type);
        }
        if !race_distance_m.is_finite() || race_distance_m <= 0.0 {
            tracing::debug!(race_distance_m, "Invalid race distance, using default prediction");
            return self.default_prediction(race_distance_m, race_type);
        }

        let series = normalize(activities);
        let runs = series.runs();
        if runs.is_empty() {
            tracing::debug!("No running activities found, using default prediction");
            return self.default_prediction(race_distance_m, race_type);
        }

        let signals: Vec<WeightedSignal<Estimator>> = Estimator::ALL
            .iter()
            .map(|estimator| {
                let value = self.estimate(*estimator, &series, &runs, race_distance_m, reference_time);
                WeightedSignal::positive(*estimator, estimator.weight(&self.config), value)
            })
            .collect();

        let estimators = signals
            .iter()
            .map(|s| EstimatorOutput {
                estimator: s.key.name().to_string(),
                predicted_time: s.value.unwrap_or(0.0),
                weight: s.weight,
            })
            .collect();

        let predicted_time = match blend(&signals) {
            Some(t) if t > 0.0 => t,
            _ => {
                tracing::debug!("Insufficient data for accurate prediction");
                return self.default_prediction(race_distance_m, race_type);
            }
        };

        let consistency = self.consistency_factor(&runs);
        let margin = predicted_time
            * (self.config.interval_base_margin
                + self.config.interval_consistency_margin * (1.0 - consistency));

        let confidence = self.confidence(&runs, &present_values(&signals), reference_time);
        tracing::debug!(predicted_time, consistency, confidence, "Blended prediction");

        PerformancePrediction {
            race_distance: race_distance_m,
            race_type,
            predicted_time,
            confidence_interval: ConfidenceInterval {
                min: predicted_time - margin,
                max: predicted_time + margin,
            },
            pacing_strategy: pacing_strategy(predicted_time, race_distance_m),
            confidence,
            estimators,
        }
    }

    fn estimate(
        &self,
        estimator: Estimator,
        series: &CanonicalSeries,
        runs: &CanonicalSeries,
        race_distance_m: f64,
        reference_time: NaiveDateTime,
    ) -> f64 {
        match estimator {
            Estimator::GlobalModel => self.global_model(series, race_distance_m, reference_time),
            Estimator::PaceEquivalence => {
                self.pace_equivalence(runs, race_distance_m, reference_time)
            }
            Estimator::PaceTrend => self.pace_trend(runs, race_distance_m),
            Estimator::DistanceModel => self.distance_model(runs, race_distance_m),
        }
    }

    /// Best recent pace scaled by a per-distance multiplier
    pub fn pace_equivalence(
        &self,
        runs: &CanonicalSeries,
        race_distance_m: f64,
        reference_time: NaiveDateTime,
    ) -> f64 {
        let cutoff = reference_time - Duration::days(self.config.lookback_days as i64);
        let best_pace = runs
            .rows()
            .iter()
            .filter(|r| r.start >= cutoff && r.start <= reference_time)
            .filter(|r| r.distance_km >= self.config.min_equivalence_distance_km)
            .filter_map(|r| r.pace_min_per_km)
            .fold(None, |best: Option<f64>, p| Some(best.map_or(p, |b| b.min(p))));

        let Some(best_pace) = best_pace else {
            return 0.0;
        };

        let pace_minutes = match RaceCategory::from_distance(race_distance_m) {
            Some(RaceCategory::FiveK) => best_pace * 5.0 * self.config.multiplier_5k,
            Some(RaceCategory::TenK) => best_pace * 10.0 * self.config.multiplier_10k,
            Some(RaceCategory::HalfMarathon) => best_pace * 21.1 * self.config.multiplier_half,
            Some(RaceCategory::Marathon) => best_pace * 42.2 * self.config.multiplier_marathon,
            None => {
                let adjustment = 1.0 + (race_distance_m / 10000.0) * self.config.adjustment_per_10km;
                best_pace * (race_distance_m / 1000.0) * adjustment
            }
        };
        pace_minutes * 60.0
    }

    /// Extrapolated pace trend over the most recent runs
    pub fn pace_trend(&self, runs: &CanonicalSeries, race_distance_m: f64) -> f64 {
        if runs.len() < self.config.trend_min_runs {
            return 0.0;
        }
        let paces = runs.recent_paces(self.config.trend_window);
        if paces.len() < self.config.trend_min_paces {
            return 0.0;
        }

        let index: Vec<f64> = (0..paces.len()).map(|i| i as f64).collect();
        let Some((_, slope)) = linear_fit(&index, &paces) else {
            return 0.0;
        };
        let latest = paces[paces.len() - 1];
        let projected = latest + slope * self.config.trend_projection_steps;
        let race_pace = projected * (1.0 + race_distance_m / self.config.trend_distance_scale_m);

        race_pace * (race_distance_m / 1000.0) * 60.0
    }

    /// Pace regressed on distance, evaluated at the race distance
    pub fn distance_model(&self, runs: &CanonicalSeries, race_distance_m: f64) -> f64 {
        if runs.len() < self.config.distance_model_min_runs {
            return 0.0;
        }
        let (distances, paces): (Vec<f64>, Vec<f64>) = runs
            .rows()
            .iter()
            .filter_map(|r| r.pace_min_per_km.map(|p| (r.distance_km, p)))
            .unzip();
        if paces.len() < self.config.distance_model_min_runs {
            return 0.0;
        }

        let Some((base_pace, distance_factor)) = linear_fit(&distances, &paces) else {
            return 0.0;
        };
        let race_distance_km = race_distance_m / 1000.0;
        let predicted_pace = base_pace + distance_factor * race_distance_km;
        predicted_pace * race_distance_km * 60.0
    }

    fn global_model(&self, series: &CanonicalSeries, race_distance_m: f64, reference_time: NaiveDateTime) -> f64 {
        let Some(artifact) = self.model.as_ref().and_then(|handle| handle.get()) else {
            return 0.0;
        };

        let features = build_features(series, reference_time, race_distance_m);
        match artifact.predict(&features) {
            Ok(seconds) => seconds,
            Err(e) => {
                tracing::warn!(error = %e, "Global model prediction failed");
                0.0
            }
        }
    }

    /// 1 − coefficient of variation of recent paces, in [0, 1]
    fn consistency_factor(&self, runs: &CanonicalSeries) -> f64 {
        if runs.len() < self.config.trend_min_runs {
            return 0.5;
        }
        let paces = runs.recent_paces(self.config.trend_window);
        if paces.len() < self.config.trend_min_paces {
            return 0.5;
        }

        let mean = paces.iter().mean();
        if mean <= 0.0 {
            return 0.5;
        }
        let cv = paces.iter().std_dev() / mean;
        if cv.is_finite() {
            (1.0 - cv).clamp(0.0, 1.0)
        } else {
            0.5
        }
    }

    fn confidence(&self, runs: &CanonicalSeries, estimates: &[f64], reference_time: NaiveDateTime) -> f64 {
        let mut factors = vec![(runs.len() as f64 / self.config.full_confidence_runs).min(1.0)];

        if let Some(last) = runs.latest_start() {
            let days_since_last = (reference_time - last).num_days() as f64;
            let recency = 1.0 - days_since_last / self.config.recency_decay_days;
            factors.push(recency.clamp(self.config.recency_floor, 1.0));
        }

        if estimates.len() > 1 {
            let mean = estimates.iter().mean();
            if mean > 0.0 {
                let cv = estimates.iter().population_std_dev() / mean;
                factors.push((1.0 - cv).max(self.config.agreement_floor));
            }
        }

        let confidence = factors.iter().sum::<f64>() / factors.len() as f64;
        if confidence.is_finite() {
            confidence.clamp(0.0, 1.0)
        } else {
            self.config.default_confidence
        }
    }

    fn default_prediction(&self, race_distance_m: f64, race_type: Option<RaceCategory>) -> PerformancePrediction {
        let distance = if race_distance_m.is_finite() {
            race_distance_m.max(0.0)
        } else {
            0.0
        };
        let estimated_time = distance / 1000.0 * self.config.default_pace_min_per_km * 60.0;

        PerformancePrediction {
            race_distance: distance,
            race_type,
            predicted_time: estimated_time,
            confidence_interval: ConfidenceInterval {
                min: estimated_time * 0.9,
                max: estimated_time * 1.2,
            },
            pacing_strategy: Vec::new(),
            confidence: self.config.default_confidence,
            estimators: Estimator::ALL
                .iter()
                .map(|e| EstimatorOutput {
                    estimator: e.name().to_string(),
                    predicted_time: 0.0,
                    weight: e.weight(&self.config),
                })
                .collect(),
        }
    }
}

impl Default for PerformancePredictor {
    fn default() -> Self {
        Self::new()
    }
}

/// Per-kilometre targets for a finishing time in seconds.
///
/// Up to 10 km: first km 2% fast, last whole km 5% fast. Longer races: first
/// three km 2% conservative, final 20% 2% fast.
pub fn pacing_strategy(predicted_time: f64, race_distance_m: f64) -> Vec<PaceSplit> {
    let race_distance_km = race_distance_m / 1000.0;
    if race_distance_km <= 0.0 || !predicted_time.is_finite() || predicted_time <= 0.0 {
        return Vec::new();
    }

    let target_pace = predicted_time / 60.0 / race_distance_km;
    let whole_km = race_distance_km.floor() as u32;
    let mut cumulative = 0.0;

    (1..=whole_km)
        .map(|km| {
            let pace = if race_distance_m <= 10000.0 {
                if km == 1 {
                    target_pace * 0.98
                } else if km == whole_km {
                    target_pace * 0.95
                } else {
                    target_pace
                }
            } else if km <= 3 {
                target_pace * 1.02
            } else if km as f64 > race_distance_km * 0.8 {
                target_pace * 0.98
            } else {
                target_pace
            };
            cumulative += pace;

            PaceSplit {
                km,
                target_pace_min_per_km: Decimal::from_f64(pace).unwrap_or(Decimal::ZERO).round_dp(2),
                cumulative_time_min: Decimal::from_f64(cumulative).unwrap_or(Decimal::ZERO).round_dp(1),
            }
        })
        .collect()
}
