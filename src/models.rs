use chrono::{DateTime, FixedOffset, NaiveDateTime};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::error::{Result, RunsightError};

/// Activity kinds accepted by the engine
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ActivityKind {
    Run,
    Walk,
    Hike,
    Ride,
}

impl ActivityKind {
    /// Parse the loose spellings found in exported datasets
    pub fn parse(value: &str) -> Option<Self> {
        match value.trim().to_lowercase().as_str() {
            "run" | "running" | "jog" | "trailrun" | "virtualrun" => Some(ActivityKind::Run),
            "walk" | "walking" => Some(ActivityKind::Walk),
            "hike" | "hiking" => Some(ActivityKind::Hike),
            "ride" | "cycling" | "bike" | "virtualride" => Some(ActivityKind::Ride),
            _ => None,
        }
    }
}

/// Standard race categories
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum RaceCategory {
    #[serde(rename = "5K")]
    FiveK,
    #[serde(rename = "10K")]
    TenK,
    #[serde(rename = "Half Marathon")]
    HalfMarathon,
    Marathon,
}

impl RaceCategory {
    /// Official distance in meters
    pub fn distance_meters(&self) -> f64 {
        match self {
            RaceCategory::FiveK => 5000.0,
            RaceCategory::TenK => 10000.0,
            RaceCategory::HalfMarathon => 21097.5,
            RaceCategory::Marathon => 42195.0,
        }
    }

    /// Category whose official distance matches `meters`
    pub fn from_distance(meters: f64) -> Option<Self> {
        [
            RaceCategory::FiveK,
            RaceCategory::TenK,
            RaceCategory::HalfMarathon,
            RaceCategory::Marathon,
        ]
        .into_iter()
        .find(|c| (c.distance_meters() - meters).abs() < 0.5)
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value.trim().to_lowercase().replace(['-', '_'], " ").as_str() {
            "5k" | "5 k" | "5000" | "5000m" => Some(RaceCategory::FiveK),
            "10k" | "10 k" | "10000" | "10000m" => Some(RaceCategory::TenK),
            "half marathon" | "half" | "21k" | "21.1k" => Some(RaceCategory::HalfMarathon),
            "marathon" | "full marathon" | "42k" | "42.2k" => Some(RaceCategory::Marathon),
            _ => None,
        }
    }
}

/// Weather snapshot recorded with an activity
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Weather {
    /// Temperature in degrees Celsius
    pub temperature: Option<f64>,
    /// Relative humidity percentage
    pub humidity: Option<f64>,
    /// Wind speed in m/s
    pub wind_speed: Option<f64>,
    pub conditions: Option<String>,
}

/// Start time as recorded by the source: with or without an offset.
///
/// Naive and aware values are never compared directly; every comparison goes
/// through [`ActivityTimestamp::to_naive_utc`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ActivityTimestamp {
    Aware(DateTime<FixedOffset>),
    Naive(NaiveDateTime),
}

impl ActivityTimestamp {
    /// UTC wall-clock time with the offset stripped
    pub fn to_naive_utc(&self) -> NaiveDateTime {
        match self {
            ActivityTimestamp::Aware(dt) => dt.naive_utc(),
            ActivityTimestamp::Naive(dt) => *dt,
        }
    }

    pub fn is_aware(&self) -> bool {
        matches!(self, ActivityTimestamp::Aware(_))
    }
}

impl From<NaiveDateTime> for ActivityTimestamp {
    fn from(value: NaiveDateTime) -> Self {
        ActivityTimestamp::Naive(value)
    }
}

impl From<DateTime<FixedOffset>> for ActivityTimestamp {
    fn from(value: DateTime<FixedOffset>) -> Self {
        ActivityTimestamp::Aware(value)
    }
}

/// One logged training session
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Activity {
    /// Unique identifier for the activity
    pub id: String,

    /// Owning athlete
    pub athlete_id: String,

    #[serde(default)]
    pub name: String,

    pub kind: ActivityKind,

    /// Distance in meters
    pub distance: f64,

    /// Duration in seconds
    pub duration: u32,

    /// Average pace in seconds per kilometer
    #[serde(default)]
    pub average_pace: Option<f64>,

    /// Best pace in seconds per kilometer
    #[serde(default)]
    pub max_pace: Option<f64>,

    #[serde(default)]
    pub average_heart_rate: Option<f64>,

    #[serde(default)]
    pub max_heart_rate: Option<f64>,

    #[serde(default)]
    pub average_cadence: Option<f64>,

    /// Elevation gain in meters
    #[serde(default)]
    pub elevation_gain: Option<f64>,

    pub start_date: ActivityTimestamp,

    #[serde(default)]
    pub is_race: bool,

    #[serde(default)]
    pub race_type: Option<RaceCategory>,

    #[serde(default)]
    pub weather: Option<Weather>,
}

impl Activity {
    /// Minimal run record; remaining fields default to absent
    pub fn run(
        id: impl Into<String>,
        athlete_id: impl Into<String>,
        distance_m: f64,
        duration_s: u32,
        start: impl Into<ActivityTimestamp>,
    ) -> Self {
        let average_pace = if distance_m > 0.0 {
            Some(duration_s as f64 / (distance_m / 1000.0))
        } else {
            None
        };

        Self {
            id: id.into(),
            athlete_id: athlete_id.into(),
            name: String::new(),
            kind: ActivityKind::Run,
            distance: distance_m,
            duration: duration_s,
            average_pace,
            max_pace: None,
            average_heart_rate: None,
            max_heart_rate: None,
            average_cadence: None,
            elevation_gain: None,
            start_date: start.into(),
            is_race: false,
            race_type: None,
            weather: None,
        }
    }

    /// Boundary check for records coming from importers or callers
    pub fn validate(&self) -> Result<()> {
        if self.id.trim().is_empty() {
            return Err(RunsightError::Validation(
                "activity id must not be empty".to_string(),
            ));
        }
        if !self.distance.is_finite() || self.distance < 0.0 {
            return Err(RunsightError::Validation(format!(
                "activity {}: distance must be a non-negative number, got {}",
                self.id, self.distance
            )));
        }
        if self.duration == 0 {
            return Err(RunsightError::Validation(format!(
                "activity {}: duration must be greater than zero",
                self.id
            )));
        }
        for (field, value) in [
            ("average_pace", self.average_pace),
            ("average_heart_rate", self.average_heart_rate),
            ("elevation_gain", self.elevation_gain),
        ] {
            if let Some(v) = value {
                if !v.is_finite() || v < 0.0 {
                    return Err(RunsightError::Validation(format!(
                        "activity {}: {} must be a non-negative number, got {}",
                        self.id, field, v
                    )));
                }
            }
        }
        Ok(())
    }
}

/// Observed race result used as a training label
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RaceResult {
    pub athlete_id: String,
    pub race_date: NaiveDateTime,
    /// Race distance in meters
    pub race_distance: f64,
    /// Finishing time in seconds
    pub race_time_sec: f64,
}

/// Optional athlete attributes used to adjust fatigue
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AthleteProfile {
    pub age: Option<f64>,
    pub fitness_level: Option<String>,
}

impl AthleteProfile {
    /// Read a loosely typed profile object. Only a numeric `age` and a string
    /// `fitness_level` are taken; other shapes are ignored.
    pub fn from_json(value: &serde_json::Value) -> Self {
        let age = value.get("age").and_then(serde_json::Value::as_f64);
        let fitness_level = value
            .get("fitness_level")
            .and_then(serde_json::Value::as_str)
            .map(str::to_string);
        Self { age, fitness_level }
    }
}

/// Acute:chronic risk tiers
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RiskLevel {
    Low,
    Moderate,
    High,
}

impl RiskLevel {
    /// Tier for an acute:chronic ratio
    pub fn from_ratio(ratio: f64) -> Self {
        if ratio < 0.8 {
            RiskLevel::Low
        } else if ratio > 1.3 {
            RiskLevel::High
        } else {
            RiskLevel::Moderate
        }
    }

    pub fn recommendation(&self) -> &'static str {
        match self {
            RiskLevel::Low => "Consider gradually increasing training volume",
            RiskLevel::Moderate => "Good training balance - maintain current approach",
            RiskLevel::High => "High training stress - consider rest or easy training",
        }
    }
}

/// Acute vs chronic training load summary
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrainingLoad {
    /// Mean daily effort over the last 7 days
    pub acute_load: f64,
    /// Mean daily effort over the last 28 days
    pub chronic_load: f64,
    pub ratio: f64,
    pub risk_level: RiskLevel,
    pub recommendation: String,
    /// True when the result is the not-enough-history sentinel
    pub insufficient_data: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TrainingReadiness {
    High,
    Medium,
    Low,
}

impl TrainingReadiness {
    pub fn from_score(fatigue_score: f64) -> Self {
        if fatigue_score < 30.0 {
            TrainingReadiness::High
        } else if fatigue_score < 60.0 {
            TrainingReadiness::Medium
        } else {
            TrainingReadiness::Low
        }
    }
}

impl std::fmt::Display for TrainingReadiness {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            TrainingReadiness::High => write!(f, "high"),
            TrainingReadiness::Medium => write!(f, "medium"),
            TrainingReadiness::Low => write!(f, "low"),
        }
    }
}

/// Individual fatigue sub-scores, each in [0, 100]
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct FatigueComponents {
    pub training_load: f64,
    pub intensity: f64,
    pub volume: f64,
    pub recovery_debt: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FatigueAnalysis {
    /// Overall fatigue, 0-100
    pub fatigue_score: f64,
    pub recovery_recommendation: String,
    pub days_to_full_recovery: u32,
    pub training_readiness: TrainingReadiness,
    pub contributing_factors: Vec<String>,
    pub components: FatigueComponents,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ConfidenceInterval {
    /// Seconds
    pub min: f64,
    /// Seconds
    pub max: f64,
}

/// Per-kilometre pacing target
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PaceSplit {
    pub km: u32,
    /// Minutes per kilometre, rounded to 2 places
    pub target_pace_min_per_km: Decimal,
    /// Minutes since the start, rounded to 1 place
    pub cumulative_time_min: Decimal,
}

/// Value returned by one ensemble member, 0.0 when it did not apply
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EstimatorOutput {
    pub estimator: String,
    /// Predicted seconds
    pub predicted_time: f64,
    pub weight: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PerformancePrediction {
    /// Meters
    pub race_distance: f64,
    pub race_type: Option<RaceCategory>,
    /// Seconds
    pub predicted_time: f64,
    pub confidence_interval: ConfidenceInterval,
    pub pacing_strategy: Vec<PaceSplit>,
    /// In [0, 1]
    pub confidence: f64,
    pub estimators: Vec<EstimatorOutput>,
}
