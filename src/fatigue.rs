//! Fatigue scoring
//!
//! Four independently computed sub-scores (training load, intensity
//! distribution, volume and recovery debt) are blended into a single 0-100
//! fatigue score over the last two weeks of activity, then adjusted for the
//! athlete profile. Readiness, recovery days, a recommendation and the main
//! contributing factors are derived from the result.

use chrono::{Duration, NaiveDateTime};
use serde::{Deserialize, Serialize};

use crate::models::{
    Activity, AthleteProfile, FatigueAnalysis, FatigueComponents, TrainingReadiness,
};
use crate::normalizer::{normalize, CanonicalRow, CanonicalSeries};
use crate::signals::{blend, WeightedSignal};

/// Fatigue model configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FatigueConfig {
    /// Days of history considered
    pub window_days: u16,

    /// Max heart rate assumed when none is known (220 - 30)
    pub estimated_max_hr: f64,

    /// Training impulse expected over the window for a normal block
    pub expected_load: f64,

    /// HR fraction above which a session counts as high intensity
    pub high_intensity_hr_fraction: f64,

    /// Pace (min/km) below which a session counts as high intensity
    pub high_intensity_pace: f64,

    pub weight_training_load: f64,
    pub weight_intensity: f64,
    pub weight_volume: f64,
    pub weight_recovery_debt: f64,
}

impl Default for FatigueConfig {
    fn default() -> Self {
        FatigueConfig {
            window_days: 14,
            estimated_max_hr: 190.0,
            expected_load: 500.0,
            high_intensity_hr_fraction: 0.85,
            high_intensity_pace: 4.5,
            weight_training_load: 0.30,
            weight_intensity: 0.25,
            weight_volume: 0.25,
            weight_recovery_debt: 0.20,
        }
    }
}

/// The four fatigue sub-scores
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FatigueSignal {
    TrainingLoad,
    Intensity,
    Volume,
    RecoveryDebt,
}

impl FatigueSignal {
    pub const ALL: [FatigueSignal; 4] = [
        FatigueSignal::TrainingLoad,
        FatigueSignal::Intensity,
        FatigueSignal::Volume,
        FatigueSignal::RecoveryDebt,
    ];

    fn weight(&self, config: &FatigueConfig) -> f64 {
        match self {
            FatigueSignal::TrainingLoad => config.weight_training_load,
            FatigueSignal::Intensity => config.weight_intensity,
            FatigueSignal::Volume => config.weight_volume,
            FatigueSignal::RecoveryDebt => config.weight_recovery_debt,
        }
    }

    /// Factor reported when this sub-score is a significant contributor
    pub fn factor(&self) -> &'static str {
        match self {
            FatigueSignal::TrainingLoad => "High overall training load",
            FatigueSignal::Intensity => "Too much high-intensity training",
            FatigueSignal::Volume => "High training volume",
            FatigueSignal::RecoveryDebt => "Insufficient recovery between sessions",
        }
    }
}

/// Window rows with their whole days elapsed before the reference time
struct RecentWindow<'a> {
    rows: &'a [CanonicalRow],
    reference_time: NaiveDateTime,
}

impl RecentWindow<'_> {
    fn days_ago(&self, row: &CanonicalRow) -> i64 {
        (self.reference_time - row.start).num_days()
    }
}

pub struct FatigueAnalyzer {
    config: FatigueConfig,
}

impl FatigueAnalyzer {
    pub fn new() -> Self {
        Self {
            config: FatigueConfig::default(),
        }
    }

    pub fn with_config(config: FatigueConfig) -> Self {
        Self { config }
    }

    /// Analyze fatigue as of `reference_time`
    pub fn analyze(
        &self,
        activities: &[Activity],
        profile: Option<&AthleteProfile>,
        reference_time: NaiveDateTime,
    ) -> FatigueAnalysis {
        if activities.is_empty() {
            return Self::default_analysis("No activity data available");
        }

        let cutoff = reference_time - Duration::days(self.config.window_days as i64);
        let recent: CanonicalSeries = normalize(activities).since(cutoff);
        if recent.is_empty() {
            return Self::default_analysis("No recent activities found");
        }

        let window = RecentWindow {
            rows: recent.rows(),
            reference_time,
        };

        let components = FatigueComponents {
            training_load: self.score(FatigueSignal::TrainingLoad, &window),
            intensity: self.score(FatigueSignal::Intensity, &window),
            volume: self.score(FatigueSignal::Volume, &window),
            recovery_debt: self.score(FatigueSignal::RecoveryDebt, &window),
        };

        let signals: Vec<WeightedSignal<FatigueSignal>> = FatigueSignal::ALL
            .iter()
            .map(|s| WeightedSignal::new(*s, s.weight(&self.config), Some(component(&components, *s))))
            .collect();
        let mut overall = blend(&signals).unwrap_or(0.0);

        if let Some(profile) = profile {
            overall = Self::adjust_for_profile(overall, profile);
        }
        let fatigue_score = overall.clamp(0.0, 100.0);

        let contributing_factors = self.contributing_factors(&components, &window);
        tracing::debug!(
            fatigue_score,
            load = components.training_load,
            intensity = components.intensity,
            volume = components.volume,
            debt = components.recovery_debt,
            "Computed fatigue"
        );

        FatigueAnalysis {
            fatigue_score,
            recovery_recommendation: Self::recommendation(fatigue_score).to_string(),
            days_to_full_recovery: Self::recovery_days(fatigue_score),
            training_readiness: TrainingReadiness::from_score(fatigue_score),
            contributing_factors,
            components,
        }
    }

    fn score(&self, signal: FatigueSignal, window: &RecentWindow<'_>) -> f64 {
        let raw = match signal {
            FatigueSignal::TrainingLoad => self.training_load_fatigue(window),
            FatigueSignal::Intensity => self.intensity_fatigue(window),
            FatigueSignal::Volume => Self::volume_fatigue(window),
            FatigueSignal::RecoveryDebt => self.recovery_debt(window),
        };
        raw.clamp(0.0, 100.0)
    }

    fn hr_fraction(&self, row: &CanonicalRow) -> Option<f64> {
        row.average_heart_rate
            .map(|hr| hr / self.config.estimated_max_hr)
    }

    /// TRIMP-like impulse summed over the window and scaled against the baseline
    fn training_load_fatigue(&self, window: &RecentWindow<'_>) -> f64 {
        let total_load: f64 = window
            .rows
            .iter()
            .map(|row| {
                let base_load = row.duration_hours * 100.0;

                let mut intensity = if let Some(fraction) = self.hr_fraction(row) {
                    hr_to_intensity_factor(fraction)
                } else if let Some(pace) = row.pace_min_per_km {
                    if pace < 4.0 {
                        2.0
                    } else if pace < 5.0 {
                        1.5
                    } else if pace < 6.0 {
                        1.2
                    } else {
                        1.0
                    }
                } else {
                    1.0
                };

                if row.is_race {
                    intensity *= 1.5;
                }

                // 20% per 1000 m climbed
                let elevation = 1.0 + (row.elevation_gain / 1000.0) * 0.2;
                base_load * intensity * elevation
            })
            .sum();

        let load_ratio = total_load / self.config.expected_load;
        (load_ratio * 50.0).min(100.0)
    }

    fn is_high_intensity(&self, row: &CanonicalRow) -> bool {
        if let Some(fraction) = self.hr_fraction(row) {
            fraction > self.config.high_intensity_hr_fraction
        } else if let Some(pace) = row.pace_min_per_km {
            pace < self.config.high_intensity_pace
        } else {
            false
        }
    }

    /// Penalty when more than 30% of sessions are hard (80/20 rule)
    fn intensity_fatigue(&self, window: &RecentWindow<'_>) -> f64 {
        let high_intensity: usize = window
            .rows
            .iter()
            .map(|row| {
                if row.is_race {
                    2
                } else if self.is_high_intensity(row) {
                    1
                } else {
                    0
                }
            })
            .sum();

        let ratio = high_intensity as f64 / window.rows.len().max(1) as f64;
        if ratio > 0.3 {
            ((ratio - 0.2) * 200.0).min(100.0)
        } else {
            0.0
        }
    }

    fn volume_fatigue(window: &RecentWindow<'_>) -> f64 {
        let weekly_distance = window.rows.iter().map(|r| r.distance_km).sum::<f64>() / 2.0;
        let weekly_hours = window.rows.iter().map(|r| r.duration_hours).sum::<f64>() / 2.0;

        let distance_fatigue = if weekly_distance > 80.0 {
            80.0
        } else if weekly_distance > 60.0 {
            60.0
        } else if weekly_distance > 40.0 {
            30.0
        } else {
            0.0
        };

        let time_fatigue = if weekly_hours > 8.0 {
            80.0
        } else if weekly_hours > 6.0 {
            60.0
        } else if weekly_hours > 4.0 {
            30.0
        } else {
            0.0
        };

        f64::max(distance_fatigue, time_fatigue)
    }

    /// Required recovery days for a single session
    fn required_recovery(&self, row: &CanonicalRow) -> f64 {
        let mut recovery = row.duration_hours * 0.5;

        if row.is_race {
            recovery *= 3.0;
        } else if self
            .hr_fraction(row)
            .is_some_and(|f| f > self.config.high_intensity_hr_fraction)
        {
            recovery *= 2.0;
        }

        if row.distance_km > 25.0 {
            recovery *= 1.5;
        }

        recovery
    }

    fn recovery_debt(&self, window: &RecentWindow<'_>) -> f64 {
        let total_debt: f64 = window
            .rows
            .iter()
            .map(|row| {
                let required = self.required_recovery(row);
                let days_since = window.days_ago(row) as f64;
                if required > 0.0 && days_since < required {
                    (required - days_since) / required * 20.0
                } else {
                    0.0
                }
            })
            .sum();

        total_debt.min(100.0)
    }

    fn adjust_for_profile(score: f64, profile: &AthleteProfile) -> f64 {
        let mut adjusted = score;

        if let Some(age) = profile.age.filter(|a| a.is_finite()) {
            if age > 50.0 {
                adjusted *= 1.2;
            } else if age < 25.0 {
                adjusted *= 0.9;
            }
        }

        if let Some(level) = &profile.fitness_level {
            match level.to_lowercase().as_str() {
                "elite" => adjusted *= 0.8,
                "beginner" => adjusted *= 1.3,
                _ => {}
            }
        }

        adjusted
    }

    fn contributing_factors(
        &self,
        components: &FatigueComponents,
        window: &RecentWindow<'_>,
    ) -> Vec<String> {
        let mut ranked: Vec<(FatigueSignal, f64)> = FatigueSignal::ALL
            .iter()
            .map(|s| (*s, component(components, *s)))
            .collect();
        ranked.sort_by(|a, b| b.1.partial_cmp(&a.1).unwrap_or(std::cmp::Ordering::Equal));

        let mut factors: Vec<String> = ranked
            .iter()
            .take(3)
            .filter(|(_, score)| *score > 30.0)
            .map(|(signal, _)| signal.factor().to_string())
            .collect();

        let recent_race = window
            .rows
            .iter()
            .filter(|r| r.is_race)
            .map(|r| window.days_ago(r))
            .min();
        if recent_race.is_some_and(|days| days <= 7) {
            factors.push("Recent race effort".to_string());
        }

        if window.rows.len() > 5 {
            let max_gap = window
                .rows
                .windows(2)
                .map(|pair| (pair[1].start - pair[0].start).num_days())
                .max()
                .unwrap_or(0);
            if max_gap <= 1 {
                factors.push("Lack of rest days".to_string());
            }
        }

        if factors.is_empty() {
            vec!["Normal training adaptations".to_string()]
        } else {
            factors
        }
    }

    fn recommendation(score: f64) -> &'static str {
        if score < 20.0 {
            "Low fatigue - ready for training. Consider adding intensity or volume."
        } else if score < 40.0 {
            "Moderate fatigue - maintain easy training. Focus on aerobic base building."
        } else if score < 60.0 {
            "High fatigue - prioritize recovery. Easy runs only, consider rest days."
        } else if score < 80.0 {
            "Very high fatigue - significant recovery needed. Take 2-3 rest days."
        } else {
            "Extreme fatigue - complete rest recommended. Consider consulting a coach."
        }
    }

    fn recovery_days(score: f64) -> u32 {
        if score < 20.0 {
            0
        } else if score < 40.0 {
            1
        } else if score < 60.0 {
            2
        } else if score < 80.0 {
            4
        } else {
            7
        }
    }

    fn default_analysis(reason: &str) -> FatigueAnalysis {
        FatigueAnalysis {
            fatigue_score: 50.0,
            recovery_recommendation: format!("Unable to analyze fatigue: {}", reason),
            days_to_full_recovery: 1,
            training_readiness: TrainingReadiness::Medium,
            contributing_factors: vec![reason.to_string()],
            components: FatigueComponents::default(),
        }
    }
}

impl Default for FatigueAnalyzer {
    fn default() -> Self {
        Self::new()
    }
}

fn component(components: &FatigueComponents, signal: FatigueSignal) -> f64 {
    match signal {
        FatigueSignal::TrainingLoad => components.training_load,
        FatigueSignal::Intensity => components.intensity,
        FatigueSignal::Volume => components.volume,
        FatigueSignal::RecoveryDebt => components.recovery_debt,
    }
}

fn hr_to_intensity_factor(hr_fraction: f64) -> f64 {
    if hr_fraction < 0.60 {
        0.5
    } else if hr_fraction < 0.70 {
        1.0
    } else if hr_fraction < 0.80 {
        1.5
    } else if hr_fraction < 0.90 {
        2.0
    } else {
        3.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    fn reference() -> NaiveDateTime {
        NaiveDate::from_ymd_opt(2024, 10, 31)
            .unwrap()
            .and_hms_opt(12, 0, 0)
            .unwrap()
    }

    fn days_before(days: i64) -> NaiveDateTime {
        reference() - Duration::days(days) - Duration::hours(5)
    }

    fn run(days_ago: i64, km: f64, minutes: u32) -> Activity {
        Activity::run(format!("r{days_ago}"), "u", km * 1000.0, minutes * 60, days_before(days_ago))
    }

    #[test]
    fn test_no_activities_default() {
        let analysis = FatigueAnalyzer::new().analyze(&[], None, reference());
        assert_eq!(analysis.fatigue_score, 50.0);
        assert_eq!(analysis.training_readiness, TrainingReadiness::Medium);
        assert_eq!(analysis.days_to_full_recovery, 1);
        assert_eq!(analysis.contributing_factors, vec!["No activity data available"]);
    }

    #[test]
    fn test_only_old_activities_default() {
        let analysis = FatigueAnalyzer::new().analyze(&[run(40, 10.0, 60)], None, reference());
        assert_eq!(analysis.fatigue_score, 50.0);
        assert!(analysis.recovery_recommendation.contains("No recent activities found"));
    }

    #[test]
    fn test_light_week_is_fresh() {
        let activities = vec![run(3, 5.0, 30), run(6, 5.0, 30)];
        let analysis = FatigueAnalyzer::new().analyze(&activities, None, reference());
        // load: 1h × 100 × 1.0 / 500 × 50 = 10
        assert!((analysis.components.training_load - 10.0).abs() < 1e-9);
        assert_eq!(analysis.components.intensity, 0.0);
        assert_eq!(analysis.components.volume, 0.0);
        assert_eq!(analysis.components.recovery_debt, 0.0);
        assert!((analysis.fatigue_score - 3.0).abs() < 1e-9);
        assert_eq!(analysis.training_readiness, TrainingReadiness::High);
        assert_eq!(analysis.days_to_full_recovery, 0);
        assert_eq!(analysis.contributing_factors, vec!["Normal training adaptations"]);
    }

    #[test]
    fn test_heart_rate_intensity_factors() {
        assert_eq!(hr_to_intensity_factor(0.55), 0.5);
        assert_eq!(hr_to_intensity_factor(0.65), 1.0);
        assert_eq!(hr_to_intensity_factor(0.75), 1.5);
        assert_eq!(hr_to_intensity_factor(0.85), 2.0);
        assert_eq!(hr_to_intensity_factor(0.95), 3.0);
    }

    #[test]
    fn test_hard_sessions_trigger_intensity_penalty() {
        let mut activities: Vec<Activity> = (1..=4).map(|d| run(d * 2, 8.0, 40)).collect();
        for a in activities.iter_mut().take(2) {
            a.average_heart_rate = Some(175.0);
        }
        let analysis = FatigueAnalyzer::new().analyze(&activities, None, reference());
        // 2 hard of 4 sessions: (0.5 - 0.2) × 200 = 60
        assert!((analysis.components.intensity - 60.0).abs() < 1e-9);
        assert!(analysis
            .contributing_factors
            .contains(&"Too much high-intensity training".to_string()));
    }

    #[test]
    fn test_recent_race_factor_and_debt() {
        let mut race = run(2, 21.1, 100);
        race.is_race = true;
        let activities = vec![race, run(5, 6.0, 35)];
        let analysis = FatigueAnalyzer::new().analyze(&activities, None, reference());
        // race: 100 min → 0.8333 h × 0.5 × 3 = 2.5 days required, 2 elapsed
        let expected_debt = (2.5 - 2.0) / 2.5 * 20.0;
        assert!((analysis.components.recovery_debt - expected_debt).abs() < 1e-9);
        assert!(analysis.contributing_factors.contains(&"Recent race effort".to_string()));
    }

    #[test]
    fn test_profile_adjustments() {
        let activities = vec![run(1, 12.0, 70), run(2, 10.0, 60), run(4, 16.0, 95)];
        let analyzer = FatigueAnalyzer::new();
        let base = analyzer.analyze(&activities, None, reference()).fatigue_score;

        let older = AthleteProfile {
            age: Some(55.0),
            fitness_level: None,
        };
        let elite_young = AthleteProfile {
            age: Some(22.0),
            fitness_level: Some("ELITE".to_string()),
        };
        let beginner = AthleteProfile {
            age: None,
            fitness_level: Some("beginner".to_string()),
        };

        let older_score = analyzer.analyze(&activities, Some(&older), reference()).fatigue_score;
        let elite_score = analyzer.analyze(&activities, Some(&elite_young), reference()).fatigue_score;
        let beginner_score = analyzer.analyze(&activities, Some(&beginner), reference()).fatigue_score;

        assert!((older_score - (base * 1.2).min(100.0)).abs() < 1e-9);
        assert!((elite_score - base * 0.9 * 0.8).abs() < 1e-9);
        assert!((beginner_score - (base * 1.3).min(100.0)).abs() < 1e-9);

        let intermediate = AthleteProfile {
            age: None,
            fitness_level: Some("intermediate".to_string()),
        };
        let intermediate_score = analyzer.analyze(&activities, Some(&intermediate), reference()).fatigue_score;
        assert_eq!(intermediate_score, base);
    }

    #[test]
    fn test_daily_training_without_rest() {
        let activities: Vec<Activity> = (0..30).map(|d| run(d, 10.0, 60)).collect();
        let analysis = FatigueAnalyzer::new().analyze(&activities, None, reference());

        assert_ne!(analysis.training_readiness, TrainingReadiness::High);
        assert!(analysis.contributing_factors.contains(&"Lack of rest days".to_string()));
        assert!(analysis.fatigue_score >= 0.0 && analysis.fatigue_score <= 100.0);
    }

    #[test]
    fn test_score_non_decreasing_with_volume() {
        let base: Vec<Activity> = (0..6).map(|d| run(d * 2, 7.0, 40)).collect();
        let doubled: Vec<Activity> = (0..6).map(|d| run(d * 2, 14.0, 80)).collect();
        let analyzer = FatigueAnalyzer::new();
        let a = analyzer.analyze(&base, None, reference());
        let b = analyzer.analyze(&doubled, None, reference());
        assert!(b.components.volume >= a.components.volume);
        assert!(b.fatigue_score >= a.fatigue_score);
    }
}
