//! Weighted blending of independent signals.
//!
//! Both the fatigue sub-scores and the prediction ensemble are a fixed weight
//! table over named signals, some of which may be absent. Absent signals are
//! dropped and the remaining weights are renormalized.

use serde::{Deserialize, Serialize};

/// One named input to a blend; `value` is `None` when the signal did not apply
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WeightedSignal<K> {
    pub key: K,
    pub weight: f64,
    pub value: Option<f64>,
}

impl<K> WeightedSignal<K> {
    pub fn new(key: K, weight: f64, value: Option<f64>) -> Self {
        Self { key, weight, value }
    }

    /// Present only when strictly positive and finite
    pub fn positive(key: K, weight: f64, value: f64) -> Self {
        let value = (value.is_finite() && value > 0.0).then_some(value);
        Self { key, weight, value }
    }

    pub fn is_present(&self) -> bool {
        self.value.is_some()
    }
}

/// Weighted mean over present signals, `None` when nothing is present or the
/// participating weights sum to zero
pub fn blend<K>(signals: &[WeightedSignal<K>]) -> Option<f64> {
    let (weighted, total_weight) = signals
        .iter()
        .filter_map(|s| s.value.map(|v| (v * s.weight, s.weight)))
        .fold((0.0, 0.0), |(acc, w), (v, sw)| (acc + v, w + sw));

    if total_weight > 0.0 {
        Some(weighted / total_weight)
    } else {
        None
    }
}

/// Values of the present signals
pub fn present_values<K>(signals: &[WeightedSignal<K>]) -> Vec<f64> {
    signals.iter().filter_map(|s| s.value).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_blend_all_present() {
        let signals = vec![
            WeightedSignal::new("a", 0.3, Some(100.0)),
            WeightedSignal::new("b", 0.7, Some(0.0)),
        ];
        assert!((blend(&signals).unwrap() - 30.0).abs() < 1e-12);
    }

    #[test]
    fn test_blend_renormalizes_over_present() {
        let signals = vec![
            WeightedSignal::positive("model", 0.5, 0.0),
            WeightedSignal::positive("pace", 0.25, 1200.0),
            WeightedSignal::positive("trend", 0.15, f64::NAN),
            WeightedSignal::positive("distance", 0.10, 1300.0),
        ];
        let expected = (0.25 * 1200.0 + 0.10 * 1300.0) / 0.35;
        assert!((blend(&signals).unwrap() - expected).abs() < 1e-9);
        assert_eq!(present_values(&signals), vec![1200.0, 1300.0]);
    }

    #[test]
    fn test_blend_nothing_present() {
        let signals = vec![WeightedSignal::positive("model", 0.5, -3.0)];
        assert_eq!(blend(&signals), None);
        assert_eq!(blend::<&str>(&[]), None);
    }
}
