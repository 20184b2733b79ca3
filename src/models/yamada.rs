//! Yamada delayed S-shaped NHPP: m(t) = a (1 - (1 + b t) e^(-b t)).

use std::collections::BTreeMap;

use super::numeric::{bisect, invert_increasing, scan_bracket};
use super::FitError;
use crate::series::cumulative;

#[derive(Debug, Clone, PartialEq)]
pub struct YamadaSShaped {
    pub a: f64,
    pub b: f64,
}

/// 1 - (1 + x) e^(-x), accurate for small x.
fn detected_fraction(x: f64) -> f64 {
    -(-x).exp_m1() - x * (-x).exp()
}

impl YamadaSShaped {
    /// Maximum likelihood; a finite estimate needs sum(t_i) < 2 n t_n / 3.
    pub fn fit(train: &[f64]) -> Result<Self, FitError> {
        let n = train.len();
        if n < 2 {
            return Err(FitError::InsufficientData { needed: 2, have: n });
        }
        let times = cumulative(train);
        let t_n = times[n - 1];
        let sum_t: f64 = times.iter().sum();
        let nf = n as f64;

        let score = |b: f64| {
            let x = b * t_n;
            2.0 * nf / b - sum_t - nf * b * t_n * t_n * (-x).exp() / detected_fraction(x)
        };

        let (lo, hi) = scan_bracket(&score, 1e-4 / t_n, 1e3 / t_n, 400).ok_or_else(|| {
            FitError::NonConvergence("S-shaped likelihood has no finite maximum".into())
        })?;
        let b = bisect(&score, lo, hi, 1e-12)
            .ok_or_else(|| FitError::NonConvergence("root search for b failed".into()))?;
        let a = nf / detected_fraction(b * t_n);

        if !a.is_finite() || a <= 0.0 || b <= 0.0 {
            return Err(FitError::InvalidDomain(format!("a = {}, b = {}", a, b)));
        }
        Ok(Self { a, b })
    }

    pub fn mean_value(&self, t: f64) -> f64 {
        self.a * detected_fraction(self.b * t)
    }

    pub fn failure_time(&self, k: usize) -> Option<f64> {
        let k = k as f64;
        if k >= self.a {
            return None;
        }
        invert_increasing(|t| self.mean_value(t), k, 1.0 / self.b)
    }

    pub fn predict(&self, len: usize) -> Vec<Option<f64>> {
        (1..=len).map(|k| self.failure_time(k)).collect()
    }

    pub fn parameters(&self) -> BTreeMap<String, f64> {
        BTreeMap::from([("a".to_string(), self.a), ("b".to_string(), self.b)])
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fit_matches_observed_count_at_end() {
        let train = [5.0, 10.0, 15.0];
        let model = YamadaSShaped::fit(&train).unwrap();
        assert!((model.mean_value(30.0) - 3.0).abs() < 1e-6);
    }

    #[test]
    fn test_failure_time_inverts_mean_value() {
        let model = YamadaSShaped { a: 40.0, b: 0.05 };
        let t = model.failure_time(12).unwrap();
        assert!((model.mean_value(t) - 12.0).abs() < 1e-6);
        assert!(model.failure_time(40).is_none());
    }

    #[test]
    fn test_small_argument_is_stable() {
        let tiny = detected_fraction(1e-6);
        assert!(tiny > 0.0);
        assert!((tiny - 0.5e-12).abs() < 1e-17);
    }

    #[test]
    fn test_decay_does_not_converge() {
        let decaying: Vec<f64> = (1..=15).rev().map(|i| i as f64 * 3.0).collect();
        assert!(YamadaSShaped::fit(&decaying).is_err());
    }
}
