//! Goel-Okumoto NHPP: m(t) = a (1 - e^(-b t)).
//!
//! Parameters come from the maximum-likelihood equations for failure-truncated
//! data. A finite maximum exists only when the training data shows reliability
//! growth (sum of failure times below n * t_n / 2).

use std::collections::BTreeMap;

use super::numeric::{bisect, scan_bracket};
use super::FitError;
use crate::series::cumulative;

#[derive(Debug, Clone, PartialEq)]
pub struct GoelOkumoto {
    /// Expected total number of failures.
    pub a: f64,
    /// Per-fault detection rate.
    pub b: f64,
}

impl GoelOkumoto {
    pub fn fit(train: &[f64]) -> Result<Self, FitError> {
        let n = train.len();
        if n < 2 {
            return Err(FitError::InsufficientData { needed: 2, have: n });
        }
        let times = cumulative(train);
        let t_n = times[n - 1];
        let sum_t: f64 = times.iter().sum();
        let nf = n as f64;

        // d/db log L with a eliminated.
        let score = |b: f64| {
            let x = b * t_n;
            let detected = -(-x).exp_m1();
            nf / b - sum_t - nf * t_n * (-x).exp() / detected
        };

        let (lo, hi) = scan_bracket(&score, 1e-6 / t_n, 1e4 / t_n, 400).ok_or_else(|| {
            FitError::NonConvergence(
                "likelihood has no finite maximum (no reliability growth in training data)".into(),
            )
        })?;
        let b = bisect(&score, lo, hi, 1e-12)
            .ok_or_else(|| FitError::NonConvergence("root search for b failed".into()))?;
        let a = nf / -(-b * t_n).exp_m1();

        if !a.is_finite() || !b.is_finite() || a <= 0.0 || b <= 0.0 {
            return Err(FitError::InvalidDomain(format!("a = {}, b = {}", a, b)));
        }
        Ok(Self { a, b })
    }

    pub fn mean_value(&self, t: f64) -> f64 {
        self.a * -(-self.b * t).exp_m1()
    }

    /// Time at which the k-th failure is expected; none once k reaches `a`.
    pub fn failure_time(&self, k: usize) -> Option<f64> {
        let k = k as f64;
        if k >= self.a {
            return None;
        }
        Some(-(1.0 - k / self.a).ln() / self.b)
    }

    pub fn predict(&self, len: usize) -> Vec<Option<f64>> {
        (1..=len).map(|k| self.failure_time(k)).collect()
    }

    pub fn parameters(&self) -> BTreeMap<String, f64> {
        BTreeMap::from([("a".to_string(), self.a), ("b".to_string(), self.b)])
    }
}
