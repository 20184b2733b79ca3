//! Descriptive statistics over a borrowed slice of samples.

use serde::{Deserialize, Serialize};

/// A view over a series of finite samples.
pub struct Sample<'a> {
    values: &'a [f64],
}

impl<'a> Sample<'a> {
    pub fn new(values: &'a [f64]) -> Self {
        Self { values }
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    pub fn mean(&self) -> f64 {
        if self.values.is_empty() {
            return 0.0;
        }
        self.values.iter().sum::<f64>() / self.values.len() as f64
    }

    /// Sample variance (n - 1 denominator). Zero for fewer than two samples.
    pub fn variance(&self) -> f64 {
        let n = self.values.len();
        if n < 2 {
            return 0.0;
        }
        let mean = self.mean();
        let sum_sq_diff: f64 = self.values.iter().map(|&x| (x - mean).powi(2)).sum();
        sum_sq_diff / (n - 1) as f64
    }

    pub fn std_dev(&self) -> f64 {
        self.variance().sqrt()
    }

    /// Z = (value - mean) / std_dev, or 0 when the series is constant.
    pub fn z_score(&self, value: f64) -> f64 {
        let std = self.std_dev();
        if std == 0.0 {
            return 0.0;
        }
        (value - self.mean()) / std
    }

    /// Quantile with linear interpolation between closest ranks.
    pub fn quantile(&self, q: f64) -> f64 {
        if self.values.is_empty() {
            return 0.0;
        }
        let mut sorted = self.values.to_vec();
        sorted.sort_by(|a, b| a.total_cmp(b));
        let pos = q.clamp(0.0, 1.0) * (sorted.len() - 1) as f64;
        let lo = pos.floor() as usize;
        let hi = pos.ceil() as usize;
        let frac = pos - lo as f64;
        sorted[lo] + (sorted[hi] - sorted[lo]) * frac
    }

    pub fn median(&self) -> f64 {
        self.quantile(0.5)
    }

    pub fn min(&self) -> f64 {
        self.values.iter().copied().fold(f64::INFINITY, f64::min)
    }

    pub fn max(&self) -> f64 {
        self.values.iter().copied().fold(f64::NEG_INFINITY, f64::max)
    }

    /// Equal-width histogram over [min, max]; the last bin is closed.
    /// A constant series is spread over [v - 0.5, v + 0.5].
    pub fn histogram(&self, bins: usize) -> Distribution {
        if self.values.is_empty() || bins == 0 {
            return Distribution::default();
        }
        let (mut lo, mut hi) = (self.min(), self.max());
        if lo == hi {
            lo -= 0.5;
            hi += 0.5;
        }
        let width = (hi - lo) / bins as f64;

        let mut counts = vec![0u64; bins];
        for &v in self.values {
            let idx = (((v - lo) / width) as usize).min(bins - 1);
            counts[idx] += 1;
        }
        let labels = (0..bins)
            .map(|i| lo + width * (i as f64 + 0.5))
            .collect();

        Distribution { labels, counts }
    }
}

/// Histogram rendered for the UI: bin centres and their counts.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Distribution {
    pub labels: Vec<f64>,
    pub counts: Vec<u64>,
}
