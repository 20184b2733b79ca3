//! Statistical baseline: least-squares line of cumulative time on failure index.

use std::collections::BTreeMap;

use super::numeric::fit_line;
use super::FitError;

#[derive(Debug, Clone, PartialEq)]
pub struct LinearTrend {
    pub slope: f64,
    pub intercept: f64,
}

impl LinearTrend {
    pub fn fit(train_times: &[f64]) -> Result<Self, FitError> {
        let n = train_times.len();
        if n < 2 {
            return Err(FitError::InsufficientData { needed: 2, have: n });
        }
        let idx: Vec<f64> = (0..n).map(|i| i as f64).collect();
        let (slope, intercept) = fit_line(&idx, train_times)
            .ok_or_else(|| FitError::Degenerate("failure index has no spread".into()))?;
        if !slope.is_finite() || slope <= 0.0 {
            return Err(FitError::InvalidDomain(format!("slope = {}", slope)));
        }
        Ok(Self { slope, intercept })
    }

    /// Line values over the training prefix; forecasts step by `slope` from
    /// the last observed training failure.
    pub fn predict(&self, train_times: &[f64], len: usize) -> Vec<Option<f64>> {
        let train_len = train_times.len().min(len);
        let last = train_times.last().copied().unwrap_or(0.0);
        let fitted = (0..train_len).map(|i| Some(self.slope * i as f64 + self.intercept));
        let forecast = (1..=len - train_len).map(|j| Some(last + j as f64 * self.slope));
        fitted.chain(forecast).collect()
    }

    pub fn parameters(&self) -> BTreeMap<String, f64> {
        BTreeMap::from([
            ("slope".to_string(), self.slope),
            ("intercept".to_string(), self.intercept),
        ])
    }
}
