//! Grey model GM(1,1) over the TBF sequence.
//!
//! With x1 the accumulated series (cumulative failure time) and
//! z1(k) = (x1(k) + x1(k-1)) / 2, the whitened equation
//! x0(k) + a z1(k) = b is solved by least squares. The time response
//! x1(k) = (x0(1) - b/a) e^(-a (k-1)) + b/a yields cumulative times for any k.

use std::collections::BTreeMap;

use super::numeric::fit_line;
use super::FitError;
use crate::series::cumulative;

#[derive(Debug, Clone, PartialEq)]
pub struct GreyModel {
    /// Development coefficient.
    pub a: f64,
    /// Grey input.
    pub b: f64,
    /// First observation, the model's initial condition.
    pub x0_1: f64,
}

impl GreyModel {
    pub fn fit(train: &[f64]) -> Result<Self, FitError> {
        let n = train.len();
        if n < 3 {
            return Err(FitError::InsufficientData { needed: 3, have: n });
        }
        let x1 = cumulative(train);
        let z1: Vec<f64> = x1.windows(2).map(|w| 0.5 * (w[0] + w[1])).collect();

        let (slope, intercept) = fit_line(&z1, &train[1..])
            .ok_or_else(|| FitError::Degenerate("background values have no spread".into()))?;
        let (a, b) = (-slope, intercept);
        if !a.is_finite() || !b.is_finite() {
            return Err(FitError::Degenerate(format!("a = {}, b = {}", a, b)));
        }
        Ok(Self {
            a,
            b,
            x0_1: train[0],
        })
    }

    /// Accumulated value at the k-th point (1-based).
    pub fn response(&self, k: usize) -> f64 {
        let steps = (k - 1) as f64;
        if self.a.abs() < 1e-12 {
            return self.x0_1 + self.b * steps;
        }
        let ratio = self.b / self.a;
        (self.x0_1 - ratio) * (-self.a * steps).exp() + ratio
    }

    /// Cumulative-time responses, forced non-decreasing.
    pub fn predict(&self, len: usize) -> Vec<Option<f64>> {
        let mut running = f64::NEG_INFINITY;
        (1..=len)
            .map(|k| {
                let value = self.response(k);
                if !value.is_finite() {
                    return None;
                }
                running = running.max(value);
                Some(running)
            })
            .collect()
    }

    pub fn parameters(&self) -> BTreeMap<String, f64> {
        BTreeMap::from([("a".to_string(), self.a), ("b".to_string(), self.b)])
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_constant_series_gives_linear_response() {
        let model = GreyModel::fit(&[4.0, 4.0, 4.0, 4.0, 4.0]).unwrap();
        // x0 = b - a z1 with x0 constant forces a = 0, b = 4
        assert!(model.a.abs() < 1e-12);
        assert!((model.b - 4.0).abs() < 1e-12);
        let predicted = model.predict(7);
        assert!((predicted[6].unwrap() - 28.0).abs() < 1e-9);
    }

    #[test]
    fn test_geometric_growth_is_captured() {
        let train: Vec<f64> = (0..8).map(|k| 2.0 * 1.1f64.powi(k)).collect();
        let model = GreyModel::fit(&train).unwrap();
        assert!(model.a < 0.0);

        let predicted = model.predict(10);
        let actual = cumulative(&(0..10).map(|k| 2.0 * 1.1f64.powi(k)).collect::<Vec<_>>());
        let err = (predicted[9].unwrap() - actual[9]).abs() / actual[9];
        assert!(err < 0.05);
        assert!((predicted[0].unwrap() - 2.0).abs() < 1e-9);
    }

    #[test]
    fn test_needs_three_points() {
        assert!(matches!(
            GreyModel::fit(&[1.0, 2.0]),
            Err(FitError::InsufficientData { needed: 3, have: 2 })
        ));
    }
}
