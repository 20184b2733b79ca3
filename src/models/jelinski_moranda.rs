//! Jelinski-Moranda: the i-th failure interval is exponential with rate
//! phi * (N - i + 1), N being the initial fault content.

use std::collections::BTreeMap;

use super::numeric::{bisect, fit_line, scan_bracket};
use super::FitError;

#[derive(Debug, Clone, PartialEq)]
pub struct JelinskiMoranda {
    /// Initial number of faults.
    pub n_faults: f64,
    /// Per-fault hazard.
    pub phi: f64,
    pub method: Estimation,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Estimation {
    MaximumLikelihood,
    LeastSquares,
}

impl JelinskiMoranda {
    pub fn fit(train: &[f64]) -> Result<Self, FitError> {
        let n = train.len();
        if n < 2 {
            return Err(FitError::InsufficientData { needed: 2, have: n });
        }
        match Self::fit_mle(train) {
            Ok(model) => Ok(model),
            Err(mle_err) => {
                tracing::debug!(error = %mle_err, "JM maximum likelihood failed, trying least squares");
                Self::fit_least_squares(train).map_err(|ls_err| {
                    FitError::NonConvergence(format!("{}; least squares: {}", mle_err, ls_err))
                })
            }
        }
    }

    /// Solve sum_{k<n} 1/(N - k) = n / (N - C) for N > n - 1,
    /// with C = sum((i - 1) x_i) / sum(x_i).
    fn fit_mle(train: &[f64]) -> Result<Self, FitError> {
        let n = train.len();
        let nf = n as f64;
        let total: f64 = train.iter().sum();
        let weighted: f64 = train.iter().enumerate().map(|(i, x)| i as f64 * x).sum();
        let c = weighted / total;

        let equation = |n_faults: f64| {
            let sum_inv: f64 = (0..n).map(|k| 1.0 / (n_faults - k as f64)).sum();
            sum_inv - nf / (n_faults - c)
        };
        // Work on the excess over n - 1 so the grid starts just above the pole.
        let shifted = |d: f64| equation(nf - 1.0 + d);

        let (lo, hi) = scan_bracket(&shifted, 1e-6, 100.0 * nf, 400).ok_or_else(|| {
            FitError::NonConvergence("MLE for N diverges (no reliability growth)".into())
        })?;
        let d = bisect(&shifted, lo, hi, 1e-12)
            .ok_or_else(|| FitError::NonConvergence("root search for N failed".into()))?;
        let n_faults = nf - 1.0 + d;
        let phi = nf / (n_faults * total - weighted);

        Self::checked(n_faults, phi, Estimation::MaximumLikelihood)
    }

    /// Regress 1 / x_i = phi (N + 1) - phi i on the failure index.
    fn fit_least_squares(train: &[f64]) -> Result<Self, FitError> {
        let n = train.len();
        let idx: Vec<f64> = (1..=n).map(|i| i as f64).collect();
        let inv: Vec<f64> = train.iter().map(|x| 1.0 / x).collect();

        let (slope, intercept) = fit_line(&idx, &inv)
            .ok_or_else(|| FitError::Degenerate("failure index has no spread".into()))?;
        if slope >= 0.0 {
            return Err(FitError::NonConvergence(
                "failure rate is not decreasing with the failure index".into(),
            ));
        }
        let phi = -slope;
        let n_faults = (intercept / phi - 1.0).max(n as f64);

        Self::checked(n_faults, phi, Estimation::LeastSquares)
    }

    fn checked(n_faults: f64, phi: f64, method: Estimation) -> Result<Self, FitError> {
        if !n_faults.is_finite() || !phi.is_finite() || phi <= 0.0 {
            return Err(FitError::InvalidDomain(format!("N = {}, phi = {}", n_faults, phi)));
        }
        Ok(Self {
            n_faults,
            phi,
            method,
        })
    }

    /// Expected interval before the i-th failure (1-based); none once the
    /// remaining fault content is exhausted.
    pub fn expected_tbf(&self, i: usize) -> Option<f64> {
        let hazard = self.phi * (self.n_faults - i as f64 + 1.0);
        (hazard > 1e-12).then(|| 1.0 / hazard)
    }

    /// Fitted cumulative times over the training prefix, then forecasts
    /// anchored at the last observed training failure.
    pub fn predict(&self, train_times: &[f64], len: usize) -> Vec<Option<f64>> {
        let train_len = train_times.len();
        let mut out = Vec::with_capacity(len);

        let mut fitted = Some(0.0);
        for i in 1..=train_len.min(len) {
            fitted = fitted.zip(self.expected_tbf(i)).map(|(t, x)| t + x);
            out.push(fitted);
        }

        let mut forecast = train_times.last().copied();
        for i in train_len + 1..=len {
            forecast = forecast.zip(self.expected_tbf(i)).map(|(t, x)| t + x);
            out.push(forecast);
        }
        out
    }

    pub fn parameters(&self) -> BTreeMap<String, f64> {
        BTreeMap::from([
            ("N".to_string(), self.n_faults),
            ("phi".to_string(), self.phi),
        ])
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Deterministic JM-shaped data: x_i = 1 / (phi (N - i + 1)).
    fn jm_series(n_faults: f64, phi: f64, n: usize) -> Vec<f64> {
        (1..=n).map(|i| 1.0 / (phi * (n_faults - i as f64 + 1.0))).collect()
    }

    #[test]
    fn test_mle_on_jm_shaped_data() {
        let data = jm_series(30.0, 0.01, 20);
        let model = JelinskiMoranda::fit(&data).unwrap();
        assert_eq!(model.method, Estimation::MaximumLikelihood);
        assert!(model.n_faults > 19.0);
        assert!(model.phi > 0.0);
    }

    #[test]
    fn test_least_squares_fallback() {
        let model = JelinskiMoranda::fit_least_squares(&jm_series(30.0, 0.01, 20)).unwrap();
        assert!((model.n_faults - 30.0).abs() < 1e-6);
        assert!((model.phi - 0.01).abs() < 1e-9);
    }

    #[test]
    fn test_decay_fails_both_estimators() {
        let decaying: Vec<f64> = jm_series(30.0, 0.01, 20).into_iter().rev().collect();
        assert!(JelinskiMoranda::fit(&decaying).is_err());
    }

    #[test]
    fn test_predict_anchors_forecast_on_last_training_time() {
        let model = JelinskiMoranda {
            n_faults: 10.0,
            phi: 0.1,
            method: Estimation::MaximumLikelihood,
        };
        let predicted = model.predict(&[1.0, 2.0], 4);
        assert_eq!(predicted.len(), 4);
        // Fitted: 1/(0.1*10) = 1, then 1 + 1/(0.1*9)
        assert!((predicted[0].unwrap() - 1.0).abs() < 1e-12);
        // Forecast starts from the observed 2.0
        let x3 = 1.0 / (0.1 * 8.0);
        assert!((predicted[2].unwrap() - (2.0 + x3)).abs() < 1e-12);
    }

    #[test]
    fn test_exhausted_faults_predict_none() {
        let model = JelinskiMoranda {
            n_faults: 2.0,
            phi: 0.5,
            method: Estimation::LeastSquares,
        };
        let predicted = model.predict(&[1.0], 4);
        assert!(predicted[1].is_some());
        assert!(predicted[2].is_none());
        assert!(predicted[3].is_none());
    }
}
