//! Constant-rate model with a conjugate prior.
//!
//! TBF ~ Exponential(lambda), lambda ~ Gamma(shape, rate). The posterior
//! is Gamma(shape + n, rate + sum(x)); its mean rate fixes the expected
//! interval 1 / lambda used for every prediction.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use super::FitError;

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct GammaPrior {
    pub shape: f64,
    pub rate: f64,
}

impl Default for GammaPrior {
    fn default() -> Self {
        Self {
            shape: 1.0,
            rate: 1.0,
        }
    }
}

impl GammaPrior {
    pub fn validate(&self) -> Result<(), FitError> {
        if !self.shape.is_finite() || self.shape <= 0.0 {
            return Err(FitError::InvalidDomain(format!(
                "prior shape must be positive, got {}",
                self.shape
            )));
        }
        if !self.rate.is_finite() || self.rate < 0.0 {
            return Err(FitError::InvalidDomain(format!(
                "prior rate must be non-negative, got {}",
                self.rate
            )));
        }
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct BayesianRate {
    /// Posterior mean failure rate.
    pub lambda: f64,
    pub posterior_shape: f64,
    pub posterior_rate: f64,
}

impl BayesianRate {
    pub fn fit(train: &[f64], prior: &GammaPrior) -> Result<Self, FitError> {
        prior.validate()?;
        if train.is_empty() {
            return Err(FitError::InsufficientData { needed: 1, have: 0 });
        }
        let posterior_shape = prior.shape + train.len() as f64;
        let posterior_rate = prior.rate + train.iter().sum::<f64>();
        let lambda = posterior_shape / posterior_rate;
        if !lambda.is_finite() || lambda <= 0.0 {
            return Err(FitError::InvalidDomain(format!("lambda = {}", lambda)));
        }
        Ok(Self {
            lambda,
            posterior_shape,
            posterior_rate,
        })
    }

    pub fn expected_tbf(&self) -> f64 {
        1.0 / self.lambda
    }

    pub fn predict(&self, train_times: &[f64], len: usize) -> Vec<Option<f64>> {
        let mean = self.expected_tbf();
        let train_len = train_times.len().min(len);
        let last = train_times.last().copied().unwrap_or(0.0);
        let fitted = (1..=train_len).map(|i| Some(i as f64 * mean));
        let forecast = (1..=len - train_len).map(|j| Some(last + j as f64 * mean));
        fitted.chain(forecast).collect()
    }

    pub fn parameters(&self) -> BTreeMap<String, f64> {
        BTreeMap::from([
            ("lambda".to_string(), self.lambda),
            ("posterior_shape".to_string(), self.posterior_shape),
            ("posterior_rate".to_string(), self.posterior_rate),
        ])
    }
}
