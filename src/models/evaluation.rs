//! Optional accuracy extras computed alongside a fit: expanding-window
//! walk-forward validation and normal-approximation prediction intervals.

use serde::{Deserialize, Serialize};
use statrs::distribution::{ContinuousCDF, Normal};

use super::{FitOptions, ModelKind};
use crate::error::{AnalysisError, AnalysisResult};
use crate::series::{cumulative, FailureRecord, TrainTestSplit};

/// Expanding-window validation: refit on every prefix from `min_train`
/// onwards and score the next `horizon` cumulative times.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct WalkForward {
    /// Smallest training prefix. Defaults to `max(3, ceil(0.6 n))`.
    pub min_train: Option<usize>,
    pub horizon: usize,
}

impl Default for WalkForward {
    fn default() -> Self {
        Self {
            min_train: None,
            horizon: 1,
        }
    }
}

impl WalkForward {
    pub fn validate(&self, len: usize) -> AnalysisResult<()> {
        if self.horizon == 0 {
            return Err(AnalysisError::validation("walk-forward horizon must be at least 1"));
        }
        if len <= self.horizon + 1 {
            return Err(AnalysisError::validation(format!(
                "{} records are too few for walk-forward validation with horizon {}",
                len, self.horizon
            )));
        }
        Ok(())
    }

    /// First training prefix length, clamped to `[2, len - horizon]`.
    pub fn first_train(&self, len: usize) -> usize {
        let default = 3usize.max((0.6 * len as f64).ceil() as usize);
        self.min_train
            .unwrap_or(default)
            .min(len.saturating_sub(self.horizon))
            .max(2)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CrossValidation {
    /// Absent when no fold produced a full horizon of predictions.
    pub rmse: Option<f64>,
    pub mae: Option<f64>,
    pub attempted: usize,
    pub used: usize,
    pub min_train: usize,
    pub horizon: usize,
    pub points: usize,
}

/// Refit `kind` on each expanding prefix. Folds whose fit fails, or that
/// leave a horizon index unpredicted, are skipped.
pub fn walk_forward(
    kind: ModelKind,
    series: &FailureRecord,
    config: &WalkForward,
    options: &FitOptions,
) -> CrossValidation {
    let n = series.len();
    let actual = series.cumulative_times();
    let min_train = config.first_train(n);

    let mut residuals = Vec::new();
    let mut attempted = 0;
    let mut used = 0;
    for train_stop in min_train..=n.saturating_sub(config.horizon) {
        attempted += 1;
        let train = &series.values()[..train_stop];
        let Ok(fitted) = kind.fit(train, options) else {
            continue;
        };
        let eval_stop = train_stop + config.horizon;
        let predicted = fitted.predict(&cumulative(train), eval_stop);
        let fold: Option<Vec<f64>> = (train_stop..eval_stop)
            .map(|i| predicted.get(i).copied().flatten().map(|p| p - actual[i]))
            .collect();
        if let Some(fold) = fold {
            residuals.extend(fold);
            used += 1;
        }
    }

    let (rmse, mae) = if residuals.is_empty() {
        (None, None)
    } else {
        let m = residuals.len() as f64;
        (
            Some((residuals.iter().map(|r| r * r).sum::<f64>() / m).sqrt()),
            Some(residuals.iter().map(|r| r.abs()).sum::<f64>() / m),
        )
    };
    CrossValidation {
        rmse,
        mae,
        attempted,
        used,
        min_train,
        horizon: config.horizon,
        points: residuals.len(),
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PredictionInterval {
    pub alpha: f64,
    /// Standard deviation of the training residuals.
    pub sigma: f64,
    pub z: f64,
    pub lower: Vec<Option<f64>>,
    pub upper: Vec<Option<f64>>,
}

pub fn validate_alpha(alpha: f64) -> AnalysisResult<()> {
    if alpha > 0.0 && alpha < 1.0 {
        Ok(())
    } else {
        Err(AnalysisError::validation(format!(
            "interval alpha must lie strictly between 0 and 1, got {}",
            alpha
        )))
    }
}

/// `predicted ± z(1 - alpha/2) · sigma`, sigma taken from the in-sample
/// residuals. `None` when the model predicted no training index.
pub fn normal_interval(
    predicted: &[Option<f64>],
    actual: &[f64],
    split: TrainTestSplit,
    alpha: f64,
) -> Option<PredictionInterval> {
    let residuals: Vec<f64> = split
        .train_range()
        .filter_map(|i| Some(actual[i] - predicted.get(i).copied().flatten()?))
        .collect();
    if residuals.is_empty() {
        return None;
    }

    let n = residuals.len() as f64;
    let mean = residuals.iter().sum::<f64>() / n;
    let ddof = if residuals.len() > 1 { 1.0 } else { 0.0 };
    let sigma = (residuals.iter().map(|r| (r - mean).powi(2)).sum::<f64>() / (n - ddof)).sqrt();
    let z = Normal::new(0.0, 1.0).ok()?.inverse_cdf(1.0 - alpha / 2.0);
    let half = z * sigma;

    Some(PredictionInterval {
        alpha,
        sigma,
        z,
        lower: predicted.iter().map(|p| p.map(|v| v - half)).collect(),
        upper: predicted.iter().map(|p| p.map(|v| v + half)).collect(),
    })
}
