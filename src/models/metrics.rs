//! Predictive accuracy on the held-out suffix.

use serde::{Deserialize, Serialize};

use super::FitError;
use crate::series::TrainTestSplit;

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Accuracy {
    pub rmse: f64,
    pub mae: f64,
    /// Test indices the model produced a value for.
    pub scored_points: usize,
}

/// RMSE and MAE over the test range only. Indices without a finite
/// prediction are skipped; a model with none left cannot be scored.
pub fn score(
    predicted: &[Option<f64>],
    actual: &[f64],
    split: TrainTestSplit,
) -> Result<Accuracy, FitError> {
    let residuals: Vec<f64> = split
        .test_range()
        .filter_map(|i| {
            let p = predicted.get(i).copied().flatten()?;
            p.is_finite().then(|| p - actual[i])
        })
        .collect();

    if residuals.is_empty() {
        return Err(FitError::Degenerate(
            "no finite predictions over the test range".into(),
        ));
    }

    let n = residuals.len() as f64;
    let mse = residuals.iter().map(|r| r * r).sum::<f64>() / n;
    let mae = residuals.iter().map(|r| r.abs()).sum::<f64>() / n;
    Ok(Accuracy {
        rmse: mse.sqrt(),
        mae,
        scored_points: residuals.len(),
    })
}
