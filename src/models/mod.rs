//! Model fitting engine.
//!
//! The supported reliability growth models form a closed set: [`ModelKind`]
//! names a family, [`FittedModel`] carries its estimated parameters. Every
//! family fits on the training prefix, predicts a cumulative failure time
//! for each index of the full series, and is scored on the test suffix.

pub mod bayesian;
pub mod engine;
pub mod evaluation;
pub mod goel_okumoto;
pub mod grey;
pub mod jelinski_moranda;
pub mod linear;
pub mod metrics;
pub mod neural;
pub mod numeric;
pub mod yamada;

use std::collections::BTreeMap;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::error::{AnalysisError, AnalysisResult};
use crate::series::{cumulative, FailureRecord, TrainTestSplit};

pub use bayesian::{BayesianRate, GammaPrior};
pub use engine::{FitEngine, FitOutcome};
pub use evaluation::{CrossValidation, PredictionInterval, WalkForward};
pub use goel_okumoto::GoelOkumoto;
pub use grey::GreyModel;
pub use jelinski_moranda::JelinskiMoranda;
pub use linear::LinearTrend;
pub use neural::{BpConfig, BpNetwork};
pub use yamada::YamadaSShaped;

/// Per-model failure. Isolated: it removes one model from the results and
/// never aborts the batch.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum FitError {
    #[error("insufficient training data: need {needed} points, have {have}")]
    InsufficientData { needed: usize, have: usize },

    #[error("invalid parameter domain: {0}")]
    InvalidDomain(String),

    #[error("did not converge: {0}")]
    NonConvergence(String),

    #[error("degenerate fit: {0}")]
    Degenerate(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ModelKind {
    #[serde(rename = "GO")]
    GoelOkumoto,
    #[serde(rename = "JM")]
    JelinskiMoranda,
    #[serde(rename = "YS", alias = "SS")]
    YamadaSShaped,
    #[serde(rename = "GM")]
    GreyModel,
    #[serde(rename = "Statistical")]
    Statistical,
    #[serde(rename = "Bayesian")]
    Bayesian,
    #[serde(rename = "BP")]
    BackPropagation,
}

impl ModelKind {
    pub const ALL: [ModelKind; 7] = [
        ModelKind::GoelOkumoto,
        ModelKind::JelinskiMoranda,
        ModelKind::YamadaSShaped,
        ModelKind::GreyModel,
        ModelKind::Statistical,
        ModelKind::Bayesian,
        ModelKind::BackPropagation,
    ];

    /// Identifier used on the wire and on the command line.
    pub fn id(&self) -> &'static str {
        match self {
            Self::GoelOkumoto => "GO",
            Self::JelinskiMoranda => "JM",
            Self::YamadaSShaped => "YS",
            Self::GreyModel => "GM",
            Self::Statistical => "Statistical",
            Self::Bayesian => "Bayesian",
            Self::BackPropagation => "BP",
        }
    }

    fn answers_to(&self, name: &str) -> bool {
        let aliases: &[&str] = match self {
            Self::YamadaSShaped => &["SS"],
            Self::GreyModel => &["GM11"],
            _ => &[],
        };
        self.id().eq_ignore_ascii_case(name) || aliases.iter().any(|a| a.eq_ignore_ascii_case(name))
    }

    pub fn display_name(&self) -> &'static str {
        match self {
            Self::GoelOkumoto => "GO Model (NHPP)",
            Self::JelinskiMoranda => "JM Model",
            Self::YamadaSShaped => "Yamada S-Shaped (NHPP)",
            Self::GreyModel => "GM(1,1) Grey Model",
            Self::Statistical => "Statistical (Linear)",
            Self::Bayesian => "Bayesian (Gamma-Exponential)",
            Self::BackPropagation => "BP Neural Network",
        }
    }

    /// Estimate this family's parameters from the training TBF prefix.
    pub fn fit(&self, train: &[f64], options: &FitOptions) -> Result<FittedModel, FitError> {
        Ok(match self {
            Self::GoelOkumoto => FittedModel::GoelOkumoto(GoelOkumoto::fit(train)?),
            Self::JelinskiMoranda => FittedModel::JelinskiMoranda(JelinskiMoranda::fit(train)?),
            Self::YamadaSShaped => FittedModel::YamadaSShaped(YamadaSShaped::fit(train)?),
            Self::GreyModel => FittedModel::Grey(GreyModel::fit(train)?),
            Self::Statistical => FittedModel::Linear(LinearTrend::fit(&cumulative(train))?),
            Self::Bayesian => FittedModel::Bayesian(BayesianRate::fit(train, &options.bayesian_prior)?),
            Self::BackPropagation => FittedModel::Neural(BpNetwork::fit(train, &options.bp)?),
        })
    }
}

impl std::fmt::Display for ModelKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.id())
    }
}

impl FromStr for ModelKind {
    type Err = AnalysisError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        ModelKind::ALL
            .into_iter()
            .find(|k| k.answers_to(s))
            .ok_or_else(|| {
                let known: Vec<&str> = ModelKind::ALL.iter().map(|k| k.id()).collect();
                AnalysisError::validation(format!(
                    "unknown algorithm '{}' (expected one of: {})",
                    s,
                    known.join(", ")
                ))
            })
    }
}

/// Tunables for individual families, plus the optional accuracy extras.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FitOptions {
    pub bayesian_prior: GammaPrior,
    pub bp: BpConfig,
    /// Walk-forward validation for every model; skipped when absent.
    pub walk_forward: Option<WalkForward>,
    /// Prediction interval level, e.g. 0.05 for 95% bands.
    pub interval_alpha: Option<f64>,
}

impl FitOptions {
    /// Request-level checks against a series of `len` records. Family
    /// tunables are checked by each fit instead, so a bad prior only
    /// removes its own model.
    pub fn validate(&self, len: usize) -> AnalysisResult<()> {
        if let Some(walk_forward) = &self.walk_forward {
            walk_forward.validate(len)?;
        }
        if let Some(alpha) = self.interval_alpha {
            evaluation::validate_alpha(alpha)?;
        }
        Ok(())
    }
}

/// A model family together with its estimated parameters.
#[derive(Debug, Clone, PartialEq)]
pub enum FittedModel {
    GoelOkumoto(GoelOkumoto),
    JelinskiMoranda(JelinskiMoranda),
    YamadaSShaped(YamadaSShaped),
    Grey(GreyModel),
    Linear(LinearTrend),
    Bayesian(BayesianRate),
    Neural(BpNetwork),
}

impl FittedModel {
    /// Predicted cumulative failure time for each of `len` indices, given the
    /// observed cumulative times of the training prefix.
    pub fn predict(&self, train_times: &[f64], len: usize) -> Vec<Option<f64>> {
        let predicted = match self {
            Self::GoelOkumoto(m) => m.predict(len),
            Self::JelinskiMoranda(m) => m.predict(train_times, len),
            Self::YamadaSShaped(m) => m.predict(len),
            Self::Grey(m) => m.predict(len),
            Self::Linear(m) => m.predict(train_times, len),
            Self::Bayesian(m) => m.predict(train_times, len),
            Self::Neural(m) => m.predict(train_times, len),
        };
        predicted
            .into_iter()
            .map(|p| p.filter(|v| v.is_finite()))
            .collect()
    }

    pub fn parameters(&self) -> BTreeMap<String, f64> {
        match self {
            Self::GoelOkumoto(m) => m.parameters(),
            Self::JelinskiMoranda(m) => m.parameters(),
            Self::YamadaSShaped(m) => m.parameters(),
            Self::Grey(m) => m.parameters(),
            Self::Linear(m) => m.parameters(),
            Self::Bayesian(m) => m.parameters(),
            Self::Neural(m) => m.parameters(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModelFitResult {
    pub model: ModelKind,
    pub name: String,
    pub parameters: BTreeMap<String, f64>,
    /// Predicted cumulative time per index of the full series.
    pub predicted: Vec<Option<f64>>,
    pub rmse: f64,
    pub mae: f64,
    pub scored_points: usize,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cross_validation: Option<CrossValidation>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub interval: Option<PredictionInterval>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModelFailure {
    pub model: ModelKind,
    pub name: String,
    pub reason: String,
}

/// Fit, predict and score one model family.
pub fn fit_model(
    kind: ModelKind,
    series: &FailureRecord,
    split: TrainTestSplit,
    options: &FitOptions,
) -> Result<ModelFitResult, FitError> {
    let train = &series.values()[split.train_range()];
    let fitted = kind.fit(train, options)?;

    let train_times = cumulative(train);
    let actual = series.cumulative_times();
    let predicted = fitted.predict(&train_times, series.len());
    let accuracy = metrics::score(&predicted, &actual, split)?;

    let interval = options
        .interval_alpha
        .and_then(|alpha| evaluation::normal_interval(&predicted, &actual, split, alpha));
    let cross_validation = options
        .walk_forward
        .map(|wf| evaluation::walk_forward(kind, series, &wf, options));

    Ok(ModelFitResult {
        model: kind,
        name: kind.display_name().to_string(),
        parameters: fitted.parameters(),
        predicted,
        rmse: accuracy.rmse,
        mae: accuracy.mae,
        scored_points: accuracy.scored_points,
        cross_validation,
        interval,
    })
}

/// Parse requested identifiers, keeping request order and dropping repeats.
pub fn resolve_algorithms<S: AsRef<str>>(ids: &[S]) -> AnalysisResult<Vec<ModelKind>> {
    if ids.is_empty() {
        return Err(AnalysisError::validation("no algorithms selected"));
    }
    let mut kinds = Vec::with_capacity(ids.len());
    for id in ids {
        let kind: ModelKind = id.as_ref().parse()?;
        if !kinds.contains(&kind) {
            kinds.push(kind);
        }
    }
    Ok(kinds)
}
