//! Trend analyzer: the Laplace trend test over cumulative failure times.
//!
//! A positive score means failures arrive increasingly densely (reliability
//! decay), a negative score means they thin out (reliability growth).

pub mod diagnostics;

use serde::{Deserialize, Serialize};

use crate::series::FailureRecord;

pub use diagnostics::{diagnostics, TrendDiagnostics};

/// Two-sided 95% critical value of the standard normal.
pub const CRITICAL_VALUE: f64 = 1.96;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TrendStatus {
    Growth,
    Decay,
    Stable,
}

impl TrendStatus {
    pub fn from_score(score: f64) -> Self {
        if score < -CRITICAL_VALUE {
            Self::Growth
        } else if score > CRITICAL_VALUE {
            Self::Decay
        } else {
            Self::Stable
        }
    }
}

/// Finer reading of the score that keeps the sign inside the stable band.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TrendAssessment {
    SignificantGrowth,
    SlightGrowth,
    StableOrSlightDecay,
    SignificantDecay,
}

impl TrendAssessment {
    pub fn from_score(score: f64) -> Self {
        if score < -CRITICAL_VALUE {
            Self::SignificantGrowth
        } else if score > CRITICAL_VALUE {
            Self::SignificantDecay
        } else if score < 0.0 {
            Self::SlightGrowth
        } else {
            Self::StableOrSlightDecay
        }
    }

    pub fn describe(&self) -> &'static str {
        match self {
            Self::SignificantGrowth => "Significant reliability growth (improving)",
            Self::SlightGrowth => "Slight reliability growth",
            Self::StableOrSlightDecay => "Stable or slight decay",
            Self::SignificantDecay => "Significant reliability decay (worsening)",
        }
    }
}

impl std::fmt::Display for TrendAssessment {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.describe())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct TrendVerdict {
    pub laplace_score: f64,
    pub status: TrendStatus,
    pub assessment: TrendAssessment,
}

impl TrendVerdict {
    pub fn from_score(laplace_score: f64) -> Self {
        Self {
            laplace_score,
            status: TrendStatus::from_score(laplace_score),
            assessment: TrendAssessment::from_score(laplace_score),
        }
    }
}

/// Laplace factor
/// U = (sum(T_i, i < n) - (n - 1) * T_n / 2) / (T_n * sqrt((n - 1) / 12)).
/// Degenerate inputs (n <= 1, zero total time) score 0.
pub fn laplace_score(tbf: &[f64]) -> f64 {
    let n = tbf.len();
    if n <= 1 {
        return 0.0;
    }
    let times = crate::series::cumulative(tbf);
    let t_n = times[n - 1];
    let sum_prior: f64 = times[..n - 1].iter().sum();

    let m = (n - 1) as f64;
    let denominator = t_n * (m / 12.0).sqrt();
    if denominator == 0.0 || !denominator.is_finite() {
        return 0.0;
    }
    (sum_prior - m * t_n / 2.0) / denominator
}

pub fn analyze_trend(series: &FailureRecord) -> TrendVerdict {
    TrendVerdict::from_score(laplace_score(series.values()))
}
