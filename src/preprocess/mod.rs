//! Preprocessing engine: cleans a raw TBF column into a usable series.
//!
//! Stages run in a fixed order: missing-value handling, outlier removal,
//! summary statistics, then optional normalisation. Statistics always
//! describe the cleaned series in original units so they stay readable
//! after normalisation.

pub mod missing;
pub mod outliers;

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::{AnalysisError, AnalysisResult};
use crate::series::FailureRecord;
use crate::stats::{Distribution, Sample};

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MissingStrategy {
    Drop,
    #[default]
    Mean,
    Median,
    Interpolate,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OutlierMethod {
    None,
    #[default]
    Zscore,
    Iqr,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NormalizationMethod {
    /// Zero mean, unit sample standard deviation.
    #[default]
    Zscore,
    /// Rescale into [0, 1].
    Minmax,
}

/// Options for a single preprocessing run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PreprocessConfig {
    pub missing_strategy: MissingStrategy,
    pub outlier_method: OutlierMethod,
    pub normalize: bool,
    pub normalization_method: NormalizationMethod,
    /// Bin count for the reported value distributions.
    pub histogram_bins: usize,
}

impl Default for PreprocessConfig {
    fn default() -> Self {
        Self {
            missing_strategy: MissingStrategy::default(),
            outlier_method: OutlierMethod::default(),
            normalize: false,
            normalization_method: NormalizationMethod::default(),
            histogram_bins: 20,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SummaryStats {
    pub original_count: usize,
    pub processed_count: usize,
    pub mean: f64,
    pub std_dev: f64,
}

/// Affine map applied by normalisation: `normalized = (x - offset) / scale`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Normalization {
    pub method: NormalizationMethod,
    pub offset: f64,
    pub scale: f64,
}

impl Normalization {
    pub fn invert(&self, value: f64) -> f64 {
        value * self.scale + self.offset
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PreprocessResult {
    /// Cleaned series in original units.
    pub cleaned: Vec<f64>,
    /// Cleaned series, normalised when requested.
    pub processed: Vec<f64>,
    pub stats: SummaryStats,
    pub normalization: Option<Normalization>,
    pub original_distribution: Distribution,
    pub processed_distribution: Distribution,
}

impl PreprocessResult {
    /// The cleaned series, ready for trend analysis and fitting. Never the
    /// normalised view.
    pub fn failure_record(&self) -> AnalysisResult<FailureRecord> {
        FailureRecord::new(self.cleaned.clone())
    }
}

/// Clean a raw TBF column. Fails when fewer than two points survive.
pub fn preprocess(raw: &[Option<f64>], config: &PreprocessConfig) -> AnalysisResult<PreprocessResult> {
    let original_valid: Vec<f64> = raw.iter().copied().filter(|v| missing::is_valid(*v)).flatten().collect();

    let filled = missing::fill(raw, config.missing_strategy);
    let cleaned = outliers::remove(filled, config.outlier_method);

    if cleaned.len() < 2 {
        return Err(AnalysisError::validation(format!(
            "insufficient records: {} valid point(s) remain after cleaning, need at least 2",
            cleaned.len()
        )));
    }

    let sample = Sample::new(&cleaned);
    let stats = SummaryStats {
        original_count: raw.len(),
        processed_count: cleaned.len(),
        mean: sample.mean(),
        std_dev: sample.std_dev(),
    };

    let normalization = if config.normalize {
        normalization_for(&cleaned, config.normalization_method)
    } else {
        None
    };
    let processed = match &normalization {
        Some(n) => cleaned.iter().map(|v| (v - n.offset) / n.scale).collect(),
        None => cleaned.clone(),
    };

    debug!(
        original = stats.original_count,
        processed = stats.processed_count,
        normalized = normalization.is_some(),
        "preprocessed series"
    );

    Ok(PreprocessResult {
        original_distribution: Sample::new(&original_valid).histogram(config.histogram_bins),
        processed_distribution: Sample::new(&processed).histogram(config.histogram_bins),
        cleaned,
        processed,
        stats,
        normalization,
    })
}

/// Constant series have no spread to rescale and are left as is.
fn normalization_for(values: &[f64], method: NormalizationMethod) -> Option<Normalization> {
    let sample = Sample::new(values);
    let (offset, scale) = match method {
        NormalizationMethod::Zscore => (sample.mean(), sample.std_dev()),
        NormalizationMethod::Minmax => (sample.min(), sample.max() - sample.min()),
    };
    (scale > 0.0).then_some(Normalization {
        method,
        offset,
        scale,
    })
}
