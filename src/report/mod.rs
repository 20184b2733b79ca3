//! Report aggregation: one immutable document per analysis run.

pub mod export;

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{info, warn};
use uuid::Uuid;

use crate::error::{AnalysisError, AnalysisResult};
use crate::models::{FitEngine, FitOptions, FitOutcome, ModelFailure, ModelFitResult, ModelKind};
use crate::narrative::{NarrativeError, NarrativeService, NarrativeStats};
use crate::preprocess::{preprocess, PreprocessConfig, PreprocessResult};
use crate::series::{FailureRecord, TrainTestSplit};
use crate::trend::{analyze_trend, diagnostics, TrendDiagnostics, TrendVerdict};

/// Failure intensities handed to the narrative.
const RECENT_INTENSITY_POINTS: usize = 5;

/// Everything computed before the narrative step.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Analysis {
    pub preprocess: PreprocessResult,
    pub series: FailureRecord,
    pub trend: TrendVerdict,
    pub diagnostics: TrendDiagnostics,
    pub fit: FitOutcome,
}

/// Model selection and tuning for one run.
#[derive(Debug, Clone, PartialEq)]
pub struct FitRequest {
    pub train_ratio: f64,
    pub algorithms: Vec<ModelKind>,
    pub options: FitOptions,
}

/// Preprocess, trend and fit in sequence. Fitting uses the cleaned series in
/// original units, whether or not the preprocessing output was normalised.
pub async fn run_analysis(
    engine: &FitEngine,
    raw: &[Option<f64>],
    config: &PreprocessConfig,
    request: &FitRequest,
) -> AnalysisResult<Analysis> {
    let preprocess = preprocess(raw, config)?;
    fit_preprocessed(engine, preprocess, request).await
}

/// Trend and fit a series that has already been preprocessed.
pub async fn fit_preprocessed(
    engine: &FitEngine,
    preprocess: PreprocessResult,
    request: &FitRequest,
) -> AnalysisResult<Analysis> {
    let series = preprocess.failure_record()?;
    let fit = engine
        .fit(&series, request.train_ratio, &request.algorithms, &request.options)
        .await?;
    Ok(assemble_analysis(preprocess, series, fit))
}

/// Rebuild an analysis from results computed earlier without refitting.
/// The fit outcome has to describe the preprocessed series.
pub fn analysis_from_results(
    preprocess: PreprocessResult,
    fit: FitOutcome,
) -> AnalysisResult<Analysis> {
    let series = preprocess.failure_record()?;
    if fit.split.len() != series.len() || fit.split.train_len == 0 || fit.split.test_len == 0 {
        return Err(AnalysisError::validation(format!(
            "prediction split (train {}, test {}) does not match the {} preprocessed records",
            fit.split.train_len,
            fit.split.test_len,
            series.len()
        )));
    }
    if let Some(result) = fit.results.iter().find(|r| r.predicted.len() != series.len()) {
        return Err(AnalysisError::validation(format!(
            "{} predictions cover {} records, expected {}",
            result.model,
            result.predicted.len(),
            series.len()
        )));
    }
    Ok(assemble_analysis(preprocess, series, fit))
}

fn assemble_analysis(preprocess: PreprocessResult, series: FailureRecord, fit: FitOutcome) -> Analysis {
    Analysis {
        trend: analyze_trend(&series),
        diagnostics: diagnostics(&series),
        preprocess,
        series,
        fit,
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BestModel {
    pub model: ModelKind,
    pub name: String,
    pub rmse: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum NarrativeStatus {
    NotRequested,
    Generated,
    /// Requested but unavailable; the report is complete otherwise.
    Degraded { reason: String },
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AnalysisReport {
    pub id: Uuid,
    pub generated_at: DateTime<Utc>,
    pub preprocess: PreprocessResult,
    pub trend: TrendVerdict,
    pub diagnostics: TrendDiagnostics,
    /// Series the models were fitted on.
    pub series: FailureRecord,
    #[serde(flatten)]
    pub split: TrainTestSplit,
    pub fits: Vec<ModelFitResult>,
    pub failures: Vec<ModelFailure>,
    pub best_model: Option<BestModel>,
    pub narrative: Option<String>,
    pub narrative_status: NarrativeStatus,
}

impl AnalysisReport {
    pub fn actual_cumulative_times(&self) -> Vec<f64> {
        self.series.cumulative_times()
    }
}

/// Lowest RMSE wins; the earlier result wins a tie.
pub fn best_model(fits: &[ModelFitResult]) -> Option<BestModel> {
    let mut best: Option<&ModelFitResult> = None;
    for fit in fits {
        if best.map_or(true, |b| fit.rmse < b.rmse) {
            best = Some(fit);
        }
    }
    best.map(|b| BestModel {
        model: b.model,
        name: b.name.clone(),
        rmse: b.rmse,
    })
}

pub fn narrative_stats(analysis: &Analysis) -> NarrativeStats {
    let best = best_model(&analysis.fit.results);
    let raw = &analysis.diagnostics.failure_intensity.raw;
    let recent = raw[raw.len().saturating_sub(RECENT_INTENSITY_POINTS)..].to_vec();
    NarrativeStats {
        total_failures: analysis.diagnostics.total_failures,
        total_time: analysis.diagnostics.total_time,
        laplace_score: analysis.trend.laplace_score,
        trend_assessment: analysis.trend.assessment.to_string(),
        best_model: best.as_ref().map(|b| b.name.clone()),
        best_rmse: best.as_ref().map(|b| b.rmse),
        recent_intensity: recent,
        original_count: analysis.preprocess.stats.original_count,
        processed_count: analysis.preprocess.stats.processed_count,
    }
}

/// Combine an analysis with the outcome of the narrative step. Pure apart
/// from the report id and timestamp.
pub fn build_report(
    analysis: Analysis,
    narrative: Option<String>,
    narrative_status: NarrativeStatus,
) -> AnalysisReport {
    let best_model = best_model(&analysis.fit.results);
    AnalysisReport {
        id: Uuid::new_v4(),
        generated_at: Utc::now(),
        preprocess: analysis.preprocess,
        trend: analysis.trend,
        diagnostics: analysis.diagnostics,
        series: analysis.series,
        split: analysis.fit.split,
        fits: analysis.fit.results,
        failures: analysis.fit.failures,
        best_model,
        narrative,
        narrative_status,
    }
}

#[derive(Clone)]
pub struct ReportAggregator {
    narrative: Option<Arc<dyn NarrativeService>>,
    deadline: Duration,
}

impl ReportAggregator {
    pub fn new(narrative: Option<Arc<dyn NarrativeService>>, deadline: Duration) -> Self {
        Self {
            narrative,
            deadline,
        }
    }

    pub fn has_narrative(&self) -> bool {
        self.narrative.is_some()
    }

    /// Build the report, asking for a narrative when requested. Narrative
    /// failure or a missed deadline never fails the report.
    pub async fn assemble(&self, analysis: Analysis, with_narrative: bool) -> AnalysisReport {
        if !with_narrative {
            return build_report(analysis, None, NarrativeStatus::NotRequested);
        }
        let Some(service) = &self.narrative else {
            warn!("Narrative requested but no narrative service is configured");
            return build_report(
                analysis,
                None,
                NarrativeStatus::Degraded {
                    reason: "narrative service not configured".into(),
                },
            );
        };

        let stats = narrative_stats(&analysis);
        let outcome = match tokio::time::timeout(self.deadline, service.generate(&stats)).await {
            Ok(result) => result,
            Err(_) => Err(NarrativeError::Timeout(self.deadline)),
        };

        match outcome {
            Ok(text) => {
                info!(chars = text.len(), "Report narrative attached");
                build_report(analysis, Some(text), NarrativeStatus::Generated)
            }
            Err(e) => {
                warn!(error = %e, "Narrative unavailable, returning report without it");
                build_report(
                    analysis,
                    None,
                    NarrativeStatus::Degraded {
                        reason: e.to_string(),
                    },
                )
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::preprocess::NormalizationMethod;
    use async_trait::async_trait;
    use std::collections::BTreeMap;

    struct Fixed(&'static str);

    #[async_trait]
    impl NarrativeService for Fixed {
        async fn generate(&self, stats: &NarrativeStats) -> Result<String, NarrativeError> {
            Ok(format!("{} ({} failures)", self.0, stats.total_failures))
        }
    }

    struct Failing;

    #[async_trait]
    impl NarrativeService for Failing {
        async fn generate(&self, _: &NarrativeStats) -> Result<String, NarrativeError> {
            Err(NarrativeError::Status {
                status: 503,
                body: "overloaded".into(),
            })
        }
    }

    struct Slow;

    #[async_trait]
    impl NarrativeService for Slow {
        async fn generate(&self, _: &NarrativeStats) -> Result<String, NarrativeError> {
            tokio::time::sleep(Duration::from_secs(30)).await;
            Ok("too late".into())
        }
    }

    fn fit(model: ModelKind, rmse: f64) -> ModelFitResult {
        ModelFitResult {
            model,
            name: model.display_name().to_string(),
            parameters: BTreeMap::new(),
            predicted: vec![],
            rmse,
            mae: rmse,
            scored_points: 1,
            cross_validation: None,
            interval: None,
        }
    }

    async fn sample_analysis() -> Analysis {
        let raw: Vec<Option<f64>> = [5.0, 10.0, 15.0, 20.0, 25.0, 30.0].map(Some).to_vec();
        let request = FitRequest {
            train_ratio: 0.5,
            algorithms: vec![ModelKind::Bayesian, ModelKind::Statistical],
            options: FitOptions::default(),
        };
        run_analysis(&FitEngine::new(Some(2)), &raw, &PreprocessConfig::default(), &request)
            .await
            .unwrap()
    }

    #[test]
    fn test_best_model_is_minimum_rmse_first_on_ties() {
        let fits = vec![
            fit(ModelKind::GoelOkumoto, 4.0),
            fit(ModelKind::Bayesian, 2.0),
            fit(ModelKind::Statistical, 2.0),
        ];
        let best = best_model(&fits).unwrap();
        assert_eq!(best.model, ModelKind::Bayesian);
        assert_eq!(best.rmse, 2.0);
        assert!(best_model(&[]).is_none());
    }

    #[tokio::test]
    async fn test_end_to_end_report() {
        let analysis = sample_analysis().await;
        assert!((analysis.trend.laplace_score + 1.2911).abs() < 1e-3);
        assert_eq!(analysis.fit.split.train_len, 3);

        let report = ReportAggregator::new(None, Duration::from_secs(1))
            .assemble(analysis, false)
            .await;
        assert_eq!(report.narrative_status, NarrativeStatus::NotRequested);
        assert!(report.narrative.is_none());
        assert_eq!(report.fits.len(), 2);
        let best = report.best_model.as_ref().unwrap();
        let min = report.fits.iter().map(|f| f.rmse).fold(f64::INFINITY, f64::min);
        assert_eq!(best.rmse, min);
    }

    #[tokio::test]
    async fn test_narrative_attached() {
        let aggregator = ReportAggregator::new(Some(Arc::new(Fixed("ok"))), Duration::from_secs(5));
        let report = aggregator.assemble(sample_analysis().await, true).await;
        assert_eq!(report.narrative.as_deref(), Some("ok (6 failures)"));
        assert_eq!(report.narrative_status, NarrativeStatus::Generated);
    }

    #[tokio::test]
    async fn test_failing_narrative_degrades() {
        let aggregator = ReportAggregator::new(Some(Arc::new(Failing)), Duration::from_secs(5));
        let report = aggregator.assemble(sample_analysis().await, true).await;
        assert!(report.narrative.is_none());
        match report.narrative_status {
            NarrativeStatus::Degraded { reason } => assert!(reason.contains("503")),
            other => panic!("unexpected status {:?}", other),
        }
        assert!(report.best_model.is_some());
    }

    #[tokio::test]
    async fn test_slow_narrative_hits_deadline() {
        let analysis = sample_analysis().await;
        let aggregator = ReportAggregator::new(Some(Arc::new(Slow)), Duration::from_millis(200));
        let report = aggregator.assemble(analysis, true).await;
        assert!(report.narrative.is_none());
        assert!(matches!(
            report.narrative_status,
            NarrativeStatus::Degraded { ref reason } if reason.contains("timed out")
        ));
    }

    #[tokio::test]
    async fn test_unconfigured_service_degrades() {
        let aggregator = ReportAggregator::new(None, Duration::from_secs(1));
        let report = aggregator.assemble(sample_analysis().await, true).await;
        assert!(matches!(report.narrative_status, NarrativeStatus::Degraded { .. }));
    }

    #[tokio::test]
    async fn test_normalization_does_not_change_fits() {
        let raw: Vec<Option<f64>> = [0.1, 0.3, 0.2, 0.5, 0.4, 0.7, 0.9, 0.8, 1.1, 1.3]
            .map(Some)
            .to_vec();
        let request = FitRequest {
            train_ratio: 0.7,
            algorithms: ModelKind::ALL.to_vec(),
            options: FitOptions::default(),
        };
        let engine = FitEngine::new(Some(2));
        let plain = run_analysis(&engine, &raw, &PreprocessConfig::default(), &request)
            .await
            .unwrap();
        for normalization_method in [NormalizationMethod::Zscore, NormalizationMethod::Minmax] {
            let config = PreprocessConfig {
                normalize: true,
                normalization_method,
                ..Default::default()
            };
            let normalized = run_analysis(&engine, &raw, &config, &request).await.unwrap();
            assert_eq!(normalized.series, plain.series);
            assert_eq!(normalized.trend, plain.trend);
            assert_eq!(normalized.fit, plain.fit);
        }
    }

    #[tokio::test]
    async fn test_analysis_from_results_keeps_fits() {
        let computed = sample_analysis().await;
        let rebuilt =
            analysis_from_results(computed.preprocess.clone(), computed.fit.clone()).unwrap();
        assert_eq!(rebuilt, computed);
    }

    #[tokio::test]
    async fn test_analysis_from_results_rejects_other_series() {
        let computed = sample_analysis().await;
        let other = preprocess(
            &[Some(4.0), Some(8.0), Some(9.0)],
            &PreprocessConfig::default(),
        )
        .unwrap();
        let err = analysis_from_results(other, computed.fit).unwrap_err();
        assert!(err.is_validation());
    }

    #[tokio::test]
    async fn test_report_serializes_flat_split() {
        let report = ReportAggregator::new(None, Duration::from_secs(1))
            .assemble(sample_analysis().await, false)
            .await;
        let value = serde_json::to_value(&report).unwrap();
        assert_eq!(value["train_len"], 3);
        assert_eq!(value["test_len"], 3);
        assert_eq!(value["narrative_status"]["state"], "not_requested");
        assert_eq!(value["series"].as_array().unwrap().len(), 6);
    }
}
