//! Bounded concurrent fitting.
//!
//! Each requested model is an independent CPU-bound job on the blocking
//! pool. A semaphore caps how many run at once across all requests sharing
//! the engine; results land in a slot per request position so output order
//! never depends on completion order.

use std::sync::Arc;

use anyhow::anyhow;
use serde::{Deserialize, Serialize};
use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tracing::{debug, info, warn};

use super::{fit_model, FitError, FitOptions, ModelFailure, ModelFitResult, ModelKind};
use crate::error::{AnalysisError, AnalysisResult};
use crate::series::{FailureRecord, TrainTestSplit};

/// Everything one fitting request produced.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FitOutcome {
    pub split: TrainTestSplit,
    /// Successful fits, in request order.
    pub results: Vec<ModelFitResult>,
    /// Models omitted from `results`, in request order.
    pub failures: Vec<ModelFailure>,
}

#[derive(Clone)]
pub struct FitEngine {
    permits: Arc<Semaphore>,
    workers: usize,
}

impl FitEngine {
    /// `workers = None` or `Some(0)` sizes the pool to the machine.
    pub fn new(workers: Option<usize>) -> Self {
        let workers = workers.filter(|w| *w > 0).unwrap_or_else(|| {
            std::thread::available_parallelism()
                .map(|n| n.get())
                .unwrap_or(1)
        });
        Self {
            permits: Arc::new(Semaphore::new(workers)),
            workers,
        }
    }

    pub fn workers(&self) -> usize {
        self.workers
    }

    pub async fn fit(
        &self,
        series: &FailureRecord,
        train_ratio: f64,
        algorithms: &[ModelKind],
        options: &FitOptions,
    ) -> AnalysisResult<FitOutcome> {
        if algorithms.is_empty() {
            return Err(AnalysisError::validation("no algorithms selected"));
        }
        let split = series.split(train_ratio)?;
        options.validate(series.len())?;
        let mut kinds: Vec<ModelKind> = Vec::with_capacity(algorithms.len());
        for kind in algorithms {
            if !kinds.contains(kind) {
                kinds.push(*kind);
            }
        }

        info!(
            points = series.len(),
            train = split.train_len,
            test = split.test_len,
            models = kinds.len(),
            walk_forward = options.walk_forward.is_some(),
            "Fitting reliability models"
        );

        let series = Arc::new(series.clone());
        let jobs = kinds.iter().copied().map(|kind| {
            let series = series.clone();
            let options = options.clone();
            (kind, move || fit_model(kind, &series, split, &options))
        });
        let slots = self.run_jobs(jobs.collect()).await?;

        let mut results = Vec::new();
        let mut failures = Vec::new();
        for (kind, slot) in kinds.into_iter().zip(slots) {
            match slot {
                Some(Ok(result)) => {
                    debug!(model = %kind, rmse = result.rmse, mae = result.mae, "Model fitted");
                    results.push(result);
                }
                Some(Err(e)) => {
                    warn!(model = %kind, error = %e, "Model fit failed, omitting from results");
                    failures.push(ModelFailure {
                        model: kind,
                        name: kind.display_name().to_string(),
                        reason: e.to_string(),
                    });
                }
                None => return Err(anyhow!("{} produced no result", kind).into()),
            }
        }

        Ok(FitOutcome {
            split,
            results,
            failures,
        })
    }

    /// Run each job on the blocking pool under a permit, returning outcomes
    /// by job position. A panicking job fails the whole batch.
    async fn run_jobs<F>(
        &self,
        jobs: Vec<(ModelKind, F)>,
    ) -> AnalysisResult<Vec<Option<Result<ModelFitResult, FitError>>>>
    where
        F: FnOnce() -> Result<ModelFitResult, FitError> + Send + 'static,
    {
        let mut slots: Vec<Option<Result<ModelFitResult, FitError>>> = vec![None; jobs.len()];
        let mut tasks = JoinSet::new();
        for (slot, (kind, job)) in jobs.into_iter().enumerate() {
            let permits = self.permits.clone();
            tasks.spawn(async move {
                let _permit = permits
                    .acquire_owned()
                    .await
                    .map_err(|e| anyhow!("fit pool closed: {}", e))?;
                let outcome = tokio::task::spawn_blocking(job)
                    .await
                    .map_err(|e| anyhow!("{} fit task failed: {}", kind, e))?;
                Ok::<_, anyhow::Error>((slot, outcome))
            });
        }

        while let Some(joined) = tasks.join_next().await {
            let (slot, outcome) = joined.map_err(|e| anyhow!("fit task join error: {}", e))??;
            slots[slot] = Some(outcome);
        }
        Ok(slots)
    }
}

impl Default for FitEngine {
    fn default() -> Self {
        Self::new(None)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{GammaPrior, WalkForward};

    fn growth_record() -> FailureRecord {
        FailureRecord::new((1..=24).map(|i| 3.0 + 2.0 * i as f64).collect()).unwrap()
    }

    #[tokio::test]
    async fn test_failing_model_is_isolated() {
        let engine = FitEngine::new(Some(2));
        let options = FitOptions {
            bayesian_prior: GammaPrior {
                shape: 1.0,
                rate: -1.0,
            },
            ..Default::default()
        };
        let kinds = [ModelKind::GoelOkumoto, ModelKind::Bayesian, ModelKind::Statistical];
        let outcome = engine
            .fit(&growth_record(), 0.75, &kinds, &options)
            .await
            .unwrap();

        let fitted: Vec<ModelKind> = outcome.results.iter().map(|r| r.model).collect();
        assert_eq!(fitted, vec![ModelKind::GoelOkumoto, ModelKind::Statistical]);
        assert_eq!(outcome.failures.len(), 1);
        assert_eq!(outcome.failures[0].model, ModelKind::Bayesian);
        assert!(outcome.failures[0].reason.contains("invalid parameter domain"));
    }

    #[tokio::test]
    async fn test_results_follow_request_order() {
        let engine = FitEngine::new(Some(1));
        let kinds = [
            ModelKind::Bayesian,
            ModelKind::GreyModel,
            ModelKind::Statistical,
            ModelKind::JelinskiMoranda,
            ModelKind::Bayesian,
        ];
        let outcome = engine
            .fit(&growth_record(), 0.75, &kinds, &FitOptions::default())
            .await
            .unwrap();
        let fitted: Vec<ModelKind> = outcome.results.iter().map(|r| r.model).collect();
        assert_eq!(
            fitted,
            vec![
                ModelKind::Bayesian,
                ModelKind::GreyModel,
                ModelKind::Statistical,
                ModelKind::JelinskiMoranda
            ]
        );
        assert_eq!(outcome.split.train_len, 18);
    }

    #[tokio::test]
    async fn test_end_to_end_constant_rate() {
        let record = FailureRecord::new(vec![5.0, 10.0, 15.0, 20.0, 25.0, 30.0]).unwrap();
        let outcome = FitEngine::default()
            .fit(&record, 0.5, &[ModelKind::Bayesian], &FitOptions::default())
            .await
            .unwrap();
        assert_eq!(outcome.split.train_len, 3);
        assert_eq!(outcome.results.len(), 1);
        assert!(outcome.results[0].rmse >= 0.0);
    }

    #[tokio::test]
    async fn test_request_validation() {
        let engine = FitEngine::default();
        let record = growth_record();
        let err = engine
            .fit(&record, 1.0, &[ModelKind::Bayesian], &FitOptions::default())
            .await
            .unwrap_err();
        assert!(err.is_validation());
        let err = engine
            .fit(&record, 0.5, &[], &FitOptions::default())
            .await
            .unwrap_err();
        assert!(err.is_validation());
    }

    #[tokio::test]
    async fn test_walk_forward_option() {
        let options = FitOptions {
            walk_forward: Some(WalkForward {
                min_train: Some(20),
                horizon: 2,
            }),
            ..Default::default()
        };
        let kinds = [ModelKind::Bayesian, ModelKind::BackPropagation];
        let outcome = FitEngine::new(Some(2))
            .fit(&growth_record(), 0.75, &kinds, &options)
            .await
            .unwrap();
        assert_eq!(outcome.results.len(), 2);
        for result in &outcome.results {
            let cv = result.cross_validation.as_ref().unwrap();
            // prefixes 20, 21 and 22, two points each
            assert_eq!(cv.attempted, 3);
            assert_eq!(cv.used, 3);
            assert_eq!(cv.points, 6);
            assert!(cv.rmse.unwrap().is_finite());
        }

        let bad = FitOptions {
            walk_forward: Some(WalkForward {
                min_train: None,
                horizon: 0,
            }),
            ..Default::default()
        };
        let err = FitEngine::default()
            .fit(&growth_record(), 0.75, &kinds, &bad)
            .await
            .unwrap_err();
        assert!(err.is_validation());
    }

    #[tokio::test]
    async fn test_panicking_fit_fails_only_its_request() {
        let engine = FitEngine::new(Some(1));
        let jobs: Vec<(ModelKind, Box<dyn FnOnce() -> Result<ModelFitResult, FitError> + Send>)> = vec![
            (ModelKind::Bayesian, Box::new(|| Err(FitError::Degenerate("skipped".into())))),
            (ModelKind::GreyModel, Box::new(|| panic!("numeric blow-up"))),
        ];
        let err = engine.run_jobs(jobs).await.unwrap_err();
        assert!(!err.is_validation());
        assert!(err.to_string().contains("GM fit task failed"));

        // The permit is released and later requests are served.
        let outcome = engine
            .fit(&growth_record(), 0.75, &[ModelKind::Bayesian], &FitOptions::default())
            .await
            .unwrap();
        assert_eq!(outcome.results.len(), 1);
    }

    #[test]
    fn test_worker_count() {
        assert_eq!(FitEngine::new(Some(3)).workers(), 3);
        assert!(FitEngine::new(Some(0)).workers() >= 1);
    }
}
