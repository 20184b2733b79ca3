use std::sync::Arc;
use std::time::Duration;

use tracing::{info, warn};

use crate::config::{Config, FittingConfig};
use crate::models::FitEngine;
use crate::narrative::{ChatNarrativeClient, NarrativeError, NarrativeService};
use crate::report::ReportAggregator;

#[derive(Clone)]
pub struct AppState {
    pub engine: FitEngine,
    pub aggregator: ReportAggregator,
    /// Fallbacks for fields a request leaves out.
    pub fitting: Arc<FittingConfig>,
}

impl AppState {
    pub fn new(engine: FitEngine, aggregator: ReportAggregator, fitting: FittingConfig) -> Self {
        Self {
            engine,
            aggregator,
            fitting: Arc::new(fitting),
        }
    }

    /// Wire the engine and the narrative client from configuration. A missing
    /// API key disables narratives instead of failing startup.
    pub fn from_config(config: &Config) -> Self {
        let engine = FitEngine::new(Some(config.fitting.workers));
        info!(workers = engine.workers(), "Fit engine ready");

        let narrative: Option<Arc<dyn NarrativeService>> =
            match ChatNarrativeClient::from_config(&config.narrative) {
                Ok(client) => {
                    info!(base_url = %config.narrative.base_url, model = %config.narrative.model, "Narrative service enabled");
                    Some(Arc::new(client))
                }
                Err(NarrativeError::Disabled) => None,
                Err(e) => {
                    warn!(error = %e, "Narrative service unavailable, reports will omit narratives");
                    None
                }
            };
        let deadline = Duration::from_secs(config.narrative.timeout_secs);

        Self::new(
            engine,
            ReportAggregator::new(narrative, deadline),
            config.fitting.clone(),
        )
    }
}
