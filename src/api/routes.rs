//! API route definitions.

use axum::extract::rejection::JsonRejection;
use axum::extract::State;
use axum::http::header;
use axum::response::IntoResponse;
use axum::{
    routing::{get, post},
    Json, Router,
};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::state::AppState;
use super::{envelope, ApiError};
use crate::error::{AnalysisError, AnalysisResult};
use crate::models::{resolve_algorithms, FitOptions, FitOutcome, ModelKind};
use crate::preprocess::{preprocess, PreprocessConfig, PreprocessResult};
use crate::report::{analysis_from_results, export, fit_preprocessed, AnalysisReport, FitRequest};
use crate::series::tabular::{self, TBF_COLUMN};
use crate::series::FailureRecord;
use crate::trend::{analyze_trend, diagnostics, TrendDiagnostics, TrendVerdict};

pub fn api_routes() -> Router<AppState> {
    Router::new()
        .route("/health", get(health))
        .route("/preprocess", post(preprocess_handler))
        .route("/predict", post(predict))
        .route("/report", post(report))
        .route("/report/export", post(report_export))
}

// ---------------------------------------------------------------------------
// Request bodies
// ---------------------------------------------------------------------------

/// Raw TBF column, given inline or as CSV text.
#[derive(Debug, Default, Deserialize)]
pub struct SeriesInput {
    #[serde(default)]
    pub tbf: Option<Vec<Option<f64>>>,
    #[serde(default)]
    pub csv: Option<String>,
    #[serde(default)]
    pub config: PreprocessConfig,
}

impl SeriesInput {
    fn raw(&self) -> AnalysisResult<Vec<Option<f64>>> {
        match (&self.tbf, &self.csv) {
            (Some(values), _) => Ok(values.clone()),
            (None, Some(text)) => tabular::read_tbf_str(text),
            (None, None) => Err(AnalysisError::validation(
                "request must include either 'tbf' values or 'csv' text",
            )),
        }
    }
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct FitSettings {
    pub train_ratio: Option<f64>,
    pub algorithms: Option<Vec<String>>,
    pub options: Option<FitOptions>,
}

#[derive(Debug, Deserialize)]
pub struct PredictRequest {
    pub tbf: Vec<f64>,
    #[serde(flatten)]
    pub settings: FitSettings,
}

/// `preprocess` section of a report request: a `/preprocess` result used
/// as is, or raw input cleaned here.
#[derive(Debug, Deserialize)]
#[serde(untagged)]
pub enum ReportPreprocess {
    Computed(PreprocessResult),
    Raw(SeriesInput),
}

/// `predict` section of a report request: a `/predict` result used as is,
/// or settings for fitting here.
#[derive(Debug, Deserialize)]
#[serde(untagged)]
pub enum ReportPredict {
    Computed(FitOutcome),
    Settings(FitSettings),
}

impl Default for ReportPredict {
    fn default() -> Self {
        Self::Settings(FitSettings::default())
    }
}

#[derive(Debug, Deserialize)]
pub struct ReportRequest {
    pub preprocess: ReportPreprocess,
    #[serde(default)]
    pub predict: ReportPredict,
    #[serde(default)]
    pub narrative: bool,
}

#[derive(Debug, Serialize)]
struct PredictResponse {
    #[serde(flatten)]
    fit: FitOutcome,
    trend: TrendVerdict,
    diagnostics: TrendDiagnostics,
    actual_cumulative_times: Vec<f64>,
}

fn body<T: DeserializeOwned>(payload: Result<Json<Value>, JsonRejection>) -> Result<T, ApiError> {
    let Json(mut value) = payload.map_err(|e| {
        AnalysisError::validation(format!("malformed request body: {}", e.body_text()))
    })?;
    fold_tbf_keys(&mut value)?;
    serde_json::from_value(value)
        .map_err(|e| AnalysisError::validation(format!("malformed request body: {}", e)).into())
}

/// Rename every `tbf` key, in any case, to its canonical spelling. The
/// column name is case-insensitive in JSON bodies as in CSV headers.
fn fold_tbf_keys(value: &mut Value) -> AnalysisResult<()> {
    match value {
        Value::Object(map) => {
            let variants: Vec<String> = map
                .keys()
                .filter(|k| k.as_str() != TBF_COLUMN && k.eq_ignore_ascii_case(TBF_COLUMN))
                .cloned()
                .collect();
            for key in variants {
                if let Some(values) = map.remove(&key) {
                    if map.insert(TBF_COLUMN.to_string(), values).is_some() {
                        return Err(AnalysisError::validation(format!(
                            "'{}' given more than once",
                            TBF_COLUMN
                        )));
                    }
                }
            }
            map.values_mut().try_for_each(fold_tbf_keys)
        }
        Value::Array(items) => items.iter_mut().try_for_each(fold_tbf_keys),
        _ => Ok(()),
    }
}

fn fit_request(state: &AppState, settings: &FitSettings) -> AnalysisResult<FitRequest> {
    let algorithms: Vec<ModelKind> = match &settings.algorithms {
        Some(ids) => resolve_algorithms(ids)?,
        None => resolve_algorithms(&state.fitting.algorithms)?,
    };
    Ok(FitRequest {
        train_ratio: settings.train_ratio.unwrap_or(state.fitting.train_ratio),
        algorithms,
        options: settings
            .options
            .clone()
            .unwrap_or_else(|| state.fitting.fit_options()),
    })
}

// ---------------------------------------------------------------------------
// Handlers
// ---------------------------------------------------------------------------

async fn health(State(state): State<AppState>) -> Result<Json<Value>, ApiError> {
    envelope(&serde_json::json!({
        "status": "ok",
        "version": env!("CARGO_PKG_VERSION"),
        "workers": state.engine.workers(),
        "narrative": state.aggregator.has_narrative(),
    }))
}

async fn preprocess_handler(
    payload: Result<Json<Value>, JsonRejection>,
) -> Result<Json<Value>, ApiError> {
    let input: SeriesInput = body(payload)?;
    let result = preprocess(&input.raw()?, &input.config)?;
    envelope(&result)
}

async fn predict(
    State(state): State<AppState>,
    payload: Result<Json<Value>, JsonRejection>,
) -> Result<Json<Value>, ApiError> {
    let request: PredictRequest = body(payload)?;
    let series = FailureRecord::new(request.tbf)?;
    let fit_request = fit_request(&state, &request.settings)?;

    let fit = state
        .engine
        .fit(
            &series,
            fit_request.train_ratio,
            &fit_request.algorithms,
            &fit_request.options,
        )
        .await?;

    envelope(&PredictResponse {
        fit,
        trend: analyze_trend(&series),
        diagnostics: diagnostics(&series),
        actual_cumulative_times: series.cumulative_times(),
    })
}

/// Earlier results are assembled without refitting; raw parts are computed.
async fn build(state: &AppState, request: ReportRequest) -> AnalysisResult<AnalysisReport> {
    let cleaned = match request.preprocess {
        ReportPreprocess::Computed(result) => result,
        ReportPreprocess::Raw(input) => preprocess(&input.raw()?, &input.config)?,
    };
    let analysis = match request.predict {
        ReportPredict::Computed(fit) => analysis_from_results(cleaned, fit)?,
        ReportPredict::Settings(settings) => {
            let fit_request = fit_request(state, &settings)?;
            fit_preprocessed(&state.engine, cleaned, &fit_request).await?
        }
    };
    Ok(state.aggregator.assemble(analysis, request.narrative).await)
}

async fn report(
    State(state): State<AppState>,
    payload: Result<Json<Value>, JsonRejection>,
) -> Result<Json<Value>, ApiError> {
    let report = build(&state, body(payload)?).await?;
    envelope(&report)
}

async fn report_export(
    State(state): State<AppState>,
    payload: Result<Json<Value>, JsonRejection>,
) -> Result<impl IntoResponse, ApiError> {
    let mut request: ReportRequest = body(payload)?;
    // The table has no narrative column.
    request.narrative = false;
    let report = build(&state, request).await?;
    let csv = export::to_csv(&report)?;
    Ok((
        [
            (header::CONTENT_TYPE, "text/csv; charset=utf-8"),
            (
                header::CONTENT_DISPOSITION,
                "attachment; filename=\"reliability_report.csv\"",
            ),
        ],
        csv,
    ))
}
