//! Flat tabular export of a report: one row per failure record.

use anyhow::Context;
use serde::Serialize;

use super::AnalysisReport;
use crate::error::AnalysisResult;

/// Fixed leading columns; one column per fitted model follows.
pub const FIXED_COLUMNS: [&str; 3] = ["index", "split", "actual_cumulative_time"];

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ExportRow {
    /// 1-based failure number.
    pub index: usize,
    pub split: &'static str,
    pub actual_cumulative_time: f64,
    /// Prediction per fitted model, in report order.
    pub predictions: Vec<Option<f64>>,
}

pub fn header(report: &AnalysisReport) -> Vec<String> {
    FIXED_COLUMNS
        .iter()
        .map(|c| c.to_string())
        .chain(report.fits.iter().map(|f| f.name.clone()))
        .collect()
}

pub fn rows(report: &AnalysisReport) -> Vec<ExportRow> {
    report
        .actual_cumulative_times()
        .into_iter()
        .enumerate()
        .map(|(i, actual)| ExportRow {
            index: i + 1,
            split: if report.split.is_train(i) { "train" } else { "test" },
            actual_cumulative_time: actual,
            predictions: report
                .fits
                .iter()
                .map(|f| f.predicted.get(i).copied().flatten())
                .collect(),
        })
        .collect()
}

/// Render the export table as CSV. Missing predictions are empty cells.
pub fn to_csv(report: &AnalysisReport) -> AnalysisResult<String> {
    let mut writer = csv::Writer::from_writer(Vec::new());
    writer
        .write_record(header(report))
        .context("failed to write CSV header")?;
    for row in rows(report) {
        let mut record = vec![
            row.index.to_string(),
            row.split.to_string(),
            row.actual_cumulative_time.to_string(),
        ];
        record.extend(
            row.predictions
                .iter()
                .map(|p| p.map(|v| v.to_string()).unwrap_or_default()),
        );
        writer
            .write_record(&record)
            .context("failed to write CSV row")?;
    }
    let bytes = writer
        .into_inner()
        .map_err(|e| anyhow::anyhow!("failed to flush CSV: {}", e))?;
    Ok(String::from_utf8(bytes).context("CSV output is not UTF-8")?)
}
