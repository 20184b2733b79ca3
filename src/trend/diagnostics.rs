//! Supporting curves for the trend view: failure intensity, ROCOF and the
//! empirical reliability function.

use serde::{Deserialize, Serialize};

use crate::series::FailureRecord;

/// Moving-average window for the smoothed intensity curve.
pub const INTENSITY_WINDOW: usize = 5;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IntensityCurve {
    /// 1 / TBF per failure.
    pub raw: Vec<f64>,
    pub smoothed: Vec<f64>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReliabilityCurve {
    pub time_points: Vec<f64>,
    pub probability: Vec<f64>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrendDiagnostics {
    pub total_failures: usize,
    pub total_time: f64,
    pub failure_intensity: IntensityCurve,
    /// Cumulative failures over cumulative time, per failure.
    pub rocof: Vec<f64>,
    pub reliability: ReliabilityCurve,
}

pub fn diagnostics(series: &FailureRecord) -> TrendDiagnostics {
    let tbf = series.values();
    let times = series.cumulative_times();

    let raw: Vec<f64> = tbf.iter().map(|&x| 1.0 / x).collect();
    let smoothed = moving_average(&raw, INTENSITY_WINDOW);

    let rocof = times
        .iter()
        .enumerate()
        .map(|(i, &t)| (i + 1) as f64 / t)
        .collect();

    let mut sorted = tbf.to_vec();
    sorted.sort_by(|a, b| a.total_cmp(b));
    let n = sorted.len() as f64;
    let probability = (0..sorted.len()).map(|i| 1.0 - i as f64 / n).collect();

    TrendDiagnostics {
        total_failures: series.len(),
        total_time: series.total_time(),
        failure_intensity: IntensityCurve { raw, smoothed },
        rocof,
        reliability: ReliabilityCurve {
            time_points: sorted,
            probability,
        },
    }
}

/// Centred moving average with zero padding at the edges, same length as
/// the input. Series shorter than the window are returned unchanged.
pub fn moving_average(values: &[f64], window: usize) -> Vec<f64> {
    if window == 0 || values.len() < window {
        return values.to_vec();
    }
    let offset = (window - 1) / 2;
    let w = window as f64;
    (0..values.len())
        .map(|k| {
            let start = (k + offset + 1).saturating_sub(window);
            let end = (k + offset).min(values.len() - 1);
            values[start..=end].iter().sum::<f64>() / w
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_moving_average_zero_pads_edges() {
        let values = [5.0, 5.0, 5.0, 5.0, 5.0, 5.0];
        let smoothed = moving_average(&values, 5);
        assert_eq!(smoothed.len(), 6);
        assert_eq!(smoothed[0], 3.0);
        assert_eq!(smoothed[1], 4.0);
        assert_eq!(smoothed[2], 5.0);
        assert_eq!(smoothed[5], 3.0);
    }

    #[test]
    fn test_short_series_not_smoothed() {
        assert_eq!(moving_average(&[1.0, 2.0], 5), vec![1.0, 2.0]);
    }

    #[test]
    fn test_diagnostics_shapes() {
        let record = FailureRecord::new(vec![2.0, 4.0, 4.0, 10.0]).unwrap();
        let d = diagnostics(&record);
        assert_eq!(d.total_failures, 4);
        assert_eq!(d.total_time, 20.0);
        assert_eq!(d.failure_intensity.raw, vec![0.5, 0.25, 0.25, 0.1]);
        assert_eq!(d.rocof, vec![0.5, 2.0 / 6.0, 3.0 / 10.0, 4.0 / 20.0]);
        assert_eq!(d.reliability.time_points, vec![2.0, 4.0, 4.0, 10.0]);
        assert_eq!(d.reliability.probability, vec![1.0, 0.75, 0.5, 0.25]);
    }
}
