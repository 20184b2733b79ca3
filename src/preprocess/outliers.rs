//! Outlier removal. Flagged points are dropped, never clipped.

use super::OutlierMethod;
use crate::stats::Sample;

/// |z| above this is an outlier.
pub const ZSCORE_THRESHOLD: f64 = 3.0;

/// Tukey fence multiplier.
pub const IQR_FENCE: f64 = 1.5;

pub fn remove(values: Vec<f64>, method: OutlierMethod) -> Vec<f64> {
    if values.is_empty() {
        return values;
    }
    match method {
        OutlierMethod::None => values,
        OutlierMethod::Zscore => {
            let sample = Sample::new(&values);
            if sample.std_dev() == 0.0 {
                return values;
            }
            let keep: Vec<bool> = values
                .iter()
                .map(|&v| sample.z_score(v).abs() <= ZSCORE_THRESHOLD)
                .collect();
            retain(values, &keep)
        }
        OutlierMethod::Iqr => {
            let sample = Sample::new(&values);
            let (q1, q3) = (sample.quantile(0.25), sample.quantile(0.75));
            let iqr = q3 - q1;
            let (lo, hi) = (q1 - IQR_FENCE * iqr, q3 + IQR_FENCE * iqr);
            values.into_iter().filter(|v| *v >= lo && *v <= hi).collect()
        }
    }
}

fn retain(values: Vec<f64>, keep: &[bool]) -> Vec<f64> {
    values
        .into_iter()
        .zip(keep)
        .filter_map(|(v, &k)| k.then_some(v))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn with_spike() -> Vec<f64> {
        let mut v = vec![10.0, 11.0, 9.0, 10.5, 9.5, 10.0, 11.0, 9.0, 10.0, 10.5, 9.5, 10.0];
        v.push(100.0);
        v
    }

    #[test]
    fn test_zscore_drops_spike() {
        let out = remove(with_spike(), OutlierMethod::Zscore);
        assert_eq!(out.len(), 12);
        assert!(!out.contains(&100.0));
    }

    #[test]
    fn test_iqr_drops_spike() {
        let out = remove(with_spike(), OutlierMethod::Iqr);
        assert_eq!(out.len(), 12);
        assert!(!out.contains(&100.0));
    }

    #[test]
    fn test_none_keeps_everything() {
        assert_eq!(remove(with_spike(), OutlierMethod::None).len(), 13);
    }

    #[test]
    fn test_constant_series_untouched() {
        assert_eq!(remove(vec![3.0; 5], OutlierMethod::Zscore).len(), 5);
        assert_eq!(remove(vec![3.0; 5], OutlierMethod::Iqr).len(), 5);
    }
}
