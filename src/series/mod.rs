//! Failure data: the TBF record, its cumulative-time view, and train/test splits.

pub mod tabular;

use serde::{Deserialize, Serialize};

use crate::error::{AnalysisError, AnalysisResult};

/// Ordered time-between-failures series. Every value is finite and positive.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(transparent)]
pub struct FailureRecord {
    tbf: Vec<f64>,
}

impl FailureRecord {
    /// Validate and wrap a TBF series.
    pub fn new(tbf: Vec<f64>) -> AnalysisResult<Self> {
        if let Some((idx, value)) = tbf
            .iter()
            .enumerate()
            .find(|(_, v)| !v.is_finite() || **v <= 0.0)
        {
            return Err(AnalysisError::validation(format!(
                "time between failures must be positive and finite (record {} is {})",
                idx + 1,
                value
            )));
        }
        Ok(Self { tbf })
    }

    pub fn len(&self) -> usize {
        self.tbf.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tbf.is_empty()
    }

    pub fn values(&self) -> &[f64] {
        &self.tbf
    }

    /// Running sum of the series: the time of each failure.
    pub fn cumulative_times(&self) -> Vec<f64> {
        cumulative(&self.tbf)
    }

    /// Total observed time, i.e. the time of the last failure.
    pub fn total_time(&self) -> f64 {
        self.tbf.iter().sum()
    }

    /// Partition into a `ceil(n * ratio)` prefix and the remaining suffix.
    pub fn split(&self, train_ratio: f64) -> AnalysisResult<TrainTestSplit> {
        TrainTestSplit::new(self.len(), train_ratio)
    }
}

impl<'de> Deserialize<'de> for FailureRecord {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        let tbf = Vec::<f64>::deserialize(deserializer)?;
        Self::new(tbf).map_err(serde::de::Error::custom)
    }
}

pub fn cumulative(values: &[f64]) -> Vec<f64> {
    values
        .iter()
        .scan(0.0, |acc, &v| {
            *acc += v;
            Some(*acc)
        })
        .collect()
}

/// `ceil`, except that products landing within rounding error of an
/// integer (0.07 * 100 = 7.000000000000001) count as that integer.
fn ceil_tolerant(x: f64) -> usize {
    let nearest = x.round();
    if nearest > 0.0 && (x - nearest).abs() <= 4.0 * f64::EPSILON * x.abs() {
        nearest as usize
    } else {
        x.ceil() as usize
    }
}

/// Index partition of a series into a training prefix and a test suffix.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TrainTestSplit {
    pub train_len: usize,
    pub test_len: usize,
}

impl TrainTestSplit {
    pub fn new(len: usize, train_ratio: f64) -> AnalysisResult<Self> {
        if !train_ratio.is_finite() || train_ratio <= 0.0 || train_ratio >= 1.0 {
            return Err(AnalysisError::validation(format!(
                "train ratio must lie strictly between 0 and 1, got {}",
                train_ratio
            )));
        }
        if len < 2 {
            return Err(AnalysisError::validation(format!(
                "at least 2 records are required, got {}",
                len
            )));
        }

        let train_len = ceil_tolerant((len as f64) * train_ratio);
        if train_len == 0 || train_len >= len {
            return Err(AnalysisError::validation(format!(
                "train ratio {} leaves an empty {} partition for {} records",
                train_ratio,
                if train_len == 0 { "training" } else { "test" },
                len
            )));
        }

        Ok(Self {
            train_len,
            test_len: len - train_len,
        })
    }

    pub fn len(&self) -> usize {
        self.train_len + self.test_len
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn is_train(&self, index: usize) -> bool {
        index < self.train_len
    }

    pub fn train_range(&self) -> std::ops::Range<usize> {
        0..self.train_len
    }

    pub fn test_range(&self) -> std::ops::Range<usize> {
        self.train_len..self.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rejects_non_positive_values() {
        assert!(FailureRecord::new(vec![1.0, 0.0, 2.0]).is_err());
        assert!(FailureRecord::new(vec![1.0, f64::NAN]).is_err());
        assert!(FailureRecord::new(vec![1.0, 2.0]).is_ok());
    }

    #[test]
    fn test_cumulative_times() {
        let record = FailureRecord::new(vec![5.0, 10.0, 15.0]).unwrap();
        assert_eq!(record.cumulative_times(), vec![5.0, 15.0, 30.0]);
        assert_eq!(record.total_time(), 30.0);
    }

    #[test]
    fn test_split_seventy_thirty() {
        let split = TrainTestSplit::new(10, 0.7).unwrap();
        assert_eq!(split.train_len, 7);
        assert_eq!(split.test_len, 3);

        let train: Vec<usize> = split.train_range().collect();
        let test: Vec<usize> = split.test_range().collect();
        assert!(train.iter().all(|i| !test.contains(i)));
        let mut all = train;
        all.extend(test);
        assert_eq!(all, (0..10).collect::<Vec<_>>());
    }

    #[test]
    fn test_split_rounds_up() {
        assert_eq!(TrainTestSplit::new(6, 0.5).unwrap().train_len, 3);
        assert_eq!(TrainTestSplit::new(7, 0.5).unwrap().train_len, 4);
    }

    #[test]
    fn test_split_tiny_ratio_keeps_one_training_point() {
        let split = TrainTestSplit::new(10, 1e-12).unwrap();
        assert_eq!(split.train_len, 1);
        assert_eq!(split.test_len, 9);
        assert_eq!(TrainTestSplit::new(3, 1e-9).unwrap().train_len, 1);
        assert_eq!(TrainTestSplit::new(10, 1e-300).unwrap().train_len, 1);
        assert_eq!(TrainTestSplit::new(100, 0.07).unwrap().train_len, 7);
        assert_eq!(TrainTestSplit::new(10, 0.71).unwrap().train_len, 8);
    }

    #[test]
    fn test_split_rejects_bad_ratios() {
        for ratio in [0.0, 1.0, -0.2, 1.5, f64::NAN] {
            let err = TrainTestSplit::new(10, ratio).unwrap_err();
            assert!(err.is_validation());
        }
    }

    #[test]
    fn test_split_rejects_empty_test_partition() {
        // ceil(3 * 0.9) = 3 leaves nothing to test on
        assert!(TrainTestSplit::new(3, 0.9).is_err());
    }

    #[test]
    fn test_record_deserialize_validates() {
        let ok: FailureRecord = serde_json::from_str("[1.0, 2.5]").unwrap();
        assert_eq!(ok.len(), 2);
        assert!(serde_json::from_str::<FailureRecord>("[1.0, -2.5]").is_err());
    }
}
