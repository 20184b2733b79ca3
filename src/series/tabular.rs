//! CSV ingestion: extract the `tbf` column (header matched case-insensitively).

use std::io::Read;

use ::csv::ReaderBuilder;
use tracing::debug;

use crate::error::{AnalysisError, AnalysisResult};

/// Name of the required input column.
pub const TBF_COLUMN: &str = "tbf";

/// Read the TBF column from CSV text. Empty, `NA`, `NaN` and `null` cells
/// become missing values; every other column is ignored.
pub fn read_tbf<R: Read>(input: R) -> AnalysisResult<Vec<Option<f64>>> {
    let mut reader = ReaderBuilder::new()
        .trim(::csv::Trim::All)
        .flexible(true)
        .from_reader(input);

    let headers = reader
        .headers()
        .map_err(|e| AnalysisError::validation(format!("unreadable CSV header: {}", e)))?
        .clone();
    let column = headers
        .iter()
        .position(|h| h.eq_ignore_ascii_case(TBF_COLUMN))
        .ok_or_else(|| {
            AnalysisError::validation(format!(
                "missing required column '{}' (found: {})",
                TBF_COLUMN,
                headers.iter().collect::<Vec<_>>().join(", ")
            ))
        })?;

    let mut values = Vec::new();
    for (row, record) in reader.records().enumerate() {
        let record = record
            .map_err(|e| AnalysisError::validation(format!("malformed CSV row {}: {}", row + 2, e)))?;
        let cell = record.get(column).unwrap_or("");
        values.push(parse_cell(cell, row + 2)?);
    }

    debug!(rows = values.len(), column, "read TBF column");
    Ok(values)
}

pub fn read_tbf_str(text: &str) -> AnalysisResult<Vec<Option<f64>>> {
    read_tbf(text.as_bytes())
}

fn parse_cell(cell: &str, line: usize) -> AnalysisResult<Option<f64>> {
    if cell.is_empty()
        || cell.eq_ignore_ascii_case("na")
        || cell.eq_ignore_ascii_case("nan")
        || cell.eq_ignore_ascii_case("null")
    {
        return Ok(None);
    }
    cell.parse::<f64>().map(Some).map_err(|_| {
        AnalysisError::validation(format!(
            "line {}: '{}' is not a number in column '{}'",
            line, cell, TBF_COLUMN
        ))
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_reads_uppercase_header_and_ignores_other_columns() {
        let csv = "id,TBF,comment\n1,5.5,first\n2,7,second\n";
        let values = read_tbf_str(csv).unwrap();
        assert_eq!(values, vec![Some(5.5), Some(7.0)]);
    }

    #[test]
    fn test_mixed_case_header() {
        let values = read_tbf_str("Tbf\n1\n2\n").unwrap();
        assert_eq!(values.len(), 2);
    }

    #[test]
    fn test_missing_cells_become_none() {
        let csv = "tbf,x\n3,a\n,b\nNA,c\nnan,d\n4,e\n";
        let values = read_tbf_str(csv).unwrap();
        assert_eq!(values, vec![Some(3.0), None, None, None, Some(4.0)]);
    }

    #[test]
    fn test_missing_column_is_validation_error() {
        let err = read_tbf_str("time,value\n1,2\n").unwrap_err();
        assert!(err.is_validation());
        assert!(err.to_string().contains("tbf"));
    }

    #[test]
    fn test_garbage_cell_is_rejected() {
        let err = read_tbf_str("tbf\n1\nabc\n").unwrap_err();
        assert!(err.to_string().contains("line 3"));
    }
}
