//! Missing-value handling.

use super::MissingStrategy;
use crate::stats::Sample;

/// A raw entry is usable only when present, finite and positive.
pub fn is_valid(value: Option<f64>) -> bool {
    matches!(value, Some(v) if v.is_finite() && v > 0.0)
}

/// Resolve invalid entries according to `strategy`.
/// Returns an empty series when no valid entry exists.
pub fn fill(raw: &[Option<f64>], strategy: MissingStrategy) -> Vec<f64> {
    let valid: Vec<f64> = raw.iter().copied().filter(|v| is_valid(*v)).flatten().collect();
    if valid.is_empty() {
        return Vec::new();
    }

    match strategy {
        MissingStrategy::Drop => valid,
        MissingStrategy::Mean => substitute(raw, Sample::new(&valid).mean()),
        MissingStrategy::Median => substitute(raw, Sample::new(&valid).median()),
        MissingStrategy::Interpolate => interpolate(raw),
    }
}

fn substitute(raw: &[Option<f64>], replacement: f64) -> Vec<f64> {
    raw.iter()
        .map(|v| match v {
            Some(x) if is_valid(*v) => *x,
            _ => replacement,
        })
        .collect()
}

/// Linear interpolation between the nearest valid neighbours; leading and
/// trailing gaps take the nearest valid value.
fn interpolate(raw: &[Option<f64>]) -> Vec<f64> {
    let anchors: Vec<(usize, f64)> = raw
        .iter()
        .enumerate()
        .filter_map(|(i, v)| if is_valid(*v) { v.map(|x| (i, x)) } else { None })
        .collect();

    let mut out = Vec::with_capacity(raw.len());
    let mut next = 0usize;
    for i in 0..raw.len() {
        while next < anchors.len() && anchors[next].0 < i {
            next += 1;
        }
        let value = match (next.checked_sub(1).map(|p| anchors[p]), anchors.get(next)) {
            (_, Some(&(j, x))) if j == i => x,
            (Some((i0, x0)), Some(&(i1, x1))) => {
                let t = (i - i0) as f64 / (i1 - i0) as f64;
                x0 + (x1 - x0) * t
            }
            (Some((_, x0)), None) => x0,
            (None, Some(&(_, x1))) => x1,
            (None, None) => unreachable!("at least one anchor exists"),
        };
        out.push(value);
    }
    out
}
