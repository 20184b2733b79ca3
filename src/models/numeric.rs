//! Small numerical routines shared by the model families.

const MAX_ITERATIONS: usize = 200;

/// Bisection on `[lo, hi]`. Requires a sign change between the end points.
pub fn bisect<F>(f: F, mut lo: f64, mut hi: f64, tolerance: f64) -> Option<f64>
where
    F: Fn(f64) -> f64,
{
    let mut f_lo = f(lo);
    let f_hi = f(hi);
    if !f_lo.is_finite() || !f_hi.is_finite() || f_lo * f_hi > 0.0 {
        return None;
    }
    if f_lo == 0.0 {
        return Some(lo);
    }
    if f_hi == 0.0 {
        return Some(hi);
    }

    for _ in 0..MAX_ITERATIONS {
        let mid = 0.5 * (lo + hi);
        let f_mid = f(mid);
        if !f_mid.is_finite() {
            return None;
        }
        if f_mid == 0.0 || (hi - lo).abs() <= tolerance * mid.abs().max(1.0) {
            return Some(mid);
        }
        if f_lo * f_mid < 0.0 {
            hi = mid;
        } else {
            lo = mid;
            f_lo = f_mid;
        }
    }
    Some(0.5 * (lo + hi))
}

/// Walk a geometric grid from `start` towards `end` and return the first
/// interval over which `f` changes sign.
pub fn scan_bracket<F>(f: F, start: f64, end: f64, steps: usize) -> Option<(f64, f64)>
where
    F: Fn(f64) -> f64,
{
    if start <= 0.0 || end <= start || steps == 0 {
        return None;
    }
    let ratio = (end / start).powf(1.0 / steps as f64);
    let mut a = start;
    let mut f_a = f(a);
    for _ in 0..steps {
        let b = a * ratio;
        let f_b = f(b);
        if f_a.is_finite() && f_b.is_finite() && f_a * f_b <= 0.0 {
            return Some((a, b));
        }
        a = b;
        f_a = f_b;
    }
    None
}

/// Ordinary least-squares line `y = slope * x + intercept`.
pub fn fit_line(xs: &[f64], ys: &[f64]) -> Option<(f64, f64)> {
    let n = xs.len().min(ys.len());
    if n < 2 {
        return None;
    }
    let nf = n as f64;
    let mean_x = xs[..n].iter().sum::<f64>() / nf;
    let mean_y = ys[..n].iter().sum::<f64>() / nf;
    let (mut sxx, mut sxy) = (0.0, 0.0);
    for i in 0..n {
        let dx = xs[i] - mean_x;
        sxx += dx * dx;
        sxy += dx * (ys[i] - mean_y);
    }
    if sxx == 0.0 {
        return None;
    }
    let slope = sxy / sxx;
    Some((slope, mean_y - slope * mean_x))
}

/// Solve `f(t) = target` for an increasing `f` on `t >= 0`, widening the
/// upper bound until it brackets the target.
pub fn invert_increasing<F>(f: F, target: f64, initial_upper: f64) -> Option<f64>
where
    F: Fn(f64) -> f64,
{
    let mut hi = initial_upper.max(f64::MIN_POSITIVE);
    for _ in 0..64 {
        if f(hi) >= target {
            return bisect(|t| f(t) - target, 0.0, hi, 1e-12);
        }
        hi *= 2.0;
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_bisect_finds_sqrt_two() {
        let root = bisect(|x| x * x - 2.0, 0.0, 2.0, 1e-12).unwrap();
        assert!((root - 2f64.sqrt()).abs() < 1e-9);
    }

    #[test]
    fn test_bisect_requires_sign_change() {
        assert!(bisect(|x| x * x + 1.0, -1.0, 1.0, 1e-12).is_none());
    }

    #[test]
    fn test_scan_bracket() {
        let (a, b) = scan_bracket(|x| x - 37.0, 1.0, 1000.0, 50).unwrap();
        assert!(a <= 37.0 && b >= 37.0);
        assert!(scan_bracket(|x| x + 1.0, 1.0, 1000.0, 50).is_none());
    }

    #[test]
    fn test_fit_line_exact() {
        let xs = [0.0, 1.0, 2.0, 3.0];
        let ys = [1.0, 3.0, 5.0, 7.0];
        let (slope, intercept) = fit_line(&xs, &ys).unwrap();
        assert!((slope - 2.0).abs() < 1e-12);
        assert!((intercept - 1.0).abs() < 1e-12);
        assert!(fit_line(&[1.0, 1.0], &[2.0, 3.0]).is_none());
    }

    #[test]
    fn test_invert_increasing() {
        let t = invert_increasing(|t| t * t, 49.0, 1.0).unwrap();
        assert!((t - 7.0).abs() < 1e-6);
    }
}
