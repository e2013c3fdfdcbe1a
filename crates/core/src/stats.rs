//! Numeric helpers shared by metrics, Monte Carlo and walk-forward code.
//!
//! Every function here returns a finite value for degenerate input (empty
//! slices, zero denominators) so nothing downstream sees NaN or infinity.

use ordered_float::OrderedFloat;
use statrs::statistics::Statistics;

/// `num / den`, or `fallback` when the denominator is zero or not finite.
#[inline]
pub fn safe_div(num: f64, den: f64, fallback: f64) -> f64 {
    if den == 0.0 || !den.is_finite() {
        fallback
    } else {
        let v = num / den;
        if v.is_finite() {
            v
        } else {
            fallback
        }
    }
}

/// Arithmetic mean; 0 for an empty slice.
pub fn mean(values: &[f64]) -> f64 {
    if values.is_empty() {
        return 0.0;
    }
    values.iter().mean()
}

/// Population standard deviation (divides by n); 0 for fewer than two values.
pub fn std_dev(values: &[f64]) -> f64 {
    if values.len() < 2 {
        return 0.0;
    }
    values.iter().population_std_dev()
}

/// Sample standard deviation (divides by n - 1); 0 for fewer than two values.
pub fn sample_std_dev(values: &[f64]) -> f64 {
    if values.len() < 2 {
        return 0.0;
    }
    values.iter().std_dev()
}

/// Copy of `values` sorted ascending.
pub fn sorted(values: &[f64]) -> Vec<f64> {
    let mut out = values.to_vec();
    out.sort_by_key(|v| OrderedFloat(*v));
    out
}

/// Percentile (0-100) of an ascending slice using linear interpolation
/// between closest ranks. Returns 0 for an empty slice.
pub fn percentile_sorted(sorted: &[f64], pct: f64) -> f64 {
    match sorted.len() {
        0 => 0.0,
        1 => sorted[0],
        n => {
            let rank = (pct.clamp(0.0, 100.0) / 100.0) * (n - 1) as f64;
            let lo = rank.floor() as usize;
            let hi = rank.ceil() as usize;
            let frac = rank - lo as f64;
            sorted[lo] + (sorted[hi] - sorted[lo]) * frac
        }
    }
}

/// Median of an ascending slice.
pub fn median_sorted(sorted: &[f64]) -> f64 {
    percentile_sorted(sorted, 50.0)
}

/// Coefficient of variation: population std / |mean|.
///
/// A (near) zero mean yields 0 when the values are all equal and 1 otherwise,
/// so callers comparing against thresholds treat it as maximally unstable.
pub fn coefficient_of_variation(values: &[f64]) -> f64 {
    if values.len() < 2 {
        return 0.0;
    }
    let m = mean(values);
    let sd = std_dev(values);
    if m.abs() < 1e-12 {
        if sd < 1e-12 {
            0.0
        } else {
            1.0
        }
    } else {
        sd / m.abs()
    }
}
