//! Numerical helpers for densities sampled on a (possibly uneven) strike grid.

use serde::{Deserialize, Serialize};

/// Trapezoid-rule integral of `y` over `x`.
pub fn trapezoid(y: &[f64], x: &[f64]) -> f64 {
    x.windows(2)
        .zip(y.windows(2))
        .map(|(xw, yw)| 0.5 * (yw[0] + yw[1]) * (xw[1] - xw[0]))
        .sum()
}

/// Scale a density to unit mass. A zero or non-finite integral falls back
/// to the uniform density over the grid.
pub fn normalize_density(density: &[f64], x: &[f64]) -> Vec<f64> {
    let clipped: Vec<f64> = density.iter().map(|d| d.max(0.0)).collect();
    let total = trapezoid(&clipped, x);
    if total > 0.0 && total.is_finite() {
        return clipped.iter().map(|d| d / total).collect();
    }
    let width = match (x.first(), x.last()) {
        (Some(lo), Some(hi)) if hi > lo => hi - lo,
        _ => return vec![0.0; density.len()],
    };
    vec![1.0 / width; density.len()]
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Moments {
    pub mean: f64,
    pub std: f64,
    pub skewness: f64,
    /// Excess kurtosis
    pub kurtosis: f64,
}

/// Mean, standard deviation, skewness and excess kurtosis of a normalised density.
pub fn density_moments(density: &[f64], x: &[f64]) -> Moments {
    let weighted = |f: &dyn Fn(f64) -> f64| -> f64 {
        let y: Vec<f64> = x.iter().zip(density).map(|(&xi, &di)| f(xi) * di).collect();
        trapezoid(&y, x)
    };

    let mean = weighted(&|xi| xi);
    let variance = weighted(&|xi| (xi - mean).powi(2));
    let std = variance.max(0.0).sqrt();

    let (skewness, kurtosis) = if std > 0.0 {
        (
            weighted(&|xi| (xi - mean).powi(3)) / std.powi(3),
            weighted(&|xi| (xi - mean).powi(4)) / std.powi(4) - 3.0,
        )
    } else {
        (0.0, 0.0)
    };

    Moments {
        mean,
        std,
        skewness,
        kurtosis,
    }
}

/// Cumulative trapezoid integral, starting at 0 on the first grid point.
pub fn cumulative_trapezoid(y: &[f64], x: &[f64]) -> Vec<f64> {
    let mut cdf = Vec::with_capacity(y.len());
    let mut acc = 0.0;
    for i in 0..y.len() {
        if i > 0 {
            acc += 0.5 * (y[i] + y[i - 1]) * (x[i] - x[i - 1]);
        }
        cdf.push(acc);
    }
    cdf
}

/// Quantiles by linear interpolation of the (renormalised) CDF.
pub fn density_quantiles(density: &[f64], x: &[f64], probs: &[f64]) -> Vec<f64> {
    let mut cdf = cumulative_trapezoid(density, x);
    let total = cdf.last().copied().unwrap_or(0.0);
    if total > 0.0 {
        for c in &mut cdf {
            *c /= total;
        }
    }
    probs.iter().map(|&p| interpolate(p, &cdf, x)).collect()
}

/// Piecewise-linear interpolation of `ys` at `v` over a non-decreasing `xs`,
/// clamped to the end values.
pub fn interpolate(v: f64, xs: &[f64], ys: &[f64]) -> f64 {
    let n = xs.len().min(ys.len());
    if n == 0 {
        return f64::NAN;
    }
    if v <= xs[0] {
        return ys[0];
    }
    if v >= xs[n - 1] {
        return ys[n - 1];
    }
    let idx = xs[..n].partition_point(|&xi| xi <= v);
    let (x0, x1) = (xs[idx - 1], xs[idx]);
    let (y0, y1) = (ys[idx - 1], ys[idx]);
    if x1 == x0 {
        return y0;
    }
    y0 + (y1 - y0) * (v - x0) / (x1 - x0)
}
