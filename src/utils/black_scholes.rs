//! Black-Scholes pricing and implied-volatility inversion.
//!
//! Only used around the density estimator: back-filling `implied_vol` on
//! chains that arrive without one, and generating arbitrage-free call prices
//! for tests.

use crate::error::{Result, RndError};
use statrs::distribution::{Continuous, ContinuousCDF, Normal};
use std::f64::consts::PI;
use std::sync::OnceLock;

const SIGMA_MIN: f64 = 1e-4;
const SIGMA_MAX: f64 = 5.0;
const MAX_ITERATIONS: usize = 100;
const PRICE_TOLERANCE: f64 = 1e-8;

static STANDARD_NORMAL: OnceLock<Normal> = OnceLock::new();

fn standard_normal() -> &'static Normal {
    // mean 0, std 1 is always a valid parameterisation
    STANDARD_NORMAL.get_or_init(|| Normal::new(0.0, 1.0).expect("unit normal"))
}

fn d1(s: f64, k: f64, t: f64, r: f64, sigma: f64) -> f64 {
    ((s / k).ln() + (r + 0.5 * sigma * sigma) * t) / (sigma * t.sqrt())
}

/// Black-Scholes option price
pub fn price(s: f64, k: f64, t: f64, r: f64, sigma: f64, is_call: bool) -> f64 {
    let discount = (-r * t).exp();
    if t <= 0.0 || sigma <= 0.0 {
        // Degenerate: forward intrinsic value
        let fwd = s - k * discount;
        return if is_call { fwd.max(0.0) } else { (-fwd).max(0.0) };
    }
    let d1 = d1(s, k, t, r, sigma);
    let d2 = d1 - sigma * t.sqrt();
    if is_call {
        let n = standard_normal();
        s * n.cdf(d1) - k * discount * n.cdf(d2)
    } else {
        let n = standard_normal();
        k * discount * n.cdf(-d2) - s * n.cdf(-d1)
    }
}

pub fn vega(s: f64, k: f64, t: f64, r: f64, sigma: f64) -> f64 {
    if t <= 0.0 || sigma <= 0.0 {
        return 0.0;
    }
    s * standard_normal().pdf(d1(s, k, t, r, sigma)) * t.sqrt()
}

/// Invert Black-Scholes for sigma. Newton steps, falling back to bisection
/// whenever a step leaves the bracket or vega vanishes.
pub fn implied_volatility(
    price_target: f64,
    s: f64,
    k: f64,
    t: f64,
    r: f64,
    is_call: bool,
) -> Result<f64> {
    if !(price_target > 0.0 && s > 0.0 && k > 0.0 && t > 0.0) {
        return Err(RndError::invalid_input(format!(
            "implied vol needs positive price, spot, strike and time (price={}, s={}, k={}, t={})",
            price_target, s, k, t
        )));
    }

    let lower = price(s, k, t, r, SIGMA_MIN, is_call);
    let upper = price(s, k, t, r, SIGMA_MAX, is_call);
    if price_target < lower || price_target > upper {
        return Err(RndError::invalid_input(format!(
            "price {} outside attainable range [{:.6}, {:.6}] for strike {}",
            price_target, lower, upper, k
        )));
    }

    let mut lo = SIGMA_MIN;
    let mut hi = SIGMA_MAX;
    // Brenner-Subrahmanyam starting point
    let mut sigma = ((2.0 * PI / t).sqrt() * price_target / s).clamp(0.05, 2.0);

    for _ in 0..MAX_ITERATIONS {
        let diff = price(s, k, t, r, sigma, is_call) - price_target;
        if diff.abs() < PRICE_TOLERANCE {
            return Ok(sigma);
        }
        if diff > 0.0 {
            hi = sigma;
        } else {
            lo = sigma;
        }

        let v = vega(s, k, t, r, sigma);
        let newton = if v > 1e-12 { sigma - diff / v } else { f64::NAN };
        sigma = if newton.is_finite() && newton > lo && newton < hi {
            newton
        } else {
            0.5 * (lo + hi)
        };
    }

    if hi - lo < 1e-6 {
        return Ok(0.5 * (lo + hi));
    }
    Err(RndError::Other(format!(
        "implied volatility did not converge for strike {}",
        k
    )))
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;

    #[test]
    fn put_call_parity_holds() {
        let (s, k, t, r, sigma) = (100.0, 95.0, 0.5, 0.03, 0.25);
        let c = price(s, k, t, r, sigma, true);
        let p = price(s, k, t, r, sigma, false);
        assert_abs_diff_eq!(c - p, s - k * (-r * t).exp(), epsilon = 1e-10);
    }

    #[test]
    fn matches_reference_values() {
        // S = K = 100, T = 1, r = 0, sigma = 0.2
        assert_abs_diff_eq!(price(100.0, 100.0, 1.0, 0.0, 0.2, true), 7.965_567_455, epsilon = 1e-8);
        assert_abs_diff_eq!(vega(100.0, 100.0, 1.0, 0.0, 0.2), 39.695_254_747, epsilon = 1e-8);

        let h = 1e-5;
        let bump = (price(100.0, 110.0, 0.5, 0.02, 0.25 + h, true)
            - price(100.0, 110.0, 0.5, 0.02, 0.25 - h, true))
            / (2.0 * h);
        assert_abs_diff_eq!(vega(100.0, 110.0, 0.5, 0.02, 0.25), bump, epsilon = 1e-5);
    }

    #[test]
    fn implied_vol_recovers_sigma() {
        for &k in &[80.0, 100.0, 120.0] {
            let c = price(100.0, k, 0.25, 0.01, 0.3, true);
            let iv = implied_volatility(c, 100.0, k, 0.25, 0.01, true).unwrap();
            assert_abs_diff_eq!(iv, 0.3, epsilon = 1e-5);
        }
    }

    #[test]
    fn implied_vol_rejects_price_below_intrinsic() {
        // Deep ITM call quoted below its discounted intrinsic value
        assert!(implied_volatility(1.0, 100.0, 50.0, 0.25, 0.01, true).is_err());
        assert!(implied_volatility(0.0, 100.0, 100.0, 0.25, 0.01, true).is_err());
    }
}
