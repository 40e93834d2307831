//! Risk-neutral density estimation (Breeden-Litzenberger)
//!
//! The density of the underlying at expiry under the pricing measure is the
//! discounted second derivative of the call price in strike:
//!
//! ```text
//! f(K) = e^(rT) * d²C/dK²
//! ```
//!
//! The second derivative is taken with the three-point stencil for uneven
//! grids, so only interior strikes of a chain produce a point.

use crate::error::{Result, RndError};
use crate::models::option::{OptionChain, OptionQuote};
use crate::utils::probability::{
    density_moments, density_quantiles, normalize_density, trapezoid, Moments,
};
use crate::utils::time::years_to_expiry;
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use tracing::{debug, trace};

/// Density estimate at one strike
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct DensityPoint {
    pub strike: f64,
    pub density: f64,
    pub expiry: NaiveDate,
}

/// Densities over the interior strikes of one chain, ascending in strike.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DensitySlice {
    pub symbol: String,
    pub expiry: NaiveDate,
    /// Time to expiry in years
    pub time_to_expiry: f64,
    pub risk_free_rate: f64,
    pub points: Vec<DensityPoint>,
    /// Points whose raw estimate was negative and floored to zero
    pub clamped_points: usize,
}

impl DensitySlice {
    pub fn len(&self) -> usize {
        self.points.len()
    }

    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }

    pub fn strikes(&self) -> Vec<f64> {
        self.points.iter().map(|p| p.strike).collect()
    }

    pub fn densities(&self) -> Vec<f64> {
        self.points.iter().map(|p| p.density).collect()
    }

    /// Trapezoid mass of the (unnormalised) slice
    pub fn total_mass(&self) -> f64 {
        trapezoid(&self.densities(), &self.strikes())
    }
}

/// Second derivative of C(K) at the middle of three quotes with uneven spacing.
pub fn second_difference(left: &OptionQuote, mid: &OptionQuote, right: &OptionQuote) -> f64 {
    let slope_right = (right.call_price - mid.call_price) / (right.strike - mid.strike);
    let slope_left = (mid.call_price - left.call_price) / (mid.strike - left.strike);
    2.0 * (slope_right - slope_left) / (right.strike - left.strike)
}

/// Estimate the density slice of `chain` for risk-free rate `r` and time to expiry `t` (years).
///
/// Negative estimates (non-convex quotes) are floored at zero and counted in
/// [`DensitySlice::clamped_points`]. The chain itself is not modified.
///
/// Fewer than three distinct strikes is `InsufficientData`, even when
/// duplicates are present. A duplicate strike in an otherwise usable chain
/// is `NonMonotonicStrike`.
pub fn estimate_density(chain: &OptionChain, r: f64, t: f64) -> Result<DensitySlice> {
    if !r.is_finite() {
        return Err(RndError::invalid_input(format!("risk-free rate must be finite, got {}", r)));
    }
    if !t.is_finite() || t <= 0.0 {
        return Err(RndError::invalid_input(format!(
            "time to expiry must be positive, got {} for {}",
            t, chain.expiry
        )));
    }
    let quotes = chain.sorted_quotes();
    let distinct = 1 + quotes.windows(2).filter(|w| w[0].strike != w[1].strike).count();
    if distinct < 3 {
        return Err(RndError::InsufficientData {
            expiry: chain.expiry,
            strikes: if quotes.is_empty() { 0 } else { distinct },
        });
    }

    if let Some(w) = quotes.windows(2).find(|w| w[0].strike == w[1].strike) {
        return Err(RndError::NonMonotonicStrike {
            expiry: chain.expiry,
            strike: w[0].strike,
        });
    }

    let growth = (r * t).exp();
    let mut clamped_points = 0usize;
    let points: Vec<DensityPoint> = quotes
        .windows(3)
        .map(|w| {
            let raw = growth * second_difference(&w[0], &w[1], &w[2]);
            let density = if raw < 0.0 {
                clamped_points += 1;
                trace!("Clamping density {:.6e} at strike {}", raw, w[1].strike);
                0.0
            } else {
                raw
            };
            DensityPoint {
                strike: w[1].strike,
                density,
                expiry: chain.expiry,
            }
        })
        .collect();

    debug!(
        "{} {}: {} density points, {} clamped",
        chain.underlying_symbol,
        chain.expiry,
        points.len(),
        clamped_points
    );

    Ok(DensitySlice {
        symbol: chain.underlying_symbol.clone(),
        expiry: chain.expiry,
        time_to_expiry: t,
        risk_free_rate: r,
        points,
        clamped_points,
    })
}

/// Estimator bound to a risk-free rate
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct DensityEstimator {
    pub risk_free_rate: f64,
}

impl DensityEstimator {
    pub fn new(risk_free_rate: f64) -> Self {
        Self { risk_free_rate }
    }

    pub fn estimate(&self, chain: &OptionChain, time_to_expiry: f64) -> Result<DensitySlice> {
        estimate_density(chain, self.risk_free_rate, time_to_expiry)
    }

    /// Estimate with T derived from the chain expiry and `as_of` (days / 365).
    pub fn estimate_as_of(&self, chain: &OptionChain, as_of: NaiveDate) -> Result<DensitySlice> {
        let t = years_to_expiry(chain.expiry, as_of);
        if t <= 0.0 {
            return Err(RndError::invalid_input(format!(
                "expiry {} must be after {}",
                chain.expiry, as_of
            )));
        }
        self.estimate(chain, t)
    }
}

/// Summary statistics of a slice after normalising it to unit mass
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DensityStats {
    pub expiry: NaiveDate,
    pub strikes: Vec<f64>,
    /// Normalised density (integrates to 1 over `strikes`)
    pub density: Vec<f64>,
    pub moments: Moments,
}

impl DensityStats {
    pub fn from_slice(slice: &DensitySlice) -> Result<Self> {
        if slice.len() < 2 {
            return Err(RndError::TooFewDensityPoints {
                expiry: slice.expiry,
                points: slice.len(),
            });
        }
        let strikes = slice.strikes();
        let density = normalize_density(&slice.densities(), &strikes);
        let moments = density_moments(&density, &strikes);
        Ok(Self {
            expiry: slice.expiry,
            strikes,
            density,
            moments,
        })
    }

    pub fn mean(&self) -> f64 {
        self.moments.mean
    }

    pub fn std(&self) -> f64 {
        self.moments.std
    }

    pub fn quantiles(&self, probs: &[f64]) -> Vec<f64> {
        density_quantiles(&self.density, &self.strikes, probs)
    }

    /// Mass at or below `strike`
    pub fn probability_below(&self, strike: f64) -> f64 {
        let n = self.strikes.partition_point(|&k| k <= strike);
        if n == 0 {
            return 0.0;
        }
        trapezoid(&self.density[..n], &self.strikes[..n])
    }

    pub fn probability_above(&self, strike: f64) -> f64 {
        1.0 - self.probability_below(strike)
    }
}
