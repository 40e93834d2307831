use crate::error::Result;
use crate::models::density::{estimate_density, DensitySlice};
use crate::models::option::OptionChain;
use crate::utils::time::years_to_expiry;
use chrono::NaiveDate;
use ndarray::Array2;
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

/// An expiry whose slice could not be estimated
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SliceFailure {
    pub expiry: NaiveDate,
    pub reason: String,
}

/// Density slices across expiries, indexed by (strike, expiry)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DensitySurface {
    pub symbol: String,
    /// Ascending by expiry
    pub slices: Vec<DensitySlice>,
    pub failures: Vec<SliceFailure>,
}

impl DensitySurface {
    pub fn new(symbol: impl Into<String>, mut slices: Vec<DensitySlice>) -> Self {
        slices.sort_by_key(|s| s.expiry);
        Self {
            symbol: symbol.into(),
            slices,
            failures: Vec::new(),
        }
    }

    pub fn expiries(&self) -> Vec<NaiveDate> {
        self.slices.iter().map(|s| s.expiry).collect()
    }

    pub fn slice(&self, expiry: NaiveDate) -> Option<&DensitySlice> {
        self.slices.iter().find(|s| s.expiry == expiry)
    }

    /// Union of strikes (ascending), expiries, and a dense expiry × strike
    /// grid with NaN where a slice has no point at that strike.
    pub fn to_grid(&self) -> (Vec<f64>, Vec<NaiveDate>, Array2<f64>) {
        let mut strikes: Vec<f64> = self
            .slices
            .iter()
            .flat_map(|s| s.points.iter().map(|p| p.strike))
            .collect();
        strikes.sort_by(|a, b| a.total_cmp(b));
        strikes.dedup();

        let expiries = self.expiries();
        let mut grid = Array2::from_elem((expiries.len(), strikes.len()), f64::NAN);
        for (i, slice) in self.slices.iter().enumerate() {
            for p in &slice.points {
                if let Ok(j) = strikes.binary_search_by(|k| k.total_cmp(&p.strike)) {
                    grid[[i, j]] = p.density;
                }
            }
        }
        (strikes, expiries, grid)
    }
}

/// Estimate every chain independently. A chain that fails (too few strikes,
/// duplicate strikes, expired) is recorded in `failures`; the rest still
/// produce slices.
pub fn estimate_surface(
    symbol: &str,
    chains: &[OptionChain],
    risk_free_rate: f64,
    as_of: NaiveDate,
) -> DensitySurface {
    let outcomes: Vec<(NaiveDate, Result<DensitySlice>)> = chains
        .par_iter()
        .map(|chain| {
            let t = years_to_expiry(chain.expiry, as_of);
            (chain.expiry, estimate_density(chain, risk_free_rate, t))
        })
        .collect();

    let mut slices = Vec::with_capacity(outcomes.len());
    let mut failures = Vec::new();
    for (expiry, outcome) in outcomes {
        match outcome {
            Ok(slice) => slices.push(slice),
            Err(e) => {
                warn!("{} {}: density estimation failed: {}", symbol, expiry, e);
                failures.push(SliceFailure {
                    expiry,
                    reason: e.to_string(),
                });
            }
        }
    }

    info!(
        "{}: estimated {} of {} expiries",
        symbol,
        slices.len(),
        chains.len()
    );

    let mut surface = DensitySurface::new(symbol, slices);
    surface.failures = failures;
    surface
}

#[cfg(test)]
mod tests {
    use super::*;

    fn date(m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(2025, m, d).unwrap()
    }

    fn chain(expiry: NaiveDate, strikes: &[f64], prices: &[f64]) -> OptionChain {
        OptionChain::from_prices("SPY", expiry, strikes, prices).unwrap()
    }

    #[test]
    fn failing_expiry_does_not_block_others() {
        let chains = vec![
            chain(date(6, 20), &[90.0, 95.0, 100.0, 105.0], &[12.0, 8.0, 5.0, 3.0]),
            chain(date(3, 21), &[95.0, 100.0], &[8.0, 5.0]),
            chain(date(4, 17), &[90.0, 100.0, 110.0], &[12.0, 5.0, 1.0]),
        ];
        let surface = estimate_surface("SPY", &chains, 0.02, date(1, 2));

        assert_eq!(surface.expiries(), vec![date(4, 17), date(6, 20)]);
        assert_eq!(surface.failures.len(), 1);
        assert_eq!(surface.failures[0].expiry, date(3, 21));
        assert!(surface.slice(date(6, 20)).is_some());
    }

    #[test]
    fn grid_marks_missing_strikes_as_nan() {
        let chains = vec![
            chain(date(6, 20), &[90.0, 95.0, 100.0, 105.0], &[12.0, 8.0, 5.0, 3.0]),
            chain(date(4, 17), &[90.0, 100.0, 110.0], &[12.0, 5.0, 1.0]),
        ];
        let surface = estimate_surface("SPY", &chains, 0.0, date(1, 2));
        let (strikes, expiries, grid) = surface.to_grid();

        assert_eq!(strikes, vec![95.0, 100.0]);
        assert_eq!(expiries, vec![date(4, 17), date(6, 20)]);
        assert_eq!(grid.dim(), (2, 2));
        assert!(grid[[0, 0]].is_nan());
        assert!(!grid[[0, 1]].is_nan());
        assert!(!grid[[1, 0]].is_nan());
    }
}
