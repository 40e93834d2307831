//! Data models for option chains, densities and price series
//!
//! This module contains the quote and chain types fed to the density
//! estimator, the estimator itself, and the surface assembled from its
//! per-expiry slices.

pub mod density;
mod option;
pub mod series;
pub mod surface;

pub use density::{estimate_density, DensityEstimator, DensityPoint, DensitySlice, DensityStats};
pub use option::*;
pub use series::PriceSeries;
pub use surface::{estimate_surface, DensitySurface, SliceFailure};
