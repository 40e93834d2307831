//! # rnd-surface
//!
//! Risk-neutral density (RND) surfaces from end-of-day option chains, using
//! the Breeden-Litzenberger identity `f(K) = e^(rT) · ∂²C/∂K²`, plus a small
//! set of price-series qualifiers for charting the underlying.
//!
//! ## Features
//!
//! - Non-uniform finite-difference density estimator with negative-value clamping
//! - Chain cleaning, put-call parity OTM chains, static arbitrage checks
//! - Per-expiry parallel surface assembly and density statistics
//! - EOD Historical Data client with client-side rate limiting
//! - Parquet / CSV / Arrow IPC storage through Polars, PNG plots through plotters
//! - Qualifiers: moving average, drawdown days, inflation/gold adjustment, adjusted returns
//!
//! ## Example
//!
//! ```rust,no_run
//! use chrono::NaiveDate;
//! use rnd_surface::models::{estimate_density, OptionChain};
//!
//! fn main() -> rnd_surface::Result<()> {
//!     let expiry = NaiveDate::from_ymd_opt(2025, 1, 17).unwrap();
//!     let chain = OptionChain::from_prices(
//!         "SPY",
//!         expiry,
//!         &[90.0, 95.0, 100.0, 105.0, 110.0],
//!         &[12.0, 8.0, 5.0, 3.0, 1.5],
//!     )?;
//!
//!     let slice = estimate_density(&chain, 0.01, 0.25)?;
//!     for p in &slice.points {
//!         println!("{:>8.2} {:.5}", p.strike, p.density);
//!     }
//!     Ok(())
//! }
//! ```

pub mod api;
pub mod config;
pub mod error;
pub mod models;
pub mod pipeline;
pub mod processing;
pub mod qualifiers;
pub mod utils;

// Re-export commonly used types
pub use api::EodClient;
pub use config::Config;
pub use error::{Result, RndError};
pub use models::{estimate_density, estimate_surface, DensityEstimator, DensitySlice, DensitySurface};
pub use pipeline::{PipelineReport, RndPipeline};
