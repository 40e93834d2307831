//! Chain preparation ahead of density estimation
//!
//! Raw market quotes are filtered for liquidity, folded into per-expiry OTM
//! call chains, and checked for static arbitrage.

mod arbitrage;
mod cleaner;

pub use arbitrage::{ArbitrageChecker, ArbitrageReport};
pub use cleaner::{ChainCleaner, ChainQualityMetrics, OtmChain};
