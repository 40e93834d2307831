//! End-of-day RND run: clean → OTM chains → arbitrage check → density → stats.

use crate::config::PipelineConfig;
use crate::models::{DensityEstimator, DensitySlice, DensityStats, DensitySurface, MarketQuote, SliceFailure};
use crate::processing::{ArbitrageChecker, ArbitrageReport, ChainCleaner, ChainQualityMetrics};
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

/// Everything computed for one expiry
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExpiryResult {
    pub slice: DensitySlice,
    /// `None` when the slice is too short to normalise (a single point)
    pub stats: Option<DensityStats>,
    pub quality: ChainQualityMetrics,
    pub arbitrage: ArbitrageReport,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PipelineReport {
    pub symbol: String,
    pub trade_date: NaiveDate,
    pub spot: Option<f64>,
    pub results: Vec<ExpiryResult>,
    /// Per-expiry problems and run-level failures, as text
    pub errors: Vec<String>,
    /// Expiries whose density could not be estimated
    pub failures: Vec<SliceFailure>,
    pub success: bool,
}

impl PipelineReport {
    fn failed(symbol: &str, trade_date: NaiveDate, error: impl Into<String>) -> Self {
        let error = error.into();
        warn!("{} {}: pipeline failed: {}", symbol, trade_date, error);
        Self {
            symbol: symbol.to_string(),
            trade_date,
            spot: None,
            results: Vec::new(),
            errors: vec![error],
            failures: Vec::new(),
            success: false,
        }
    }

    pub fn num_expiries(&self) -> usize {
        self.results.len()
    }

    /// Density surface of the successful expiries
    pub fn surface(&self) -> DensitySurface {
        let slices = self.results.iter().map(|r| r.slice.clone()).collect();
        let mut surface = DensitySurface::new(self.symbol.clone(), slices);
        surface.failures = self.failures.clone();
        surface
    }
}

pub struct RndPipeline {
    config: PipelineConfig,
    cleaner: ChainCleaner,
    checker: ArbitrageChecker,
    estimator: DensityEstimator,
}

impl RndPipeline {
    pub fn new(config: PipelineConfig) -> Self {
        Self {
            cleaner: ChainCleaner::with_dte_range(config.min_dte, config.max_dte),
            checker: ArbitrageChecker::default(),
            estimator: DensityEstimator::new(config.risk_free_rate),
            config,
        }
    }

    pub fn with_cleaner(mut self, cleaner: ChainCleaner) -> Self {
        self.cleaner = cleaner;
        self
    }

    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    /// Run on one trade date's quotes. When `spot` is `None` the median strike
    /// of the cleaned quotes stands in for it.
    pub fn run(
        &self,
        symbol: &str,
        trade_date: NaiveDate,
        spot: Option<f64>,
        quotes: &[MarketQuote],
    ) -> PipelineReport {
        if quotes.is_empty() {
            return PipelineReport::failed(symbol, trade_date, "Empty chain");
        }

        let cleaned = self.cleaner.clean(quotes, trade_date);
        if cleaned.is_empty() {
            return PipelineReport::failed(symbol, trade_date, "No valid options after cleaning");
        }

        let spot = match spot {
            Some(s) => s,
            None => {
                let mut strikes: Vec<f64> = cleaned.iter().map(|q| q.contract.strike).collect();
                strikes.sort_by(|a, b| a.total_cmp(b));
                let median = strikes[strikes.len() / 2];
                info!("{}: no spot given, using median strike {}", symbol, median);
                median
            }
        };

        let otm_chains = match self.cleaner.build_otm_chains(
            &cleaned,
            symbol,
            spot,
            self.config.risk_free_rate,
            trade_date,
        ) {
            Ok(chains) if !chains.is_empty() => chains,
            Ok(_) => return PipelineReport::failed(symbol, trade_date, "No valid OTM options"),
            Err(e) => return PipelineReport::failed(symbol, trade_date, e.to_string()),
        };

        let mut results = Vec::new();
        let mut errors = Vec::new();
        let mut failures: Vec<SliceFailure> = Vec::new();

        for otm in otm_chains {
            let expiry = otm.chain.expiry;
            if otm.chain.len() < self.config.min_quotes_per_expiry {
                info!(
                    "{} {}: skipping, {} OTM quotes < {}",
                    symbol,
                    expiry,
                    otm.chain.len(),
                    self.config.min_quotes_per_expiry
                );
                continue;
            }

            let arbitrage = self.checker.check(&otm.chain);
            if !arbitrage.is_valid {
                warn!("{} {}: {} arbitrage violations", symbol, expiry, arbitrage.num_violations);
                errors.push(format!("{}: {} arb violations", expiry, arbitrage.num_violations));
            }

            let slice = match self.estimator.estimate_as_of(&otm.chain, trade_date) {
                Ok(slice) => slice,
                Err(e) => {
                    errors.push(format!("{}: {}", expiry, e));
                    failures.push(SliceFailure {
                        expiry,
                        reason: e.to_string(),
                    });
                    continue;
                }
            };

            let stats = match DensityStats::from_slice(&slice) {
                Ok(stats) => {
                    info!(
                        "{} {}: mean={:.1} std={:.1} skew={:.4} quality={}",
                        symbol,
                        expiry,
                        stats.moments.mean,
                        stats.moments.std,
                        stats.moments.skewness,
                        otm.quality.quality_label()
                    );
                    Some(stats)
                }
                Err(e) => {
                    warn!("{} {}: density kept without statistics: {}", symbol, expiry, e);
                    errors.push(format!("{}: no statistics: {}", expiry, e));
                    None
                }
            };

            results.push(ExpiryResult {
                slice,
                stats,
                quality: otm.quality,
                arbitrage,
            });
        }

        if results.is_empty() {
            let mut report = PipelineReport::failed(symbol, trade_date, "No RNDs extracted");
            report.errors.extend(errors);
            report.failures = failures;
            return report;
        }

        info!(
            "{} {}: {} expiries processed, {} failed",
            symbol,
            trade_date,
            results.len(),
            failures.len()
        );

        PipelineReport {
            symbol: symbol.to_string(),
            trade_date,
            spot: Some(spot),
            results,
            errors,
            failures,
            success: true,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{OptionContract, OptionType};

    #[test]
    fn empty_input_fails_cleanly() {
        let pipeline = RndPipeline::new(PipelineConfig::default());
        let report = pipeline.run("SPY", NaiveDate::from_ymd_opt(2025, 1, 2).unwrap(), None, &[]);
        assert!(!report.success);
        assert_eq!(report.errors, vec!["Empty chain".to_string()]);
    }

    #[test]
    fn all_quotes_filtered_fails_cleanly() {
        let trade_date = NaiveDate::from_ymd_opt(2025, 1, 2).unwrap();
        let expiry = NaiveDate::from_ymd_opt(2025, 3, 21).unwrap();
        let contract = OptionContract::new("SPY".to_string(), OptionType::Call, 100.0, expiry);
        let quotes = vec![MarketQuote::new(contract, 0.0, 0.0, 0.0, 0, 0)];
        let report = RndPipeline::new(PipelineConfig::default()).run("SPY", trade_date, Some(100.0), &quotes);
        assert!(!report.success);
        assert!(report.errors[0].contains("cleaning"));
    }
}
