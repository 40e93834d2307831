use crate::error::Result;
use crate::models::{MarketQuote, OptionChain, OptionQuote};
use crate::utils::time::years_to_expiry;
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use tracing::{debug, info};

/// Liquidity and coverage of one expiry's OTM chain
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChainQualityMetrics {
    pub num_raw: usize,
    pub num_otm: usize,
    pub num_calls: usize,
    pub num_puts_synthetic: usize,
    pub strikes: Vec<f64>,
    pub spot: f64,
}

impl ChainQualityMetrics {
    pub fn strike_range(&self) -> (f64, f64) {
        let lo = self.strikes.iter().copied().fold(f64::INFINITY, f64::min);
        let hi = self.strikes.iter().copied().fold(f64::NEG_INFINITY, f64::max);
        (lo, hi)
    }

    /// Strike range as a fraction of spot
    pub fn strike_coverage(&self) -> f64 {
        if self.strikes.is_empty() || self.spot <= 0.0 {
            return 0.0;
        }
        let (lo, hi) = self.strike_range();
        (hi - lo) / self.spot
    }

    fn gaps(&self) -> Vec<f64> {
        let mut sorted = self.strikes.clone();
        sorted.sort_by(|a, b| a.total_cmp(b));
        sorted.windows(2).map(|w| w[1] - w[0]).collect()
    }

    pub fn avg_strike_gap(&self) -> f64 {
        let gaps = self.gaps();
        if gaps.is_empty() {
            return 0.0;
        }
        gaps.iter().sum::<f64>() / gaps.len() as f64
    }

    pub fn max_strike_gap(&self) -> f64 {
        self.gaps().into_iter().fold(0.0, f64::max)
    }

    pub fn moneyness_range(&self) -> (f64, f64) {
        let (lo, hi) = self.strike_range();
        (lo / self.spot, hi / self.spot)
    }

    /// Weighted 0-1 score: strike count (saturates at 30), coverage
    /// (saturates at 60% of spot), largest gap (full marks under 5, none
    /// past 50) and call/put balance.
    pub fn quality_score(&self) -> f64 {
        let n_score = (self.num_otm as f64 / 30.0).min(1.0);
        let cov_score = (self.strike_coverage() / 0.6).min(1.0);
        let gap_score = (1.0 - (self.max_strike_gap() - 5.0) / 45.0).clamp(0.0, 1.0);
        let balance_score = if self.num_otm > 0 {
            let minority = self.num_calls.min(self.num_puts_synthetic) as f64;
            (minority / (self.num_otm as f64 / 2.0)).min(1.0)
        } else {
            0.0
        };
        0.3 * n_score + 0.3 * cov_score + 0.2 * gap_score + 0.2 * balance_score
    }

    pub fn quality_label(&self) -> &'static str {
        let score = self.quality_score();
        if score >= 0.8 {
            "HIGH"
        } else if score >= 0.5 {
            "MEDIUM"
        } else {
            "LOW"
        }
    }
}

/// Call chain for one expiry built from OTM quotes, with its quality metrics
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OtmChain {
    pub chain: OptionChain,
    pub quality: ChainQualityMetrics,
}

/// Filters raw quotes and assembles OTM call chains
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChainCleaner {
    pub min_volume: u64,
    pub min_open_interest: u64,
    pub max_spread_pct: f64,
    pub min_dte: i64,
    pub max_dte: i64,
}

impl Default for ChainCleaner {
    fn default() -> Self {
        Self {
            min_volume: 10,
            min_open_interest: 100,
            max_spread_pct: 0.20,
            min_dte: 1,
            max_dte: 365,
        }
    }
}

impl ChainCleaner {
    pub fn with_dte_range(min_dte: i64, max_dte: i64) -> Self {
        Self {
            min_dte,
            max_dte,
            ..Self::default()
        }
    }

    fn keep(&self, q: &MarketQuote, trade_date: NaiveDate) -> bool {
        if q.bid > q.ask || q.bid < 0.0 || q.ask <= 0.0 {
            return false;
        }
        if self.min_volume > 0 && q.volume < self.min_volume {
            return false;
        }
        if self.min_open_interest > 0 && q.open_interest < self.min_open_interest {
            return false;
        }
        if self.max_spread_pct > 0.0 {
            match q.spread_pct() {
                Some(pct) if pct <= self.max_spread_pct => {}
                _ => return false,
            }
        }
        let dte = q.contract.days_to_expiry(trade_date);
        dte >= self.min_dte && dte <= self.max_dte
    }

    /// Drop crossed or empty quotes, illiquid contracts, wide spreads and
    /// expiries outside the DTE window.
    pub fn clean(&self, quotes: &[MarketQuote], trade_date: NaiveDate) -> Vec<MarketQuote> {
        let cleaned: Vec<MarketQuote> = quotes
            .iter()
            .filter(|q| self.keep(q, trade_date))
            .cloned()
            .collect();
        info!("Cleaned chain: {} of {} quotes kept", cleaned.len(), quotes.len());
        cleaned
    }

    /// Build one call chain per expiry from OTM quotes. Calls above spot
    /// are used at mid; puts below spot become synthetic calls through
    /// put-call parity `C = P + S - K e^(-rT)`; calls within 1% of spot fill
    /// strikes not yet covered.
    pub fn build_otm_chains(
        &self,
        quotes: &[MarketQuote],
        symbol: &str,
        spot: f64,
        r: f64,
        trade_date: NaiveDate,
    ) -> Result<Vec<OtmChain>> {
        let mut by_expiry: BTreeMap<NaiveDate, Vec<&MarketQuote>> = BTreeMap::new();
        for q in quotes {
            by_expiry.entry(q.contract.expiry).or_default().push(q);
        }

        let mut chains = Vec::with_capacity(by_expiry.len());
        for (expiry, group) in by_expiry {
            let t = years_to_expiry(expiry, trade_date);
            let discount = (-r * t).exp();

            let mut points: Vec<(f64, f64)> = Vec::new();
            let mut num_calls = 0usize;
            let mut num_puts_synthetic = 0usize;

            for q in group.iter().filter(|q| q.contract.is_call() && q.contract.strike > spot) {
                points.push((q.contract.strike, q.mid_price()));
                num_calls += 1;
            }

            for q in group.iter().filter(|q| q.contract.is_put() && q.contract.strike < spot) {
                let k = q.contract.strike;
                let synthetic = q.mid_price() + spot - k * discount;
                if synthetic > 0.0 {
                    points.push((k, synthetic));
                    num_puts_synthetic += 1;
                }
            }

            for q in group.iter().filter(|q| {
                q.contract.is_call()
                    && q.contract.strike >= spot * 0.99
                    && q.contract.strike <= spot * 1.01
            }) {
                if !points.iter().any(|(k, _)| *k == q.contract.strike) {
                    points.push((q.contract.strike, q.mid_price()));
                    num_calls += 1;
                }
            }

            if points.is_empty() {
                debug!("{} {}: no OTM quotes", symbol, expiry);
                continue;
            }

            points.sort_by(|a, b| a.0.total_cmp(&b.0));
            let quality = ChainQualityMetrics {
                num_raw: group.len(),
                num_otm: points.len(),
                num_calls,
                num_puts_synthetic,
                strikes: points.iter().map(|(k, _)| *k).collect(),
                spot,
            };
            let chain_quotes = points
                .iter()
                .map(|&(k, c)| OptionQuote::new(k, c, expiry))
                .collect::<Result<Vec<_>>>()?;
            debug!(
                "{} {}: {} OTM quotes ({}C + {}P->C), quality {:.2}",
                symbol,
                expiry,
                quality.num_otm,
                num_calls,
                num_puts_synthetic,
                quality.quality_score()
            );
            chains.push(OtmChain {
                chain: OptionChain::new(symbol, expiry, chain_quotes)?,
                quality,
            });
        }
        Ok(chains)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{OptionContract, OptionType};
    use approx::assert_abs_diff_eq;

    fn trade_date() -> NaiveDate {
        NaiveDate::from_ymd_opt(2025, 1, 2).unwrap()
    }

    fn expiry() -> NaiveDate {
        NaiveDate::from_ymd_opt(2025, 3, 21).unwrap()
    }

    fn quote(kind: OptionType, strike: f64, bid: f64, ask: f64) -> MarketQuote {
        let c = OptionContract::new("SPY".to_string(), kind, strike, expiry());
        MarketQuote::new(c, bid, ask, (bid + ask) / 2.0, 50, 500)
    }

    #[test]
    fn clean_drops_bad_quotes() {
        let mut thin = quote(OptionType::Call, 105.0, 1.0, 1.1);
        thin.volume = 1;
        let mut far = quote(OptionType::Call, 110.0, 1.0, 1.1);
        far.contract.expiry = NaiveDate::from_ymd_opt(2027, 1, 15).unwrap();
        let quotes = vec![
            quote(OptionType::Call, 100.0, 2.0, 2.2),
            quote(OptionType::Call, 101.0, 2.5, 2.0), // crossed
            quote(OptionType::Call, 102.0, 0.0, 0.0), // empty
            quote(OptionType::Call, 103.0, 1.0, 2.0), // wide
            thin,
            far,
        ];
        let kept = ChainCleaner::default().clean(&quotes, trade_date());
        assert_eq!(kept.len(), 1);
        assert_eq!(kept[0].contract.strike, 100.0);
    }

    #[test]
    fn puts_become_synthetic_calls() {
        let spot = 100.0;
        let r = 0.05;
        let quotes = vec![
            quote(OptionType::Put, 90.0, 0.9, 1.1),
            quote(OptionType::Put, 95.0, 1.9, 2.1),
            quote(OptionType::Call, 100.0, 3.9, 4.1),
            quote(OptionType::Call, 105.0, 1.9, 2.1),
            quote(OptionType::Call, 95.0, 7.0, 7.2), // ITM call ignored
        ];
        let chains = ChainCleaner::default()
            .build_otm_chains(&quotes, "SPY", spot, r, trade_date())
            .unwrap();
        assert_eq!(chains.len(), 1);
        let otm = &chains[0];
        assert_eq!(otm.chain.strikes(), vec![90.0, 95.0, 100.0, 105.0]);

        let t = years_to_expiry(expiry(), trade_date());
        let expected = 1.0 + spot - 90.0 * (-r * t).exp();
        assert_abs_diff_eq!(otm.chain.quotes[0].call_price, expected, epsilon = 1e-12);

        assert_eq!(otm.quality.num_calls, 2);
        assert_eq!(otm.quality.num_puts_synthetic, 2);
        assert_eq!(otm.quality.num_raw, 5);
    }

    #[test]
    fn quality_score_components() {
        let m = ChainQualityMetrics {
            num_raw: 40,
            num_otm: 30,
            num_calls: 15,
            num_puts_synthetic: 15,
            strikes: (0..30).map(|i| 70.0 + 2.0 * i as f64).collect(),
            spot: 100.0,
        };
        // 30 strikes, 58% coverage, 2-point gaps, perfectly balanced
        assert_abs_diff_eq!(m.strike_coverage(), 0.58, epsilon = 1e-12);
        assert_abs_diff_eq!(m.max_strike_gap(), 2.0, epsilon = 1e-12);
        assert_abs_diff_eq!(m.quality_score(), 0.3 + 0.3 * 0.58 / 0.6 + 0.2 + 0.2, epsilon = 1e-12);
        assert_eq!(m.quality_label(), "HIGH");

        let empty = ChainQualityMetrics {
            num_raw: 0,
            num_otm: 0,
            num_calls: 0,
            num_puts_synthetic: 0,
            strikes: vec![],
            spot: 100.0,
        };
        assert_eq!(empty.quality_label(), "LOW");
    }
}
