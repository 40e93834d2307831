use crate::models::density::second_difference;
use crate::models::OptionChain;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ArbitrageReport {
    pub is_valid: bool,
    pub num_violations: usize,
    pub monotonicity_ok: bool,
    pub convexity_ok: bool,
}

/// Static no-arbitrage checks on call prices: C(K) non-increasing and convex in K.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ArbitrageChecker {
    pub monotonicity_tol: f64,
    pub convexity_tol: f64,
}

impl Default for ArbitrageChecker {
    fn default() -> Self {
        Self {
            monotonicity_tol: 1e-6,
            convexity_tol: -1e-6,
        }
    }
}

impl ArbitrageChecker {
    pub fn check(&self, chain: &OptionChain) -> ArbitrageReport {
        let quotes = chain.sorted_quotes();

        let mono_violations = quotes
            .windows(2)
            .filter(|w| w[1].strike > w[0].strike)
            .filter(|w| {
                let slope = (w[1].call_price - w[0].call_price) / (w[1].strike - w[0].strike);
                slope > self.monotonicity_tol
            })
            .count();

        let conv_violations = quotes
            .windows(3)
            .filter(|w| w[0].strike < w[1].strike && w[1].strike < w[2].strike)
            .filter(|w| second_difference(&w[0], &w[1], &w[2]) < self.convexity_tol)
            .count();

        ArbitrageReport {
            is_valid: mono_violations == 0 && conv_violations == 0,
            num_violations: mono_violations + conv_violations,
            monotonicity_ok: mono_violations == 0,
            convexity_ok: conv_violations == 0,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    fn chain(prices: &[f64]) -> OptionChain {
        let expiry = NaiveDate::from_ymd_opt(2025, 3, 21).unwrap();
        OptionChain::from_prices("ES", expiry, &[90.0, 95.0, 100.0, 105.0, 110.0], prices).unwrap()
    }

    #[test]
    fn clean_chain_passes() {
        let report = ArbitrageChecker::default().check(&chain(&[12.0, 8.0, 5.0, 3.0, 1.5]));
        assert!(report.is_valid);
        assert_eq!(report.num_violations, 0);
    }

    #[test]
    fn detects_both_violation_kinds() {
        // 105 priced above 100: breaks monotonicity and the convexity around it
        let report = ArbitrageChecker::default().check(&chain(&[12.0, 8.0, 5.0, 5.5, 1.5]));
        assert!(!report.is_valid);
        assert!(!report.monotonicity_ok);
        assert!(!report.convexity_ok);
        assert_eq!(report.num_violations, 2);
    }
}
