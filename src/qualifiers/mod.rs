//! Qualifiers: stateless transforms that derive display series from a price series
//!
//! Each qualifier maps a [`PriceSeries`] (plus any reference data it was
//! built with) to one or more output series aligned to the input dates.
//! [`QualifierKind`] is the registry used by the CLI; [`apply_qualifiers`]
//! runs a set of them independently.

mod adjusted_returns;
mod drawdown_days;
mod gold_adjusted;
mod inflation_adjusted;
mod moving_average;

pub use adjusted_returns::AdjustedReturns;
pub use drawdown_days::{DrawdownDays, DrawdownSeverity};
pub use gold_adjusted::GoldAdjusted;
pub use inflation_adjusted::InflationAdjusted;
pub use moving_average::MovingAverage;

use crate::error::Result;
use crate::models::PriceSeries;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

/// Where a qualifier is drawn relative to the price chart
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Placement {
    Overlay,
    Subplot,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NamedSeries {
    pub name: String,
    /// Aligned with the input dates; `None` where undefined
    pub values: Vec<Option<f64>>,
}

impl NamedSeries {
    pub fn new(name: impl Into<String>, values: Vec<Option<f64>>) -> Self {
        Self {
            name: name.into(),
            values,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QualifierOutput {
    pub label: String,
    pub placement: Placement,
    pub series: Vec<NamedSeries>,
}

pub trait Qualifier {
    /// Short identifier, also used as column prefix
    fn name(&self) -> String;
    /// Human-readable chart label
    fn label(&self) -> String;
    fn placement(&self) -> Placement;
    fn calculate(&self, prices: &PriceSeries) -> Result<QualifierOutput>;
}

/// Percent change ×100 between consecutive defined values.
pub(crate) fn pct_change(values: &[Option<f64>]) -> Vec<Option<f64>> {
    let mut out = Vec::with_capacity(values.len());
    out.push(None);
    for w in values.windows(2) {
        out.push(match (w[0], w[1]) {
            (Some(prev), Some(cur)) if prev != 0.0 => Some((cur / prev - 1.0) * 100.0),
            _ => None,
        });
    }
    out.truncate(values.len());
    out
}

/// Registry of the available qualifiers
#[derive(Debug, Clone, PartialEq)]
pub enum QualifierKind {
    MovingAverage(MovingAverage),
    DrawdownDays(DrawdownDays),
    InflationAdjusted(InflationAdjusted),
    GoldAdjusted(GoldAdjusted),
    AdjustedReturns(AdjustedReturns),
}

impl QualifierKind {
    fn as_qualifier(&self) -> &dyn Qualifier {
        match self {
            QualifierKind::MovingAverage(q) => q,
            QualifierKind::DrawdownDays(q) => q,
            QualifierKind::InflationAdjusted(q) => q,
            QualifierKind::GoldAdjusted(q) => q,
            QualifierKind::AdjustedReturns(q) => q,
        }
    }
}

impl Qualifier for QualifierKind {
    fn name(&self) -> String {
        self.as_qualifier().name()
    }

    fn label(&self) -> String {
        self.as_qualifier().label()
    }

    fn placement(&self) -> Placement {
        self.as_qualifier().placement()
    }

    fn calculate(&self, prices: &PriceSeries) -> Result<QualifierOutput> {
        self.as_qualifier().calculate(prices)
    }
}

/// Run each qualifier on `prices`. One failing qualifier does not stop the others.
pub fn apply_qualifiers(
    prices: &PriceSeries,
    qualifiers: &[QualifierKind],
) -> Vec<(String, Result<QualifierOutput>)> {
    qualifiers
        .iter()
        .map(|q| {
            let name = q.name();
            debug!("Calculating {}", name);
            let out = q.calculate(prices);
            if let Err(e) = &out {
                warn!("Qualifier {} failed: {}", name, e);
            }
            (name, out)
        })
        .collect()
}

#[cfg(test)]
pub(crate) mod test_support {
    use super::*;
    use chrono::NaiveDate;

    pub fn daily(values: &[f64]) -> PriceSeries {
        let start = NaiveDate::from_ymd_opt(2024, 1, 1).unwrap();
        let dates = (0..values.len())
            .map(|i| start + chrono::Duration::days(i as i64))
            .collect();
        PriceSeries::new(dates, values.to_vec()).unwrap()
    }
}

#[cfg(test)]
mod tests {
    use super::test_support::daily;
    use super::*;

    #[test]
    fn pct_change_skips_undefined() {
        let v = pct_change(&[Some(100.0), Some(110.0), None, Some(50.0), Some(55.0)]);
        assert_eq!(v[0], None);
        assert!((v[1].unwrap() - 10.0).abs() < 1e-9);
        assert_eq!(v[2], None);
        assert_eq!(v[3], None);
        assert!((v[4].unwrap() - 10.0).abs() < 1e-9);
        assert!(pct_change(&[]).is_empty());
    }

    #[test]
    fn registry_isolates_failures() {
        let prices = daily(&[1.0, 2.0, 3.0]);
        let out = apply_qualifiers(
            &prices,
            &[
                QualifierKind::MovingAverage(MovingAverage::new(0)),
                QualifierKind::DrawdownDays(DrawdownDays),
            ],
        );
        assert_eq!(out.len(), 2);
        assert!(out[0].1.is_err());
        assert!(out[1].1.is_ok());
        assert_eq!(out[1].0, "drawdown_days");
    }
}
