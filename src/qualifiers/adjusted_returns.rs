use super::{pct_change, NamedSeries, Placement, Qualifier, QualifierOutput};
use crate::error::Result;
use crate::models::PriceSeries;

/// Daily percent returns: nominal, CPI-deflated and gold-denominated.
///
/// The deflated returns only depend on period-to-period ratios, so the
/// base date of the CPI restatement does not matter here.
#[derive(Debug, Clone, PartialEq)]
pub struct AdjustedReturns {
    pub cpi: PriceSeries,
    pub gold: PriceSeries,
}

impl AdjustedReturns {
    pub fn new(cpi: PriceSeries, gold: PriceSeries) -> Self {
        Self { cpi, gold }
    }
}

fn ratio(prices: &PriceSeries, reference: &PriceSeries) -> Vec<Option<f64>> {
    reference
        .forward_fill_onto(&prices.dates)
        .into_iter()
        .zip(&prices.values)
        .map(|(r, &p)| r.filter(|r| *r > 0.0).map(|r| p / r))
        .collect()
}

impl Qualifier for AdjustedReturns {
    fn name(&self) -> String {
        "adjusted_returns".to_string()
    }

    fn label(&self) -> String {
        "Daily Returns (%)".to_string()
    }

    fn placement(&self) -> Placement {
        Placement::Subplot
    }

    fn calculate(&self, prices: &PriceSeries) -> Result<QualifierOutput> {
        let nominal: Vec<Option<f64>> = prices.values.iter().copied().map(Some).collect();
        Ok(QualifierOutput {
            label: self.label(),
            placement: self.placement(),
            series: vec![
                NamedSeries::new("nominal_returns", pct_change(&nominal)),
                NamedSeries::new(
                    "inflation_adjusted_returns",
                    pct_change(&ratio(prices, &self.cpi)),
                ),
                NamedSeries::new("gold_adjusted_returns", pct_change(&ratio(prices, &self.gold))),
            ],
        })
    }
}
