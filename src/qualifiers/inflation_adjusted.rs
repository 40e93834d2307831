use super::{NamedSeries, Placement, Qualifier, QualifierOutput};
use crate::error::{Result, RndError};
use crate::models::PriceSeries;

/// Prices restated in the dollars of the last observation date, using CPI.
#[derive(Debug, Clone, PartialEq)]
pub struct InflationAdjusted {
    /// Consumer price index observations (monthly is fine; forward-filled)
    pub cpi: PriceSeries,
}

impl InflationAdjusted {
    pub fn new(cpi: PriceSeries) -> Self {
        Self { cpi }
    }

    /// Real prices; `None` before the first CPI observation.
    pub fn adjust(&self, prices: &PriceSeries) -> Result<Vec<Option<f64>>> {
        let cpi = self.cpi.forward_fill_onto(&prices.dates);
        let latest = cpi
            .last()
            .copied()
            .flatten()
            .ok_or_else(|| RndError::invalid_input("CPI series does not cover the price dates"))?;
        Ok(prices
            .values
            .iter()
            .zip(cpi)
            .map(|(&p, c)| c.filter(|c| *c > 0.0).map(|c| p * latest / c))
            .collect())
    }
}

impl Qualifier for InflationAdjusted {
    fn name(&self) -> String {
        "inflation_adjusted".to_string()
    }

    fn label(&self) -> String {
        "Inflation-Adjusted Price (Real Dollars)".to_string()
    }

    fn placement(&self) -> Placement {
        Placement::Overlay
    }

    fn calculate(&self, prices: &PriceSeries) -> Result<QualifierOutput> {
        Ok(QualifierOutput {
            label: self.label(),
            placement: self.placement(),
            series: vec![NamedSeries::new(self.name(), self.adjust(prices)?)],
        })
    }
}
