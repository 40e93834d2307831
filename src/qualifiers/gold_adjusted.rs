use super::{NamedSeries, Placement, Qualifier, QualifierOutput};
use crate::error::Result;
use crate::models::PriceSeries;

/// Prices expressed in ounces of gold
#[derive(Debug, Clone, PartialEq)]
pub struct GoldAdjusted {
    pub gold: PriceSeries,
}

impl GoldAdjusted {
    pub fn new(gold: PriceSeries) -> Self {
        Self { gold }
    }

    pub fn adjust(&self, prices: &PriceSeries) -> Vec<Option<f64>> {
        self.gold
            .forward_fill_onto(&prices.dates)
            .into_iter()
            .zip(&prices.values)
            .map(|(g, &p)| g.filter(|g| *g > 0.0).map(|g| p / g))
            .collect()
    }
}

impl Qualifier for GoldAdjusted {
    fn name(&self) -> String {
        "gold_adjusted".to_string()
    }

    fn label(&self) -> String {
        "Price in Gold (oz)".to_string()
    }

    fn placement(&self) -> Placement {
        Placement::Overlay
    }

    fn calculate(&self, prices: &PriceSeries) -> Result<QualifierOutput> {
        Ok(QualifierOutput {
            label: self.label(),
            placement: self.placement(),
            series: vec![NamedSeries::new(self.name(), self.adjust(prices))],
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::qualifiers::test_support::daily;

    #[test]
    fn gaps_in_gold_are_forward_filled() {
        let prices = daily(&[4000.0, 4100.0, 4200.0]);
        // gold only quoted on the first and third day
        let gold = PriceSeries::new(
            vec![prices.dates[0], prices.dates[2]],
            vec![2000.0, 2100.0],
        )
        .unwrap();
        let out = GoldAdjusted::new(gold).adjust(&prices);
        assert_eq!(out, vec![Some(2.0), Some(2.05), Some(2.0)]);
    }
}
