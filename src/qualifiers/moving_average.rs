use super::{NamedSeries, Placement, Qualifier, QualifierOutput};
use crate::error::{Result, RndError};
use crate::models::PriceSeries;

/// Simple rolling mean of closes
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MovingAverage {
    pub window: usize,
}

impl Default for MovingAverage {
    fn default() -> Self {
        Self { window: 100 }
    }
}

impl MovingAverage {
    pub fn new(window: usize) -> Self {
        Self { window }
    }
}

impl Qualifier for MovingAverage {
    fn name(&self) -> String {
        format!("ma_{}", self.window)
    }

    fn label(&self) -> String {
        format!("{}-Day Moving Average", self.window)
    }

    fn placement(&self) -> Placement {
        Placement::Overlay
    }

    fn calculate(&self, prices: &PriceSeries) -> Result<QualifierOutput> {
        if self.window == 0 {
            return Err(RndError::invalid_input("moving average window must be at least 1"));
        }
        let w = self.window;
        let mut values = vec![None; prices.len()];
        let mut sum = 0.0;
        for (i, &p) in prices.values.iter().enumerate() {
            sum += p;
            if i >= w {
                sum -= prices.values[i - w];
            }
            if i + 1 >= w {
                values[i] = Some(sum / w as f64);
            }
        }
        Ok(QualifierOutput {
            label: self.label(),
            placement: self.placement(),
            series: vec![NamedSeries::new(self.name(), values)],
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::qualifiers::test_support::daily;

    #[test]
    fn warm_up_is_undefined() {
        let out = MovingAverage::new(3)
            .calculate(&daily(&[1.0, 2.0, 3.0, 4.0, 5.0]))
            .unwrap();
        let v = &out.series[0].values;
        assert_eq!(v[0], None);
        assert_eq!(v[1], None);
        assert_eq!(v[2], Some(2.0));
        assert_eq!(v[3], Some(3.0));
        assert_eq!(v[4], Some(4.0));
        assert_eq!(out.label, "3-Day Moving Average");
    }

    #[test]
    fn window_longer_than_series() {
        let out = MovingAverage::default().calculate(&daily(&[1.0, 2.0])).unwrap();
        assert!(out.series[0].values.iter().all(|v| v.is_none()));
    }
}
