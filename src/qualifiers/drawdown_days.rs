use super::{NamedSeries, Placement, Qualifier, QualifierOutput};
use crate::error::Result;
use crate::models::PriceSeries;
use serde::{Deserialize, Serialize};

/// Days spent below the running high, with percent drawdown from that high
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct DrawdownDays;

/// Colour buckets for the drawdown chart
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum DrawdownSeverity {
    Mild,
    Moderate,
    Correction,
    Severe,
    Crash,
}

impl DrawdownSeverity {
    pub fn from_percent(pct: f64) -> Self {
        if pct >= -5.0 {
            DrawdownSeverity::Mild
        } else if pct >= -10.0 {
            DrawdownSeverity::Moderate
        } else if pct >= -20.0 {
            DrawdownSeverity::Correction
        } else if pct >= -30.0 {
            DrawdownSeverity::Severe
        } else {
            DrawdownSeverity::Crash
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            DrawdownSeverity::Mild => "< 5% drawdown",
            DrawdownSeverity::Moderate => "5-10% drawdown",
            DrawdownSeverity::Correction => "10-20% drawdown",
            DrawdownSeverity::Severe => "20-30% drawdown",
            DrawdownSeverity::Crash => "> 30% drawdown",
        }
    }
}

impl DrawdownDays {
    /// (days below high, percent drawdown) for each observation
    pub fn compute(values: &[f64]) -> (Vec<f64>, Vec<f64>) {
        let mut days = Vec::with_capacity(values.len());
        let mut pct = Vec::with_capacity(values.len());
        let mut running_max = f64::NEG_INFINITY;
        let mut counter = 0u32;
        for (i, &p) in values.iter().enumerate() {
            running_max = running_max.max(p);
            pct.push((p - running_max) / running_max * 100.0);
            if i > 0 {
                if p < running_max {
                    counter += 1;
                } else {
                    counter = 0;
                }
            }
            days.push(counter as f64);
        }
        (days, pct)
    }
}

impl Qualifier for DrawdownDays {
    fn name(&self) -> String {
        "drawdown_days".to_string()
    }

    fn label(&self) -> String {
        "Days Below Previous High (Color-coded by Drawdown %)".to_string()
    }

    fn placement(&self) -> Placement {
        Placement::Subplot
    }

    fn calculate(&self, prices: &PriceSeries) -> Result<QualifierOutput> {
        let (days, pct) = Self::compute(&prices.values);
        Ok(QualifierOutput {
            label: self.label(),
            placement: self.placement(),
            series: vec![
                NamedSeries::new("days_below_high", days.into_iter().map(Some).collect()),
                NamedSeries::new("percent_drawdown", pct.into_iter().map(Some).collect()),
            ],
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn counter_resets_on_new_high() {
        let (days, pct) = DrawdownDays::compute(&[100.0, 90.0, 95.0, 100.0, 80.0, 120.0]);
        assert_eq!(days, vec![0.0, 1.0, 2.0, 0.0, 1.0, 0.0]);
        assert_eq!(pct[0], 0.0);
        assert!((pct[1] + 10.0).abs() < 1e-12);
        assert!((pct[4] + 20.0).abs() < 1e-12);
        assert_eq!(pct[5], 0.0);
    }

    #[test]
    fn severity_buckets() {
        assert_eq!(DrawdownSeverity::from_percent(-4.9), DrawdownSeverity::Mild);
        assert_eq!(DrawdownSeverity::from_percent(-10.0), DrawdownSeverity::Moderate);
        assert_eq!(DrawdownSeverity::from_percent(-15.0), DrawdownSeverity::Correction);
        assert_eq!(DrawdownSeverity::from_percent(-30.0), DrawdownSeverity::Severe);
        assert_eq!(DrawdownSeverity::from_percent(-45.0), DrawdownSeverity::Crash);
    }
}
