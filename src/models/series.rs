use crate::error::{Result, RndError};
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

/// Daily observations with strictly increasing dates
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PriceSeries {
    pub dates: Vec<NaiveDate>,
    pub values: Vec<f64>,
}

impl PriceSeries {
    pub fn new(dates: Vec<NaiveDate>, values: Vec<f64>) -> Result<Self> {
        if dates.len() != values.len() {
            return Err(RndError::invalid_input(format!(
                "{} dates but {} values",
                dates.len(),
                values.len()
            )));
        }
        if let Some(w) = dates.windows(2).find(|w| w[0] >= w[1]) {
            return Err(RndError::invalid_input(format!(
                "dates must be strictly increasing ({} followed by {})",
                w[0], w[1]
            )));
        }
        Ok(Self { dates, values })
    }

    /// Build from unordered (date, value) pairs; later duplicates win.
    pub fn from_pairs(mut pairs: Vec<(NaiveDate, f64)>) -> Result<Self> {
        pairs.sort_by_key(|(d, _)| *d);
        let mut dates: Vec<NaiveDate> = Vec::with_capacity(pairs.len());
        let mut values: Vec<f64> = Vec::with_capacity(pairs.len());
        for (d, v) in pairs {
            if dates.last() == Some(&d) {
                if let Some(last) = values.last_mut() {
                    *last = v;
                }
                continue;
            }
            dates.push(d);
            values.push(v);
        }
        Self::new(dates, values)
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    /// Value in effect on each of `dates`: the latest observation on or
    /// before that date, `None` before the first observation.
    pub fn forward_fill_onto(&self, dates: &[NaiveDate]) -> Vec<Option<f64>> {
        dates
            .iter()
            .map(|d| {
                let n = self.dates.partition_point(|x| x <= d);
                if n == 0 {
                    None
                } else {
                    Some(self.values[n - 1])
                }
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn d(m: u32, day: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(2024, m, day).unwrap()
    }

    #[test]
    fn rejects_unordered_dates() {
        assert!(PriceSeries::new(vec![d(1, 2), d(1, 2)], vec![1.0, 2.0]).is_err());
        assert!(PriceSeries::new(vec![d(1, 2)], vec![1.0, 2.0]).is_err());
    }

    #[test]
    fn from_pairs_sorts_and_dedups() {
        let s = PriceSeries::from_pairs(vec![(d(1, 3), 3.0), (d(1, 2), 2.0), (d(1, 3), 4.0)]).unwrap();
        assert_eq!(s.dates, vec![d(1, 2), d(1, 3)]);
        assert_eq!(s.values, vec![2.0, 4.0]);
    }

    #[test]
    fn monthly_series_forward_fills_onto_daily() {
        let cpi = PriceSeries::new(vec![d(1, 1), d(2, 1)], vec![300.0, 301.5]).unwrap();
        let filled = cpi.forward_fill_onto(&[d(1, 1), d(1, 31), d(2, 1), d(2, 15)]);
        assert_eq!(filled, vec![Some(300.0), Some(300.0), Some(301.5), Some(301.5)]);

        let late = PriceSeries::new(vec![d(3, 1)], vec![1.0]).unwrap();
        assert_eq!(late.forward_fill_onto(&[d(2, 1)]), vec![None]);
    }
}
