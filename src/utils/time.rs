use crate::error::{Result, RndError};
use chrono::NaiveDate;

/// Calendar-day year fraction used throughout: days / 365.
pub fn years_to_expiry(expiry: NaiveDate, as_of: NaiveDate) -> f64 {
    (expiry - as_of).num_days() as f64 / 365.0
}

/// Parse `YYYY-MM-DD`, also accepting a trailing time part (`2025-06-20 00:00:00`).
pub fn parse_date(s: &str) -> Result<NaiveDate> {
    let trimmed = s.trim();
    let date_part = trimmed.get(..10).unwrap_or(trimmed);
    NaiveDate::parse_from_str(date_part, "%Y-%m-%d")
        .map_err(|e| RndError::ParseError(format!("Invalid date '{}': {}", s, e)))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn year_fraction_is_act_365() {
        let as_of = NaiveDate::from_ymd_opt(2025, 1, 1).unwrap();
        let expiry = NaiveDate::from_ymd_opt(2026, 1, 1).unwrap();
        assert!((years_to_expiry(expiry, as_of) - 1.0).abs() < 1e-12);
        assert!(years_to_expiry(as_of, expiry) < 0.0);
    }

    #[test]
    fn parses_dates_with_time_suffix() {
        let d = NaiveDate::from_ymd_opt(2025, 6, 20).unwrap();
        assert_eq!(parse_date("2025-06-20").unwrap(), d);
        assert_eq!(parse_date("2025-06-20 00:00:00").unwrap(), d);
        assert!(parse_date("20/06/2025").is_err());
    }
}
