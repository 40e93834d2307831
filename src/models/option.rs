use crate::error::{Result, RndError};
use crate::utils::black_scholes;
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::str::FromStr;
use tracing::{debug, trace};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum OptionType {
    Call,
    Put,
}

impl std::fmt::Display for OptionType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            OptionType::Call => write!(f, "C"),
            OptionType::Put => write!(f, "P"),
        }
    }
}

impl FromStr for OptionType {
    type Err = RndError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_uppercase().as_str() {
            "C" | "CALL" => Ok(OptionType::Call),
            "P" | "PUT" => Ok(OptionType::Put),
            other => Err(RndError::ParseError(format!("Unknown option right '{}'", other))),
        }
    }
}

/// A listed contract, independent of any price observation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OptionContract {
    pub symbol: String,
    pub option_type: OptionType,
    pub strike: f64,
    pub expiry: NaiveDate,
    pub option_symbol: String, // OCC format
}

impl OptionContract {
    pub fn new(symbol: String, option_type: OptionType, strike: f64, expiry: NaiveDate) -> Self {
        let option_symbol = Self::generate_occ_symbol(&symbol, option_type, strike, expiry);
        Self {
            symbol,
            option_type,
            strike,
            expiry,
            option_symbol,
        }
    }

    /// format: Symbol + YY + MM + DD + C/P + Strike
    /// e.g. SPY250620C00550000
    fn generate_occ_symbol(
        symbol: &str,
        option_type: OptionType,
        strike: f64,
        expiry: NaiveDate,
    ) -> String {
        let strike_str = format!("{:08}", (strike * 1000.0).round() as u64);
        format!("{}{}{}{}", symbol, expiry.format("%y%m%d"), option_type, strike_str)
    }

    /// Calendar days from `as_of` to expiry (negative once expired)
    pub fn days_to_expiry(&self, as_of: NaiveDate) -> i64 {
        (self.expiry - as_of).num_days()
    }

    pub fn is_call(&self) -> bool {
        self.option_type == OptionType::Call
    }

    pub fn is_put(&self) -> bool {
        self.option_type == OptionType::Put
    }
}

/// Sensitivities as reported by the data vendor; any of them may be missing.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct Greeks {
    pub delta: Option<f64>,
    pub gamma: Option<f64>,
    pub theta: Option<f64>,
    pub vega: Option<f64>,
}

impl Greeks {
    pub fn is_empty(&self) -> bool {
        self.delta.is_none() && self.gamma.is_none() && self.theta.is_none() && self.vega.is_none()
    }
}

/// Raw end-of-day market observation for one contract.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MarketQuote {
    pub contract: OptionContract,
    pub bid: f64,
    pub ask: f64,
    pub last: f64,
    pub volume: u64,
    pub open_interest: u64,
    pub implied_vol: Option<f64>,
    #[serde(default)]
    pub greeks: Greeks,
}

impl MarketQuote {
    pub fn new(
        contract: OptionContract,
        bid: f64,
        ask: f64,
        last: f64,
        volume: u64,
        open_interest: u64,
    ) -> Self {
        Self {
            contract,
            bid,
            ask,
            last,
            volume,
            open_interest,
            implied_vol: None,
            greeks: Greeks::default(),
        }
    }

    pub fn with_implied_vol(mut self, iv: Option<f64>) -> Self {
        self.implied_vol = iv;
        self
    }

    pub fn with_greeks(mut self, greeks: Greeks) -> Self {
        self.greeks = greeks;
        self
    }

    pub fn mid_price(&self) -> f64 {
        (self.bid + self.ask) / 2.0
    }

    pub fn spread(&self) -> f64 {
        self.ask - self.bid
    }

    /// Spread relative to mid; `None` when the mid is zero.
    pub fn spread_pct(&self) -> Option<f64> {
        let mid = self.mid_price();
        if mid == 0.0 {
            None
        } else {
            Some(self.spread() / mid)
        }
    }
}

/// One (strike, call price) observation used by the density estimator.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct OptionQuote {
    pub strike: f64,
    pub call_price: f64,
    pub expiry: NaiveDate,
    pub implied_vol: Option<f64>,
}

impl OptionQuote {
    pub fn new(strike: f64, call_price: f64, expiry: NaiveDate) -> Result<Self> {
        if !strike.is_finite() || strike <= 0.0 {
            return Err(RndError::invalid_input(format!(
                "strike must be positive and finite, got {}",
                strike
            )));
        }
        if !call_price.is_finite() || call_price < 0.0 {
            return Err(RndError::invalid_input(format!(
                "call price must be non-negative and finite, got {} at strike {}",
                call_price, strike
            )));
        }
        Ok(Self {
            strike,
            call_price,
            expiry,
            implied_vol: None,
        })
    }

    pub fn with_implied_vol(mut self, iv: f64) -> Result<Self> {
        if !iv.is_finite() || iv < 0.0 {
            return Err(RndError::invalid_input(format!(
                "implied volatility must be non-negative, got {}",
                iv
            )));
        }
        self.implied_vol = Some(iv);
        Ok(self)
    }
}

/// Call quotes for one underlying and one expiry.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OptionChain {
    pub underlying_symbol: String,
    pub expiry: NaiveDate,
    pub quotes: Vec<OptionQuote>,
}

impl OptionChain {
    /// Build a chain; every quote must carry the chain's expiry.
    pub fn new(
        underlying_symbol: impl Into<String>,
        expiry: NaiveDate,
        quotes: Vec<OptionQuote>,
    ) -> Result<Self> {
        if let Some(stray) = quotes.iter().find(|q| q.expiry != expiry) {
            return Err(RndError::invalid_input(format!(
                "quote at strike {} expires {} but chain expiry is {}",
                stray.strike, stray.expiry, expiry
            )));
        }
        Ok(Self {
            underlying_symbol: underlying_symbol.into(),
            expiry,
            quotes,
        })
    }

    /// Convenience constructor from parallel strike/price slices.
    pub fn from_prices(
        underlying_symbol: impl Into<String>,
        expiry: NaiveDate,
        strikes: &[f64],
        call_prices: &[f64],
    ) -> Result<Self> {
        if strikes.len() != call_prices.len() {
            return Err(RndError::invalid_input(format!(
                "{} strikes but {} call prices",
                strikes.len(),
                call_prices.len()
            )));
        }
        let quotes = strikes
            .iter()
            .zip(call_prices)
            .map(|(&k, &c)| OptionQuote::new(k, c, expiry))
            .collect::<Result<Vec<_>>>()?;
        Self::new(underlying_symbol, expiry, quotes)
    }

    pub fn len(&self) -> usize {
        self.quotes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.quotes.is_empty()
    }

    pub fn strikes(&self) -> Vec<f64> {
        self.quotes.iter().map(|q| q.strike).collect()
    }

    pub fn is_sorted(&self) -> bool {
        self.quotes.windows(2).all(|w| w[0].strike <= w[1].strike)
    }

    /// Quotes ordered by ascending strike. Borrowed input is left untouched.
    pub fn sorted_quotes(&self) -> Vec<OptionQuote> {
        let mut quotes = self.quotes.clone();
        if !self.is_sorted() {
            trace!("Sorting {} quotes for {}", quotes.len(), self.expiry);
            quotes.sort_by(|a, b| a.strike.total_cmp(&b.strike));
        }
        quotes
    }

    /// Fill missing implied vols by inverting Black-Scholes on each call price.
    /// Quotes whose inversion fails keep `None`.
    pub fn with_implied_vols(&self, spot: f64, r: f64, t: f64) -> Self {
        let mut filled = 0usize;
        let quotes = self
            .quotes
            .iter()
            .map(|q| {
                if q.implied_vol.is_some() {
                    return *q;
                }
                match black_scholes::implied_volatility(q.call_price, spot, q.strike, t, r, true) {
                    Ok(iv) => {
                        filled += 1;
                        OptionQuote {
                            implied_vol: Some(iv),
                            ..*q
                        }
                    }
                    Err(_) => *q,
                }
            })
            .collect();
        debug!("Back-filled {} implied vols for {}", filled, self.expiry);
        Self {
            underlying_symbol: self.underlying_symbol.clone(),
            expiry: self.expiry,
            quotes,
        }
    }
}
