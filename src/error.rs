use chrono::NaiveDate;
use polars::prelude::PolarsError;
use thiserror::Error;

/// Custom error types for the rnd-surface library
#[derive(Error, Debug)]
pub enum RndError {
    /// Fewer than three distinct strikes for an expiry; a second difference needs a neighbour on each side.
    #[error("Insufficient data for {expiry}: need at least 3 strikes, got {strikes}")]
    InsufficientData { expiry: NaiveDate, strikes: usize },

    /// A slice too short to normalise into a distribution.
    #[error("Too few density points for {expiry}: need at least 2, got {points}")]
    TooFewDensityPoints { expiry: NaiveDate, points: usize },

    /// Two quotes share a strike after sorting, leaving a zero strike gap.
    #[error("Non-monotonic strikes for {expiry}: duplicate strike {strike}")]
    NonMonotonicStrike { expiry: NaiveDate, strike: f64 },

    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("Configuration error: {0}")]
    ConfigError(String),

    #[error("Parse error: {0}")]
    ParseError(String),

    #[error("HTTP error: {0}")]
    HttpError(String),

    #[error("DataFrame error: {0}")]
    DataFrameError(#[from] PolarsError),

    #[error("Plot error: {0}")]
    PlotError(String),

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("Serde error: {0}")]
    SerdeError(#[from] serde_json::Error),

    #[error("{0}")]
    Other(String),
}

impl RndError {
    pub fn invalid_input(msg: impl Into<String>) -> Self {
        Self::InvalidInput(msg.into())
    }
}

pub type Result<T> = std::result::Result<T, RndError>;
