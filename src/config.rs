use crate::error::{Result, RndError};
use dotenv::dotenv;
use serde::Deserialize;
use std::env;
use std::path::PathBuf;
use std::str::FromStr;

/// Configuration for the EOD Historical Data API
#[derive(Debug, Clone, Deserialize)]
pub struct EodConfig {
    /// EOD API token; only needed when fetching
    pub api_key: Option<String>,
    /// EOD API base URL
    pub base_url: String,
}

impl EodConfig {
    pub fn new(api_key: impl Into<String>) -> Self {
        Self {
            api_key: Some(api_key.into()),
            base_url: "https://eodhistoricaldata.com/api".to_string(),
        }
    }

    pub fn require_api_key(&self) -> Result<&str> {
        self.api_key.as_deref().ok_or_else(|| {
            RndError::ConfigError("EOD_API_KEY environment variable not set".to_string())
        })
    }
}

/// Parameters of the density pipeline
#[derive(Debug, Clone, Deserialize)]
pub struct PipelineConfig {
    /// Continuously compounded risk-free rate
    pub risk_free_rate: f64,
    /// Shortest days-to-expiry kept by the cleaner
    pub min_dte: i64,
    /// Longest days-to-expiry kept by the cleaner
    pub max_dte: i64,
    /// Expiries with fewer OTM quotes than this are skipped
    pub min_quotes_per_expiry: usize,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            risk_free_rate: 0.05,
            min_dte: 30,
            max_dte: 180,
            min_quotes_per_expiry: 10,
        }
    }
}

/// Configuration for the application
#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    /// EOD API configuration
    pub eod: EodConfig,
    /// Pipeline parameters
    pub pipeline: PipelineConfig,
    /// Root directory of the file store
    pub data_dir: PathBuf,
    /// Log level
    pub log_level: String,
}

fn env_or<T: FromStr>(key: &str, default: T) -> Result<T> {
    match env::var(key) {
        Ok(raw) => raw.trim().parse::<T>().map_err(|_| {
            RndError::ConfigError(format!("{} has an invalid value: {}", key, raw))
        }),
        Err(_) => Ok(default),
    }
}

impl Config {
    /// Load configuration from environment variables
    pub fn from_env() -> Result<Self> {
        // Load .env file if it exists
        dotenv().ok();

        let defaults = PipelineConfig::default();

        let api_key = env::var("EOD_API_KEY").ok().filter(|k| !k.is_empty());
        let base_url = env::var("EOD_BASE_URL")
            .unwrap_or_else(|_| "https://eodhistoricaldata.com/api".to_string());
        let log_level = env::var("LOG_LEVEL").unwrap_or_else(|_| "info".to_string());
        let data_dir = env::var("DATA_DIR").unwrap_or_else(|_| "data".to_string());

        let pipeline = PipelineConfig {
            risk_free_rate: env_or("RISK_FREE_RATE", defaults.risk_free_rate)?,
            min_dte: env_or("MIN_DTE", defaults.min_dte)?,
            max_dte: env_or("MAX_DTE", defaults.max_dte)?,
            min_quotes_per_expiry: env_or("MIN_QUOTES_PER_EXPIRY", defaults.min_quotes_per_expiry)?,
        };

        if pipeline.min_dte > pipeline.max_dte {
            return Err(RndError::ConfigError(format!(
                "MIN_DTE ({}) exceeds MAX_DTE ({})",
                pipeline.min_dte, pipeline.max_dte
            )));
        }

        Ok(Config {
            eod: EodConfig { api_key, base_url },
            pipeline,
            data_dir: PathBuf::from(data_dir),
            log_level,
        })
    }

    /// Initialize logging based on configuration
    pub fn init_logging(&self) -> Result<()> {
        use tracing_subscriber::{fmt, EnvFilter};

        let filter =
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&self.log_level));

        // A subscriber may already be installed (tests, embedding applications).
        let _ = fmt().with_env_filter(filter).with_target(true).try_init();

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn pipeline_defaults_match_rnd_run() {
        let cfg = PipelineConfig::default();
        assert_eq!(cfg.min_dte, 30);
        assert_eq!(cfg.max_dte, 180);
        assert_eq!(cfg.min_quotes_per_expiry, 10);
        assert!((cfg.risk_free_rate - 0.05).abs() < 1e-12);
    }

    #[test]
    fn missing_api_key_is_a_config_error() {
        let cfg = EodConfig {
            api_key: None,
            base_url: "http://localhost".to_string(),
        };
        assert!(matches!(cfg.require_api_key(), Err(RndError::ConfigError(_))));
        assert_eq!(EodConfig::new("abc").require_api_key().unwrap(), "abc");
    }
}
