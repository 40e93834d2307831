use crate::error::{Result, RndError};
use crate::models::{DensitySurface, MarketQuote, PriceSeries};
use crate::qualifiers::QualifierOutput;
use crate::utils::polars_utils::*;
use chrono::NaiveDate;
use polars::prelude::DataFrame;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use tracing::{debug, info};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum StoreFormat {
    #[default]
    Parquet,
    Csv,
    /// Arrow IPC
    Ipc,
}

impl StoreFormat {
    pub fn extension(&self) -> &'static str {
        match self {
            StoreFormat::Parquet => "parquet",
            StoreFormat::Csv => "csv",
            StoreFormat::Ipc => "arrow",
        }
    }
}

impl FromStr for StoreFormat {
    type Err = RndError;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_lowercase().as_str() {
            "parquet" => Ok(StoreFormat::Parquet),
            "csv" => Ok(StoreFormat::Csv),
            "ipc" | "arrow" => Ok(StoreFormat::Ipc),
            other => Err(RndError::ParseError(format!("Unknown store format '{}'", other))),
        }
    }
}

/// Raw downloads vs derived data
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    Raw,
    Processed,
}

impl Stage {
    fn dir(&self) -> &'static str {
        match self {
            Stage::Raw => "raw",
            Stage::Processed => "processed",
        }
    }
}

/// Date-partitioned on-disk store:
/// `{base}/{stage}/{category}/{SYMBOL}/{kind}_{YYYYMMDD}.{ext}`
#[derive(Debug, Clone)]
pub struct FileStore {
    base_path: PathBuf,
    format: StoreFormat,
}

impl FileStore {
    pub fn new(base_path: impl Into<PathBuf>, format: StoreFormat) -> Self {
        Self {
            base_path: base_path.into(),
            format,
        }
    }

    pub fn base_path(&self) -> &Path {
        &self.base_path
    }

    pub fn format(&self) -> StoreFormat {
        self.format
    }

    /// Location of a file; does not touch the filesystem.
    pub fn path_for(
        &self,
        stage: Stage,
        category: &str,
        symbol: &str,
        kind: &str,
        trade_date: NaiveDate,
    ) -> PathBuf {
        self.base_path
            .join(stage.dir())
            .join(category)
            .join(symbol.to_ascii_uppercase())
            .join(format!(
                "{}_{}.{}",
                kind,
                trade_date.format("%Y%m%d"),
                self.format.extension()
            ))
    }

    fn write(&self, df: &DataFrame, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        match self.format {
            StoreFormat::Parquet => cache_dataframe_to_parquet(df, path)?,
            StoreFormat::Csv => cache_dataframe_to_csv(df, path)?,
            StoreFormat::Ipc => cache_dataframe_to_ipc(df, path)?,
        }
        debug!("Wrote {} rows to {}", df.height(), path.display());
        Ok(())
    }

    fn read(&self, path: &Path) -> Result<Option<DataFrame>> {
        if !path.exists() {
            return Ok(None);
        }
        let df = match self.format {
            StoreFormat::Parquet => load_dataframe_from_parquet(path)?,
            StoreFormat::Csv => load_dataframe_from_csv(path)?,
            StoreFormat::Ipc => load_dataframe_from_ipc(path)?,
        };
        Ok(Some(df))
    }

    pub fn save_chain(
        &self,
        quotes: &[MarketQuote],
        symbol: &str,
        trade_date: NaiveDate,
        stage: Stage,
    ) -> Result<PathBuf> {
        let path = self.path_for(stage, "chains", symbol, "options_chain", trade_date);
        self.write(&quotes_to_dataframe(quotes)?, &path)?;
        info!("Saved {} quotes for {} to {}", quotes.len(), symbol, path.display());
        Ok(path)
    }

    /// `Ok(None)` when nothing was stored for that day.
    pub fn load_chain(
        &self,
        symbol: &str,
        trade_date: NaiveDate,
        stage: Stage,
    ) -> Result<Option<Vec<MarketQuote>>> {
        let path = self.path_for(stage, "chains", symbol, "options_chain", trade_date);
        match self.read(&path)? {
            Some(df) => Ok(Some(dataframe_to_quotes(&df)?)),
            None => {
                debug!("No stored chain at {}", path.display());
                Ok(None)
            }
        }
    }

    pub fn save_surface(&self, surface: &DensitySurface, trade_date: NaiveDate) -> Result<PathBuf> {
        let path = self.path_for(
            Stage::Processed,
            "surfaces",
            &surface.symbol,
            "rnd_surface",
            trade_date,
        );
        self.write(&surface_to_dataframe(surface)?, &path)?;
        Ok(path)
    }

    pub fn save_qualifiers(
        &self,
        prices: &PriceSeries,
        outputs: &[(String, QualifierOutput)],
        symbol: &str,
        trade_date: NaiveDate,
    ) -> Result<PathBuf> {
        let path = self.path_for(Stage::Processed, "qualifiers", symbol, "qualifiers", trade_date);
        self.write(&qualifier_outputs_to_dataframe(prices, outputs)?, &path)?;
        Ok(path)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{OptionContract, OptionType};

    fn quotes(expiry: NaiveDate) -> Vec<MarketQuote> {
        [540.0, 550.0, 560.0]
            .iter()
            .map(|&k| {
                MarketQuote::new(
                    OptionContract::new("SPY".into(), OptionType::Call, k, expiry),
                    5.0,
                    5.5,
                    5.2,
                    100,
                    1000,
                )
            })
            .collect()
    }

    #[test]
    fn layout_matches_partitioning() {
        let store = FileStore::new("/data", StoreFormat::Parquet);
        let d = NaiveDate::from_ymd_opt(2025, 3, 7).unwrap();
        assert_eq!(
            store.path_for(Stage::Raw, "chains", "spy", "options_chain", d),
            PathBuf::from("/data/raw/chains/SPY/options_chain_20250307.parquet")
        );
    }

    #[test]
    fn chain_round_trip_in_every_format() {
        let trade_date = NaiveDate::from_ymd_opt(2025, 3, 7).unwrap();
        let expiry = NaiveDate::from_ymd_opt(2025, 6, 20).unwrap();
        for format in [StoreFormat::Parquet, StoreFormat::Csv, StoreFormat::Ipc] {
            let dir = tempfile::tempdir().unwrap();
            let store = FileStore::new(dir.path(), format);
            let path = store
                .save_chain(&quotes(expiry), "SPY", trade_date, Stage::Raw)
                .unwrap();
            assert!(path.exists());

            let loaded = store.load_chain("SPY", trade_date, Stage::Raw).unwrap().unwrap();
            assert_eq!(loaded.len(), 3);
            assert_eq!(loaded[1].contract.strike, 550.0);
            assert_eq!(loaded[1].contract.expiry, expiry);
            assert_eq!(loaded[1].open_interest, 1000);
        }
    }

    #[test]
    fn missing_chain_is_none() {
        let dir = tempfile::tempdir().unwrap();
        let store = FileStore::new(dir.path(), StoreFormat::Csv);
        let d = NaiveDate::from_ymd_opt(2025, 3, 7).unwrap();
        assert!(store.load_chain("SPY", d, Stage::Raw).unwrap().is_none());
    }

    #[test]
    fn format_names() {
        assert_eq!("CSV".parse::<StoreFormat>().unwrap(), StoreFormat::Csv);
        assert_eq!("arrow".parse::<StoreFormat>().unwrap(), StoreFormat::Ipc);
        assert!("xlsx".parse::<StoreFormat>().is_err());
    }
}
