use crate::error::{Result, RndError};
use crate::models::{DensitySurface, Greeks, MarketQuote, OptionContract, OptionType, PriceSeries};
use crate::qualifiers::QualifierOutput;
use crate::utils::parse_date;
use polars::prelude::*;
use std::fs::File;
use std::path::Path;

const DATE_FMT: &str = "%Y-%m-%d";

fn f64_column(df: &DataFrame, name: &str) -> Result<Vec<Option<f64>>> {
    let s = df.column(name)?.cast(&DataType::Float64)?;
    let values = s.f64()?.into_iter().collect();
    Ok(values)
}

/// Like [`f64_column`], but all-null when the column is absent (frames stored
/// before the column existed).
fn optional_f64_column(df: &DataFrame, name: &str) -> Result<Vec<Option<f64>>> {
    if df.get_column_names().contains(&name) {
        f64_column(df, name)
    } else {
        Ok(vec![None; df.height()])
    }
}

fn i64_column(df: &DataFrame, name: &str) -> Result<Vec<Option<i64>>> {
    let s = df.column(name)?.cast(&DataType::Int64)?;
    let values = s.i64()?.into_iter().collect();
    Ok(values)
}

fn str_column(df: &DataFrame, name: &str) -> Result<Vec<Option<String>>> {
    let s = df.column(name)?.cast(&DataType::Utf8)?;
    let values = s.utf8()?.into_iter().map(|v| v.map(str::to_string)).collect();
    Ok(values)
}

/// Convert market quotes to a Polars DataFrame, one row per contract
pub fn quotes_to_dataframe(quotes: &[MarketQuote]) -> Result<DataFrame> {
    if quotes.is_empty() {
        return Err(RndError::invalid_input("Cannot create DataFrame from empty quotes"));
    }

    let mut symbols = Vec::with_capacity(quotes.len());
    let mut option_symbols = Vec::with_capacity(quotes.len());
    let mut option_types = Vec::with_capacity(quotes.len());
    let mut strikes = Vec::with_capacity(quotes.len());
    let mut expiries = Vec::with_capacity(quotes.len());
    let mut bids = Vec::with_capacity(quotes.len());
    let mut asks = Vec::with_capacity(quotes.len());
    let mut last_prices = Vec::with_capacity(quotes.len());
    let mut volumes = Vec::with_capacity(quotes.len());
    let mut open_interests = Vec::with_capacity(quotes.len());
    let mut implied_vols = Vec::with_capacity(quotes.len());
    let mut deltas = Vec::with_capacity(quotes.len());
    let mut gammas = Vec::with_capacity(quotes.len());
    let mut thetas = Vec::with_capacity(quotes.len());
    let mut vegas = Vec::with_capacity(quotes.len());

    for quote in quotes {
        symbols.push(quote.contract.symbol.clone());
        option_symbols.push(quote.contract.option_symbol.clone());
        option_types.push(quote.contract.option_type.to_string());
        strikes.push(quote.contract.strike);
        expiries.push(quote.contract.expiry.format(DATE_FMT).to_string());
        bids.push(quote.bid);
        asks.push(quote.ask);
        last_prices.push(quote.last);
        volumes.push(quote.volume as i64);
        open_interests.push(quote.open_interest as i64);
        implied_vols.push(quote.implied_vol);
        deltas.push(quote.greeks.delta);
        gammas.push(quote.greeks.gamma);
        thetas.push(quote.greeks.theta);
        vegas.push(quote.greeks.vega);
    }

    let df = DataFrame::new(vec![
        Series::new("symbol", symbols),
        Series::new("option_symbol", option_symbols),
        Series::new("option_type", option_types),
        Series::new("strike", strikes),
        Series::new("expiry", expiries),
        Series::new("bid", bids),
        Series::new("ask", asks),
        Series::new("last", last_prices),
        Series::new("volume", volumes),
        Series::new("open_interest", open_interests),
        Series::new("implied_vol", implied_vols),
        Series::new("delta", deltas),
        Series::new("gamma", gammas),
        Series::new("theta", thetas),
        Series::new("vega", vegas),
    ])?;

    Ok(df)
}

/// Convert a DataFrame written by [`quotes_to_dataframe`] back into quotes.
///
/// Numeric columns are cast on the way in, so frames that went through CSV
/// (where an all-null column is inferred as text) load the same as Parquet.
pub fn dataframe_to_quotes(df: &DataFrame) -> Result<Vec<MarketQuote>> {
    let symbols = str_column(df, "symbol")?;
    let option_symbols = str_column(df, "option_symbol")?;
    let option_types = str_column(df, "option_type")?;
    let strikes = f64_column(df, "strike")?;
    let expiries = str_column(df, "expiry")?;
    let bids = f64_column(df, "bid")?;
    let asks = f64_column(df, "ask")?;
    let lasts = f64_column(df, "last")?;
    let volumes = i64_column(df, "volume")?;
    let open_interests = i64_column(df, "open_interest")?;
    let implied_vols = f64_column(df, "implied_vol")?;
    let deltas = optional_f64_column(df, "delta")?;
    let gammas = optional_f64_column(df, "gamma")?;
    let thetas = optional_f64_column(df, "theta")?;
    let vegas = optional_f64_column(df, "vega")?;
    let finite = |v: Option<f64>| v.filter(|x| x.is_finite());

    let mut quotes = Vec::with_capacity(df.height());
    for i in 0..df.height() {
        let option_type: OptionType = option_types[i]
            .as_deref()
            .ok_or_else(|| RndError::ParseError(format!("row {}: missing option_type", i)))?
            .parse()?;
        let strike = strikes[i]
            .ok_or_else(|| RndError::ParseError(format!("row {}: missing strike", i)))?;
        let expiry = parse_date(
            expiries[i]
                .as_deref()
                .ok_or_else(|| RndError::ParseError(format!("row {}: missing expiry", i)))?,
        )?;

        let mut contract = OptionContract::new(
            symbols[i].clone().unwrap_or_default(),
            option_type,
            strike,
            expiry,
        );
        if let Some(occ) = option_symbols[i].clone().filter(|s| !s.is_empty()) {
            contract.option_symbol = occ;
        }

        let quote = MarketQuote::new(
            contract,
            bids[i].unwrap_or(0.0),
            asks[i].unwrap_or(0.0),
            lasts[i].unwrap_or(0.0),
            volumes[i].unwrap_or(0).max(0) as u64,
            open_interests[i].unwrap_or(0).max(0) as u64,
        )
        .with_implied_vol(finite(implied_vols[i]))
        .with_greeks(Greeks {
            delta: finite(deltas[i]),
            gamma: finite(gammas[i]),
            theta: finite(thetas[i]),
            vega: finite(vegas[i]),
        });
        quotes.push(quote);
    }

    Ok(quotes)
}

/// Long-format surface: one row per (expiry, strike) density estimate
pub fn surface_to_dataframe(surface: &DensitySurface) -> Result<DataFrame> {
    let mut expiries = Vec::new();
    let mut times = Vec::new();
    let mut strikes = Vec::new();
    let mut densities = Vec::new();

    for slice in &surface.slices {
        for point in &slice.points {
            expiries.push(slice.expiry.format(DATE_FMT).to_string());
            times.push(slice.time_to_expiry);
            strikes.push(point.strike);
            densities.push(point.density);
        }
    }

    let n = strikes.len();
    let df = DataFrame::new(vec![
        Series::new("symbol", vec![surface.symbol.as_str(); n]),
        Series::new("expiry", expiries),
        Series::new("time_to_expiry", times),
        Series::new("strike", strikes),
        Series::new("density", densities),
    ])?;
    Ok(df)
}

/// Build a [`PriceSeries`] from a frame with a date column and a value column.
/// Rows with a missing value are dropped.
pub fn dataframe_to_price_series(df: &DataFrame, date_col: &str, value_col: &str) -> Result<PriceSeries> {
    let dates = str_column(df, date_col)?;
    let values = f64_column(df, value_col)?;
    let mut pairs = Vec::with_capacity(dates.len());
    for (d, v) in dates.into_iter().zip(values) {
        if let (Some(d), Some(v)) = (d, v) {
            pairs.push((parse_date(&d)?, v));
        }
    }
    PriceSeries::from_pairs(pairs)
}

/// Find a column by case-insensitive name among `candidates`
fn find_column(df: &DataFrame, candidates: &[&str]) -> Option<String> {
    df.get_column_names()
        .into_iter()
        .find(|name| candidates.iter().any(|c| name.eq_ignore_ascii_case(c)))
        .map(str::to_string)
}

/// Read a daily price CSV with a `date` column and a `close` (or `adjusted_close`/`value`) column.
pub fn read_price_series_csv(path: &Path) -> Result<PriceSeries> {
    let df = load_dataframe_from_csv(path)?;
    let date_col = find_column(&df, &["date"])
        .ok_or_else(|| RndError::ParseError(format!("{}: no date column", path.display())))?;
    let value_col = find_column(&df, &["adjusted_close", "adj_close", "close", "value"])
        .ok_or_else(|| RndError::ParseError(format!("{}: no close column", path.display())))?;
    dataframe_to_price_series(&df, &date_col, &value_col)
}

/// Prices plus every qualifier series as columns named `{qualifier}.{series}`
pub fn qualifier_outputs_to_dataframe(
    prices: &PriceSeries,
    outputs: &[(String, QualifierOutput)],
) -> Result<DataFrame> {
    let mut columns = vec![
        Series::new(
            "date",
            prices
                .dates
                .iter()
                .map(|d| d.format(DATE_FMT).to_string())
                .collect::<Vec<_>>(),
        ),
        Series::new("close", prices.values.clone()),
    ];
    for (name, output) in outputs {
        for s in &output.series {
            if s.values.len() != prices.len() {
                return Err(RndError::invalid_input(format!(
                    "{}.{} has {} values for {} dates",
                    name,
                    s.name,
                    s.values.len(),
                    prices.len()
                )));
            }
            columns.push(Series::new(&format!("{}.{}", name, s.name), s.values.clone()));
        }
    }
    Ok(DataFrame::new(columns)?)
}

/// Per-expiry liquidity summary of a raw chain, computed lazily
pub fn summarize_quotes_lazy(quotes: &[MarketQuote]) -> Result<DataFrame> {
    let df = quotes_to_dataframe(quotes)?;

    let summary = df
        .lazy()
        .filter(col("bid").gt(lit(0.0)).and(col("ask").gt(lit(0.0))))
        .with_columns([
            ((col("bid") + col("ask")) / lit(2.0)).alias("mid_price"),
            ((col("ask") - col("bid")) / ((col("bid") + col("ask")) / lit(2.0))).alias("spread_pct"),
        ])
        .group_by([col("expiry"), col("option_type")])
        .agg([
            col("option_symbol").count().alias("num_contracts"),
            col("strike").min().alias("min_strike"),
            col("strike").max().alias("max_strike"),
            col("spread_pct").mean().alias("avg_spread_pct"),
            col("volume").sum().alias("total_volume"),
        ])
        .sort_by_exprs(vec![col("expiry"), col("option_type")], vec![false, false], false, false)
        .collect()?;

    Ok(summary)
}

pub fn cache_dataframe_to_parquet(df: &DataFrame, path: &Path) -> Result<()> {
    let file = File::create(path)?;
    let mut df_mut = df.clone();
    ParquetWriter::new(file).finish(&mut df_mut)?;
    Ok(())
}

pub fn load_dataframe_from_parquet(path: &Path) -> Result<DataFrame> {
    let file = File::open(path)?;
    Ok(ParquetReader::new(file).finish()?)
}

pub fn cache_dataframe_to_csv(df: &DataFrame, path: &Path) -> Result<()> {
    let mut file = File::create(path)?;
    let mut df_mut = df.clone();
    CsvWriter::new(&mut file).finish(&mut df_mut)?;
    Ok(())
}

pub fn load_dataframe_from_csv(path: &Path) -> Result<DataFrame> {
    Ok(CsvReader::from_path(path)?.has_header(true).finish()?)
}

/// Arrow IPC (Feather v2)
pub fn cache_dataframe_to_ipc(df: &DataFrame, path: &Path) -> Result<()> {
    let file = File::create(path)?;
    let mut df_mut = df.clone();
    IpcWriter::new(file).finish(&mut df_mut)?;
    Ok(())
}

pub fn load_dataframe_from_ipc(path: &Path) -> Result<DataFrame> {
    let file = File::open(path)?;
    Ok(IpcReader::new(file).finish()?)
}
