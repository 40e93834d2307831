//! rnd-surface command line
//!
//! 1. `fetch` downloads an end-of-day option chain and stores it raw
//! 2. `surface` runs the density pipeline on a stored (or freshly fetched) chain
//! 3. `qualify` derives qualifier series from a daily price CSV

use chrono::NaiveDate;
use clap::{Parser, Subcommand};
use rnd_surface::api::{available_expiries, EodClient};
use rnd_surface::config::Config;
use rnd_surface::error::{Result, RndError};
use rnd_surface::models::MarketQuote;
use rnd_surface::pipeline::{PipelineReport, RndPipeline};
use rnd_surface::qualifiers::{
    apply_qualifiers, AdjustedReturns, DrawdownDays, GoldAdjusted, InflationAdjusted, MovingAverage,
    QualifierKind,
};
use rnd_surface::utils::polars_utils::{
    cache_dataframe_to_csv, qualifier_outputs_to_dataframe, read_price_series_csv, summarize_quotes_lazy,
};
use rnd_surface::utils::{plot_density_heatmap, plot_density_slice, plot_price_overlays, FileStore, Stage, StoreFormat};
use std::path::{Path, PathBuf};
use tracing::{info, warn};

#[derive(Parser)]
#[command(author, version, about, long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Override the file store root (defaults to DATA_DIR)
    #[arg(long, global = true)]
    data_dir: Option<PathBuf>,

    /// Storage format: parquet, csv or ipc
    #[arg(long, global = true, default_value = "parquet")]
    format: StoreFormat,
}

#[derive(Subcommand)]
enum Commands {
    /// Download an end-of-day option chain and store it under raw/
    Fetch {
        #[arg(short, long, default_value = "SPY")]
        symbol: String,
        /// Trade date (YYYY-MM-DD)
        #[arg(short, long)]
        date: NaiveDate,
        /// Only keep this expiry
        #[arg(long)]
        expiry: Option<NaiveDate>,
    },
    /// Build the risk-neutral density surface for one trade date
    Surface {
        #[arg(short, long, default_value = "SPY")]
        symbol: String,
        #[arg(short, long)]
        date: NaiveDate,
        /// Underlying price; fetched (or approximated by the median strike) when omitted
        #[arg(long)]
        spot: Option<f64>,
        /// Download the chain when it is not in the store
        #[arg(long, default_value_t = false)]
        fetch: bool,
        /// Write PNG plots into this directory
        #[arg(long)]
        plot_dir: Option<PathBuf>,
    },
    /// Apply qualifiers to a daily price CSV (`date`, `close` columns)
    Qualify {
        /// Price CSV
        #[arg(short, long)]
        prices: PathBuf,
        /// CPI CSV for inflation adjustment
        #[arg(long)]
        cpi: Option<PathBuf>,
        /// Gold price CSV
        #[arg(long)]
        gold: Option<PathBuf>,
        /// Moving average window in days
        #[arg(long, default_value_t = 100)]
        window: usize,
        /// Output CSV; defaults to the processed/qualifiers store location
        #[arg(short, long)]
        output: Option<PathBuf>,
        /// Chart of prices and overlay qualifiers
        #[arg(long)]
        plot: Option<PathBuf>,
    },
}

async fn fetch_chain(
    config: &Config,
    store: &FileStore,
    symbol: &str,
    date: NaiveDate,
    expiry: Option<NaiveDate>,
) -> Result<Vec<MarketQuote>> {
    let client = EodClient::new(config.eod.clone())?;
    let quotes = client.get_option_chain(symbol, date, expiry).await?;
    if quotes.is_empty() {
        return Err(RndError::Other(format!("No option data for {} on {}", symbol, date)));
    }
    store.save_chain(&quotes, symbol, date, Stage::Raw)?;
    Ok(quotes)
}

fn print_report(report: &PipelineReport) {
    println!("{} {}", report.symbol, report.trade_date);
    if let Some(spot) = report.spot {
        println!("spot: {:.2}", spot);
    }
    println!(
        "{:<12} {:>6} {:>10} {:>10} {:>8} {:>8} {:>7}",
        "expiry", "points", "mean", "std", "skew", "kurt", "quality"
    );
    for r in &report.results {
        match &r.stats {
            Some(stats) => println!(
                "{:<12} {:>6} {:>10.2} {:>10.2} {:>8.3} {:>8.3} {:>7}",
                r.slice.expiry,
                r.slice.len(),
                stats.moments.mean,
                stats.moments.std,
                stats.moments.skewness,
                stats.moments.kurtosis,
                r.quality.quality_label()
            ),
            None => println!(
                "{:<12} {:>6} {:>10} {:>10} {:>8} {:>8} {:>7}",
                r.slice.expiry,
                r.slice.len(),
                "-",
                "-",
                "-",
                "-",
                r.quality.quality_label()
            ),
        }
    }
    for e in &report.errors {
        println!("  ! {}", e);
    }
}

async fn run_surface(
    config: &Config,
    store: &FileStore,
    symbol: &str,
    date: NaiveDate,
    spot: Option<f64>,
    fetch: bool,
    plot_dir: Option<&Path>,
) -> Result<()> {
    let quotes = match store.load_chain(symbol, date, Stage::Raw)? {
        Some(q) => q,
        None if fetch => fetch_chain(config, store, symbol, date, None).await?,
        None => {
            return Err(RndError::Other(format!(
                "No stored chain for {} on {}; rerun with --fetch",
                symbol, date
            )))
        }
    };
    info!("Loaded {} quotes for {} on {}", quotes.len(), symbol, date);

    let spot = match spot {
        Some(s) => Some(s),
        None if config.eod.api_key.is_some() => {
            let client = EodClient::new(config.eod.clone())?;
            match client.get_spot_price(symbol, date).await {
                Ok(s) => s,
                Err(e) => {
                    warn!("Spot lookup failed, falling back to median strike: {}", e);
                    None
                }
            }
        }
        None => None,
    };

    let pipeline = RndPipeline::new(config.pipeline.clone());
    let report = pipeline.run(symbol, date, spot, &quotes);
    print_report(&report);
    if !report.success {
        return Err(RndError::Other(report.errors.join("; ")));
    }

    let surface = report.surface();
    let path = store.save_surface(&surface, date)?;
    println!("surface saved to {}", path.display());

    if let Some(dir) = plot_dir {
        std::fs::create_dir_all(dir)?;
        let tag = format!("{}_{}", symbol, date.format("%Y%m%d"));
        plot_density_heatmap(&surface, dir.join(format!("rnd_heatmap_{}.png", tag)))?;
        for slice in &surface.slices {
            let name = format!("rnd_{}_{}.png", tag, slice.expiry.format("%Y%m%d"));
            plot_density_slice(slice, dir.join(name))?;
        }
    }
    Ok(())
}

fn run_qualify(
    store: &FileStore,
    prices_path: &Path,
    cpi: Option<&Path>,
    gold: Option<&Path>,
    window: usize,
    output: Option<&Path>,
    plot: Option<&Path>,
) -> Result<()> {
    let prices = read_price_series_csv(prices_path)?;
    let last_date = *prices
        .dates
        .last()
        .ok_or_else(|| RndError::invalid_input(format!("{} has no rows", prices_path.display())))?;
    let symbol = prices_path
        .file_stem()
        .map(|s| s.to_string_lossy().to_string())
        .unwrap_or_else(|| "prices".to_string());

    let cpi = cpi.map(read_price_series_csv).transpose()?;
    let gold = gold.map(read_price_series_csv).transpose()?;

    let mut qualifiers = vec![
        QualifierKind::MovingAverage(MovingAverage::new(window)),
        QualifierKind::DrawdownDays(DrawdownDays),
    ];
    if let Some(cpi) = &cpi {
        qualifiers.push(QualifierKind::InflationAdjusted(InflationAdjusted::new(cpi.clone())));
    }
    if let Some(gold) = &gold {
        qualifiers.push(QualifierKind::GoldAdjusted(GoldAdjusted::new(gold.clone())));
    }
    if let (Some(cpi), Some(gold)) = (cpi, gold) {
        qualifiers.push(QualifierKind::AdjustedReturns(AdjustedReturns::new(cpi, gold)));
    }

    let outputs: Vec<_> = apply_qualifiers(&prices, &qualifiers)
        .into_iter()
        .filter_map(|(name, out)| match out {
            Ok(o) => {
                println!("{:<20} {}", name, o.label);
                Some((name, o))
            }
            Err(e) => {
                println!("{:<20} failed: {}", name, e);
                None
            }
        })
        .collect();

    let path = match output {
        Some(path) => {
            cache_dataframe_to_csv(&qualifier_outputs_to_dataframe(&prices, &outputs)?, path)?;
            path.to_path_buf()
        }
        None => store.save_qualifiers(&prices, &outputs, &symbol, last_date)?,
    };
    println!("qualifiers written to {}", path.display());

    if let Some(plot) = plot {
        plot_price_overlays(&symbol, &prices, &outputs, plot)?;
    }
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let config = Config::from_env()?;
    config.init_logging()?;

    let data_dir = cli.data_dir.clone().unwrap_or_else(|| config.data_dir.clone());
    let store = FileStore::new(data_dir, cli.format);

    match cli.command {
        Commands::Fetch { symbol, date, expiry } => {
            let quotes = fetch_chain(&config, &store, &symbol, date, expiry).await?;
            let expiries = available_expiries(&quotes);
            println!("{} expiries, {} quotes", expiries.len(), quotes.len());
            println!("{}", summarize_quotes_lazy(&quotes)?);
        }
        Commands::Surface {
            symbol,
            date,
            spot,
            fetch,
            plot_dir,
        } => {
            run_surface(&config, &store, &symbol, date, spot, fetch, plot_dir.as_deref()).await?;
        }
        Commands::Qualify {
            prices,
            cpi,
            gold,
            window,
            output,
            plot,
        } => {
            run_qualify(
                &store,
                &prices,
                cpi.as_deref(),
                gold.as_deref(),
                window,
                output.as_deref(),
                plot.as_deref(),
            )?;
        }
    }

    Ok(())
}
