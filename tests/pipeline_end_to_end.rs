//! End-to-end pipeline runs on a synthetic Black-Scholes market

use approx::assert_relative_eq;
use chrono::{Duration, NaiveDate};
use rnd_surface::config::PipelineConfig;
use rnd_surface::models::{MarketQuote, OptionContract, OptionType};
use rnd_surface::pipeline::RndPipeline;
use rnd_surface::utils::{black_scholes, years_to_expiry, FileStore, Stage, StoreFormat};

const SPOT: f64 = 100.0;
const RATE: f64 = 0.05;
const SIGMA: f64 = 0.2;

fn trade_date() -> NaiveDate {
    NaiveDate::from_ymd_opt(2025, 1, 2).unwrap()
}

/// Calls and puts at every strike from 80 to 120, quoted ±1% around model value
fn market(expiry_days: &[i64]) -> Vec<MarketQuote> {
    let strikes: Vec<f64> = (0..17).map(|i| 80.0 + 2.5 * i as f64).collect();
    market_at(expiry_days, &strikes)
}

fn market_at(expiry_days: &[i64], strikes: &[f64]) -> Vec<MarketQuote> {
    let mut quotes = Vec::new();
    for &days in expiry_days {
        let expiry = trade_date() + Duration::days(days);
        let t = years_to_expiry(expiry, trade_date());
        for &k in strikes {
            for kind in [OptionType::Call, OptionType::Put] {
                let value = black_scholes::price(SPOT, k, t, RATE, SIGMA, kind == OptionType::Call);
                let contract = OptionContract::new("SYN".to_string(), kind, k, expiry);
                quotes.push(MarketQuote::new(contract, value * 0.99, value * 1.01, value, 500, 2000));
            }
        }
    }
    quotes
}

#[test]
fn synthetic_market_produces_clean_surface() {
    let quotes = market(&[7, 60, 120, 400]);
    let pipeline = RndPipeline::new(PipelineConfig {
        risk_free_rate: RATE,
        ..PipelineConfig::default()
    });
    let report = pipeline.run("SYN", trade_date(), Some(SPOT), &quotes);

    assert!(report.success, "errors: {:?}", report.errors);
    // 7 and 400 days fall outside the default 30..180 DTE window
    assert_eq!(report.num_expiries(), 2);
    assert!(report.errors.is_empty());
    assert!(report.failures.is_empty());

    for r in &report.results {
        // 16 OTM strikes plus the at-the-money call
        assert_eq!(r.quality.num_otm, 17);
        assert_eq!(r.slice.len(), 15);
        assert_eq!(r.slice.clamped_points, 0);
        assert!(r.arbitrage.is_valid);

        // truncated to roughly ±2σ, so only loose bounds on the moments
        let stats = r.stats.as_ref().expect("15 points are enough for statistics");
        let mean = stats.mean();
        assert!(mean > 97.0 && mean < 104.0, "mean {}", mean);
        let below = stats.probability_below(SPOT);
        assert!(below > 0.3 && below < 0.7, "P(S<spot) {}", below);
        assert_relative_eq!(
            stats.probability_below(SPOT) + stats.probability_above(SPOT),
            1.0,
            epsilon = 1e-12
        );
    }

    let surface = report.surface();
    assert_eq!(surface.slices.len(), 2);
    assert!(surface.slices[0].expiry < surface.slices[1].expiry);
    // the longer expiry spreads its mass wider
    let std = |i: usize| report.results[i].stats.as_ref().map_or(0.0, |s| s.std());
    assert!(std(1) > std(0));

    let (strikes, expiries, grid) = surface.to_grid();
    assert_eq!(expiries.len(), 2);
    assert_eq!(strikes.len(), 15);
    assert_eq!(grid.dim(), (2, 15));
}

#[test]
fn missing_spot_falls_back_to_median_strike() {
    let pipeline = RndPipeline::new(PipelineConfig {
        risk_free_rate: RATE,
        ..PipelineConfig::default()
    });
    let report = pipeline.run("SYN", trade_date(), None, &market(&[60]));

    assert!(report.success, "errors: {:?}", report.errors);
    // 34 cleaned quotes, two per strike; the 18th sorted strike is 100
    assert_eq!(report.spot, Some(100.0));
    assert_eq!(report.results[0].quality.spot, 100.0);
    assert_eq!(report.results[0].quality.num_otm, 17);
}

#[test]
fn three_strike_expiry_keeps_its_single_point() {
    let quotes = market_at(&[60], &[95.0, 100.0, 105.0]);
    let pipeline = RndPipeline::new(PipelineConfig {
        risk_free_rate: RATE,
        min_quotes_per_expiry: 3,
        ..PipelineConfig::default()
    });
    let report = pipeline.run("SYN", trade_date(), Some(SPOT), &quotes);

    assert!(report.success, "errors: {:?}", report.errors);
    assert!(report.failures.is_empty());
    assert_eq!(report.num_expiries(), 1);

    let r = &report.results[0];
    // 95 put through parity, 100 call as the ATM fill, 105 call
    assert_eq!(r.quality.num_otm, 3);
    assert_eq!(r.slice.strikes(), vec![100.0]);
    assert!(r.slice.points[0].density > 0.0);
    assert!(r.stats.is_none());
    assert!(report.errors.iter().any(|e| e.contains("Too few density points")));
    assert!(!report.errors.iter().any(|e| e.contains("need at least 3 strikes")));

    assert_eq!(report.surface().slices.len(), 1);
}

#[test]
fn thin_expiries_are_skipped() {
    let quotes = market(&[60]);
    let pipeline = RndPipeline::new(PipelineConfig {
        risk_free_rate: RATE,
        min_quotes_per_expiry: 50,
        ..PipelineConfig::default()
    });
    let report = pipeline.run("SYN", trade_date(), Some(SPOT), &quotes);
    assert!(!report.success);
    assert_eq!(report.num_expiries(), 0);
}

#[test]
fn empty_and_illiquid_chains_fail_softly() {
    let pipeline = RndPipeline::new(PipelineConfig::default());
    let report = pipeline.run("SYN", trade_date(), Some(SPOT), &[]);
    assert!(!report.success);
    assert_eq!(report.errors.len(), 1);

    let illiquid: Vec<MarketQuote> = market(&[60])
        .into_iter()
        .map(|mut q| {
            q.volume = 0;
            q
        })
        .collect();
    let report = pipeline.run("SYN", trade_date(), Some(SPOT), &illiquid);
    assert!(!report.success);
}

#[test]
fn stored_chain_feeds_the_pipeline() {
    let dir = tempfile::tempdir().unwrap();
    let store = FileStore::new(dir.path(), StoreFormat::Parquet);
    let quotes = market(&[60, 90]);
    store.save_chain(&quotes, "SYN", trade_date(), Stage::Raw).unwrap();

    let loaded = store
        .load_chain("SYN", trade_date(), Stage::Raw)
        .unwrap()
        .expect("chain was just stored");
    assert_eq!(loaded.len(), quotes.len());

    let pipeline = RndPipeline::new(PipelineConfig {
        risk_free_rate: RATE,
        ..PipelineConfig::default()
    });
    let report = pipeline.run("SYN", trade_date(), Some(SPOT), &loaded);
    assert!(report.success);

    let path = store.save_surface(&report.surface(), trade_date()).unwrap();
    assert!(path.ends_with("processed/surfaces/SYN/rnd_surface_20250102.parquet"));
    assert!(path.exists());
}
