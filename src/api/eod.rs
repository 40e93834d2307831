use crate::config::EodConfig;
use crate::error::{Result, RndError};
use crate::models::{Greeks, MarketQuote, OptionContract, OptionType, PriceSeries};
use crate::utils::parse_date;
use chrono::NaiveDate;
use governor::{DefaultDirectRateLimiter, Quota, RateLimiter};
use nonzero_ext::nonzero;
use serde::de::DeserializeOwned;
use serde::Deserialize;
use serde_json::Value;
use std::time::Duration;
use tracing::{debug, info, warn};
use url::Url;

/// Ticker suffixes understood by EOD; anything else is assumed to be US-listed.
pub fn eod_symbol(symbol: &str) -> String {
    match symbol.to_ascii_uppercase().as_str() {
        "SPY" => "SPY.US".to_string(),
        "QQQ" => "QQQ.US".to_string(),
        "IWM" => "IWM.US".to_string(),
        "ES" => "ES.CME".to_string(),
        other => format!("{}.US", other),
    }
}

/// Daily bar from the `/eod/{symbol}` endpoint
#[derive(Debug, Clone, Deserialize)]
pub struct EodBar {
    pub date: String,
    pub close: f64,
    #[serde(default)]
    pub adjusted_close: Option<f64>,
    #[serde(default)]
    pub volume: Option<f64>,
}

/// Numbers in EOD payloads arrive as numbers, numeric strings or null
fn as_f64(v: Option<&Value>) -> Option<f64> {
    let x = match v? {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().parse::<f64>().ok(),
        _ => None,
    };
    x.filter(|x| x.is_finite())
}

fn parse_option_record(
    record: &Value,
    symbol: &str,
    expiry: NaiveDate,
    group: OptionType,
) -> Option<MarketQuote> {
    let strike = as_f64(record.get("strike")).filter(|k| *k > 0.0)?;
    let option_type = match record.get("type").and_then(Value::as_str) {
        Some(t) => t.parse().ok()?,
        None => group,
    };

    let mut contract = OptionContract::new(symbol.to_ascii_uppercase(), option_type, strike, expiry);
    if let Some(name) = record
        .get("contractName")
        .and_then(Value::as_str)
        .filter(|s| !s.is_empty())
    {
        contract.option_symbol = name.to_string();
    }

    let count = |key: &str| as_f64(record.get(key)).map_or(0, |x| x.max(0.0) as u64);
    let quote = MarketQuote::new(
        contract,
        as_f64(record.get("bid")).unwrap_or(0.0),
        as_f64(record.get("ask")).unwrap_or(0.0),
        as_f64(record.get("lastPrice")).unwrap_or(0.0),
        count("volume"),
        count("openInterest"),
    )
    .with_implied_vol(as_f64(record.get("impliedVolatility")).filter(|iv| *iv > 0.0))
    .with_greeks(Greeks {
        delta: as_f64(record.get("delta")),
        gamma: as_f64(record.get("gamma")),
        theta: as_f64(record.get("theta")),
        vega: as_f64(record.get("vega")),
    });
    Some(quote)
}

/// Distinct expiries present in `quotes`, ascending
pub fn available_expiries(quotes: &[MarketQuote]) -> Vec<NaiveDate> {
    let mut expiries: Vec<NaiveDate> = quotes.iter().map(|q| q.contract.expiry).collect();
    expiries.sort();
    expiries.dedup();
    expiries
}

/// Parse an options payload: `{"data": [{"expirationDate", "options": {"CALL": [..], "PUT": [..]}}]}`.
///
/// A bare top-level array is accepted too. Records or expiries that cannot
/// be parsed are skipped. Output is sorted by expiry, strike, then right.
pub fn parse_chain_response(response: &Value, symbol: &str) -> Vec<MarketQuote> {
    let data = match response {
        Value::Object(map) => map.get("data").and_then(Value::as_array),
        Value::Array(items) => Some(items),
        _ => None,
    };
    let Some(data) = data else {
        return Vec::new();
    };

    let mut quotes = Vec::new();
    let mut skipped = 0usize;
    for expiry_data in data {
        let Some(expiry_str) = expiry_data.get("expirationDate").and_then(Value::as_str) else {
            continue;
        };
        let expiry = match parse_date(expiry_str) {
            Ok(d) => d,
            Err(e) => {
                warn!("Skipping expiry: {}", e);
                continue;
            }
        };
        let Some(options) = expiry_data.get("options") else {
            continue;
        };
        for (key, group) in [("CALL", OptionType::Call), ("PUT", OptionType::Put)] {
            let Some(records) = options.get(key).and_then(Value::as_array) else {
                continue;
            };
            for record in records {
                match parse_option_record(record, symbol, expiry, group) {
                    Some(q) => quotes.push(q),
                    None => skipped += 1,
                }
            }
        }
    }

    if skipped > 0 {
        debug!("Skipped {} unparsable option records for {}", skipped, symbol);
    }
    quotes.sort_by(|a, b| {
        a.contract
            .expiry
            .cmp(&b.contract.expiry)
            .then(a.contract.strike.total_cmp(&b.contract.strike))
            .then(a.contract.is_put().cmp(&b.contract.is_put()))
    });
    quotes
}

/// Client for the EOD Historical Data REST API, limited to one request per second.
pub struct EodClient {
    client: reqwest::Client,
    config: EodConfig,
    rate_limiter: DefaultDirectRateLimiter,
}

impl EodClient {
    pub fn new(config: EodConfig) -> Result<Self> {
        config.require_api_key()?;
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(30))
            .build()
            .map_err(|e| RndError::HttpError(format!("Failed to build HTTP client: {}", e)))?;
        Ok(Self {
            client,
            config,
            rate_limiter: RateLimiter::direct(Quota::per_second(nonzero!(1u32))),
        })
    }

    /// Endpoint URL with the token and `fmt=json` appended
    pub fn endpoint(&self, path: &str, params: &[(&str, String)]) -> Result<Url> {
        let api_key = self.config.require_api_key()?;
        let base = self.config.base_url.trim_end_matches('/');
        let mut url = Url::parse(&format!("{}{}", base, path))
            .map_err(|e| RndError::ConfigError(format!("Invalid EOD base URL '{}': {}", base, e)))?;
        {
            let mut query = url.query_pairs_mut();
            for (k, v) in params {
                query.append_pair(k, v);
            }
            query.append_pair("api_token", api_key);
            query.append_pair("fmt", "json");
        }
        Ok(url)
    }

    async fn get_json<T: DeserializeOwned>(&self, url: Url) -> Result<T> {
        self.rate_limiter.until_ready().await;
        debug!("GET {}", url.path());

        let resp = self
            .client
            .get(url.clone())
            .send()
            .await
            .map_err(|e| RndError::HttpError(format!("Request to {} failed: {}", url.path(), e)))?;

        if !resp.status().is_success() {
            let status = resp.status();
            let body = resp.text().await.unwrap_or_default();
            return Err(RndError::HttpError(format!(
                "{} returned {}: {}",
                url.path(),
                status,
                body.chars().take(200).collect::<String>()
            )));
        }

        let text = resp
            .text()
            .await
            .map_err(|e| RndError::HttpError(format!("Failed to read response body: {}", e)))?;
        serde_json::from_str(&text)
            .map_err(|e| RndError::ParseError(format!("Failed to parse {} response: {}", url.path(), e)))
    }

    /// End-of-day chain for `trade_date`, optionally restricted to one expiry.
    pub async fn get_option_chain(
        &self,
        symbol: &str,
        trade_date: NaiveDate,
        expiry: Option<NaiveDate>,
    ) -> Result<Vec<MarketQuote>> {
        let url = self.endpoint(
            &format!("/options/{}", eod_symbol(symbol)),
            &[("trade_date", trade_date.format("%Y-%m-%d").to_string())],
        )?;
        let response: Value = self.get_json(url).await?;

        let mut quotes = parse_chain_response(&response, symbol);
        if let Some(expiry) = expiry {
            quotes.retain(|q| q.contract.expiry == expiry);
        }
        info!("Fetched {} option quotes for {} on {}", quotes.len(), symbol, trade_date);
        Ok(quotes)
    }

    /// Expiries listed in the chain for `trade_date`
    pub async fn get_available_expiries(
        &self,
        symbol: &str,
        trade_date: NaiveDate,
    ) -> Result<Vec<NaiveDate>> {
        let quotes = self.get_option_chain(symbol, trade_date, None).await?;
        Ok(available_expiries(&quotes))
    }

    pub async fn get_underlying_bars(
        &self,
        symbol: &str,
        start: NaiveDate,
        end: NaiveDate,
    ) -> Result<Vec<EodBar>> {
        let url = self.endpoint(
            &format!("/eod/{}", eod_symbol(symbol)),
            &[
                ("from", start.format("%Y-%m-%d").to_string()),
                ("to", end.format("%Y-%m-%d").to_string()),
                ("period", "d".to_string()),
            ],
        )?;
        self.get_json(url).await
    }

    /// Daily closes between `start` and `end` inclusive
    pub async fn get_underlying_closes(
        &self,
        symbol: &str,
        start: NaiveDate,
        end: NaiveDate,
    ) -> Result<PriceSeries> {
        let bars = self.get_underlying_bars(symbol, start, end).await?;
        let pairs = bars
            .iter()
            .map(|b| Ok((parse_date(&b.date)?, b.close)))
            .collect::<Result<Vec<_>>>()?;
        PriceSeries::from_pairs(pairs)
    }

    /// Close on `date`, `None` when there was no bar that day.
    pub async fn get_spot_price(&self, symbol: &str, date: NaiveDate) -> Result<Option<f64>> {
        let closes = self.get_underlying_closes(symbol, date, date).await?;
        Ok(closes.values.last().copied())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn symbol_mapping() {
        assert_eq!(eod_symbol("SPY"), "SPY.US");
        assert_eq!(eod_symbol("es"), "ES.CME");
        assert_eq!(eod_symbol("AAPL"), "AAPL.US");
    }

    #[test]
    fn parses_nested_chain_and_skips_bad_records() {
        let payload = json!({
            "data": [{
                "expirationDate": "2025-06-20",
                "options": {
                    "CALL": [
                        {"contractName": "SPY250620C00560000", "strike": 560, "type": "CALL",
                         "bid": 9.5, "ask": 9.9, "lastPrice": 9.7, "volume": 120,
                         "openInterest": "3400", "impliedVolatility": 0.17,
                         "delta": 0.48, "gamma": "0.012", "theta": -0.21, "vega": null},
                        {"contractName": "broken", "strike": "n/a", "type": "CALL"}
                    ],
                    "PUT": [
                        {"contractName": "SPY250620P00540000", "strike": "540", "type": "PUT",
                         "bid": "6.1", "ask": null, "lastPrice": 6.0, "volume": null,
                         "openInterest": 800}
                    ]
                }
            }, {
                "expirationDate": "not a date",
                "options": {"CALL": [{"strike": 1.0}]}
            }]
        });

        let quotes = parse_chain_response(&payload, "spy");
        assert_eq!(quotes.len(), 2);

        let put = &quotes[0];
        assert_eq!(put.contract.option_type, OptionType::Put);
        assert_eq!(put.contract.strike, 540.0);
        assert_eq!(put.contract.symbol, "SPY");
        assert_eq!(put.bid, 6.1);
        assert_eq!(put.ask, 0.0);
        assert_eq!(put.volume, 0);
        assert_eq!(put.implied_vol, None);

        let call = &quotes[1];
        assert_eq!(call.contract.option_symbol, "SPY250620C00560000");
        assert_eq!(call.open_interest, 3400);
        assert_eq!(call.implied_vol, Some(0.17));
        assert_eq!(call.greeks.delta, Some(0.48));
        assert_eq!(call.greeks.gamma, Some(0.012));
        assert_eq!(call.greeks.theta, Some(-0.21));
        assert_eq!(call.greeks.vega, None);
        assert!(put.greeks.is_empty());
    }

    #[test]
    fn expiries_are_distinct_and_sorted() {
        let payload = json!([
            {"expirationDate": "2025-09-19",
             "options": {"CALL": [{"strike": 100}, {"strike": 105}], "PUT": [{"strike": 95}]}},
            {"expirationDate": "2025-06-20",
             "options": {"PUT": [{"strike": 90}]}}
        ]);
        let quotes = parse_chain_response(&payload, "SPY");
        assert_eq!(quotes.len(), 4);
        assert_eq!(
            available_expiries(&quotes),
            vec![
                NaiveDate::from_ymd_opt(2025, 6, 20).unwrap(),
                NaiveDate::from_ymd_opt(2025, 9, 19).unwrap(),
            ]
        );
        assert!(available_expiries(&[]).is_empty());
    }

    #[test]
    fn empty_or_unexpected_payloads() {
        assert!(parse_chain_response(&json!({}), "SPY").is_empty());
        assert!(parse_chain_response(&json!(null), "SPY").is_empty());
        assert!(parse_chain_response(&json!([]), "SPY").is_empty());
    }

    #[test]
    fn endpoint_carries_token_and_params() {
        let client = EodClient::new(EodConfig::new("secret")).unwrap();
        let url = client
            .endpoint("/options/SPY.US", &[("trade_date", "2025-03-07".to_string())])
            .unwrap();
        assert_eq!(url.path(), "/api/options/SPY.US");
        let query: Vec<(String, String)> = url.query_pairs().into_owned().collect();
        assert!(query.contains(&("trade_date".into(), "2025-03-07".into())));
        assert!(query.contains(&("api_token".into(), "secret".into())));
        assert!(query.contains(&("fmt".into(), "json".into())));
    }

    #[test]
    fn missing_key_is_config_error() {
        let config = EodConfig {
            api_key: None,
            base_url: "https://eodhistoricaldata.com/api".into(),
        };
        assert!(matches!(EodClient::new(config), Err(RndError::ConfigError(_))));
    }

    #[test]
    fn bars_deserialize() {
        let bars: Vec<EodBar> = serde_json::from_value(json!([
            {"date": "2025-03-07", "open": 1.0, "high": 2.0, "low": 0.5,
             "close": 575.9, "adjusted_close": 575.9, "volume": 1000}
        ]))
        .unwrap();
        assert_eq!(bars[0].close, 575.9);
    }
}
