//! NASDAQ quote API client.
//!
//! Endpoints used (relative to the configured base URL):
//! - `{ticker}/info?assetclass=stocks` for the last sale price
//! - `{ticker}/option-chain?assetclass=stocks` for the expiration list
//! - `{ticker}/option-chain` with a single-date filter for the full chain
//!
//! Chain responses are cached on disk. NASDAQ quotes no greeks, so implied
//! volatility, delta and gamma are derived here from the quoted mid price.

use std::collections::BTreeSet;
use std::time::{Duration, Instant};

use chrono::{NaiveDate, Utc};
use reqwest::Client;
use rust_decimal::prelude::ToPrimitive;
use rust_decimal::Decimal;
use serde_json::{json, Value};
use tracing::{debug, info, warn};

use crate::config::SourceConfig;
use crate::pricing::BlackScholes;

use super::cache::ResponseCache;
use super::normalize::{coerce_count, coerce_decimal, coerce_f64, normalize};
use super::source::{ChainSource, FetchError};
use super::types::{Chain, OptionType};

/// Strikes requested per chain call; high enough to cover every strike.
const CHAIN_ROW_LIMIT: &str = "10000";

/// Placeholder NASDAQ uses for an unquoted contract.
const UNQUOTED: &str = "--";

/// One contract as quoted in a NASDAQ chain table row.
#[derive(Debug, Clone, PartialEq)]
pub struct RawContract {
    pub option_type: OptionType,
    pub strike: Decimal,
    pub last: f64,
    pub bid: f64,
    pub ask: f64,
    pub volume: i64,
    pub open_interest: i64,
}

impl RawContract {
    /// Normalizer input row, with greeks implied from the mid price.
    ///
    /// Returns `None` for contracts without a two-sided quote.
    pub fn to_row(&self, spot: f64, time_to_expiry: f64, pricer: &BlackScholes) -> Option<Value> {
        if self.bid <= 0.0 || self.ask <= 0.0 {
            return None;
        }

        let mid = (self.bid + self.ask) / 2.0;
        let strike = self.strike.to_f64().unwrap_or(0.0);
        let (iv, delta, gamma) = pricer
            .implied_greeks(spot, strike, time_to_expiry, mid, self.option_type)
            .map(|g| (g.implied_volatility, g.delta, g.gamma))
            .unwrap_or((0.0, 0.0, 0.0));

        Some(json!({
            "strike": self.strike.to_string(),
            "lastPrice": self.last,
            "bid": self.bid,
            "ask": self.ask,
            "volume": self.volume,
            "openInterest": self.open_interest,
            "impliedVolatility": iv,
            "delta": delta,
            "gamma": gamma,
        }))
    }
}

/// The payload under `data`, or the whole document when it is not wrapped.
fn main_data(raw: &Value) -> &Value {
    match raw.get("data") {
        Some(data) => data,
        None => raw,
    }
}

/// Last sale price from an `info` response.
pub fn parse_spot_price(raw: &Value) -> Option<Decimal> {
    let price = main_data(raw).get("primaryData")?.get("lastSalePrice")?;
    let spot = coerce_decimal(price);
    (spot > Decimal::ZERO).then_some(spot)
}

/// Expiration dates from an `option-chain` filter list, deduplicated and sorted.
pub fn parse_expiration_dates(raw: &Value) -> Vec<NaiveDate> {
    let filters = main_data(raw)
        .get("filterlist")
        .and_then(|f| f.get("fromdate"))
        .and_then(|f| f.get("filter"))
        .and_then(Value::as_array);

    let Some(filters) = filters else {
        return Vec::new();
    };

    filters
        .iter()
        .filter_map(|f| f.get("value").and_then(Value::as_str))
        .filter_map(|v| v.split_once('|').map(|(date, _)| date))
        .filter_map(|d| NaiveDate::parse_from_str(d.trim(), "%Y-%m-%d").ok())
        .collect::<BTreeSet<_>>()
        .into_iter()
        .collect()
}

fn is_quoted(row: &Value, key: &str) -> bool {
    match row.get(key) {
        Some(Value::String(s)) => !s.is_empty() && s != UNQUOTED,
        Some(Value::Number(_)) => true,
        _ => false,
    }
}

fn field_f64(row: &Value, key: &str) -> f64 {
    row.get(key).map(coerce_f64).unwrap_or(0.0)
}

fn field_count(row: &Value, key: &str) -> i64 {
    row.get(key).map(coerce_count).unwrap_or(0)
}

/// Call and put contracts from a chain response's table rows.
///
/// Rows without a strike (section headers) are skipped, as are sides whose
/// last price is missing or `--`.
pub fn parse_chain_contracts(raw: &Value) -> Vec<RawContract> {
    let rows = main_data(raw)
        .get("table")
        .and_then(|t| t.get("rows"))
        .and_then(Value::as_array);

    let Some(rows) = rows else {
        return Vec::new();
    };

    let mut contracts = Vec::with_capacity(rows.len() * 2);
    for row in rows {
        let strike = row.get("strike").map(coerce_decimal).unwrap_or_default();
        if strike <= Decimal::ZERO {
            continue;
        }

        for (option_type, prefix) in [(OptionType::Call, "c_"), (OptionType::Put, "p_")] {
            if !is_quoted(row, &format!("{}Last", prefix)) {
                continue;
            }
            contracts.push(RawContract {
                option_type,
                strike,
                last: field_f64(row, &format!("{}Last", prefix)),
                bid: field_f64(row, &format!("{}Bid", prefix)),
                ask: field_f64(row, &format!("{}Ask", prefix)),
                volume: field_count(row, &format!("{}Volume", prefix)),
                open_interest: field_count(row, &format!("{}Openinterest", prefix)),
            });
        }
    }
    contracts
}

/// Year fraction from `today` to `expiration`.
pub fn time_to_expiry(today: NaiveDate, expiration: NaiveDate) -> f64 {
    (expiration - today).num_days() as f64 / 365.0
}

/// Build a normalized chain from parsed contracts.
pub fn contracts_to_chain(
    ticker: &str,
    expiration: NaiveDate,
    spot: Decimal,
    contracts: &[RawContract],
    today: NaiveDate,
    pricer: &BlackScholes,
) -> Result<Chain, FetchError> {
    let spot_f64 = spot.to_f64().unwrap_or(0.0);
    let time = time_to_expiry(today, expiration);

    let mut calls = Vec::new();
    let mut puts = Vec::new();
    let mut skipped = 0usize;

    for contract in contracts {
        match contract.to_row(spot_f64, time, pricer) {
            Some(row) => match contract.option_type {
                OptionType::Call => calls.push(row),
                OptionType::Put => puts.push(row),
            },
            None => skipped += 1,
        }
    }

    if skipped > 0 {
        debug!("Skipped {} contracts without a two-sided quote", skipped);
    }

    Ok(normalize(
        ticker,
        &Value::Array(calls),
        &Value::Array(puts),
        expiration,
        spot,
    )?)
}

/// Contracts of a chain response, or `NoData` when nothing is quoted.
pub fn require_contracts(
    ticker: &str,
    expiration: NaiveDate,
    contracts: Vec<RawContract>,
) -> Result<Vec<RawContract>, FetchError> {
    if contracts.is_empty() {
        return Err(FetchError::no_data(
            ticker,
            format!("no contracts quoted for {}", expiration),
        ));
    }
    Ok(contracts)
}

/// The chain, or `NoData` when either side ended up empty.
pub fn require_both_sides(chain: Chain) -> Result<Chain, FetchError> {
    if chain.calls.is_empty() || chain.puts.is_empty() {
        return Err(FetchError::no_data(
            &chain.ticker,
            format!(
                "one side of the {} chain has no two-sided quotes",
                chain.expiration
            ),
        ));
    }
    Ok(chain)
}

/// NASDAQ API client.
pub struct NasdaqClient {
    client: Client,
    base_url: String,
    cache: ResponseCache,
    pricer: BlackScholes,
    min_interval: Duration,
    last_request: Option<Instant>,
    request_count: u64,
}

impl NasdaqClient {
    /// Create a new client from source settings.
    pub fn new(config: &SourceConfig) -> Result<Self, FetchError> {
        let client = Client::builder()
            .user_agent(config.user_agent.clone())
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()?;

        Ok(Self {
            client,
            base_url: config.base_url.trim_end_matches('/').to_string(),
            cache: ResponseCache::new(config.cache_dir.clone()),
            pricer: BlackScholes::new(config.risk_free_rate, config.dividend_yield),
            min_interval: Duration::from_millis(config.min_request_interval_ms),
            last_request: None,
            request_count: 0,
        })
    }

    /// Get request count for monitoring.
    pub fn request_count(&self) -> u64 {
        self.request_count
    }

    /// Rate-limited GET returning the JSON body.
    async fn request(
        &mut self,
        ticker: &str,
        endpoint: &str,
        params: &[(&str, &str)],
    ) -> Result<Value, FetchError> {
        if let Some(last) = self.last_request {
            let elapsed = last.elapsed();
            if elapsed < self.min_interval {
                tokio::time::sleep(self.min_interval - elapsed).await;
            }
        }

        let url = format!("{}/{}/{}", self.base_url, ticker.to_uppercase(), endpoint);
        debug!("GET {}", url);
        let response = self.client.get(&url).query(params).send().await?;

        self.last_request = Some(Instant::now());
        self.request_count += 1;

        if response.status() == reqwest::StatusCode::TOO_MANY_REQUESTS {
            return Err(FetchError::RateLimitExceeded);
        }

        if !response.status().is_success() {
            let status = response.status();
            let text = response.text().await.unwrap_or_default();
            return Err(FetchError::ApiError(format!("{}: {}", status, text)));
        }

        let text = response.text().await?;
        if text.trim().is_empty() {
            return Err(FetchError::InvalidResponse("empty response body".to_string()));
        }
        serde_json::from_str(&text)
            .map_err(|e| FetchError::InvalidResponse(format!("Failed to parse response: {}", e)))
    }

    /// Last sale price of the underlying.
    pub async fn get_spot_price(&mut self, ticker: &str) -> Result<Decimal, FetchError> {
        let raw = self
            .request(ticker, "info", &[("assetclass", "stocks")])
            .await?;
        match parse_spot_price(&raw) {
            Some(spot) => {
                info!("{} last sale price {}", ticker.to_uppercase(), spot);
                Ok(spot)
            }
            None => Err(FetchError::no_data(ticker, "no last sale price in response")),
        }
    }

    /// Available expiration dates.
    pub async fn get_expiration_dates(&mut self, ticker: &str) -> Result<Vec<NaiveDate>, FetchError> {
        let raw = self
            .request(ticker, "option-chain", &[("assetclass", "stocks")])
            .await?;
        let dates = parse_expiration_dates(&raw);
        if dates.is_empty() {
            return Err(FetchError::no_data(ticker, "no expiration dates listed"));
        }
        info!("Found {} expiration dates for {}", dates.len(), ticker.to_uppercase());
        Ok(dates)
    }

    /// Raw chain response for one expiration, from cache when present.
    pub async fn get_chain_response(
        &mut self,
        ticker: &str,
        expiration: NaiveDate,
    ) -> Result<Value, FetchError> {
        if let Some(cached) = self.cache.get(ticker, expiration) {
            info!("Cache HIT for {} on {}", ticker.to_uppercase(), expiration);
            return Ok(cached);
        }
        info!("Cache MISS for {} on {}, fetching", ticker.to_uppercase(), expiration);

        let date = expiration.format("%Y-%m-%d").to_string();
        let params = [
            ("assetclass", "stocks"),
            ("fromdate", date.as_str()),
            ("todate", date.as_str()),
            ("excode", "oprac"),
            ("callput", "callput"),
            ("money", "all"),
            ("type", "all"),
            ("limit", CHAIN_ROW_LIMIT),
        ];
        let raw = self.request(ticker, "option-chain", &params).await?;

        if let Err(e) = self.cache.put(ticker, expiration, &raw) {
            warn!("Could not cache chain for {} {}: {}", ticker, expiration, e);
        }
        Ok(raw)
    }
}

impl ChainSource for NasdaqClient {
    async fn expirations(&mut self, ticker: &str) -> Result<Vec<NaiveDate>, FetchError> {
        self.get_expiration_dates(ticker).await
    }

    async fn fetch_chain(
        &mut self,
        ticker: &str,
        expiration: NaiveDate,
    ) -> Result<Chain, FetchError> {
        let raw = self.get_chain_response(ticker, expiration).await?;
        let contracts = require_contracts(ticker, expiration, parse_chain_contracts(&raw))?;

        let spot = self.get_spot_price(ticker).await?;
        let today = Utc::now().date_naive();
        let chain = require_both_sides(contracts_to_chain(
            ticker,
            expiration,
            spot,
            &contracts,
            today,
            &self.pricer,
        )?)?;

        info!(
            "Fetched {} {}: {} calls, {} puts",
            chain.ticker,
            expiration,
            chain.calls.len(),
            chain.puts.len()
        );
        Ok(chain)
    }
}
