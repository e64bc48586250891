//! Raw row normalization.
//!
//! Sources hand over rows as loosely-typed JSON records. Normalization maps
//! them onto [`OptionRow`] with every column present:
//! - absent or non-numeric fields become 0
//! - numeric strings are accepted once `,` and `$` are stripped ("1,250", "$3.10")
//! - non-finite numbers become 0, non-negative columns clamp at 0
//! - rows whose strike is not positive are dropped
//!
//! The only failures are a collection that is not a sequence of key-value
//! records and a non-positive underlying spot.

use chrono::NaiveDate;
use rust_decimal::Decimal;
use serde_json::{Map, Value};
use thiserror::Error;
use tracing::debug;

use super::types::{Chain, OptionRow, OptionType};

#[derive(Error, Debug)]
pub enum NormalizeError {
    #[error("Malformed input: {0}")]
    MalformedInput(String),
}

/// Accepted source keys per column, camelCase first.
const STRIKE_KEYS: &[&str] = &["strike", "strikePrice", "strike_price"];
const OPEN_INTEREST_KEYS: &[&str] = &["openInterest", "open_interest"];
const VOLUME_KEYS: &[&str] = &["volume"];
const IV_KEYS: &[&str] = &["impliedVolatility", "implied_volatility"];
const DELTA_KEYS: &[&str] = &["delta"];
const GAMMA_KEYS: &[&str] = &["gamma"];
const BID_KEYS: &[&str] = &["bid"];
const ASK_KEYS: &[&str] = &["ask"];

/// Normalize raw call and put collections into a [`Chain`].
pub fn normalize(
    ticker: &str,
    raw_calls: &Value,
    raw_puts: &Value,
    expiration: NaiveDate,
    underlying_spot: Decimal,
) -> Result<Chain, NormalizeError> {
    check_spot(underlying_spot)?;

    let mut chain = Chain::new(ticker, expiration, underlying_spot);
    chain.calls = normalize_rows(raw_calls, OptionType::Call)?;
    chain.puts = normalize_rows(raw_puts, OptionType::Put)?;
    Ok(chain)
}

/// Re-apply the row rules to an already-typed chain, e.g. one read from disk.
///
/// Values are clamped and rows without a positive strike dropped, exactly as
/// for raw input. A non-positive spot is rejected.
pub fn revalidate(mut chain: Chain) -> Result<Chain, NormalizeError> {
    check_spot(chain.underlying_spot)?;
    chain.calls = retain_valid(std::mem::take(&mut chain.calls), OptionType::Call);
    chain.puts = retain_valid(std::mem::take(&mut chain.puts), OptionType::Put);
    Ok(chain)
}

fn check_spot(spot: Decimal) -> Result<(), NormalizeError> {
    if spot <= Decimal::ZERO {
        return Err(NormalizeError::MalformedInput(format!(
            "underlying spot must be positive, got {}",
            spot
        )));
    }
    Ok(())
}

/// Clamp every row and drop those without a positive strike.
fn retain_valid(rows: Vec<OptionRow>, side: OptionType) -> Vec<OptionRow> {
    let total = rows.len();
    let kept: Vec<OptionRow> = rows
        .into_iter()
        .map(clamp_row)
        .filter(|r| r.strike > Decimal::ZERO)
        .collect();

    if kept.len() < total {
        debug!(
            "Dropped {} {} rows without a positive strike",
            total - kept.len(),
            side_name(side)
        );
    }
    kept
}

fn clamp_row(row: OptionRow) -> OptionRow {
    OptionRow {
        open_interest: row.open_interest.max(0),
        volume: row.volume.max(0),
        implied_volatility: finite_or_zero(row.implied_volatility).max(0.0),
        delta: finite_or_zero(row.delta),
        gamma: finite_or_zero(row.gamma).max(0.0),
        bid: non_negative(row.bid),
        ask: non_negative(row.ask),
        ..row
    }
}

fn finite_or_zero(v: f64) -> f64 {
    if v.is_finite() {
        v
    } else {
        0.0
    }
}

/// Normalize one side's raw rows.
pub fn normalize_rows(raw: &Value, side: OptionType) -> Result<Vec<OptionRow>, NormalizeError> {
    let records = raw.as_array().ok_or_else(|| {
        NormalizeError::MalformedInput(format!(
            "{} rows must be a sequence, got {}",
            side_name(side),
            value_kind(raw)
        ))
    })?;

    let rows = records
        .iter()
        .enumerate()
        .map(|(idx, record)| {
            record.as_object().map(read_record).ok_or_else(|| {
                NormalizeError::MalformedInput(format!(
                    "{} row {} must be a key-value record, got {}",
                    side_name(side),
                    idx,
                    value_kind(record)
                ))
            })
        })
        .collect::<Result<Vec<_>, _>>()?;

    Ok(retain_valid(rows, side))
}

fn read_record(fields: &Map<String, Value>) -> OptionRow {
    OptionRow {
        strike: lookup(fields, STRIKE_KEYS).map(coerce_decimal).unwrap_or_default(),
        open_interest: lookup(fields, OPEN_INTEREST_KEYS)
            .map(coerce_count)
            .unwrap_or(0),
        volume: lookup(fields, VOLUME_KEYS).map(coerce_count).unwrap_or(0),
        implied_volatility: lookup(fields, IV_KEYS).map(coerce_f64).unwrap_or(0.0),
        delta: lookup(fields, DELTA_KEYS).map(coerce_f64).unwrap_or(0.0),
        gamma: lookup(fields, GAMMA_KEYS).map(coerce_f64).unwrap_or(0.0),
        bid: lookup(fields, BID_KEYS).map(coerce_decimal).unwrap_or_default(),
        ask: lookup(fields, ASK_KEYS).map(coerce_decimal).unwrap_or_default(),
    }
}

fn lookup<'a>(fields: &'a Map<String, Value>, keys: &[&str]) -> Option<&'a Value> {
    keys.iter().find_map(|k| fields.get(*k))
}

fn clean(s: &str) -> String {
    s.trim().replace([',', '$'], "")
}

/// Coerce any JSON value to a finite `f64`, defaulting to 0.
pub fn coerce_f64(value: &Value) -> f64 {
    let parsed = match value {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => clean(s).parse::<f64>().ok(),
        _ => None,
    };
    parsed.filter(|v| v.is_finite()).unwrap_or(0.0)
}

/// Coerce any JSON value to a non-negative contract count.
///
/// Fractional values truncate toward zero.
pub fn coerce_count(value: &Value) -> i64 {
    let parsed = match value {
        Value::Number(n) => n.as_i64().or_else(|| n.as_f64().map(truncate_count)),
        Value::String(s) => {
            let s = clean(s);
            s.parse::<i64>()
                .ok()
                .or_else(|| s.parse::<f64>().ok().map(truncate_count))
        }
        _ => None,
    };
    parsed.unwrap_or(0).max(0)
}

fn truncate_count(v: f64) -> i64 {
    if v.is_finite() {
        v.trunc() as i64
    } else {
        0
    }
}

/// Coerce any JSON value to a `Decimal`, defaulting to 0.
///
/// Numbers keep their textual form where possible so `100.1` stays `100.1`
/// rather than its nearest binary float.
pub fn coerce_decimal(value: &Value) -> Decimal {
    match value {
        Value::Number(n) => n
            .to_string()
            .parse::<Decimal>()
            .ok()
            .or_else(|| n.as_f64().and_then(|f| Decimal::try_from(f).ok()))
            .unwrap_or_default(),
        Value::String(s) => {
            let s = clean(s);
            s.parse::<Decimal>()
                .ok()
                .or_else(|| {
                    s.parse::<f64>()
                        .ok()
                        .filter(|f| f.is_finite())
                        .and_then(|f| Decimal::try_from(f).ok())
                })
                .unwrap_or_default()
        }
        _ => Decimal::ZERO,
    }
}

fn non_negative(d: Decimal) -> Decimal {
    d.max(Decimal::ZERO)
}

fn side_name(side: OptionType) -> &'static str {
    match side {
        OptionType::Call => "call",
        OptionType::Put => "put",
    }
}

fn value_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "a sequence",
        Value::Object(_) => "a record",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn expiry() -> NaiveDate {
        NaiveDate::from_ymd_opt(2025, 7, 11).unwrap()
    }

    #[test]
    fn test_missing_fields_default_to_zero() {
        let rows = normalize_rows(&json!([{ "strike": 100 }]), OptionType::Call).unwrap();
        assert_eq!(rows.len(), 1);
        let row = &rows[0];
        assert_eq!(row.strike, Decimal::from(100));
        assert_eq!(row.open_interest, 0);
        assert_eq!(row.volume, 0);
        assert_eq!(row.implied_volatility, 0.0);
        assert_eq!(row.delta, 0.0);
        assert_eq!(row.gamma, 0.0);
        assert_eq!(row.bid, Decimal::ZERO);
    }

    #[test]
    fn test_non_numeric_fields_coerce_to_zero() {
        let raw = json!([{
            "strike": "105",
            "openInterest": "--",
            "volume": null,
            "impliedVolatility": "n/a",
            "delta": true,
            "gamma": {"x": 1},
        }]);
        let row = &normalize_rows(&raw, OptionType::Put).unwrap()[0];
        assert_eq!(row.strike, Decimal::from(105));
        assert_eq!(row.open_interest, 0);
        assert_eq!(row.volume, 0);
        assert_eq!(row.implied_volatility, 0.0);
        assert_eq!(row.delta, 0.0);
        assert_eq!(row.gamma, 0.0);
    }

    #[test]
    fn test_formatted_strings_are_parsed() {
        let raw = json!([{
            "strike": "$1,250.50",
            "open_interest": "12,345",
            "volume": 17.9,
            "bid": "$3.10",
            "ask": 3.3,
        }]);
        let row = &normalize_rows(&raw, OptionType::Call).unwrap()[0];
        assert_eq!(row.strike, Decimal::new(125050, 2));
        assert_eq!(row.open_interest, 12_345);
        assert_eq!(row.volume, 17);
        assert_eq!(row.bid, Decimal::new(310, 2));
        assert_eq!(row.ask, Decimal::new(33, 1));
    }

    #[test]
    fn test_negative_counts_and_gamma_clamp() {
        let raw = json!([{ "strike": 50, "openInterest": -4, "gamma": -0.2, "delta": -0.4 }]);
        let row = &normalize_rows(&raw, OptionType::Put).unwrap()[0];
        assert_eq!(row.open_interest, 0);
        assert_eq!(row.gamma, 0.0);
        assert_eq!(row.delta, -0.4);
    }

    #[test]
    fn test_rows_without_positive_strike_are_dropped() {
        let raw = json!([{ "strike": 0 }, { "volume": 3 }, { "strike": 90 }]);
        let rows = normalize_rows(&raw, OptionType::Call).unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].strike, Decimal::from(90));
    }

    #[test]
    fn test_non_sequence_is_malformed() {
        let err = normalize_rows(&json!({"strike": 100}), OptionType::Call).unwrap_err();
        assert!(matches!(err, NormalizeError::MalformedInput(_)));
    }

    #[test]
    fn test_non_record_row_is_malformed() {
        let err = normalize_rows(&json!([{ "strike": 100 }, 42]), OptionType::Put).unwrap_err();
        let NormalizeError::MalformedInput(msg) = err;
        assert!(msg.contains("row 1"));
    }

    #[test]
    fn test_normalize_builds_chain() {
        let chain = normalize(
            "spy",
            &json!([{ "strike": 100, "openInterest": 50, "volume": 10 }]),
            &json!([{ "strike": 100, "openInterest": 30, "volume": 5 }]),
            expiry(),
            Decimal::from(101),
        )
        .unwrap();
        assert_eq!(chain.ticker, "SPY");
        assert_eq!(chain.calls[0].open_interest, 50);
        assert_eq!(chain.puts[0].volume, 5);
    }

    #[test]
    fn test_normalize_rejects_non_positive_spot() {
        let err = normalize("SPY", &json!([]), &json!([]), expiry(), Decimal::ZERO).unwrap_err();
        assert!(matches!(err, NormalizeError::MalformedInput(_)));
    }

    #[test]
    fn test_revalidate_applies_row_rules() {
        let mut bad_call = OptionRow::at_strike(Decimal::from(-10));
        bad_call.open_interest = 40;
        let mut put = OptionRow::at_strike(Decimal::from(95));
        put.open_interest = -30;
        put.volume = -2;
        put.gamma = -0.01;
        put.bid = Decimal::from(-1);

        let mut chain = Chain::new("spy", expiry(), Decimal::from(100));
        chain.calls = vec![bad_call];
        chain.puts = vec![put];

        let chain = revalidate(chain).unwrap();
        assert!(chain.calls.is_empty());
        assert_eq!(chain.puts.len(), 1);
        assert_eq!(chain.puts[0].open_interest, 0);
        assert_eq!(chain.puts[0].volume, 0);
        assert_eq!(chain.puts[0].gamma, 0.0);
        assert_eq!(chain.puts[0].bid, Decimal::ZERO);
    }

    #[test]
    fn test_revalidate_rejects_bad_spot() {
        let chain = Chain::new("SPY", expiry(), Decimal::from(-5));
        assert!(matches!(
            revalidate(chain),
            Err(NormalizeError::MalformedInput(_))
        ));
    }

    #[test]
    fn test_decimal_keeps_textual_form() {
        assert_eq!(coerce_decimal(&json!(100.1)), Decimal::new(1001, 1));
        assert_eq!(coerce_f64(&json!("1,000.5")), 1000.5);
        assert_eq!(coerce_count(&json!("7")), 7);
    }
}
