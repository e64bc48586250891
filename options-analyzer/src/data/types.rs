//! Core data types for options chain analysis.
//!
//! These types are the normalized form every data source produces and every
//! analyzer consumes. Numeric columns are always populated: anything missing
//! at the source has already been coerced to zero by the normalizer.

use chrono::NaiveDate;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// Option side (call or put).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OptionType {
    Call,
    Put,
}

/// A single normalized option contract row.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OptionRow {
    /// Strike price (always > 0 inside a [`Chain`])
    pub strike: Decimal,

    /// Open interest (contracts outstanding)
    pub open_interest: i64,

    /// Contracts traded in the session
    pub volume: i64,

    /// Implied volatility as a fraction (0.25 = 25%)
    pub implied_volatility: f64,

    /// Delta, signed (puts negative)
    pub delta: f64,

    /// Gamma
    pub gamma: f64,

    /// Bid price
    pub bid: Decimal,

    /// Ask price
    pub ask: Decimal,
}

impl OptionRow {
    /// Row with the given strike and every other column zeroed.
    pub fn at_strike(strike: Decimal) -> Self {
        Self {
            strike,
            open_interest: 0,
            volume: 0,
            implied_volatility: 0.0,
            delta: 0.0,
            gamma: 0.0,
            bid: Decimal::ZERO,
            ask: Decimal::ZERO,
        }
    }

    /// Activity score used to rank contracts: open interest times volume.
    pub fn activity(&self) -> i64 {
        self.open_interest.saturating_mul(self.volume)
    }
}

/// All calls and puts for one ticker and expiration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Chain {
    /// Underlying symbol (e.g., "SPY")
    pub ticker: String,

    /// Expiration date for this chain
    pub expiration: NaiveDate,

    /// Underlying spot price at fetch time
    pub underlying_spot: Decimal,

    /// Call rows in source order
    pub calls: Vec<OptionRow>,

    /// Put rows in source order
    pub puts: Vec<OptionRow>,
}

impl Chain {
    /// Create a new empty chain.
    pub fn new(ticker: &str, expiration: NaiveDate, underlying_spot: Decimal) -> Self {
        Self {
            ticker: ticker.to_uppercase(),
            expiration,
            underlying_spot,
            calls: Vec::new(),
            puts: Vec::new(),
        }
    }

    /// Rows for one side.
    pub fn side(&self, option_type: OptionType) -> &[OptionRow] {
        match option_type {
            OptionType::Call => &self.calls,
            OptionType::Put => &self.puts,
        }
    }

    /// Sorted, deduplicated union of call and put strikes.
    pub fn strikes(&self) -> Vec<Decimal> {
        let mut strikes: Vec<_> = self
            .calls
            .iter()
            .chain(self.puts.iter())
            .map(|r| r.strike)
            .collect();
        strikes.sort();
        strikes.dedup();
        strikes
    }

    /// Find the first call at a specific strike.
    pub fn call_at_strike(&self, strike: Decimal) -> Option<&OptionRow> {
        self.calls.iter().find(|r| r.strike == strike)
    }

    /// Find the first put at a specific strike.
    pub fn put_at_strike(&self, strike: Decimal) -> Option<&OptionRow> {
        self.puts.iter().find(|r| r.strike == strike)
    }
}
