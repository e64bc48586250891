//! Implied volatility skew for a single expiration.
//!
//! Call and put IV by strike, plus the at-the-money IV: the mean IV of
//! contracts whose strike lies within a band around spot. Rows without an
//! IV (zero after normalization) are left out.

use rust_decimal::prelude::ToPrimitive;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::data::{Chain, OptionRow};

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SkewPoint {
    pub strike: Decimal,
    pub implied_volatility: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VolatilitySkew {
    pub calls: Vec<SkewPoint>,
    pub puts: Vec<SkewPoint>,
    /// Mean IV of contracts near spot.
    pub atm_iv: Option<f64>,
}

impl VolatilitySkew {
    /// Build the skew, counting strikes within `atm_band_pct` of spot as ATM.
    pub fn from_chain(chain: &Chain, atm_band_pct: f64) -> Self {
        Self {
            calls: skew_points(&chain.calls),
            puts: skew_points(&chain.puts),
            atm_iv: atm_iv(chain, atm_band_pct),
        }
    }

    /// Put IV minus call IV at the strike nearest spot quoted on both sides.
    pub fn put_call_spread_near(&self, spot: Decimal) -> Option<f64> {
        self.calls
            .iter()
            .filter_map(|c| {
                self.puts
                    .iter()
                    .find(|p| p.strike == c.strike)
                    .map(|p| ((c.strike - spot).abs(), p.implied_volatility - c.implied_volatility))
            })
            .min_by(|a, b| a.0.cmp(&b.0))
            .map(|(_, spread)| spread)
    }
}

fn skew_points(rows: &[OptionRow]) -> Vec<SkewPoint> {
    let mut points: Vec<SkewPoint> = rows
        .iter()
        .filter(|r| r.implied_volatility > 0.0)
        .map(|r| SkewPoint {
            strike: r.strike,
            implied_volatility: r.implied_volatility,
        })
        .collect();
    points.sort_by(|a, b| a.strike.cmp(&b.strike));
    points
}

fn atm_iv(chain: &Chain, atm_band_pct: f64) -> Option<f64> {
    let spot = chain.underlying_spot.to_f64().unwrap_or(0.0);
    if spot <= 0.0 {
        return None;
    }

    let atm_ivs: Vec<f64> = chain
        .calls
        .iter()
        .chain(chain.puts.iter())
        .filter(|r| r.implied_volatility > 0.0)
        .filter(|r| {
            let strike = r.strike.to_f64().unwrap_or(0.0);
            (strike - spot).abs() / spot <= atm_band_pct
        })
        .map(|r| r.implied_volatility)
        .collect();

    if atm_ivs.is_empty() {
        return None;
    }

    Some(atm_ivs.iter().sum::<f64>() / atm_ivs.len() as f64)
}
