//! Per-strike aggregation.
//!
//! Groups call and put rows by strike over the union of both sides' strikes.
//! A strike quoted on one side only gets zeros for the other side. Exposure
//! columns follow the dealer convention:
//! - call GEX = gamma * OI * multiplier, put GEX = -gamma * OI * multiplier
//! - DEX = delta * OI * multiplier on both sides (put delta is already negative)

use std::collections::BTreeMap;

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::data::{Chain, OptionRow};

/// Aggregated values at a single strike.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct StrikeLevel {
    pub call_oi: i64,
    pub put_oi: i64,
    pub call_volume: i64,
    pub put_volume: i64,
    pub call_gex: f64,
    pub put_gex: f64,
    pub call_dex: f64,
    pub put_dex: f64,
}

impl StrikeLevel {
    pub fn net_gex(&self) -> f64 {
        self.call_gex + self.put_gex
    }

    pub fn net_dex(&self) -> f64 {
        self.call_dex + self.put_dex
    }
}

/// Strike-ordered aggregate of a chain.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct StrikeProfile {
    levels: BTreeMap<Decimal, StrikeLevel>,
}

impl StrikeProfile {
    /// Group a chain's rows by strike, scaling exposures by `multiplier`.
    pub fn from_chain(chain: &Chain, multiplier: f64) -> Self {
        let mut levels: BTreeMap<Decimal, StrikeLevel> = BTreeMap::new();

        for row in &chain.calls {
            let level = levels.entry(row.strike).or_default();
            level.call_oi = level.call_oi.saturating_add(row.open_interest);
            level.call_volume = level.call_volume.saturating_add(row.volume);
            level.call_gex += row.gamma * scaled_oi(row, multiplier);
            level.call_dex += row.delta * scaled_oi(row, multiplier);
        }

        for row in &chain.puts {
            let level = levels.entry(row.strike).or_default();
            level.put_oi = level.put_oi.saturating_add(row.open_interest);
            level.put_volume = level.put_volume.saturating_add(row.volume);
            level.put_gex -= row.gamma * scaled_oi(row, multiplier);
            level.put_dex += row.delta * scaled_oi(row, multiplier);
        }

        Self { levels }
    }

    pub fn len(&self) -> usize {
        self.levels.len()
    }

    pub fn is_empty(&self) -> bool {
        self.levels.is_empty()
    }

    /// Strikes in ascending order.
    pub fn strikes(&self) -> impl Iterator<Item = Decimal> + '_ {
        self.levels.keys().copied()
    }

    /// `(strike, level)` pairs in ascending strike order.
    pub fn iter(&self) -> impl Iterator<Item = (Decimal, &StrikeLevel)> + '_ {
        self.levels.iter().map(|(k, v)| (*k, v))
    }

    pub fn get(&self, strike: Decimal) -> Option<&StrikeLevel> {
        self.levels.get(&strike)
    }

    /// Strike with the largest call open interest.
    pub fn call_wall(&self) -> Option<Decimal> {
        self.argmax(|l| l.call_oi as f64)
    }

    /// Strike with the largest put open interest.
    pub fn put_wall(&self) -> Option<Decimal> {
        self.argmax(|l| l.put_oi as f64)
    }

    /// Strike with the largest absolute net GEX.
    pub fn max_abs_net_gex(&self) -> Option<Decimal> {
        self.argmax(|l| l.net_gex().abs())
    }

    /// First strike (ascending) holding the maximum of `key`.
    ///
    /// With all keys equal this is the smallest strike.
    fn argmax<F>(&self, key: F) -> Option<Decimal>
    where
        F: Fn(&StrikeLevel) -> f64,
    {
        let mut best: Option<(Decimal, f64)> = None;
        for (strike, level) in self.iter() {
            let value = key(level);
            match best {
                Some((_, best_value)) if value <= best_value => {}
                _ => best = Some((strike, value)),
            }
        }
        best.map(|(strike, _)| strike)
    }

    /// Running sum of net GEX in ascending strike order.
    pub fn cumulative_net_gex(&self) -> Vec<f64> {
        running_sum(self.levels.values().map(StrikeLevel::net_gex))
    }

    /// Running sum of net DEX in ascending strike order.
    pub fn cumulative_net_dex(&self) -> Vec<f64> {
        running_sum(self.levels.values().map(StrikeLevel::net_dex))
    }

    /// Sub-profile with strikes inside `[min, max]`.
    pub fn within(&self, min: Decimal, max: Decimal) -> Self {
        if min > max {
            return Self::default();
        }
        Self {
            levels: self
                .levels
                .range(min..=max)
                .map(|(k, v)| (*k, *v))
                .collect(),
        }
    }

    /// Sub-profile within `pct` of `spot` on either side.
    pub fn around_spot(&self, spot: Decimal, pct: f64) -> Self {
        let (min, max) = spot_window(spot, pct);
        self.within(min, max)
    }
}

/// Inclusive strike bounds `pct` either side of `spot`.
pub fn spot_window(spot: Decimal, pct: f64) -> (Decimal, Decimal) {
    let band = Decimal::try_from(pct).unwrap_or_default();
    let min = spot.checked_mul(Decimal::ONE - band).unwrap_or(Decimal::MIN);
    let max = spot.checked_mul(Decimal::ONE + band).unwrap_or(Decimal::MAX);
    (min, max)
}

fn scaled_oi(row: &OptionRow, multiplier: f64) -> f64 {
    row.open_interest as f64 * multiplier
}

fn running_sum(values: impl Iterator<Item = f64>) -> Vec<f64> {
    values
        .scan(0.0, |acc, v| {
            *acc += v;
            Some(*acc)
        })
        .collect()
}
