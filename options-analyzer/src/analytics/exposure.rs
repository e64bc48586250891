//! Gamma and delta exposure profiles.
//!
//! Builds the per-strike net GEX/DEX profile, the cumulative sums over
//! ascending strikes, the gamma flip (first strike where cumulative net GEX
//! is strictly positive) and the HVL strike (largest absolute net GEX).
//!
//! Exposures need greeks on both sides. Sources that do not supply them
//! produce an unavailable result, which is expected and not an error.

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::data::{Chain, OptionRow, OptionType};

use super::profile::StrikeProfile;
use super::AnalyticsError;

/// Standard equity option contract size.
pub const CONTRACT_MULTIPLIER: f64 = 100.0;

/// Why exposures could not be computed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GreeksUnavailable {
    Calls,
    Puts,
    Both,
}

impl std::fmt::Display for GreeksUnavailable {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let side = match self {
            Self::Calls => "calls",
            Self::Puts => "puts",
            Self::Both => "calls and puts",
        };
        write!(f, "no usable delta/gamma data for {}", side)
    }
}

/// Exposure profile of a chain.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExposureResult {
    /// Per-strike aggregates, ascending. Empty when unavailable.
    pub profile: StrikeProfile,
    /// Running sum of net GEX, aligned with `profile` strikes.
    pub cumulative_gex: Vec<f64>,
    /// Running sum of net DEX, aligned with `profile` strikes.
    pub cumulative_dex: Vec<f64>,
    /// First strike where cumulative net GEX turns positive.
    pub gamma_flip: Option<Decimal>,
    /// Strike with the largest absolute net GEX.
    pub hvl_strike: Option<Decimal>,
    /// Set when greeks were missing and nothing was computed.
    pub unavailable: Option<GreeksUnavailable>,
}

impl ExposureResult {
    pub fn unavailable(reason: GreeksUnavailable) -> Self {
        Self {
            profile: StrikeProfile::default(),
            cumulative_gex: Vec::new(),
            cumulative_dex: Vec::new(),
            gamma_flip: None,
            hvl_strike: None,
            unavailable: Some(reason),
        }
    }

    pub fn is_available(&self) -> bool {
        self.unavailable.is_none()
    }

    /// The result, or `InsufficientData` if greeks were missing.
    pub fn require(&self) -> Result<&Self, AnalyticsError> {
        match self.unavailable {
            Some(reason) => Err(AnalyticsError::InsufficientData(reason.to_string())),
            None => Ok(self),
        }
    }

    /// Sum of net GEX over all strikes.
    pub fn total_net_gex(&self) -> f64 {
        self.cumulative_gex.last().copied().unwrap_or(0.0)
    }

    /// Sum of net DEX over all strikes.
    pub fn total_net_dex(&self) -> f64 {
        self.cumulative_dex.last().copied().unwrap_or(0.0)
    }
}

/// Builds [`ExposureResult`]s.
#[derive(Debug, Clone)]
pub struct ExposureProfileBuilder {
    multiplier: f64,
}

impl Default for ExposureProfileBuilder {
    fn default() -> Self {
        Self {
            multiplier: CONTRACT_MULTIPLIER,
        }
    }
}

impl ExposureProfileBuilder {
    pub fn new(multiplier: f64) -> Self {
        Self { multiplier }
    }

    pub fn build(&self, chain: &Chain) -> ExposureResult {
        if let Some(reason) = greeks_unavailable(chain) {
            debug!("Exposure profile unavailable for {}: {}", chain.ticker, reason);
            return ExposureResult::unavailable(reason);
        }

        let profile = StrikeProfile::from_chain(chain, self.multiplier);
        let cumulative_gex = profile.cumulative_net_gex();
        let cumulative_dex = profile.cumulative_net_dex();

        let gamma_flip = profile
            .strikes()
            .zip(cumulative_gex.iter())
            .find(|(_, cum)| **cum > 0.0)
            .map(|(strike, _)| strike);
        let hvl_strike = profile.max_abs_net_gex();

        ExposureResult {
            profile,
            cumulative_gex,
            cumulative_dex,
            gamma_flip,
            hvl_strike,
            unavailable: None,
        }
    }
}

/// Exposure profile with the standard 100-share multiplier.
pub fn build_exposure_profile(chain: &Chain) -> ExposureResult {
    ExposureProfileBuilder::default().build(chain)
}

/// A side is usable when it has rows with non-zero gamma and non-zero delta.
fn side_has_greeks(rows: &[OptionRow]) -> bool {
    rows.iter().any(|r| r.gamma != 0.0) && rows.iter().any(|r| r.delta != 0.0)
}

fn greeks_unavailable(chain: &Chain) -> Option<GreeksUnavailable> {
    let calls = side_has_greeks(chain.side(OptionType::Call));
    let puts = side_has_greeks(chain.side(OptionType::Put));
    match (calls, puts) {
        (true, true) => None,
        (false, true) => Some(GreeksUnavailable::Calls),
        (true, false) => Some(GreeksUnavailable::Puts),
        (false, false) => Some(GreeksUnavailable::Both),
    }
}
