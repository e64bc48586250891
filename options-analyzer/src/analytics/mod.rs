//! Options chain analytics.
//!
//! Provides:
//! - Strike profile grouping (per-strike OI, volume, GEX, DEX)
//! - Overview: totals, put/call ratios, top contracts, call/put walls
//! - Max pain
//! - Gamma/delta exposure profiles, gamma flip and HVL
//! - Implied volatility skew
//!
//! Every analyzer is a pure function of its input chain.

pub mod exposure;
pub mod max_pain;
pub mod overview;
pub mod profile;
pub mod skew;

use thiserror::Error;

pub use exposure::{
    build_exposure_profile, ExposureProfileBuilder, ExposureResult, GreeksUnavailable,
    CONTRACT_MULTIPLIER,
};
pub use max_pain::{max_pain, pain_curve, total_loss, PainPoint};
pub use overview::{analyze_overview, OverviewAnalyzer, OverviewResult, TopContract};
pub use profile::{spot_window, StrikeLevel, StrikeProfile};
pub use skew::{SkewPoint, VolatilitySkew};

#[derive(Error, Debug, Clone, PartialEq)]
pub enum AnalyticsError {
    #[error("Insufficient data: {0}")]
    InsufficientData(String),
}
