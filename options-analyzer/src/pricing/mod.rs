//! Option pricing used by data sources that quote prices without greeks.

pub mod black_scholes;

pub use black_scholes::{BlackScholes, ImpliedGreeks};
