//! Analyzer configuration.
//!
//! Every section has defaults, so a TOML file only needs the values it
//! overrides:
//!
//! ```toml
//! [analysis]
//! top_n = 10
//!
//! [source]
//! cache_dir = "/tmp/options-cache"
//! ```

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Cannot read config {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Invalid config: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("Invalid config value: {0}")]
    Invalid(String),
}

/// Parameters of the analytics engine.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AnalysisConfig {
    /// Number of contracts in each top-activity list.
    pub top_n: usize,
    /// Shares per contract used to scale exposures.
    pub contract_multiplier: f64,
    /// Half-width of the displayed strike window as a fraction of spot.
    pub strike_range_pct: f64,
    /// Distance from spot, as a fraction, within which a contract counts as ATM.
    pub atm_band_pct: f64,
}

impl Default for AnalysisConfig {
    fn default() -> Self {
        Self {
            top_n: 5,
            contract_multiplier: 100.0,
            strike_range_pct: 0.25,
            atm_band_pct: 0.05,
        }
    }
}

/// Parameters of the NASDAQ data source and its cache.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SourceConfig {
    pub base_url: String,
    pub user_agent: String,
    pub cache_dir: PathBuf,
    /// Per-request timeout in seconds.
    pub timeout_secs: u64,
    /// Minimum spacing between requests in milliseconds.
    pub min_request_interval_ms: u64,
    /// Risk-free rate for upstream implied volatility.
    pub risk_free_rate: f64,
    pub dividend_yield: f64,
}

impl Default for SourceConfig {
    fn default() -> Self {
        Self {
            base_url: "https://api.nasdaq.com/api/quote/".to_string(),
            user_agent: "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 \
                         (KHTML, like Gecko) Chrome/100.0.4896.127 Safari/537.36"
                .to_string(),
            cache_dir: PathBuf::from("cache"),
            timeout_secs: 20,
            min_request_interval_ms: 250,
            risk_free_rate: 0.045,
            dividend_yield: 0.0,
        }
    }
}

/// Parameters of the `snapshot` command.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SnapshotConfig {
    pub output_dir: PathBuf,
    pub max_retries: u32,
    pub retry_delay_secs: u64,
}

impl Default for SnapshotConfig {
    fn default() -> Self {
        Self {
            output_dir: PathBuf::from("scheduled_data"),
            max_retries: 3,
            retry_delay_secs: 60,
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct AnalyzerConfig {
    pub analysis: AnalysisConfig,
    pub source: SourceConfig,
    pub snapshot: SnapshotConfig,
}

impl AnalyzerConfig {
    /// Load a config file.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.display().to_string(),
            source,
        })?;
        Self::from_toml(&content)
    }

    /// Load a config file if given, defaults otherwise.
    pub fn load_or_default(path: Option<&Path>) -> Result<Self, ConfigError> {
        match path {
            Some(p) => Self::load(p),
            None => Ok(Self::default()),
        }
    }

    pub fn from_toml(content: &str) -> Result<Self, ConfigError> {
        let config: Self = toml::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> Result<(), ConfigError> {
        if self.analysis.contract_multiplier <= 0.0 {
            return Err(ConfigError::Invalid(
                "analysis.contract_multiplier must be positive".to_string(),
            ));
        }
        if !(0.0..=1.0).contains(&self.analysis.strike_range_pct) {
            return Err(ConfigError::Invalid(
                "analysis.strike_range_pct must be within [0, 1]".to_string(),
            ));
        }
        if self.analysis.atm_band_pct < 0.0 {
            return Err(ConfigError::Invalid(
                "analysis.atm_band_pct must not be negative".to_string(),
            ));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = AnalyzerConfig::default();
        assert_eq!(config.analysis.top_n, 5);
        assert_eq!(config.analysis.contract_multiplier, 100.0);
        assert_eq!(config.analysis.strike_range_pct, 0.25);
        assert_eq!(config.snapshot.max_retries, 3);
        assert_eq!(config.source.cache_dir, PathBuf::from("cache"));
    }

    #[test]
    fn test_partial_toml_keeps_defaults() {
        let config = AnalyzerConfig::from_toml(
            r#"
            [analysis]
            top_n = 10

            [source]
            cache_dir = "/tmp/chains"
            "#,
        )
        .unwrap();
        assert_eq!(config.analysis.top_n, 10);
        assert_eq!(config.analysis.contract_multiplier, 100.0);
        assert_eq!(config.source.cache_dir, PathBuf::from("/tmp/chains"));
        assert_eq!(config.source.timeout_secs, 20);
    }

    #[test]
    fn test_invalid_values_rejected() {
        let err = AnalyzerConfig::from_toml("[analysis]\ncontract_multiplier = 0.0\n").unwrap_err();
        assert!(matches!(err, ConfigError::Invalid(_)));

        let err = AnalyzerConfig::from_toml("[analysis]\ntop_n = \"five\"\n").unwrap_err();
        assert!(matches!(err, ConfigError::Parse(_)));
    }

    #[test]
    fn test_shipped_default_config_parses() {
        let content = include_str!("../config/default.toml");
        let config = AnalyzerConfig::from_toml(content).unwrap();
        assert_eq!(config.analysis.top_n, 5);
    }
}
