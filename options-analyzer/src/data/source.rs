//! Chain sources.
//!
//! A source turns a ticker and expiration into a normalized [`Chain`]. The
//! analytics never see a source; they are handed the chain it produced.

use std::fs;
use std::path::{Path, PathBuf};

use chrono::NaiveDate;
use thiserror::Error;

use super::normalize::{revalidate, NormalizeError};
use super::types::Chain;

/// Data source errors.
#[derive(Error, Debug)]
pub enum FetchError {
    #[error("HTTP request failed: {0}")]
    HttpError(#[from] reqwest::Error),

    #[error("Rate limit exceeded")]
    RateLimitExceeded,

    #[error("API error: {0}")]
    ApiError(String),

    #[error("Invalid response format: {0}")]
    InvalidResponse(String),

    #[error("No data available for {ticker}: {detail}")]
    NoData { ticker: String, detail: String },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Normalize(#[from] NormalizeError),
}

impl FetchError {
    pub fn no_data(ticker: &str, detail: impl Into<String>) -> Self {
        Self::NoData {
            ticker: ticker.to_uppercase(),
            detail: detail.into(),
        }
    }

    /// Whether the source simply had nothing for the request.
    pub fn is_no_data(&self) -> bool {
        matches!(self, Self::NoData { .. })
    }
}

/// Something that can produce option chains.
#[allow(async_fn_in_trait)]
pub trait ChainSource {
    /// Available expirations for a ticker, ascending.
    async fn expirations(&mut self, ticker: &str) -> Result<Vec<NaiveDate>, FetchError>;

    /// The chain for one ticker and expiration.
    async fn fetch_chain(&mut self, ticker: &str, expiration: NaiveDate)
        -> Result<Chain, FetchError>;
}

/// File name of a saved chain.
pub fn chain_file_name(ticker: &str, expiration: NaiveDate) -> String {
    format!("{}_{}.json", ticker.to_uppercase(), expiration.format("%Y-%m-%d"))
}

/// Write a chain as JSON into `dir`.
pub fn save_chain(dir: &Path, chain: &Chain) -> Result<PathBuf, FetchError> {
    fs::create_dir_all(dir)?;
    let path = dir.join(chain_file_name(&chain.ticker, chain.expiration));
    let content = serde_json::to_string_pretty(chain)
        .map_err(|e| FetchError::InvalidResponse(e.to_string()))?;
    fs::write(&path, content)?;
    Ok(path)
}

/// Read a chain saved by [`save_chain`].
///
/// The file is untrusted: rows go through the same rules as freshly
/// normalized input, and a non-positive spot is rejected.
pub fn load_chain(path: &Path) -> Result<Chain, FetchError> {
    let content = fs::read_to_string(path)?;
    let chain: Chain = serde_json::from_str(&content).map_err(|e| {
        FetchError::InvalidResponse(format!("{} is not a saved chain: {}", path.display(), e))
    })?;
    Ok(revalidate(chain)?)
}

/// Chains previously saved to a directory.
#[derive(Debug, Clone)]
pub struct FileSource {
    dir: PathBuf,
}

impl FileSource {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    /// All saved chain files in the directory, sorted by name.
    pub fn chain_files(&self) -> Result<Vec<PathBuf>, FetchError> {
        if !self.dir.exists() {
            return Ok(vec![]);
        }

        let mut files: Vec<PathBuf> = fs::read_dir(&self.dir)?
            .filter_map(|e| e.ok())
            .map(|e| e.path())
            .filter(|p| p.extension().map(|x| x == "json").unwrap_or(false))
            .collect();
        files.sort();
        Ok(files)
    }
}

impl ChainSource for FileSource {
    async fn expirations(&mut self, ticker: &str) -> Result<Vec<NaiveDate>, FetchError> {
        let prefix = format!("{}_", ticker.to_uppercase());
        let mut dates: Vec<NaiveDate> = self
            .chain_files()?
            .iter()
            .filter_map(|p| p.file_stem().map(|s| s.to_string_lossy().to_string()))
            .filter_map(|stem| {
                stem.strip_prefix(&prefix)
                    .and_then(|d| NaiveDate::parse_from_str(d, "%Y-%m-%d").ok())
            })
            .collect();
        dates.sort();
        dates.dedup();
        Ok(dates)
    }

    async fn fetch_chain(
        &mut self,
        ticker: &str,
        expiration: NaiveDate,
    ) -> Result<Chain, FetchError> {
        let path = self.dir.join(chain_file_name(ticker, expiration));
        if !path.exists() {
            return Err(FetchError::no_data(
                ticker,
                format!("no saved chain for {}", expiration),
            ));
        }
        load_chain(&path)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::types::fixtures::{chain, row};
    use rust_decimal::Decimal;
    use tempfile::TempDir;

    #[tokio::test]
    async fn test_save_and_reload_through_file_source() {
        let tmp = TempDir::new().unwrap();
        let original = chain(vec![row(100, 50, 10)], vec![row(95, 30, 5)]);
        let path = save_chain(tmp.path(), &original).unwrap();
        assert!(path.ends_with("TEST_2025-07-11.json"));

        let mut source = FileSource::new(tmp.path());
        let dates = source.expirations("test").await.unwrap();
        assert_eq!(dates, vec![original.expiration]);

        let loaded = source.fetch_chain("TEST", original.expiration).await.unwrap();
        assert_eq!(loaded, original);
    }

    #[tokio::test]
    async fn test_missing_file_is_no_data() {
        let tmp = TempDir::new().unwrap();
        let mut source = FileSource::new(tmp.path());
        let err = source
            .fetch_chain("SPY", NaiveDate::from_ymd_opt(2025, 1, 17).unwrap())
            .await
            .unwrap_err();
        assert!(err.is_no_data());
        assert!(source.expirations("SPY").await.unwrap().is_empty());
    }

    #[test]
    fn test_load_cleans_invalid_rows() {
        let tmp = TempDir::new().unwrap();
        let mut saved = chain(vec![row(-10, 40, 5), row(100, 10, 1)], vec![row(95, -30, 2)]);
        saved.calls[1].implied_volatility = -0.3;
        let path = save_chain(tmp.path(), &saved).unwrap();

        let loaded = load_chain(&path).unwrap();
        assert_eq!(loaded.calls.len(), 1);
        assert_eq!(loaded.calls[0].strike, Decimal::from(100));
        assert_eq!(loaded.calls[0].implied_volatility, 0.0);
        assert_eq!(loaded.puts[0].open_interest, 0);

        let overview = crate::analytics::analyze_overview(&loaded);
        assert!(overview.pcr_oi >= 0.0);
        assert_eq!(overview.call_wall, Some(Decimal::from(100)));
    }

    #[test]
    fn test_load_rejects_non_positive_spot() {
        let tmp = TempDir::new().unwrap();
        let mut saved = chain(vec![row(100, 10, 1)], vec![]);
        saved.underlying_spot = Decimal::from(-5);
        let path = save_chain(tmp.path(), &saved).unwrap();

        assert!(matches!(
            load_chain(&path),
            Err(FetchError::Normalize(NormalizeError::MalformedInput(_)))
        ));
    }

    #[test]
    fn test_load_rejects_other_json() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("x.json");
        fs::write(&path, "{\"calls\": 3}").unwrap();
        assert!(matches!(
            load_chain(&path),
            Err(FetchError::InvalidResponse(_))
        ));
    }
}
