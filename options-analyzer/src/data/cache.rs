//! File-based cache of raw option chain responses.
//!
//! One JSON file per ticker and expiration: `{dir}/{TICKER}_{YYYY-MM-DD}_all.json`.
//! A present file is a hit; entries never expire.

use std::fs;
use std::path::PathBuf;

use chrono::NaiveDate;
use serde_json::Value;
use tracing::{debug, warn};

#[derive(Debug, Clone)]
pub struct ResponseCache {
    dir: PathBuf,
}

impl ResponseCache {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn path_for(&self, ticker: &str, expiration: NaiveDate) -> PathBuf {
        self.dir.join(format!(
            "{}_{}_all.json",
            ticker.to_uppercase(),
            expiration.format("%Y-%m-%d")
        ))
    }

    /// Cached response, if any.
    ///
    /// An unreadable or corrupt file counts as a miss.
    pub fn get(&self, ticker: &str, expiration: NaiveDate) -> Option<Value> {
        let path = self.path_for(ticker, expiration);
        if !path.exists() {
            debug!("Cache MISS for {} {}", ticker, expiration);
            return None;
        }

        let parsed = fs::read_to_string(&path)
            .map_err(|e| e.to_string())
            .and_then(|content| serde_json::from_str(&content).map_err(|e| e.to_string()));

        match parsed {
            Ok(value) => {
                debug!("Cache HIT for {} {}", ticker, expiration);
                Some(value)
            }
            Err(e) => {
                warn!("Ignoring unreadable cache file {}: {}", path.display(), e);
                None
            }
        }
    }

    /// Store a response.
    pub fn put(&self, ticker: &str, expiration: NaiveDate, value: &Value) -> std::io::Result<PathBuf> {
        fs::create_dir_all(&self.dir)?;
        let path = self.path_for(ticker, expiration);
        let content = serde_json::to_string(value)?;
        fs::write(&path, content)?;
        Ok(path)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use tempfile::TempDir;

    fn expiry() -> NaiveDate {
        NaiveDate::from_ymd_opt(2025, 7, 11).unwrap()
    }

    #[test]
    fn test_path_layout() {
        let cache = ResponseCache::new("cache");
        assert_eq!(
            cache.path_for("amd", expiry()),
            PathBuf::from("cache/AMD_2025-07-11_all.json")
        );
    }

    #[test]
    fn test_miss_then_hit() {
        let tmp = TempDir::new().unwrap();
        let cache = ResponseCache::new(tmp.path().join("nested"));
        assert!(cache.get("AMD", expiry()).is_none());

        let value = json!({"data": {"table": {"rows": []}}});
        cache.put("AMD", expiry(), &value).unwrap();
        assert_eq!(cache.get("amd", expiry()), Some(value));
    }

    #[test]
    fn test_corrupt_file_is_miss() {
        let tmp = TempDir::new().unwrap();
        let cache = ResponseCache::new(tmp.path());
        fs::write(cache.path_for("AMD", expiry()), "{not json").unwrap();
        assert!(cache.get("AMD", expiry()).is_none());
    }
}
