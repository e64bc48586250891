//! Snapshot capture.
//!
//! Saves every available expiration of a ticker into one timestamped session
//! directory: `{output_dir}/{TICKER}_{label}_{YYYY-mm-dd_HH-MM-SS}/{TICKER}_{expiry}.json`.
//! A run that fails outright is retried after a delay; an expiration with no
//! data is skipped.

use std::path::PathBuf;
use std::time::Duration;

use chrono::{Local, NaiveDate};
use indicatif::{ProgressBar, ProgressStyle};
use serde::{Deserialize, Serialize};
use tracing::{error, info, warn};

use crate::config::SnapshotConfig;

use super::source::{save_chain, ChainSource, FetchError};

/// Outcome of a snapshot run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SnapshotRun {
    pub ticker: String,
    pub session_dir: PathBuf,
    pub saved: Vec<PathBuf>,
    /// Expirations skipped for lack of data.
    pub skipped: Vec<NaiveDate>,
    /// Attempts used, starting at 1.
    pub attempts: u32,
}

/// Captures snapshots from a [`ChainSource`].
pub struct Snapshotter {
    output_dir: PathBuf,
    max_retries: u32,
    retry_delay: Duration,
    show_progress: bool,
}

impl Snapshotter {
    pub fn new(config: &SnapshotConfig) -> Self {
        Self {
            output_dir: config.output_dir.clone(),
            max_retries: config.max_retries.max(1),
            retry_delay: Duration::from_secs(config.retry_delay_secs),
            show_progress: false,
        }
    }

    pub fn with_output_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.output_dir = dir.into();
        self
    }

    pub fn with_progress(mut self, show: bool) -> Self {
        self.show_progress = show;
        self
    }

    /// Session directory name for a run started now.
    pub fn session_dir(&self, ticker: &str, label: &str) -> PathBuf {
        let stamp = Local::now().format("%Y-%m-%d_%H-%M-%S");
        self.output_dir
            .join(format!("{}_{}_{}", ticker.to_uppercase(), label, stamp))
    }

    /// Capture every expiration, retrying the whole run on failure.
    pub async fn run<S: ChainSource>(
        &self,
        source: &mut S,
        ticker: &str,
        label: &str,
    ) -> Result<SnapshotRun, FetchError> {
        let mut attempt = 1;
        loop {
            info!(
                "Snapshot {} '{}' attempt {}/{}",
                ticker.to_uppercase(),
                label,
                attempt,
                self.max_retries
            );

            match self.run_once(source, ticker, label).await {
                Ok(mut run) => {
                    run.attempts = attempt;
                    info!(
                        "Snapshot complete: {} chains saved to {}",
                        run.saved.len(),
                        run.session_dir.display()
                    );
                    return Ok(run);
                }
                Err(e) if attempt < self.max_retries => {
                    warn!(
                        "Snapshot attempt {} failed: {}. Retrying in {:?}",
                        attempt, e, self.retry_delay
                    );
                    tokio::time::sleep(self.retry_delay).await;
                    attempt += 1;
                }
                Err(e) => {
                    error!("Snapshot failed after {} attempts: {}", attempt, e);
                    return Err(e);
                }
            }
        }
    }

    async fn run_once<S: ChainSource>(
        &self,
        source: &mut S,
        ticker: &str,
        label: &str,
    ) -> Result<SnapshotRun, FetchError> {
        let expirations = source.expirations(ticker).await?;
        if expirations.is_empty() {
            return Err(FetchError::no_data(ticker, "no expiration dates"));
        }

        let session_dir = self.session_dir(ticker, label);
        let pb = self.progress_bar(expirations.len() as u64);

        let mut saved = Vec::with_capacity(expirations.len());
        let mut skipped = Vec::new();

        for expiration in expirations {
            pb.set_message(format!("{} {}", ticker.to_uppercase(), expiration));
            match source.fetch_chain(ticker, expiration).await {
                Ok(chain) => saved.push(save_chain(&session_dir, &chain)?),
                Err(e) if e.is_no_data() => {
                    warn!("Skipping {}: {}", expiration, e);
                    skipped.push(expiration);
                }
                Err(e) => {
                    pb.abandon();
                    return Err(e);
                }
            }
            pb.inc(1);
        }
        pb.finish_with_message(format!("{} complete", ticker.to_uppercase()));

        Ok(SnapshotRun {
            ticker: ticker.to_uppercase(),
            session_dir,
            saved,
            skipped,
            attempts: 1,
        })
    }

    fn progress_bar(&self, len: u64) -> ProgressBar {
        if !self.show_progress {
            return ProgressBar::hidden();
        }
        let pb = ProgressBar::new(len);
        if let Ok(style) = ProgressStyle::default_bar()
            .template("{spinner:.green} [{elapsed_precise}] {bar:40.cyan/blue} {pos}/{len} {msg}")
        {
            pb.set_style(style.progress_chars("=>-"));
        }
        pb
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::types::fixtures::{chain, row};
    use crate::data::{Chain, FileSource};
    use std::path::Path;
    use tempfile::TempDir;

    /// In-memory source that can fail its first few listings.
    struct MockSource {
        chains: Vec<Chain>,
        missing: Vec<NaiveDate>,
        failures_left: u32,
        listing_calls: u32,
    }

    impl MockSource {
        fn new(chains: Vec<Chain>) -> Self {
            Self {
                chains,
                missing: vec![],
                failures_left: 0,
                listing_calls: 0,
            }
        }
    }

    impl ChainSource for MockSource {
        async fn expirations(&mut self, _ticker: &str) -> Result<Vec<NaiveDate>, FetchError> {
            self.listing_calls += 1;
            if self.failures_left > 0 {
                self.failures_left -= 1;
                return Err(FetchError::RateLimitExceeded);
            }
            let mut dates: Vec<NaiveDate> = self.chains.iter().map(|c| c.expiration).collect();
            dates.extend(self.missing.iter().copied());
            dates.sort();
            Ok(dates)
        }

        async fn fetch_chain(
            &mut self,
            ticker: &str,
            expiration: NaiveDate,
        ) -> Result<Chain, FetchError> {
            self.chains
                .iter()
                .find(|c| c.expiration == expiration)
                .cloned()
                .ok_or_else(|| FetchError::no_data(ticker, "missing"))
        }
    }

    fn expiring(date: NaiveDate) -> Chain {
        let mut c = chain(vec![row(100, 10, 1)], vec![row(95, 5, 1)]);
        c.expiration = date;
        c
    }

    fn config(dir: &Path, max_retries: u32) -> SnapshotConfig {
        SnapshotConfig {
            output_dir: dir.to_path_buf(),
            max_retries,
            retry_delay_secs: 0,
        }
    }

    #[tokio::test]
    async fn test_saves_each_expiration_and_skips_missing() {
        let tmp = TempDir::new().unwrap();
        let d1 = NaiveDate::from_ymd_opt(2025, 7, 11).unwrap();
        let d2 = NaiveDate::from_ymd_opt(2025, 7, 18).unwrap();
        let gap = NaiveDate::from_ymd_opt(2025, 7, 25).unwrap();

        let mut source = MockSource::new(vec![expiring(d1), expiring(d2)]);
        source.missing.push(gap);

        let run = Snapshotter::new(&config(tmp.path(), 3))
            .run(&mut source, "test", "open")
            .await
            .unwrap();

        assert_eq!(run.attempts, 1);
        assert_eq!(run.saved.len(), 2);
        assert_eq!(run.skipped, vec![gap]);

        let name = run.session_dir.file_name().unwrap().to_string_lossy().to_string();
        assert!(name.starts_with("TEST_open_"));
        assert_eq!(
            FileSource::new(&run.session_dir).chain_files().unwrap(),
            run.saved
        );
    }

    #[tokio::test]
    async fn test_retries_whole_run() {
        let tmp = TempDir::new().unwrap();
        let d1 = NaiveDate::from_ymd_opt(2025, 7, 11).unwrap();
        let mut source = MockSource::new(vec![expiring(d1)]);
        source.failures_left = 2;

        let run = Snapshotter::new(&config(tmp.path(), 3))
            .run(&mut source, "TEST", "close")
            .await
            .unwrap();
        assert_eq!(run.attempts, 3);
        assert_eq!(source.listing_calls, 3);
    }

    #[tokio::test]
    async fn test_gives_up_after_max_retries() {
        let tmp = TempDir::new().unwrap();
        let mut source = MockSource::new(vec![]);
        source.failures_left = 5;

        let err = Snapshotter::new(&config(tmp.path(), 2))
            .run(&mut source, "TEST", "close")
            .await
            .unwrap_err();
        assert!(matches!(err, FetchError::RateLimitExceeded));
        assert_eq!(source.listing_calls, 2);
    }

    #[tokio::test]
    async fn test_no_expirations_is_an_error() {
        let tmp = TempDir::new().unwrap();
        let mut source = MockSource::new(vec![]);
        let err = Snapshotter::new(&config(tmp.path(), 1))
            .run(&mut source, "TEST", "open")
            .await
            .unwrap_err();
        assert!(err.is_no_data());
    }
}
