//! Options chain analyzer CLI.
//!
//! # Usage
//!
//! ```bash
//! # Analyze one expiration (fetched from NASDAQ, cached on disk)
//! options-analyzer analyze --ticker AMD --expiry 2025-07-11
//!
//! # Analyze a saved chain as JSON
//! options-analyzer analyze-file --path scheduled_data/AMD_open_2025-07-08_09-35-00/AMD_2025-07-11.json --json
//!
//! # List expirations
//! options-analyzer expirations --ticker AMD
//!
//! # Save every expiration to a timestamped session directory
//! options-analyzer snapshot --ticker AMD --label open
//!
//! # One-line summary per saved chain
//! options-analyzer summarize --dir scheduled_data/AMD_open_2025-07-08_09-35-00
//! ```

use std::path::{Path, PathBuf};
use std::process::ExitCode;

use anyhow::{Context, Result};
use chrono::NaiveDate;
use clap::{Parser, Subcommand};
use rayon::prelude::*;
use tracing::info;

use options_analyzer::config::AnalyzerConfig;
use options_analyzer::data::{load_chain, Chain, ChainSource, FetchError, FileSource, NasdaqClient, Snapshotter};
use options_analyzer::report::AnalysisReport;

#[derive(Parser)]
#[command(name = "options-analyzer")]
#[command(about = "Options chain analytics: put/call ratios, max pain, gamma exposure")]
#[command(version)]
struct Cli {
    /// Path to configuration file
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Fetch and analyze one expiration
    Analyze {
        #[arg(short, long)]
        ticker: String,

        /// Expiration date (YYYY-MM-DD)
        #[arg(short, long)]
        expiry: String,

        /// Print the report as JSON
        #[arg(long)]
        json: bool,
    },

    /// Analyze a saved chain file
    AnalyzeFile {
        #[arg(short, long)]
        path: PathBuf,

        #[arg(long)]
        json: bool,
    },

    /// List available expiration dates
    Expirations {
        #[arg(short, long)]
        ticker: String,
    },

    /// Save every expiration of a ticker
    Snapshot {
        #[arg(short, long)]
        ticker: String,

        /// Session label, e.g. open or close
        #[arg(short, long, default_value = "manual")]
        label: String,

        /// Output directory (overrides config)
        #[arg(short, long)]
        out: Option<PathBuf>,
    },

    /// Summarize every saved chain in a directory
    Summarize {
        #[arg(short, long)]
        dir: PathBuf,
    },
}

fn print_report(report: &AnalysisReport, json: bool) -> Result<()> {
    if json {
        println!("{}", report.to_json().context("Failed to serialize report")?);
    } else {
        print!("{}", report.render_text());
    }
    Ok(())
}

async fn cmd_analyze(config: &AnalyzerConfig, ticker: &str, expiry: &str, json: bool) -> Result<()> {
    let expiration = NaiveDate::parse_from_str(expiry, "%Y-%m-%d")
        .context("Invalid expiry date format, expected YYYY-MM-DD")?;

    let mut client = NasdaqClient::new(&config.source)?;
    let chain = client.fetch_chain(ticker, expiration).await?;
    info!("{} requests made", client.request_count());

    let report = AnalysisReport::build(&chain, &config.analysis);
    print_report(&report, json)
}

fn cmd_analyze_file(config: &AnalyzerConfig, path: &Path, json: bool) -> Result<()> {
    let chain = load_chain(path)?;
    let report = AnalysisReport::build(&chain, &config.analysis);
    print_report(&report, json)
}

async fn cmd_expirations(config: &AnalyzerConfig, ticker: &str) -> Result<()> {
    let mut client = NasdaqClient::new(&config.source)?;
    let dates = client.expirations(ticker).await?;

    println!("{} expirations ({}):", ticker.to_uppercase(), dates.len());
    for date in dates {
        println!("  {}", date);
    }
    Ok(())
}

async fn cmd_snapshot(
    config: &AnalyzerConfig,
    ticker: &str,
    label: &str,
    out: Option<PathBuf>,
) -> Result<()> {
    let mut client = NasdaqClient::new(&config.source)?;
    let mut snapshotter = Snapshotter::new(&config.snapshot).with_progress(true);
    if let Some(dir) = out {
        snapshotter = snapshotter.with_output_dir(dir);
    }

    let run = snapshotter.run(&mut client, ticker, label).await?;

    println!("\nSnapshot complete!");
    println!("  Session: {}", run.session_dir.display());
    println!("  Chains saved: {}", run.saved.len());
    println!("  Expirations skipped: {}", run.skipped.len());
    println!("  Attempts: {}", run.attempts);
    println!("  Requests: {}", client.request_count());
    Ok(())
}

fn cmd_summarize(config: &AnalyzerConfig, dir: &Path) -> Result<()> {
    let files = FileSource::new(dir).chain_files()?;
    if files.is_empty() {
        return Err(FetchError::no_data(&dir.display().to_string(), "no saved chains").into());
    }

    // Chains are independent, so analyze them in parallel
    let lines: Vec<String> = files
        .par_iter()
        .map(|path| match load_chain(path) {
            Ok(chain) => summarize_chain(&chain, config),
            Err(e) => format!("{}: {}", path.display(), e),
        })
        .collect();

    for line in lines {
        println!("{}", line);
    }
    Ok(())
}

fn summarize_chain(chain: &Chain, config: &AnalyzerConfig) -> String {
    AnalysisReport::build(chain, &config.analysis).summary_line()
}

async fn run(cli: Cli) -> Result<()> {
    let config = AnalyzerConfig::load_or_default(cli.config.as_deref())
        .context("Failed to load configuration")?;

    match cli.command {
        Commands::Analyze { ticker, expiry, json } => {
            cmd_analyze(&config, &ticker, &expiry, json).await
        }
        Commands::AnalyzeFile { path, json } => cmd_analyze_file(&config, &path, json),
        Commands::Expirations { ticker } => cmd_expirations(&config, &ticker).await,
        Commands::Snapshot { ticker, label, out } => {
            cmd_snapshot(&config, &ticker, &label, out).await
        }
        Commands::Summarize { dir } => cmd_summarize(&config, &dir),
    }
}

#[tokio::main]
async fn main() -> ExitCode {
    // Initialize logging
    let filter = tracing_subscriber::EnvFilter::from_default_env();
    let filter = match "options_analyzer=info".parse() {
        Ok(directive) => filter.add_directive(directive),
        Err(_) => filter,
    };
    tracing_subscriber::fmt().with_env_filter(filter).init();

    let cli = Cli::parse();

    match run(cli).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            if let Some(fetch) = e.downcast_ref::<FetchError>() {
                if fetch.is_no_data() {
                    eprintln!("No data: {}", fetch);
                    return ExitCode::from(2);
                }
            }
            eprintln!("Error: {:#}", e);
            ExitCode::FAILURE
        }
    }
}
