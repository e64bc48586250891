pub mod analytics;
pub mod config;
pub mod data;
pub mod pricing;
pub mod report;

// Re-export commonly used types
pub use analytics::{
    analyze_overview, build_exposure_profile, max_pain, AnalyticsError, ExposureResult,
    OverviewResult, StrikeProfile,
};
pub use config::{AnalyzerConfig, ConfigError};
pub use data::{normalize, Chain, ChainSource, FetchError, NasdaqClient, NormalizeError, OptionRow, OptionType};
pub use pricing::BlackScholes;
pub use report::AnalysisReport;
