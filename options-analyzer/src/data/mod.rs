pub mod cache;
pub mod nasdaq;
pub mod normalize;
pub mod snapshot;
pub mod source;
pub mod types;

pub use cache::ResponseCache;
pub use nasdaq::{NasdaqClient, RawContract};
pub use normalize::{normalize, NormalizeError};
pub use snapshot::{SnapshotRun, Snapshotter};
pub use source::{load_chain, save_chain, ChainSource, FetchError, FileSource};
pub use types::{Chain, OptionRow, OptionType};
