pub mod classifier;
pub mod config;
pub mod fetcher;
pub mod matcher;
pub mod plugins;
pub mod scheduler;
pub mod tracker;
pub mod utils;

// Re-export commonly used types
pub use classifier::{Reason, StockClassifier, Verdict};
pub use config::{AppConfig, WatchMode};
pub use fetcher::{ControlState, FetchStrategy, PageContent, PageFetcher};
pub use scheduler::{CycleReport, StockWatcher};
pub use tracker::{Transition, TransitionTracker};
pub use utils::error::{AppError, FetchError, FetchErrorKind};

pub type Result<T> = std::result::Result<T, AppError>;
