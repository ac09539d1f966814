pub mod detector;
pub mod fingerprint;
pub mod orchestrator;
pub mod periodic;
pub mod retry;
pub mod types;

pub use detector::{classify, Classification, IndexEntry};
pub use fingerprint::{fingerprint_listing, Fingerprint};
pub use orchestrator::SyncOrchestrator;
pub use periodic::{run_periodic, PeriodicSchedule};
pub use retry::RetryConfig;
pub use types::SyncOptions;
