pub mod config;
pub mod error;
pub mod models;
pub mod scrapers;
pub mod store;
pub mod sync;

pub use error::{FetchError, StoreError, SyncError};
pub use models::{ListingStatus, ListingStub, PropertyFields, PropertyRecord};
pub use store::{PropertyStore, RunLog, SyncRun};
pub use sync::{SyncOptions, SyncOrchestrator};
