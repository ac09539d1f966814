use super::retry::RetryConfig;

/// Concurrent detail fetches. Small: the source is rate limited.
pub const DEFAULT_CONCURRENCY: usize = 3;

/// Safety cap on listing pages per run.
pub const DEFAULT_MAX_PAGES: u32 = 20;

/// Default cap on detail fetches per run.
pub const DEFAULT_MAX_NEW_PROPERTIES: usize = 100;

/// Listing pass ends after this many pages fail back to back.
pub const MAX_CONSECUTIVE_PAGE_FAILURES: u32 = 2;

/// Attempts per fetch, including the first.
pub const DEFAULT_MAX_ATTEMPTS: usize = 3;

/// Initial backoff delay in milliseconds.
pub const INITIAL_BACKOFF_MS: u64 = 1_000;

/// Maximum backoff delay in milliseconds.
pub const MAX_BACKOFF_MS: u64 = 8_000;

/// Options for one orchestrator.
#[derive(Debug, Clone)]
pub struct SyncOptions {
    /// Size of the detail-fetch worker pool.
    pub concurrency: usize,
    /// Stop paginating after this many pages.
    pub max_pages: u32,
    /// Backoff applied to every page and detail fetch.
    pub retry: RetryConfig,
}

impl Default for SyncOptions {
    fn default() -> Self {
        Self {
            concurrency: DEFAULT_CONCURRENCY,
            max_pages: DEFAULT_MAX_PAGES,
            retry: RetryConfig::default(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sync_options_default() {
        let options = SyncOptions::default();

        assert_eq!(options.concurrency, DEFAULT_CONCURRENCY);
        assert_eq!(options.max_pages, DEFAULT_MAX_PAGES);
        assert_eq!(options.retry.max_attempts, DEFAULT_MAX_ATTEMPTS);
    }
}
