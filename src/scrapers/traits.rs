use async_trait::async_trait;

use crate::error::FetchError;
use crate::models::PropertyFields;
use crate::scrapers::types::{Fetched, ListingPage};

/// Fetches search result pages.
///
/// Pagination is sequential: the next page URL is known only once the
/// current page has been read.
#[async_trait]
pub trait ListingFetcher: Send + Sync {
    /// Fetch one search page and its continuation link.
    async fn fetch_page(&self, url: &str) -> Result<Fetched<ListingPage>, FetchError>;

    /// URL of page `page_number` (1-indexed) of the search at `base_url`.
    ///
    /// Lets the sync engine step over a page that keeps failing. Sources
    /// without numbered pages return `None`.
    fn page_url(&self, _base_url: &str, _page_number: u32) -> Option<String> {
        None
    }

    /// Get the name of the listing source
    fn source_name(&self) -> &'static str;
}

/// Fetches and normalizes one property detail page.
#[async_trait]
pub trait DetailFetcher: Send + Sync {
    async fn fetch_detail(&self, url: &str) -> Result<Fetched<PropertyFields>, FetchError>;
}
