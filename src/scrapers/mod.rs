pub mod browser;
pub mod realestate;
pub mod traits;
pub mod types;

use std::sync::Arc;

use anyhow::Result;

pub use browser::BrowserScraper;
pub use realestate::RealEstateScraper;
pub use traits::{DetailFetcher, ListingFetcher};
pub use types::{Fetched, ListingPage, TransportConfig, TransportKind};

/// Build the listing and detail fetchers for the configured transport.
///
/// Both roles share one client (or one browser).
pub fn build_fetchers(config: &TransportConfig) -> Result<(Arc<dyn ListingFetcher>, Arc<dyn DetailFetcher>)> {
    match config.kind {
        TransportKind::Http => {
            let scraper = Arc::new(RealEstateScraper::new(config.clone())?);
            let listings: Arc<dyn ListingFetcher> = scraper.clone();
            let details: Arc<dyn DetailFetcher> = scraper;
            Ok((listings, details))
        }
        TransportKind::Browser => {
            let scraper = Arc::new(BrowserScraper::new(config)?);
            let listings: Arc<dyn ListingFetcher> = scraper.clone();
            let details: Arc<dyn DetailFetcher> = scraper;
            Ok((listings, details))
        }
    }
}
