use std::thread;
use std::time::Duration;

use anyhow::{Context, Result};
use async_trait::async_trait;
use headless_chrome::{Browser, LaunchOptions, Tab};
use tracing::{debug, info};

use crate::error::FetchError;
use crate::models::PropertyFields;
use crate::scrapers::realestate::{numbered_page_url, parse_detail_page, parse_listing_page};
use crate::scrapers::traits::{DetailFetcher, ListingFetcher};
use crate::scrapers::types::{Fetched, ListingPage, TransportConfig};

/// Browser-based fetcher using headless Chrome
///
/// Pages are rendered locally, so requests cost no credits. The parsing is
/// shared with [`RealEstateScraper`](crate::scrapers::RealEstateScraper).
pub struct BrowserScraper {
    browser: Browser,
    render_wait: Duration,
}

impl BrowserScraper {
    /// Launch headless Chrome
    pub fn new(config: &TransportConfig) -> Result<Self> {
        info!("Launching headless Chrome...");

        let options = LaunchOptions::default_builder()
            .headless(true)
            .idle_browser_timeout(idle_timeout(config.timeout_secs))
            .build()
            .context("Failed to build launch options")?;

        let browser = Browser::new(options).context("Failed to launch Chrome browser")?;

        Ok(Self {
            browser,
            render_wait: Duration::from_secs(config.render_wait_secs),
        })
    }

    /// Render `url` and return the final document HTML.
    async fn render(&self, url: &str) -> Result<String, FetchError> {
        let browser = self.browser.clone();
        let target = url.to_string();
        let wait = self.render_wait;

        tokio::task::spawn_blocking(move || render_blocking(&browser, &target, wait))
            .await
            .map_err(|e| FetchError::transport(url, e))?
            .map_err(|e| FetchError::transport(url, format!("{e:#}")))
    }
}

fn render_blocking(browser: &Browser, url: &str, wait: Duration) -> Result<String> {
    let tab = browser.new_tab().context("Failed to open tab")?;
    let html = read_rendered(&tab, url, wait);

    // Close on every path, including failed navigation
    if let Err(e) = tab.close(true) {
        debug!("Failed to close tab for {}: {}", url, e);
    }
    html
}

fn read_rendered(tab: &Tab, url: &str, wait: Duration) -> Result<String> {
    tab.navigate_to(url)?;
    tab.wait_until_navigated()?;

    // Give client-side rendering time to fill in the listing
    thread::sleep(wait);

    // Accept cookies if present
    let _ = tab.evaluate(
        r#"
        const button = document.querySelector('button[id*="accept"], button[class*="accept"]');
        if (button) button.click();
        "#,
        false,
    );

    let html = tab.get_content().context("Failed to read page HTML")?;
    debug!("Rendered {} ({} bytes)", url, html.len());
    Ok(html)
}

/// Browser idle timeout: four request timeouts, at least two minutes.
fn idle_timeout(timeout_secs: u64) -> Duration {
    Duration::from_secs(timeout_secs.max(30).saturating_mul(4))
}

#[async_trait]
impl ListingFetcher for BrowserScraper {
    async fn fetch_page(&self, url: &str) -> Result<Fetched<ListingPage>, FetchError> {
        let html = self.render(url).await?;
        let page = parse_listing_page(&html, url).map_err(|e| FetchError::parse(url, e))?;
        Ok(Fetched::free(page))
    }

    fn page_url(&self, base_url: &str, page_number: u32) -> Option<String> {
        numbered_page_url(base_url, page_number)
    }

    fn source_name(&self) -> &'static str {
        "realestate.com.au (browser)"
    }
}

#[async_trait]
impl DetailFetcher for BrowserScraper {
    async fn fetch_detail(&self, url: &str) -> Result<Fetched<PropertyFields>, FetchError> {
        let html = self.render(url).await?;
        let fields = parse_detail_page(&html).map_err(|e| FetchError::parse(url, e))?;
        Ok(Fetched::free(fields))
    }
}
