use serde::{Deserialize, Serialize};

use crate::models::ListingStub;

/// A fetch result together with the transport credits it consumed
#[derive(Debug, Clone, PartialEq)]
pub struct Fetched<T> {
    pub value: T,
    pub credits: u64,
}

impl<T> Fetched<T> {
    pub fn new(value: T, credits: u64) -> Self {
        Self { value, credits }
    }

    /// Result from a transport that does not meter requests.
    pub fn free(value: T) -> Self {
        Self { value, credits: 0 }
    }
}

/// One page of search results
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ListingPage {
    pub stubs: Vec<ListingStub>,
    pub next_page_url: Option<String>,
}

/// Which transport renders pages
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TransportKind {
    /// Plain HTTP, optionally routed through a scraping API
    #[default]
    Http,
    /// Local headless Chrome
    Browser,
}

/// Hosted scraping API settings (render + proxy service)
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ScrapingApiConfig {
    pub endpoint: String,
    pub api_key: String,
    #[serde(default = "default_render_js")]
    pub render_js: bool,
    #[serde(default)]
    pub country_code: Option<String>,
}

fn default_render_js() -> bool {
    true
}

/// Transport parameters handed to the fetchers at construction
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct TransportConfig {
    pub kind: TransportKind,
    pub user_agent: String,
    pub timeout_secs: u64,
    /// Seconds to wait for client-side rendering in browser mode
    pub render_wait_secs: u64,
    pub scraping_api: Option<ScrapingApiConfig>,
}

impl Default for TransportConfig {
    fn default() -> Self {
        Self {
            kind: TransportKind::Http,
            user_agent: "Mozilla/5.0 (Macintosh; Intel Mac OS X 10_15_7) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/120.0.0.0 Safari/537.36".to_string(),
            timeout_secs: 30,
            render_wait_secs: 5,
            scraping_api: None,
        }
    }
}
