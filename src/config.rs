//! Configuration loading.
//!
//! Precedence (highest to lowest):
//! 1. CLI flags (applied by the binary)
//! 2. Environment variables prefixed `HOUSING_SYNC__`, with `__` between
//!    levels, e.g. `HOUSING_SYNC__SYNC__CONCURRENCY=4`
//! 3. Config file (`housing-sync.toml` in the working directory, or `--config`)
//! 4. Built-in defaults
//!
//! Example config file:
//! ```toml
//! data_dir = "data"
//! listing_url = "https://www.realestate.com.au/buy/in-brisbane+-+greater+region,+qld/list-1"
//!
//! [sync]
//! concurrency = 3
//! max_pages = 20
//! max_new_properties = 100
//!
//! [transport]
//! kind = "http"
//!
//! [transport.scraping_api]
//! endpoint = "https://app.scrapingbee.com/api/v1/"
//! api_key = "..."
//! country_code = "au"
//! ```

use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{ensure, Context, Result};
use config::{Config as ConfigBuilder, Environment, File, FileFormat};
use serde::Deserialize;

use crate::scrapers::types::TransportConfig;
use crate::store::DEFAULT_RUN_LOG_CAPACITY;
use crate::sync::retry::RetryConfig;
use crate::sync::types::{
    SyncOptions, DEFAULT_CONCURRENCY, DEFAULT_MAX_ATTEMPTS, DEFAULT_MAX_NEW_PROPERTIES,
    DEFAULT_MAX_PAGES, INITIAL_BACKOFF_MS, MAX_BACKOFF_MS,
};

pub const DEFAULT_CONFIG_FILE: &str = "housing-sync.toml";
pub const ENV_PREFIX: &str = "HOUSING_SYNC";
pub const DEFAULT_LISTING_URL: &str =
    "https://www.realestate.com.au/buy/in-brisbane+-+greater+region,+qld/list-1";

/// Top-level configuration.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    /// Root of the property store and run log.
    pub data_dir: PathBuf,
    /// Search to sync when none is given on the command line.
    pub listing_url: String,
    pub sync: SyncConfig,
    pub transport: TransportConfig,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            data_dir: PathBuf::from("data"),
            listing_url: DEFAULT_LISTING_URL.to_string(),
            sync: SyncConfig::default(),
            transport: TransportConfig::default(),
        }
    }
}

/// Sync engine tuning.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct SyncConfig {
    pub concurrency: usize,
    pub max_pages: u32,
    pub max_new_properties: usize,
    pub max_attempts: usize,
    pub min_backoff_ms: u64,
    pub max_backoff_ms: u64,
    /// Hours between runs in periodic mode.
    pub interval_hours: u64,
    pub run_log_capacity: usize,
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            concurrency: DEFAULT_CONCURRENCY,
            max_pages: DEFAULT_MAX_PAGES,
            max_new_properties: DEFAULT_MAX_NEW_PROPERTIES,
            max_attempts: DEFAULT_MAX_ATTEMPTS,
            min_backoff_ms: INITIAL_BACKOFF_MS,
            max_backoff_ms: MAX_BACKOFF_MS,
            interval_hours: 24,
            run_log_capacity: DEFAULT_RUN_LOG_CAPACITY,
        }
    }
}

impl SyncConfig {
    pub fn to_options(&self) -> SyncOptions {
        SyncOptions {
            concurrency: self.concurrency,
            max_pages: self.max_pages,
            retry: RetryConfig::new(
                Duration::from_millis(self.min_backoff_ms),
                Duration::from_millis(self.max_backoff_ms),
                self.max_attempts,
            ),
        }
    }

    pub fn interval(&self) -> Duration {
        Duration::from_secs(self.interval_hours.saturating_mul(3600))
    }
}

impl AppConfig {
    /// Load from the given file (required) or the default file (optional),
    /// then apply environment overrides.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let file = match path {
            Some(p) => File::from(p).format(FileFormat::Toml).required(true),
            None => File::new(DEFAULT_CONFIG_FILE, FileFormat::Toml).required(false),
        };

        let config: Self = ConfigBuilder::builder()
            .add_source(file)
            .add_source(
                Environment::with_prefix(ENV_PREFIX)
                    .prefix_separator("__")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()
            .context("Failed to read configuration")?
            .try_deserialize()
            .context("Invalid configuration")?;

        config.validate()?;
        Ok(config)
    }

    /// Parse a TOML document on top of the defaults.
    pub fn from_toml(toml: &str) -> Result<Self> {
        let config: Self = ConfigBuilder::builder()
            .add_source(File::from_str(toml, FileFormat::Toml))
            .build()
            .context("Failed to read configuration")?
            .try_deserialize()
            .context("Invalid configuration")?;

        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        ensure!(!self.data_dir.as_os_str().is_empty(), "data_dir must not be empty");
        ensure!(self.sync.concurrency > 0, "sync.concurrency must be at least 1");
        ensure!(self.sync.max_attempts > 0, "sync.max_attempts must be at least 1");
        ensure!(self.sync.max_pages > 0, "sync.max_pages must be at least 1");
        ensure!(
            self.sync.min_backoff_ms <= self.sync.max_backoff_ms,
            "sync.min_backoff_ms must not exceed sync.max_backoff_ms"
        );
        if let Some(api) = &self.transport.scraping_api {
            ensure!(!api.api_key.is_empty(), "transport.scraping_api.api_key is empty");
        }
        Ok(())
    }
}
