#![cfg_attr(feature = "fail-on-warnings", deny(warnings))]
#![warn(clippy::all, clippy::pedantic, clippy::nursery, clippy::cargo)]
#![allow(clippy::multiple_crate_versions)]

//! Paginated fetcher for the NYC Open Data collisions dataset.
//!
//! The upstream Socrata endpoint pages through `$limit`/`$offset` query
//! parameters and returns a bare JSON array of flat record objects. A
//! non-success status ends pagination cleanly rather than raising.

pub mod parsing;

use serde_json::{Map, Value};

/// NYC Open Data "Motor Vehicle Collisions - Crashes" dataset.
/// <https://data.cityofnewyork.us/resource/h9gi-nx95>
pub const COLLISIONS_API_URL: &str = "https://data.cityofnewyork.us/resource/h9gi-nx95.json";

/// Errors that can occur while fetching from the upstream source.
#[derive(Debug, thiserror::Error)]
pub enum SourceError {
    /// HTTP transport or body decoding failed.
    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),
}

/// Where and how to page the upstream dataset.
#[derive(Debug, Clone)]
pub struct SourceConfig {
    /// Base API URL.
    pub api_url: String,
    /// Records per page.
    pub page_size: u64,
}

impl Default for SourceConfig {
    fn default() -> Self {
        Self {
            api_url: COLLISIONS_API_URL.to_string(),
            page_size: 50_000,
        }
    }
}

/// Fetches pages of raw collision records from the upstream API.
pub struct PageFetcher {
    client: reqwest::blocking::Client,
    config: SourceConfig,
}

impl PageFetcher {
    #[must_use]
    pub fn new(config: SourceConfig) -> Self {
        Self {
            client: reqwest::blocking::Client::new(),
            config,
        }
    }

    /// The configured page size.
    #[must_use]
    pub const fn page_size(&self) -> u64 {
        self.config.page_size
    }

    /// Fetches one page of records starting at `offset`.
    ///
    /// A non-success HTTP status is logged and returned as `Ok(None)`,
    /// which ends the ingestion run cleanly.
    ///
    /// # Errors
    ///
    /// Returns [`SourceError`] if the request cannot be sent or the body
    /// is not a JSON array.
    pub fn fetch_page(&self, offset: u64) -> Result<Option<Vec<Map<String, Value>>>, SourceError> {
        let response = self
            .client
            .get(&self.config.api_url)
            .query(&[
                ("$limit", self.config.page_size.to_string()),
                ("$offset", offset.to_string()),
            ])
            .send()?;

        if !response.status().is_success() {
            log::error!("Error fetching data: {}", response.status());
            return Ok(None);
        }

        let records: Vec<Map<String, Value>> = response.json()?;
        log::info!("Fetched {} records (offset {offset})", records.len());
        Ok(Some(records))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_targets_the_collisions_dataset() {
        let config = SourceConfig::default();
        assert_eq!(config.api_url, COLLISIONS_API_URL);
        assert_eq!(config.page_size, 50_000);
    }
}
