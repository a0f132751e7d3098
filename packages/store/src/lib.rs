#![cfg_attr(feature = "fail-on-warnings", deny(warnings))]
#![warn(clippy::all, clippy::pedantic, clippy::nursery, clippy::cargo)]
#![allow(clippy::multiple_crate_versions)]

//! Embedded document store for the collision pipeline.
//!
//! Named collections of JSON documents are kept in a single `DuckDB`
//! database, one table per collection plus a `_collections` registry.
//! [`StoreGateway`] is the lazy-connecting entry point; [`Collection`]
//! is the narrow per-collection interface (count, paged find, unordered
//! bulk insert, unique key declaration).

pub mod collection;
pub mod gateway;

pub use collection::{Collection, InsertOutcome};
pub use gateway::StoreGateway;

use std::path::PathBuf;

/// Errors that can occur during store operations.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    /// Underlying `DuckDB` error.
    #[error("Store error: {0}")]
    DuckDb(#[from] duckdb::Error),

    /// I/O error (data directory creation).
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// A stored document failed to parse back out of the store.
    #[error("Stored document is not valid JSON: {0}")]
    Json(#[from] serde_json::Error),

    /// Collection names are restricted to `[A-Za-z0-9_]` because they are
    /// embedded in table identifiers.
    #[error("Invalid collection name: {name:?}")]
    InvalidName {
        /// The rejected name.
        name: String,
    },
}

/// Location of the backing `DuckDB` database.
#[derive(Debug, Clone)]
pub struct StoreConfig {
    /// Directory holding the database file.
    pub data_dir: PathBuf,
    /// Database name; the file is `{data_dir}/{database}.duckdb`.
    pub database: String,
    /// Use a transient in-memory database instead of a file. Intended for
    /// tests; the contents vanish when the connection closes.
    pub in_memory: bool,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            data_dir: PathBuf::from("data"),
            database: "nyc_collisions".to_string(),
            in_memory: false,
        }
    }
}

impl StoreConfig {
    /// A transient in-memory store for tests.
    #[must_use]
    pub fn memory() -> Self {
        Self {
            in_memory: true,
            ..Self::default()
        }
    }

    /// Path of the backing database file.
    #[must_use]
    pub fn database_path(&self) -> PathBuf {
        self.data_dir.join(format!("{}.duckdb", self.database))
    }
}

pub(crate) fn validate_name(name: &str) -> Result<(), StoreError> {
    if !name.is_empty()
        && name
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '_')
    {
        Ok(())
    } else {
        Err(StoreError::InvalidName {
            name: name.to_string(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn accepts_plain_collection_names() {
        assert!(validate_name("raw_vehicle_collisions").is_ok());
        assert!(validate_name("gold_time_analysis").is_ok());
    }

    #[test]
    fn rejects_names_unsafe_for_identifiers() {
        assert!(validate_name("").is_err());
        assert!(validate_name("bad name").is_err());
        assert!(validate_name("x\"; DROP TABLE y; --").is_err());
    }

    #[test]
    fn database_path_joins_dir_and_name() {
        let config = StoreConfig {
            data_dir: PathBuf::from("/tmp/collisions"),
            database: "nyc".to_string(),
            in_memory: false,
        };
        assert_eq!(
            config.database_path(),
            PathBuf::from("/tmp/collisions/nyc.duckdb")
        );
    }
}
