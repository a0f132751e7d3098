#![cfg_attr(feature = "fail-on-warnings", deny(warnings))]
#![warn(clippy::all, clippy::pedantic, clippy::nursery, clippy::cargo)]
#![allow(clippy::multiple_crate_versions, clippy::cargo_common_metadata)]

//! Batch cleaning of the raw collection into the clean collection.
//!
//! The cleaner drops and rebuilds the clean collection on every run,
//! declares a unique key on `collision_id`, and walks the raw collection
//! in fixed-size batches. A batch that fails wholesale is logged and
//! skipped; a document that fails normalization is dropped and recorded,
//! and neither aborts the run.

pub mod normalize;

use std::sync::Arc;

use serde_json::Value;

use nyc_collisions_models::collections;
use nyc_collisions_models::progress::ProgressCallback;
use nyc_collisions_store::{StoreError, StoreGateway};

use crate::normalize::clean_document;

/// Errors that end a cleaning run.
#[derive(Debug, thiserror::Error)]
pub enum CleanError {
    /// Store access failed.
    #[error(transparent)]
    Store(#[from] StoreError),

    /// A cleaned record could not be serialized.
    #[error(transparent)]
    Json(#[from] serde_json::Error),
}

/// Batch sizing for the cleaning pass.
#[derive(Debug, Clone, Copy)]
pub struct CleanConfig {
    /// Raw documents processed per batch.
    pub batch_size: u64,
}

impl Default for CleanConfig {
    fn default() -> Self {
        Self { batch_size: 10_000 }
    }
}

/// One dropped document and why it was dropped.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DocumentFailure {
    /// The document's `collision_id`, when it had one.
    pub collision_id: Option<String>,
    /// Human-readable normalization failure.
    pub reason: String,
}

/// Tally of one cleaning run.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CleanOutcome {
    /// Raw documents present when the run started.
    pub total_raw: u64,
    /// Batches processed, including failed ones.
    pub batches: u64,
    /// Batches skipped wholesale after a store error.
    pub failed_batches: u64,
    /// Documents that normalized successfully.
    pub cleaned: u64,
    /// Documents dropped by normalization.
    pub dropped: u64,
    /// Cleaned documents actually written.
    pub inserted: u64,
    /// Cleaned documents skipped as duplicate `collision_id`s.
    pub duplicates: u64,
    /// Per-document drop reasons, in raw-collection order.
    pub failures: Vec<DocumentFailure>,
}

/// Raw-versus-clean counts after a run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct VerifyReport {
    /// Documents in the raw collection.
    pub raw_count: u64,
    /// Documents in the clean collection.
    pub clean_count: u64,
    /// `raw_count - clean_count`; positive when documents were dropped or
    /// deduplicated.
    pub difference: i64,
}

/// Cleans the raw collection into the clean collection in batches.
pub struct DataCleaner {
    gateway: StoreGateway,
    config: CleanConfig,
}

struct WindowStats {
    cleaned: u64,
    dropped: u64,
    inserted: u64,
    duplicates: u64,
    failures: Vec<DocumentFailure>,
}

impl DataCleaner {
    #[must_use]
    pub const fn new(gateway: StoreGateway, config: CleanConfig) -> Self {
        Self { gateway, config }
    }

    /// Runs the full cleaning pass. The store connection is released on
    /// every exit path.
    ///
    /// # Errors
    ///
    /// Returns [`CleanError`] if the raw or clean collection cannot be
    /// resolved or the clean collection cannot be rebuilt. Per-batch and
    /// per-document failures are recorded in the outcome instead.
    pub fn clean(
        &mut self,
        progress: &Arc<dyn ProgressCallback>,
    ) -> Result<CleanOutcome, CleanError> {
        let result = self.clean_inner(progress);
        self.gateway.close();
        result
    }

    fn clean_inner(
        &mut self,
        progress: &Arc<dyn ProgressCallback>,
    ) -> Result<CleanOutcome, CleanError> {
        let raw = self
            .gateway
            .collection(collections::RAW_VEHICLE_COLLISIONS)?;

        // Rebuild the clean collection from scratch so reruns are
        // idempotent in shape as well as content.
        self.gateway
            .drop_collection(collections::CLEAN_VEHICLE_COLLISIONS);
        let mut clean = self
            .gateway
            .collection(collections::CLEAN_VEHICLE_COLLISIONS)?;
        clean.create_unique_index("collision_id")?;

        let mut outcome = CleanOutcome {
            total_raw: raw.count()?,
            ..CleanOutcome::default()
        };
        log::info!("Cleaning {} raw documents", outcome.total_raw);
        progress.set_total(outcome.total_raw);

        let mut offset: u64 = 0;
        while offset < outcome.total_raw {
            outcome.batches += 1;
            match Self::process_window(&raw, &clean, offset, self.config.batch_size) {
                Ok(stats) => {
                    outcome.cleaned += stats.cleaned;
                    outcome.dropped += stats.dropped;
                    outcome.inserted += stats.inserted;
                    outcome.duplicates += stats.duplicates;
                    outcome.failures.extend(stats.failures);
                }
                Err(e) => {
                    log::error!("Error processing batch starting at {offset}: {e}");
                    outcome.failed_batches += 1;
                }
            }
            progress.inc(self.config.batch_size.min(outcome.total_raw - offset));
            offset += self.config.batch_size;
        }

        log::info!(
            "Cleaning complete: {} cleaned, {} dropped, {} inserted, {} duplicates",
            outcome.cleaned,
            outcome.dropped,
            outcome.inserted,
            outcome.duplicates
        );
        progress.finish(format!("Cleaned {} records", outcome.inserted));
        Ok(outcome)
    }

    fn process_window(
        raw: &nyc_collisions_store::Collection,
        clean: &nyc_collisions_store::Collection,
        offset: u64,
        batch_size: u64,
    ) -> Result<WindowStats, CleanError> {
        let mut stats = WindowStats {
            cleaned: 0,
            dropped: 0,
            inserted: 0,
            duplicates: 0,
            failures: Vec::new(),
        };

        let mut cleaned_docs: Vec<Value> = Vec::new();
        for doc in raw.find(offset, batch_size)? {
            match clean_document(&doc) {
                Ok(record) => {
                    cleaned_docs.push(serde_json::to_value(&record)?);
                    stats.cleaned += 1;
                }
                Err(e) => {
                    let collision_id = doc
                        .get("collision_id")
                        .and_then(Value::as_str)
                        .map(ToString::to_string);
                    log::warn!(
                        "Dropping document (collision_id {:?}): {e}",
                        collision_id.as_deref().unwrap_or("<none>")
                    );
                    stats.failures.push(DocumentFailure {
                        collision_id,
                        reason: e.to_string(),
                    });
                    stats.dropped += 1;
                }
            }
        }

        let insert = clean.insert_many(&cleaned_docs)?;
        stats.inserted = insert.inserted;
        stats.duplicates = insert.duplicates;
        Ok(stats)
    }

    /// Compares raw and clean counts and logs a sample cleaned document.
    /// Reconnects if the gateway was closed by a prior [`DataCleaner::clean`]
    /// call; the connection is released again before returning.
    ///
    /// # Errors
    ///
    /// Returns [`CleanError`] if either collection cannot be counted.
    pub fn verify(&mut self) -> Result<VerifyReport, CleanError> {
        let result = self.verify_inner();
        self.gateway.close();
        result
    }

    fn verify_inner(&mut self) -> Result<VerifyReport, CleanError> {
        let raw = self
            .gateway
            .collection(collections::RAW_VEHICLE_COLLISIONS)?;
        let clean = self
            .gateway
            .collection(collections::CLEAN_VEHICLE_COLLISIONS)?;

        let raw_count = raw.count()?;
        let clean_count = clean.count()?;
        #[allow(clippy::cast_possible_wrap)]
        let report = VerifyReport {
            raw_count,
            clean_count,
            difference: raw_count as i64 - clean_count as i64,
        };

        log::info!("Raw collection: {raw_count} documents");
        log::info!("Clean collection: {clean_count} documents");
        log::info!("Difference: {} documents", report.difference);
        if let Some(sample) = clean.find_one()? {
            log::info!("Sample cleaned document: {sample}");
        }

        Ok(report)
    }
}
