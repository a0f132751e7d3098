#![cfg_attr(feature = "fail-on-warnings", deny(warnings))]
#![warn(clippy::all, clippy::pedantic, clippy::nursery, clippy::cargo)]
#![allow(clippy::multiple_crate_versions, clippy::cargo_common_metadata)]

//! Gold-layer aggregations over the clean collision collection.
//!
//! The engine streams the clean collection in fixed-size windows, folds
//! all three groupings in one pass, then rebuilds each gold collection
//! with the computed rows. The store itself has no query language, so
//! the grouping happens here rather than being pushed down.
//!
//! Rows sorted by accident count break ties in first-seen order.

use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;

use chrono::Timelike;
use serde_json::Value;

use nyc_collisions_models::progress::ProgressCallback;
use nyc_collisions_models::{BoroughRow, CleanRecord, HourlyRow, VehicleRow, collections};
use nyc_collisions_store::{StoreError, StoreGateway};

/// Errors that end a gold-layer run.
#[derive(Debug, thiserror::Error)]
pub enum GoldError {
    /// Store access failed.
    #[error(transparent)]
    Store(#[from] StoreError),

    /// A computed row could not be serialized.
    #[error(transparent)]
    Json(#[from] serde_json::Error),
}

/// Tuning knobs for the gold layer.
#[derive(Debug, Clone, Copy)]
pub struct GoldConfig {
    /// Clean documents streamed per window.
    pub batch_size: u64,
    /// Vehicle types kept in the vehicle analysis, ranked by accidents.
    pub top_vehicles_limit: usize,
}

impl Default for GoldConfig {
    fn default() -> Self {
        Self {
            batch_size: 10_000,
            top_vehicles_limit: 10,
        }
    }
}

/// Tally of one full gold-layer run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct GoldSummary {
    /// Clean documents aggregated.
    pub clean_count: u64,
    /// Clean documents skipped because they did not deserialize.
    pub skipped: u64,
    /// Rows written to the hourly analysis.
    pub hourly_rows: u64,
    /// Rows written to the borough analysis.
    pub borough_rows: u64,
    /// Rows written to the vehicle analysis.
    pub vehicle_rows: u64,
}

/// Computes the gold aggregations and writes them back to the store.
pub struct AggregationEngine {
    gateway: StoreGateway,
    config: GoldConfig,
}

impl AggregationEngine {
    #[must_use]
    pub const fn new(gateway: StoreGateway, config: GoldConfig) -> Self {
        Self { gateway, config }
    }

    /// Runs all three aggregations in one streaming pass. The store
    /// connection is released on every exit path.
    ///
    /// # Errors
    ///
    /// Returns [`GoldError`] if the clean collection cannot be read or a
    /// gold collection cannot be rebuilt. A clean document that fails to
    /// deserialize is logged and skipped instead.
    pub fn run_all(
        &mut self,
        progress: &Arc<dyn ProgressCallback>,
    ) -> Result<GoldSummary, GoldError> {
        let result = self.run_all_inner(progress);
        self.gateway.close();
        result
    }

    fn run_all_inner(
        &mut self,
        progress: &Arc<dyn ProgressCallback>,
    ) -> Result<GoldSummary, GoldError> {
        let clean = self
            .gateway
            .collection(collections::CLEAN_VEHICLE_COLLISIONS)?;

        let total = clean.count()?;
        log::info!("Aggregating {total} clean documents");
        progress.set_total(total);

        let mut groups = Groups::default();
        let mut summary = GoldSummary::default();
        let mut offset: u64 = 0;
        while offset < total {
            let window = clean.find(offset, self.config.batch_size)?;
            let fetched = window.len() as u64;
            for doc in window {
                match serde_json::from_value::<CleanRecord>(doc) {
                    Ok(record) => {
                        groups.fold(&record);
                        summary.clean_count += 1;
                    }
                    Err(e) => {
                        log::warn!("Skipping malformed clean document: {e}");
                        summary.skipped += 1;
                    }
                }
            }
            progress.inc(fetched);
            offset += self.config.batch_size;
        }

        let hourly = groups.hourly_rows();
        self.store_rows(collections::GOLD_TIME_ANALYSIS, &hourly)?;
        log::info!("Created time-based analysis ({} rows)", hourly.len());

        let boroughs = groups.borough_rows();
        self.store_rows(collections::GOLD_BOROUGH_ANALYSIS, &boroughs)?;
        log::info!("Created borough analysis ({} rows)", boroughs.len());

        let vehicles = groups.vehicle_rows(self.config.top_vehicles_limit);
        self.store_rows(collections::GOLD_VEHICLE_ANALYSIS, &vehicles)?;
        log::info!("Created vehicle analysis ({} rows)", vehicles.len());

        summary.hourly_rows = hourly.len() as u64;
        summary.borough_rows = boroughs.len() as u64;
        summary.vehicle_rows = vehicles.len() as u64;
        progress.finish("Gold layer complete".to_string());
        Ok(summary)
    }

    /// Rebuilds one gold collection with freshly computed rows.
    fn store_rows<T: serde::Serialize>(
        &mut self,
        name: &str,
        rows: &[T],
    ) -> Result<(), GoldError> {
        self.gateway.drop_collection(name);
        let coll = self.gateway.collection(name)?;

        if rows.is_empty() {
            log::warn!("No results found for {name}");
            return Ok(());
        }

        let docs = rows
            .iter()
            .map(serde_json::to_value)
            .collect::<Result<Vec<Value>, _>>()?;
        coll.insert_many(&docs)?;
        Ok(())
    }
}

/// Accumulators for the three groupings, folded in insertion order.
#[derive(Default)]
pub struct Groups {
    by_hour: BTreeMap<u32, HourlyRow>,
    boroughs: Vec<BoroughRow>,
    borough_index: HashMap<String, usize>,
    vehicles: Vec<VehicleRow>,
    vehicle_index: HashMap<String, usize>,
}

impl Groups {
    /// Folds one record into all three groupings.
    pub fn fold(&mut self, record: &CleanRecord) {
        let casualties = &record.casualties;

        let hour = record.crash_datetime.hour();
        let row = self.by_hour.entry(hour).or_insert_with(|| HourlyRow {
            hour,
            total_accidents: 0,
            total_injured: 0,
            total_killed: 0,
        });
        row.total_accidents += 1;
        row.total_injured += u64::from(casualties.total_injured);
        row.total_killed += u64::from(casualties.total_killed);

        let borough = record.location.borough.as_str();
        if borough != "Unknown" {
            let idx = *self
                .borough_index
                .entry(borough.to_string())
                .or_insert_with(|| {
                    self.boroughs.push(BoroughRow {
                        borough: borough.to_string(),
                        total_accidents: 0,
                        total_injured: 0,
                        total_killed: 0,
                        pedestrian_injured: 0,
                        cyclist_injured: 0,
                        motorist_injured: 0,
                    });
                    self.boroughs.len() - 1
                });
            let row = &mut self.boroughs[idx];
            row.total_accidents += 1;
            row.total_injured += u64::from(casualties.total_injured);
            row.total_killed += u64::from(casualties.total_killed);
            row.pedestrian_injured += u64::from(casualties.pedestrians.injured);
            row.cyclist_injured += u64::from(casualties.cyclists.injured);
            row.motorist_injured += u64::from(casualties.motorists.injured);
        }

        let vehicle_type = record.vehicles.vehicle_1.vehicle_type.as_str();
        if vehicle_type != "Unknown" {
            let idx = *self
                .vehicle_index
                .entry(vehicle_type.to_string())
                .or_insert_with(|| {
                    self.vehicles.push(VehicleRow {
                        vehicle_type: vehicle_type.to_string(),
                        total_accidents: 0,
                        total_injured: 0,
                        total_killed: 0,
                        avg_injuries_per_accident: 0.0,
                    });
                    self.vehicles.len() - 1
                });
            let row = &mut self.vehicles[idx];
            row.total_accidents += 1;
            row.total_injured += u64::from(casualties.total_injured);
            row.total_killed += u64::from(casualties.total_killed);
        }
    }

    /// Hourly rows, ascending by hour. Hours with no collisions produce
    /// no row.
    #[must_use]
    pub fn hourly_rows(&self) -> Vec<HourlyRow> {
        self.by_hour.values().cloned().collect()
    }

    /// Borough rows, most accidents first; ties keep first-seen order.
    /// The `"Unknown"` bucket is excluded.
    #[must_use]
    pub fn borough_rows(&self) -> Vec<BoroughRow> {
        let mut rows = self.boroughs.clone();
        rows.sort_by(|a, b| b.total_accidents.cmp(&a.total_accidents));
        rows
    }

    /// Vehicle rows, most accidents first, truncated to `limit`; ties
    /// keep first-seen order. The `"Unknown"` bucket is excluded.
    #[must_use]
    pub fn vehicle_rows(&self, limit: usize) -> Vec<VehicleRow> {
        let mut rows = self.vehicles.clone();
        for row in &mut rows {
            #[allow(clippy::cast_precision_loss)]
            {
                row.avg_injuries_per_accident =
                    row.total_injured as f64 / row.total_accidents as f64;
            }
        }
        rows.sort_by(|a, b| b.total_accidents.cmp(&a.total_accidents));
        rows.truncate(limit);
        rows
    }
}

/// Groups records by hour of day, ascending.
#[must_use]
pub fn hourly_analysis(records: &[CleanRecord]) -> Vec<HourlyRow> {
    fold_all(records).hourly_rows()
}

/// Groups records by borough, most accidents first.
#[must_use]
pub fn borough_analysis(records: &[CleanRecord]) -> Vec<BoroughRow> {
    fold_all(records).borough_rows()
}

/// Groups records by the primary vehicle's type, most accidents first,
/// keeping the top `limit` types.
#[must_use]
pub fn vehicle_analysis(records: &[CleanRecord], limit: usize) -> Vec<VehicleRow> {
    fold_all(records).vehicle_rows(limit)
}

fn fold_all(records: &[CleanRecord]) -> Groups {
    let mut groups = Groups::default();
    for record in records {
        groups.fold(record);
    }
    groups
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;
    use nyc_collisions_models::progress::null_progress;
    use nyc_collisions_models::{Casualties, CategoryCounts, Location, VehicleSlot, Vehicles};
    use nyc_collisions_store::StoreConfig;

    fn record(id: &str, hour: u32, borough: &str, vehicle: &str, injured: u32) -> CleanRecord {
        CleanRecord {
            collision_id: id.to_string(),
            crash_datetime: NaiveDate::from_ymd_opt(2023, 1, 1)
                .unwrap()
                .and_hms_opt(hour, 0, 0)
                .unwrap(),
            location: Location {
                borough: borough.to_string(),
                zip_code: None,
                latitude: None,
                longitude: None,
                on_street: String::new(),
                cross_street: String::new(),
                off_street: String::new(),
            },
            casualties: Casualties {
                total_injured: injured,
                total_killed: 0,
                pedestrians: CategoryCounts {
                    injured,
                    killed: 0,
                },
                cyclists: CategoryCounts {
                    injured: 0,
                    killed: 0,
                },
                motorists: CategoryCounts {
                    injured: 0,
                    killed: 0,
                },
            },
            vehicles: Vehicles {
                vehicle_1: VehicleSlot {
                    vehicle_type: vehicle.to_string(),
                    contributing_factor: "Unknown".to_string(),
                },
                vehicle_2: VehicleSlot {
                    vehicle_type: "Unknown".to_string(),
                    contributing_factor: "Unknown".to_string(),
                },
            },
            created_at: NaiveDate::from_ymd_opt(2023, 1, 2)
                .unwrap()
                .and_hms_opt(0, 0, 0)
                .unwrap(),
        }
    }

    #[test]
    fn hourly_rows_are_sorted_by_hour() {
        let records = vec![
            record("1", 23, "QUEENS", "Sedan", 1),
            record("2", 0, "QUEENS", "Sedan", 2),
            record("3", 0, "QUEENS", "Sedan", 0),
        ];
        let rows = hourly_analysis(&records);

        assert_eq!(rows.len(), 2);
        assert_eq!(rows[0].hour, 0);
        assert_eq!(rows[0].total_accidents, 2);
        assert_eq!(rows[0].total_injured, 2);
        assert_eq!(rows[1].hour, 23);
    }

    #[test]
    fn single_hour_collapses_to_one_row() {
        let records = vec![
            record("1", 12, "QUEENS", "Sedan", 2),
            record("2", 12, "BRONX", "Taxi", 1),
            record("3", 12, "QUEENS", "Sedan", 0),
        ];
        let rows = hourly_analysis(&records);

        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].hour, 12);
        assert_eq!(rows[0].total_accidents, 3);
        assert_eq!(rows[0].total_injured, 3);
        assert_eq!(rows[0].total_killed, 0);
    }

    #[test]
    fn borough_rows_exclude_unknown_and_sort_by_accidents() {
        let records = vec![
            record("1", 1, "QUEENS", "Sedan", 1),
            record("2", 2, "BROOKLYN", "Sedan", 0),
            record("3", 3, "BROOKLYN", "Sedan", 2),
            record("4", 4, "Unknown", "Sedan", 5),
        ];
        let rows = borough_analysis(&records);

        assert_eq!(rows.len(), 2);
        assert_eq!(rows[0].borough, "BROOKLYN");
        assert_eq!(rows[0].total_accidents, 2);
        assert_eq!(rows[0].total_injured, 2);
        assert_eq!(rows[0].pedestrian_injured, 2);
        assert_eq!(rows[1].borough, "QUEENS");
    }

    #[test]
    fn tied_boroughs_keep_first_seen_order() {
        let records = vec![
            record("1", 1, "QUEENS", "Sedan", 0),
            record("2", 2, "BRONX", "Sedan", 0),
        ];
        let rows = borough_analysis(&records);

        assert_eq!(rows[0].borough, "QUEENS");
        assert_eq!(rows[1].borough, "BRONX");
    }

    #[test]
    fn vehicle_rows_compute_average_and_respect_limit() {
        let records = vec![
            record("1", 1, "QUEENS", "Sedan", 3),
            record("2", 2, "QUEENS", "Sedan", 1),
            record("3", 3, "QUEENS", "Taxi", 0),
            record("4", 4, "QUEENS", "Bike", 1),
            record("5", 5, "QUEENS", "Unknown", 9),
        ];

        let rows = vehicle_analysis(&records, 2);
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[0].vehicle_type, "Sedan");
        assert_eq!(rows[0].total_accidents, 2);
        assert!((rows[0].avg_injuries_per_accident - 2.0).abs() < f64::EPSILON);
        assert!(rows.iter().all(|r| r.vehicle_type != "Unknown"));
    }

    #[test]
    fn vehicle_rows_truncate_to_default_limit() {
        // 15 distinct types, type_k appearing k+1 times.
        let mut records = Vec::new();
        let mut id = 0;
        for k in 0..15 {
            for _ in 0..=k {
                records.push(record(&id.to_string(), 1, "QUEENS", &format!("type_{k}"), 0));
                id += 1;
            }
        }

        let rows = vehicle_analysis(&records, GoldConfig::default().top_vehicles_limit);
        assert_eq!(rows.len(), 10);
        assert_eq!(rows[0].vehicle_type, "type_14");
        assert_eq!(rows[0].total_accidents, 15);
        assert!(
            rows.windows(2)
                .all(|w| w[0].total_accidents >= w[1].total_accidents)
        );
    }

    #[test]
    fn run_all_writes_gold_collections() {
        let dir = tempfile::tempdir().unwrap();
        let config = StoreConfig {
            data_dir: dir.path().to_path_buf(),
            database: "gold_test".to_string(),
            in_memory: false,
        };

        let mut gateway = StoreGateway::new(config.clone());
        let clean = gateway
            .collection(collections::CLEAN_VEHICLE_COLLISIONS)
            .unwrap();
        let docs: Vec<Value> = vec![
            serde_json::to_value(record("1", 8, "MANHATTAN", "Sedan", 1)).unwrap(),
            serde_json::to_value(record("2", 8, "QUEENS", "Taxi", 0)).unwrap(),
        ];
        clean.insert_many(&docs).unwrap();
        drop(clean);
        gateway.close();

        let mut engine =
            AggregationEngine::new(StoreGateway::new(config.clone()), GoldConfig::default());
        let summary = engine.run_all(&null_progress()).unwrap();

        assert_eq!(summary.clean_count, 2);
        assert_eq!(summary.skipped, 0);
        assert_eq!(summary.hourly_rows, 1);
        assert_eq!(summary.borough_rows, 2);
        assert_eq!(summary.vehicle_rows, 2);

        let mut gateway = StoreGateway::new(config);
        let hourly = gateway
            .collection(collections::GOLD_TIME_ANALYSIS)
            .unwrap();
        let stored = hourly.find_all().unwrap();
        assert_eq!(stored.len(), 1);
        assert_eq!(stored[0]["hour"], 8);
        assert_eq!(stored[0]["total_accidents"], 2);
    }

    #[test]
    fn malformed_clean_document_is_skipped() {
        let dir = tempfile::tempdir().unwrap();
        let config = StoreConfig {
            data_dir: dir.path().to_path_buf(),
            database: "gold_skip_test".to_string(),
            in_memory: false,
        };

        let mut gateway = StoreGateway::new(config.clone());
        let clean = gateway
            .collection(collections::CLEAN_VEHICLE_COLLISIONS)
            .unwrap();
        clean
            .insert_many(&[
                serde_json::to_value(record("1", 8, "MANHATTAN", "Sedan", 1)).unwrap(),
                serde_json::json!({"collision_id": "2", "not_a_clean_record": true}),
            ])
            .unwrap();
        drop(clean);
        gateway.close();

        let mut engine = AggregationEngine::new(StoreGateway::new(config), GoldConfig::default());
        let summary = engine.run_all(&null_progress()).unwrap();

        assert_eq!(summary.clean_count, 1);
        assert_eq!(summary.skipped, 1);
        assert_eq!(summary.hourly_rows, 1);
    }

    #[test]
    fn run_all_on_empty_clean_collection_writes_nothing() {
        let mut engine = AggregationEngine::new(
            StoreGateway::new(StoreConfig::memory()),
            GoldConfig::default(),
        );
        let summary = engine.run_all(&null_progress()).unwrap();
        assert_eq!(summary, GoldSummary::default());
    }
}
