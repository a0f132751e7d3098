#![cfg_attr(feature = "fail-on-warnings", deny(warnings))]
#![warn(clippy::all, clippy::pedantic, clippy::nursery, clippy::cargo)]
#![allow(clippy::multiple_crate_versions)]

//! Canonical record types for the collision pipeline.
//!
//! This crate defines the normalized [`CleanRecord`] schema that the batch
//! cleaner produces, the aggregate row shapes that the gold layer computes,
//! and the fixed logical collection names shared across the whole system.

pub mod collections;
pub mod progress;

use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};

/// A normalized vehicle collision record.
///
/// Every record in the clean collection has this shape. `collision_id` is
/// unique within the clean collection; the store enforces this with a
/// unique key, so a conflicting insert is rejected rather than overwriting.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CleanRecord {
    /// Unique identifier assigned by the upstream dataset.
    pub collision_id: String,
    /// Combined crash date and time, timezone-naive.
    pub crash_datetime: NaiveDateTime,
    pub location: Location,
    pub casualties: Casualties,
    pub vehicles: Vehicles,
    /// Processing timestamp, set when the record was normalized.
    pub created_at: NaiveDateTime,
}

/// Where the collision happened.
///
/// Geographic fields that the source did not supply stay unset rather than
/// defaulting to zero; string fields default to `"Unknown"` (borough) or
/// the empty string (street names).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Location {
    pub borough: String,
    pub zip_code: Option<u32>,
    pub latitude: Option<f64>,
    pub longitude: Option<f64>,
    pub on_street: String,
    pub cross_street: String,
    pub off_street: String,
}

/// Injury and fatality counts, total plus per-category breakdowns.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Casualties {
    pub total_injured: u32,
    pub total_killed: u32,
    pub pedestrians: CategoryCounts,
    pub cyclists: CategoryCounts,
    pub motorists: CategoryCounts,
}

/// Injured/killed counts for one casualty category.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct CategoryCounts {
    pub injured: u32,
    pub killed: u32,
}

/// The two vehicle slots recorded per collision.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Vehicles {
    pub vehicle_1: VehicleSlot,
    pub vehicle_2: VehicleSlot,
}

/// One vehicle involved in a collision.
///
/// Missing slots default to `"Unknown"` for both fields.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VehicleSlot {
    #[serde(rename = "type")]
    pub vehicle_type: String,
    pub contributing_factor: String,
}

/// One row of the hourly gold aggregation, grouped by hour of day.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HourlyRow {
    pub hour: u32,
    pub total_accidents: u64,
    pub total_injured: u64,
    pub total_killed: u64,
}

/// One row of the borough gold aggregation.
///
/// The `"Unknown"` borough bucket is excluded from this aggregation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BoroughRow {
    pub borough: String,
    pub total_accidents: u64,
    pub total_injured: u64,
    pub total_killed: u64,
    pub pedestrian_injured: u64,
    pub cyclist_injured: u64,
    pub motorist_injured: u64,
}

/// One row of the vehicle-type gold aggregation, grouped by the primary
/// vehicle slot's type.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VehicleRow {
    pub vehicle_type: String,
    pub total_accidents: u64,
    pub total_injured: u64,
    pub total_killed: u64,
    pub avg_injuries_per_accident: f64,
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    fn sample_record() -> CleanRecord {
        CleanRecord {
            collision_id: "4455".to_string(),
            crash_datetime: NaiveDate::from_ymd_opt(2023, 1, 1)
                .unwrap()
                .and_hms_opt(12, 0, 0)
                .unwrap(),
            location: Location {
                borough: "BROOKLYN".to_string(),
                zip_code: Some(11201),
                latitude: Some(40.6943),
                longitude: Some(-73.9918),
                on_street: String::new(),
                cross_street: String::new(),
                off_street: String::new(),
            },
            casualties: Casualties {
                total_injured: 1,
                total_killed: 0,
                pedestrians: CategoryCounts {
                    injured: 1,
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
                    vehicle_type: "Sedan".to_string(),
                    contributing_factor: "Driver Inattention".to_string(),
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
    fn clean_record_round_trips_through_json() {
        let record = sample_record();
        let json = serde_json::to_value(&record).unwrap();
        let back: CleanRecord = serde_json::from_value(json).unwrap();
        assert_eq!(back, record);
    }

    #[test]
    fn vehicle_slot_serializes_type_field_name() {
        let record = sample_record();
        let json = serde_json::to_value(&record).unwrap();
        assert_eq!(json["vehicles"]["vehicle_1"]["type"], "Sedan");
    }

    #[test]
    fn unset_geo_fields_serialize_as_null_not_zero() {
        let mut record = sample_record();
        record.location.zip_code = None;
        record.location.latitude = None;
        let json = serde_json::to_value(&record).unwrap();
        assert!(json["location"]["zip_code"].is_null());
        assert!(json["location"]["latitude"].is_null());
    }
}
