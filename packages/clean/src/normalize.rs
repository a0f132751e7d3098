//! Per-document normalization into the [`CleanRecord`] schema.
//!
//! Unlike the lenient coercion at ingestion time, this stage is strict: a
//! missing or unparsable required field fails the whole document, and the
//! caller drops it. Optional geographic fields stay unset when absent but
//! still fail the document when present and unparsable.

use chrono::{NaiveDateTime, Utc};
use serde_json::Value;

use nyc_collisions_models::{
    Casualties, CategoryCounts, CleanRecord, Location, VehicleSlot, Vehicles,
};
use nyc_collisions_source::parsing::{parse_crash_date, parse_crash_time};

/// Why one document could not be normalized.
#[derive(Debug, thiserror::Error)]
pub enum NormalizeError {
    /// The raw document is not a JSON object.
    #[error("record is not a JSON object")]
    NotAnObject,

    /// A required field is absent or null.
    #[error("missing required field {0:?}")]
    MissingField(&'static str),

    /// A numeric field failed to parse as a non-negative integer.
    #[error("field {field:?} has invalid value {value:?}")]
    InvalidNumber {
        /// The offending field.
        field: &'static str,
        /// Its raw value.
        value: String,
    },

    /// The crash date failed to parse.
    #[error("invalid crash_date {0:?}")]
    InvalidDate(String),

    /// The crash time failed to parse.
    #[error("invalid crash_time {0:?}")]
    InvalidTime(String),
}

/// Normalizes one raw document into a [`CleanRecord`].
///
/// # Errors
///
/// Returns [`NormalizeError`] if any required field is missing or
/// malformed; the caller is expected to drop the document and continue.
pub fn clean_document(doc: &Value) -> Result<CleanRecord, NormalizeError> {
    let obj = doc.as_object().ok_or(NormalizeError::NotAnObject)?;

    let collision_id = match obj.get("collision_id") {
        Some(Value::String(s)) if !s.is_empty() => s.clone(),
        Some(Value::Number(n)) => n.to_string(),
        _ => return Err(NormalizeError::MissingField("collision_id")),
    };

    let date_str = require_str(obj, "crash_date")?;
    let date = parse_crash_date(date_str)
        .ok_or_else(|| NormalizeError::InvalidDate(date_str.to_string()))?;
    let time_str = require_str(obj, "crash_time")?;
    let time = parse_crash_time(time_str)
        .ok_or_else(|| NormalizeError::InvalidTime(time_str.to_string()))?;

    Ok(CleanRecord {
        collision_id,
        crash_datetime: NaiveDateTime::new(date, time),
        location: Location {
            borough: borough_of(obj),
            zip_code: optional_u32(obj, "zip_code")?,
            latitude: optional_f64(obj, "latitude")?,
            longitude: optional_f64(obj, "longitude")?,
            on_street: string_or_empty(obj, "on_street_name"),
            cross_street: string_or_empty(obj, "cross_street_name"),
            off_street: string_or_empty(obj, "off_street_name"),
        },
        casualties: Casualties {
            total_injured: require_count(obj, "number_of_persons_injured")?,
            total_killed: require_count(obj, "number_of_persons_killed")?,
            pedestrians: CategoryCounts {
                injured: require_count(obj, "number_of_pedestrians_injured")?,
                killed: require_count(obj, "number_of_pedestrians_killed")?,
            },
            cyclists: CategoryCounts {
                injured: require_count(obj, "number_of_cyclist_injured")?,
                killed: require_count(obj, "number_of_cyclist_killed")?,
            },
            motorists: CategoryCounts {
                injured: require_count(obj, "number_of_motorist_injured")?,
                killed: require_count(obj, "number_of_motorist_killed")?,
            },
        },
        vehicles: Vehicles {
            vehicle_1: VehicleSlot {
                vehicle_type: string_or_unknown(obj, "vehicle_type_code1"),
                contributing_factor: string_or_unknown(obj, "contributing_factor_vehicle_1"),
            },
            vehicle_2: VehicleSlot {
                vehicle_type: string_or_unknown(obj, "vehicle_type_code2"),
                contributing_factor: string_or_unknown(obj, "contributing_factor_vehicle_2"),
            },
        },
        created_at: Utc::now().naive_utc(),
    })
}

type Object = serde_json::Map<String, Value>;

fn require_str<'a>(obj: &'a Object, field: &'static str) -> Result<&'a str, NormalizeError> {
    match obj.get(field) {
        Some(Value::String(s)) => Ok(s),
        _ => Err(NormalizeError::MissingField(field)),
    }
}

/// Missing, null, or blank borough maps to the literal `"Unknown"`.
fn borough_of(obj: &Object) -> String {
    match obj.get("borough") {
        Some(Value::String(s)) if !s.trim().is_empty() => s.clone(),
        _ => "Unknown".to_string(),
    }
}

fn string_or_empty(obj: &Object, field: &str) -> String {
    match obj.get(field) {
        Some(Value::String(s)) => s.clone(),
        _ => String::new(),
    }
}

fn string_or_unknown(obj: &Object, field: &str) -> String {
    match obj.get(field) {
        Some(Value::String(s)) => s.clone(),
        _ => "Unknown".to_string(),
    }
}

/// A required casualty count: JSON integer, integral float, or integer
/// string, and non-negative. Anything else fails the document.
fn require_count(obj: &Object, field: &'static str) -> Result<u32, NormalizeError> {
    let value = match obj.get(field) {
        None | Some(Value::Null) => return Err(NormalizeError::MissingField(field)),
        Some(v) => v,
    };
    let invalid = || NormalizeError::InvalidNumber {
        field,
        value: value.to_string(),
    };

    #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
    let parsed = match value {
        Value::Number(n) => n
            .as_i64()
            .or_else(|| n.as_f64().map(|f| f.trunc() as i64)),
        Value::String(s) => s.trim().parse::<i64>().ok(),
        _ => None,
    };

    let count = parsed.ok_or_else(invalid)?;
    u32::try_from(count).map_err(|_| invalid())
}

/// An optional integer field: unset when absent or null, an error when
/// present but unparsable.
fn optional_u32(obj: &Object, field: &'static str) -> Result<Option<u32>, NormalizeError> {
    let value = match obj.get(field) {
        None | Some(Value::Null) => return Ok(None),
        Some(v) => v,
    };
    let invalid = || NormalizeError::InvalidNumber {
        field,
        value: value.to_string(),
    };

    #[allow(clippy::cast_possible_truncation)]
    let parsed = match value {
        Value::Number(n) => n
            .as_i64()
            .or_else(|| n.as_f64().map(|f| f.trunc() as i64)),
        Value::String(s) => s
            .trim()
            .parse::<i64>()
            .ok()
            .or_else(|| s.trim().parse::<f64>().ok().map(|f| f.trunc() as i64)),
        _ => None,
    };

    let n = parsed.ok_or_else(invalid)?;
    u32::try_from(n).map(Some).map_err(|_| invalid())
}

/// An optional float field: unset when absent or null, an error when
/// present but unparsable.
fn optional_f64(obj: &Object, field: &'static str) -> Result<Option<f64>, NormalizeError> {
    let value = match obj.get(field) {
        None | Some(Value::Null) => return Ok(None),
        Some(v) => v,
    };

    let parsed = match value {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().parse::<f64>().ok(),
        _ => None,
    };

    parsed.map(Some).ok_or_else(|| NormalizeError::InvalidNumber {
        field,
        value: value.to_string(),
    })
}
