//! Light normalization applied to raw records before storage.
//!
//! This stage is deliberately lenient: the crash date is canonicalized
//! when it parses, and the casualty counts are coerced to non-negative
//! integers with unparsable or missing values defaulting to 0. The batch
//! cleaner downstream applies the strict rules.

use serde_json::{Map, Value};

use nyc_collisions_source::parsing::parse_crash_date;

/// Casualty count fields coerced to numbers at ingestion time.
pub const NUMERIC_FIELDS: [&str; 8] = [
    "number_of_persons_injured",
    "number_of_persons_killed",
    "number_of_pedestrians_injured",
    "number_of_pedestrians_killed",
    "number_of_cyclist_injured",
    "number_of_cyclist_killed",
    "number_of_motorist_injured",
    "number_of_motorist_killed",
];

/// Coerces one raw record in place.
pub fn coerce_record(record: &mut Map<String, Value>) {
    if let Some(value) = record.get("crash_date")
        && let Some(s) = value.as_str()
    {
        if let Some(date) = parse_crash_date(s) {
            record.insert(
                "crash_date".to_string(),
                Value::String(date.format("%Y-%m-%d").to_string()),
            );
        } else {
            log::warn!("Leaving unparsable crash_date {s:?} as-is");
        }
    }

    for field in NUMERIC_FIELDS {
        let coerced = lenient_count(record.get(field));
        record.insert(field.to_string(), Value::from(coerced));
    }
}

/// Coerces a count to a non-negative integer, defaulting to 0 when the
/// value is missing, unparsable, or negative.
#[must_use]
pub fn lenient_count(value: Option<&Value>) -> i64 {
    #[allow(clippy::cast_possible_truncation)]
    let parsed = match value {
        Some(Value::Number(n)) => n.as_i64().or_else(|| n.as_f64().map(|f| f as i64)),
        Some(Value::String(s)) => {
            let trimmed = s.trim();
            trimmed
                .parse::<i64>()
                .ok()
                .or_else(|| trimmed.parse::<f64>().ok().map(|f| f as i64))
        }
        _ => None,
    };
    parsed.filter(|v| *v >= 0).unwrap_or(0)
}
