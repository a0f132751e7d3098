//! Fixed logical collection names.
//!
//! Every component addresses the store through these constants so that the
//! raw, clean, and gold layers always agree on where data lives.

/// Unmodified records as ingested from the upstream API.
pub const RAW_VEHICLE_COLLISIONS: &str = "raw_vehicle_collisions";

/// Normalized, deduplicated [`CleanRecord`](crate::CleanRecord) documents.
pub const CLEAN_VEHICLE_COLLISIONS: &str = "clean_vehicle_collisions";

/// Hourly aggregation rows.
pub const GOLD_TIME_ANALYSIS: &str = "gold_time_analysis";

/// Borough aggregation rows.
pub const GOLD_BOROUGH_ANALYSIS: &str = "gold_borough_analysis";

/// Vehicle-type aggregation rows.
pub const GOLD_VEHICLE_ANALYSIS: &str = "gold_vehicle_analysis";
