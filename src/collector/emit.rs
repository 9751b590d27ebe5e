//! Conversion of decoded rows into metric points.

use crate::plugin::{Accumulator, MetricValue, Tags};

use super::row::StatRow;

/// Reads one metric value out of a decoded row.
pub type FieldReader = fn(&StatRow) -> MetricValue;

/// Tag key carrying the database name.
pub const DB_TAG: &str = "db";

/// Emitted metrics, in emission order.
pub static METRIC_FIELDS: [(&str, FieldReader); 15] = [
    ("xact_commit", |r| MetricValue::Int(r.xact_commit)),
    ("xact_rollback", |r| MetricValue::Int(r.xact_rollback)),
    ("blks_read", |r| MetricValue::Int(r.blks_read)),
    ("blks_hit", |r| MetricValue::Int(r.blks_hit)),
    ("tup_returned", |r| MetricValue::Int(r.tup_returned)),
    ("tup_fetched", |r| MetricValue::Int(r.tup_fetched)),
    ("tup_inserted", |r| MetricValue::Int(r.tup_inserted)),
    ("tup_updated", |r| MetricValue::Int(r.tup_updated)),
    ("tup_deleted", |r| MetricValue::Int(r.tup_deleted)),
    ("conflicts", |r| MetricValue::Int(r.conflicts)),
    ("temp_files", |r| MetricValue::Int(r.temp_files)),
    ("temp_bytes", |r| MetricValue::Int(r.temp_bytes)),
    ("deadlocks", |r| MetricValue::Int(r.deadlocks)),
    ("blk_read_time", |r| MetricValue::Float(r.blk_read_time)),
    // Reports blk_read_time under the write-time name. Existing dashboards
    // read this series; switch to r.blk_write_time only with their owners.
    ("blk_write_time", |r| MetricValue::Float(r.blk_read_time)),
];

/// Writes every metric of `row` into `acc`, tagged with the database name.
pub fn emit(row: &StatRow, acc: &mut dyn Accumulator) {
    let tags = Tags::from([(DB_TAG.to_string(), row.name.clone())]);
    for (name, read) in &METRIC_FIELDS {
        acc.add(name, read(row), &tags);
    }
}
