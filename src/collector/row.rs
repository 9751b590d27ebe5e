//! Positional decoding of `pg_stat_database` rows.
//!
//! Column layout (19 positions):
//!
//! | # | column | decoded as |
//! |---|--------|-----------|
//! | 0 | datid | ignored |
//! | 1 | datname | `name` |
//! | 2 | numbackends | ignored |
//! | 3-15 | xact_commit .. deadlocks | integer counters |
//! | 16-17 | blk_read_time, blk_write_time | float durations (ms) |
//! | 18 | stats_reset | ignored |

use std::slice;

use super::error::CollectError;

/// Number of columns in a `pg_stat_database` row.
pub const STAT_DATABASE_COLUMNS: usize = 19;

/// One cell of a raw row.
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    Null,
    Int(i64),
    Float(f64),
    Text(String),
    /// A cell of a type the decoder never reads; holds the type name.
    Other(String),
}

impl Value {
    fn kind(&self) -> &str {
        match self {
            Value::Null => "NULL",
            Value::Int(_) => "integer",
            Value::Float(_) => "float",
            Value::Text(_) => "text",
            Value::Other(name) => name.as_str(),
        }
    }
}

/// Positional cells of one result row, as returned by the data source.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RawRow {
    values: Vec<Value>,
}

impl RawRow {
    pub fn new(values: Vec<Value>) -> Self {
        Self { values }
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    pub fn get(&self, idx: usize) -> Option<&Value> {
        self.values.get(idx)
    }

    pub fn values(&self) -> &[Value] {
        &self.values
    }
}

impl FromIterator<Value> for RawRow {
    fn from_iter<I: IntoIterator<Item = Value>>(iter: I) -> Self {
        Self::new(iter.into_iter().collect())
    }
}

/// Per-database statistics decoded from one row.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct StatRow {
    pub name: String,
    pub xact_commit: i64,
    pub xact_rollback: i64,
    pub blks_read: i64,
    pub blks_hit: i64,
    pub tup_returned: i64,
    pub tup_fetched: i64,
    pub tup_inserted: i64,
    pub tup_updated: i64,
    pub tup_deleted: i64,
    pub conflicts: i64,
    pub temp_files: i64,
    pub temp_bytes: i64,
    pub deadlocks: i64,
    pub blk_read_time: f64,
    pub blk_write_time: f64,
}

/// Sequential reader over the cells of a row.
struct Columns<'a> {
    cells: slice::Iter<'a, Value>,
    position: usize,
}

impl<'a> Columns<'a> {
    fn new(row: &'a RawRow) -> Self {
        Self {
            cells: row.values.iter(),
            position: 0,
        }
    }

    fn next(&mut self, column: &str) -> Result<&'a Value, CollectError> {
        let position = self.position;
        self.position += 1;
        self.cells.next().ok_or_else(|| {
            CollectError::SchemaMismatch(format!("missing column {} ({})", position, column))
        })
    }

    fn mismatch(&self, column: &str, expected: &str, found: &Value) -> CollectError {
        CollectError::SchemaMismatch(format!(
            "column {} ({}): expected {}, found {}",
            self.position - 1,
            column,
            expected,
            found.kind()
        ))
    }

    fn skip(&mut self, column: &str) -> Result<(), CollectError> {
        self.next(column).map(|_| ())
    }

    fn text(&mut self, column: &str) -> Result<String, CollectError> {
        match self.next(column)? {
            Value::Text(s) => Ok(s.clone()),
            other => Err(self.mismatch(column, "text", other)),
        }
    }

    fn int(&mut self, column: &str) -> Result<i64, CollectError> {
        match self.next(column)? {
            Value::Int(v) => Ok(*v),
            other => Err(self.mismatch(column, "integer", other)),
        }
    }

    fn float(&mut self, column: &str) -> Result<f64, CollectError> {
        match self.next(column)? {
            Value::Float(v) => Ok(*v),
            Value::Int(v) => Ok(*v as f64),
            other => Err(self.mismatch(column, "float", other)),
        }
    }
}

/// Decodes one `pg_stat_database` row.
///
/// Ignored columns are consumed to keep positions aligned; their values may
/// be of any type, including NULL.
///
/// # Errors
/// [`CollectError::SchemaMismatch`] if the row does not have exactly
/// [`STAT_DATABASE_COLUMNS`] cells or a decoded cell has the wrong type.
pub fn decode(row: &RawRow) -> Result<StatRow, CollectError> {
    if row.len() != STAT_DATABASE_COLUMNS {
        return Err(CollectError::SchemaMismatch(format!(
            "expected {} columns, found {}",
            STAT_DATABASE_COLUMNS,
            row.len()
        )));
    }

    let mut cols = Columns::new(row);
    cols.skip("datid")?;
    let name = cols.text("datname")?;
    cols.skip("numbackends")?;

    let stat = StatRow {
        name,
        xact_commit: cols.int("xact_commit")?,
        xact_rollback: cols.int("xact_rollback")?,
        blks_read: cols.int("blks_read")?,
        blks_hit: cols.int("blks_hit")?,
        tup_returned: cols.int("tup_returned")?,
        tup_fetched: cols.int("tup_fetched")?,
        tup_inserted: cols.int("tup_inserted")?,
        tup_updated: cols.int("tup_updated")?,
        tup_deleted: cols.int("tup_deleted")?,
        conflicts: cols.int("conflicts")?,
        temp_files: cols.int("temp_files")?,
        temp_bytes: cols.int("temp_bytes")?,
        deadlocks: cols.int("deadlocks")?,
        blk_read_time: cols.float("blk_read_time")?,
        blk_write_time: cols.float("blk_write_time")?,
    };

    cols.skip("stats_reset")?;
    Ok(stat)
}
