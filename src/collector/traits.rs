//! Abstractions over the statistics data source to enable testing and mocking.
//!
//! The `StatSource` trait allows the collector to work with both a real
//! PostgreSQL server and [`MockSource`](super::mock::MockSource) in tests.

use super::error::CollectError;
use super::row::RawRow;

/// Which rows of `pg_stat_database` to fetch.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StatQuery<'a> {
    /// Every database row of the view.
    AllDatabases,
    /// The single row whose `datname` equals the given name.
    Database(&'a str),
}

/// Lazy, finite, single-pass sequence of raw rows.
///
/// Both query modes produce one: zero or one row for [`StatQuery::Database`],
/// zero or more for [`StatQuery::AllDatabases`]. The stream borrows its
/// connection, so it is always dropped before the connection is released.
pub type RowStream<'a> = Box<dyn Iterator<Item = Result<RawRow, CollectError>> + 'a>;

/// Opens connections to statistics targets.
pub trait StatSource {
    type Connection: StatConnection;

    /// Opens a scoped connection to `address`.
    ///
    /// The connection is released when the returned value is dropped.
    ///
    /// # Errors
    /// [`CollectError::Connection`] if the address is malformed or the
    /// server is unreachable.
    fn open(&self, address: &str) -> Result<Self::Connection, CollectError>;
}

/// An open connection to one statistics target.
pub trait StatConnection {
    /// Issues `query` and returns its rows.
    ///
    /// # Errors
    /// [`CollectError::Query`] if the statement cannot be issued. Failures
    /// while fetching surface as [`CollectError::Cursor`] items of the stream.
    fn rows(&mut self, query: StatQuery<'_>) -> Result<RowStream<'_>, CollectError>;
}
