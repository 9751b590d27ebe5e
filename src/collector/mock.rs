//! In-memory statistics source for testing the collector without a server.
//!
//! `MockSource` simulates a set of servers keyed by connection string,
//! records every open, query and close, and can inject connection, query
//! and mid-stream cursor failures.

use std::cell::RefCell;
use std::collections::HashMap;
use std::rc::Rc;

use super::error::CollectError;
use super::row::{RawRow, Value};
use super::traits::{RowStream, StatConnection, StatQuery, StatSource};

/// A call observed by the mock, in order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MockCall {
    Open(String),
    QueryAll(String),
    QueryDatabase(String, String),
    Close(String),
}

/// Simulated server state.
#[derive(Debug, Clone, Default)]
pub struct MockServer {
    pub rows: Vec<RawRow>,
    /// Fail every query with [`CollectError::Query`].
    pub fail_query: bool,
    /// Fail every query issued on a connection after this many succeeded.
    pub fail_query_after: Option<usize>,
    /// Fail the unfiltered stream after this many rows.
    pub fail_cursor_after: Option<usize>,
}

/// Statistics source backed by in-memory servers.
#[derive(Debug, Clone, Default)]
pub struct MockSource {
    servers: HashMap<String, MockServer>,
    calls: Rc<RefCell<Vec<MockCall>>>,
}

impl MockSource {
    /// Creates a source with no reachable servers.
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a reachable server returning `rows`.
    pub fn add_server(&mut self, address: impl Into<String>, rows: Vec<RawRow>) {
        self.servers.insert(
            address.into(),
            MockServer {
                rows,
                ..MockServer::default()
            },
        );
    }

    /// Returns the server for `address` for failure injection.
    pub fn server_mut(&mut self, address: &str) -> Option<&mut MockServer> {
        self.servers.get_mut(address)
    }

    /// Every call observed so far.
    pub fn calls(&self) -> Vec<MockCall> {
        self.calls.borrow().clone()
    }

    fn record(&self, call: MockCall) {
        self.calls.borrow_mut().push(call);
    }
}

/// Open connection to a [`MockServer`]; records `Close` on drop.
pub struct MockConnection {
    address: String,
    server: MockServer,
    queries: usize,
    calls: Rc<RefCell<Vec<MockCall>>>,
}

impl StatSource for MockSource {
    type Connection = MockConnection;

    fn open(&self, address: &str) -> Result<MockConnection, CollectError> {
        self.record(MockCall::Open(address.to_string()));
        let server = self
            .servers
            .get(address)
            .cloned()
            .ok_or_else(|| CollectError::Connection {
                address: address.to_string(),
                message: "connection refused".to_string(),
            })?;

        Ok(MockConnection {
            address: address.to_string(),
            server,
            queries: 0,
            calls: Rc::clone(&self.calls),
        })
    }
}

impl StatConnection for MockConnection {
    fn rows(&mut self, query: StatQuery<'_>) -> Result<RowStream<'_>, CollectError> {
        let call = match query {
            StatQuery::AllDatabases => MockCall::QueryAll(self.address.clone()),
            StatQuery::Database(name) => {
                MockCall::QueryDatabase(self.address.clone(), name.to_string())
            }
        };
        self.calls.borrow_mut().push(call);

        let issued = self.queries;
        self.queries += 1;
        if self.server.fail_query || self.server.fail_query_after.is_some_and(|n| issued >= n) {
            return Err(CollectError::Query(
                "ERROR: permission denied for view pg_stat_database".to_string(),
            ));
        }

        match query {
            StatQuery::AllDatabases => {
                let fail_after = self.server.fail_cursor_after;
                let rows = self.server.rows.iter().cloned().enumerate().map(move |(i, row)| {
                    if fail_after.is_some_and(|n| i >= n) {
                        Err(CollectError::Cursor("connection reset by peer".to_string()))
                    } else {
                        Ok(row)
                    }
                });
                // A cursor failure ends the stream.
                let mut failed = false;
                Ok(Box::new(rows.take_while(move |row| {
                    let keep = !failed;
                    failed |= row.is_err();
                    keep
                })))
            }
            StatQuery::Database(name) => {
                let row = self
                    .server
                    .rows
                    .iter()
                    .find(|row| matches!(row.get(1), Some(Value::Text(n)) if n == name))
                    .cloned();
                Ok(Box::new(row.into_iter().map(Ok)))
            }
        }
    }
}

impl Drop for MockConnection {
    fn drop(&mut self) {
        self.calls
            .borrow_mut()
            .push(MockCall::Close(self.address.clone()));
    }
}

/// Builds a well-formed 19-column `pg_stat_database` row.
///
/// `counters` are `xact_commit` through `deadlocks` in view order.
pub fn database_row(name: &str, counters: [i64; 13], read_time: f64, write_time: f64) -> RawRow {
    let mut values = Vec::with_capacity(19);
    values.push(Value::Int(16384));
    values.push(Value::Text(name.to_string()));
    values.push(Value::Int(1));
    values.extend(counters.into_iter().map(Value::Int));
    values.push(Value::Float(read_time));
    values.push(Value::Float(write_time));
    values.push(Value::Other("timestamptz".to_string()));
    RawRow::new(values)
}
