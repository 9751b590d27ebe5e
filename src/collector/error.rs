/// Errors raised while collecting from a PostgreSQL target.
#[derive(Debug, thiserror::Error)]
pub enum CollectError {
    /// Connection string is malformed or the server is unreachable.
    #[error("PostgreSQL {address}: {message}")]
    Connection { address: String, message: String },

    /// Statement could not be issued.
    #[error("PostgreSQL query error: {0}")]
    Query(String),

    /// Result stream failed while fetching rows.
    #[error("PostgreSQL cursor error: {0}")]
    Cursor(String),

    /// Row shape does not match the `pg_stat_database` schema.
    #[error("pg_stat_database schema mismatch: {0}")]
    SchemaMismatch(String),
}
