//! SQL for the `pg_stat_database` view.
//!
//! Columns are listed explicitly so servers that append columns to the view
//! (PostgreSQL 12+, 14+) still return the fixed 19-column shape.

const STAT_DATABASE_SELECT: &str = r#"
    SELECT
        datid,
        datname,
        numbackends,
        xact_commit,
        xact_rollback,
        blks_read,
        blks_hit,
        tup_returned,
        tup_fetched,
        tup_inserted,
        tup_updated,
        tup_deleted,
        conflicts,
        temp_files,
        temp_bytes,
        deadlocks,
        blk_read_time,
        blk_write_time,
        stats_reset
    FROM pg_stat_database
"#;

/// Every database row; the shared-objects row (NULL `datname`) is excluded.
pub(super) fn build_all_databases_query() -> String {
    format!("{STAT_DATABASE_SELECT} WHERE datname IS NOT NULL")
}

/// The row of one database, bound as `$1`.
pub(super) fn build_database_query() -> String {
    format!("{STAT_DATABASE_SELECT} WHERE datname = $1")
}
