//! `StatSource` backed by the blocking `postgres` client.

use native_tls::TlsConnector;
use postgres::config::SslMode;
use postgres::fallible_iterator::FallibleIterator;
use postgres::types::Type;
use postgres::{Client, Config, NoTls, Row};
use postgres_native_tls::MakeTlsConnector;

use super::error::CollectError;
use super::queries::{build_all_databases_query, build_database_query};
use super::row::{RawRow, Value};
use super::target::redact_address;
use super::traits::{RowStream, StatConnection, StatQuery, StatSource};

/// Opens one client connection per target.
///
/// TLS is negotiated through native-tls unless the connection string sets
/// `sslmode=disable`.
#[derive(Debug, Default, Clone, Copy)]
pub struct PgSource;

impl PgSource {
    pub fn new() -> Self {
        Self
    }
}

/// Client connection owned by one target's collection; closed on drop.
pub struct PgConnection {
    client: Client,
}

impl StatSource for PgSource {
    type Connection = PgConnection;

    fn open(&self, address: &str) -> Result<PgConnection, CollectError> {
        let connection_error = |message: String| CollectError::Connection {
            address: redact_address(address),
            message,
        };

        let config: Config = address
            .parse()
            .map_err(|e| connection_error(format_postgres_error(&e)))?;

        let connected = match config.get_ssl_mode() {
            SslMode::Disable => config.connect(NoTls),
            _ => {
                let connector = TlsConnector::new().map_err(|e| connection_error(e.to_string()))?;
                config.connect(MakeTlsConnector::new(connector))
            }
        };

        let client = connected.map_err(|e| connection_error(format_postgres_error(&e)))?;
        Ok(PgConnection { client })
    }
}

impl StatConnection for PgConnection {
    fn rows(&mut self, query: StatQuery<'_>) -> Result<RowStream<'_>, CollectError> {
        match query {
            StatQuery::AllDatabases => {
                let sql = build_all_databases_query();
                let iter = self
                    .client
                    .query_raw(sql.as_str(), std::iter::empty::<i32>())
                    .map_err(|e| CollectError::Query(format_postgres_error(&e)))?;

                Ok(Box::new(iter.iterator().map(|row| {
                    let row = row.map_err(|e| CollectError::Cursor(format_postgres_error(&e)))?;
                    raw_row(&row)
                })))
            }
            StatQuery::Database(name) => {
                let sql = build_database_query();
                let row = self
                    .client
                    .query_opt(sql.as_str(), &[&name])
                    .map_err(|e| CollectError::Query(format_postgres_error(&e)))?;

                Ok(Box::new(row.into_iter().map(|row| raw_row(&row))))
            }
        }
    }
}

/// Converts a result row into typed cells by column type.
fn raw_row(row: &Row) -> Result<RawRow, CollectError> {
    row.columns()
        .iter()
        .enumerate()
        .map(|(idx, column)| {
            column_value(row, idx, column.type_()).map_err(|e| {
                CollectError::SchemaMismatch(format!("column {} ({}): {}", idx, column.name(), e))
            })
        })
        .collect()
}

fn column_value(row: &Row, idx: usize, ty: &Type) -> Result<Value, postgres::Error> {
    let value = match *ty {
        Type::INT2 => row.try_get::<_, Option<i16>>(idx)?.map(|v| Value::Int(v.into())),
        Type::INT4 => row.try_get::<_, Option<i32>>(idx)?.map(|v| Value::Int(v.into())),
        Type::INT8 => row.try_get::<_, Option<i64>>(idx)?.map(Value::Int),
        Type::OID => row.try_get::<_, Option<u32>>(idx)?.map(|v| Value::Int(v.into())),
        Type::FLOAT4 => row.try_get::<_, Option<f32>>(idx)?.map(|v| Value::Float(v.into())),
        Type::FLOAT8 => row.try_get::<_, Option<f64>>(idx)?.map(Value::Float),
        Type::NAME | Type::TEXT | Type::VARCHAR => {
            row.try_get::<_, Option<String>>(idx)?.map(Value::Text)
        }
        _ => return Ok(Value::Other(ty.name().to_string())),
    };
    Ok(value.unwrap_or(Value::Null))
}

/// Formats PostgreSQL error message for display.
pub(crate) fn format_postgres_error(e: &postgres::Error) -> String {
    if let Some(db_error) = e.as_db_error() {
        format!("{}: {}", db_error.severity(), db_error.message())
    } else {
        let msg = e.to_string();
        if msg.contains("Connection refused") {
            "connection refused".to_string()
        } else if msg.contains("password authentication failed") {
            "password authentication failed".to_string()
        } else if msg.contains("does not exist") {
            msg.split("FATAL:")
                .last()
                .unwrap_or(&msg)
                .trim()
                .to_string()
        } else {
            msg
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn open_rejects_malformed_address() {
        let err = match PgSource::new().open("host=db1 password=secret port=notaport") {
            Ok(_) => panic!("malformed address must not connect"),
            Err(e) => e,
        };
        match err {
            CollectError::Connection { address, .. } => {
                assert_eq!(address, "host=db1 password=*** port=notaport");
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn connection_error_message_hides_password() {
        let err = match PgSource::new().open("host=db1 password=secret port=notaport") {
            Ok(_) => panic!("malformed address must not connect"),
            Err(e) => e,
        };
        assert!(!err.to_string().contains("secret"));
    }

    #[test]
    fn connection_error_hides_spaced_password() {
        let err = match PgSource::new().open("host=db1 password = hunter2 port=notaport") {
            Ok(_) => panic!("malformed address must not connect"),
            Err(e) => e,
        };
        assert!(!err.to_string().contains("hunter2"));
        assert!(!format!("{err:?}").contains("hunter2"));
    }
}
