//! PostgreSQL `pg_stat_database` collector.
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────────┐
//! │                    Postgresql (plugin)                       │
//! │   targets: [Target] or the implicit local target             │
//! │                                                              │
//! │   per target:  StatSource::open ──► StatConnection::rows     │
//! │                       │                   │ RowStream        │
//! │                       │            ┌──────▼──────┐           │
//! │                       │            │ row::decode │           │
//! │                       │            └──────┬──────┘           │
//! │                       │            ┌──────▼──────┐           │
//! │                       │            │ emit::emit  │──► Accumulator
//! │                       │            └─────────────┘           │
//! └───────────────────────┼──────────────────────────────────────┘
//!                         │
//!              ┌──────────┴──────────┐
//!       ┌──────▼──────┐       ┌──────▼──────┐
//!       │  PgSource   │       │ MockSource  │
//!       │ (postgres)  │       │  (testing)  │
//!       └─────────────┘       └─────────────┘
//! ```
//!
//! # Usage
//!
//! ```
//! use pgstat::collector::mock::{MockSource, database_row};
//! use pgstat::collector::{Postgresql, Target};
//! use pgstat::sink::Recorder;
//!
//! let mut source = MockSource::new();
//! source.add_server("host=db1", vec![database_row("app", [1; 13], 0.5, 0.7)]);
//!
//! let plugin = Postgresql::with_source(source).with_targets(vec![Target::new("host=db1")]);
//! let mut recorder = Recorder::new();
//! plugin.gather(&mut recorder).unwrap();
//! assert_eq!(recorder.points().len(), 15);
//! ```

pub mod emit;
mod error;
pub mod mock;
mod pg_source;
mod postgresql;
mod queries;
pub mod row;
mod target;
pub mod traits;

pub use error::CollectError;
pub use pg_source::PgSource;
pub use postgresql::{PLUGIN_NAME, Postgresql, PostgresqlConfig, register};
pub use row::{RawRow, StatRow, Value};
pub use target::{Target, redact_address};
pub use traits::{RowStream, StatConnection, StatQuery, StatSource};
