//! The `postgresql` input plugin.

use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::plugin::{Accumulator, Plugin, Registry};

use super::emit::emit;
use super::error::CollectError;
use super::pg_source::PgSource;
use super::row::decode;
use super::target::{Target, redact_address};
use super::traits::{RowStream, StatConnection, StatQuery, StatSource};

/// Name the plugin is registered under.
pub const PLUGIN_NAME: &str = "postgresql";

/// `[plugins.postgresql]` configuration section.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PostgresqlConfig {
    pub servers: Vec<Target>,
}

/// Registers the plugin constructor with the host registry.
pub fn register(registry: &mut Registry) {
    registry.add(PLUGIN_NAME, || Box::new(Postgresql::new()));
}

/// Collects `pg_stat_database` from every configured server.
///
/// Servers are visited in order, one connection at a time. With no servers
/// configured the implicit local target ([`Target::local`]) is collected.
/// The first failure aborts the pass; points already written stay in the
/// accumulator.
#[derive(Debug, Clone, Default)]
pub struct Postgresql<S = PgSource> {
    servers: Vec<Target>,
    source: S,
}

impl Postgresql {
    /// Creates a plugin with no servers configured.
    pub fn new() -> Self {
        Self::default()
    }
}

impl<S: StatSource> Postgresql<S> {
    /// Creates a plugin reading from `source`, with no servers configured.
    pub fn with_source(source: S) -> Self {
        Self {
            servers: Vec::new(),
            source,
        }
    }

    pub fn with_targets(mut self, servers: Vec<Target>) -> Self {
        self.servers = servers;
        self
    }

    pub fn targets(&self) -> &[Target] {
        &self.servers
    }

    pub fn source(&self) -> &S {
        &self.source
    }

    /// Runs one collection pass.
    pub fn gather(&self, acc: &mut dyn Accumulator) -> Result<(), CollectError> {
        if self.servers.is_empty() {
            return self.gather_target(&Target::local(), acc);
        }

        for target in &self.servers {
            self.gather_target(target, acc)?;
        }

        Ok(())
    }

    fn gather_target(&self, target: &Target, acc: &mut dyn Accumulator) -> Result<(), CollectError> {
        let result = self.gather_rows(target, acc);
        match &result {
            Ok(rows) => debug!(
                "pg_stat_database: {} rows from {} ({})",
                rows,
                redact_address(&target.address),
                if target.databases.is_empty() {
                    "all databases"
                } else {
                    "filtered"
                }
            ),
            Err(e) => warn!(
                "pg_stat_database: {} failed: {}",
                redact_address(&target.address),
                e
            ),
        }
        result.map(|_| ())
    }

    /// Collects one target and returns the number of rows emitted.
    ///
    /// The connection lives for this call only.
    fn gather_rows(&self, target: &Target, acc: &mut dyn Accumulator) -> Result<usize, CollectError> {
        let mut conn = self.source.open(&target.address)?;

        if target.databases.is_empty() {
            return accumulate(conn.rows(StatQuery::AllDatabases)?, acc);
        }

        let mut total = 0;
        for name in &target.databases {
            total += accumulate(conn.rows(StatQuery::Database(name))?, acc)?;
        }
        Ok(total)
    }
}

/// Decodes and emits every row of `rows`, stopping at the first error.
fn accumulate(rows: RowStream<'_>, acc: &mut dyn Accumulator) -> Result<usize, CollectError> {
    let mut count = 0;
    for row in rows {
        let stat = decode(&row?)?;
        emit(&stat, acc);
        count += 1;
    }
    Ok(count)
}

impl<S: StatSource> Plugin for Postgresql<S> {
    fn configure(&mut self, section: toml::Table) -> Result<(), toml::de::Error> {
        let config: PostgresqlConfig = section.try_into()?;
        self.servers = config.servers;
        Ok(())
    }

    fn gather(&self, acc: &mut dyn Accumulator) -> Result<(), CollectError> {
        Postgresql::<S>::gather(self, acc)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::collector::mock::{MockCall, MockSource, database_row};
    use crate::collector::target::local_address;
    use crate::plugin::MetricValue;
    use crate::sink::Recorder;

    fn call_open(a: &str) -> MockCall {
        MockCall::Open(a.to_string())
    }

    fn call_all(a: &str) -> MockCall {
        MockCall::QueryAll(a.to_string())
    }

    fn call_db(a: &str, db: &str) -> MockCall {
        MockCall::QueryDatabase(a.to_string(), db.to_string())
    }

    fn call_close(a: &str) -> MockCall {
        MockCall::Close(a.to_string())
    }

    fn row(name: &str) -> crate::collector::RawRow {
        database_row(name, [1, 2, 3, 4, 5, 6, 7, 8, 9, 10, 11, 12, 13], 1.5, 2.5)
    }

    fn dbs(rec: &Recorder) -> Vec<String> {
        let mut names: Vec<String> = rec.points().iter().map(|p| p.tags["db"].clone()).collect();
        names.dedup();
        names
    }

    #[test]
    fn single_row_example() {
        let mut source = MockSource::new();
        source.add_server(
            "A",
            vec![database_row(
                "mydb",
                [10, 2, 500, 100, 20, 5, 1, 0, 0, 0, 0, 0, 0],
                0.5,
                0.7,
            )],
        );
        let plugin = Postgresql::with_source(source).with_targets(vec![Target::new("A")]);

        let mut rec = Recorder::new();
        plugin.gather(&mut rec).unwrap();

        assert_eq!(rec.points().len(), 15);
        assert!(rec.points().iter().all(|p| p.tags["db"] == "mydb"));
        assert_eq!(rec.value("xact_commit", "mydb"), Some(MetricValue::Int(10)));
        assert_eq!(rec.value("xact_rollback", "mydb"), Some(MetricValue::Int(2)));
        assert_eq!(rec.value("blk_read_time", "mydb"), Some(MetricValue::Float(0.5)));
        assert_eq!(rec.value("blk_write_time", "mydb"), Some(MetricValue::Float(0.5)));
    }

    #[test]
    fn no_targets_uses_local_default() {
        let local = local_address(|var| std::env::var(var).ok());
        let mut source = MockSource::new();
        source.add_server(local.clone(), vec![row("postgres")]);
        let plugin = Postgresql::with_source(source);

        let mut rec = Recorder::new();
        plugin.gather(&mut rec).unwrap();

        assert_eq!(
            plugin.source().calls(),
            vec![call_open(&local), call_all(&local), call_close(&local)]
        );
        assert_eq!(rec.points().len(), 15);
        assert!(plugin.targets().is_empty());
    }

    #[test]
    fn local_default_failure_is_surfaced() {
        let plugin = Postgresql::with_source(MockSource::new());
        let mut rec = Recorder::new();
        let err = plugin.gather(&mut rec).unwrap_err();
        assert!(matches!(err, CollectError::Connection { .. }));
        assert!(rec.points().is_empty());
    }

    #[test]
    fn unfiltered_targets_in_order() {
        let mut source = MockSource::new();
        source.add_server("A", vec![row("a1"), row("a2")]);
        source.add_server("B", vec![row("b1")]);
        source.add_server("C", Vec::new());
        let plugin = Postgresql::with_source(source).with_targets(vec![
            Target::new("A"),
            Target::new("B"),
            Target::new("C"),
        ]);

        let mut rec = Recorder::new();
        plugin.gather(&mut rec).unwrap();

        assert_eq!(
            plugin.source().calls(),
            vec![
                call_open("A"),
                call_all("A"),
                call_close("A"),
                call_open("B"),
                call_all("B"),
                call_close("B"),
                call_open("C"),
                call_all("C"),
                call_close("C"),
            ]
        );
        assert_eq!(dbs(&rec), vec!["a1", "a2", "b1"]);
        assert_eq!(rec.points().len(), 45);
    }

    #[test]
    fn filtered_target_queries_each_name() {
        let mut source = MockSource::new();
        source.add_server("A", vec![row("a"), row("other")]);
        let plugin = Postgresql::with_source(source)
            .with_targets(vec![Target::new("A").with_databases(["a", "b"])]);

        let mut rec = Recorder::new();
        plugin.gather(&mut rec).unwrap();

        assert_eq!(
            plugin.source().calls(),
            vec![
                call_open("A"),
                call_db("A", "a"),
                call_db("A", "b"),
                call_close("A"),
            ]
        );
        assert_eq!(rec.points().len(), 15);
        assert_eq!(dbs(&rec), vec!["a"]);
    }

    #[test]
    fn filtered_rows_follow_filter_order() {
        let mut source = MockSource::new();
        source.add_server("A", vec![row("a"), row("b"), row("c")]);
        let plugin = Postgresql::with_source(source)
            .with_targets(vec![Target::new("A").with_databases(["c", "a"])]);

        let mut rec = Recorder::new();
        plugin.gather(&mut rec).unwrap();
        assert_eq!(dbs(&rec), vec!["c", "a"]);
    }

    #[test]
    fn connection_failure_stops_pass() {
        let mut source = MockSource::new();
        source.add_server("A", vec![row("a")]);
        source.add_server("C", vec![row("c")]);
        let plugin = Postgresql::with_source(source).with_targets(vec![
            Target::new("A"),
            Target::new("B"),
            Target::new("C"),
        ]);

        let mut rec = Recorder::new();
        let err = plugin.gather(&mut rec).unwrap_err();

        assert!(matches!(err, CollectError::Connection { ref address, .. } if address == "B"));
        assert_eq!(dbs(&rec), vec!["a"]);
        assert!(!plugin.source().calls().contains(&call_open("C")));
    }

    #[test]
    fn query_failure_releases_connection() {
        let mut source = MockSource::new();
        source.add_server("A", vec![row("a")]);
        source.add_server("B", vec![row("b")]);
        source.add_server("C", vec![row("c")]);
        source.server_mut("B").unwrap().fail_query = true;
        let plugin = Postgresql::with_source(source).with_targets(vec![
            Target::new("A"),
            Target::new("B"),
            Target::new("C"),
        ]);

        let mut rec = Recorder::new();
        let err = plugin.gather(&mut rec).unwrap_err();

        assert!(matches!(err, CollectError::Query(_)));
        assert_eq!(dbs(&rec), vec!["a"]);
        let calls = plugin.source().calls();
        assert_eq!(
            &calls[3..],
            &[call_open("B"), call_all("B"), call_close("B")]
        );
    }

    #[test]
    fn filtered_query_failure_aborts_remaining_names() {
        let mut source = MockSource::new();
        source.add_server("A", vec![row("a")]);
        source.server_mut("A").unwrap().fail_query = true;
        let plugin = Postgresql::with_source(source)
            .with_targets(vec![Target::new("A").with_databases(["a", "b"])]);

        let mut rec = Recorder::new();
        assert!(matches!(plugin.gather(&mut rec), Err(CollectError::Query(_))));
        assert_eq!(
            plugin.source().calls(),
            vec![call_open("A"), call_db("A", "a"), call_close("A")]
        );
    }

    #[test]
    fn filtered_failure_keeps_earlier_names() {
        let mut source = MockSource::new();
        source.add_server("A", vec![row("a"), row("b"), row("c")]);
        source.add_server("B", vec![row("other")]);
        source.server_mut("A").unwrap().fail_query_after = Some(1);
        let plugin = Postgresql::with_source(source).with_targets(vec![
            Target::new("A").with_databases(["a", "b", "c"]),
            Target::new("B"),
        ]);

        let mut rec = Recorder::new();
        assert!(matches!(plugin.gather(&mut rec), Err(CollectError::Query(_))));
        assert_eq!(dbs(&rec), vec!["a"]);
        assert_eq!(rec.points().len(), 15);
        assert_eq!(
            plugin.source().calls(),
            vec![
                call_open("A"),
                call_db("A", "a"),
                call_db("A", "b"),
                call_close("A"),
            ]
        );
    }

    #[test]
    fn cursor_failure_keeps_rows_already_emitted() {
        let mut source = MockSource::new();
        source.add_server("A", vec![row("a1"), row("a2"), row("a3")]);
        source.add_server("B", vec![row("b")]);
        source.server_mut("A").unwrap().fail_cursor_after = Some(2);
        let plugin = Postgresql::with_source(source)
            .with_targets(vec![Target::new("A"), Target::new("B")]);

        let mut rec = Recorder::new();
        let err = plugin.gather(&mut rec).unwrap_err();

        assert!(matches!(err, CollectError::Cursor(_)));
        assert_eq!(dbs(&rec), vec!["a1", "a2"]);
        assert_eq!(
            plugin.source().calls(),
            vec![call_open("A"), call_all("A"), call_close("A")]
        );
    }

    #[test]
    fn schema_mismatch_aborts_and_releases() {
        let mut bad = row("bad").values().to_vec();
        bad.pop();
        let mut source = MockSource::new();
        source.add_server(
            "A",
            vec![row("good"), crate::collector::RawRow::new(bad), row("late")],
        );
        let plugin = Postgresql::with_source(source).with_targets(vec![Target::new("A")]);

        let mut rec = Recorder::new();
        let err = plugin.gather(&mut rec).unwrap_err();

        assert!(matches!(err, CollectError::SchemaMismatch(_)));
        assert_eq!(dbs(&rec), vec!["good"]);
        assert_eq!(plugin.source().calls().last(), Some(&call_close("A")));
    }

    #[test]
    fn configure_reads_servers() {
        let section: toml::Table = toml::from_str(
            r#"
            [[servers]]
            address = "host=db1"
            databases = ["app", "billing"]

            [[servers]]
            address = "host=db2"
            "#,
        )
        .unwrap();

        let mut plugin = Postgresql::new();
        Plugin::configure(&mut plugin, section).unwrap();

        assert_eq!(
            plugin.targets(),
            &[
                Target::new("host=db1").with_databases(["app", "billing"]),
                Target::new("host=db2"),
            ]
        );
    }

    #[test]
    fn configure_rejects_bad_section() {
        let section: toml::Table = toml::from_str("servers = \"host=db1\"").unwrap();
        let mut plugin = Postgresql::new();
        assert!(Plugin::configure(&mut plugin, section).is_err());
    }

    #[test]
    fn register_creates_empty_plugin() {
        let mut registry = Registry::new();
        register(&mut registry);
        assert_eq!(registry.names().collect::<Vec<_>>(), vec![PLUGIN_NAME]);
        assert!(registry.create("postgresql").is_some());
    }
}
