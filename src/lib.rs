//! pgstat - PostgreSQL `pg_stat_database` input plugin for a metrics agent.
//!
//! This library provides:
//! - `collector` - the `postgresql` plugin: targets, row source, decoder, emitter
//! - `plugin` - accumulator capability, plugin trait and registry
//! - `sink` - recorder and line-protocol rendering used by the `pgstat` binary
//! - `config` - TOML agent configuration

pub mod collector;
pub mod config;
pub mod plugin;
pub mod sink;
