//! Plugin capabilities shared with the host agent.
//!
//! The host owns an [`Accumulator`] and a [`Registry`]. Plugins register a
//! zero-argument constructor under a fixed name, the host creates instances by
//! name, hands each one its configuration section and calls
//! [`Plugin::gather`] once per collection pass.

use std::collections::BTreeMap;
use std::fmt;

use crate::collector::CollectError;

/// Tag set attached to a metric point.
pub type Tags = BTreeMap<String, String>;

/// Value of a single metric point.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum MetricValue {
    Int(i64),
    Float(f64),
}

impl From<i64> for MetricValue {
    fn from(value: i64) -> Self {
        MetricValue::Int(value)
    }
}

impl From<f64> for MetricValue {
    fn from(value: f64) -> Self {
        MetricValue::Float(value)
    }
}

impl fmt::Display for MetricValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MetricValue::Int(v) => write!(f, "{}", v),
            MetricValue::Float(v) => write!(f, "{}", v),
        }
    }
}

/// Sink for metric writes.
///
/// Implementations decide how points are stored, batched or transported;
/// plugins only call [`Accumulator::add`].
pub trait Accumulator {
    /// Records one metric point.
    fn add(&mut self, measurement: &str, value: MetricValue, tags: &Tags);
}

/// An input plugin driven by the host agent.
pub trait Plugin {
    /// Applies the plugin's `[plugins.<name>]` configuration section.
    fn configure(&mut self, section: toml::Table) -> Result<(), toml::de::Error>;

    /// Runs one collection pass, writing every point into `acc`.
    ///
    /// Points written before a failure stay in the accumulator.
    fn gather(&self, acc: &mut dyn Accumulator) -> Result<(), CollectError>;
}

/// Zero-argument plugin constructor.
pub type Creator = fn() -> Box<dyn Plugin>;

/// Name-to-constructor table built by the host at start-up.
#[derive(Default)]
pub struct Registry {
    creators: BTreeMap<&'static str, Creator>,
}

impl Registry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers `creator` under `name`, replacing any previous entry.
    pub fn add(&mut self, name: &'static str, creator: Creator) {
        self.creators.insert(name, creator);
    }

    /// Creates a fresh plugin instance, or `None` for an unknown name.
    pub fn create(&self, name: &str) -> Option<Box<dyn Plugin>> {
        self.creators.get(name).map(|creator| creator())
    }

    /// Registered plugin names in sorted order.
    pub fn names(&self) -> impl Iterator<Item = &'static str> + '_ {
        self.creators.keys().copied()
    }
}
