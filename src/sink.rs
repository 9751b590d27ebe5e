//! In-memory accumulator and InfluxDB line-protocol rendering.

use std::fmt::Write as _;

use crate::plugin::{Accumulator, MetricValue, Tags};

/// One recorded metric write.
#[derive(Debug, Clone, PartialEq)]
pub struct MetricPoint {
    pub measurement: String,
    pub value: MetricValue,
    pub tags: Tags,
}

impl MetricPoint {
    /// Renders the point as a line-protocol record with a single `value` field.
    ///
    /// Integers carry the `i` suffix; tags are written in key order. Returns
    /// `None` for NaN and infinite floats, which line protocol cannot carry.
    pub fn to_line(&self, timestamp_ns: i64) -> Option<String> {
        if let MetricValue::Float(v) = self.value {
            if !v.is_finite() {
                return None;
            }
        }


        let mut line = escape(&self.measurement, &[',', ' ']);
        for (key, value) in &self.tags {
            let _ = write!(
                line,
                ",{}={}",
                escape(key, &[',', '=', ' ']),
                escape(value, &[',', '=', ' '])
            );
        }
        match self.value {
            MetricValue::Int(v) => {
                let _ = write!(line, " value={}i", v);
            }
            MetricValue::Float(v) => {
                let _ = write!(line, " value={}", v);
            }
        }
        let _ = write!(line, " {}", timestamp_ns);
        Some(line)
    }
}

fn escape(s: &str, special: &[char]) -> String {
    let mut out = String::with_capacity(s.len());
    for c in s.chars() {
        if c == '\\' || special.contains(&c) {
            out.push('\\');
        }
        out.push(c);
    }
    out
}

/// Accumulator that keeps every point in memory, in arrival order.
#[derive(Debug, Clone, Default)]
pub struct Recorder {
    points: Vec<MetricPoint>,
}

impl Recorder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn points(&self) -> &[MetricPoint] {
        &self.points
    }

    /// Returns the first value recorded for `measurement` tagged `db=<db>`.
    pub fn value(&self, measurement: &str, db: &str) -> Option<MetricValue> {
        self.points
            .iter()
            .find(|p| {
                p.measurement == measurement && p.tags.get("db").map(String::as_str) == Some(db)
            })
            .map(|p| p.value)
    }

    /// Takes all recorded points, leaving the recorder empty.
    pub fn drain(&mut self) -> Vec<MetricPoint> {
        std::mem::take(&mut self.points)
    }
}

impl Accumulator for Recorder {
    fn add(&mut self, measurement: &str, value: MetricValue, tags: &Tags) {
        self.points.push(MetricPoint {
            measurement: measurement.to_string(),
            value,
            tags: tags.clone(),
        });
    }
}
