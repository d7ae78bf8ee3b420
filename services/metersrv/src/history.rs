//! Per-identifier value history

use std::collections::{HashMap, VecDeque};

use serde::{Deserialize, Serialize};

use crate::projector::CanonicalValue;

/// Eviction policy applied to each identifier's series
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "policy", rename_all = "snake_case")]
pub enum HistoryPolicy {
    /// Keep every value for the lifetime of the connection
    #[default]
    Unbounded,
    /// Keep at most `capacity` values per identifier, evicting the oldest
    DropOldest { capacity: usize },
}

impl HistoryPolicy {
    pub fn capacity(&self) -> Option<usize> {
        match self {
            Self::Unbounded => None,
            Self::DropOldest { capacity } => Some(*capacity),
        }
    }
}

/// Timestamped values per identifier in arrival order
#[derive(Debug, Clone, Default)]
pub struct ValueHistory {
    policy: HistoryPolicy,
    series: HashMap<String, VecDeque<CanonicalValue>>,
}

impl ValueHistory {
    pub fn new(policy: HistoryPolicy) -> Self {
        Self {
            policy,
            series: HashMap::new(),
        }
    }

    pub fn policy(&self) -> HistoryPolicy {
        self.policy
    }

    /// Append a value to its identifier's series
    pub fn record(&mut self, value: CanonicalValue) {
        let series = self.series.entry(value.identifier.clone()).or_default();
        series.push_back(value);
        if let Some(capacity) = self.policy.capacity() {
            while series.len() > capacity {
                series.pop_front();
            }
        }
    }

    pub fn get(&self, identifier: &str) -> Option<&VecDeque<CanonicalValue>> {
        self.series.get(identifier)
    }

    pub fn latest(&self, identifier: &str) -> Option<&CanonicalValue> {
        self.series.get(identifier).and_then(|s| s.back())
    }

    /// Number of values held for `identifier`
    pub fn len(&self, identifier: &str) -> usize {
        self.series.get(identifier).map_or(0, VecDeque::len)
    }

    pub fn is_empty(&self) -> bool {
        self.series.values().all(VecDeque::is_empty)
    }

    /// Identifiers with at least one value, sorted
    pub fn identifiers(&self) -> Vec<&str> {
        let mut ids: Vec<&str> = self
            .series
            .iter()
            .filter(|(_, s)| !s.is_empty())
            .map(|(id, _)| id.as_str())
            .collect();
        ids.sort_unstable();
        ids
    }

    /// `(timestamp, value)` pairs of a numeric series
    ///
    /// `None` when the identifier has no values or its first value is not
    /// numeric. Non-numeric values later in the series are skipped.
    pub fn numeric_samples(&self, identifier: &str) -> Option<Vec<(i64, f64)>> {
        let series = self.series.get(identifier)?;
        if !series.front()?.value.is_numeric() {
            return None;
        }
        Some(
            series
                .iter()
                .filter_map(|v| v.value.as_f64().map(|f| (v.timestamp, f)))
                .collect(),
        )
    }

    pub fn clear(&mut self) {
        self.series.clear();
    }
}
