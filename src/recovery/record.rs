//! Error records and the bounded history they live in.

use crate::classify::{ErrorKind, FaultContext, Severity};
use crate::health::ComponentStatus;
use serde::Serialize;
use std::collections::{BTreeMap, HashSet, VecDeque};
use std::time::{Duration, Instant, SystemTime};

/// One reported fault. Immutable apart from `recovery_attempts`.
#[derive(Debug, Clone, Serialize)]
pub struct ErrorRecord {
    pub id: String,
    pub kind: ErrorKind,
    pub severity: Severity,
    pub message: String,
    pub component: String,
    pub context: FaultContext,
    pub timestamp: SystemTime,
    pub recovery_attempts: u32,
    pub max_retries: u32,
    #[serde(skip)]
    recorded_at: Instant,
}

impl ErrorRecord {
    pub fn new(
        component: impl Into<String>,
        kind: ErrorKind,
        severity: Severity,
        message: impl Into<String>,
        context: FaultContext,
        max_retries: u32,
    ) -> Self {
        Self {
            id: format!("err_{}", uuid::Uuid::new_v4().simple()),
            kind,
            severity,
            message: message.into(),
            component: component.into(),
            context,
            timestamp: SystemTime::now(),
            recovery_attempts: 0,
            max_retries,
            recorded_at: Instant::now(),
        }
    }

    pub fn age(&self) -> Duration {
        self.recorded_at.elapsed()
    }

    pub fn retries_exhausted(&self) -> bool {
        self.recovery_attempts >= self.max_retries
    }
}

/// Per-component row of [`ErrorStatistics`].
#[derive(Debug, Clone, Serialize)]
pub struct ComponentErrorStats {
    pub component: String,
    pub error_count: u64,
    pub recovery_count: u64,
    pub status: ComponentStatus,
}

#[derive(Debug, Clone, Serialize)]
pub struct ErrorStatistics {
    pub total_errors: usize,
    pub by_kind: BTreeMap<ErrorKind, usize>,
    pub by_severity: BTreeMap<Severity, usize>,
    /// Recovered / total over the records currently in history.
    pub recovery_rate: f64,
    pub components: Vec<ComponentErrorStats>,
}

/// Ring of the most recent records; the oldest is dropped once full.
#[derive(Debug)]
pub struct ErrorHistory {
    records: VecDeque<ErrorRecord>,
    recovered: HashSet<String>,
    capacity: usize,
}

impl ErrorHistory {
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            records: VecDeque::with_capacity(capacity.min(1024)),
            recovered: HashSet::new(),
            capacity,
        }
    }

    pub fn push(&mut self, record: ErrorRecord) {
        while self.records.len() >= self.capacity {
            if let Some(dropped) = self.records.pop_front() {
                self.recovered.remove(&dropped.id);
            }
        }
        self.records.push_back(record);
    }

    pub fn sync_attempts(&mut self, id: &str, attempts: u32) {
        if let Some(r) = self.records.iter_mut().rev().find(|r| r.id == id) {
            r.recovery_attempts = attempts;
        }
    }

    pub fn mark_recovered(&mut self, id: &str) {
        if self.records.iter().any(|r| r.id == id) {
            self.recovered.insert(id.to_string());
        }
    }

    pub fn is_recovered(&self, id: &str) -> bool {
        self.recovered.contains(id)
    }

    pub fn get(&self, id: &str) -> Option<&ErrorRecord> {
        self.records.iter().find(|r| r.id == id)
    }

    /// Records of `component` younger than `window`, newest last.
    pub fn recent_for(&self, component: &str, window: Duration) -> Vec<ErrorRecord> {
        self.records
            .iter()
            .filter(|r| r.component == component && r.age() < window)
            .cloned()
            .collect()
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Counts over the history; `components` is left for the caller to fill.
    pub fn statistics(&self) -> ErrorStatistics {
        let mut by_kind: BTreeMap<ErrorKind, usize> =
            ErrorKind::ALL.iter().map(|k| (*k, 0)).collect();
        let mut by_severity: BTreeMap<Severity, usize> =
            Severity::ALL.iter().map(|s| (*s, 0)).collect();
        for r in &self.records {
            *by_kind.entry(r.kind).or_insert(0) += 1;
            *by_severity.entry(r.severity).or_insert(0) += 1;
        }
        let total = self.records.len();
        let recovery_rate = if total == 0 {
            0.0
        } else {
            self.recovered.len() as f64 / total as f64
        };
        ErrorStatistics {
            total_errors: total,
            by_kind,
            by_severity,
            recovery_rate,
            components: Vec::new(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record(component: &str, kind: ErrorKind) -> ErrorRecord {
        ErrorRecord::new(
            component,
            kind,
            kind.base_severity(),
            "boom",
            FaultContext::default(),
            3,
        )
    }

    #[test]
    fn test_ring_drops_oldest_and_forgets_its_recovery() {
        let mut history = ErrorHistory::new(2);
        let first = record("a", ErrorKind::Network);
        let first_id = first.id.clone();
        history.push(first);
        history.mark_recovered(&first_id);
        history.push(record("a", ErrorKind::Timeout));
        history.push(record("b", ErrorKind::Memory));

        assert_eq!(history.len(), 2);
        assert!(history.get(&first_id).is_none());
        assert!(!history.is_recovered(&first_id));
    }

    #[test]
    fn test_statistics_are_zero_initialised() {
        let mut history = ErrorHistory::new(10);
        let r = record("a", ErrorKind::Network);
        let id = r.id.clone();
        history.push(r);
        history.push(record("a", ErrorKind::Network));
        history.push(record("b", ErrorKind::Validation));
        history.mark_recovered(&id);

        let stats = history.statistics();
        assert_eq!(stats.total_errors, 3);
        assert_eq!(stats.by_kind.len(), ErrorKind::ALL.len());
        assert_eq!(stats.by_kind[&ErrorKind::Network], 2);
        assert_eq!(stats.by_kind[&ErrorKind::System], 0);
        assert_eq!(stats.by_severity[&Severity::Low], 1);
        assert_eq!(stats.by_severity[&Severity::Critical], 0);
        assert!((stats.recovery_rate - 1.0 / 3.0).abs() < 1e-9);
    }

    #[test]
    fn test_sync_attempts_and_recent_window() {
        let mut history = ErrorHistory::new(10);
        let r = record("a", ErrorKind::Network);
        let id = r.id.clone();
        history.push(r);
        history.sync_attempts(&id, 2);
        assert_eq!(history.get(&id).map(|r| r.recovery_attempts), Some(2));

        assert_eq!(history.recent_for("a", Duration::from_secs(60)).len(), 1);
        assert!(history.recent_for("b", Duration::from_secs(60)).is_empty());
        assert!(history.recent_for("a", Duration::ZERO).is_empty());
    }

    #[test]
    fn test_record_ids_are_unique() {
        let a = record("a", ErrorKind::System);
        let b = record("a", ErrorKind::System);
        assert_ne!(a.id, b.id);
        assert!(a.id.starts_with("err_"));
        assert!(!a.retries_exhausted());
    }
}
