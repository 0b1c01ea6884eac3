use crate::cache::IntelligentCache;
use crate::routing::LoadBalancer;
use serde::{Deserialize, Serialize};

/// One sample of the live performance picture.
///
/// Rates and usages are fractions in `0.0..=1.0`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PerformanceSnapshot {
    pub response_time_ms: f64,
    pub throughput: f64,
    pub error_rate: f64,
    pub cpu_usage: f64,
    pub memory_usage: f64,
    pub cache_hit_rate: f64,
    pub active_connections: u64,
    pub queue_length: u64,
}

/// Partial update; `None` keeps the current value.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct MetricsUpdate {
    pub response_time_ms: Option<f64>,
    pub throughput: Option<f64>,
    pub error_rate: Option<f64>,
    pub cpu_usage: Option<f64>,
    pub memory_usage: Option<f64>,
    pub cache_hit_rate: Option<f64>,
    pub active_connections: Option<u64>,
    pub queue_length: Option<u64>,
}

impl MetricsUpdate {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn response_time_ms(mut self, v: f64) -> Self {
        self.response_time_ms = Some(v);
        self
    }

    pub fn throughput(mut self, v: f64) -> Self {
        self.throughput = Some(v);
        self
    }

    pub fn error_rate(mut self, v: f64) -> Self {
        self.error_rate = Some(v);
        self
    }

    pub fn cpu_usage(mut self, v: f64) -> Self {
        self.cpu_usage = Some(v);
        self
    }

    pub fn memory_usage(mut self, v: f64) -> Self {
        self.memory_usage = Some(v);
        self
    }

    pub fn cache_hit_rate(mut self, v: f64) -> Self {
        self.cache_hit_rate = Some(v);
        self
    }

    pub fn active_connections(mut self, v: u64) -> Self {
        self.active_connections = Some(v);
        self
    }

    pub fn queue_length(mut self, v: u64) -> Self {
        self.queue_length = Some(v);
        self
    }

    /// Fields set in `other` win.
    pub fn overlay(self, other: MetricsUpdate) -> MetricsUpdate {
        MetricsUpdate {
            response_time_ms: other.response_time_ms.or(self.response_time_ms),
            throughput: other.throughput.or(self.throughput),
            error_rate: other.error_rate.or(self.error_rate),
            cpu_usage: other.cpu_usage.or(self.cpu_usage),
            memory_usage: other.memory_usage.or(self.memory_usage),
            cache_hit_rate: other.cache_hit_rate.or(self.cache_hit_rate),
            active_connections: other.active_connections.or(self.active_connections),
            queue_length: other.queue_length.or(self.queue_length),
        }
    }

    pub fn is_empty(&self) -> bool {
        *self == MetricsUpdate::default()
    }
}

impl PerformanceSnapshot {
    pub fn apply(&mut self, update: &MetricsUpdate) {
        if let Some(v) = update.response_time_ms {
            self.response_time_ms = v;
        }
        if let Some(v) = update.throughput {
            self.throughput = v;
        }
        if let Some(v) = update.error_rate {
            self.error_rate = v;
        }
        if let Some(v) = update.cpu_usage {
            self.cpu_usage = v;
        }
        if let Some(v) = update.memory_usage {
            self.memory_usage = v;
        }
        if let Some(v) = update.cache_hit_rate {
            self.cache_hit_rate = v;
        }
        if let Some(v) = update.active_connections {
            self.active_connections = v;
        }
        if let Some(v) = update.queue_length {
            self.queue_length = v;
        }
    }
}

/// Something the monitor can sample on each cycle.
pub trait MetricsSource: Send + Sync {
    fn collect(&self) -> MetricsUpdate;
}

impl<T> MetricsSource for IntelligentCache<T>
where
    T: Clone + Serialize + Send + 'static,
{
    fn collect(&self) -> MetricsUpdate {
        MetricsUpdate::new().cache_hit_rate(self.stats().hit_rate)
    }
}

impl MetricsSource for LoadBalancer {
    fn collect(&self) -> MetricsUpdate {
        let stats = self.stats();
        MetricsUpdate::new()
            .active_connections(stats.total_connections)
            .response_time_ms(stats.average_response_time_ms)
    }
}
