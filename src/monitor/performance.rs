use super::directive::{Breach, Mitigation, TuningDirective};
use super::snapshot::{MetricsSource, MetricsUpdate, PerformanceSnapshot};
use crate::telemetry::{Event, EventBus};
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, RwLock};
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Thresholds {
    pub response_time_ms: f64,
    pub error_rate: f64,
    pub cpu_usage: f64,
    pub memory_usage: f64,
    /// Hit rates below this are a breach.
    pub cache_hit_rate: f64,
    /// Hit rates below this additionally call for a strategy change.
    pub cache_strategy_hit_rate: f64,
}

impl Default for Thresholds {
    fn default() -> Self {
        Self {
            response_time_ms: 1000.0,
            error_rate: 0.05,
            cpu_usage: 0.8,
            memory_usage: 0.85,
            cache_hit_rate: 0.7,
            cache_strategy_hit_rate: 0.5,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MonitorConfig {
    pub thresholds: Thresholds,
    pub history_size: usize,
    #[serde(rename = "sample_interval_ms", with = "crate::config::duration_ms")]
    pub sample_interval: Duration,
    /// Samples per side of the trend comparison.
    pub trend_window: usize,
}

impl Default for MonitorConfig {
    fn default() -> Self {
        Self {
            thresholds: Thresholds::default(),
            history_size: 1000,
            sample_interval: Duration::from_secs(10),
            trend_window: 10,
        }
    }
}

impl MonitorConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_thresholds(mut self, thresholds: Thresholds) -> Self {
        self.thresholds = thresholds;
        self
    }

    pub fn with_history_size(mut self, size: usize) -> Self {
        self.history_size = size;
        self
    }

    pub fn with_sample_interval(mut self, interval: Duration) -> Self {
        self.sample_interval = interval;
        self
    }
}

/// Difference between the mean of the latest window and the window before it.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize)]
pub struct Trends {
    pub response_time_ms: f64,
    pub throughput: f64,
    pub error_rate: f64,
}

#[derive(Debug, Clone, Serialize)]
pub struct PerformanceReport {
    pub current: PerformanceSnapshot,
    pub trends: Trends,
    pub recommendations: Vec<String>,
    pub samples: usize,
}

struct MonitorState {
    current: PerformanceSnapshot,
    history: VecDeque<PerformanceSnapshot>,
    // Cache thresholds only apply once a hit rate has been reported.
    cache_reported: bool,
}

/// Threshold-driven performance watcher.
///
/// Each update is merged into the current snapshot, appended to a bounded
/// history and checked against [`Thresholds`]. Every breach is published as a
/// [`TuningDirective`]; owners of the tuned structures apply them.
pub struct PerformanceMonitor {
    config: MonitorConfig,
    events: Arc<EventBus>,
    sources: RwLock<Vec<Arc<dyn MetricsSource>>>,
    state: Mutex<MonitorState>,
}

impl PerformanceMonitor {
    pub fn new(config: MonitorConfig, events: Arc<EventBus>) -> Self {
        let capacity = config.history_size.max(1);
        Self {
            config,
            events,
            sources: RwLock::new(Vec::new()),
            state: Mutex::new(MonitorState {
                current: PerformanceSnapshot::default(),
                history: VecDeque::with_capacity(capacity.min(1024)),
                cache_reported: false,
            }),
        }
    }

    fn lock(&self) -> MutexGuard<'_, MonitorState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn add_source(&self, source: Arc<dyn MetricsSource>) {
        self.sources
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .push(source);
    }

    /// Merge, record, evaluate and publish. Returns the directives issued.
    pub fn update_metrics(&self, update: MetricsUpdate) -> Vec<TuningDirective> {
        let (snapshot, cache_reported) = {
            let mut st = self.lock();
            st.current.apply(&update);
            st.cache_reported |= update.cache_hit_rate.is_some();
            let snapshot = st.current.clone();
            let limit = self.config.history_size.max(1);
            while st.history.len() >= limit {
                st.history.pop_front();
            }
            st.history.push_back(snapshot.clone());
            (snapshot, st.cache_reported)
        };

        let directives = self.evaluate(&snapshot, cache_reported);
        for directive in &directives {
            tracing::warn!(
                breach = %directive.breach,
                observed = directive.observed,
                threshold = directive.threshold,
                "performance threshold breached"
            );
            self.events.publish(Event::AlertGenerated(directive.clone()));
        }
        directives
    }

    /// Pure threshold check.
    pub fn evaluate(&self, s: &PerformanceSnapshot, include_cache: bool) -> Vec<TuningDirective> {
        let t = &self.config.thresholds;
        let mut out = Vec::new();
        let mut push = |breach, observed, threshold, mitigations: Vec<Mitigation>| {
            out.push(TuningDirective {
                breach,
                observed,
                threshold,
                mitigations,
            })
        };

        if s.response_time_ms > t.response_time_ms {
            push(
                Breach::SlowResponse,
                s.response_time_ms,
                t.response_time_ms,
                vec![
                    Mitigation::IncreaseCacheSize,
                    Mitigation::OptimizeQueries,
                    Mitigation::ScaleResources,
                ],
            );
        }
        if s.error_rate > t.error_rate {
            push(
                Breach::HighErrorRate,
                s.error_rate,
                t.error_rate,
                vec![
                    Mitigation::EnableCircuitBreaker,
                    Mitigation::FallbackMode,
                    Mitigation::HealthCheck,
                ],
            );
        }
        if s.cpu_usage > t.cpu_usage {
            push(
                Breach::HighCpu,
                s.cpu_usage,
                t.cpu_usage,
                vec![
                    Mitigation::ReduceBackgroundTasks,
                    Mitigation::OptimizeAlgorithms,
                    Mitigation::ScaleHorizontally,
                ],
            );
        }
        if s.memory_usage > t.memory_usage {
            push(
                Breach::HighMemory,
                s.memory_usage,
                t.memory_usage,
                vec![
                    Mitigation::ClearCache,
                    Mitigation::GarbageCollection,
                    Mitigation::MemoryLeakCheck,
                ],
            );
        }
        if include_cache && s.cache_hit_rate < t.cache_hit_rate {
            let mut mitigations = vec![Mitigation::IncreaseCacheSize];
            if s.cache_hit_rate < t.cache_strategy_hit_rate {
                mitigations.push(Mitigation::AdjustCacheStrategy);
            }
            push(
                Breach::LowCacheHitRate,
                s.cache_hit_rate,
                t.cache_hit_rate,
                mitigations,
            );
        }
        out
    }

    /// Pull one update from every source and feed it through [`update_metrics`](Self::update_metrics).
    pub fn sample(&self) -> Vec<TuningDirective> {
        let sources: Vec<Arc<dyn MetricsSource>> = self
            .sources
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone();
        let update = sources
            .iter()
            .fold(MetricsUpdate::new(), |acc, s| acc.overlay(s.collect()));
        self.update_metrics(update)
    }

    pub fn spawn_sampling(self: &Arc<Self>, token: CancellationToken) -> JoinHandle<()> {
        let monitor = Arc::clone(self);
        let interval = self.config.sample_interval;
        tokio::spawn(async move {
            let start = tokio::time::Instant::now() + interval;
            let mut ticker = tokio::time::interval_at(start, interval);
            loop {
                tokio::select! {
                    _ = token.cancelled() => break,
                    _ = ticker.tick() => {
                        monitor.sample();
                    }
                }
            }
        })
    }

    pub fn current(&self) -> PerformanceSnapshot {
        self.lock().current.clone()
    }

    pub fn history_len(&self) -> usize {
        self.lock().history.len()
    }

    pub fn report(&self) -> PerformanceReport {
        let st = self.lock();
        let t = &self.config.thresholds;
        let cur = &st.current;

        let mut recommendations = Vec::new();
        if cur.response_time_ms > t.response_time_ms {
            recommendations.push("Consider scaling resources or optimizing queries".to_string());
        }
        if st.cache_reported && cur.cache_hit_rate < t.cache_hit_rate {
            recommendations.push("Optimize caching strategy or increase cache size".to_string());
        }
        if cur.error_rate > t.error_rate {
            recommendations
                .push("Investigate error sources and implement circuit breakers".to_string());
        }

        PerformanceReport {
            current: cur.clone(),
            trends: trends(&st.history, self.config.trend_window.max(1)),
            recommendations,
            samples: st.history.len(),
        }
    }
}

fn trends(history: &VecDeque<PerformanceSnapshot>, window: usize) -> Trends {
    if history.len() < 2 {
        return Trends::default();
    }
    let n = history.len();
    let recent_start = n.saturating_sub(window);
    let older_start = recent_start.saturating_sub(window);
    if older_start == recent_start {
        return Trends::default();
    }
    let mean = |range: std::ops::Range<usize>, f: fn(&PerformanceSnapshot) -> f64| {
        let len = range.len() as f64;
        range.map(|i| f(&history[i])).sum::<f64>() / len
    };
    let recent = recent_start..n;
    let older = older_start..recent_start;
    Trends {
        response_time_ms: mean(recent.clone(), |s| s.response_time_ms)
            - mean(older.clone(), |s| s.response_time_ms),
        throughput: mean(recent.clone(), |s| s.throughput) - mean(older.clone(), |s| s.throughput),
        error_rate: mean(recent, |s| s.error_rate) - mean(older, |s| s.error_rate),
    }
}
