//! Hit/miss counter hook.

use std::fmt;

use dashmap::DashMap;

use super::traits::CacheStats;

/// Which counter set an event belongs to.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum MetricScope {
    /// Aggregate across every cached operation.
    Total,
    /// One cached operation, by key prefix.
    Target(String),
}

impl fmt::Display for MetricScope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MetricScope::Total => f.write_str("total"),
            MetricScope::Target(prefix) => write!(f, "target:{}", prefix),
        }
    }
}

/// A counted cache decision.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CacheEvent {
    /// A probe is about to happen.
    Request,
    Hit,
    Miss,
}

/// Receives one call per counted event. Transport is up to the implementor.
pub trait MetricsSink: Send + Sync {
    fn record(&self, scope: MetricScope, event: CacheEvent);
}

/// Discards every event.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoopMetrics;

impl MetricsSink for NoopMetrics {
    fn record(&self, _scope: MetricScope, _event: CacheEvent) {}
}

/// In-process counters per scope.
#[derive(Debug, Default)]
pub struct CounterMetrics {
    counters: DashMap<MetricScope, CacheStats>,
}

impl CounterMetrics {
    pub fn new() -> Self {
        Self::default()
    }

    /// Counters for `scope`; zero if nothing was recorded.
    pub fn stats(&self, scope: &MetricScope) -> CacheStats {
        self.counters
            .get(scope)
            .map(|stats| *stats)
            .unwrap_or_default()
    }

    /// Every scope with at least one event.
    pub fn scopes(&self) -> Vec<MetricScope> {
        let mut scopes: Vec<_> = self.counters.iter().map(|e| e.key().clone()).collect();
        scopes.sort();
        scopes
    }
}

impl MetricsSink for CounterMetrics {
    fn record(&self, scope: MetricScope, event: CacheEvent) {
        let mut stats = self.counters.entry(scope).or_default();
        match event {
            CacheEvent::Request => stats.requests += 1,
            CacheEvent::Hit => stats.hits += 1,
            CacheEvent::Miss => stats.misses += 1,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_counter_metrics() {
        let metrics = CounterMetrics::new();
        let target = MetricScope::Target("Orders.find".to_string());

        metrics.record(MetricScope::Total, CacheEvent::Request);
        metrics.record(MetricScope::Total, CacheEvent::Miss);
        metrics.record(target.clone(), CacheEvent::Request);
        metrics.record(target.clone(), CacheEvent::Hit);

        assert_eq!(
            metrics.stats(&MetricScope::Total),
            CacheStats {
                requests: 1,
                hits: 0,
                misses: 1
            }
        );
        assert!((metrics.stats(&target).hit_rate() - 1.0).abs() < 0.001);
        assert_eq!(metrics.scopes(), vec![MetricScope::Total, target]);
    }

    #[test]
    fn test_unrecorded_scope_is_zero() {
        let metrics = CounterMetrics::new();
        assert_eq!(
            metrics.stats(&MetricScope::Target("x".to_string())),
            CacheStats::default()
        );
    }

    #[test]
    fn test_scope_display() {
        assert_eq!(MetricScope::Total.to_string(), "total");
        assert_eq!(
            MetricScope::Target("Orders.find".to_string()).to_string(),
            "target:Orders.find"
        );
    }
}
