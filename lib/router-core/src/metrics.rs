//! Prometheus metrics for the reconciliation loop

use anyhow::Result;
use prometheus::{
    Encoder, HistogramOpts, HistogramVec, IntCounter, IntCounterVec, IntGauge, Opts, Registry,
    TextEncoder,
};
use std::sync::Arc;

/// Controller-level metrics, shared by every worker
#[derive(Clone)]
pub struct ControllerMetrics {
    /// Reconciles by resource kind and result
    pub reconcile_total: IntCounterVec,
    /// Reconcile latency in seconds by resource kind
    pub reconcile_duration_seconds: HistogramVec,
    /// Status subresource writes by result
    pub status_writes_total: IntCounterVec,
    /// Data-plane cleanups that failed after a delete
    pub deletions_failed_total: IntCounter,
    pub work_queue_depth: IntGauge,
    pub registry: Arc<Registry>,
}

impl ControllerMetrics {
    pub fn new() -> Result<Self> {
        let registry = Arc::new(Registry::new());

        let reconcile_total = IntCounterVec::new(
            Opts::new("reconcile_total", "Total reconciles by kind and result"),
            &["kind", "result"],
        )?;

        let reconcile_duration_seconds = HistogramVec::new(
            HistogramOpts::new(
                "reconcile_duration_seconds",
                "Time spent syncing and reporting one resource",
            ),
            &["kind"],
        )?;

        let status_writes_total = IntCounterVec::new(
            Opts::new("status_writes_total", "Status writes by result"),
            &["result"],
        )?;

        let deletions_failed_total = IntCounter::new(
            "deletions_failed_total",
            "Data-plane cleanups that failed after a resource was deleted",
        )?;

        let work_queue_depth = IntGauge::new("work_queue_depth", "Keys waiting in the work queue")?;

        registry.register(Box::new(reconcile_total.clone()))?;
        registry.register(Box::new(reconcile_duration_seconds.clone()))?;
        registry.register(Box::new(status_writes_total.clone()))?;
        registry.register(Box::new(deletions_failed_total.clone()))?;
        registry.register(Box::new(work_queue_depth.clone()))?;

        Ok(Self {
            reconcile_total,
            reconcile_duration_seconds,
            status_writes_total,
            deletions_failed_total,
            work_queue_depth,
            registry,
        })
    }

    /// Gather all metrics in Prometheus text format
    pub fn gather(&self) -> Result<String> {
        let encoder = TextEncoder::new();
        let metric_families = self.registry.gather();
        let mut buffer = vec![];
        encoder.encode(&metric_families, &mut buffer)?;
        Ok(String::from_utf8(buffer)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_gather_includes_counters() {
        let metrics = ControllerMetrics::new().unwrap();
        metrics
            .reconcile_total
            .with_label_values(&["ApisixRoute", "success"])
            .inc();
        metrics.deletions_failed_total.inc();
        metrics.work_queue_depth.set(3);

        let text = metrics.gather().unwrap();
        assert!(text.contains("reconcile_total{kind=\"ApisixRoute\",result=\"success\"} 1"));
        assert!(text.contains("deletions_failed_total 1"));
        assert!(text.contains("work_queue_depth 3"));
    }
}
