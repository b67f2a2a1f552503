//! Listing lifecycle and TTL sweep metrics

use crate::metrics::{curbside_metric, ComponentMetrics, MetricDoc, MetricType};

pub struct LifecycleMetrics;

pub const SWEEP_DURATION: &str = curbside_metric!(histogram, "lifecycle", "sweep_duration_seconds");

impl LifecycleMetrics {
    pub fn record_created() {
        ::metrics::counter!(curbside_metric!(counter, "lifecycle", "listings_created")).increment(1);
    }

    pub fn record_deleted() {
        ::metrics::counter!(curbside_metric!(counter, "lifecycle", "listings_deleted")).increment(1);
    }

    /// Per-run sweep outcome; `expired` is also exported as a gauge so the
    /// last run's count is visible without rate math.
    pub fn record_sweep(expired: usize, failures: usize) {
        ::metrics::counter!(curbside_metric!(counter, "lifecycle", "sweep_runs")).increment(1);
        ::metrics::counter!(curbside_metric!(counter, "lifecycle", "sweep_expired")).increment(expired as u64);
        ::metrics::gauge!(curbside_metric!(gauge, "lifecycle", "sweep_expired_per_run")).set(expired as f64);
        ::metrics::counter!(curbside_metric!(counter, "lifecycle", "sweep_failures")).increment(failures as u64);
    }
}

impl ComponentMetrics for LifecycleMetrics {
    fn register_metrics() {
        use metrics::{counter, gauge, histogram};

        let _ = counter!(curbside_metric!(counter, "lifecycle", "listings_created"));
        let _ = counter!(curbside_metric!(counter, "lifecycle", "listings_deleted"));
        let _ = counter!(curbside_metric!(counter, "lifecycle", "sweep_runs"));
        let _ = counter!(curbside_metric!(counter, "lifecycle", "sweep_expired"));
        let _ = counter!(curbside_metric!(counter, "lifecycle", "sweep_failures"));
        let _ = gauge!(curbside_metric!(gauge, "lifecycle", "sweep_expired_per_run"));
        let _ = histogram!(SWEEP_DURATION);
    }

    fn component() -> &'static str {
        "lifecycle"
    }

    fn metrics_documentation() -> Vec<MetricDoc> {
        vec![
            MetricDoc {
                name: curbside_metric!(counter, "lifecycle", "listings_created"),
                metric_type: MetricType::Counter,
                help: "Listings created and indexed",
                labels: vec![],
            },
            MetricDoc {
                name: curbside_metric!(counter, "lifecycle", "listings_deleted"),
                metric_type: MetricType::Counter,
                help: "Listings soft-deleted by their owner",
                labels: vec![],
            },
            MetricDoc {
                name: curbside_metric!(counter, "lifecycle", "sweep_runs"),
                metric_type: MetricType::Counter,
                help: "TTL sweep runs completed",
                labels: vec![],
            },
            MetricDoc {
                name: curbside_metric!(counter, "lifecycle", "sweep_expired"),
                metric_type: MetricType::Counter,
                help: "Listings moved to Expired by the sweep",
                labels: vec![],
            },
            MetricDoc {
                name: curbside_metric!(counter, "lifecycle", "sweep_failures"),
                metric_type: MetricType::Counter,
                help: "Sweep writes that failed and will be retried next cycle",
                labels: vec![],
            },
            MetricDoc {
                name: curbside_metric!(gauge, "lifecycle", "sweep_expired_per_run"),
                metric_type: MetricType::Gauge,
                help: "Listings expired by the most recent sweep run",
                labels: vec![],
            },
            MetricDoc {
                name: SWEEP_DURATION,
                metric_type: MetricType::Histogram,
                help: "Wall time of a sweep run in seconds",
                labels: vec![],
            },
        ]
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_lifecycle_metrics_registration() {
        LifecycleMetrics::register_metrics();
        let docs = LifecycleMetrics::metrics_documentation();
        assert_eq!(docs.len(), 7);
        for doc in docs {
            assert!(doc.name.starts_with("curbside_lifecycle_"));
        }
    }
}
