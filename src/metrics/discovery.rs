//! Discovery query metrics

use crate::metrics::{curbside_metric, ComponentMetrics, MetricDoc, MetricType};

pub struct DiscoveryMetrics;

pub const QUERY_DURATION: &str = curbside_metric!(histogram, "discovery", "query_duration_seconds");

impl DiscoveryMetrics {
    pub fn record_query(candidates: usize, results: usize) {
        ::metrics::counter!(curbside_metric!(counter, "discovery", "queries")).increment(1);
        ::metrics::histogram!(curbside_metric!(histogram, "discovery", "candidates"))
            .record(candidates as f64);
        ::metrics::histogram!(curbside_metric!(histogram, "discovery", "results")).record(results as f64);
    }

    pub fn record_validation_error() {
        ::metrics::counter!(curbside_metric!(counter, "discovery", "validation_errors")).increment(1);
    }
}

impl ComponentMetrics for DiscoveryMetrics {
    fn register_metrics() {
        use metrics::{counter, histogram};

        let _ = counter!(curbside_metric!(counter, "discovery", "queries"));
        let _ = counter!(curbside_metric!(counter, "discovery", "validation_errors"));
        let _ = histogram!(curbside_metric!(histogram, "discovery", "candidates"));
        let _ = histogram!(curbside_metric!(histogram, "discovery", "results"));
        let _ = histogram!(QUERY_DURATION);
    }

    fn component() -> &'static str {
        "discovery"
    }

    fn metrics_documentation() -> Vec<MetricDoc> {
        vec![
            MetricDoc {
                name: curbside_metric!(counter, "discovery", "queries"),
                metric_type: MetricType::Counter,
                help: "Nearby queries answered",
                labels: vec![],
            },
            MetricDoc {
                name: curbside_metric!(counter, "discovery", "validation_errors"),
                metric_type: MetricType::Counter,
                help: "Nearby queries rejected by input validation",
                labels: vec![],
            },
            MetricDoc {
                name: curbside_metric!(histogram, "discovery", "candidates"),
                metric_type: MetricType::Histogram,
                help: "Candidate ids returned by the spatial index per query",
                labels: vec![],
            },
            MetricDoc {
                name: curbside_metric!(histogram, "discovery", "results"),
                metric_type: MetricType::Histogram,
                help: "Listings inside the radius per query, before pagination",
                labels: vec![],
            },
            MetricDoc {
                name: QUERY_DURATION,
                metric_type: MetricType::Histogram,
                help: "Wall time of a nearby query in seconds",
                labels: vec![],
            },
        ]
    }
}
