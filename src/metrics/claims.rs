//! Claim coordination metrics

use crate::domain::ClaimOutcome;
use crate::metrics::{curbside_metric, ComponentMetrics, MetricDoc, MetricType};

pub struct ClaimMetrics;

impl ClaimMetrics {
    pub fn record_outcome(outcome: ClaimOutcome) {
        ::metrics::counter!(curbside_metric!(counter, "claims", "attempts")).increment(1);
        match outcome {
            ClaimOutcome::Success => {
                ::metrics::counter!(curbside_metric!(counter, "claims", "success")).increment(1)
            }
            ClaimOutcome::Conflict => {
                ::metrics::counter!(curbside_metric!(counter, "claims", "conflict")).increment(1)
            }
            ClaimOutcome::AlreadyClaimed => {
                ::metrics::counter!(curbside_metric!(counter, "claims", "already_claimed")).increment(1)
            }
            ClaimOutcome::Expired => {
                ::metrics::counter!(curbside_metric!(counter, "claims", "expired")).increment(1)
            }
            ClaimOutcome::NotFound => {
                ::metrics::counter!(curbside_metric!(counter, "claims", "not_found")).increment(1)
            }
            ClaimOutcome::Rejected => {
                ::metrics::counter!(curbside_metric!(counter, "claims", "rejected")).increment(1)
            }
        }
    }
}

impl ComponentMetrics for ClaimMetrics {
    fn register_metrics() {
        use metrics::counter;

        let _ = counter!(curbside_metric!(counter, "claims", "attempts"));
        let _ = counter!(curbside_metric!(counter, "claims", "success"));
        let _ = counter!(curbside_metric!(counter, "claims", "conflict"));
        let _ = counter!(curbside_metric!(counter, "claims", "already_claimed"));
        let _ = counter!(curbside_metric!(counter, "claims", "expired"));
        let _ = counter!(curbside_metric!(counter, "claims", "not_found"));
        let _ = counter!(curbside_metric!(counter, "claims", "rejected"));
    }

    fn component() -> &'static str {
        "claims"
    }

    fn metrics_documentation() -> Vec<MetricDoc> {
        vec![
            MetricDoc {
                name: curbside_metric!(counter, "claims", "attempts"),
                metric_type: MetricType::Counter,
                help: "Claim calls received",
                labels: vec![],
            },
            MetricDoc {
                name: curbside_metric!(counter, "claims", "success"),
                metric_type: MetricType::Counter,
                help: "Claims that won the conditional write",
                labels: vec![],
            },
            MetricDoc {
                name: curbside_metric!(counter, "claims", "conflict"),
                metric_type: MetricType::Counter,
                help: "Claims that lost a version race",
                labels: vec![],
            },
            MetricDoc {
                name: curbside_metric!(counter, "claims", "already_claimed"),
                metric_type: MetricType::Counter,
                help: "Claims on listings already resolved",
                labels: vec![],
            },
            MetricDoc {
                name: curbside_metric!(counter, "claims", "expired"),
                metric_type: MetricType::Counter,
                help: "Claims on listings past their TTL",
                labels: vec![],
            },
            MetricDoc {
                name: curbside_metric!(counter, "claims", "not_found"),
                metric_type: MetricType::Counter,
                help: "Claims on unknown listing ids",
                labels: vec![],
            },
            MetricDoc {
                name: curbside_metric!(counter, "claims", "rejected"),
                metric_type: MetricType::Counter,
                help: "Claims refused before any write (self-claims, storage errors)",
                labels: vec![],
            },
        ]
    }
}
