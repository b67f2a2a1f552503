//! Spatial index metrics

use crate::metrics::{curbside_metric, ComponentMetrics, MetricDoc, MetricType};

pub struct IndexMetrics;

impl IndexMetrics {
    pub fn set_indexed_listings(count: usize) {
        ::metrics::gauge!(curbside_metric!(gauge, "index", "indexed_listings")).set(count as f64);
    }

    pub fn record_cells_scanned(cells: usize) {
        ::metrics::histogram!(curbside_metric!(histogram, "index", "cells_scanned")).record(cells as f64);
    }
}

impl ComponentMetrics for IndexMetrics {
    fn register_metrics() {
        use metrics::{gauge, histogram};

        let _ = gauge!(curbside_metric!(gauge, "index", "indexed_listings"));
        let _ = histogram!(curbside_metric!(histogram, "index", "cells_scanned"));
    }

    fn component() -> &'static str {
        "index"
    }

    fn metrics_documentation() -> Vec<MetricDoc> {
        vec![
            MetricDoc {
                name: curbside_metric!(gauge, "index", "indexed_listings"),
                metric_type: MetricType::Gauge,
                help: "Listings currently present in the spatial index",
                labels: vec![],
            },
            MetricDoc {
                name: curbside_metric!(histogram, "index", "cells_scanned"),
                metric_type: MetricType::Histogram,
                help: "Geohash cells scanned per radius lookup",
                labels: vec![],
            },
        ]
    }
}
