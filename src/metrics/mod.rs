//! Centralized metrics infrastructure for the discovery engine
//!
//! Each component defines its own metrics in a dedicated submodule, so
//! ownership stays clear and names cannot collide.

pub mod claims;
pub mod core;
pub mod discovery;
pub mod index;
pub mod lifecycle;
pub mod registry;

pub use claims::ClaimMetrics;
pub use discovery::DiscoveryMetrics;
pub use index::IndexMetrics;
pub use lifecycle::LifecycleMetrics;

use metrics_exporter_prometheus::{PrometheusBuilder, PrometheusHandle};
use std::sync::{Once, OnceLock};
use tracing::{info, warn};

static INIT: Once = Once::new();
static HANDLE: OnceLock<PrometheusHandle> = OnceLock::new();

/// Initialize the global metrics infrastructure
///
/// Idempotent. Installs a Prometheus recorder and registers every
/// component's metrics. The rendered exposition is served by the HTTP
/// layer at `/metrics`.
pub fn init_metrics() {
    INIT.call_once(|| match PrometheusBuilder::new().install_recorder() {
        Ok(handle) => {
            if HANDLE.set(handle).is_err() {
                warn!("METRICS: handle already set");
            }
            let catalog = registry::register_all_metrics();
            info!(metrics = catalog.len(), "Prometheus recorder installed");
        }
        Err(e) => {
            warn!("Failed to install Prometheus recorder: {}", e);
        }
    });
}

/// Prometheus text exposition, if the recorder is installed.
pub fn render() -> Option<String> {
    HANDLE.get().map(|h| h.render())
}

/// A service component that owns a family of `curbside_{component}_*` series.
pub trait ComponentMetrics {
    /// Describe this component's series to the installed recorder.
    fn register_metrics();

    /// Middle segment of every metric name this component owns.
    fn component() -> &'static str;

    fn metrics_documentation() -> Vec<MetricDoc>;
}

/// Documentation for a single metric
#[derive(Debug, Clone)]
pub struct MetricDoc {
    pub name: &'static str,
    pub metric_type: MetricType,
    pub help: &'static str,
    #[allow(dead_code)]
    pub labels: Vec<&'static str>,
}

#[derive(Debug, Clone)]
pub enum MetricType {
    Counter,
    Histogram,
    Gauge,
}

/// `curbside_{component}_{name}`, with `_total` appended for counters.
macro_rules! curbside_metric {
    (counter, $component:literal, $name:literal) => {
        concat!("curbside_", $component, "_", $name, "_total")
    };
    (histogram, $component:literal, $name:literal) => {
        concat!("curbside_", $component, "_", $name)
    };
    (gauge, $component:literal, $name:literal) => {
        concat!("curbside_", $component, "_", $name)
    };
}

pub(crate) use curbside_metric;
