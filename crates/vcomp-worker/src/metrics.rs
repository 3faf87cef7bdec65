//! Prometheus metrics for renders.

use std::net::SocketAddr;

use metrics::{counter, histogram};
use metrics_exporter_prometheus::{BuildError, PrometheusBuilder};

use vcomp_models::{FailureKind, RenderWarning};

/// Metric names as constants for consistency.
pub mod names {
    pub const RENDERS_STARTED_TOTAL: &str = "vcomp_renders_started_total";
    pub const RENDERS_COMPLETED_TOTAL: &str = "vcomp_renders_completed_total";
    pub const RENDERS_FAILED_TOTAL: &str = "vcomp_renders_failed_total";
    pub const RENDER_WARNINGS_TOTAL: &str = "vcomp_render_warnings_total";
    pub const RENDER_DURATION_SECONDS: &str = "vcomp_render_duration_seconds";
    pub const SCENES_DROPPED_TOTAL: &str = "vcomp_scenes_dropped_total";
}

/// Install the Prometheus recorder with an HTTP listener on `addr`.
pub fn init_metrics(addr: SocketAddr) -> Result<(), BuildError> {
    PrometheusBuilder::new().with_http_listener(addr).install()
}

pub fn record_render_started() {
    counter!(names::RENDERS_STARTED_TOTAL).increment(1);
}

pub fn record_render_completed(elapsed_secs: f64, degraded: bool) {
    let labels = [("degraded", degraded.to_string())];
    counter!(names::RENDERS_COMPLETED_TOTAL, &labels).increment(1);
    histogram!(names::RENDER_DURATION_SECONDS, "status" => "complete").record(elapsed_secs);
}

pub fn record_render_failed(kind: FailureKind, elapsed_secs: f64) {
    counter!(names::RENDERS_FAILED_TOTAL, "kind" => kind.as_str()).increment(1);
    histogram!(names::RENDER_DURATION_SECONDS, "status" => "error").record(elapsed_secs);
}

pub fn record_warning(warning: &RenderWarning) {
    counter!(
        names::RENDER_WARNINGS_TOTAL,
        "stage" => warning.stage.as_str(),
        "kind" => warning.kind.as_str()
    )
    .increment(1);
}

pub fn record_scenes_dropped(count: usize) {
    if count > 0 {
        counter!(names::SCENES_DROPPED_TOTAL).increment(count as u64);
    }
}
