//! Metrics for the ingestion pipeline
//!
//! Recorded through the `metrics` facade. Until [`init`] installs the
//! Prometheus recorder every call here is a no-op, which is what tests rely on.

use std::fmt;
use std::net::SocketAddr;
use tracing::{info, warn};

/// All metric names used by the pipeline
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MetricName {
    IngestCallsSuccess,
    IngestCallsError,
    IngestDuration,
    SchemaRejected,
    ConflictsDetected,
    VehiclesAdded,
    VehiclesSkipped,
    SummariesAdded,
    DetailsAdded,
    DetailsSkipped,
    DaysSeen,
}

impl MetricName {
    pub fn as_str(&self) -> &'static str {
        match self {
            MetricName::IngestCallsSuccess => "turo_ingest_calls_success_total",
            MetricName::IngestCallsError => "turo_ingest_calls_error_total",
            MetricName::IngestDuration => "turo_ingest_duration_seconds",
            MetricName::SchemaRejected => "turo_ingest_schema_rejected_total",
            MetricName::ConflictsDetected => "turo_ingest_conflicts_total",
            MetricName::VehiclesAdded => "turo_ingest_vehicles_added_total",
            MetricName::VehiclesSkipped => "turo_ingest_vehicles_skipped_total",
            MetricName::SummariesAdded => "turo_ingest_booking_summaries_added_total",
            MetricName::DetailsAdded => "turo_ingest_booking_details_added_total",
            MetricName::DetailsSkipped => "turo_ingest_booking_details_skipped_total",
            MetricName::DaysSeen => "turo_ingest_calendar_days_seen_total",
        }
    }
}

impl fmt::Display for MetricName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Install the Prometheus exporter with an HTTP listener on `port`.
///
/// A second install in the same process fails; that is logged and ignored.
pub fn init(port: u16) {
    let addr: SocketAddr = ([0, 0, 0, 0], port).into();
    let builder = metrics_exporter_prometheus::PrometheusBuilder::new().with_http_listener(addr);
    match builder.install() {
        Ok(()) => info!("Prometheus exporter listening on http://{}/metrics", addr),
        Err(e) => warn!("Prometheus exporter install failed (possibly already installed): {}", e),
    }
}

// ============================================================================
// Per-call metrics
// ============================================================================

pub mod calls {
    use super::MetricName;

    pub fn success(operation: &'static str, secs: f64) {
        ::metrics::counter!(MetricName::IngestCallsSuccess.as_str(), "operation" => operation).increment(1);
        ::metrics::histogram!(MetricName::IngestDuration.as_str(), "operation" => operation).record(secs);
    }

    pub fn error(operation: &'static str, kind: &'static str, secs: f64) {
        ::metrics::counter!(
            MetricName::IngestCallsError.as_str(),
            "operation" => operation,
            "kind" => kind
        )
        .increment(1);
        ::metrics::histogram!(MetricName::IngestDuration.as_str(), "operation" => operation).record(secs);
        match kind {
            "schema_validation" => {
                ::metrics::counter!(MetricName::SchemaRejected.as_str(), "operation" => operation).increment(1)
            }
            "conflict" => {
                ::metrics::counter!(MetricName::ConflictsDetected.as_str(), "operation" => operation).increment(1)
            }
            _ => {}
        }
    }
}

// ============================================================================
// Entity metrics
// ============================================================================

pub mod entities {
    use super::MetricName;

    pub fn vehicles(added: usize, skipped: usize) {
        ::metrics::counter!(MetricName::VehiclesAdded.as_str()).increment(added as u64);
        ::metrics::counter!(MetricName::VehiclesSkipped.as_str()).increment(skipped as u64);
    }

    pub fn summaries(added: usize) {
        ::metrics::counter!(MetricName::SummariesAdded.as_str()).increment(added as u64);
    }

    pub fn details(added: usize, skipped: usize, days_seen: usize) {
        ::metrics::counter!(MetricName::DetailsAdded.as_str()).increment(added as u64);
        ::metrics::counter!(MetricName::DetailsSkipped.as_str()).increment(skipped as u64);
        ::metrics::counter!(MetricName::DaysSeen.as_str()).increment(days_seen as u64);
    }
}
