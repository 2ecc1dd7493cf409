//! Metrics Collector

use prometheus::{Histogram, HistogramOpts, IntCounter, IntCounterVec, IntGauge, Opts, Registry, TextEncoder};
use tracing::{debug, error};

use crate::relay::ConnectionStats;

/// Collects and exports gateway metrics
pub struct Metrics {
    prometheus_registry: Registry,

    connections_total: IntCounter,
    active_sessions: IntGauge,
    handshake_rejected_total: IntCounterVec,
    outbound_connect_failures_total: IntCounter,
    bytes_up_total: IntCounter,
    bytes_down_total: IntCounter,
    session_duration: Histogram,
}

impl Metrics {
    /// Create a new metrics collector
    pub fn new() -> Self {
        let prometheus_registry = Registry::new();

        let connections_total = IntCounter::new(
            "wsgate_connections_total",
            "Total number of upgraded tunnel connections"
        ).expect("Failed to create connections_total counter");

        let active_sessions = IntGauge::new(
            "wsgate_active_sessions",
            "Number of tunnel sessions currently relaying"
        ).expect("Failed to create active_sessions gauge");

        let handshake_rejected_total = IntCounterVec::new(
            Opts::new(
                "wsgate_handshake_rejected_total",
                "Handshakes dropped before acknowledgement"
            ),
            &["reason"],
        ).expect("Failed to create handshake_rejected_total counter");

        let outbound_connect_failures_total = IntCounter::new(
            "wsgate_outbound_connect_failures_total",
            "Outbound connection attempts that failed"
        ).expect("Failed to create outbound_connect_failures_total counter");

        let bytes_up_total = IntCounter::new(
            "wsgate_bytes_up_total",
            "Bytes forwarded from clients to targets"
        ).expect("Failed to create bytes_up_total counter");

        let bytes_down_total = IntCounter::new(
            "wsgate_bytes_down_total",
            "Bytes forwarded from targets to clients"
        ).expect("Failed to create bytes_down_total counter");

        let session_duration = Histogram::with_opts(
            HistogramOpts::new(
                "wsgate_session_duration_seconds",
                "Duration of relay sessions in seconds"
            ).buckets(vec![0.1, 0.5, 1.0, 5.0, 10.0, 30.0, 60.0, 300.0, 600.0, 3600.0])
        ).expect("Failed to create session_duration histogram");

        prometheus_registry.register(Box::new(connections_total.clone()))
            .expect("Failed to register connections_total");
        prometheus_registry.register(Box::new(active_sessions.clone()))
            .expect("Failed to register active_sessions");
        prometheus_registry.register(Box::new(handshake_rejected_total.clone()))
            .expect("Failed to register handshake_rejected_total");
        prometheus_registry.register(Box::new(outbound_connect_failures_total.clone()))
            .expect("Failed to register outbound_connect_failures_total");
        prometheus_registry.register(Box::new(bytes_up_total.clone()))
            .expect("Failed to register bytes_up_total");
        prometheus_registry.register(Box::new(bytes_down_total.clone()))
            .expect("Failed to register bytes_down_total");
        prometheus_registry.register(Box::new(session_duration.clone()))
            .expect("Failed to register session_duration");

        Self {
            prometheus_registry,
            connections_total,
            active_sessions,
            handshake_rejected_total,
            outbound_connect_failures_total,
            bytes_up_total,
            bytes_down_total,
            session_duration,
        }
    }

    /// Record a freshly upgraded WebSocket connection
    pub fn connection_opened(&self) {
        self.connections_total.inc();
    }

    /// Record a handshake dropped before the acknowledgement
    pub fn handshake_rejected(&self, reason: &str) {
        self.handshake_rejected_total.with_label_values(&[reason]).inc();
        debug!(reason = %reason, "Recorded handshake rejection");
    }

    pub fn outbound_connect_failed(&self) {
        self.outbound_connect_failures_total.inc();
    }

    pub fn session_started(&self) {
        self.active_sessions.inc();
    }

    /// Record the final statistics of a relay session
    pub fn session_ended(&self, stats: &ConnectionStats) {
        self.active_sessions.dec();
        self.bytes_up_total.inc_by(stats.bytes_up);
        self.bytes_down_total.inc_by(stats.bytes_down);
        self.session_duration.observe(stats.duration_ms as f64 / 1000.0);
    }

    /// Export metrics in Prometheus format
    pub fn export_prometheus(&self) -> String {
        let encoder = TextEncoder::new();
        let metric_families = self.prometheus_registry.gather();

        match encoder.encode_to_string(&metric_families) {
            Ok(output) => output,
            Err(e) => {
                error!(error = %e, "Failed to encode Prometheus metrics");
                String::new()
            }
        }
    }

    pub fn get_active_sessions(&self) -> i64 {
        self.active_sessions.get()
    }

    pub fn get_total_connections(&self) -> u64 {
        self.connections_total.get()
    }

    /// Total bytes relayed in both directions by finished sessions
    pub fn get_bytes_transferred(&self) -> u64 {
        self.bytes_up_total.get() + self.bytes_down_total.get()
    }

    pub fn get_handshake_rejections(&self, reason: &str) -> u64 {
        self.handshake_rejected_total.with_label_values(&[reason]).get()
    }

    pub fn get_outbound_connect_failures(&self) -> u64 {
        self.outbound_connect_failures_total.get()
    }
}

impl Default for Metrics {
    fn default() -> Self {
        Self::new()
    }
}
