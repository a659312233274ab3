//! Request counters with a Prometheus text export.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Instant;

/// Metrics collector shared by every dispatcher of one server process.
#[derive(Debug)]
pub struct Metrics {
    /// Total requests processed (notifications included)
    pub requests_total: AtomicU64,
    /// Requests answered with a JSON-RPC error
    pub requests_failed: AtomicU64,
    /// `tools/call` requests
    pub tool_calls: AtomicU64,
    /// `tools/call` results flagged `isError`
    pub tool_errors: AtomicU64,
    /// Open SSE sessions
    pub active_sessions: AtomicU64,
    started: Instant,
}

impl Metrics {
    /// Create a new metrics collector.
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn inc_requests(&self) {
        self.requests_total.fetch_add(1, Ordering::Relaxed);
    }

    pub fn inc_failed(&self) {
        self.requests_failed.fetch_add(1, Ordering::Relaxed);
    }

    pub fn inc_tool_calls(&self) {
        self.tool_calls.fetch_add(1, Ordering::Relaxed);
    }

    pub fn inc_tool_errors(&self) {
        self.tool_errors.fetch_add(1, Ordering::Relaxed);
    }

    pub fn session_opened(&self) {
        self.active_sessions.fetch_add(1, Ordering::Relaxed);
    }

    pub fn session_closed(&self) {
        // Saturate at zero.
        let _ = self
            .active_sessions
            .fetch_update(Ordering::Relaxed, Ordering::Relaxed, |n| n.checked_sub(1));
    }

    /// Seconds since the collector was created.
    pub fn uptime_secs(&self) -> u64 {
        self.started.elapsed().as_secs()
    }

    /// Get all metrics as a snapshot.
    pub fn snapshot(&self) -> MetricsSnapshot {
        MetricsSnapshot {
            requests_total: self.requests_total.load(Ordering::Relaxed),
            requests_failed: self.requests_failed.load(Ordering::Relaxed),
            tool_calls: self.tool_calls.load(Ordering::Relaxed),
            tool_errors: self.tool_errors.load(Ordering::Relaxed),
            active_sessions: self.active_sessions.load(Ordering::Relaxed),
            uptime_secs: self.uptime_secs(),
        }
    }

    /// Export metrics in Prometheus format.
    pub fn to_prometheus(&self) -> String {
        let s = self.snapshot();
        format!(
            r#"# HELP mcp_requests_total Total number of JSON-RPC messages handled
# TYPE mcp_requests_total counter
mcp_requests_total {}

# HELP mcp_requests_failed Requests answered with a JSON-RPC error
# TYPE mcp_requests_failed counter
mcp_requests_failed {}

# HELP mcp_tool_calls Tool invocations
# TYPE mcp_tool_calls counter
mcp_tool_calls {}

# HELP mcp_tool_errors Tool invocations that returned an error result
# TYPE mcp_tool_errors counter
mcp_tool_errors {}

# HELP mcp_active_sessions Open SSE sessions
# TYPE mcp_active_sessions gauge
mcp_active_sessions {}

# HELP mcp_uptime_seconds Seconds since server start
# TYPE mcp_uptime_seconds gauge
mcp_uptime_seconds {}
"#,
            s.requests_total,
            s.requests_failed,
            s.tool_calls,
            s.tool_errors,
            s.active_sessions,
            s.uptime_secs
        )
    }
}

impl Default for Metrics {
    fn default() -> Self {
        Self {
            requests_total: AtomicU64::new(0),
            requests_failed: AtomicU64::new(0),
            tool_calls: AtomicU64::new(0),
            tool_errors: AtomicU64::new(0),
            active_sessions: AtomicU64::new(0),
            started: Instant::now(),
        }
    }
}

/// Metrics snapshot.
#[derive(Debug, Clone, serde::Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MetricsSnapshot {
    pub requests_total: u64,
    pub requests_failed: u64,
    pub tool_calls: u64,
    pub tool_errors: u64,
    pub active_sessions: u64,
    pub uptime_secs: u64,
}
