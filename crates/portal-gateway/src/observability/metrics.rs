//! Metrics definitions for the portal gateway.
//!
//! All metrics follow Prometheus naming conventions:
//! - `portal_` prefix
//! - `_total` suffix for counters
//! - `_seconds` suffix for duration histograms
//!
//! # Cardinality
//!
//! Labels are bounded:
//! - `method`: HTTP methods
//! - `endpoint`: fixed set of gateway routes, everything else is `/other`
//! - `status`: success, error, timeout
//! - `decision`: route guard outcomes
//! - `operation`: upstream call names fixed in code

use metrics::{counter, gauge, histogram};
use metrics_exporter_prometheus::{Matcher, PrometheusBuilder, PrometheusHandle};
use std::time::Duration;

/// Initialize the Prometheus recorder and return the handle used by the
/// `/metrics` endpoint.
///
/// # Errors
///
/// Returns error if the recorder fails to install (e.g., already installed).
pub fn init_metrics_recorder() -> Result<PrometheusHandle, String> {
    PrometheusBuilder::new()
        .set_buckets_for_metric(
            Matcher::Prefix("portal_http_request".to_string()),
            &[
                0.005, 0.010, 0.025, 0.050, 0.100, 0.200, 0.500, 1.000, 2.000, 5.000,
            ],
        )
        .map_err(|e| format!("Failed to set HTTP request buckets: {e}"))?
        // Upstream calls cross the network to Keycloak / BMS
        .set_buckets_for_metric(
            Matcher::Prefix("portal_upstream_request".to_string()),
            &[
                0.010, 0.025, 0.050, 0.100, 0.200, 0.500, 1.000, 2.000, 5.000, 10.000,
            ],
        )
        .map_err(|e| format!("Failed to set upstream request buckets: {e}"))?
        .set_buckets_for_metric(
            Matcher::Prefix("portal_callback".to_string()),
            &[0.050, 0.100, 0.250, 0.500, 1.000, 2.500, 5.000, 10.000, 20.000],
        )
        .map_err(|e| format!("Failed to set callback buckets: {e}"))?
        .install_recorder()
        .map_err(|e| format!("Failed to install Prometheus recorder: {e}"))
}

// ============================================================================
// HTTP Request Metrics
// ============================================================================

/// Record HTTP request completion.
///
/// Metric: `portal_http_requests_total`, `portal_http_request_duration_seconds`
/// Labels: `method`, `endpoint`, `status`
pub fn record_http_request(method: &str, endpoint: &str, status_code: u16, duration: Duration) {
    let normalized_endpoint = normalize_endpoint(endpoint);
    let status = categorize_status_code(status_code);

    histogram!("portal_http_request_duration_seconds",
        "method" => method.to_string(),
        "endpoint" => normalized_endpoint,
        "status" => status
    )
    .record(duration.as_secs_f64());

    counter!("portal_http_requests_total",
        "method" => method.to_string(),
        "endpoint" => normalized_endpoint,
        "status_code" => status_code.to_string()
    )
    .increment(1);
}

/// Categorize HTTP status code into success/error/timeout.
///
/// Redirects count as success: the guard and the login flow answer with them.
fn categorize_status_code(status_code: u16) -> &'static str {
    match status_code {
        200..=399 => "success",
        408 | 504 => "timeout",
        _ => "error",
    }
}

/// Normalize endpoint path to a fixed label set.
fn normalize_endpoint(path: &str) -> &'static str {
    match path {
        "/" => "/",
        "/health" => "/health",
        "/metrics" => "/metrics",
        "/login" => "/login",
        "/logout" => "/logout",
        "/auth/callback" => "/auth/callback",
        "/api/session" => "/api/session",
        "/api/session/company" => "/api/session/company",
        "/api/session/refresh" => "/api/session/refresh",
        "/api/session/userinfo" => "/api/session/userinfo",
        p if p.starts_with("/api/bms/") => "/api/bms/{path}",
        _ => "/other",
    }
}

// ============================================================================
// Route Guard Metrics
// ============================================================================

/// Record a route guard decision.
///
/// Metric: `portal_route_guard_decisions_total`
/// Labels: `decision` (public, asset, allowed, missing_token, expired,
/// forbidden_role)
pub fn record_guard_decision(decision: &'static str) {
    counter!("portal_route_guard_decisions_total", "decision" => decision).increment(1);
}

// ============================================================================
// Sign-in Metrics
// ============================================================================

/// Record a sign-in callback outcome and its end-to-end duration.
///
/// Metric: `portal_callback_total`, `portal_callback_duration_seconds`
/// Labels: `outcome` (success, idp_error, missing_code, unknown_state, replayed,
/// token_exchange, userinfo, incomplete, internal)
pub fn record_callback(outcome: &'static str, duration: Duration) {
    histogram!("portal_callback_duration_seconds", "outcome" => outcome)
        .record(duration.as_secs_f64());
    counter!("portal_callback_total", "outcome" => outcome).increment(1);
}

/// Record a login redirect to the identity provider.
///
/// Metric: `portal_login_redirects_total`
pub fn record_login_redirect() {
    counter!("portal_login_redirects_total").increment(1);
}

// ============================================================================
// Upstream Metrics
// ============================================================================

/// Record an upstream call to Keycloak or the BMS backend.
///
/// Metric: `portal_upstream_requests_total`, `portal_upstream_request_duration_seconds`
/// Labels: `service` (keycloak, bms), `operation`, `status` (success, error)
pub fn record_upstream_request(
    service: &'static str,
    operation: &'static str,
    status: &'static str,
    duration: Duration,
) {
    histogram!("portal_upstream_request_duration_seconds",
        "service" => service,
        "operation" => operation,
        "status" => status
    )
    .record(duration.as_secs_f64());

    counter!("portal_upstream_requests_total",
        "service" => service,
        "operation" => operation,
        "status" => status
    )
    .increment(1);
}

// ============================================================================
// Session Metrics
// ============================================================================

/// Set the number of live sessions.
///
/// Metric: `portal_active_sessions`
#[allow(clippy::cast_precision_loss)]
pub fn set_active_sessions(count: usize) {
    gauge!("portal_active_sessions").set(count as f64);
}

/// Record sessions removed by the sweeper.
///
/// Metric: `portal_sessions_expired_total`
pub fn record_sessions_expired(count: usize) {
    counter!("portal_sessions_expired_total").increment(count as u64);
}

#[cfg(test)]
mod tests {
    use super::*;

    // These tests exercise the recording paths without an installed
    // recorder; the metrics facade makes them no-ops.

    #[test]
    fn test_record_http_request() {
        record_http_request("GET", "/health", 200, Duration::from_millis(2));
        record_http_request("GET", "/dashboard", 307, Duration::from_millis(1));
        record_http_request("GET", "/auth/callback", 401, Duration::from_millis(300));
        record_http_request("POST", "/api/bms/companies", 504, Duration::from_secs(30));
    }

    #[test]
    fn test_categorize_status_code() {
        assert_eq!(categorize_status_code(200), "success");
        assert_eq!(categorize_status_code(303), "success");
        assert_eq!(categorize_status_code(307), "success");
        assert_eq!(categorize_status_code(408), "timeout");
        assert_eq!(categorize_status_code(504), "timeout");
        assert_eq!(categorize_status_code(400), "error");
        assert_eq!(categorize_status_code(401), "error");
        assert_eq!(categorize_status_code(502), "error");
    }

    #[test]
    fn test_normalize_endpoint_known_paths() {
        assert_eq!(normalize_endpoint("/"), "/");
        assert_eq!(normalize_endpoint("/login"), "/login");
        assert_eq!(normalize_endpoint("/auth/callback"), "/auth/callback");
        assert_eq!(normalize_endpoint("/api/session/refresh"), "/api/session/refresh");
    }

    #[test]
    fn test_normalize_endpoint_bounds_dynamic_paths() {
        assert_eq!(normalize_endpoint("/api/bms/companies/42"), "/api/bms/{path}");
        assert_eq!(normalize_endpoint("/projects/17/documents"), "/other");
        assert_eq!(normalize_endpoint("/users"), "/other");
    }

    #[test]
    fn test_record_helpers_without_recorder() {
        record_guard_decision("expired");
        record_callback("success", Duration::from_millis(120));
        record_login_redirect();
        record_upstream_request("keycloak", "token_exchange", "success", Duration::from_millis(40));
        set_active_sessions(3);
        record_sessions_expired(2);
    }

    #[test]
    fn test_guard_and_callback_metrics_are_captured() {
        use metrics_util::debugging::{DebugValue, DebuggingRecorder};

        let recorder = DebuggingRecorder::new();
        let snapshotter = recorder.snapshotter();

        metrics::with_local_recorder(&recorder, || {
            record_guard_decision("missing_token");
            record_guard_decision("missing_token");
            record_callback("replayed", Duration::from_millis(5));
            set_active_sessions(4);
        });

        let metrics = snapshotter.snapshot().into_vec();
        let find = |name: &str| {
            metrics
                .iter()
                .find(|(key, _, _, _)| key.key().name() == name)
                .map(|(_, _, _, value)| value.clone())
        };

        assert_eq!(
            find("portal_route_guard_decisions_total"),
            Some(&DebugValue::Counter(2))
        );
        assert_eq!(find("portal_callback_total"), Some(&DebugValue::Counter(1)));
        assert!(matches!(
            find("portal_active_sessions"),
            Some(DebugValue::Gauge(v)) if v.into_inner() == 4.0
        ));
        assert!(matches!(
            find("portal_callback_duration_seconds"),
            Some(DebugValue::Histogram(samples)) if samples.len() == 1
        ));
    }
}
