//! Middleware for the portal gateway.
//!
//! # Components
//!
//! - `route_guard` - Session check in front of every portal page
//! - `http_metrics` - HTTP request metrics middleware

pub mod http_metrics;
pub mod route_guard;

pub use http_metrics::http_metrics_middleware;
pub use route_guard::{route_guard, ClaimsExt};
