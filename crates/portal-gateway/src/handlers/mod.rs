//! HTTP request handlers for the portal gateway.

pub mod auth;
pub mod bms_proxy;
pub mod health;
pub mod home;
pub mod metrics;
pub mod session;

pub use auth::{callback, login, logout};
pub use bms_proxy::proxy;
pub use health::health_check;
pub use home::{home, not_found};
pub use metrics::metrics_handler;
pub use session::{get_session, get_userinfo, refresh_session, switch_company};
