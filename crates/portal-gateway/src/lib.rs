//! BMS Portal Gateway Library
//!
//! Session and authentication gateway in front of the BMS portal pages:
//!
//! - Keycloak authorization-code sign-in and sign-out
//! - Server-side session state (user, companies, tokens)
//! - Route guard deciding page access from the access token
//! - Authenticated proxy to the BMS backend API
//!
//! # Architecture
//!
//! ```text
//! routes/mod.rs -> middleware/route_guard.rs -> handlers/*.rs -> services/*.rs
//!                                                            \-> session/*.rs
//! ```
//!
//! # Modules
//!
//! - `config` - Service configuration from environment
//! - `cookies` - `portal-session` / `auth-token` cookie helpers
//! - `errors` - Error types with HTTP status code mapping
//! - `handlers` - HTTP request handlers
//! - `middleware` - Route guard and HTTP metrics
//! - `observability` - Prometheus metrics
//! - `routes` - Axum router setup
//! - `services` - Keycloak and BMS clients
//! - `session` - Session state and stores
//! - `tasks` - Background maintenance

pub mod config;
pub mod cookies;
pub mod errors;
pub mod handlers;
pub mod middleware;
pub mod observability;
pub mod routes;
pub mod services;
pub mod session;
pub mod tasks;
