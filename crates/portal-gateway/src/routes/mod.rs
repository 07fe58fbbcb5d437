//! HTTP routes for the portal gateway.
//!
//! Defines the Axum router and application state.

use crate::config::Config;
use crate::handlers;
use crate::middleware::{http_metrics_middleware, route_guard};
use crate::services::{BmsClient, KeycloakClient, UpstreamError};
use crate::session::{CallbackGuard, InMemorySessionStore, PendingLoginStore, SessionStore};
use axum::{
    middleware,
    routing::{get, post, put},
    Router,
};
use metrics_exporter_prometheus::PrometheusHandle;
use ring::rand::SystemRandom;
use std::sync::Arc;
use std::time::Duration;
use tower_http::{timeout::TimeoutLayer, trace::TraceLayer};

/// Application state shared across all handlers.
#[derive(Clone)]
pub struct AppState {
    /// Service configuration.
    pub config: Config,

    /// Keycloak OIDC client.
    pub keycloak: KeycloakClient,

    /// BMS backend client.
    pub bms: BmsClient,

    /// Signed-in sessions.
    pub sessions: Arc<dyn SessionStore>,

    /// `state` values minted by `/login` and not yet used.
    pub pending_logins: PendingLoginStore,

    /// Authorization codes already processed by `/auth/callback`.
    pub callback_guard: CallbackGuard,

    /// CSPRNG for OIDC `state` values.
    pub rng: SystemRandom,
}

impl AppState {
    /// Build the state with an in-memory session store.
    ///
    /// # Errors
    ///
    /// Returns `UpstreamError::Configuration` if an HTTP client cannot be built.
    pub fn new(config: Config) -> Result<Self, UpstreamError> {
        Self::with_session_store(config, Arc::new(InMemorySessionStore::new()))
    }

    /// Build the state around an existing session store.
    ///
    /// # Errors
    ///
    /// Returns `UpstreamError::Configuration` if an HTTP client cannot be built.
    pub fn with_session_store(
        config: Config,
        sessions: Arc<dyn SessionStore>,
    ) -> Result<Self, UpstreamError> {
        Ok(Self {
            keycloak: KeycloakClient::new(&config)?,
            bms: BmsClient::new(config.api_base_url.clone())?,
            sessions,
            pending_logins: PendingLoginStore::new(),
            callback_guard: CallbackGuard::new(),
            rng: SystemRandom::new(),
            config,
        })
    }
}

/// Build the application routes.
///
/// Creates an Axum router with:
/// - `/health` - Liveness check
/// - `/metrics` - Prometheus metrics endpoint
/// - `/login`, `/auth/callback`, `/logout` - sign-in flow
/// - `/api/session`, `/api/session/company`, `/api/session/refresh`,
///   `/api/session/userinfo` - session accessors
/// - `/api/bms/*path` - BMS backend proxy
/// - `/` - landing route
/// - Route guard in front of everything, including the fallback
/// - TraceLayer for request logging
/// - HTTP metrics middleware
/// - 30 second request timeout
pub fn build_routes(state: Arc<AppState>, metrics_handle: PrometheusHandle) -> Router {
    let app_routes = Router::new()
        .route("/health", get(handlers::health_check))
        .route("/", get(handlers::home))
        .route("/login", get(handlers::login))
        .route("/auth/callback", get(handlers::callback))
        .route("/logout", get(handlers::logout))
        .route("/api/session", get(handlers::get_session))
        .route("/api/session/company", put(handlers::switch_company))
        .route("/api/session/refresh", post(handlers::refresh_session))
        .route("/api/session/userinfo", get(handlers::get_userinfo))
        .route(
            "/api/bms/*path",
            get(handlers::proxy)
                .post(handlers::proxy)
                .put(handlers::proxy)
                .patch(handlers::proxy)
                .delete(handlers::proxy),
        )
        .with_state(state);

    // Metrics route with its own state
    let metrics_routes = Router::new()
        .route("/metrics", get(handlers::metrics_handler))
        .with_state(metrics_handle);

    // Layer order (bottom-to-top execution):
    // 1. route_guard - Page access decision (innermost, also covers fallback)
    // 2. TimeoutLayer - Timeout the request
    // 3. TraceLayer - Log request details
    // 4. http_metrics_middleware - Record ALL responses (outermost)
    app_routes
        .merge(metrics_routes)
        .fallback(handlers::not_found)
        .layer(middleware::from_fn(route_guard))
        .layer(TimeoutLayer::new(Duration::from_secs(30)))
        .layer(TraceLayer::new_for_http())
        .layer(middleware::from_fn(http_metrics_middleware))
}
