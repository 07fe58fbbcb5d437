//! Test server harness for E2E testing
//!
//! Provides `TestPortalServer` for spawning real gateway instances in tests.

use crate::mocks::{TEST_CLIENT_ID, TEST_REALM};
use metrics_exporter_prometheus::{PrometheusBuilder, PrometheusHandle};
use portal_gateway::config::Config;
use portal_gateway::observability::init_metrics_recorder;
use portal_gateway::routes::{self, AppState};
use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::{Arc, OnceLock};
use tokio::task::JoinHandle;

/// Global metrics handle shared by all test servers in a process.
static TEST_METRICS_HANDLE: OnceLock<PrometheusHandle> = OnceLock::new();

fn test_metrics_handle() -> PrometheusHandle {
    TEST_METRICS_HANDLE
        .get_or_init(|| {
            init_metrics_recorder()
                .unwrap_or_else(|_| PrometheusBuilder::new().build_recorder().handle())
        })
        .clone()
}

/// Test harness for spawning the portal gateway in E2E tests.
///
/// # Example
/// ```rust,ignore
/// #[tokio::test]
/// async fn test_health() -> Result<()> {
///     let keycloak = MockKeycloak::start().await;
///     let bms = MockBms::start().await;
///     let server = TestPortalServer::spawn(&keycloak.url(), &bms.url()).await?;
///
///     let response = server.client().get(format!("{}/health", server.url())).send().await?;
///     assert_eq!(response.status(), 200);
///     Ok(())
/// }
/// ```
pub struct TestPortalServer {
    addr: SocketAddr,
    state: Arc<AppState>,
    config: Config,
    _handle: JoinHandle<()>,
}

impl TestPortalServer {
    /// Spawn a gateway talking to the given Keycloak and BMS base URLs.
    ///
    /// The server binds to a random available port (127.0.0.1:0).
    pub async fn spawn(keycloak_url: &str, api_url: &str) -> Result<Self, anyhow::Error> {
        let vars = HashMap::from([
            (
                "NEXT_PUBLIC_KEYCLOAK_URL".to_string(),
                keycloak_url.to_string(),
            ),
            (
                "NEXT_PUBLIC_KEYCLOAK_REALM".to_string(),
                TEST_REALM.to_string(),
            ),
            (
                "NEXT_PUBLIC_KEYCLOAK_CLIENT_ID".to_string(),
                TEST_CLIENT_ID.to_string(),
            ),
            ("NEXT_PUBLIC_API_URL".to_string(), api_url.to_string()),
            (
                "PORTAL_PUBLIC_URL".to_string(),
                "http://portal.test".to_string(),
            ),
            ("BIND_ADDRESS".to_string(), "127.0.0.1:0".to_string()),
        ]);

        let config = Config::from_vars(&vars)
            .map_err(|e| anyhow::anyhow!("Failed to create config: {}", e))?;

        let state = Arc::new(
            AppState::new(config.clone())
                .map_err(|e| anyhow::anyhow!("Failed to create app state: {}", e))?,
        );

        let app = routes::build_routes(state.clone(), test_metrics_handle());

        let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
            .await
            .map_err(|e| anyhow::anyhow!("Failed to bind test server: {}", e))?;

        let addr = listener
            .local_addr()
            .map_err(|e| anyhow::anyhow!("Failed to get local address: {}", e))?;

        let handle = tokio::spawn(async move {
            let make_service = app.into_make_service_with_connect_info::<SocketAddr>();
            if let Err(e) = axum::serve(listener, make_service).await {
                eprintln!("Test server error: {}", e);
            }
        });

        Ok(Self {
            addr,
            state,
            config,
            _handle: handle,
        })
    }

    /// Get the base URL of the test server.
    pub fn url(&self) -> String {
        format!("http://{}", self.addr)
    }

    pub fn addr(&self) -> SocketAddr {
        self.addr
    }

    /// Shared application state, for seeding sessions and login state.
    pub fn state(&self) -> &Arc<AppState> {
        &self.state
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    /// HTTP client that does not follow redirects, so tests can assert on
    /// `Location` and `Set-Cookie`.
    pub fn client(&self) -> reqwest::Client {
        reqwest::Client::builder()
            .redirect(reqwest::redirect::Policy::none())
            .build()
            .expect("test HTTP client should build")
    }
}

impl Drop for TestPortalServer {
    fn drop(&mut self) {
        self._handle.abort();
    }
}

/// Collect every `Set-Cookie` header of a response.
pub fn set_cookies(response: &reqwest::Response) -> Vec<String> {
    response
        .headers()
        .get_all(reqwest::header::SET_COOKIE)
        .iter()
        .filter_map(|v| v.to_str().ok())
        .map(str::to_string)
        .collect()
}

/// Value of cookie `name` from a response's `Set-Cookie` headers.
pub fn cookie_value(response: &reqwest::Response, name: &str) -> Option<String> {
    set_cookies(response).into_iter().find_map(|cookie| {
        cookie
            .split(';')
            .next()
            .and_then(|pair| pair.split_once('='))
            .filter(|(key, _)| *key == name)
            .map(|(_, value)| value.to_string())
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mocks::{MockBms, MockKeycloak};

    #[tokio::test]
    async fn test_server_spawns_successfully() -> Result<(), anyhow::Error> {
        let keycloak = MockKeycloak::start().await;
        let bms = MockBms::start().await;
        let server = TestPortalServer::spawn(&keycloak.url(), &bms.url()).await?;

        assert!(server.url().starts_with("http://127.0.0.1:"));
        assert!(server.addr().ip().is_loopback());

        let response = reqwest::get(format!("{}/health", server.url())).await?;
        assert_eq!(response.status(), 200);
        assert_eq!(response.text().await?, "OK");

        Ok(())
    }

    #[tokio::test]
    async fn test_server_uses_mock_urls() -> Result<(), anyhow::Error> {
        let keycloak = MockKeycloak::start().await;
        let bms = MockBms::start().await;
        let server = TestPortalServer::spawn(&keycloak.url(), &bms.url()).await?;

        assert_eq!(server.config().keycloak_url, keycloak.url());
        assert_eq!(server.config().api_base_url, bms.url());
        assert_eq!(
            server.config().redirect_uri(),
            "http://portal.test/auth/callback"
        );

        Ok(())
    }
}
