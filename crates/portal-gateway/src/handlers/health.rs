//! Liveness check.

/// Handler for GET /health
///
/// Does not check Keycloak or BMS; failure means the process is hung.
pub async fn health_check() -> &'static str {
    "OK"
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_health_check() {
        assert_eq!(health_check().await, "OK");
    }
}
