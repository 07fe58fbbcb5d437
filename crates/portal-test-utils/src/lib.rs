//! # Portal Test Utilities
//!
//! Shared test utilities for the portal gateway.
//!
//! This crate provides:
//! - Test token builder (`TestTokenBuilder`)
//! - Wiremock-backed Keycloak and BMS mocks (`MockKeycloak`, `MockBms`)
//! - Server test harness (`TestPortalServer` for E2E tests)
//!
//! ## Usage
//!
//! ```rust,ignore
//! use portal_test_utils::*;
//!
//! #[tokio::test]
//! async fn test_example() -> anyhow::Result<()> {
//!     let keycloak = MockKeycloak::start().await;
//!     let bms = MockBms::start().await;
//!     let server = TestPortalServer::spawn(&keycloak.url(), &bms.url()).await?;
//!
//!     let token = TestTokenBuilder::new().with_role("admin").build();
//!     // ...
//!     Ok(())
//! }
//! ```

pub mod mocks;
pub mod server_harness;
pub mod token_builders;

pub use mocks::*;
pub use server_harness::*;
pub use token_builders::*;
