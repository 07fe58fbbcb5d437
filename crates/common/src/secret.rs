//! Secret types for keeping tokens out of logs.
//!
//! Access tokens, refresh tokens, id tokens and the OIDC client secret all
//! travel through the gateway. They are held as [`SecretString`] so that any
//! struct deriving `Debug` redacts them automatically, and reading the value
//! requires an explicit [`ExposeSecret::expose_secret`] call at the point of
//! use (an `Authorization` header, a form field, a cookie value).
//!
//! # Example
//!
//! ```rust
//! use common::secret::{ExposeSecret, SecretString};
//!
//! #[derive(Debug)]
//! struct Tokens {
//!     token_type: String,
//!     access_token: SecretString,
//! }
//!
//! let tokens = Tokens {
//!     token_type: "Bearer".to_string(),
//!     access_token: SecretString::from("eyJhbGciOi..."),
//! };
//!
//! assert!(!format!("{tokens:?}").contains("eyJhbGciOi"));
//! let header = format!("Bearer {}", tokens.access_token.expose_secret());
//! assert!(header.starts_with("Bearer eyJ"));
//! ```
//!
//! With the `serde` feature of `secrecy`, token responses from the identity
//! provider can be deserialized straight into `SecretString` fields.

pub use secrecy::{ExposeSecret, SecretString};
