//! Common utilities and types shared across the BMS portal crates.

#![warn(clippy::pedantic)]

/// Module for common data types
pub mod types;

/// Module for secret types that prevent accidental logging
pub mod secret;

/// Module for JWT utilities (unverified claim decoding, size limits)
pub mod jwt;
