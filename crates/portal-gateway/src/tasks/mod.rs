//! Background tasks for the portal gateway.
//!
//! # Tasks
//!
//! - `session_sweeper` - Drops stale sessions, abandoned logins and
//!   remembered authorization codes

pub mod session_sweeper;

pub use session_sweeper::{start_session_sweeper, sweep_once};
