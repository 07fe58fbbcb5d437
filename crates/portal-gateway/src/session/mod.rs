//! Server-side session state.
//!
//! The browser holds only two cookies: `portal-session` (an opaque
//! [`SessionId`](common::types::SessionId)) and `auth-token` (the access
//! token, read by the route guard). Everything else about the signed-in
//! user lives here.
//!
//! # Components
//!
//! - `state` - `AuthState`, the all-or-nothing record of a signed-in user
//! - `store` - `SessionStore` trait and its in-memory implementation
//! - `login` - short-lived sign-in bookkeeping (pending `state` values,
//!   consumed authorization codes, `return_to` sanitisation)

pub mod login;
pub mod state;
pub mod store;

pub use login::{
    generate_state, sanitize_return_to, CallbackGuard, PendingLoginStore, CALLBACK_CODE_TTL,
    LOGIN_STATE_TTL,
};
pub use state::{AuthState, CompanyMembership, SessionError, SessionSummary};
pub use store::{InMemorySessionStore, SessionStore, SessionUpdate};
