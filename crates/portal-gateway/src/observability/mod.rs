//! Observability for the portal gateway.
//!
//! Log fields follow one rule: identifiers and tokens never appear in
//! plaintext. Handlers use `#[instrument(skip_all)]` and add only bounded,
//! non-identifying fields (operation names, status codes, outcomes).

pub mod metrics;

pub use metrics::init_metrics_recorder;
