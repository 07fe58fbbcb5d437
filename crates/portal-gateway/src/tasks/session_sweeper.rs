//! Session sweeper background task.
//!
//! Periodically removes sessions that can no longer be used or refreshed,
//! login attempts that were never completed, and authorization codes past
//! their replay window. Nothing is refreshed here: token refresh only
//! happens when the portal asks for it.
//!
//! # Graceful Shutdown
//!
//! The task exits when its cancellation token is cancelled.

use crate::observability::metrics::{record_sessions_expired, set_active_sessions};
use crate::routes::AppState;
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, instrument};

/// Default sweep interval in seconds.
pub const DEFAULT_SWEEP_INTERVAL_SECONDS: u64 = 60;

/// Counts removed by one sweep.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct SweepReport {
    pub sessions: usize,
    pub pending_logins: usize,
    pub callback_codes: usize,
}

/// Run one sweep at `now` (Unix seconds).
pub async fn sweep_once(state: &AppState, now: i64) -> SweepReport {
    let report = SweepReport {
        sessions: state.sessions.remove_stale(now).await,
        pending_logins: state.pending_logins.purge_expired().await,
        callback_codes: state.callback_guard.purge_expired().await,
    };

    record_sessions_expired(report.sessions);
    set_active_sessions(state.sessions.count().await);
    report
}

/// Start the session sweeper.
///
/// Returns when the cancellation token is triggered.
#[instrument(skip_all, name = "portal.task.session_sweeper")]
pub async fn start_session_sweeper(
    state: Arc<AppState>,
    interval: Duration,
    cancel_token: CancellationToken,
) {
    info!(
        target: "portal.task.session_sweeper",
        interval_seconds = interval.as_secs(),
        "Starting session sweeper task"
    );

    let mut ticker = tokio::time::interval(interval);

    loop {
        tokio::select! {
            _ = ticker.tick() => {
                let report = sweep_once(&state, chrono::Utc::now().timestamp()).await;
                if report != SweepReport::default() {
                    debug!(
                        target: "portal.task.session_sweeper",
                        sessions = report.sessions,
                        pending_logins = report.pending_logins,
                        callback_codes = report.callback_codes,
                        "Swept expired entries"
                    );
                }
            }
            _ = cancel_token.cancelled() => {
                info!(
                    target: "portal.task.session_sweeper",
                    "Session sweeper received shutdown signal, exiting"
                );
                break;
            }
        }
    }

    info!(target: "portal.task.session_sweeper", "Session sweeper task stopped");
}
