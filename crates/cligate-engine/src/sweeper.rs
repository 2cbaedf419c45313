use std::sync::Arc;
use std::time::Duration;

use tracing::{info, warn};

use crate::orchestrator::ChatOrchestrator;

pub const SWEEP_INTERVAL: Duration = Duration::from_secs(60 * 60);
pub const MAX_SESSION_AGE_HOURS: f64 = 24.0;

/// Periodically drop sessions idle for longer than `max_age_hours`.
pub fn start_session_sweeper(
    backends: Vec<Arc<ChatOrchestrator>>,
    interval: Duration,
    max_age_hours: f64,
) -> tokio::task::JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(interval);
        loop {
            ticker.tick().await;
            for backend in &backends {
                let name = backend.config().kind.name();
                match backend.cleanup_sessions(max_age_hours).await {
                    Ok(0) => {}
                    Ok(removed) => info!(backend = name, removed, "expired sessions removed"),
                    Err(e) => warn!(backend = name, error = %e, "session sweep failed"),
                }
            }
        }
    })
}
