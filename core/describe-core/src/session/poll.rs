//! The per-session poll loop.

use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::atomic::Ordering;
use std::sync::mpsc::{Receiver, RecvTimeoutError};
use std::sync::Arc;
use std::time::Duration;

use tracing::{debug, warn};

use super::slot::Offer;
use super::SessionShared;
use crate::backoff::RetryBackoff;
use crate::error::BackendError;

pub(super) fn millis(duration: Duration) -> u64 {
    u64::try_from(duration.as_millis()).unwrap_or(u64::MAX)
}

/// Runs until the shutdown sender is dropped or the session is marked closed.
///
/// Describe failures and describer panics are never surfaced; they only
/// stretch the wait through `backoff`. Callers observe them as an absence of
/// new content.
pub(super) fn run(shared: Arc<SessionShared>, shutdown: Receiver<()>, mut backoff: RetryBackoff) {
    let id = shared.id;
    loop {
        match shutdown.recv_timeout(backoff.delay()) {
            Err(RecvTimeoutError::Timeout) => {}
            Ok(()) | Err(RecvTimeoutError::Disconnected) => break,
        }
        // Timer and close can race; the flag is authoritative
        if shared.is_closed() {
            break;
        }

        shared.stats.polls.fetch_add(1, Ordering::Relaxed);
        let request = &shared.request;
        // A panicking describer counts as a failed poll
        let result = catch_unwind(AssertUnwindSafe(|| {
            shared
                .describer
                .describe(&request.namespace, &request.name, &shared.settings)
        }))
        .unwrap_or_else(|_| Err(BackendError::new("describer panicked")));

        let delay = match result {
            Err(err) => {
                shared.stats.failures.fetch_add(1, Ordering::Relaxed);
                let delay = backoff.on_failure();
                warn!(
                    session_id = id,
                    error = %err,
                    retry_in_ms = millis(delay),
                    "Describe poll failed"
                );
                delay
            }
            Ok(output) => {
                let delay = backoff.on_success();
                match shared.slot.offer(output) {
                    Offer::Unchanged => {
                        debug!(session_id = id, "Describe output unchanged");
                    }
                    Offer::Queued => {
                        shared.stats.deliveries.fetch_add(1, Ordering::Relaxed);
                        debug!(session_id = id, "Describe output changed; queued");
                    }
                    Offer::Dropped => {
                        shared.stats.dropped.fetch_add(1, Ordering::Relaxed);
                        debug!(session_id = id, "Describe output changed; slot full, dropped");
                    }
                }
                delay
            }
        };
        shared
            .stats
            .current_delay_ms
            .store(millis(delay), Ordering::Relaxed);
    }
    debug!(session_id = id, "Describe poll loop exited");
}
