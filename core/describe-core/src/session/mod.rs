//! Auto-refreshing describe sessions.
//!
//! A session owns one poll thread, one [`DeliverySlot`] and a close-once
//! shutdown signal. The poll thread is the only writer of the slot; callers
//! drain it through [`DescribeSession::read`].
//!
//! # Shutdown
//!
//! The poll thread waits on a channel receiver with a timeout. Closing drops the
//! sender, which wakes the wait immediately with `Disconnected`. A describe call
//! already in flight is not interrupted; the thread exits at the next loop
//! boundary.

mod poll;
mod registry;
mod slot;

pub use registry::SessionRegistry;
pub use slot::{DeliverySlot, Offer};

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::mpsc::{self, Sender};
use std::sync::{Arc, Mutex};
use std::thread::{self, JoinHandle};

use chrono::{DateTime, Utc};
use tracing::info;

use crate::backend::ResourceDescriber;
use crate::backoff::RetryBackoff;
use crate::error::{DescribeError, Result};
use crate::types::{ConnectionConfig, DescribeRequest, DescribeSettings, SessionId, SessionInfo};

#[derive(Default)]
pub(crate) struct SessionStats {
    pub polls: AtomicU64,
    pub failures: AtomicU64,
    pub deliveries: AtomicU64,
    pub dropped: AtomicU64,
    pub current_delay_ms: AtomicU64,
}

/// State shared between the session handle and its poll thread.
pub(crate) struct SessionShared {
    pub id: SessionId,
    pub request: DescribeRequest,
    pub connection: Arc<ConnectionConfig>,
    pub describer: Arc<dyn ResourceDescriber>,
    pub settings: DescribeSettings,
    pub slot: DeliverySlot,
    pub closed: AtomicBool,
    pub opened_at: DateTime<Utc>,
    pub stats: SessionStats,
}

impl SessionShared {
    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }
}

/// Everything a session needs that was resolved before it started.
pub(crate) struct SessionParts {
    pub request: DescribeRequest,
    pub connection: Arc<ConnectionConfig>,
    pub describer: Arc<dyn ResourceDescriber>,
    pub settings: DescribeSettings,
    pub initial: String,
    pub backoff: RetryBackoff,
}

pub struct DescribeSession {
    shared: Arc<SessionShared>,
    shutdown: Mutex<Option<Sender<()>>>,
    worker: Mutex<Option<JoinHandle<()>>>,
}

impl DescribeSession {
    /// Builds the session around an already-rendered first output and starts
    /// its poll thread.
    pub(crate) fn start(id: SessionId, parts: SessionParts) -> Result<Self> {
        let SessionParts {
            request,
            connection,
            describer,
            settings,
            initial,
            backoff,
        } = parts;

        let stats = SessionStats::default();
        stats
            .current_delay_ms
            .store(poll::millis(backoff.delay()), Ordering::Relaxed);

        let shared = Arc::new(SessionShared {
            id,
            request,
            connection,
            describer,
            settings,
            slot: DeliverySlot::new(initial),
            closed: AtomicBool::new(false),
            opened_at: Utc::now(),
            stats,
        });

        let (shutdown_tx, shutdown_rx) = mpsc::channel();
        let worker = {
            let shared = Arc::clone(&shared);
            thread::Builder::new()
                .name(format!("describe-session-{id}"))
                .spawn(move || poll::run(shared, shutdown_rx, backoff))
                .map_err(DescribeError::PollLoop)?
        };

        info!(
            session_id = id,
            context = %shared.request.context,
            resource = %shared.request.resource_type,
            namespace = %shared.request.namespace,
            name = %shared.request.name,
            "Describe session opened"
        );

        Ok(Self {
            shared,
            shutdown: Mutex::new(Some(shutdown_tx)),
            worker: Mutex::new(Some(worker)),
        })
    }

    pub fn id(&self) -> SessionId {
        self.shared.id
    }

    /// Takes the pending render without blocking. `None` means no new content.
    pub fn read(&self) -> Option<String> {
        self.shared.slot.take()
    }

    pub fn is_open(&self) -> bool {
        !self.shared.is_closed()
    }

    /// Marks the session closed and signals the poll thread.
    ///
    /// Only the first call does anything; it returns `true`.
    pub fn close(&self) -> bool {
        if self.shared.closed.swap(true, Ordering::SeqCst) {
            return false;
        }
        // Dropping the sender wakes the poll thread's wait
        drop(
            self.shutdown
                .lock()
                .unwrap_or_else(|poisoned| poisoned.into_inner())
                .take(),
        );
        info!(session_id = self.shared.id, "Describe session closed");
        true
    }

    /// True once the poll thread has exited.
    pub fn is_finished(&self) -> bool {
        self.worker
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .as_ref()
            .map_or(true, |handle| handle.is_finished())
    }

    /// Waits for the poll thread to exit. Only meaningful after [`close`](Self::close).
    pub fn join(&self) {
        let handle = self
            .worker
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .take();
        if let Some(handle) = handle {
            let _ = handle.join();
        }
    }

    pub fn info(&self) -> SessionInfo {
        let shared = &self.shared;
        let stats = &shared.stats;
        SessionInfo {
            id: shared.id,
            context: shared.request.context.clone(),
            resource_type: shared.request.resource_type.clone(),
            namespace: shared.request.namespace.clone(),
            name: shared.request.name.clone(),
            server: shared.connection.server.clone(),
            opened_at: shared.opened_at,
            open: !shared.is_closed(),
            polls: stats.polls.load(Ordering::Relaxed),
            failures: stats.failures.load(Ordering::Relaxed),
            deliveries: stats.deliveries.load(Ordering::Relaxed),
            dropped: stats.dropped.load(Ordering::Relaxed),
            current_delay_ms: stats.current_delay_ms.load(Ordering::Relaxed),
        }
    }
}

impl Drop for DescribeSession {
    fn drop(&mut self) {
        self.close();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::test_utils::ScriptedDescriber;
    use crate::error::BackendError;
    use crate::types::ResourceType;
    use std::time::{Duration, Instant};

    const WAIT: Duration = Duration::from_secs(5);

    fn parts(
        describer: Arc<dyn ResourceDescriber>,
        initial: &str,
        backoff: RetryBackoff,
    ) -> SessionParts {
        SessionParts {
            request: DescribeRequest {
                resource_type: ResourceType::new("", "v1", "pods"),
                namespace: "default".to_string(),
                name: "web-0".to_string(),
                context: "dev".to_string(),
            },
            connection: Arc::new(ConnectionConfig::new("dev")),
            describer,
            settings: DescribeSettings::default(),
            initial: initial.to_string(),
            backoff,
        }
    }

    /// Blocks every call until the test hands it a response.
    struct GatedDescriber {
        entered: Mutex<mpsc::Sender<()>>,
        responses: Mutex<mpsc::Receiver<std::result::Result<String, String>>>,
    }

    impl ResourceDescriber for GatedDescriber {
        fn describe(
            &self,
            _namespace: &str,
            _name: &str,
            _settings: &DescribeSettings,
        ) -> std::result::Result<String, BackendError> {
            let _ = self.entered.lock().unwrap().send(());
            let response = self
                .responses
                .lock()
                .unwrap()
                .recv()
                .map_err(|_| BackendError::new("gate closed"))?;
            response.map_err(BackendError::from)
        }
    }

    /// Panics on the first call, then renders "B".
    struct PanicOnceDescriber {
        calls: AtomicU64,
    }

    impl ResourceDescriber for PanicOnceDescriber {
        fn describe(
            &self,
            _namespace: &str,
            _name: &str,
            _settings: &DescribeSettings,
        ) -> std::result::Result<String, BackendError> {
            if self.calls.fetch_add(1, Ordering::SeqCst) == 0 {
                panic!("describer blew up");
            }
            Ok("B".to_string())
        }
    }

    fn start_session(describer: Arc<ScriptedDescriber>, initial: &str) -> DescribeSession {
        let backoff = RetryBackoff::new(Duration::from_millis(5), Duration::from_millis(40));
        DescribeSession::start(1, parts(describer, initial, backoff)).unwrap()
    }

    #[test]
    fn close_is_idempotent_and_stops_poll_thread() {
        let describer = Arc::new(ScriptedDescriber::outputs(["A"]));
        let session = start_session(describer, "A");

        assert!(session.is_open());
        assert!(session.close());
        assert!(!session.close());
        assert!(!session.is_open());

        session.join();
        assert!(session.is_finished());
    }

    #[test]
    fn concurrent_close_signals_exactly_once() {
        let describer = Arc::new(ScriptedDescriber::outputs(["A"]));
        let session = Arc::new(start_session(describer, "A"));

        let handles: Vec<_> = (0..8)
            .map(|_| {
                let session = Arc::clone(&session);
                thread::spawn(move || session.close())
            })
            .collect();
        let winners = handles
            .into_iter()
            .map(|h| h.join().unwrap())
            .filter(|closed| *closed)
            .count();

        assert_eq!(winners, 1);
        session.join();
    }

    #[test]
    fn close_interrupts_long_wait() {
        let describer = Arc::new(ScriptedDescriber::outputs(["A"]));
        let backoff = RetryBackoff::new(Duration::from_secs(3600), Duration::from_secs(3600));
        let session = DescribeSession::start(7, parts(describer.clone(), "A", backoff)).unwrap();

        session.close();
        session.join();
        assert!(session.is_finished());
        assert_eq!(describer.calls(), 0);
    }

    #[test]
    fn poll_failures_are_absorbed_and_counted() {
        let describer = Arc::new(ScriptedDescriber::new([
            Err("connection refused"),
            Err("connection refused"),
            Ok("A"),
        ]));
        let session = start_session(describer.clone(), "A");
        assert_eq!(session.read(), Some("A".to_string()));

        assert!(describer.wait_for_calls(4, WAIT));
        let info = session.info();
        assert_eq!(info.failures, 2);
        assert!(info.polls >= 3);
        assert_eq!(session.read(), None);
        session.close();
    }

    #[test]
    fn info_reports_target_coordinates() {
        let describer = Arc::new(ScriptedDescriber::outputs(["A"]));
        let session = start_session(describer, "A");
        let info = session.info();
        assert_eq!(info.id, 1);
        assert_eq!(info.name, "web-0");
        assert_eq!(info.namespace, "default");
        assert!(info.open);
        assert_eq!(info.current_delay_ms, 5);
        session.close();
        assert!(!session.info().open);
    }

    #[test]
    fn poll_delay_doubles_on_failure_and_resets_on_success() {
        let (entered_tx, entered_rx) = mpsc::channel();
        let (response_tx, response_rx) = mpsc::channel();
        let describer = Arc::new(GatedDescriber {
            entered: Mutex::new(entered_tx),
            responses: Mutex::new(response_rx),
        });
        let backoff = RetryBackoff::new(Duration::from_millis(20), Duration::from_millis(100));
        let session = DescribeSession::start(9, parts(describer, "A", backoff)).unwrap();

        // Each call is held until answered, so the delay read on entry is the
        // one stored by the previous poll.
        let script = [
            Err("refused"),
            Err("refused"),
            Err("refused"),
            Err("refused"),
            Ok("B"),
            Ok("B"),
        ];
        let mut delays = Vec::new();
        for response in script {
            entered_rx.recv_timeout(WAIT).unwrap();
            delays.push(session.info().current_delay_ms);
            response_tx
                .send(response.map(str::to_string).map_err(str::to_string))
                .unwrap();
        }
        entered_rx.recv_timeout(WAIT).unwrap();
        delays.push(session.info().current_delay_ms);

        assert_eq!(delays, [20, 40, 80, 100, 100, 20, 20]);
        assert_eq!(session.info().failures, 4);

        session.close();
        drop(response_tx);
        session.join();
    }

    #[test]
    fn describer_panic_counts_as_failure_and_polling_continues() {
        let describer = Arc::new(PanicOnceDescriber {
            calls: AtomicU64::new(0),
        });
        let backoff = RetryBackoff::new(Duration::from_millis(5), Duration::from_millis(20));
        let session = DescribeSession::start(11, parts(describer, "A", backoff)).unwrap();
        assert_eq!(session.read(), Some("A".to_string()));

        let deadline = Instant::now() + WAIT;
        let delivered = loop {
            if let Some(text) = session.read() {
                break text;
            }
            assert!(Instant::now() < deadline, "no render after describer panic");
            thread::sleep(Duration::from_millis(2));
        };

        assert_eq!(delivered, "B");
        assert!(session.is_open());
        assert!(!session.is_finished());
        assert_eq!(session.info().failures, 1);
        session.close();
    }
}
