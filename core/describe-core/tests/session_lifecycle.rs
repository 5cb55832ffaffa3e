//! Integration tests for session lifecycle through the public engine API.

use std::collections::HashSet;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::thread;
use std::time::{Duration, Instant};

use describe_core::{
    BackendError, ClusterBackend, ConnectionConfig, DescribeConfig, DescribeEngine,
    DescribeRequest, DescribeSettings, ResourceDescriber, ResourceMapping, ResourceType,
    BOUNDARY_ERROR_PREFIX,
};

/// Describer whose output is either fixed text or a per-call counter.
struct LiveDescriber {
    text: Mutex<Option<String>>,
    calls: AtomicU64,
}

impl LiveDescriber {
    fn fixed(text: &str) -> Arc<Self> {
        Arc::new(Self {
            text: Mutex::new(Some(text.to_string())),
            calls: AtomicU64::new(0),
        })
    }

    fn counting() -> Arc<Self> {
        Arc::new(Self {
            text: Mutex::new(None),
            calls: AtomicU64::new(0),
        })
    }

    fn set(&self, text: &str) {
        *self.text.lock().unwrap() = Some(text.to_string());
    }

    fn calls(&self) -> u64 {
        self.calls.load(Ordering::SeqCst)
    }

    fn wait_for_calls(&self, count: u64) {
        let deadline = Instant::now() + Duration::from_secs(5);
        while self.calls() < count {
            assert!(Instant::now() < deadline, "describer reached {} calls", self.calls());
            thread::sleep(Duration::from_millis(1));
        }
    }
}

impl ResourceDescriber for LiveDescriber {
    fn describe(
        &self,
        _namespace: &str,
        name: &str,
        _settings: &DescribeSettings,
    ) -> Result<String, BackendError> {
        let call = self.calls.fetch_add(1, Ordering::SeqCst);
        match self.text.lock().unwrap().as_ref() {
            Some(text) => Ok(text.clone()),
            None => Ok(format!("{name} v{call}")),
        }
    }
}

struct LiveBackend {
    describer: Arc<LiveDescriber>,
}

impl ClusterBackend for LiveBackend {
    fn open_connection(&self, context: &str) -> Result<ConnectionConfig, BackendError> {
        if context == "unreachable" {
            return Err(BackendError::new("connection refused"));
        }
        Ok(ConnectionConfig::new(context))
    }

    fn resolve_mapping(
        &self,
        _connection: &ConnectionConfig,
        resource_type: &ResourceType,
    ) -> Result<ResourceMapping, BackendError> {
        Ok(ResourceMapping::synthetic(resource_type))
    }

    fn build_describer(
        &self,
        _connection: &ConnectionConfig,
        _mapping: &ResourceMapping,
    ) -> Result<Option<Arc<dyn ResourceDescriber>>, BackendError> {
        Ok(Some(self.describer.clone()))
    }
}

fn engine(describer: Arc<LiveDescriber>) -> DescribeEngine {
    let config = DescribeConfig {
        refresh_interval_ms: 2,
        max_retry_interval_ms: 10,
        ..DescribeConfig::default()
    };
    DescribeEngine::with_config(Arc::new(LiveBackend { describer }), config)
}

fn request(context: &str, name: &str) -> DescribeRequest {
    DescribeRequest {
        resource_type: ResourceType::new("apps", "v1", "deployments"),
        namespace: "default".to_string(),
        name: name.to_string(),
        context: context.to_string(),
    }
}

#[test]
fn test_changed_content_is_delivered_once() {
    let describer = LiveDescriber::fixed("A");
    let engine = engine(describer.clone());
    let id = engine.create_session(&request("dev", "web")).unwrap();

    assert_eq!(engine.read_session(id).as_deref(), Some("A"));
    describer.wait_for_calls(describer.calls() + 2);
    assert_eq!(engine.read_session(id), None);

    describer.set("B");
    describer.wait_for_calls(describer.calls() + 2);
    assert_eq!(engine.read_session(id).as_deref(), Some("B"));
    describer.wait_for_calls(describer.calls() + 2);
    assert_eq!(engine.read_session(id), None);

    engine.close_session(id);
}

#[test]
fn test_unread_session_keeps_polling_without_queueing() {
    let describer = LiveDescriber::counting();
    let engine = engine(describer.clone());
    let id = engine.create_session(&request("dev", "web")).unwrap();

    describer.wait_for_calls(20);
    assert!(engine.session_is_open(id));
    let info = engine.session_info(id).unwrap();
    assert!(info.dropped > 0, "{info:?}");

    // The undelivered first render is still the one held.
    assert_eq!(engine.read_session(id).as_deref(), Some("web v0"));

    let seen = describer.calls();
    describer.wait_for_calls(seen + 2);
    let next = engine.read_session(id).unwrap();
    assert_ne!(next, "web v0");
    engine.close_session(id);
}

#[test]
fn test_concurrent_creates_yield_distinct_handles() {
    let engine = Arc::new(engine(LiveDescriber::fixed("A")));

    let handles: Vec<_> = (0..16)
        .map(|i| {
            let engine = Arc::clone(&engine);
            thread::spawn(move || engine.create_session(&request("dev", &format!("web-{i}"))))
        })
        .collect();
    let ids: Vec<u64> = handles
        .into_iter()
        .map(|h| h.join().unwrap().unwrap())
        .collect();

    let unique: HashSet<_> = ids.iter().copied().collect();
    assert_eq!(unique.len(), 16);
    assert!(!unique.contains(&0));
    assert_eq!(engine.open_session_count(), 16);
    assert_eq!(engine.close_all(), 16);
    assert!(ids.iter().all(|id| !engine.session_is_open(*id)));
}

#[test]
fn test_concurrent_close_is_safe() {
    let engine = Arc::new(engine(LiveDescriber::fixed("A")));
    let id = engine.create_session(&request("dev", "web")).unwrap();

    let closers: Vec<_> = (0..8)
        .map(|_| {
            let engine = Arc::clone(&engine);
            thread::spawn(move || engine.close_session(id))
        })
        .collect();
    for closer in closers {
        closer.join().unwrap();
    }

    assert!(!engine.session_is_open(id));
    assert_eq!(engine.read_session(id), None);
    assert!(engine.list_sessions().is_empty());
}

#[test]
fn test_unreachable_context_fails_without_session() {
    let engine = engine(LiveDescriber::fixed("A"));

    assert!(engine.create_session(&request("unreachable", "web")).is_err());
    assert_eq!(engine.open_session_count(), 0);

    let text = engine.describe_text(&request("unreachable", "web"));
    assert!(text.starts_with(BOUNDARY_ERROR_PREFIX), "{text}");
    assert!(text.contains("connection refused"));
}

#[test]
fn test_one_shot_describe_creates_no_session() {
    let engine = engine(LiveDescriber::fixed("Name: web"));
    assert_eq!(engine.describe(&request("dev", "web")).unwrap(), "Name: web");
    assert_eq!(engine.open_session_count(), 0);
}
