//! Concurrent session-id → session map.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, RwLock, RwLockReadGuard, RwLockWriteGuard};

use super::DescribeSession;
use crate::types::{SessionId, SessionInfo};

// Process-wide so ids stay unique even across engines. Starts at 1; 0 is the
// failure sentinel at the boundary.
static NEXT_SESSION_ID: AtomicU64 = AtomicU64::new(1);

#[derive(Default)]
pub struct SessionRegistry {
    sessions: RwLock<HashMap<SessionId, Arc<DescribeSession>>>,
}

impl SessionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Next process-unique session id. Never returns 0 and never repeats.
    pub fn allocate_id(&self) -> SessionId {
        NEXT_SESSION_ID.fetch_add(1, Ordering::SeqCst)
    }

    pub fn insert(&self, session: Arc<DescribeSession>) {
        self.write().insert(session.id(), session);
    }

    pub fn get(&self, id: SessionId) -> Option<Arc<DescribeSession>> {
        self.read().get(&id).cloned()
    }

    /// Removes and returns the entry. Concurrent callers for the same id see
    /// exactly one `Some`.
    pub fn remove(&self, id: SessionId) -> Option<Arc<DescribeSession>> {
        self.write().remove(&id)
    }

    /// Removes the session and closes it. Unknown ids are a no-op.
    pub fn close(&self, id: SessionId) -> bool {
        match self.remove(id) {
            Some(session) => session.close(),
            None => false,
        }
    }

    /// Closes every registered session. Returns how many were closed.
    pub fn close_all(&self) -> usize {
        let drained: Vec<_> = self.write().drain().map(|(_, session)| session).collect();
        drained.iter().filter(|session| session.close()).count()
    }

    pub fn infos(&self) -> Vec<SessionInfo> {
        let mut infos: Vec<_> = self.read().values().map(|s| s.info()).collect();
        infos.sort_by_key(|info| info.id);
        infos
    }

    pub fn len(&self) -> usize {
        self.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    // Recover from poisoning - map mutations are single inserts/removes

    fn read(&self) -> RwLockReadGuard<'_, HashMap<SessionId, Arc<DescribeSession>>> {
        self.sessions
            .read()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn write(&self) -> RwLockWriteGuard<'_, HashMap<SessionId, Arc<DescribeSession>>> {
        self.sessions
            .write()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}
