use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, PoisonError, RwLock};
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::Serialize;
use tokio::sync::{broadcast, Mutex, MutexGuard};
use tracing::info;

use crate::errors::InputError;
use crate::events::AgentEvent;
use crate::flows::{SessionStatus, WorkflowState};

const MAX_SESSION_ID_LEN: usize = 128;

/// One committed view of a session. Replaced wholesale on every commit.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct Session {
    pub id: String,
    pub state: WorkflowState,
    pub events: Vec<AgentEvent>,
    pub status: SessionStatus,
    pub created_at: DateTime<Utc>,
    pub last_updated: DateTime<Utc>,
}

impl Session {
    fn new(id: &str) -> Self {
        let now = Utc::now();
        Self {
            id: id.to_string(),
            state: WorkflowState::initial(),
            events: Vec::new(),
            status: SessionStatus::Paused,
            created_at: now,
            last_updated: now,
        }
    }

    pub fn recent_events(&self, limit: usize) -> &[AgentEvent] {
        let start = self.events.len().saturating_sub(limit);
        &self.events[start..]
    }
}

pub fn validate_session_id(id: &str) -> Result<(), InputError> {
    let valid = !id.is_empty()
        && id.len() <= MAX_SESSION_ID_LEN
        && id.bytes().all(|byte| byte.is_ascii_alphanumeric() || byte == b'-' || byte == b'_');
    if valid {
        Ok(())
    } else {
        Err(InputError::InvalidSessionId(id.to_string()))
    }
}

/// Registry entry for a session: the advance lock, the current record and
/// the live event channel.
///
/// A handle is closed under its advance lock when the session is deleted or
/// evicted. Whoever locks a closed handle must look the id up again.
pub struct SessionHandle {
    id: String,
    advance: Mutex<()>,
    closed: AtomicBool,
    record: RwLock<Arc<Session>>,
    events: broadcast::Sender<AgentEvent>,
}

impl SessionHandle {
    fn new(id: &str, channel_capacity: usize) -> Self {
        let (events, _) = broadcast::channel(channel_capacity.max(1));
        Self {
            id: id.to_string(),
            advance: Mutex::new(()),
            closed: AtomicBool::new(false),
            record: RwLock::new(Arc::new(Session::new(id))),
            events,
        }
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    /// Never waits on an in-flight advance.
    pub fn snapshot(&self) -> Arc<Session> {
        self.record.read().unwrap_or_else(PoisonError::into_inner).clone()
    }

    /// Snapshot and receiver taken together so no commit falls between them.
    pub fn subscribe(&self) -> (Arc<Session>, broadcast::Receiver<AgentEvent>) {
        let record = self.record.read().unwrap_or_else(PoisonError::into_inner);
        (record.clone(), self.events.subscribe())
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::Acquire)
    }

    pub fn subscriber_count(&self) -> usize {
        self.events.receiver_count()
    }

    /// Waits for exclusive mutation rights on this session.
    pub async fn lock(&self) -> SessionGuard<'_> {
        SessionGuard { handle: self, _permit: self.advance.lock().await }
    }

    fn try_lock(&self) -> Option<SessionGuard<'_>> {
        self.advance.try_lock().ok().map(|permit| SessionGuard { handle: self, _permit: permit })
    }
}

/// Proof that the holder owns the session's advance lock.
pub struct SessionGuard<'a> {
    handle: &'a SessionHandle,
    _permit: MutexGuard<'a, ()>,
}

impl SessionGuard<'_> {
    pub fn snapshot(&self) -> Arc<Session> {
        self.handle.snapshot()
    }

    pub fn is_closed(&self) -> bool {
        self.handle.is_closed()
    }

    fn close(&self) {
        self.handle.closed.store(true, Ordering::Release);
    }

    /// Appends `events`, swaps in the new record and publishes the events.
    pub fn commit(
        &self,
        state: WorkflowState,
        events: Vec<AgentEvent>,
        status: SessionStatus,
    ) -> Arc<Session> {
        let mut record = self.handle.record.write().unwrap_or_else(PoisonError::into_inner);
        let mut log = record.events.clone();
        log.extend(events.iter().cloned());
        let next = Arc::new(Session {
            id: record.id.clone(),
            state,
            events: log,
            status,
            created_at: record.created_at,
            last_updated: Utc::now(),
        });
        *record = next.clone();
        for event in events {
            // no receivers is fine
            let _ = self.handle.events.send(event);
        }
        next
    }

    /// Back to a fresh intake session. Announcements are published but not logged.
    pub fn reset(&self, announcements: Vec<AgentEvent>) -> Arc<Session> {
        let mut record = self.handle.record.write().unwrap_or_else(PoisonError::into_inner);
        let mut fresh = Session::new(&record.id);
        fresh.created_at = record.created_at;
        let next = Arc::new(fresh);
        *record = next.clone();
        for event in announcements {
            let _ = self.handle.events.send(event);
        }
        next
    }
}

/// Process-local registry holding one handle per session id.
pub struct SessionStore {
    sessions: tokio::sync::RwLock<HashMap<String, Arc<SessionHandle>>>,
    channel_capacity: usize,
}

impl Default for SessionStore {
    fn default() -> Self {
        Self::new(256)
    }
}

impl SessionStore {
    pub fn new(channel_capacity: usize) -> Self {
        Self { sessions: tokio::sync::RwLock::new(HashMap::new()), channel_capacity }
    }

    pub async fn get_or_create(&self, id: &str) -> Result<Arc<SessionHandle>, InputError> {
        validate_session_id(id)?;
        if let Some(handle) = self.sessions.read().await.get(id) {
            return Ok(handle.clone());
        }

        let mut sessions = self.sessions.write().await;
        let handle = sessions
            .entry(id.to_string())
            .or_insert_with(|| {
                info!(event_name = "session.created", session_id = %id, "session created");
                Arc::new(SessionHandle::new(id, self.channel_capacity))
            })
            .clone();
        Ok(handle)
    }

    pub async fn get(&self, id: &str) -> Result<Arc<SessionHandle>, InputError> {
        validate_session_id(id)?;
        self.sessions
            .read()
            .await
            .get(id)
            .cloned()
            .ok_or_else(|| InputError::SessionNotFound(id.to_string()))
    }

    pub async fn reset(
        &self,
        id: &str,
        announcement: AgentEvent,
    ) -> Result<Arc<Session>, InputError> {
        let handle = self.get(id).await?;
        let guard = handle.lock().await;
        if guard.is_closed() {
            return Err(InputError::SessionNotFound(id.to_string()));
        }
        Ok(guard.reset(vec![announcement]))
    }

    /// Waits for any in-flight advance to finish, then closes and removes the
    /// session. Live subscribers see their stream end.
    pub async fn delete(&self, id: &str) -> Result<bool, InputError> {
        validate_session_id(id)?;
        let Some(handle) = self.sessions.read().await.get(id).cloned() else {
            return Ok(false);
        };

        let guard = handle.lock().await;
        if guard.is_closed() {
            return Ok(false);
        }
        let mut sessions = self.sessions.write().await;
        if sessions.get(id).is_some_and(|current| Arc::ptr_eq(current, &handle)) {
            sessions.remove(id);
        }
        guard.close();
        drop(sessions);

        info!(event_name = "session.deleted", session_id = %id, "session deleted");
        Ok(true)
    }

    /// Drops sessions untouched for longer than `max_idle`. Sessions that are
    /// advancing right now are kept.
    pub async fn evict_idle(&self, max_idle: Duration) -> Vec<String> {
        let Ok(max_idle) = chrono::Duration::from_std(max_idle) else {
            return Vec::new();
        };
        let cutoff = Utc::now() - max_idle;

        let mut idle = Vec::new();
        self.sessions.write().await.retain(|id, handle| {
            let Some(guard) = handle.try_lock() else {
                return true;
            };
            if guard.snapshot().last_updated >= cutoff {
                return true;
            }
            guard.close();
            idle.push(id.clone());
            false
        });
        if !idle.is_empty() {
            info!(event_name = "session.evicted", count = idle.len(), "idle sessions evicted");
        }
        idle
    }

    pub async fn len(&self) -> usize {
        self.sessions.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.sessions.read().await.is_empty()
    }
}
