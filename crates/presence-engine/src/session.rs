//! Enrollment session state and the session store.
//!
//! Each session tracks one employee's multi-angle capture progress through
//! a small state machine: `collecting` → `complete` | `expired` | `failed`.
//! The store is the only shared mutable state in the engine: a registry
//! keyed by session ID, each entry guarded by its own async mutex so
//! concurrent captures for the *same* session serialize while distinct
//! sessions proceed in parallel. The registry lock itself is held only for
//! map access and never across an await point.

use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;
use std::sync::Mutex as StdMutex;

use chrono::{DateTime, Duration as ChronoDuration, Utc};
use presence_core::types::{CaptureAngle, Embedding};
use serde::{Deserialize, Serialize};
use tokio::sync::Mutex;
use uuid::Uuid;

/// Opaque enrollment session identifier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SessionId(Uuid);

impl SessionId {
    fn generate() -> Self {
        SessionId(Uuid::new_v4())
    }
}

impl std::fmt::Display for SessionId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl std::str::FromStr for SessionId {
    type Err = uuid::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(SessionId(Uuid::parse_str(s)?))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SessionStatus {
    Collecting,
    Complete,
    Expired,
    Failed,
}

impl std::fmt::Display for SessionStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            SessionStatus::Collecting => "collecting",
            SessionStatus::Complete => "complete",
            SessionStatus::Expired => "expired",
            SessionStatus::Failed => "failed",
        };
        f.write_str(s)
    }
}

impl SessionStatus {
    /// Terminal states accept no further captures.
    pub fn is_terminal(&self) -> bool {
        !matches!(self, SessionStatus::Collecting)
    }
}

/// Per-employee multi-angle capture progress. Owned exclusively by the
/// session store; mutated only under the per-session lock.
#[derive(Debug)]
pub struct EnrollmentSession {
    pub session_id: SessionId,
    pub employee_id: String,
    /// Captured embeddings, last write wins per angle.
    pub captured: BTreeMap<CaptureAngle, Embedding>,
    /// Failed-liveness capture counts per angle.
    pub failed_attempts: BTreeMap<CaptureAngle, u32>,
    pub status: SessionStatus,
    pub created_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
}

impl EnrollmentSession {
    fn new(employee_id: &str, ttl: ChronoDuration) -> Self {
        let now = Utc::now();
        Self {
            session_id: SessionId::generate(),
            employee_id: employee_id.to_string(),
            captured: BTreeMap::new(),
            failed_attempts: BTreeMap::new(),
            status: SessionStatus::Collecting,
            created_at: now,
            expires_at: now + ttl,
        }
    }

    /// Flip a stale `collecting` session to `expired`. Returns true if the
    /// session is (now) expired.
    pub fn note_expired_if_due(&mut self, now: DateTime<Utc>) -> bool {
        if self.status == SessionStatus::Collecting && now >= self.expires_at {
            self.status = SessionStatus::Expired;
        }
        self.status == SessionStatus::Expired
    }

    /// Record one failed-liveness capture for an angle. The session fails
    /// once the count for any single angle exceeds `max_retries`.
    pub fn record_failure(&mut self, angle: CaptureAngle, max_retries: u32) -> u32 {
        let count = self.failed_attempts.entry(angle).or_insert(0);
        *count += 1;
        if *count > max_retries {
            self.status = SessionStatus::Failed;
        }
        *count
    }

    /// Required angles not yet captured.
    pub fn missing_angles(&self, required: &[CaptureAngle]) -> Vec<CaptureAngle> {
        required
            .iter()
            .filter(|a| !self.captured.contains_key(a))
            .copied()
            .collect()
    }
}

/// Registry of active enrollment sessions with TTL-based expiry.
pub struct SessionStore {
    sessions: StdMutex<HashMap<SessionId, Arc<Mutex<EnrollmentSession>>>>,
    ttl: ChronoDuration,
}

impl SessionStore {
    pub fn new(ttl: std::time::Duration) -> Self {
        Self {
            sessions: StdMutex::new(HashMap::new()),
            ttl: ChronoDuration::seconds(ttl.as_secs() as i64),
        }
    }

    /// Create a fresh `collecting` session for an employee.
    pub fn create(&self, employee_id: &str) -> (SessionId, DateTime<Utc>) {
        let session = EnrollmentSession::new(employee_id, self.ttl);
        let id = session.session_id;
        let expires_at = session.expires_at;
        let mut map = self.sessions.lock().expect("session registry poisoned");
        map.insert(id, Arc::new(Mutex::new(session)));
        tracing::debug!(session = %id, employee_id, "enrollment session created");
        (id, expires_at)
    }

    /// Fetch a session handle. Expiry is checked by callers under the
    /// per-session lock, not here, so an expired-but-unswept session still
    /// reports `SessionExpired` rather than vanishing.
    pub fn get(&self, id: &SessionId) -> Option<Arc<Mutex<EnrollmentSession>>> {
        let map = self.sessions.lock().expect("session registry poisoned");
        map.get(id).cloned()
    }

    /// Drop a session from the registry (finalized, cancelled, or expired).
    pub fn remove(&self, id: &SessionId) {
        let mut map = self.sessions.lock().expect("session registry poisoned");
        map.remove(id);
    }

    pub fn len(&self) -> usize {
        self.sessions.lock().expect("session registry poisoned").len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Snapshot of every registered session handle.
    pub fn handles(&self) -> Vec<(SessionId, Arc<Mutex<EnrollmentSession>>)> {
        let map = self.sessions.lock().expect("session registry poisoned");
        map.iter().map(|(id, s)| (*id, s.clone())).collect()
    }

    /// Sweep: mark stale sessions expired and drop all terminal sessions.
    /// Returns the number of sessions removed.
    pub async fn purge_expired(&self) -> usize {
        let entries = self.handles();

        let now = Utc::now();
        let mut stale = Vec::new();
        for (id, session) in entries {
            let mut s = session.lock().await;
            if s.note_expired_if_due(now) || s.status.is_terminal() {
                stale.push(id);
            }
        }

        let mut map = self.sessions.lock().expect("session registry poisoned");
        for id in &stale {
            map.remove(id);
        }
        stale.len()
    }
}
