use std::sync::{
    atomic::{AtomicBool, Ordering},
    Mutex,
};

use anyhow::{anyhow, bail, Result};
use async_trait::async_trait;
use chrono::{DateTime, Utc};

use super::SessionStore;
use crate::db::models::{NewWorkSession, SessionPatch, SessionStatus, WorkSession};

/// In-memory store with switchable failure, for timer tests.
#[derive(Default)]
pub struct FakeStore {
    sessions: Mutex<Vec<WorkSession>>,
    patches: Mutex<Vec<(String, SessionPatch)>>,
    next_id: Mutex<u64>,
    failing: AtomicBool,
}

impl FakeStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_failing(&self, failing: bool) {
        self.failing.store(failing, Ordering::SeqCst);
    }

    pub fn seed(&self, session: WorkSession) {
        self.sessions.lock().unwrap().push(session);
    }

    pub fn all(&self) -> Vec<WorkSession> {
        self.sessions.lock().unwrap().clone()
    }

    pub fn find(&self, session_id: &str) -> Option<WorkSession> {
        self.all().into_iter().find(|s| s.id == session_id)
    }

    /// Every successful patch in arrival order.
    pub fn patches(&self) -> Vec<(String, SessionPatch)> {
        self.patches.lock().unwrap().clone()
    }

    pub fn open_count(&self, owner: &str) -> usize {
        self.all()
            .iter()
            .filter(|s| s.owner == owner && s.status.is_open())
            .count()
    }

    fn check(&self) -> Result<()> {
        if self.failing.load(Ordering::SeqCst) {
            bail!("store unavailable");
        }
        Ok(())
    }
}

#[async_trait]
impl SessionStore for FakeStore {
    async fn create_session(&self, session: NewWorkSession) -> Result<WorkSession> {
        self.check()?;
        let id = {
            let mut next = self.next_id.lock().unwrap();
            *next += 1;
            format!("session-{}", *next)
        };
        let record = session.into_session(id);
        self.sessions.lock().unwrap().push(record.clone());
        Ok(record)
    }

    async fn update_session(&self, session_id: &str, patch: SessionPatch) -> Result<()> {
        self.check()?;
        let mut sessions = self.sessions.lock().unwrap();
        let session = sessions
            .iter_mut()
            .find(|s| s.id == session_id)
            .ok_or_else(|| anyhow!("session {session_id} not found"))?;
        patch.apply_to(session);
        self.patches
            .lock()
            .unwrap()
            .push((session_id.to_string(), patch));
        Ok(())
    }

    async fn close_open_sessions(
        &self,
        owner: &str,
        status: SessionStatus,
        end_time: DateTime<Utc>,
    ) -> Result<usize> {
        self.check()?;
        let mut closed = 0;
        for session in self.sessions.lock().unwrap().iter_mut() {
            if session.owner == owner && session.status.is_open() {
                session.status = status;
                session.end_time = Some(end_time);
                closed += 1;
            }
        }
        Ok(closed)
    }

    async fn latest_open_session(&self, owner: &str) -> Result<Option<WorkSession>> {
        self.check()?;
        Ok(self
            .all()
            .into_iter()
            .filter(|s| s.owner == owner && s.status.is_open())
            .max_by_key(|s| s.start_time))
    }

    async fn get_session(&self, session_id: &str) -> Result<Option<WorkSession>> {
        self.check()?;
        Ok(self.find(session_id))
    }

    async fn list_sessions_in_range(
        &self,
        owner: &str,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
    ) -> Result<Vec<WorkSession>> {
        self.check()?;
        let mut sessions: Vec<_> = self
            .all()
            .into_iter()
            .filter(|s| s.owner == owner && s.start_time >= from && s.start_time <= to)
            .collect();
        sessions.sort_by_key(|s| s.start_time);
        Ok(sessions)
    }
}
