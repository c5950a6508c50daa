//! Persistence contract the timer depends on.
//!
//! The timer never talks to SQLite directly; it only needs create, patch by
//! id, close-many by owner and "latest open session" lookups. [`Database`]
//! is the production implementation.
//!
//! [`Database`]: crate::db::Database

use anyhow::Result;
use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::db::models::{NewWorkSession, SessionPatch, SessionStatus, WorkSession};

#[cfg(test)]
pub mod fake;

#[async_trait]
pub trait SessionStore: Send + Sync {
    /// Inserts a running session and returns it with its assigned id.
    async fn create_session(&self, session: NewWorkSession) -> Result<WorkSession>;

    async fn update_session(&self, session_id: &str, patch: SessionPatch) -> Result<()>;

    /// Moves every open session of `owner` to `status` with `end_time`.
    /// Returns the number of sessions closed.
    async fn close_open_sessions(
        &self,
        owner: &str,
        status: SessionStatus,
        end_time: DateTime<Utc>,
    ) -> Result<usize>;

    /// Most recently started running or paused session of `owner`.
    async fn latest_open_session(&self, owner: &str) -> Result<Option<WorkSession>>;

    async fn get_session(&self, session_id: &str) -> Result<Option<WorkSession>>;

    /// Sessions of `owner` whose `start_time` falls in `[from, to]`, oldest first.
    async fn list_sessions_in_range(
        &self,
        owner: &str,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
    ) -> Result<Vec<WorkSession>>;
}
