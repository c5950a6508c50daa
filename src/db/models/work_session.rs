//! Work-session records as persisted by a [`SessionStore`](crate::store::SessionStore).

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum SessionStatus {
    Running,
    Paused,
    Completed,
    Aborted,
}

impl SessionStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            SessionStatus::Running => "running",
            SessionStatus::Paused => "paused",
            SessionStatus::Completed => "completed",
            SessionStatus::Aborted => "aborted",
        }
    }

    pub fn is_open(&self) -> bool {
        matches!(self, SessionStatus::Running | SessionStatus::Paused)
    }
}

/// One row per timer run.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct WorkSession {
    pub id: String,
    pub owner: String,
    pub activity_label: String,
    pub linked_project: Option<String>,
    pub start_time: DateTime<Utc>,
    pub end_time: Option<DateTime<Utc>>,
    pub status: SessionStatus,
    pub last_heartbeat: DateTime<Utc>,
    pub accumulated_pause_ms: u64,
}

impl WorkSession {
    /// Active time as of `reference`, never negative.
    pub fn active_ms_at(&self, reference: DateTime<Utc>) -> u64 {
        effective_elapsed_ms(self.start_time, reference, self.accumulated_pause_ms)
    }

    /// Active time of a closed session, `None` while the session is still open.
    pub fn closed_active_ms(&self) -> Option<u64> {
        self.end_time.map(|end| self.active_ms_at(end))
    }
}

/// `max(0, (reference - start) - paused)` in milliseconds.
pub fn effective_elapsed_ms(
    start_time: DateTime<Utc>,
    reference: DateTime<Utc>,
    accumulated_pause_ms: u64,
) -> u64 {
    let span = (reference - start_time).num_milliseconds();
    let paused = i64::try_from(accumulated_pause_ms).unwrap_or(i64::MAX);
    span.saturating_sub(paused).max(0) as u64
}

/// Insert payload; the store assigns `id` and fills the open-session defaults.
#[derive(Debug, Clone)]
pub struct NewWorkSession {
    pub owner: String,
    pub activity_label: String,
    pub linked_project: Option<String>,
    pub start_time: DateTime<Utc>,
}

impl NewWorkSession {
    pub fn into_session(self, id: String) -> WorkSession {
        WorkSession {
            id,
            owner: self.owner,
            activity_label: self.activity_label,
            linked_project: self.linked_project,
            start_time: self.start_time,
            end_time: None,
            status: SessionStatus::Running,
            last_heartbeat: self.start_time,
            accumulated_pause_ms: 0,
        }
    }
}

/// Partial update applied by id. `None` fields are left untouched.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SessionPatch {
    pub status: Option<SessionStatus>,
    pub last_heartbeat: Option<DateTime<Utc>>,
    pub end_time: Option<DateTime<Utc>>,
    pub accumulated_pause_ms: Option<u64>,
}

impl SessionPatch {
    pub fn heartbeat(at: DateTime<Utc>) -> Self {
        Self {
            last_heartbeat: Some(at),
            ..Self::default()
        }
    }

    pub fn paused(at: DateTime<Utc>) -> Self {
        Self {
            status: Some(SessionStatus::Paused),
            last_heartbeat: Some(at),
            ..Self::default()
        }
    }

    pub fn resumed(at: DateTime<Utc>, accumulated_pause_ms: u64) -> Self {
        Self {
            status: Some(SessionStatus::Running),
            last_heartbeat: Some(at),
            accumulated_pause_ms: Some(accumulated_pause_ms),
            ..Self::default()
        }
    }

    /// Terminal transition. `end_time` and `last_heartbeat` are both `at`.
    pub fn closed(status: SessionStatus, at: DateTime<Utc>) -> Self {
        Self {
            status: Some(status),
            last_heartbeat: Some(at),
            end_time: Some(at),
            ..Self::default()
        }
    }

    /// Stale close: the session ended at its last sign of life.
    pub fn abandoned(last_heartbeat: DateTime<Utc>) -> Self {
        Self {
            status: Some(SessionStatus::Aborted),
            end_time: Some(last_heartbeat),
            ..Self::default()
        }
    }

    pub fn apply_to(&self, session: &mut WorkSession) {
        if let Some(status) = self.status {
            session.status = status;
        }
        if let Some(at) = self.last_heartbeat {
            session.last_heartbeat = at;
        }
        if let Some(at) = self.end_time {
            session.end_time = Some(at);
        }
        if let Some(ms) = self.accumulated_pause_ms {
            session.accumulated_pause_ms = ms;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, TimeZone};

    fn t0() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 3, 4, 9, 0, 0).unwrap()
    }

    #[test]
    fn effective_elapsed_clamps_to_zero() {
        assert_eq!(effective_elapsed_ms(t0(), t0() + Duration::seconds(5), 60_000), 0);
        assert_eq!(effective_elapsed_ms(t0(), t0() - Duration::seconds(5), 0), 0);
        assert_eq!(
            effective_elapsed_ms(t0(), t0() + Duration::minutes(10), 60_000),
            540_000
        );
    }

    #[test]
    fn patch_only_touches_named_fields() {
        let mut session = NewWorkSession {
            owner: "owner-1".into(),
            activity_label: "writing".into(),
            linked_project: None,
            start_time: t0(),
        }
        .into_session("s1".into());

        SessionPatch::abandoned(t0() + Duration::minutes(1)).apply_to(&mut session);

        assert_eq!(session.status, SessionStatus::Aborted);
        assert_eq!(session.end_time, Some(t0() + Duration::minutes(1)));
        assert_eq!(session.last_heartbeat, t0());
        assert_eq!(session.accumulated_pause_ms, 0);
        assert_eq!(session.closed_active_ms(), Some(60_000));
    }
}
