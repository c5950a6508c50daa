use anyhow::{anyhow, Context, Result};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rusqlite::{params, OptionalExtension, Row};
use uuid::Uuid;

use crate::{
    db::{
        helpers::{
            format_datetime, parse_datetime, parse_optional_datetime, parse_status, to_i64,
            to_u64,
        },
        models::{NewWorkSession, SessionPatch, SessionStatus, WorkSession},
        Database,
    },
    store::SessionStore,
};

const SESSION_COLUMNS: &str = "id, owner, activity_label, linked_project, start_time, end_time, \
     status, last_heartbeat, accumulated_pause_ms";

fn row_to_session(row: &Row) -> Result<WorkSession> {
    let start_time: String = row.get("start_time")?;
    let end_time: Option<String> = row.get("end_time")?;
    let last_heartbeat: String = row.get("last_heartbeat")?;
    let status: String = row.get("status")?;
    let accumulated_pause_ms: i64 = row.get("accumulated_pause_ms")?;

    Ok(WorkSession {
        id: row.get("id")?,
        owner: row.get("owner")?,
        activity_label: row.get("activity_label")?,
        linked_project: row.get("linked_project")?,
        start_time: parse_datetime(&start_time, "start_time")?,
        end_time: parse_optional_datetime(end_time, "end_time")?,
        status: parse_status(&status)?,
        last_heartbeat: parse_datetime(&last_heartbeat, "last_heartbeat")?,
        accumulated_pause_ms: to_u64(accumulated_pause_ms, "accumulated_pause_ms")?,
    })
}

#[async_trait]
impl SessionStore for Database {
    async fn create_session(&self, session: NewWorkSession) -> Result<WorkSession> {
        let record = session.into_session(Uuid::new_v4().to_string());
        self.execute(move |conn| {
            conn.execute(
                "INSERT INTO work_sessions (id, owner, activity_label, linked_project, start_time, end_time, status, last_heartbeat, accumulated_pause_ms)
                 VALUES (?1, ?2, ?3, ?4, ?5, NULL, ?6, ?7, ?8)",
                params![
                    record.id,
                    record.owner,
                    record.activity_label,
                    record.linked_project,
                    format_datetime(&record.start_time),
                    record.status.as_str(),
                    format_datetime(&record.last_heartbeat),
                    to_i64(record.accumulated_pause_ms)?,
                ],
            )
            .with_context(|| "failed to insert work session")?;
            Ok(record)
        })
        .await
    }

    async fn update_session(&self, session_id: &str, patch: SessionPatch) -> Result<()> {
        let session_id = session_id.to_string();
        self.execute(move |conn| {
            let rows_affected = conn
                .execute(
                    "UPDATE work_sessions
                     SET status = COALESCE(?1, status),
                         last_heartbeat = COALESCE(?2, last_heartbeat),
                         end_time = COALESCE(?3, end_time),
                         accumulated_pause_ms = COALESCE(?4, accumulated_pause_ms)
                     WHERE id = ?5",
                    params![
                        patch.status.map(|status| status.as_str()),
                        patch.last_heartbeat.as_ref().map(format_datetime),
                        patch.end_time.as_ref().map(format_datetime),
                        patch.accumulated_pause_ms.map(to_i64).transpose()?,
                        session_id,
                    ],
                )
                .with_context(|| "failed to update work session")?;

            if rows_affected == 0 {
                return Err(anyhow!("work session {session_id} not found"));
            }
            Ok(())
        })
        .await
    }

    async fn close_open_sessions(
        &self,
        owner: &str,
        status: SessionStatus,
        end_time: DateTime<Utc>,
    ) -> Result<usize> {
        let owner = owner.to_string();
        self.execute(move |conn| {
            let closed = conn
                .execute(
                    "UPDATE work_sessions
                     SET status = ?1,
                         end_time = ?2
                     WHERE owner = ?3 AND status IN ('running', 'paused')",
                    params![status.as_str(), format_datetime(&end_time), owner],
                )
                .with_context(|| "failed to close open work sessions")?;
            Ok(closed)
        })
        .await
    }

    async fn latest_open_session(&self, owner: &str) -> Result<Option<WorkSession>> {
        let owner = owner.to_string();
        self.execute(move |conn| {
            let mut stmt = conn.prepare(&format!(
                "SELECT {SESSION_COLUMNS}
                 FROM work_sessions
                 WHERE owner = ?1 AND status IN ('running', 'paused')
                 ORDER BY start_time DESC
                 LIMIT 1"
            ))?;

            let mut rows = stmt.query(params![owner])?;
            let session = match rows.next()? {
                Some(row) => Some(row_to_session(row)?),
                None => None,
            };
            Ok(session)
        })
        .await
    }

    async fn get_session(&self, session_id: &str) -> Result<Option<WorkSession>> {
        let session_id = session_id.to_string();
        self.execute(move |conn| {
            let session = conn
                .query_row(
                    &format!("SELECT {SESSION_COLUMNS} FROM work_sessions WHERE id = ?1"),
                    params![session_id],
                    |row| Ok(row_to_session(row)),
                )
                .optional()?
                .transpose()?;
            Ok(session)
        })
        .await
    }

    async fn list_sessions_in_range(
        &self,
        owner: &str,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
    ) -> Result<Vec<WorkSession>> {
        let owner = owner.to_string();
        self.execute(move |conn| {
            let mut stmt = conn.prepare(&format!(
                "SELECT {SESSION_COLUMNS}
                 FROM work_sessions
                 WHERE owner = ?1 AND start_time >= ?2 AND start_time <= ?3
                 ORDER BY start_time ASC"
            ))?;

            let mut rows =
                stmt.query(params![owner, format_datetime(&from), format_datetime(&to)])?;
            let mut sessions = Vec::new();
            while let Some(row) = rows.next()? {
                sessions.push(row_to_session(row)?);
            }
            Ok(sessions)
        })
        .await
    }
}
