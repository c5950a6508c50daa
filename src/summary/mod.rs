//! Weekly and monthly roll-ups of closed work sessions.
//!
//! Only sessions with an `end_time` contribute time; open sessions are still
//! running and have no final duration yet. Day boundaries are UTC.

use std::collections::HashMap;

use anyhow::{Context, Result};
use chrono::{DateTime, Datelike, Duration, Months, NaiveDate, NaiveTime, TimeZone, Utc};
use serde::Serialize;

use crate::{
    db::models::{SessionStatus, WorkSession},
    store::SessionStore,
};

const UNKNOWN_ACTIVITY: &str = "Unknown";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SummaryPeriod {
    Week,
    Month,
}

impl SummaryPeriod {
    pub fn parse(value: &str) -> Option<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "week" | "weekly" => Some(SummaryPeriod::Week),
            "month" | "monthly" => Some(SummaryPeriod::Month),
            _ => None,
        }
    }

    /// Moves `day` by `offset` whole periods; `-1` lands in the previous one.
    pub fn shift(self, day: NaiveDate, offset: i32) -> Option<NaiveDate> {
        match self {
            SummaryPeriod::Week => day.checked_add_signed(Duration::weeks(i64::from(offset))),
            SummaryPeriod::Month => {
                let months = Months::new(offset.unsigned_abs());
                if offset >= 0 {
                    day.checked_add_months(months)
                } else {
                    day.checked_sub_months(months)
                }
            }
        }
    }
}

/// Inclusive `[from, to]` window over session start times.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SummaryRange {
    pub from: DateTime<Utc>,
    pub to: DateTime<Utc>,
}

impl SummaryRange {
    pub fn for_period(period: SummaryPeriod, day: NaiveDate) -> Self {
        match period {
            SummaryPeriod::Week => Self::week_of(day),
            SummaryPeriod::Month => Self::month_of(day),
        }
    }

    /// Monday through Sunday containing `day`.
    pub fn week_of(day: NaiveDate) -> Self {
        let monday = day - Duration::days(i64::from(day.weekday().num_days_from_monday()));
        Self::between(monday, monday + Duration::days(7))
    }

    pub fn month_of(day: NaiveDate) -> Self {
        let first = day - Duration::days(i64::from(day.day0()));
        let next = first
            .checked_add_months(Months::new(1))
            .unwrap_or(NaiveDate::MAX);
        Self::between(first, next)
    }

    fn between(first_day: NaiveDate, next_first_day: NaiveDate) -> Self {
        let from = Utc.from_utc_datetime(&first_day.and_time(NaiveTime::MIN));
        let to = Utc.from_utc_datetime(&next_first_day.and_time(NaiveTime::MIN))
            - Duration::milliseconds(1);
        Self { from, to }
    }

    pub fn contains(&self, at: DateTime<Utc>) -> bool {
        at >= self.from && at <= self.to
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ActivityTotal {
    pub activity_label: String,
    pub active_ms: u64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct WorkSummary {
    pub range: SummaryRange,
    pub total_active_ms: u64,
    pub completed_sessions: usize,
    pub aborted_sessions: usize,
    /// Largest first, ties by label.
    pub by_activity: Vec<ActivityTotal>,
}

pub fn summarize(sessions: &[WorkSession], range: SummaryRange) -> WorkSummary {
    let mut total_active_ms = 0u64;
    let mut completed_sessions = 0;
    let mut aborted_sessions = 0;
    let mut per_activity: HashMap<String, u64> = HashMap::new();

    for session in sessions.iter().filter(|s| range.contains(s.start_time)) {
        match session.status {
            SessionStatus::Completed => completed_sessions += 1,
            SessionStatus::Aborted => aborted_sessions += 1,
            SessionStatus::Running | SessionStatus::Paused => {}
        }

        let Some(active_ms) = session.closed_active_ms() else {
            continue;
        };
        total_active_ms = total_active_ms.saturating_add(active_ms);

        let label = session.activity_label.trim();
        let label = if label.is_empty() { UNKNOWN_ACTIVITY } else { label };
        let entry = per_activity.entry(label.to_string()).or_default();
        *entry = entry.saturating_add(active_ms);
    }

    let mut by_activity: Vec<ActivityTotal> = per_activity
        .into_iter()
        .map(|(activity_label, active_ms)| ActivityTotal {
            activity_label,
            active_ms,
        })
        .collect();
    by_activity.sort_by(|a, b| {
        b.active_ms
            .cmp(&a.active_ms)
            .then_with(|| a.activity_label.cmp(&b.activity_label))
    });

    WorkSummary {
        range,
        total_active_ms,
        completed_sessions,
        aborted_sessions,
        by_activity,
    }
}

pub async fn load_summary(
    store: &dyn SessionStore,
    owner: &str,
    range: SummaryRange,
) -> Result<WorkSummary> {
    let sessions = store
        .list_sessions_in_range(owner, range.from, range.to)
        .await
        .with_context(|| format!("failed to load sessions for {owner}"))?;
    Ok(summarize(&sessions, range))
}
