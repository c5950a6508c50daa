use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::{
    config::TimerConfig,
    db::models::{effective_elapsed_ms, SessionStatus, WorkSession},
};

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "camelCase")]
pub enum TimerStatus {
    #[default]
    Idle,
    Running,
    Paused,
    Completed,
    Aborted,
}

impl TimerStatus {
    pub fn is_open(&self) -> bool {
        matches!(self, TimerStatus::Running | TimerStatus::Paused)
    }
}

impl From<SessionStatus> for TimerStatus {
    fn from(status: SessionStatus) -> Self {
        match status {
            SessionStatus::Running => TimerStatus::Running,
            SessionStatus::Paused => TimerStatus::Paused,
            SessionStatus::Completed => TimerStatus::Completed,
            SessionStatus::Aborted => TimerStatus::Aborted,
        }
    }
}

/// Local view of the current session. `elapsed_ms` is advanced by the tick
/// task while running and frozen otherwise.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TimerState {
    pub status: TimerStatus,
    pub session_id: Option<String>,
    pub activity_label: Option<String>,
    pub linked_project: Option<String>,
    pub started_at: Option<DateTime<Utc>>,
    pub elapsed_ms: u64,
    /// Wall-clock time of the previous tick, for overshoot detection.
    #[serde(skip)]
    pub last_tick_at: Option<DateTime<Utc>>,
}

impl TimerState {
    pub fn new() -> Self {
        Self::default()
    }

    /// True while `session_id` is still the session this state tracks.
    pub fn tracks(&self, session_id: &str) -> bool {
        self.session_id.as_deref() == Some(session_id)
    }

    pub fn begin_session(&mut self, session: &WorkSession, now: DateTime<Utc>) {
        self.restore(session, TimerStatus::Running, 0, now);
    }

    pub fn restore(
        &mut self,
        session: &WorkSession,
        status: TimerStatus,
        elapsed_ms: u64,
        now: DateTime<Utc>,
    ) {
        *self = Self {
            status,
            session_id: Some(session.id.clone()),
            activity_label: Some(session.activity_label.clone()),
            linked_project: session.linked_project.clone(),
            started_at: Some(session.start_time),
            elapsed_ms,
            last_tick_at: (status == TimerStatus::Running).then_some(now),
        };
    }

    pub fn pause(&mut self) {
        self.status = TimerStatus::Paused;
        self.last_tick_at = None;
    }

    pub fn resume(&mut self, now: DateTime<Utc>) {
        self.status = TimerStatus::Running;
        self.last_tick_at = Some(now);
    }

    /// Terminal transition: the status stays visible, the session reference is dropped.
    pub fn finish(&mut self, status: TimerStatus) {
        self.status = status;
        self.session_id = None;
        self.last_tick_at = None;
    }

    pub fn reset(&mut self) {
        *self = Self::default();
    }

    /// Advances elapsed by exactly one tick period and reports how the tick
    /// relates to wall-clock time.
    pub fn tick(&mut self, now: DateTime<Utc>, config: &TimerConfig) -> TickOutcome {
        if let Some(last_alive) = self.last_tick_at.replace(now) {
            let wall_delta_ms = (now - last_alive).num_milliseconds().max(0) as u64;
            if config.detect_sleep_by_tick && wall_delta_ms > config.sleep_overshoot_ms() {
                return TickOutcome::SleepDetected {
                    wall_delta_ms,
                    last_alive,
                };
            }
        }

        self.elapsed_ms = self.elapsed_ms.saturating_add(config.tick_interval_ms);

        if self.elapsed_ms > config.max_session_ms {
            TickOutcome::CapReached
        } else {
            TickOutcome::Continue
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TickOutcome {
    Continue,
    CapReached,
    /// `last_alive` is the previous tick, the last instant the host was seen running.
    SleepDetected {
        wall_delta_ms: u64,
        last_alive: DateTime<Utc>,
    },
}

/// What reconciliation does with the latest open session found on load.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RestorePlan {
    /// Heartbeat is fresh: keep running and rewrite the heartbeat now.
    Running { elapsed_ms: u64 },
    /// Paused as persisted, or an unseen gap presumed to be a pause.
    Paused { elapsed_ms: u64, inferred: bool },
    /// Heartbeat is stale: close the session at its last heartbeat.
    Abandon { gap_ms: u64 },
}

pub fn plan_restore(
    session: &WorkSession,
    now: DateTime<Utc>,
    config: &TimerConfig,
) -> RestorePlan {
    let frozen_ms = effective_elapsed_ms(
        session.start_time,
        session.last_heartbeat,
        session.accumulated_pause_ms,
    );

    if session.status == SessionStatus::Paused {
        return RestorePlan::Paused {
            elapsed_ms: frozen_ms,
            inferred: false,
        };
    }

    let gap_ms = (now - session.last_heartbeat).num_milliseconds().max(0) as u64;
    if gap_ms > config.stale_threshold_ms {
        RestorePlan::Abandon { gap_ms }
    } else if gap_ms > config.short_gap_threshold_ms {
        RestorePlan::Paused {
            elapsed_ms: frozen_ms,
            inferred: true,
        }
    } else {
        RestorePlan::Running {
            elapsed_ms: effective_elapsed_ms(session.start_time, now, session.accumulated_pause_ms),
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

    fn session(status: SessionStatus, heartbeat: DateTime<Utc>, paused_ms: u64) -> WorkSession {
        WorkSession {
            id: "s1".into(),
            owner: "owner-1".into(),
            activity_label: "deep work".into(),
            linked_project: None,
            start_time: t0(),
            end_time: None,
            status,
            last_heartbeat: heartbeat,
            accumulated_pause_ms: paused_ms,
        }
    }

    #[test]
    fn fresh_heartbeat_restores_running_from_wall_clock() {
        let s = session(SessionStatus::Running, t0() + Duration::seconds(60), 0);
        let plan = plan_restore(&s, t0() + Duration::seconds(65), &TimerConfig::default());
        assert_eq!(plan, RestorePlan::Running { elapsed_ms: 65_000 });
    }

    #[test]
    fn short_gap_restores_paused_at_heartbeat() {
        let s = session(SessionStatus::Running, t0() + Duration::minutes(1), 0);
        let plan = plan_restore(&s, t0() + Duration::minutes(10), &TimerConfig::default());
        assert_eq!(
            plan,
            RestorePlan::Paused {
                elapsed_ms: 60_000,
                inferred: true
            }
        );
    }

    #[test]
    fn stale_heartbeat_abandons() {
        let s = session(SessionStatus::Running, t0() + Duration::minutes(1), 0);
        let plan = plan_restore(&s, t0() + Duration::hours(2), &TimerConfig::default());
        assert_eq!(
            plan,
            RestorePlan::Abandon {
                gap_ms: 119 * 60_000
            }
        );
    }

    #[test]
    fn persisted_pause_is_never_abandoned() {
        let s = session(SessionStatus::Paused, t0() + Duration::minutes(20), 5 * 60_000);
        let plan = plan_restore(&s, t0() + Duration::days(3), &TimerConfig::default());
        assert_eq!(
            plan,
            RestorePlan::Paused {
                elapsed_ms: 15 * 60_000,
                inferred: false
            }
        );
    }

    #[test]
    fn elapsed_is_clamped_when_pause_exceeds_span() {
        let s = session(SessionStatus::Paused, t0() + Duration::minutes(1), 10 * 60_000);
        let plan = plan_restore(&s, t0() + Duration::minutes(2), &TimerConfig::default());
        assert_eq!(
            plan,
            RestorePlan::Paused {
                elapsed_ms: 0,
                inferred: false
            }
        );
    }

    #[test]
    fn tick_adds_fixed_period_and_flags_cap() {
        let config = TimerConfig {
            max_session_ms: 2_500,
            ..TimerConfig::default()
        };
        let mut state = TimerState::new();
        state.begin_session(&session(SessionStatus::Running, t0(), 0), t0());

        // wall clock barely moves; elapsed still advances one period per tick
        assert_eq!(state.tick(t0(), &config), TickOutcome::Continue);
        assert_eq!(state.tick(t0(), &config), TickOutcome::Continue);
        assert_eq!(state.tick(t0(), &config), TickOutcome::CapReached);
        assert_eq!(state.elapsed_ms, 3_000);
    }

    #[test]
    fn late_tick_is_sleep_unless_disabled() {
        let mut state = TimerState::new();
        state.begin_session(&session(SessionStatus::Running, t0(), 0), t0());
        let config = TimerConfig::default();

        assert_eq!(
            state.tick(t0() + Duration::seconds(4), &config),
            TickOutcome::Continue
        );
        assert_eq!(
            state.tick(t0() + Duration::seconds(9), &config),
            TickOutcome::SleepDetected {
                wall_delta_ms: 5_000,
                last_alive: t0() + Duration::seconds(4),
            }
        );
        assert_eq!(state.elapsed_ms, 1_000);

        let lenient = TimerConfig {
            detect_sleep_by_tick: false,
            ..TimerConfig::default()
        };
        assert_eq!(
            state.tick(t0() + Duration::minutes(5), &lenient),
            TickOutcome::Continue
        );
        assert_eq!(state.elapsed_ms, 2_000);
    }

    #[test]
    fn finish_keeps_terminal_status_but_drops_session() {
        let mut state = TimerState::new();
        state.begin_session(&session(SessionStatus::Running, t0(), 0), t0());
        state.elapsed_ms = 42_000;
        state.finish(TimerStatus::Aborted);

        assert_eq!(state.status, TimerStatus::Aborted);
        assert!(!state.tracks("s1"));
        assert_eq!(state.elapsed_ms, 42_000);
    }
}
