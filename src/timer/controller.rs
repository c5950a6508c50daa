use std::sync::Arc;

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use log::{debug, error, info, warn};
use serde::{Deserialize, Serialize};
use tokio::{
    sync::{watch, Mutex},
    task::JoinHandle,
    time::{self, Instant, MissedTickBehavior},
};

use crate::{
    clock::Clock,
    config::TimerConfig,
    db::models::{NewWorkSession, SessionPatch, SessionStatus},
    store::SessionStore,
};

use super::{
    state::{plan_restore, RestorePlan, TickOutcome},
    TimerState, TimerStatus,
};

/// Terminal status a session can be stopped with.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum FinalStatus {
    Completed,
    Aborted,
}

impl From<FinalStatus> for SessionStatus {
    fn from(status: FinalStatus) -> Self {
        match status {
            FinalStatus::Completed => SessionStatus::Completed,
            FinalStatus::Aborted => SessionStatus::Aborted,
        }
    }
}

impl From<FinalStatus> for TimerStatus {
    fn from(status: FinalStatus) -> Self {
        SessionStatus::from(status).into()
    }
}

/// Foreground/background signal from the host.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Visibility {
    Visible,
    Hidden,
}

/// The two periodic activities of a running session. Both are started and
/// aborted together.
#[derive(Default)]
struct TimerTasks {
    tick: Option<JoinHandle<()>>,
    heartbeat: Option<JoinHandle<()>>,
}

impl TimerTasks {
    fn cancel(&mut self) {
        if let Some(handle) = self.tick.take() {
            handle.abort();
        }
        if let Some(handle) = self.heartbeat.take() {
            handle.abort();
        }
    }
}

#[derive(Clone)]
pub struct TimerController {
    state: Arc<Mutex<TimerState>>,
    owner: Arc<Mutex<Option<String>>>,
    store: Arc<dyn SessionStore>,
    clock: Arc<dyn Clock>,
    config: Arc<TimerConfig>,
    tasks: Arc<Mutex<TimerTasks>>,
    updates: Arc<watch::Sender<TimerState>>,
}

impl TimerController {
    pub fn new(store: Arc<dyn SessionStore>, clock: Arc<dyn Clock>, config: TimerConfig) -> Self {
        let (updates, _) = watch::channel(TimerState::new());
        Self {
            state: Arc::new(Mutex::new(TimerState::new())),
            owner: Arc::new(Mutex::new(None)),
            store,
            clock,
            config: Arc::new(config),
            tasks: Arc::new(Mutex::new(TimerTasks::default())),
            updates: Arc::new(updates),
        }
    }

    pub async fn snapshot(&self) -> TimerState {
        self.state.lock().await.clone()
    }

    /// Receives the local state after every transition and tick.
    pub fn subscribe(&self) -> watch::Receiver<TimerState> {
        self.updates.subscribe()
    }

    pub async fn owner(&self) -> Option<String> {
        self.owner.lock().await.clone()
    }

    /// Switches the identity the timer acts for. Local state is dropped and,
    /// for a new owner, rebuilt from their latest open session.
    pub async fn set_owner(&self, owner: Option<String>) -> TimerState {
        {
            let mut guard = self.owner.lock().await;
            if *guard == owner {
                return self.snapshot().await;
            }
            *guard = owner.clone();
        }

        self.cancel_tasks().await;
        self.state.lock().await.reset();
        self.publish().await;

        match owner {
            Some(owner) => {
                info!("Owner changed to {owner}; reconciling open session");
                self.reconcile().await
            }
            None => {
                info!("Owner cleared; timer idle");
                self.snapshot().await
            }
        }
    }

    /// Rebuilds local state from the owner's latest open session and the
    /// current wall clock.
    pub async fn reconcile(&self) -> TimerState {
        let Some(owner) = self.owner().await else {
            debug!("Reconcile skipped: no owner");
            return self.snapshot().await;
        };

        let session = match self.store.latest_open_session(&owner).await {
            Ok(Some(session)) => session,
            Ok(None) => {
                debug!("No open session for {owner}");
                return self.snapshot().await;
            }
            Err(err) => {
                error!("Failed to look up open session for {owner}: {err:#}");
                return self.snapshot().await;
            }
        };

        if self.owner().await.as_deref() != Some(owner.as_str()) {
            debug!("Owner changed during reconcile; dropping result for {owner}");
            return self.snapshot().await;
        }

        let now = self.clock.now();
        let plan = plan_restore(&session, now, &self.config);

        {
            let mut state = self.state.lock().await;
            if state.status.is_open() && !state.tracks(&session.id) {
                debug!(
                    "Session {} already active locally; ignoring restore of {}",
                    state.session_id.as_deref().unwrap_or("?"),
                    session.id
                );
                return state.clone();
            }

            match plan {
                RestorePlan::Abandon { .. } => state.reset(),
                RestorePlan::Paused { elapsed_ms, .. } => {
                    state.restore(&session, TimerStatus::Paused, elapsed_ms, now)
                }
                RestorePlan::Running { elapsed_ms } => {
                    state.restore(&session, TimerStatus::Running, elapsed_ms, now)
                }
            }
        }

        match plan {
            RestorePlan::Abandon { gap_ms } => {
                warn!(
                    "Session {} stale ({gap_ms} ms since last heartbeat); closing as aborted",
                    session.id
                );
                self.cancel_tasks().await;
                if let Err(err) = self
                    .store
                    .update_session(&session.id, SessionPatch::abandoned(session.last_heartbeat))
                    .await
                {
                    error!("Failed to close stale session {}: {err:#}", session.id);
                }
            }
            RestorePlan::Paused {
                elapsed_ms,
                inferred,
            } => {
                self.cancel_tasks().await;
                if inferred {
                    info!(
                        "Session {} missed heartbeats; restoring as paused at {elapsed_ms} ms",
                        session.id
                    );
                } else {
                    info!("Session {} restored as paused at {elapsed_ms} ms", session.id);
                }
            }
            RestorePlan::Running { elapsed_ms } => {
                info!("Session {} restored as running at {elapsed_ms} ms", session.id);
                self.spawn_tasks(&session.id).await;
                // rewrite now, the next periodic heartbeat is a full interval away
                if let Err(err) = self
                    .store
                    .update_session(&session.id, SessionPatch::heartbeat(now))
                    .await
                {
                    error!("Failed to refresh heartbeat for {}: {err:#}", session.id);
                }
            }
        }

        self.publish().await;
        self.snapshot().await
    }

    /// Opens a new running session, aborting any session the owner left open.
    /// Persistence failures leave local state untouched and are returned.
    pub async fn start_timer(
        &self,
        activity_label: &str,
        linked_project: Option<String>,
    ) -> Result<TimerState> {
        let activity_label = activity_label.trim();
        if activity_label.is_empty() {
            debug!("Start ignored: empty activity label");
            return Ok(self.snapshot().await);
        }
        let Some(owner) = self.owner().await else {
            debug!("Start ignored: no owner");
            return Ok(self.snapshot().await);
        };

        let now = self.clock.now();
        let closed = self
            .store
            .close_open_sessions(&owner, SessionStatus::Aborted, now)
            .await
            .context("failed to close previous open sessions")?;
        if closed > 0 {
            warn!("Aborted {closed} open session(s) for {owner} before starting a new one");
        }

        let session = self
            .store
            .create_session(NewWorkSession {
                owner: owner.clone(),
                activity_label: activity_label.to_string(),
                linked_project,
                start_time: now,
            })
            .await
            .context("failed to create work session")?;

        if self.owner().await.as_deref() != Some(owner.as_str()) {
            warn!(
                "Owner changed while starting session {}; leaving it to reconciliation",
                session.id
            );
            return Ok(self.snapshot().await);
        }

        self.cancel_tasks().await;
        self.state
            .lock()
            .await
            .begin_session(&session, self.clock.now());
        self.spawn_tasks(&session.id).await;
        self.publish().await;

        info!("Started session {} ({})", session.id, session.activity_label);
        Ok(self.snapshot().await)
    }

    pub async fn pause_timer(&self) -> TimerState {
        let session_id = {
            let mut state = self.state.lock().await;
            if state.status != TimerStatus::Running {
                debug!("Pause ignored: timer is {:?}", state.status);
                return state.clone();
            }
            let Some(session_id) = state.session_id.clone() else {
                return state.clone();
            };
            state.pause();
            session_id
        };

        self.cancel_tasks().await;
        self.publish().await;

        if let Err(err) = self
            .store
            .update_session(&session_id, SessionPatch::paused(self.clock.now()))
            .await
        {
            error!("Failed to persist pause of {session_id}: {err:#}");
        }

        info!("Paused session {session_id}");
        self.snapshot().await
    }

    /// Resumes a paused session. The time since the persisted heartbeat is
    /// added to the session's accumulated pause.
    pub async fn resume_timer(&self) -> TimerState {
        let session_id = {
            let mut state = self.state.lock().await;
            if state.status != TimerStatus::Paused {
                debug!("Resume ignored: timer is {:?}", state.status);
                return state.clone();
            }
            let Some(session_id) = state.session_id.clone() else {
                return state.clone();
            };
            state.resume(self.clock.now());
            session_id
        };

        self.spawn_tasks(&session_id).await;
        self.publish().await;

        let record = match self.store.get_session(&session_id).await {
            Ok(Some(record)) => record,
            Ok(None) => {
                warn!("Session {session_id} vanished from the store during resume");
                return self.snapshot().await;
            }
            Err(err) => {
                error!("Failed to read session {session_id} for resume: {err:#}");
                return self.snapshot().await;
            }
        };

        if !self.is_running(&session_id).await {
            debug!("Session {session_id} no longer running; skipping pause accounting");
            return self.snapshot().await;
        }

        let now = self.clock.now();
        let gap_ms = (now - record.last_heartbeat).num_milliseconds().max(0) as u64;
        let accumulated_pause_ms = record.accumulated_pause_ms.saturating_add(gap_ms);

        if let Err(err) = self
            .store
            .update_session(&session_id, SessionPatch::resumed(now, accumulated_pause_ms))
            .await
        {
            error!("Failed to persist resume of {session_id}: {err:#}");
        }

        info!("Resumed session {session_id} after {gap_ms} ms paused");
        self.snapshot().await
    }

    pub async fn stop_timer(&self, final_status: FinalStatus) -> TimerState {
        self.stop_session(None, final_status, None).await
    }

    /// Host foreground/background signal. Going to the background while
    /// running aborts the session when `abort_on_hidden` is set.
    pub async fn set_visibility(&self, visibility: Visibility) -> TimerState {
        if visibility == Visibility::Hidden && self.config.abort_on_hidden {
            let running = self.state.lock().await.status == TimerStatus::Running;
            if running {
                warn!("Host hidden while running; aborting session");
                return self.stop_timer(FinalStatus::Aborted).await;
            }
        }
        debug!("Visibility now {visibility:?}");
        self.snapshot().await
    }

    /// Cancels the periodic tasks without touching the persisted session.
    pub async fn shutdown(&self) {
        self.cancel_tasks().await;
    }

    /// Closes the open session at `ended_at`, or now. With `expected` set,
    /// only that session is stopped, so a failsafe never closes a session
    /// started after it fired.
    pub(crate) async fn stop_session(
        &self,
        expected: Option<&str>,
        final_status: FinalStatus,
        ended_at: Option<DateTime<Utc>>,
    ) -> TimerState {
        let session_id = {
            let mut state = self.state.lock().await;
            if !state.status.is_open() {
                debug!("Stop ignored: timer is {:?}", state.status);
                return state.clone();
            }
            if let Some(expected) = expected {
                if !state.tracks(expected) {
                    return state.clone();
                }
            }
            let Some(session_id) = state.session_id.clone() else {
                return state.clone();
            };
            state.finish(final_status.into());
            session_id
        };

        self.cancel_tasks().await;
        self.publish().await;

        let status = SessionStatus::from(final_status);
        let ended_at = ended_at.unwrap_or_else(|| self.clock.now());
        if let Err(err) = self
            .store
            .update_session(&session_id, SessionPatch::closed(status, ended_at))
            .await
        {
            error!("Failed to persist stop of {session_id}: {err:#}");
        }

        info!("Stopped session {session_id} as {}", status.as_str());
        self.snapshot().await
    }

    async fn is_running(&self, session_id: &str) -> bool {
        let state = self.state.lock().await;
        state.status == TimerStatus::Running && state.tracks(session_id)
    }

    async fn spawn_tasks(&self, session_id: &str) {
        let mut tasks = self.tasks.lock().await;
        tasks.cancel();
        tasks.tick = Some(self.spawn_tick(session_id.to_string()));
        tasks.heartbeat = Some(self.spawn_heartbeat(session_id.to_string()));
    }

    async fn cancel_tasks(&self) {
        self.tasks.lock().await.cancel();
    }

    fn spawn_tick(&self, session_id: String) -> JoinHandle<()> {
        let controller = self.clone();
        let period = self.config.tick_interval();

        tokio::spawn(async move {
            let mut interval = time::interval_at(Instant::now() + period, period);
            interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
            loop {
                interval.tick().await;

                let outcome = {
                    let mut state = controller.state.lock().await;
                    if state.status != TimerStatus::Running || !state.tracks(&session_id) {
                        break;
                    }
                    state.tick(controller.clock.now(), &controller.config)
                };
                controller.publish().await;

                let (final_status, ended_at) = match outcome {
                    TickOutcome::Continue => continue,
                    TickOutcome::CapReached => {
                        info!(
                            "Session {session_id} exceeded {} ms; completing",
                            controller.config.max_session_ms
                        );
                        (FinalStatus::Completed, None)
                    }
                    TickOutcome::SleepDetected {
                        wall_delta_ms,
                        last_alive,
                    } => {
                        warn!(
                            "Tick for {session_id} arrived {wall_delta_ms} ms after the last one; assuming sleep"
                        );
                        // the sleep itself is not work
                        (FinalStatus::Aborted, Some(last_alive))
                    }
                };

                // stopping aborts this task, so hand the stop to its own task
                let stopper = controller.clone();
                tokio::spawn(async move {
                    stopper
                        .stop_session(Some(&session_id), final_status, ended_at)
                        .await;
                });
                break;
            }
        })
    }

    fn spawn_heartbeat(&self, session_id: String) -> JoinHandle<()> {
        let state = self.state.clone();
        let store = self.store.clone();
        let clock = self.clock.clone();
        let period = self.config.heartbeat_interval();

        tokio::spawn(async move {
            let mut interval = time::interval_at(Instant::now() + period, period);
            interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
            loop {
                interval.tick().await;

                {
                    let guard = state.lock().await;
                    if guard.status != TimerStatus::Running || !guard.tracks(&session_id) {
                        break;
                    }
                }

                if let Err(err) = store
                    .update_session(&session_id, SessionPatch::heartbeat(clock.now()))
                    .await
                {
                    error!("Heartbeat for {session_id} failed: {err:#}");
                }
            }
        })
    }

    async fn publish(&self) {
        let snapshot = self.state.lock().await.clone();
        self.updates.send_replace(snapshot);
    }
}
