use chrono::{DateTime, Utc};
use tracing::{debug, info, warn};

use crate::error::{PersistError, StoreError, ValidationError};
use crate::persist::StateStore;
use crate::timer::{truncate_to_millis, GoalsUpdate, Timer, TimerId, TimerState, DEFAULT_PROJECT};

/// A request to move the store to its next state
#[derive(Debug, Clone, PartialEq)]
pub enum Intent {
    AddTimer { name: String, project: String },
    StartTimer(TimerId),
    PauseTimer(TimerId),
    StopTimer(TimerId),
    RestartTimer(TimerId),
    EditTimerTime { id: TimerId, new_time: u64 },
    DeleteTimer(TimerId),
    ClearCompleted,
    UpdateGoals(GoalsUpdate),
    UpdateHourlyRate(f64),
    SetFocusMode(bool),
    LoadData(Box<TimerState>),
}

impl Intent {
    /// Builds an `AddTimer`, rejecting names that are blank once trimmed
    pub fn add_timer(name: &str, project: Option<&str>) -> Result<Self, ValidationError> {
        let name = name.trim();
        if name.is_empty() {
            return Err(ValidationError::EmptyName);
        }
        Ok(Intent::AddTimer {
            name: name.to_string(),
            project: project_or_default(project.unwrap_or_default()),
        })
    }

    pub fn update_hourly_rate(rate: f64) -> Result<Self, ValidationError> {
        if !rate.is_finite() || rate < 0.0 {
            return Err(ValidationError::InvalidRate(rate));
        }
        Ok(Intent::UpdateHourlyRate(rate))
    }

    pub fn load_data(snapshot: TimerState) -> Self {
        Intent::LoadData(Box::new(snapshot))
    }
}

fn project_or_default(project: &str) -> String {
    let project = project.trim();
    if project.is_empty() {
        DEFAULT_PROJECT.to_string()
    } else {
        project.to_string()
    }
}

/// Applies one intent to a snapshot and returns the next snapshot.
///
/// Unknown ids and intents that do not apply to the timer's current state
/// leave the snapshot as it was. Only `LoadData` can fail, and then the
/// caller keeps the old snapshot.
pub fn transition(
    state: &TimerState,
    intent: Intent,
    now: DateTime<Utc>,
) -> Result<TimerState, StoreError> {
    let now = truncate_to_millis(now);
    let mut next = state.clone();

    match intent {
        Intent::AddTimer { name, project } => {
            let name = name.trim();
            if name.is_empty() {
                debug!("ignoring AddTimer with empty name");
                return Ok(next);
            }
            let id = next.next_id(now);
            let color = next.next_color().to_string();
            next.timers.push(Timer::new(
                id,
                name.to_string(),
                project_or_default(&project),
                color,
                now,
            ));
        }
        Intent::StartTimer(id) => {
            with_timer(&mut next, id, |t| {
                if t.is_running {
                    return;
                }
                // starting a stopped timer reopens it and keeps its history
                t.completed_at = None;
                t.is_running = true;
                t.start_time = Some(now);
            });
        }
        Intent::PauseTimer(id) => {
            with_timer(&mut next, id, |t| {
                if t.is_running {
                    t.settle(now);
                }
            });
        }
        Intent::StopTimer(id) => {
            with_timer(&mut next, id, |t| {
                t.settle(now);
                t.completed_at = Some(now);
            });
        }
        Intent::RestartTimer(id) => {
            with_timer(&mut next, id, |t| {
                t.total_time = 0;
                t.completed_at = None;
                t.is_running = true;
                t.start_time = Some(now);
            });
        }
        Intent::EditTimerTime { id, new_time } => {
            with_timer(&mut next, id, |t| t.total_time = new_time);
        }
        Intent::DeleteTimer(id) => {
            let before = next.timers.len();
            next.timers.retain(|t| t.id != id);
            if next.timers.len() == before {
                debug!(%id, "delete of unknown timer ignored");
            }
        }
        Intent::ClearCompleted => {
            next.timers.retain(|t| t.is_active());
        }
        Intent::UpdateGoals(update) => {
            next.goals = update.apply(next.goals);
        }
        Intent::UpdateHourlyRate(rate) => {
            next.hourly_rate = rate;
        }
        Intent::SetFocusMode(enabled) => {
            next.focus_mode = enabled;
        }
        Intent::LoadData(snapshot) => {
            next = snapshot.validate()?;
        }
    }

    Ok(next)
}

fn with_timer(state: &mut TimerState, id: TimerId, f: impl FnOnce(&mut Timer)) {
    match state.timer_mut(id) {
        Some(timer) => f(timer),
        None => debug!(%id, "intent for unknown timer ignored"),
    }
}

/// Intents for the start/pause shortcut: pause everything that runs, or
/// start the first active timer when nothing does
pub fn toggle_intents(state: &TimerState) -> Vec<Intent> {
    let running: Vec<Intent> = state
        .running_timers()
        .map(|t| Intent::PauseTimer(t.id))
        .collect();
    if !running.is_empty() {
        return running;
    }
    state
        .active_timers()
        .next()
        .map(|t| vec![Intent::StartTimer(t.id)])
        .unwrap_or_default()
}

/// Holds the current snapshot and writes every new one through a [`StateStore`]
#[derive(Debug)]
pub struct TimerStore<S: StateStore> {
    state: TimerState,
    backend: S,
}

impl<S: StateStore> TimerStore<S> {
    /// Opens the store from whatever the backend holds, or the default state
    /// when it holds nothing. An unreadable snapshot is an error, so nothing
    /// is written over it.
    pub fn open(backend: S) -> Result<Self, PersistError> {
        let state = backend.load()?.unwrap_or_default();
        Ok(Self { state, backend })
    }

    pub fn with_state(backend: S, state: TimerState) -> Self {
        Self { state, backend }
    }

    pub fn state(&self) -> &TimerState {
        &self.state
    }

    pub fn backend(&self) -> &S {
        &self.backend
    }

    /// Applies an intent, then persists the new snapshot.
    ///
    /// A failed write is logged; the in-memory snapshot stays authoritative.
    pub fn dispatch(&mut self, intent: Intent, now: DateTime<Utc>) -> Result<&TimerState, StoreError> {
        let label = intent_label(&intent);
        self.state = transition(&self.state, intent, now)?;
        info!(intent = label, timers = self.state.timers.len(), "applied intent");

        if let Err(e) = self.backend.save(&self.state) {
            warn!(error = %e, "failed to persist timers");
        }
        Ok(&self.state)
    }

    pub fn dispatch_all(
        &mut self,
        intents: impl IntoIterator<Item = Intent>,
        now: DateTime<Utc>,
    ) -> Result<&TimerState, StoreError> {
        for intent in intents {
            self.dispatch(intent, now)?;
        }
        Ok(&self.state)
    }
}

fn intent_label(intent: &Intent) -> &'static str {
    match intent {
        Intent::AddTimer { .. } => "add_timer",
        Intent::StartTimer(_) => "start_timer",
        Intent::PauseTimer(_) => "pause_timer",
        Intent::StopTimer(_) => "stop_timer",
        Intent::RestartTimer(_) => "restart_timer",
        Intent::EditTimerTime { .. } => "edit_timer_time",
        Intent::DeleteTimer(_) => "delete_timer",
        Intent::ClearCompleted => "clear_completed",
        Intent::UpdateGoals(_) => "update_goals",
        Intent::UpdateHourlyRate(_) => "update_hourly_rate",
        Intent::SetFocusMode(_) => "set_focus_mode",
        Intent::LoadData(_) => "load_data",
    }
}
