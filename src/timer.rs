use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::fmt;

use crate::error::StoreError;

pub const DEFAULT_PROJECT: &str = "General";

/// Display colors handed out in creation order
pub const PALETTE: [&str; 5] = ["#3b82f6", "#10b981", "#f59e0b", "#ef4444", "#8b5cf6"];

pub const MS_PER_HOUR: u64 = 3_600_000;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TimerId(pub u64);

impl fmt::Display for TimerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<u64> for TimerId {
    fn from(v: u64) -> Self {
        TimerId(v)
    }
}

/// A trackable unit of work
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Timer {
    pub id: TimerId,
    pub name: String,
    pub project: String,
    pub is_running: bool,
    /// Milliseconds accumulated by every finished running interval
    pub total_time: u64,
    /// Start of the current running interval, stored as epoch milliseconds
    #[serde(default, with = "chrono::serde::ts_milliseconds_option")]
    pub start_time: Option<DateTime<Utc>>,
    pub color: String,
    pub created_at: DateTime<Utc>,
    pub completed_at: Option<DateTime<Utc>>,
}

impl Timer {
    pub fn new(
        id: TimerId,
        name: String,
        project: String,
        color: String,
        created_at: DateTime<Utc>,
    ) -> Self {
        Self {
            id,
            name,
            project,
            is_running: false,
            total_time: 0,
            start_time: None,
            color,
            created_at,
            completed_at: None,
        }
    }

    pub fn is_completed(&self) -> bool {
        self.completed_at.is_some()
    }

    pub fn is_active(&self) -> bool {
        self.completed_at.is_none()
    }

    /// Milliseconds of the running interval so far, zero when paused.
    /// A clock reading earlier than the start contributes nothing.
    pub fn running_interval(&self, now: DateTime<Utc>) -> u64 {
        match (self.is_running, self.start_time) {
            (true, Some(start)) => (now - start).num_milliseconds().max(0) as u64,
            _ => 0,
        }
    }

    /// Total elapsed time including the live interval
    pub fn live_elapsed(&self, now: DateTime<Utc>) -> u64 {
        self.total_time.saturating_add(self.running_interval(now))
    }

    /// Folds the running interval into `total_time` and clears the run state
    pub(crate) fn settle(&mut self, now: DateTime<Utc>) {
        self.total_time = self.live_elapsed(now);
        self.is_running = false;
        self.start_time = None;
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Goals {
    pub daily: u64,
    pub weekly: u64,
}

impl Default for Goals {
    fn default() -> Self {
        Self {
            daily: 8 * MS_PER_HOUR,
            weekly: 40 * MS_PER_HOUR,
        }
    }
}

/// Fields of [`Goals`] to overwrite; `None` keeps the current value
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct GoalsUpdate {
    pub daily: Option<u64>,
    pub weekly: Option<u64>,
}

impl GoalsUpdate {
    pub fn is_empty(&self) -> bool {
        self.daily.is_none() && self.weekly.is_none()
    }

    pub fn apply(&self, goals: Goals) -> Goals {
        Goals {
            daily: self.daily.unwrap_or(goals.daily),
            weekly: self.weekly.unwrap_or(goals.weekly),
        }
    }
}

/// The whole store snapshot; the unit of persistence and of export
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TimerState {
    pub timers: Vec<Timer>,
    pub goals: Goals,
    pub focus_mode: bool,
    pub hourly_rate: f64,
}

impl Default for TimerState {
    fn default() -> Self {
        Self {
            timers: Vec::new(),
            goals: Goals::default(),
            focus_mode: false,
            hourly_rate: 50.0,
        }
    }
}

impl TimerState {
    pub fn timer(&self, id: TimerId) -> Option<&Timer> {
        self.timers.iter().find(|t| t.id == id)
    }

    pub(crate) fn timer_mut(&mut self, id: TimerId) -> Option<&mut Timer> {
        self.timers.iter_mut().find(|t| t.id == id)
    }

    pub fn active_timers(&self) -> impl Iterator<Item = &Timer> {
        self.timers.iter().filter(|t| t.is_active())
    }

    pub fn completed_timers(&self) -> impl Iterator<Item = &Timer> {
        self.timers.iter().filter(|t| t.is_completed())
    }

    pub fn running_timers(&self) -> impl Iterator<Item = &Timer> {
        self.timers.iter().filter(|t| t.is_running)
    }

    /// Next identifier: the creation timestamp in ms, bumped past any id in use
    pub fn next_id(&self, now: DateTime<Utc>) -> TimerId {
        let candidate = now.timestamp_millis().max(0) as u64;
        let floor = self
            .timers
            .iter()
            .map(|t| t.id.0.saturating_add(1))
            .max()
            .unwrap_or(0);
        TimerId(candidate.max(floor))
    }

    pub fn next_color(&self) -> &'static str {
        PALETTE[self.timers.len() % PALETTE.len()]
    }

    /// Checks a snapshot from outside the store before it replaces the current one.
    ///
    /// Older builds left `startTime` behind when pausing; that stale value is
    /// dropped here rather than rejected.
    pub fn validate(mut self) -> Result<Self, StoreError> {
        if !self.hourly_rate.is_finite() || self.hourly_rate < 0.0 {
            return Err(StoreError::malformed(format!(
                "hourlyRate must be a non-negative number, got {}",
                self.hourly_rate
            )));
        }

        let mut seen = HashSet::new();
        for timer in &mut self.timers {
            if !seen.insert(timer.id) {
                return Err(StoreError::malformed(format!(
                    "duplicate timer id {}",
                    timer.id
                )));
            }
            if timer.is_running {
                if timer.start_time.is_none() {
                    return Err(StoreError::malformed(format!(
                        "timer {} is running without a startTime",
                        timer.id
                    )));
                }
                if timer.completed_at.is_some() {
                    return Err(StoreError::malformed(format!(
                        "timer {} is running but already completed",
                        timer.id
                    )));
                }
            } else {
                timer.start_time = None;
            }
        }

        Ok(self)
    }
}

/// Drops sub-millisecond precision so stored instants survive the json form
pub fn truncate_to_millis(t: DateTime<Utc>) -> DateTime<Utc> {
    DateTime::from_timestamp_millis(t.timestamp_millis()).unwrap_or(t)
}
