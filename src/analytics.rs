//! Read-only summaries derived from a timer snapshot.
//!
//! Nothing here mutates state; every function is cheap enough to call on
//! each display refresh. Day and week boundaries follow the time zone of the
//! reference instant, so hosts pass `Local::now()` for local-clock reports.

use chrono::{DateTime, Datelike, Days, NaiveDate, TimeZone};
use itertools::Itertools;
use serde::Serialize;
use std::collections::BTreeMap;

use crate::timer::{Timer, TimerState, MS_PER_HOUR};

fn local_date<Tz: TimeZone>(timer: &Timer, tz: &Tz) -> NaiveDate {
    timer.created_at.with_timezone(tz).date_naive()
}

/// Sunday that opens the week containing `reference`
pub fn week_start<Tz: TimeZone>(reference: &DateTime<Tz>) -> NaiveDate {
    let today = reference.date_naive();
    let offset = today.weekday().num_days_from_sunday() as u64;
    today.checked_sub_days(Days::new(offset)).unwrap_or(today)
}

/// Completed time of timers created on the reference's calendar day
pub fn today_total<Tz: TimeZone>(timers: &[Timer], reference: &DateTime<Tz>) -> u64 {
    let tz = reference.timezone();
    let today = reference.date_naive();
    timers
        .iter()
        .filter(|t| t.is_completed() && local_date(t, &tz) == today)
        .map(|t| t.total_time)
        .sum()
}

/// Completed time of timers created since Sunday midnight of the reference's week
pub fn week_total<Tz: TimeZone>(timers: &[Timer], reference: &DateTime<Tz>) -> u64 {
    let tz = reference.timezone();
    let start = week_start(reference);
    timers
        .iter()
        .filter(|t| t.is_completed() && local_date(t, &tz) >= start)
        .map(|t| t.total_time)
        .sum()
}

/// Completed time per exact project name
pub fn project_breakdown(timers: &[Timer]) -> BTreeMap<String, u64> {
    timers
        .iter()
        .filter(|t| t.is_completed())
        .fold(BTreeMap::new(), |mut acc, t| {
            *acc.entry(t.project.clone()).or_insert(0) += t.total_time;
            acc
        })
}

/// Stored time of every timer, finished or not
pub fn total_tracked(timers: &[Timer]) -> u64 {
    timers.iter().map(|t| t.total_time).sum()
}

/// Unrounded; round only when displaying
pub fn earnings(duration_ms: u64, hourly_rate: f64) -> f64 {
    (duration_ms as f64 / MS_PER_HOUR as f64) * hourly_rate
}

/// Fraction of `goal` reached, clamped to `[0, 1]`; a zero goal reports 0
pub fn goal_progress(accumulated: u64, goal: u64) -> f64 {
    if goal == 0 {
        return 0.0;
    }
    (accumulated as f64 / goal as f64).clamp(0.0, 1.0)
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct TimerCounts {
    pub total: usize,
    pub active: usize,
    pub running: usize,
    pub completed: usize,
}

impl TimerCounts {
    pub fn of(timers: &[Timer]) -> Self {
        timers.iter().fold(Self::default(), |mut c, t| {
            c.total += 1;
            if t.is_completed() {
                c.completed += 1;
            } else {
                c.active += 1;
            }
            if t.is_running {
                c.running += 1;
            }
            c
        })
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ProjectTotal {
    pub project: String,
    pub time: u64,
    pub earnings: f64,
}

/// Everything the analytics view shows, computed in one pass over a snapshot
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AnalyticsReport {
    pub today: u64,
    pub week: u64,
    pub today_earnings: f64,
    pub week_earnings: f64,
    pub daily_progress: f64,
    pub weekly_progress: f64,
    pub hourly_rate: f64,
    /// Largest first
    pub projects: Vec<ProjectTotal>,
    pub counts: TimerCounts,
    pub total_tracked: u64,
}

impl AnalyticsReport {
    pub fn build<Tz: TimeZone>(state: &TimerState, reference: &DateTime<Tz>) -> Self {
        let today = today_total(&state.timers, reference);
        let week = week_total(&state.timers, reference);
        let rate = state.hourly_rate;

        let projects = project_breakdown(&state.timers)
            .into_iter()
            .sorted_by(|a, b| b.1.cmp(&a.1).then_with(|| a.0.cmp(&b.0)))
            .map(|(project, time)| ProjectTotal {
                project,
                time,
                earnings: earnings(time, rate),
            })
            .collect();

        Self {
            today,
            week,
            today_earnings: earnings(today, rate),
            week_earnings: earnings(week, rate),
            daily_progress: goal_progress(today, state.goals.daily),
            weekly_progress: goal_progress(week, state.goals.weekly),
            hourly_rate: rate,
            projects,
            counts: TimerCounts::of(&state.timers),
            total_tracked: total_tracked(&state.timers),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::timer::{Goals, TimerId, PALETTE};
    use chrono::{Duration, FixedOffset, Utc};

    fn offset() -> FixedOffset {
        FixedOffset::east_opt(2 * 3600).unwrap()
    }

    // Wednesday 2024-05-15 14:00 at +02:00
    fn reference() -> DateTime<FixedOffset> {
        offset().with_ymd_and_hms(2024, 5, 15, 14, 0, 0).unwrap()
    }

    fn timer(id: u64, project: &str, created: DateTime<FixedOffset>, ms: u64, done: bool) -> Timer {
        let mut t = Timer::new(
            TimerId(id),
            format!("timer {id}"),
            project.into(),
            PALETTE[0].into(),
            created.with_timezone(&Utc),
        );
        t.total_time = ms;
        if done {
            t.completed_at = Some(created.with_timezone(&Utc) + Duration::hours(1));
        }
        t
    }

    #[test]
    fn week_starts_on_sunday() {
        assert_eq!(
            week_start(&reference()),
            NaiveDate::from_ymd_opt(2024, 5, 12).unwrap()
        );
        let sunday = offset().with_ymd_and_hms(2024, 5, 12, 0, 30, 0).unwrap();
        assert_eq!(week_start(&sunday), sunday.date_naive());
    }

    #[test]
    fn today_counts_only_completed_timers_from_today() {
        let r = reference();
        let timers = vec![
            timer(1, "A", r - Duration::hours(3), 1_000, true),
            timer(2, "A", r - Duration::hours(1), 5_000, false),
            timer(3, "A", r - Duration::days(1), 7_000, true),
        ];
        assert_eq!(today_total(&timers, &r), 1_000);
    }

    #[test]
    fn day_boundary_follows_reference_zone() {
        // 23:30 UTC on the 14th is 01:30 on the 15th at +02:00
        let created = Utc.with_ymd_and_hms(2024, 5, 14, 23, 30, 0).unwrap();
        let timers = vec![timer(1, "A", created.with_timezone(&offset()), 2_000, true)];
        assert_eq!(today_total(&timers, &reference()), 2_000);
        assert_eq!(today_total(&timers, &reference().with_timezone(&Utc)), 0);
    }

    #[test]
    fn week_includes_sunday_and_excludes_saturday() {
        let r = reference();
        let sunday = offset().with_ymd_and_hms(2024, 5, 12, 0, 0, 0).unwrap();
        let saturday = offset().with_ymd_and_hms(2024, 5, 11, 23, 59, 0).unwrap();
        let timers = vec![
            timer(1, "A", sunday, 3_000, true),
            timer(2, "A", saturday, 4_000, true),
            timer(3, "A", r, 5_000, true),
            timer(4, "A", r, 9_000, false),
        ];
        assert_eq!(week_total(&timers, &r), 8_000);
    }

    #[test]
    fn breakdown_groups_completed_time_by_exact_project() {
        let r = reference();
        let timers = vec![
            timer(1, "Acme", r, 1_000, true),
            timer(2, "acme", r, 2_000, true),
            timer(3, "Acme", r, 3_000, true),
            timer(4, "Acme", r, 50_000, false),
        ];
        let breakdown = project_breakdown(&timers);
        assert_eq!(breakdown.len(), 2);
        assert_eq!(breakdown["Acme"], 4_000);
        assert_eq!(breakdown["acme"], 2_000);
    }

    #[test]
    fn breakdown_matches_totals_for_single_project_day() {
        let r = reference();
        let timers: Vec<_> = (0..5)
            .map(|i| timer(i, "Solo", r - Duration::minutes(i as i64 * 10), 1_000 * (i + 1), true))
            .collect();
        let breakdown = project_breakdown(&timers);
        assert_eq!(breakdown["Solo"], today_total(&timers, &r));
        assert_eq!(breakdown["Solo"], week_total(&timers, &r));
    }

    #[test]
    fn earnings_for_two_hours_at_fifty() {
        assert_eq!(earnings(7_200_000, 50.0), 100.0);
        assert_eq!(earnings(0, 50.0), 0.0);
        assert_eq!(format!("{:.2}", earnings(7_200_000, 50.0)), "100.00");
    }

    #[test]
    fn goal_progress_is_clamped_and_zero_safe() {
        assert_eq!(goal_progress(0, 100), 0.0);
        assert_eq!(goal_progress(50, 100), 0.5);
        assert_eq!(goal_progress(500, 100), 1.0);
        assert_eq!(goal_progress(500, 0), 0.0);
    }

    #[test]
    fn counts_and_total_tracked_cover_all_timers() {
        let r = reference();
        let mut running = timer(3, "A", r, 2_000, false);
        running.is_running = true;
        running.start_time = Some(r.with_timezone(&Utc));
        let timers = vec![timer(1, "A", r, 1_000, true), timer(2, "A", r, 500, false), running];

        assert_eq!(
            TimerCounts::of(&timers),
            TimerCounts {
                total: 3,
                active: 2,
                running: 1,
                completed: 1,
            }
        );
        assert_eq!(total_tracked(&timers), 3_500);
    }

    #[test]
    fn report_orders_projects_by_time() {
        let r = reference();
        let state = TimerState {
            timers: vec![
                timer(1, "Small", r, MS_PER_HOUR, true),
                timer(2, "Big", r, 3 * MS_PER_HOUR, true),
            ],
            goals: Goals {
                daily: 8 * MS_PER_HOUR,
                weekly: 40 * MS_PER_HOUR,
            },
            focus_mode: false,
            hourly_rate: 20.0,
        };
        let report = AnalyticsReport::build(&state, &r);

        assert_eq!(report.today, 4 * MS_PER_HOUR);
        assert_eq!(report.today_earnings, 80.0);
        assert_eq!(report.daily_progress, 0.5);
        assert_eq!(report.weekly_progress, 0.1);
        let names: Vec<_> = report.projects.iter().map(|p| p.project.as_str()).collect();
        assert_eq!(names, vec!["Big", "Small"]);
        assert_eq!(report.projects[0].earnings, 60.0);
    }
}
