use chrono::{DateTime, Utc};
use std::io::{self, BufRead, Write};
use std::sync::mpsc::{self, Receiver, RecvTimeoutError};
use std::time::Duration;

use crate::timer::{Timer, TimerState};
use crate::util::format_time;

/// Events consumed by the live display loop
#[derive(Clone, Debug, PartialEq)]
pub enum WatchEvent {
    Next,
    Prev,
    Quit,
    Tick,
}

/// Source of user input for the live display
pub trait WatchEventSource: Send + 'static {
    /// Block for up to `timeout` waiting for an event.
    /// Returns Ok(event) if an event arrives before the timeout, or Err(Timeout) if it expires.
    fn recv_timeout(&self, timeout: Duration) -> Result<WatchEvent, RecvTimeoutError>;
}

/// Reads commands from stdin lines: `q` quits, `n`/`p` cycle the focused timer
pub struct StdinEventSource {
    rx: Receiver<WatchEvent>,
}

impl StdinEventSource {
    pub fn new() -> Self {
        let (tx, rx) = mpsc::channel();

        std::thread::spawn(move || {
            let stdin = io::stdin();
            for line in stdin.lock().lines() {
                let ev = match line.as_deref().map(str::trim) {
                    Ok("q") | Ok("quit") => WatchEvent::Quit,
                    Ok("n") => WatchEvent::Next,
                    Ok("p") => WatchEvent::Prev,
                    Ok(_) => continue,
                    Err(_) => break,
                };
                if tx.send(ev).is_err() {
                    break;
                }
            }
        });

        Self { rx }
    }
}

impl Default for StdinEventSource {
    fn default() -> Self {
        Self::new()
    }
}

impl WatchEventSource for StdinEventSource {
    fn recv_timeout(&self, timeout: Duration) -> Result<WatchEvent, RecvTimeoutError> {
        self.rx.recv_timeout(timeout)
    }
}

/// Configurable ticker interface
pub trait Ticker: Send + Sync + 'static {
    fn interval(&self) -> Duration;
}

/// Fixed interval ticker
#[derive(Clone, Copy, Debug)]
pub struct FixedTicker {
    interval: Duration,
}

impl FixedTicker {
    pub fn new(interval: Duration) -> Self {
        Self { interval }
    }
}

impl Ticker for FixedTicker {
    fn interval(&self) -> Duration {
        self.interval
    }
}

/// Test event source for unit tests
pub struct TestEventSource {
    rx: Receiver<WatchEvent>,
}

impl TestEventSource {
    pub fn new(rx: Receiver<WatchEvent>) -> Self {
        Self { rx }
    }
}

impl WatchEventSource for TestEventSource {
    fn recv_timeout(&self, timeout: Duration) -> Result<WatchEvent, RecvTimeoutError> {
        self.rx.recv_timeout(timeout)
    }
}

/// Runner that advances the display one event/tick at a time
pub struct Runner<E: WatchEventSource, T: Ticker> {
    event_source: E,
    ticker: T,
}

impl<E: WatchEventSource, T: Ticker> Runner<E, T> {
    pub fn new(event_source: E, ticker: T) -> Self {
        Self {
            event_source,
            ticker,
        }
    }

    /// Blocks up to tick interval and returns the next event, or Tick on timeout.
    /// A closed source (stdin at EOF) still waits a full interval per tick.
    pub fn step(&self) -> WatchEvent {
        let interval = self.ticker.interval();
        match self.event_source.recv_timeout(interval) {
            Ok(ev) => ev,
            Err(RecvTimeoutError::Timeout) => WatchEvent::Tick,
            Err(RecvTimeoutError::Disconnected) => {
                std::thread::sleep(interval);
                WatchEvent::Tick
            }
        }
    }
}

/// Which running timer the focus line shows
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct FocusCursor {
    index: usize,
}

impl FocusCursor {
    pub fn next(&mut self, len: usize) {
        if len > 0 {
            self.index = (self.index + 1) % len;
        }
    }

    pub fn prev(&mut self, len: usize) {
        if len > 0 {
            self.index = (self.index + len - 1) % len;
        }
    }

    pub fn pick<'a>(&self, running: &[&'a Timer]) -> Option<&'a Timer> {
        if running.is_empty() {
            None
        } else {
            Some(running[self.index % running.len()])
        }
    }
}

/// One frame of the live display. Reads the snapshot, never changes it.
pub fn render_frame(state: &TimerState, cursor: &FocusCursor, now: DateTime<Utc>) -> String {
    let running: Vec<&Timer> = state.running_timers().collect();
    match cursor.pick(&running) {
        None => "no timers running".to_string(),
        Some(t) => {
            let position = running.iter().position(|r| r.id == t.id).unwrap_or(0) + 1;
            format!(
                "{} [{}] {} ({}/{})",
                t.name,
                t.project,
                format_time(t.live_elapsed(now)),
                position,
                running.len()
            )
        }
    }
}

/// Redraws the focus line on every tick until quit or `max_ticks` frames.
/// Returns the number of frames drawn.
pub fn watch<E, T, W, C>(
    runner: &Runner<E, T>,
    state: &TimerState,
    max_ticks: Option<u64>,
    mut clock: C,
    out: &mut W,
) -> io::Result<u64>
where
    E: WatchEventSource,
    T: Ticker,
    W: Write,
    C: FnMut() -> DateTime<Utc>,
{
    let mut cursor = FocusCursor::default();
    let running = state.running_timers().count();
    let mut frames = 0;

    writeln!(out, "{}", render_frame(state, &cursor, clock()))?;
    frames += 1;

    loop {
        if max_ticks.is_some_and(|max| frames >= max) {
            break;
        }
        match runner.step() {
            WatchEvent::Quit => break,
            WatchEvent::Next => cursor.next(running),
            WatchEvent::Prev => cursor.prev(running),
            WatchEvent::Tick => {}
        }
        writeln!(out, "{}", render_frame(state, &cursor, clock()))?;
        out.flush()?;
        frames += 1;
    }

    Ok(frames)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::{transition, Intent};
    use chrono::TimeZone;
    use std::sync::mpsc;

    fn at(ms: i64) -> DateTime<Utc> {
        Utc.timestamp_millis_opt(ms).unwrap()
    }

    fn two_running() -> TimerState {
        let mut state = TimerState::default();
        for name in ["first", "second"] {
            state = transition(&state, Intent::add_timer(name, Some("Acme")).unwrap(), at(0)).unwrap();
        }
        let ids: Vec<_> = state.timers.iter().map(|t| t.id).collect();
        for id in ids {
            state = transition(&state, Intent::StartTimer(id), at(0)).unwrap();
        }
        state
    }

    #[test]
    fn step_returns_tick_on_timeout() {
        let (_tx, rx) = mpsc::channel();
        let es = TestEventSource::new(rx);
        let ticker = FixedTicker::new(Duration::from_millis(1));
        let runner = Runner::new(es, ticker);

        assert_eq!(runner.step(), WatchEvent::Tick);
    }

    #[test]
    fn step_passes_through_events() {
        let (tx, rx) = mpsc::channel();
        tx.send(WatchEvent::Quit).unwrap();
        let es = TestEventSource::new(rx);
        let ticker = FixedTicker::new(Duration::from_millis(10));
        let runner = Runner::new(es, ticker);

        assert_eq!(runner.step(), WatchEvent::Quit);
    }

    #[test]
    fn closed_source_keeps_the_tick_cadence() {
        let (tx, rx) = mpsc::channel();
        drop(tx);
        let runner = Runner::new(TestEventSource::new(rx), FixedTicker::new(Duration::from_millis(20)));

        let started = std::time::Instant::now();
        let frames = watch(&runner, &two_running(), Some(4), || at(0), &mut Vec::<u8>::new()).unwrap();
        assert_eq!(frames, 4);
        assert!(started.elapsed() >= Duration::from_millis(60));
    }

    #[test]
    fn focus_cursor_wraps_both_ways() {
        let mut c = FocusCursor::default();
        c.prev(3);
        assert_eq!(c, FocusCursor { index: 2 });
        c.next(3);
        assert_eq!(c, FocusCursor { index: 0 });
        c.next(0);
        assert_eq!(c, FocusCursor { index: 0 });
    }

    #[test]
    fn frame_shows_live_elapsed_without_touching_state() {
        let state = two_running();
        let before = state.clone();
        let frame = render_frame(&state, &FocusCursor::default(), at(3_723_000));
        assert_eq!(frame, "first [Acme] 01:02:03 (1/2)");
        assert_eq!(state, before);
        assert!(state.timers.iter().all(|t| t.total_time == 0));
    }

    #[test]
    fn frame_without_running_timers() {
        let frame = render_frame(&TimerState::default(), &FocusCursor::default(), at(0));
        assert_eq!(frame, "no timers running");
    }

    #[test]
    fn watch_redraws_each_tick_and_cycles_focus() {
        let state = two_running();
        let (tx, rx) = mpsc::channel();
        tx.send(WatchEvent::Next).unwrap();
        tx.send(WatchEvent::Quit).unwrap();
        let runner = Runner::new(TestEventSource::new(rx), FixedTicker::new(Duration::from_millis(1)));

        let mut clock_ms = 0;
        let mut out = Vec::new();
        let frames = watch(
            &runner,
            &state,
            None,
            || {
                clock_ms += 1_000;
                at(clock_ms)
            },
            &mut out,
        )
        .unwrap();

        let text = String::from_utf8(out).unwrap();
        let lines: Vec<_> = text.lines().collect();
        assert_eq!(frames, 2);
        assert_eq!(lines[0], "first [Acme] 00:00:01 (1/2)");
        assert_eq!(lines[1], "second [Acme] 00:00:02 (2/2)");
    }

    #[test]
    fn watch_stops_after_max_ticks() {
        let (_tx, rx) = mpsc::channel();
        let runner = Runner::new(TestEventSource::new(rx), FixedTicker::new(Duration::from_millis(1)));
        let mut out = Vec::new();
        let frames = watch(&runner, &two_running(), Some(3), || at(0), &mut out).unwrap();
        assert_eq!(frames, 3);
        assert_eq!(String::from_utf8(out).unwrap().lines().count(), 3);
    }
}
