use anyhow::{Context, Result};
use chrono::{DateTime, Local, Utc};
use clap::{Parser, Subcommand, ValueEnum};
use std::io::{self, Write};
use std::path::PathBuf;
use std::time::Duration;
use tracing::info;
use tracing_subscriber::EnvFilter;

use timesnap::analytics::AnalyticsReport;
use timesnap::config::{Backend, Config, ConfigStore, FileConfigStore};
use timesnap::export;
use timesnap::persist::{FileStateStore, SqliteStateStore, StateStore};
use timesnap::runtime::{self, FixedTicker, Runner, StdinEventSource};
use timesnap::util::{format_money, format_percent, format_time, format_time_short, parse_duration};
use timesnap::{toggle_intents, GoalsUpdate, Intent, Timer, TimerId, TimerStore};

/// local-first time tracker with per-project timers, goals and earnings
#[derive(Parser, Debug, Clone)]
#[clap(
    version,
    about,
    long_about = "Track time with named timers grouped by project, set daily and weekly goals, and report earnings at an hourly rate. Data stays on this machine."
)]
pub struct Cli {
    /// snapshot file to use instead of the configured location
    #[clap(long, global = true)]
    data_file: Option<PathBuf>,

    /// storage backend for the snapshot
    #[clap(long, value_enum, global = true)]
    backend: Option<Backend>,

    /// config file to read instead of the platform default
    #[clap(long, global = true)]
    config: Option<PathBuf>,

    /// log filter, overridden by RUST_LOG
    #[clap(long, default_value = "warn", global = true)]
    log_level: String,

    #[clap(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug, Clone, PartialEq)]
pub enum Command {
    /// create a timer
    Add {
        name: String,
        /// project the timer belongs to
        #[clap(short, long)]
        project: Option<String>,
    },
    /// start (or reopen) a timer
    Start { id: u64 },
    /// pause a running timer
    Pause { id: u64 },
    /// stop a timer and mark it completed
    Stop { id: u64 },
    /// reset a timer to zero and start it again
    Restart { id: u64 },
    /// overwrite the tracked time of a timer, e.g. 1h30m or 01:30
    Edit { id: u64, duration: String },
    /// remove a timer
    Delete { id: u64 },
    /// remove every completed timer
    ClearCompleted,
    /// pause all running timers, or start the first active one
    Toggle,
    /// show or change the daily and weekly goals
    Goals {
        #[clap(long)]
        daily: Option<String>,
        #[clap(long)]
        weekly: Option<String>,
    },
    /// set the hourly rate
    Rate { amount: f64 },
    /// switch focus mode on or off
    Focus { state: Switch },
    /// list timers with their elapsed time
    List,
    /// today, week and per-project totals with earnings
    Analytics {
        /// print the report as json
        #[clap(long)]
        json: bool,
    },
    /// write the snapshot as a json backup
    ExportJson { path: Option<PathBuf> },
    /// write the csv report
    ExportCsv { path: Option<PathBuf> },
    /// replace all data with a json backup
    Import { path: PathBuf },
    /// live display of running timers (q to quit, n/p to cycle)
    Watch {
        /// stop after this many frames
        #[clap(long)]
        ticks: Option<u64>,
    },
}

#[derive(Debug, Copy, Clone, PartialEq, Eq, ValueEnum, strum_macros::Display)]
#[strum(serialize_all = "lowercase")]
pub enum Switch {
    On,
    Off,
}

pub struct App {
    store: TimerStore<Box<dyn StateStore>>,
    config: Config,
}

impl App {
    pub fn new(config: Config) -> Result<Self> {
        let path = config.resolved_data_file();
        let backend: Box<dyn StateStore> = match config.backend {
            Backend::Json => Box::new(FileStateStore::with_path(&path)),
            Backend::Sqlite => Box::new(
                SqliteStateStore::open(&path)
                    .with_context(|| format!("failed to open database {}", path.display()))?,
            ),
        };
        info!(backend = %config.backend, path = %path.display(), "opened timer storage");

        let store = TimerStore::open(backend)
            .with_context(|| format!("failed to load timers from {}", path.display()))?;
        Ok(Self { store, config })
    }

    fn has_timer(&self, id: TimerId, out: &mut impl Write) -> io::Result<bool> {
        let found = self.store.state().timer(id).is_some();
        if !found {
            writeln!(out, "no timer with id {id}")?;
        }
        Ok(found)
    }

    fn apply_to(
        &mut self,
        id: u64,
        make: impl FnOnce(TimerId) -> Intent,
        now: DateTime<Utc>,
        out: &mut impl Write,
    ) -> Result<()> {
        let id = TimerId(id);
        if self.has_timer(id, out)? {
            self.store.dispatch(make(id), now)?;
            if let Some(t) = self.store.state().timer(id) {
                writeln!(out, "{}", describe(t, now))?;
            }
        }
        Ok(())
    }

    pub fn run(&mut self, command: Command, now: DateTime<Local>, out: &mut impl Write) -> Result<()> {
        let utc = now.with_timezone(&Utc);

        match command {
            Command::Add { name, project } => {
                let project = project.unwrap_or_else(|| self.config.default_project.clone());
                let intent = Intent::add_timer(&name, Some(project.as_str()))?;
                let state = self.store.dispatch(intent, utc)?;
                if let Some(t) = state.timers.last() {
                    writeln!(out, "added {}", describe(t, utc))?;
                }
            }
            Command::Start { id } => self.apply_to(id, Intent::StartTimer, utc, out)?,
            Command::Pause { id } => self.apply_to(id, Intent::PauseTimer, utc, out)?,
            Command::Stop { id } => self.apply_to(id, Intent::StopTimer, utc, out)?,
            Command::Restart { id } => self.apply_to(id, Intent::RestartTimer, utc, out)?,
            Command::Edit { id, duration } => {
                let new_time = parse_duration(&duration)?;
                self.apply_to(id, |id| Intent::EditTimerTime { id, new_time }, utc, out)?;
            }
            Command::Delete { id } => {
                let id = TimerId(id);
                if self.has_timer(id, out)? {
                    self.store.dispatch(Intent::DeleteTimer(id), utc)?;
                    writeln!(out, "deleted {id}")?;
                }
            }
            Command::ClearCompleted => {
                let before = self.store.state().timers.len();
                let state = self.store.dispatch(Intent::ClearCompleted, utc)?;
                writeln!(out, "cleared {} completed timers", before - state.timers.len())?;
            }
            Command::Toggle => {
                let intents = toggle_intents(self.store.state());
                if intents.is_empty() {
                    writeln!(out, "no active timers")?;
                }
                self.store.dispatch_all(intents, utc)?;
                for t in self.store.state().active_timers() {
                    writeln!(out, "{}", describe(t, utc))?;
                }
            }
            Command::Goals { daily, weekly } => {
                let update = GoalsUpdate {
                    daily: daily.as_deref().map(parse_duration).transpose()?,
                    weekly: weekly.as_deref().map(parse_duration).transpose()?,
                };
                if !update.is_empty() {
                    self.store.dispatch(Intent::UpdateGoals(update), utc)?;
                }
                let goals = self.store.state().goals;
                writeln!(out, "daily goal  {}", format_time_short(goals.daily))?;
                writeln!(out, "weekly goal {}", format_time_short(goals.weekly))?;
            }
            Command::Rate { amount } => {
                self.store.dispatch(Intent::update_hourly_rate(amount)?, utc)?;
                writeln!(out, "hourly rate {}", format_money(amount))?;
            }
            Command::Focus { state } => {
                self.store.dispatch(Intent::SetFocusMode(state == Switch::On), utc)?;
                writeln!(out, "focus mode {state}")?;
            }
            Command::List => self.list(utc, out)?,
            Command::Analytics { json } => {
                let report = AnalyticsReport::build(self.store.state(), &now);
                if json {
                    writeln!(out, "{}", serde_json::to_string_pretty(&report)?)?;
                } else {
                    print_report(&report, out)?;
                }
            }
            Command::ExportJson { path } => {
                let path = path.unwrap_or_else(|| export::backup_file_name(now.date_naive()).into());
                export::write_json_file(self.store.state(), &path)?;
                writeln!(out, "wrote {}", path.display())?;
            }
            Command::ExportCsv { path } => {
                let path = path.unwrap_or_else(|| export::report_file_name(now.date_naive()).into());
                let state = self.store.state();
                let file = std::fs::File::create(&path)
                    .with_context(|| format!("failed to create {}", path.display()))?;
                export::write_csv(file, &state.timers, state.hourly_rate, &Local)?;
                writeln!(out, "wrote {}", path.display())?;
            }
            Command::Import { path } => {
                let snapshot = export::read_json_file(&path)
                    .with_context(|| format!("failed to import {}", path.display()))?;
                let state = self.store.dispatch(Intent::load_data(snapshot), utc)?;
                writeln!(out, "imported {} timers", state.timers.len())?;
            }
            Command::Watch { ticks } => {
                let ticker = FixedTicker::new(Duration::from_millis(self.config.refresh_interval_ms));
                let runner = Runner::new(StdinEventSource::new(), ticker);
                runtime::watch(&runner, self.store.state(), ticks, Utc::now, out)?;
            }
        }

        Ok(())
    }

    fn list(&self, now: DateTime<Utc>, out: &mut impl Write) -> io::Result<()> {
        let state = self.store.state();
        if state.timers.is_empty() {
            return writeln!(out, "no timers yet");
        }
        writeln!(out, "Active")?;
        for t in state.active_timers() {
            writeln!(out, "  {}", describe(t, now))?;
        }
        writeln!(out, "Completed")?;
        for t in state.completed_timers() {
            writeln!(out, "  {}", describe(t, now))?;
        }
        Ok(())
    }
}

fn describe(t: &Timer, now: DateTime<Utc>) -> String {
    let status = if t.is_running {
        "running".to_string()
    } else if let Some(done) = t.completed_at {
        format!("completed {}", done.with_timezone(&Local).format("%Y-%m-%d %H:%M"))
    } else {
        "paused".to_string()
    };
    format!(
        "{} {} [{}] {} {}",
        t.id,
        t.name,
        t.project,
        format_time(t.live_elapsed(now)),
        status
    )
}

fn print_report(report: &AnalyticsReport, out: &mut impl Write) -> io::Result<()> {
    writeln!(
        out,
        "Today      {:>9}  {:>4} of daily goal   {}",
        format_time_short(report.today),
        format_percent(report.daily_progress),
        format_money(report.today_earnings)
    )?;
    writeln!(
        out,
        "This week  {:>9}  {:>4} of weekly goal  {}",
        format_time_short(report.week),
        format_percent(report.weekly_progress),
        format_money(report.week_earnings)
    )?;
    writeln!(out, "Rate       {}/hour", format_money(report.hourly_rate))?;
    writeln!(out, "Projects")?;
    if report.projects.is_empty() {
        writeln!(out, "  No time tracked yet")?;
    }
    for p in &report.projects {
        writeln!(
            out,
            "  {:<20} {:>9}  {}",
            p.project,
            format_time_short(p.time),
            format_money(p.earnings)
        )?;
    }
    let c = report.counts;
    writeln!(
        out,
        "Timers: {} total, {} active, {} running, {} completed",
        c.total, c.active, c.running, c.completed
    )?;
    writeln!(out, "Total tracked: {}", format_time_short(report.total_tracked))
}

fn load_config(cli: &Cli) -> Config {
    let mut config = match &cli.config {
        Some(path) => FileConfigStore::with_path(path).load(),
        None => FileConfigStore::new().load(),
    };
    if let Some(backend) = cli.backend {
        config.backend = backend;
    }
    if let Some(path) = &cli.data_file {
        config.data_file = Some(path.clone());
    }
    config
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&cli.log_level));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(io::stderr)
        .with_target(false)
        .init();

    let config = load_config(&cli);
    let mut app = App::new(config)?;

    let stdout = io::stdout();
    let mut out = stdout.lock();
    app.run(cli.command, Local::now(), &mut out)
}
