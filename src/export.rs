use chrono::{NaiveDate, TimeZone};
use csv::{QuoteStyle, WriterBuilder};
use std::fmt::Display;
use std::fs::File;
use std::io::{BufReader, Read, Write};
use std::path::Path;
use tracing::info;

use crate::analytics::total_tracked;
use crate::error::{ExportError, StoreError};
use crate::timer::{Timer, TimerState, MS_PER_HOUR};
use crate::util::{format_cents, format_hours, round_cents};

pub const CSV_HEADER: [&str; 5] = [
    "Timer Name",
    "Project",
    "Total Time (hours)",
    "Created Date",
    "Earnings ($)",
];

pub fn backup_file_name(date: NaiveDate) -> String {
    format!("timesnap-backup-{}.json", date.format("%Y-%m-%d"))
}

pub fn report_file_name(date: NaiveDate) -> String {
    format!("timesnap-report-{}.csv", date.format("%Y-%m-%d"))
}

/// The snapshot as pretty json; loadable again through [`import_json`]
pub fn export_json(state: &TimerState) -> Result<String, ExportError> {
    Ok(serde_json::to_string_pretty(state)?)
}

pub fn write_json_file<P: AsRef<Path>>(state: &TimerState, path: P) -> Result<(), ExportError> {
    let mut file = File::create(path.as_ref())?;
    file.write_all(export_json(state)?.as_bytes())?;
    info!(path = %path.as_ref().display(), timers = state.timers.len(), "exported json backup");
    Ok(())
}

/// Reads a backup. Anything that is not a complete, consistent snapshot is
/// reported as a malformed snapshot.
pub fn import_json<R: Read>(reader: R) -> Result<TimerState, ExportError> {
    let state: TimerState = serde_json::from_reader(reader)
        .map_err(|e| StoreError::malformed(e.to_string()))?;
    Ok(state.validate()?)
}

pub fn read_json_file<P: AsRef<Path>>(path: P) -> Result<TimerState, ExportError> {
    let file = File::open(path)?;
    import_json(BufReader::new(file))
}

fn rounded_hours(ms: u64) -> f64 {
    round_cents(ms as f64 / MS_PER_HOUR as f64)
}

/// Writes the csv report: a plain header, one row per timer and a closing
/// TOTAL row. Text fields are quoted, numbers are not.
///
/// Row earnings use the row's rounded hours; the TOTAL row is rounded from
/// the summed milliseconds, so it can differ from the column sum by a cent.
pub fn write_csv<W, Tz>(
    writer: W,
    timers: &[Timer],
    hourly_rate: f64,
    tz: &Tz,
) -> Result<(), ExportError>
where
    W: Write,
    Tz: TimeZone,
    Tz::Offset: Display,
{
    let mut writer = writer;
    {
        let mut header = WriterBuilder::new()
            .quote_style(QuoteStyle::Necessary)
            .from_writer(&mut writer);
        header.write_record(CSV_HEADER)?;
        header.flush()?;
    }

    let mut wtr = WriterBuilder::new()
        .quote_style(QuoteStyle::NonNumeric)
        .from_writer(writer);
    for t in timers {
        let created = t.created_at.with_timezone(tz).format("%-m/%-d/%Y").to_string();
        let hours = format_hours(t.total_time);
        let earnings = format_cents(rounded_hours(t.total_time) * hourly_rate);
        wtr.write_record([
            t.name.as_str(),
            t.project.as_str(),
            hours.as_str(),
            created.as_str(),
            earnings.as_str(),
        ])?;
    }

    let total_ms = total_tracked(timers);
    let total_hours = format_hours(total_ms);
    let total_earnings = format_cents(rounded_hours(total_ms) * hourly_rate);
    wtr.write_record(["TOTAL", "", total_hours.as_str(), "", total_earnings.as_str()])?;
    wtr.flush()?;
    Ok(())
}

pub fn export_csv<Tz>(timers: &[Timer], hourly_rate: f64, tz: &Tz) -> Result<String, ExportError>
where
    Tz: TimeZone,
    Tz::Offset: Display,
{
    let mut buf = Vec::new();
    write_csv(&mut buf, timers, hourly_rate, tz)?;
    Ok(String::from_utf8_lossy(&buf).into_owned())
}
