use crate::error::ValidationError;
use crate::timer::MS_PER_HOUR;

const MS_PER_MINUTE: u64 = 60_000;
const MS_PER_SECOND: u64 = 1_000;

/// `HH:MM:SS`; hours keep counting past 24
pub fn format_time(ms: u64) -> String {
    let hours = ms / MS_PER_HOUR;
    let minutes = (ms % MS_PER_HOUR) / MS_PER_MINUTE;
    let seconds = (ms % MS_PER_MINUTE) / MS_PER_SECOND;
    format!("{hours:02}:{minutes:02}:{seconds:02}")
}

/// `3h 7m`
pub fn format_time_short(ms: u64) -> String {
    let hours = ms / MS_PER_HOUR;
    let minutes = (ms % MS_PER_HOUR) / MS_PER_MINUTE;
    format!("{hours}h {minutes}m")
}

/// Rounds to cents with ties away from zero; `{:.2}` alone rounds ties to even
pub fn round_cents(v: f64) -> f64 {
    (v * 100.0).round() / 100.0
}

/// Two decimals from [`round_cents`]
pub fn format_cents(v: f64) -> String {
    format!("{:.2}", round_cents(v))
}

pub fn format_money(amount: f64) -> String {
    format!("${}", format_cents(amount))
}

pub fn format_hours(ms: u64) -> String {
    format_cents(ms as f64 / MS_PER_HOUR as f64)
}

/// Whole-number percentage for goal displays
pub fn format_percent(fraction: f64) -> String {
    format!("{}%", (fraction * 100.0).round() as i64)
}

/// Parses a user supplied duration into milliseconds.
///
/// Accepts `HH:MM`, `HH:MM:SS` and unit forms such as `1h30m`, `45m`, `90s`.
pub fn parse_duration(input: &str) -> Result<u64, ValidationError> {
    let invalid = || ValidationError::InvalidDuration(input.to_string());
    let s = input.trim();
    if s.is_empty() {
        return Err(invalid());
    }

    if s.contains(':') {
        let parts = s
            .split(':')
            .map(|p| p.trim().parse::<u64>().map_err(|_| invalid()))
            .collect::<Result<Vec<_>, _>>()?;
        return match parts.as_slice() {
            [h, m] if *m < 60 => Ok(h * MS_PER_HOUR + m * MS_PER_MINUTE),
            [h, m, sec] if *m < 60 && *sec < 60 => {
                Ok(h * MS_PER_HOUR + m * MS_PER_MINUTE + sec * MS_PER_SECOND)
            }
            _ => Err(invalid()),
        };
    }

    let mut total: u64 = 0;
    let mut digits = String::new();
    let mut saw_unit = false;
    for c in s.chars().filter(|c| !c.is_whitespace()) {
        if c.is_ascii_digit() {
            digits.push(c);
            continue;
        }
        let unit = match c.to_ascii_lowercase() {
            'h' => MS_PER_HOUR,
            'm' => MS_PER_MINUTE,
            's' => MS_PER_SECOND,
            _ => return Err(invalid()),
        };
        let n: u64 = digits.parse().map_err(|_| invalid())?;
        total = n
            .checked_mul(unit)
            .and_then(|v| total.checked_add(v))
            .ok_or_else(invalid)?;
        digits.clear();
        saw_unit = true;
    }

    if !digits.is_empty() || !saw_unit {
        return Err(invalid());
    }
    Ok(total)
}
