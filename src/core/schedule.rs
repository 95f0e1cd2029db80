//! Cron spec parsing and next-fire calculation.
//!
//! A job's spec is one of:
//! - a 6-field cron expression with seconds: `sec min hour dom month dow`
//! - a classic 5-field expression, which fires at second 0
//! - a shortcut: `@yearly`, `@monthly`, `@weekly`, `@daily`, `@hourly`
//! - a fixed interval: `@every 90s`, `@every 1h30m`

use chrono::{DateTime, Utc};
use chrono_tz::Tz;
use cron::Schedule as CronSchedule;
use std::str::FromStr;
use std::time::Duration;
use thiserror::Error;

/// Errors that can occur when parsing a spec.
#[derive(Debug, Error)]
pub enum ScheduleError {
    /// Invalid cron expression.
    #[error("invalid cron expression '{spec}': {reason}")]
    InvalidCron { spec: String, reason: String },

    /// Invalid `@every` interval.
    #[error("invalid interval '{0}'")]
    InvalidInterval(String),

    /// Unknown timezone name.
    #[error("invalid timezone: {0}")]
    InvalidTimezone(String),

    /// The expression has no future occurrence.
    #[error("no more occurrences")]
    NoMoreOccurrences,
}

#[derive(Debug, Clone)]
enum Trigger {
    Cron(Box<CronSchedule>),
    Every(Duration),
}

/// A parsed spec bound to a timezone.
#[derive(Debug, Clone)]
pub struct Schedule {
    spec: String,
    timezone: Tz,
    trigger: Trigger,
}

impl Schedule {
    /// Parse a spec evaluated in UTC.
    pub fn parse(spec: &str) -> Result<Self, ScheduleError> {
        Self::parse_in(spec, Tz::UTC)
    }

    /// Parse a spec evaluated in the named IANA timezone.
    pub fn parse_with_timezone(spec: &str, timezone: &str) -> Result<Self, ScheduleError> {
        let tz = timezone
            .parse::<Tz>()
            .map_err(|_| ScheduleError::InvalidTimezone(timezone.to_string()))?;
        Self::parse_in(spec, tz)
    }

    /// Parse a spec evaluated in `timezone`.
    pub fn parse_in(spec: &str, timezone: Tz) -> Result<Self, ScheduleError> {
        let trimmed = spec.trim();
        let trigger = match trimmed.strip_prefix('@') {
            Some(shortcut) => Self::parse_shortcut(trimmed, shortcut)?,
            None => Self::parse_cron(trimmed)?,
        };

        Ok(Self {
            spec: spec.to_string(),
            timezone,
            trigger,
        })
    }

    fn parse_shortcut(spec: &str, shortcut: &str) -> Result<Trigger, ScheduleError> {
        let lowered = shortcut.to_ascii_lowercase();
        if let Some(interval) = lowered.strip_prefix("every ") {
            return parse_interval(interval.trim()).map(Trigger::Every);
        }

        let expanded = match lowered.as_str() {
            "yearly" | "annually" => "0 0 0 1 1 *",
            "monthly" => "0 0 0 1 * *",
            "weekly" => "0 0 0 * * SUN",
            "daily" | "midnight" => "0 0 0 * * *",
            "hourly" => "0 0 * * * *",
            _ => {
                return Err(ScheduleError::InvalidCron {
                    spec: spec.to_string(),
                    reason: "unknown shortcut".into(),
                });
            }
        };
        Self::parse_cron(expanded)
    }

    fn parse_cron(spec: &str) -> Result<Trigger, ScheduleError> {
        let field_count = spec.split_whitespace().count();
        let normalized = match field_count {
            5 => format!("0 {spec}"),
            6 => spec.to_string(),
            n => {
                return Err(ScheduleError::InvalidCron {
                    spec: spec.to_string(),
                    reason: format!("expected 5 or 6 fields, got {n}"),
                });
            }
        };

        CronSchedule::from_str(&normalized)
            .map(|schedule| Trigger::Cron(Box::new(schedule)))
            .map_err(|e| ScheduleError::InvalidCron {
                spec: spec.to_string(),
                reason: e.to_string(),
            })
    }

    /// The first fire time strictly after `after`.
    pub fn next_after(&self, after: DateTime<Utc>) -> Result<DateTime<Utc>, ScheduleError> {
        match &self.trigger {
            Trigger::Cron(schedule) => schedule
                .after(&after.with_timezone(&self.timezone))
                .next()
                .map(|at| at.with_timezone(&Utc))
                .ok_or(ScheduleError::NoMoreOccurrences),
            Trigger::Every(interval) => chrono::Duration::from_std(*interval)
                .ok()
                .and_then(|step| after.checked_add_signed(step))
                .ok_or(ScheduleError::NoMoreOccurrences),
        }
    }

    /// Count fire times in `(from, to]`, stopping at `cap`.
    pub fn occurrences_between(
        &self,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
        cap: usize,
    ) -> usize {
        let mut count = 0;
        let mut cursor = from;
        while count < cap {
            match self.next_after(cursor) {
                Ok(next) if next <= to => {
                    count += 1;
                    cursor = next;
                }
                _ => break,
            }
        }
        count
    }

    /// The spec as written.
    pub fn spec(&self) -> &str {
        &self.spec
    }

    /// The timezone the spec is evaluated in.
    pub fn timezone(&self) -> Tz {
        self.timezone
    }
}

/// Parse durations like `30s`, `5m`, `1h30m`, `2d`.
fn parse_interval(text: &str) -> Result<Duration, ScheduleError> {
    let invalid = || ScheduleError::InvalidInterval(text.to_string());
    let mut total: u64 = 0;
    let mut digits = String::new();

    for c in text.chars() {
        if c.is_ascii_digit() {
            digits.push(c);
            continue;
        }
        let value: u64 = digits.parse().map_err(|_| invalid())?;
        digits.clear();
        let unit = match c {
            's' => 1,
            'm' => 60,
            'h' => 3_600,
            'd' => 86_400,
            _ => return Err(invalid()),
        };
        total = value
            .checked_mul(unit)
            .and_then(|secs| total.checked_add(secs))
            .ok_or_else(invalid)?;
    }

    if !digits.is_empty() || total == 0 {
        return Err(invalid());
    }
    Ok(Duration::from_secs(total))
}
