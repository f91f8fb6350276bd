//! Recurring schedules: cron expressions and fixed intervals.

use std::collections::BTreeSet;
use std::fmt;
use std::str::FromStr;
use std::time::Duration;

use chrono::{DateTime, Utc};

use crate::config::ConfigError;

/// When a job fires.
///
/// Parsed from text with [`FromStr`]:
/// - 5-field cron (`*/5 * * * *`), fires at second 0; day-of-week counts
///   from Sunday = 0 (7 is also Sunday)
/// - 6/7-field cron with seconds (`*/10 * * * * *`)
/// - shorthands such as `@hourly` or `@daily`
/// - `@every <n><unit>` with `ms`, `s`, `m` or `h`
#[derive(Debug, Clone)]
pub enum Schedule {
    Cron(Box<cron::Schedule>),
    Every(Duration),
}

impl Schedule {
    /// A fixed interval, first firing one interval from start.
    pub fn every(interval: Duration) -> Result<Self, ConfigError> {
        if interval.is_zero() {
            return Err(ConfigError::InvalidSchedule {
                expr: "@every 0s".to_string(),
                reason: "interval must be greater than zero".to_string(),
            });
        }
        Ok(Schedule::Every(interval))
    }

    /// The first firing strictly after `after`.
    pub fn next_after(&self, after: DateTime<Utc>) -> Option<DateTime<Utc>> {
        match self {
            Schedule::Cron(schedule) => schedule.after(&after).next(),
            Schedule::Every(interval) => chrono::Duration::from_std(*interval)
                .ok()
                .and_then(|step| after.checked_add_signed(step)),
        }
    }
}

impl FromStr for Schedule {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let expr = s.trim();
        let invalid = |reason: String| ConfigError::InvalidSchedule {
            expr: expr.to_string(),
            reason,
        };

        if let Some(interval) = expr.strip_prefix("@every") {
            let interval = parse_interval(interval.trim()).map_err(invalid)?;
            return Schedule::every(interval).map_err(|_| invalid("interval must be greater than zero".into()));
        }

        let fields: Vec<&str> = expr.split_whitespace().collect();
        let normalized = if let [minute, hour, day, month, weekday] = fields.as_slice() {
            let weekday = weekdays_from_sunday_zero(weekday).map_err(invalid)?;
            format!("0 {} {} {} {} {}", minute, hour, day, month, weekday)
        } else {
            expr.to_string()
        };
        cron::Schedule::from_str(&normalized)
            .map(|schedule| Schedule::Cron(Box::new(schedule)))
            .map_err(|e| invalid(e.to_string()))
    }
}

impl fmt::Display for Schedule {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Schedule::Cron(schedule) => write!(f, "{}", schedule),
            Schedule::Every(interval) => write!(f, "@every {:?}", interval),
        }
    }
}

fn parse_interval(text: &str) -> Result<Duration, String> {
    let split = text
        .find(|c: char| !c.is_ascii_digit())
        .ok_or_else(|| format!("missing unit in `{}`", text))?;
    let (value, unit) = text.split_at(split);
    let value: u64 = value
        .parse()
        .map_err(|_| format!("expected a number in `{}`", text))?;

    let seconds = |factor: u64| {
        value
            .checked_mul(factor)
            .map(Duration::from_secs)
            .ok_or_else(|| format!("interval `{}` is too large", text))
    };
    match unit {
        "ms" => Ok(Duration::from_millis(value)),
        "s" => Ok(Duration::from_secs(value)),
        "m" => seconds(60),
        "h" => seconds(3600),
        other => Err(format!("unknown unit `{}`", other)),
    }
}

/// Rewrite a standard day-of-week field (0-6, Sunday = 0, 7 also Sunday)
/// into the `cron` crate's numbering (1-7, Sunday = 1).
///
/// Numeric items are expanded into an explicit list. Named days and a
/// bare `*` or `?` pass through unchanged.
fn weekdays_from_sunday_zero(field: &str) -> Result<String, String> {
    let mut items = Vec::new();
    for item in field.split(',') {
        if matches!(item, "*" | "?") || item.chars().any(|c| c.is_ascii_alphabetic()) {
            items.push(item.to_string());
            continue;
        }

        let bad = || format!("invalid day-of-week `{}`", item);
        let number = |text: &str| match text.parse::<u32>() {
            Ok(n) if n <= 7 => Ok(n),
            _ => Err(bad()),
        };

        let (base, step) = match item.split_once('/') {
            Some((base, step)) => match step.parse::<u32>() {
                Ok(step) if step > 0 => (base, Some(step)),
                _ => return Err(bad()),
            },
            None => (item, None),
        };
        let (first, last) = match base.split_once('-') {
            _ if base == "*" => (0, 6),
            Some((first, last)) => (number(first)?, number(last)?),
            None if step.is_some() => (number(base)?, 6),
            None => (number(base)?, number(base)?),
        };
        if first > last {
            return Err(bad());
        }

        let days: BTreeSet<u32> = (first..=last)
            .step_by(step.unwrap_or(1) as usize)
            .map(|day| day % 7 + 1)
            .collect();
        items.extend(days.iter().map(u32::to_string));
    }
    Ok(items.join(","))
}
