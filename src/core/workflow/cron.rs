//! Five-field cron evaluator: minute, hour, day-of-month, month, day-of-week.
//!
//! Each field is either `*` or a single integer literal; lists, ranges, and
//! steps are not supported. Matching uses local time, and every non-wildcard
//! field must match.

use chrono::{DateTime, Datelike, Duration, Local, Timelike};
use thiserror::Error;

/// Search horizon for the next matching minute. An expression that never
/// matches within this window is treated as disabled.
const SEARCH_LIMIT_MINUTES: i64 = 366 * 24 * 60;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum CronParseError {
    #[error("expected 5 fields, got {0}")]
    FieldCount(usize),
    #[error("{field} field has invalid value '{value}'")]
    InvalidValue { field: &'static str, value: String },
    #[error("{field} field value {value} out of range {min}..={max}")]
    OutOfRange {
        field: &'static str,
        value: u32,
        min: u32,
        max: u32,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum CronField {
    Any,
    Exact(u32),
}

impl CronField {
    fn matches(&self, value: u32) -> bool {
        match self {
            CronField::Any => true,
            CronField::Exact(expected) => *expected == value,
        }
    }
}

/// A parsed cron schedule.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CronSchedule {
    minute: CronField,
    hour: CronField,
    day_of_month: CronField,
    month: CronField,
    /// 0 = Sunday .. 6 = Saturday.
    day_of_week: CronField,
}

impl CronSchedule {
    pub fn parse(expression: &str) -> Result<Self, CronParseError> {
        let fields: Vec<&str> = expression.split_whitespace().collect();
        if fields.len() != 5 {
            return Err(CronParseError::FieldCount(fields.len()));
        }
        Ok(CronSchedule {
            minute: parse_field(fields[0], "minute", 0, 59)?,
            hour: parse_field(fields[1], "hour", 0, 23)?,
            day_of_month: parse_field(fields[2], "day-of-month", 1, 31)?,
            month: parse_field(fields[3], "month", 1, 12)?,
            day_of_week: parse_field(fields[4], "day-of-week", 0, 6)?,
        })
    }

    /// The earliest instant strictly after `reference` whose minute matches
    /// the schedule, searching in 1-minute steps bounded to 366 days.
    pub fn next_fire_after(&self, reference: DateTime<Local>) -> Option<DateTime<Local>> {
        let floor = reference
            .with_second(0)
            .and_then(|t| t.with_nanosecond(0))
            .unwrap_or(reference);
        let mut candidate = floor + Duration::minutes(1);
        for _ in 0..SEARCH_LIMIT_MINUTES {
            if self.matches(&candidate) {
                return Some(candidate);
            }
            candidate += Duration::minutes(1);
        }
        None
    }

    fn matches(&self, instant: &DateTime<Local>) -> bool {
        self.minute.matches(instant.minute())
            && self.hour.matches(instant.hour())
            && self.day_of_month.matches(instant.day())
            && self.month.matches(instant.month())
            && self
                .day_of_week
                .matches(instant.weekday().num_days_from_sunday())
    }
}

fn parse_field(
    text: &str,
    field: &'static str,
    min: u32,
    max: u32,
) -> Result<CronField, CronParseError> {
    if text == "*" {
        return Ok(CronField::Any);
    }
    let value: u32 = text.parse().map_err(|_| CronParseError::InvalidValue {
        field,
        value: text.to_string(),
    })?;
    if value < min || value > max {
        return Err(CronParseError::OutOfRange {
            field,
            value,
            min,
            max,
        });
    }
    Ok(CronField::Exact(value))
}
