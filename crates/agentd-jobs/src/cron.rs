//! Five-field cron schedules.
//!
//! The accepted grammar is intentionally small: each of
//! `minute hour day month weekday` is `*`, a comma list, an inclusive
//! `start-end` range, or a single integer. Step syntax and names are not
//! supported. Weekdays are numbered 0 (Sunday) through 6 (Saturday);
//! 7 is not an alias for Sunday.

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Datelike, TimeZone, Timelike};

use crate::error::JobError;

/// One field of a cron expression.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CronField {
    /// `*`
    Any,
    /// `a,b,c`, compared as decimal strings.
    List(Vec<String>),
    /// `a-b`, inclusive.
    Range { start: u32, end: u32 },
    /// A bare integer.
    Value(u32),
}

impl CronField {
    fn parse(text: &str, bounds: FieldBounds) -> Result<Self, String> {
        if text == "*" {
            return Ok(CronField::Any);
        }

        if text.contains(',') {
            let mut items = Vec::new();
            for item in text.split(',') {
                bounds.check(item, parse_number(bounds.name, item)?)?;
                items.push(item.to_string());
            }
            return Ok(CronField::List(items));
        }

        if let Some((start, end)) = text.split_once('-') {
            let start = bounds.check(start, parse_number(bounds.name, start)?)?;
            let end = bounds.check(end, parse_number(bounds.name, end)?)?;
            if start > end {
                return Err(format!("{} range {} is reversed", bounds.name, text));
            }
            return Ok(CronField::Range { start, end });
        }

        let value = parse_number(bounds.name, text)?;
        Ok(CronField::Value(bounds.check(text, value)?))
    }

    /// Whether `value` satisfies this field.
    pub fn matches(&self, value: u32) -> bool {
        match self {
            CronField::Any => true,
            CronField::List(items) => {
                let rendered = value.to_string();
                items.iter().any(|item| *item == rendered)
            }
            CronField::Range { start, end } => *start <= value && value <= *end,
            CronField::Value(expected) => *expected == value,
        }
    }
}

impl fmt::Display for CronField {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CronField::Any => write!(f, "*"),
            CronField::List(items) => write!(f, "{}", items.join(",")),
            CronField::Range { start, end } => write!(f, "{}-{}", start, end),
            CronField::Value(value) => write!(f, "{}", value),
        }
    }
}

#[derive(Debug, Clone, Copy)]
struct FieldBounds {
    name: &'static str,
    min: u32,
    max: u32,
}

impl FieldBounds {
    const MINUTE: Self = Self { name: "minute", min: 0, max: 59 };
    const HOUR: Self = Self { name: "hour", min: 0, max: 23 };
    const DAY: Self = Self { name: "day", min: 1, max: 31 };
    const MONTH: Self = Self { name: "month", min: 1, max: 12 };
    const WEEKDAY: Self = Self { name: "weekday", min: 0, max: 6 };

    fn check(&self, text: &str, value: u32) -> Result<u32, String> {
        if value < self.min || value > self.max {
            return Err(format!(
                "{} value {} is outside {}-{}",
                self.name, text, self.min, self.max
            ));
        }
        Ok(value)
    }
}

fn parse_number(field: &str, text: &str) -> Result<u32, String> {
    if text.is_empty() || !text.bytes().all(|b| b.is_ascii_digit()) {
        return Err(format!("{} value '{}' is not an integer", field, text));
    }
    text.parse::<u32>()
        .map_err(|e| format!("{} value '{}': {}", field, text, e))
}

/// A parsed `minute hour day month weekday` schedule.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CronSchedule {
    expression: String,
    minute: CronField,
    hour: CronField,
    day: CronField,
    month: CronField,
    weekday: CronField,
}

impl CronSchedule {
    /// Parse a five-field expression.
    pub fn parse(expression: &str) -> Result<Self, JobError> {
        let invalid = |reason: String| JobError::InvalidCron {
            expression: expression.to_string(),
            reason,
        };

        let fields: Vec<&str> = expression.split_whitespace().collect();
        if fields.len() != 5 {
            return Err(invalid(format!("expected 5 fields, found {}", fields.len())));
        }

        Ok(Self {
            expression: expression.trim().to_string(),
            minute: CronField::parse(fields[0], FieldBounds::MINUTE).map_err(invalid)?,
            hour: CronField::parse(fields[1], FieldBounds::HOUR).map_err(invalid)?,
            day: CronField::parse(fields[2], FieldBounds::DAY).map_err(invalid)?,
            month: CronField::parse(fields[3], FieldBounds::MONTH).map_err(invalid)?,
            weekday: CronField::parse(fields[4], FieldBounds::WEEKDAY).map_err(invalid)?,
        })
    }

    /// The expression as written (trimmed).
    pub fn expression(&self) -> &str {
        &self.expression
    }

    pub fn minute(&self) -> &CronField {
        &self.minute
    }

    pub fn hour(&self) -> &CronField {
        &self.hour
    }

    pub fn day(&self) -> &CronField {
        &self.day
    }

    pub fn month(&self) -> &CronField {
        &self.month
    }

    pub fn weekday(&self) -> &CronField {
        &self.weekday
    }

    /// Whether every field matches the timestamp, read in its own offset.
    pub fn matches<Tz: TimeZone>(&self, at: &DateTime<Tz>) -> bool {
        self.minute.matches(at.minute())
            && self.hour.matches(at.hour())
            && self.day.matches(at.day())
            && self.month.matches(at.month())
            && self.weekday.matches(at.weekday().num_days_from_sunday())
    }
}

impl FromStr for CronSchedule {
    type Err = JobError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl fmt::Display for CronSchedule {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.expression)
    }
}

#[cfg(test)]
#[path = "cron_tests.rs"]
mod tests;
