//! Feeding interval expressions.
//!
//! A cron-like schedule restricted to minute and hour lists, with fixed
//! wildcards for every calendar field:
//!
//! ```text
//!   0,30  9,21  *    *     ?    *
//!   MIN   HOUR  DOM  MONTH DOW  [YEAR]
//! ```
//!
//! All times are UTC.  A parsed [`Interval`] fires at least once per day,
//! so [`Interval::next_after`] always finds a match within 24 hours.

use core::fmt;

use serde::{Deserialize, Serialize};

const MINUTE_MS: u64 = 60_000;
const DAY_MINUTES: u64 = 1_440;

const ALL_MINUTES: u64 = (1 << 60) - 1;
const ALL_HOURS: u32 = (1 << 24) - 1;

/// Which position of the expression an [`IntervalError`] refers to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IntervalField {
    Minute,
    Hour,
    DayOfMonth,
    Month,
    DayOfWeek,
    Year,
}

impl fmt::Display for IntervalField {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Minute => "minute",
            Self::Hour => "hour",
            Self::DayOfMonth => "day-of-month",
            Self::Month => "month",
            Self::DayOfWeek => "day-of-week",
            Self::Year => "year",
        };
        f.write_str(name)
    }
}

/// Reasons an interval expression is rejected.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum IntervalError {
    /// Expected 5 or 6 whitespace-separated fields.
    FieldCount(usize),
    /// A list item is not a plain decimal number.
    NotANumber { field: IntervalField, item: String },
    /// A number lies outside the field's range.
    OutOfRange { field: IntervalField, value: u32 },
    /// A calendar field is not one of its allowed wildcards.
    WildcardRequired { field: IntervalField, token: String },
}

impl fmt::Display for IntervalError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::FieldCount(n) => write!(f, "expected 5 or 6 fields, found {n}"),
            Self::NotANumber { field, item } => write!(f, "{field}: '{item}' is not a number"),
            Self::OutOfRange { field, value } => write!(f, "{field}: {value} out of range"),
            Self::WildcardRequired { field, token } => {
                write!(f, "{field}: '{token}' not supported, use a wildcard")
            }
        }
    }
}

/// A validated feeding schedule.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Interval {
    expr: String,
    minutes: u64,
    hours: u32,
}

impl Interval {
    pub fn parse(expr: &str) -> Result<Self, IntervalError> {
        let fields: Vec<&str> = expr.split_whitespace().collect();
        let [minute, hour, dom, month, dow, rest @ ..] = fields.as_slice() else {
            return Err(IntervalError::FieldCount(fields.len()));
        };
        if rest.len() > 1 {
            return Err(IntervalError::FieldCount(fields.len()));
        }

        let minutes = parse_list(minute, 59, IntervalField::Minute)?;
        let hours = parse_list(hour, 23, IntervalField::Hour)? as u32;
        expect_wildcard(dom, &["*", "?"], IntervalField::DayOfMonth)?;
        expect_wildcard(month, &["*"], IntervalField::Month)?;
        expect_wildcard(dow, &["?", "*"], IntervalField::DayOfWeek)?;
        if let Some(year) = rest.first() {
            expect_wildcard(year, &["*"], IntervalField::Year)?;
        }

        Ok(Self {
            expr: fields.join(" "),
            minutes,
            hours,
        })
    }

    pub fn as_str(&self) -> &str {
        &self.expr
    }

    /// Whether the minute containing `epoch_ms` is a feeding time.
    pub fn matches(&self, epoch_ms: u64) -> bool {
        self.matches_minute_of_day((epoch_ms / MINUTE_MS) % DAY_MINUTES)
    }

    /// First feeding time strictly after `epoch_ms`, on a minute boundary.
    pub fn next_after(&self, epoch_ms: u64) -> u64 {
        let start = epoch_ms / MINUTE_MS + 1;
        (start..start + DAY_MINUTES)
            .find(|minute| self.matches_minute_of_day(minute % DAY_MINUTES))
            .unwrap_or(start)
            .saturating_mul(MINUTE_MS)
    }

    fn matches_minute_of_day(&self, minute_of_day: u64) -> bool {
        let hour = minute_of_day / 60;
        let minute = minute_of_day % 60;
        (self.hours >> hour) & 1 == 1 && (self.minutes >> minute) & 1 == 1
    }
}

impl fmt::Display for Interval {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.expr)
    }
}

impl TryFrom<String> for Interval {
    type Error = IntervalError;

    fn try_from(expr: String) -> Result<Self, Self::Error> {
        Self::parse(&expr)
    }
}

impl From<Interval> for String {
    fn from(interval: Interval) -> Self {
        interval.expr
    }
}

fn parse_list(token: &str, max: u32, field: IntervalField) -> Result<u64, IntervalError> {
    if token == "*" {
        return Ok(if max == 59 { ALL_MINUTES } else { u64::from(ALL_HOURS) });
    }

    let mut mask = 0u64;
    for item in token.split(',') {
        if item.is_empty() || !item.bytes().all(|b| b.is_ascii_digit()) {
            return Err(IntervalError::NotANumber {
                field,
                item: item.to_string(),
            });
        }
        let value: u32 = item.parse().map_err(|_| IntervalError::NotANumber {
            field,
            item: item.to_string(),
        })?;
        if value > max {
            return Err(IntervalError::OutOfRange { field, value });
        }
        mask |= 1 << value;
    }
    Ok(mask)
}

fn expect_wildcard(token: &str, allowed: &[&str], field: IntervalField) -> Result<(), IntervalError> {
    if allowed.contains(&token) {
        Ok(())
    } else {
        Err(IntervalError::WildcardRequired {
            field,
            token: token.to_string(),
        })
    }
}
