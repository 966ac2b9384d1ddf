//! Schedule specs — the string grammar for time-based triggers.
//!
//! | Form | Example | Recurs |
//! |------|---------|--------|
//! | Clock time | `06:30`, `7:05` | daily |
//! | Weekly | `Sunday@06:00`, `mon@18:15` | weekly |
//! | Absolute | `2021-01-02T01:00:00Z`, `2021-01-02T01:00:00` | once, only if in the future |
//! | Cron | `0 8 * * 1-5`, `0 0 8 * * * *` | per expression |
//!
//! Calendar arithmetic runs in a configurable [`Zone`]. Naive absolute
//! timestamps (no offset) are read in that zone too.

use std::fmt;
use std::str::FromStr;

use chrono::{
    DateTime, Datelike, FixedOffset, Local, NaiveDate, NaiveDateTime, NaiveTime, TimeDelta,
    TimeZone, Utc, Weekday,
};
use serde::{Deserialize, Deserializer, Serialize, Serializer};

use crate::time::Timestamp;

/// Reasons a schedule string is rejected.
#[derive(Debug, thiserror::Error)]
pub enum ScheduleSpecError {
    #[error("schedule spec must not be empty")]
    Empty,

    #[error("invalid time of day {input:?}, expected HH:MM")]
    InvalidTime { input: String },

    #[error("unknown weekday {input:?}")]
    UnknownWeekday { input: String },

    #[error("invalid ISO-8601 timestamp {input:?}")]
    InvalidTimestamp { input: String },

    #[error("{input:?} is not a time, weekday, timestamp or cron expression")]
    Unrecognized {
        input: String,
        #[source]
        source: cron::error::Error,
    },

    #[error("invalid time zone {input:?}, expected local, utc or an offset like +01:00")]
    InvalidZone { input: String },
}

/// A parsed schedule.
#[derive(Debug, Clone)]
pub enum ScheduleSpec {
    /// Every day at the given local time.
    Daily(NaiveTime),
    /// Every week on `weekday` at `time`.
    Weekly { weekday: Weekday, time: NaiveTime },
    /// Once, at the given instant.
    At(AbsoluteTime),
    /// Per cron expression.
    Cron(Box<cron::Schedule>),
}

/// Instant of an absolute schedule.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AbsoluteTime {
    /// Carried an explicit offset.
    Fixed(Timestamp),
    /// No offset: read in the scheduler's zone.
    Naive(NaiveDateTime),
}

impl ScheduleSpec {
    /// Parse a schedule string.
    ///
    /// # Errors
    ///
    /// Returns a [`ScheduleSpecError`] describing why `input` matches none
    /// of the accepted forms.
    pub fn parse(input: &str) -> Result<Self, ScheduleSpecError> {
        let input = input.trim();
        if input.is_empty() {
            return Err(ScheduleSpecError::Empty);
        }

        // A bare `@daily` style macro has no weekday and belongs to cron.
        if let Some((day, time)) = input
            .split_once('@')
            .filter(|(day, _)| !day.trim().is_empty())
        {
            let weekday = day
                .trim()
                .parse::<Weekday>()
                .map_err(|_| ScheduleSpecError::UnknownWeekday {
                    input: day.to_string(),
                })?;
            let time = parse_clock(time.trim()).ok_or_else(|| ScheduleSpecError::InvalidTime {
                input: time.to_string(),
            })?;
            return Ok(Self::Weekly { weekday, time });
        }

        if looks_like_iso_date(input) {
            return parse_absolute(input)
                .map(Self::At)
                .ok_or_else(|| ScheduleSpecError::InvalidTimestamp {
                    input: input.to_string(),
                });
        }

        if looks_like_clock(input) {
            return parse_clock(input)
                .map(Self::Daily)
                .ok_or_else(|| ScheduleSpecError::InvalidTime {
                    input: input.to_string(),
                });
        }

        let expression = if input.split_whitespace().count() == 5 {
            format!("0 {input}")
        } else {
            input.to_string()
        };
        cron::Schedule::from_str(&expression)
            .map(|schedule| Self::Cron(Box::new(schedule)))
            .map_err(|source| ScheduleSpecError::Unrecognized {
                input: input.to_string(),
                source,
            })
    }

    /// Whether the spec fires more than once.
    #[must_use]
    pub fn is_recurring(&self) -> bool {
        !matches!(self, Self::At(_))
    }

    /// The first fire instant strictly after `now`, or `None` when there is
    /// none (an absolute time that has already passed).
    #[must_use]
    pub fn next_after(&self, now: Timestamp, zone: Zone) -> Option<Timestamp> {
        match zone {
            Zone::Utc => self.next_in(&Utc, now),
            Zone::Local => self.next_in(&Local, now),
            Zone::Fixed(offset) => self.next_in(&offset, now),
        }
    }

    fn next_in<Tz: TimeZone>(&self, tz: &Tz, now: Timestamp) -> Option<Timestamp> {
        match self {
            Self::Daily(time) => next_matching(tz, now, *time, |_| true),
            Self::Weekly { weekday, time } => {
                next_matching(tz, now, *time, |date| date.weekday() == *weekday)
            }
            Self::At(AbsoluteTime::Fixed(at)) => (*at > now).then_some(*at),
            Self::At(AbsoluteTime::Naive(naive)) => {
                resolve_local(tz, *naive).filter(|at| *at > now)
            }
            Self::Cron(schedule) => schedule
                .after(&now.with_timezone(tz))
                .next()
                .map(|at| at.with_timezone(&Utc)),
        }
    }
}

impl FromStr for ScheduleSpec {
    type Err = ScheduleSpecError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl fmt::Display for ScheduleSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Daily(time) => write!(f, "daily@{}", time.format("%H:%M")),
            Self::Weekly { weekday, time } => write!(f, "{weekday}@{}", time.format("%H:%M")),
            Self::At(AbsoluteTime::Fixed(at)) => write!(f, "at({})", at.to_rfc3339()),
            Self::At(AbsoluteTime::Naive(at)) => write!(f, "at({at})"),
            Self::Cron(schedule) => write!(f, "cron({schedule})"),
        }
    }
}

/// First day (from today, in `tz`) accepted by `day_matches` whose `time`
/// lies strictly after `now`.
fn next_matching<Tz: TimeZone>(
    tz: &Tz,
    now: Timestamp,
    time: NaiveTime,
    day_matches: impl Fn(NaiveDate) -> bool,
) -> Option<Timestamp> {
    let mut date = now.with_timezone(tz).date_naive();
    // Two weeks covers a weekly rule plus a skipped DST day.
    for _ in 0..15 {
        if day_matches(date) {
            if let Some(candidate) = resolve_local(tz, date.and_time(time)) {
                if candidate > now {
                    return Some(candidate);
                }
            }
        }
        date = date.succ_opt()?;
    }
    None
}

/// Map a wall-clock time in `tz` to an instant. Ambiguous times take the
/// earlier instant; times inside a DST gap move forward one hour.
fn resolve_local<Tz: TimeZone>(tz: &Tz, naive: NaiveDateTime) -> Option<Timestamp> {
    tz.from_local_datetime(&naive)
        .earliest()
        .or_else(|| tz.from_local_datetime(&(naive + TimeDelta::hours(1))).earliest())
        .map(|at| at.with_timezone(&Utc))
}

fn looks_like_clock(input: &str) -> bool {
    let Some((hours, minutes)) = input.split_once(':') else {
        return false;
    };
    (1..=2).contains(&hours.len())
        && hours.bytes().all(|b| b.is_ascii_digit())
        && minutes.len() == 2
        && minutes.bytes().all(|b| b.is_ascii_digit())
}

fn looks_like_iso_date(input: &str) -> bool {
    let bytes = input.as_bytes();
    bytes.len() > 10
        && bytes[..4].iter().all(u8::is_ascii_digit)
        && bytes[4] == b'-'
        && bytes[5..7].iter().all(u8::is_ascii_digit)
        && bytes[7] == b'-'
        && bytes[8..10].iter().all(u8::is_ascii_digit)
        && bytes[10] == b'T'
}

fn parse_clock(input: &str) -> Option<NaiveTime> {
    if !looks_like_clock(input) {
        return None;
    }
    let (hours, minutes) = input.split_once(':')?;
    NaiveTime::from_hms_opt(hours.parse().ok()?, minutes.parse().ok()?, 0)
}

fn parse_absolute(input: &str) -> Option<AbsoluteTime> {
    if let Ok(at) = DateTime::parse_from_rfc3339(input) {
        return Some(AbsoluteTime::Fixed(at.with_timezone(&Utc)));
    }
    if let Ok(at) = DateTime::parse_from_str(input, "%Y-%m-%dT%H:%M:%S%.f%z") {
        return Some(AbsoluteTime::Fixed(at.with_timezone(&Utc)));
    }
    ["%Y-%m-%dT%H:%M:%S%.f", "%Y-%m-%dT%H:%M:%S", "%Y-%m-%dT%H:%M"]
        .iter()
        .find_map(|format| NaiveDateTime::parse_from_str(input, format).ok())
        .map(AbsoluteTime::Naive)
}

/// Time zone used for calendar arithmetic.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Zone {
    /// The host's local zone.
    #[default]
    Local,
    Utc,
    /// A fixed UTC offset such as `+01:00`.
    Fixed(FixedOffset),
}

impl FromStr for Zone {
    type Err = ScheduleSpecError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "local" => Ok(Self::Local),
            "utc" | "z" => Ok(Self::Utc),
            other => other
                .parse::<FixedOffset>()
                .map(Self::Fixed)
                .map_err(|_| ScheduleSpecError::InvalidZone {
                    input: s.to_string(),
                }),
        }
    }
}

impl fmt::Display for Zone {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Local => f.write_str("local"),
            Self::Utc => f.write_str("utc"),
            Self::Fixed(offset) => write!(f, "{offset}"),
        }
    }
}

impl Serialize for Zone {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for Zone {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = String::deserialize(deserializer)?;
        raw.parse().map_err(serde::de::Error::custom)
    }
}
