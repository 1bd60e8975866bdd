//! Calendar handling: ISO dates, the requested date range and CF time units.

use chrono::{Duration, Local, NaiveDate, NaiveDateTime, NaiveTime};
use serde::{Deserialize, Serialize};
use std::fmt;

use crate::error::{Cfsv2Error, Result};

const ISO_DATE: &str = "%Y-%m-%d";

/// Parse a `YYYY-MM-DD` date.
pub fn parse_iso_date(value: &str) -> Result<NaiveDate> {
    NaiveDate::parse_from_str(value.trim(), ISO_DATE).map_err(|_| Cfsv2Error::InvalidDate {
        message: format!("not an ISO formatted date ({})", value),
    })
}

/// The local calendar day before today.
pub fn yesterday() -> NaiveDate {
    Local::now().date_naive() - Duration::days(1)
}

/// An inclusive `[start, end]` range of calendar days.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct DateRange {
    start: NaiveDate,
    end: NaiveDate,
}

impl DateRange {
    /// Create a range, rejecting `start > end`.
    pub fn new(start: NaiveDate, end: NaiveDate) -> Result<Self> {
        if start > end {
            return Err(Cfsv2Error::InvalidDate {
                message: format!("start date {} is after end date {}", start, end),
            });
        }
        Ok(Self { start, end })
    }

    /// A range exactly as named, without the ordering check. Cache entries
    /// written by other tools may carry reversed bounds.
    pub(crate) fn unchecked(start: NaiveDate, end: NaiveDate) -> Self {
        Self { start, end }
    }

    /// Build a range from optional bounds, each defaulting to yesterday.
    pub fn from_options(start: Option<NaiveDate>, end: Option<NaiveDate>) -> Result<Self> {
        let fallback = yesterday();
        Self::new(start.unwrap_or(fallback), end.unwrap_or(fallback))
    }

    /// Yesterday to yesterday.
    pub fn yesterday() -> Self {
        let day = yesterday();
        Self {
            start: day,
            end: day,
        }
    }

    pub fn start(&self) -> NaiveDate {
        self.start
    }

    pub fn end(&self) -> NaiveDate {
        self.end
    }

    pub fn contains(&self, date: NaiveDate) -> bool {
        self.start <= date && date <= self.end
    }
}

impl fmt::Display for DateRange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}_{}",
            self.start.format(ISO_DATE),
            self.end.format(ISO_DATE)
        )
    }
}

/// Decoded CF `units` attribute of a time coordinate, e.g.
/// `days since 1900-01-01 00:00:00`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TimeUnits {
    seconds_per_unit: f64,
    epoch: NaiveDateTime,
}

impl TimeUnits {
    pub fn parse(units: &str) -> Result<Self> {
        let invalid = || Cfsv2Error::Data {
            message: format!("unsupported time units: {}", units),
        };

        let (unit, reference) = units.split_once(" since ").ok_or_else(invalid)?;
        let seconds_per_unit = match unit.trim().to_lowercase().as_str() {
            "day" | "days" => 86_400.0,
            "hour" | "hours" => 3_600.0,
            "minute" | "minutes" => 60.0,
            "second" | "seconds" => 1.0,
            _ => return Err(invalid()),
        };

        let reference = reference.trim();
        let (date_part, time_part) = match reference.find([' ', 'T']) {
            Some(at) => (&reference[..at], reference[at + 1..].trim()),
            None => (reference, ""),
        };
        let date = NaiveDate::parse_from_str(date_part, "%Y-%m-%d").map_err(|_| invalid())?;
        let time_part = time_part.trim_end_matches('Z');
        let time = if time_part.is_empty() {
            NaiveTime::MIN
        } else {
            NaiveTime::parse_from_str(time_part, "%H:%M:%S")
                .or_else(|_| NaiveTime::parse_from_str(time_part, "%H:%M"))
                .map_err(|_| invalid())?
        };

        Ok(Self {
            seconds_per_unit,
            epoch: date.and_time(time),
        })
    }

    /// Calendar date of an offset expressed in these units.
    ///
    /// Non-finite and out-of-range offsets, such as unmasked fill values,
    /// are data errors.
    pub fn date_of(&self, value: f64) -> Result<NaiveDate> {
        let out_of_range = || Cfsv2Error::Data {
            message: format!("time offset {} is outside the calendar", value),
        };

        let seconds = value * self.seconds_per_unit;
        if !seconds.is_finite() || seconds.abs() >= i64::MAX as f64 {
            return Err(out_of_range());
        }
        Duration::try_seconds(seconds.round() as i64)
            .and_then(|offset| self.epoch.checked_add_signed(offset))
            .map(|instant| instant.date())
            .ok_or_else(out_of_range)
    }
}
