//! Recurrence rules for repeating appointments and technician blocks.
//!
//! Rules travel as RFC 5545 `RRULE` strings (`FREQ=WEEKLY;INTERVAL=2;BYDAY=MO,WE`).
//! Only the subset the salon API understands is modelled: `FREQ`, `INTERVAL`,
//! `COUNT`, `UNTIL` and `BYDAY` without ordinal prefixes. Formatting is
//! canonical so a parsed rule always formats back to an equal rule.

use std::{fmt, str::FromStr};

use chrono::{DateTime, Datelike, Days, Duration, NaiveDate, NaiveDateTime, NaiveTime, Utc};
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use thiserror::Error;

use crate::domain::Weekday;

const MAX_EXPANSION_STEPS: usize = 10_000;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RecurrenceError {
    #[error("recurrence rule is empty")]
    Empty,
    #[error("recurrence rule is missing FREQ")]
    MissingFrequency,
    #[error("unsupported frequency '{0}'")]
    UnknownFrequency(String),
    #[error("unsupported rule part '{0}'")]
    UnknownKey(String),
    #[error("rule part '{0}' appears more than once")]
    DuplicateKey(String),
    #[error("invalid value '{value}' for {key}")]
    InvalidValue { key: &'static str, value: String },
    #[error("INTERVAL must be at least 1")]
    ZeroInterval,
    #[error("COUNT must be at least 1")]
    ZeroCount,
    #[error("COUNT and UNTIL cannot both be set")]
    CountAndUntil,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Frequency {
    Daily,
    Weekly,
    Monthly,
    Yearly,
}

impl Frequency {
    pub fn as_str(self) -> &'static str {
        match self {
            Frequency::Daily => "DAILY",
            Frequency::Weekly => "WEEKLY",
            Frequency::Monthly => "MONTHLY",
            Frequency::Yearly => "YEARLY",
        }
    }
}

impl FromStr for Frequency {
    type Err = RecurrenceError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_uppercase().as_str() {
            "DAILY" => Ok(Frequency::Daily),
            "WEEKLY" => Ok(Frequency::Weekly),
            "MONTHLY" => Ok(Frequency::Monthly),
            "YEARLY" => Ok(Frequency::Yearly),
            other => Err(RecurrenceError::UnknownFrequency(other.to_string())),
        }
    }
}

/// End bound of a series. A bare date is inclusive of that whole day.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Until {
    Date(NaiveDate),
    DateTime(DateTime<Utc>),
}

impl Until {
    fn admits(self, occurrence: NaiveDateTime) -> bool {
        match self {
            Until::Date(date) => occurrence.date() <= date,
            Until::DateTime(at) => occurrence <= at.naive_utc(),
        }
    }

    fn parse(value: &str) -> Result<Self, RecurrenceError> {
        let invalid = || RecurrenceError::InvalidValue {
            key: "UNTIL",
            value: value.to_string(),
        };
        if value.len() == 8 {
            return NaiveDate::parse_from_str(value, "%Y%m%d")
                .map(Until::Date)
                .map_err(|_| invalid());
        }
        let raw = value.strip_suffix('Z').ok_or_else(invalid)?;
        NaiveDateTime::parse_from_str(raw, "%Y%m%dT%H%M%S")
            .map(|at| Until::DateTime(at.and_utc()))
            .map_err(|_| invalid())
    }
}

impl fmt::Display for Until {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Until::Date(date) => write!(f, "{}", date.format("%Y%m%d")),
            Until::DateTime(at) => write!(f, "{}", at.format("%Y%m%dT%H%M%SZ")),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecurrenceRule {
    freq: Frequency,
    interval: u32,
    count: Option<u32>,
    until: Option<Until>,
    by_day: Vec<Weekday>,
}

impl RecurrenceRule {
    pub fn new(freq: Frequency) -> Self {
        Self {
            freq,
            interval: 1,
            count: None,
            until: None,
            by_day: Vec::new(),
        }
    }

    pub fn weekly() -> Self {
        Self::new(Frequency::Weekly)
    }

    pub fn with_interval(mut self, interval: u32) -> Result<Self, RecurrenceError> {
        if interval == 0 {
            return Err(RecurrenceError::ZeroInterval);
        }
        self.interval = interval;
        Ok(self)
    }

    pub fn with_count(mut self, count: u32) -> Result<Self, RecurrenceError> {
        if count == 0 {
            return Err(RecurrenceError::ZeroCount);
        }
        if self.until.is_some() {
            return Err(RecurrenceError::CountAndUntil);
        }
        self.count = Some(count);
        Ok(self)
    }

    pub fn with_until(mut self, until: Until) -> Result<Self, RecurrenceError> {
        if self.count.is_some() {
            return Err(RecurrenceError::CountAndUntil);
        }
        self.until = Some(until);
        Ok(self)
    }

    pub fn with_by_day(mut self, days: impl IntoIterator<Item = Weekday>) -> Self {
        let mut days: Vec<Weekday> = days.into_iter().collect();
        days.sort();
        days.dedup();
        self.by_day = days;
        self
    }

    pub fn freq(&self) -> Frequency {
        self.freq
    }

    pub fn interval(&self) -> u32 {
        self.interval
    }

    pub fn count(&self) -> Option<u32> {
        self.count
    }

    pub fn until(&self) -> Option<Until> {
        self.until
    }

    pub fn by_day(&self) -> &[Weekday] {
        &self.by_day
    }

    /// Local preview of the first `limit` occurrence start times, beginning at `start`.
    ///
    /// The API expands the authoritative series; this is used to show the user
    /// what a rule means before it is saved.
    pub fn occurrences(&self, start: NaiveDateTime, limit: usize) -> Vec<NaiveDateTime> {
        let max = self
            .count
            .map(|count| (count as usize).min(limit))
            .unwrap_or(limit);
        let mut out = Vec::with_capacity(max.min(64));
        let time = start.time();
        let interval = i64::from(self.interval);

        let push = |date: NaiveDate, out: &mut Vec<NaiveDateTime>| -> bool {
            let at = date.and_time(time);
            if at < start {
                return true;
            }
            if let Some(until) = self.until {
                if !until.admits(at) {
                    return false;
                }
            }
            out.push(at);
            out.len() < max
        };

        if max == 0 {
            return out;
        }

        match self.freq {
            Frequency::Daily => {
                for step in 0..MAX_EXPANSION_STEPS as i64 {
                    let Some(date) = step
                        .checked_mul(interval)
                        .and_then(Duration::try_days)
                        .and_then(|offset| start.date().checked_add_signed(offset))
                    else {
                        break;
                    };
                    if !push(date, &mut out) {
                        break;
                    }
                }
            }
            Frequency::Weekly => {
                let days = if self.by_day.is_empty() {
                    vec![Weekday::of(start.date())]
                } else {
                    self.by_day.clone()
                };
                let back = Days::new(u64::from(start.date().weekday().num_days_from_monday()));
                let Some(week_start) = start.date().checked_sub_days(back) else {
                    return out;
                };
                'weeks: for step in 0..MAX_EXPANSION_STEPS as i64 {
                    let Some(monday) = step
                        .checked_mul(interval)
                        .and_then(Duration::try_weeks)
                        .and_then(|offset| week_start.checked_add_signed(offset))
                    else {
                        break;
                    };
                    for day in &days {
                        let Some(date) =
                            monday.checked_add_days(Days::new(day_offset(*day) as u64))
                        else {
                            break 'weeks;
                        };
                        if !push(date, &mut out) {
                            break 'weeks;
                        }
                    }
                }
            }
            Frequency::Monthly => {
                let anchor = start.date();
                for step in 0..MAX_EXPANSION_STEPS as i64 {
                    let months = anchor.month0() as i64 + step * interval;
                    let month = months.rem_euclid(12) as u32 + 1;
                    let Ok(year) = i32::try_from(anchor.year() as i64 + months.div_euclid(12))
                    else {
                        break;
                    };
                    if year > NaiveDate::MAX.year() {
                        break;
                    }
                    let Some(date) = NaiveDate::from_ymd_opt(year, month, anchor.day()) else {
                        continue;
                    };
                    if !push(date, &mut out) {
                        break;
                    }
                }
            }
            Frequency::Yearly => {
                let anchor = start.date();
                for step in 0..MAX_EXPANSION_STEPS as i64 {
                    let Ok(year) = i32::try_from(anchor.year() as i64 + step * interval) else {
                        break;
                    };
                    if year > NaiveDate::MAX.year() {
                        break;
                    }
                    let Some(date) = NaiveDate::from_ymd_opt(year, anchor.month(), anchor.day())
                    else {
                        continue;
                    };
                    if !push(date, &mut out) {
                        break;
                    }
                }
            }
        }

        out
    }

    /// Convenience for previews that start at midnight.
    pub fn occurrences_from_date(&self, start: NaiveDate, limit: usize) -> Vec<NaiveDateTime> {
        self.occurrences(start.and_time(NaiveTime::MIN), limit)
    }
}

fn day_offset(day: Weekday) -> i64 {
    Weekday::ALL
        .iter()
        .position(|candidate| *candidate == day)
        .unwrap_or_default() as i64
}

fn day_code(day: Weekday) -> &'static str {
    match day {
        Weekday::Monday => "MO",
        Weekday::Tuesday => "TU",
        Weekday::Wednesday => "WE",
        Weekday::Thursday => "TH",
        Weekday::Friday => "FR",
        Weekday::Saturday => "SA",
        Weekday::Sunday => "SU",
    }
}

fn parse_day_code(code: &str) -> Option<Weekday> {
    Weekday::ALL
        .into_iter()
        .find(|day| day_code(*day).eq_ignore_ascii_case(code.trim()))
}

impl fmt::Display for RecurrenceRule {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "FREQ={}", self.freq.as_str())?;
        if self.interval != 1 {
            write!(f, ";INTERVAL={}", self.interval)?;
        }
        if let Some(count) = self.count {
            write!(f, ";COUNT={count}")?;
        }
        if let Some(until) = self.until {
            write!(f, ";UNTIL={until}")?;
        }
        if !self.by_day.is_empty() {
            let days: Vec<&str> = self.by_day.iter().map(|day| day_code(*day)).collect();
            write!(f, ";BYDAY={}", days.join(","))?;
        }
        Ok(())
    }
}

impl FromStr for RecurrenceRule {
    type Err = RecurrenceError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let trimmed = s.trim();
        let body = trimmed
            .strip_prefix("RRULE:")
            .or_else(|| trimmed.strip_prefix("rrule:"))
            .unwrap_or(trimmed);
        if body.is_empty() {
            return Err(RecurrenceError::Empty);
        }

        let mut freq = None;
        let mut interval = None;
        let mut count = None;
        let mut until = None;
        let mut by_day = None;

        for part in body.split(';').filter(|part| !part.trim().is_empty()) {
            let (key, value) = part.split_once('=').ok_or_else(|| {
                RecurrenceError::UnknownKey(part.trim().to_string())
            })?;
            let key = key.trim().to_ascii_uppercase();
            let value = value.trim();
            match key.as_str() {
                "FREQ" => set_once(&mut freq, &key, value.parse::<Frequency>()?)?,
                "INTERVAL" => {
                    let parsed = parse_number("INTERVAL", value)?;
                    if parsed == 0 {
                        return Err(RecurrenceError::ZeroInterval);
                    }
                    set_once(&mut interval, &key, parsed)?;
                }
                "COUNT" => {
                    let parsed = parse_number("COUNT", value)?;
                    if parsed == 0 {
                        return Err(RecurrenceError::ZeroCount);
                    }
                    set_once(&mut count, &key, parsed)?;
                }
                "UNTIL" => set_once(&mut until, &key, Until::parse(value)?)?,
                "BYDAY" => {
                    let days = value
                        .split(',')
                        .map(|code| {
                            parse_day_code(code).ok_or_else(|| RecurrenceError::InvalidValue {
                                key: "BYDAY",
                                value: code.to_string(),
                            })
                        })
                        .collect::<Result<Vec<_>, _>>()?;
                    set_once(&mut by_day, &key, days)?;
                }
                _ => return Err(RecurrenceError::UnknownKey(key)),
            }
        }

        let freq = freq.ok_or(RecurrenceError::MissingFrequency)?;
        if count.is_some() && until.is_some() {
            return Err(RecurrenceError::CountAndUntil);
        }

        Ok(RecurrenceRule {
            freq,
            interval: interval.unwrap_or(1),
            count,
            until,
            by_day: Vec::new(),
        }
        .with_by_day(by_day.unwrap_or_default()))
    }
}

fn set_once<T>(slot: &mut Option<T>, key: &str, value: T) -> Result<(), RecurrenceError> {
    if slot.is_some() {
        return Err(RecurrenceError::DuplicateKey(key.to_string()));
    }
    *slot = Some(value);
    Ok(())
}

fn parse_number(key: &'static str, value: &str) -> Result<u32, RecurrenceError> {
    value.parse::<u32>().map_err(|_| RecurrenceError::InvalidValue {
        key,
        value: value.to_string(),
    })
}

impl Serialize for RecurrenceRule {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for RecurrenceRule {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        let raw = String::deserialize(deserializer)?;
        raw.parse().map_err(serde::de::Error::custom)
    }
}

#[cfg(test)]
#[path = "tests/recurrence_tests.rs"]
mod tests;
