use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use chrono::{Datelike, NaiveDate};
use serde::{Deserialize, Deserializer, Serialize, Serializer};

use crate::error::Error;

/// Month + day with no year; events recur annually.
///
/// Written as `"<month>-<day>"` without zero padding (`"12-25"`, `"2-14"`).
/// Parsing also accepts zero-padded input such as `"02-14"`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct DayKey {
    month: u32,
    day: u32,
}

impl DayKey {
    /// Builds a key, validating against a leap year so that `2-29` is accepted.
    pub fn new(month: u32, day: u32) -> Result<Self, Error> {
        if NaiveDate::from_ymd_opt(2000, month, day).is_none() {
            return Err(Error::Parse(format!("invalid day key {month}-{day}")));
        }
        Ok(Self { month, day })
    }

    pub fn from_date(date: NaiveDate) -> Self {
        Self {
            month: date.month(),
            day: date.day(),
        }
    }

    pub fn month(&self) -> u32 {
        self.month
    }

    pub fn day(&self) -> u32 {
        self.day
    }
}

impl fmt::Display for DayKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}-{}", self.month, self.day)
    }
}

impl FromStr for DayKey {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (m, d) = s
            .trim()
            .split_once('-')
            .ok_or_else(|| Error::Parse(format!("day key '{s}' is not <month>-<day>")))?;
        let month = m
            .parse::<u32>()
            .map_err(|_| Error::Parse(format!("bad month in day key '{s}'")))?;
        let day = d
            .parse::<u32>()
            .map_err(|_| Error::Parse(format!("bad day in day key '{s}'")))?;
        DayKey::new(month, day)
    }
}

impl Serialize for DayKey {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for DayKey {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = String::deserialize(deserializer)?;
        raw.parse().map_err(serde::de::Error::custom)
    }
}

/// Day key -> message text. Immutable once loaded.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct EventCalendar {
    events: BTreeMap<DayKey, String>,
}

impl EventCalendar {
    pub fn new(events: BTreeMap<DayKey, String>) -> Self {
        Self { events }
    }

    pub fn message_for(&self, key: &DayKey) -> Option<&str> {
        self.events.get(key).map(String::as_str)
    }

    pub fn contains(&self, key: &DayKey) -> bool {
        self.events.contains_key(key)
    }

    pub fn days(&self) -> impl Iterator<Item = &DayKey> {
        self.events.keys()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&DayKey, &String)> {
        self.events.iter()
    }

    pub fn len(&self) -> usize {
        self.events.len()
    }

    pub fn is_empty(&self) -> bool {
        self.events.is_empty()
    }
}
