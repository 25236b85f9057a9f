use std::collections::BTreeMap;
use std::fmt;
use std::time::SystemTime;

use chrono::{DateTime, Duration, NaiveDate, Utc};
use serde::de::{self, MapAccess, Visitor};
use serde::{Deserialize, Deserializer, Serialize};

use crate::error::Error;
use crate::models::holiday::{DayKey, EventCalendar};

pub const DEFAULT_SEND_HOUR: u32 = 22;
pub const DEFAULT_SEND_MINUTE: u32 = 0;
pub const DEFAULT_DELETE_AFTER_HOURS: u64 = 24;

/// Send time of day, UTC.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct MessageTime {
    pub hour: u32,
    #[serde(default)]
    pub minute: u32,
}

impl Default for MessageTime {
    fn default() -> Self {
        Self {
            hour: DEFAULT_SEND_HOUR,
            minute: DEFAULT_SEND_MINUTE,
        }
    }
}

impl MessageTime {
    /// The instant this time falls on for the given UTC date.
    pub fn on(&self, date: NaiveDate) -> Option<DateTime<Utc>> {
        date.and_hms_opt(self.hour, self.minute, 0).map(|dt| dt.and_utc())
    }
}

/// What the retraction sweeper does with a record whose delete failed transiently.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum TransientDeletePolicy {
    /// Forget the record. Keeps the cache small; the message may stay up.
    #[default]
    Drop,
    /// Keep the record so the next sweep tries again.
    Retain,
}

/// Revision marker of the config source. Two markers differ if either the
/// modification time or the byte length changed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Revision {
    pub modified: SystemTime,
    pub len: u64,
}

/// On-disk shape of the config file.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConfigDocument {
    #[serde(default, deserialize_with = "deserialize_snowflake")]
    pub channel_id: u64,

    #[serde(default)]
    pub message_time_utc: MessageTime,

    #[serde(default = "default_delete_after_hours")]
    pub delete_after_hours: u64,

    #[serde(default, deserialize_with = "deserialize_calendar")]
    pub holiday_messages: BTreeMap<DayKey, String>,

    /// Width of the send window. Falls back to twice the poll interval.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub send_window_minutes: Option<u32>,

    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub retry_transient_deletes: bool,
}

fn default_delete_after_hours() -> u64 {
    DEFAULT_DELETE_AFTER_HOURS
}

/// Discord ids are often pasted as strings; accept either form.
fn deserialize_snowflake<'de, D: Deserializer<'de>>(deserializer: D) -> Result<u64, D::Error> {
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Snowflake {
        Num(u64),
        Str(String),
    }

    match Snowflake::deserialize(deserializer)? {
        Snowflake::Num(n) => Ok(n),
        Snowflake::Str(s) => s.trim().parse().map_err(de::Error::custom),
    }
}

/// "2-14" and "02-14" name the same day; a file listing both is rejected.
fn deserialize_calendar<'de, D: Deserializer<'de>>(
    deserializer: D,
) -> Result<BTreeMap<DayKey, String>, D::Error> {
    struct CalendarVisitor;

    impl<'de> Visitor<'de> for CalendarVisitor {
        type Value = BTreeMap<DayKey, String>;

        fn expecting(&self, f: &mut fmt::Formatter) -> fmt::Result {
            f.write_str("a map of \"M-D\" day keys to messages")
        }

        fn visit_map<A: MapAccess<'de>>(self, mut map: A) -> Result<Self::Value, A::Error> {
            let mut events = BTreeMap::new();
            while let Some((key, text)) = map.next_entry::<DayKey, String>()? {
                if events.insert(key, text).is_some() {
                    return Err(de::Error::custom(format!("duplicate day key {key}")));
                }
            }
            Ok(events)
        }
    }

    deserializer.deserialize_map(CalendarVisitor)
}

impl Default for ConfigDocument {
    fn default() -> Self {
        let mut holiday_messages = BTreeMap::new();
        if let Ok(key) = DayKey::new(2, 14) {
            holiday_messages.insert(key, "Happy Valentine's Day! ❤️".to_string());
        }
        if let Ok(key) = DayKey::new(12, 25) {
            holiday_messages.insert(key, "Merry Christmas! 🎄".to_string());
        }
        Self {
            channel_id: 0,
            message_time_utc: MessageTime::default(),
            delete_after_hours: DEFAULT_DELETE_AFTER_HOURS,
            holiday_messages,
            send_window_minutes: None,
            retry_transient_deletes: false,
        }
    }
}

/// Validated, immutable view of the config. A reload replaces the whole value.
#[derive(Debug, Clone, PartialEq)]
pub struct ConfigSnapshot {
    /// 0 means "not configured"; sends fail with `InvalidChannel`.
    pub channel_id: u64,
    pub send_time: MessageTime,
    pub retention: Duration,
    pub calendar: EventCalendar,
    pub send_window: Option<Duration>,
    pub transient_delete_policy: TransientDeletePolicy,
    pub revision: Option<Revision>,
}

impl ConfigSnapshot {
    pub fn from_document(doc: ConfigDocument, revision: Option<Revision>) -> Result<Self, Error> {
        let MessageTime { hour, minute } = doc.message_time_utc;
        if hour > 23 || minute > 59 {
            return Err(Error::Config(format!(
                "message_time_utc {hour:02}:{minute:02} is not a valid time of day"
            )));
        }

        if doc.delete_after_hours == 0 {
            return Err(Error::Config("delete_after_hours must be at least 1".into()));
        }
        let retention = i64::try_from(doc.delete_after_hours)
            .ok()
            .and_then(Duration::try_hours)
            .ok_or_else(|| {
                Error::Config(format!("delete_after_hours {} is too large", doc.delete_after_hours))
            })?;

        let send_window = match doc.send_window_minutes {
            None => None,
            Some(0) => return Err(Error::Config("send_window_minutes must be at least 1".into())),
            Some(m) if m >= 24 * 60 => {
                return Err(Error::Config(format!("send_window_minutes {m} exceeds a day")));
            }
            Some(m) => Some(Duration::minutes(i64::from(m))),
        };

        let transient_delete_policy = if doc.retry_transient_deletes {
            TransientDeletePolicy::Retain
        } else {
            TransientDeletePolicy::Drop
        };

        Ok(Self {
            channel_id: doc.channel_id,
            send_time: doc.message_time_utc,
            retention,
            calendar: EventCalendar::new(doc.holiday_messages),
            send_window,
            transient_delete_policy,
            revision,
        })
    }

    pub fn builtin_default() -> Self {
        let doc = ConfigDocument::default();
        Self {
            channel_id: doc.channel_id,
            send_time: doc.message_time_utc,
            retention: Duration::hours(DEFAULT_DELETE_AFTER_HOURS as i64),
            calendar: EventCalendar::new(doc.holiday_messages),
            send_window: None,
            transient_delete_policy: TransientDeletePolicy::Drop,
            revision: None,
        }
    }

    pub fn to_document(&self) -> ConfigDocument {
        ConfigDocument {
            channel_id: self.channel_id,
            message_time_utc: self.send_time,
            delete_after_hours: self.retention.num_hours().max(1) as u64,
            holiday_messages: self
                .calendar
                .iter()
                .map(|(k, v)| (*k, v.clone()))
                .collect(),
            send_window_minutes: self.send_window.map(|w| w.num_minutes() as u32),
            retry_transient_deletes: self.transient_delete_policy == TransientDeletePolicy::Retain,
        }
    }
}
