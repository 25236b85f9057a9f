use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

use crate::models::holiday::DayKey;

/// A holiday message that went out and is waiting to be retracted.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NotificationRecord {
    pub day_key: DayKey,
    pub channel_id: u64,
    pub message_id: u64,
    pub created_at: DateTime<Utc>,
}

/// A resolved remote message, ready to be deleted.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MessageHandle {
    pub channel_id: u64,
    pub message_id: u64,
}

/// One row of the on-disk sent ledger.
///
/// An entry is both the "already sent" marker for its holiday date and, until
/// `retired` is set, a pending retraction.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LedgerEntry {
    /// UTC date of the holiday the message was sent for. Differs from
    /// `created_at`'s date when a window runs past midnight.
    pub sent_on: NaiveDate,
    pub day_key: DayKey,
    pub channel_id: u64,
    pub message_id: u64,
    pub created_at: DateTime<Utc>,
    /// No deletion is pending any more (deleted, already gone, or given up on).
    #[serde(default)]
    pub retired: bool,
}

impl LedgerEntry {
    pub fn from_record(record: &NotificationRecord, sent_on: NaiveDate) -> Self {
        Self {
            sent_on,
            day_key: record.day_key,
            channel_id: record.channel_id,
            message_id: record.message_id,
            created_at: record.created_at,
            retired: false,
        }
    }

    pub fn to_record(&self) -> NotificationRecord {
        NotificationRecord {
            day_key: self.day_key,
            channel_id: self.channel_id,
            message_id: self.message_id,
            created_at: self.created_at,
        }
    }
}
