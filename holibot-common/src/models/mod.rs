pub mod config;
pub mod holiday;
pub mod notification;

pub use config::{ConfigDocument, ConfigSnapshot, MessageTime, Revision, TransientDeletePolicy};
pub use holiday::{DayKey, EventCalendar};
pub use notification::{LedgerEntry, MessageHandle, NotificationRecord};
