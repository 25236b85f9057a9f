pub mod timed_cache;

pub use timed_cache::{BoundedTimedCache, DEFAULT_CACHE_CAPACITY};

use holibot_common::models::{DayKey, NotificationRecord};

/// The cache shape both schedulers share.
pub type NotificationCache = BoundedTimedCache<DayKey, NotificationRecord>;
