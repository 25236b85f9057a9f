// File: src/repositories/mod.rs

pub mod sent_ledger;

pub use sent_ledger::JsonSentLedger;

use holibot_common::models::{DayKey, LedgerEntry};

use crate::Error;

/// Durable record of holiday messages that were sent.
///
/// Survives restarts so that a restart inside the send window does not send
/// twice and pending retractions are not forgotten. Retracted entries stay
/// as sent markers until the notifier purges them on a later date.
pub trait SentLedger: Send + Sync {
    fn entries(&self) -> Vec<LedgerEntry>;
    /// Adds `entry`, replacing any entry with the same day key.
    fn record(&self, entry: LedgerEntry) -> Result<(), Error>;
    /// Marks the matching entry as no longer awaiting deletion. Returns
    /// whether an entry changed.
    fn retire(&self, day_key: &DayKey, message_id: u64) -> Result<bool, Error>;
    /// Keeps entries for which `keep` is true; returns how many were dropped.
    fn retain(&self, keep: &mut dyn FnMut(&LedgerEntry) -> bool) -> Result<usize, Error>;
}
