// File: holibot-core/src/repositories/sent_ledger.rs

use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use tempfile::NamedTempFile;
use tracing::{info, warn};

use holibot_common::models::{DayKey, LedgerEntry};

use crate::repositories::SentLedger;
use crate::Error;

#[derive(Debug, Default, Serialize, Deserialize)]
struct LedgerFile {
    #[serde(default)]
    entries: Vec<LedgerEntry>,
}

/// Sent ledger kept in a small JSON file, rewritten atomically on every change.
pub struct JsonSentLedger {
    path: PathBuf,
    entries: Mutex<Vec<LedgerEntry>>,
}

impl JsonSentLedger {
    /// Opens the ledger. A missing file is an empty ledger; an unreadable or
    /// malformed one is logged and treated as empty.
    pub fn open(path: impl Into<PathBuf>) -> Self {
        let path = path.into();
        let entries = match fs::read(&path) {
            Ok(bytes) => match serde_json::from_slice::<LedgerFile>(&bytes) {
                Ok(file) => {
                    info!("Loaded {} pending record(s) from {}", file.entries.len(), path.display());
                    file.entries
                }
                Err(e) => {
                    warn!("Ignoring malformed ledger {}: {}", path.display(), e);
                    Vec::new()
                }
            },
            Err(e) if e.kind() == io::ErrorKind::NotFound => Vec::new(),
            Err(e) => {
                warn!("Could not read ledger {}: {}", path.display(), e);
                Vec::new()
            }
        };
        Self {
            path,
            entries: Mutex::new(entries),
        }
    }

    fn persist(&self, entries: &[LedgerEntry]) -> Result<(), Error> {
        let dir = self
            .path
            .parent()
            .filter(|p| !p.as_os_str().is_empty())
            .unwrap_or_else(|| Path::new("."));
        fs::create_dir_all(dir)?;

        let mut tmp = NamedTempFile::new_in(dir)?;
        serde_json::to_writer_pretty(
            &mut tmp,
            &LedgerFile {
                entries: entries.to_vec(),
            },
        )?;
        tmp.as_file().sync_all()?;
        tmp.persist(&self.path).map_err(|e| Error::Io(e.error))?;
        Ok(())
    }
}

impl SentLedger for JsonSentLedger {
    fn entries(&self) -> Vec<LedgerEntry> {
        self.entries.lock().clone()
    }

    fn record(&self, entry: LedgerEntry) -> Result<(), Error> {
        let mut entries = self.entries.lock();
        entries.retain(|e| e.day_key != entry.day_key);
        entries.push(entry);
        self.persist(&entries)
    }

    fn retire(&self, day_key: &DayKey, message_id: u64) -> Result<bool, Error> {
        let mut entries = self.entries.lock();
        let Some(entry) = entries
            .iter_mut()
            .find(|e| e.day_key == *day_key && e.message_id == message_id && !e.retired)
        else {
            return Ok(false);
        };
        entry.retired = true;
        self.persist(&entries)?;
        Ok(true)
    }

    fn retain(&self, keep: &mut dyn FnMut(&LedgerEntry) -> bool) -> Result<usize, Error> {
        let mut entries = self.entries.lock();
        let before = entries.len();
        entries.retain(|e| keep(e));
        let removed = before - entries.len();
        if removed > 0 {
            self.persist(&entries)?;
        }
        Ok(removed)
    }
}
