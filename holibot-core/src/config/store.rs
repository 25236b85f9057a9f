// File: holibot-core/src/config/store.rs

use std::collections::BTreeSet;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use parking_lot::Mutex;
use tracing::{debug, error, info, warn};

use holibot_common::models::{ConfigDocument, ConfigSnapshot, DayKey, Revision};

use crate::config::source::ConfigSource;
use crate::utils::time::Clock;
use crate::Error;

pub const DEFAULT_RELOAD_DEBOUNCE: Duration = Duration::from_secs(5 * 60);

struct StoreState {
    snapshot: Arc<ConfigSnapshot>,
    event_days: Arc<BTreeSet<DayKey>>,
    last_check: Option<Instant>,
    /// Last revision we looked at, good or bad. A broken file is only
    /// re-parsed once it changes again.
    last_seen: Option<Revision>,
    generation: u64,
}

/// Hot-reloadable holder of the current [`ConfigSnapshot`].
///
/// `snapshot()` never fails. It reloads only when the debounce interval has
/// passed since the last revision check *and* the source's revision changed.
/// Any failure keeps serving the last good snapshot (or the built-in default).
pub struct ConfigStore {
    source: Box<dyn ConfigSource>,
    clock: Arc<dyn Clock>,
    debounce: Duration,
    state: Mutex<StoreState>,
    revision_checks: AtomicU64,
}

impl ConfigStore {
    pub fn open(
        source: impl ConfigSource + 'static,
        clock: Arc<dyn Clock>,
        debounce: Duration,
    ) -> Self {
        let default = Arc::new(ConfigSnapshot::builtin_default());
        let store = Self {
            source: Box::new(source),
            clock,
            debounce,
            state: Mutex::new(StoreState {
                event_days: Arc::new(default.calendar.days().copied().collect()),
                snapshot: default,
                last_check: None,
                last_seen: None,
                generation: 0,
            }),
            revision_checks: AtomicU64::new(0),
        };
        store.first_load();
        store
    }

    fn first_load(&self) {
        let mut state = self.state.lock();
        self.revision_checks.fetch_add(1, Ordering::Relaxed);
        state.last_check = Some(self.clock.instant());

        match self.source.revision() {
            Ok(Some(rev)) => self.reload_from(&mut state, rev),
            Ok(None) => {
                info!(
                    "No config found at {}; writing defaults.",
                    self.source.describe()
                );
                if let Err(e) = self.write_default() {
                    error!("Failed to write default config to {}: {}", self.source.describe(), e);
                    return;
                }
                // Remember what we just wrote so it is not re-parsed on the next check.
                match self.source.revision() {
                    Ok(rev) => state.last_seen = rev,
                    Err(e) => debug!("Could not stat freshly written config: {}", e),
                }
            }
            Err(e) => {
                error!(
                    "Could not stat config at {}: {}. Using built-in defaults.",
                    self.source.describe(),
                    e
                );
            }
        }
    }

    fn write_default(&self) -> Result<(), Error> {
        let bytes = serde_json::to_vec_pretty(&ConfigDocument::default())?;
        self.source.write(&bytes)?;
        Ok(())
    }

    fn load(&self, rev: Revision) -> Result<ConfigSnapshot, Error> {
        let bytes = self.source.read()?;
        let doc: ConfigDocument = serde_json::from_slice(&bytes)?;
        ConfigSnapshot::from_document(doc, Some(rev))
    }

    fn reload_from(&self, state: &mut StoreState, rev: Revision) {
        state.last_seen = Some(rev);
        match self.load(rev) {
            Ok(snapshot) => self.install(state, snapshot),
            Err(e) => warn!(
                "Failed loading config from {}: {}. Keeping previous config.",
                self.source.describe(),
                e
            ),
        }
    }

    fn install(&self, state: &mut StoreState, snapshot: ConfigSnapshot) {
        if snapshot.channel_id == 0 {
            warn!("Config has no channel_id set; holiday messages cannot be delivered.");
        }
        info!(
            "Loaded config: {} holiday(s), send at {:02}:{:02} UTC, delete after {}h",
            snapshot.calendar.len(),
            snapshot.send_time.hour,
            snapshot.send_time.minute,
            snapshot.retention.num_hours()
        );
        state.event_days = Arc::new(snapshot.calendar.days().copied().collect());
        state.snapshot = Arc::new(snapshot);
        state.generation += 1;
    }

    fn check_source(&self, state: &mut StoreState) {
        self.revision_checks.fetch_add(1, Ordering::Relaxed);
        state.last_check = Some(self.clock.instant());

        match self.source.revision() {
            Ok(Some(rev)) if state.last_seen == Some(rev) => {
                debug!("Config unchanged.");
            }
            Ok(Some(rev)) => self.reload_from(state, rev),
            Ok(None) => {
                if state.last_seen.take().is_some() {
                    warn!(
                        "Config at {} disappeared; keeping previous config.",
                        self.source.describe()
                    );
                }
            }
            Err(e) => warn!(
                "Could not stat config at {}: {}. Keeping previous config.",
                self.source.describe(),
                e
            ),
        }
    }

    /// Current snapshot, reloading first if the debounce has elapsed and the
    /// source changed.
    pub fn snapshot(&self) -> Arc<ConfigSnapshot> {
        let mut state = self.state.lock();
        let due = match state.last_check {
            None => true,
            Some(at) => self.clock.instant().saturating_duration_since(at) > self.debounce,
        };
        if due {
            self.check_source(&mut state);
        }
        state.snapshot.clone()
    }

    /// Checks the source now, ignoring the debounce.
    pub fn force_reload(&self) -> Arc<ConfigSnapshot> {
        let mut state = self.state.lock();
        self.check_source(&mut state);
        state.snapshot.clone()
    }

    /// Current snapshot without touching the source.
    pub fn current(&self) -> Arc<ConfigSnapshot> {
        self.state.lock().snapshot.clone()
    }

    /// Day keys that have an event. Rebuilt only when a reload replaces the snapshot.
    pub fn event_days(&self) -> Arc<BTreeSet<DayKey>> {
        self.state.lock().event_days.clone()
    }

    /// Bumped each time a reload replaces the snapshot.
    pub fn generation(&self) -> u64 {
        self.state.lock().generation
    }

    pub fn revision_checks(&self) -> u64 {
        self.revision_checks.load(Ordering::Relaxed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_utils::clock::ManualClock;
    use crate::test_utils::config_source::MemoryConfigSource;

    const XMAS: &str = r#"{
        "channel_id": 7,
        "message_time_utc": {"hour": 9, "minute": 0},
        "delete_after_hours": 24,
        "holiday_messages": {"12-25": "Merry Christmas!"}
    }"#;

    fn clock() -> Arc<ManualClock> {
        Arc::new(ManualClock::at("2025-12-25T08:00:00Z"))
    }

    #[test]
    fn test_missing_source_writes_default() {
        let source = MemoryConfigSource::empty();
        let store = ConfigStore::open(source.clone(), clock(), DEFAULT_RELOAD_DEBOUNCE);

        assert_eq!(*store.snapshot(), ConfigSnapshot::builtin_default());
        let written = source.contents().expect("default should be written");
        let doc: ConfigDocument = serde_json::from_slice(&written).unwrap();
        assert_eq!(doc, ConfigDocument::default());
    }

    #[test]
    fn test_failed_default_write_still_serves_default() {
        let source = MemoryConfigSource::empty();
        source.fail_writes(true);
        let store = ConfigStore::open(source.clone(), clock(), DEFAULT_RELOAD_DEBOUNCE);

        assert!(source.contents().is_none());
        assert_eq!(store.snapshot().calendar.len(), 2);
    }

    #[test]
    fn test_malformed_first_load_uses_default() {
        let source = MemoryConfigSource::with_contents("{ not json");
        let store = ConfigStore::open(source, clock(), DEFAULT_RELOAD_DEBOUNCE);
        assert_eq!(*store.snapshot(), ConfigSnapshot::builtin_default());
        assert_eq!(store.generation(), 0);
    }

    #[test]
    fn test_debounce_limits_revision_checks() {
        let clock = clock();
        let source = MemoryConfigSource::with_contents(XMAS);
        let store = ConfigStore::open(source.clone(), clock.clone(), Duration::from_secs(300));
        let after_open = source.revision_calls();

        for _ in 0..50 {
            store.snapshot();
            clock.advance_secs(5);
        }
        // 250s elapsed: still inside the debounce window.
        assert_eq!(source.revision_calls(), after_open);

        clock.advance_secs(60);
        for _ in 0..50 {
            store.snapshot();
        }
        assert_eq!(source.revision_calls(), after_open + 1);
        assert_eq!(store.revision_checks(), 2);
    }

    #[test]
    fn test_reload_picks_up_changes_after_debounce() {
        let clock = clock();
        let source = MemoryConfigSource::with_contents(XMAS);
        let store = ConfigStore::open(source.clone(), clock.clone(), Duration::from_secs(300));
        assert_eq!(store.snapshot().channel_id, 7);
        assert_eq!(store.generation(), 1);

        source.replace(&XMAS.replace("\"channel_id\": 7", "\"channel_id\": 99"));
        assert_eq!(store.snapshot().channel_id, 7, "debounce should hide the change");

        clock.advance_secs(301);
        assert_eq!(store.snapshot().channel_id, 99);
        assert_eq!(store.generation(), 2);
    }

    #[test]
    fn test_unchanged_revision_does_not_replace_snapshot() {
        let clock = clock();
        let source = MemoryConfigSource::with_contents(XMAS);
        let store = ConfigStore::open(source, clock.clone(), Duration::from_secs(1));
        let before = store.snapshot();
        let days_before = store.event_days();

        for _ in 0..5 {
            clock.advance_secs(2);
            store.snapshot();
        }
        assert_eq!(store.generation(), 1);
        assert!(Arc::ptr_eq(&before, &store.snapshot()));
        assert!(Arc::ptr_eq(&days_before, &store.event_days()));
    }

    #[test]
    fn test_malformed_reload_keeps_last_good() {
        let clock = clock();
        let source = MemoryConfigSource::with_contents(XMAS);
        let store = ConfigStore::open(source.clone(), clock.clone(), Duration::from_secs(1));

        source.replace(r#"{"message_time_utc": {"hour": 99}}"#);
        clock.advance_secs(2);
        let snap = store.snapshot();
        assert_eq!(snap.channel_id, 7);
        assert_eq!(store.generation(), 1);

        // Same broken revision is not re-read.
        let reads = source.read_calls();
        clock.advance_secs(2);
        store.snapshot();
        assert_eq!(source.read_calls(), reads);
    }

    #[test]
    fn test_deleted_source_keeps_last_good() {
        let clock = clock();
        let source = MemoryConfigSource::with_contents(XMAS);
        let store = ConfigStore::open(source.clone(), clock.clone(), Duration::from_secs(1));

        source.delete();
        clock.advance_secs(2);
        assert_eq!(store.snapshot().channel_id, 7);

        // Coming back with the same bytes is still a new revision.
        source.replace(XMAS);
        clock.advance_secs(2);
        assert_eq!(store.snapshot().channel_id, 7);
        assert_eq!(store.generation(), 2);
    }

    #[test]
    fn test_force_reload_skips_debounce() {
        let source = MemoryConfigSource::with_contents(XMAS);
        let store = ConfigStore::open(source.clone(), clock(), Duration::from_secs(300));
        source.replace(&XMAS.replace("Merry Christmas!", "Ho ho ho"));

        let snap = store.force_reload();
        let key = DayKey::new(12, 25).unwrap();
        assert_eq!(snap.calendar.message_for(&key), Some("Ho ho ho"));
    }
}
