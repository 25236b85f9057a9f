// src/tasks/retraction_sweeper.rs

use std::sync::Arc;
use std::time::Duration;

use tokio::task::JoinHandle;
use tokio::time::{sleep, MissedTickBehavior};
use tracing::{debug, info, warn};

use holibot_common::models::{DayKey, NotificationRecord, TransientDeletePolicy};

use crate::cache::NotificationCache;
use crate::config::ConfigStore;
use crate::lifecycle::Lifecycle;
use crate::platforms::{retract_message, MessageChannel};
use crate::repositories::SentLedger;
use crate::ChannelError;

pub const DEFAULT_SWEEP_INTERVAL: Duration = Duration::from_secs(60 * 60);
pub const DEFAULT_DELETE_SPACING: Duration = Duration::from_secs(1);

/// Tally of one sweep.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct SweepReport {
    pub candidates: usize,
    pub retracted: usize,
    /// Message was already deleted (404).
    pub already_gone: usize,
    /// Not allowed to delete, or the channel id is unusable.
    pub forbidden: usize,
    /// Transient failures, whether dropped or kept.
    pub failed: usize,
    /// Transient failures kept for the next sweep.
    pub retained: usize,
}

/// Deletes sent holiday messages once they are older than the configured
/// retention. Holds no state of its own beyond the shared cache.
pub struct RetractionSweeper {
    config: Arc<ConfigStore>,
    cache: Arc<NotificationCache>,
    channel: Arc<dyn MessageChannel>,
    ledger: Option<Arc<dyn SentLedger>>,
    sweep_interval: Duration,
    delete_spacing: Duration,
}

impl RetractionSweeper {
    pub fn new(
        config: Arc<ConfigStore>,
        cache: Arc<NotificationCache>,
        channel: Arc<dyn MessageChannel>,
        sweep_interval: Duration,
    ) -> Self {
        Self {
            config,
            cache,
            channel,
            ledger: None,
            sweep_interval,
            delete_spacing: DEFAULT_DELETE_SPACING,
        }
    }

    pub fn with_ledger(mut self, ledger: Arc<dyn SentLedger>) -> Self {
        self.ledger = Some(ledger);
        self
    }

    /// Pause between successive delete calls within one sweep.
    pub fn with_delete_spacing(mut self, spacing: Duration) -> Self {
        self.delete_spacing = spacing;
        self
    }

    pub fn sweep_interval(&self) -> Duration {
        self.sweep_interval
    }

    pub async fn tick(&self) -> SweepReport {
        let snapshot = self.config.snapshot();
        let candidates = self.cache.sweep_older_than(snapshot.retention);
        let mut report = SweepReport {
            candidates: candidates.len(),
            ..SweepReport::default()
        };
        if candidates.is_empty() {
            debug!("No holiday messages due for deletion.");
            return report;
        }

        info!(
            "Deleting {} holiday message(s) older than {}h",
            candidates.len(),
            snapshot.retention.num_hours()
        );

        for (i, (key, record)) in candidates.into_iter().enumerate() {
            if i > 0 && !self.delete_spacing.is_zero() {
                sleep(self.delete_spacing).await;
            }

            let result =
                retract_message(self.channel.as_ref(), record.channel_id, record.message_id).await;
            let forget = match result {
                Ok(()) => {
                    info!("Deleted holiday message {} for {}", record.message_id, key);
                    report.retracted += 1;
                    true
                }
                Err(ChannelError::NotFound) => {
                    info!("Holiday message {} for {} is already gone", record.message_id, key);
                    report.already_gone += 1;
                    true
                }
                Err(e) if e.is_terminal() => {
                    warn!("Cannot delete holiday message {} for {}: {}", record.message_id, key, e);
                    report.forbidden += 1;
                    true
                }
                Err(e) => {
                    report.failed += 1;
                    match snapshot.transient_delete_policy {
                        TransientDeletePolicy::Drop => {
                            warn!(
                                "Failed to delete holiday message {} for {}: {}; giving up on it.",
                                record.message_id, key, e
                            );
                            true
                        }
                        TransientDeletePolicy::Retain => {
                            warn!(
                                "Failed to delete holiday message {} for {}: {}; will retry next sweep.",
                                record.message_id, key, e
                            );
                            report.retained += 1;
                            false
                        }
                    }
                }
            };

            if forget {
                self.forget(&key, &record);
            }
        }

        report
    }

    fn forget(&self, key: &DayKey, record: &NotificationRecord) {
        // A newer send for the same day key must survive.
        self.cache
            .remove_if(key, |current| current.message_id == record.message_id);
        // The ledger entry stays behind as the sent marker for its date.
        if let Some(ledger) = &self.ledger {
            if let Err(e) = ledger.retire(key, record.message_id) {
                warn!("Could not retire {} in ledger: {}", key, e);
            }
        }
    }
}

/// Spawns the periodic sweep. Waits for readiness, sweeps immediately (to
/// pick up records restored from the ledger), then every `sweep_interval`.
pub fn spawn_retraction_sweeper_task(
    sweeper: Arc<RetractionSweeper>,
    lifecycle: Arc<Lifecycle>,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        tokio::select! {
            _ = lifecycle.wait_until_ready() => {}
            _ = lifecycle.shutdown_requested() => return,
        }

        let mut interval = tokio::time::interval(sweeper.sweep_interval());
        interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
        loop {
            tokio::select! {
                _ = interval.tick() => {}
                _ = lifecycle.shutdown_requested() => break,
            }
            let report = sweeper.tick().await;
            if report.candidates > 0 {
                info!("Retraction sweep => {:?}", report);
            }
        }
        info!("Retraction sweeper stopped.");
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration as ChronoDuration;
    use mockall::predicate::eq;

    use holibot_common::models::MessageHandle;

    use crate::cache::BoundedTimedCache;
    use crate::config::DEFAULT_RELOAD_DEBOUNCE;
    use crate::platforms::MockMessageChannel;
    use crate::test_utils::clock::ManualClock;
    use crate::test_utils::config_source::MemoryConfigSource;
    use crate::utils::time::Clock;

    const CONFIG: &str = r#"{
        "channel_id": 7,
        "message_time_utc": {"hour": 9, "minute": 0},
        "delete_after_hours": 24,
        "holiday_messages": {"12-25": "Merry Christmas!"}
    }"#;

    fn setup(
        channel: MockMessageChannel,
        config: &str,
    ) -> (Arc<ManualClock>, Arc<NotificationCache>, RetractionSweeper) {
        let clock = Arc::new(ManualClock::at("2025-12-25T09:00:00Z"));
        let store = ConfigStore::open(
            MemoryConfigSource::with_contents(config),
            clock.clone(),
            DEFAULT_RELOAD_DEBOUNCE,
        );
        let cache = Arc::new(BoundedTimedCache::new(8, clock.clone()).unwrap());
        let sweeper = RetractionSweeper::new(
            Arc::new(store),
            cache.clone(),
            Arc::new(channel),
            DEFAULT_SWEEP_INTERVAL,
        )
        .with_delete_spacing(Duration::ZERO);
        (clock, cache, sweeper)
    }

    fn record(clock: &ManualClock, message_id: u64) -> (DayKey, NotificationRecord) {
        let key = DayKey::new(12, 25).unwrap();
        (
            key,
            NotificationRecord {
                day_key: key,
                channel_id: 7,
                message_id,
                created_at: clock.now(),
            },
        )
    }

    #[tokio::test]
    async fn test_retention_boundary_scenario() {
        let mut channel = MockMessageChannel::new();
        channel
            .expect_fetch()
            .with(eq(7), eq(900))
            .times(1)
            .returning(|c, m| Ok(MessageHandle { channel_id: c, message_id: m }));
        channel.expect_delete().times(1).returning(|_| Ok(()));

        let (clock, cache, sweeper) = setup(channel, CONFIG);
        let (key, rec) = record(&clock, 900);
        cache.set(key, rec);

        clock.advance(ChronoDuration::hours(23));
        let report = sweeper.tick().await;
        assert_eq!(report, SweepReport::default());
        assert!(cache.contains_key(&key));

        clock.advance(ChronoDuration::hours(2));
        let report = sweeper.tick().await;
        assert_eq!(report.candidates, 1);
        assert_eq!(report.retracted, 1);
        assert!(!cache.contains_key(&key));
    }

    #[tokio::test]
    async fn test_not_found_is_terminal_and_idempotent() {
        let mut channel = MockMessageChannel::new();
        channel
            .expect_fetch()
            .times(2)
            .returning(|_, _| Err(ChannelError::NotFound));
        channel.expect_delete().never();

        let (clock, cache, sweeper) = setup(channel, CONFIG);
        let (key, rec) = record(&clock, 900);

        for _ in 0..2 {
            cache.set(key, rec.clone());
            clock.advance(ChronoDuration::hours(25));
            let report = sweeper.tick().await;
            assert_eq!(report.already_gone, 1);
            assert!(cache.is_empty());
        }
    }

    #[tokio::test]
    async fn test_forbidden_delete_is_dropped() {
        let mut channel = MockMessageChannel::new();
        channel
            .expect_fetch()
            .returning(|c, m| Ok(MessageHandle { channel_id: c, message_id: m }));
        channel
            .expect_delete()
            .times(1)
            .returning(|_| Err(ChannelError::Forbidden("Missing Permissions".into())));

        let (clock, cache, sweeper) = setup(channel, CONFIG);
        let (key, rec) = record(&clock, 900);
        cache.set(key, rec);
        clock.advance(ChronoDuration::hours(25));

        let report = sweeper.tick().await;
        assert_eq!(report.forbidden, 1);
        assert!(cache.is_empty());
    }

    #[tokio::test]
    async fn test_transient_failure_dropped_by_default() {
        let mut channel = MockMessageChannel::new();
        channel
            .expect_fetch()
            .times(1)
            .returning(|_, _| Err(ChannelError::Transient("timeout".into())));

        let (clock, cache, sweeper) = setup(channel, CONFIG);
        let (key, rec) = record(&clock, 900);
        cache.set(key, rec);
        clock.advance(ChronoDuration::hours(25));

        let report = sweeper.tick().await;
        assert_eq!(report.failed, 1);
        assert_eq!(report.retained, 0);
        assert!(cache.is_empty());
    }

    #[tokio::test]
    async fn test_transient_failure_retained_when_configured() {
        let config = CONFIG.replace(
            r#""delete_after_hours": 24,"#,
            r#""delete_after_hours": 24, "retry_transient_deletes": true,"#,
        );
        let mut channel = MockMessageChannel::new();
        let mut attempts = 0;
        channel.expect_fetch().times(2).returning(move |c, m| {
            attempts += 1;
            if attempts == 1 {
                Err(ChannelError::Transient("503".into()))
            } else {
                Ok(MessageHandle { channel_id: c, message_id: m })
            }
        });
        channel.expect_delete().times(1).returning(|_| Ok(()));

        let (clock, cache, sweeper) = setup(channel, &config);
        let (key, rec) = record(&clock, 900);
        cache.set(key, rec);
        clock.advance(ChronoDuration::hours(25));

        let first = sweeper.tick().await;
        assert_eq!((first.failed, first.retained), (1, 1));
        assert!(cache.contains_key(&key));

        let second = sweeper.tick().await;
        assert_eq!(second.retracted, 1);
        assert!(cache.is_empty());
    }
}
