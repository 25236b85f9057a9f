// File: holibot-core/tests/scheduling_tests.rs

use std::sync::Arc;
use std::time::Duration;

use chrono::{Datelike, TimeZone, Utc};
use holibot_common::models::{DayKey, NotificationRecord};
use holibot_core::cache::{BoundedTimedCache, NotificationCache};
use holibot_core::config::{ConfigStore, DEFAULT_RELOAD_DEBOUNCE};
use holibot_core::lifecycle::Lifecycle;
use holibot_core::platforms::MessageChannel;
use holibot_core::tasks::retraction_sweeper::DEFAULT_SWEEP_INTERVAL;
use holibot_core::tasks::{
    spawn_holiday_notifier_task, HolidayNotifier, NotifyOutcome, RetractionSweeper,
};
use holibot_core::test_utils::channel::RecordingChannel;
use holibot_core::test_utils::clock::ManualClock;
use holibot_core::test_utils::config_source::MemoryConfigSource;
use holibot_core::Clock;

const CONFIG: &str = r#"{
    "channel_id": 7,
    "message_time_utc": {"hour": 9, "minute": 0},
    "delete_after_hours": 24,
    "holiday_messages": {"12-25": "Merry Christmas!"}
}"#;

type Parts = (Arc<ConfigStore>, Arc<NotificationCache>, Arc<RecordingChannel>);

fn parts(clock: &Arc<ManualClock>) -> anyhow::Result<Parts> {
    let config = Arc::new(ConfigStore::open(
        MemoryConfigSource::with_contents(CONFIG),
        clock.clone(),
        DEFAULT_RELOAD_DEBOUNCE,
    ));
    let cache = Arc::new(BoundedTimedCache::new(8, clock.clone())?);
    Ok((config, cache, Arc::new(RecordingChannel::new())))
}

/// Polls through a whole holiday at a fixed cadence starting from every
/// minute offset; the default window must always catch exactly one poll.
#[tokio::test]
async fn test_default_window_never_skipped() -> anyhow::Result<()> {
    for poll_minutes in [1i64, 5, 7, 15, 60] {
        for offset in 0..poll_minutes {
            let start = Utc.with_ymd_and_hms(2025, 12, 25, 0, 0, 0).unwrap()
                + chrono::Duration::minutes(offset);
            let clock = Arc::new(ManualClock::new(start));
            let (config, cache, channel) = parts(&clock)?;
            let notifier = HolidayNotifier::new(
                config,
                cache,
                channel.clone(),
                clock.clone(),
                Duration::from_secs(poll_minutes as u64 * 60),
            );

            let mut sends = 0;
            while clock.now().day() == 25 {
                if let NotifyOutcome::Sent { .. } = notifier.tick().await {
                    sends += 1;
                }
                clock.advance_minutes(poll_minutes);
            }
            assert_eq!(
                sends, 1,
                "poll every {poll_minutes}m from offset {offset}m sent {sends} times"
            );
            assert_eq!(channel.sent(), vec![(7, "Merry Christmas!".to_string())]);
        }
    }
    Ok(())
}

/// A send time just before midnight: the window runs into the next day and
/// every poll phase still sends exactly once.
#[tokio::test]
async fn test_window_near_midnight_never_skipped() -> anyhow::Result<()> {
    const LATE: &str = r#"{
        "channel_id": 7,
        "message_time_utc": {"hour": 23, "minute": 58},
        "holiday_messages": {"12-25": "Merry Christmas!"}
    }"#;
    let poll_minutes = 5i64;
    for offset in 0..poll_minutes {
        let start = Utc.with_ymd_and_hms(2025, 12, 25, 23, 0, 0).unwrap()
            + chrono::Duration::minutes(offset);
        let end = Utc.with_ymd_and_hms(2025, 12, 26, 1, 0, 0).unwrap();
        let clock = Arc::new(ManualClock::new(start));
        let config = Arc::new(ConfigStore::open(
            MemoryConfigSource::with_contents(LATE),
            clock.clone(),
            DEFAULT_RELOAD_DEBOUNCE,
        ));
        let cache = Arc::new(BoundedTimedCache::new(8, clock.clone())?);
        let channel = Arc::new(RecordingChannel::new());
        let notifier = HolidayNotifier::new(
            config,
            cache,
            channel.clone(),
            clock.clone(),
            Duration::from_secs(poll_minutes as u64 * 60),
        );

        while clock.now() < end {
            notifier.tick().await;
            clock.advance_minutes(poll_minutes);
        }
        assert_eq!(channel.send_count(), 1, "offset {offset}m");
    }
    Ok(())
}

#[tokio::test]
async fn test_send_failure_retried_within_window() -> anyhow::Result<()> {
    let clock = Arc::new(ManualClock::at("2025-12-25T09:00:00Z"));
    let (config, cache, channel) = parts(&clock)?;
    let notifier = HolidayNotifier::new(
        config,
        cache.clone(),
        channel.clone(),
        clock.clone(),
        Duration::from_secs(300),
    );

    channel.fail_next_send(holibot_core::ChannelError::Unavailable);
    assert!(matches!(notifier.tick().await, NotifyOutcome::SendFailed(_)));
    assert!(cache.is_empty());

    clock.advance_minutes(5);
    assert!(matches!(notifier.tick().await, NotifyOutcome::Sent { .. }));
    clock.advance_minutes(1);
    assert_eq!(notifier.tick().await, NotifyOutcome::AlreadySent);
    assert_eq!(channel.send_count(), 1);
    assert_eq!(notifier.sent_today().await, vec![DayKey::new(12, 25)?]);
    Ok(())
}

#[tokio::test(start_paused = true)]
async fn test_notifier_task_waits_for_ready_and_stops() -> anyhow::Result<()> {
    let clock = Arc::new(ManualClock::at("2025-12-25T09:01:00Z"));
    let (config, cache, channel) = parts(&clock)?;
    let notifier = Arc::new(HolidayNotifier::new(
        config,
        cache,
        channel.clone(),
        clock.clone(),
        Duration::from_secs(300),
    ));
    let lifecycle = Arc::new(Lifecycle::new());

    let handle = spawn_holiday_notifier_task(notifier, lifecycle.clone());
    tokio::time::sleep(Duration::from_secs(600)).await;
    assert_eq!(channel.send_count(), 0, "must not send before ready");

    lifecycle.mark_ready();
    tokio::time::sleep(Duration::from_millis(10)).await;
    assert_eq!(channel.send_count(), 1);

    lifecycle.shutdown();
    tokio::time::timeout(Duration::from_secs(1), handle).await??;
    Ok(())
}

#[tokio::test(start_paused = true)]
async fn test_task_exits_if_shutdown_before_ready() -> anyhow::Result<()> {
    let clock = Arc::new(ManualClock::at("2025-12-25T09:01:00Z"));
    let (config, cache, channel) = parts(&clock)?;
    let notifier = Arc::new(HolidayNotifier::new(
        config,
        cache,
        channel.clone(),
        clock,
        Duration::from_secs(300),
    ));
    let lifecycle = Arc::new(Lifecycle::new());

    let handle = spawn_holiday_notifier_task(notifier, lifecycle.clone());
    lifecycle.shutdown();
    tokio::time::timeout(Duration::from_secs(1), handle).await??;
    assert_eq!(channel.send_count(), 0);
    Ok(())
}

#[tokio::test(start_paused = true)]
async fn test_deletes_are_spaced_apart() -> anyhow::Result<()> {
    let clock = Arc::new(ManualClock::at("2025-12-27T12:00:00Z"));
    let (config, cache, channel) = parts(&clock)?;

    let old = clock.now() - chrono::Duration::hours(30);
    for day in [24, 25, 26] {
        let message_id = channel.send(7, "old").await?;
        let key = DayKey::new(12, day)?;
        cache.restore(
            key,
            NotificationRecord {
                day_key: key,
                channel_id: 7,
                message_id,
                created_at: old,
            },
            old,
        );
    }

    let sweeper = RetractionSweeper::new(config, cache.clone(), channel.clone(), DEFAULT_SWEEP_INTERVAL);
    let report = sweeper.tick().await;
    assert_eq!(report.retracted, 3);
    assert!(cache.is_empty());

    let calls = channel.delete_calls();
    assert_eq!(calls.len(), 3);
    for pair in calls.windows(2) {
        assert!(pair[1] - pair[0] >= Duration::from_secs(1));
    }
    Ok(())
}
