// src/tasks/holiday_notifier.rs

use std::collections::BTreeSet;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, NaiveDate, Utc};
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::{debug, error, info, warn};

use holibot_common::models::{ConfigSnapshot, DayKey, LedgerEntry, NotificationRecord};

use crate::cache::NotificationCache;
use crate::config::ConfigStore;
use crate::lifecycle::Lifecycle;
use crate::platforms::MessageChannel;
use crate::repositories::SentLedger;
use crate::utils::time::{to_chrono, Clock};
use crate::ChannelError;

pub const DEFAULT_NOTIFY_INTERVAL: Duration = Duration::from_secs(5 * 60);

/// What a single holiday check decided.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum NotifyOutcome {
    /// Today has no holiday.
    NoEvent,
    /// Today's message already went out.
    AlreadySent,
    BeforeWindow,
    /// The window closed without a successful send.
    MissedWindow,
    Sent { message_id: u64 },
    /// Left unmarked, so the next poll inside the window retries.
    SendFailed(ChannelError),
}

/// Where `now` falls relative to one holiday date's window.
enum Due {
    NoEvent,
    AlreadySent,
    Before,
    Closed {
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    },
    Open(String),
}

#[derive(Default)]
struct NotifierState {
    /// `None` until the ledger has been restored.
    current_date: Option<NaiveDate>,
    /// Holiday dates whose message went out. Only today and yesterday are
    /// kept, since yesterday's window may run past midnight.
    sent: BTreeSet<NaiveDate>,
    /// Holiday dates whose missed window has been reported.
    missed: BTreeSet<NaiveDate>,
}

/// Decides when a holiday message goes out and sends it at most once per
/// holiday date.
///
/// The send window for a date is `[send_time, send_time + tolerance)`, where
/// tolerance is the config's `send_window_minutes` or, if unset, twice the
/// poll interval, so no poll gap can straddle the whole window. A window may
/// run past midnight; after midnight the previous date's event is still
/// checked until its window closes.
pub struct HolidayNotifier {
    config: Arc<ConfigStore>,
    cache: Arc<NotificationCache>,
    channel: Arc<dyn MessageChannel>,
    clock: Arc<dyn Clock>,
    ledger: Option<Arc<dyn SentLedger>>,
    poll_interval: Duration,
    state: Mutex<NotifierState>,
    /// Config generation whose window we last sanity-checked.
    checked_generation: AtomicU64,
}

impl HolidayNotifier {
    pub fn new(
        config: Arc<ConfigStore>,
        cache: Arc<NotificationCache>,
        channel: Arc<dyn MessageChannel>,
        clock: Arc<dyn Clock>,
        poll_interval: Duration,
    ) -> Self {
        Self {
            config,
            cache,
            channel,
            clock,
            ledger: None,
            poll_interval,
            state: Mutex::new(NotifierState::default()),
            checked_generation: AtomicU64::new(u64::MAX),
        }
    }

    pub fn with_ledger(mut self, ledger: Arc<dyn SentLedger>) -> Self {
        self.ledger = Some(ledger);
        self
    }

    pub fn poll_interval(&self) -> Duration {
        self.poll_interval
    }

    pub fn tolerance(&self, snapshot: &ConfigSnapshot) -> chrono::Duration {
        snapshot
            .send_window
            .unwrap_or_else(|| to_chrono(self.poll_interval) * 2)
    }

    /// Send window for the holiday on `date`.
    pub fn window(
        &self,
        snapshot: &ConfigSnapshot,
        date: NaiveDate,
    ) -> Option<(DateTime<Utc>, DateTime<Utc>)> {
        let start = snapshot.send_time.on(date)?;
        Some((start, start + self.tolerance(snapshot)))
    }

    /// Day keys marked as sent for the current date.
    pub async fn sent_today(&self) -> Vec<DayKey> {
        let state = self.state.lock().await;
        state
            .sent
            .iter()
            .filter(|date| Some(**date) == state.current_date)
            .map(|date| DayKey::from_date(*date))
            .collect()
    }

    /// Re-seeds the cache and the sent markers from the ledger and returns
    /// how many pending retractions came back. Runs once; the first `tick`
    /// does it if nobody called it earlier.
    pub async fn restore(&self) -> usize {
        let mut state = self.state.lock().await;
        if state.current_date.is_some() {
            return 0;
        }
        self.restore_locked(&mut state)
    }

    fn restore_locked(&self, state: &mut NotifierState) -> usize {
        let today = self.clock.now().date_naive();
        state.current_date = Some(today);
        let Some(ledger) = &self.ledger else {
            return 0;
        };
        let horizon = today.pred_opt().unwrap_or(today);

        let entries = ledger.entries();
        let mut pending = 0;
        for entry in &entries {
            if entry.sent_on >= horizon {
                state.sent.insert(entry.sent_on);
            }
            if entry.retired {
                continue;
            }
            pending += 1;
            let evicted = self
                .cache
                .restore(entry.day_key, entry.to_record(), entry.created_at);
            if let Some((key, record)) = evicted {
                self.drop_evicted(key, record);
            }
        }
        if !entries.is_empty() {
            info!(
                "Restored {} ledger entr(y/ies); {} awaiting deletion.",
                entries.len(),
                pending
            );
        }
        pending
    }

    /// One poll. Never fails; expected conditions come back as outcomes.
    pub async fn tick(&self) -> NotifyOutcome {
        let now = self.clock.now();
        let today = now.date_naive();
        let mut state = self.state.lock().await;

        let current_date = state.current_date;
        match current_date {
            None => {
                self.restore_locked(&mut state);
            }
            Some(previous) if previous != today => {
                info!("Date rolled over {previous} -> {today}.");
                let horizon = today.pred_opt().unwrap_or(today);
                state.current_date = Some(today);
                state.sent.retain(|date| *date >= horizon);
                state.missed.retain(|date| *date >= horizon);
                self.purge_stale_ledger(horizon);
            }
            Some(_) => {}
        }

        let snapshot = self.config.snapshot();
        self.check_window_fits(&snapshot);

        if let Some(yesterday) = today.pred_opt() {
            if let Due::Open(text) = self.due(&state, &snapshot, yesterday, now) {
                return self.deliver(&mut state, &snapshot, yesterday, &text, now).await;
            }
        }

        match self.due(&state, &snapshot, today, now) {
            Due::NoEvent => NotifyOutcome::NoEvent,
            Due::AlreadySent => NotifyOutcome::AlreadySent,
            Due::Before => NotifyOutcome::BeforeWindow,
            Due::Closed { start, end } => {
                if state.missed.insert(today) {
                    warn!(
                        "Missed the send window for {} ({} - {}); skipping until next year.",
                        DayKey::from_date(today),
                        start.format("%H:%M"),
                        end.format("%H:%M")
                    );
                }
                NotifyOutcome::MissedWindow
            }
            Due::Open(text) => self.deliver(&mut state, &snapshot, today, &text, now).await,
        }
    }

    fn due(
        &self,
        state: &NotifierState,
        snapshot: &ConfigSnapshot,
        date: NaiveDate,
        now: DateTime<Utc>,
    ) -> Due {
        let key = DayKey::from_date(date);
        let Some(text) = snapshot.calendar.message_for(&key) else {
            return Due::NoEvent;
        };
        if state.sent.contains(&date) {
            return Due::AlreadySent;
        }
        let Some((start, end)) = self.window(snapshot, date) else {
            error!("Could not compute send window for {date}");
            return Due::NoEvent;
        };
        if now < start {
            Due::Before
        } else if now >= end {
            Due::Closed { start, end }
        } else {
            Due::Open(text.to_string())
        }
    }

    async fn deliver(
        &self,
        state: &mut NotifierState,
        snapshot: &ConfigSnapshot,
        date: NaiveDate,
        text: &str,
        now: DateTime<Utc>,
    ) -> NotifyOutcome {
        let key = DayKey::from_date(date);
        match self.channel.send(snapshot.channel_id, text).await {
            Ok(message_id) => {
                info!("Sent holiday message for {key} (message {message_id}).");
                let record = NotificationRecord {
                    day_key: key,
                    channel_id: snapshot.channel_id,
                    message_id,
                    created_at: now,
                };
                self.record_sent(date, record);
                state.sent.insert(date);
                NotifyOutcome::Sent { message_id }
            }
            Err(e) => {
                if e.is_terminal() {
                    error!("Failed to send holiday message for {key}: {e}");
                } else {
                    warn!("Failed to send holiday message for {key}: {e}; will retry next poll.");
                }
                NotifyOutcome::SendFailed(e)
            }
        }
    }

    fn record_sent(&self, date: NaiveDate, record: NotificationRecord) {
        if let Some((key, evicted)) = self.cache.set(record.day_key, record.clone()) {
            self.drop_evicted(key, evicted);
        }
        if let Some(ledger) = &self.ledger {
            if let Err(e) = ledger.record(LedgerEntry::from_record(&record, date)) {
                error!(
                    "Could not persist sent marker for {}: {}. A restart today may send it again.",
                    record.day_key, e
                );
            }
        }
    }

    fn drop_evicted(&self, key: DayKey, record: NotificationRecord) {
        warn!(
            "Cache full: message {} for {} evicted before it was retracted.",
            record.message_id, key
        );
        if let Some(ledger) = &self.ledger {
            if let Err(e) = ledger.retire(&key, record.message_id) {
                warn!("Could not retire evicted record in ledger: {e}");
            }
        }
    }

    /// Forgets ledger entries older than `horizon` that no longer await deletion.
    fn purge_stale_ledger(&self, horizon: NaiveDate) {
        let Some(ledger) = &self.ledger else {
            return;
        };
        let cache = &self.cache;
        let mut keep = |entry: &LedgerEntry| {
            entry.sent_on >= horizon
                || (!entry.retired
                    && cache
                        .peek(&entry.day_key)
                        .is_some_and(|r| r.message_id == entry.message_id))
        };
        match ledger.retain(&mut keep) {
            Ok(0) => {}
            Ok(n) => debug!("Purged {n} stale ledger entr(y/ies)."),
            Err(e) => warn!("Could not purge stale ledger entries: {e}"),
        }
    }

    fn check_window_fits(&self, snapshot: &ConfigSnapshot) {
        let generation = self.config.generation();
        if self.checked_generation.swap(generation, Ordering::Relaxed) == generation {
            return;
        }
        let tolerance = self.tolerance(snapshot);
        if tolerance < to_chrono(self.poll_interval) {
            warn!(
                "Send window of {}m is narrower than the {}s poll interval; sends may be skipped.",
                tolerance.num_minutes(),
                self.poll_interval.as_secs()
            );
        }
    }
}

/// Spawns the periodic holiday check. Waits for readiness, then polls every
/// `poll_interval` until shutdown. A tick always runs to completion.
pub fn spawn_holiday_notifier_task(
    notifier: Arc<HolidayNotifier>,
    lifecycle: Arc<Lifecycle>,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        tokio::select! {
            _ = lifecycle.wait_until_ready() => {}
            _ = lifecycle.shutdown_requested() => return,
        }

        let mut interval = tokio::time::interval(notifier.poll_interval());
        interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
        loop {
            tokio::select! {
                _ = interval.tick() => {}
                _ = lifecycle.shutdown_requested() => break,
            }
            let outcome = notifier.tick().await;
            debug!("Holiday check => {:?}", outcome);
        }
        info!("Holiday notifier stopped.");
    })
}
