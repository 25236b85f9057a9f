use std::collections::{HashSet, VecDeque};

use async_trait::async_trait;
use parking_lot::Mutex;
use tokio::time::Instant;

use holibot_common::models::MessageHandle;

use crate::platforms::MessageChannel;
use crate::ChannelError;

#[derive(Default)]
struct RecordingState {
    next_id: u64,
    sent: Vec<(u64, String)>,
    live: HashSet<u64>,
    deleted: Vec<u64>,
    delete_calls: Vec<Instant>,
    send_failures: VecDeque<ChannelError>,
    delete_failures: VecDeque<ChannelError>,
}

/// In-memory chat channel that remembers what was sent and deleted.
/// Queued failures are returned by the next matching calls.
#[derive(Default)]
pub struct RecordingChannel {
    state: Mutex<RecordingState>,
}

impl RecordingChannel {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn fail_next_send(&self, err: ChannelError) {
        self.state.lock().send_failures.push_back(err);
    }

    pub fn fail_next_delete(&self, err: ChannelError) {
        self.state.lock().delete_failures.push_back(err);
    }

    /// Simulates someone deleting the message by hand.
    pub fn vanish(&self, message_id: u64) {
        self.state.lock().live.remove(&message_id);
    }

    pub fn sent(&self) -> Vec<(u64, String)> {
        self.state.lock().sent.clone()
    }

    pub fn send_count(&self) -> usize {
        self.state.lock().sent.len()
    }

    pub fn deleted(&self) -> Vec<u64> {
        self.state.lock().deleted.clone()
    }

    pub fn is_live(&self, message_id: u64) -> bool {
        self.state.lock().live.contains(&message_id)
    }

    /// When each delete call was made (tokio time, so pausable).
    pub fn delete_calls(&self) -> Vec<Instant> {
        self.state.lock().delete_calls.clone()
    }
}

#[async_trait]
impl MessageChannel for RecordingChannel {
    async fn send(&self, channel_id: u64, text: &str) -> Result<u64, ChannelError> {
        let mut state = self.state.lock();
        if let Some(err) = state.send_failures.pop_front() {
            return Err(err);
        }
        if channel_id == 0 {
            return Err(ChannelError::InvalidChannel(0));
        }
        state.next_id += 1;
        let id = 1000 + state.next_id;
        state.sent.push((channel_id, text.to_string()));
        state.live.insert(id);
        Ok(id)
    }

    async fn fetch(&self, channel_id: u64, message_id: u64) -> Result<MessageHandle, ChannelError> {
        if self.state.lock().live.contains(&message_id) {
            Ok(MessageHandle {
                channel_id,
                message_id,
            })
        } else {
            Err(ChannelError::NotFound)
        }
    }

    async fn delete(&self, handle: &MessageHandle) -> Result<(), ChannelError> {
        let mut state = self.state.lock();
        state.delete_calls.push(Instant::now());
        if let Some(err) = state.delete_failures.pop_front() {
            return Err(err);
        }
        if !state.live.remove(&handle.message_id) {
            return Err(ChannelError::NotFound);
        }
        state.deleted.push(handle.message_id);
        Ok(())
    }
}
