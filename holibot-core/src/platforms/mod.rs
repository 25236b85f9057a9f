// File: src/platforms/mod.rs

use async_trait::async_trait;
use holibot_common::models::MessageHandle;

use crate::{ChannelError, Error};

#[derive(Debug, Clone, PartialEq)]
pub enum ConnectionStatus {
    Connected,
    Disconnected,
    Error(String),
}

/// Outbound side of the target chat channel.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait MessageChannel: Send + Sync {
    /// Posts `text` and returns the new message id.
    async fn send(&self, channel_id: u64, text: &str) -> Result<u64, ChannelError>;
    async fn fetch(&self, channel_id: u64, message_id: u64) -> Result<MessageHandle, ChannelError>;
    async fn delete(&self, handle: &MessageHandle) -> Result<(), ChannelError>;
}

/// Resolves a message by id and deletes it.
pub async fn retract_message(
    channel: &dyn MessageChannel,
    channel_id: u64,
    message_id: u64,
) -> Result<(), ChannelError> {
    let handle = channel.fetch(channel_id, message_id).await?;
    channel.delete(&handle).await
}

#[async_trait]
pub trait PlatformIntegration {
    async fn connect(&mut self) -> Result<(), Error>;
    async fn disconnect(&mut self) -> Result<(), Error>;
    async fn get_connection_status(&self) -> Result<ConnectionStatus, Error>;
}

pub mod discord;
