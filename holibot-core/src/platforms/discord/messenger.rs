use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tracing::{debug, warn};
use twilight_http::api_error::ApiError;
use twilight_http::error::ErrorType;
use twilight_http::Client as HttpClient;
use twilight_model::id::marker::{ChannelMarker, MessageMarker};
use twilight_model::id::Id;

use holibot_common::models::MessageHandle;

use crate::platforms::MessageChannel;
use crate::ChannelError;

/// [`MessageChannel`] over Discord's REST API.
#[derive(Clone)]
pub struct DiscordMessenger {
    http: Arc<HttpClient>,
}

impl DiscordMessenger {
    pub fn new(http: Arc<HttpClient>) -> Self {
        Self { http }
    }
}

fn channel_id(raw: u64) -> Result<Id<ChannelMarker>, ChannelError> {
    Id::new_checked(raw).ok_or(ChannelError::InvalidChannel(raw))
}

fn message_id(raw: u64) -> Result<Id<MessageMarker>, ChannelError> {
    Id::new_checked(raw).ok_or(ChannelError::NotFound)
}

/// Maps an HTTP status to terminal (404, 401/403) or transient (everything else).
pub fn classify_status(status: u16, detail: String) -> ChannelError {
    match status {
        404 => ChannelError::NotFound,
        401 | 403 => ChannelError::Forbidden(detail),
        429 => ChannelError::RateLimited { retry_after: None },
        _ => ChannelError::Transient(detail),
    }
}

fn classify_http_error(err: &twilight_http::Error) -> ChannelError {
    match err.kind() {
        ErrorType::Response {
            error: ApiError::Ratelimited(limited),
            ..
        } => ChannelError::RateLimited {
            retry_after: Duration::try_from_secs_f64(limited.retry_after).ok(),
        },
        ErrorType::Response { status, .. } => classify_status(status.get(), err.to_string()),
        ErrorType::Unauthorized => ChannelError::Forbidden("bot token rejected".into()),
        _ => ChannelError::Transient(err.to_string()),
    }
}

#[async_trait]
impl MessageChannel for DiscordMessenger {
    async fn send(&self, channel: u64, text: &str) -> Result<u64, ChannelError> {
        let channel = channel_id(channel)?;
        let response = self
            .http
            .create_message(channel)
            .content(text)
            .await
            .map_err(|e| classify_http_error(&e))?;

        match response.model().await {
            Ok(message) => Ok(message.id.get()),
            Err(e) => {
                // The message is up but we cannot track it for retraction.
                warn!("Sent message to {channel} but could not parse the response: {e}");
                Err(ChannelError::Transient(format!("unreadable create_message response: {e}")))
            }
        }
    }

    async fn fetch(&self, channel: u64, message: u64) -> Result<MessageHandle, ChannelError> {
        let response = self
            .http
            .message(channel_id(channel)?, message_id(message)?)
            .await
            .map_err(|e| classify_http_error(&e))?;
        let message = response
            .model()
            .await
            .map_err(|e| ChannelError::Transient(format!("unreadable message response: {e}")))?;
        debug!("Fetched message {} in channel {}", message.id, message.channel_id);
        Ok(MessageHandle {
            channel_id: message.channel_id.get(),
            message_id: message.id.get(),
        })
    }

    async fn delete(&self, handle: &MessageHandle) -> Result<(), ChannelError> {
        self.http
            .delete_message(channel_id(handle.channel_id)?, message_id(handle.message_id)?)
            .await
            .map_err(|e| classify_http_error(&e))?;
        Ok(())
    }
}
