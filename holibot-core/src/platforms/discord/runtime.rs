use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use twilight_gateway::{CloseFrame, Event, EventTypeFlags, Intents, MessageSender, Shard, ShardId, StreamExt};
use twilight_http::Client as HttpClient;

use crate::lifecycle::Lifecycle;
use crate::platforms::discord::messenger::DiscordMessenger;
use crate::platforms::{ConnectionStatus, PlatformIntegration};
use crate::Error;

/// Gateway events the shard runner wants deserialized.
fn wanted_events() -> EventTypeFlags {
    EventTypeFlags::READY
}

/// Drives one gateway shard. Its only job for us is to keep the session
/// alive and report READY.
async fn shard_runner(mut shard: Shard, lifecycle: Arc<Lifecycle>) {
    let shard_id = shard.id().number();
    info!("(ShardRunner) Shard {shard_id} started.");

    while let Some(item) = shard.next_event(wanted_events()).await {
        match item {
            Ok(Event::Ready(ready)) => {
                info!(
                    "Shard {shard_id} => READY as {} (ID={})",
                    ready.user.name, ready.user.id
                );
                lifecycle.mark_ready();
            }
            Ok(other) => debug!("Shard {shard_id} ignoring {:?}", other.kind()),
            Err(e) => warn!("Shard {shard_id} error receiving event: {e}"),
        }
    }

    warn!("(ShardRunner) Shard {shard_id} event loop ended.");
}

/// Gateway connection plus the shared HTTP client.
pub struct DiscordPlatform {
    token: String,
    connection_status: ConnectionStatus,
    lifecycle: Arc<Lifecycle>,
    http: Arc<HttpClient>,
    shard_task: Option<JoinHandle<()>>,
    shard_sender: Option<MessageSender>,
}

impl DiscordPlatform {
    pub fn new(token: String, lifecycle: Arc<Lifecycle>) -> Self {
        let http = Arc::new(
            HttpClient::builder()
                .token(token.clone())
                .timeout(Duration::from_secs(30))
                .build(),
        );
        Self {
            token,
            connection_status: ConnectionStatus::Disconnected,
            lifecycle,
            http,
            shard_task: None,
            shard_sender: None,
        }
    }

    /// Outbound message API sharing this platform's HTTP client.
    pub fn messenger(&self) -> DiscordMessenger {
        DiscordMessenger::new(self.http.clone())
    }
}

#[async_trait]
impl PlatformIntegration for DiscordPlatform {
    async fn connect(&mut self) -> Result<(), Error> {
        if matches!(self.connection_status, ConnectionStatus::Connected) {
            info!("(DiscordPlatform) Already connected => skipping");
            return Ok(());
        }
        if self.token.is_empty() {
            return Err(Error::Auth("Discord token is empty".into()));
        }

        let shard = Shard::new(ShardId::ONE, self.token.clone(), Intents::GUILDS);
        self.shard_sender = Some(shard.sender());

        let lifecycle = self.lifecycle.clone();
        self.shard_task = Some(tokio::spawn(shard_runner(shard, lifecycle)));

        self.connection_status = ConnectionStatus::Connected;
        Ok(())
    }

    async fn disconnect(&mut self) -> Result<(), Error> {
        self.connection_status = ConnectionStatus::Disconnected;

        if let Some(sender) = self.shard_sender.take() {
            let _ = sender.close(CloseFrame::NORMAL);
        }
        if let Some(task) = self.shard_task.take() {
            // The runner stops once the close frame goes out; don't hang on a dead socket.
            if tokio::time::timeout(Duration::from_secs(5), task).await.is_err() {
                warn!("(DiscordPlatform) Shard did not stop within 5s; abandoning it.");
            }
        }
        Ok(())
    }

    async fn get_connection_status(&self) -> Result<ConnectionStatus, Error> {
        Ok(self.connection_status.clone())
    }
}
