pub mod messenger;
pub mod runtime;

pub use messenger::{classify_status, DiscordMessenger};
pub use runtime::DiscordPlatform;
