// src/lib.rs

pub mod cache;
pub mod config;
pub mod lifecycle;
pub mod platforms;
pub mod repositories;
pub mod tasks;
pub mod test_utils;
pub mod utils;

pub use holibot_common::error::{ChannelError, Error};
pub use utils::time::{Clock, SystemClock};
