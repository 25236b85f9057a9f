//! Fakes shared by unit and integration tests.

pub mod channel;
pub mod clock;
pub mod config_source;
