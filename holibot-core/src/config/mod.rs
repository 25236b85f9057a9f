pub mod source;
pub mod store;

pub use source::{ConfigSource, FileConfigSource};
pub use store::{ConfigStore, DEFAULT_RELOAD_DEBOUNCE};
