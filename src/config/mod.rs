//! Layered application settings loaded from files and environment.

mod settings;

pub use settings::{LogConfig, Settings};
