//! MeterLink basic library
//!
//! Provides functions shared by the workspace crates:
//! - logging initialization
//! - figment based configuration loading
//! - hex helpers for octet strings
//! - time providers

pub mod config;
pub mod hex;
pub mod logging;
pub mod time;

pub use config::load_config;
pub use logging::LogConfig;
pub use time::{ManualTimeProvider, SystemTimeProvider, TimeProvider};
