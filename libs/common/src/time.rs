//! Time provider abstraction
//!
//! Connections stamp received values and measure their uptime through a
//! [`TimeProvider`] so that tests can drive the clock explicitly.

use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::Arc;

/// Time provider trait for generating timestamps
pub trait TimeProvider: Send + Sync + 'static {
    /// Get current timestamp in milliseconds since Unix epoch
    fn now_millis(&self) -> i64;
}

/// System time provider using the local clock
#[derive(Clone, Copy, Debug, Default)]
pub struct SystemTimeProvider;

impl TimeProvider for SystemTimeProvider {
    fn now_millis(&self) -> i64 {
        chrono::Utc::now().timestamp_millis()
    }
}

/// Settable clock shared between a test and the code under test
///
/// Clones share the same underlying time.
#[derive(Clone, Debug, Default)]
pub struct ManualTimeProvider {
    now: Arc<AtomicI64>,
}

impl ManualTimeProvider {
    pub fn new(timestamp_ms: i64) -> Self {
        Self {
            now: Arc::new(AtomicI64::new(timestamp_ms)),
        }
    }

    pub fn set(&self, timestamp_ms: i64) {
        self.now.store(timestamp_ms, Ordering::SeqCst);
    }

    /// Move the clock forward and return the new time
    pub fn advance(&self, delta_ms: i64) -> i64 {
        self.now.fetch_add(delta_ms, Ordering::SeqCst) + delta_ms
    }
}

impl TimeProvider for ManualTimeProvider {
    fn now_millis(&self) -> i64 {
        self.now.load(Ordering::SeqCst)
    }
}

impl<T: TimeProvider + ?Sized> TimeProvider for Arc<T> {
    fn now_millis(&self) -> i64 {
        (**self).now_millis()
    }
}
