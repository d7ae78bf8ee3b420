//! Display state of watched identifiers
//!
//! Follows a connection's event stream the way a dashboard would: it keeps
//! the current watched list in sync with configuration events and turns
//! numeric values of watched identifiers into rate-limited display values.

use crate::connection::ConnectionEvent;
use crate::model::WatchedIdentifier;
use crate::normalizer::{DisplayValue, Normalization, RefreshTracker};
use crate::projector::MeterValue;

/// An accepted update for one watched identifier
#[derive(Debug, Clone, PartialEq)]
pub struct WatchUpdate {
    pub watched: WatchedIdentifier,
    pub timestamp: i64,
    pub display: DisplayValue,
}

#[derive(Debug, Clone, Default)]
pub struct WatchBoard {
    watched: Vec<WatchedIdentifier>,
    tracker: RefreshTracker,
}

impl WatchBoard {
    pub fn new(watched: &[WatchedIdentifier]) -> Self {
        Self {
            watched: watched.iter().filter(|w| w.is_valid()).cloned().collect(),
            tracker: RefreshTracker::new(),
        }
    }

    pub fn watched(&self) -> &[WatchedIdentifier] {
        &self.watched
    }

    /// Apply one event; returns the display update it caused, if any
    pub fn apply(&mut self, event: &ConnectionEvent) -> Option<WatchUpdate> {
        match event {
            ConnectionEvent::ValueReceived {
                identifier,
                timestamp,
                value: MeterValue::Numeric(value),
            } => {
                let watched = self.watched.iter().find(|w| &w.identifier == identifier)?;
                match self.tracker.offer(watched, *value, *timestamp) {
                    Normalization::Accepted(display) => Some(WatchUpdate {
                        watched: watched.clone(),
                        timestamp: *timestamp,
                        display,
                    }),
                    Normalization::Rejected => None,
                }
            },
            ConnectionEvent::WatchedIdentifierAdded(watched) => {
                self.watched.push(watched.clone());
                None
            },
            ConnectionEvent::WatchedIdentifierRemoved(watched) => {
                self.watched.retain(|w| w.identifier != watched.identifier);
                self.tracker.invalidate(&watched.identifier);
                None
            },
            ConnectionEvent::WatchedIdentifierChanged { old, new } => {
                if let Some(slot) = self.watched.iter_mut().find(|w| w.identifier == old.identifier) {
                    *slot = new.clone();
                }
                self.tracker.invalidate(&old.identifier);
                None
            },
            ConnectionEvent::ConnectionStateChanged(true) => {
                self.tracker.invalidate_all();
                None
            },
            _ => None,
        }
    }
}
