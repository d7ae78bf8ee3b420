//! Connection state machine
//!
//! A [`Connection`] owns the receive buffer, the value history and the
//! configuration of one meter. Every operation returns the events it produced
//! in order; the caller decides where they go.

use std::fmt;
use std::sync::Arc;

use bytes::{Buf, BytesMut};
use common::time::{SystemTimeProvider, TimeProvider};
use serde::{Deserialize, Serialize};
use sml_codec::{FrameCodec, SmlCodec};
use tracing::{debug, info, warn};

use crate::error::{MeterSrvError, Result};
use crate::framing::FrameExtractor;
use crate::history::{HistoryPolicy, ValueHistory};
use crate::mapping::diff;
use crate::model::{ConnectionConfig, WatchedIdentifier};
use crate::projector::{project, CanonicalValue, MeterValue};

// ============================================================================
// State and events
// ============================================================================

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum ConnectionState {
    #[default]
    Disconnected,
    Connected,
}

impl ConnectionState {
    pub fn is_connected(&self) -> bool {
        matches!(self, ConnectionState::Connected)
    }
}

impl fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConnectionState::Disconnected => write!(f, "DISCONNECTED"),
            ConnectionState::Connected => write!(f, "CONNECTED"),
        }
    }
}

/// Everything a connection reports to its consumers
#[derive(Debug, Clone, PartialEq)]
pub enum ConnectionEvent {
    ConnectionStateChanged(bool),
    /// Milliseconds since the connection was opened
    ConnectionDurationChanged(i64),
    ValueReceived {
        identifier: String,
        timestamp: i64,
        value: MeterValue,
    },
    WatchedIdentifierAdded(WatchedIdentifier),
    WatchedIdentifierRemoved(WatchedIdentifier),
    WatchedIdentifierChanged {
        old: WatchedIdentifier,
        new: WatchedIdentifier,
    },
}

impl From<CanonicalValue> for ConnectionEvent {
    fn from(value: CanonicalValue) -> Self {
        ConnectionEvent::ValueReceived {
            identifier: value.identifier,
            timestamp: value.timestamp,
            value: value.value,
        }
    }
}

/// Frame counters since the connection was created
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct ConnectionStats {
    pub frames_decoded: u64,
    pub decode_failures: u64,
    pub values_received: u64,
}

// ============================================================================
// Connection
// ============================================================================

pub struct Connection {
    config: ConnectionConfig,
    state: ConnectionState,
    buffer: BytesMut,
    history: ValueHistory,
    extractor: FrameExtractor,
    codec: Box<dyn FrameCodec>,
    clock: Arc<dyn TimeProvider>,
    connected_at: Option<i64>,
    stats: ConnectionStats,
}

impl fmt::Debug for Connection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Connection")
            .field("name", &self.config.name)
            .field("state", &self.state)
            .field("buffered", &self.buffer.len())
            .field("stats", &self.stats)
            .finish()
    }
}

impl Connection {
    /// Disconnected connection with the SML codec, the system clock and an
    /// unbounded history
    pub fn new(config: ConnectionConfig) -> Self {
        Self {
            config,
            state: ConnectionState::Disconnected,
            buffer: BytesMut::new(),
            history: ValueHistory::new(HistoryPolicy::Unbounded),
            extractor: FrameExtractor::sml(),
            codec: Box::new(SmlCodec::new()),
            clock: Arc::new(SystemTimeProvider),
            connected_at: None,
            stats: ConnectionStats::default(),
        }
    }

    pub fn with_codec(mut self, codec: Box<dyn FrameCodec>) -> Self {
        self.codec = codec;
        self
    }

    pub fn with_clock(mut self, clock: Arc<dyn TimeProvider>) -> Self {
        self.clock = clock;
        self
    }

    pub fn with_history_policy(mut self, policy: HistoryPolicy) -> Self {
        self.history = ValueHistory::new(policy);
        self
    }

    pub fn with_extractor(mut self, extractor: FrameExtractor) -> Self {
        self.extractor = extractor;
        self
    }

    pub fn name(&self) -> &str {
        &self.config.name
    }

    pub fn config(&self) -> &ConnectionConfig {
        &self.config
    }

    pub fn state(&self) -> ConnectionState {
        self.state
    }

    pub fn is_connected(&self) -> bool {
        self.state.is_connected()
    }

    pub fn history(&self) -> &ValueHistory {
        &self.history
    }

    pub fn stats(&self) -> ConnectionStats {
        self.stats
    }

    /// Bytes received but not yet part of a complete frame
    pub fn buffered(&self) -> &[u8] {
        &self.buffer
    }

    /// Start receiving; an open connection is closed and reopened
    pub fn open(&mut self) -> Result<Vec<ConnectionEvent>> {
        if !self.config.is_valid() {
            return Err(MeterSrvError::config(format!(
                "Connection '{}' needs a name, a port and a protocol",
                self.config.name
            )));
        }

        let mut events = self.close();
        self.buffer.clear();
        self.connected_at = Some(self.clock.now_millis());
        self.state = ConnectionState::Connected;
        info!(
            "Connection {} opened on {} ({})",
            self.config.name, self.config.port_name, self.config.protocol
        );
        events.push(ConnectionEvent::ConnectionStateChanged(true));
        Ok(events)
    }

    /// Stop receiving; buffer and history are kept
    pub fn close(&mut self) -> Vec<ConnectionEvent> {
        if !self.state.is_connected() {
            return Vec::new();
        }
        self.state = ConnectionState::Disconnected;
        self.connected_at = None;
        info!("Connection {} closed", self.config.name);
        vec![ConnectionEvent::ConnectionStateChanged(false)]
    }

    /// Append received bytes and process every frame that became complete
    pub fn on_data(&mut self, data: &[u8]) -> Vec<ConnectionEvent> {
        if !self.state.is_connected() {
            debug!(
                "Connection {} ignoring {} bytes while disconnected",
                self.config.name,
                data.len()
            );
            return Vec::new();
        }

        self.buffer.extend_from_slice(data);
        let extraction = self.extractor.extract(&self.buffer);
        let timestamp = self.clock.now_millis();
        let mut events = Vec::new();

        for payload in &extraction.frames {
            match self.codec.decode(payload) {
                Ok(entries) => {
                    self.stats.frames_decoded += 1;
                    let values = project(&entries, timestamp, &mut self.history);
                    self.stats.values_received += values.len() as u64;
                    events.extend(values.into_iter().map(ConnectionEvent::from));
                },
                Err(e) => {
                    self.stats.decode_failures += 1;
                    warn!(
                        "Connection {}: discarding frame of {} bytes: {}",
                        self.config.name,
                        payload.len(),
                        e
                    );
                },
            }
        }

        let consumed = extraction.bytes_consumed;
        self.buffer.advance(consumed);
        let junk = self.extractor.discardable_prefix(&self.buffer);
        if junk > 0 {
            debug!("Connection {}: dropping {} bytes outside frames", self.config.name, junk);
            self.buffer.advance(junk);
        }
        events
    }

    /// Uptime report while connected
    ///
    /// Never negative; a clock stepped back before the open time reports zero.
    pub fn tick(&self) -> Option<ConnectionEvent> {
        if !self.state.is_connected() {
            return None;
        }
        let since = self.connected_at?;
        Some(ConnectionEvent::ConnectionDurationChanged(
            self.clock.now_millis().saturating_sub(since).max(0),
        ))
    }

    /// Replace the configuration, reporting watched-identifier changes
    ///
    /// An open connection is closed first and stays closed.
    pub fn set_config(&mut self, config: ConnectionConfig) -> Vec<ConnectionEvent> {
        let mut events = self.close();
        let delta = diff(&self.config.watched, &config.watched);
        self.config = config;

        events.extend(delta.added.into_iter().map(ConnectionEvent::WatchedIdentifierAdded));
        events.extend(delta.removed.into_iter().map(ConnectionEvent::WatchedIdentifierRemoved));
        events.extend(
            delta
                .changed
                .into_iter()
                .map(|(old, new)| ConnectionEvent::WatchedIdentifierChanged { old, new }),
        );
        events
    }
}
