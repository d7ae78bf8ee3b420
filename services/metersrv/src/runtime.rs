//! Async host for connections
//!
//! A [`ConnectionHandle`] shares one [`Connection`] between the reader task,
//! the duration ticker and configuration updates. Events are published on a
//! broadcast channel in the order the connection produced them.

use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use tokio::io::{AsyncRead, AsyncReadExt};
use tokio::sync::broadcast;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::connection::{Connection, ConnectionEvent};
use crate::error::Result;
use crate::model::ConnectionConfig;

/// Events buffered per subscriber before the slowest one starts lagging
pub const EVENT_CAPACITY: usize = 1024;

#[derive(Clone)]
pub struct ConnectionHandle {
    connection: Arc<Mutex<Connection>>,
    events: broadcast::Sender<ConnectionEvent>,
}

impl ConnectionHandle {
    pub fn new(connection: Connection) -> Self {
        let (events, _) = broadcast::channel(EVENT_CAPACITY);
        Self {
            connection: Arc::new(Mutex::new(connection)),
            events,
        }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<ConnectionEvent> {
        self.events.subscribe()
    }

    pub fn name(&self) -> String {
        self.connection.lock().name().to_string()
    }

    /// Read access to the connection, e.g. for its history
    pub fn with_connection<R>(&self, f: impl FnOnce(&Connection) -> R) -> R {
        f(&self.connection.lock())
    }

    // Callers hold the connection lock, which keeps event order across tasks
    fn publish(&self, events: Vec<ConnectionEvent>) -> usize {
        let count = events.len();
        for event in events {
            // No subscribers is not an error
            let _ = self.events.send(event);
        }
        count
    }

    pub fn open(&self) -> Result<()> {
        let mut connection = self.connection.lock();
        let events = connection.open()?;
        self.publish(events);
        Ok(())
    }

    pub fn close(&self) {
        let mut connection = self.connection.lock();
        let events = connection.close();
        self.publish(events);
    }

    /// Feed received bytes; returns the number of published events
    pub fn on_data(&self, data: &[u8]) -> usize {
        let mut connection = self.connection.lock();
        let events = connection.on_data(data);
        self.publish(events)
    }

    pub fn tick(&self) {
        let connection = self.connection.lock();
        if let Some(event) = connection.tick() {
            self.publish(vec![event]);
        }
    }

    pub fn set_config(&self, config: ConnectionConfig) {
        let mut connection = self.connection.lock();
        let events = connection.set_config(config);
        self.publish(events);
    }

    pub fn is_connected(&self) -> bool {
        self.connection.lock().is_connected()
    }
}

/// Feed everything `reader` yields into the connection
///
/// Returns on end of stream, on cancellation or on a read error; the
/// connection is closed in every case.
pub async fn run_reader<R>(
    handle: ConnectionHandle,
    mut reader: R,
    buffer_size: usize,
    cancel: CancellationToken,
) -> Result<()>
where
    R: AsyncRead + Unpin,
{
    let name = handle.name();
    let mut buf = vec![0u8; buffer_size.max(1)];

    let result: Result<()> = loop {
        tokio::select! {
            read = reader.read(&mut buf) => match read {
                Ok(0) => {
                    info!("Connection {}: end of stream", name);
                    break Ok(());
                },
                Ok(n) => {
                    let published = handle.on_data(&buf[..n]);
                    debug!("Connection {}: {} bytes, {} events", name, n, published);
                },
                Err(e) => {
                    warn!("Connection {}: read failed: {}", name, e);
                    break Err(e.into());
                },
            },
            () = cancel.cancelled() => {
                debug!("Connection {}: reader cancelled", name);
                break Ok(());
            },
        }
    };

    handle.close();
    result
}

/// Publish a duration report every `period` until cancelled
pub fn spawn_ticker(
    handle: ConnectionHandle,
    period: Duration,
    cancel: CancellationToken,
) -> JoinHandle<()> {
    let period = period.max(Duration::from_millis(1));
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(period);
        interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
        loop {
            tokio::select! {
                _ = interval.tick() => handle.tick(),
                () = cancel.cancelled() => break,
            }
        }
    })
}
