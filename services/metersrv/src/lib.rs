//! Meter Service (metersrv)
//!
//! Reads smart meters attached to serial ports. Bytes from the port are cut
//! into SML transport frames, decoded into OBIS entries, projected into
//! canonical values and kept in a per-identifier history. Consumers follow a
//! connection through its [`ConnectionEvent`] stream.
//!
//! The processing core ([`Connection`]) is synchronous and performs no I/O;
//! [`runtime`] hosts it on tokio and [`serial`] opens the ports.

pub mod capture;
pub mod config;
pub mod connection;
pub mod error;
pub mod framing;
pub mod history;
pub mod manager;
pub mod mapping;
pub mod model;
pub mod normalizer;
pub mod projector;
pub mod runtime;
pub mod serial;
pub mod watch;

pub use capture::decode_capture;
pub use config::MeterSrvConfig;
pub use connection::{Connection, ConnectionEvent, ConnectionState, ConnectionStats};
pub use error::{MeterSrvError, Result};
pub use framing::{Extraction, FrameExtractor};
pub use history::{HistoryPolicy, ValueHistory};
pub use manager::ConnectionManager;
pub use mapping::{diff, MappingDelta};
pub use model::{CommunicationProtocol, ConnectionConfig, WatchedIdentifier};
pub use normalizer::{normalize, DisplayValue, Normalization, RefreshTracker};
pub use projector::{format_obis, project, CanonicalValue, MeterValue};
pub use runtime::{run_reader, spawn_ticker, ConnectionHandle};
pub use watch::{WatchBoard, WatchUpdate};
