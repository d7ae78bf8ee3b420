//! Meter Service (metersrv)
//!
//! Reads SML smart meters on serial ports and logs their values.

use std::path::PathBuf;
use std::time::Duration;

use clap::{Parser, Subcommand};
use errors::{MeterError, MeterResult};
use tokio::sync::broadcast::{self, error::RecvError};
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

use metersrv::{
    decode_capture, run_reader, serial, spawn_ticker, CommunicationProtocol, ConnectionEvent,
    ConnectionHandle, ConnectionManager, MeterSrvConfig, MeterSrvError, WatchBoard,
    WatchedIdentifier,
};
use sml_codec::SmlCodec;

#[derive(Parser)]
#[command(
    name = "metersrv",
    version = env!("CARGO_PKG_VERSION"),
    about = "Serial smart meter reader",
    long_about = None
)]
struct Cli {
    /// Console log level (trace, debug, info, warn, error); overrides the config file
    #[arg(short = 'l', long, global = true)]
    log_level: Option<String>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Read the configured meters until interrupted
    Run {
        /// Configuration file (YAML, TOML or JSON)
        #[arg(short, long)]
        config: PathBuf,

        /// Only run the named connection
        #[arg(long)]
        connection: Option<String>,
    },

    /// List the supported communication protocols
    ListProtocols,

    /// Decode a hex-encoded SML capture and print its values
    Decode {
        /// Hex digits, whitespace is ignored
        hex: String,

        /// Accept messages with a wrong CRC
        #[arg(long)]
        no_crc: bool,
    },
}

#[tokio::main]
async fn main() -> MeterResult<()> {
    let cli = Cli::parse();

    match cli.command {
        Commands::Run { config, connection } => {
            run(config, connection, cli.log_level.as_deref()).await
        },
        Commands::ListProtocols => {
            for protocol in CommunicationProtocol::ALL {
                println!("{:<6} {}", protocol.key(), protocol.description());
            }
            Ok(())
        },
        Commands::Decode { hex, no_crc } => {
            common::logging::init(cli.log_level.as_deref().unwrap_or("warn"))?;
            decode(&hex, !no_crc)
        },
    }
}

fn decode(hex: &str, verify_crc: bool) -> MeterResult<()> {
    let data = common::hex::decode(hex).map_err(|e| MeterError::InvalidParameter {
        param: "hex".into(),
        reason: e.to_string(),
    })?;
    let codec = SmlCodec::new().with_crc_verification(verify_crc);
    let timestamp = chrono::Utc::now().timestamp_millis();

    for value in decode_capture(&data, &codec, timestamp)? {
        if value.unit.is_empty() {
            println!("{:<24} {}", value.identifier, value.value);
        } else {
            println!("{:<24} {} {}", value.identifier, value.value, value.unit);
        }
    }
    Ok(())
}

async fn run(
    config_path: PathBuf,
    only: Option<String>,
    log_level: Option<&str>,
) -> MeterResult<()> {
    let config = MeterSrvConfig::load(Some(&config_path))?;

    let mut log_config = config.log_config()?;
    if let Some(level) = log_level {
        log_config.console_level = level.parse().map_err(|_| MeterError::InvalidParameter {
            param: "log-level".into(),
            reason: format!("unknown log level '{}'", level),
        })?;
    }
    common::logging::init_with_config(log_config)?;
    info!("Configuration loaded from {}", config_path.display());

    let mut manager = ConnectionManager::new()
        .with_history_policy(config.history)
        .with_crc_verification(config.codec.verify_crc);
    for connection in &config.connections {
        if only.as_ref().is_some_and(|name| *name != connection.name) {
            continue;
        }
        manager.add(connection.clone())?;
    }
    if let Some(name) = &only {
        if manager.get(name).is_none() {
            return Err(MeterSrvError::connection_not_found(name).into());
        }
    }
    if manager.is_empty() {
        warn!("No connections configured");
        return Ok(());
    }

    let cancel = CancellationToken::new();
    let mut readers = Vec::new();
    let mut tasks = Vec::new();

    for connection in manager.drain() {
        let name = connection.name().to_string();
        let port = connection.config().port_name.clone();
        let watched = connection.config().watched.clone();
        let handle = ConnectionHandle::new(connection);
        tasks.push(tokio::spawn(log_events(handle.subscribe(), name.clone(), watched)));

        let stream = match serial::open(&port, &config.serial) {
            Ok(stream) => stream,
            Err(e) => {
                error!("Connection {}: {}", name, e);
                continue;
            },
        };
        handle.open()?;

        tasks.push(spawn_ticker(
            handle.clone(),
            Duration::from_millis(config.runtime.tick_interval_ms),
            cancel.clone(),
        ));
        readers.push(tokio::spawn(run_reader(
            handle,
            stream,
            config.runtime.read_buffer_size,
            cancel.clone(),
        )));
    }

    if readers.is_empty() {
        return Err(MeterError::ConnectionFailed {
            endpoint: "serial".into(),
            reason: "no serial port could be opened".into(),
        });
    }

    if let Err(e) = tokio::signal::ctrl_c().await {
        error!("Failed to wait for Ctrl+C: {}", e);
    }
    info!("Shutting down");
    cancel.cancel();

    for reader in readers {
        match reader.await {
            Ok(Ok(())) => {},
            Ok(Err(e)) => warn!("Reader stopped with error: {}", e),
            Err(e) => error!("Reader task failed: {}", e),
        }
    }
    for task in tasks {
        let _ = task.await;
    }
    Ok(())
}

async fn log_events(
    mut events: broadcast::Receiver<ConnectionEvent>,
    name: String,
    watched: Vec<WatchedIdentifier>,
) {
    let mut board = WatchBoard::new(&watched);
    loop {
        let event = match events.recv().await {
            Ok(event) => event,
            Err(RecvError::Lagged(missed)) => {
                warn!("Connection {}: {} events dropped", name, missed);
                continue;
            },
            Err(RecvError::Closed) => break,
        };

        if let Some(update) = board.apply(&event) {
            let label = if update.watched.description.is_empty() {
                update.watched.identifier.as_str()
            } else {
                update.watched.description.as_str()
            };
            info!("{}: {} = {}", name, label, update.display.text);
        }

        match event {
            ConnectionEvent::ConnectionStateChanged(connected) => {
                info!("{}: {}", name, if connected { "connected" } else { "disconnected" });
            },
            ConnectionEvent::ConnectionDurationChanged(ms) => {
                tracing::trace!("{}: connected for {} s", name, ms / 1000);
            },
            ConnectionEvent::ValueReceived {
                identifier, value, ..
            } => {
                tracing::debug!("{}: {} = {}", name, identifier, value);
            },
            _ => {},
        }
    }
}
