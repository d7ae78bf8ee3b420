//! Serial port setup

use std::time::Duration;

use tokio_serial::{DataBits, Parity, SerialPortBuilder, SerialStream, StopBits};
use tracing::debug;

use crate::config::SerialConfig;
use crate::error::{ErrorExt, Result};

/// Read timeout of the underlying port
const PORT_TIMEOUT: Duration = Duration::from_millis(500);

fn data_bits(bits: u8) -> DataBits {
    match bits {
        5 => DataBits::Five,
        6 => DataBits::Six,
        7 => DataBits::Seven,
        _ => DataBits::Eight,
    }
}

fn stop_bits(bits: u8) -> StopBits {
    match bits {
        2 => StopBits::Two,
        _ => StopBits::One,
    }
}

fn parity(parity: &str) -> Parity {
    match parity.to_ascii_lowercase().as_str() {
        "even" => Parity::Even,
        "odd" => Parity::Odd,
        _ => Parity::None,
    }
}

/// Port builder for `port_name` with the configured line settings
pub fn builder(port_name: &str, settings: &SerialConfig) -> SerialPortBuilder {
    tokio_serial::new(port_name, settings.baud_rate)
        .data_bits(data_bits(settings.data_bits))
        .stop_bits(stop_bits(settings.stop_bits))
        .parity(parity(&settings.parity))
        .timeout(PORT_TIMEOUT)
}

/// Open `port_name` for async reading
pub fn open(port_name: &str, settings: &SerialConfig) -> Result<SerialStream> {
    debug!(
        "Opening serial port {} at {} baud, {}{}{}",
        port_name,
        settings.baud_rate,
        settings.data_bits,
        settings.parity.chars().next().unwrap_or('n').to_ascii_uppercase(),
        settings.stop_bits
    );
    SerialStream::open(&builder(port_name, settings))
        .io_error(&format!("Failed to open serial port {}", port_name))
}
