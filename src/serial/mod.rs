//! # Serial Communication Module
//!
//! Handles the receiver's UART.
//!
//! This module handles:
//! - Opening the port 8N1 without flow control
//! - Splitting it into a read half (receive path) and a write half that a
//!   single relay writer task owns

pub mod port_trait;

use crate::config::SerialConfig;
use crate::error::{GnssLoggerError, Result};
use tokio::io::{ReadHalf, WriteHalf};
use tokio_serial::{SerialPortBuilderExt, SerialStream};
use tracing::info;

pub use port_trait::{ReceiverPort, ReceiverWriter};

/// Inbound half of the receiver channel
pub type ReceiverReader = ReadHalf<SerialStream>;

/// Outbound half of the receiver channel
pub type ReceiverSink = ReceiverWriter<WriteHalf<SerialStream>>;

/// Open the receiver port and split it into independent halves
///
/// # Arguments
///
/// * `config` - Serial section of the configuration
///
/// # Errors
///
/// Returns a configuration error if the port cannot be opened
///
/// # Examples
///
/// ```no_run
/// use gnss_logger::config::SerialConfig;
/// use gnss_logger::serial::open_receiver;
///
/// #[tokio::main]
/// async fn main() -> anyhow::Result<()> {
///     let (reader, writer) = open_receiver(&SerialConfig::default())?;
///     Ok(())
/// }
/// ```
pub fn open_receiver(config: &SerialConfig) -> Result<(ReceiverReader, ReceiverSink)> {
    let port = open_port(&config.port, config.baud_rate)?;
    info!("Opened receiver at {} ({} baud)", config.port, config.baud_rate);

    let (reader, writer) = tokio::io::split(port);
    Ok((reader, ReceiverWriter::new(writer)))
}

/// Open a serial port with receiver settings
fn open_port(path: &str, baud_rate: u32) -> Result<SerialStream> {
    tokio_serial::new(path, baud_rate)
        .data_bits(tokio_serial::DataBits::Eight)
        .parity(tokio_serial::Parity::None)
        .stop_bits(tokio_serial::StopBits::One)
        .flow_control(tokio_serial::FlowControl::None)
        .open_native_async()
        .map_err(|e| GnssLoggerError::Configuration(format!("Failed to open {}: {}", path, e)))
}
