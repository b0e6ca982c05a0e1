//! Streaming engine configuration.

use std::time::Duration;

use adsdr_core::error::{Error, Result};

use crate::codec::RX_BYTES_PER_SAMPLE;

/// Transfer slots per direction.
pub const TRANSFER_COUNT: usize = 64;

/// Bytes per wire block.
pub const BUFFER_SIZE: usize = 16384;

/// Samples held by each direction's queue.
pub const QUEUE_CAPACITY: usize = 16384;

/// Per-submission timeout enforced by the USB layer.
pub const TRANSFER_TIMEOUT: Duration = Duration::from_millis(1000);

/// Bulk IN endpoint carrying RX samples.
pub const RX_ENDPOINT: u8 = 0x81;

/// Bulk OUT endpoint carrying TX samples.
pub const TX_ENDPOINT: u8 = 0x02;

/// Parameters fixed for the lifetime of a stream engine.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StreamConfig {
    pub transfer_count: usize,
    /// Must be a non-zero multiple of 8 so every block frames whole RX
    /// groups and whole TX samples.
    pub buffer_size: usize,
    pub queue_capacity: usize,
    pub transfer_timeout: Duration,
    pub rx_endpoint: u8,
    pub tx_endpoint: u8,
}

impl Default for StreamConfig {
    fn default() -> Self {
        StreamConfig {
            transfer_count: TRANSFER_COUNT,
            buffer_size: BUFFER_SIZE,
            queue_capacity: QUEUE_CAPACITY,
            transfer_timeout: TRANSFER_TIMEOUT,
            rx_endpoint: RX_ENDPOINT,
            tx_endpoint: TX_ENDPOINT,
        }
    }
}

impl StreamConfig {
    /// Check the configuration, returning [`Error::InvalidParameter`] on the
    /// first violation.
    pub fn validate(&self) -> Result<()> {
        if self.transfer_count == 0 {
            return Err(Error::InvalidParameter(
                "transfer count must be non-zero".into(),
            ));
        }
        if self.buffer_size == 0 || self.buffer_size % RX_BYTES_PER_SAMPLE != 0 {
            return Err(Error::InvalidParameter(format!(
                "buffer size must be a non-zero multiple of {RX_BYTES_PER_SAMPLE}, got {}",
                self.buffer_size
            )));
        }
        if self.queue_capacity == 0 {
            return Err(Error::InvalidParameter(
                "queue capacity must be non-zero".into(),
            ));
        }
        if self.transfer_timeout.is_zero() {
            return Err(Error::InvalidParameter(
                "transfer timeout must be non-zero".into(),
            ));
        }
        if self.rx_endpoint & 0x80 == 0 {
            return Err(Error::InvalidParameter(format!(
                "RX endpoint 0x{:02X} is not an IN endpoint",
                self.rx_endpoint
            )));
        }
        if self.tx_endpoint & 0x80 != 0 {
            return Err(Error::InvalidParameter(format!(
                "TX endpoint 0x{:02X} is not an OUT endpoint",
                self.tx_endpoint
            )));
        }
        Ok(())
    }
}
