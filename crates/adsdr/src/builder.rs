//! AdSdrBuilder -- fluent builder for constructing [`AdSdr`] instances.
//!
//! Separates configuration from construction so that callers can size the
//! transfer pools and queues and choose transceiver init parameters before
//! the I/O worker is started.
//!
//! # Example
//!
//! ```no_run
//! use adsdr::AdSdrBuilder;
//! use adsdr_test_harness::{MockTransceiver, MockUsbTransport};
//! use std::time::Duration;
//!
//! # fn example() -> adsdr::Result<()> {
//! let sdr = AdSdrBuilder::new()
//!     .transfer_count(32)
//!     .buffer_size(8192)
//!     .transfer_timeout(Duration::from_millis(500))
//!     .build(MockUsbTransport::new(), MockTransceiver::new())?;
//! sdr.init_sdr()?;
//! # Ok(())
//! # }
//! ```

use std::sync::Arc;
use std::time::Duration;

use adsdr_control::CommandDispatcher;
use adsdr_core::error::Result;
use adsdr_core::transceiver::{InitParams, Transceiver};
use adsdr_core::transport::UsbTransport;
use adsdr_stream::{StreamConfig, StreamEngine};

use crate::device::AdSdr;

/// Fluent builder for [`AdSdr`].
///
/// Every setting defaults to the values in [`StreamConfig::default`] and
/// [`InitParams::default`].
#[derive(Debug, Clone, Default)]
pub struct AdSdrBuilder {
    config: StreamConfig,
    init_params: InitParams,
}

impl AdSdrBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Transfer slots kept in flight per direction (default: 64).
    pub fn transfer_count(mut self, count: usize) -> Self {
        self.config.transfer_count = count;
        self
    }

    /// Bytes per wire block (default: 16384). Must be a non-zero multiple
    /// of 8.
    pub fn buffer_size(mut self, bytes: usize) -> Self {
        self.config.buffer_size = bytes;
        self
    }

    /// Samples held by each direction's queue (default: 16384).
    pub fn queue_capacity(mut self, samples: usize) -> Self {
        self.config.queue_capacity = samples;
        self
    }

    /// Per-submission timeout enforced by the USB layer (default: 1s).
    pub fn transfer_timeout(mut self, timeout: Duration) -> Self {
        self.config.transfer_timeout = timeout;
        self
    }

    /// Parameters handed to the transceiver by [`AdSdr::init_sdr`].
    pub fn init_params(mut self, params: InitParams) -> Self {
        self.init_params = params;
        self
    }

    /// Validate the configuration, start the I/O worker, and return the
    /// device handle.
    ///
    /// The transceiver is not touched until [`AdSdr::init_sdr`].
    pub fn build<U, T>(self, transport: U, transceiver: T) -> Result<AdSdr>
    where
        U: UsbTransport + 'static,
        T: Transceiver + 'static,
    {
        let transport: Arc<dyn UsbTransport> = Arc::new(transport);
        let engine = StreamEngine::new(Arc::clone(&transport), self.config)?;
        let dispatcher = CommandDispatcher::new(Box::new(transceiver));
        Ok(AdSdr::new(transport, engine, dispatcher, self.init_params))
    }
}
