//! # adsdr -- Host driver for USB-attached AD936x radios
//!
//! `adsdr` streams baseband samples to and from a USB SDR built around an
//! AD936x transceiver and a USB bridge chip, and configures the
//! transceiver through a small fixed command protocol.
//!
//! ## Quick Start
//!
//! ```no_run
//! use adsdr::{AdSdrBuilder, Command, CommandId};
//! use adsdr_test_harness::{MockTransceiver, MockUsbTransport};
//!
//! #[tokio::main]
//! async fn main() -> adsdr::Result<()> {
//!     let sdr = AdSdrBuilder::new()
//!         .build(MockUsbTransport::new(), MockTransceiver::new())?;
//!     sdr.init_sdr()?;
//!
//!     sdr.send_cmd(Command::with_param(CommandId::SetRxLoFreq, 2_450_000_000))?;
//!     let mut rx = sdr.start_rx_stream(16).await?;
//!     while let Some(batch) = rx.recv().await {
//!         println!("{} samples", batch.len());
//!     }
//!     Ok(())
//! }
//! ```
//!
//! ## Architecture
//!
//! | Crate                | Purpose                                              |
//! |----------------------|------------------------------------------------------|
//! | `adsdr-core`         | Errors, sample and protocol types, collaborator traits |
//! | `adsdr-stream`       | Transfer pools, I/O worker, sample codec and queues  |
//! | `adsdr-control`      | Command dispatcher and RF port policy                |
//! | `adsdr-test-harness` | Mock USB transport and mock transceiver              |
//! | **`adsdr`**          | This facade crate -- device handle and re-exports    |
//!
//! USB enumeration, firmware upload, and the transceiver's vendor init
//! routine live behind the [`UsbTransport`] and [`Transceiver`] traits.

pub mod builder;
pub mod device;

pub use builder::AdSdrBuilder;
pub use device::AdSdr;

pub use adsdr_control::{CommandDispatcher, rx_port_for, tx_port_for};
pub use adsdr_core::*;
pub use adsdr_stream::{
    RxCallback, SampleReceiver, SampleSender, StatsSnapshot, StreamConfig, TxCallback,
};
