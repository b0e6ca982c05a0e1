//! adsdr-stream: Real-time USB sample streaming engine.
//!
//! The engine keeps a fixed pool of bulk transfers in flight per direction
//! and moves samples between them and the application:
//!
//! ```text
//!   RX: device --> TransferPool --> codec::decode --> callback | RX queue --> app
//!   TX: app --> callback | TX queue --> codec::encode --> TransferPool --> device
//! ```
//!
//! One dedicated I/O worker thread owns every transfer and is the only
//! thread that blocks (inside [`UsbTransport::handle_events`]). The
//! application reaches it through [`StreamEngine`], and exchanges samples
//! through lock-free SPSC queues or the async [`channel`] bridge.
//!
//! Queue overflow and underrun are not errors: samples are dropped or
//! zero-filled and counted in [`StatsSnapshot`].
//!
//! [`UsbTransport::handle_events`]: adsdr_core::UsbTransport::handle_events

pub mod channel;
pub mod codec;
pub mod config;
pub mod delivery;
pub mod engine;
pub(crate) mod io;
pub mod pool;
pub mod queue;
pub mod stats;

pub use channel::{SampleReceiver, SampleSender, rx_channel, tx_channel};
pub use config::StreamConfig;
pub use delivery::{RxCallback, TxCallback};
pub use engine::StreamEngine;
pub use stats::StatsSnapshot;
