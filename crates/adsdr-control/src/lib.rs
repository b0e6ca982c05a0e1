//! adsdr-control: Configuration command dispatch for the AD936x transceiver.
//!
//! Commands are identified by a fixed table of 25 identifiers (see
//! [`CommandId`](adsdr_core::CommandId)). [`CommandDispatcher`] validates
//! the identifier, runs the matching handler against the owned
//! [`Transceiver`](adsdr_core::Transceiver), and returns a
//! [`Response`](adsdr_core::Response) carrying the value the hardware
//! actually applied.

pub mod dispatcher;
pub mod handlers;
pub mod ports;

pub use dispatcher::CommandDispatcher;
pub use handlers::FPGA_VERSION;
pub use ports::{rx_port_for, tx_port_for};
