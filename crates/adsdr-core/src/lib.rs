//! adsdr-core: Core traits, types, and error definitions for adsdr.
//!
//! This crate defines the hardware-agnostic pieces shared by the
//! streaming engine, the command dispatcher, and the device facade.
//!
//! # Key types
//!
//! - [`UsbTransport`] -- bulk transfer submission and completion pump
//! - [`Transceiver`] -- named property access to the RF chip
//! - [`Command`] / [`Response`] -- control protocol records
//! - [`Sample`] -- one complex baseband sample
//! - [`Error`] / [`Result`] -- error handling

pub mod command;
pub mod error;
pub mod transceiver;
pub mod transport;
pub mod types;

// Re-export key types at crate root for ergonomic `use adsdr_core::*`.
pub use command::{Command, CommandId, CommandStatus, RECORD_LEN, Response, ValueWidth};
pub use error::{Error, Result};
pub use transceiver::{InitParams, Property, Transceiver};
pub use transport::{
    Completion, DeviceControl, SubmitError, Transfer, TransferId, TransferStatus, UsbTransport,
    WireBlock,
};
pub use types::*;
