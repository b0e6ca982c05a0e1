//! USB transport collaborator.
//!
//! The [`UsbTransport`] trait abstracts over the host-side USB stack: bulk
//! transfer submission and cancellation, the blocking completion pump, and
//! vendor control requests. Device discovery, open/claim, and firmware
//! upload happen before a transport is handed to the library.
//!
//! Transfers move their [`WireBlock`] buffer into the transport on
//! [`submit`](UsbTransport::submit) and get it back inside the
//! [`Completion`]. Ownership is the guarantee that nothing reads a buffer
//! while the host controller may still be writing it.

use std::fmt;
use std::time::Duration;

use crate::error::{Error, Result};
use crate::types::Direction;

/// Raw byte buffer exchanged with the USB host controller.
pub type WireBlock = Vec<u8>;

/// Identifies one transfer slot of one direction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct TransferId {
    pub direction: Direction,
    pub index: usize,
}

impl TransferId {
    pub fn new(direction: Direction, index: usize) -> Self {
        TransferId { direction, index }
    }
}

impl fmt::Display for TransferId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}#{}", self.direction, self.index)
    }
}

/// A bulk transfer ready for submission.
#[derive(Debug)]
pub struct Transfer {
    pub id: TransferId,
    /// Endpoint address (bit 7 set for IN endpoints).
    pub endpoint: u8,
    /// Buffer owned by the transfer while it is in flight.
    pub buffer: WireBlock,
    /// Number of bytes to move: the full buffer for RX, the filled
    /// prefix for TX.
    pub length: usize,
    /// Per-submission timeout enforced by the USB layer. Expiry surfaces
    /// as a [`TransferStatus::TimedOut`] completion.
    pub timeout: Duration,
}

/// Final status of a completed transfer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransferStatus {
    /// The transfer finished; `actual_length` bytes were moved.
    Completed,
    /// Generic host-controller failure.
    Error,
    /// The per-submission timeout expired.
    TimedOut,
    /// The endpoint stalled.
    Stall,
    /// The device went away.
    NoDevice,
    /// The device sent more data than requested.
    Overflow,
    /// The transfer was cancelled through [`UsbTransport::cancel`].
    Cancelled,
}

impl TransferStatus {
    /// Returns `true` for every status other than `Completed` and
    /// `Cancelled`.
    pub fn is_failure(self) -> bool {
        !matches!(self, TransferStatus::Completed | TransferStatus::Cancelled)
    }
}

impl fmt::Display for TransferStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            TransferStatus::Completed => "completed",
            TransferStatus::Error => "error",
            TransferStatus::TimedOut => "timed out",
            TransferStatus::Stall => "stall",
            TransferStatus::NoDevice => "no device",
            TransferStatus::Overflow => "overflow",
            TransferStatus::Cancelled => "cancelled",
        };
        write!(f, "{s}")
    }
}

/// A finished transfer handed back by [`UsbTransport::handle_events`].
#[derive(Debug)]
pub struct Completion {
    pub id: TransferId,
    pub status: TransferStatus,
    /// The buffer, returned to the owner of the slot.
    pub buffer: WireBlock,
    /// Bytes actually transferred.
    pub actual_length: usize,
}

/// A rejected submission. The transfer, and with it the buffer, is
/// handed back to the caller.
#[derive(Debug, thiserror::Error)]
#[error("submission of {} rejected: {error}", transfer.id)]
pub struct SubmitError {
    pub transfer: Transfer,
    #[source]
    pub error: Error,
}

/// Vendor control requests understood by the bridge firmware.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeviceControl {
    /// Start streaming on the bridge side.
    Start,
    /// Stop streaming and let the bridge settle.
    Stop,
    /// Reset the bridge's streaming state.
    Reset,
}

impl DeviceControl {
    /// `bRequest` code of the vendor request.
    pub fn request(self) -> u8 {
        match self {
            DeviceControl::Start => 0xB2,
            DeviceControl::Stop => 0xB3,
            DeviceControl::Reset => 0xB4,
        }
    }

    /// Payload carried by the OUT control transfer.
    pub fn payload(self) -> &'static [u8] {
        match self {
            DeviceControl::Start | DeviceControl::Stop => &[0],
            DeviceControl::Reset => &[0, 0, 0xFF],
        }
    }
}

/// Host-side USB stack used by the streaming engine.
///
/// All methods take `&self`: the I/O worker blocks in
/// [`handle_events`](UsbTransport::handle_events) while application threads
/// call [`interrupt`](UsbTransport::interrupt) and
/// [`close`](UsbTransport::close), so implementations synchronize
/// internally.
pub trait UsbTransport: Send + Sync {
    /// Submit a bulk transfer.
    ///
    /// On rejection (device closed, endpoint stalled, resource exhaustion)
    /// the transfer is returned inside the [`SubmitError`].
    fn submit(&self, transfer: Transfer) -> std::result::Result<(), SubmitError>;

    /// Request cancellation of an in-flight transfer.
    ///
    /// The cancelled transfer later surfaces through
    /// [`handle_events`](UsbTransport::handle_events) with
    /// [`TransferStatus::Cancelled`]. Returns [`Error::TransferNotFound`]
    /// if the transfer is not in flight.
    fn cancel(&self, id: TransferId) -> Result<()>;

    /// Block until at least one transfer completes, then append the
    /// completions to `completions`.
    ///
    /// May also return early with nothing appended after an internal
    /// timeout or an [`interrupt`](UsbTransport::interrupt). Returns
    /// [`Error::NotConnected`] once the transport has been closed.
    fn handle_events(&self, completions: &mut Vec<Completion>) -> Result<()>;

    /// Wake a thread blocked in [`handle_events`](UsbTransport::handle_events).
    fn interrupt(&self);

    /// Issue a vendor control request.
    fn control(&self, request: DeviceControl) -> Result<()>;

    /// Close the device handle. Unblocks any pending
    /// [`handle_events`](UsbTransport::handle_events) call and drops
    /// transfers still in flight.
    fn close(&self);

    /// Whether the device handle is still open.
    fn is_open(&self) -> bool;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn failure_classification() {
        assert!(!TransferStatus::Completed.is_failure());
        assert!(!TransferStatus::Cancelled.is_failure());
        assert!(TransferStatus::TimedOut.is_failure());
        assert!(TransferStatus::Stall.is_failure());
        assert!(TransferStatus::NoDevice.is_failure());
    }

    #[test]
    fn control_request_payloads() {
        assert_eq!(DeviceControl::Start.payload(), &[0]);
        assert_eq!(DeviceControl::Stop.payload(), &[0]);
        assert_eq!(DeviceControl::Reset.payload(), &[0, 0, 0xFF]);
        assert_ne!(DeviceControl::Start.request(), DeviceControl::Stop.request());
    }

    #[test]
    fn submit_error_returns_transfer() {
        let transfer = Transfer {
            id: TransferId::new(Direction::Rx, 3),
            endpoint: 0x81,
            buffer: vec![0u8; 16],
            length: 16,
            timeout: Duration::from_millis(1000),
        };
        let err = SubmitError {
            transfer,
            error: Error::DeviceIo("endpoint stalled".into()),
        };
        assert_eq!(
            err.to_string(),
            "submission of RX#3 rejected: device I/O error: endpoint stalled"
        );
        assert_eq!(err.transfer.buffer.len(), 16);
    }
}
