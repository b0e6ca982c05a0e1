//! adsdr-test-harness: Mock collaborators for adsdr.
//!
//! This crate provides [`MockUsbTransport`] for deterministic testing of the
//! streaming engine without a USB device, and [`MockTransceiver`] for
//! testing the command dispatcher without an RF chip.

pub mod mock_transceiver;
pub mod mock_usb;

pub use mock_transceiver::MockTransceiver;
pub use mock_usb::MockUsbTransport;
