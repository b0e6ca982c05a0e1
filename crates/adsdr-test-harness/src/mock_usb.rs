//! Mock USB transport for deterministic testing of the streaming engine.
//!
//! [`MockUsbTransport`] implements [`UsbTransport`] with an in-memory
//! "device": submitted transfers queue up in flight until the test
//! completes them explicitly with [`complete_rx`](MockUsbTransport::complete_rx),
//! [`complete_tx`](MockUsbTransport::complete_tx), or
//! [`fail_next`](MockUsbTransport::fail_next). Completions are then handed
//! to whichever thread is blocked in `handle_events`.
//!
//! The mock is cheaply cloneable; clones share the same device state, so a
//! test keeps one clone for scripting while the engine owns the other.
//!
//! # Example
//!
//! ```
//! use adsdr_core::{Direction, Transfer, TransferId, UsbTransport};
//! use adsdr_test_harness::MockUsbTransport;
//! use std::time::Duration;
//!
//! let mock = MockUsbTransport::new();
//! mock.submit(Transfer {
//!     id: TransferId::new(Direction::Rx, 0),
//!     endpoint: 0x81,
//!     buffer: vec![0; 16],
//!     length: 16,
//!     timeout: Duration::from_millis(1000),
//! })
//! .unwrap();
//! assert!(mock.complete_rx(&[0x10, 0x00, 0x20, 0x00, 0, 0, 0, 0]));
//!
//! let mut completions = Vec::new();
//! mock.handle_events(&mut completions).unwrap();
//! assert_eq!(completions[0].actual_length, 8);
//! ```

use std::collections::VecDeque;
use std::sync::{Arc, Condvar, Mutex, MutexGuard, PoisonError};
use std::time::{Duration, Instant};

use adsdr_core::error::{Error, Result};
use adsdr_core::transport::{
    Completion, DeviceControl, SubmitError, Transfer, TransferId, TransferStatus, UsbTransport,
};
use adsdr_core::types::Direction;

/// How long `handle_events` waits for activity before returning empty.
const EVENT_WAIT: Duration = Duration::from_millis(20);

/// A scripted submission rejection.
#[derive(Debug, Clone, Copy)]
struct Rejection {
    direction: Direction,
    /// Submissions still allowed before rejecting.
    allow: usize,
}

#[derive(Debug)]
struct State {
    open: bool,
    interrupted: bool,
    in_flight: VecDeque<Transfer>,
    ready: VecDeque<Completion>,
    rejection: Option<Rejection>,
    /// `handle_events` calls still to fail.
    event_failures: usize,
    control_log: Vec<DeviceControl>,
    tx_payloads: Vec<Vec<u8>>,
    submitted: [usize; 2],
    cancelled: Vec<TransferId>,
}

#[derive(Debug)]
struct Shared {
    state: Mutex<State>,
    changed: Condvar,
}

/// A mock [`UsbTransport`] for testing without hardware.
#[derive(Debug, Clone)]
pub struct MockUsbTransport {
    shared: Arc<Shared>,
}

fn slot(direction: Direction) -> usize {
    match direction {
        Direction::Rx => 0,
        Direction::Tx => 1,
    }
}

impl MockUsbTransport {
    /// Create a new mock transport with the device open.
    pub fn new() -> Self {
        MockUsbTransport {
            shared: Arc::new(Shared {
                state: Mutex::new(State {
                    open: true,
                    interrupted: false,
                    in_flight: VecDeque::new(),
                    ready: VecDeque::new(),
                    rejection: None,
                    event_failures: 0,
                    control_log: Vec::new(),
                    tx_payloads: Vec::new(),
                    submitted: [0; 2],
                    cancelled: Vec::new(),
                }),
                changed: Condvar::new(),
            }),
        }
    }

    fn lock(&self) -> MutexGuard<'_, State> {
        self.shared
            .state
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }

    fn take_in_flight(state: &mut State, direction: Direction) -> Option<Transfer> {
        let pos = state
            .in_flight
            .iter()
            .position(|t| t.id.direction == direction)?;
        state.in_flight.remove(pos)
    }

    fn push_ready(&self, mut state: MutexGuard<'_, State>, completion: Completion) {
        state.ready.push_back(completion);
        drop(state);
        self.shared.changed.notify_all();
    }

    /// Complete the oldest in-flight RX transfer with `data`.
    ///
    /// `data` is truncated to the transfer length. Returns `false` if no RX
    /// transfer is in flight.
    pub fn complete_rx(&self, data: &[u8]) -> bool {
        let mut state = self.lock();
        let Some(mut transfer) = Self::take_in_flight(&mut state, Direction::Rx) else {
            return false;
        };
        let n = data.len().min(transfer.length);
        transfer.buffer[..n].copy_from_slice(&data[..n]);
        let completion = Completion {
            id: transfer.id,
            status: TransferStatus::Completed,
            buffer: transfer.buffer,
            actual_length: n,
        };
        self.push_ready(state, completion);
        true
    }

    /// Complete the oldest in-flight TX transfer, returning the bytes the
    /// host sent in it.
    pub fn complete_tx(&self) -> Option<Vec<u8>> {
        let mut state = self.lock();
        let transfer = Self::take_in_flight(&mut state, Direction::Tx)?;
        let payload = transfer.buffer[..transfer.length].to_vec();
        state.tx_payloads.push(payload.clone());
        let completion = Completion {
            id: transfer.id,
            status: TransferStatus::Completed,
            actual_length: transfer.length,
            buffer: transfer.buffer,
        };
        self.push_ready(state, completion);
        Some(payload)
    }

    /// Finish the oldest in-flight transfer of `direction` with a failure
    /// `status`. Returns `false` if none is in flight.
    pub fn fail_next(&self, direction: Direction, status: TransferStatus) -> bool {
        let mut state = self.lock();
        let Some(transfer) = Self::take_in_flight(&mut state, direction) else {
            return false;
        };
        let completion = Completion {
            id: transfer.id,
            status,
            buffer: transfer.buffer,
            actual_length: 0,
        };
        self.push_ready(state, completion);
        true
    }

    /// Reject submissions of `direction` once `allow` more have been
    /// accepted.
    pub fn reject_submissions(&self, direction: Direction, allow: usize) {
        self.lock().rejection = Some(Rejection { direction, allow });
    }

    /// Stop rejecting submissions.
    pub fn accept_submissions(&self) {
        self.lock().rejection = None;
    }

    /// Make the next `count` calls to `handle_events` fail with
    /// [`Error::DeviceIo`] while the device stays open.
    pub fn fail_events(&self, count: usize) {
        self.lock().event_failures = count;
        self.shared.changed.notify_all();
    }

    /// Number of transfers of `direction` currently in flight.
    pub fn in_flight(&self, direction: Direction) -> usize {
        self.lock()
            .in_flight
            .iter()
            .filter(|t| t.id.direction == direction)
            .count()
    }

    /// Total number of accepted submissions of `direction`.
    pub fn submitted(&self, direction: Direction) -> usize {
        self.lock().submitted[slot(direction)]
    }

    /// Block until exactly `count` transfers of `direction` are in flight,
    /// or `timeout` elapses. Returns whether the count was reached.
    pub fn wait_for_in_flight(&self, direction: Direction, count: usize, timeout: Duration) -> bool {
        let deadline = Instant::now() + timeout;
        let mut state = self.lock();
        loop {
            let n = state
                .in_flight
                .iter()
                .filter(|t| t.id.direction == direction)
                .count();
            if n == count {
                return true;
            }
            let now = Instant::now();
            if now >= deadline {
                return false;
            }
            state = self
                .shared
                .changed
                .wait_timeout(state, deadline - now)
                .unwrap_or_else(PoisonError::into_inner)
                .0;
        }
    }

    /// Block until all scripted completions have been picked up by
    /// `handle_events`, or `timeout` elapses.
    pub fn wait_until_drained(&self, timeout: Duration) -> bool {
        let deadline = Instant::now() + timeout;
        let mut state = self.lock();
        while !state.ready.is_empty() {
            let now = Instant::now();
            if now >= deadline {
                return false;
            }
            state = self
                .shared
                .changed
                .wait_timeout(state, deadline - now)
                .unwrap_or_else(PoisonError::into_inner)
                .0;
        }
        true
    }

    /// All control requests issued so far, in order.
    pub fn control_requests(&self) -> Vec<DeviceControl> {
        self.lock().control_log.clone()
    }

    /// Every TX payload captured by [`complete_tx`](Self::complete_tx).
    pub fn tx_payloads(&self) -> Vec<Vec<u8>> {
        self.lock().tx_payloads.clone()
    }

    /// Transfers successfully cancelled so far.
    pub fn cancelled(&self) -> Vec<TransferId> {
        self.lock().cancelled.clone()
    }
}

impl Default for MockUsbTransport {
    fn default() -> Self {
        Self::new()
    }
}

impl UsbTransport for MockUsbTransport {
    fn submit(&self, transfer: Transfer) -> std::result::Result<(), SubmitError> {
        let mut state = self.lock();
        if !state.open {
            return Err(SubmitError {
                transfer,
                error: Error::NotConnected,
            });
        }
        if let Some(rejection) = state.rejection.as_mut() {
            if rejection.direction == transfer.id.direction {
                if rejection.allow == 0 {
                    return Err(SubmitError {
                        transfer,
                        error: Error::DeviceIo("endpoint stalled".into()),
                    });
                }
                rejection.allow -= 1;
            }
        }
        state.submitted[slot(transfer.id.direction)] += 1;
        state.in_flight.push_back(transfer);
        drop(state);
        self.shared.changed.notify_all();
        Ok(())
    }

    fn cancel(&self, id: TransferId) -> Result<()> {
        let mut state = self.lock();
        let pos = state
            .in_flight
            .iter()
            .position(|t| t.id == id)
            .ok_or(Error::TransferNotFound)?;
        let Some(transfer) = state.in_flight.remove(pos) else {
            return Err(Error::TransferNotFound);
        };
        state.cancelled.push(id);
        let completion = Completion {
            id,
            status: TransferStatus::Cancelled,
            buffer: transfer.buffer,
            actual_length: 0,
        };
        self.push_ready(state, completion);
        Ok(())
    }

    fn handle_events(&self, completions: &mut Vec<Completion>) -> Result<()> {
        let mut state = self.lock();
        if state.open && state.event_failures > 0 {
            state.event_failures -= 1;
            return Err(Error::DeviceIo("event handling failed".into()));
        }
        if state.ready.is_empty() && !state.interrupted && state.open {
            state = self
                .shared
                .changed
                .wait_timeout(state, EVENT_WAIT)
                .unwrap_or_else(PoisonError::into_inner)
                .0;
        }
        if !state.open {
            return Err(Error::NotConnected);
        }
        state.interrupted = false;
        completions.extend(state.ready.drain(..));
        drop(state);
        self.shared.changed.notify_all();
        Ok(())
    }

    fn interrupt(&self) {
        self.lock().interrupted = true;
        self.shared.changed.notify_all();
    }

    fn control(&self, request: DeviceControl) -> Result<()> {
        let mut state = self.lock();
        if !state.open {
            return Err(Error::NotConnected);
        }
        state.control_log.push(request);
        Ok(())
    }

    fn close(&self) {
        let mut state = self.lock();
        state.open = false;
        state.in_flight.clear();
        state.ready.clear();
        drop(state);
        self.shared.changed.notify_all();
    }

    fn is_open(&self) -> bool {
        self.lock().open
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn transfer(direction: Direction, index: usize, len: usize) -> Transfer {
        Transfer {
            id: TransferId::new(direction, index),
            endpoint: if direction == Direction::Rx { 0x81 } else { 0x02 },
            buffer: vec![0xAA; len],
            length: len,
            timeout: Duration::from_millis(1000),
        }
    }

    #[test]
    fn rx_completion_copies_data() {
        let mock = MockUsbTransport::new();
        mock.submit(transfer(Direction::Rx, 0, 8)).unwrap();
        assert!(mock.complete_rx(&[1, 2, 3, 4]));

        let mut out = Vec::new();
        mock.handle_events(&mut out).unwrap();
        assert_eq!(out.len(), 1);
        assert_eq!(out[0].status, TransferStatus::Completed);
        assert_eq!(out[0].actual_length, 4);
        assert_eq!(&out[0].buffer[..4], &[1, 2, 3, 4]);
    }

    #[test]
    fn complete_without_in_flight_fails() {
        let mock = MockUsbTransport::new();
        assert!(!mock.complete_rx(&[0; 8]));
        assert!(mock.complete_tx().is_none());
    }

    #[test]
    fn tx_completion_captures_payload() {
        let mock = MockUsbTransport::new();
        let mut t = transfer(Direction::Tx, 1, 8);
        t.length = 4;
        mock.submit(t).unwrap();
        assert_eq!(mock.complete_tx().unwrap(), vec![0xAA; 4]);
        assert_eq!(mock.tx_payloads().len(), 1);
    }

    #[test]
    fn cancel_in_flight_then_not_found() {
        let mock = MockUsbTransport::new();
        mock.submit(transfer(Direction::Rx, 2, 8)).unwrap();
        let id = TransferId::new(Direction::Rx, 2);
        mock.cancel(id).unwrap();
        assert!(matches!(mock.cancel(id), Err(Error::TransferNotFound)));

        let mut out = Vec::new();
        mock.handle_events(&mut out).unwrap();
        assert_eq!(out[0].status, TransferStatus::Cancelled);
        assert_eq!(mock.cancelled(), vec![id]);
    }

    #[test]
    fn rejection_after_allowance() {
        let mock = MockUsbTransport::new();
        mock.reject_submissions(Direction::Rx, 1);
        mock.submit(transfer(Direction::Tx, 0, 8)).unwrap();
        mock.submit(transfer(Direction::Rx, 0, 8)).unwrap();
        let err = mock.submit(transfer(Direction::Rx, 1, 8)).unwrap_err();
        assert_eq!(err.transfer.id.index, 1);
        assert_eq!(mock.submitted(Direction::Rx), 1);
        mock.accept_submissions();
        mock.submit(transfer(Direction::Rx, 1, 8)).unwrap();
    }

    #[test]
    fn scripted_event_failures_run_out() {
        let mock = MockUsbTransport::new();
        mock.fail_events(2);
        let mut out = Vec::new();
        assert!(matches!(mock.handle_events(&mut out), Err(Error::DeviceIo(_))));
        assert!(matches!(mock.handle_events(&mut out), Err(Error::DeviceIo(_))));
        mock.handle_events(&mut out).unwrap();
        assert!(out.is_empty());
    }

    #[test]
    fn handle_events_times_out_empty() {
        let mock = MockUsbTransport::new();
        let mut out = Vec::new();
        mock.handle_events(&mut out).unwrap();
        assert!(out.is_empty());
    }

    #[test]
    fn close_unblocks_and_reports_not_connected() {
        let mock = MockUsbTransport::new();
        mock.submit(transfer(Direction::Rx, 0, 8)).unwrap();
        mock.close();
        let mut out = Vec::new();
        assert!(matches!(
            mock.handle_events(&mut out),
            Err(Error::NotConnected)
        ));
        assert!(!mock.is_open());
        assert_eq!(mock.in_flight(Direction::Rx), 0);
        assert!(mock.submit(transfer(Direction::Rx, 0, 8)).is_err());
    }

    #[test]
    fn control_requests_are_logged() {
        let mock = MockUsbTransport::new();
        mock.control(DeviceControl::Stop).unwrap();
        mock.control(DeviceControl::Start).unwrap();
        assert_eq!(
            mock.control_requests(),
            vec![DeviceControl::Stop, DeviceControl::Start]
        );
    }

    #[test]
    fn wait_for_in_flight_sees_submission_from_other_thread() {
        let mock = MockUsbTransport::new();
        let clone = mock.clone();
        let handle = std::thread::spawn(move || {
            clone.submit(transfer(Direction::Tx, 0, 8)).unwrap();
        });
        assert!(mock.wait_for_in_flight(Direction::Tx, 1, Duration::from_secs(2)));
        handle.join().unwrap();
    }
}
