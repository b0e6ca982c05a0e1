//! Fixed pool of bulk transfers for one stream direction.
//!
//! Each slot owns one [`WireBlock`] and moves through
//!
//! ```text
//! Idle --submit--> Submitted --completion--> Idle (caller resubmits)
//!                      |
//!                    cancel
//!                      v
//!                  Cancelling --completion--> Idle (never resubmitted)
//! ```
//!
//! While a slot is `Submitted` or `Cancelling` its buffer belongs to the
//! transport; the pool gets it back through [`TransferPool::reclaim`].
//! A slot is therefore never submitted twice, and its buffer is never
//! visible to the codec while the host controller may be writing it.
//!
//! The pool is driven only from the I/O worker thread.

use std::time::Duration;

use tracing::{debug, warn};

use adsdr_core::error::{Error, Result};
use adsdr_core::transport::{
    Completion, SubmitError, Transfer, TransferId, TransferStatus, UsbTransport, WireBlock,
};
use adsdr_core::types::Direction;

/// Observable state of one slot.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SlotState {
    Idle,
    Submitted,
    Cancelling,
}

#[derive(Debug)]
enum Slot {
    Idle(WireBlock),
    Submitted,
    Cancelling,
}

impl Slot {
    fn state(&self) -> SlotState {
        match self {
            Slot::Idle(_) => SlotState::Idle,
            Slot::Submitted => SlotState::Submitted,
            Slot::Cancelling => SlotState::Cancelling,
        }
    }
}

/// What the worker should do with a reclaimed slot.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Reclaimed {
    /// The transfer finished while the stream was running. The buffer is
    /// back in the slot; the caller processes it and resubmits.
    Ready {
        index: usize,
        status: TransferStatus,
        actual_length: usize,
    },
    /// The transfer was cancelled, or finished after a cancel was
    /// requested. The slot stays idle.
    Stopped { index: usize },
}

/// A fixed set of transfer slots bound to one endpoint.
#[derive(Debug)]
pub struct TransferPool {
    direction: Direction,
    endpoint: u8,
    buffer_size: usize,
    timeout: Duration,
    slots: Vec<Slot>,
}

impl TransferPool {
    /// Allocate `count` slots, each with a zeroed `buffer_size`-byte block.
    pub fn new(
        direction: Direction,
        endpoint: u8,
        count: usize,
        buffer_size: usize,
        timeout: Duration,
    ) -> Self {
        let slots = (0..count)
            .map(|_| Slot::Idle(vec![0u8; buffer_size]))
            .collect();
        TransferPool {
            direction,
            endpoint,
            buffer_size,
            timeout,
            slots,
        }
    }

    pub fn direction(&self) -> Direction {
        self.direction
    }

    pub fn len(&self) -> usize {
        self.slots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }

    pub fn buffer_size(&self) -> usize {
        self.buffer_size
    }

    pub fn state(&self, index: usize) -> Option<SlotState> {
        self.slots.get(index).map(Slot::state)
    }

    /// Whether every slot is idle.
    pub fn is_idle(&self) -> bool {
        self.slots.iter().all(|s| matches!(s, Slot::Idle(_)))
    }

    /// Number of slots whose buffer is with the transport.
    pub fn outstanding(&self) -> usize {
        self.slots
            .iter()
            .filter(|s| !matches!(s, Slot::Idle(_)))
            .count()
    }

    /// Number of slots cancelled but not yet reclaimed.
    pub fn cancelling(&self) -> usize {
        self.slots
            .iter()
            .filter(|s| matches!(s, Slot::Cancelling))
            .count()
    }

    /// Whether any slot is in flight and not being cancelled.
    pub fn is_running(&self) -> bool {
        self.slots.iter().any(|s| matches!(s, Slot::Submitted))
    }

    /// The buffer of an idle slot.
    pub fn buffer(&self, index: usize) -> Option<&[u8]> {
        match self.slots.get(index) {
            Some(Slot::Idle(buf)) => Some(buf),
            _ => None,
        }
    }

    /// The buffer of an idle slot, for filling before submission.
    pub fn buffer_mut(&mut self, index: usize) -> Option<&mut [u8]> {
        match self.slots.get_mut(index) {
            Some(Slot::Idle(buf)) => Some(buf),
            _ => None,
        }
    }

    fn id(&self, index: usize) -> TransferId {
        TransferId::new(self.direction, index)
    }

    /// Submit an idle slot, moving `length` bytes of its buffer.
    ///
    /// On rejection the buffer returns to the slot, which stays idle, and
    /// the failure surfaces as [`Error::DeviceIo`].
    pub fn submit(&mut self, transport: &dyn UsbTransport, index: usize, length: usize) -> Result<()> {
        let id = self.id(index);
        let Some(slot) = self.slots.get_mut(index) else {
            return Err(Error::InvalidParameter(format!("no transfer slot {id}")));
        };
        let buffer = match std::mem::replace(slot, Slot::Submitted) {
            Slot::Idle(buffer) => buffer,
            busy => {
                *slot = busy;
                return Err(Error::InvalidParameter(format!("{id} is already in flight")));
            }
        };
        let transfer = Transfer {
            id,
            endpoint: self.endpoint,
            length: length.min(buffer.len()),
            buffer,
            timeout: self.timeout,
        };
        match transport.submit(transfer) {
            Ok(()) => Ok(()),
            Err(SubmitError { transfer, error }) => {
                *slot = Slot::Idle(transfer.buffer);
                Err(Error::DeviceIo(format!("submit {id}: {error}")))
            }
        }
    }

    /// Fill and submit every slot.
    ///
    /// `prepare` runs on each buffer before its submission and returns the
    /// number of bytes to send. If any submission fails, the slots already
    /// submitted are cancelled and the error is returned.
    ///
    /// Arming needs every slot idle: a pool with transfers in flight is
    /// already running, and one with cancellations still outstanding has
    /// to be reclaimed first.
    pub fn arm<F>(&mut self, transport: &dyn UsbTransport, mut prepare: F) -> Result<()>
    where
        F: FnMut(&mut [u8]) -> usize,
    {
        if self.is_running() {
            return Err(Error::InvalidParameter(format!(
                "{} stream is already running",
                self.direction
            )));
        }
        if !self.is_idle() {
            return Err(Error::DeviceIo(format!(
                "{} stream has {} cancellations outstanding",
                self.direction,
                self.cancelling()
            )));
        }
        for index in 0..self.slots.len() {
            let length = match self.buffer_mut(index) {
                Some(buf) => prepare(buf),
                None => continue,
            };
            if let Err(e) = self.submit(transport, index, length) {
                warn!(direction = %self.direction, slot = index, error = %e, "arming failed, rolling back");
                if let Err(cancel_err) = self.cancel_all(transport) {
                    warn!(direction = %self.direction, error = %cancel_err, "rollback cancel failed");
                }
                return Err(e);
            }
        }
        debug!(direction = %self.direction, slots = self.slots.len(), "transfers armed");
        Ok(())
    }

    /// Cancel one slot.
    ///
    /// Cancelling an idle slot, or one the transport no longer knows about,
    /// succeeds. A slot that was in flight is never resubmitted once its
    /// completion arrives.
    pub fn cancel(&mut self, transport: &dyn UsbTransport, index: usize) -> Result<()> {
        let id = self.id(index);
        let Some(slot) = self.slots.get_mut(index) else {
            return Err(Error::InvalidParameter(format!("no transfer slot {id}")));
        };
        match slot {
            Slot::Idle(_) | Slot::Cancelling => Ok(()),
            Slot::Submitted => match transport.cancel(id) {
                Ok(()) | Err(Error::TransferNotFound) => {
                    *slot = Slot::Cancelling;
                    Ok(())
                }
                Err(e) => Err(Error::DeviceIo(format!("cancel {id}: {e}"))),
            },
        }
    }

    /// Cancel every slot. All slots are attempted; the first failure is
    /// returned.
    pub fn cancel_all(&mut self, transport: &dyn UsbTransport) -> Result<()> {
        let mut first_err = None;
        for index in 0..self.slots.len() {
            if let Err(e) = self.cancel(transport, index) {
                warn!(direction = %self.direction, slot = index, error = %e, "cancel failed");
                first_err.get_or_insert(e);
            }
        }
        match first_err {
            Some(e) => Err(e),
            None => Ok(()),
        }
    }

    /// Take back the buffer of a finished transfer.
    ///
    /// Returns `None` for a completion that does not belong to an
    /// outstanding slot of this pool.
    pub fn reclaim(&mut self, completion: Completion) -> Option<Reclaimed> {
        let index = completion.id.index;
        if completion.id.direction != self.direction {
            return None;
        }
        let slot = self.slots.get_mut(index)?;
        let stopping = match slot {
            Slot::Submitted => completion.status == TransferStatus::Cancelled,
            Slot::Cancelling => true,
            Slot::Idle(_) => return None,
        };
        *slot = Slot::Idle(completion.buffer);
        if stopping {
            Some(Reclaimed::Stopped { index })
        } else {
            Some(Reclaimed::Ready {
                index,
                status: completion.status,
                actual_length: completion.actual_length,
            })
        }
    }
}
