//! Streaming counters.
//!
//! Overflow, underrun, and transient transfer failures never surface as
//! errors on the streaming path. They are counted here instead, so callers
//! and tests can observe them.

use std::sync::atomic::{AtomicU64, Ordering};

/// Live counters, updated by the I/O worker and read by the application.
#[derive(Debug, Default)]
pub struct StreamStats {
    rx_transfers: AtomicU64,
    tx_transfers: AtomicU64,
    rx_samples: AtomicU64,
    tx_samples: AtomicU64,
    rx_overflow: AtomicU64,
    tx_underrun: AtomicU64,
    transfer_errors: AtomicU64,
    resubmit_failures: AtomicU64,
    event_errors: AtomicU64,
}

/// A point-in-time copy of [`StreamStats`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct StatsSnapshot {
    /// Successful RX completions.
    pub rx_transfers: u64,
    /// Successful TX completions.
    pub tx_transfers: u64,
    /// Samples decoded from RX completions.
    pub rx_samples: u64,
    /// Samples encoded into TX wire blocks.
    pub tx_samples: u64,
    /// RX samples dropped because the RX queue was full.
    pub rx_overflow: u64,
    /// Zero samples substituted because the TX queue was empty.
    pub tx_underrun: u64,
    /// Completions with a failure status (cancellations excluded).
    pub transfer_errors: u64,
    /// Resubmissions rejected by the transport.
    pub resubmit_failures: u64,
    /// Failed `handle_events` calls on the I/O worker.
    pub event_errors: u64,
}

impl StreamStats {
    pub fn new() -> Self {
        Self::default()
    }

    pub(crate) fn rx_transfer(&self, samples: usize) {
        self.rx_transfers.fetch_add(1, Ordering::Relaxed);
        self.rx_samples.fetch_add(samples as u64, Ordering::Relaxed);
    }

    pub(crate) fn tx_transfer(&self) {
        self.tx_transfers.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn tx_encoded(&self, samples: usize) {
        self.tx_samples.fetch_add(samples as u64, Ordering::Relaxed);
    }

    pub(crate) fn rx_overflow(&self, dropped: usize) {
        if dropped > 0 {
            self.rx_overflow.fetch_add(dropped as u64, Ordering::Relaxed);
        }
    }

    pub(crate) fn tx_underrun(&self, zeros: usize) {
        if zeros > 0 {
            self.tx_underrun.fetch_add(zeros as u64, Ordering::Relaxed);
        }
    }

    pub(crate) fn transfer_error(&self) {
        self.transfer_errors.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn resubmit_failure(&self) {
        self.resubmit_failures.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn event_error(&self) {
        self.event_errors.fetch_add(1, Ordering::Relaxed);
    }

    /// Copy every counter.
    pub fn snapshot(&self) -> StatsSnapshot {
        StatsSnapshot {
            rx_transfers: self.rx_transfers.load(Ordering::Relaxed),
            tx_transfers: self.tx_transfers.load(Ordering::Relaxed),
            rx_samples: self.rx_samples.load(Ordering::Relaxed),
            tx_samples: self.tx_samples.load(Ordering::Relaxed),
            rx_overflow: self.rx_overflow.load(Ordering::Relaxed),
            tx_underrun: self.tx_underrun.load(Ordering::Relaxed),
            transfer_errors: self.transfer_errors.load(Ordering::Relaxed),
            resubmit_failures: self.resubmit_failures.load(Ordering::Relaxed),
            event_errors: self.event_errors.load(Ordering::Relaxed),
        }
    }
}
