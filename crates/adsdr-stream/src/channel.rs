//! Async channel bridge for sample streams.
//!
//! The I/O worker must never block, so the bridge callbacks use
//! `try_send`/`try_recv` on bounded tokio channels: a full RX channel drops
//! the batch and counts it, an empty TX channel produces zero samples and
//! counts those.
//! Application tasks consume [`SampleReceiver`] and feed [`SampleSender`]
//! with ordinary `.await`s.

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use tokio::sync::mpsc;

use adsdr_core::error::{Error, Result};
use adsdr_core::types::Sample;

use crate::delivery::{RxCallback, TxCallback};

// ---------------------------------------------------------------------------
// SampleReceiver
// ---------------------------------------------------------------------------

/// Receives decoded RX batches from the device.
pub struct SampleReceiver {
    rx: mpsc::Receiver<Vec<Sample>>,
    dropped: Arc<AtomicU64>,
}

impl SampleReceiver {
    /// Receive the next batch.
    ///
    /// Returns `None` when the stream has been stopped.
    pub async fn recv(&mut self) -> Option<Vec<Sample>> {
        self.rx.recv().await
    }

    /// Take a batch if one is ready.
    pub fn try_recv(&mut self) -> Option<Vec<Sample>> {
        self.rx.try_recv().ok()
    }

    /// Batches dropped because the channel was full.
    pub fn dropped_batches(&self) -> u64 {
        self.dropped.load(Ordering::Relaxed)
    }
}

/// Build an RX callback that forwards each batch into a channel of `depth`
/// batches.
pub fn rx_channel(depth: usize) -> (RxCallback, SampleReceiver) {
    let (tx, rx) = mpsc::channel(depth.max(1));
    let dropped = Arc::new(AtomicU64::new(0));
    let dropped_cb = Arc::clone(&dropped);

    let callback: RxCallback = Box::new(move |batch: &[Sample]| {
        // Never block the I/O worker.
        if tx.try_send(batch.to_vec()).is_err() {
            dropped_cb.fetch_add(1, Ordering::Relaxed);
        }
    });

    (callback, SampleReceiver { rx, dropped })
}

// ---------------------------------------------------------------------------
// SampleSender
// ---------------------------------------------------------------------------

/// Sends sample batches to the device's TX stream.
///
/// Batches may be any length; they are sliced across transfer blocks in
/// order.
#[derive(Clone)]
pub struct SampleSender {
    tx: mpsc::Sender<Vec<Sample>>,
    underrun: Arc<AtomicU64>,
}

impl SampleSender {
    /// Queue a batch for transmission, waiting for channel space.
    ///
    /// Returns [`Error::StreamClosed`] once the TX stream has been stopped.
    pub async fn send(&self, batch: Vec<Sample>) -> Result<()> {
        self.tx.send(batch).await.map_err(|_| Error::StreamClosed)
    }

    /// Queue a batch without waiting. Fails with [`Error::StreamClosed`]
    /// if the stream is gone, or hands nothing over if the channel is
    /// full (returned as `Ok(false)`).
    pub fn try_send(&self, batch: Vec<Sample>) -> Result<bool> {
        match self.tx.try_send(batch) {
            Ok(()) => Ok(true),
            Err(mpsc::error::TrySendError::Full(_)) => Ok(false),
            Err(mpsc::error::TrySendError::Closed(_)) => Err(Error::StreamClosed),
        }
    }

    /// Zero samples transmitted because no batch was waiting.
    pub fn underrun_samples(&self) -> u64 {
        self.underrun.load(Ordering::Relaxed)
    }
}

/// Build a TX callback that drains a channel of `depth` batches, padding
/// with zero samples when the application falls behind.
pub fn tx_channel(depth: usize) -> (TxCallback, SampleSender) {
    let (tx, mut rx) = mpsc::channel::<Vec<Sample>>(depth.max(1));
    let mut pending: Vec<Sample> = Vec::new();
    let mut offset = 0usize;
    let underrun = Arc::new(AtomicU64::new(0));
    let underrun_cb = Arc::clone(&underrun);

    let callback: TxCallback = Box::new(move |out: &mut [Sample]| {
        let mut filled = 0;
        while filled < out.len() {
            if offset == pending.len() {
                match rx.try_recv() {
                    Ok(batch) => {
                        pending = batch;
                        offset = 0;
                        continue;
                    }
                    // No data available: transmit silence.
                    Err(_) => break,
                }
            }
            let n = (pending.len() - offset).min(out.len() - filled);
            out[filled..filled + n].copy_from_slice(&pending[offset..offset + n]);
            filled += n;
            offset += n;
        }
        let silent = &mut out[filled..];
        if !silent.is_empty() {
            silent.fill(Sample::ZERO);
            underrun_cb.fetch_add(silent.len() as u64, Ordering::Relaxed);
        }
    });

    (callback, SampleSender { tx, underrun })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn rx_batches_forwarded_in_order() {
        let (mut callback, mut receiver) = rx_channel(4);
        callback(&[Sample::new(1, 2)]);
        callback(&[Sample::new(3, 4), Sample::new(5, 6)]);

        assert_eq!(receiver.recv().await.unwrap(), vec![Sample::new(1, 2)]);
        assert_eq!(receiver.recv().await.unwrap().len(), 2);
        assert!(receiver.try_recv().is_none());
    }

    #[tokio::test]
    async fn rx_full_channel_drops_batches() {
        let (mut callback, mut receiver) = rx_channel(1);
        callback(&[Sample::new(1, 1)]);
        callback(&[Sample::new(2, 2)]);
        callback(&[Sample::new(3, 3)]);

        assert_eq!(receiver.dropped_batches(), 2);
        assert_eq!(receiver.recv().await.unwrap(), vec![Sample::new(1, 1)]);
    }

    #[tokio::test]
    async fn rx_stream_ends_when_callback_dropped() {
        let (callback, mut receiver) = rx_channel(1);
        drop(callback);
        assert!(receiver.recv().await.is_none());
    }

    #[tokio::test]
    async fn tx_batches_span_blocks_then_zero_fill() {
        let (mut callback, sender) = tx_channel(4);
        let batch: Vec<Sample> = (0..5).map(|n| Sample::new(n, -n)).collect();
        sender.send(batch).await.unwrap();

        let mut block = [Sample::new(9, 9); 3];
        callback(&mut block);
        assert_eq!(block, [Sample::new(0, 0), Sample::new(1, -1), Sample::new(2, -2)]);
        assert_eq!(sender.underrun_samples(), 0);

        callback(&mut block);
        assert_eq!(block, [Sample::new(3, -3), Sample::new(4, -4), Sample::ZERO]);
        assert_eq!(sender.underrun_samples(), 1);

        callback(&mut block);
        assert_eq!(block, [Sample::ZERO; 3]);
        assert_eq!(sender.underrun_samples(), 4);
    }

    #[tokio::test]
    async fn tx_underrun_shared_across_clones() {
        let (mut callback, sender) = tx_channel(2);
        let feeder = sender.clone();
        feeder.send(vec![Sample::new(1, 1); 2]).await.unwrap();

        let mut block = [Sample::new(7, 7); 5];
        callback(&mut block);
        assert_eq!(&block[2..], &[Sample::ZERO; 3]);
        assert_eq!(sender.underrun_samples(), 3);
        assert_eq!(feeder.underrun_samples(), 3);
    }

    #[tokio::test]
    async fn tx_send_fails_after_stream_stops() {
        let (callback, sender) = tx_channel(1);
        assert!(sender.try_send(vec![Sample::ZERO]).unwrap());
        assert!(!sender.try_send(vec![Sample::ZERO]).unwrap());
        drop(callback);
        assert!(matches!(
            sender.send(vec![Sample::ZERO]).await,
            Err(Error::StreamClosed)
        ));
    }
}
