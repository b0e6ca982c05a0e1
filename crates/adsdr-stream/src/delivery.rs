//! Where decoded RX samples go and where TX samples come from.
//!
//! Each direction either calls a user callback or falls back to its
//! [`sample_queue`](crate::queue::sample_queue). Both paths run on the
//! I/O worker once per completion and never block.

use adsdr_core::types::Sample;

use crate::codec;
use crate::queue::{Consumer, Producer};
use crate::stats::StreamStats;

/// Receives every decoded RX batch, on the I/O worker thread.
pub type RxCallback = Box<dyn FnMut(&[Sample]) + Send>;

/// Fills the next TX batch, on the I/O worker thread. The slice always
/// has the full per-transfer capacity and is sent verbatim.
pub type TxCallback = Box<dyn FnMut(&mut [Sample]) + Send>;

/// RX side: decode a completed block and hand the samples on.
pub(crate) struct RxSink {
    queue: Producer<Sample>,
    callback: Option<RxCallback>,
    scratch: Vec<Sample>,
}

impl RxSink {
    pub(crate) fn new(queue: Producer<Sample>, batch: usize) -> Self {
        RxSink {
            queue,
            callback: None,
            scratch: Vec::with_capacity(batch),
        }
    }

    pub(crate) fn set_callback(&mut self, callback: Option<RxCallback>) {
        self.callback = callback;
    }

    /// Decode `actual_length` bytes of `wire` and deliver them. Samples
    /// that do not fit in the queue are dropped and counted.
    pub(crate) fn deliver(&mut self, wire: &[u8], actual_length: usize, stats: &StreamStats) {
        self.scratch.clear();
        codec::decode(wire, actual_length, &mut self.scratch);
        stats.rx_transfer(self.scratch.len());

        match self.callback.as_mut() {
            Some(callback) => callback(self.scratch.as_slice()),
            None => {
                let mut dropped = 0;
                for &sample in &self.scratch {
                    if self.queue.push(sample).is_err() {
                        dropped += 1;
                    }
                }
                stats.rx_overflow(dropped);
            }
        }
    }
}

/// TX side: produce one block's worth of samples and encode them.
pub(crate) struct TxSource {
    queue: Consumer<Sample>,
    callback: Option<TxCallback>,
    scratch: Vec<Sample>,
}

impl TxSource {
    pub(crate) fn new(queue: Consumer<Sample>, batch: usize) -> Self {
        TxSource {
            queue,
            callback: None,
            scratch: vec![Sample::ZERO; batch],
        }
    }

    pub(crate) fn set_callback(&mut self, callback: Option<TxCallback>) {
        self.callback = callback;
    }

    /// Fill `wire` for the next submission and return the byte count.
    ///
    /// The sample capacity follows from the block length. Without a
    /// callback, each empty-queue dequeue is replaced by a zero sample and
    /// counted as an underrun.
    pub(crate) fn fill(&mut self, wire: &mut [u8], stats: &StreamStats) -> usize {
        let capacity = codec::tx_samples_in(wire.len());
        self.scratch.resize(capacity, Sample::ZERO);
        let batch = &mut self.scratch[..capacity];

        match self.callback.as_mut() {
            Some(callback) => callback(&mut *batch),
            None => {
                let mut underrun = 0;
                for slot in batch.iter_mut() {
                    *slot = match self.queue.pop() {
                        Some(sample) => sample,
                        None => {
                            underrun += 1;
                            Sample::ZERO
                        }
                    };
                }
                stats.tx_underrun(underrun);
            }
        }

        stats.tx_encoded(capacity);
        codec::encode(batch, wire)
    }
}
