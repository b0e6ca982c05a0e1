//! I/O worker: the single thread that owns every transfer.
//!
//! The worker owns both [`TransferPool`]s, the I/O-side halves of both
//! sample queues, and any installed callbacks. Application code reaches it
//! only through [`Request`] messages (each answered on a oneshot channel)
//! followed by [`UsbTransport::interrupt`], which wakes the worker out of
//! `handle_events`.
//!
//! Each loop iteration checks the cancellation token, drains pending
//! requests, then blocks in `handle_events` and processes the completions
//! it returns. `handle_events` is the only blocking call on this thread.
//!
//! Stopping a direction cancels its slots and keeps pumping events until
//! every cancelled slot is back, so the reply to a stop means the pool is
//! ready to be armed again.

use std::sync::Arc;
use std::sync::mpsc as std_mpsc;
use std::thread::JoinHandle;
use std::time::{Duration, Instant};

use tokio::sync::mpsc::error::TryRecvError;
use tokio::sync::{mpsc, oneshot};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, warn};

use adsdr_core::error::{Error, Result};
use adsdr_core::transport::{Completion, DeviceControl, TransferStatus, UsbTransport};
use adsdr_core::types::{Direction, Sample};

use crate::codec;
use crate::config::StreamConfig;
use crate::delivery::{RxCallback, RxSink, TxCallback, TxSource};
use crate::pool::{Reclaimed, TransferPool};
use crate::queue::{Consumer, Producer};
use crate::stats::StreamStats;

/// Pause after a failed `handle_events`, multiplied by the failure count.
const EVENT_RETRY_DELAY: Duration = Duration::from_millis(10);

/// Upper bound on the multiplier applied to [`EVENT_RETRY_DELAY`].
const EVENT_RETRY_STEPS: u32 = 10;

/// Consecutive `handle_events` failures after which the worker gives up.
pub(crate) const MAX_EVENT_FAILURES: u32 = 10;

// ---------------------------------------------------------------------------
// Types
// ---------------------------------------------------------------------------

/// A request sent from the engine to the I/O worker.
pub(crate) enum Request {
    StartRx {
        callback: Option<RxCallback>,
        reply: oneshot::Sender<Result<()>>,
    },
    StopRx {
        reply: oneshot::Sender<Result<()>>,
    },
    StartTx {
        callback: Option<TxCallback>,
        reply: oneshot::Sender<Result<()>>,
    },
    StopTx {
        reply: oneshot::Sender<Result<()>>,
    },
    /// Reclaim outstanding cancellations of one direction and report
    /// whether it can be started.
    Settle {
        direction: Direction,
        reply: oneshot::Sender<Result<()>>,
    },
}

/// Handle to the I/O worker. Stored inside `StreamEngine`.
pub(crate) struct StreamIo {
    /// Request channel to the worker.
    pub req_tx: mpsc::UnboundedSender<Request>,
    /// Set to stop the worker; it cancels every slot before exiting.
    pub cancel: CancellationToken,
    /// Signalled (or dropped) once the worker has cancelled its slots.
    pub torn_down: std_mpsc::Receiver<()>,
    /// The worker thread.
    pub thread: JoinHandle<()>,
}

// ---------------------------------------------------------------------------
// Spawn
// ---------------------------------------------------------------------------

/// Spawn the I/O worker thread.
pub(crate) fn spawn_io_worker(
    transport: Arc<dyn UsbTransport>,
    config: &StreamConfig,
    rx_queue: Producer<Sample>,
    tx_queue: Consumer<Sample>,
    stats: Arc<StreamStats>,
) -> Result<StreamIo> {
    let (req_tx, req_rx) = mpsc::unbounded_channel();
    let (done_tx, torn_down) = std_mpsc::channel();
    let cancel = CancellationToken::new();

    let worker = Worker {
        rx_pool: TransferPool::new(
            Direction::Rx,
            config.rx_endpoint,
            config.transfer_count,
            config.buffer_size,
            config.transfer_timeout,
        ),
        tx_pool: TransferPool::new(
            Direction::Tx,
            config.tx_endpoint,
            config.transfer_count,
            config.buffer_size,
            config.transfer_timeout,
        ),
        rx_sink: RxSink::new(rx_queue, codec::rx_samples_in(config.buffer_size)),
        tx_source: TxSource::new(tx_queue, codec::tx_samples_in(config.buffer_size)),
        completions: Vec::with_capacity(config.transfer_count * 2),
        settle_timeout: config.transfer_timeout,
        transport,
        stats,
        requests: req_rx,
        cancel: cancel.clone(),
        torn_down: done_tx,
    };

    let thread = std::thread::Builder::new()
        .name("adsdr-io".into())
        .spawn(move || worker.run())?;

    Ok(StreamIo {
        req_tx,
        cancel,
        torn_down,
        thread,
    })
}

// ---------------------------------------------------------------------------
// Worker
// ---------------------------------------------------------------------------

struct Worker {
    transport: Arc<dyn UsbTransport>,
    rx_pool: TransferPool,
    tx_pool: TransferPool,
    rx_sink: RxSink,
    tx_source: TxSource,
    completions: Vec<Completion>,
    /// How long a stop waits for its cancellations to come back.
    settle_timeout: Duration,
    stats: Arc<StreamStats>,
    requests: mpsc::UnboundedReceiver<Request>,
    cancel: CancellationToken,
    torn_down: std_mpsc::Sender<()>,
}

impl Worker {
    fn run(mut self) {
        debug!("I/O worker started");
        let mut failures = 0u32;

        loop {
            if self.cancel.is_cancelled() {
                self.teardown();
                break;
            }

            loop {
                match self.requests.try_recv() {
                    Ok(request) => self.handle_request(request),
                    Err(TryRecvError::Empty) => break,
                    Err(TryRecvError::Disconnected) => {
                        debug!("engine dropped, stopping I/O worker");
                        self.cancel.cancel();
                        break;
                    }
                }
            }
            if self.cancel.is_cancelled() {
                continue;
            }

            match self.pump() {
                Ok(()) => failures = 0,
                Err(Error::NotConnected) => {
                    debug!("device closed, exiting I/O worker");
                    break;
                }
                Err(e) => {
                    failures += 1;
                    self.stats.event_error();
                    if failures >= MAX_EVENT_FAILURES {
                        error!(error = %e, failures, "event dispatch keeps failing, stopping I/O worker");
                        self.teardown();
                        break;
                    }
                    warn!(error = %e, failures, "event dispatch failed, backing off");
                    std::thread::sleep(EVENT_RETRY_DELAY * failures.min(EVENT_RETRY_STEPS));
                }
            }
        }
        debug!("I/O worker stopped");
    }

    /// Run one `handle_events` call and process what it returned.
    fn pump(&mut self) -> Result<()> {
        let mut completions = std::mem::take(&mut self.completions);
        let result = self.transport.handle_events(&mut completions);
        for completion in completions.drain(..) {
            self.on_completion(completion);
        }
        self.completions = completions;
        result
    }

    fn pool(&self, direction: Direction) -> &TransferPool {
        match direction {
            Direction::Rx => &self.rx_pool,
            Direction::Tx => &self.tx_pool,
        }
    }

    /// Pump events until no slot of `direction` is waiting on a
    /// cancellation. Completions of the other direction are handled as
    /// usual meanwhile.
    fn settle(&mut self, direction: Direction) -> Result<()> {
        let deadline = Instant::now() + self.settle_timeout;
        while self.pool(direction).cancelling() > 0 {
            if Instant::now() >= deadline {
                warn!(
                    %direction,
                    outstanding = self.pool(direction).cancelling(),
                    "cancelled transfers did not come back in time"
                );
                return Err(Error::Timeout);
            }
            match self.pump() {
                Ok(()) => {}
                Err(Error::NotConnected) => return Err(Error::NotConnected),
                Err(e) => {
                    self.stats.event_error();
                    warn!(%direction, error = %e, "event dispatch failed while stopping");
                }
            }
        }
        Ok(())
    }

    /// Settle `direction` and check that nothing of it is in flight.
    fn ready_to_start(&mut self, direction: Direction) -> Result<()> {
        if self.pool(direction).is_running() {
            return Err(Error::InvalidParameter(format!(
                "{direction} stream is already running"
            )));
        }
        self.settle(direction)
    }

    /// Cancel every slot of both directions, then let the engine close the
    /// device.
    fn teardown(&mut self) {
        let transport = &*self.transport;
        if let Err(e) = self.rx_pool.cancel_all(transport) {
            warn!(error = %e, "RX cancel during shutdown failed");
        }
        if let Err(e) = self.tx_pool.cancel_all(transport) {
            warn!(error = %e, "TX cancel during shutdown failed");
        }
        let _ = self.torn_down.send(());
    }

    fn handle_request(&mut self, request: Request) {
        match request {
            Request::StartRx { callback, reply } => {
                let _ = reply.send(self.start_rx(callback));
            }
            Request::StopRx { reply } => {
                let cancelled = self.rx_pool.cancel_all(&*self.transport);
                self.rx_sink.set_callback(None);
                let settled = self.settle(Direction::Rx);
                debug!("RX stream stopped");
                let _ = reply.send(cancelled.and(settled));
            }
            Request::StartTx { callback, reply } => {
                let _ = reply.send(self.start_tx(callback));
            }
            Request::StopTx { reply } => {
                let cancelled = self.tx_pool.cancel_all(&*self.transport);
                self.tx_source.set_callback(None);
                let settled = self.settle(Direction::Tx);
                debug!("TX stream stopped");
                let _ = reply.send(cancelled.and(settled));
            }
            Request::Settle { direction, reply } => {
                let _ = reply.send(self.ready_to_start(direction));
            }
        }
    }

    fn start_rx(&mut self, callback: Option<RxCallback>) -> Result<()> {
        self.ready_to_start(Direction::Rx)?;
        self.rx_sink.set_callback(callback);

        let transport = &*self.transport;
        if let Err(e) = transport.control(DeviceControl::Stop) {
            warn!(error = %e, "device stop request failed");
        }
        self.rx_pool.arm(transport, |buf| buf.len())?;
        if let Err(e) = transport.control(DeviceControl::Start) {
            warn!(error = %e, "device start request failed");
        }
        debug!("RX stream started");
        Ok(())
    }

    fn start_tx(&mut self, callback: Option<TxCallback>) -> Result<()> {
        self.ready_to_start(Direction::Tx)?;
        self.tx_source.set_callback(callback);

        let Worker {
            transport,
            tx_pool,
            tx_source,
            stats,
            ..
        } = self;
        tx_pool.arm(&**transport, |buf| tx_source.fill(buf, stats))?;
        debug!("TX stream started");
        Ok(())
    }

    fn on_completion(&mut self, completion: Completion) {
        let id = completion.id;
        let reclaimed = match id.direction {
            Direction::Rx => self.rx_pool.reclaim(completion),
            Direction::Tx => self.tx_pool.reclaim(completion),
        };
        match reclaimed {
            Some(Reclaimed::Ready {
                index,
                status,
                actual_length,
            }) => match id.direction {
                Direction::Rx => self.on_rx_ready(index, status, actual_length),
                Direction::Tx => self.on_tx_ready(index, status),
            },
            Some(Reclaimed::Stopped { index }) => {
                debug!(direction = %id.direction, slot = index, "transfer stopped");
            }
            None => {
                warn!(transfer = %id, "completion for unknown transfer ignored");
            }
        }
    }

    fn on_rx_ready(&mut self, index: usize, status: TransferStatus, actual_length: usize) {
        if status == TransferStatus::Completed {
            if let Some(wire) = self.rx_pool.buffer(index) {
                self.rx_sink.deliver(wire, actual_length, &self.stats);
            }
        } else {
            warn!(direction = "RX", slot = index, %status, "transfer failed, resubmitting");
            self.stats.transfer_error();
        }

        let length = self.rx_pool.buffer_size();
        if let Err(e) = self.rx_pool.submit(&*self.transport, index, length) {
            warn!(direction = "RX", slot = index, error = %e, "resubmit failed");
            self.stats.resubmit_failure();
        }
    }

    fn on_tx_ready(&mut self, index: usize, status: TransferStatus) {
        if status == TransferStatus::Completed {
            self.stats.tx_transfer();
        } else {
            warn!(direction = "TX", slot = index, %status, "transfer failed, resubmitting");
            self.stats.transfer_error();
        }

        let length = match self.tx_pool.buffer_mut(index) {
            Some(wire) => self.tx_source.fill(wire, &self.stats),
            None => return,
        };
        if let Err(e) = self.tx_pool.submit(&*self.transport, index, length) {
            warn!(direction = "TX", slot = index, error = %e, "resubmit failed");
            self.stats.resubmit_failure();
        }
    }
}
