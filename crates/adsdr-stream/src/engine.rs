//! Stream controller: the application-facing half of the engine.
//!
//! [`StreamEngine`] holds the application-side queue halves (RX consumer,
//! TX producer) and the handle to the I/O worker. Start and stop round-trip
//! through the worker; sample access touches only the queues and never
//! blocks.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::oneshot;
use tracing::{debug, warn};

use adsdr_core::error::{Error, Result};
use adsdr_core::transport::UsbTransport;
use adsdr_core::types::{Direction, Sample};

use crate::config::StreamConfig;
use crate::delivery::{RxCallback, TxCallback};
use crate::io::{Request, StreamIo, spawn_io_worker};
use crate::queue::{Consumer, Producer, sample_queue};
use crate::stats::{StatsSnapshot, StreamStats};

/// Slack added on top of the transfer timeout when waiting on the worker.
const REPLY_SLACK: Duration = Duration::from_millis(500);

/// Real-time RX/TX streaming engine for one device.
pub struct StreamEngine {
    transport: Arc<dyn UsbTransport>,
    config: StreamConfig,
    io: Option<StreamIo>,
    rx_queue: Consumer<Sample>,
    tx_queue: Producer<Sample>,
    stats: Arc<StreamStats>,
}

impl StreamEngine {
    /// Allocate the transfer pools and queues and start the I/O worker.
    ///
    /// Nothing is submitted until [`start_rx`](Self::start_rx) or
    /// [`start_tx`](Self::start_tx).
    pub fn new(transport: Arc<dyn UsbTransport>, config: StreamConfig) -> Result<Self> {
        config.validate()?;
        if !transport.is_open() {
            return Err(Error::NotConnected);
        }

        let (rx_producer, rx_consumer) = sample_queue(config.queue_capacity);
        let (tx_producer, tx_consumer) = sample_queue(config.queue_capacity);
        let stats = Arc::new(StreamStats::new());

        let io = spawn_io_worker(
            Arc::clone(&transport),
            &config,
            rx_producer,
            tx_consumer,
            Arc::clone(&stats),
        )?;
        debug!(
            transfers = config.transfer_count,
            buffer_size = config.buffer_size,
            queue_capacity = config.queue_capacity,
            "stream engine started"
        );

        Ok(StreamEngine {
            transport,
            config,
            io: Some(io),
            rx_queue: rx_consumer,
            tx_queue: tx_producer,
            stats,
        })
    }

    pub fn config(&self) -> &StreamConfig {
        &self.config
    }

    fn send(&self, request: Request) -> Result<()> {
        let io = self.io.as_ref().ok_or(Error::NotConnected)?;
        io.req_tx.send(request).map_err(|_| Error::NotConnected)?;
        self.transport.interrupt();
        Ok(())
    }

    async fn reply(&self, rx: oneshot::Receiver<Result<()>>) -> Result<()> {
        match tokio::time::timeout(self.config.transfer_timeout + REPLY_SLACK, rx).await {
            Ok(Ok(result)) => result,
            Ok(Err(_)) => Err(Error::NotConnected),
            Err(_) => Err(Error::Timeout),
        }
    }

    /// Start receiving.
    ///
    /// With a callback, every decoded batch goes to it on the I/O worker
    /// thread; without one, samples go to the RX queue. The device is asked
    /// to stop and settle, every RX slot is submitted, and the device is
    /// started. If a submission fails, the slots already submitted are
    /// cancelled and [`Error::DeviceIo`] is returned.
    pub async fn start_rx(&self, callback: Option<RxCallback>) -> Result<()> {
        let (reply, rx) = oneshot::channel();
        self.send(Request::StartRx { callback, reply })?;
        self.reply(rx).await
    }

    /// Cancel every RX slot and wait for the cancellations to come back.
    /// Idempotent. Once this returns, RX can be started again.
    pub async fn stop_rx(&self) -> Result<()> {
        let (reply, rx) = oneshot::channel();
        self.send(Request::StopRx { reply })?;
        self.reply(rx).await
    }

    /// Start transmitting.
    ///
    /// Once the worker confirms TX is not already running, the TX queue is
    /// topped up with zero samples so the first completions have data, then
    /// every TX slot is filled and submitted. A rejected start leaves the
    /// queue untouched.
    pub async fn start_tx(&mut self, callback: Option<TxCallback>) -> Result<()> {
        let (reply, rx) = oneshot::channel();
        self.send(Request::Settle {
            direction: Direction::Tx,
            reply,
        })?;
        self.reply(rx).await?;

        let mut primed = 0usize;
        while self.tx_queue.push(Sample::ZERO).is_ok() {
            primed += 1;
        }
        debug!(primed, "TX queue primed");

        let (reply, rx) = oneshot::channel();
        self.send(Request::StartTx { callback, reply })?;
        self.reply(rx).await
    }

    /// Cancel every TX slot and wait for the cancellations to come back.
    /// Idempotent.
    pub async fn stop_tx(&self) -> Result<()> {
        let (reply, rx) = oneshot::channel();
        self.send(Request::StopTx { reply })?;
        self.reply(rx).await
    }

    /// Number of samples waiting in the RX queue. A hint: the worker keeps
    /// producing concurrently.
    pub fn available_rx_samples(&self) -> usize {
        self.rx_queue.len()
    }

    /// Take one RX sample, or `None` if the queue is empty.
    pub fn get_rx_sample(&mut self) -> Option<Sample> {
        self.rx_queue.pop()
    }

    /// Queue one TX sample. Hands the sample back if the queue is full.
    pub fn submit_tx_sample(&mut self, sample: Sample) -> std::result::Result<(), Sample> {
        self.tx_queue.push(sample)
    }

    /// Free space in the TX queue.
    pub fn tx_queue_space(&self) -> usize {
        self.tx_queue.capacity() - self.tx_queue.len()
    }

    pub fn stats(&self) -> StatsSnapshot {
        self.stats.snapshot()
    }

    /// Whether the I/O worker is still running.
    pub fn is_running(&self) -> bool {
        self.io
            .as_ref()
            .is_some_and(|io| !io.thread.is_finished())
    }

    /// Stop the engine: cancel every slot, close the device, join the
    /// worker. Buffers are freed when the worker's pools drop. Calling
    /// this more than once is a no-op.
    pub fn shutdown(&mut self) {
        let Some(io) = self.io.take() else {
            return;
        };

        io.cancel.cancel();
        self.transport.interrupt();
        if io
            .torn_down
            .recv_timeout(self.config.transfer_timeout + REPLY_SLACK)
            .is_err()
        {
            debug!("I/O worker exited without teardown acknowledgement");
        }

        self.transport.close();
        if io.thread.join().is_err() {
            warn!("I/O worker panicked");
        }
        debug!("stream engine shut down");
    }
}

impl Drop for StreamEngine {
    fn drop(&mut self) {
        self.shutdown();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::io::MAX_EVENT_FAILURES;
    use adsdr_core::transport::{DeviceControl, TransferStatus};
    use adsdr_test_harness::MockUsbTransport;
    use std::sync::Mutex;

    const WAIT: Duration = Duration::from_secs(2);

    fn small_config() -> StreamConfig {
        StreamConfig {
            transfer_count: 4,
            buffer_size: 32,
            queue_capacity: 16,
            ..Default::default()
        }
    }

    fn engine(mock: &MockUsbTransport) -> StreamEngine {
        StreamEngine::new(Arc::new(mock.clone()), small_config()).unwrap()
    }

    /// Poll `cond` until it holds or [`WAIT`] runs out.
    async fn eventually(mut cond: impl FnMut() -> bool) -> bool {
        let deadline = std::time::Instant::now() + WAIT;
        while !cond() {
            if std::time::Instant::now() >= deadline {
                return false;
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
        true
    }

    fn rx_block(samples: &[(i16, i16)]) -> Vec<u8> {
        let mut wire = Vec::new();
        for &(i, q) in samples {
            wire.extend_from_slice(&((i << 4) as u16).to_le_bytes());
            wire.extend_from_slice(&((q << 4) as u16).to_le_bytes());
            wire.extend_from_slice(&[0; 4]);
        }
        wire
    }

    #[test]
    fn invalid_config_rejected() {
        let mock = MockUsbTransport::new();
        let config = StreamConfig {
            buffer_size: 12,
            ..small_config()
        };
        assert!(matches!(
            StreamEngine::new(Arc::new(mock), config),
            Err(Error::InvalidParameter(_))
        ));
    }

    #[test]
    fn closed_transport_rejected() {
        let mock = MockUsbTransport::new();
        mock.close();
        assert!(matches!(
            StreamEngine::new(Arc::new(mock), small_config()),
            Err(Error::NotConnected)
        ));
    }

    #[tokio::test]
    async fn start_rx_arms_all_slots_between_stop_and_start() {
        let mock = MockUsbTransport::new();
        let engine = engine(&mock);

        engine.start_rx(None).await.unwrap();
        assert_eq!(mock.in_flight(Direction::Rx), 4);
        assert_eq!(
            mock.control_requests(),
            vec![DeviceControl::Stop, DeviceControl::Start]
        );
    }

    #[tokio::test]
    async fn start_rx_twice_rejected() {
        let mock = MockUsbTransport::new();
        let engine = engine(&mock);
        engine.start_rx(None).await.unwrap();
        assert!(matches!(
            engine.start_rx(None).await,
            Err(Error::InvalidParameter(_))
        ));
        assert_eq!(mock.submitted(Direction::Rx), 4);
    }

    #[tokio::test]
    async fn rx_samples_reach_queue_and_slot_is_resubmitted() {
        let mock = MockUsbTransport::new();
        let mut engine = engine(&mock);
        engine.start_rx(None).await.unwrap();

        assert!(mock.complete_rx(&rx_block(&[(1, -1), (2047, -2048)])));
        assert!(mock.wait_for_in_flight(Direction::Rx, 4, WAIT));
        assert_eq!(mock.submitted(Direction::Rx), 5);

        assert_eq!(engine.available_rx_samples(), 2);
        assert_eq!(engine.get_rx_sample(), Some(Sample::new(1, -1)));
        assert_eq!(engine.get_rx_sample(), Some(Sample::new(2047, -2048)));
        assert_eq!(engine.get_rx_sample(), None);
        assert_eq!(engine.stats().rx_transfers, 1);
    }

    #[tokio::test]
    async fn rx_callback_receives_batches() {
        let mock = MockUsbTransport::new();
        let mut engine = engine(&mock);
        let seen = Arc::new(Mutex::new(Vec::new()));
        let seen_cb = Arc::clone(&seen);
        engine
            .start_rx(Some(Box::new(move |batch: &[Sample]| {
                seen_cb.lock().unwrap().push(batch.to_vec());
            })))
            .await
            .unwrap();

        assert!(mock.complete_rx(&rx_block(&[(5, 6)])));
        assert!(mock.wait_for_in_flight(Direction::Rx, 4, WAIT));
        assert_eq!(*seen.lock().unwrap(), vec![vec![Sample::new(5, 6)]]);
        assert_eq!(engine.get_rx_sample(), None);
    }

    #[tokio::test]
    async fn rx_overflow_is_counted() {
        let mock = MockUsbTransport::new();
        let engine = engine(&mock);
        engine.start_rx(None).await.unwrap();

        // 4 samples per block, queue holds 16.
        let block = rx_block(&[(1, 1); 4]);
        for _ in 0..5 {
            assert!(mock.complete_rx(&block));
            assert!(mock.wait_for_in_flight(Direction::Rx, 4, WAIT));
        }
        assert_eq!(engine.available_rx_samples(), 16);
        let stats = engine.stats();
        assert_eq!(stats.rx_samples, 20);
        assert_eq!(stats.rx_overflow, 4);
    }

    #[tokio::test]
    async fn failed_completion_is_resubmitted() {
        let mock = MockUsbTransport::new();
        let engine = engine(&mock);
        engine.start_rx(None).await.unwrap();

        assert!(mock.fail_next(Direction::Rx, TransferStatus::Stall));
        assert!(mock.wait_for_in_flight(Direction::Rx, 4, WAIT));
        assert_eq!(mock.submitted(Direction::Rx), 5);
        assert_eq!(engine.stats().transfer_errors, 1);
        assert_eq!(engine.available_rx_samples(), 0);
    }

    #[tokio::test]
    async fn stop_rx_cancels_without_resubmission() {
        let mock = MockUsbTransport::new();
        let engine = engine(&mock);
        engine.start_rx(None).await.unwrap();

        engine.stop_rx().await.unwrap();
        assert_eq!(mock.cancelled().len(), 4);
        assert!(mock.wait_until_drained(WAIT));
        assert_eq!(mock.in_flight(Direction::Rx), 0);
        assert_eq!(mock.submitted(Direction::Rx), 4);

        // Stopping again is harmless, and the stream can be restarted.
        engine.stop_rx().await.unwrap();
        engine.start_rx(None).await.unwrap();
        assert_eq!(mock.in_flight(Direction::Rx), 4);
    }

    #[tokio::test]
    async fn restart_right_after_stop() {
        let mock = MockUsbTransport::new();
        let mut engine = engine(&mock);

        for round in 0..50 {
            engine.start_rx(None).await.unwrap_or_else(|e| panic!("RX round {round}: {e}"));
            engine.stop_rx().await.unwrap();
            engine.start_tx(None).await.unwrap_or_else(|e| panic!("TX round {round}: {e}"));
            engine.stop_tx().await.unwrap();
        }
        assert_eq!(mock.submitted(Direction::Rx), 200);
        assert_eq!(mock.submitted(Direction::Tx), 200);
        assert_eq!(mock.in_flight(Direction::Rx), 0);
        assert_eq!(mock.in_flight(Direction::Tx), 0);
    }

    #[tokio::test]
    async fn stop_rx_leaves_tx_streaming() {
        let mock = MockUsbTransport::new();
        let mut engine = engine(&mock);
        engine.start_rx(None).await.unwrap();
        engine.start_tx(None).await.unwrap();

        engine.stop_rx().await.unwrap();
        assert_eq!(mock.in_flight(Direction::Rx), 0);
        assert!(mock.complete_tx().is_some());
        assert!(mock.wait_for_in_flight(Direction::Tx, 4, WAIT));
        assert_eq!(engine.stats().tx_transfers, 1);
    }

    #[tokio::test]
    async fn start_rx_failure_rolls_back() {
        let mock = MockUsbTransport::new();
        mock.reject_submissions(Direction::Rx, 2);
        let engine = engine(&mock);

        let err = engine.start_rx(None).await.unwrap_err();
        assert!(matches!(err, Error::DeviceIo(_)));
        assert_eq!(mock.cancelled().len(), 2);
        assert_eq!(mock.in_flight(Direction::Rx), 0);
        assert_eq!(mock.control_requests(), vec![DeviceControl::Stop]);
    }

    #[tokio::test]
    async fn start_rx_succeeds_after_rejected_start() {
        let mock = MockUsbTransport::new();
        mock.reject_submissions(Direction::Rx, 2);
        let engine = engine(&mock);
        assert!(engine.start_rx(None).await.is_err());

        mock.accept_submissions();
        engine.start_rx(None).await.unwrap();
        assert_eq!(mock.in_flight(Direction::Rx), 4);
    }

    #[tokio::test]
    async fn rx_resubmit_rejection_is_counted() {
        let mock = MockUsbTransport::new();
        let engine = engine(&mock);
        engine.start_rx(None).await.unwrap();

        mock.reject_submissions(Direction::Rx, 0);
        assert!(mock.complete_rx(&rx_block(&[(1, 2)])));
        assert!(eventually(|| engine.stats().resubmit_failures == 1).await);
        assert_eq!(mock.in_flight(Direction::Rx), 3);
        assert_eq!(engine.stats().rx_transfers, 1);

        // The rejected slot stays idle, so stop and restart recover it.
        mock.accept_submissions();
        engine.stop_rx().await.unwrap();
        engine.start_rx(None).await.unwrap();
        assert_eq!(mock.in_flight(Direction::Rx), 4);
    }

    #[tokio::test]
    async fn start_tx_primes_queue_and_zero_fills() {
        let mock = MockUsbTransport::new();
        let mut engine = engine(&mock);

        engine.start_tx(None).await.unwrap();
        assert_eq!(mock.in_flight(Direction::Tx), 4);
        // 4 slots x 8 samples drew 32 zeros from a queue primed with 16.
        let stats = engine.stats();
        assert_eq!(stats.tx_underrun, 16);
        assert_eq!(stats.tx_samples, 32);

        let payload = mock.complete_tx().unwrap();
        assert_eq!(payload, vec![0u8; 32]);
    }

    #[tokio::test]
    async fn start_tx_twice_leaves_queue_alone() {
        let mock = MockUsbTransport::new();
        let mut engine = engine(&mock);
        engine.start_tx(None).await.unwrap();
        engine.submit_tx_sample(Sample::new(9, 9)).unwrap();
        let space = engine.tx_queue_space();
        assert_eq!(space, 15);

        assert!(matches!(
            engine.start_tx(None).await,
            Err(Error::InvalidParameter(_))
        ));
        assert_eq!(engine.tx_queue_space(), space);
        assert_eq!(mock.submitted(Direction::Tx), 4);
    }

    #[tokio::test]
    async fn failed_tx_completion_is_refilled_and_resubmitted() {
        let mock = MockUsbTransport::new();
        let mut engine = engine(&mock);
        engine.start_tx(None).await.unwrap();
        let encoded = engine.stats().tx_samples;

        assert!(mock.fail_next(Direction::Tx, TransferStatus::TimedOut));
        assert!(mock.wait_for_in_flight(Direction::Tx, 4, WAIT));
        assert_eq!(mock.submitted(Direction::Tx), 5);
        let stats = engine.stats();
        assert_eq!(stats.transfer_errors, 1);
        assert_eq!(stats.tx_transfers, 0);
        // 8 more samples were encoded for the resubmitted block.
        assert_eq!(stats.tx_samples, encoded + 8);
    }

    #[tokio::test]
    async fn start_tx_failure_rolls_back() {
        let mock = MockUsbTransport::new();
        mock.reject_submissions(Direction::Tx, 2);
        let mut engine = engine(&mock);

        let err = engine.start_tx(None).await.unwrap_err();
        assert!(matches!(err, Error::DeviceIo(_)));
        assert_eq!(mock.cancelled().len(), 2);
        assert_eq!(mock.in_flight(Direction::Tx), 0);

        mock.accept_submissions();
        engine.start_tx(None).await.unwrap();
        assert_eq!(mock.in_flight(Direction::Tx), 4);
    }

    #[tokio::test]
    async fn queued_tx_samples_are_encoded() {
        let mock = MockUsbTransport::new();
        let mut engine = engine(&mock);
        engine.start_tx(None).await.unwrap();
        assert_eq!(engine.tx_queue_space(), 16);

        engine.submit_tx_sample(Sample::new(-2048, 2047)).unwrap();
        engine.submit_tx_sample(Sample::new(1, -1)).unwrap();

        assert!(mock.complete_tx().is_some());
        assert!(mock.wait_for_in_flight(Direction::Tx, 4, WAIT));
        assert_eq!(engine.stats().tx_transfers, 1);

        // Flush the three blocks submitted before the samples were queued.
        for _ in 0..3 {
            assert!(mock.complete_tx().is_some());
            assert!(mock.wait_for_in_flight(Direction::Tx, 4, WAIT));
        }
        let payload = mock.complete_tx().unwrap();
        assert_eq!(
            &payload[..8],
            &[0xFF, 0x07, 0x00, 0x08, 0xFF, 0x0F, 0x01, 0x00]
        );
    }

    #[tokio::test]
    async fn tx_callback_fills_blocks() {
        let mock = MockUsbTransport::new();
        let mut engine = engine(&mock);
        engine
            .start_tx(Some(Box::new(|batch: &mut [Sample]| {
                batch.fill(Sample::new(3, 4));
            })))
            .await
            .unwrap();

        let payload = mock.complete_tx().unwrap();
        assert_eq!(payload.len(), 32);
        assert_eq!(&payload[..4], &[4, 0, 3, 0]);
        assert_eq!(engine.stats().tx_underrun, 0);
    }

    #[tokio::test]
    async fn shutdown_cancels_closes_and_joins() {
        let mock = MockUsbTransport::new();
        let mut engine = engine(&mock);
        engine.start_rx(None).await.unwrap();
        engine.start_tx(None).await.unwrap();

        engine.shutdown();
        assert_eq!(mock.cancelled().len(), 8);
        assert!(!mock.is_open());
        assert!(!engine.is_running());
        assert!(matches!(engine.stop_rx().await, Err(Error::NotConnected)));

        engine.shutdown();
    }

    #[tokio::test]
    async fn worker_exits_when_device_closes() {
        let mock = MockUsbTransport::new();
        let engine = engine(&mock);
        engine.start_rx(None).await.unwrap();

        mock.close();
        assert!(eventually(|| !engine.is_running()).await);
        assert!(matches!(engine.stop_rx().await, Err(Error::NotConnected)));
    }

    #[tokio::test]
    async fn transient_event_failures_are_counted() {
        let mock = MockUsbTransport::new();
        let engine = engine(&mock);
        mock.fail_events(3);

        assert!(eventually(|| engine.stats().event_errors == 3).await);
        assert!(engine.is_running());
        engine.start_rx(None).await.unwrap();
        assert_eq!(mock.in_flight(Direction::Rx), 4);
    }

    #[tokio::test]
    async fn worker_gives_up_on_persistent_event_failures() {
        let mock = MockUsbTransport::new();
        let engine = engine(&mock);
        engine.start_rx(None).await.unwrap();
        mock.fail_events(usize::MAX);

        assert!(eventually(|| !engine.is_running()).await);
        assert_eq!(engine.stats().event_errors, u64::from(MAX_EVENT_FAILURES));
        assert_eq!(mock.cancelled().len(), 4);
        assert!(matches!(engine.start_rx(None).await, Err(Error::NotConnected)));
    }
}
