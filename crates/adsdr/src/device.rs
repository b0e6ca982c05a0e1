//! The `AdSdr` device handle.
//!
//! Ties the streaming engine and the command dispatcher to one transport
//! and one transceiver. Configuration commands go through
//! [`send_cmd`](AdSdr::send_cmd) and are serialized; sample streaming goes
//! through the engine's I/O worker.

use std::sync::Arc;

use tracing::{debug, info};

use adsdr_control::CommandDispatcher;
use adsdr_core::command::{Command, CommandId, CommandStatus, Response};
use adsdr_core::error::{Error, Result};
use adsdr_core::transceiver::InitParams;
use adsdr_core::transport::{DeviceControl, UsbTransport};
use adsdr_core::types::{EnsmMode, FpgaVersion, Sample};
use adsdr_stream::{
    RxCallback, SampleReceiver, SampleSender, StatsSnapshot, StreamConfig, StreamEngine,
    TxCallback, rx_channel, tx_channel,
};

/// A connected software-defined radio.
///
/// Build one with [`AdSdrBuilder`](crate::AdSdrBuilder). Dropping the
/// handle shuts the device down.
pub struct AdSdr {
    transport: Arc<dyn UsbTransport>,
    engine: StreamEngine,
    dispatcher: CommandDispatcher,
    init_params: InitParams,
}

impl AdSdr {
    pub(crate) fn new(
        transport: Arc<dyn UsbTransport>,
        engine: StreamEngine,
        dispatcher: CommandDispatcher,
        init_params: InitParams,
    ) -> Self {
        AdSdr {
            transport,
            engine,
            dispatcher,
            init_params,
        }
    }

    pub fn config(&self) -> &StreamConfig {
        self.engine.config()
    }

    // -----------------------------------------------------------------
    // Control
    // -----------------------------------------------------------------

    /// Initialize the transceiver with the configured [`InitParams`].
    pub fn init_sdr(&self) -> Result<()> {
        self.dispatcher.init(&self.init_params)
    }

    /// Execute a configuration command.
    ///
    /// Parameter and run-state problems come back as a [`CommandStatus`]
    /// in the response, not as an `Err`.
    pub fn send_cmd(&self, cmd: Command) -> Result<Response> {
        self.dispatcher.dispatch(cmd)
    }

    /// Build a set command from an application value.
    ///
    /// See [`Command::make`].
    pub fn make_command(id: CommandId, value: f64) -> Result<Command> {
        Command::make(id, value)
    }

    /// FPGA design version as `"major.minor.patch"`.
    pub fn version(&self) -> Result<String> {
        let resp = self.send_cmd(Command::new(CommandId::GetVersion))?;
        if resp.status != CommandStatus::Ok {
            return Err(Error::Transceiver(format!(
                "version query failed: {}",
                resp.status
            )));
        }
        Ok(FpgaVersion::from_result(resp.result).to_string())
    }

    /// Current ENSM mode of the transceiver.
    pub fn ensm_mode(&self) -> Result<EnsmMode> {
        self.dispatcher.ensm_mode()
    }

    /// Issue the vendor reset control request to the bridge chip.
    pub fn device_reset(&self) -> Result<()> {
        self.transport.control(DeviceControl::Reset)?;
        info!("device reset requested");
        Ok(())
    }

    // -----------------------------------------------------------------
    // Streaming
    // -----------------------------------------------------------------

    /// Start receiving. See [`StreamEngine::start_rx`].
    pub async fn start_rx(&self, callback: Option<RxCallback>) -> Result<()> {
        self.engine.start_rx(callback).await
    }

    pub async fn stop_rx(&self) -> Result<()> {
        self.engine.stop_rx().await
    }

    /// Start transmitting. See [`StreamEngine::start_tx`].
    pub async fn start_tx(&mut self, callback: Option<TxCallback>) -> Result<()> {
        self.engine.start_tx(callback).await
    }

    pub async fn stop_tx(&self) -> Result<()> {
        self.engine.stop_tx().await
    }

    /// Start receiving into a channel of `depth` batches.
    ///
    /// Batches arriving while the channel is full are dropped and counted
    /// by [`SampleReceiver::dropped_batches`]. The receiver ends when RX is
    /// stopped.
    pub async fn start_rx_stream(&self, depth: usize) -> Result<SampleReceiver> {
        let (callback, receiver) = rx_channel(depth);
        self.engine.start_rx(Some(callback)).await?;
        debug!(depth, "RX channel stream started");
        Ok(receiver)
    }

    /// Start transmitting from a channel of `depth` batches.
    ///
    /// When the channel runs dry the device is fed zero samples, counted by
    /// [`SampleSender::underrun_samples`]. Sends fail with
    /// [`Error::StreamClosed`] once TX is stopped.
    pub async fn start_tx_stream(&mut self, depth: usize) -> Result<SampleSender> {
        let (callback, sender) = tx_channel(depth);
        self.engine.start_tx(Some(callback)).await?;
        debug!(depth, "TX channel stream started");
        Ok(sender)
    }

    /// Samples waiting in the RX queue. A hint only.
    pub fn available_rx_samples(&self) -> usize {
        self.engine.available_rx_samples()
    }

    pub fn get_rx_sample(&mut self) -> Option<Sample> {
        self.engine.get_rx_sample()
    }

    /// Queue one TX sample, handing it back if the queue is full.
    pub fn submit_tx_sample(&mut self, sample: Sample) -> std::result::Result<(), Sample> {
        self.engine.submit_tx_sample(sample)
    }

    pub fn tx_queue_space(&self) -> usize {
        self.engine.tx_queue_space()
    }

    pub fn stats(&self) -> StatsSnapshot {
        self.engine.stats()
    }

    /// Cancel every transfer, close the device, and join the I/O worker.
    /// Also done on drop.
    pub fn shutdown(&mut self) {
        self.engine.shutdown();
    }
}
