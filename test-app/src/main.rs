// adsdr test application -- CLI tool for exercising the streaming engine
// and the command dispatcher against mock hardware.
//
// Usage:
//   adsdr-test-app version
//   adsdr-test-app cmd set_rx_lo_freq 2450000000
//   adsdr-test-app cmd get_rx_rf_gain
//   adsdr-test-app rx --transfers 100
//   adsdr-test-app --buffer-size 4096 tx --samples 20000
//
// Set RUST_LOG=debug to see transfer and command traffic.

use std::time::{Duration, Instant};

use anyhow::{Context, Result, bail};
use clap::{Parser, Subcommand};
use rand::Rng;
use tracing::info;
use tracing_subscriber::EnvFilter;

use adsdr::{AdSdr, AdSdrBuilder, Command, CommandId, Direction, Sample, StatsSnapshot};
use adsdr_test_harness::{MockTransceiver, MockUsbTransport};

/// How long the simulated device waits for the host to re-arm every slot.
const DEVICE_WAIT: Duration = Duration::from_secs(1);

// ---------------------------------------------------------------------------
// CLI argument definitions
// ---------------------------------------------------------------------------

/// adsdr test application -- drives an SDR backed by mock hardware.
#[derive(Parser)]
#[command(name = "adsdr-test-app", version, about)]
struct Cli {
    /// Transfer slots per direction.
    #[arg(long, default_value_t = 8)]
    transfer_count: usize,

    /// Bytes per wire block (multiple of 8).
    #[arg(long, default_value_t = 1024)]
    buffer_size: usize,

    /// Depth, in batches, of the RX/TX channels.
    #[arg(long, default_value_t = 16)]
    depth: usize,

    #[command(subcommand)]
    command: Cmd,
}

#[derive(Subcommand)]
enum Cmd {
    /// Print the FPGA design version.
    Version,

    /// Send one configuration command (e.g. `set_rx_lo_freq 915e6`).
    Cmd {
        /// Command name, e.g. get_tx_lo_freq.
        name: String,
        /// Value for set commands.
        value: Option<f64>,
    },

    /// Receive random samples from the simulated device.
    Rx {
        /// Number of RX transfers the device completes.
        #[arg(long, default_value_t = 64)]
        transfers: usize,
    },

    /// Transmit random samples to the simulated device.
    Tx {
        /// Number of samples to send.
        #[arg(long, default_value_t = 8192)]
        samples: usize,
    },
}

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

fn random_sample(rng: &mut impl Rng) -> Sample {
    Sample::new(
        rng.gen_range(Sample::MIN..=Sample::MAX),
        rng.gen_range(Sample::MIN..=Sample::MAX),
    )
}

/// An RX wire block of `bytes` bytes holding random samples.
fn random_rx_block(rng: &mut impl Rng, bytes: usize) -> Vec<u8> {
    let mut wire = Vec::with_capacity(bytes);
    while wire.len() + 8 <= bytes {
        let s = random_sample(rng);
        wire.extend_from_slice(&((s.i << 4) as u16).to_le_bytes());
        wire.extend_from_slice(&((s.q << 4) as u16).to_le_bytes());
        wire.extend_from_slice(&[0; 4]);
    }
    wire
}

fn print_stats(stats: &StatsSnapshot) {
    println!("  rx transfers:      {}", stats.rx_transfers);
    println!("  rx samples:        {}", stats.rx_samples);
    println!("  rx overflow:       {}", stats.rx_overflow);
    println!("  tx transfers:      {}", stats.tx_transfers);
    println!("  tx samples:        {}", stats.tx_samples);
    println!("  tx underrun:       {}", stats.tx_underrun);
    println!("  transfer errors:   {}", stats.transfer_errors);
    println!("  resubmit failures: {}", stats.resubmit_failures);
    println!("  event errors:      {}", stats.event_errors);
}

// ---------------------------------------------------------------------------
// Commands
// ---------------------------------------------------------------------------

fn cmd_version(sdr: &AdSdr) -> Result<()> {
    let version = sdr.version().context("version query failed")?;
    println!("FPGA version: {version}");
    Ok(())
}

fn cmd_send(sdr: &AdSdr, name: &str, value: Option<f64>) -> Result<()> {
    let id: CommandId = name
        .parse()
        .with_context(|| format!("unknown command '{name}'"))?;
    let cmd = match (id.is_set(), value) {
        (true, Some(v)) => AdSdr::make_command(id, v)?,
        (false, Some(_)) => bail!("{id} does not take a value"),
        (_, None) => Command::new(id),
    };

    let resp = sdr.send_cmd(cmd)?;
    println!("{id}: status={} value={}", resp.status, resp.value());
    Ok(())
}

async fn cmd_rx(sdr: &AdSdr, usb: &MockUsbTransport, transfers: usize, depth: usize) -> Result<()> {
    let block_bytes = sdr.config().buffer_size;
    let slots = sdr.config().transfer_count;
    let mut rx = sdr.start_rx_stream(depth).await?;

    let device = usb.clone();
    let simulator = tokio::task::spawn_blocking(move || {
        let mut rng = rand::thread_rng();
        let mut completed = 0;
        while completed < transfers {
            if !device.wait_for_in_flight(Direction::Rx, slots, DEVICE_WAIT) {
                break;
            }
            if device.complete_rx(&random_rx_block(&mut rng, block_bytes)) {
                completed += 1;
            }
        }
        completed
    });

    let start = Instant::now();
    let mut batches = 0usize;
    let mut samples = 0usize;
    while batches < transfers {
        match tokio::time::timeout(DEVICE_WAIT, rx.recv()).await {
            Ok(Some(batch)) => {
                batches += 1;
                samples += batch.len();
            }
            Ok(None) | Err(_) => break,
        }
    }
    let completed = simulator.await.context("device simulator panicked")?;
    sdr.stop_rx().await?;

    info!(completed, batches, "RX run finished");
    println!(
        "Received {samples} samples in {batches} batches ({completed} transfers) in {:.1?}",
        start.elapsed()
    );
    println!("  dropped batches:   {}", rx.dropped_batches());
    print_stats(&sdr.stats());
    Ok(())
}

async fn cmd_tx(
    sdr: &mut AdSdr,
    usb: &MockUsbTransport,
    samples: usize,
    depth: usize,
) -> Result<()> {
    let per_block = sdr.config().buffer_size / 4;
    let slots = sdr.config().transfer_count;
    let payload: Vec<Sample> = {
        let mut rng = rand::thread_rng();
        (0..samples).map(|_| random_sample(&mut rng)).collect()
    };

    let tx = sdr.start_tx_stream(depth).await?;
    let silence = tx.clone();
    let feeder = tokio::spawn(async move {
        for chunk in payload.chunks(per_block) {
            tx.send(chunk.to_vec()).await?;
        }
        Ok::<_, adsdr::Error>(())
    });

    let device = usb.clone();
    let simulator = tokio::task::spawn_blocking(move || {
        let mut blocks = 0usize;
        let mut carried = 0usize;
        while carried < samples {
            if !device.wait_for_in_flight(Direction::Tx, slots, DEVICE_WAIT) {
                break;
            }
            let Some(bytes) = device.complete_tx() else {
                continue;
            };
            blocks += 1;
            carried += bytes.chunks_exact(4).filter(|s| s.iter().any(|&b| b != 0)).count();
        }
        (blocks, carried)
    });

    let start = Instant::now();
    let (blocks, carried) = simulator.await.context("device simulator panicked")?;
    // Stopping TX closes the channel, which ends a feeder still waiting
    // for space.
    sdr.stop_tx().await?;
    match feeder.await.context("TX feeder panicked")? {
        Ok(()) | Err(adsdr::Error::StreamClosed) => {}
        Err(e) => return Err(e.into()),
    }

    info!(blocks, carried, "TX run finished");
    println!(
        "Device received {carried} of {samples} samples in {blocks} blocks in {:.1?}",
        start.elapsed()
    );
    println!("  channel underrun:  {}", silence.underrun_samples());
    print_stats(&sdr.stats());
    Ok(())
}

// ---------------------------------------------------------------------------
// Main
// ---------------------------------------------------------------------------

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let cli = Cli::parse();

    let usb = MockUsbTransport::new();
    let mut sdr = AdSdrBuilder::new()
        .transfer_count(cli.transfer_count)
        .buffer_size(cli.buffer_size)
        .build(usb.clone(), MockTransceiver::new())
        .context("failed to open SDR")?;
    sdr.init_sdr()?;

    let result = match &cli.command {
        Cmd::Version => cmd_version(&sdr),
        Cmd::Cmd { name, value } => cmd_send(&sdr, name, *value),
        Cmd::Rx { transfers } => cmd_rx(&sdr, &usb, *transfers, cli.depth).await,
        Cmd::Tx { samples } => cmd_tx(&mut sdr, &usb, *samples, cli.depth).await,
    };

    sdr.shutdown();
    result
}
