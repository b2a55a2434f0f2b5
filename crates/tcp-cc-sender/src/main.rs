use anyhow::{Context, Result};
use clap::Parser;
use std::fs;
use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use tracing::{info, warn};

use tcp_cc_abstract::{SenderConfig, SenderConfigOverride};
use tcp_cc_engine::{RoundDriver, SessionReport, SimulatedLoss, UdpTransport};

#[derive(Parser, Debug)]
#[command(author, version, about = "Congestion-controlled UDP sender")]
struct Args {
    /// Load sender settings from a TOML file; flags below override it.
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Receiver address.
    #[arg(long)]
    peer: Option<SocketAddr>,

    /// Local address to bind.
    #[arg(long)]
    bind: Option<SocketAddr>,

    /// Number of rounds to run.
    #[arg(long, conflicts_with = "forever")]
    rounds: Option<u32>,

    /// Keep sending until interrupted.
    #[arg(long, default_value_t = false)]
    forever: bool,

    /// Per-packet probability of simulated loss.
    #[arg(long)]
    loss: Option<f64>,

    /// Seed for the loss generator.
    #[arg(long)]
    seed: Option<u64>,

    /// Initial slow-start threshold.
    #[arg(long)]
    ssthresh: Option<u32>,

    /// Round timeout in milliseconds.
    #[arg(long)]
    timeout_ms: Option<u64>,

    /// How long to wait for responses that missed the round timeout, in milliseconds.
    #[arg(long)]
    drain_timeout_ms: Option<u64>,

    /// Payload carried by every data packet.
    #[arg(long)]
    payload: Option<String>,

    /// Write a JSON trace of the finished session.
    #[arg(long)]
    trace_out: Option<PathBuf>,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();
    tracing_subscriber::fmt::init();
    info!("tcp-cc-sender starting...");

    let config = args.sender_config()?;
    let transport = UdpTransport::bind(config.bind_addr)
        .await
        .with_context(|| format!("Cannot start sender on {}", config.bind_addr))?;
    let loss = SimulatedLoss::new(config.loss_probability, config.seed);

    info!(
        "Client Started: peer={} rounds={:?} ssthresh={} loss={}",
        config.peer_addr, config.rounds, config.initial_ssthresh, config.loss_probability
    );

    let rounds = config.rounds;
    let mut driver = RoundDriver::new(config, transport, loss);
    let report = driver.run_until(rounds, shutdown_signal()).await;
    info!(
        "Session finished after {} rounds, final cwnd {}, next seq {}",
        driver.rounds_completed(),
        driver.window().cwnd(),
        driver.next_seq()
    );
    driver.into_transport().close();

    if let Some(trace_path) = &args.trace_out {
        write_trace(trace_path, &report)?;
    }
    Ok(())
}

impl Args {
    fn sender_config(&self) -> Result<SenderConfig> {
        let mut config = match &self.config {
            Some(path) => SenderConfig::load(path)
                .with_context(|| format!("Failed to load config {}", path.display()))?,
            None => SenderConfig::default(),
        };

        let overrides = SenderConfigOverride {
            peer_addr: self.peer,
            bind_addr: self.bind,
            rounds: self.rounds,
            initial_ssthresh: self.ssthresh,
            round_timeout_ms: self.timeout_ms,
            drain_timeout_ms: self.drain_timeout_ms,
            loss_probability: self.loss,
            seed: self.seed,
            payload: self.payload.clone(),
        };
        overrides.apply_to(&mut config);
        if self.forever {
            config.rounds = None;
        }
        config.validate()?;
        Ok(config)
    }
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        warn!("cannot listen for Ctrl-C: {}", e);
        std::future::pending::<()>().await;
    }
}

fn write_trace(path: &Path, report: &SessionReport) -> Result<()> {
    let data = serde_json::to_vec_pretty(report).context("Failed to serialize session trace")?;
    fs::write(path, &data)
        .with_context(|| format!("Failed to write trace file {}", path.display()))?;
    Ok(())
}
