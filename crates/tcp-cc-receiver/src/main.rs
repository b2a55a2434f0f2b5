use anyhow::{Context, Result};
use clap::Parser;
use std::net::SocketAddr;
use std::path::PathBuf;
use tracing::{info, warn};

use tcp_cc_abstract::{DatagramTransport, ReceiverConfig};
use tcp_cc_engine::{AckServer, UdpTransport};

#[derive(Parser, Debug)]
#[command(author, version, about = "Cumulative-ack UDP receiver")]
struct Args {
    /// Load receiver settings from a TOML file.
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Address to listen on; overrides the config file.
    #[arg(long)]
    bind: Option<SocketAddr>,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();
    tracing_subscriber::fmt::init();

    let mut config = match &args.config {
        Some(path) => ReceiverConfig::load(path)
            .with_context(|| format!("Failed to load config {}", path.display()))?,
        None => ReceiverConfig::default(),
    };
    if let Some(bind) = args.bind {
        config.bind_addr = bind;
    }

    let transport = UdpTransport::bind(config.bind_addr)
        .await
        .with_context(|| format!("Cannot start receiver on {}", config.bind_addr))?;
    info!("Server started on {}", transport.local_addr());

    let mut server = AckServer::new(transport);
    let stats = server.serve_until(shutdown_signal()).await;
    info!(
        "Receiver done: {} datagrams, {} acks sent, {} undecodable, next expected seq {}",
        stats.datagrams_received,
        stats.acks_sent,
        stats.decode_failures,
        server.engine().last_ack()
    );
    server.into_transport().close();
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        warn!("cannot listen for Ctrl-C: {}", e);
        std::future::pending::<()>().await;
    }
}
