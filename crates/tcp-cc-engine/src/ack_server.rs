use crate::ack_engine::AckEngine;
use serde::Serialize;
use std::future::Future;
use tcp_cc_abstract::{DatagramTransport, Packet, TransportError};
use tracing::{debug, info, warn};

#[derive(Debug, Clone, Copy, Default, Serialize, PartialEq, Eq)]
pub struct ServerStats {
    pub datagrams_received: u64,
    pub acks_sent: u64,
    pub decode_failures: u64,
    pub send_failures: u64,
}

/// Receiver process loop: every decodable datagram is run through the
/// [`AckEngine`] and echoed back to its source with the ack stamped in.
pub struct AckServer<T> {
    transport: T,
    engine: AckEngine,
    stats: ServerStats,
}

impl<T: DatagramTransport> AckServer<T> {
    pub fn new(transport: T) -> Self {
        Self {
            transport,
            engine: AckEngine::new(),
            stats: ServerStats::default(),
        }
    }

    pub fn engine(&self) -> &AckEngine {
        &self.engine
    }

    pub fn stats(&self) -> ServerStats {
        self.stats
    }

    pub fn into_transport(self) -> T {
        self.transport
    }

    /// Handle a single inbound datagram. Only a failing receive is reported;
    /// bad datagrams and failed replies are logged and counted.
    pub async fn serve_one(&mut self) -> Result<(), TransportError> {
        let (datagram, from) = self.transport.recv_from().await?;
        self.stats.datagrams_received += 1;

        let packet = match Packet::decode(&datagram) {
            Ok(packet) => packet,
            Err(e) => {
                self.stats.decode_failures += 1;
                warn!("dropping undecodable datagram from {}: {}", from, e);
                return Ok(());
            }
        };
        debug!("Received seq: {}", packet.seq_num());

        let response = self.engine.on_packet(packet);
        let bytes = match response.encode() {
            Ok(bytes) => bytes,
            Err(e) => {
                self.stats.send_failures += 1;
                warn!("cannot encode ack for seq {}: {}", response.seq_num(), e);
                return Ok(());
            }
        };

        match self.transport.send_to(&bytes, from).await {
            Ok(()) => self.stats.acks_sent += 1,
            Err(e) => {
                self.stats.send_failures += 1;
                warn!("failed to send ack to {}: {}", from, e);
            }
        }
        Ok(())
    }

    /// Serve until the transport is closed.
    pub async fn serve(&mut self) {
        loop {
            match self.serve_one().await {
                Ok(()) => {}
                Err(TransportError::Closed) => {
                    info!("transport closed, receiver stopping");
                    return;
                }
                Err(e) => warn!("receive failed: {}", e),
            }
        }
    }

    /// Serve until the transport closes or `shutdown` resolves.
    pub async fn serve_until(&mut self, shutdown: impl Future<Output = ()>) -> ServerStats {
        tokio::select! {
            _ = self.serve() => {}
            _ = shutdown => info!("shutdown requested, receiver stopping"),
        }
        self.stats
    }
}
