use bytes::Bytes;
use std::net::SocketAddr;
use tcp_cc_abstract::{DatagramTransport, TransportError};
use tokio::sync::mpsc;
use tracing::debug;

type Datagram = (Bytes, SocketAddr);

/// One end of an in-process datagram link. Delivery is lossless and in order;
/// loss is injected by the sender's `LossModel`.
#[derive(Debug)]
pub struct MemoryTransport {
    local_addr: SocketAddr,
    peer_addr: SocketAddr,
    tx: mpsc::UnboundedSender<Datagram>,
    rx: mpsc::UnboundedReceiver<Datagram>,
}

impl MemoryTransport {
    /// Two connected endpoints pretending to live at `a` and `b`.
    pub fn pair(a: SocketAddr, b: SocketAddr) -> (Self, Self) {
        let (tx_to_b, rx_at_b) = mpsc::unbounded_channel();
        let (tx_to_a, rx_at_a) = mpsc::unbounded_channel();
        (
            Self {
                local_addr: a,
                peer_addr: b,
                tx: tx_to_b,
                rx: rx_at_a,
            },
            Self {
                local_addr: b,
                peer_addr: a,
                tx: tx_to_a,
                rx: rx_at_b,
            },
        )
    }

    pub fn peer_addr(&self) -> SocketAddr {
        self.peer_addr
    }
}

impl DatagramTransport for MemoryTransport {
    fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    async fn send_to(&self, datagram: &[u8], dest: SocketAddr) -> Result<(), TransportError> {
        if dest != self.peer_addr {
            // Nobody listens there; like UDP, the datagram just vanishes.
            debug!("no endpoint at {}, dropping {} bytes", dest, datagram.len());
            return Ok(());
        }
        self.tx
            .send((Bytes::copy_from_slice(datagram), self.local_addr))
            .map_err(|_| TransportError::Closed)
    }

    async fn recv_from(&mut self) -> Result<(Bytes, SocketAddr), TransportError> {
        self.rx.recv().await.ok_or(TransportError::Closed)
    }
}
