use bytes::Bytes;
use std::future::Future;
use std::net::SocketAddr;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum TransportError {
    #[error("failed to bind datagram endpoint {addr}")]
    Bind {
        addr: SocketAddr,
        #[source]
        source: std::io::Error,
    },
    #[error("datagram I/O failed")]
    Io(#[from] std::io::Error),
    #[error("transport closed by peer")]
    Closed,
}

/// An unreliable datagram endpoint.
///
/// Sends are fire-and-forget: `Ok` only means the datagram left this endpoint.
/// Inbound datagrams queue up until `recv_from` drains them; callers bound the
/// wait with `tokio::time::timeout` where they need one.
pub trait DatagramTransport {
    fn local_addr(&self) -> SocketAddr;

    fn send_to(
        &self,
        datagram: &[u8],
        dest: SocketAddr,
    ) -> impl Future<Output = Result<(), TransportError>> + Send;

    fn recv_from(
        &mut self,
    ) -> impl Future<Output = Result<(Bytes, SocketAddr), TransportError>> + Send;
}

/// Decides which outgoing packets the sender pretends the network dropped.
pub trait LossModel {
    fn is_lost(&mut self, seq: u32) -> bool;
}

impl<L: LossModel + ?Sized> LossModel for Box<L> {
    fn is_lost(&mut self, seq: u32) -> bool {
        (**self).is_lost(seq)
    }
}
