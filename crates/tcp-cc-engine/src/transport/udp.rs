use bytes::Bytes;
use std::net::SocketAddr;
use tcp_cc_abstract::{DatagramTransport, TransportError};
use tokio::net::UdpSocket;
use tracing::info;

/// Largest datagram we ever read.
const MAX_DATAGRAM: usize = 65_535;

/// A tokio UDP socket speaking raw datagrams.
#[derive(Debug)]
pub struct UdpTransport {
    socket: UdpSocket,
    local_addr: SocketAddr,
    buf: Vec<u8>,
}

impl UdpTransport {
    /// Bind to `addr`. Failing here is fatal for either process, so the error
    /// keeps the address it was trying to claim.
    pub async fn bind(addr: SocketAddr) -> Result<Self, TransportError> {
        let socket = UdpSocket::bind(addr)
            .await
            .map_err(|source| TransportError::Bind { addr, source })?;
        let local_addr = socket.local_addr()?;
        info!("datagram endpoint bound to {}", local_addr);
        Ok(Self {
            socket,
            local_addr,
            buf: vec![0u8; MAX_DATAGRAM],
        })
    }

    /// Release the socket.
    pub fn close(self) {
        info!("datagram endpoint {} closed", self.local_addr);
    }
}

impl DatagramTransport for UdpTransport {
    fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    async fn send_to(&self, datagram: &[u8], dest: SocketAddr) -> Result<(), TransportError> {
        self.socket.send_to(datagram, dest).await?;
        Ok(())
    }

    async fn recv_from(&mut self) -> Result<(Bytes, SocketAddr), TransportError> {
        let (n, from) = self.socket.recv_from(&mut self.buf).await?;
        Ok((Bytes::copy_from_slice(&self.buf[..n]), from))
    }
}
