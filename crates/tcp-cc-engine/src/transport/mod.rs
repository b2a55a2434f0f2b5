mod memory;
mod udp;

pub use memory::MemoryTransport;
pub use udp::UdpTransport;
