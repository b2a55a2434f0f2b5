pub mod config;
pub mod interface;
pub mod packet;
pub mod scenario;

pub use interface::{DatagramTransport, LossModel, TransportError};
pub use packet::{CodecError, Header, Packet};
// Re-export flags module from packet so users can access the header flag bits
pub use packet::flags;

pub use config::{ConfigError, ReceiverConfig, SenderConfig, SenderConfigOverride};
pub use scenario::{TestAction, TestAssertion, TestScenario};
