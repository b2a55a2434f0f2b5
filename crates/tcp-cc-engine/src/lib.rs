pub mod ack_engine;
pub mod ack_server;
pub mod congestion;
pub mod loss;
pub mod round_driver;
pub mod scenario_runner;
pub mod trace;
pub mod transport;

pub use ack_engine::AckEngine;
pub use ack_server::{AckServer, ServerStats};
pub use congestion::{CongestionWindow, Removal};
pub use loss::{NoLoss, SimulatedLoss};
pub use round_driver::RoundDriver;
pub use trace::{RoundReport, SessionReport};
pub use transport::{MemoryTransport, UdpTransport};
