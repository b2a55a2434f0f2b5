use serde::{Deserialize, Serialize};
use std::net::{Ipv4Addr, SocketAddr, SocketAddrV4};
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;

/// Well-known receiver port both binaries agree on.
pub const DEFAULT_PORT: u16 = 12349;

pub const DEFAULT_SSTHRESH: u32 = 8;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config file {path}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to parse config")]
    Parse(#[from] toml::de::Error),
    #[error("invalid config: {0}")]
    Invalid(String),
}

pub fn default_receiver_addr() -> SocketAddr {
    SocketAddr::V4(SocketAddrV4::new(Ipv4Addr::LOCALHOST, DEFAULT_PORT))
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct SenderConfig {
    /// Receiver endpoint every packet is addressed to.
    pub peer_addr: SocketAddr,
    pub bind_addr: SocketAddr,
    /// Number of rounds before the session ends; `None` runs until shut down.
    pub rounds: Option<u32>,
    pub initial_ssthresh: u32,
    /// How long a round waits for its acknowledgments before processing what arrived.
    pub round_timeout_ms: u64,
    /// Upper bound on waiting for responses that missed the round timeout.
    pub drain_timeout_ms: u64,
    /// Independent per-packet probability of simulated loss.
    pub loss_probability: f64,
    /// Seed for the loss generator; `None` seeds from the OS.
    pub seed: Option<u64>,
    pub payload: String,
}

impl Default for SenderConfig {
    fn default() -> Self {
        Self {
            peer_addr: default_receiver_addr(),
            bind_addr: SocketAddr::V4(SocketAddrV4::new(Ipv4Addr::LOCALHOST, 0)),
            rounds: Some(20),
            initial_ssthresh: DEFAULT_SSTHRESH,
            round_timeout_ms: 5000,
            drain_timeout_ms: 5000,
            loss_probability: 0.01,
            seed: None,
            payload: "Hello World".to_string(),
        }
    }
}

impl SenderConfig {
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_toml(&content)
    }

    pub fn from_toml(content: &str) -> Result<Self, ConfigError> {
        let config: Self = toml::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if !(0.0..=1.0).contains(&self.loss_probability) {
            return Err(ConfigError::Invalid(format!(
                "loss_probability {} is outside [0, 1]",
                self.loss_probability
            )));
        }
        if self.initial_ssthresh == 0 {
            return Err(ConfigError::Invalid("initial_ssthresh must be at least 1".into()));
        }
        if self.round_timeout_ms == 0 {
            return Err(ConfigError::Invalid("round_timeout_ms must be positive".into()));
        }
        if self.payload.len() > u16::MAX as usize {
            return Err(ConfigError::Invalid(format!(
                "payload of {} bytes does not fit in a packet",
                self.payload.len()
            )));
        }
        Ok(())
    }

    pub fn round_timeout(&self) -> Duration {
        Duration::from_millis(self.round_timeout_ms)
    }

    pub fn drain_timeout(&self) -> Duration {
        Duration::from_millis(self.drain_timeout_ms)
    }
}

/// Partial sender settings layered on top of a base config (CLI flags, scenario files).
#[derive(Deserialize, Debug, Clone, Default)]
pub struct SenderConfigOverride {
    pub peer_addr: Option<SocketAddr>,
    pub bind_addr: Option<SocketAddr>,
    pub rounds: Option<u32>,
    pub initial_ssthresh: Option<u32>,
    pub round_timeout_ms: Option<u64>,
    pub drain_timeout_ms: Option<u64>,
    pub loss_probability: Option<f64>,
    pub seed: Option<u64>,
    pub payload: Option<String>,
}

impl SenderConfigOverride {
    pub fn apply_to(&self, config: &mut SenderConfig) {
        if let Some(v) = self.peer_addr {
            config.peer_addr = v;
        }
        if let Some(v) = self.bind_addr {
            config.bind_addr = v;
        }
        if let Some(v) = self.rounds {
            config.rounds = Some(v);
        }
        if let Some(v) = self.initial_ssthresh {
            config.initial_ssthresh = v;
        }
        if let Some(v) = self.round_timeout_ms {
            config.round_timeout_ms = v;
        }
        if let Some(v) = self.drain_timeout_ms {
            config.drain_timeout_ms = v;
        }
        if let Some(v) = self.loss_probability {
            config.loss_probability = v;
        }
        if let Some(v) = self.seed {
            config.seed = Some(v);
        }
        if let Some(v) = &self.payload {
            config.payload = v.clone();
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct ReceiverConfig {
    pub bind_addr: SocketAddr,
}

impl Default for ReceiverConfig {
    fn default() -> Self {
        Self {
            bind_addr: default_receiver_addr(),
        }
    }
}

impl ReceiverConfig {
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        Ok(toml::from_str(&content)?)
    }
}
