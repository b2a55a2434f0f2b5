use crate::config::SenderConfigOverride;
use serde::Deserialize;

#[derive(Deserialize, Debug, Clone)]
pub struct TestScenario {
    pub name: String,
    pub description: String,
    #[serde(default)]
    pub config: SenderConfigOverride,
    #[serde(default)]
    pub actions: Vec<TestAction>,
    #[serde(default)]
    pub assertions: Vec<TestAssertion>,
}

#[derive(Deserialize, Debug, Clone)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum TestAction {
    /// Deterministically lose the first transmission of the packet with this seq number
    DropSenderSeq { seq: u32 },
}

#[derive(Deserialize, Debug, Clone)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum TestAssertion {
    /// cwnd at the end of a given round (1-based)
    CwndAfterRound { round: u32, cwnd: u32 },
    /// ssthresh at the end of a given round (1-based)
    SsthreshAfterRound { round: u32, ssthresh: u32 },
    /// The largest cwnd seen over the session is within range
    CwndMax { min: u32, max: Option<u32> },
    /// cwnd climbs to at least `from_at_least` and later falls to at most `to_at_most`
    CwndDrop { from_at_least: u32, to_at_most: u32 },
    /// A fast retransmit of this seq number happened
    FastRetransmit { seq: u32 },
    /// Number of packets actually put on the wire, retransmissions included
    PacketsSent { min: u32, max: Option<u32> },
}

impl TestScenario {
    pub fn from_toml(content: &str) -> Result<Self, toml::de::Error> {
        toml::from_str(content)
    }
}
