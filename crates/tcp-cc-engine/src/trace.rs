use serde::Serialize;
use std::collections::HashMap;
use tcp_cc_abstract::SenderConfig;

/// What happened during one sender round.
#[derive(Debug, Clone, Default, Serialize, PartialEq)]
pub struct RoundReport {
    /// 1-based round index
    pub round: u32,
    pub cwnd_start: u32,
    pub cwnd_end: u32,
    pub ssthresh_start: u32,
    pub ssthresh_end: u32,
    /// Sequence numbers actually transmitted (retransmissions excluded)
    pub sent: Vec<u32>,
    /// Sequence numbers consumed by simulated loss
    pub lost: Vec<u32>,
    /// Acks collected before the round timeout, sorted
    pub acks: Vec<u32>,
    /// Acks that arrived after the round timeout or while awaiting a retransmission, sorted
    pub late_acks: Vec<u32>,
    pub duplicate_acks: u32,
    pub fast_retransmits: Vec<u32>,
    /// Responses never received before the drain timeout gave up on them
    pub abandoned: usize,
    pub in_flight_end: Vec<u32>,
}

impl RoundReport {
    pub fn had_loss(&self) -> bool {
        !self.lost.is_empty()
    }

    /// Packets put on the wire this round, retransmissions included.
    pub fn transmissions(&self) -> usize {
        self.sent.len() + self.fast_retransmits.len()
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct SessionReport {
    pub config: SenderConfig,
    pub rounds: Vec<RoundReport>,
    /// Per-round series keyed by metric name ("cwnd", "ssthresh"): (round, value)
    pub metrics: HashMap<String, Vec<(u32, f64)>>,
}

impl SessionReport {
    pub fn new(config: SenderConfig) -> Self {
        Self {
            config,
            rounds: Vec::new(),
            metrics: HashMap::new(),
        }
    }

    pub fn record(&mut self, round: RoundReport) {
        self.record_metric("cwnd", round.round, round.cwnd_end as f64);
        self.record_metric("ssthresh", round.round, round.ssthresh_end as f64);
        self.rounds.push(round);
    }

    fn record_metric(&mut self, name: &str, round: u32, value: f64) {
        self.metrics
            .entry(name.to_string())
            .or_default()
            .push((round, value));
    }

    pub fn round(&self, round: u32) -> Option<&RoundReport> {
        self.rounds.iter().find(|r| r.round == round)
    }

    /// Return the (round, value) samples for a named metric, if present.
    pub fn metric_series(&self, name: &str) -> Option<&[(u32, f64)]> {
        self.metrics.get(name).map(|v| v.as_slice())
    }

    /// Window size at the start of the session followed by its size after each round.
    pub fn cwnd_trace(&self) -> Vec<u32> {
        let first = self.rounds.first().map(|r| r.cwnd_start);
        first
            .into_iter()
            .chain(self.rounds.iter().map(|r| r.cwnd_end))
            .collect()
    }

    pub fn packets_sent(&self) -> usize {
        self.rounds.iter().map(RoundReport::transmissions).sum()
    }

    pub fn fast_retransmits(&self) -> impl Iterator<Item = u32> + '_ {
        self.rounds
            .iter()
            .flat_map(|r| r.fast_retransmits.iter().copied())
    }
}
