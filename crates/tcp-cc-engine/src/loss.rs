use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use tcp_cc_abstract::LossModel;

/// Independent per-packet loss with probability `probability`, plus an optional
/// script of sequence numbers that are lost on their first transmission.
pub struct SimulatedLoss {
    rng: StdRng,
    probability: f64,
    drop_seq_once: Vec<u32>,
}

impl SimulatedLoss {
    pub fn new(probability: f64, seed: Option<u64>) -> Self {
        let rng = match seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_os_rng(),
        };
        Self {
            rng,
            probability,
            drop_seq_once: Vec::new(),
        }
    }

    /// Loses exactly the given sequence numbers, once each, and nothing else.
    pub fn scripted(seqs: impl IntoIterator<Item = u32>) -> Self {
        let mut loss = Self::new(0.0, Some(0));
        for seq in seqs {
            loss.add_drop_seq_once(seq);
        }
        loss
    }

    pub fn add_drop_seq_once(&mut self, seq: u32) {
        self.drop_seq_once.push(seq);
    }
}

impl LossModel for SimulatedLoss {
    fn is_lost(&mut self, seq: u32) -> bool {
        if let Some(pos) = self.drop_seq_once.iter().position(|s| *s == seq) {
            self.drop_seq_once.remove(pos);
            return true;
        }
        self.probability > 0.0 && self.rng.random::<f64>() < self.probability
    }
}

/// Never loses anything.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoLoss;

impl LossModel for NoLoss {
    fn is_lost(&mut self, _seq: u32) -> bool {
        false
    }
}
