use tcp_cc_abstract::Packet;
use tracing::debug;

/// Receiver-side cumulative acknowledgment state for a single flow.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AckEngine {
    last_ack: u32,
    loss_detected: bool,
    received_since_loss: u32,
}

impl AckEngine {
    pub fn new() -> Self {
        Self::default()
    }

    /// Next sequence number the receiver can acknowledge contiguously.
    pub fn last_ack(&self) -> u32 {
        self.last_ack
    }

    pub fn in_recovery(&self) -> bool {
        self.loss_detected
    }

    pub fn received_since_loss(&self) -> u32 {
        self.received_since_loss
    }

    /// Compute the cumulative ack for `packet`, stamp it and hand the packet back
    /// as the response.
    ///
    /// A packet matching the baseline advances it by one, or, while a gap is open,
    /// past every packet buffered since the gap. Anything else opens (or widens)
    /// the gap and repeats the baseline as a duplicate ack.
    pub fn on_packet(&mut self, mut packet: Packet) -> Packet {
        let seq = packet.seq_num();

        let next_ack = if seq == self.last_ack {
            if self.loss_detected {
                let caught_up = self
                    .last_ack
                    .saturating_add(self.received_since_loss)
                    .saturating_add(1);
                debug!(
                    "gap at {} filled, skipping {} buffered packets",
                    seq, self.received_since_loss
                );
                self.loss_detected = false;
                self.received_since_loss = 0;
                caught_up
            } else {
                seq.saturating_add(1)
            }
        } else {
            self.loss_detected = true;
            self.received_since_loss += 1;
            debug!(
                "out-of-order seq {} (expected {}), re-acking {}",
                seq, self.last_ack, self.last_ack
            );
            self.last_ack
        };

        packet.set_ack(next_ack);
        self.last_ack = next_ack;
        packet
    }
}
