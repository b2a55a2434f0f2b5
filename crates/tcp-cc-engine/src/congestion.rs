use std::collections::VecDeque;

/// Outcome of feeding one cumulative acknowledgment to [`CongestionWindow::remove_acked`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Removal {
    /// The ack closed the oldest outstanding packet.
    Oldest,
    /// The ack covered the newest outstanding packet, so the whole window landed.
    Window,
    /// The ack pointed into the middle of the window (or at nothing) and was ignored.
    Ignored,
}

/// Sender-side window state: the size in packets plus the sequence numbers still
/// waiting for an acknowledgment, oldest first.
#[derive(Debug, Clone)]
pub struct CongestionWindow {
    cwnd: u32,
    cwnd_before_reset: u32,
    in_flight: VecDeque<u32>,
}

impl Default for CongestionWindow {
    fn default() -> Self {
        Self::new()
    }
}

impl CongestionWindow {
    pub fn new() -> Self {
        Self {
            cwnd: 1,
            cwnd_before_reset: 1,
            in_flight: VecDeque::new(),
        }
    }

    pub fn cwnd(&self) -> u32 {
        self.cwnd
    }

    pub fn in_flight(&self) -> &VecDeque<u32> {
        &self.in_flight
    }

    pub fn is_idle(&self) -> bool {
        self.in_flight.is_empty()
    }

    pub fn add_in_flight(&mut self, seq: u32) {
        self.in_flight.push_back(seq);
    }

    /// Apply the cumulative ack `ack`, which acknowledges sequence number `ack - 1`.
    ///
    /// Only the two ends of the window are matched: the oldest entry is dropped on
    /// its own, the newest clears everything. Acks landing in between are ignored.
    pub fn remove_acked(&mut self, ack: u32) -> Removal {
        let Some(seq) = ack.checked_sub(1) else {
            return Removal::Ignored;
        };

        if self.in_flight.front() == Some(&seq) {
            self.in_flight.pop_front();
            Removal::Oldest
        } else if self.in_flight.back() == Some(&seq) {
            self.in_flight.clear();
            Removal::Window
        } else {
            Removal::Ignored
        }
    }

    pub fn increase_slow_start(&mut self) {
        self.cwnd = self.cwnd.saturating_mul(2);
        self.cwnd_before_reset = self.cwnd;
    }

    pub fn increase_congestion_avoidance(&mut self) {
        self.cwnd = self.cwnd.saturating_add(1);
        self.cwnd_before_reset = self.cwnd;
    }

    /// Drop straight to one packet. `cwnd_before_reset` keeps the old size.
    pub fn reset_on_loss(&mut self) {
        self.cwnd = 1;
    }

    /// Hand out the size recorded before the last reset and start tracking from
    /// the current size again.
    pub fn consume_cwnd_before_reset(&mut self) -> u32 {
        std::mem::replace(&mut self.cwnd_before_reset, self.cwnd)
    }

    /// End-of-round growth: exponential below `ssthresh` (skipped after a lossy
    /// round), linear at or above it.
    pub fn grow(&mut self, ssthresh: u32, round_had_loss: bool) {
        if self.cwnd < ssthresh {
            if !round_had_loss {
                self.increase_slow_start();
            }
        } else {
            self.increase_congestion_avoidance();
        }
    }
}
