use crate::congestion::{CongestionWindow, Removal};
use crate::trace::{RoundReport, SessionReport};
use std::collections::BTreeSet;
use std::future::Future;
use tcp_cc_abstract::{DatagramTransport, LossModel, Packet, SenderConfig, TransportError};
use tokio::time::{Instant, timeout_at};
use tracing::{debug, info, warn};

/// Duplicate acks needed to trigger a fast retransmit.
const DUP_ACK_THRESHOLD: u32 = 3;

/// Outcome of waiting for one response datagram.
enum Inbound {
    Response(Packet),
    /// Something arrived that cannot be tied to any transmission.
    Unusable,
    /// Deadline passed, or no more responses can arrive.
    Timeout,
}

/// Transient bookkeeping for the round in progress.
struct RoundState {
    report: RoundReport,
    dup_acks: u32,
    /// Sequence numbers transmitted this round whose response has not been read yet.
    outstanding: BTreeSet<u32>,
    /// Acks read outside the main collection window, processed before advancing.
    late: Vec<u32>,
}

/// Sender side of the flow. Each round fills the congestion window, collects
/// the acknowledgments, reacts to them and advances the window.
///
/// All congestion state lives here and is only touched through `&mut self`.
pub struct RoundDriver<T, L> {
    config: SenderConfig,
    transport: T,
    loss: L,
    window: CongestionWindow,
    ssthresh: u32,
    /// First sequence number of the current window.
    window_base: u32,
    next_seq: u32,
    /// Last processed ack; equal acks after it count as duplicates.
    last_ack: u32,
    rounds_completed: u32,
}

impl<T: DatagramTransport, L: LossModel> RoundDriver<T, L> {
    pub fn new(config: SenderConfig, transport: T, loss: L) -> Self {
        let ssthresh = config.initial_ssthresh;
        Self {
            config,
            transport,
            loss,
            window: CongestionWindow::new(),
            ssthresh,
            window_base: 0,
            next_seq: 0,
            last_ack: 0,
            rounds_completed: 0,
        }
    }

    pub fn window(&self) -> &CongestionWindow {
        &self.window
    }

    pub fn ssthresh(&self) -> u32 {
        self.ssthresh
    }

    pub fn next_seq(&self) -> u32 {
        self.next_seq
    }

    pub fn rounds_completed(&self) -> u32 {
        self.rounds_completed
    }

    pub fn into_transport(self) -> T {
        self.transport
    }

    /// Run `rounds` complete rounds.
    pub async fn run_rounds(&mut self, rounds: u32) -> SessionReport {
        self.run_until(Some(rounds), std::future::pending()).await
    }

    /// Run until `rounds` rounds completed (forever when `None`) or `shutdown`
    /// resolves. A round interrupted by shutdown is abandoned, and the driver
    /// should not be used for further rounds afterwards.
    pub async fn run_until(
        &mut self,
        rounds: Option<u32>,
        shutdown: impl Future<Output = ()>,
    ) -> SessionReport {
        let mut session = SessionReport::new(self.config.clone());
        tokio::pin!(shutdown);

        while rounds.is_none_or(|limit| self.rounds_completed < limit) {
            tokio::select! {
                biased;
                _ = &mut shutdown => {
                    info!("shutdown requested after {} rounds", self.rounds_completed);
                    break;
                }
                report = self.run_round() => session.record(report),
            }
        }
        session
    }

    pub async fn run_round(&mut self) -> RoundReport {
        let mut round = RoundState {
            report: RoundReport {
                round: self.rounds_completed + 1,
                cwnd_start: self.window.cwnd(),
                ssthresh_start: self.ssthresh,
                ..Default::default()
            },
            dup_acks: 0,
            outstanding: BTreeSet::new(),
            late: Vec::new(),
        };

        self.fill_window(&mut round).await;
        info!(
            "round {}: congestion window (size = {}) {:?}",
            round.report.round,
            self.window.cwnd(),
            self.window.in_flight()
        );
        for seq in &round.report.lost {
            info!("Lost packet: {}", seq);
        }

        let deadline = Instant::now() + self.config.round_timeout();
        let mut acks = self.collect_acks(&mut round, deadline).await;
        acks.sort_unstable();
        info!("{:?} <= Received Acks", acks);
        round.report.acks = acks.clone();

        self.process_acks(&mut round, &acks).await;
        self.drain_late(&mut round).await;
        self.advance(&mut round);

        self.rounds_completed += 1;
        let mut report = round.report;
        report.cwnd_end = self.window.cwnd();
        report.ssthresh_end = self.ssthresh;
        report.in_flight_end = self.window.in_flight().iter().copied().collect();
        report
    }

    async fn fill_window(&mut self, round: &mut RoundState) {
        let limit = self.window_base.saturating_add(self.window.cwnd());
        while self.next_seq < limit {
            let seq = self.next_seq;
            self.next_seq += 1;

            if self.loss.is_lost(seq) {
                round.report.lost.push(seq);
                continue;
            }

            self.transmit(seq).await;
            self.window.add_in_flight(seq);
            round.outstanding.insert(seq);
            round.report.sent.push(seq);
        }
    }

    /// Put a data packet for `seq` on the wire. Failures are reported and
    /// otherwise treated like network loss.
    async fn transmit(&self, seq: u32) {
        let packet = Packet::new_data(seq, self.config.payload.as_bytes());
        let bytes = match packet.encode() {
            Ok(bytes) => bytes,
            Err(e) => {
                warn!("cannot encode seq {}: {}", seq, e);
                return;
            }
        };
        match self.transport.send_to(&bytes, self.config.peer_addr).await {
            Ok(()) => debug!("sent seq {}", seq),
            Err(e) => warn!("send of seq {} failed: {}", seq, e),
        }
    }

    async fn collect_acks(&mut self, round: &mut RoundState, deadline: Instant) -> Vec<u32> {
        let mut acks = Vec::with_capacity(round.outstanding.len());
        while !round.outstanding.is_empty() {
            match self.recv_response(deadline).await {
                Inbound::Response(packet) => acks.extend(settle(round, &packet)),
                Inbound::Unusable => {}
                Inbound::Timeout => {
                    info!(
                        "round {} timed out with {} responses outstanding",
                        round.report.round,
                        round.outstanding.len()
                    );
                    break;
                }
            }
        }
        acks
    }

    async fn recv_response(&mut self, deadline: Instant) -> Inbound {
        loop {
            let received = match timeout_at(deadline, self.transport.recv_from()).await {
                Ok(received) => received,
                Err(_) => return Inbound::Timeout,
            };

            let (datagram, from) = match received {
                Ok(received) => received,
                Err(TransportError::Closed) => {
                    warn!("transport closed while awaiting responses");
                    return Inbound::Timeout;
                }
                Err(e) => {
                    warn!("receive failed: {}", e);
                    return Inbound::Unusable;
                }
            };
            if from != self.config.peer_addr {
                debug!("ignoring datagram from unexpected source {}", from);
                continue;
            }

            return match Packet::decode(&datagram) {
                Ok(packet) => Inbound::Response(packet),
                Err(e) => {
                    warn!("dropping undecodable response: {}", e);
                    Inbound::Unusable
                }
            };
        }
    }

    async fn process_acks(&mut self, round: &mut RoundState, acks: &[u32]) {
        for &ack in acks {
            if self.window.is_idle() {
                debug!("window empty, ignoring remaining acks");
                break;
            }

            if ack == self.last_ack {
                round.dup_acks += 1;
                round.report.duplicate_acks += 1;
                if round.dup_acks == DUP_ACK_THRESHOLD {
                    self.fast_retransmit(round, ack).await;
                    round.dup_acks = 0;
                }
                continue;
            }

            let removal = self.window.remove_acked(ack);
            if removal == Removal::Ignored {
                debug!("ack {} does not close either end of the window", ack);
            }
            self.last_ack = ack;
            round.dup_acks = 0;
        }
    }

    /// Resend `seq` right away, halve ssthresh, collapse the window and wait
    /// for the retransmission to be acknowledged.
    async fn fast_retransmit(&mut self, round: &mut RoundState, seq: u32) {
        self.transmit(seq).await;
        info!("Retransmitted packet: {}", seq);
        round.report.fast_retransmits.push(seq);
        round.outstanding.insert(seq);

        self.ssthresh = self.window.cwnd() / 2;
        self.window.reset_on_loss();

        let deadline = Instant::now() + self.config.round_timeout();
        loop {
            match self.recv_response(deadline).await {
                Inbound::Response(packet) => {
                    let Some(ack) = settle(round, &packet) else {
                        continue;
                    };
                    if packet.seq_num() != seq {
                        round.late.push(ack);
                        continue;
                    }
                    info!("{} <= Received Ack after retransmission", ack);
                    self.window.remove_acked(ack);
                    self.last_ack = ack;
                    return;
                }
                Inbound::Unusable => {}
                Inbound::Timeout => {
                    warn!("no ack for retransmitted seq {}", seq);
                    return;
                }
            }
        }
    }

    /// Wait out responses that missed the round timeout and process every ack
    /// that was set aside, so the next round starts with nothing outstanding.
    async fn drain_late(&mut self, round: &mut RoundState) {
        loop {
            if !round.outstanding.is_empty() {
                let deadline = Instant::now() + self.config.drain_timeout();
                while !round.outstanding.is_empty() {
                    match self.recv_response(deadline).await {
                        Inbound::Response(packet) => {
                            if let Some(ack) = settle(round, &packet) {
                                round.late.push(ack);
                            }
                        }
                        Inbound::Unusable => {}
                        Inbound::Timeout => {
                            warn!("giving up on responses for {:?}", round.outstanding);
                            round.report.abandoned += round.outstanding.len();
                            round.outstanding.clear();
                        }
                    }
                }
            }

            if round.late.is_empty() {
                return;
            }
            let mut late = std::mem::take(&mut round.late);
            late.sort_unstable();
            info!("{:?} <= Received late Acks", late);
            round.report.late_acks.extend_from_slice(&late);
            self.process_acks(round, &late).await;
        }
    }

    fn advance(&mut self, round: &mut RoundState) {
        let had_loss = round.report.had_loss();
        let step = if had_loss {
            self.window.consume_cwnd_before_reset()
        } else {
            self.window.cwnd()
        };
        self.window_base = self.window_base.saturating_add(step);
        self.window.grow(self.ssthresh, had_loss);
    }
}

/// Match a response against the round's outstanding transmissions and return its
/// ack. Stale or duplicated responses match nothing and are dropped.
fn settle(round: &mut RoundState, packet: &Packet) -> Option<u32> {
    let seq = packet.seq_num();
    if !round.outstanding.remove(&seq) {
        debug!("ignoring stale or duplicate response for seq {}", seq);
        return None;
    }
    if packet.ack_num().is_none() {
        warn!("response for seq {} carries no ack", seq);
    }
    packet.ack_num()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ack_engine::AckEngine;
    use crate::ack_server::AckServer;
    use crate::loss::{NoLoss, SimulatedLoss};
    use crate::transport::MemoryTransport;
    use std::net::SocketAddr;
    use std::time::Duration;

    fn sender_addr() -> SocketAddr {
        "10.0.0.1:4000".parse().unwrap()
    }

    fn receiver_addr() -> SocketAddr {
        "10.0.0.2:12349".parse().unwrap()
    }

    fn config() -> SenderConfig {
        SenderConfig {
            peer_addr: receiver_addr(),
            bind_addr: sender_addr(),
            loss_probability: 0.0,
            round_timeout_ms: 100,
            drain_timeout_ms: 1000,
            ..Default::default()
        }
    }

    async fn run_against_receiver<L: LossModel>(
        config: SenderConfig,
        loss: L,
        rounds: u32,
    ) -> SessionReport {
        let (sender_end, receiver_end) = MemoryTransport::pair(sender_addr(), receiver_addr());
        let mut driver = RoundDriver::new(config, sender_end, loss);
        let mut server = AckServer::new(receiver_end);

        tokio::select! {
            report = driver.run_rounds(rounds) => report,
            _ = server.serve() => panic!("receiver stopped early"),
        }
    }

    #[tokio::test]
    async fn clean_rounds_follow_slow_start_then_linear_growth() {
        let report = run_against_receiver(config(), NoLoss, 6).await;

        assert_eq!(report.cwnd_trace(), vec![1, 2, 4, 8, 9, 10, 11]);
        assert_eq!(report.packets_sent(), 1 + 2 + 4 + 8 + 9 + 10);
        assert!(report.rounds.iter().all(|r| r.in_flight_end.is_empty()));
        assert!(report.rounds.iter().all(|r| r.ssthresh_end == 8));
        assert_eq!(report.round(4).unwrap().sent, (7..15).collect::<Vec<_>>());
    }

    #[tokio::test]
    async fn two_duplicates_wait_and_third_triggers_fast_retransmit() {
        let report = run_against_receiver(config(), SimulatedLoss::scripted([4]), 4).await;

        let round3 = report.round(3).unwrap();
        assert_eq!(round3.sent, vec![3, 5, 6]);
        assert_eq!(round3.lost, vec![4]);
        assert_eq!(round3.acks, vec![4, 4, 4]);
        assert_eq!(round3.duplicate_acks, 2);
        assert!(round3.fast_retransmits.is_empty());
        assert_eq!(round3.cwnd_end, 4);
        assert_eq!(round3.in_flight_end, vec![5, 6]);

        let round4 = report.round(4).unwrap();
        assert_eq!(round4.sent, vec![7, 8, 9, 10]);
        assert_eq!(round4.acks, vec![4, 4, 4, 4]);
        assert_eq!(round4.fast_retransmits, vec![4]);
        assert_eq!(round4.ssthresh_end, 2);
        // reset to 1 at the trigger, then one clean slow-start step
        assert_eq!(round4.cwnd_end, 2);
        assert!(round4.in_flight_end.is_empty());
    }

    #[tokio::test]
    async fn ssthresh_is_half_of_cwnd_at_trigger_time() {
        let mut config = config();
        config.initial_ssthresh = 32;
        // rounds 1..=4 carry 1, 2, 4, 8 packets; seq 8 sits in the cwnd = 8 round
        let report = run_against_receiver(config, SimulatedLoss::scripted([8]), 5).await;

        let retransmit_round = report
            .rounds
            .iter()
            .find(|r| !r.fast_retransmits.is_empty())
            .expect("fast retransmit expected");
        assert_eq!(retransmit_round.fast_retransmits, vec![8]);
        assert_eq!(retransmit_round.cwnd_start, 8);
        assert_eq!(retransmit_round.ssthresh_end, 4);
    }

    #[tokio::test]
    async fn lossy_round_advances_by_pre_reset_window() {
        let report = run_against_receiver(config(), SimulatedLoss::scripted([4]), 4).await;
        // round 3 lost seq 4 and advanced by the recorded window of 4, so round 4
        // starts at seq 7
        assert_eq!(report.round(4).unwrap().sent.first(), Some(&7));
    }

    #[tokio::test(start_paused = true)]
    async fn silent_receiver_times_out_and_abandons() {
        let (sender_end, _receiver_end) = MemoryTransport::pair(sender_addr(), receiver_addr());
        let mut driver = RoundDriver::new(config(), sender_end, NoLoss);

        let report = driver.run_round().await;
        assert_eq!(report.sent, vec![0]);
        assert!(report.acks.is_empty());
        assert_eq!(report.abandoned, 1);
        assert_eq!(report.in_flight_end, vec![0]);
        assert_eq!(report.cwnd_end, 2);
    }

    #[tokio::test(start_paused = true)]
    async fn late_responses_are_processed_before_next_round() {
        let (sender_end, mut receiver_end) =
            MemoryTransport::pair(sender_addr(), receiver_addr());
        let mut driver = RoundDriver::new(config(), sender_end, NoLoss);

        let slow_receiver = async {
            let mut engine = AckEngine::new();
            loop {
                let (bytes, from) = receiver_end.recv_from().await.unwrap();
                tokio::time::sleep(Duration::from_millis(150)).await;
                let response = engine.on_packet(Packet::decode(&bytes).unwrap());
                receiver_end
                    .send_to(&response.encode().unwrap(), from)
                    .await
                    .unwrap();
            }
        };

        let report = tokio::select! {
            report = driver.run_round() => report,
            _ = slow_receiver => unreachable!(),
        };
        assert!(report.acks.is_empty());
        assert_eq!(report.late_acks, vec![1]);
        assert_eq!(report.abandoned, 0);
        assert!(report.in_flight_end.is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn undecodable_response_leaves_packet_unacknowledged() {
        let (sender_end, mut receiver_end) =
            MemoryTransport::pair(sender_addr(), receiver_addr());
        let mut driver = RoundDriver::new(config(), sender_end, NoLoss);

        let garbage_receiver = async {
            loop {
                let (_, from) = receiver_end.recv_from().await.unwrap();
                receiver_end.send_to(b"garbage", from).await.unwrap();
            }
        };

        let report = tokio::select! {
            report = driver.run_round() => report,
            _ = garbage_receiver => unreachable!(),
        };
        assert!(report.acks.is_empty());
        assert_eq!(report.abandoned, 1);
        assert_eq!(report.in_flight_end, vec![0]);
    }

    /// Acks like the real receiver, but sends the response to `repeat_seq` twice.
    async fn repeating_receiver(mut end: MemoryTransport, repeat_seq: u32) {
        let mut engine = AckEngine::new();
        loop {
            let (bytes, from) = end.recv_from().await.unwrap();
            let response = engine.on_packet(Packet::decode(&bytes).unwrap());
            let encoded = response.encode().unwrap();
            end.send_to(&encoded, from).await.unwrap();
            if response.seq_num() == repeat_seq {
                end.send_to(&encoded, from).await.unwrap();
            }
        }
    }

    #[tokio::test]
    async fn repeated_response_stays_in_its_own_round() {
        let (sender_end, receiver_end) = MemoryTransport::pair(sender_addr(), receiver_addr());
        let mut driver = RoundDriver::new(config(), sender_end, NoLoss);

        let report = tokio::select! {
            report = driver.run_rounds(2) => report,
            _ = repeating_receiver(receiver_end, 0) => unreachable!(),
        };

        let round2 = report.round(2).unwrap();
        assert_eq!(round2.sent, vec![1, 2]);
        assert_eq!(round2.acks, vec![2, 3]);
        assert!(round2.late_acks.is_empty());
        assert!(report.rounds.iter().all(|r| r.in_flight_end.is_empty()));
        assert_eq!(report.cwnd_trace(), vec![1, 2, 4]);
    }

    #[tokio::test]
    async fn repeated_response_during_fast_retransmit_is_ignored() {
        let (sender_end, receiver_end) = MemoryTransport::pair(sender_addr(), receiver_addr());
        let mut driver = RoundDriver::new(config(), sender_end, SimulatedLoss::scripted([4]));

        let report = tokio::select! {
            report = driver.run_rounds(4) => report,
            _ = repeating_receiver(receiver_end, 10) => unreachable!(),
        };

        let round4 = report.round(4).unwrap();
        assert_eq!(round4.acks, vec![4, 4, 4, 4]);
        assert_eq!(round4.fast_retransmits, vec![4]);
        assert_eq!(round4.ssthresh_end, 2);
        assert_eq!(round4.cwnd_end, 2);
        assert_eq!(round4.abandoned, 0);
        assert!(round4.in_flight_end.is_empty());
        assert_eq!(driver.next_seq(), 11);
    }

    #[tokio::test]
    async fn shutdown_stops_open_ended_session() {
        let (sender_end, _receiver_end) = MemoryTransport::pair(sender_addr(), receiver_addr());
        let mut driver = RoundDriver::new(config(), sender_end, NoLoss);

        let report = driver.run_until(None, async {}).await;
        assert!(report.rounds.is_empty());
        assert_eq!(driver.rounds_completed(), 0);
    }
}
