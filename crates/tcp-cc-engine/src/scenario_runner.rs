use crate::ack_server::AckServer;
use crate::loss::SimulatedLoss;
use crate::round_driver::RoundDriver;
use crate::trace::SessionReport;
use crate::transport::MemoryTransport;
use anyhow::{Context, anyhow};
use std::fs;
use std::net::SocketAddr;
use tcp_cc_abstract::{SenderConfig, TestAction, TestAssertion, TestScenario};
use tracing::info;

/// Rounds run when a scenario does not say.
const DEFAULT_SCENARIO_ROUNDS: u32 = 10;

pub async fn run_scenario_file(scenario_path: &str) -> anyhow::Result<SessionReport> {
    let content = fs::read_to_string(scenario_path).context("Failed to read scenario file")?;
    let scenario = TestScenario::from_toml(&content).context("Failed to parse scenario")?;
    run_scenario(&scenario).await
}

/// Run both sides of the flow in-process over a memory link and check the
/// scenario's assertions against the session trace.
pub async fn run_scenario(scenario: &TestScenario) -> anyhow::Result<SessionReport> {
    info!("Running Scenario: {}", scenario.name);
    info!("Description: {}", scenario.description);

    let sender_addr: SocketAddr = "127.0.0.1:40000".parse()?;
    let mut config = SenderConfig {
        bind_addr: sender_addr,
        loss_probability: 0.0,
        seed: Some(0),
        ..Default::default()
    };
    scenario.config.apply_to(&mut config);
    config.validate().context("Invalid scenario config")?;
    let rounds = config.rounds.unwrap_or(DEFAULT_SCENARIO_ROUNDS);

    let mut loss = SimulatedLoss::new(config.loss_probability, config.seed);
    for action in &scenario.actions {
        match action {
            TestAction::DropSenderSeq { seq } => loss.add_drop_seq_once(*seq),
        }
    }

    let (sender_end, receiver_end) = MemoryTransport::pair(sender_addr, config.peer_addr);
    let mut driver = RoundDriver::new(config, sender_end, loss);
    let mut server = AckServer::new(receiver_end);

    let report = tokio::select! {
        report = driver.run_rounds(rounds) => report,
        _ = server.serve() => return Err(anyhow!("receiver stopped before the sender finished")),
    };

    check_assertions(&scenario.assertions, &report)?;
    info!("Test Scenario Passed!");
    Ok(report)
}

pub fn check_assertions(assertions: &[TestAssertion], report: &SessionReport) -> anyhow::Result<()> {
    for assertion in assertions {
        match assertion {
            TestAssertion::CwndAfterRound { round, cwnd } => {
                let actual = report
                    .round(*round)
                    .with_context(|| format!("Assertion Failed: round {} never ran", round))?
                    .cwnd_end;
                if actual != *cwnd {
                    return Err(anyhow!(
                        "Assertion Failed: cwnd after round {} is {}, expected {}",
                        round,
                        actual,
                        cwnd
                    ));
                }
            }
            TestAssertion::SsthreshAfterRound { round, ssthresh } => {
                let actual = report
                    .round(*round)
                    .with_context(|| format!("Assertion Failed: round {} never ran", round))?
                    .ssthresh_end;
                if actual != *ssthresh {
                    return Err(anyhow!(
                        "Assertion Failed: ssthresh after round {} is {}, expected {}",
                        round,
                        actual,
                        ssthresh
                    ));
                }
            }
            TestAssertion::CwndMax { min, max } => {
                let max_cwnd = report.cwnd_trace().into_iter().max().unwrap_or(0);
                if max_cwnd < *min {
                    return Err(anyhow!(
                        "Assertion Failed: cwnd max {} < expected min {}",
                        max_cwnd,
                        min
                    ));
                }
                if let Some(m) = max
                    && max_cwnd > *m
                {
                    return Err(anyhow!(
                        "Assertion Failed: cwnd max {} > expected max {}",
                        max_cwnd,
                        m
                    ));
                }
            }
            TestAssertion::CwndDrop {
                from_at_least,
                to_at_most,
            } => {
                let mut seen_high = false;
                let mut seen_drop = false;
                for w in report.cwnd_trace() {
                    if !seen_high && w >= *from_at_least {
                        seen_high = true;
                    } else if seen_high && w <= *to_at_most {
                        seen_drop = true;
                        break;
                    }
                }
                if !seen_high || !seen_drop {
                    return Err(anyhow!(
                        "Assertion Failed: cwnd did not drop from >= {} down to <= {}",
                        from_at_least,
                        to_at_most
                    ));
                }
            }
            TestAssertion::FastRetransmit { seq } => {
                if !report.fast_retransmits().any(|s| s == *seq) {
                    return Err(anyhow!(
                        "Assertion Failed: seq {} was never fast-retransmitted",
                        seq
                    ));
                }
            }
            TestAssertion::PacketsSent { min, max } => {
                let sent = report.packets_sent();
                if sent < *min as usize {
                    return Err(anyhow!(
                        "Assertion Failed: Sender sent {} packets, expected min {}",
                        sent,
                        min
                    ));
                }
                if let Some(max) = max
                    && sent > *max as usize
                {
                    return Err(anyhow!(
                        "Assertion Failed: Sender sent {} packets, expected max {}",
                        sent,
                        max
                    ));
                }
            }
        }
    }
    Ok(())
}
