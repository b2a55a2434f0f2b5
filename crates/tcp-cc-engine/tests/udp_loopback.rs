//! Sender and receiver talking over real UDP sockets on the loopback interface.

use std::net::SocketAddr;
use tcp_cc_abstract::{DatagramTransport, SenderConfig, TransportError};
use tcp_cc_engine::{AckServer, NoLoss, RoundDriver, SimulatedLoss, UdpTransport};

fn loopback() -> SocketAddr {
    "127.0.0.1:0".parse().unwrap()
}

async fn endpoints() -> (UdpTransport, UdpTransport) {
    let sender = UdpTransport::bind(loopback()).await.expect("bind sender");
    let receiver = UdpTransport::bind(loopback()).await.expect("bind receiver");
    (sender, receiver)
}

fn config_for(sender: &UdpTransport, receiver: &UdpTransport) -> SenderConfig {
    SenderConfig {
        peer_addr: receiver.local_addr(),
        bind_addr: sender.local_addr(),
        loss_probability: 0.0,
        round_timeout_ms: 2000,
        drain_timeout_ms: 2000,
        ..Default::default()
    }
}

#[tokio::test]
async fn clean_session_over_udp() {
    let (sender, receiver) = endpoints().await;
    let config = config_for(&sender, &receiver);
    let mut driver = RoundDriver::new(config, sender, NoLoss);
    let mut server = AckServer::new(receiver);

    let report = tokio::select! {
        report = driver.run_rounds(5) => report,
        _ = server.serve() => panic!("receiver stopped early"),
    };

    assert_eq!(report.cwnd_trace(), vec![1, 2, 4, 8, 9, 10]);
    assert_eq!(server.engine().last_ack(), 1 + 2 + 4 + 8 + 9);
    assert_eq!(server.stats().acks_sent, 24);
    driver.into_transport().close();
    server.into_transport().close();
}

#[tokio::test]
async fn fast_retransmit_over_udp() {
    let (sender, receiver) = endpoints().await;
    let config = config_for(&sender, &receiver);
    let mut driver = RoundDriver::new(config, sender, SimulatedLoss::scripted([4]));
    let mut server = AckServer::new(receiver);

    let report = tokio::select! {
        report = driver.run_rounds(4) => report,
        _ = server.serve() => panic!("receiver stopped early"),
    };

    assert_eq!(report.fast_retransmits().collect::<Vec<_>>(), vec![4]);
    assert_eq!(driver.ssthresh(), 2);
    assert_eq!(server.engine().last_ack(), 11);
    assert!(!server.engine().in_recovery());
}

#[tokio::test]
async fn binding_a_taken_address_fails_with_the_address() {
    let first = UdpTransport::bind(loopback()).await.unwrap();
    let taken = first.local_addr();

    match UdpTransport::bind(taken).await {
        Err(TransportError::Bind { addr, .. }) => assert_eq!(addr, taken),
        other => panic!("expected bind failure, got {other:?}"),
    }
}
