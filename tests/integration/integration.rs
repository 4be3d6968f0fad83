use std::net::{IpAddr, Ipv4Addr};
use std::sync::Arc;
use std::time::Duration;

use tokio::io::AsyncWriteExt;
use tokio::net::{TcpListener, TcpStream};
use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};
use tokio::sync::{mpsc, Mutex};

use bgpfsmd::bgp::{
    self, framing, Afi, BGPMessageBody, BGPOpenMessage, Capabilities, Safi,
};
use bgpfsmd::config::{GlobalConfig, NeighborConfig};
use bgpfsmd::fsm::{self, FSMMessage, FSMState, NeighborCounters};

struct Harness {
    peer_reader: OwnedReadHalf,
    peer_writer: OwnedWriteHalf,
    incoming: mpsc::Receiver<FSMMessage>,
    controller: fsm::FsmController,
    // Kept alive so the FSM's `outgoing` receiver never sees a closed
    // channel on its own, the same way `peer::PeerManager` holds onto its
    // sender (nothing in these tests currently sends on it).
    #[allow(dead_code)]
    outgoing: mpsc::Sender<BGPMessageBody>,
}

async fn spawn_harness(global: GlobalConfig, neighbor: NeighborConfig) -> Harness {
    let listener = TcpListener::bind((Ipv4Addr::LOCALHOST, 0)).await.unwrap();
    let addr = listener.local_addr().unwrap();

    let connect_task = tokio::spawn(async move { TcpStream::connect(addr).await.unwrap() });
    let (fsm_socket, _) = listener.accept().await.unwrap();
    let peer_socket = connect_task.await.unwrap();
    let (peer_reader, peer_writer) = peer_socket.into_split();

    let (connection_in_tx, connection_in_rx) = mpsc::channel(1);
    let (incoming_tx, incoming_rx) = mpsc::channel(16);
    let (outgoing_tx, outgoing_rx) = mpsc::channel(16);

    let (fsm, controller) = fsm::new(
        Arc::new(global),
        Arc::new(neighbor),
        Arc::new(Mutex::new(NeighborCounters::default())),
        connection_in_rx,
        incoming_tx,
        outgoing_rx,
    );

    tokio::spawn(fsm.run());
    connection_in_tx.send(fsm_socket).await.unwrap();

    Harness {
        peer_reader,
        peer_writer,
        incoming: incoming_rx,
        controller,
        outgoing: outgoing_tx,
    }
}

async fn expect_state(incoming: &mut mpsc::Receiver<FSMMessage>, expected: FSMState) {
    match tokio::time::timeout(Duration::from_secs(5), incoming.recv())
        .await
        .expect("timed out waiting for state change")
        .expect("incoming channel closed")
    {
        FSMMessage::StateChange(state) => assert_eq!(state, expected),
        other => panic!("expected StateChange({:?}), got {:?}", expected, other),
    }
}

async fn expect_open(incoming: &mut mpsc::Receiver<FSMMessage>) -> BGPOpenMessage {
    match tokio::time::timeout(Duration::from_secs(5), incoming.recv())
        .await
        .expect("timed out waiting for OPEN")
        .expect("incoming channel closed")
    {
        FSMMessage::BgpMessage(BGPMessageBody::Open(open)) => open,
        other => panic!("expected BgpMessage(Open), got {:?}", other),
    }
}

fn peer_open(asn: u16, afi: Afi) -> BGPOpenMessage {
    let opt_params = bgp::advertised_optional_parameters(asn as u32, afi);
    BGPOpenMessage::new(asn, 0x0a000002, 90, opt_params).unwrap()
}

fn base_global() -> GlobalConfig {
    GlobalConfig {
        asn: 65001,
        rid: "10.0.0.1".parse().unwrap(),
        listen_address: None,
        listen_port: None,
        hold_time: None,
        keepalive_interval: None,
    }
}

fn base_neighbor(address: IpAddr) -> NeighborConfig {
    NeighborConfig {
        address,
        hold_time: Some(90),
        keepalive_interval: Some(30),
    }
}

#[tokio::test]
async fn e1_happy_path_reaches_established() {
    let mut h = spawn_harness(
        base_global(),
        base_neighbor(IpAddr::V4(Ipv4Addr::new(192, 0, 2, 2))),
    )
    .await;

    expect_state(&mut h.incoming, FSMState::Active).await;
    expect_state(&mut h.incoming, FSMState::OpenSent).await;

    let local_open = match framing::read_message(&mut h.peer_reader).await.unwrap() {
        BGPMessageBody::Open(open) => open,
        other => panic!("expected OPEN, got {:?}", other.message_type()),
    };
    assert_eq!(local_open.asn, 65001);
    assert_eq!(local_open.hold_time, 90);
    assert_eq!(local_open.router_id, 0x0a000001);
    let caps: bgp::BGPCapabilities = local_open.opt_params.into();
    let parsed: Capabilities = caps.into();
    assert!(parsed.route_refresh);
    assert_eq!(parsed.four_octet_asn, Some(65001));
    assert_eq!(parsed.multiprotocol.unwrap()[0].afi, Afi::Ipv4);

    framing::write_message(
        &mut h.peer_writer,
        BGPMessageBody::Open(peer_open(65002, Afi::Ipv4)),
    )
    .await
    .unwrap();

    let peer_open_received = expect_open(&mut h.incoming).await;
    assert_eq!(peer_open_received.asn, 65002);

    match framing::read_message(&mut h.peer_reader).await.unwrap() {
        BGPMessageBody::Keepalive(_) => {}
        other => panic!("expected KEEPALIVE, got {:?}", other.message_type()),
    }

    expect_state(&mut h.incoming, FSMState::OpenConfirm).await;

    framing::write_message(
        &mut h.peer_writer,
        BGPMessageBody::Keepalive(bgp::BGPKeepaliveMessage::default()),
    )
    .await
    .unwrap();

    expect_state(&mut h.incoming, FSMState::Established).await;

    h.controller.kill();
}

#[tokio::test]
async fn e2_four_byte_asn_uses_as_trans() {
    let mut global = base_global();
    global.asn = 200_000;
    let mut h = spawn_harness(
        global,
        base_neighbor(IpAddr::V4(Ipv4Addr::new(192, 0, 2, 2))),
    )
    .await;

    expect_state(&mut h.incoming, FSMState::Active).await;
    expect_state(&mut h.incoming, FSMState::OpenSent).await;

    let open = match framing::read_message(&mut h.peer_reader).await.unwrap() {
        BGPMessageBody::Open(open) => open,
        other => panic!("expected OPEN, got {:?}", other.message_type()),
    };
    assert_eq!(open.asn, bgp::AS_TRANS);
    let caps: bgp::BGPCapabilities = open.opt_params.into();
    let parsed: Capabilities = caps.into();
    assert_eq!(parsed.four_octet_asn, Some(200_000));

    h.controller.kill();
}

#[tokio::test]
async fn e3_ipv6_neighbor_advertises_ipv6_afi() {
    let neighbor_addr: IpAddr = "2001:db8::2".parse().unwrap();
    let mut h = spawn_harness(base_global(), base_neighbor(neighbor_addr)).await;

    expect_state(&mut h.incoming, FSMState::Active).await;
    expect_state(&mut h.incoming, FSMState::OpenSent).await;

    let open = match framing::read_message(&mut h.peer_reader).await.unwrap() {
        BGPMessageBody::Open(open) => open,
        other => panic!("expected OPEN, got {:?}", other.message_type()),
    };
    let caps: bgp::BGPCapabilities = open.opt_params.into();
    let parsed: Capabilities = caps.into();
    assert_eq!(parsed.multiprotocol.unwrap()[0].afi, Afi::Ipv6);
    assert_eq!(Safi::NLRIUnicast as u8, 1);

    h.controller.kill();
}

#[tokio::test]
async fn e4_unexpected_message_in_open_sent_returns_to_idle() {
    let mut h = spawn_harness(
        base_global(),
        base_neighbor(IpAddr::V4(Ipv4Addr::new(192, 0, 2, 2))),
    )
    .await;

    expect_state(&mut h.incoming, FSMState::Active).await;
    expect_state(&mut h.incoming, FSMState::OpenSent).await;

    // Drain the local OPEN the FSM sent on entering OpenSent.
    framing::read_message(&mut h.peer_reader).await.unwrap();

    framing::write_message(
        &mut h.peer_writer,
        BGPMessageBody::Keepalive(bgp::BGPKeepaliveMessage::default()),
    )
    .await
    .unwrap();

    expect_state(&mut h.incoming, FSMState::Idle).await;

    h.controller.kill();
}

#[tokio::test]
async fn e6_cancellation_in_open_confirm_emits_no_further_state_change() {
    let mut h = spawn_harness(
        base_global(),
        base_neighbor(IpAddr::V4(Ipv4Addr::new(192, 0, 2, 2))),
    )
    .await;

    expect_state(&mut h.incoming, FSMState::Active).await;
    expect_state(&mut h.incoming, FSMState::OpenSent).await;
    framing::read_message(&mut h.peer_reader).await.unwrap();

    framing::write_message(
        &mut h.peer_writer,
        BGPMessageBody::Open(peer_open(65002, Afi::Ipv4)),
    )
    .await
    .unwrap();
    expect_open(&mut h.incoming).await;
    framing::read_message(&mut h.peer_reader).await.unwrap(); // local KEEPALIVE
    expect_state(&mut h.incoming, FSMState::OpenConfirm).await;

    h.controller.kill();

    // The handler observes cancellation on its next select and exits
    // without emitting a StateChange; the incoming channel then closes.
    assert!(tokio::time::timeout(Duration::from_secs(5), h.incoming.recv())
        .await
        .expect("timed out waiting for channel close")
        .is_none());
}

#[tokio::test]
async fn e5_established_write_error_returns_to_idle() {
    let mut neighbor = base_neighbor(IpAddr::V4(Ipv4Addr::new(192, 0, 2, 2)));
    neighbor.keepalive_interval = Some(1);
    let mut h = spawn_harness(base_global(), neighbor).await;

    expect_state(&mut h.incoming, FSMState::Active).await;
    expect_state(&mut h.incoming, FSMState::OpenSent).await;
    framing::read_message(&mut h.peer_reader).await.unwrap();

    framing::write_message(
        &mut h.peer_writer,
        BGPMessageBody::Open(peer_open(65002, Afi::Ipv4)),
    )
    .await
    .unwrap();
    expect_open(&mut h.incoming).await;
    framing::read_message(&mut h.peer_reader).await.unwrap(); // local KEEPALIVE
    expect_state(&mut h.incoming, FSMState::OpenConfirm).await;

    framing::write_message(
        &mut h.peer_writer,
        BGPMessageBody::Keepalive(bgp::BGPKeepaliveMessage::default()),
    )
    .await
    .unwrap();
    expect_state(&mut h.incoming, FSMState::Established).await;

    // Sever the peer side; the next keepalive write on the FSM's side
    // should eventually fail and drive the FSM back to Idle.
    drop(h.peer_reader);
    drop(h.peer_writer);

    tokio::time::timeout(Duration::from_secs(10), async {
        loop {
            match h.incoming.recv().await.expect("incoming channel closed") {
                FSMMessage::StateChange(FSMState::Idle) => break,
                FSMMessage::StateChange(_) => continue,
                FSMMessage::BgpMessage(_) => continue,
            }
        }
    })
    .await
    .expect("timed out waiting for Established write error to surface");

    h.controller.kill();
}

#[tokio::test]
async fn e7_established_partial_receive_error_cancels_send_loop_too() {
    // The peer side of the connection is left fully open: only the
    // receive loop sees an error (a malformed header), so the send loop
    // has nothing of its own pushing it to exit. The top frame must kill
    // it explicitly, or this test times out waiting for Idle.
    let mut h = spawn_harness(
        base_global(),
        base_neighbor(IpAddr::V4(Ipv4Addr::new(192, 0, 2, 2))),
    )
    .await;

    expect_state(&mut h.incoming, FSMState::Active).await;
    expect_state(&mut h.incoming, FSMState::OpenSent).await;
    framing::read_message(&mut h.peer_reader).await.unwrap();

    framing::write_message(
        &mut h.peer_writer,
        BGPMessageBody::Open(peer_open(65002, Afi::Ipv4)),
    )
    .await
    .unwrap();
    expect_open(&mut h.incoming).await;
    framing::read_message(&mut h.peer_reader).await.unwrap(); // local KEEPALIVE
    expect_state(&mut h.incoming, FSMState::OpenConfirm).await;

    framing::write_message(
        &mut h.peer_writer,
        BGPMessageBody::Keepalive(bgp::BGPKeepaliveMessage::default()),
    )
    .await
    .unwrap();
    expect_state(&mut h.incoming, FSMState::Established).await;

    // Write a bogus header (invalid marker) without closing either half
    // of the peer socket, so only the FSM's receive loop errors.
    h.peer_writer.write_all(&[0u8; 19]).await.unwrap();

    tokio::time::timeout(Duration::from_secs(3), async {
        loop {
            match h.incoming.recv().await.expect("incoming channel closed") {
                FSMMessage::StateChange(FSMState::Idle) => break,
                FSMMessage::StateChange(_) => continue,
                FSMMessage::BgpMessage(_) => continue,
            }
        }
    })
    .await
    .expect("timed out: send loop was not cancelled alongside the erroring receive loop");

    h.controller.kill();
}
