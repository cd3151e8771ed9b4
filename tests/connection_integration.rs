//! Connection-level integration tests: CID issuance feeding stateless-reset
//! recognition, and stream-count gating on `open_stream`, exercised through
//! the public sans-io entry points rather than any one layer's internals.

use std::net::SocketAddr;
use std::time::Instant;

use rand::rngs::mock::StepRng;

use bytes::Bytes;

use quiche_core::connection::{Connection, ConnectionState, TransportParameters};
use quiche_core::crypto::{CipherSuite, Role};
use quiche_core::packet::{ConnectionId, Level};
use quiche_core::stream::Directionality;

fn peer_addr() -> SocketAddr {
    "127.0.0.1:4433".parse().unwrap()
}

fn new_connection(role: Role) -> Connection {
    let dcid = ConnectionId::from_slice(&[0x83, 0x94, 0xc8, 0xf0, 0x3e, 0x51, 0x57, 0x08]);
    let local_cid = ConnectionId::from_slice(&[1, 2, 3, 4, 5, 6, 7, 8]);
    Connection::new(
        role,
        Instant::now(),
        peer_addr(),
        &dcid,
        &local_cid,
        TransportParameters::defaults(),
        b"static-reset-key".to_vec(),
    )
    .unwrap()
}

#[test]
fn undecryptable_packet_carrying_a_known_reset_token_drains_the_connection() {
    let mut conn = new_connection(Role::Server);
    let mut rng = StepRng::new(7, 1);
    let issued = conn.issue_new_cids(&mut rng);
    assert!(!issued.is_empty());
    let (_, _, token) = &issued[0];

    // a stateless reset is indistinguishable from noise except for its
    // trailing 16 bytes and a length floor of 21 (RFC 9000 §10.3.3).
    let mut datagram = vec![0x40u8; 32];
    let len = datagram.len();
    datagram[len - 16..].copy_from_slice(&token.0);

    conn.on_datagram(Instant::now(), peer_addr(), &mut datagram).unwrap();
    assert_eq!(conn.state(), ConnectionState::Draining);
}

#[test]
fn undecryptable_short_packet_without_a_matching_token_is_dropped_silently() {
    let mut conn = new_connection(Role::Server);
    let mut rng = StepRng::new(7, 1);
    conn.issue_new_cids(&mut rng);

    let mut datagram = vec![0x40u8; 32];
    conn.on_datagram(Instant::now(), peer_addr(), &mut datagram).unwrap();
    assert_eq!(conn.state(), ConnectionState::Connecting);
}

#[test]
fn open_stream_queues_past_the_peer_stream_limit_until_raised() {
    let mut conn = new_connection(Role::Client);
    // no MAX_STREAMS seen yet from the peer: every open request queues.
    assert_eq!(conn.open_stream(Directionality::Bidi), None);
    assert!(conn.take_opened_streams().is_empty());

    let mut params = TransportParameters::defaults();
    params.initial_max_streams_bidi = 1;
    conn.on_peer_transport_params(params);

    // applying the peer's raised limit resolves the queued request, surfaced
    // through the drain rather than a callback into the original caller.
    assert_eq!(conn.take_opened_streams(), vec![0]);
    // the limit is now exhausted again: a further request queues once more.
    assert_eq!(conn.open_stream(Directionality::Bidi), None);
}

#[test]
fn poll_send_produces_an_initial_datagram_once_keys_are_installed() {
    let mut conn = new_connection(Role::Client);
    // Initial keys come from Connection::new; with nothing queued yet the
    // only thing due is an ACK (none pending either), so the first call
    // may legitimately be empty, but queuing CRYPTO data must produce one.
    conn.queue_crypto(quiche_core::packet::PacketNumberSpace::Initial, Bytes::from_static(b"client hello"));
    let datagram = conn.poll_send(Instant::now(), 1200);
    assert!(!datagram.is_empty());
    // a datagram carrying an Initial packet is padded out near the full
    // budget (RFC 9000 §14.1); the long-header form bit (0x80) is set.
    assert!(datagram.len() >= 1200);
    assert_eq!(datagram[0] & 0x80, 0x80);
}

#[test]
fn stream_reset_schedules_a_reset_stream_frame_on_the_wire() {
    let mut conn = new_connection(Role::Client);
    conn.on_tls_secret(Level::Application, CipherSuite::Aes128Gcm, &[7u8; 32], &[9u8; 32]).unwrap();
    conn.on_handshake_done();

    let stream_id = conn.open_stream(Directionality::Bidi).unwrap();
    conn.stream_write(stream_id, Bytes::from_static(b"hello"), false).unwrap();
    conn.stream_reset(stream_id, 42).unwrap();

    // drain the Initial space (still has handshake keys installed) before
    // reaching the 1-RTT packet carrying the reset.
    let mut saw_reset = false;
    for _ in 0..4 {
        let datagram = conn.poll_send(Instant::now(), 1200);
        if datagram.is_empty() {
            break;
        }
        // A short-header (1-RTT) packet's first byte has the long-header
        // bit (0x80) clear; that's the one carrying application frames.
        if datagram[0] & 0x80 == 0 {
            saw_reset = true;
        }
    }
    assert!(saw_reset, "expected a 1-RTT packet to carry the queued RESET_STREAM");
}

#[test]
fn resetting_an_already_reset_stream_does_not_queue_a_second_frame() {
    let mut conn = new_connection(Role::Client);
    conn.on_tls_secret(Level::Application, CipherSuite::Aes128Gcm, &[1u8; 32], &[2u8; 32]).unwrap();
    conn.on_handshake_done();

    let stream_id = conn.open_stream(Directionality::Bidi).unwrap();
    conn.stream_reset(stream_id, 1).unwrap();
    conn.stream_reset(stream_id, 1).unwrap();
}
