//! Inside ingress pipeline tests.

use super::*;
use crate::config::SessionConfig;

/// First-contact outbound: no key, no path. The packet parks, a search
/// goes out, and the NODE answer drains it as an encrypted handshake
/// with the discovered label.
#[test]
fn test_first_contact_outbound() {
    let mut harness = test_manager();
    let mut remote = RemotePeer::new(harness.manager.identity());

    let packet = inside_packet(remote.ip6(), [0u8; 32], 0, 0, b"who is this");
    harness.manager.handle_inside_packet(packet);

    assert_eq!(harness.manager.buffered_count(), 1);
    assert_eq!(harness.manager.session_count(), 0);
    assert!(harness.next_switch().is_none());

    let events = harness.drain_events();
    assert_eq!(events.len(), 1);
    match &events[0] {
        CoreMsg::SearchReq { dest_pf, ip6 } => {
            assert_eq!(*dest_pf, PATHFINDER_BROADCAST);
            assert_eq!(*ip6, remote.ip6());
        }
        other => panic!("expected SEARCH_REQ, got {other:?}"),
    }

    // The pathfinder answers.
    harness
        .manager
        .handle_event(&node_event(remote.ip6(), 0x13, remote.public_key(), 18));

    assert_eq!(harness.manager.buffered_count(), 0);
    assert_eq!(harness.manager.session_count(), 1);
    let session = harness.manager.session_for_ip6(&remote.ip6()).unwrap();
    assert_eq!(session.version(), 18);
    assert_eq!(session.send_switch_label(), 0x13);

    let events = harness.drain_events();
    assert_eq!(events.len(), 1);
    assert!(matches!(events[0], CoreMsg::Session { .. }));

    // The drained packet went out as a handshake under the new label,
    // decryptable by the peer, with our handle prefixed.
    let out = harness.next_switch().expect("drained packet on the switch");
    let (label, payload) = remote.open_switch_packet(out);
    assert_eq!(label, 0x13);
    assert_eq!(payload, b"who is this");
    assert_eq!(remote.send_handle, Some(harness.manager.first_handle()));
}

#[test]
fn test_known_key_creates_session_immediately() {
    let mut harness = test_manager();
    let mut remote = RemotePeer::new(harness.manager.identity());

    let packet = inside_packet(remote.ip6(), remote.public_key(), 7, 0x55, b"direct");
    harness.manager.handle_inside_packet(packet);

    assert_eq!(harness.manager.session_count(), 1);
    assert_eq!(harness.manager.buffered_count(), 0);
    let session = harness.manager.session_for_ip6(&remote.ip6()).unwrap();
    assert_eq!(session.version(), 7);
    assert_eq!(session.send_switch_label(), 0x55);

    let events = harness.drain_events();
    assert_eq!(events.len(), 1);
    assert!(matches!(events[0], CoreMsg::Session { .. }));

    let out = harness.next_switch().expect("hello on the switch");
    let (label, payload) = remote.open_switch_packet(out);
    assert_eq!(label, 0x55);
    assert_eq!(payload, b"direct");
}

#[test]
fn test_session_label_fills_blank_header() {
    let mut harness = test_manager();
    let mut remote = RemotePeer::new(harness.manager.identity());

    // First packet pins the label on the session.
    harness.manager.handle_inside_packet(inside_packet(
        remote.ip6(),
        remote.public_key(),
        0,
        0x55,
        b"a",
    ));
    remote.open_switch_packet(harness.next_switch().unwrap());

    // Second packet carries no label; the session's is used.
    harness.manager.handle_inside_packet(inside_packet(
        remote.ip6(),
        [0u8; 32],
        0,
        0,
        b"b",
    ));
    let (label, payload) = remote.open_switch_packet(harness.next_switch().unwrap());
    assert_eq!(label, 0x55);
    assert_eq!(payload, b"b");
}

#[test]
fn test_header_label_overrides_session_label() {
    let mut harness = test_manager();
    let mut remote = RemotePeer::new(harness.manager.identity());

    harness.manager.handle_inside_packet(inside_packet(
        remote.ip6(),
        remote.public_key(),
        0,
        0x55,
        b"a",
    ));
    remote.open_switch_packet(harness.next_switch().unwrap());

    harness.manager.handle_inside_packet(inside_packet(
        remote.ip6(),
        [0u8; 32],
        0,
        0x77,
        b"b",
    ));
    let (label, _) = remote.open_switch_packet(harness.next_switch().unwrap());
    assert_eq!(label, 0x77);
    // The explicit label does not overwrite the session's.
    assert_eq!(
        harness.manager.session_for_ip6(&remote.ip6()).unwrap().send_switch_label(),
        0x55
    );
}

#[test]
fn test_version_updates_from_header() {
    let mut harness = test_manager();
    let remote = RemotePeer::new(harness.manager.identity());

    harness.manager.handle_inside_packet(inside_packet(
        remote.ip6(),
        remote.public_key(),
        0,
        0x5,
        b"a",
    ));
    assert_eq!(harness.manager.session_for_ip6(&remote.ip6()).unwrap().version(), 0);

    harness.manager.handle_inside_packet(inside_packet(
        remote.ip6(),
        [0u8; 32],
        21,
        0,
        b"b",
    ));
    assert_eq!(harness.manager.session_for_ip6(&remote.ip6()).unwrap().version(), 21);
}

/// Duplicate pending destination: the newer packet replaces the older,
/// and each attempt emits its own SEARCH_REQ.
#[test]
fn test_second_lookup_replaces_first() {
    let mut harness = test_manager();
    let mut remote = RemotePeer::new(harness.manager.identity());

    harness.manager.handle_inside_packet(inside_packet(remote.ip6(), [0u8; 32], 0, 0, b"old"));
    harness.manager.handle_inside_packet(inside_packet(remote.ip6(), [0u8; 32], 0, 0, b"new"));

    assert_eq!(harness.manager.buffered_count(), 1);
    let searches = harness
        .drain_events()
        .into_iter()
        .filter(|m| matches!(m, CoreMsg::SearchReq { .. }))
        .count();
    assert_eq!(searches, 2);

    // The drained packet is the newer one.
    harness
        .manager
        .handle_event(&node_event(remote.ip6(), 0x9, remote.public_key(), 0));
    let (_, payload) = remote.open_switch_packet(harness.next_switch().unwrap());
    assert_eq!(payload, b"new");
}

/// Buffer ceiling: with room for two, the third distinct destination is
/// swept against the TTL (nothing expires) and dropped.
#[test]
fn test_buffer_overflow() {
    let config = SessionConfig { max_buffered_messages: 2, ..Default::default() };
    let mut harness = test_manager_with(config);

    let peers: Vec<RemotePeer> =
        (0..3).map(|_| RemotePeer::new(harness.manager.identity())).collect();

    for peer in &peers {
        harness
            .manager
            .handle_inside_packet(inside_packet(peer.ip6(), [0u8; 32], 0, 0, b"x"));
    }

    assert_eq!(harness.manager.buffered_count(), 2);
    let searches: Vec<[u8; 16]> = harness
        .drain_events()
        .into_iter()
        .filter_map(|m| match m {
            CoreMsg::SearchReq { ip6, .. } => Some(ip6),
            _ => None,
        })
        .collect();
    // Only the two buffered destinations searched.
    assert_eq!(searches, vec![peers[0].ip6(), peers[1].ip6()]);
}

#[test]
#[should_panic(expected = "inside packet shorter than a route header")]
fn test_short_inside_packet_is_fatal() {
    let mut harness = test_manager();
    harness.manager.handle_inside_packet(Packet::from_payload(&[0u8; 20]));
}
