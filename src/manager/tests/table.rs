//! Session table invariants.

use super::*;
use crate::manager::table::{MAX_FIRST_HANDLE, MIN_FIRST_HANDLE};

fn session_for(local: &Identity, peer: &Identity) -> Session {
    let ca = CaSession::new(local, *peer.public_key_bytes(), *peer.address().as_bytes()).unwrap();
    Session::new(ca, 0, 0, 0)
}

#[test]
fn test_insert_and_dual_lookup() {
    let local = Identity::generate();
    let peer = Identity::generate();
    let mut table = SessionTable::new(4000);

    let ip6 = *peer.address().as_bytes();
    let (index, handle) = table.insert(ip6, session_for(&local, &peer)).unwrap();
    assert_eq!(index, 0);
    assert_eq!(handle, 4000);

    // Both indices resolve to the same session.
    let by_ip6 = table.lookup_ip6(&ip6).unwrap();
    assert_eq!(by_ip6.receive_handle(), handle);
    let by_handle = table.lookup_handle(handle).unwrap();
    assert_eq!(by_handle.ip6(), &ip6);
}

#[test]
fn test_handles_are_offset_plus_slot_and_monotonic() {
    let local = Identity::generate();
    let mut table = SessionTable::new(77);
    for i in 0..4u32 {
        let peer = Identity::generate();
        let (_, handle) = table.insert(*peer.address().as_bytes(), session_for(&local, &peer)).unwrap();
        assert_eq!(handle, 77 + i);
    }
}

#[test]
fn test_duplicate_ip6_rejected() {
    let local = Identity::generate();
    let peer = Identity::generate();
    let mut table = SessionTable::new(500);
    let ip6 = *peer.address().as_bytes();
    table.insert(ip6, session_for(&local, &peer)).unwrap();
    assert!(matches!(
        table.insert(ip6, session_for(&local, &peer)),
        Err(TableError::AlreadyPresent(_))
    ));
    assert_eq!(table.len(), 1);
}

#[test]
fn test_handles_stable_across_removal() {
    let local = Identity::generate();
    let mut table = SessionTable::new(1000);
    let peers: Vec<Identity> = (0..3).map(|_| Identity::generate()).collect();
    let mut handles = Vec::new();
    for peer in &peers {
        let (_, handle) = table.insert(*peer.address().as_bytes(), session_for(&local, peer)).unwrap();
        handles.push(handle);
    }

    // Remove the middle session; the others keep their handles.
    assert!(table.remove_ip6(peers[1].address().as_bytes()).is_some());
    assert!(table.lookup_handle(handles[1]).is_none());
    assert_eq!(table.lookup_handle(handles[0]).unwrap().ip6(), peers[0].address().as_bytes());
    assert_eq!(table.lookup_handle(handles[2]).unwrap().ip6(), peers[2].address().as_bytes());

    // A new session reuses the freed slot, and its handle with it.
    let newcomer = Identity::generate();
    let (_, handle) = table.insert(*newcomer.address().as_bytes(), session_for(&local, &newcomer)).unwrap();
    assert_eq!(handle, handles[1]);
    assert_eq!(table.len(), 3);
}

#[test]
fn test_lookup_handle_rejects_out_of_range() {
    let local = Identity::generate();
    let peer = Identity::generate();
    let mut table = SessionTable::new(9000);
    table.insert(*peer.address().as_bytes(), session_for(&local, &peer)).unwrap();

    assert!(table.lookup_handle(8999).is_none());
    assert!(table.lookup_handle(9001).is_none());
    // Below the offset entirely (would underflow the subtraction).
    assert!(table.lookup_handle(3).is_none());
}

#[test]
fn test_handles_snapshot() {
    let local = Identity::generate();
    let mut table = SessionTable::new(42);
    let peers: Vec<Identity> = (0..3).map(|_| Identity::generate()).collect();
    for peer in &peers {
        table.insert(*peer.address().as_bytes(), session_for(&local, peer)).unwrap();
    }
    table.remove_ip6(peers[0].address().as_bytes());

    let mut handles = table.handles();
    handles.sort_unstable();
    assert_eq!(handles, vec![43, 44]);
}

#[test]
fn test_drain_empties_table() {
    let local = Identity::generate();
    let mut table = SessionTable::new(10);
    for _ in 0..2 {
        let peer = Identity::generate();
        table.insert(*peer.address().as_bytes(), session_for(&local, &peer)).unwrap();
    }
    let drained = table.drain();
    assert_eq!(drained.len(), 2);
    assert!(table.is_empty());
}

#[test]
#[should_panic(expected = "first handle out of range")]
fn test_first_handle_below_minimum_rejected() {
    SessionTable::new(MIN_FIRST_HANDLE - 1);
}

#[test]
fn test_manager_first_handle_in_range() {
    // The offset is random; a handful of managers all land in range.
    for _ in 0..8 {
        let harness = test_manager();
        let first = harness.manager.first_handle();
        assert!((MIN_FIRST_HANDLE..MAX_FIRST_HANDLE).contains(&first));
    }
}
