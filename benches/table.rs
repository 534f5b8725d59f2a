//! Benchmarks for the session table.
//!
//! Run with: cargo bench --bench table

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};
use halo::{CaSession, Identity, Session, SessionTable};

fn make_session(local: &Identity) -> ([u8; 16], Session) {
    let peer = Identity::generate();
    let ip6 = *peer.address().as_bytes();
    let ca = CaSession::new(local, *peer.public_key_bytes(), ip6).unwrap();
    (ip6, Session::new(ca, 0, 0, 0))
}

/// Pre-populate a table with `n` sessions.
fn populated_table(local: &Identity, n: u32) -> (SessionTable, Vec<[u8; 16]>) {
    let mut table = SessionTable::new(4000);
    let mut addrs = Vec::new();
    for _ in 0..n {
        let (ip6, session) = make_session(local);
        table.insert(ip6, session).unwrap();
        addrs.push(ip6);
    }
    (table, addrs)
}

fn bench_lookup_handle(c: &mut Criterion) {
    let local = Identity::generate();
    let mut group = c.benchmark_group("table_lookup_handle");

    for n in [16u32, 256, 4096] {
        let (table, _) = populated_table(&local, n);
        let handle = 4000 + n / 2;
        group.bench_with_input(BenchmarkId::from_parameter(n), &n, |b, _| {
            b.iter(|| table.lookup_handle(black_box(handle)))
        });
    }
    group.finish();
}

fn bench_lookup_ip6(c: &mut Criterion) {
    let local = Identity::generate();
    let mut group = c.benchmark_group("table_lookup_ip6");

    for n in [16u32, 256, 4096] {
        let (table, addrs) = populated_table(&local, n);
        let target = addrs[addrs.len() / 2];
        group.bench_with_input(BenchmarkId::from_parameter(n), &n, |b, _| {
            b.iter(|| table.lookup_ip6(black_box(&target)))
        });
    }
    group.finish();
}

fn bench_insert_remove(c: &mut Criterion) {
    let local = Identity::generate();
    let (mut table, _) = populated_table(&local, 256);
    let (ip6, _) = make_session(&local);

    c.bench_function("table_insert_remove", |b| {
        b.iter_batched(
            || make_session(&local).1,
            |session| {
                table.insert(ip6, session).unwrap();
                table.remove_ip6(&ip6).unwrap();
            },
            criterion::BatchSize::SmallInput,
        )
    });
}

criterion_group!(benches, bench_lookup_handle, bench_lookup_ip6, bench_insert_remove);
criterion_main!(benches);
