// Ledger graph benchmarks for Spore.
//
// Covers frontier attachment (the work done under the ledger write lock),
// the ordering pass over wide and narrow graphs, and the signature check
// that precedes every admission.

use criterion::{criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};

use spore_protocol::crypto::keys::SporeKeypair;
use spore_protocol::ledger::{Ledger, LedgerGraph};
use spore_protocol::transaction::{
    sign_transaction, verify_signature, TransactionBuilder, TxId,
};

fn id(n: u64) -> TxId {
    let mut bytes = [0u8; 32];
    bytes[..8].copy_from_slice(&n.to_be_bytes());
    bytes[31] = 0x01;
    TxId(bytes)
}

/// A graph where every node has `width` parents drawn from the previous
/// layer, giving many ready nodes per ordering round.
fn layered_graph(nodes: u64, width: u64, k: usize) -> LedgerGraph {
    let mut graph = LedgerGraph::new(k);
    let mut prev: Vec<TxId> = Vec::new();
    let mut layer: Vec<TxId> = Vec::new();
    for n in 0..nodes {
        let node = id(n);
        graph.add(node, prev.iter().copied().collect());
        layer.push(node);
        if layer.len() as u64 == width {
            prev = std::mem::take(&mut layer);
        }
    }
    graph
}

fn bench_attach(c: &mut Criterion) {
    let mut group = c.benchmark_group("ledger/attach");
    for size in [100u64, 1_000, 10_000] {
        group.throughput(Throughput::Elements(size));
        group.bench_with_input(BenchmarkId::from_parameter(size), &size, |b, &size| {
            b.iter(|| {
                let ledger = Ledger::new(16);
                for n in 0..size {
                    let _ = ledger.attach(id(n));
                }
                ledger
            });
        });
    }
    group.finish();
}

fn bench_order(c: &mut Criterion) {
    let mut group = c.benchmark_group("ledger/order");
    for (width, k) in [(1u64, 1usize), (16, 1), (16, 1621), (128, 1621)] {
        let graph = layered_graph(5_000, width, k);
        group.bench_with_input(
            BenchmarkId::new(format!("width{width}"), k),
            &graph,
            |b, graph| b.iter(|| graph.order().expect("acyclic")),
        );
    }
    group.finish();
}

fn bench_verify(c: &mut Criterion) {
    let kp = SporeKeypair::generate();
    let mut tx = TransactionBuilder::new()
        .from(kp.address())
        .to(vec![0xAA; 20])
        .data(vec![0u8; 256])
        .gas(21_000)
        .build();
    sign_transaction(&mut tx, &kp).expect("sign");

    c.bench_function("transaction/verify_signature", |b| {
        b.iter(|| verify_signature(&tx).expect("valid"))
    });
    c.bench_function("transaction/compute_id", |b| {
        b.iter(|| tx.compute_id().expect("encodable"))
    });
}

criterion_group!(benches, bench_attach, bench_order, bench_verify);
criterion_main!(benches);
