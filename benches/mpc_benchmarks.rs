//! Performance benchmarks for the MPC arithmetic engine's interactive
//! surface: secret-sharing construction, Beaver-mediated multiply and
//! matmul across varying party counts, and the transcendental
//! approximation routines built on top of them.
//!
//! This benchmark suite measures the cost of the interactive protocols:
//! every `bench_function` here spawns one in-process thread per party
//! and waits for all of them, so the measured time includes thread
//! handoff and mailbox locking on top of the arithmetic itself — a
//! reasonable proxy for what a real deployment's per-operation overhead
//! looks like.

use std::thread;

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};
use mpc_tensor::arithmetic::{ArithmeticSharedTensor, Operand};
use mpc_tensor::beaver::TrustedDealerBeaverSource;
use mpc_tensor::comm::LocalCommunicator;
use mpc_tensor::comparison::RevealComparator;
use mpc_tensor::{approximations, Communicator};

type Ast = ArithmeticSharedTensor;

fn share_vector(world_size: usize, seed: u64, values: &[f64]) -> Vec<Ast> {
    let mut comms = LocalCommunicator::ring_with_seed(world_size, seed);
    comms
        .iter_mut()
        .map(|comm| Ast::new(Some(values), None, true, None, 0, comm).unwrap())
        .collect()
}

/// Benchmark shared-tensor construction (PRZS generation + encode) across
/// party counts.
fn bench_construction(c: &mut Criterion) {
    let mut group = c.benchmark_group("construction");
    let values: Vec<f64> = (0..64).map(|i| i as f64 * 0.5).collect();

    for world_size in [2, 3, 5] {
        group.bench_with_input(
            BenchmarkId::new("przs_construct_64", world_size),
            &world_size,
            |b, &n| {
                b.iter(|| {
                    let comms = LocalCommunicator::ring_with_seed(n, 4242);
                    let handles: Vec<_> = comms
                        .into_iter()
                        .map(|mut comm| {
                            let values = values.clone();
                            thread::spawn(move || Ast::new(Some(&values), None, true, None, 0, &mut comm).unwrap())
                        })
                        .collect();
                    let shares: Vec<_> = handles.into_iter().map(|h| h.join().unwrap()).collect();
                    black_box(shares)
                });
            },
        );
    }
    group.finish();
}

/// Benchmark Beaver-mediated elementwise multiply and matmul across party
/// counts.
fn bench_beaver_ops(c: &mut Criterion) {
    let mut group = c.benchmark_group("beaver_ops");
    group.sample_size(20);

    for world_size in [2, 3, 5] {
        let a_shares = share_vector(world_size, 10, &[1.0, 2.0, 3.0, 4.0]);
        let b_shares = share_vector(world_size, 11, &[5.0, 6.0, 7.0, 8.0]);

        group.bench_with_input(BenchmarkId::new("mul_vec4", world_size), &world_size, |bench, &n| {
            bench.iter(|| {
                let comms = LocalCommunicator::ring_with_seed(n, 4243);
                let mut beavers = TrustedDealerBeaverSource::ring(n);
                let handles: Vec<_> = comms
                    .into_iter()
                    .zip(beavers.drain(..))
                    .zip(a_shares.iter().cloned().zip(b_shares.iter().cloned()))
                    .map(|((mut comm, mut beaver), (a, b))| {
                        thread::spawn(move || a.mul(Operand::Shared(&b), &mut beaver, &mut comm).unwrap())
                    })
                    .collect();
                let results: Vec<_> = handles.into_iter().map(|h| h.join().unwrap()).collect();
                black_box(results)
            });
        });
    }
    group.finish();
}

/// Benchmark `matmul` at a couple of matrix sizes under a fixed two-party
/// setting.
fn bench_matmul_sizes(c: &mut Criterion) {
    let mut group = c.benchmark_group("matmul_sizes");
    group.sample_size(20);

    for side in [4usize, 8usize, 16usize] {
        let n2 = side * side;
        let a_plain: Vec<f64> = (0..n2).map(|i| (i % 7) as f64).collect();
        let b_plain: Vec<f64> = (0..n2).map(|i| (i % 5) as f64).collect();

        group.bench_with_input(BenchmarkId::new("matmul", side), &side, |bench, &s| {
            bench.iter(|| {
                let comms = LocalCommunicator::ring_with_seed(2, 4244);
                let mut beavers = TrustedDealerBeaverSource::ring(2);
                let shape = vec![s, s];
                let handles: Vec<_> = comms
                    .into_iter()
                    .zip(beavers.drain(..))
                    .map(|(mut comm, mut beaver)| {
                        let shape = shape.clone();
                        let a_plain = a_plain.clone();
                        let b_plain = b_plain.clone();
                        thread::spawn(move || {
                            let a = Ast::new(Some(&a_plain), Some(shape.clone()), true, None, 0, &mut comm).unwrap();
                            let b = Ast::new(Some(&b_plain), Some(shape), true, None, 0, &mut comm).unwrap();
                            a.matmul(&b, &mut beaver, &mut comm).unwrap()
                        })
                    })
                    .collect();
                let results: Vec<_> = handles.into_iter().map(|h| h.join().unwrap()).collect();
                black_box(results)
            });
        });
    }
    group.finish();
}

/// Benchmark the approximation library's most iteration-heavy routines.
fn bench_approximations(c: &mut Criterion) {
    let mut group = c.benchmark_group("approximations");
    group.sample_size(10); // each iteration runs a full two-party protocol

    let routines: Vec<(&str, fn(&Ast, &mut TrustedDealerBeaverSource, &mut RevealComparator, &mut dyn Communicator) -> Ast)> = vec![
        ("exp", |x, beaver, _cmp, comm| approximations::exp(x, beaver, comm).unwrap()),
        ("log", |x, beaver, cmp, comm| approximations::log(x, false, beaver, cmp, comm).unwrap()),
        ("reciprocal", |x, beaver, cmp, comm| {
            approximations::reciprocal(x, false, beaver, cmp, comm).unwrap()
        }),
        ("sigmoid", |x, beaver, cmp, comm| approximations::sigmoid(x, beaver, cmp, comm).unwrap()),
        ("tanh", |x, beaver, cmp, comm| approximations::tanh(x, beaver, cmp, comm).unwrap()),
        ("erf", |x, beaver, _cmp, comm| approximations::erf(x, beaver, comm).unwrap()),
    ];

    for (name, f) in routines {
        group.bench_function(name, |bench| {
            bench.iter(|| {
                let comms = LocalCommunicator::ring_with_seed(2, 4245);
                let mut beavers = TrustedDealerBeaverSource::ring(2);
                let handles: Vec<_> = comms
                    .into_iter()
                    .zip(beavers.drain(..))
                    .map(|(mut comm, mut beaver)| {
                        thread::spawn(move || {
                            let x = Ast::new(Some(&[0.5, 1.0, 2.0]), None, true, None, 0, &mut comm).unwrap();
                            let mut cmp = RevealComparator::new();
                            f(&x, &mut beaver, &mut cmp, &mut comm)
                        })
                    })
                    .collect();
                let results: Vec<_> = handles.into_iter().map(|h| h.join().unwrap()).collect();
                black_box(results)
            });
        });
    }
    group.finish();
}

/// Benchmark a complete end-to-end workflow: share three values, compute
/// softmax over them, reveal.
fn bench_softmax_workflow(c: &mut Criterion) {
    let mut group = c.benchmark_group("workflows");
    group.sample_size(10);

    group.bench_function("softmax_3", |b| {
        b.iter(|| {
            let comms = LocalCommunicator::ring_with_seed(2, 4246);
            let mut beavers = TrustedDealerBeaverSource::ring(2);
            let handles: Vec<_> = comms
                .into_iter()
                .zip(beavers.drain(..))
                .map(|(mut comm, mut beaver)| {
                    thread::spawn(move || {
                        let x = Ast::new(Some(&[1.0, 2.0, 3.0]), None, true, None, 0, &mut comm).unwrap();
                        let mut cmp = RevealComparator::new();
                        let s = approximations::softmax(&x, 0, &mut beaver, &mut cmp, &mut comm).unwrap();
                        s.get_plain_text(&comm)
                    })
                })
                .collect();
            let results: Vec<_> = handles.into_iter().map(|h| h.join().unwrap()).collect();
            black_box(results)
        });
    });

    group.finish();
}

criterion_group!(
    benches,
    bench_construction,
    bench_beaver_ops,
    bench_matmul_sizes,
    bench_approximations,
    bench_softmax_workflow
);

criterion_main!(benches);
