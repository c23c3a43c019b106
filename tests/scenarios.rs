//! End-to-end scenarios (encode/decode, PRZS, linear algebra, division,
//! transcendental functions, softmax) run across the crate's public API
//! the way a downstream user would, rather than through any single
//! module's internals.

use std::thread;

use mpc_tensor::arithmetic::ArithmeticSharedTensor;
use mpc_tensor::beaver::TrustedDealerBeaverSource;
use mpc_tensor::comm::LocalCommunicator;
use mpc_tensor::comparison::RevealComparator;
use mpc_tensor::encoder::FixedPointEncoder;
use mpc_tensor::{approximations, Communicator};

type Ast = ArithmeticSharedTensor;

/// Installs a `tracing` subscriber so `RUST_LOG=debug cargo test -- --nocapture`
/// surfaces the crate's `tracing::debug!`/`trace!` calls; harmless to call
/// more than once since a later `try_init` after the first just errors and
/// is ignored.
fn init_tracing() {
    let _ = tracing_subscriber::fmt().with_test_writer().try_init();
}

fn assert_close(got: &[f64], want: &[f64], tol: f64) {
    assert_eq!(got.len(), want.len());
    for (g, w) in got.iter().zip(want.iter()) {
        assert!((g - w).abs() <= tol, "{g} vs {w} (tol {tol})");
    }
}

#[test]
fn encode_decode_round_trip() {
    init_tracing();
    let encoder = FixedPointEncoder::default();
    let plain = vec![1.5, -2.25, 0.0, 1000.125];
    let ring = encoder.encode(&plain).unwrap();
    let back = encoder.decode(&ring);
    assert_close(&back, &plain, 1e-3);
}

#[test]
fn przs_sums_to_zero_on_a_4x4_shape() {
    init_tracing();
    let comms = LocalCommunicator::ring_with_seed(3, 1001);
    let handles: Vec<_> = comms
        .into_iter()
        .map(|mut comm| {
            thread::spawn(move || {
                let t = Ast::przs(vec![4, 4], None, &mut comm);
                comm.all_reduce(t.share())
            })
        })
        .collect();
    for h in handles {
        let revealed = h.join().unwrap();
        assert_eq!(revealed.data(), &[0i64; 16]);
    }
}

#[test]
fn linear_algebra_scenario_a_matmul_b_plus_a() {
    init_tracing();
    let comms = LocalCommunicator::ring_with_seed(3, 1002);
    let mut beavers = TrustedDealerBeaverSource::ring(3);
    let handles: Vec<_> = comms
        .into_iter()
        .zip(beavers.drain(..))
        .map(|(mut comm, mut beaver)| {
            thread::spawn(move || {
                let a =
                    Ast::new(Some(&[1.0, 2.0, 3.0, 4.0]), Some(vec![2, 2]), true, None, 0, &mut comm).unwrap();
                let b =
                    Ast::new(Some(&[5.0, 6.0, 7.0, 8.0]), Some(vec![2, 2]), true, None, 0, &mut comm).unwrap();
                let prod = a.matmul(&b, &mut beaver, &mut comm).unwrap();
                let result = prod.add(&a).unwrap();
                result.get_plain_text(&comm)
            })
        })
        .collect();
    for h in handles {
        assert_close(&h.join().unwrap(), &[20.0, 24.0, 46.0, 54.0], 1e-2);
    }
}

#[test]
fn division_by_public_int_matches_float_division() {
    init_tracing();
    let comms = LocalCommunicator::ring_with_seed(3, 1003);
    let mut beavers = TrustedDealerBeaverSource::ring(3);
    let handles: Vec<_> = comms
        .into_iter()
        .zip(beavers.drain(..))
        .map(|(mut comm, mut beaver)| {
            thread::spawn(move || {
                let a = Ast::new(Some(&[12345.0]), None, true, None, 0, &mut comm).unwrap();
                let divided = a.div_public_int(7, &mut beaver, &mut comm).unwrap();
                divided.get_plain_text(&comm)
            })
        })
        .collect();
    for h in handles {
        assert_close(&h.join().unwrap(), &[12345.0 / 7.0], 1.0);
    }
}

#[test]
fn transcendental_functions_on_a_small_batch() {
    init_tracing();
    let comms = LocalCommunicator::ring_with_seed(2, 1004);
    let mut beavers = TrustedDealerBeaverSource::ring(2);
    let handles: Vec<_> = comms
        .into_iter()
        .zip(beavers.drain(..))
        .map(|(mut comm, mut beaver)| {
            thread::spawn(move || {
                let x = Ast::new(Some(&[0.5, 1.0, 2.0]), None, true, None, 0, &mut comm).unwrap();
                let mut comparator = RevealComparator::new();
                let e = approximations::exp(&x, &mut beaver, &mut comm).unwrap();
                let r = approximations::reciprocal(&x, false, &mut beaver, &mut comparator, &mut comm).unwrap();
                let s = approximations::sigmoid(&x, &mut beaver, &mut comparator, &mut comm).unwrap();
                (e.get_plain_text(&comm), r.get_plain_text(&comm), s.get_plain_text(&comm))
            })
        })
        .collect();
    for h in handles {
        let (e, r, s) = h.join().unwrap();
        assert_close(&e, &[0.5f64.exp(), 1.0f64.exp(), 2.0f64.exp()], 0.05);
        assert_close(&r, &[2.0, 1.0, 0.5], 0.05);
        let sigmoid = |v: f64| 1.0 / (1.0 + (-v).exp());
        assert_close(&s, &[sigmoid(0.5), sigmoid(1.0), sigmoid(2.0)], 0.02);
    }
}

#[test]
fn softmax_on_one_two_three() {
    init_tracing();
    let comms = LocalCommunicator::ring_with_seed(2, 1005);
    let mut beavers = TrustedDealerBeaverSource::ring(2);
    let handles: Vec<_> = comms
        .into_iter()
        .zip(beavers.drain(..))
        .map(|(mut comm, mut beaver)| {
            thread::spawn(move || {
                let x = Ast::new(Some(&[1.0, 2.0, 3.0]), None, true, None, 0, &mut comm).unwrap();
                let mut comparator = RevealComparator::new();
                approximations::softmax(&x, 0, &mut beaver, &mut comparator, &mut comm)
                    .unwrap()
                    .get_plain_text(&comm)
            })
        })
        .collect();
    for h in handles {
        assert_close(&h.join().unwrap(), &[0.0900, 0.2447, 0.6652], 0.01);
    }
}
