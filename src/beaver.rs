//! Beaver oracle contract (§6, consumed) and a reference trusted-dealer
//! implementation.
//!
//! The real deployment's Beaver triple supply — generated without any
//! single party learning `a`, `b`, or `c` — is named an external
//! collaborator (§1); this crate only needs the oracle's interface:
//! `f(x, y, ...)` returns a fresh shared tensor realizing
//! `f(reveal(x), reveal(y))` at the doubled scale, via the standard
//! Beaver protocol: reveal `d = x - a`, `e = y - b`, and reconstruct
//! `f(x, y) = c + f(d, b) + f(a, e) + f(d, e)` (the last term added by
//! rank 0 only, since it's fully public).
//!
//! [`TrustedDealerBeaverSource`] plays the role of the donor crate's
//! `beaver_triples/trusted_party.rs`: a single dealer samples `a`, `b`,
//! computes `c`, and additively splits all three among the parties. It is
//! adapted here from scalars to ring-valued tensors of arbitrary shape,
//! and extended with `wraps` per the division-correction protocol (§4.1).

use std::collections::HashMap;
use std::sync::{Arc, Barrier, Mutex};

use crate::comm::Communicator;
use crate::error::Result;
use crate::tensor::RingTensor;

/// The multiplication-oracle primitives the arithmetic engine is
/// parameterized over. Every bilinear primitive is fallible: `x` and `y`
/// come straight from caller-supplied shared tensors, so a shape mismatch
/// (incompatible elementwise shapes for `mul`/`square`, incompatible inner
/// dimensions for `matmul`, a kernel that doesn't fit the input for the
/// `conv*` family) must surface as `Err(MpcError::ShapeMismatch)`, the same
/// as every other binary op in this crate, rather than panicking.
pub trait BeaverSource {
    fn mul(&mut self, x: &RingTensor, y: &RingTensor, comm: &dyn Communicator) -> Result<RingTensor>;
    fn matmul(&mut self, x: &RingTensor, y: &RingTensor, comm: &dyn Communicator) -> Result<RingTensor>;
    fn conv1d(
        &mut self,
        x: &RingTensor,
        y: &RingTensor,
        stride: usize,
        comm: &dyn Communicator,
    ) -> Result<RingTensor>;
    fn conv2d(
        &mut self,
        x: &RingTensor,
        y: &RingTensor,
        stride: (usize, usize),
        comm: &dyn Communicator,
    ) -> Result<RingTensor>;
    fn conv_transpose1d(
        &mut self,
        x: &RingTensor,
        y: &RingTensor,
        stride: usize,
        comm: &dyn Communicator,
    ) -> Result<RingTensor>;
    fn conv_transpose2d(
        &mut self,
        x: &RingTensor,
        y: &RingTensor,
        stride: (usize, usize),
        comm: &dyn Communicator,
    ) -> Result<RingTensor>;
    fn square(&mut self, x: &RingTensor, comm: &dyn Communicator) -> Result<RingTensor>;
    /// Returns a shared tensor whose reconstruction is the per-element
    /// count of modular wraparounds of `sum_i x_i` (§4.1 Truncation).
    fn wraps(&mut self, x: &RingTensor, comm: &dyn Communicator) -> RingTensor;
}

fn split_additive(value: &RingTensor, world_size: usize) -> Vec<RingTensor> {
    let shape = value.shape().to_vec();
    let mut shares = Vec::with_capacity(world_size);
    let mut running = RingTensor::zeros(shape.clone());
    for _ in 0..world_size - 1 {
        let data: Vec<i64> = (0..value.numel()).map(|_| rand::random()).collect();
        let share = RingTensor::from_flat(data, shape.clone());
        running.add_assign(&share).unwrap();
        shares.push(share);
    }
    shares.push(value.sub(&running).unwrap());
    shares
}

type Triple = (RingTensor, RingTensor, RingTensor);

struct TripleDealer {
    cache: Mutex<HashMap<u64, Vec<Triple>>>,
}

impl TripleDealer {
    fn new() -> Self {
        Self {
            cache: Mutex::new(HashMap::new()),
        }
    }

    /// `a`/`b` are freshly drawn at `shape_a`/`shape_b`, so `f(a, b)`
    /// fails exactly when the caller's own `f(x, y)` would have (same
    /// shapes, same operator) — propagating that error here, rather than
    /// caching a poisoned entry, means every rank independently observes
    /// the same `Err` instead of one rank panicking deep inside the dealer.
    fn get_or_generate(
        &self,
        serial: u64,
        world_size: usize,
        rank: usize,
        shape_a: Vec<usize>,
        shape_b: Vec<usize>,
        f: impl FnOnce(&RingTensor, &RingTensor) -> Result<RingTensor>,
    ) -> Result<Triple> {
        let mut cache = self.cache.lock().unwrap();
        if let Some(per_rank) = cache.get(&serial) {
            return Ok(per_rank[rank].clone());
        }

        let a_data: Vec<i64> = (0..shape_a.iter().product()).map(|_| rand::random()).collect();
        let b_data: Vec<i64> = (0..shape_b.iter().product()).map(|_| rand::random()).collect();
        let a = RingTensor::from_flat(a_data, shape_a.clone());
        let b = RingTensor::from_flat(b_data, shape_b.clone());
        let c = f(&a, &b)?;

        let a_shares = split_additive(&a, world_size);
        let b_shares = split_additive(&b, world_size);
        let c_shares = split_additive(&c, world_size);
        let per_rank: Vec<Triple> = (0..world_size)
            .map(|i| (a_shares[i].clone(), b_shares[i].clone(), c_shares[i].clone()))
            .collect();
        let mine = per_rank[rank].clone();
        cache.insert(serial, per_rank);
        Ok(mine)
    }
}

/// A reference [`BeaverSource`] backed by a single, trusted in-process
/// dealer. Not a deployment: the dealer sees `a`, `b`, and `c` in the
/// clear at generation time, which is exactly the semi-honest-but-not-
/// malicious simplification real Beaver suppliers (OLE, BFV, MASCOT, a
/// real trusted third party) exist to avoid. Good enough to drive this
/// crate's own tests.
pub struct TrustedDealerBeaverSource {
    rank: usize,
    world_size: usize,
    dealer: Arc<TripleDealer>,
    serial: u64,
    wraps_mailbox: Arc<Mutex<Vec<Vec<i128>>>>,
    wraps_barrier: Arc<Barrier>,
}

impl TrustedDealerBeaverSource {
    /// Builds one source per party, all drawing from the same dealer.
    pub fn ring(world_size: usize) -> Vec<Self> {
        let dealer = Arc::new(TripleDealer::new());
        let wraps_mailbox = Arc::new(Mutex::new(vec![Vec::new(); world_size]));
        let wraps_barrier = Arc::new(Barrier::new(world_size));
        (0..world_size)
            .map(|rank| Self {
                rank,
                world_size,
                dealer: dealer.clone(),
                serial: 0,
                wraps_mailbox: wraps_mailbox.clone(),
                wraps_barrier: wraps_barrier.clone(),
            })
            .collect()
    }

    fn next_serial(&mut self) -> u64 {
        let s = self.serial;
        self.serial += 1;
        s
    }

    fn triple(
        &mut self,
        shape_a: Vec<usize>,
        shape_b: Vec<usize>,
        f: impl FnOnce(&RingTensor, &RingTensor) -> Result<RingTensor>,
    ) -> Result<Triple> {
        let serial = self.next_serial();
        self.dealer
            .get_or_generate(serial, self.world_size, self.rank, shape_a, shape_b, f)
    }

    /// Generic Beaver reconstruction of a bilinear function `f`, given a
    /// locally-held triple share and the two revealed masks. `f` fails
    /// exactly when the caller's own shapes were incompatible for the
    /// requested op, since `d`/`e` carry `x`/`y`'s shapes throughout.
    fn reconstruct(
        &self,
        a: &RingTensor,
        b: &RingTensor,
        c: &RingTensor,
        d: &RingTensor,
        e: &RingTensor,
        rank: usize,
        f: impl Fn(&RingTensor, &RingTensor) -> Result<RingTensor>,
    ) -> Result<RingTensor> {
        let mut result = c.add(&f(d, b)?)?;
        result = result.add(&f(a, e)?)?;
        if rank == 0 {
            result = result.add(&f(d, e)?)?;
        }
        Ok(result)
    }
}

impl BeaverSource for TrustedDealerBeaverSource {
    fn mul(&mut self, x: &RingTensor, y: &RingTensor, comm: &dyn Communicator) -> Result<RingTensor> {
        let (a, b, c) = self.triple(x.shape().to_vec(), y.shape().to_vec(), |a, b| a.mul(b))?;
        let d = comm.all_reduce(&x.sub(&a).unwrap());
        let e = comm.all_reduce(&y.sub(&b).unwrap());
        self.reconstruct(&a, &b, &c, &d, &e, comm.rank(), |p, q| p.mul(q))
    }

    fn matmul(&mut self, x: &RingTensor, y: &RingTensor, comm: &dyn Communicator) -> Result<RingTensor> {
        let (a, b, c) = self.triple(x.shape().to_vec(), y.shape().to_vec(), |a, b| a.matmul(b))?;
        let d = comm.all_reduce(&x.sub(&a).unwrap());
        let e = comm.all_reduce(&y.sub(&b).unwrap());
        self.reconstruct(&a, &b, &c, &d, &e, comm.rank(), |p, q| p.matmul(q))
    }

    fn conv1d(
        &mut self,
        x: &RingTensor,
        y: &RingTensor,
        stride: usize,
        comm: &dyn Communicator,
    ) -> Result<RingTensor> {
        let (a, b, c) = self.triple(x.shape().to_vec(), y.shape().to_vec(), |a, b| a.conv1d(b, stride))?;
        let d = comm.all_reduce(&x.sub(&a).unwrap());
        let e = comm.all_reduce(&y.sub(&b).unwrap());
        self.reconstruct(&a, &b, &c, &d, &e, comm.rank(), |p, q| p.conv1d(q, stride))
    }

    fn conv2d(
        &mut self,
        x: &RingTensor,
        y: &RingTensor,
        stride: (usize, usize),
        comm: &dyn Communicator,
    ) -> Result<RingTensor> {
        let (a, b, c) = self.triple(x.shape().to_vec(), y.shape().to_vec(), |a, b| a.conv2d(b, stride))?;
        let d = comm.all_reduce(&x.sub(&a).unwrap());
        let e = comm.all_reduce(&y.sub(&b).unwrap());
        self.reconstruct(&a, &b, &c, &d, &e, comm.rank(), |p, q| p.conv2d(q, stride))
    }

    fn conv_transpose1d(
        &mut self,
        x: &RingTensor,
        y: &RingTensor,
        stride: usize,
        comm: &dyn Communicator,
    ) -> Result<RingTensor> {
        let (a, b, c) =
            self.triple(x.shape().to_vec(), y.shape().to_vec(), |a, b| a.conv_transpose1d(b, stride))?;
        let d = comm.all_reduce(&x.sub(&a).unwrap());
        let e = comm.all_reduce(&y.sub(&b).unwrap());
        self.reconstruct(&a, &b, &c, &d, &e, comm.rank(), |p, q| p.conv_transpose1d(q, stride))
    }

    fn conv_transpose2d(
        &mut self,
        x: &RingTensor,
        y: &RingTensor,
        stride: (usize, usize),
        comm: &dyn Communicator,
    ) -> Result<RingTensor> {
        let (a, b, c) =
            self.triple(x.shape().to_vec(), y.shape().to_vec(), |a, b| a.conv_transpose2d(b, stride))?;
        let d = comm.all_reduce(&x.sub(&a).unwrap());
        let e = comm.all_reduce(&y.sub(&b).unwrap());
        self.reconstruct(&a, &b, &c, &d, &e, comm.rank(), |p, q| p.conv_transpose2d(q, stride))
    }

    fn square(&mut self, x: &RingTensor, comm: &dyn Communicator) -> Result<RingTensor> {
        let (a, _, c) = self.triple(x.shape().to_vec(), x.shape().to_vec(), |a, _| a.mul(a))?;
        let d = comm.all_reduce(&x.sub(&a).unwrap());
        let mut result = c.add(&d.mul(&a).unwrap().mul_scalar(2))?;
        if comm.rank() == 0 {
            result = result.add(&d.mul(&d).unwrap())?;
        }
        Ok(result)
    }

    fn wraps(&mut self, x: &RingTensor, comm: &dyn Communicator) -> RingTensor {
        // Two-party truncation cannot overflow the way multi-party sums
        // can (§9 Open Questions): each share's magnitude stays below
        // half the ring, so no wraparound correction is needed.
        if comm.world_size() == 2 {
            return RingTensor::zeros(x.shape().to_vec());
        }

        let rank = comm.rank();
        let widened: Vec<i128> = x.data().iter().map(|&v| v as i128).collect();
        {
            let mut mb = self.wraps_mailbox.lock().unwrap();
            mb[rank] = widened;
        }
        self.wraps_barrier.wait();
        let theta: Vec<i64> = {
            let mb = self.wraps_mailbox.lock().unwrap();
            let n = mb[0].len();
            (0..n)
                .map(|i| {
                    let exact: i128 = mb.iter().map(|v| v[i]).sum();
                    let modulus = 1i128 << 64;
                    let wrapped = exact.rem_euclid(modulus);
                    let wrapped_signed = if wrapped >= (1i128 << 63) {
                        wrapped - modulus
                    } else {
                        wrapped
                    };
                    ((exact - wrapped_signed) >> 64) as i64
                })
                .collect()
        };
        self.wraps_barrier.wait();
        if rank == 0 {
            RingTensor::from_flat(theta, x.shape().to_vec())
        } else {
            RingTensor::zeros(x.shape().to_vec())
        }
    }
}
