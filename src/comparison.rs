//! Comparator contract (§6, consumed) and a reference implementation.
//!
//! Secure sign/comparison in a real deployment goes through a bit
//! decomposition (A2B) and a binary circuit, which this crate's Non-goals
//! explicitly place out of scope. [`RevealComparator`] is the textbook
//! insecure stand-in: reveal, compare in the clear, re-share the
//! (public) result. It exists only so `sign`, `max`, and anything built
//! on them have something to run against in this crate's own tests.

use crate::beaver::BeaverSource;
use crate::comm::Communicator;
use crate::tensor::RingTensor;

/// What the arithmetic engine requires of the comparison primitive.
pub trait Comparator {
    /// `+1` where the reconstructed value is `>= 0`, `-1` otherwise.
    fn sign(&mut self, x: &RingTensor, comm: &dyn Communicator) -> RingTensor;

    /// `1` where the reconstructed value is `< 0`, `0` otherwise.
    fn ltz(&mut self, x: &RingTensor, comm: &dyn Communicator) -> RingTensor;

    /// Elementwise max of two shared tensors of equal shape.
    fn max(
        &mut self,
        x: &RingTensor,
        y: &RingTensor,
        beaver: &mut dyn BeaverSource,
        comm: &dyn Communicator,
    ) -> RingTensor;
}

/// Reveal-then-compare reference [`Comparator`]. The result is shared
/// back as a public value (rank 0 holds the full value, everyone else
/// holds 0) — correct additive sharing, but every comparison leaks both
/// operands to every party. Never use this where confidentiality of the
/// compared values matters.
pub struct RevealComparator;

impl RevealComparator {
    pub fn new() -> Self {
        Self
    }

    fn share_public(value: &RingTensor, rank: usize) -> RingTensor {
        if rank == 0 {
            value.clone()
        } else {
            RingTensor::zeros(value.shape().to_vec())
        }
    }
}

impl Default for RevealComparator {
    fn default() -> Self {
        Self::new()
    }
}

impl Comparator for RevealComparator {
    fn sign(&mut self, x: &RingTensor, comm: &dyn Communicator) -> RingTensor {
        let revealed = comm.all_reduce(x);
        let signs: Vec<i64> = revealed.data().iter().map(|&v| if v >= 0 { 1 } else { -1 }).collect();
        Self::share_public(&RingTensor::from_flat(signs, revealed.shape().to_vec()), comm.rank())
    }

    fn ltz(&mut self, x: &RingTensor, comm: &dyn Communicator) -> RingTensor {
        let revealed = comm.all_reduce(x);
        let flags: Vec<i64> = revealed.data().iter().map(|&v| if v < 0 { 1 } else { 0 }).collect();
        Self::share_public(&RingTensor::from_flat(flags, revealed.shape().to_vec()), comm.rank())
    }

    fn max(
        &mut self,
        x: &RingTensor,
        y: &RingTensor,
        _beaver: &mut dyn BeaverSource,
        comm: &dyn Communicator,
    ) -> RingTensor {
        let rx = comm.all_reduce(x);
        let ry = comm.all_reduce(y);
        let maxed: Vec<i64> = rx
            .data()
            .iter()
            .zip(ry.data().iter())
            .map(|(&a, &b)| a.max(b))
            .collect();
        Self::share_public(&RingTensor::from_flat(maxed, rx.shape().to_vec()), comm.rank())
    }
}
