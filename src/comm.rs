//! Communicator contract and a reference, in-process implementation used
//! by this crate's own test suite.
//!
//! The real communicator — point-to-point channels between separate
//! party processes, collective reduce/broadcast, seed exchange at
//! startup — is an external collaborator: this crate only needs to know
//! its contract. [`LocalCommunicator`] realizes that contract with real
//! OS threads standing in for separate parties, which is enough to drive
//! every end-to-end scenario in this crate's own tests, but is not a
//! deployment-grade network layer.

use std::sync::{Arc, Barrier, Mutex};

use crate::ring::RingGenerator;
use crate::tensor::RingTensor;

/// What the arithmetic engine requires of the party-to-party transport.
pub trait Communicator {
    fn rank(&self) -> usize;
    fn world_size(&self) -> usize;

    /// This party's private stream, seeded independently of every other
    /// party.
    fn local_generator(&mut self) -> &mut RingGenerator;

    /// `which = 0`: the stream shared with the predecessor in the PRZS
    /// ring topology. `which = 1`: the stream shared with the successor.
    fn generator(&mut self, which: u8) -> &mut RingGenerator;

    /// Sums `tensor` across every party; every party gets the result.
    fn all_reduce(&self, tensor: &RingTensor) -> RingTensor;

    /// Sums `tensor` across every party; only `dst` gets `Some(result)`.
    fn reduce(&self, tensor: &RingTensor, dst: usize) -> Option<RingTensor>;

    /// Broadcasts a small piece of metadata (a shape) from `src` to every
    /// party.
    fn broadcast_shape(&self, shape: Option<Vec<usize>>, src: usize) -> Vec<usize>;
}

/// A reference [`Communicator`] built from real threads and shared
/// mailboxes, for use in this crate's own tests. Each instance stands in
/// for one party; `LocalCommunicator::ring` builds a full set, pairwise
/// pre-seeded as the PRZS ring topology requires.
pub struct LocalCommunicator {
    rank: usize,
    world_size: usize,
    local_gen: RingGenerator,
    gen_pred: RingGenerator,
    gen_succ: RingGenerator,
    tensor_mailbox: Arc<Mutex<Vec<RingTensor>>>,
    tensor_barrier: Arc<Barrier>,
    shape_mailbox: Arc<Mutex<Vec<Option<Vec<usize>>>>>,
    shape_barrier: Arc<Barrier>,
}

impl LocalCommunicator {
    /// Builds `world_size` communicators sharing a ring topology of PRZS
    /// seeds, seeded from OS entropy.
    pub fn ring(world_size: usize) -> Vec<Self> {
        let edge_seeds: Vec<[u8; 32]> = (0..world_size)
            .map(|_| {
                let mut seed = [0u8; 32];
                for b in seed.iter_mut() {
                    *b = rand::random();
                }
                seed
            })
            .collect();
        Self::ring_from_edge_seeds(world_size, edge_seeds)
    }

    /// Deterministic variant for reproducible tests: every edge seed is
    /// derived from `base_seed` and the edge index.
    pub fn ring_with_seed(world_size: usize, base_seed: u64) -> Vec<Self> {
        let edge_seeds: Vec<[u8; 32]> = (0..world_size)
            .map(|edge| {
                let mut seed = [0u8; 32];
                seed[..8].copy_from_slice(&base_seed.to_le_bytes());
                seed[8..16].copy_from_slice(&(edge as u64).to_le_bytes());
                seed
            })
            .collect();
        Self::ring_from_edge_seeds(world_size, edge_seeds)
    }

    fn ring_from_edge_seeds(world_size: usize, edge_seeds: Vec<[u8; 32]>) -> Vec<Self> {
        assert!(world_size >= 2, "need at least two parties");
        let tensor_mailbox = Arc::new(Mutex::new(vec![RingTensor::scalar(0); world_size]));
        let tensor_barrier = Arc::new(Barrier::new(world_size));
        let shape_mailbox = Arc::new(Mutex::new(vec![None; world_size]));
        let shape_barrier = Arc::new(Barrier::new(world_size));

        (0..world_size)
            .map(|rank| {
                // edge_seeds[i] seeds the stream shared between party i-1
                // and party i; party i's "predecessor" stream draws the
                // same sequence as party i-1's "successor" stream.
                let pred_edge = edge_seeds[rank];
                let succ_edge = edge_seeds[(rank + 1) % world_size];
                Self {
                    rank,
                    world_size,
                    local_gen: RingGenerator::from_entropy(),
                    gen_pred: RingGenerator::from_seed(pred_edge),
                    gen_succ: RingGenerator::from_seed(succ_edge),
                    tensor_mailbox: tensor_mailbox.clone(),
                    tensor_barrier: tensor_barrier.clone(),
                    shape_mailbox: shape_mailbox.clone(),
                    shape_barrier: shape_barrier.clone(),
                }
            })
            .collect()
    }
}

impl Communicator for LocalCommunicator {
    fn rank(&self) -> usize {
        self.rank
    }

    fn world_size(&self) -> usize {
        self.world_size
    }

    fn local_generator(&mut self) -> &mut RingGenerator {
        &mut self.local_gen
    }

    fn generator(&mut self, which: u8) -> &mut RingGenerator {
        match which {
            0 => &mut self.gen_pred,
            1 => &mut self.gen_succ,
            _ => panic!("generator index must be 0 or 1"),
        }
    }

    fn all_reduce(&self, tensor: &RingTensor) -> RingTensor {
        {
            let mut mb = self.tensor_mailbox.lock().unwrap();
            mb[self.rank] = tensor.clone();
        }
        self.tensor_barrier.wait();
        let sum = {
            let mb = self.tensor_mailbox.lock().unwrap();
            let mut sum = RingTensor::zeros(tensor.shape().to_vec());
            for t in mb.iter() {
                sum.add_assign(t).expect("all parties must share tensors of equal shape");
            }
            sum
        };
        self.tensor_barrier.wait();
        sum
    }

    fn reduce(&self, tensor: &RingTensor, dst: usize) -> Option<RingTensor> {
        let sum = self.all_reduce(tensor);
        if self.rank == dst {
            Some(sum)
        } else {
            None
        }
    }

    fn broadcast_shape(&self, shape: Option<Vec<usize>>, src: usize) -> Vec<usize> {
        if self.rank == src {
            let mut mb = self.shape_mailbox.lock().unwrap();
            mb[src] = shape.clone();
        }
        self.shape_barrier.wait();
        let result = {
            let mb = self.shape_mailbox.lock().unwrap();
            mb[src].clone().expect("src must provide a shape")
        };
        self.shape_barrier.wait();
        result
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::thread;

    #[test]
    fn all_reduce_sums_across_parties() {
        let comms = LocalCommunicator::ring_with_seed(3, 42);
        let handles: Vec<_> = comms
            .into_iter()
            .enumerate()
            .map(|(i, comm)| {
                thread::spawn(move || {
                    let share = RingTensor::scalar((i as i64) + 1);
                    comm.all_reduce(&share)
                })
            })
            .collect();
        for h in handles {
            let result = h.join().unwrap();
            assert_eq!(result.data(), &[6]);
        }
    }

    #[test]
    fn pairwise_seeds_line_up() {
        let mut comms = LocalCommunicator::ring_with_seed(3, 7);
        // party i's successor stream == party i+1's predecessor stream
        for i in 0..3 {
            let j = (i + 1) % 3;
            let a = crate::ring::uniform_ring(4, comms[i].generator(1));
            let b = crate::ring::uniform_ring(4, comms[j].generator(0));
            assert_eq!(a, b);
        }
    }
}
