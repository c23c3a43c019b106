//! The arithmetic secret-sharing engine (§4.1): `ArithmeticSharedTensor`,
//! PRZS/PRSS construction, reveal, the local/interactive operation
//! surface, and the public-integer truncation protocol with
//! wraparound correction.
//!
//! `ArithmeticSharedTensor` is a concrete struct over [`RingTensor`]
//! shares with an explicit "share + reconstruct" API, the same overall
//! shape a CrypTen-style MPC tensor takes once its dynamically-typed
//! autograd plumbing is stripped away.

use crate::beaver::BeaverSource;
use crate::comm::Communicator;
use crate::comparison::Comparator;
use crate::encoder::FixedPointEncoder;
use crate::error::{MpcError, Result};
use crate::ring::RING_BITS;
use crate::tensor::RingTensor;
use serde::{Deserialize, Serialize};

/// Execution device placeholder. Only `Cpu` is implemented (no GPU
/// support, per the Non-goals); kept so the constructor signature has
/// the same shape as the system this is built from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum Device {
    #[default]
    Cpu,
}

/// The right-hand operand of a multiply/divide, dispatched on which of
/// four kinds `y` can be: a public integer, a public plaintext tensor
/// already at scale 1, a public real-valued tensor needing encoding, or
/// another shared tensor.
pub enum Operand<'a> {
    PublicInt(i64),
    PublicIntTensor(&'a RingTensor),
    PublicReal(&'a [f64]),
    Shared(&'a ArithmeticSharedTensor),
    /// A *shared* operand that is already at scale 1 (a sign or 0/1
    /// indicator tensor from a [`Comparator`](crate::comparison::Comparator)).
    /// The product lands at `self`'s scale directly, so unlike
    /// [`Operand::Shared`] this skips the rescale-by-truncation step.
    SharedScale1(&'a ArithmeticSharedTensor),
}

/// One party's share of a secret, fixed-point-encoded tensor (§3,
/// "Shared tensor").
#[derive(Debug, Clone)]
pub struct ArithmeticSharedTensor {
    share: RingTensor,
    encoder: FixedPointEncoder,
    device: Device,
}

impl ArithmeticSharedTensor {
    /// Construction contract (§4.1): exactly one party (`src`) supplies
    /// the plaintext; everyone else supplies `size` directly or waits
    /// for `src`'s shape broadcast.
    pub fn new(
        plain: Option<&[f64]>,
        size: Option<Vec<usize>>,
        broadcast_size: bool,
        precision: Option<u32>,
        src: usize,
        comm: &mut dyn Communicator,
    ) -> Result<Self> {
        let world_size = comm.world_size();
        if src >= world_size {
            return Err(MpcError::InvalidSource { src, world_size });
        }
        let rank = comm.rank();

        let shape = if broadcast_size {
            let local_shape: Option<Vec<usize>> = if rank == src {
                match (plain, &size) {
                    (_, Some(s)) => Some(s.clone()),
                    (Some(p), None) => Some(vec![p.len()]),
                    (None, None) => return Err(MpcError::MissingSourceData { src }),
                }
            } else {
                None
            };
            comm.broadcast_shape(local_shape, src)
        } else {
            size.clone().ok_or(MpcError::BroadcastRequired)?
        };

        let encoder = FixedPointEncoder::new(precision);
        let mut share = Self::przs_share(shape.clone(), comm);

        if rank == src {
            let plain = plain.ok_or(MpcError::MissingSourceData { src })?;
            let encoded = encoder.encode_tensor(plain, shape)?;
            share.add_assign(&encoded)?;
        }

        tracing::debug!(rank, src, world_size, "constructed shared tensor");
        Ok(Self {
            share,
            encoder,
            device: Device::Cpu,
        })
    }

    fn przs_share(shape: Vec<usize>, comm: &mut dyn Communicator) -> RingTensor {
        let count: usize = shape.iter().product();
        let r_pred = crate::ring::uniform_ring(count, comm.generator(0));
        let r_succ = crate::ring::uniform_ring(count, comm.generator(1));
        let data: Vec<i64> = r_pred
            .iter()
            .zip(r_succ.iter())
            .map(|(&a, &b)| a.wrapping_sub(b))
            .collect();
        RingTensor::from_flat(data, shape)
    }

    /// A fresh share of zero, telescoping to zero across the whole ring
    /// (§4.1 PRZS).
    pub fn przs(shape: Vec<usize>, precision: Option<u32>, comm: &mut dyn Communicator) -> Self {
        Self {
            share: Self::przs_share(shape, comm),
            encoder: FixedPointEncoder::new(precision),
            device: Device::Cpu,
        }
    }

    /// A share of an unknown, never-reconstructed joint value, drawn
    /// from this party's private stream (§4.1 PRSS).
    pub fn prss(shape: Vec<usize>, precision: Option<u32>, comm: &mut dyn Communicator) -> Self {
        let count: usize = shape.iter().product();
        let data = crate::ring::uniform_ring(count, comm.local_generator());
        Self {
            share: RingTensor::from_flat(data, shape),
            encoder: FixedPointEncoder::new(precision),
            device: Device::Cpu,
        }
    }

    /// Debug/testing constructor: takes `share` as-is, no communication.
    pub fn from_shares(share: RingTensor, precision: Option<u32>) -> Self {
        Self {
            share,
            encoder: FixedPointEncoder::new(precision),
            device: Device::Cpu,
        }
    }

    pub fn share(&self) -> &RingTensor {
        &self.share
    }

    pub fn encoder(&self) -> FixedPointEncoder {
        self.encoder
    }

    pub fn scale(&self) -> u64 {
        self.encoder.scale()
    }

    pub fn device(&self) -> Device {
        self.device
    }

    /// Cheap structural copy. Rust has no aliased-tensor storage to
    /// exploit here, so this clones the backing data; callers only rely
    /// on the value-equality contract.
    pub fn shallow_copy(&self) -> Self {
        self.clone()
    }

    pub fn copy_(&mut self, other: &Self) {
        self.share = other.share.clone();
        self.encoder = other.encoder;
        self.device = other.device;
    }

    fn check_scale(&self, other: &Self) -> Result<()> {
        if self.encoder.scale() != other.encoder.scale() {
            return Err(MpcError::ScaleMismatch {
                lhs: self.encoder.scale(),
                rhs: other.encoder.scale(),
            });
        }
        Ok(())
    }

    // ---- revealing -----------------------------------------------------

    pub fn reveal(&self, comm: &dyn Communicator) -> RingTensor {
        tracing::trace!(rank = comm.rank(), "reveal");
        comm.all_reduce(&self.share)
    }

    pub fn reveal_to(&self, dst: usize, comm: &dyn Communicator) -> Option<RingTensor> {
        comm.reduce(&self.share, dst)
    }

    pub fn get_plain_text(&self, comm: &dyn Communicator) -> Vec<f64> {
        self.encoder.decode(&self.reveal(comm))
    }

    // ---- local ops -------------------------------------------------------

    pub fn add(&self, other: &Self) -> Result<Self> {
        self.check_scale(other)?;
        Ok(Self {
            share: self.share.add(&other.share)?,
            encoder: self.encoder,
            device: self.device,
        })
    }

    pub fn sub(&self, other: &Self) -> Result<Self> {
        self.check_scale(other)?;
        Ok(Self {
            share: self.share.sub(&other.share)?,
            encoder: self.encoder,
            device: self.device,
        })
    }

    pub fn neg(&self) -> Self {
        Self {
            share: self.share.neg(),
            encoder: self.encoder,
            device: self.device,
        }
    }

    /// Only rank 0 adds the (encoded) public value to its share; every
    /// other party leaves its share untouched, since adding on every
    /// rank would inflate the reconstructed sum by a factor of `n`
    /// (§4.1, public-op locality).
    pub fn add_public(&self, plain: &[f64], comm: &dyn Communicator) -> Result<Self> {
        let encoded = self.encoder.encode_tensor(plain, self.share.shape().to_vec())?;
        if comm.rank() == 0 {
            Ok(Self {
                share: self.share.add(&encoded)?,
                encoder: self.encoder,
                device: self.device,
            })
        } else {
            Ok(self.shallow_copy())
        }
    }

    pub fn sub_public(&self, plain: &[f64], comm: &dyn Communicator) -> Result<Self> {
        let negated: Vec<f64> = plain.iter().map(|&v| -v).collect();
        self.add_public(&negated, comm)
    }

    /// A public constant broadcast to this tensor's shape and added
    /// in-place-equivalent fashion (rank 0 only, §4.1 public-op locality).
    /// The approximation library's iterative formulas are full of these
    /// ("`1 + x`", "`y - 3`", ...), so this is the common case of
    /// [`add_public`](Self::add_public) worth naming directly.
    pub fn add_public_scalar(&self, value: f64, comm: &dyn Communicator) -> Result<Self> {
        let plain = vec![value; self.share.numel()];
        self.add_public(&plain, comm)
    }

    pub fn sub_public_scalar(&self, value: f64, comm: &dyn Communicator) -> Result<Self> {
        self.add_public_scalar(-value, comm)
    }

    /// A public real-valued constant broadcast to this tensor's shape and
    /// multiplied in (interactive rescale via [`Operand::PublicReal`]).
    pub fn mul_public_scalar(
        &self,
        value: f64,
        beaver: &mut dyn BeaverSource,
        comm: &mut dyn Communicator,
    ) -> Result<Self> {
        let plain = vec![value; self.share.numel()];
        self.mul(Operand::PublicReal(&plain), beaver, comm)
    }

    /// Builds a shared tensor whose reconstructed plaintext is the
    /// constant `value` broadcast to `shape`: every party's share starts
    /// at zero and only rank 0 adds the encoded constant, so this is a
    /// public value agreed by construction rather than a reveal.
    pub fn from_public(
        value: f64,
        shape: Vec<usize>,
        precision: Option<u32>,
        comm: &dyn Communicator,
    ) -> Result<Self> {
        let encoder = FixedPointEncoder::new(precision);
        let zero = Self {
            share: RingTensor::zeros(shape),
            encoder,
            device: Device::Cpu,
        };
        zero.add_public_scalar(value, comm)
    }

    /// Promotes this tensor to a coarser fixed-point scale via a local
    /// integer multiply — e.g. lifting a scale-1 comparison bit
    /// ([`Comparator::sign`](crate::comparison::Comparator::sign)/`ltz`)
    /// up to the ambient scale before an additive combination, which
    /// requires matching scales (§4.1 data model invariant). The ratio
    /// between the two scales must be an exact power of two.
    pub fn rescale_to(&self, encoder: FixedPointEncoder) -> Self {
        let ratio = encoder.scale() / self.encoder.scale();
        Self {
            share: self.share.mul_scalar(ratio as i64),
            encoder,
            device: self.device,
        }
    }

    // ---- multiply / rescale ----------------------------------------------

    pub fn mul(
        &self,
        y: Operand,
        beaver: &mut dyn BeaverSource,
        comm: &mut dyn Communicator,
    ) -> Result<Self> {
        match y {
            Operand::PublicInt(n) => Ok(Self {
                share: self.share.mul_scalar(n),
                encoder: self.encoder,
                device: self.device,
            }),
            Operand::PublicIntTensor(t) => Ok(Self {
                share: self.share.mul(t)?,
                encoder: self.encoder,
                device: self.device,
            }),
            Operand::PublicReal(vals) => {
                let encoded = self.encoder.encode_tensor(vals, self.share.shape().to_vec())?;
                let raw = self.share.mul(&encoded)?;
                self.rescale_from(raw, beaver, comm)
            }
            Operand::Shared(other) => {
                self.check_scale(other)?;
                let raw = beaver.mul(&self.share, &other.share, comm)?;
                self.rescale_from(raw, beaver, comm)
            }
            Operand::SharedScale1(other) => {
                let raw = beaver.mul(&self.share, &other.share, comm)?;
                Ok(Self {
                    share: raw,
                    encoder: self.encoder,
                    device: self.device,
                })
            }
        }
    }

    /// Wraps a scale-`s^2` raw product back down to scale `s` via the
    /// truncation protocol (§4.1 scale rule).
    fn rescale_from(
        &self,
        raw: RingTensor,
        beaver: &mut dyn BeaverSource,
        comm: &mut dyn Communicator,
    ) -> Result<Self> {
        let tmp = Self {
            share: raw,
            encoder: self.encoder,
            device: self.device,
        };
        tmp.div_public_int(self.encoder.scale() as i64, beaver, comm)
    }

    /// Truncating division by a public integer `y` (§4.1): two-party
    /// truncation is a local round-toward-zero divide; `n > 2` needs
    /// the Beaver oracle's `wraps` to correct the off-by-`n` wraparound
    /// error a naive per-share divide would otherwise introduce.
    pub fn div_public_int(
        &self,
        y: i64,
        beaver: &mut dyn BeaverSource,
        comm: &mut dyn Communicator,
    ) -> Result<Self> {
        let truncated = self.share.div_trunc(y);
        let corrected = if comm.world_size() == 2 {
            truncated
        } else {
            let theta = beaver.wraps(&self.share, comm);
            // 4 * 2^(L-2) rather than 2^L/y: 2^L itself is not
            // representable as a signed L-bit integer.
            let correction_factor = 4i64.wrapping_mul((1i64 << (RING_BITS - 2)) / y);
            let correction = theta.mul_scalar(correction_factor);
            truncated.sub(&correction)?
        };

        #[cfg(debug_assertions)]
        {
            let pre_plain = self.get_plain_text(comm);
            let post = comm.all_reduce(&corrected);
            let scale = self.encoder.scale() as f64;
            for (p, &raw) in pre_plain.iter().zip(post.data().iter()) {
                let expected = p / y as f64;
                let got = raw as f64 / scale;
                if (expected - got).abs() > 1.0 {
                    return Err(MpcError::NumericalDivergence(format!(
                        "div_ drift: expected {expected:.6}, got {got:.6}"
                    )));
                }
            }
        }

        Ok(Self {
            share: corrected,
            encoder: self.encoder,
            device: self.device,
        })
    }

    pub fn div_public_float(
        &self,
        y: f64,
        beaver: &mut dyn BeaverSource,
        comm: &mut dyn Communicator,
    ) -> Result<Self> {
        self.mul(Operand::PublicReal(&[1.0 / y]), beaver, comm)
    }

    /// Division by an arbitrary private tensor is delegated to the
    /// reciprocal approximation followed by a multiply (§4.1).
    pub fn div_private(
        &self,
        y: &Self,
        beaver: &mut dyn BeaverSource,
        comparator: &mut dyn Comparator,
        comm: &mut dyn Communicator,
    ) -> Result<Self> {
        let recip = crate::approximations::reciprocal(y, false, beaver, comparator, comm)?;
        self.mul(Operand::Shared(&recip), beaver, comm)
    }

    // ---- interactive bilinear ops -----------------------------------------

    pub fn matmul(
        &self,
        other: &Self,
        beaver: &mut dyn BeaverSource,
        comm: &mut dyn Communicator,
    ) -> Result<Self> {
        self.check_scale(other)?;
        let raw = beaver.matmul(&self.share, &other.share, comm)?;
        self.rescale_from(raw, beaver, comm)
    }

    pub fn conv1d(
        &self,
        kernel: &Self,
        stride: usize,
        beaver: &mut dyn BeaverSource,
        comm: &mut dyn Communicator,
    ) -> Result<Self> {
        self.check_scale(kernel)?;
        let raw = beaver.conv1d(&self.share, &kernel.share, stride, comm)?;
        self.rescale_from(raw, beaver, comm)
    }

    pub fn conv2d(
        &self,
        kernel: &Self,
        stride: (usize, usize),
        beaver: &mut dyn BeaverSource,
        comm: &mut dyn Communicator,
    ) -> Result<Self> {
        self.check_scale(kernel)?;
        let raw = beaver.conv2d(&self.share, &kernel.share, stride, comm)?;
        self.rescale_from(raw, beaver, comm)
    }

    pub fn conv_transpose1d(
        &self,
        kernel: &Self,
        stride: usize,
        beaver: &mut dyn BeaverSource,
        comm: &mut dyn Communicator,
    ) -> Result<Self> {
        self.check_scale(kernel)?;
        let raw = beaver.conv_transpose1d(&self.share, &kernel.share, stride, comm)?;
        self.rescale_from(raw, beaver, comm)
    }

    pub fn conv_transpose2d(
        &self,
        kernel: &Self,
        stride: (usize, usize),
        beaver: &mut dyn BeaverSource,
        comm: &mut dyn Communicator,
    ) -> Result<Self> {
        self.check_scale(kernel)?;
        let raw = beaver.conv_transpose2d(&self.share, &kernel.share, stride, comm)?;
        self.rescale_from(raw, beaver, comm)
    }

    pub fn square(&self, beaver: &mut dyn BeaverSource, comm: &mut dyn Communicator) -> Result<Self> {
        let raw = beaver.square(&self.share, comm)?;
        self.rescale_from(raw, beaver, comm)
    }

    pub fn dot(
        &self,
        other: &Self,
        beaver: &mut dyn BeaverSource,
        comm: &mut dyn Communicator,
    ) -> Result<Self> {
        let prod = self.mul(Operand::Shared(other), beaver, comm)?;
        Ok(prod.sum(None, false))
    }

    pub fn ger(
        &self,
        other: &Self,
        beaver: &mut dyn BeaverSource,
        comm: &mut dyn Communicator,
    ) -> Result<Self> {
        let x = self.view(vec![self.numel(), 1]);
        let y = other.view(vec![1, other.numel()]);
        x.matmul(&y, beaver, comm)
    }

    // ---- reductions --------------------------------------------------

    pub fn sum(&self, dim: Option<usize>, keepdim: bool) -> Self {
        Self {
            share: self.share.sum(dim, keepdim),
            encoder: self.encoder,
            device: self.device,
        }
    }

    pub fn cumsum(&self, dim: usize) -> Self {
        Self {
            share: self.share.cumsum(dim),
            encoder: self.encoder,
            device: self.device,
        }
    }

    pub fn mean(
        &self,
        dim: Option<usize>,
        keepdim: bool,
        beaver: &mut dyn BeaverSource,
        comm: &mut dyn Communicator,
    ) -> Result<Self> {
        let count = match dim {
            None => self.share.numel() as i64,
            Some(d) => self.share.size(d) as i64,
        };
        self.sum(dim, keepdim).div_public_int(count, beaver, comm)
    }

    /// Population variance (divides by `n`, not `n - 1`).
    pub fn var(
        &self,
        dim: Option<usize>,
        keepdim: bool,
        beaver: &mut dyn BeaverSource,
        comm: &mut dyn Communicator,
    ) -> Result<Self> {
        let mean = self.mean(dim, true, beaver, comm)?;
        let centered_share = match dim {
            None => self.share.sub(&broadcast_scalar(&mean.share, self.share.shape()))?,
            Some(d) => {
                let len = self.share.size(d);
                self.share.sub(&broadcast_axis(&mean.share, d, len))?
            }
        };
        let centered = Self {
            share: centered_share,
            encoder: self.encoder,
            device: self.device,
        };
        let squared = centered.square(beaver, comm)?;
        squared.mean(dim, keepdim, beaver, comm)
    }

    /// Product reduction via pairwise halving: split the axis in half,
    /// multiply elementwise, carry any odd remainder forward, recurse —
    /// `O(log d)` rounds of interaction rather than `d - 1` (§4.1).
    pub fn prod(&self, dim: usize, beaver: &mut dyn BeaverSource, comm: &mut dyn Communicator) -> Result<Self> {
        let len = self.share.size(dim);
        if len == 1 {
            return Ok(self.shallow_copy());
        }
        let half = len / 2;
        let remainder = len % 2;
        let sizes: Vec<usize> = if remainder == 0 {
            vec![half, half]
        } else {
            vec![half, half, remainder]
        };
        let parts = self.share.split(&sizes, dim);
        let left = Self {
            share: parts[0].clone(),
            encoder: self.encoder,
            device: self.device,
        };
        let right = Self {
            share: parts[1].clone(),
            encoder: self.encoder,
            device: self.device,
        };
        let mut reduced = left.mul(Operand::Shared(&right), beaver, comm)?;
        if remainder == 1 {
            reduced = Self {
                share: RingTensor::cat(&[reduced.share.clone(), parts[2].clone()], dim),
                encoder: self.encoder,
                device: self.device,
            };
        }
        reduced.prod(dim, beaver, comm)
    }

    /// Reduces along `dim` by the comparator's pairwise elementwise max,
    /// halving the axis each round — the same interaction-count strategy
    /// as [`prod`](Self::prod), substituting the comparison oracle for
    /// the Beaver-mediated multiply. Backs `softmax`/`log_softmax`'s
    /// max-subtraction, which is delegated to an external comparison
    /// primitive rather than computed locally.
    pub fn max_dim(
        &self,
        dim: usize,
        keepdim: bool,
        comparator: &mut dyn Comparator,
        beaver: &mut dyn BeaverSource,
        comm: &mut dyn Communicator,
    ) -> Result<Self> {
        let mut current = self.share.clone();
        loop {
            let len = current.size(dim);
            if len == 1 {
                break;
            }
            let half = len / 2;
            let remainder = len % 2;
            let sizes: Vec<usize> = if remainder == 0 {
                vec![half, half]
            } else {
                vec![half, half, remainder]
            };
            let parts = current.split(&sizes, dim);
            let mut reduced = comparator.max(&parts[0], &parts[1], beaver, comm);
            if remainder == 1 {
                reduced = RingTensor::cat(&[reduced, parts[2].clone()], dim);
            }
            current = reduced;
        }
        let share = if keepdim { current } else { current.remove_axis(dim) };
        Ok(Self {
            share,
            encoder: self.encoder,
            device: self.device,
        })
    }

    /// Sum-pools, then divides by the kernel area (§4.1 Avg pool 2D).
    /// `ceil_mode=true` is not supported — the output-size formula this
    /// crate's `sum_pool2d` uses is floor-only, matching the original's
    /// stated restriction rather than rounding partially-covered windows up.
    pub fn avg_pool2d(
        &self,
        kernel_size: (usize, usize),
        stride: (usize, usize),
        ceil_mode: bool,
        beaver: &mut dyn BeaverSource,
        comm: &mut dyn Communicator,
    ) -> Result<Self> {
        if ceil_mode {
            return Err(MpcError::Unsupported("avg_pool2d does not support ceil_mode=true".into()));
        }
        let summed = self.share.sum_pool2d(kernel_size, stride)?;
        let area = (kernel_size.0 * kernel_size.1) as i64;
        let tmp = Self {
            share: summed,
            encoder: self.encoder,
            device: self.device,
        };
        tmp.div_public_int(area, beaver, comm)
    }

    // ---- where / scatter -----------------------------------------------

    /// `self * cond + (1 - cond) * y` with a public, 0/1-valued `cond`.
    pub fn where_public(
        &self,
        cond: &[f64],
        y: &Self,
        beaver: &mut dyn BeaverSource,
        comm: &mut dyn Communicator,
    ) -> Result<Self> {
        let cond_ring = FixedPointEncoder::new(Some(0)).encode_tensor(cond, self.share.shape().to_vec())?;
        let one_minus: Vec<i64> = cond_ring.data().iter().map(|&v| 1 - v).collect();
        let one_minus_ring = RingTensor::from_flat(one_minus, cond_ring.shape().to_vec());
        let self_part = self.mul(Operand::PublicIntTensor(&cond_ring), beaver, comm)?;
        let y_part = y.mul(Operand::PublicIntTensor(&one_minus_ring), beaver, comm)?;
        self_part.add(&y_part)
    }

    /// `self * cond + (1 - cond) * y` with a shared, 0/1-valued `cond`;
    /// both multiplications are interactive.
    pub fn where_shared(
        &self,
        cond: &Self,
        y: &Self,
        beaver: &mut dyn BeaverSource,
        comm: &mut dyn Communicator,
    ) -> Result<Self> {
        let self_part = self.mul(Operand::Shared(cond), beaver, comm)?;
        let ones = vec![1.0; cond.numel()];
        let one_minus_cond = cond.neg().add_public(&ones, comm)?;
        let y_part = y.mul(Operand::Shared(&one_minus_cond), beaver, comm)?;
        self_part.add(&y_part)
    }

    /// Adds a private (shared) `addend`'s slice along `dim` into this
    /// tensor's `index`-th slices. Every rank applies its own share,
    /// since the addend is itself already split (§4.1 Scatter/index_add).
    pub fn index_add(&mut self, dim: usize, index: &[usize], addend: &Self) -> Result<()> {
        self.check_scale(addend)?;
        self.share.index_add_(dim, index, &addend.share);
        Ok(())
    }

    /// Adds a public addend's slice along `dim`; only rank 0 applies it,
    /// matching the public-op locality rule.
    pub fn index_add_public(
        &mut self,
        dim: usize,
        index: &[usize],
        addend_plain: &[f64],
        addend_shape: Vec<usize>,
        comm: &dyn Communicator,
    ) -> Result<()> {
        if comm.rank() == 0 {
            let encoded = self.encoder.encode_tensor(addend_plain, addend_shape)?;
            self.share.index_add_(dim, index, &encoded);
        }
        Ok(())
    }

    pub fn take(&self, index: &[usize]) -> Self {
        Self {
            share: self.share.take(index),
            encoder: self.encoder,
            device: self.device,
        }
    }

    pub fn pad_public(&self, pad: &[(usize, usize)], value: f64, comm: &dyn Communicator) -> Self {
        let encoded_value = (value * self.encoder.scale() as f64).round() as i64;
        let fill = if comm.rank() == 0 { encoded_value } else { 0 };
        Self {
            share: self.share.pad(pad, fill),
            encoder: self.encoder,
            device: self.device,
        }
    }

    /// Pads with a private 0-dim scalar value. This reveals the value to
    /// every party (§9 Open Questions: a known security-surface
    /// limitation inherited from the original, kept for compatibility
    /// rather than built out into a secure-pad protocol).
    pub fn pad_private(&self, pad: &[(usize, usize)], value: &Self, comm: &dyn Communicator) -> Result<Self> {
        if !value.share.shape().is_empty() {
            return Err(MpcError::Unsupported(
                "pad_private requires a 0-dimensional pad value".into(),
            ));
        }
        let revealed = value.reveal(comm);
        let fill = revealed.data()[0];
        Ok(Self {
            share: self.share.pad(pad, fill),
            encoder: self.encoder,
            device: self.device,
        })
    }

    // ---- shape-only delegates (REGULAR_FUNCTIONS pattern) ----------------

    pub fn reshape(&self, shape: Vec<usize>) -> Self {
        Self {
            share: self.share.reshape(shape),
            encoder: self.encoder,
            device: self.device,
        }
    }

    /// Same as [`reshape`](Self::reshape): a view onto the same elements
    /// under a different shape. Named separately because callers like
    /// [`ger`](Self::ger) reach for "view" the way the original's
    /// `.view(...)` calls do.
    pub fn view(&self, shape: Vec<usize>) -> Self {
        self.reshape(shape)
    }

    pub fn flatten(&self) -> Self {
        Self {
            share: self.share.flatten(),
            encoder: self.encoder,
            device: self.device,
        }
    }

    pub fn squeeze(&self) -> Self {
        Self {
            share: self.share.squeeze(),
            encoder: self.encoder,
            device: self.device,
        }
    }

    pub fn unsqueeze(&self, dim: usize) -> Self {
        Self {
            share: self.share.unsqueeze(dim),
            encoder: self.encoder,
            device: self.device,
        }
    }

    pub fn transpose(&self) -> Self {
        Self {
            share: self.share.transpose2d(),
            encoder: self.encoder,
            device: self.device,
        }
    }

    pub fn shape(&self) -> &[usize] {
        self.share.shape()
    }

    pub fn dim(&self) -> usize {
        self.share.dim()
    }

    pub fn numel(&self) -> usize {
        self.share.numel()
    }

    pub fn size(&self, dim: usize) -> usize {
        self.share.size(dim)
    }
}

fn broadcast_scalar(t: &RingTensor, shape: &[usize]) -> RingTensor {
    let n: usize = shape.iter().product();
    RingTensor::from_flat(vec![t.data()[0]; n], shape.to_vec())
}

/// Repeats a tensor whose `dim` axis has already been reduced to length 1
/// back out to `len`, by concatenating `len` identical copies. The
/// approximation library (softmax's max-subtraction, `var`) uses this to
/// work around the local tensor substrate having no native broadcasting.
pub(crate) fn broadcast_axis(t: &RingTensor, dim: usize, len: usize) -> RingTensor {
    if len == 1 {
        return t.clone();
    }
    let copies = vec![t.clone(); len];
    RingTensor::cat(&copies, dim)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::beaver::TrustedDealerBeaverSource;
    use crate::comm::LocalCommunicator;
    use std::thread;

    fn run3<F, T>(f: F) -> Vec<T>
    where
        F: Fn(&mut LocalCommunicator, &mut TrustedDealerBeaverSource) -> T + Send + Sync + 'static + Copy,
        T: Send + 'static,
    {
        let comms = LocalCommunicator::ring_with_seed(3, 99);
        let mut beavers = TrustedDealerBeaverSource::ring(3);
        let handles: Vec<_> = comms
            .into_iter()
            .zip(beavers.drain(..))
            .map(|(mut comm, mut beaver)| thread::spawn(move || f(&mut comm, &mut beaver)))
            .collect();
        handles.into_iter().map(|h| h.join().unwrap()).collect()
    }

    #[test]
    fn reconstruction_after_add() {
        let results = run3(|comm, _beaver| {
            let a = ArithmeticSharedTensor::new(Some(&[1.0, 2.0]), None, true, None, 0, comm).unwrap();
            let b = ArithmeticSharedTensor::new(Some(&[3.0, 4.0]), None, true, None, 0, comm).unwrap();
            let sum = a.add(&b).unwrap();
            sum.get_plain_text(comm)
        });
        for r in results {
            assert!((r[0] - 4.0).abs() < 1e-3);
            assert!((r[1] - 6.0).abs() < 1e-3);
        }
    }

    #[test]
    fn przs_sums_to_zero() {
        let results = run3(|comm, _beaver| {
            let t = ArithmeticSharedTensor::przs(vec![4], None, comm);
            comm.all_reduce(t.share())
        });
        for r in results {
            assert_eq!(r.data(), &[0, 0, 0, 0]);
        }
    }

    #[test]
    fn scale_preserved_across_public_int_mul() {
        let results = run3(|comm, beaver| {
            let a = ArithmeticSharedTensor::new(Some(&[2.0]), None, true, None, 0, comm).unwrap();
            let doubled = a.mul(Operand::PublicInt(2), beaver, comm).unwrap();
            (doubled.scale(), doubled.get_plain_text(comm))
        });
        for (scale, plain) in results {
            assert_eq!(scale, 1u64 << 16);
            assert!((plain[0] - 4.0).abs() < 1e-3);
        }
    }

    #[test]
    fn division_correction_matches_plaintext() {
        let results = run3(|comm, beaver| {
            let a = ArithmeticSharedTensor::new(Some(&[12345.0]), None, true, None, 0, comm).unwrap();
            let divided = a.div_public_int(7, beaver, comm).unwrap();
            divided.get_plain_text(comm)
        });
        for r in results {
            assert!((r[0] - 12345.0 / 7.0).abs() < 1.0);
        }
    }

    #[test]
    fn linear_algebra_scenario() {
        let results = run3(|comm, beaver| {
            let a = ArithmeticSharedTensor::new(Some(&[1.0, 2.0, 3.0, 4.0]), Some(vec![2, 2]), true, None, 0, comm)
                .unwrap();
            let b_plain = [5.0, 6.0, 7.0, 8.0];
            let b = ArithmeticSharedTensor::new(Some(&b_plain), Some(vec![2, 2]), true, None, 0, comm).unwrap();
            let prod = a.matmul(&b, beaver, comm).unwrap();
            let result = prod.add(&a).unwrap();
            result.get_plain_text(comm)
        });
        for r in results {
            let expected = [20.0, 24.0, 46.0, 54.0];
            for (a, b) in r.iter().zip(expected.iter()) {
                assert!((a - b).abs() < 1e-2, "{a} vs {b}");
            }
        }
    }

    #[test]
    fn avg_pool2d_matches_plaintext_mean() {
        let results = run3(|comm, beaver| {
            let x = ArithmeticSharedTensor::new(
                Some(&[1.0, 2.0, 3.0, 4.0, 5.0, 6.0, 7.0, 8.0, 9.0]),
                Some(vec![3, 3]),
                true,
                None,
                0,
                comm,
            )
            .unwrap();
            let pooled = x.avg_pool2d((2, 2), (1, 1), false, beaver, comm).unwrap();
            pooled.get_plain_text(comm)
        });
        for r in results {
            // top-left 2x2 window: (1+2+4+5)/4
            assert!((r[0] - 3.0).abs() < 1e-2, "{}", r[0]);
        }
    }

    #[test]
    fn avg_pool2d_rejects_ceil_mode() {
        let results = run3(|comm, beaver| {
            let x = ArithmeticSharedTensor::new(Some(&[1.0, 2.0, 3.0, 4.0]), Some(vec![2, 2]), true, None, 0, comm)
                .unwrap();
            x.avg_pool2d((2, 2), (1, 1), true, beaver, comm).is_err()
        });
        for r in results {
            assert!(r);
        }
    }

    #[test]
    fn mul_rejects_mismatched_shapes_instead_of_panicking() {
        let results = run3(|comm, beaver| {
            let a = ArithmeticSharedTensor::new(Some(&[1.0, 2.0]), None, true, None, 0, comm).unwrap();
            let b = ArithmeticSharedTensor::new(Some(&[1.0, 2.0, 3.0]), None, true, None, 0, comm).unwrap();
            a.mul(Operand::Shared(&b), beaver, comm).is_err()
        });
        for r in results {
            assert!(r);
        }
    }

    #[test]
    fn matmul_rejects_incompatible_inner_dimensions_instead_of_panicking() {
        let results = run3(|comm, beaver| {
            let a = ArithmeticSharedTensor::new(Some(&[1.0, 2.0, 3.0, 4.0]), Some(vec![2, 2]), true, None, 0, comm)
                .unwrap();
            let b = ArithmeticSharedTensor::new(Some(&[1.0, 2.0, 3.0]), Some(vec![3, 1]), true, None, 0, comm)
                .unwrap();
            a.matmul(&b, beaver, comm).is_err()
        });
        for r in results {
            assert!(r);
        }
    }
}
