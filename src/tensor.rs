//! Local ring-tensor storage (§3, "Ring element" / "ring tensor").
//!
//! `RingTensor` is a single party's share: a row-major `Vec<i64>` plus a
//! shape. Every method here is purely local — no party ever needs to talk
//! to another party to reshape, add, or slice its own share. The
//! interactive layer (Beaver-mediated multiply, matmul, reveal, ...) lives
//! in `arithmetic.rs` and is built out of these primitives.

use crate::error::{MpcError, Result};
use serde::{Deserialize, Serialize};

/// A dense, row-major tensor of ring elements (`i64`, wrapping modulo 2^64).
///
/// Derives `Serialize`/`Deserialize` since this is the type that crosses a
/// real (non-loopback) `Communicator`'s wire in a networked deployment —
/// the reference `LocalCommunicator` never actually serializes it, but a
/// socket-backed one would need exactly this derive.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RingTensor {
    data: Vec<i64>,
    shape: Vec<usize>,
}

impl RingTensor {
    pub fn zeros(shape: Vec<usize>) -> Self {
        let n = shape.iter().product();
        Self {
            data: vec![0i64; n],
            shape,
        }
    }

    pub fn from_flat(data: Vec<i64>, shape: Vec<usize>) -> Self {
        let expected: usize = shape.iter().product();
        assert_eq!(data.len(), expected, "data/shape length mismatch");
        Self { data, shape }
    }

    /// A 0-dimensional tensor holding a single value.
    pub fn scalar(value: i64) -> Self {
        Self {
            data: vec![value],
            shape: vec![],
        }
    }

    pub fn data(&self) -> &[i64] {
        &self.data
    }

    pub fn data_mut(&mut self) -> &mut [i64] {
        &mut self.data
    }

    pub fn into_data(self) -> Vec<i64> {
        self.data
    }

    pub fn shape(&self) -> &[usize] {
        &self.shape
    }

    pub fn dim(&self) -> usize {
        self.shape.len()
    }

    pub fn numel(&self) -> usize {
        self.data.len()
    }

    pub fn size(&self, dim: usize) -> usize {
        self.shape[dim]
    }

    fn check_same_shape(&self, other: &Self) -> Result<()> {
        if self.shape != other.shape {
            return Err(MpcError::ShapeMismatch {
                lhs: self.shape.clone(),
                rhs: other.shape.clone(),
            });
        }
        Ok(())
    }

    fn elementwise(&self, other: &Self, op: impl Fn(i64, i64) -> i64) -> Result<Self> {
        self.check_same_shape(other)?;
        let data = self
            .data
            .iter()
            .zip(other.data.iter())
            .map(|(&a, &b)| op(a, b))
            .collect();
        Ok(Self {
            data,
            shape: self.shape.clone(),
        })
    }

    pub fn add(&self, other: &Self) -> Result<Self> {
        self.elementwise(other, i64::wrapping_add)
    }

    pub fn sub(&self, other: &Self) -> Result<Self> {
        self.elementwise(other, i64::wrapping_sub)
    }

    pub fn mul(&self, other: &Self) -> Result<Self> {
        self.elementwise(other, i64::wrapping_mul)
    }

    pub fn add_assign(&mut self, other: &Self) -> Result<()> {
        self.check_same_shape(other)?;
        for (a, &b) in self.data.iter_mut().zip(other.data.iter()) {
            *a = a.wrapping_add(b);
        }
        Ok(())
    }

    pub fn sub_assign(&mut self, other: &Self) -> Result<()> {
        self.check_same_shape(other)?;
        for (a, &b) in self.data.iter_mut().zip(other.data.iter()) {
            *a = a.wrapping_sub(b);
        }
        Ok(())
    }

    pub fn neg(&self) -> Self {
        Self {
            data: self.data.iter().map(|v| v.wrapping_neg()).collect(),
            shape: self.shape.clone(),
        }
    }

    /// Broadcasts a public scalar ring element to this tensor's shape and
    /// multiplies elementwise.
    pub fn mul_scalar(&self, scalar: i64) -> Self {
        Self {
            data: self.data.iter().map(|&v| v.wrapping_mul(scalar)).collect(),
            shape: self.shape.clone(),
        }
    }

    pub fn add_scalar(&self, scalar: i64) -> Self {
        Self {
            data: self.data.iter().map(|&v| v.wrapping_add(scalar)).collect(),
            shape: self.shape.clone(),
        }
    }

    /// Round-toward-zero integer division by a public divisor.
    pub fn div_trunc(&self, divisor: i64) -> Self {
        Self {
            data: self.data.iter().map(|&v| v.wrapping_div(divisor)).collect(),
            shape: self.shape.clone(),
        }
    }

    pub fn reshape(&self, shape: Vec<usize>) -> Self {
        let expected: usize = shape.iter().product();
        assert_eq!(expected, self.data.len(), "reshape must preserve numel");
        Self {
            data: self.data.clone(),
            shape,
        }
    }

    pub fn reshape_in_place(&mut self, shape: Vec<usize>) {
        let expected: usize = shape.iter().product();
        assert_eq!(expected, self.data.len(), "reshape must preserve numel");
        self.shape = shape;
    }

    pub fn flatten(&self) -> Self {
        self.reshape(vec![self.data.len()])
    }

    pub fn squeeze(&self) -> Self {
        let shape: Vec<usize> = self.shape.iter().copied().filter(|&d| d != 1).collect();
        self.reshape(shape)
    }

    pub fn unsqueeze(&self, dim: usize) -> Self {
        let mut shape = self.shape.clone();
        shape.insert(dim, 1);
        self.reshape(shape)
    }

    /// Drops a single axis of length 1, unlike [`squeeze`](Self::squeeze)
    /// which drops every such axis. Used by dimension-targeted reductions
    /// (e.g. max-along-dim) that must not disturb unrelated size-1 axes.
    pub fn remove_axis(&self, dim: usize) -> Self {
        assert_eq!(self.shape[dim], 1, "remove_axis requires a size-1 axis");
        let mut shape = self.shape.clone();
        shape.remove(dim);
        self.reshape(shape)
    }

    /// 2D matrix transpose.
    pub fn transpose2d(&self) -> Self {
        assert_eq!(self.shape.len(), 2, "transpose2d requires a 2D tensor");
        let (r, c) = (self.shape[0], self.shape[1]);
        let mut data = vec![0i64; r * c];
        for i in 0..r {
            for j in 0..c {
                data[j * r + i] = self.data[i * c + j];
            }
        }
        Self {
            data,
            shape: vec![c, r],
        }
    }

    /// 2D matrix multiplication: `(m, k) x (k, n) -> (m, n)`.
    pub fn matmul(&self, other: &Self) -> Result<Self> {
        if self.shape.len() != 2 || other.shape.len() != 2 || self.shape[1] != other.shape[0] {
            return Err(MpcError::ShapeMismatch {
                lhs: self.shape.clone(),
                rhs: other.shape.clone(),
            });
        }
        let (m, k, n) = (self.shape[0], self.shape[1], other.shape[1]);
        let mut out = vec![0i64; m * n];
        for i in 0..m {
            for p in 0..k {
                let a = self.data[i * k + p];
                if a == 0 {
                    continue;
                }
                for j in 0..n {
                    out[i * n + j] = out[i * n + j].wrapping_add(a.wrapping_mul(other.data[p * n + j]));
                }
            }
        }
        Ok(Self {
            data: out,
            shape: vec![m, n],
        })
    }

    /// Naive 1D convolution (stride 1, no padding). `self`: `(in_len,)`,
    /// `kernel`: `(k,)`. Out length `in_len - k + 1`.
    pub fn conv1d(&self, kernel: &Self, stride: usize) -> Result<Self> {
        assert_eq!(self.shape.len(), 1);
        assert_eq!(kernel.shape.len(), 1);
        let (n, k) = (self.shape[0], kernel.shape[0]);
        if k > n {
            return Err(MpcError::ShapeMismatch {
                lhs: self.shape.clone(),
                rhs: kernel.shape.clone(),
            });
        }
        let out_len = (n - k) / stride + 1;
        let mut out = vec![0i64; out_len];
        for (o, slot) in out.iter_mut().enumerate() {
            let base = o * stride;
            let mut acc = 0i64;
            for j in 0..k {
                acc = acc.wrapping_add(self.data[base + j].wrapping_mul(kernel.data[j]));
            }
            *slot = acc;
        }
        Ok(Self {
            data: out,
            shape: vec![out_len],
        })
    }

    /// Naive 2D convolution (single channel, stride 1). `self`: `(h, w)`,
    /// `kernel`: `(kh, kw)`.
    pub fn conv2d(&self, kernel: &Self, stride: (usize, usize)) -> Result<Self> {
        assert_eq!(self.shape.len(), 2);
        assert_eq!(kernel.shape.len(), 2);
        let (h, w) = (self.shape[0], self.shape[1]);
        let (kh, kw) = (kernel.shape[0], kernel.shape[1]);
        if kh > h || kw > w {
            return Err(MpcError::ShapeMismatch {
                lhs: self.shape.clone(),
                rhs: kernel.shape.clone(),
            });
        }
        let oh = (h - kh) / stride.0 + 1;
        let ow = (w - kw) / stride.1 + 1;
        let mut out = vec![0i64; oh * ow];
        for oi in 0..oh {
            for oj in 0..ow {
                let mut acc = 0i64;
                for ki in 0..kh {
                    for kj in 0..kw {
                        let r = oi * stride.0 + ki;
                        let c = oj * stride.1 + kj;
                        acc = acc.wrapping_add(
                            self.data[r * w + c].wrapping_mul(kernel.data[ki * kw + kj]),
                        );
                    }
                }
                out[oi * ow + oj] = acc;
            }
        }
        Ok(Self {
            data: out,
            shape: vec![oh, ow],
        })
    }

    /// Transpose ("deconvolution") counterpart of [`conv1d`]: scatter-adds
    /// each input sample times the kernel into the (larger) output.
    pub fn conv_transpose1d(&self, kernel: &Self, stride: usize) -> Result<Self> {
        assert_eq!(self.shape.len(), 1);
        assert_eq!(kernel.shape.len(), 1);
        let (n, k) = (self.shape[0], kernel.shape[0]);
        let out_len = (n - 1) * stride + k;
        let mut out = vec![0i64; out_len];
        for i in 0..n {
            let base = i * stride;
            for j in 0..k {
                out[base + j] = out[base + j].wrapping_add(self.data[i].wrapping_mul(kernel.data[j]));
            }
        }
        Ok(Self {
            data: out,
            shape: vec![out_len],
        })
    }

    pub fn conv_transpose2d(&self, kernel: &Self, stride: (usize, usize)) -> Result<Self> {
        assert_eq!(self.shape.len(), 2);
        assert_eq!(kernel.shape.len(), 2);
        let (h, w) = (self.shape[0], self.shape[1]);
        let (kh, kw) = (kernel.shape[0], kernel.shape[1]);
        let oh = (h - 1) * stride.0 + kh;
        let ow = (w - 1) * stride.1 + kw;
        let mut out = vec![0i64; oh * ow];
        for i in 0..h {
            for j in 0..w {
                let base_r = i * stride.0;
                let base_c = j * stride.1;
                let v = self.data[i * w + j];
                for ki in 0..kh {
                    for kj in 0..kw {
                        let idx = (base_r + ki) * ow + (base_c + kj);
                        out[idx] = out[idx].wrapping_add(v.wrapping_mul(kernel.data[ki * kw + kj]));
                    }
                }
            }
        }
        Ok(Self {
            data: out,
            shape: vec![oh, ow],
        })
    }

    /// Sum-pools a 2D tensor with the given kernel (divisor 1, i.e. a raw
    /// sum rather than an average — callers divide by the kernel area
    /// themselves to build `avg_pool2d` on top of this).
    pub fn sum_pool2d(&self, kernel_size: (usize, usize), stride: (usize, usize)) -> Result<Self> {
        assert_eq!(self.shape.len(), 2);
        let (h, w) = (self.shape[0], self.shape[1]);
        let (kh, kw) = kernel_size;
        let oh = (h - kh) / stride.0 + 1;
        let ow = (w - kw) / stride.1 + 1;
        let mut out = vec![0i64; oh * ow];
        for oi in 0..oh {
            for oj in 0..ow {
                let mut acc = 0i64;
                for ki in 0..kh {
                    for kj in 0..kw {
                        let r = oi * stride.0 + ki;
                        let c = oj * stride.1 + kj;
                        acc = acc.wrapping_add(self.data[r * w + c]);
                    }
                }
                out[oi * ow + oj] = acc;
            }
        }
        Ok(Self {
            data: out,
            shape: vec![oh, ow],
        })
    }

    /// Sums all elements (`dim = None`) or along one axis.
    pub fn sum(&self, dim: Option<usize>, keepdim: bool) -> Self {
        match dim {
            None => Self::scalar(self.data.iter().fold(0i64, |a, &b| a.wrapping_add(b))),
            Some(d) => self.reduce_axis(d, keepdim, 0, i64::wrapping_add),
        }
    }

    /// Cumulative sum along an axis.
    pub fn cumsum(&self, dim: usize) -> Self {
        let mut out = self.clone();
        let strides = Self::strides(&self.shape);
        let axis_len = self.shape[dim];
        let outer: usize = self.shape.iter().enumerate().filter(|(i, _)| *i != dim).map(|(_, &s)| s).product();
        let _ = outer;
        self.for_each_lane(dim, &strides, |lane: &[usize]| {
            let mut acc = 0i64;
            for &idx in lane {
                acc = acc.wrapping_add(out.data[idx]);
                out.data[idx] = acc;
            }
        });
        let _ = axis_len;
        out
    }

    /// Reduces one axis with a binary fold, `identity` as the fold seed.
    fn reduce_axis(&self, dim: usize, keepdim: bool, identity: i64, op: impl Fn(i64, i64) -> i64) -> Self {
        let strides = Self::strides(&self.shape);
        let mut out_shape = self.shape.clone();
        out_shape[dim] = 1;
        let mut out = vec![identity; out_shape.iter().product()];
        let out_strides = Self::strides(&out_shape);
        self.for_each_index(|idx, multi| {
            let mut out_multi = multi.to_vec();
            out_multi[dim] = 0;
            let out_idx: usize = out_multi.iter().zip(out_strides.iter()).map(|(&a, &b)| a * b).sum();
            out[out_idx] = op(out[out_idx], self.data[idx]);
        });
        let _ = strides;
        let final_shape = if keepdim {
            out_shape
        } else {
            out_shape
                .iter()
                .enumerate()
                .filter(|(i, _)| *i != dim)
                .map(|(_, &s)| s)
                .collect()
        };
        Self {
            data: out,
            shape: final_shape,
        }
    }

    fn strides(shape: &[usize]) -> Vec<usize> {
        let mut strides = vec![1usize; shape.len()];
        for i in (0..shape.len().saturating_sub(1)).rev() {
            strides[i] = strides[i + 1] * shape[i + 1];
        }
        strides
    }

    fn for_each_index(&self, mut f: impl FnMut(usize, &[usize])) {
        let mut multi = vec![0usize; self.shape.len()];
        for idx in 0..self.data.len() {
            f(idx, &multi);
            for d in (0..self.shape.len()).rev() {
                multi[d] += 1;
                if multi[d] < self.shape[d] {
                    break;
                }
                multi[d] = 0;
            }
        }
    }

    /// Invokes `f` once per 1D lane along `dim`, passing the flat indices
    /// of that lane in order.
    fn for_each_lane(&self, dim: usize, strides: &[usize], mut f: impl FnMut(&[usize])) {
        let axis_len = self.shape[dim];
        let axis_stride = strides[dim];
        let mut outer_shape = self.shape.clone();
        outer_shape[dim] = 1;
        let mut multi = vec![0usize; self.shape.len()];
        let outer_count: usize = outer_shape.iter().product();
        for _ in 0..outer_count {
            let base: usize = multi.iter().zip(strides.iter()).map(|(&a, &b)| a * b).sum();
            let lane: Vec<usize> = (0..axis_len).map(|i| base + i * axis_stride).collect();
            f(&lane);
            for d in (0..self.shape.len()).rev() {
                if d == dim {
                    continue;
                }
                multi[d] += 1;
                if multi[d] < self.shape[d] {
                    break;
                }
                multi[d] = 0;
            }
        }
    }

    /// Concatenates tensors along `dim`. All tensors must agree on every
    /// other dimension.
    pub fn cat(tensors: &[Self], dim: usize) -> Self {
        assert!(!tensors.is_empty());
        let mut shape = tensors[0].shape.clone();
        shape[dim] = tensors.iter().map(|t| t.shape[dim]).sum();
        let strides = Self::strides(&shape);
        let mut data = vec![0i64; shape.iter().product()];
        let mut offset = 0usize;
        for t in tensors {
            t.for_each_index(|idx, multi| {
                let mut out_multi = multi.to_vec();
                out_multi[dim] += offset;
                let out_idx: usize = out_multi.iter().zip(strides.iter()).map(|(&a, &b)| a * b).sum();
                data[out_idx] = t.data[idx];
            });
            offset += t.shape[dim];
        }
        Self { data, shape }
    }

    /// Stacks tensors along a new leading axis.
    pub fn stack(tensors: &[Self]) -> Self {
        let inner_shape = tensors[0].shape.clone();
        let unsqueezed: Vec<Self> = tensors
            .iter()
            .map(|t| {
                let mut s = vec![1];
                s.extend(inner_shape.iter());
                t.reshape(s)
            })
            .collect();
        Self::cat(&unsqueezed, 0)
    }

    /// Splits along `dim` into chunks of the given sizes (sizes must sum
    /// to the axis length).
    pub fn split(&self, sizes: &[usize], dim: usize) -> Vec<Self> {
        assert_eq!(sizes.iter().sum::<usize>(), self.shape[dim]);
        let strides = Self::strides(&self.shape);
        let mut result = Vec::with_capacity(sizes.len());
        let mut offset = 0usize;
        for &size in sizes {
            let mut out_shape = self.shape.clone();
            out_shape[dim] = size;
            let mut out = vec![0i64; out_shape.iter().product()];
            let out_strides = Self::strides(&out_shape);
            // Iterate over the output shape and pull from self.
            let mut multi = vec![0usize; out_shape.len()];
            for out_idx in 0..out.len() {
                let mut src_multi = multi.clone();
                src_multi[dim] += offset;
                let src_idx: usize = src_multi.iter().zip(strides.iter()).map(|(&a, &b)| a * b).sum();
                out[out_idx] = self.data[src_idx];
                for d in (0..out_shape.len()).rev() {
                    multi[d] += 1;
                    if multi[d] < out_shape[d] {
                        break;
                    }
                    multi[d] = 0;
                }
            }
            let _ = out_strides;
            result.push(Self {
                data: out,
                shape: out_shape,
            });
            offset += size;
        }
        result
    }

    /// Constant-value padding along the last two axes is the common case;
    /// this implementation pads every axis per a `(before, after)` pair.
    pub fn pad(&self, pad: &[(usize, usize)], value: i64) -> Self {
        assert_eq!(pad.len(), self.shape.len());
        let out_shape: Vec<usize> = self
            .shape
            .iter()
            .zip(pad.iter())
            .map(|(&s, &(b, a))| s + b + a)
            .collect();
        let out_strides = Self::strides(&out_shape);
        let mut data = vec![value; out_shape.iter().product()];
        self.for_each_index(|idx, multi| {
            let out_multi: Vec<usize> = multi.iter().zip(pad.iter()).map(|(&m, &(b, _))| m + b).collect();
            let out_idx: usize = out_multi.iter().zip(out_strides.iter()).map(|(&a, &b)| a * b).sum();
            data[out_idx] = self.data[idx];
        });
        Self {
            data,
            shape: out_shape,
        }
    }

    /// Gathers elements of a flattened tensor by index (`torch.take`
    /// semantics when `dimension` is `None`).
    pub fn take(&self, index: &[usize]) -> Self {
        let data = index.iter().map(|&i| self.data[i]).collect();
        Self {
            data,
            shape: vec![index.len()],
        }
    }

    /// Index-add along `dim`: for each `i`, adds `addend`'s i-th slice
    /// along `dim` into `self`'s `index[i]`-th slice.
    pub fn index_add_(&mut self, dim: usize, index: &[usize], addend: &Self) {
        let strides = Self::strides(&self.shape);
        addend.for_each_index(|idx, multi| {
            let mut out_multi = multi.to_vec();
            out_multi[dim] = index[multi[dim]];
            let out_idx: usize = out_multi.iter().zip(strides.iter()).map(|(&a, &b)| a * b).sum();
            self.data[out_idx] = self.data[out_idx].wrapping_add(addend.data[idx]);
        });
    }
}
