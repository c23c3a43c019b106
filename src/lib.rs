//! # mpc_tensor
//!
//! A secret-shared, fixed-point tensor algebra for semi-honest
//! multi-party computation.
//!
//! ## Core components
//!
//! - **Ring / encoder** ([`ring`], [`encoder`]): the `Z_{2^64}` ring and
//!   the fixed-point (`scale = 2^f`) encoding between plaintext reals and
//!   ring elements.
//! - **Local tensor storage** ([`tensor`]): the per-party share
//!   representation and its purely local operations (reshape, matmul,
//!   convolution, reduction, ...).
//! - **Arithmetic secret sharing** ([`arithmetic`]): `ArithmeticSharedTensor`
//!   — construction via PRZS/PRSS, reveal, the local and
//!   Beaver-oracle-mediated operation surface, and the truncation/division
//!   protocol with multi-party wraparound correction.
//! - **Approximation library** ([`approximations`]): exp, log, reciprocal,
//!   inverse square root, sine/cosine, sigmoid, tanh, erf, softmax and
//!   log-softmax, all built from the arithmetic layer alone.
//! - **External collaborators** ([`comm`], [`beaver`], [`comparison`]): the
//!   `Communicator`, `BeaverSource`, and `Comparator` traits this crate is
//!   parameterized over, each with an in-process reference implementation
//!   for this crate's own tests.
//! - **Configuration** ([`config`]): scoped overrides for the
//!   approximation library's iteration counts and method choices.
//! - **Errors** ([`error`]): the `MpcError` enum returned throughout.
//!
//! ## Non-goals
//!
//! No malicious security (every reference `Comparator`/`BeaverSource`
//! here is semi-honest at best), no GPU backend, no autograd, and no
//! real network transport — `Communicator` is a trait boundary, not a
//! protocol implementation.

pub mod approximations;
pub mod arithmetic;
pub mod beaver;
pub mod comm;
pub mod comparison;
pub mod config;
pub mod encoder;
pub mod error;
pub mod ring;
pub mod tensor;

pub use arithmetic::{ArithmeticSharedTensor, Device, Operand};
pub use comm::Communicator;
pub use comparison::Comparator;
pub use config::ApproxConfig;
pub use encoder::FixedPointEncoder;
pub use error::{MpcError, Result};
pub use tensor::RingTensor;
