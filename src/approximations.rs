//! Transcendental approximation library (§4.4): every routine here is a
//! pure composition of [`ArithmeticSharedTensor`] operations — none of
//! them touch a share directly. The algorithms follow CrypTen's
//! `MPCTensor` approximation methods (Newton-Raphson reciprocal,
//! Householder-order-8 log, the limit-form `exp`, Chebyshev tanh/sigmoid),
//! rebuilt here as free functions that read [`config::current`] and use
//! [`config::push_scope`] for the same "temporarily override one knob"
//! idiom CrypTen expresses with `with ConfigManager(...):`.

use crate::arithmetic::{broadcast_axis, ArithmeticSharedTensor, Operand};
use crate::beaver::BeaverSource;
use crate::comm::Communicator;
use crate::comparison::Comparator;
use crate::config::{self, ReciprocalMethod, SigmoidTanhMethod};
use crate::error::{MpcError, Result};

type Ast = ArithmeticSharedTensor;

fn broadcast_axis_ast(t: &Ast, dim: usize, len: usize) -> Ast {
    Ast::from_shares(broadcast_axis(t.share(), dim, len), Some(t.encoder().precision_bits()))
}

/// Limit approximation `exp(x) = lim_{d->inf} (1 + x/2^d)^(2^d)`, computed
/// by forming `1 + x/2^d` once and squaring `d` times (`exp_iterations`,
/// default 8).
pub fn exp(x: &Ast, beaver: &mut dyn BeaverSource, comm: &mut dyn Communicator) -> Result<Ast> {
    let cfg = config::current();
    let divisor = 1i64 << cfg.exp_iterations;
    let mut result = x.div_public_int(divisor, beaver, comm)?.add_public_scalar(1.0, comm)?;
    for _ in 0..cfg.exp_iterations {
        result = result.square(beaver, comm)?;
    }
    Ok(result)
}

/// 8th-order modified Householder iteration for the natural logarithm,
/// accurate within 2% relative error on `[1e-4, 250]`.
///
/// `input_in_01` shifts the domain via `ln(u) = ln(100u) - ln(100)`,
/// useful for entropy-style computations where `x` is itself a
/// probability.
pub fn log(
    x: &Ast,
    input_in_01: bool,
    beaver: &mut dyn BeaverSource,
    comparator: &mut dyn Comparator,
    comm: &mut dyn Communicator,
) -> Result<Ast> {
    if input_in_01 {
        let scaled = x.mul_public_scalar(100.0, beaver, comm)?;
        let l = log(&scaled, false, beaver, comparator, comm)?;
        return l.sub_public_scalar(4.605_170, comm);
    }

    let cfg = config::current();

    // Initial estimate (found by qualitative inspection in the original):
    //   ln(x) = x/120 - 20*exp(-2x - 1) + 3
    // This exp call runs at the *ambient* exp_iterations, not
    // log_exp_iterations — only the Householder loop below scopes that.
    let term1 = x.div_public_int(120, beaver, comm)?;
    let inner = x
        .mul(Operand::PublicInt(2), beaver, comm)?
        .add_public_scalar(1.0, comm)?
        .neg();
    let exp_inner = exp(&inner, beaver, comm)?;
    let term2 = exp_inner.mul_public_scalar(20.0, beaver, comm)?;
    let mut y = term1.sub(&term2)?.add_public_scalar(3.0, comm)?;

    let coeffs: Vec<f64> = (0..cfg.log_order).map(|i| 1.0 / (i as f64 + 1.0)).collect();
    let mut scoped = cfg;
    scoped.exp_iterations = cfg.log_exp_iterations;
    {
        let _scope = config::push_scope(scoped);
        for _ in 0..cfg.log_iterations {
            let e = exp(&y.neg(), beaver, comm)?;
            let xe = x.mul(Operand::Shared(&e), beaver, comm)?;
            let h = xe.neg().add_public_scalar(1.0, comm)?;
            let correction = householder_poly(&h, &coeffs, beaver, comm)?;
            y = y.sub(&correction)?;
        }
    }
    Ok(y)
}

/// Evaluates `sum_{k=1}^{coeffs.len()} coeffs[k-1] * h^k` via repeated
/// multiplication by `h`, the Householder correction term of [`log`].
fn householder_poly(
    h: &Ast,
    coeffs: &[f64],
    beaver: &mut dyn BeaverSource,
    comm: &mut dyn Communicator,
) -> Result<Ast> {
    let mut power = h.shallow_copy();
    let mut acc = power.mul_public_scalar(coeffs[0], beaver, comm)?;
    for &c in &coeffs[1..] {
        power = power.mul(Operand::Shared(h), beaver, comm)?;
        let term = power.mul_public_scalar(c, beaver, comm)?;
        acc = acc.add(&term)?;
    }
    Ok(acc)
}

/// Reciprocal of `x`. Dispatches on sign unless `reciprocal_all_pos` is
/// set, then on `reciprocal_method` (Newton-Raphson or the log-based
/// `exp(-log(x))` identity).
///
/// `input_in_01` rescales into `[0, 64]`, where the NR initial guess
/// converges reliably, by computing `reciprocal(64x) * 64`.
pub fn reciprocal(
    x: &Ast,
    input_in_01: bool,
    beaver: &mut dyn BeaverSource,
    comparator: &mut dyn Comparator,
    comm: &mut dyn Communicator,
) -> Result<Ast> {
    if input_in_01 {
        let scaled = x.mul(Operand::PublicInt(64), beaver, comm)?;
        let mut cfg = config::current();
        cfg.reciprocal_all_pos = true;
        let rec = {
            let _scope = config::push_scope(cfg);
            reciprocal(&scaled, false, beaver, comparator, comm)?
        };
        return rec.mul(Operand::PublicInt(64), beaver, comm);
    }

    let cfg = config::current();

    if !cfg.reciprocal_all_pos {
        let sign = Ast::from_shares(comparator.sign(x.share(), comm), Some(0));
        let pos = x.mul(Operand::SharedScale1(&sign), beaver, comm)?;
        let mut scoped = cfg;
        scoped.reciprocal_all_pos = true;
        let rec_pos = {
            let _scope = config::push_scope(scoped);
            reciprocal(&pos, false, beaver, comparator, comm)?
        };
        return rec_pos.mul(Operand::SharedScale1(&sign), beaver, comm);
    }

    match cfg.reciprocal_method {
        ReciprocalMethod::NewtonRaphson => {
            let mut result = match cfg.reciprocal_initial {
                Some(v) => Ast::from_public(v, x.shape().to_vec(), Some(x.encoder().precision_bits()), comm)?,
                None => {
                    // 1/x ~= 3*exp(1 - 2x) + 0.003
                    let inner = x.mul(Operand::PublicInt(-2), beaver, comm)?.add_public_scalar(1.0, comm)?;
                    let e = exp(&inner, beaver, comm)?;
                    e.mul_public_scalar(3.0, beaver, comm)?.add_public_scalar(0.003, comm)?
                }
            };
            for _ in 0..cfg.reciprocal_nr_iters {
                let r2 = result.square(beaver, comm)?;
                let rx = r2.mul(Operand::Shared(x), beaver, comm)?;
                let two_r = result.mul(Operand::PublicInt(2), beaver, comm)?;
                result = two_r.sub(&rx)?;
            }
            Ok(result)
        }
        ReciprocalMethod::Log => {
            // The original keys this override off a config field
            // (`log_iters`) that doesn't exist on `ApproxConfig` — almost
            // certainly a silent no-op left over from a rename. We don't
            // reproduce the typo; the documented intent (override the
            // Householder iteration count for this region) is honored
            // directly against `log_iterations`.
            let mut scoped = cfg;
            scoped.log_iterations = cfg.reciprocal_log_iters;
            let neg_log = {
                let _scope = config::push_scope(scoped);
                log(x, false, beaver, comparator, comm)?.neg()
            };
            exp(&neg_log, beaver, comm)
        }
    }
}

/// Inverse square root via Newton-Raphson: `y <- y*(3 - x*y^2)/2`,
/// starting from `y0 = 2.2*exp(-(x/2 + 0.2)) + 0.2 - x/1024`.
pub fn inv_sqrt(x: &Ast, beaver: &mut dyn BeaverSource, comm: &mut dyn Communicator) -> Result<Ast> {
    let cfg = config::current();
    let mut y = match cfg.sqrt_nr_initial {
        Some(v) => Ast::from_public(v, x.shape().to_vec(), Some(x.encoder().precision_bits()), comm)?,
        None => {
            let inner = x.mul_public_scalar(0.5, beaver, comm)?.add_public_scalar(0.2, comm)?.neg();
            let e = exp(&inner, beaver, comm)?;
            let base = e.mul_public_scalar(2.2, beaver, comm)?.add_public_scalar(0.2, comm)?;
            let correction = x.mul_public_scalar(1.0 / 1024.0, beaver, comm)?;
            base.sub(&correction)?
        }
    };
    for _ in 0..cfg.sqrt_nr_iters {
        let y2 = y.square(beaver, comm)?;
        let xy2 = x.mul(Operand::Shared(&y2), beaver, comm)?;
        let three_minus_xy2 = xy2.neg().add_public_scalar(3.0, comm)?;
        let product = y.mul(Operand::Shared(&three_minus_xy2), beaver, comm)?;
        y = product.div_public_int(2, beaver, comm)?;
    }
    Ok(y)
}

/// `sqrt(x) = inv_sqrt(x) * x`.
pub fn sqrt(x: &Ast, beaver: &mut dyn BeaverSource, comm: &mut dyn Communicator) -> Result<Ast> {
    let y = inv_sqrt(x, beaver, comm)?;
    y.mul(Operand::Shared(x), beaver, comm)
}

/// `e^(ix)` via repeated complex squaring, returned as `(Re, Im) = (cos x,
/// sin x)`. The first squaring exploits `Re = 1` being public to save an
/// interactive multiply; the doubling of `Im` after it is a local
/// multiply by the public integer 2.
fn eix(x: &Ast, beaver: &mut dyn BeaverSource, comm: &mut dyn Communicator) -> Result<(Ast, Ast)> {
    let cfg = config::current();
    let divisor = 1i64 << cfg.trig_iterations;
    let mut im = x.div_public_int(divisor, beaver, comm)?;

    let im2 = im.square(beaver, comm)?;
    let mut re = im2.neg().add_public_scalar(1.0, comm)?;
    im = im.mul(Operand::PublicInt(2), beaver, comm)?;

    for _ in 1..cfg.trig_iterations {
        let a2 = re.square(beaver, comm)?;
        let b2 = im.square(beaver, comm)?;
        let mut im_next = im.mul(Operand::Shared(&re), beaver, comm)?;
        im_next = im_next.mul(Operand::PublicInt(2), beaver, comm)?;
        re = a2.sub(&b2)?;
        im = im_next;
    }
    Ok((re, im))
}

/// `(cos x, sin x)` computed from a single `_eix` evaluation, cheaper
/// than calling [`cos`] and [`sin`] separately when a caller wants both.
pub fn cossin(x: &Ast, beaver: &mut dyn BeaverSource, comm: &mut dyn Communicator) -> Result<(Ast, Ast)> {
    eix(x, beaver, comm)
}

pub fn cos(x: &Ast, beaver: &mut dyn BeaverSource, comm: &mut dyn Communicator) -> Result<Ast> {
    Ok(eix(x, beaver, comm)?.0)
}

pub fn sin(x: &Ast, beaver: &mut dyn BeaverSource, comm: &mut dyn Communicator) -> Result<Ast> {
    Ok(eix(x, beaver, comm)?.1)
}

/// Logistic sigmoid `sigma(x) = (1 + e^-x)^-1`.
///
/// `reciprocal` method: splits on sign, computes the positive branch via
/// a tuned reciprocal (`exp_iterations=9`, `reciprocal_nr_iters=3`,
/// `reciprocal_initial=0.75`), and folds the two branches back together.
/// `chebyshev` method: `sigma(x) = tanh(x/2)/2 + 1/2`.
pub fn sigmoid(
    x: &Ast,
    beaver: &mut dyn BeaverSource,
    comparator: &mut dyn Comparator,
    comm: &mut dyn Communicator,
) -> Result<Ast> {
    let cfg = config::current();
    match cfg.sigmoid_tanh_method {
        SigmoidTanhMethod::Chebyshev => {
            let half_x = x.mul_public_scalar(0.5, beaver, comm)?;
            let t = tanh(&half_x, beaver, comparator, comm)?;
            t.mul_public_scalar(0.5, beaver, comm)?.add_public_scalar(0.5, comm)
        }
        SigmoidTanhMethod::Reciprocal => {
            let precision = Some(x.encoder().precision_bits());
            let ltz = Ast::from_shares(comparator.ltz(x.share(), comm), Some(0));
            let sign = ltz.mul(Operand::PublicInt(-2), beaver, comm)?.add_public_scalar(1.0, comm)?;

            let pos_input = x.mul(Operand::SharedScale1(&sign), beaver, comm)?;
            let e = exp(&pos_input.neg(), beaver, comm)?;
            let denominator = e.add_public_scalar(1.0, comm)?;

            let mut scoped = cfg;
            scoped.exp_iterations = 9;
            scoped.reciprocal_nr_iters = 3;
            scoped.reciprocal_all_pos = true;
            scoped.reciprocal_initial = Some(0.75);
            let pos_output = {
                let _scope = config::push_scope(scoped);
                reciprocal(&denominator, false, beaver, comparator, comm)?
            };

            // result = pos_output * (1 - ltz) + (1 - pos_output) * ltz,
            // with `ltz` promoted from scale 1 to the ambient scale so it
            // can be added to/subtracted from `pos_output` directly.
            let one = Ast::from_public(1.0, x.shape().to_vec(), precision, comm)?;
            let ltz_wide = ltz.rescale_to(x.encoder());
            let one_minus_ltz = one.sub(&ltz_wide)?;
            let one_minus_pos_output = pos_output.neg().add_public_scalar(1.0, comm)?;

            let term1 = pos_output.mul(Operand::Shared(&one_minus_ltz), beaver, comm)?;
            let term2 = one_minus_pos_output.mul(Operand::Shared(&ltz_wide), beaver, comm)?;
            term1.add(&term2)
        }
    }
}

/// Hyperbolic tangent.
///
/// `reciprocal` method: `tanh(x) = 2*sigmoid(2x) - 1`.
/// `chebyshev` method: sums precomputed odd-degree Chebyshev polynomials
/// fit to the true `tanh` on `[-1, 1]`, then saturates outside that range
/// (hard-tanh). `sigmoid_tanh_terms` must be even and `>= 6`.
pub fn tanh(
    x: &Ast,
    beaver: &mut dyn BeaverSource,
    comparator: &mut dyn Comparator,
    comm: &mut dyn Communicator,
) -> Result<Ast> {
    let cfg = config::current();
    match cfg.sigmoid_tanh_method {
        SigmoidTanhMethod::Reciprocal => {
            let two_x = x.mul(Operand::PublicInt(2), beaver, comm)?;
            let s = sigmoid(&two_x, beaver, comparator, comm)?;
            s.mul(Operand::PublicInt(2), beaver, comm)?.sub_public_scalar(1.0, comm)
        }
        SigmoidTanhMethod::Chebyshev => {
            let terms = cfg.sigmoid_tanh_terms;
            if terms % 2 != 0 || terms < 6 {
                return Err(MpcError::InvalidConfiguration(format!(
                    "sigmoid_tanh_terms must be even and >= 6, got {terms}"
                )));
            }
            let coeffs = tanh_chebyshev_coeffs(terms);
            let polys = chebyshev_odd_polynomials(x, terms, beaver, comm)?;

            let mut acc = polys[0].mul_public_scalar(coeffs[0], beaver, comm)?;
            for (poly, &c) in polys[1..].iter().zip(&coeffs[1..]) {
                let term = poly.mul_public_scalar(c, beaver, comm)?;
                acc = acc.add(&term)?;
            }
            hard_tanh(&acc, beaver, comparator, comm)
        }
    }
}

/// Evaluates odd-degree Chebyshev polynomials `P_1, P_3, ..., P_{terms-1}`
/// at `x`, via the recurrence `P_n = (4x^2 - 2) P_{n-1} - P_{n-2}`
/// starting from `P_1 = x`, `P_3 = (4x^2 - 3) x`.
fn chebyshev_odd_polynomials(
    x: &Ast,
    terms: u32,
    beaver: &mut dyn BeaverSource,
    comm: &mut dyn Communicator,
) -> Result<Vec<Ast>> {
    let half = (terms / 2) as usize;
    let mut polys = Vec::with_capacity(half);
    polys.push(x.shallow_copy());
    if half == 1 {
        return Ok(polys);
    }

    let x2 = x.square(beaver, comm)?;
    let four_x2_minus_2 = x2.mul_public_scalar(4.0, beaver, comm)?.sub_public_scalar(2.0, comm)?;
    let four_x2_minus_3 = four_x2_minus_2.sub_public_scalar(1.0, comm)?;
    let p3 = four_x2_minus_3.mul(Operand::Shared(x), beaver, comm)?;
    polys.push(p3);

    for _ in 2..half {
        let prev1 = polys[polys.len() - 1].shallow_copy();
        let prev2 = polys[polys.len() - 2].shallow_copy();
        let scaled_prev1 = four_x2_minus_2.mul(Operand::Shared(&prev1), beaver, comm)?;
        let next = scaled_prev1.sub(&prev2)?;
        polys.push(next);
    }
    Ok(polys)
}

/// Clamps `x` to `[-1, 1]`, via two comparisons and a single interactive
/// multiply: the comparator's bits are lifted to the ambient scale so
/// the out-of-range indicators can be added in directly as the exact
/// +-1 saturation contribution, leaving only the in-range blend
/// (`x * inside`) as an interactive operation.
fn hard_tanh(
    x: &Ast,
    beaver: &mut dyn BeaverSource,
    comparator: &mut dyn Comparator,
    comm: &mut dyn Communicator,
) -> Result<Ast> {
    let precision = Some(x.encoder().precision_bits());

    let below_neg1 = Ast::from_shares(comparator.ltz(x.add_public_scalar(1.0, comm)?.share(), comm), Some(0))
        .rescale_to(x.encoder());
    let above_pos1 = Ast::from_shares(
        comparator.ltz(x.sub_public_scalar(1.0, comm)?.neg().share(), comm),
        Some(0),
    )
    .rescale_to(x.encoder());

    let one = Ast::from_public(1.0, x.shape().to_vec(), precision, comm)?;
    let inside = one.sub(&below_neg1)?.sub(&above_pos1)?;

    let clamped_middle = x.mul(Operand::Shared(&inside), beaver, comm)?;
    clamped_middle.add(&above_pos1)?.sub(&below_neg1)
}

/// Fits a degree-`(n-1)` Chebyshev approximation to `f` on `[-domain,
/// domain]` via Chebyshev-Gauss quadrature (Numerical Recipes §5.8,
/// "chebft"). A pure local/public computation — the coefficients are
/// compile-time-unknown constants every party can derive identically,
/// never touching a share.
fn chebyshev_series(f: impl Fn(f64) -> f64, domain: f64, n: usize) -> Vec<f64> {
    use std::f64::consts::PI;
    let fvals: Vec<f64> = (0..n)
        .map(|k| {
            let y = (PI * (k as f64 + 0.5) / n as f64).cos();
            f(y * domain)
        })
        .collect();
    (0..n)
        .map(|j| {
            let sum: f64 = fvals
                .iter()
                .enumerate()
                .map(|(k, &fv)| fv * (PI * j as f64 * (k as f64 + 0.5) / n as f64).cos())
                .sum();
            sum * 2.0 / n as f64
        })
        .collect()
}

/// The odd-indexed coefficients (`c_1, c_3, ..., c_{terms-1}`) of the
/// degree-`terms` Chebyshev fit to `tanh` on `[-1, 1]` — `tanh` is odd,
/// so its even-indexed coefficients are ~0 and the original drops them.
fn tanh_chebyshev_coeffs(terms: u32) -> Vec<f64> {
    chebyshev_series(f64::tanh, 1.0, terms as usize)
        .into_iter()
        .skip(1)
        .step_by(2)
        .collect()
}

/// Error function via its Taylor series around 0:
/// `erf(x) ~= (2/sqrt(pi)) * sum_{n=0}^{N} (-1)^n x^(2n+1) / (n! (2n+1))`,
/// `N = erf_iterations`. Accurate for `|x| <~ 2`; diverges for larger
/// inputs (no domain check — caller's responsibility per §7).
pub fn erf(x: &Ast, beaver: &mut dyn BeaverSource, comm: &mut dyn Communicator) -> Result<Ast> {
    let cfg = config::current();
    let x2 = x.square(beaver, comm)?;
    let mut power = x.shallow_copy();
    let mut acc = x.shallow_copy();
    let mut factorial = 1.0f64;
    for n in 1..=cfg.erf_iterations {
        power = power.mul(Operand::Shared(&x2), beaver, comm)?;
        factorial *= n as f64;
        let sign = if n % 2 == 1 { -1.0 } else { 1.0 };
        let multiplier = sign / (factorial * (2.0 * n as f64 + 1.0));
        let term = power.mul_public_scalar(multiplier, beaver, comm)?;
        acc = acc.add(&term)?;
    }
    acc.mul_public_scalar(2.0 / std::f64::consts::PI.sqrt(), beaver, comm)
}

/// Numerically stable softmax: subtract the max along `dim`, exponentiate,
/// multiply by the reciprocal of the sum. The 0-dimensional and
/// size-1-along-`dim` cases short-circuit to a tensor of (encoded) ones.
pub fn softmax(
    x: &Ast,
    dim: usize,
    beaver: &mut dyn BeaverSource,
    comparator: &mut dyn Comparator,
    comm: &mut dyn Communicator,
) -> Result<Ast> {
    let precision = Some(x.encoder().precision_bits());
    if x.dim() == 0 {
        return Ast::from_public(1.0, vec![], precision, comm);
    }
    if x.size(dim) == 1 {
        return Ast::from_public(1.0, x.shape().to_vec(), precision, comm);
    }

    let max_val = x.max_dim(dim, true, comparator, beaver, comm)?;
    let logits = x.sub(&broadcast_axis_ast(&max_val, dim, x.size(dim)))?;
    let numerator = exp(&logits, beaver, comm)?;

    let mut scoped = config::current();
    scoped.reciprocal_all_pos = true;
    let inv_denominator = {
        let denom = numerator.sum(Some(dim), true);
        let _scope = config::push_scope(scoped);
        reciprocal(&denom, false, beaver, comparator, comm)?
    };
    numerator.mul(Operand::Shared(&broadcast_axis_ast(&inv_denominator, dim, x.size(dim))), beaver, comm)
}

/// `log(softmax(x, dim))`, computed directly as `logits -
/// log(sum(exp(logits)))` rather than composing [`softmax`] and [`log`],
/// which is both slower and less numerically stable. Same 0-dim/size-1
/// short circuits as [`softmax`], returning zero tensors instead of ones.
pub fn log_softmax(
    x: &Ast,
    dim: usize,
    beaver: &mut dyn BeaverSource,
    comparator: &mut dyn Comparator,
    comm: &mut dyn Communicator,
) -> Result<Ast> {
    let precision = Some(x.encoder().precision_bits());
    if x.dim() == 0 {
        return Ast::from_public(0.0, vec![], precision, comm);
    }
    if x.size(dim) == 1 {
        return Ast::from_public(0.0, x.shape().to_vec(), precision, comm);
    }

    let max_val = x.max_dim(dim, true, comparator, beaver, comm)?;
    let logits = x.sub(&broadcast_axis_ast(&max_val, dim, x.size(dim)))?;
    let exp_logits = exp(&logits, beaver, comm)?;
    let sum_exp = exp_logits.sum(Some(dim), true);
    let log_sum = log(&sum_exp, false, beaver, comparator, comm)?;
    logits.sub(&broadcast_axis_ast(&log_sum, dim, x.size(dim)))
}
