//! Approximation configuration (§4.5): the knobs the approximation
//! library reads to pick iteration counts and algorithm variants.
//!
//! Uses a `ConfigManager`-style scoped-override pattern: a thread-local
//! stack of `ApproxConfig` values, with the
//! active configuration always the top of the stack and a guard that
//! pops it back off on drop, so a caller can locally tighten precision
//! (or swap methods) for one call without disturbing anyone else's
//! config.

use std::cell::RefCell;

use serde::{Deserialize, Serialize};

/// Which iterative method `reciprocal` uses.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ReciprocalMethod {
    /// Newton-Raphson refinement from an initial guess.
    NewtonRaphson,
    /// `exp(-log(x))`, trading iteration count for two other primitives.
    Log,
}

/// Which method `sigmoid`/`tanh` use.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SigmoidTanhMethod {
    /// Built from `reciprocal`.
    Reciprocal,
    /// Chebyshev polynomial approximation over a bounded domain.
    Chebyshev,
}

/// All tunables the approximation library consults (§4.5).
///
/// Derives `Serialize`/`Deserialize` so a process can ship its active
/// configuration to the others at startup (every party must agree on
/// these knobs for the lockstep protocol to stay in sync, §5).
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ApproxConfig {
    pub exp_iterations: u32,
    pub reciprocal_method: ReciprocalMethod,
    pub reciprocal_nr_iters: u32,
    pub reciprocal_log_iters: u32,
    pub reciprocal_all_pos: bool,
    pub reciprocal_initial: Option<f64>,
    pub sqrt_nr_iters: u32,
    pub sqrt_nr_initial: Option<f64>,
    pub sigmoid_tanh_method: SigmoidTanhMethod,
    pub sigmoid_tanh_terms: u32,
    pub log_iterations: u32,
    pub log_exp_iterations: u32,
    pub log_order: u32,
    pub trig_iterations: u32,
    pub erf_iterations: u32,
}

impl Default for ApproxConfig {
    fn default() -> Self {
        Self {
            exp_iterations: 8,
            reciprocal_method: ReciprocalMethod::NewtonRaphson,
            reciprocal_nr_iters: 10,
            reciprocal_log_iters: 1,
            reciprocal_all_pos: false,
            reciprocal_initial: None,
            sqrt_nr_iters: 3,
            sqrt_nr_initial: None,
            sigmoid_tanh_method: SigmoidTanhMethod::Reciprocal,
            sigmoid_tanh_terms: 32,
            log_iterations: 2,
            log_exp_iterations: 8,
            log_order: 8,
            trig_iterations: 10,
            erf_iterations: 8,
        }
    }
}

thread_local! {
    static CONFIG_STACK: RefCell<Vec<ApproxConfig>> = RefCell::new(vec![ApproxConfig::default()]);
}

/// Returns the currently active configuration for this thread.
pub fn current() -> ApproxConfig {
    CONFIG_STACK.with(|stack| *stack.borrow().last().expect("config stack is never empty"))
}

/// Pushes `config` as the active configuration until the returned guard
/// is dropped, at which point the previous configuration is restored.
///
/// ```
/// # use mpc_tensor::config::{ApproxConfig, push_scope};
/// let mut cfg = ApproxConfig::default();
/// cfg.exp_iterations = 12;
/// {
///     let _scope = push_scope(cfg);
///     assert_eq!(mpc_tensor::config::current().exp_iterations, 12);
/// }
/// assert_eq!(mpc_tensor::config::current().exp_iterations, 8);
/// ```
pub fn push_scope(config: ApproxConfig) -> ConfigScope {
    CONFIG_STACK.with(|stack| stack.borrow_mut().push(config));
    ConfigScope { _private: () }
}

/// RAII guard returned by [`push_scope`]. Restores the prior
/// configuration when dropped.
pub struct ConfigScope {
    _private: (),
}

impl Drop for ConfigScope {
    fn drop(&mut self) {
        CONFIG_STACK.with(|stack| {
            let mut stack = stack.borrow_mut();
            stack.pop();
            debug_assert!(!stack.is_empty(), "config stack underflow");
        });
    }
}
