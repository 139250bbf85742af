//! # wann-core — Discretizable Layers and the Concatenation Network
//!
//! Every compute primitive of the weight-agnostic ternary network lives here:
//!
//! | Module | Contents |
//! |--------|----------|
//! | [`quantize`] | ternary projection, arg-max one-hot, `matmul_reshape` |
//! | [`discretize`] | the [`Discretizable`] capability (store / discretize / restore / clip) |
//! | [`linear`] | [`TernaryLinear`] |
//! | [`activation`] | [`MultiActivation`] and the activation menu |
//! | [`shared`] | [`SharedWeight`], the externally driven scalar |
//! | [`block`] | [`ConcatBlock`] |
//! | [`model`] | [`WannNetwork`], [`WeightSnapshot`] |
//!
//! ## Design principles
//!
//! 1. **candle all the way down.** Weights are `candle_core::Var`s, so the
//!    network plugs into `candle_nn` optimisers through a `VarMap`.
//! 2. **No custom gradients.** Discretisation writes the effective value into
//!    the trainable weight; gradients flow through whatever value is there.
//! 3. **Deterministic discretisation.** Same weights = same effective weights,
//!    including arg-max ties (lowest menu index wins).

pub mod activation;
pub mod block;
pub mod discretize;
pub mod error;
pub mod linear;
pub mod model;
pub mod quantize;
pub mod shared;

// ── Public re-exports ───────────────────────────────────────────────────────

pub use activation::{apply_activation, MultiActivation};
pub use block::ConcatBlock;
pub use discretize::{discretize_all, Discretizable};
pub use error::{WannError, WannResult};
pub use linear::{TernaryLinear, TERNARY_INIT_STD};
pub use model::{WannNetwork, WeightSnapshot};
pub use quantize::{one_hot_argmax, ternary_effective, TERNARY_THRESHOLD};
pub use shared::SharedWeight;
