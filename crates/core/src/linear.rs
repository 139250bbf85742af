//! Ternary linear layer: bias-free matmul whose effective weight lives in {-1, 0, +1}.
//!
//! Forward always multiplies by the continuous weight. The ternary form only
//! enters the computation when the network is discretised, which writes it
//! into the weight (see [`crate::discretize`]).

use candle_core::{Result, Tensor, Var};
use candle_nn::{Init, Module, VarBuilder};

use crate::discretize::Discretizable;
use crate::quantize::{matmul_reshape, ternary_distribution, ternary_effective};

/// Standard deviation of the ternary init, independent of fan-in/fan-out.
///
/// P(|w| > 0.4) ≈ 0.1% at σ = 0.12, so a fresh layer is almost entirely in
/// the ternary zero band.
pub const TERNARY_INIT_STD: f64 = 0.12;

const TERNARY_INIT: Init = Init::Randn {
    mean: 0.,
    stdev: TERNARY_INIT_STD,
};

/// Linear transform `y = x Wᵀ` with a `[out_dim, in_dim]` continuous weight.
pub struct TernaryLinear {
    weight: Var,
    stored: Var,
    in_dim: usize,
    out_dim: usize,
}

impl TernaryLinear {
    /// Allocate the weight through `vb` under the name `"weight"`.
    ///
    /// With a `VarMap`-backed builder the returned layer shares storage with
    /// the map, so optimiser updates and in-place discretisation see each other.
    pub fn new(in_dim: usize, out_dim: usize, vb: VarBuilder) -> Result<Self> {
        let ws = vb.get_with_hints((out_dim, in_dim), "weight", TERNARY_INIT)?;
        Self::from_weight(&ws)
    }

    /// Wrap an existing `[out_dim, in_dim]` weight. A non-variable tensor is
    /// copied into a fresh [`Var`].
    pub fn from_weight(weight: &Tensor) -> Result<Self> {
        let (out_dim, in_dim) = weight.dims2()?;
        let weight = Var::from_tensor(weight)?;
        let stored = Var::zeros((out_dim, in_dim), weight.dtype(), weight.device())?;
        Ok(Self {
            weight,
            stored,
            in_dim,
            out_dim,
        })
    }

    pub fn in_dim(&self) -> usize {
        self.in_dim
    }

    pub fn out_dim(&self) -> usize {
        self.out_dim
    }

    /// Debug: count {-1, 0, +1} in the effective weight.
    pub fn debug_weight_distribution(&self) -> Result<(u64, u64, u64)> {
        ternary_distribution(self.weight.as_tensor())
    }

    pub fn forward(&self, x: &Tensor) -> Result<Tensor> {
        let w_t = self.weight.as_tensor().t()?;
        matmul_reshape(x, &w_t)
    }
}

impl Module for TernaryLinear {
    fn forward(&self, x: &Tensor) -> Result<Tensor> {
        self.forward(x)
    }
}

impl Discretizable for TernaryLinear {
    fn weight(&self) -> &Var {
        &self.weight
    }

    fn stored_weight(&self) -> &Var {
        &self.stored
    }

    fn effective_weight(&self) -> Result<Tensor> {
        ternary_effective(self.weight.as_tensor())
    }

    fn init_weight(&self) -> Result<()> {
        let fresh = Tensor::randn(
            0f32,
            TERNARY_INIT_STD as f32,
            (self.out_dim, self.in_dim),
            self.weight.device(),
        )?
        .to_dtype(self.weight.dtype())?;
        self.weight.set(&fresh)
    }
}

// ── Tests ───────────────────────────────────────────────────────────────────
