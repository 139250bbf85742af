//! Growing-concatenation network.
//!
//! Block `k` sees the original input plus the outputs of every earlier block:
//!
//! ```text
//! width_0     = layer_sizes[0]
//! width_{k+1} = width_k + layer_sizes[k+1]
//! ```
//!
//! The forward pass keeps only the last `layer_sizes[-1]` features of the
//! final concatenation and applies a softmax over them.

use candle_core::{Result, Tensor, D};
use candle_nn::{Module, VarBuilder};

use wann_common::{ActivationFn, WannConfig};

use crate::block::ConcatBlock;
use crate::discretize::{discretize_all, Discretizable};
use crate::error::{WannError, WannResult};
use crate::linear::TernaryLinear;
use crate::shared::SharedWeight;

/// Flattened weights of every ternary linear layer, in block order.
#[derive(Debug, Clone)]
pub struct WeightSnapshot {
    /// Ternary projection of each weight ("effective weights").
    pub effective: Tensor,
    /// Continuous weight values ("actual weights").
    pub actual: Tensor,
}

/// Weight-agnostic network of [`ConcatBlock`]s sharing one [`SharedWeight`].
pub struct WannNetwork {
    blocks: Vec<ConcatBlock>,
    layer_sizes: Vec<usize>,
    shared: SharedWeight,
}

impl WannNetwork {
    /// Build with the default activation menu. Weights are named
    /// `blocks.{k}.linear.weight` and `blocks.{k}.activation.weight`.
    pub fn new(shared: SharedWeight, layer_sizes: &[usize], vb: VarBuilder) -> WannResult<Self> {
        Self::from_config(&WannConfig::with_layer_sizes(layer_sizes), shared, vb)
    }

    /// Build from a config; fails before allocating anything if it is invalid.
    pub fn from_config(
        config: &WannConfig,
        shared: SharedWeight,
        vb: VarBuilder,
    ) -> WannResult<Self> {
        config.validate().map_err(WannError::invalid_config)?;
        let blocks = build_blocks(&config.layer_sizes, &config.activations, &shared, &vb)?;
        tracing::debug!(
            layer_sizes = ?config.layer_sizes,
            blocks = blocks.len(),
            "Built concatenation network"
        );
        Ok(Self {
            blocks,
            layer_sizes: config.layer_sizes.clone(),
            shared,
        })
    }

    /// Declared input width.
    pub fn n_in(&self) -> usize {
        self.layer_sizes[0]
    }

    /// Declared output width.
    pub fn n_out(&self) -> usize {
        self.layer_sizes[self.layer_sizes.len() - 1]
    }

    pub fn layer_sizes(&self) -> &[usize] {
        &self.layer_sizes
    }

    pub fn blocks(&self) -> &[ConcatBlock] {
        &self.blocks
    }

    pub fn shared_weight(&self) -> &SharedWeight {
        &self.shared
    }

    /// Running feature width after the input and after each block.
    pub fn feature_widths(&self) -> Vec<usize> {
        self.layer_sizes
            .iter()
            .scan(0usize, |acc, &s| {
                *acc += s;
                Some(*acc)
            })
            .collect()
    }

    /// Run every block and return the full concatenated features.
    pub fn forward_features(&self, x: &Tensor) -> Result<Tensor> {
        let mut h = x.clone();
        for block in &self.blocks {
            h = block.forward(&h)?;
        }
        Ok(h)
    }

    /// Softmax over the last `n_out` features of the final concatenation.
    pub fn forward(&self, x: &Tensor) -> Result<Tensor> {
        let features = self.forward_features(x)?;
        let width = features.dim(D::Minus1)?;
        let n_out = self.n_out();
        let logits = features.narrow(D::Minus1, width - n_out, n_out)?;
        candle_nn::ops::softmax(&logits, D::Minus1)
    }

    // ── Lifecycle ───────────────────────────────────────────────────────────

    /// Every weight-bearing layer of the network, linear and activation alike.
    pub fn layers(&self) -> Vec<&dyn Discretizable> {
        self.blocks.iter().flat_map(|b| b.layers()).collect()
    }

    pub fn ternary_layers(&self) -> impl Iterator<Item = &TernaryLinear> {
        self.blocks.iter().map(|b| b.linear())
    }

    /// Snapshot and overwrite every weight with its effective value.
    ///
    /// All or nothing: if a layer fails, the layers before it are restored.
    pub fn discretize(&self) -> Result<()> {
        discretize_all(&self.layers())
    }

    /// Undo [`Self::discretize`]. Only meaningful after a `discretize`/`store`.
    pub fn restore(&self) -> Result<()> {
        for layer in self.layers() {
            layer.restore()?;
        }
        Ok(())
    }

    /// Project every continuous weight into its valid range (call after each
    /// optimiser step).
    pub fn clip(&self) -> Result<()> {
        for layer in self.layers() {
            layer.clip()?;
        }
        Ok(())
    }

    /// Re-sample every weight from its layer's init distribution.
    pub fn init_weights(&self) -> Result<()> {
        for layer in self.layers() {
            layer.init_weight()?;
        }
        Ok(())
    }

    // ── Diagnostics ─────────────────────────────────────────────────────────

    /// Effective and actual ternary-layer weights, flattened and concatenated.
    pub fn weight_snapshot(&self) -> Result<WeightSnapshot> {
        let mut effective = Vec::with_capacity(self.blocks.len());
        let mut actual = Vec::with_capacity(self.blocks.len());
        for layer in self.ternary_layers() {
            effective.push(layer.effective_weight()?.flatten_all()?);
            actual.push(layer.weight().as_tensor().detach().flatten_all()?);
        }
        Ok(WeightSnapshot {
            effective: Tensor::cat(&effective, 0)?,
            actual: Tensor::cat(&actual, 0)?,
        })
    }

    /// Summed {-1, 0, +1} counts over every ternary layer.
    pub fn weight_distribution(&self) -> Result<(u64, u64, u64)> {
        let mut total = (0u64, 0u64, 0u64);
        for layer in self.ternary_layers() {
            let (neg, zero, pos) = layer.debug_weight_distribution()?;
            total = (total.0 + neg, total.1 + zero, total.2 + pos);
        }
        Ok(total)
    }

    /// Per block, the activation each channel selects under the effective weight.
    pub fn activation_choices(&self) -> Result<Vec<Vec<ActivationFn>>> {
        self.blocks
            .iter()
            .map(|b| b.activation().selected_functions())
            .collect()
    }

    /// Number of scalar weights (linear, mixture).
    pub fn num_params(&self) -> (usize, usize) {
        self.blocks.iter().fold((0, 0), |(lin, mix), b| {
            (
                lin + b.n_in() * b.n_out(),
                mix + b.activation().n_funcs() * b.n_out(),
            )
        })
    }
}

impl Module for WannNetwork {
    fn forward(&self, x: &Tensor) -> Result<Tensor> {
        self.forward(x)
    }
}

fn build_blocks(
    layer_sizes: &[usize],
    funcs: &[ActivationFn],
    shared: &SharedWeight,
    vb: &VarBuilder,
) -> Result<Vec<ConcatBlock>> {
    let mut blocks = Vec::with_capacity(layer_sizes.len() - 1);
    let mut n_in = layer_sizes[0];
    for (k, &n_out) in layer_sizes[1..].iter().enumerate() {
        let vb = vb.pp(format!("blocks.{k}"));
        blocks.push(ConcatBlock::new(n_in, n_out, funcs, shared.clone(), vb)?);
        n_in += n_out;
    }
    Ok(blocks)
}

// ── Tests ───────────────────────────────────────────────────────────────────
