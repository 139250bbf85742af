//! Multi-activation layer: a per-channel weighted mixture of elementwise functions.
//!
//! | Activation | Formula |
//! |------------|---------|
//! | relu       | max(0, x) |
//! | sigmoid    | 1 / (1 + e⁻ˣ) |
//! | tanh       | tanh(x) |
//! | gaussian   | exp(-x² / 2) |
//! | step       | 1 if x > 0 else 0 |
//! | identity, inverse, squared, abs, cos, sin | optional menu entries |
//!
//! The mixture weight has shape `[n_funcs, n_out]`: row `i` holds the
//! per-channel coefficient of menu entry `i`. The effective weight collapses
//! every column to a one-hot, selecting a single function per channel.

use candle_core::{bail, Result, Tensor, Var};
use candle_nn::{Init, Module, VarBuilder};

use wann_common::ActivationFn;

use crate::discretize::Discretizable;
use crate::quantize::{argmax_rows, one_hot_argmax};

const MIXTURE_INIT: Init = Init::Uniform { lo: 0., up: 1. };

/// Apply one menu entry elementwise.
pub fn apply_activation(act: ActivationFn, x: &Tensor) -> Result<Tensor> {
    match act {
        ActivationFn::Relu => x.relu(),
        ActivationFn::Sigmoid => candle_nn::ops::sigmoid(x),
        ActivationFn::Tanh => x.tanh(),
        ActivationFn::Gaussian => x.sqr()?.affine(-0.5, 0.0)?.exp(),
        ActivationFn::Step => x.gt(0.0)?.to_dtype(x.dtype()),
        ActivationFn::Identity => Ok(x.clone()),
        ActivationFn::Inverse => x.neg(),
        ActivationFn::Squared => x.sqr(),
        ActivationFn::Abs => x.abs(),
        ActivationFn::Cos => x.cos(),
        ActivationFn::Sin => x.sin(),
    }
}

/// Weighted sum of activation functions, one coefficient per (function, channel).
pub struct MultiActivation {
    weight: Var,
    stored: Var,
    funcs: Vec<ActivationFn>,
    n_out: usize,
}

impl MultiActivation {
    /// Allocate the `[funcs.len(), n_out]` mixture weight through `vb` under `"weight"`.
    pub fn new(n_out: usize, funcs: &[ActivationFn], vb: VarBuilder) -> Result<Self> {
        if funcs.is_empty() {
            bail!("multi-activation needs at least one activation function")
        }
        let ws = vb.get_with_hints((funcs.len(), n_out), "weight", MIXTURE_INIT)?;
        Self::from_weight(&ws, funcs)
    }

    /// Wrap an existing `[funcs.len(), n_out]` mixture weight.
    pub fn from_weight(weight: &Tensor, funcs: &[ActivationFn]) -> Result<Self> {
        let (n_funcs, n_out) = weight.dims2()?;
        if n_funcs != funcs.len() {
            bail!(
                "mixture weight has {n_funcs} rows but the menu has {} functions",
                funcs.len()
            )
        }
        let weight = Var::from_tensor(weight)?;
        let stored = Var::zeros((n_funcs, n_out), weight.dtype(), weight.device())?;
        Ok(Self {
            weight,
            stored,
            funcs: funcs.to_vec(),
            n_out,
        })
    }

    pub fn n_funcs(&self) -> usize {
        self.funcs.len()
    }

    pub fn n_out(&self) -> usize {
        self.n_out
    }

    pub fn funcs(&self) -> &[ActivationFn] {
        &self.funcs
    }

    /// The function each output channel selects under the effective weight.
    pub fn selected_functions(&self) -> Result<Vec<ActivationFn>> {
        Ok(argmax_rows(self.weight.as_tensor())?
            .into_iter()
            .map(|i| self.funcs[i])
            .collect())
    }

    /// Output has the shape of `x`; its last dim must be `n_out`.
    pub fn forward(&self, x: &Tensor) -> Result<Tensor> {
        let coefficients = self.weight.as_tensor();
        let mut out = x.zeros_like()?;
        for (i, &act) in self.funcs.iter().enumerate() {
            let row = coefficients.get(i)?;
            let term = apply_activation(act, x)?.broadcast_mul(&row)?;
            out = (out + term)?;
        }
        Ok(out)
    }
}

impl Module for MultiActivation {
    fn forward(&self, x: &Tensor) -> Result<Tensor> {
        self.forward(x)
    }
}

impl Discretizable for MultiActivation {
    fn weight(&self) -> &Var {
        &self.weight
    }

    fn stored_weight(&self) -> &Var {
        &self.stored
    }

    fn effective_weight(&self) -> Result<Tensor> {
        one_hot_argmax(self.weight.as_tensor())
    }

    fn init_weight(&self) -> Result<()> {
        let fresh = Tensor::rand(0f32, 1f32, (self.n_funcs(), self.n_out), self.weight.device())?
            .to_dtype(self.weight.dtype())?;
        self.weight.set(&fresh)
    }

    /// Rescale every channel's coefficient column to unit L2 norm.
    ///
    /// An all-zero column divides by zero; that NaN is left to the caller.
    fn clip(&self) -> Result<()> {
        let w = self.weight.as_tensor();
        let norm = w.sqr()?.sum_keepdim(0)?.sqrt()?;
        let normalised = w.broadcast_div(&norm)?;
        self.weight.set(&normalised)
    }
}

// ── Tests ───────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use candle_core::{DType, Device};
    use candle_nn::VarMap;
    use wann_common::DEFAULT_MENU;

    fn close(a: f32, b: f32) -> bool {
        (a - b).abs() < 1e-5
    }

    fn single(act: ActivationFn, v: f32) -> f32 {
        let x = Tensor::new(&[v], &Device::Cpu).unwrap();
        apply_activation(act, &x).unwrap().to_vec1::<f32>().unwrap()[0]
    }

    #[test]
    fn activation_values() {
        assert!(close(single(ActivationFn::Relu, -1.0), 0.0));
        assert!(close(single(ActivationFn::Relu, 2.0), 2.0));
        assert!(close(single(ActivationFn::Sigmoid, 0.0), 0.5));
        assert!(close(single(ActivationFn::Tanh, 0.0), 0.0));
        assert!(close(single(ActivationFn::Gaussian, 0.0), 1.0));
        assert!(close(single(ActivationFn::Gaussian, 2.0), (-2.0f32).exp()));
        assert!(close(single(ActivationFn::Step, 0.0), 0.0));
        assert!(close(single(ActivationFn::Step, 0.1), 1.0));
        assert!(close(single(ActivationFn::Step, -3.0), 0.0));
        assert!(close(single(ActivationFn::Inverse, 1.5), -1.5));
        assert!(close(single(ActivationFn::Abs, -1.5), 1.5));
    }

    #[test]
    fn forward_mixes_per_channel() {
        // Channel 0: pure relu. Channel 1: 2 × step + 1 × gaussian.
        let w = Tensor::new(
            &[
                [1f32, 0.0],
                [0.0, 0.0],
                [0.0, 0.0],
                [0.0, 1.0],
                [0.0, 2.0],
            ],
            &Device::Cpu,
        )
        .unwrap();
        let m = MultiActivation::from_weight(&w, &DEFAULT_MENU).unwrap();
        let x = Tensor::new(&[[-1f32, 0.0], [3.0, 1.0]], &Device::Cpu).unwrap();
        let y: Vec<Vec<f32>> = m.forward(&x).unwrap().to_vec2().unwrap();
        assert!(close(y[0][0], 0.0));
        assert!(close(y[0][1], 1.0));
        assert!(close(y[1][0], 3.0));
        assert!(close(y[1][1], 2.0 + (-0.5f32).exp()));
    }

    #[test]
    fn forward_keeps_input_shape() {
        let varmap = VarMap::new();
        let vb = VarBuilder::from_varmap(&varmap, DType::F32, &Device::Cpu);
        let m = MultiActivation::new(3, &DEFAULT_MENU, vb).unwrap();
        let x = Tensor::ones((2, 4, 3), DType::F32, &Device::Cpu).unwrap();
        assert_eq!(m.forward(&x).unwrap().dims(), &[2, 4, 3]);
    }

    #[test]
    fn effective_weight_is_one_hot_per_channel() {
        let w = Tensor::new(
            &[
                [0.1f32, 0.9, 0.3],
                [0.8, 0.2, 0.3],
                [0.1, 0.2, 0.1],
                [0.1, 0.2, 0.1],
                [0.1, 0.2, 0.1],
            ],
            &Device::Cpu,
        )
        .unwrap();
        let m = MultiActivation::from_weight(&w, &DEFAULT_MENU).unwrap();
        let e: Vec<Vec<f32>> = m.effective_weight().unwrap().to_vec2().unwrap();
        assert_eq!(e.len(), 5);
        for col in 0..3 {
            let ones: f32 = e.iter().map(|row| row[col]).sum();
            assert_eq!(ones, 1.0);
        }
        assert_eq!(e[1][0], 1.0);
        assert_eq!(e[0][1], 1.0);
        // Tie between relu and sigmoid rows → first wins.
        assert_eq!(e[0][2], 1.0);
        assert_eq!(
            m.selected_functions().unwrap(),
            vec![ActivationFn::Sigmoid, ActivationFn::Relu, ActivationFn::Relu]
        );
    }

    #[test]
    fn clip_normalises_columns_and_is_idempotent() {
        let w = Tensor::new(&[[3f32, 0.0], [4.0, 2.0]], &Device::Cpu).unwrap();
        let m =
            MultiActivation::from_weight(&w, &[ActivationFn::Relu, ActivationFn::Tanh]).unwrap();
        m.clip().unwrap();
        let once: Vec<Vec<f32>> = m.weight().as_tensor().to_vec2().unwrap();
        assert!(close(once[0][0], 0.6) && close(once[1][0], 0.8));
        assert!(close(once[0][1], 0.0) && close(once[1][1], 1.0));

        m.clip().unwrap();
        let twice: Vec<Vec<f32>> = m.weight().as_tensor().to_vec2().unwrap();
        for (a, b) in once.iter().flatten().zip(twice.iter().flatten()) {
            assert!(close(*a, *b));
        }
    }

    #[test]
    fn discretize_then_restore_round_trips() {
        let w = Tensor::new(&[[0.3f32, 0.7], [0.6, 0.1]], &Device::Cpu).unwrap();
        let m = MultiActivation::from_weight(&w, &[ActivationFn::Relu, ActivationFn::Step])
            .unwrap();
        m.discretize().unwrap();
        let d: Vec<Vec<f32>> = m.weight().as_tensor().to_vec2().unwrap();
        assert_eq!(d, vec![vec![0.0, 1.0], vec![1.0, 0.0]]);
        m.restore().unwrap();
        let r: Vec<Vec<f32>> = m.weight().as_tensor().to_vec2().unwrap();
        assert_eq!(r, vec![vec![0.3, 0.7], vec![0.6, 0.1]]);
    }

    #[test]
    fn init_is_uniform_unit_interval() {
        let varmap = VarMap::new();
        let vb = VarBuilder::from_varmap(&varmap, DType::F32, &Device::Cpu);
        let m = MultiActivation::new(50, &DEFAULT_MENU, vb).unwrap();
        m.init_weight().unwrap();
        let flat: Vec<f32> = m.weight().as_tensor().flatten_all().unwrap().to_vec1().unwrap();
        assert_eq!(flat.len(), 250);
        assert!(flat.iter().all(|&v| (0.0..1.0).contains(&v)));
    }

    #[test]
    fn rejects_menu_mismatch() {
        let w = Tensor::zeros((3, 2), DType::F32, &Device::Cpu).unwrap();
        assert!(MultiActivation::from_weight(&w, &DEFAULT_MENU).is_err());
        let varmap = VarMap::new();
        let vb = VarBuilder::from_varmap(&varmap, DType::F32, &Device::Cpu);
        assert!(MultiActivation::new(2, &[], vb).is_err());
    }
}
