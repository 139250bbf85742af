//! Concatenation block: ternary linear → shared-weight scale → multi-activation,
//! appended to the running feature vector.

use candle_core::{bail, Result, Tensor, D};
use candle_nn::{Module, VarBuilder};

use wann_common::ActivationFn;

use crate::activation::MultiActivation;
use crate::discretize::Discretizable;
use crate::linear::TernaryLinear;
use crate::shared::SharedWeight;

/// One growth step of the network.
///
/// ```text
/// inner = MultiActivation( TernaryLinear(x) × shared )
/// out   = concat([x, inner], dim = -1)        // width n_in + n_out
/// ```
pub struct ConcatBlock {
    linear: TernaryLinear,
    activation: MultiActivation,
    shared: SharedWeight,
}

impl ConcatBlock {
    /// `vb` should be scoped to the block (e.g. `vb.pp("blocks.0")`).
    pub fn new(
        n_in: usize,
        n_out: usize,
        funcs: &[ActivationFn],
        shared: SharedWeight,
        vb: VarBuilder,
    ) -> Result<Self> {
        let linear = TernaryLinear::new(n_in, n_out, vb.pp("linear"))?;
        let activation = MultiActivation::new(n_out, funcs, vb.pp("activation"))?;
        Ok(Self::from_parts(linear, activation, shared))
    }

    pub fn from_parts(
        linear: TernaryLinear,
        activation: MultiActivation,
        shared: SharedWeight,
    ) -> Self {
        Self {
            linear,
            activation,
            shared,
        }
    }

    pub fn n_in(&self) -> usize {
        self.linear.in_dim()
    }

    pub fn n_out(&self) -> usize {
        self.linear.out_dim()
    }

    pub fn linear(&self) -> &TernaryLinear {
        &self.linear
    }

    pub fn activation(&self) -> &MultiActivation {
        &self.activation
    }

    /// The two weight-bearing layers of this block.
    pub fn layers(&self) -> [&dyn Discretizable; 2] {
        [&self.linear, &self.activation]
    }

    /// Forward pass; output width is `n_in + n_out`.
    ///
    /// With an ensemble shared weight of `K` values the linear output is
    /// scaled along a dedicated leading axis: `x` must be at least 3-D
    /// (`[K or 1, B, .., n_in]`), a size-1 axis is broadcast to `K`. A plain
    /// `[B, n_in]` batch is rejected rather than read as the ensemble axis.
    pub fn forward(&self, x: &Tensor) -> Result<Tensor> {
        let shared = self.shared.tensor();
        if shared.rank() > 0 {
            let k = shared.elem_count();
            if x.rank() < 3 || (x.dim(0)? != k && x.dim(0)? != 1) {
                bail!(
                    "ensemble of {k} shared weights needs input [{k} or 1, batch, .., {}], got {:?}",
                    self.n_in(),
                    x.dims()
                )
            }
        }
        let linear = self.linear.forward(x)?;
        let (scaled, carried) = match shared.rank() {
            0 => (linear.broadcast_mul(&shared)?, x.clone()),
            _ => {
                let mut shape = vec![1usize; linear.rank()];
                shape[0] = shared.elem_count();
                let scaled = linear.broadcast_mul(&shared.reshape(shape)?)?;
                let mut carried_shape = scaled.dims().to_vec();
                if let Some(last) = carried_shape.last_mut() {
                    *last = self.n_in();
                }
                let carried = if x.dims() == carried_shape.as_slice() {
                    x.clone()
                } else {
                    x.broadcast_as(carried_shape)?.contiguous()?
                };
                (scaled, carried)
            }
        };
        let inner = self.activation.forward(&scaled)?;
        Tensor::cat(&[&carried, &inner], D::Minus1)
    }
}

impl Module for ConcatBlock {
    fn forward(&self, x: &Tensor) -> Result<Tensor> {
        self.forward(x)
    }
}

// ── Tests ───────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use candle_core::{DType, Device};
    use wann_common::DEFAULT_MENU;

    /// 2 → 2 block with an identity-like linear and a
    /// 0.5 × sigmoid + 1.0 × gaussian mixture on both channels.
    fn block(shared: &SharedWeight) -> ConcatBlock {
        let dev = Device::Cpu;
        let w = Tensor::new(&[[1f32, 0.0], [0.0, 1.0]], &dev).unwrap();
        let mix = Tensor::new(
            &[
                [0f32, 0.0],
                [0.5, 0.5],
                [0.0, 0.0],
                [1.0, 1.0],
                [0.0, 0.0],
            ],
            &dev,
        )
        .unwrap();
        ConcatBlock::from_parts(
            TernaryLinear::from_weight(&w).unwrap(),
            MultiActivation::from_weight(&mix, &DEFAULT_MENU).unwrap(),
            shared.clone(),
        )
    }

    #[test]
    fn output_concatenates_input() {
        let shared = SharedWeight::new(1.0, &Device::Cpu).unwrap();
        let b = block(&shared);
        let x = Tensor::new(&[[0.3f32, -0.7], [1.0, 2.0], [0.0, 0.0]], &Device::Cpu).unwrap();
        let y = b.forward(&x).unwrap();
        assert_eq!(y.dims(), &[3, 4]);
        let head = y.narrow(1, 0, 2).unwrap().to_vec2::<f32>().unwrap();
        assert_eq!(head, x.to_vec2::<f32>().unwrap());
    }

    #[test]
    fn zero_shared_weight_silences_linear_path() {
        let shared = SharedWeight::new(0.0, &Device::Cpu).unwrap();
        let b = block(&shared);
        let x = Tensor::new(&[[5f32, -3.0]], &Device::Cpu).unwrap();
        let y: Vec<Vec<f32>> = b.forward(&x).unwrap().to_vec2().unwrap();
        // Mixture at 0: 0.5 × sigmoid(0) + 1.0 × gaussian(0) = 1.25
        assert!((y[0][2] - 1.25).abs() < 1e-5);
        assert!((y[0][3] - 1.25).abs() < 1e-5);
    }

    #[test]
    fn shared_weight_is_read_per_forward() {
        let shared = SharedWeight::new(1.0, &Device::Cpu).unwrap();
        let b = block(&shared);
        let x = Tensor::new(&[[1f32, 1.0]], &Device::Cpu).unwrap();
        let a: Vec<Vec<f32>> = b.forward(&x).unwrap().to_vec2().unwrap();
        shared.set(0.0).unwrap();
        let z: Vec<Vec<f32>> = b.forward(&x).unwrap().to_vec2().unwrap();
        assert!((z[0][2] - 1.25).abs() < 1e-5);
        assert!((a[0][2] - z[0][2]).abs() > 1e-3);
    }

    #[test]
    fn scalar_broadcasts_over_extra_leading_dims() {
        let shared = SharedWeight::new(2.0, &Device::Cpu).unwrap();
        let b = block(&shared);
        let x = Tensor::ones((3, 5, 2), DType::F32, &Device::Cpu).unwrap();
        assert_eq!(b.forward(&x).unwrap().dims(), &[3, 5, 4]);
    }

    #[test]
    fn ensemble_adds_leading_axis() {
        let shared = SharedWeight::ensemble(&[0.0, 1.0, 2.0], &Device::Cpu).unwrap();
        let b = block(&shared);
        let x = Tensor::ones((1, 4, 2), DType::F32, &Device::Cpu).unwrap();
        let y = b.forward(&x).unwrap();
        assert_eq!(y.dims(), &[3, 4, 4]);

        // Member 0 uses shared = 0 → mixture value 1.25 everywhere.
        let member0: Vec<Vec<f32>> = y.get(0).unwrap().narrow(1, 2, 2).unwrap().to_vec2().unwrap();
        assert!(member0.iter().flatten().all(|v| (v - 1.25).abs() < 1e-5));

        // A second block keeps the ensemble axis instead of adding another one.
        let y2 = b.forward(&y.narrow(2, 0, 2).unwrap()).unwrap();
        assert_eq!(y2.dims(), &[3, 4, 4]);
    }

    #[test]
    fn ensemble_rejects_input_without_member_axis() {
        let shared = SharedWeight::ensemble(&[-1.0, 0.5, 2.0], &Device::Cpu).unwrap();
        let b = block(&shared);
        // Three identical rows must not be mistaken for three ensemble members.
        let rows = Tensor::ones((3, 2), DType::F32, &Device::Cpu).unwrap();
        assert!(b.forward(&rows).is_err());
        let single = Tensor::ones(2, DType::F32, &Device::Cpu).unwrap();
        assert!(b.forward(&single).is_err());
        let mismatched = Tensor::ones((2, 4, 2), DType::F32, &Device::Cpu).unwrap();
        assert!(b.forward(&mismatched).is_err());
        let member_axis = rows.unsqueeze(0).unwrap();
        assert_eq!(b.forward(&member_axis).unwrap().dims(), &[3, 3, 4]);
    }

    #[test]
    fn wrong_input_width_fails() {
        let shared = SharedWeight::new(1.0, &Device::Cpu).unwrap();
        let b = block(&shared);
        let x = Tensor::ones((2, 3), DType::F32, &Device::Cpu).unwrap();
        assert!(b.forward(&x).is_err());
    }
}
