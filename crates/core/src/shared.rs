//! The externally driven shared weight.
//!
//! Every [`crate::ConcatBlock`] of a network holds a clone of the same
//! [`SharedWeight`] handle and multiplies its linear output by the current
//! value. The network only reads it; the training driver decides the value
//! per step and must not change it while a forward/backward pass is running.

use std::sync::Arc;

use candle_core::{bail, Device, Result, Tensor};
use parking_lot::RwLock;

/// Cloneable handle to the shared scalar (or ensemble of scalars).
///
/// * Rank 0: a single value, broadcast into linear outputs of any rank.
/// * Rank 1 (`K` values): ensemble evaluation. The values are laid along a
///   dedicated leading axis of size `K`; inputs must carry that axis (size `K`
///   or 1), see [`crate::ConcatBlock::forward`].
#[derive(Clone, Debug)]
pub struct SharedWeight {
    value: Arc<RwLock<Tensor>>,
    device: Device,
}

impl SharedWeight {
    pub fn new(value: f32, device: &Device) -> Result<Self> {
        Ok(Self {
            value: Arc::new(RwLock::new(Tensor::new(value, device)?)),
            device: device.clone(),
        })
    }

    pub fn ensemble(values: &[f32], device: &Device) -> Result<Self> {
        let shared = Self::new(1.0, device)?;
        shared.set_ensemble(values)?;
        Ok(shared)
    }

    /// Replace the value with a single scalar.
    pub fn set(&self, value: f32) -> Result<()> {
        let t = Tensor::new(value, &self.device)?;
        *self.value.write() = t;
        Ok(())
    }

    /// Replace the value with `K = values.len()` scalars evaluated side by side.
    pub fn set_ensemble(&self, values: &[f32]) -> Result<()> {
        if values.is_empty() {
            bail!("shared weight ensemble must hold at least one value")
        }
        let t = Tensor::new(values, &self.device)?;
        *self.value.write() = t;
        Ok(())
    }

    /// Snapshot of the current value. Tensors are reference-counted, so this is cheap.
    pub fn tensor(&self) -> Tensor {
        self.value.read().clone()
    }

    /// `Some(K)` for an ensemble, `None` for a single scalar.
    pub fn ensemble_size(&self) -> Option<usize> {
        let t = self.value.read();
        match t.rank() {
            0 => None,
            _ => Some(t.elem_count()),
        }
    }

    /// Current values on the host (one entry for a scalar).
    pub fn values(&self) -> Result<Vec<f32>> {
        self.tensor()
            .flatten_all()?
            .to_dtype(candle_core::DType::F32)?
            .to_vec1::<f32>()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn clones_observe_updates() {
        let shared = SharedWeight::new(0.5, &Device::Cpu).unwrap();
        let held = shared.clone();
        assert_eq!(held.values().unwrap(), vec![0.5]);
        assert_eq!(held.ensemble_size(), None);

        shared.set(-2.0).unwrap();
        assert_eq!(held.values().unwrap(), vec![-2.0]);

        shared.set_ensemble(&[1.0, 2.0, 3.0]).unwrap();
        assert_eq!(held.ensemble_size(), Some(3));
        assert_eq!(held.tensor().dims(), &[3]);
    }

    #[test]
    fn empty_ensemble_is_rejected() {
        let shared = SharedWeight::new(1.0, &Device::Cpu).unwrap();
        assert!(shared.set_ensemble(&[]).is_err());
        assert_eq!(shared.values().unwrap(), vec![1.0]);
    }
}
