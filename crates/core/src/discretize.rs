//! The discretizable capability: snapshot, discretise, restore and clip a
//! layer's continuous weight in place.
//!
//! # Straight-through estimation
//!
//! No gradient surrogate is defined anywhere in this crate. [`Discretizable::discretize`]
//! overwrites the trainable weight with its effective (discrete) value, so a
//! forward pass afterwards runs the frozen discrete network and a backward
//! pass produces gradients at the discrete point that land on the continuous
//! weight. [`Discretizable::restore`] puts the snapshot back.
//!
//! # Precondition
//!
//! The stored buffer is allocated at construction with unspecified content.
//! Calling `restore` before the first `store` (or `discretize`) copies that
//! content into the weight. This is not checked: the driver owns the pairing.

use candle_core::{Result, Tensor, Var};

/// Capability shared by every weight-bearing layer of the network.
///
/// All methods take `&self`: weights are [`Var`]s, written through
/// [`Var::set`], which updates storage shared with the optimiser's `VarMap`.
pub trait Discretizable {
    /// The trainable continuous weight.
    fn weight(&self) -> &Var;

    /// Untracked buffer holding the snapshot taken by [`Self::store`].
    fn stored_weight(&self) -> &Var;

    /// Discrete form of the current continuous weight, recomputed on every call.
    fn effective_weight(&self) -> Result<Tensor>;

    /// Re-sample the continuous weight from the layer's init distribution.
    fn init_weight(&self) -> Result<()>;

    /// Copy the continuous weight into the stored buffer.
    fn store(&self) -> Result<()> {
        self.stored_weight().set(self.weight().as_tensor())
    }

    /// Store, then overwrite the continuous weight with [`Self::effective_weight`].
    fn discretize(&self) -> Result<()> {
        self.store()?;
        let effective = self.effective_weight()?;
        self.weight().set(&effective)
    }

    /// Overwrite the continuous weight with the stored buffer.
    fn restore(&self) -> Result<()> {
        self.weight().set(self.stored_weight().as_tensor())
    }

    /// Project the continuous weight into its valid range. Defaults to a
    /// hard saturation into [-1, 1].
    fn clip(&self) -> Result<()> {
        let clipped = self.weight().as_tensor().clamp(-1f64, 1f64)?;
        self.weight().set(&clipped)
    }
}

/// Discretize `layers` in order. If one fails, the layers already
/// discretized are restored before the error is returned, so the caller
/// never sees a partly discrete network.
pub fn discretize_all(layers: &[&dyn Discretizable]) -> Result<()> {
    for (i, layer) in layers.iter().enumerate() {
        if let Err(err) = layer.discretize() {
            for done in &layers[..i] {
                done.restore()?;
            }
            return Err(err);
        }
    }
    Ok(())
}
