//! Network configuration.
//!
//! Serialised as JSON next to checkpoints and experiment logs. Every field has a
//! default so a minimal `{}` JSON produces the reference (4, 3, 2) network.

use serde::{Deserialize, Serialize};

/// Elementwise activation function selectable by a multi-activation layer.
///
/// The position of a function inside a menu is its row index in the mixture
/// weight, so menus are ordered and that order is part of the configuration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ActivationFn {
    Relu,
    Sigmoid,
    Tanh,
    /// Standard Gaussian bump `exp(-x² / 2)`.
    Gaussian,
    /// Hard step: 1 where `x > 0`, else 0.
    Step,
    Identity,
    /// Negation.
    Inverse,
    Squared,
    Abs,
    Cos,
    Sin,
}

/// The default menu, in index order.
pub const DEFAULT_MENU: [ActivationFn; 5] = [
    ActivationFn::Relu,
    ActivationFn::Sigmoid,
    ActivationFn::Tanh,
    ActivationFn::Gaussian,
    ActivationFn::Step,
];

impl ActivationFn {
    pub fn name(self) -> &'static str {
        match self {
            Self::Relu => "relu",
            Self::Sigmoid => "sigmoid",
            Self::Tanh => "tanh",
            Self::Gaussian => "gaussian (standard)",
            Self::Step => "step",
            Self::Identity => "identity",
            Self::Inverse => "inverse",
            Self::Squared => "squared",
            Self::Abs => "abs",
            Self::Cos => "cos",
            Self::Sin => "sin",
        }
    }
}

impl std::fmt::Display for ActivationFn {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

/// Configuration of a growing-concatenation network and its shared-weight schedule.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WannConfig {
    /// Input width followed by the output width of every block. At least two entries.
    #[serde(default = "default_layer_sizes")]
    pub layer_sizes: Vec<usize>,
    /// Activation menu of every multi-activation layer, in index order.
    #[serde(default = "default_activations")]
    pub activations: Vec<ActivationFn>,
    /// Values the training driver feeds through the shared scalar.
    #[serde(default = "default_shared_weights")]
    pub shared_weights: Vec<f32>,
}

// ── Default value functions ─────────────────────────────────────────────────

fn default_layer_sizes() -> Vec<usize> {
    vec![4, 3, 2]
}
fn default_activations() -> Vec<ActivationFn> {
    DEFAULT_MENU.to_vec()
}
fn default_shared_weights() -> Vec<f32> {
    vec![-2.0, -1.0, -0.5, 0.5, 1.0, 2.0]
}

// ── Impl ────────────────────────────────────────────────────────────────────

impl Default for WannConfig {
    fn default() -> Self {
        Self {
            layer_sizes: default_layer_sizes(),
            activations: default_activations(),
            shared_weights: default_shared_weights(),
        }
    }
}

impl WannConfig {
    /// Build a config with the default menu and schedule for the given widths.
    pub fn with_layer_sizes(layer_sizes: &[usize]) -> Self {
        Self {
            layer_sizes: layer_sizes.to_vec(),
            ..Default::default()
        }
    }

    /// Declared input width (first layer size).
    pub fn n_in(&self) -> usize {
        self.layer_sizes.first().copied().unwrap_or(0)
    }

    /// Declared output width (last layer size).
    pub fn n_out(&self) -> usize {
        self.layer_sizes.last().copied().unwrap_or(0)
    }

    /// Check the invariants a network needs before any tensor is allocated.
    pub fn validate(&self) -> Result<(), String> {
        if self.layer_sizes.len() < 2 {
            return Err(format!(
                "need at least 2 layer sizes (input and output), got {}",
                self.layer_sizes.len()
            ));
        }
        if let Some(i) = self.layer_sizes.iter().position(|&s| s == 0) {
            return Err(format!("layer size at position {i} must be positive"));
        }
        if self.activations.is_empty() {
            return Err("activation menu must not be empty".to_string());
        }
        if self.shared_weights.is_empty() {
            return Err("shared weight schedule must not be empty".to_string());
        }
        Ok(())
    }

    /// Save config to a JSON file.
    pub fn save(&self, path: &std::path::Path) -> anyhow::Result<()> {
        let json = serde_json::to_string_pretty(self)?;
        std::fs::write(path, json)?;
        Ok(())
    }

    /// Load config from a JSON file.
    pub fn load(path: &std::path::Path) -> anyhow::Result<Self> {
        let json = std::fs::read_to_string(path)?;
        let config = serde_json::from_str(&json)?;
        Ok(config)
    }
}

// ── Tests ───────────────────────────────────────────────────────────────────
