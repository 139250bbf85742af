//! Trainer: drives the shared weight, the optimiser step and weight clipping.
//!
//! Per step the shared weight is set to the configured ensemble, every
//! member is evaluated side by side, the mean NLL is back-propagated, AdamW
//! updates the continuous weights and `clip()` projects them back into range.
//! Evaluation brackets a pure forward pass with `discretize()` / `restore()`.

use candle_core::{DType, Device, Tensor, D};
use candle_nn::{loss, AdamW, Optimizer, ParamsAdamW, VarBuilder, VarMap};

use wann_common::WannConfig;
use wann_core::{SharedWeight, WannNetwork};

use crate::histogram::log_weight_histograms;

// ── Config ──────────────────────────────────────────────────────────────────

/// Training hyper-parameters (CLI-level knobs).
#[derive(Debug, Clone)]
pub struct TrainerConfig {
    pub lr: f64,
    pub weight_decay: f64,
    pub max_steps: usize,
    pub log_every: usize,
    pub eval_every: usize,
    pub hist_every: usize,
    pub hist_bins: usize,
}

impl Default for TrainerConfig {
    fn default() -> Self {
        Self {
            lr: 1e-2,
            weight_decay: 0.0,
            max_steps: 1000,
            log_every: 100,
            eval_every: 500,
            hist_every: 0,
            hist_bins: 20,
        }
    }
}

/// Metrics returned after each training step.
#[derive(Debug, Clone)]
pub struct StepMetrics {
    pub step: usize,
    /// Mean NLL over all ensemble members.
    pub loss: f32,
}

/// Discrete-network metrics for one shared-weight value.
#[derive(Debug, Clone, PartialEq)]
pub struct WeightEval {
    pub shared_weight: f32,
    pub loss: f32,
    pub accuracy: f32,
}

/// Evaluation of the discretised network across the shared-weight schedule.
#[derive(Debug, Clone)]
pub struct EvalMetrics {
    pub per_weight: Vec<WeightEval>,
}

impl EvalMetrics {
    pub fn mean_accuracy(&self) -> f32 {
        mean(self.per_weight.iter().map(|w| w.accuracy))
    }

    pub fn mean_loss(&self) -> f32 {
        mean(self.per_weight.iter().map(|w| w.loss))
    }

    /// The entry with the highest accuracy (first one on ties).
    pub fn best(&self) -> Option<&WeightEval> {
        self.per_weight
            .iter()
            .fold(None, |best: Option<&WeightEval>, w| match best {
                Some(b) if b.accuracy >= w.accuracy => Some(b),
                _ => Some(w),
            })
    }
}

fn mean(values: impl Iterator<Item = f32>) -> f32 {
    let (sum, n) = values.fold((0f32, 0usize), |(s, n), v| (s + v, n + 1));
    if n == 0 {
        0.0
    } else {
        sum / n as f32
    }
}

// ── Trainer ─────────────────────────────────────────────────────────────────

/// The training engine. Owns the network, its `VarMap`, the optimiser and
/// the shared weight.
pub struct Trainer {
    pub network: WannNetwork,
    pub varmap: VarMap,
    optimizer: AdamW,
    shared: SharedWeight,
    pub config: TrainerConfig,
    model_config: WannConfig,
    pub global_step: usize,
}

impl Trainer {
    /// Construct a new Trainer. Builds the network from config.
    pub fn new(
        model_config: WannConfig,
        trainer_config: TrainerConfig,
        device: Device,
    ) -> anyhow::Result<Self> {
        model_config.validate().map_err(anyhow::Error::msg)?;
        let varmap = VarMap::new();
        let vb = VarBuilder::from_varmap(&varmap, DType::F32, &device);
        let shared = SharedWeight::ensemble(&model_config.shared_weights, &device)?;
        let network = WannNetwork::from_config(&model_config, shared.clone(), vb)?;

        let (linear_params, mixture_params) = network.num_params();
        tracing::info!(
            layer_sizes = ?model_config.layer_sizes,
            linear_params,
            mixture_params,
            shared_weights = ?model_config.shared_weights,
            "Network built"
        );

        let optimizer = AdamW::new(
            varmap.all_vars(),
            ParamsAdamW {
                lr: trainer_config.lr,
                weight_decay: trainer_config.weight_decay,
                ..Default::default()
            },
        )?;

        Ok(Self {
            network,
            varmap,
            optimizer,
            shared,
            config: trainer_config,
            model_config,
            global_step: 0,
        })
    }

    /// One optimiser step on a batch `x: [B, n_in]`, `labels: [B]` (u32).
    pub fn step(&mut self, x: &Tensor, labels: &Tensor) -> anyhow::Result<StepMetrics> {
        self.shared.set_ensemble(&self.model_config.shared_weights)?;

        let probs = self.network.forward(&x.unsqueeze(0)?)?;
        let loss = ensemble_nll(&probs, labels)?;
        let loss_val = loss.to_scalar::<f32>()?;

        self.optimizer.backward_step(&loss)?;
        self.network.clip()?;

        let step = self.global_step;
        self.global_step += 1;
        if self.config.log_every > 0 && step % self.config.log_every == 0 {
            tracing::info!(step, loss = format!("{loss_val:.4}"), "Train step");
        }
        Ok(StepMetrics {
            step,
            loss: loss_val,
        })
    }

    /// Evaluate the discretised network once per shared-weight value.
    ///
    /// Continuous weights are restored afterwards, also when a forward pass
    /// fails. A failed `discretize` has already rolled back the layers it touched.
    pub fn evaluate(&self, x: &Tensor, labels: &Tensor) -> anyhow::Result<EvalMetrics> {
        self.network.discretize()?;
        let result = self.evaluate_discrete(x, labels);
        self.network.restore()?;
        result
    }

    fn evaluate_discrete(&self, x: &Tensor, labels: &Tensor) -> anyhow::Result<EvalMetrics> {
        let mut per_weight = Vec::with_capacity(self.model_config.shared_weights.len());
        for &w in &self.model_config.shared_weights {
            self.shared.set(w)?;
            let probs = self.network.forward(x)?;
            let loss = ensemble_nll(&probs.unsqueeze(0)?, labels)?.to_scalar::<f32>()?;
            per_weight.push(WeightEval {
                shared_weight: w,
                loss,
                accuracy: accuracy(&probs, labels)?,
            });
        }
        Ok(EvalMetrics { per_weight })
    }

    /// Run up to `max_steps` full-batch steps, evaluating on `val` (or the
    /// training data when `None`) every `eval_every` steps.
    pub fn fit(
        &mut self,
        x: &Tensor,
        labels: &Tensor,
        val: Option<(&Tensor, &Tensor)>,
    ) -> anyhow::Result<Option<EvalMetrics>> {
        let (val_x, val_labels) = val.unwrap_or((x, labels));
        let mut last_eval = None;
        while self.global_step < self.config.max_steps {
            let m = self.step(x, labels)?;
            let done = self.global_step;

            if self.config.hist_every > 0 && m.step % self.config.hist_every == 0 {
                log_weight_histograms(&self.network, m.step, self.config.hist_bins)?;
            }
            if (self.config.eval_every > 0 && done % self.config.eval_every == 0)
                || done == self.config.max_steps
            {
                let eval = self.evaluate(val_x, val_labels)?;
                tracing::info!(
                    step = m.step,
                    mean_accuracy = format!("{:.3}", eval.mean_accuracy()),
                    mean_loss = format!("{:.4}", eval.mean_loss()),
                    best_weight = ?eval.best().map(|b| b.shared_weight),
                    "Discrete eval"
                );
                last_eval = Some(eval);
            }
        }
        Ok(last_eval)
    }

    pub fn shared_weight(&self) -> &SharedWeight {
        &self.shared
    }

    pub fn model_config(&self) -> &WannConfig {
        &self.model_config
    }
}

// ── Loss / metrics ──────────────────────────────────────────────────────────

/// Mean NLL of `probs: [K, B, C]` against `labels: [B]`, averaged over all K·B rows.
fn ensemble_nll(probs: &Tensor, labels: &Tensor) -> candle_core::Result<Tensor> {
    let (k, b, c) = probs.dims3()?;
    let log_probs = probs.clamp(1e-7f64, 1f64)?.log()?.reshape((k * b, c))?;
    let targets = labels
        .to_dtype(DType::U32)?
        .unsqueeze(0)?
        .broadcast_as((k, b))?
        .contiguous()?
        .reshape(k * b)?;
    loss::nll(&log_probs, &targets)
}

/// Fraction of rows of `probs: [B, C]` whose arg-max equals the label.
fn accuracy(probs: &Tensor, labels: &Tensor) -> candle_core::Result<f32> {
    let predicted = probs.argmax(D::Minus1)?;
    predicted
        .eq(&labels.to_dtype(DType::U32)?)?
        .to_dtype(DType::F32)?
        .mean_all()?
        .to_scalar::<f32>()
}

// ── Tests ───────────────────────────────────────────────────────────────────
