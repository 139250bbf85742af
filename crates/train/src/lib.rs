//! # wann-train — Training Driver
//!
//! The external loop around the network:
//!
//! * **[`Trainer`]** — owns network + `VarMap` + AdamW + shared weight. One call
//!   to [`Trainer::step`] runs the shared-weight ensemble forward, backward,
//!   the optimiser update and weight clipping. [`Trainer::evaluate`] measures
//!   the discretised network per shared-weight value.
//! * **[`WeightHistogram`]** — "effective weights" / "actual weights" logging.

pub mod histogram;
pub mod trainer;

pub use histogram::{log_weight_histograms, weight_histograms, WeightHistogram};
pub use trainer::{EvalMetrics, StepMetrics, Trainer, TrainerConfig, WeightEval};
