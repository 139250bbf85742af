//! # wann-common — Shared Configuration
//!
//! Types shared across every crate in the workspace:
//!
//! * **[`WannConfig`]** — network hyper-parameters (serialised as JSON).
//! * **[`ActivationFn`]** — the ordered menu entries of a multi-activation layer.

pub mod config;

pub use config::{ActivationFn, WannConfig, DEFAULT_MENU};
