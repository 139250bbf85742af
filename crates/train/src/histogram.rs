//! Weight histograms for diagnostic logging.
//!
//! The driver logs two histograms per epoch/step: "effective weights" (the
//! ternary projection of every linear layer) and "actual weights" (the
//! continuous values). Both are emitted through `tracing`.

use candle_core::{DType, Tensor};

use wann_core::WannNetwork;

/// Tag of the ternary-projection histogram.
pub const EFFECTIVE_TAG: &str = "effective weights";
/// Tag of the continuous-weight histogram.
pub const ACTUAL_TAG: &str = "actual weights";

/// Fixed-width histogram over `[min, max]`.
#[derive(Debug, Clone, PartialEq)]
pub struct WeightHistogram {
    pub min: f32,
    pub max: f32,
    pub counts: Vec<u64>,
}

impl WeightHistogram {
    /// Bin `values` over their own range.
    pub fn new(values: &[f32], bins: usize) -> Self {
        let finite = values.iter().copied().filter(|v| v.is_finite());
        let (min, max) = finite.fold((f32::INFINITY, f32::NEG_INFINITY), |(lo, hi), v| {
            (lo.min(v), hi.max(v))
        });
        if min > max {
            return Self::with_range(values, bins, 0.0, 0.0);
        }
        Self::with_range(values, bins, min, max)
    }

    /// Bin `values` over `[min, max]`; out-of-range and non-finite values are dropped.
    pub fn with_range(values: &[f32], bins: usize, min: f32, max: f32) -> Self {
        let bins = bins.max(1);
        let mut counts = vec![0u64; bins];
        let width = (max - min) / bins as f32;
        for &v in values {
            if !v.is_finite() || v < min || v > max {
                continue;
            }
            let idx = if width > 0.0 {
                (((v - min) / width) as usize).min(bins - 1)
            } else {
                0
            };
            counts[idx] += 1;
        }
        Self { min, max, counts }
    }

    pub fn from_tensor(t: &Tensor, bins: usize) -> candle_core::Result<Self> {
        let values = t.flatten_all()?.to_dtype(DType::F32)?.to_vec1::<f32>()?;
        Ok(Self::new(&values, bins))
    }

    pub fn total(&self) -> u64 {
        self.counts.iter().sum()
    }

    /// Compact `lo..hi:count` rendering for log lines.
    pub fn render(&self) -> String {
        let bins = self.counts.len();
        let width = (self.max - self.min) / bins as f32;
        self.counts
            .iter()
            .enumerate()
            .map(|(i, c)| {
                let lo = self.min + width * i as f32;
                format!("[{:.2},{:.2}):{c}", lo, lo + width)
            })
            .collect::<Vec<_>>()
            .join(" ")
    }
}

/// Effective and actual weight histograms of every ternary linear layer.
pub fn weight_histograms(
    network: &WannNetwork,
    bins: usize,
) -> candle_core::Result<(WeightHistogram, WeightHistogram)> {
    let snapshot = network.weight_snapshot()?;
    let effective = snapshot
        .effective
        .to_dtype(DType::F32)?
        .to_vec1::<f32>()?;
    // Three bins centred on -1, 0 and +1.
    let effective = WeightHistogram::with_range(&effective, 3, -1.5, 1.5);
    let actual = WeightHistogram::from_tensor(&snapshot.actual, bins)?;
    Ok((effective, actual))
}

/// Log both histograms at `step` (epoch or global step, the caller decides).
pub fn log_weight_histograms(
    network: &WannNetwork,
    step: usize,
    bins: usize,
) -> candle_core::Result<()> {
    let (effective, actual) = weight_histograms(network, bins)?;
    tracing::info!(
        tag = EFFECTIVE_TAG,
        step,
        neg = effective.counts[0],
        zero = effective.counts[1],
        pos = effective.counts[2],
        "Weight histogram"
    );
    tracing::info!(
        tag = ACTUAL_TAG,
        step,
        min = format!("{:.3}", actual.min),
        max = format!("{:.3}", actual.max),
        bins = %actual.render(),
        "Weight histogram"
    );
    Ok(())
}

// ── Tests ───────────────────────────────────────────────────────────────────
