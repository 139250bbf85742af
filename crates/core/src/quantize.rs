//! Discretisation primitives: ternary projection, arg-max one-hot, tensor helpers.
//!
//! These are the forward-only mappings from continuous weights to their
//! effective (discrete) form. None of them attaches a gradient: the
//! straight-through behaviour comes from writing their result into the
//! trainable weight (see [`crate::discretize`]), not from a surrogate here.

use candle_core::{bail, DType, Result, Tensor};

/// Dead-zone half-width of the ternary projection.
pub const TERNARY_THRESHOLD: f64 = 0.4;

// ── Ternary projection ──────────────────────────────────────────────────────

/// Ternary projection `sign(hardshrink(w, 0.4))`.
///
/// ```text
/// W_q[i] = sign(W[i])  if |W[i]| > 0.4
///          0            otherwise
/// ```
///
/// Returns a detached tensor of the input dtype with values in {-1, 0, 1}.
pub fn ternary_effective(w: &Tensor) -> Result<Tensor> {
    let mask = w.abs()?.gt(TERNARY_THRESHOLD)?.to_dtype(w.dtype())?;
    (w.sign()? * mask)?.detach().contiguous()
}

// ── Arg-max one-hot ─────────────────────────────────────────────────────────

/// Column-wise one-hot of the arg-max over axis 0.
///
/// For a `[rows, cols]` weight every column gets a single 1 at the row of its
/// largest entry. Ties go to the lowest row index; NaN never wins a column.
/// Computed on the host so the tie rule does not depend on the backend.
pub fn one_hot_argmax(w: &Tensor) -> Result<Tensor> {
    let (rows, cols) = w.dims2()?;
    let host = w.to_dtype(DType::F32)?.to_vec2::<f32>()?;
    let mut out = vec![0f32; rows * cols];
    for col in 0..cols {
        let mut best = 0usize;
        for row in 1..rows {
            let v = host[row][col];
            let cur = host[best][col];
            if v > cur || (cur.is_nan() && !v.is_nan()) {
                best = row;
            }
        }
        if rows > 0 {
            out[best * cols + col] = 1.0;
        }
    }
    Tensor::from_vec(out, (rows, cols), w.device())?.to_dtype(w.dtype())
}

/// Index of the selected row for every column of a one-hot or raw mixture weight.
pub fn argmax_rows(w: &Tensor) -> Result<Vec<usize>> {
    let one_hot = one_hot_argmax(w)?;
    let (rows, cols) = one_hot.dims2()?;
    let host = one_hot.to_dtype(DType::F32)?.to_vec2::<f32>()?;
    Ok((0..cols)
        .map(|c| (0..rows).find(|&r| host[r][c] > 0.5).unwrap_or(0))
        .collect())
}

// ── Debug helpers ───────────────────────────────────────────────────────────

/// Count {-1, 0, +1} occurrences in the ternary projection of `w`.
pub fn ternary_distribution(w: &Tensor) -> Result<(u64, u64, u64)> {
    let q = ternary_effective(w)?;
    let flat = q.flatten_all()?.to_dtype(DType::F32)?.to_vec1::<f32>()?;
    let (mut n_neg, mut n_zero, mut n_pos) = (0u64, 0u64, 0u64);
    for &v in &flat {
        if v < -0.5 {
            n_neg += 1;
        } else if v > 0.5 {
            n_pos += 1;
        } else {
            n_zero += 1;
        }
    }
    Ok((n_neg, n_zero, n_pos))
}

// ── Tensor helpers ──────────────────────────────────────────────────────────

/// Reshape `x` to 2-D, multiply by `w_t`, reshape back.
///
/// Handles (K), (B, K), (B, T, K) and arbitrary leading dims; a scalar input
/// is an error. A mismatch
/// between the last dim of `x` and the rows of `w_t` surfaces as the matmul
/// shape error.
pub fn matmul_reshape(x: &Tensor, w_t: &Tensor) -> Result<Tensor> {
    let dims = x.dims();
    let out_dim = w_t.dim(1)?;
    match dims {
        [] => bail!("matmul_reshape: rank-0 input has no feature dimension"),
        [b, k] => x.reshape((*b, *k))?.matmul(w_t),
        [b, m, k] => {
            let x_2d = x.reshape((*b * *m, *k))?;
            let y = x_2d.matmul(w_t)?;
            y.reshape((*b, *m, out_dim))
        }
        _ => {
            let last = dims[dims.len() - 1];
            let prod: usize = dims[..dims.len() - 1].iter().product();
            let x_2d = x.reshape((prod, last))?;
            let y = x_2d.matmul(w_t)?;
            let mut out_shape: Vec<usize> = dims[..dims.len() - 1].to_vec();
            out_shape.push(out_dim);
            y.reshape(out_shape.as_slice())
        }
    }
}

// ── Tests ───────────────────────────────────────────────────────────────────
