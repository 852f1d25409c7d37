use crate::error::KernelError;
use rayon::prelude::*;

/// Inputs at least this long are normalized on the rayon pool.
const PARALLEL_SOFTMAX_THRESHOLD: usize = 4096;

/// Computes `C[M×N] = A[M×K] · B[K×N]`, all row-major.
///
/// Output rows are computed in parallel; with a single row the output columns are
/// split instead. Each output element sums its products in ascending `k` order.
pub fn matmul(a: &[f32], b: &[f32], c: &mut [f32], m: usize, n: usize, k: usize) -> Result<(), KernelError> {
    check_operands(a.len(), b.len(), c.len(), m, n, k)?;

    if m == 0 || n == 0 {
        return Ok(());
    }

    if m == 1 {
        c[..n].par_iter_mut().enumerate().for_each(|(col, out_val)| {
            *out_val = dot_column(&a[..k], b, col, n);
        });
    } else {
        c[..m * n].par_chunks_mut(n).enumerate().for_each(|(row, c_row)| {
            let a_row = &a[row * k..(row + 1) * k];
            c_row.iter_mut().enumerate().for_each(|(col, out_val)| *out_val = dot_column(a_row, b, col, n));
        });
    }

    Ok(())
}

/// Validates buffer lengths for an `M×K · K×N` product.
pub(crate) fn check_operands(
    a_len: usize,
    b_len: usize,
    c_len: usize,
    m: usize,
    n: usize,
    k: usize,
) -> Result<(), KernelError> {
    let required = [("A", m * k, a_len), ("B", k * n, b_len), ("C", m * n, c_len)];
    for (name, needed, actual) in required {
        if actual < needed {
            return Err(KernelError::BufferTooSmall { name, needed, actual });
        }
    }
    Ok(())
}

#[inline]
fn dot_column(a_row: &[f32], b: &[f32], col: usize, n: usize) -> f32 {
    a_row.iter().enumerate().map(|(row, &a_val)| a_val * b[row * n + col]).sum()
}

/// Applies numerically stable softmax to `x` in place.
///
/// `NaN` and infinities propagate into the output instead of failing.
pub fn softmax(x: &mut [f32]) -> Result<(), KernelError> {
    if x.is_empty() {
        return Err(KernelError::EmptySoftmax);
    }

    let max_val = x.iter().fold(f32::NEG_INFINITY, |acc, &val| acc.max(val));

    if x.len() >= PARALLEL_SOFTMAX_THRESHOLD {
        let sum = x
            .par_iter_mut()
            .map(|val| {
                *val = (*val - max_val).exp();
                *val
            })
            .sum::<f32>();
        x.par_iter_mut().for_each(|val| *val /= sum);
    } else {
        let sum = x
            .iter_mut()
            .map(|val| {
                *val = (*val - max_val).exp();
                *val
            })
            .sum::<f32>();
        x.iter_mut().for_each(|val| *val /= sum);
    }

    Ok(())
}

/// Returns the index of the first maximum; `NaN` entries are never selected.
pub fn argmax(values: &[f32]) -> usize {
    values
        .iter()
        .enumerate()
        .fold((0, f32::NEG_INFINITY), |(best_idx, best_val), (idx, &val)| {
            if val > best_val { (idx, val) } else { (best_idx, best_val) }
        })
        .0
}
