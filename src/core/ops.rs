//! 2-D cross-correlation primitives shared by the convolution layer.
//!
//! All functions work on row-major `f64` matrices. Correlation does not flip
//! the kernel; `convolve2d_full` does, and is what the convolution backward
//! pass needs to route gradients back to its inputs.

use crate::prelude::*;

/// Elementwise dot product of two equally shaped windows.
pub fn correlate2d_ops(window: ArrayView2<f64>, kernel: ArrayView2<f64>) -> Result<f64> {
    if window.dim() != kernel.dim() {
        return Err(NNError::LayerShapeMismatch(format!(
            "size mismatch between input window {:?} and kernel {:?}",
            window.dim(),
            kernel.dim()
        )));
    }
    Ok(Zip::from(&window).and(&kernel).fold(0.0, |acc, &x, &k| acc + x * k))
}

/// Valid cross-correlation: an `M×M` input against an `N×N` kernel yields an
/// `(M-N+1)×(M-N+1)` output. Rectangular inputs are handled per axis.
pub fn correlate2d_valid(input: ArrayView2<f64>, kernel: ArrayView2<f64>) -> Result<Array2<f64>> {
    let (in_rows, in_cols) = input.dim();
    let (k_rows, k_cols) = kernel.dim();
    if k_rows == 0 || k_cols == 0 || k_rows > in_rows || k_cols > in_cols {
        return Err(NNError::LayerShapeMismatch(format!(
            "kernel {:?} does not fit into input {:?}",
            kernel.dim(),
            input.dim()
        )));
    }

    let out_rows = in_rows - k_rows + 1;
    let out_cols = in_cols - k_cols + 1;
    let mut output = Array2::<f64>::zeros((out_rows, out_cols));
    for ((i, j), cell) in output.indexed_iter_mut() {
        let window = input.slice(s![i..i + k_rows, j..j + k_cols]);
        *cell = correlate2d_ops(window, kernel)?;
    }
    Ok(output)
}

/// Full cross-correlation: the input is zero-padded by `N-1` on each side and
/// then correlated, yielding `(M+N-1)×(M+N-1)`.
pub fn correlate2d_full(input: ArrayView2<f64>, kernel: ArrayView2<f64>) -> Result<Array2<f64>> {
    let (in_rows, in_cols) = input.dim();
    let (k_rows, k_cols) = kernel.dim();
    if k_rows == 0 || k_cols == 0 {
        return Err(NNError::LayerShapeMismatch(format!(
            "empty kernel {:?}",
            kernel.dim()
        )));
    }

    let pad_rows = k_rows - 1;
    let pad_cols = k_cols - 1;
    let mut padded = Array2::<f64>::zeros((in_rows + 2 * pad_rows, in_cols + 2 * pad_cols));
    padded
        .slice_mut(s![pad_rows..pad_rows + in_rows, pad_cols..pad_cols + in_cols])
        .assign(&input);

    correlate2d_valid(padded.view(), kernel)
}

/// Full convolution, i.e. full correlation against the kernel rotated by 180°.
pub fn convolve2d_full(input: ArrayView2<f64>, kernel: ArrayView2<f64>) -> Result<Array2<f64>> {
    let rotated = kernel.slice(s![..;-1, ..;-1]);
    correlate2d_full(input, rotated)
}
