// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.

//! Dense linear algebra and FFT helpers for the spectral engine.
//!
//! The Cholesky and triangular-solve routines operate on the lower triangle
//! only; the upper triangle of their inputs is never read. Finite-value
//! checking is deliberately left to callers.

use ndarray::prelude::*;
use num_complex::Complex;
use rustfft::FftPlanner;
use thiserror::Error;

use crate::types::TurbFloat;

#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum CholeskyError {
    #[error("Matrix is not positive definite (pivot {row} is not positive)")]
    NotPositiveDefinite { row: usize },
}

/// In-place lower Cholesky factorization, `A = L Lᵀ`.
///
/// Only the lower triangle of `a` is read; on success it holds `L`. The
/// strict upper triangle is left untouched, so callers must not read it
/// afterwards.
pub(crate) fn cholesky_lower_inplace<T: TurbFloat>(
    a: &mut Array2<T>,
) -> Result<(), CholeskyError> {
    let n = a.nrows();
    debug_assert_eq!(n, a.ncols());
    for j in 0..n {
        let mut d = a[[j, j]];
        for k in 0..j {
            d = d - a[[j, k]] * a[[j, k]];
        }
        if !(d > T::zero()) || !d.is_finite() {
            return Err(CholeskyError::NotPositiveDefinite { row: j });
        }
        let d = d.sqrt();
        a[[j, j]] = d;
        for i in (j + 1)..n {
            let mut s = a[[i, j]];
            for k in 0..j {
                s = s - a[[i, k]] * a[[j, k]];
            }
            a[[i, j]] = s / d;
        }
    }
    Ok(())
}

/// Forward substitution: solve `L x = b` for lower-triangular real `L` and
/// complex `b`.
pub(crate) fn solve_lower<T: TurbFloat>(
    l: ArrayView2<T>,
    b: &[Complex<T>],
) -> Vec<Complex<T>> {
    let n = b.len();
    debug_assert_eq!(l.nrows(), n);
    let mut x: Vec<Complex<T>> = Vec::with_capacity(n);
    for i in 0..n {
        let mut acc = b[i];
        for (k, xk) in x.iter().enumerate().take(i) {
            let lik = l[[i, k]];
            acc = Complex::new(acc.re - lik * xk.re, acc.im - lik * xk.im);
        }
        let d = l[[i, i]];
        x.push(Complex::new(acc.re / d, acc.im / d));
    }
    x
}

/// `y = L u` for lower-triangular real `L` and complex `u`.
pub(crate) fn lower_matvec<T: TurbFloat>(
    l: ArrayView2<T>,
    u: &[Complex<T>],
) -> Vec<Complex<T>> {
    let n = u.len();
    debug_assert_eq!(l.nrows(), n);
    let mut y = Vec::with_capacity(n);
    for i in 0..n {
        let mut re = T::zero();
        let mut im = T::zero();
        for (j, uj) in u.iter().enumerate().take(i + 1) {
            let lij = l[[i, j]];
            re = re + lij * uj.re;
            im = im + lij * uj.im;
        }
        y.push(Complex::new(re, im));
    }
    y
}

/// One-sided FFT of each column of `x`, divided by the number of samples.
///
/// Returns shape `(n_t / 2 + 1, n_cols)`. The DC bin and (for even `n_t`)
/// the Nyquist bin are forced exactly real, as for a true real-input
/// transform.
pub(crate) fn rfft_over_time(x: ArrayView2<f64>) -> Array2<Complex<f64>> {
    let n_t = x.nrows();
    let n_f = n_t / 2 + 1;
    let mut out = Array2::zeros((n_f, x.ncols()));
    let mut planner = FftPlanner::<f64>::new();
    let fft = planner.plan_fft_forward(n_t);
    let mut buf = vec![Complex::new(0.0, 0.0); n_t];
    let scale = 1.0 / n_t as f64;
    for (i_col, col) in x.columns().into_iter().enumerate() {
        for (b, &v) in buf.iter_mut().zip(col.iter()) {
            *b = Complex::new(v, 0.0);
        }
        fft.process(&mut buf);
        for i_f in 0..n_f {
            out[[i_f, i_col]] = buf[i_f] * scale;
        }
        out[[0, i_col]].im = 0.0;
        if n_t % 2 == 0 {
            out[[n_f - 1, i_col]].im = 0.0;
        }
    }
    out
}

/// Inverse one-sided FFT of each column, producing `n_t` real samples.
///
/// The forward convention divided by `n_t`; the 1/`n_t` of the inverse
/// transform and the matching multiplication by `n_t` cancel, so this is the
/// unnormalized inverse of the Hermitian extension.
pub(crate) fn irfft_over_time<T: TurbFloat>(
    spec: ArrayView2<Complex<T>>,
    n_t: usize,
) -> Array2<T> {
    let n_f = spec.nrows();
    debug_assert_eq!(n_f, n_t / 2 + 1);
    let mut out = Array2::zeros((n_t, spec.ncols()));
    let mut planner = FftPlanner::<T>::new();
    let ifft = planner.plan_fft_inverse(n_t);
    let mut buf = vec![Complex::new(T::zero(), T::zero()); n_t];
    for (i_col, col) in spec.columns().into_iter().enumerate() {
        buf[0] = col[0];
        for i_f in 1..n_f {
            buf[i_f] = col[i_f];
            // The Nyquist bin of an even-length signal has no mirror.
            if !(n_t % 2 == 0 && i_f == n_f - 1) {
                buf[n_t - i_f] = col[i_f].conj();
            }
        }
        ifft.process(&mut buf);
        for i_t in 0..n_t {
            out[[i_t, i_col]] = buf[i_t].re;
        }
    }
    out
}

/// `n` evenly spaced values from `a` to `b` inclusive.
pub(crate) fn linspace(a: f64, b: f64, n: usize) -> Vec<f64> {
    match n {
        0 => vec![],
        1 => vec![a],
        _ => {
            let step = (b - a) / (n - 1) as f64;
            (0..n).map(|i| a + step * i as f64).collect()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;

    #[test]
    fn cholesky_known_3x3() {
        // A = L Lᵀ with L = [[2,0,0],[6,1,0],[-8,5,3]].
        let mut a = array![
            [4.0, 12.0, -16.0],
            [12.0, 37.0, -43.0],
            [-16.0, -43.0, 98.0]
        ];
        cholesky_lower_inplace(&mut a).unwrap();
        let expected = array![[2.0, 0.0, 0.0], [6.0, 1.0, 0.0], [-8.0, 5.0, 3.0]];
        for i in 0..3 {
            for j in 0..=i {
                assert_abs_diff_eq!(a[[i, j]], expected[[i, j]], epsilon = 1e-12);
            }
        }
    }

    #[test]
    fn cholesky_rejects_non_psd() {
        let mut a = array![[1.0, 2.0], [2.0, 1.0]];
        assert_eq!(
            cholesky_lower_inplace(&mut a),
            Err(CholeskyError::NotPositiveDefinite { row: 1 })
        );
    }

    #[test]
    fn cholesky_rejects_zero_matrix() {
        let mut a = Array2::<f64>::zeros((3, 3));
        assert!(cholesky_lower_inplace(&mut a).is_err());
    }

    #[test]
    fn solve_then_matvec_round_trips() {
        let mut a = array![
            [4.0, 12.0, -16.0],
            [12.0, 37.0, -43.0],
            [-16.0, -43.0, 98.0]
        ];
        cholesky_lower_inplace(&mut a).unwrap();
        let b = vec![
            Complex::new(1.0, -0.5),
            Complex::new(0.25, 2.0),
            Complex::new(-3.0, 0.125),
        ];
        let x = solve_lower(a.view(), &b);
        let back = lower_matvec(a.view(), &x);
        for (orig, re) in b.iter().zip(back.iter()) {
            assert_abs_diff_eq!(orig.re, re.re, epsilon = 1e-12);
            assert_abs_diff_eq!(orig.im, re.im, epsilon = 1e-12);
        }
    }

    #[test]
    fn rfft_of_sine_peaks_at_its_bin() {
        // One full period over 100 samples: all energy in bin 1, magnitude
        // 1/2 under the divide-by-n convention.
        let n_t = 100;
        let x = Array2::from_shape_fn((n_t, 1), |(t, _)| {
            (2.0 * std::f64::consts::PI * t as f64 / n_t as f64).sin()
        });
        let spec = rfft_over_time(x.view());
        assert_eq!(spec.dim(), (51, 1));
        assert_abs_diff_eq!(spec[[1, 0]].norm(), 0.5, epsilon = 1e-12);
        assert_abs_diff_eq!(spec[[2, 0]].norm(), 0.0, epsilon = 1e-12);
        assert_abs_diff_eq!(spec[[0, 0]].im, 0.0);
        assert_abs_diff_eq!(spec[[50, 0]].im, 0.0);
    }

    #[test]
    fn rfft_irfft_round_trip_even_and_odd() {
        for n_t in [8usize, 9] {
            let x = Array2::from_shape_fn((n_t, 2), |(t, c)| {
                (t as f64 * 0.7 + c as f64).sin() + 0.3 * (t as f64 * 1.9).cos()
            });
            let spec = rfft_over_time(x.view());
            let back = irfft_over_time(spec.view(), n_t);
            for (a, b) in x.iter().zip(back.iter()) {
                assert_abs_diff_eq!(a, b, epsilon = 1e-12);
            }
        }
    }

    #[test]
    fn linspace_endpoints() {
        let v = linspace(-2.0, 2.0, 5);
        assert_eq!(v, vec![-2.0, -1.0, 0.0, 1.0, 2.0]);
        assert_eq!(linspace(3.0, 9.0, 1), vec![3.0]);
    }
}
