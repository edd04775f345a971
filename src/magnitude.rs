// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.

//! Per-point, per-frequency Fourier amplitudes for the simulated points.
//!
//! Amplitudes are `sqrt(S * df / 2)` with the DC bin zeroed, then rescaled
//! per point so that the standard deviation of the reconstructed time series
//! equals `sigma(k, y, z)` exactly. The rescale uses the Parseval identity
//! rather than a trial inverse transform: for one-sided amplitudes `m_k` of
//! a zero-mean signal, the time-domain variance is `2 * sum(m_k^2)` with the
//! Nyquist bin (even sample counts) counted once.

use ndarray::prelude::*;

use crate::grid::SpatPoint;
use crate::profiles::{IecContext, ResolvedProfiles};

/// Amplitudes of the simulated points, shape `(n_f, n_points)`, in f64.
pub(crate) fn get_magnitudes(
    points: &[SpatPoint],
    profiles: &ResolvedProfiles,
    ctx: &IecContext,
    n_t: usize,
    t_total: f64,
) -> Array2<f64> {
    let n_f = n_t / 2 + 1;
    let df = 1.0 / t_total;
    let freqs: Vec<f64> = (0..n_f).map(|i| i as f64 * df).collect();
    let even = n_t % 2 == 0;

    let mut mags = Array2::zeros((n_f, points.len()));
    for (i_p, p) in points.iter().enumerate() {
        let spc = profiles.spectrum_column(ctx, &freqs, p.comp, p.y, p.z);
        let mut col = mags.column_mut(i_p);
        for (i_f, s) in spc.iter().enumerate() {
            col[i_f] = (s * df / 2.0).sqrt();
        }
        col[0] = 0.0;

        // Parseval: variance of the reconstruction from one-sided amplitudes.
        let mut var = 0.0;
        for i_f in 1..n_f {
            var += 2.0 * col[i_f] * col[i_f];
        }
        if even {
            var -= col[n_f - 1] * col[n_f - 1];
        }
        let std = var.sqrt();
        let sig = profiles.sig(ctx, p.comp, p.y, p.z);
        let scale = if std > 0.0 { sig / std } else { 0.0 };
        for i_f in 0..n_f {
            col[i_f] *= scale;
        }
    }
    mags
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::grid::Component;
    use crate::profiles::{resolve_profiles, InterpData, Profiles};
    use approx::assert_abs_diff_eq;

    fn mags_for(n_t: usize, t_total: f64) -> Array2<f64> {
        let points = [SpatPoint {
            comp: Component::U,
            x: 0.0,
            y: 0.0,
            z: 50.0,
        }];
        let profiles =
            resolve_profiles(Profiles::default(), &InterpData::None, None, &[], t_total).unwrap();
        let ctx = IecContext::default();
        get_magnitudes(&points, &profiles, &ctx, n_t, t_total)
    }

    #[test]
    fn dc_bin_is_zero() {
        let mags = mags_for(600, 60.0);
        assert_eq!(mags[[0, 0]], 0.0);
        assert!(mags[[1, 0]] > 0.0);
    }

    #[test]
    fn realized_std_equals_sigma() {
        for (n_t, t_total) in [(600usize, 60.0), (601, 60.1)] {
            let mags = mags_for(n_t, t_total);
            let n_f = n_t / 2 + 1;
            let mut var = 0.0;
            for i_f in 1..n_f {
                var += 2.0 * mags[[i_f, 0]] * mags[[i_f, 0]];
            }
            if n_t % 2 == 0 {
                var -= mags[[n_f - 1, 0]] * mags[[n_f - 1, 0]];
            }
            let ctx = IecContext::default();
            let sig = crate::profiles::iec_sig(&ctx, Component::U);
            assert_abs_diff_eq!(var.sqrt(), sig, epsilon = 1e-10);
        }
    }

    #[test]
    fn zero_sigma_yields_zero_column() {
        let points = [SpatPoint {
            comp: Component::U,
            x: 0.0,
            y: 0.0,
            z: 50.0,
        }];
        let profiles = resolve_profiles(
            Profiles {
                sig: Some(crate::profiles::SigProfile::Custom(Box::new(|_, _, _| 0.0))),
                ..Profiles::default()
            },
            &InterpData::None,
            None,
            &[],
            60.0,
        )
        .unwrap();
        let ctx = IecContext::default();
        let mags = get_magnitudes(&points, &profiles, &ctx, 600, 60.0);
        assert!(mags.iter().all(|&m| m == 0.0));
    }
}
