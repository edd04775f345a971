// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.

//! From correlated Fourier coefficients to the final time-series box.

use ndarray::prelude::*;

use super::{SpectralRun, TurbTimeSeries};
use crate::grid::Component;
use crate::math::irfft_over_time;
use crate::profiles::IecContext;
use crate::types::TurbFloat;

/// Inverse-transform the spectrum, drop the constraint columns and add the
/// mean wind speed (u columns) and veer (v columns).
pub(super) fn assemble_time_series<T: TurbFloat>(
    run: SpectralRun<T>,
    ctx: &IecContext,
    dt: f64,
) -> TurbTimeSeries<T> {
    let SpectralRun {
        turb_fft,
        n_t,
        n_d,
        kept_points,
        profiles,
    } = run;

    let all = irfft_over_time(turb_fft.view(), n_t);
    let mut values = all.slice(s![.., n_d..]).to_owned();

    for (j, p) in kept_points.iter().enumerate() {
        let offset = match p.comp {
            Component::U => profiles.wsp(ctx, p.y, p.z),
            Component::V => profiles.veer(ctx, p.y, p.z),
            Component::W => 0.0,
        };
        let offset = T::of_f64(offset);
        values.column_mut(j).mapv_inplace(|v| v + offset);
    }

    TurbTimeSeries {
        time: (0..n_t).map(|i| i as f64 * dt).collect(),
        points: kept_points,
        values,
    }
}
