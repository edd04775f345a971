// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.

//! Spatial coherence models.
//!
//! Both models use the IEC 61400-1 Ed. 3 exponential form
//! `exp(-12 r sqrt((f / u_ref)^2 + (0.12 / l_c)^2))` between two points a
//! distance `r` apart in the Y-Z plane. The IEC model couples u components
//! only; the 3-D model couples every component with itself, with the length
//! scale reduced for v and w. Cross-component coherence is always zero.

use std::str::FromStr;

use itertools::Itertools;
use ndarray::prelude::*;
use thiserror::Error;

use crate::constants::{DEFAULT_L_C, DEFAULT_U_REF, IEC_EDITION, PAIR_CHUNK_SIZE};
use crate::grid::{Component, SpatPoint};
use crate::types::TurbFloat;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum CoherenceError {
    #[error("Only IEC edition 3 is permitted (got edition {0})")]
    UnsupportedEdition(u8),

    #[error("Coherence parameter {name} must be positive (got {value})")]
    NonPositiveParam { name: &'static str, value: f64 },
}

/// Which coherence model to use.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CohModel {
    /// IEC 61400-1 Ed. 3: u components only.
    Iec,
    /// Per-component exponential coherence with scaled length scales.
    ThreeD,
}

impl FromStr for CohModel {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "iec" => Ok(CohModel::Iec),
            "3d" => Ok(CohModel::ThreeD),
            other => Err(format!("Coherence model '{other}' not recognised")),
        }
    }
}

/// Parameters of the exponential coherence models.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CohParams {
    /// Reference mean wind speed \[m/s\].
    pub u_ref: f64,
    /// Coherence length scale \[m\].
    pub l_c: f64,
    /// IEC edition; only 3 is accepted.
    pub edition: u8,
    /// Reproduce the legacy pair-level numerics bit-for-bit.
    pub backward_comp: bool,
}

impl Default for CohParams {
    fn default() -> Self {
        CohParams {
            u_ref: DEFAULT_U_REF,
            l_c: DEFAULT_L_C,
            edition: IEC_EDITION,
            backward_comp: false,
        }
    }
}

impl CohParams {
    pub(crate) fn validate(&self) -> Result<(), CoherenceError> {
        if self.edition != IEC_EDITION {
            return Err(CoherenceError::UnsupportedEdition(self.edition));
        }
        if !(self.u_ref > 0.0) {
            return Err(CoherenceError::NonPositiveParam {
                name: "u_ref",
                value: self.u_ref,
            });
        }
        if !(self.l_c > 0.0) {
            return Err(CoherenceError::NonPositiveParam {
                name: "l_c",
                value: self.l_c,
            });
        }
        Ok(())
    }
}

/// Length-scale reduction per component in the 3-D model.
fn lc_scale(comp: Component) -> f64 {
    match comp {
        Component::U => 1.0,
        Component::V => 2.7 / 8.1,
        Component::W => 0.66 / 8.1,
    }
}

/// Coherence tensor for the given frequencies, shape
/// `(freqs.len(), n_points, n_points)`: symmetric with unit diagonal.
pub(crate) fn get_coh_mat<T: TurbFloat>(
    freqs: &[f64],
    points: &[SpatPoint],
    model: CohModel,
    params: &CohParams,
) -> Result<Array3<T>, CoherenceError> {
    params.validate()?;
    let n_s = points.len();
    let n_f = freqs.len();
    let mut coh = Array3::zeros((n_f, n_s, n_s));
    for i_f in 0..n_f {
        for i in 0..n_s {
            coh[[i_f, i, i]] = T::one();
        }
    }

    let comps: &[Component] = match model {
        CohModel::Iec => &[Component::U],
        CohModel::ThreeD => &Component::ALL,
    };
    for &comp in comps {
        let l_c = params.l_c * lc_scale(comp);
        let indices: Vec<usize> = points
            .iter()
            .enumerate()
            .filter(|(_, p)| p.comp == comp)
            .map(|(i, _)| i)
            .collect();
        // One frequency-dependent factor, multiplied by the scalar pair
        // distance inside the loop.
        let exp_const: Vec<f64> = freqs
            .iter()
            .map(|&f| ((f / params.u_ref).powi(2) + (0.12 / l_c).powi(2)).sqrt())
            .collect();

        let pair_iter = indices.iter().copied().tuple_combinations::<(usize, usize)>();
        for chunk in &pair_iter.chunks(PAIR_CHUNK_SIZE) {
            let pairs: Vec<(usize, usize, f64)> = chunk
                .map(|(i, j)| {
                    let (pi, pj) = (&points[i], &points[j]);
                    let r = ((pi.y - pj.y).powi(2) + (pi.z - pj.z).powi(2)).sqrt();
                    (i, j, r)
                })
                .collect();
            for (i_f, &f) in freqs.iter().enumerate() {
                for &(i, j, r) in &pairs {
                    let v = if params.backward_comp {
                        // Legacy numerics: distance inside the square root.
                        (-12.0
                            * ((r / params.u_ref * f).powi(2) + (0.12 * r / l_c).powi(2)).sqrt())
                        .exp()
                    } else {
                        (-12.0 * r * exp_const[i_f]).exp()
                    };
                    let v = T::of_f64(v);
                    coh[[i_f, i, j]] = v;
                    coh[[i_f, j, i]] = v;
                }
            }
        }
    }
    Ok(coh)
}
