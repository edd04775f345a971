// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.

/*!
Useful constants.

All constants are double precision. `conturb` does as many calculations as
possible in double precision before converting to a lower precision, if that
is ever required.
 */

/// Absolute tolerance when deciding whether two spatial points are colocated
/// \[metres\].
pub(crate) const COLOCATION_TOL: f64 = 1e-6;

/// Number of point-pairs handled at a time when filling coherence matrices.
/// Bounds the transient memory of the pair loop.
pub(crate) const PAIR_CHUNK_SIZE: usize = 10_000;

/// Default reference mean wind speed \[m/s\].
pub const DEFAULT_U_REF: f64 = 10.0;

/// Default reference height for the power-law wind profile \[m\].
pub const DEFAULT_Z_REF: f64 = 90.0;

/// Default power-law shear exponent.
pub const DEFAULT_ALPHA: f64 = 0.2;

/// Default coherence length scale \[m\] (IEC 61400-1 Ed. 3 with hub height
/// above 60 m: 8.1 * 42).
pub const DEFAULT_L_C: f64 = 340.2;

/// Default hub height \[m\]; sets the Kaimal integral length scale.
pub const DEFAULT_Z_HUB: f64 = 90.0;

/// The only IEC edition supported by the exponential coherence model.
pub const IEC_EDITION: u8 = 3;

/// Relative and absolute tolerances used when comparing the constraint time
/// grid against the simulation time grid.
pub(crate) const TIME_GRID_RTOL: f64 = 1e-5;
pub(crate) const TIME_GRID_ATOL: f64 = 1e-8;
