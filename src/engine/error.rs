// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.

//! Error type for turbulence generation.

use thiserror::Error;

use crate::checkpoint::CheckpointError;
use crate::coherence::CoherenceError;
use crate::constraint::ConstraintError;
use crate::profiles::ProfileError;

#[derive(Error, Debug)]
pub enum GenTurbError {
    #[error("The simulation duration must be positive (got {0} s)")]
    NonPositiveDuration(f64),

    #[error("The time step must be positive (got {0} s)")]
    NonPositiveTimeStep(f64),

    #[error("Duration {t} s at time step {dt} s gives only {n_t} sample(s); at least 2 are needed")]
    TooFewTimeSteps { t: f64, dt: f64, n_t: usize },

    #[error("nf_chunk must be at least 1")]
    ZeroChunkSize,

    #[error("combine_freq_data requires write_freq_data")]
    CombineWithoutWrite,

    #[error(transparent)]
    Constraint(#[from] ConstraintError),

    #[error(transparent)]
    Coherence(#[from] CoherenceError),

    #[error(transparent)]
    Profile(#[from] ProfileError),

    #[error(
        "The covariance matrix at frequency index {i_f} is not positive definite; \
         check the standard-deviation and coherence parameters"
    )]
    NonPositiveDefinite { i_f: usize },

    #[error(transparent)]
    Checkpoint(#[from] CheckpointError),
}
