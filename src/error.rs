// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.

//! Error type for all conturb-related errors. This should be the *only*
//! error enum that is publicly visible, and it knows the process exit code
//! of every failure class.

use thiserror::Error;

use crate::checkpoint::CheckpointError;
use crate::constraint::ConstraintError;
use crate::engine::GenTurbError;
use crate::grid::GridError;
use crate::output::OutputError;

/// The *only* publicly visible error from conturb.
#[derive(Error, Debug)]
pub enum ConTurbError {
    /// Bad configuration or input shape: malformed constraint files, option
    /// combinations outside the recognised set, invalid grids.
    #[error("{0}")]
    Precondition(String),

    /// The per-frequency covariance could not be factorized.
    #[error("{0}")]
    Numerical(String),

    /// The combining worker gave up waiting for frequency files.
    #[error("{0}")]
    CheckpointTimeout(String),

    /// Everything else, e.g. plain IO errors.
    #[error("{0}")]
    Generic(String),
}

impl ConTurbError {
    /// The process exit code for this error class.
    pub fn exit_code(&self) -> i32 {
        match self {
            ConTurbError::Precondition(_) | ConTurbError::Generic(_) => 1,
            ConTurbError::Numerical(_) => 2,
            ConTurbError::CheckpointTimeout(_) => 3,
        }
    }
}

// When changing the error propagation below, ensure `Self::from(e)` uses the
// correct `e`!

impl From<GenTurbError> for ConTurbError {
    fn from(e: GenTurbError) -> Self {
        let s = e.to_string();
        match e {
            GenTurbError::NonPositiveDuration(_)
            | GenTurbError::NonPositiveTimeStep(_)
            | GenTurbError::TooFewTimeSteps { .. }
            | GenTurbError::ZeroChunkSize
            | GenTurbError::CombineWithoutWrite
            | GenTurbError::Coherence(_)
            | GenTurbError::Profile(_) => Self::Precondition(s),
            GenTurbError::Constraint(e) => Self::from(e),
            GenTurbError::NonPositiveDefinite { .. } => Self::Numerical(s),
            GenTurbError::Checkpoint(e) => Self::from(e),
        }
    }
}

impl From<ConstraintError> for ConTurbError {
    fn from(e: ConstraintError) -> Self {
        let s = e.to_string();
        match e {
            ConstraintError::Io { .. } | ConstraintError::Stream(_) => Self::Generic(s),
            _ => Self::Precondition(s),
        }
    }
}

impl From<CheckpointError> for ConTurbError {
    fn from(e: CheckpointError) -> Self {
        let s = e.to_string();
        match e {
            CheckpointError::Timeout { .. } => Self::CheckpointTimeout(s),
            _ => Self::Generic(s),
        }
    }
}

impl From<GridError> for ConTurbError {
    fn from(e: GridError) -> Self {
        Self::Precondition(e.to_string())
    }
}

impl From<OutputError> for ConTurbError {
    fn from(e: OutputError) -> Self {
        Self::Generic(e.to_string())
    }
}

impl From<std::io::Error> for ConTurbError {
    fn from(e: std::io::Error) -> Self {
        Self::Generic(e.to_string())
    }
}
