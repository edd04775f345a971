// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.

//! Constrained turbulence-box generation.
//!
//! Generates a synthetic turbulent wind field on a rectangular Y-Z grid.
//! Measured time series may constrain a subset of points; the generated
//! field reproduces them exactly while staying statistically consistent
//! (coherence, spectrum, standard deviation, mean profile) everywhere else.

pub mod checkpoint;
mod cli;
pub mod coherence;
pub(crate) mod constants;
pub mod constraint;
pub mod engine;
pub(crate) mod error;
pub mod grid;
pub(crate) mod magnitude;
pub(crate) mod math;
pub mod output;
pub mod profiles;
pub mod types;

// Re-exports.
pub use cli::{setup_logging, GenerateArgs};
pub use coherence::{CohModel, CohParams};
pub use constraint::TimeConstraint;
pub use engine::{gen_turb, GenTurbError, GenTurbOutcome, SimOptions, TurbTimeSeries};
pub use error::ConTurbError;
pub use grid::{Component, SpatPoint, SpatialGrid};
pub use profiles::{
    IecContext, InterpData, InterpField, Profiles, SigProfile, SpecModel, TurbClass, VeerProfile,
    WspProfile,
};
pub use types::{Precision, TurbFloat};
