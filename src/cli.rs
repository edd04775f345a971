// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.

//! Command-line interface of the `conturb` binary.
//!
//! Arguments may come from the command line, from a TOML case file, or both;
//! explicit flags always win over the case file, which wins over the
//! defaults.

use std::path::PathBuf;
use std::str::FromStr;

use clap::Parser;
use log::info;
use serde::Deserialize;
use thiserror::Error;

use crate::coherence::{CohModel, CohParams};
use crate::constants::{DEFAULT_ALPHA, DEFAULT_L_C, DEFAULT_U_REF, DEFAULT_Z_HUB, DEFAULT_Z_REF};
use crate::constraint::TimeConstraint;
use crate::engine::{gen_turb, GenTurbOutcome, SimOptions};
use crate::error::ConTurbError;
use crate::grid::SpatialGrid;
use crate::math::linspace;
use crate::output::write_box;
use crate::profiles::{IecContext, InterpData, Profiles, TurbClass};
use crate::types::{Precision, TurbFloat};

#[derive(Error, Debug)]
pub enum CliError {
    #[error("Couldn't read case file {}: {source}", .path.display())]
    CaseRead {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("Couldn't parse case file {}: {source}", .path.display())]
    CaseParse {
        path: PathBuf,
        source: toml::de::Error,
    },

    #[error("Missing required parameter '{0}'; give it on the command line or in the case file")]
    MissingParam(&'static str),

    #[error("{0}")]
    BadValue(String),
}

impl From<CliError> for ConTurbError {
    fn from(e: CliError) -> Self {
        let s = e.to_string();
        match e {
            CliError::CaseRead { .. } => Self::Generic(s),
            CliError::CaseParse { .. } | CliError::MissingParam(_) | CliError::BadValue(_) => {
                Self::Precondition(s)
            }
        }
    }
}

/// Generate a turbulence box.
#[derive(Parser, Debug, Default)]
pub struct GenerateArgs {
    /// Path to a TOML case file; command-line flags override its values.
    #[clap(long, help_heading = "INPUT AND OUTPUT")]
    case: Option<PathBuf>,

    /// Path to the constraint CSV (header row of channel names, k/x/y/z
    /// rows, then time rows).
    #[clap(short, long, help_heading = "INPUT AND OUTPUT")]
    constraints: Option<PathBuf>,

    /// Prefix of all output files (the box and any frequency files).
    #[clap(short = 'o', long, help_heading = "INPUT AND OUTPUT")]
    out: Option<String>,

    /// Lateral grid extent [m].
    #[clap(long, help_heading = "GRID")]
    ymin: Option<f64>,
    #[clap(long, help_heading = "GRID")]
    ymax: Option<f64>,
    /// Number of lateral grid points.
    #[clap(long, help_heading = "GRID")]
    ny: Option<usize>,
    /// Vertical grid extent [m].
    #[clap(long, help_heading = "GRID")]
    zmin: Option<f64>,
    #[clap(long, help_heading = "GRID")]
    zmax: Option<f64>,
    /// Number of vertical grid points.
    #[clap(long, help_heading = "GRID")]
    nz: Option<usize>,

    /// Total simulated duration [s].
    #[clap(short = 'T', long, help_heading = "RUN PARAMETERS")]
    duration: Option<f64>,

    /// Time step [s].
    #[clap(long, help_heading = "RUN PARAMETERS")]
    time_step: Option<f64>,

    /// Seed for the phasor stream; omit to seed from entropy.
    #[clap(short, long, help_heading = "RUN PARAMETERS")]
    seed: Option<u64>,

    /// Working precision: single or double.
    #[clap(long, help_heading = "RUN PARAMETERS")]
    dtype: Option<String>,

    /// Frequencies per coherence chunk.
    #[clap(long, help_heading = "RUN PARAMETERS")]
    nf_chunk: Option<usize>,

    /// Coherence model: iec or 3d.
    #[clap(long, help_heading = "MODEL PARAMETERS")]
    coh_model: Option<String>,

    /// Reference mean wind speed [m/s].
    #[clap(long, help_heading = "MODEL PARAMETERS")]
    u_ref: Option<f64>,

    /// Coherence length scale [m].
    #[clap(long, help_heading = "MODEL PARAMETERS")]
    l_c: Option<f64>,

    /// IEC edition (only 3 is accepted).
    #[clap(long, help_heading = "MODEL PARAMETERS")]
    edition: Option<u8>,

    /// Reproduce the legacy coherence numerics bit-for-bit.
    #[clap(long, help_heading = "MODEL PARAMETERS")]
    backward_comp: bool,

    /// Reference height of the power-law profile [m].
    #[clap(long, help_heading = "MODEL PARAMETERS")]
    z_ref: Option<f64>,

    /// Power-law shear exponent.
    #[clap(long, help_heading = "MODEL PARAMETERS")]
    alpha: Option<f64>,

    /// IEC turbulence class: A, B or C.
    #[clap(long, help_heading = "MODEL PARAMETERS")]
    turb_class: Option<String>,

    /// Hub height [m].
    #[clap(long, help_heading = "MODEL PARAMETERS")]
    z_hub: Option<f64>,

    /// Profiles to interpolate from the constraints: none, all, or a
    /// comma-separated subset of wsp,sig,spec.
    #[clap(long, help_heading = "MODEL PARAMETERS")]
    interp_data: Option<String>,

    /// Persist each frequency to disk (parallel workers share a prefix).
    #[clap(long, help_heading = "CHECKPOINTING")]
    write_freq_data: bool,

    /// Combine the per-frequency files into the final box.
    #[clap(long, help_heading = "CHECKPOINTING")]
    combine_freq_data: bool,

    /// Don't draw progress bars.
    #[clap(long, help_heading = "USER INTERFACE")]
    no_progress_bars: bool,
}

/// The case-file mirror of [`GenerateArgs`].
#[derive(Deserialize, Debug, Default)]
#[serde(deny_unknown_fields)]
struct CaseFile {
    constraints: Option<PathBuf>,
    out: Option<String>,
    ymin: Option<f64>,
    ymax: Option<f64>,
    ny: Option<usize>,
    zmin: Option<f64>,
    zmax: Option<f64>,
    nz: Option<usize>,
    duration: Option<f64>,
    time_step: Option<f64>,
    seed: Option<u64>,
    dtype: Option<String>,
    nf_chunk: Option<usize>,
    coh_model: Option<String>,
    u_ref: Option<f64>,
    l_c: Option<f64>,
    edition: Option<u8>,
    backward_comp: Option<bool>,
    z_ref: Option<f64>,
    alpha: Option<f64>,
    turb_class: Option<String>,
    z_hub: Option<f64>,
    interp_data: Option<String>,
}

impl GenerateArgs {
    pub fn run(&self, dry_run: bool) -> Result<(), ConTurbError> {
        let params = GenerateParams::new(self)?;
        if dry_run {
            info!("Dry run; stopping before generation");
            return Ok(());
        }
        params.run()
    }
}

/// Validated parameters of a generation run.
#[derive(Debug)]
struct GenerateParams {
    grid: SpatialGrid,
    con_tc: Option<TimeConstraint>,
    opts: SimOptions,
    precision: Precision,
    out_prefix: String,
}

impl GenerateParams {
    fn new(args: &GenerateArgs) -> Result<GenerateParams, ConTurbError> {
        let case = match &args.case {
            Some(path) => {
                let text = std::fs::read_to_string(path).map_err(|source| CliError::CaseRead {
                    path: path.clone(),
                    source,
                })?;
                toml::from_str(&text).map_err(|source| CliError::CaseParse {
                    path: path.clone(),
                    source,
                })?
            }
            None => CaseFile::default(),
        };

        let require_f64 = |flag: Option<f64>, file: Option<f64>, name: &'static str| {
            flag.or(file).ok_or(CliError::MissingParam(name))
        };
        let ymin = require_f64(args.ymin, case.ymin, "ymin")?;
        let ymax = require_f64(args.ymax, case.ymax, "ymax")?;
        let zmin = require_f64(args.zmin, case.zmin, "zmin")?;
        let zmax = require_f64(args.zmax, case.zmax, "zmax")?;
        let ny = args.ny.or(case.ny).ok_or(CliError::MissingParam("ny"))?;
        let nz = args.nz.or(case.nz).ok_or(CliError::MissingParam("nz"))?;
        let grid = SpatialGrid::new(&linspace(ymin, ymax, ny), &linspace(zmin, zmax, nz))?;

        let con_path = args.constraints.as_ref().or(case.constraints.as_ref());
        let con_tc = match con_path {
            Some(path) => Some(TimeConstraint::from_csv_path(path)?),
            None => None,
        };

        let parse_enum = |flag: &Option<String>, file: &Option<String>| {
            flag.as_deref().or(file.as_deref()).map(str::to_string)
        };
        let precision = match parse_enum(&args.dtype, &case.dtype) {
            Some(s) => Precision::from_str(&s).map_err(CliError::BadValue)?,
            None => Precision::Double,
        };
        let coh_model = match parse_enum(&args.coh_model, &case.coh_model) {
            Some(s) => CohModel::from_str(&s).map_err(CliError::BadValue)?,
            None => CohModel::Iec,
        };
        let turb_class = match parse_enum(&args.turb_class, &case.turb_class) {
            Some(s) => TurbClass::from_str(&s).map_err(CliError::BadValue)?,
            None => TurbClass::B,
        };
        let interp_data = match parse_enum(&args.interp_data, &case.interp_data) {
            Some(s) => InterpData::from_str(&s).map_err(|e| CliError::BadValue(e.to_string()))?,
            None => InterpData::None,
        };

        let u_ref = args.u_ref.or(case.u_ref).unwrap_or(DEFAULT_U_REF);
        let l_c = args.l_c.or(case.l_c).unwrap_or(DEFAULT_L_C);
        let iec = IecContext {
            u_ref,
            z_ref: args.z_ref.or(case.z_ref).unwrap_or(DEFAULT_Z_REF),
            alpha: args.alpha.or(case.alpha).unwrap_or(DEFAULT_ALPHA),
            turb_class,
            z_hub: args.z_hub.or(case.z_hub).unwrap_or(DEFAULT_Z_HUB),
            l_c,
        };
        let coh_params = CohParams {
            u_ref,
            l_c,
            edition: args.edition.or(case.edition).unwrap_or(3),
            backward_comp: args.backward_comp || case.backward_comp.unwrap_or(false),
        };

        let out_prefix = args
            .out
            .clone()
            .or(case.out)
            .unwrap_or_else(String::new);
        let opts = SimOptions {
            t_total: args.duration.or(case.duration).unwrap_or(600.0),
            dt: args.time_step.or(case.time_step).unwrap_or(1.0),
            seed: args.seed.or(case.seed),
            nf_chunk: args.nf_chunk.or(case.nf_chunk).unwrap_or(1),
            coh_model,
            coh_params,
            iec,
            interp_data,
            write_freq_data: args.write_freq_data,
            combine_freq_data: args.combine_freq_data,
            prefix: out_prefix.clone(),
            draw_progress: !args.no_progress_bars,
            ..SimOptions::default()
        };

        Ok(GenerateParams {
            grid,
            con_tc,
            opts,
            precision,
            out_prefix,
        })
    }

    fn run(&self) -> Result<(), ConTurbError> {
        match self.precision {
            Precision::Single => self.run_with_precision::<f32>(),
            Precision::Double => self.run_with_precision::<f64>(),
        }
    }

    fn run_with_precision<T: TurbFloat>(&self) -> Result<(), ConTurbError> {
        info!(
            "Simulating {} grid points at {} precision",
            self.grid.len(),
            self.precision
        );
        match gen_turb::<T>(
            &self.grid,
            self.con_tc.as_ref(),
            Profiles::default(),
            &self.opts,
        )? {
            GenTurbOutcome::TimeSeries(ts) => {
                let path = PathBuf::from(format!("{}box.ctb", self.out_prefix));
                write_box(&path, &ts)?;
                info!(
                    "Wrote {} samples x {} points to {}",
                    ts.time.len(),
                    ts.points.len(),
                    path.display()
                );
            }
            GenTurbOutcome::NothingToSimulate => {
                info!("All simulation points collocated with constraints; no box written");
            }
            GenTurbOutcome::FrequencyDataWritten => {
                info!(
                    "Frequency files written under prefix '{}'; run with --combine-freq-data to assemble the box",
                    self.out_prefix
                );
            }
        }
        Ok(())
    }
}

/// Route log messages through fern.
pub fn setup_logging(verbosity: u8) -> Result<(), log::SetLoggerError> {
    let level = match verbosity {
        0 => log::LevelFilter::Info,
        1 => log::LevelFilter::Debug,
        _ => log::LevelFilter::Trace,
    };
    fern::Dispatch::new()
        .format(|out, message, record| {
            out.finish(format_args!(
                "{} [{}] {}",
                chrono::Local::now().format("%Y-%m-%d %H:%M:%S"),
                record.level(),
                message
            ))
        })
        .level(level)
        .chain(std::io::stdout())
        .apply()
}
