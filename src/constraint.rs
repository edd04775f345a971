// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.

//! Measured time series that constrain the simulation.
//!
//! The on-disk form is a CSV with a header row of channel names, four rows
//! labelled `k`, `x`, `y`, `z` describing each channel's component and
//! position, and the remaining rows indexed by time in seconds.

use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::{Path, PathBuf};

use ndarray::prelude::*;
use num_complex::Complex;
use thiserror::Error;

use crate::constants::{TIME_GRID_ATOL, TIME_GRID_RTOL};
use crate::grid::{Component, SpatPoint};
use crate::math::rfft_over_time;

#[derive(Error, Debug)]
pub enum ConstraintError {
    #[error("Couldn't read constraint file {}: {source}", .path.display())]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("Couldn't read constraint data: {0}")]
    Stream(#[from] std::io::Error),

    #[error("The constraint file is empty!")]
    Empty,

    #[error("The constraint file has no data channels!")]
    NoChannels,

    #[error("Line {line}: index label '{label}' is neither one of k,x,y,z nor a time in seconds")]
    UnknownIndexLabel { label: String, line: usize },

    #[error("Line {line}: expected {expected} values but found {got}")]
    WrongColumnCount {
        line: usize,
        expected: usize,
        got: usize,
    },

    #[error("Line {line}: value in column {column} is not a number")]
    BadValue { line: usize, column: usize },

    #[error("The constraint file has no '{label}' row!")]
    MissingSpatialRow { label: char },

    #[error("The constraint file has more than one '{label}' row!")]
    DuplicateSpatialRow { label: char },

    #[error("Channel '{channel}' has component code {value}, but only 0 (u), 1 (v) and 2 (w) exist")]
    BadComponent { channel: String, value: f64 },

    #[error("The constraint file has no time rows!")]
    NoTimeRows,

    #[error(
        "Constraint time does not match the requested duration and time step \
         (expected {expected} steps, found {got})"
    )]
    TimeStepCountMismatch { expected: usize, got: usize },

    #[error(
        "Constraint time does not match the requested duration and time step \
         (sample {index} is at {got} s, expected {expected} s)"
    )]
    TimeValueMismatch {
        index: usize,
        expected: f64,
        got: f64,
    },

    #[error("Constraint data must have one column per channel ({points} channels, {cols} columns)")]
    ShapeMismatch { points: usize, cols: usize },
}

/// A set of constrained channels: positions plus measured time series.
#[derive(Debug, Clone)]
pub struct TimeConstraint {
    points: Vec<SpatPoint>,
    names: Vec<String>,
    times: Vec<f64>,
    /// Shape `(n_t, n_d)`.
    data: Array2<f64>,
}

impl TimeConstraint {
    /// Build a constraint set directly from arrays. `data` must have one row
    /// per entry of `times` and one column per point.
    pub fn new(
        points: Vec<SpatPoint>,
        times: Vec<f64>,
        data: Array2<f64>,
    ) -> Result<TimeConstraint, ConstraintError> {
        if points.is_empty() {
            return Err(ConstraintError::NoChannels);
        }
        if data.ncols() != points.len() {
            return Err(ConstraintError::ShapeMismatch {
                points: points.len(),
                cols: data.ncols(),
            });
        }
        if times.is_empty() || data.nrows() != times.len() {
            return Err(ConstraintError::NoTimeRows);
        }
        let names = (0..points.len()).map(|i| format!("chan_{i}")).collect();
        Ok(TimeConstraint {
            points,
            names,
            times,
            data,
        })
    }

    pub fn from_csv_path(path: &Path) -> Result<TimeConstraint, ConstraintError> {
        let file = File::open(path).map_err(|source| ConstraintError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_csv_reader(BufReader::new(file))
    }

    pub fn from_csv_reader<R: BufRead>(reader: R) -> Result<TimeConstraint, ConstraintError> {
        let mut lines = reader.lines().enumerate();

        // Header row: channel names. The leading cell is the index column.
        let names: Vec<String> = match lines.next() {
            Some((_, Ok(header))) => header
                .trim_end()
                .split(',')
                .skip(1)
                .map(|s| s.trim().to_string())
                .collect(),
            Some((_, Err(source))) => return Err(ConstraintError::Stream(source)),
            None => return Err(ConstraintError::Empty),
        };
        if names.is_empty() {
            return Err(ConstraintError::NoChannels);
        }
        let n_d = names.len();

        let mut spat_rows: [Option<Vec<f64>>; 4] = [None, None, None, None];
        let mut times = vec![];
        let mut rows: Vec<Vec<f64>> = vec![];

        for (i_line, line) in lines {
            let line = line?;
            if line.trim().is_empty() {
                continue;
            }
            let mut cells = line.trim_end().split(',');
            let label = cells.next().unwrap_or("").trim().to_string();
            let values = cells
                .enumerate()
                .map(|(i_col, cell)| {
                    cell.trim()
                        .parse::<f64>()
                        .map_err(|_| ConstraintError::BadValue {
                            line: i_line + 1,
                            column: i_col + 1,
                        })
                })
                .collect::<Result<Vec<f64>, _>>()?;
            if values.len() != n_d {
                return Err(ConstraintError::WrongColumnCount {
                    line: i_line + 1,
                    expected: n_d,
                    got: values.len(),
                });
            }

            let spat_slot = match label.as_str() {
                "k" => Some(0),
                "x" => Some(1),
                "y" => Some(2),
                "z" => Some(3),
                _ => None,
            };
            match spat_slot {
                Some(slot) => {
                    if spat_rows[slot].is_some() {
                        return Err(ConstraintError::DuplicateSpatialRow {
                            label: "kxyz".as_bytes()[slot] as char,
                        });
                    }
                    spat_rows[slot] = Some(values);
                }
                None => match label.parse::<f64>() {
                    Ok(t) => {
                        times.push(t);
                        rows.push(values);
                    }
                    Err(_) => {
                        return Err(ConstraintError::UnknownIndexLabel {
                            label,
                            line: i_line + 1,
                        })
                    }
                },
            }
        }

        let [k_row, x_row, y_row, z_row] = spat_rows;
        let k_row = k_row.ok_or(ConstraintError::MissingSpatialRow { label: 'k' })?;
        let x_row = x_row.ok_or(ConstraintError::MissingSpatialRow { label: 'x' })?;
        let y_row = y_row.ok_or(ConstraintError::MissingSpatialRow { label: 'y' })?;
        let z_row = z_row.ok_or(ConstraintError::MissingSpatialRow { label: 'z' })?;

        let mut points = Vec::with_capacity(n_d);
        for i in 0..n_d {
            let k = k_row[i];
            let comp = if (k - k.round()).abs() < f64::EPSILON && k >= 0.0 {
                Component::from_index(k.round() as usize)
            } else {
                None
            };
            let comp = comp.ok_or_else(|| ConstraintError::BadComponent {
                channel: names[i].clone(),
                value: k,
            })?;
            points.push(SpatPoint {
                comp,
                x: x_row[i],
                y: y_row[i],
                z: z_row[i],
            });
        }

        if times.is_empty() {
            return Err(ConstraintError::NoTimeRows);
        }
        let n_t = times.len();
        let mut data = Array2::zeros((n_t, n_d));
        for (i_t, row) in rows.iter().enumerate() {
            for (i_d, &v) in row.iter().enumerate() {
                data[[i_t, i_d]] = v;
            }
        }

        Ok(TimeConstraint {
            points,
            names,
            times,
            data,
        })
    }

    /// Number of constrained channels.
    pub fn n_d(&self) -> usize {
        self.points.len()
    }

    pub fn points(&self) -> &[SpatPoint] {
        &self.points
    }

    pub fn names(&self) -> &[String] {
        &self.names
    }

    pub fn times(&self) -> &[f64] {
        &self.times
    }

    /// The measured samples, shape `(n_t, n_d)`.
    pub fn data(&self) -> ArrayView2<f64> {
        self.data.view()
    }

    /// Check that the constraint's time grid is `dt * [0, n_t)`.
    pub(crate) fn check_time_grid(&self, dt: f64, n_t: usize) -> Result<(), ConstraintError> {
        if self.times.len() != n_t {
            return Err(ConstraintError::TimeStepCountMismatch {
                expected: n_t,
                got: self.times.len(),
            });
        }
        for (i, &t) in self.times.iter().enumerate() {
            let expected = i as f64 * dt;
            if (t - expected).abs() > TIME_GRID_ATOL + TIME_GRID_RTOL * expected.abs() {
                return Err(ConstraintError::TimeValueMismatch {
                    index: i,
                    expected,
                    got: t,
                });
            }
        }
        Ok(())
    }

    /// One-sided FFT of the constraint time series divided by `n_t`, shape
    /// `(n_f, n_d)`.
    pub fn time_fft(&self) -> Array2<Complex<f64>> {
        rfft_over_time(self.data.view())
    }

    /// `|time_fft()|`.
    pub fn magnitudes(&self) -> Array2<f64> {
        self.time_fft().mapv(|c| c.norm())
    }

    /// Per-channel time means.
    pub(crate) fn channel_means(&self) -> Vec<f64> {
        self.data
            .columns()
            .into_iter()
            .map(|c| c.sum() / c.len() as f64)
            .collect()
    }

    /// Per-channel sample standard deviations (ddof = 1).
    pub(crate) fn channel_stds(&self) -> Vec<f64> {
        self.data
            .columns()
            .into_iter()
            .map(|c| {
                let n = c.len() as f64;
                let mean = c.sum() / n;
                let ss: f64 = c.iter().map(|&v| (v - mean) * (v - mean)).sum();
                if n > 1.0 {
                    (ss / (n - 1.0)).sqrt()
                } else {
                    0.0
                }
            })
            .collect()
    }
}
