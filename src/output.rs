// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.

//! Reading and writing generated turbulence boxes.
//!
//! The `.ctb` layout is little-endian throughout: 8 magic bytes, the scalar
//! width, `n_t`, `n_p` and `dt`, then the point table (component code plus
//! x, y, z) and the samples in time-major order.

use std::fs::File;
use std::io::{BufReader, BufWriter, Read, Write};
use std::path::{Path, PathBuf};

use byteorder::{LittleEndian, ReadBytesExt, WriteBytesExt};
use ndarray::Array2;
use thiserror::Error;

use crate::engine::TurbTimeSeries;
use crate::grid::{Component, SpatPoint};
use crate::types::TurbFloat;

pub(crate) const BOX_MAGIC: [u8; 8] = *b"CTURBBOX";

#[derive(Error, Debug)]
pub enum OutputError {
    #[error("Couldn't access turbulence box {}: {source}", .path.display())]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("{} is not a conturb box file (bad magic)", .path.display())]
    BadMagic { path: PathBuf },

    #[error(
        "{} holds {got}-byte scalars, but this run works in {expected}-byte precision",
        .path.display()
    )]
    PrecisionMismatch {
        path: PathBuf,
        expected: u8,
        got: u8,
    },

    #[error("{} has an invalid component code {code}", .path.display())]
    BadComponent { path: PathBuf, code: u8 },
}

/// Write a generated box to `path`.
pub fn write_box<T: TurbFloat>(path: &Path, ts: &TurbTimeSeries<T>) -> Result<(), OutputError> {
    let io_err = |source| OutputError::Io {
        path: path.to_path_buf(),
        source,
    };
    let mut w = BufWriter::new(File::create(path).map_err(io_err)?);
    let inner = |w: &mut BufWriter<File>| -> std::io::Result<()> {
        w.write_all(&BOX_MAGIC)?;
        w.write_u8(T::WIDTH)?;
        w.write_u64::<LittleEndian>(ts.time.len() as u64)?;
        w.write_u64::<LittleEndian>(ts.points.len() as u64)?;
        let dt = if ts.time.len() > 1 {
            ts.time[1] - ts.time[0]
        } else {
            0.0
        };
        w.write_f64::<LittleEndian>(dt)?;
        for p in &ts.points {
            w.write_u8(p.comp.index() as u8)?;
            w.write_f64::<LittleEndian>(p.x)?;
            w.write_f64::<LittleEndian>(p.y)?;
            w.write_f64::<LittleEndian>(p.z)?;
        }
        for row in ts.values.outer_iter() {
            for &v in row.iter() {
                v.write_le(w)?;
            }
        }
        w.flush()
    };
    inner(&mut w).map_err(io_err)
}

/// Read a box previously written by [`write_box`].
pub fn read_box<T: TurbFloat>(path: &Path) -> Result<TurbTimeSeries<T>, OutputError> {
    let io_err = |source| OutputError::Io {
        path: path.to_path_buf(),
        source,
    };
    let mut r = BufReader::new(File::open(path).map_err(io_err)?);
    let mut magic = [0u8; 8];
    r.read_exact(&mut magic).map_err(io_err)?;
    if magic != BOX_MAGIC {
        return Err(OutputError::BadMagic {
            path: path.to_path_buf(),
        });
    }
    let width = r.read_u8().map_err(io_err)?;
    if width != T::WIDTH {
        return Err(OutputError::PrecisionMismatch {
            path: path.to_path_buf(),
            expected: T::WIDTH,
            got: width,
        });
    }
    let n_t = r.read_u64::<LittleEndian>().map_err(io_err)? as usize;
    let n_p = r.read_u64::<LittleEndian>().map_err(io_err)? as usize;
    let dt = r.read_f64::<LittleEndian>().map_err(io_err)?;
    let mut points = Vec::with_capacity(n_p);
    for _ in 0..n_p {
        let code = r.read_u8().map_err(io_err)?;
        let comp = Component::from_index(code as usize).ok_or(OutputError::BadComponent {
            path: path.to_path_buf(),
            code,
        })?;
        let x = r.read_f64::<LittleEndian>().map_err(io_err)?;
        let y = r.read_f64::<LittleEndian>().map_err(io_err)?;
        let z = r.read_f64::<LittleEndian>().map_err(io_err)?;
        points.push(SpatPoint { comp, x, y, z });
    }
    let mut values = Array2::zeros((n_t, n_p));
    for i_t in 0..n_t {
        for i_p in 0..n_p {
            values[[i_t, i_p]] = T::read_le(&mut r).map_err(io_err)?;
        }
    }
    Ok(TurbTimeSeries {
        time: (0..n_t).map(|i| i as f64 * dt).collect(),
        points,
        values,
    })
}
