// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.

//! Runtime-selectable working precision.
//!
//! The spectral engine is generic over [`TurbFloat`] so a run can use either
//! single or double precision without duplicated code; [`Precision`] is the
//! run-time tag that callers (e.g. the CLI) dispatch on.

use std::io;
use std::str::FromStr;

use byteorder::{LittleEndian, ReadBytesExt, WriteBytesExt};

/// Floating-point types the engine can work in (`f32` or `f64`).
///
/// Randomness and profile evaluation stay in `f64`; values cross into the
/// working precision through [`TurbFloat::of_f64`].
pub trait TurbFloat: rustfft::FftNum + num_traits::Float {
    /// Width of one scalar in bytes; recorded in binary file headers.
    const WIDTH: u8;

    fn of_f64(v: f64) -> Self;
    fn as_f64(self) -> f64;

    /// Write one scalar as little-endian bytes.
    fn write_le<W: io::Write>(self, w: &mut W) -> io::Result<()>;

    /// Read one little-endian scalar.
    fn read_le<R: io::Read>(r: &mut R) -> io::Result<Self>;
}

impl TurbFloat for f32 {
    const WIDTH: u8 = 4;

    fn of_f64(v: f64) -> Self {
        v as f32
    }

    fn as_f64(self) -> f64 {
        self as f64
    }

    fn write_le<W: io::Write>(self, w: &mut W) -> io::Result<()> {
        w.write_f32::<LittleEndian>(self)
    }

    fn read_le<R: io::Read>(r: &mut R) -> io::Result<Self> {
        r.read_f32::<LittleEndian>()
    }
}

impl TurbFloat for f64 {
    const WIDTH: u8 = 8;

    fn of_f64(v: f64) -> Self {
        v
    }

    fn as_f64(self) -> f64 {
        self
    }

    fn write_le<W: io::Write>(self, w: &mut W) -> io::Result<()> {
        w.write_f64::<LittleEndian>(self)
    }

    fn read_le<R: io::Read>(r: &mut R) -> io::Result<Self> {
        r.read_f64::<LittleEndian>()
    }
}

/// Working precision of a run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Precision {
    Single,
    Double,
}

impl FromStr for Precision {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "single" | "f32" => Ok(Precision::Single),
            "double" | "f64" => Ok(Precision::Double),
            other => Err(format!(
                "Unrecognised precision '{other}'; expected 'single' or 'double'"
            )),
        }
    }
}

impl std::fmt::Display for Precision {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        match self {
            Precision::Single => write!(f, "single"),
            Precision::Double => write!(f, "double"),
        }
    }
}
