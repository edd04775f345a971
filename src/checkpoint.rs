// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.

//! Per-frequency persistence of correlated Fourier vectors.
//!
//! Several workers may run the same case with a shared filename prefix; the
//! presence of a frequency's file is the only synchronisation token. Writers
//! go through a temp file and an atomic rename, so a worker killed
//! mid-frequency leaves no partial file, and readers always see a complete
//! snapshot. A lost race costs at most one redundant recomputation.

use std::fs::{self, File};
use std::io::{self, BufReader, BufWriter, Read, Write};
use std::path::PathBuf;
use std::time::{Duration, Instant};

use byteorder::{LittleEndian, ReadBytesExt, WriteBytesExt};
use log::{debug, info, warn};
use ndarray::Array2;
use num_complex::Complex;
use thiserror::Error;

use crate::types::TurbFloat;

/// Magic bytes leading every frequency file.
pub(crate) const FREQ_MAGIC: [u8; 8] = *b"CTURBFRQ";

#[derive(Error, Debug)]
pub enum CheckpointError {
    #[error("Couldn't read frequency file {}: {source}", .path.display())]
    Read {
        path: PathBuf,
        source: io::Error,
    },

    #[error("{} is not a conturb frequency file (bad magic)", .path.display())]
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

    #[error("{} holds {got} values, expected {expected}", .path.display())]
    LengthMismatch {
        path: PathBuf,
        expected: usize,
        got: usize,
    },

    #[error(
        "Gave up waiting for frequency files after {} s; {missing} of {total} are still unreadable",
        .elapsed.as_secs()
    )]
    Timeout {
        elapsed: Duration,
        missing: usize,
        total: usize,
    },
}

/// Retry schedule for the combine phase: exponential backoff from `base`,
/// capped at `cap`, abandoned after `deadline`.
#[derive(Debug, Clone, Copy)]
pub struct RetryPolicy {
    pub base: Duration,
    pub cap: Duration,
    pub deadline: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        RetryPolicy {
            base: Duration::from_secs(10),
            cap: Duration::from_secs(300),
            deadline: Duration::from_secs(3600),
        }
    }
}

/// Reads and writes the per-frequency files under a shared prefix.
#[derive(Debug, Clone)]
pub struct CheckpointStore {
    prefix: String,
}

impl CheckpointStore {
    pub fn new(prefix: impl Into<String>) -> CheckpointStore {
        CheckpointStore {
            prefix: prefix.into(),
        }
    }

    /// The file holding frequency index `i_f`. The name doubles as the
    /// cross-worker synchronisation token.
    pub fn freq_path(&self, i_f: usize) -> PathBuf {
        PathBuf::from(format!("{}conturb_{}.bin", self.prefix, i_f))
    }

    pub(crate) fn exists(&self, i_f: usize) -> bool {
        self.freq_path(i_f).exists()
    }

    /// Write one frequency's correlated Fourier vector. Write errors are
    /// swallowed: another worker is expected to produce the file.
    pub(crate) fn write<T: TurbFloat>(&self, i_f: usize, row: &[Complex<T>]) {
        if let Err(e) = self.try_write(i_f, row) {
            warn!(
                "Couldn't write frequency file {}: {e}",
                self.freq_path(i_f).display()
            );
        }
    }

    fn try_write<T: TurbFloat>(&self, i_f: usize, row: &[Complex<T>]) -> io::Result<()> {
        let path = self.freq_path(i_f);
        // Per-process temp name: concurrent workers must not scribble over
        // each other's half-written files. The rename is the atomic step.
        let tmp = PathBuf::from(format!(
            "{}conturb_{}.{}.part",
            self.prefix,
            i_f,
            std::process::id()
        ));
        {
            let mut w = BufWriter::new(File::create(&tmp)?);
            w.write_all(&FREQ_MAGIC)?;
            w.write_u8(T::WIDTH)?;
            w.write_u64::<LittleEndian>(row.len() as u64)?;
            for c in row {
                c.re.write_le(&mut w)?;
                c.im.write_le(&mut w)?;
            }
            w.flush()?;
        }
        fs::rename(&tmp, &path)
    }

    pub(crate) fn read<T: TurbFloat>(
        &self,
        i_f: usize,
        expected_len: usize,
    ) -> Result<Vec<Complex<T>>, CheckpointError> {
        let path = self.freq_path(i_f);
        let read_err = |source| CheckpointError::Read {
            path: path.clone(),
            source,
        };
        let mut r = BufReader::new(File::open(&path).map_err(read_err)?);
        let mut magic = [0u8; 8];
        r.read_exact(&mut magic).map_err(read_err)?;
        if magic != FREQ_MAGIC {
            return Err(CheckpointError::BadMagic { path });
        }
        let width = r.read_u8().map_err(read_err)?;
        if width != T::WIDTH {
            return Err(CheckpointError::PrecisionMismatch {
                path,
                expected: T::WIDTH,
                got: width,
            });
        }
        let n = r.read_u64::<LittleEndian>().map_err(read_err)? as usize;
        if n != expected_len {
            return Err(CheckpointError::LengthMismatch {
                path,
                expected: expected_len,
                got: n,
            });
        }
        let mut row = Vec::with_capacity(n);
        for _ in 0..n {
            let re = T::read_le(&mut r).map_err(read_err)?;
            let im = T::read_le(&mut r).map_err(read_err)?;
            row.push(Complex::new(re, im));
        }
        Ok(row)
    }

    /// Assemble the full spectrum from the per-frequency files, retrying
    /// unreadable files under `policy`. Row 0 (DC) is left at zero.
    pub(crate) fn combine<T: TurbFloat>(
        &self,
        n_f: usize,
        n_s: usize,
        policy: &RetryPolicy,
    ) -> Result<Array2<Complex<T>>, CheckpointError> {
        let start = Instant::now();
        let mut delay = policy.base;
        let total = n_f.saturating_sub(1);
        let mut turb_fft = Array2::zeros((n_f, n_s));
        let mut missing: Vec<usize> = (1..n_f).collect();
        loop {
            let mut still_missing = vec![];
            for &i_f in &missing {
                match self.read::<T>(i_f, n_s) {
                    Ok(row) => {
                        for (dst, src) in turb_fft.row_mut(i_f).iter_mut().zip(row) {
                            *dst = src;
                        }
                    }
                    Err(e) => {
                        debug!("Frequency {i_f} not ready: {e}");
                        still_missing.push(i_f);
                    }
                }
            }
            info!(
                "Combining frequency files, {}/{} present",
                total - still_missing.len(),
                total
            );
            if still_missing.is_empty() {
                return Ok(turb_fft);
            }
            missing = still_missing;
            if start.elapsed() + delay > policy.deadline {
                return Err(CheckpointError::Timeout {
                    elapsed: start.elapsed(),
                    missing: missing.len(),
                    total,
                });
            }
            std::thread::sleep(delay);
            delay = (delay * 2).min(policy.cap);
        }
    }

    /// Remove the per-frequency files. Only call after a successful combine.
    pub(crate) fn delete(&self, n_f: usize) {
        for i_f in 1..n_f {
            let path = self.freq_path(i_f);
            if let Err(e) = fs::remove_file(&path) {
                warn!("Couldn't delete frequency file {}: {e}", path.display());
            }
        }
    }
}
