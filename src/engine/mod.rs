// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.

//! The spectral simulation engine.
//!
//! For every positive frequency the engine assembles the covariance
//! `sigma = (m mᵀ) ⊙ C` from per-point magnitudes `m` and the coherence
//! slice `C`, factorizes `sigma = L Lᵀ`, recovers the uncorrelated phasors
//! of the constrained channels by forward substitution, and multiplies the
//! stacked phasor vector by `L`. The DC row stays zero; measured means are
//! re-added from the wind profile after the inverse transform.
//!
//! Phasors are drawn once, before the frequency loop, so the result depends
//! only on the seed and the inputs, never on scheduling or on how the work
//! is split across checkpointing workers.

mod error;
#[cfg(test)]
mod tests;
mod time_domain;

pub use error::GenTurbError;

use indicatif::{ProgressBar, ProgressDrawTarget, ProgressStyle};
use log::{debug, info};
use ndarray::prelude::*;
use num_complex::Complex;
use rand::seq::SliceRandom;
use rand::{Rng, SeedableRng};
use rand_pcg::Pcg64;
use rayon::prelude::*;

use crate::checkpoint::{CheckpointStore, RetryPolicy};
use crate::coherence::{get_coh_mat, CohModel, CohParams};
use crate::constraint::TimeConstraint;
use crate::grid::{combine_spat_con, Component, SpatPoint, SpatialGrid};
use crate::magnitude::get_magnitudes;
use crate::math::{cholesky_lower_inplace, lower_matvec, solve_lower};
use crate::profiles::{resolve_profiles, IecContext, InterpData, Profiles, ResolvedProfiles};
use crate::types::TurbFloat;

/// Options of a simulation run. The recognised set is closed; everything is
/// validated before any work happens.
#[derive(Debug)]
pub struct SimOptions {
    /// Total simulated duration \[s\].
    pub t_total: f64,
    /// Time step \[s\].
    pub dt: f64,
    /// Seed of the phasor stream. `None` seeds from entropy.
    pub seed: Option<u64>,
    /// Frequencies per coherence chunk; also the width of the in-process
    /// parallel batch. 1 keeps transient memory at a single N x N matrix.
    pub nf_chunk: usize,
    pub coh_model: CohModel,
    pub coh_params: CohParams,
    pub iec: IecContext,
    pub interp_data: InterpData,
    /// Persist each frequency to disk instead of holding the spectrum in
    /// memory; enables running several workers on a shared prefix.
    pub write_freq_data: bool,
    /// Combine the per-frequency files at the end of the run (the designated
    /// combining worker).
    pub combine_freq_data: bool,
    /// Filename prefix of the per-frequency files.
    pub prefix: String,
    pub retry: RetryPolicy,
    pub draw_progress: bool,
}

impl Default for SimOptions {
    fn default() -> Self {
        SimOptions {
            t_total: 600.0,
            dt: 1.0,
            seed: None,
            nf_chunk: 1,
            coh_model: CohModel::Iec,
            coh_params: CohParams::default(),
            iec: IecContext::default(),
            interp_data: InterpData::None,
            write_freq_data: false,
            combine_freq_data: false,
            prefix: String::new(),
            retry: RetryPolicy::default(),
            draw_progress: false,
        }
    }
}

/// A generated turbulence box.
#[derive(Debug, Clone, PartialEq)]
pub struct TurbTimeSeries<T> {
    /// Sample times, `dt * [0, n_t)` \[s\].
    pub time: Vec<f64>,
    /// One entry per column of `values`, in input grid order with colocated
    /// points removed.
    pub points: Vec<SpatPoint>,
    /// Shape `(n_t, points.len())` \[m/s\].
    pub values: Array2<T>,
}

/// What a run produced.
#[derive(Debug)]
pub enum GenTurbOutcome<T> {
    TimeSeries(TurbTimeSeries<T>),
    /// Every simulation point was colocated with a constraint.
    NothingToSimulate,
    /// This worker wrote per-frequency files and was not asked to combine.
    FrequencyDataWritten,
}

/// Generate a turbulence box (constrained or unconstrained).
pub fn gen_turb<T: TurbFloat>(
    grid: &SpatialGrid,
    con_tc: Option<&TimeConstraint>,
    profiles: Profiles,
    opts: &SimOptions,
) -> Result<GenTurbOutcome<T>, GenTurbError> {
    validate_options(opts)?;
    match simulate_spectral::<T>(grid, con_tc, profiles, opts)? {
        SpectralOutcome::NothingToSimulate => Ok(GenTurbOutcome::NothingToSimulate),
        SpectralOutcome::FrequencyDataWritten => Ok(GenTurbOutcome::FrequencyDataWritten),
        SpectralOutcome::Spectrum(run) => {
            let ts = time_domain::assemble_time_series(run, &opts.iec, opts.dt);
            info!(
                "Generated {} samples for {} points",
                ts.time.len(),
                ts.points.len()
            );
            Ok(GenTurbOutcome::TimeSeries(ts))
        }
    }
}

fn validate_options(opts: &SimOptions) -> Result<(), GenTurbError> {
    if !(opts.t_total > 0.0) {
        return Err(GenTurbError::NonPositiveDuration(opts.t_total));
    }
    if !(opts.dt > 0.0) {
        return Err(GenTurbError::NonPositiveTimeStep(opts.dt));
    }
    if opts.nf_chunk == 0 {
        return Err(GenTurbError::ZeroChunkSize);
    }
    if opts.combine_freq_data && !opts.write_freq_data {
        return Err(GenTurbError::CombineWithoutWrite);
    }
    opts.coh_params.validate()?;
    Ok(())
}

/// Result of the frequency-domain stage, before the inverse transform.
pub(crate) struct SpectralRun<T> {
    /// Correlated Fourier coefficients, shape `(n_f, n_s)`; row 0 is zero.
    pub(crate) turb_fft: Array2<Complex<T>>,
    pub(crate) n_t: usize,
    /// Leading columns of `turb_fft` that belong to constraint channels.
    pub(crate) n_d: usize,
    /// The simulation points that survived colocation removal, in grid
    /// order; these are columns `n_d..` of `turb_fft`.
    pub(crate) kept_points: Vec<SpatPoint>,
    pub(crate) profiles: ResolvedProfiles,
}

pub(crate) enum SpectralOutcome<T> {
    Spectrum(SpectralRun<T>),
    NothingToSimulate,
    FrequencyDataWritten,
}

/// Everything the per-frequency worker needs, borrowed once.
struct FreqContext<'a, T> {
    freqs: &'a [f64],
    all_mags: &'a Array2<T>,
    /// Uncorrelated unit phasors of the simulated points, `(n_f, n_s - n_d)`.
    phases: &'a Array2<Complex<T>>,
    /// Constraint FFT, `(n_f, n_d)`; zero columns when unconstrained.
    conturb_fft: &'a Array2<Complex<T>>,
    n_d: usize,
}

pub(crate) fn simulate_spectral<T: TurbFloat>(
    grid: &SpatialGrid,
    con_tc: Option<&TimeConstraint>,
    profiles: Profiles,
    opts: &SimOptions,
) -> Result<SpectralOutcome<T>, GenTurbError> {
    let n_t = (opts.t_total / opts.dt).ceil() as usize;
    if n_t < 2 {
        return Err(GenTurbError::TooFewTimeSteps {
            t: opts.t_total,
            dt: opts.dt,
            n_t,
        });
    }
    let n_f = n_t / 2 + 1;

    // Combined point set: constraints first, then the simulation points that
    // aren't colocated with one.
    let con_points = con_tc.map(|c| c.points()).unwrap_or(&[]);
    let (combined, kept) = combine_spat_con(grid.points(), con_points);
    if kept.is_empty() {
        info!("All simulation points are colocated with constraints! Nothing to simulate.");
        return Ok(SpectralOutcome::NothingToSimulate);
    }
    let n_d = con_points.len();
    let n_s = combined.len();
    debug!("{n_d} constraint points, {} simulation points, {n_f} frequencies", n_s - n_d);

    if let Some(con) = con_tc {
        con.check_time_grid(opts.dt, n_t)?;
    }

    let kept_points: Vec<SpatPoint> = kept.iter().map(|&i| grid.points()[i]).collect();
    let mut needed_comps: Vec<Component> = vec![];
    for p in &kept_points {
        if !needed_comps.contains(&p.comp) {
            needed_comps.push(p.comp);
        }
    }
    let profiles = resolve_profiles(
        profiles,
        &opts.interp_data,
        con_tc,
        &needed_comps,
        opts.t_total,
    )?;

    // Magnitudes: constraint channels from their FFT, simulated points from
    // the spectrum model. Computed in f64, cast once.
    let sim_mags = get_magnitudes(&kept_points, &profiles, &opts.iec, n_t, opts.t_total);
    let con_fft = con_tc
        .map(|c| c.time_fft())
        .unwrap_or_else(|| Array2::zeros((n_f, 0)));
    let conturb_fft: Array2<Complex<T>> =
        con_fft.mapv(|z| Complex::new(T::of_f64(z.re), T::of_f64(z.im)));
    let mut all_mags = Array2::zeros((n_f, n_s));
    for i_f in 0..n_f {
        for i_d in 0..n_d {
            all_mags[[i_f, i_d]] = T::of_f64(con_fft[[i_f, i_d]].norm());
        }
        for (j, &m) in sim_mags.row(i_f).iter().enumerate() {
            all_mags[[i_f, n_d + j]] = T::of_f64(m);
        }
    }

    // Uncorrelated unit phasors, drawn once so the result is reproducible
    // from the seed alone.
    let mut rng = match opts.seed {
        Some(seed) => Pcg64::seed_from_u64(seed),
        None => Pcg64::from_entropy(),
    };
    let mut phases = Array2::zeros((n_f, n_s - n_d));
    for i_f in 0..n_f {
        for j in 0..(n_s - n_d) {
            let angle = std::f64::consts::TAU * rng.gen::<f64>();
            phases[[i_f, j]] = Complex::new(T::of_f64(angle.cos()), T::of_f64(angle.sin()));
        }
    }
    if n_t % 2 == 0 {
        // The Nyquist bin must be exactly real for a real inverse transform.
        for j in 0..(n_s - n_d) {
            let snapped = if phases[[n_f - 1, j]].re.as_f64().round() == 0.0 {
                T::one()
            } else {
                -T::one()
            };
            phases[[n_f - 1, j]] = Complex::new(snapped, T::zero());
        }
    }

    let freqs: Vec<f64> = (0..n_f).map(|i| i as f64 / opts.t_total).collect();
    let fctx = FreqContext {
        freqs: &freqs,
        all_mags: &all_mags,
        phases: &phases,
        conturb_fft: &conturb_fft,
        n_d,
    };

    let pb = make_freq_progress_bar(n_f - 1, opts.draw_progress);
    let turb_fft = if opts.write_freq_data {
        let store = CheckpointStore::new(opts.prefix.clone());
        run_checkpointed(&fctx, &combined, opts, &store, &pb)?;
        pb.abandon();
        if !opts.combine_freq_data {
            return Ok(SpectralOutcome::FrequencyDataWritten);
        }
        let turb_fft = store.combine(n_f, n_s, &opts.retry)?;
        store.delete(n_f);
        turb_fft
    } else {
        let turb_fft = run_in_memory(&fctx, &combined, opts, &pb)?;
        pb.abandon();
        turb_fft
    };

    Ok(SpectralOutcome::Spectrum(SpectralRun {
        turb_fft,
        n_t,
        n_d,
        kept_points,
        profiles,
    }))
}

/// Process every positive frequency in memory, one coherence chunk at a
/// time; frequencies within a chunk are factorized in parallel.
fn run_in_memory<T: TurbFloat>(
    fctx: &FreqContext<T>,
    combined: &[SpatPoint],
    opts: &SimOptions,
    pb: &ProgressBar,
) -> Result<Array2<Complex<T>>, GenTurbError> {
    let n_f = fctx.freqs.len();
    let n_s = combined.len();
    let mut turb_fft = Array2::zeros((n_f, n_s));
    let n_chunks = (n_f + opts.nf_chunk - 1) / opts.nf_chunk;
    for i_chunk in 0..n_chunks {
        let lo = i_chunk * opts.nf_chunk;
        let hi = ((i_chunk + 1) * opts.nf_chunk).min(n_f);
        let coh = if n_s > 1 {
            debug!("Building coherence for chunk {}/{n_chunks}", i_chunk + 1);
            Some(get_coh_mat::<T>(
                &fctx.freqs[lo..hi],
                combined,
                opts.coh_model,
                &opts.coh_params,
            )?)
        } else {
            None
        };
        let rows = (lo.max(1)..hi)
            .into_par_iter()
            .map(|i_f| {
                let coh_slice = coh.as_ref().map(|c| c.index_axis(Axis(0), i_f - lo));
                let row = correlate_one_freq(fctx, coh_slice, i_f)?;
                pb.inc(1);
                Ok((i_f, row))
            })
            .collect::<Result<Vec<_>, GenTurbError>>()?;
        for (i_f, row) in rows {
            for (dst, src) in turb_fft.row_mut(i_f).iter_mut().zip(row) {
                *dst = src;
            }
        }
    }
    Ok(turb_fft)
}

/// Process the positive frequencies in shuffled order, skipping those whose
/// file already exists and persisting each result. The shuffle stream is
/// independent of the phasor stream, so concurrent workers on the same
/// inputs are unlikely to collide.
fn run_checkpointed<T: TurbFloat>(
    fctx: &FreqContext<T>,
    combined: &[SpatPoint],
    opts: &SimOptions,
    store: &CheckpointStore,
    pb: &ProgressBar,
) -> Result<(), GenTurbError> {
    let n_f = fctx.freqs.len();
    let n_s = combined.len();
    let mut order: Vec<usize> = (1..n_f).collect();
    order.shuffle(&mut Pcg64::from_entropy());

    let mut cached: Option<(usize, Array3<T>)> = None;
    for i_f in order {
        if store.exists(i_f) {
            debug!("Frequency file exists, skipping {}", store.freq_path(i_f).display());
            pb.inc(1);
            continue;
        }
        let row = if n_s > 1 {
            let i_chunk = i_f / opts.nf_chunk;
            if !matches!(&cached, Some((c, _)) if *c == i_chunk) {
                let lo = i_chunk * opts.nf_chunk;
                let hi = ((i_chunk + 1) * opts.nf_chunk).min(n_f);
                cached = Some((
                    i_chunk,
                    get_coh_mat::<T>(
                        &fctx.freqs[lo..hi],
                        combined,
                        opts.coh_model,
                        &opts.coh_params,
                    )?,
                ));
            }
            match &cached {
                Some((_, coh)) => {
                    let coh_slice = coh.index_axis(Axis(0), i_f - i_chunk * opts.nf_chunk);
                    correlate_one_freq(fctx, Some(coh_slice), i_f)?
                }
                None => unreachable!("coherence chunk was just built"),
            }
        } else {
            correlate_one_freq(fctx, None, i_f)?
        };
        store.write(i_f, &row);
        pb.inc(1);
    }
    Ok(())
}

/// The per-frequency core: covariance, Cholesky, constraint solve,
/// correlation. No parallel code in here; callers decide how to schedule it.
fn correlate_one_freq<T: TurbFloat>(
    fctx: &FreqContext<T>,
    coh: Option<ArrayView2<T>>,
    i_f: usize,
) -> Result<Vec<Complex<T>>, GenTurbError> {
    let mags = fctx.all_mags.row(i_f);
    let n = mags.len();

    // A lone point needs no coherence: scale its phasor directly.
    if n == 1 {
        let pha = fctx.phases[[i_f, 0]];
        let m = mags[0];
        return Ok(vec![Complex::new(m * pha.re, m * pha.im)]);
    }
    let coh = match coh {
        Some(c) => c,
        None => unreachable!("coherence is required for more than one point"),
    };

    // sigma = (m mᵀ) ⊙ C. Only the lower triangle is needed downstream.
    let mut sigma = Array2::zeros((n, n));
    for i in 0..n {
        for j in 0..=i {
            sigma[[i, j]] = mags[i] * mags[j] * coh[[i, j]];
        }
    }
    cholesky_lower_inplace(&mut sigma).map_err(|_| GenTurbError::NonPositiveDefinite { i_f })?;

    let n_d = fctx.n_d;
    let mut unc = Vec::with_capacity(n);
    if n_d > 0 {
        // The unique uncorrelated vector that reproduces the constraint FFT
        // after multiplication by L.
        let b: Vec<Complex<T>> = fctx.conturb_fft.row(i_f).to_vec();
        unc.extend(solve_lower(sigma.slice(s![..n_d, ..n_d]), &b));
    }
    unc.extend(fctx.phases.row(i_f).iter().copied());
    Ok(lower_matvec(sigma.view(), &unc))
}

fn make_freq_progress_bar(n_freqs: usize, draw: bool) -> ProgressBar {
    ProgressBar::with_draw_target(
        Some(n_freqs as u64),
        if draw {
            ProgressDrawTarget::stdout()
        } else {
            ProgressDrawTarget::hidden()
        },
    )
    .with_style(
        ProgressStyle::default_bar()
            .template("{msg:12}: [{wide_bar:.blue}] {pos:5}/{len:5} frequencies ({elapsed_precise}<{eta_precise})")
            .unwrap()
            .progress_chars("=> "),
    )
    .with_position(0)
    .with_message("Correlating")
}
