// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.

//! Spectral engine tests.

use approx::assert_abs_diff_eq;
use ndarray::prelude::*;
use tempfile::tempdir;

use super::*;
use crate::constraint::TimeConstraint;
use crate::math::irfft_over_time;
use crate::profiles::SigProfile;

fn e1_options(seed: u64, t_total: f64, dt: f64) -> SimOptions {
    SimOptions {
        t_total,
        dt,
        seed: Some(seed),
        iec: IecContext {
            u_ref: 10.0,
            z_ref: 50.0,
            alpha: 0.2,
            z_hub: 50.0,
            l_c: 340.2,
            ..IecContext::default()
        },
        coh_params: CohParams {
            u_ref: 10.0,
            l_c: 340.2,
            ..CohParams::default()
        },
        ..SimOptions::default()
    }
}

fn unit_sig_profiles() -> Profiles {
    Profiles {
        sig: Some(SigProfile::Custom(Box::new(|_, _, _| 1.0))),
        ..Profiles::default()
    }
}

fn expect_time_series<T: std::fmt::Debug>(outcome: GenTurbOutcome<T>) -> TurbTimeSeries<T> {
    match outcome {
        GenTurbOutcome::TimeSeries(ts) => ts,
        other => panic!("expected a time series, got {other:?}"),
    }
}

fn expect_spectrum<T: TurbFloat>(outcome: SpectralOutcome<T>) -> SpectralRun<T> {
    match outcome {
        SpectralOutcome::Spectrum(run) => run,
        SpectralOutcome::NothingToSimulate => panic!("unexpected NothingToSimulate"),
        SpectralOutcome::FrequencyDataWritten => panic!("unexpected FrequencyDataWritten"),
    }
}

fn column_mean_std(col: ArrayView1<f64>) -> (f64, f64) {
    let n = col.len() as f64;
    let mean = col.sum() / n;
    let var = col.iter().map(|&v| (v - mean) * (v - mean)).sum::<f64>() / n;
    (mean, var.sqrt())
}

/// One u point, no constraints: the mean is the power-law value and the
/// sample standard deviation is exactly the requested sigma.
#[test]
fn single_point_statistics() {
    let grid = SpatialGrid::with_components(&[0.0], &[50.0], &[Component::U]).unwrap();
    let opts = e1_options(12, 60.0, 0.1);
    let ts = expect_time_series(
        gen_turb::<f64>(&grid, None, unit_sig_profiles(), &opts).unwrap(),
    );
    assert_eq!(ts.time.len(), 600);
    assert_eq!(ts.values.dim(), (600, 1));
    let (mean, std) = column_mean_std(ts.values.column(0));
    // DC is zero, so the mean is exactly U(0, 50) = 10.
    assert_abs_diff_eq!(mean, 10.0, epsilon = 1e-9);
    // The magnitude rescale makes the sample std exact, not just expected.
    assert_abs_diff_eq!(std, 1.0, epsilon = 1e-6);
}

/// The first combined column carries magnitude |M| per frequency: the first
/// Cholesky column is (m_0, m_1 c, ...), and phasors have unit modulus.
#[test]
fn first_column_magnitudes_are_preserved() {
    let grid = SpatialGrid::with_components(&[0.0, 10.0], &[50.0], &[Component::U]).unwrap();
    let opts = e1_options(3, 60.0, 0.5);
    let run = expect_spectrum(
        simulate_spectral::<f64>(&grid, None, unit_sig_profiles(), &opts).unwrap(),
    );
    let n_f = run.turb_fft.nrows();
    let sim_mags = get_magnitudes(
        &run.kept_points,
        &run.profiles,
        &opts.iec,
        run.n_t,
        opts.t_total,
    );
    for i_f in 1..n_f {
        assert_abs_diff_eq!(
            run.turb_fft[[i_f, 0]].norm(),
            sim_mags[[i_f, 0]],
            epsilon = 1e-12
        );
    }
}

/// Two u points: over many seeds, the lag-0 correlation approaches the
/// coherence-weighted spectral average. A loose bound absorbs the per-seed
/// realization noise.
#[test]
fn two_point_correlation_tracks_coherence() {
    let grid = SpatialGrid::with_components(&[0.0, 10.0], &[50.0], &[Component::U]).unwrap();

    // Spectral prediction: sum(2 m^2 c) / sum(2 m^2) with equal sigmas.
    let opts = e1_options(0, 600.0, 1.0);
    let run = expect_spectrum(
        simulate_spectral::<f64>(&grid, None, unit_sig_profiles(), &opts).unwrap(),
    );
    let n_f = run.turb_fft.nrows();
    let mags = get_magnitudes(
        &run.kept_points,
        &run.profiles,
        &opts.iec,
        run.n_t,
        opts.t_total,
    );
    let freqs: Vec<f64> = (0..n_f).map(|i| i as f64 / opts.t_total).collect();
    let coh: Array3<f64> =
        crate::coherence::get_coh_mat(&freqs, grid.points(), opts.coh_model, &opts.coh_params)
            .unwrap();
    let mut num = 0.0;
    let mut den = 0.0;
    for i_f in 1..n_f {
        let m2 = mags[[i_f, 0]] * mags[[i_f, 0]];
        num += 2.0 * m2 * coh[[i_f, 0, 1]];
        den += 2.0 * m2;
    }
    let predicted = num / den;
    assert!(predicted > 0.2 && predicted < 0.99);

    let mut corr_sum = 0.0;
    let n_seeds = 32;
    for seed in 0..n_seeds {
        let opts = e1_options(seed, 600.0, 1.0);
        let ts = expect_time_series(
            gen_turb::<f64>(&grid, None, unit_sig_profiles(), &opts).unwrap(),
        );
        let a = ts.values.column(0);
        let b = ts.values.column(1);
        let (mean_a, std_a) = column_mean_std(a);
        let (mean_b, std_b) = column_mean_std(b);
        let n = a.len() as f64;
        let cov = a
            .iter()
            .zip(b.iter())
            .map(|(&x, &y)| (x - mean_a) * (y - mean_b))
            .sum::<f64>()
            / n;
        corr_sum += cov / (std_a * std_b);
    }
    let mean_corr = corr_sum / n_seeds as f64;
    assert_abs_diff_eq!(mean_corr, predicted, epsilon = 0.1);
}

fn sine_constraint(n_t: usize, dt: f64, freq_hz: f64) -> TimeConstraint {
    let points = vec![SpatPoint {
        comp: Component::U,
        x: 0.0,
        y: 0.0,
        z: 50.0,
    }];
    let times: Vec<f64> = (0..n_t).map(|i| i as f64 * dt).collect();
    // A dominant sine plus a weak incommensurate tone, so that (like real
    // measurements) every frequency bin carries some energy.
    let data = Array2::from_shape_fn((n_t, 1), |(t, _)| {
        let tau = std::f64::consts::TAU * t as f64 * dt;
        (tau * freq_hz).sin() + 0.05 * (tau * 0.0437 + 0.3).sin()
    });
    TimeConstraint::new(points, times, data).unwrap()
}

/// The generated field reproduces the constraint channel exactly.
#[test]
fn constraint_channel_is_reproduced_exactly() {
    let grid = SpatialGrid::with_components(&[10.0], &[50.0], &[Component::U]).unwrap();
    let con = sine_constraint(1000, 0.1, 0.1);
    let opts = e1_options(12, 100.0, 0.1);
    let run = expect_spectrum(
        simulate_spectral::<f64>(&grid, Some(&con), unit_sig_profiles(), &opts).unwrap(),
    );
    assert_eq!(run.n_d, 1);
    assert_eq!(run.turb_fft.ncols(), 2);
    let recon = irfft_over_time(run.turb_fft.view(), run.n_t);
    for (a, b) in recon.column(0).iter().zip(con.data().column(0).iter()) {
        assert_abs_diff_eq!(a, b, epsilon = 1e-8);
    }
}

/// A constraint time grid that doesn't match T and dt is fatal.
#[test]
fn mismatched_constraint_time_grid_is_fatal() {
    let grid = SpatialGrid::with_components(&[10.0], &[50.0], &[Component::U]).unwrap();
    let con = sine_constraint(1000, 0.1, 0.1);
    let opts = e1_options(12, 100.0, 0.2);
    let err = gen_turb::<f64>(&grid, Some(&con), unit_sig_profiles(), &opts).unwrap_err();
    assert!(matches!(err, GenTurbError::Constraint(_)));
}

/// Colocated simulation points are suppressed; a fully-colocated grid means
/// there is nothing to simulate.
#[test]
fn colocation_is_detected() {
    let con = sine_constraint(100, 0.1, 0.1);
    let opts = e1_options(12, 10.0, 0.1);

    let colocated = SpatialGrid::with_components(&[0.0], &[50.0], &[Component::U]).unwrap();
    assert!(matches!(
        gen_turb::<f64>(&colocated, Some(&con), unit_sig_profiles(), &opts).unwrap(),
        GenTurbOutcome::NothingToSimulate
    ));

    let partial = SpatialGrid::with_components(&[0.0, 10.0], &[50.0], &[Component::U]).unwrap();
    let ts = expect_time_series(
        gen_turb::<f64>(&partial, Some(&con), unit_sig_profiles(), &opts).unwrap(),
    );
    assert_eq!(ts.values.ncols(), 1);
    assert_eq!(ts.points.len(), 1);
    assert_abs_diff_eq!(ts.points[0].y, 10.0);
}

/// With an even number of samples the Nyquist row is exactly real.
#[test]
fn nyquist_row_is_real_for_even_sample_counts() {
    let grid = SpatialGrid::new(&[0.0, 5.0], &[50.0]).unwrap();
    let con = sine_constraint(100, 0.1, 0.1);
    let opts = e1_options(7, 10.0, 0.1);
    let run = expect_spectrum(
        simulate_spectral::<f64>(&grid, Some(&con), unit_sig_profiles(), &opts).unwrap(),
    );
    assert_eq!(run.n_t % 2, 0);
    let nyq = run.turb_fft.nrows() - 1;
    for c in run.turb_fft.row(nyq) {
        assert_eq!(c.im, 0.0);
    }
    // Row 0 (DC) stays zero; means come from the profile.
    for c in run.turb_fft.row(0) {
        assert_eq!(*c, num_complex::Complex::new(0.0, 0.0));
    }
}

/// Identical seeds give identical boxes; different seeds don't.
#[test]
fn seeded_runs_are_reproducible() {
    let grid = SpatialGrid::new(&[0.0, 10.0], &[40.0, 60.0]).unwrap();
    let opts = e1_options(42, 30.0, 0.5);
    let a = expect_time_series(gen_turb::<f64>(&grid, None, Profiles::default(), &opts).unwrap());
    let b = expect_time_series(gen_turb::<f64>(&grid, None, Profiles::default(), &opts).unwrap());
    assert_eq!(a, b);

    let opts_other = e1_options(43, 30.0, 0.5);
    let c = expect_time_series(
        gen_turb::<f64>(&grid, None, Profiles::default(), &opts_other).unwrap(),
    );
    assert_ne!(a, c);
}

/// A checkpointed run produces bit-identical spectra to an in-memory run,
/// and cleans up its files after combining.
#[test]
fn checkpointed_run_matches_in_memory() {
    let dir = tempdir().unwrap();
    let grid = SpatialGrid::with_components(&[0.0, 8.0], &[45.0, 55.0], &[Component::U]).unwrap();
    let con = sine_constraint(120, 0.5, 0.1);

    let opts_mem = e1_options(5, 60.0, 0.5);
    let mem = expect_spectrum(
        simulate_spectral::<f64>(&grid, Some(&con), unit_sig_profiles(), &opts_mem).unwrap(),
    );

    let opts_ckpt = SimOptions {
        write_freq_data: true,
        combine_freq_data: true,
        prefix: format!("{}/run_", dir.path().display()),
        ..e1_options(5, 60.0, 0.5)
    };
    let ckpt = expect_spectrum(
        simulate_spectral::<f64>(&grid, Some(&con), unit_sig_profiles(), &opts_ckpt).unwrap(),
    );

    assert_eq!(mem.turb_fft, ckpt.turb_fft);
    // The per-frequency files are gone after a successful combine.
    let store = crate::checkpoint::CheckpointStore::new(opts_ckpt.prefix.clone());
    for i_f in 1..mem.turb_fft.nrows() {
        assert!(!store.freq_path(i_f).exists());
    }
}

/// A write-only worker leaves files behind and reports that it did.
#[test]
fn write_only_worker_persists_frequency_files() {
    let dir = tempdir().unwrap();
    let grid = SpatialGrid::with_components(&[0.0, 8.0], &[50.0], &[Component::U]).unwrap();
    let opts = SimOptions {
        write_freq_data: true,
        prefix: format!("{}/w_", dir.path().display()),
        ..e1_options(5, 30.0, 0.5)
    };
    assert!(matches!(
        gen_turb::<f64>(&grid, None, unit_sig_profiles(), &opts).unwrap(),
        GenTurbOutcome::FrequencyDataWritten
    ));
    let store = crate::checkpoint::CheckpointStore::new(opts.prefix.clone());
    let n_t = 60;
    for i_f in 1..(n_t / 2 + 1) {
        assert!(store.freq_path(i_f).exists());
    }

    // A second worker on the same prefix skips all existing files and still
    // reaches the same combined spectrum.
    let opts_combine = SimOptions {
        write_freq_data: true,
        combine_freq_data: true,
        prefix: opts.prefix.clone(),
        ..e1_options(5, 30.0, 0.5)
    };
    let run = expect_spectrum(
        simulate_spectral::<f64>(&grid, None, unit_sig_profiles(), &opts_combine).unwrap(),
    );
    let mem = expect_spectrum(
        simulate_spectral::<f64>(&grid, None, unit_sig_profiles(), &e1_options(5, 30.0, 0.5))
            .unwrap(),
    );
    assert_eq!(run.turb_fft, mem.turb_fft);
}

/// Veer is added to v columns, mirroring the u treatment.
#[test]
fn veer_shifts_v_columns() {
    let grid = SpatialGrid::new(&[0.0], &[50.0]).unwrap();
    let profiles = Profiles {
        veer: Some(crate::profiles::VeerProfile::Custom(Box::new(|_, _| 1.5))),
        sig: Some(SigProfile::Custom(Box::new(|_, _, _| 0.4))),
        ..Profiles::default()
    };
    let opts = e1_options(9, 30.0, 0.5);
    let ts = expect_time_series(gen_turb::<f64>(&grid, None, profiles, &opts).unwrap());
    let (mean_u, _) = column_mean_std(ts.values.column(0));
    let (mean_v, _) = column_mean_std(ts.values.column(1));
    let (mean_w, _) = column_mean_std(ts.values.column(2));
    assert_abs_diff_eq!(mean_u, 10.0, epsilon = 1e-9);
    assert_abs_diff_eq!(mean_v, 1.5, epsilon = 1e-9);
    assert_abs_diff_eq!(mean_w, 0.0, epsilon = 1e-9);
}

/// Invalid option combinations are rejected before any work happens.
#[test]
fn option_validation() {
    let grid = SpatialGrid::new(&[0.0], &[50.0]).unwrap();
    let bad = SimOptions {
        nf_chunk: 0,
        ..SimOptions::default()
    };
    assert!(matches!(
        gen_turb::<f64>(&grid, None, Profiles::default(), &bad),
        Err(GenTurbError::ZeroChunkSize)
    ));

    let bad = SimOptions {
        combine_freq_data: true,
        ..SimOptions::default()
    };
    assert!(matches!(
        gen_turb::<f64>(&grid, None, Profiles::default(), &bad),
        Err(GenTurbError::CombineWithoutWrite)
    ));

    let bad = SimOptions {
        coh_params: CohParams {
            edition: 2,
            ..CohParams::default()
        },
        ..SimOptions::default()
    };
    assert!(matches!(
        gen_turb::<f64>(&grid, None, Profiles::default(), &bad),
        Err(GenTurbError::Coherence(_))
    ));

    let bad = SimOptions {
        dt: 0.0,
        ..SimOptions::default()
    };
    assert!(matches!(
        gen_turb::<f64>(&grid, None, Profiles::default(), &bad),
        Err(GenTurbError::NonPositiveTimeStep(_))
    ));
}

/// Larger coherence chunks change scheduling, never results.
#[test]
fn chunk_size_does_not_change_results() {
    let grid = SpatialGrid::with_components(&[0.0, 12.0], &[50.0], &[Component::U]).unwrap();
    let base = e1_options(21, 30.0, 0.5);
    let chunked = SimOptions {
        nf_chunk: 7,
        ..e1_options(21, 30.0, 0.5)
    };
    let a = expect_spectrum(
        simulate_spectral::<f64>(&grid, None, unit_sig_profiles(), &base).unwrap(),
    );
    let b = expect_spectrum(
        simulate_spectral::<f64>(&grid, None, unit_sig_profiles(), &chunked).unwrap(),
    );
    assert_eq!(a.turb_fft, b.turb_fft);
}

/// Single precision runs end to end.
#[test]
fn single_precision_run() {
    let grid = SpatialGrid::with_components(&[0.0], &[50.0], &[Component::U]).unwrap();
    let opts = e1_options(12, 60.0, 0.1);
    let ts = expect_time_series(
        gen_turb::<f32>(&grid, None, unit_sig_profiles(), &opts).unwrap(),
    );
    let col: Vec<f64> = ts.values.column(0).iter().map(|&v| v as f64).collect();
    let n = col.len() as f64;
    let mean = col.iter().sum::<f64>() / n;
    let var = col.iter().map(|&v| (v - mean) * (v - mean)).sum::<f64>() / n;
    assert_abs_diff_eq!(mean, 10.0, epsilon = 1e-3);
    assert_abs_diff_eq!(var.sqrt(), 1.0, epsilon = 1e-3);
}
