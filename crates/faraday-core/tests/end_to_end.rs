//! Full line-of-sight reconstruction of a single Faraday-thin component.

use faraday_core::dataset::Dataset;
use faraday_core::dictionary::{WaveletConfig, WaveletMode};
use faraday_core::objective::LambdaPolicy;
use faraday_core::optimization::{SolverKind, SolverSettings, SolverState};
use faraday_core::parameter::FaradayParameter;
use faraday_core::pipeline::{reconstruct_los, ReconstructionConfig};
use faraday_core::transform::{DirectTransform, Transform, TransformKind};
use num_complex::Complex64;

const AMPLITUDE: Complex64 = Complex64::new(0.6, 0.8);

fn channels() -> Vec<f64> {
    (0..32).map(|i| 1.0e9 + i as f64 * (1.0e9 / 31.0)).collect()
}

fn config() -> ReconstructionConfig {
    ReconstructionConfig {
        oversampling: 4.0,
        transform: TransformKind::Nufft,
        solver: SolverKind::Fista,
        lambda: LambdaPolicy::Fixed { value: 0.05 },
        settings: SolverSettings { max_iterations: 5000, tolerance: 1e-8, min_iterations: 1 },
        ..Default::default()
    }
}

/// Noise-free observation of a thin component on grid sample `j0`.
fn observe(template: &Dataset, grid: &FaradayParameter, j0: usize) -> Dataset {
    let mut truth = vec![Complex64::new(0.0, 0.0); grid.n()];
    truth[j0] = AMPLITUDE;
    let data = DirectTransform::new(template, grid).forward(&truth);
    template.with_data(data).unwrap()
}

#[test]
fn test_thin_component_is_restored_at_its_depth() {
    let template = Dataset::with_uniform_noise(channels(), 1.0, None, None).unwrap();
    let cfg = config();
    let grid = cfg.grid_for(&template).unwrap();
    let j0 = grid.n() / 2 + 40;
    let ds = observe(&template, &grid, j0);

    let rec = reconstruct_los(&ds, &cfg, &grid).unwrap();
    assert_ne!(rec.status, SolverState::Diverged);
    assert_eq!(rec.lambda_l1, 0.05);

    // The dirty spectrum already peaks at the true depth with unit gain.
    let dirty_peak = rec.dirty[j0].norm();
    assert!((dirty_peak - 1.0).abs() < 1e-3, "dirty peak {}", dirty_peak);

    let summary = rec.summary(&grid, Some(2.0), None);
    let target = grid.phi()[j0];
    eprintln!(
        "restored peak {:.4} at {:.2} (true {:.2}); {:?} after {} iterations",
        summary.peak_amplitude, summary.peak_depth, target, rec.status, rec.iterations
    );
    assert!((summary.peak_depth - target).abs() <= grid.cellsize() * 1.0001);
    assert!((summary.peak_amplitude - 1.0).abs() < 0.05, "restored peak {}", summary.peak_amplitude);
    assert!(summary.polarization_fraction.unwrap() > 0.45);

    // The model concentrates its flux near the component.
    let total: f64 = rec.model.iter().map(|z| z.norm()).sum();
    let near: f64 = rec.model[j0 - 5..=j0 + 5].iter().map(|z| z.norm()).sum();
    assert!(near > 0.7 * total, "model flux near peak {:.3} of {:.3}", near, total);
}

#[test]
fn test_wavelet_basis_reconstruction() {
    let template = Dataset::with_uniform_noise(channels(), 1.0, None, None).unwrap();
    let cfg = ReconstructionConfig {
        wavelet: Some(WaveletConfig::new("coif2", Some(3), WaveletMode::Undecimated)),
        ..config()
    };
    let grid = cfg.grid_for(&template).unwrap();
    let j0 = grid.n() / 2 + 40;
    let ds = observe(&template, &grid, j0);

    let rec = reconstruct_los(&ds, &cfg, &grid).unwrap();
    assert_ne!(rec.status, SolverState::Diverged);
    assert_eq!(rec.model.len(), grid.n());
    assert!(rec.model.iter().all(|z| z.re.is_finite() && z.im.is_finite()));
    // χ² at zero is Σŵ|P|² = 1; the solution must beat the empty model.
    assert!(rec.objective < 1.0, "objective {}", rec.objective);

    let summary = rec.summary(&grid, None, None);
    assert!((summary.peak_depth - grid.phi()[j0]).abs() <= 2.0 * grid.cellsize() * 1.0001);
}

#[test]
fn test_default_configuration_uses_universal_threshold() {
    let template = Dataset::with_uniform_noise(channels(), 1.0, None, None).unwrap();
    let cfg = ReconstructionConfig {
        settings: SolverSettings { max_iterations: 20_000, ..Default::default() },
        ..Default::default()
    };
    assert_eq!(cfg.lambda, LambdaPolicy::Universal { eta: 1.0 });
    let grid = cfg.grid_for(&template).unwrap();
    let j0 = grid.n() / 2 + 80;
    let ds = observe(&template, &grid, j0);

    let rec = reconstruct_los(&ds, &cfg, &grid).unwrap();
    let n = ds.active_channels().len() as f64;
    assert_eq!(n, 32.0);
    assert!(rec.noise > 0.0 && rec.noise.is_finite());
    let expected = (2.0 * n + (4.0 * n).sqrt()).sqrt() * rec.noise;
    assert!((rec.lambda_l1 - expected).abs() <= 1e-12 * expected, "lambda {} vs {}", rec.lambda_l1, expected);

    let summary = rec.summary(&grid, None, None);
    let target = grid.phi()[j0];
    eprintln!(
        "noise {:.3e}, lambda {:.3e}: peak {:.4} at {:.2} (true {:.2}); {:?} after {} iterations",
        rec.noise, rec.lambda_l1, summary.peak_amplitude, summary.peak_depth, target, rec.status, rec.iterations
    );
    assert_ne!(rec.status, SolverState::Diverged);
    assert!((summary.peak_depth - target).abs() <= grid.cellsize() * 1.0001);
    assert!((summary.peak_amplitude - 1.0).abs() < 0.05, "restored peak {}", summary.peak_amplitude);
}

/// Run `solver` with its default step parameters and check the restored peak.
fn assert_solver_restores_peak(solver: SolverKind) {
    let template = Dataset::with_uniform_noise(channels(), 1.0, None, None).unwrap();
    let cfg = ReconstructionConfig { solver, ..Default::default() };
    let grid = cfg.grid_for(&template).unwrap();
    let j0 = grid.n() / 2 + 80;
    let ds = observe(&template, &grid, j0);

    let rec = reconstruct_los(&ds, &cfg, &grid).unwrap();
    let summary = rec.summary(&grid, None, None);
    let target = grid.phi()[j0];
    eprintln!(
        "{:?}: peak {:.4} at {:.2} (true {:.2}); {:?} after {} iterations",
        solver, summary.peak_amplitude, summary.peak_depth, target, rec.status, rec.iterations
    );
    assert_ne!(rec.status, SolverState::Diverged);
    assert!(rec.model.iter().all(|z| z.re.is_finite() && z.im.is_finite()));
    assert!((summary.peak_depth - target).abs() <= grid.cellsize() * 1.0001);
    assert!((summary.peak_amplitude - 1.0).abs() < 0.05, "restored peak {}", summary.peak_amplitude);
}

#[test]
fn test_admm_with_default_penalty() {
    assert_solver_restores_peak(SolverKind::Admm);
}

#[test]
fn test_sdmm_with_default_step() {
    assert_solver_restores_peak(SolverKind::Sdmm);
}

#[test]
fn test_direct_transform_with_flagging() {
    let template = Dataset::with_uniform_noise(channels(), 1.0, None, None).unwrap();
    let cfg = ReconstructionConfig {
        transform: TransformKind::Direct,
        flagging: Some(Default::default()),
        settings: SolverSettings { max_iterations: 1000, tolerance: 1e-8, min_iterations: 1 },
        ..config()
    };
    let grid = cfg.grid_for(&template).unwrap();
    let j0 = grid.n() / 2 - 25;
    let clean = observe(&template, &grid, j0);
    let mut data = clean.data().unwrap().to_vec();
    data[7] += Complex64::new(40.0, -40.0);
    let ds = clean.with_data(data).unwrap();

    let rec = reconstruct_los(&ds, &cfg, &grid).unwrap();
    assert_eq!(rec.flagged, vec![7]);
    let summary = rec.summary(&grid, None, None);
    assert!((summary.peak_depth - grid.phi()[j0]).abs() <= grid.cellsize() * 1.0001);
}

#[test]
fn test_missing_samples_are_rejected() {
    let template = Dataset::with_uniform_noise(channels(), 1.0, None, None).unwrap();
    let cfg = config();
    let grid = cfg.grid_for(&template).unwrap();
    assert!(reconstruct_los(&template, &cfg, &grid).is_err());
}
