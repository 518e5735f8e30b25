//! Reconstruction of a single line of sight.
//!
//! Ties the stages together: optional flagging, dirty spectrum, noise and
//! regularisation estimate, sparse solve (optionally in a wavelet basis),
//! then model, residual and restored spectra and the derived peak
//! statistics.

use std::sync::Arc;

use num_complex::Complex64;
use serde::{Deserialize, Serialize};

use crate::dataset::Dataset;
use crate::dictionary::WaveletConfig;
use crate::error::{FaradayError, Result};
use crate::flagger::Flagger;
use crate::objective::{Chi2, LambdaPolicy, ObjectiveAggregator, ObjectiveTerm, TotalSquaredVariation, TotalVariation, L1};
use crate::optimization::{SolverKind, SolverSettings, SolverState};
use crate::parameter::{complex_to_real, real_to_complex, FaradayParameter};
use crate::transform::TransformKind;

/// Noise bias factor of the debiased peak polarised intensity.
const PEAK_BIAS: f64 = 2.3;

/// Everything that controls one reconstruction.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReconstructionConfig {
    #[serde(default = "default_oversampling")]
    pub oversampling: f64,
    #[serde(default = "default_transform")]
    pub transform: TransformKind,
    #[serde(default)]
    pub solver: SolverKind,
    #[serde(default)]
    pub lambda: LambdaPolicy,
    #[serde(default)]
    pub lambda_tv: f64,
    #[serde(default)]
    pub lambda_tsv: f64,
    #[serde(default)]
    pub wavelet: Option<WaveletConfig>,
    #[serde(default)]
    pub settings: SolverSettings,
    #[serde(default)]
    pub flagging: Option<Flagger>,
    /// Noise of the dirty spectrum; estimated from its edges when absent.
    #[serde(default)]
    pub noise: Option<f64>,
}

fn default_oversampling() -> f64 {
    8.0
}
fn default_transform() -> TransformKind {
    TransformKind::Nufft
}

impl Default for ReconstructionConfig {
    fn default() -> Self {
        Self {
            oversampling: default_oversampling(),
            transform: default_transform(),
            solver: SolverKind::default(),
            lambda: LambdaPolicy::default(),
            lambda_tv: 0.0,
            lambda_tsv: 0.0,
            wavelet: None,
            settings: SolverSettings::default(),
            flagging: None,
            noise: None,
        }
    }
}

impl ReconstructionConfig {
    /// Reject anything that would fail every pixel the same way.
    pub fn validate(&self) -> Result<()> {
        if !(self.oversampling.is_finite() && self.oversampling > 0.0) {
            return Err(FaradayError::config(format!(
                "oversampling must be positive, got {}",
                self.oversampling
            )));
        }
        for (name, v) in [("lambda_tv", self.lambda_tv), ("lambda_tsv", self.lambda_tsv)] {
            if !(v.is_finite() && v >= 0.0) {
                return Err(FaradayError::config(format!("{} must be finite and non-negative, got {}", name, v)));
            }
        }
        if let Some(noise) = self.noise {
            if !(noise.is_finite() && noise >= 0.0) {
                return Err(FaradayError::config(format!("noise must be finite and non-negative, got {}", noise)));
            }
        }
        self.lambda.validate()?;
        self.settings.validate()?;
        if let Some(w) = &self.wavelet {
            w.validate()?;
        }
        if let Some(f) = &self.flagging {
            f.validate()?;
        }
        Ok(())
    }

    /// Faraday-depth grid for `dataset` under this configuration.
    pub fn grid_for(&self, dataset: &Dataset) -> Result<FaradayParameter> {
        FaradayParameter::calculate_cellsize(dataset, self.oversampling, self.transform.grid_policy())
    }
}

/// Spectra and diagnostics of one reconstructed line of sight.
#[derive(Debug, Clone)]
pub struct LosReconstruction {
    pub dirty: Vec<Complex64>,
    pub model: Vec<Complex64>,
    /// Model convolved with the restoring beam plus the residual.
    pub restored: Vec<Complex64>,
    pub residual: Vec<Complex64>,
    /// Noise level used for the regularisation weight.
    pub noise: f64,
    pub lambda_l1: f64,
    pub status: SolverState,
    pub iterations: usize,
    pub objective: f64,
    /// Channels removed by flagging.
    pub flagged: Vec<usize>,
}

/// Peak statistics of a restored spectrum.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct LosSummary {
    pub peak_amplitude: f64,
    pub peak_depth: f64,
    /// Noise of the restored spectrum at the grid edges.
    pub sigma_qu: f64,
    /// Peak amplitude corrected for noise bias.
    pub polarized_intensity: f64,
    /// Debiased peak over total intensity; needs Stokes I.
    pub polarization_fraction: Option<f64>,
    /// Uncertainty of the peak depth, `FWHM / (2 P/σ)`; `None` without a
    /// detectable peak or without a noise estimate.
    pub peak_depth_error: Option<f64>,
}

impl LosReconstruction {
    /// Peak statistics of the restored spectrum.
    ///
    /// With `phi_limit` the peak is searched only where `|φ| < phi_limit`,
    /// falling back to the whole grid when no depth lies inside the window.
    pub fn summary(&self, grid: &FaradayParameter, stokes_i: Option<f64>, phi_limit: Option<f64>) -> LosSummary {
        let in_window = |j: usize| match (phi_limit, grid.phi().get(j)) {
            (Some(limit), Some(p)) => p.abs() < limit,
            _ => true,
        };
        let windowed = (0..self.restored.len()).any(|j| in_window(j));
        let (peak_index, peak_amplitude) = self
            .restored
            .iter()
            .map(|z| z.norm())
            .enumerate()
            .filter(|(j, _)| !windowed || in_window(*j))
            .fold((0, f64::NEG_INFINITY), |best, (i, a)| if a > best.1 { (i, a) } else { best });
        let peak_depth = grid.phi().get(peak_index).copied().unwrap_or(f64::NAN);
        let sigma_qu = grid.edge_noise(&self.restored);
        let polarized_intensity = (peak_amplitude * peak_amplitude - PEAK_BIAS * sigma_qu * sigma_qu)
            .max(0.0)
            .sqrt();
        let polarization_fraction = stokes_i
            .filter(|i| i.is_finite() && *i > 0.0)
            .map(|i| polarized_intensity / i);
        let peak_depth_error = Some(grid.rmtf_fwhm() * sigma_qu / (2.0 * polarized_intensity))
            .filter(|_| polarized_intensity > 0.0 && sigma_qu > 0.0)
            .filter(|e| e.is_finite());
        LosSummary {
            peak_amplitude,
            peak_depth,
            sigma_qu,
            polarized_intensity,
            polarization_fraction,
            peak_depth_error,
        }
    }
}

/// Reconstruct one line of sight on a given grid.
///
/// The grid is normally shared by every pixel of a cube (see
/// [`ReconstructionConfig::grid_for`]); the dataset must carry samples.
pub fn reconstruct_los(
    dataset: &Dataset,
    config: &ReconstructionConfig,
    grid: &FaradayParameter,
) -> Result<LosReconstruction> {
    config.validate()?;

    let (dataset, flagged) = match &config.flagging {
        Some(flagger) => {
            let outcome = flagger.run(dataset)?;
            (outcome.dataset, outcome.removed)
        }
        None => (dataset.clone(), Vec::new()),
    };
    let data = dataset.require_data()?.to_vec();

    let transform = config.transform.build(&dataset, grid);
    let dirty = transform.backward(&data);

    let noise = match config.noise {
        Some(n) => n,
        None => grid.edge_noise(&dirty),
    };
    let lambda_l1 = config.lambda.build().lambda(dataset.active_channels().len(), noise);
    log::debug!(
        "LOS: {} channels, {} depths, noise {:.3e}, lambda {:.3e}",
        dataset.active_channels().len(),
        grid.n(),
        noise,
        lambda_l1
    );

    let dictionary = config.wavelet.as_ref().map(|w| w.build(grid.n())).transpose()?;
    let chi2 = Chi2::new(transform.clone(), data.clone(), dictionary.clone())?;
    let f = ObjectiveAggregator::smooth(vec![Arc::new(chi2) as Arc<dyn ObjectiveTerm>])?;

    let mut g_terms: Vec<Arc<dyn ObjectiveTerm>> = Vec::new();
    if config.lambda_tv > 0.0 {
        g_terms.push(Arc::new(TotalVariation::new(config.lambda_tv)?));
    }
    if config.lambda_tsv > 0.0 {
        g_terms.push(Arc::new(TotalSquaredVariation::new(config.lambda_tsv)?));
    }
    g_terms.push(Arc::new(L1::new(lambda_l1)?));
    let g = ObjectiveAggregator::new(g_terms);

    let mut guess = grid.clone();
    let start = complex_to_real(&dirty);
    guess.set_real(match &dictionary {
        Some(d) => d.decompose(&start),
        None => start,
    });

    let mut solver = config.solver.build(guess, f, g, config.settings)?;
    let output = solver.run()?;
    if output.status == SolverState::MaxItersReached {
        log::warn!("{} stopped at the iteration cap; model may be under-converged", solver.name());
    }

    let x = output
        .parameter
        .as_real()
        .ok_or_else(|| FaradayError::config("solver returned a complex solution"))?;
    let stacked = match &dictionary {
        Some(d) => d.reconstruct(x),
        None => x.to_vec(),
    };
    let model = real_to_complex(&stacked);

    let mut model_param = grid.clone();
    model_param.set_complex(model.clone())?;
    let convolved = model_param.convolve(true)?;
    let residual = transform.backward(&transform.residual(&model, &data));
    let restored = convolved.iter().zip(&residual).map(|(c, r)| c + r).collect();

    Ok(LosReconstruction {
        dirty,
        model,
        restored,
        residual,
        noise,
        lambda_l1,
        status: output.status,
        iterations: output.iterations,
        objective: output.objective,
        flagged,
    })
}
