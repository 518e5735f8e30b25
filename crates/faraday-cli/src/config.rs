//! TOML configuration deserialisation for reconstruction jobs.

use std::path::Path;

use anyhow::Context;
use serde::Deserialize;

use faraday_core::dictionary::{WaveletConfig, WaveletMode};
use faraday_core::flagger::{FlagStrategy, Flagger};
use faraday_core::objective::LambdaPolicy;
use faraday_core::optimization::{SolverKind, SolverSettings};
use faraday_core::pipeline::ReconstructionConfig;
use faraday_core::transform::TransformKind;
use faraday_core::FaradayError;

use crate::cube::PixelMask;

/// Top-level job configuration.
#[derive(Debug, Deserialize)]
pub struct JobConfig {
    pub input: InputConfig,
    #[serde(default)]
    pub reconstruction: ReconstructionSection,
    #[serde(default)]
    pub flagging: FlaggingConfig,
    #[serde(default)]
    pub compute: ComputeConfig,
    #[serde(default)]
    pub output: OutputConfig,
}

/// Where the cube comes from.
#[derive(Debug, Deserialize)]
pub struct InputConfig {
    /// Path to the JSON cube, relative to the working directory.
    pub cube: String,
    /// Overrides the spectral index stored in the cube.
    #[serde(default)]
    pub spectral_index: Option<f64>,
    /// Pixels whose Stokes I falls below this are skipped.
    #[serde(default)]
    pub stokes_i_threshold: Option<f64>,
    /// Pixels whose mean polarised amplitude falls below this are skipped.
    #[serde(default)]
    pub polarized_threshold: Option<f64>,
}

impl InputConfig {
    pub fn mask(&self) -> PixelMask {
        PixelMask { stokes_i: self.stokes_i_threshold, polarized: self.polarized_threshold }
    }
}

/// Solver and regularisation parameters from TOML.
#[derive(Debug, Deserialize)]
pub struct ReconstructionSection {
    #[serde(default = "default_oversampling")]
    pub oversampling: f64,
    #[serde(default = "default_transform")]
    pub transform: TransformKind,
    #[serde(default)]
    pub solver: SolverKind,
    /// Scale of the universal threshold, `λ = η √(2N + √(4N)) σ`.
    #[serde(default = "default_eta")]
    pub eta: f64,
    /// Fixed L1 weight; replaces the universal threshold when set.
    #[serde(default)]
    pub lambda: Option<f64>,
    #[serde(default)]
    pub lambda_tv: f64,
    #[serde(default)]
    pub lambda_tsv: f64,
    #[serde(default = "default_tolerance")]
    pub tolerance: f64,
    #[serde(default = "default_max_iterations")]
    pub max_iterations: usize,
    /// Wavelet name, e.g. "db4"; plain pixel basis when absent.
    #[serde(default)]
    pub wavelet: Option<String>,
    #[serde(default)]
    pub wavelet_level: Option<usize>,
    #[serde(default)]
    pub wavelet_mode: WaveletMode,
    /// Known noise of the dirty spectrum; estimated per pixel when absent.
    #[serde(default)]
    pub noise: Option<f64>,
}

impl Default for ReconstructionSection {
    fn default() -> Self {
        Self {
            oversampling: default_oversampling(),
            transform: default_transform(),
            solver: SolverKind::default(),
            eta: default_eta(),
            lambda: None,
            lambda_tv: 0.0,
            lambda_tsv: 0.0,
            tolerance: default_tolerance(),
            max_iterations: default_max_iterations(),
            wavelet: None,
            wavelet_level: None,
            wavelet_mode: WaveletMode::default(),
            noise: None,
        }
    }
}

fn default_oversampling() -> f64 {
    8.0
}
fn default_transform() -> TransformKind {
    TransformKind::Nufft
}
fn default_eta() -> f64 {
    1.0
}
fn default_tolerance() -> f64 {
    1e-6
}
fn default_max_iterations() -> usize {
    1000
}

/// Channel flagging.
#[derive(Debug, Deserialize)]
pub struct FlaggingConfig {
    #[serde(default)]
    pub enabled: bool,
    #[serde(default = "default_nsigma")]
    pub nsigma: f64,
    #[serde(default)]
    pub delete_channels: bool,
    #[serde(default)]
    pub strategy: FlagStrategy,
}

impl Default for FlaggingConfig {
    fn default() -> Self {
        Self { enabled: false, nsigma: default_nsigma(), delete_channels: false, strategy: FlagStrategy::default() }
    }
}

fn default_nsigma() -> f64 {
    5.0
}

/// Compute backend selection.
#[derive(Debug, Deserialize)]
pub struct ComputeConfig {
    /// "auto", "cpu" or "serial". Default: "auto".
    #[serde(default = "default_backend")]
    pub backend: String,
    /// Worker threads for the CPU backend; all cores when absent.
    #[serde(default)]
    pub threads: Option<usize>,
}

impl Default for ComputeConfig {
    fn default() -> Self {
        Self { backend: default_backend(), threads: None }
    }
}

fn default_backend() -> String {
    "auto".into()
}

/// Output configuration.
#[derive(Debug, Deserialize)]
pub struct OutputConfig {
    /// Output directory (default: "./output").
    #[serde(default = "default_output_dir")]
    pub directory: String,
    /// Only depths with |φ| below this are written to the cubes (rad/m²).
    #[serde(default = "default_phi_limit")]
    pub phi_limit: f64,
    /// Whether to write the four Faraday cubes as JSON (default: true).
    #[serde(default = "default_true")]
    pub save_cubes: bool,
    /// Whether to write the per-pixel peak statistics (default: true).
    #[serde(default = "default_true")]
    pub save_maps: bool,
}

impl Default for OutputConfig {
    fn default() -> Self {
        Self {
            directory: default_output_dir(),
            phi_limit: default_phi_limit(),
            save_cubes: true,
            save_maps: true,
        }
    }
}

fn default_output_dir() -> String {
    "./output".into()
}
fn default_phi_limit() -> f64 {
    1000.0
}
fn default_true() -> bool {
    true
}

impl JobConfig {
    /// Translate the job into the core configuration, validating everything.
    pub fn reconstruction_config(&self) -> Result<ReconstructionConfig, FaradayError> {
        let r = &self.reconstruction;
        let lambda = match r.lambda {
            Some(value) => LambdaPolicy::Fixed { value },
            None => LambdaPolicy::Universal { eta: r.eta },
        };
        let wavelet = r
            .wavelet
            .as_ref()
            .map(|name| WaveletConfig::new(name.clone(), r.wavelet_level, r.wavelet_mode));
        let flagging = self.flagging.enabled.then(|| Flagger {
            nsigma: self.flagging.nsigma,
            delete_channels: self.flagging.delete_channels,
            strategy: self.flagging.strategy,
            ..Flagger::default()
        });

        let config = ReconstructionConfig {
            oversampling: r.oversampling,
            transform: r.transform,
            solver: r.solver,
            lambda,
            lambda_tv: r.lambda_tv,
            lambda_tsv: r.lambda_tsv,
            wavelet,
            settings: SolverSettings {
                max_iterations: r.max_iterations,
                tolerance: r.tolerance,
                ..SolverSettings::default()
            },
            flagging,
            noise: r.noise,
        };
        config.validate()?;
        Ok(config)
    }
}

/// Load and parse a TOML job configuration file.
pub fn load_config(path: &Path) -> anyhow::Result<JobConfig> {
    let content =
        std::fs::read_to_string(path).with_context(|| format!("reading config {}", path.display()))?;
    let config: JobConfig =
        toml::from_str(&content).with_context(|| format!("parsing config {}", path.display()))?;
    Ok(config)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_minimal_config_uses_defaults() {
        let job: JobConfig = toml::from_str("[input]\ncube = \"cube.json\"\n").unwrap();
        assert_eq!(job.input.cube, "cube.json");
        assert_eq!(job.input.mask(), PixelMask::default());
        assert_eq!(job.reconstruction.oversampling, 8.0);
        assert_eq!(job.reconstruction.transform, TransformKind::Nufft);
        assert_eq!(job.reconstruction.solver, SolverKind::Fista);
        assert_eq!(job.reconstruction.tolerance, 1e-6);
        assert_eq!(job.reconstruction.max_iterations, 1000);
        assert_eq!(job.reconstruction.eta, 1.0);
        assert!(!job.flagging.enabled);
        assert_eq!(job.compute.backend, "auto");
        assert_eq!(job.output.directory, "./output");
        assert_eq!(job.output.phi_limit, 1000.0);

        let rc = job.reconstruction_config().unwrap();
        assert_eq!(rc.lambda, LambdaPolicy::Universal { eta: 1.0 });
        assert!(rc.flagging.is_none());
        assert!(rc.wavelet.is_none());
    }

    #[test]
    fn test_full_config() {
        let text = r#"
            [input]
            cube = "data/field.json"
            stokes_i_threshold = 0.01
            polarized_threshold = 0.002

            [reconstruction]
            oversampling = 4.0
            transform = "dft"
            solver = "admm"
            lambda = 0.02
            lambda_tv = 0.1
            wavelet = "coif2"
            wavelet_level = 3
            wavelet_mode = "swt"
            max_iterations = 250

            [flagging]
            enabled = true
            nsigma = 4.0
            strategy = "mean"

            [compute]
            backend = "cpu"
            threads = 2

            [output]
            directory = "out"
            phi_limit = 500.0
            save_cubes = false
        "#;
        let job: JobConfig = toml::from_str(text).unwrap();
        assert_eq!(job.compute.threads, Some(2));
        assert_eq!(job.input.mask(), PixelMask { stokes_i: Some(0.01), polarized: Some(0.002) });
        assert!(!job.output.save_cubes);
        assert!(job.output.save_maps);

        let rc = job.reconstruction_config().unwrap();
        assert_eq!(rc.transform, TransformKind::Direct);
        assert_eq!(rc.solver, SolverKind::Admm);
        assert_eq!(rc.lambda, LambdaPolicy::Fixed { value: 0.02 });
        assert_eq!(rc.settings.max_iterations, 250);
        let wavelet = rc.wavelet.unwrap();
        assert_eq!(wavelet.mode, WaveletMode::Undecimated);
        assert_eq!(wavelet.level, Some(3));
        let flagger = rc.flagging.unwrap();
        assert_eq!(flagger.nsigma, 4.0);
        assert_eq!(flagger.strategy, FlagStrategy::Mean);
    }

    #[test]
    fn test_invalid_values_are_rejected_before_running() {
        let job: JobConfig =
            toml::from_str("[input]\ncube = \"c.json\"\n[reconstruction]\noversampling = -1.0\n").unwrap();
        assert!(job.reconstruction_config().unwrap_err().is_fatal());

        let job: JobConfig =
            toml::from_str("[input]\ncube = \"c.json\"\n[reconstruction]\nwavelet = \"mexh\"\n").unwrap();
        assert!(job.reconstruction_config().is_err());

        assert!(toml::from_str::<JobConfig>("[input]\ncube = \"c.json\"\n[reconstruction]\nsolver = \"cg\"\n").is_err());
    }
}
