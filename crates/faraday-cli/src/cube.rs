//! JSON polarisation cube input.
//!
//! ```json
//! {
//!   "frequencies_hz": [1.0e9, ...],
//!   "rows": 2, "cols": 3,
//!   "q": [...], "u": [...],
//!   "noise": 0.01,
//!   "stokes_i": [...],
//!   "spectral_index": -0.7
//! }
//! ```
//!
//! `q` and `u` are channel-major: sample `(c, r, col)` sits at
//! `c·rows·cols + r·cols + col`; `null` marks a blanked sample. `noise` is one
//! value for every channel or a per-channel list. `stokes_i` holds one total
//! intensity per pixel.

use std::path::Path;

use anyhow::{bail, Context, Result};
use num_complex::Complex64;
use serde::{Deserialize, Deserializer};

use faraday_core::dataset::Dataset;

#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
pub enum NoiseLevel {
    Uniform(f64),
    PerChannel(Vec<f64>),
}

#[derive(Debug, Clone, Deserialize)]
pub struct Cube {
    pub frequencies_hz: Vec<f64>,
    pub rows: usize,
    pub cols: usize,
    #[serde(deserialize_with = "nullable")]
    pub q: Vec<f64>,
    #[serde(deserialize_with = "nullable")]
    pub u: Vec<f64>,
    pub noise: NoiseLevel,
    #[serde(default)]
    pub stokes_i: Option<Vec<f64>>,
    #[serde(default)]
    pub spectral_index: Option<f64>,
}

fn nullable<'de, D: Deserializer<'de>>(deserializer: D) -> std::result::Result<Vec<f64>, D::Error> {
    let values: Vec<Option<f64>> = Vec::deserialize(deserializer)?;
    Ok(values.into_iter().map(|v| v.unwrap_or(f64::NAN)).collect())
}

impl Cube {
    pub fn load(path: &Path) -> Result<Self> {
        let text = std::fs::read_to_string(path).with_context(|| format!("reading cube {}", path.display()))?;
        let cube: Cube =
            serde_json::from_str(&text).with_context(|| format!("parsing cube {}", path.display()))?;
        cube.validate()?;
        Ok(cube)
    }

    /// Check that every array matches the declared dimensions.
    pub fn validate(&self) -> Result<()> {
        let n_chan = self.frequencies_hz.len();
        if n_chan < 2 {
            bail!("cube needs at least two channels, found {}", n_chan);
        }
        if self.n_pixels() == 0 {
            bail!("cube has no pixels ({} x {})", self.rows, self.cols);
        }
        let expected = n_chan * self.n_pixels();
        for (name, len) in [("q", self.q.len()), ("u", self.u.len())] {
            if len != expected {
                bail!("'{}' has {} samples, expected {} ({} channels x {} pixels)", name, len, expected, n_chan, self.n_pixels());
            }
        }
        if let NoiseLevel::PerChannel(sigma) = &self.noise {
            if sigma.len() != n_chan {
                bail!("'noise' has {} entries, expected one per channel ({})", sigma.len(), n_chan);
            }
        }
        if let Some(i) = &self.stokes_i {
            if i.len() != self.n_pixels() {
                bail!("'stokes_i' has {} entries, expected one per pixel ({})", i.len(), self.n_pixels());
            }
        }
        Ok(())
    }

    pub fn n_channels(&self) -> usize {
        self.frequencies_hz.len()
    }

    pub fn n_pixels(&self) -> usize {
        self.rows * self.cols
    }

    fn sigma(&self) -> Vec<f64> {
        match &self.noise {
            NoiseLevel::Uniform(s) => vec![*s; self.n_channels()],
            NoiseLevel::PerChannel(s) => s.clone(),
        }
    }

    /// Channel setup without samples, shared by every pixel and used to derive the grid.
    pub fn template(&self, spectral_index: Option<f64>) -> faraday_core::Result<Dataset> {
        Dataset::new(
            self.frequencies_hz.clone(),
            self.sigma(),
            None,
            spectral_index.or(self.spectral_index),
        )
    }

    /// Q + iU spectrum of one pixel.
    pub fn spectrum(&self, pixel: usize) -> Vec<Complex64> {
        let stride = self.n_pixels();
        (0..self.n_channels())
            .map(|c| Complex64::new(self.q[c * stride + pixel], self.u[c * stride + pixel]))
            .collect()
    }

    /// Dataset of one pixel; blanked (non-finite) samples get zero weight.
    pub fn pixel_dataset(&self, pixel: usize, spectral_index: Option<f64>) -> faraday_core::Result<Dataset> {
        Dataset::new(
            self.frequencies_hz.clone(),
            self.sigma(),
            Some(self.spectrum(pixel)),
            spectral_index.or(self.spectral_index),
        )
    }

    pub fn stokes_i(&self, pixel: usize) -> Option<f64> {
        self.stokes_i.as_ref().map(|i| i[pixel])
    }

    /// Mean polarised amplitude `|Q + iU|` over the unblanked channels.
    pub fn polarized_intensity(&self, pixel: usize) -> Option<f64> {
        let amplitudes: Vec<f64> = self
            .spectrum(pixel)
            .iter()
            .filter(|p| p.re.is_finite() && p.im.is_finite())
            .map(|p| p.norm())
            .collect();
        if amplitudes.is_empty() {
            None
        } else {
            Some(amplitudes.iter().sum::<f64>() / amplitudes.len() as f64)
        }
    }

    /// Whether a pixel should be skipped: fully blanked, or below either threshold of `mask`.
    pub fn is_masked(&self, pixel: usize, mask: PixelMask) -> bool {
        let Some(p) = self.polarized_intensity(pixel) else {
            return true;
        };
        if let (Some(threshold), Some(i)) = (mask.stokes_i, self.stokes_i(pixel)) {
            if !(i >= threshold) {
                return true;
            }
        }
        matches!(mask.polarized, Some(threshold) if !(p >= threshold))
    }
}

/// Brightness limits below which a pixel is not reconstructed.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct PixelMask {
    /// Minimum Stokes I; ignored when the cube has no Stokes I map.
    pub stokes_i: Option<f64>,
    /// Minimum mean polarised amplitude.
    pub polarized: Option<f64>,
}
