//! Statistical channel flagging.
//!
//! Each channel is summarised by one number (the amplitude of its
//! polarisation sample, or its noise level for a dataset without samples),
//! and channels further than `nsigma` scale units from the bulk are removed.

use serde::{Deserialize, Serialize};

use crate::dataset::Dataset;
use crate::error::{FaradayError, Result};
use crate::parameter::std_dev;

/// Consistency constant turning the MAD into a Gaussian standard deviation.
const MAD_TO_SIGMA: f64 = 1.4826;

/// Location and scale estimators.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FlagStrategy {
    /// Median and scaled median absolute deviation.
    #[default]
    Median,
    /// Mean and standard deviation.
    Mean,
}

/// Outlier channel flagger.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Flagger {
    #[serde(default = "default_nsigma")]
    pub nsigma: f64,
    /// Drop flagged channels instead of zeroing their weights.
    #[serde(default)]
    pub delete_channels: bool,
    #[serde(default)]
    pub strategy: FlagStrategy,
    #[serde(default = "default_min_channels")]
    pub min_channels: usize,
}

fn default_nsigma() -> f64 {
    5.0
}
fn default_min_channels() -> usize {
    4
}

impl Default for Flagger {
    fn default() -> Self {
        Self {
            nsigma: default_nsigma(),
            delete_channels: false,
            strategy: FlagStrategy::default(),
            min_channels: default_min_channels(),
        }
    }
}

/// Result of a flagging pass.
#[derive(Debug, Clone)]
pub struct FlagOutcome {
    /// Channels kept, as indices into the input dataset.
    pub kept: Vec<usize>,
    /// Channels removed, including those already at zero weight.
    pub removed: Vec<usize>,
    pub dataset: Dataset,
}

impl Flagger {
    pub fn new(nsigma: f64, delete_channels: bool) -> Self {
        Self { nsigma, delete_channels, ..Default::default() }
    }

    pub fn with_strategy(mut self, strategy: FlagStrategy) -> Self {
        self.strategy = strategy;
        self
    }

    pub fn validate(&self) -> Result<()> {
        if !(self.nsigma.is_finite() && self.nsigma > 0.0) {
            return Err(FaradayError::config(format!("nsigma must be positive, got {}", self.nsigma)));
        }
        Ok(())
    }

    pub fn run(&self, dataset: &Dataset) -> Result<FlagOutcome> {
        self.validate()?;
        let active = dataset.active_channels();
        let stat: Vec<f64> = match dataset.data() {
            Some(d) => active.iter().map(|&i| d[i].norm()).collect(),
            None => active.iter().map(|&i| dataset.sigma()[i]).collect(),
        };

        let (location, scale) = match self.strategy {
            FlagStrategy::Median => {
                let med = median(&stat);
                let deviations: Vec<f64> = stat.iter().map(|x| (x - med).abs()).collect();
                (med, MAD_TO_SIGMA * median(&deviations))
            }
            FlagStrategy::Mean => {
                let mean = stat.iter().sum::<f64>() / stat.len().max(1) as f64;
                (mean, std_dev(&stat))
            }
        };
        // A degenerate spread would flag every channel that differs by rounding.
        let scale = scale.max(f64::EPSILON * location.abs().max(f64::MIN_POSITIVE) * 16.0);
        let threshold = self.nsigma * scale;

        let mut kept = Vec::with_capacity(active.len());
        for (&i, &x) in active.iter().zip(&stat) {
            if (x - location).abs() <= threshold {
                kept.push(i);
            }
        }
        let removed: Vec<usize> = (0..dataset.len()).filter(|i| kept.binary_search(i).is_err()).collect();

        if kept.len() < self.min_channels {
            return Err(FaradayError::InsufficientData { remaining: kept.len(), required: self.min_channels });
        }
        log::debug!(
            "Flagged {} of {} channels (location {:.4e}, scale {:.4e})",
            removed.len(),
            dataset.len(),
            location,
            scale
        );

        let dataset = if self.delete_channels {
            dataset.select(&kept)?
        } else {
            dataset.with_zero_weights(&removed)?
        };
        Ok(FlagOutcome { kept, removed, dataset })
    }
}

fn median(x: &[f64]) -> f64 {
    if x.is_empty() {
        return 0.0;
    }
    let mut v = x.to_vec();
    v.sort_by(|a, b| a.total_cmp(b));
    let mid = v.len() / 2;
    if v.len() % 2 == 0 {
        0.5 * (v[mid - 1] + v[mid])
    } else {
        v[mid]
    }
}
