//! Sparsity-promoting L1 norm.

use super::{check_reg, ObjectiveTerm};
use crate::error::Result;

/// $\lambda \|x\|_1$.
#[derive(Debug, Clone)]
pub struct L1 {
    reg: f64,
}

impl L1 {
    pub fn new(reg: f64) -> Result<Self> {
        Ok(Self { reg: check_reg("L1", reg)? })
    }
}

/// Soft thresholding: `sign(x) · max(|x| − t, 0)`.
#[inline]
pub fn shrink(x: f64, threshold: f64) -> f64 {
    if x > threshold {
        x - threshold
    } else if x < -threshold {
        x + threshold
    } else {
        0.0
    }
}

impl ObjectiveTerm for L1 {
    fn name(&self) -> &str {
        "L1"
    }

    fn reg(&self) -> f64 {
        self.reg
    }

    fn value(&self, x: &[f64]) -> f64 {
        self.reg * x.iter().map(|v| v.abs()).sum::<f64>()
    }

    fn prox(&self, v: &[f64], step: f64) -> Result<Vec<f64>> {
        let t = self.reg * step;
        Ok(v.iter().map(|&x| shrink(x, t)).collect())
    }
}
