//! Compute backend trait and per-pixel bookkeeping.
//!
//! The [`ComputeBackend`] trait abstracts over execution strategies so that
//! the reconstruction code in `faraday-core` stays unaware of threading.
//! Every backend shares the same failure contract: a pixel whose job errors
//! or panics is NaN-filled and reported, and the rest of the cube proceeds.

use std::panic::{self, AssertUnwindSafe};

use faraday_core::pipeline::LosSummary;
use faraday_core::FaradayError;
use thiserror::Error;

use crate::buffer::{OutputBuffer, PixelSlot};

/// Errors originating from compute backends.
#[derive(Debug, Error)]
pub enum ComputeError {
    #[error("Thread pool error: {0}")]
    ThreadPool(String),

    #[error("Buffer shape mismatch: expected {expected} depth samples, found {found}")]
    BufferShape { expected: usize, found: usize },

    #[error("Out of memory: requested {requested} bytes, available {available}")]
    OutOfMemory { requested: usize, available: usize },
}

/// Describes the capabilities of a compute backend.
#[derive(Debug, Clone)]
pub struct DeviceInfo {
    pub name: String,
    pub backend_type: BackendType,
    pub compute_units: Option<usize>,
}

/// The type of compute backend.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BackendType {
    Serial,
    Cpu,
}

/// Outcome of one pixel.
#[derive(Debug, Clone, PartialEq)]
pub enum PixelStatus {
    Converged,
    /// Stopped at the iteration cap; spectra are still written.
    NotConverged,
    Failed(String),
    /// Skipped by the caller; spectra are NaN.
    Masked,
}

impl PixelStatus {
    pub fn label(&self) -> &str {
        match self {
            PixelStatus::Converged => "converged",
            PixelStatus::NotConverged => "not_converged",
            PixelStatus::Failed(_) => "failed",
            PixelStatus::Masked => "masked",
        }
    }
}

/// What a pixel job reports back besides its spectra.
#[derive(Debug, Clone, PartialEq)]
pub struct PixelRecord {
    pub status: PixelStatus,
    pub summary: Option<LosSummary>,
    pub iterations: usize,
    pub flagged_channels: usize,
}

impl PixelRecord {
    pub fn masked() -> Self {
        Self { status: PixelStatus::Masked, summary: None, iterations: 0, flagged_channels: 0 }
    }

    pub fn failed(reason: impl Into<String>) -> Self {
        Self { status: PixelStatus::Failed(reason.into()), summary: None, iterations: 0, flagged_channels: 0 }
    }
}

/// Per-pixel work: reconstruct pixel `index` and write its spectra into the slot.
pub type PixelJob<'a> = dyn Fn(usize, &mut PixelSlot<'_>) -> Result<PixelRecord, FaradayError> + Send + Sync + 'a;

/// Abstraction over compute backends.
pub trait ComputeBackend: Send + Sync {
    /// Return information about the device.
    fn device_info(&self) -> DeviceInfo;

    /// Run `job` once for every pixel of `buffer`.
    ///
    /// Each invocation only sees its own pixel's chunk. Records are returned
    /// in pixel order.
    fn for_each_pixel(&self, buffer: &mut OutputBuffer, job: &PixelJob<'_>) -> Result<Vec<PixelRecord>, ComputeError>;
}

/// Run one pixel with failure isolation.
pub(crate) fn run_pixel(index: usize, mut slot: PixelSlot<'_>, job: &PixelJob<'_>) -> PixelRecord {
    let outcome = panic::catch_unwind(AssertUnwindSafe(|| job(index, &mut slot)));
    let record = match outcome {
        Ok(Ok(record)) => record,
        Ok(Err(err)) => {
            log::warn!("pixel {} failed: {}", index, err);
            PixelRecord::failed(err.to_string())
        }
        Err(payload) => {
            let reason = panic_message(payload.as_ref());
            log::warn!("pixel {} panicked: {}", index, reason);
            PixelRecord::failed(format!("panic: {}", reason))
        }
    };
    if matches!(record.status, PixelStatus::Failed(_) | PixelStatus::Masked) {
        slot.fill_nan();
    }
    record
}

fn panic_message(payload: &(dyn std::any::Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic payload".to_string()
    }
}
