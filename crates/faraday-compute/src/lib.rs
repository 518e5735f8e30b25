//! # Faraday Compute
//!
//! Compute backend abstraction for cube reconstruction. This crate provides
//! a [`ComputeBackend`](backend::ComputeBackend) trait that runs an
//! independent per-pixel job over every line of sight of a cube, writing
//! into a pre-allocated [`OutputBuffer`](buffer::OutputBuffer).
//!
//! ## Available backends
//!
//! | Backend | Feature flag | Notes |
//! |---------|-------------|-------|
//! | Serial | always | One pixel at a time |
//! | CPU (Rayon) | `cpu` (default) | Fixed-size thread pool |

pub mod backend;
pub mod buffer;
pub mod serial;

#[cfg(feature = "cpu")]
pub mod cpu;

pub use backend::{BackendType, ComputeBackend, ComputeError, DeviceInfo, PixelJob, PixelRecord, PixelStatus};
pub use buffer::{OutputBuffer, PixelSlot, Product};
pub use serial::SerialBackend;

#[cfg(feature = "cpu")]
pub use cpu::CpuBackend;
