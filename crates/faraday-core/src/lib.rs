//! # Faraday Core
//!
//! The numerical backbone of the Faraday framework. This crate reconstructs
//! the Faraday-depth spectrum of a single line of sight from irregularly
//! sampled polarisation data by solving a regularised linear inverse problem.
//!
//! ## Architecture
//!
//! Every stage is an interchangeable implementation of a small trait:
//!
//! - [`transform::Transform`] maps between channel space and the Faraday-depth
//!   grid ([`transform::DirectTransform`], [`transform::NufftTransform`]).
//! - [`dictionary::Dictionary`] is the optional wavelet sparsifying basis
//!   ([`dictionary::DiscreteWavelet`], [`dictionary::UndecimatedWavelet`]).
//! - [`objective::ObjectiveTerm`] exposes value, gradient and proximal operator
//!   of data-fidelity and regularisation terms.
//! - [`optimization::Optimizer`] iterates a composite objective to convergence
//!   ([`optimization::Fista`], [`optimization::Admm`], [`optimization::Sdmm`]).
//!
//! ## Modules
//!
//! - [`dataset`]: Per-channel frequencies, noise, weights and samples.
//! - [`flagger`]: Statistical channel flagging.
//! - [`parameter`]: Faraday-depth grid and solution buffer.
//! - [`transform`]: Direct and non-uniform fast Faraday transforms.
//! - [`dictionary`]: Decimated and undecimated wavelet dictionaries.
//! - [`objective`]: Chi-squared, L1, TV and TSV terms plus aggregation.
//! - [`optimization`]: FISTA, ADMM and SDMM solvers.
//! - [`pipeline`]: Per line-of-sight reconstruction and peak statistics.

pub mod dataset;
pub mod dictionary;
pub mod error;
pub mod flagger;
pub mod objective;
pub mod optimization;
pub mod parameter;
pub mod pipeline;
pub mod transform;

pub use error::{FaradayError, Result};
