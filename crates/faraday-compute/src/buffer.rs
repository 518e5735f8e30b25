//! Pixel-major output storage shared by all backends.
//!
//! Each pixel owns one contiguous chunk holding its four spectra
//! (dirty, model, restored, residual) back to back, so workers can be
//! handed disjoint `&mut` chunks without locking.

use faraday_core::FaradayError;
use num_complex::{Complex32, Complex64};

use crate::backend::ComputeError;

/// The spectra stored per pixel, in chunk order.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Product {
    Dirty,
    Model,
    Restored,
    Residual,
}

impl Product {
    pub const ALL: [Product; 4] = [Product::Dirty, Product::Model, Product::Restored, Product::Residual];

    fn index(self) -> usize {
        match self {
            Product::Dirty => 0,
            Product::Model => 1,
            Product::Restored => 2,
            Product::Residual => 3,
        }
    }

    /// Short name, used for output file names.
    pub fn name(self) -> &'static str {
        match self {
            Product::Dirty => "dirty",
            Product::Model => "model",
            Product::Restored => "restored",
            Product::Residual => "residual",
        }
    }
}

const NAN: Complex32 = Complex32::new(f32::NAN, f32::NAN);

/// Single-precision spectra for every pixel of a cube.
#[derive(Debug, Clone)]
pub struct OutputBuffer {
    n_pixels: usize,
    n_phi: usize,
    data: Vec<Complex32>,
}

impl OutputBuffer {
    /// Zero-filled buffer for `n_pixels` pixels of `n_phi` depths each.
    pub fn new(n_pixels: usize, n_phi: usize) -> Result<Self, ComputeError> {
        let len = n_pixels
            .checked_mul(n_phi)
            .and_then(|v| v.checked_mul(Product::ALL.len()))
            .ok_or_else(|| {
                ComputeError::OutOfMemory { requested: usize::MAX, available: isize::MAX as usize }
            })?;
        if n_phi == 0 {
            return Err(ComputeError::BufferShape { expected: 1, found: 0 });
        }
        let bytes = len.saturating_mul(std::mem::size_of::<Complex32>());
        if bytes > isize::MAX as usize {
            return Err(ComputeError::OutOfMemory { requested: bytes, available: isize::MAX as usize });
        }
        Ok(Self { n_pixels, n_phi, data: vec![Complex32::new(0.0, 0.0); len] })
    }

    pub fn n_pixels(&self) -> usize {
        self.n_pixels
    }

    pub fn n_phi(&self) -> usize {
        self.n_phi
    }

    /// Length of one pixel's chunk.
    pub fn pixel_len(&self) -> usize {
        Product::ALL.len() * self.n_phi
    }

    pub fn product(&self, pixel: usize, product: Product) -> &[Complex32] {
        let start = pixel * self.pixel_len() + product.index() * self.n_phi;
        &self.data[start..start + self.n_phi]
    }

    pub(crate) fn as_mut_slice(&mut self) -> &mut [Complex32] {
        &mut self.data
    }
}

/// Mutable view of one pixel's chunk, handed to the per-pixel job.
pub struct PixelSlot<'a> {
    data: &'a mut [Complex32],
    n_phi: usize,
}

impl<'a> PixelSlot<'a> {
    pub(crate) fn new(data: &'a mut [Complex32], n_phi: usize) -> Self {
        Self { data, n_phi }
    }

    /// Store one spectrum, narrowing to single precision.
    ///
    /// Returns an error if `values` does not match the depth count.
    pub fn write(&mut self, product: Product, values: &[Complex64]) -> Result<(), FaradayError> {
        if values.len() != self.n_phi {
            return Err(FaradayError::Shape { what: "spectrum", expected: self.n_phi, found: values.len() });
        }
        let start = product.index() * self.n_phi;
        for (dst, v) in self.data[start..start + self.n_phi].iter_mut().zip(values) {
            *dst = Complex32::new(v.re as f32, v.im as f32);
        }
        Ok(())
    }

    pub(crate) fn fill_nan(&mut self) {
        self.data.fill(NAN);
    }
}
