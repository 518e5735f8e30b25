//! CPU compute backend using Rayon for shared-memory parallelism.

use std::sync::atomic::{AtomicUsize, Ordering};

use rayon::prelude::*;
use rayon::{ThreadPool, ThreadPoolBuilder};

use crate::backend::{run_pixel, BackendType, ComputeBackend, ComputeError, DeviceInfo, PixelJob, PixelRecord};
use crate::buffer::{OutputBuffer, PixelSlot};

/// CPU backend that spreads pixels across a fixed-size Rayon pool.
pub struct CpuBackend {
    pool: ThreadPool,
}

impl CpuBackend {
    /// Create a new CPU backend using all available threads.
    pub fn new() -> Result<Self, ComputeError> {
        Self::with_threads(rayon::current_num_threads())
    }

    /// Create a CPU backend with a specified thread count.
    pub fn with_threads(num_threads: usize) -> Result<Self, ComputeError> {
        if num_threads == 0 {
            return Err(ComputeError::ThreadPool("thread count must be at least 1".into()));
        }
        let pool = ThreadPoolBuilder::new()
            .num_threads(num_threads)
            .thread_name(|i| format!("faraday-worker-{}", i))
            .build()
            .map_err(|e| ComputeError::ThreadPool(e.to_string()))?;
        Ok(Self { pool })
    }

    pub fn num_threads(&self) -> usize {
        self.pool.current_num_threads()
    }
}

impl ComputeBackend for CpuBackend {
    fn device_info(&self) -> DeviceInfo {
        DeviceInfo {
            name: format!("CPU ({} threads)", self.num_threads()),
            backend_type: BackendType::Cpu,
            compute_units: Some(self.num_threads()),
        }
    }

    fn for_each_pixel(&self, buffer: &mut OutputBuffer, job: &PixelJob<'_>) -> Result<Vec<PixelRecord>, ComputeError> {
        let n_phi = buffer.n_phi();
        let len = buffer.pixel_len();
        let total = buffer.n_pixels();
        let step = (total / 10).max(1);
        let done = AtomicUsize::new(0);

        let records: Vec<PixelRecord> = self.pool.install(|| {
            buffer
                .as_mut_slice()
                .par_chunks_mut(len)
                .enumerate()
                .map(|(i, chunk)| {
                    let record = run_pixel(i, PixelSlot::new(chunk, n_phi), job);
                    let finished = done.fetch_add(1, Ordering::Relaxed) + 1;
                    if finished % step == 0 || finished == total {
                        log::info!("{}/{} pixels done", finished, total);
                    }
                    record
                })
                .collect()
        });
        Ok(records)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::PixelStatus;
    use crate::buffer::Product;
    use crate::serial::SerialBackend;
    use faraday_core::FaradayError;
    use num_complex::Complex64;

    fn job(i: usize, slot: &mut PixelSlot<'_>) -> Result<PixelRecord, FaradayError> {
        match i {
            2 => return Err(FaradayError::InsufficientData { remaining: 1, required: 4 }),
            5 => panic!("synthetic failure"),
            7 => return Ok(PixelRecord::masked()),
            _ => {}
        }
        for product in Product::ALL {
            slot.write(product, &vec![Complex64::new(i as f64, -(i as f64)); 6])?;
        }
        let status = if i % 2 == 0 { PixelStatus::Converged } else { PixelStatus::NotConverged };
        Ok(PixelRecord { status, summary: None, iterations: 10 * i, flagged_channels: 0 })
    }

    #[test]
    fn test_device_info() {
        let backend = CpuBackend::with_threads(3).unwrap();
        let info = backend.device_info();
        assert_eq!(info.backend_type, BackendType::Cpu);
        assert_eq!(info.compute_units, Some(3));
        assert!(CpuBackend::with_threads(0).is_err());
    }

    #[test]
    fn test_failures_are_isolated_per_pixel() {
        let backend = CpuBackend::with_threads(4).unwrap();
        let mut buf = OutputBuffer::new(10, 6).unwrap();
        let records = backend.for_each_pixel(&mut buf, &job).unwrap();
        assert_eq!(records.len(), 10);

        assert!(matches!(records[2].status, PixelStatus::Failed(ref r) if r.contains("Insufficient")));
        assert!(matches!(records[5].status, PixelStatus::Failed(ref r) if r.contains("synthetic failure")));
        assert_eq!(records[7].status, PixelStatus::Masked);
        for bad in [2, 5, 7] {
            for product in Product::ALL {
                assert!(buf.product(bad, product).iter().all(|z| z.re.is_nan() && z.im.is_nan()));
            }
        }

        // Every other pixel wrote exactly its own chunk.
        for i in [0, 1, 3, 4, 6, 8, 9] {
            assert_eq!(records[i].iterations, 10 * i);
            for product in Product::ALL {
                assert!(buf.product(i, product).iter().all(|z| z.re == i as f32 && z.im == -(i as f32)));
            }
        }
        assert_eq!(records[3].status, PixelStatus::NotConverged);
    }

    #[test]
    fn test_matches_serial_backend() {
        let mut parallel = OutputBuffer::new(16, 6).unwrap();
        let mut serial = OutputBuffer::new(16, 6).unwrap();
        let a = CpuBackend::with_threads(3).unwrap().for_each_pixel(&mut parallel, &job).unwrap();
        let b = SerialBackend.for_each_pixel(&mut serial, &job).unwrap();
        assert_eq!(a, b);
        for i in (0..16).filter(|i| ![2, 5, 7].contains(i)) {
            assert_eq!(parallel.product(i, Product::Dirty), serial.product(i, Product::Dirty));
        }
    }
}
