//! Single-threaded backend, used when the `cpu` feature is off and as a
//! reference for the parallel one.

use crate::backend::{run_pixel, BackendType, ComputeBackend, ComputeError, DeviceInfo, PixelJob, PixelRecord};
use crate::buffer::{OutputBuffer, PixelSlot};

#[derive(Debug, Default, Clone, Copy)]
pub struct SerialBackend;

impl ComputeBackend for SerialBackend {
    fn device_info(&self) -> DeviceInfo {
        DeviceInfo { name: "CPU (serial)".to_string(), backend_type: BackendType::Serial, compute_units: Some(1) }
    }

    fn for_each_pixel(&self, buffer: &mut OutputBuffer, job: &PixelJob<'_>) -> Result<Vec<PixelRecord>, ComputeError> {
        let n_phi = buffer.n_phi();
        let len = buffer.pixel_len();
        Ok(buffer
            .as_mut_slice()
            .chunks_mut(len)
            .enumerate()
            .map(|(i, chunk)| run_pixel(i, PixelSlot::new(chunk, n_phi), job))
            .collect())
    }
}
