//! Cube runner: ties together the cube, the per-pixel pipeline and the backend.

use std::io::Write;
use std::path::Path;
use std::sync::Arc;

use anyhow::{Context, Result};
use serde::Serialize;

use faraday_compute::{ComputeBackend, OutputBuffer, PixelRecord, PixelSlot, PixelStatus, Product};
use faraday_core::optimization::SolverState;
use faraday_core::parameter::FaradayParameter;
use faraday_core::pipeline::reconstruct_los;
use faraday_core::FaradayError;

use crate::config::{ComputeConfig, JobConfig};
use crate::cube::Cube;

/// Results from a cube run.
pub struct CubeOutput {
    pub grid: FaradayParameter,
    pub buffer: OutputBuffer,
    pub records: Vec<PixelRecord>,
    pub rows: usize,
    pub cols: usize,
}

impl CubeOutput {
    pub fn count(&self, label: &str) -> usize {
        self.records.iter().filter(|r| r.status.label() == label).count()
    }
}

/// Reconstruct every pixel of `cube` under the job configuration.
pub fn run_cube(job: &JobConfig, cube: &Cube) -> Result<CubeOutput> {
    // Everything that would fail every pixel alike is checked up front.
    let config = job.reconstruction_config().context("invalid [reconstruction] settings")?;
    let spectral_index = job.input.spectral_index;
    let template = cube.template(spectral_index).context("building channel setup")?;
    let grid = config.grid_for(&template).context("deriving the Faraday-depth grid")?;
    println!(
        "Grid: {} depths, cell {:.3} rad/m², max depth {:.1} rad/m², RMTF FWHM {:.2} rad/m²",
        grid.n(),
        grid.cellsize(),
        grid.max_faraday_depth(),
        grid.rmtf_fwhm()
    );
    if let Some(w) = &config.wavelet {
        w.build(grid.n()).context("building the wavelet dictionary")?;
    }

    log::info!(
        "solver {:?}, transform {:?}, lambda {:?}, flagging {}",
        config.solver,
        config.transform,
        config.lambda,
        config.flagging.is_some()
    );

    let backend = create_backend(&job.compute)?;
    let mut buffer = OutputBuffer::new(cube.n_pixels(), grid.n())?;
    let mask = job.input.mask();
    let phi_limit = job.output.phi_limit;
    println!("Reconstructing {} pixels with {:?}", cube.n_pixels(), config.solver);

    let pixel_job = |pixel: usize, slot: &mut PixelSlot<'_>| -> Result<PixelRecord, FaradayError> {
        if cube.is_masked(pixel, mask) {
            return Ok(PixelRecord::masked());
        }
        let dataset = cube.pixel_dataset(pixel, spectral_index)?;
        let rec = reconstruct_los(&dataset, &config, &grid)?;
        slot.write(Product::Dirty, &rec.dirty)?;
        slot.write(Product::Model, &rec.model)?;
        slot.write(Product::Restored, &rec.restored)?;
        slot.write(Product::Residual, &rec.residual)?;
        let status = match rec.status {
            SolverState::Converged => PixelStatus::Converged,
            _ => PixelStatus::NotConverged,
        };
        Ok(PixelRecord {
            status,
            summary: Some(rec.summary(&grid, cube.stokes_i(pixel), Some(phi_limit))),
            iterations: rec.iterations,
            flagged_channels: rec.flagged.len(),
        })
    };
    let records = backend.for_each_pixel(&mut buffer, &pixel_job)?;

    let output = CubeOutput { grid, buffer, records, rows: cube.rows, cols: cube.cols };
    println!(
        "Done: {} converged, {} not converged, {} failed, {} masked",
        output.count("converged"),
        output.count("not_converged"),
        output.count("failed"),
        output.count("masked")
    );
    Ok(output)
}

/// Create a compute backend based on the user's preference string.
///
/// - `"serial"`: one pixel at a time.
/// - `"cpu"` / `"auto"` (default): Rayon pool, `threads` wide when given.
fn create_backend(compute: &ComputeConfig) -> Result<Arc<dyn ComputeBackend>> {
    let backend: Arc<dyn ComputeBackend> = match compute.backend.as_str() {
        "serial" => Arc::new(faraday_compute::SerialBackend),
        "cpu" | "auto" => {
            let cpu = match compute.threads {
                Some(n) => faraday_compute::CpuBackend::with_threads(n)?,
                None => faraday_compute::CpuBackend::new()?,
            };
            Arc::new(cpu)
        }
        other => anyhow::bail!("Unknown compute backend '{}'. Valid values: auto, cpu, serial", other),
    };
    println!("Backend: {}", backend.device_info().name);
    Ok(backend)
}

/// A Faraday cube on disk: φ-major, real and imaginary parts split.
#[derive(Serialize)]
struct FaradayCubeFile<'a> {
    product: &'a str,
    rows: usize,
    cols: usize,
    phi: Vec<f64>,
    /// Sample `(j, r, col)` at `j·rows·cols + r·cols + col`; NaN for failed pixels.
    real: Vec<f32>,
    imag: Vec<f32>,
}

/// Depth indices with |φ| below `phi_limit`.
fn windowed_depths(grid: &FaradayParameter, phi_limit: f64) -> Vec<usize> {
    grid.phi()
        .iter()
        .enumerate()
        .filter(|(_, p)| p.abs() < phi_limit)
        .map(|(j, _)| j)
        .collect()
}

/// Write the four Faraday cubes as `faraday_<product>.json`.
pub fn write_cubes(output: &CubeOutput, dir: &Path, phi_limit: f64) -> Result<()> {
    std::fs::create_dir_all(dir)?;
    let depths = windowed_depths(&output.grid, phi_limit);
    let n_pixels = output.buffer.n_pixels();

    for product in Product::ALL {
        let mut real = Vec::with_capacity(depths.len() * n_pixels);
        let mut imag = Vec::with_capacity(depths.len() * n_pixels);
        for &j in &depths {
            for pixel in 0..n_pixels {
                let z = output.buffer.product(pixel, product)[j];
                real.push(z.re);
                imag.push(z.im);
            }
        }
        let file = FaradayCubeFile {
            product: product.name(),
            rows: output.rows,
            cols: output.cols,
            phi: depths.iter().map(|&j| output.grid.phi()[j]).collect(),
            real,
            imag,
        };
        let path = dir.join(format!("faraday_{}.json", product.name()));
        let json = serde_json::to_string(&file)
            .map_err(|e| anyhow::anyhow!("JSON serialisation error: {}", e))?;
        std::fs::write(&path, json).with_context(|| format!("writing {}", path.display()))?;
        println!("Cube written to: {}", path.display());
    }
    Ok(())
}

fn fmt_opt(v: Option<f64>) -> String {
    v.map(|x| format!("{:.6e}", x)).unwrap_or_default()
}

/// Write per-pixel peak statistics to a CSV file with a metadata header.
pub fn write_maps_csv(output: &CubeOutput, path: &Path) -> Result<()> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    let mut file = std::fs::File::create(path)?;

    writeln!(file, "# Faraday-depth reconstruction: per-pixel peak statistics")?;
    writeln!(file, "# Version: {}", env!("CARGO_PKG_VERSION"))?;
    writeln!(file, "# Grid: {} depths, cell {:.4} rad/m²", output.grid.n(), output.grid.cellsize())?;
    writeln!(file, "#")?;
    writeln!(
        file,
        "row,col,status,peak_amplitude,peak_depth,sigma_qu,polarized_intensity,polarization_fraction,peak_depth_error,iterations,flagged_channels"
    )?;

    for (pixel, record) in output.records.iter().enumerate() {
        let (row, col) = (pixel / output.cols, pixel % output.cols);
        let s = record.summary.as_ref();
        writeln!(
            file,
            "{},{},{},{},{},{},{},{},{},{},{}",
            row,
            col,
            record.status.label(),
            fmt_opt(s.map(|s| s.peak_amplitude)),
            fmt_opt(s.map(|s| s.peak_depth)),
            fmt_opt(s.map(|s| s.sigma_qu)),
            fmt_opt(s.map(|s| s.polarized_intensity)),
            fmt_opt(s.and_then(|s| s.polarization_fraction)),
            fmt_opt(s.and_then(|s| s.peak_depth_error)),
            record.iterations,
            record.flagged_channels,
        )?;
    }

    println!("Peak maps written to: {}", path.display());
    Ok(())
}

/// Write the Faraday-depth grid.
pub fn write_phi_csv(grid: &FaradayParameter, path: &Path) -> Result<()> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    let mut file = std::fs::File::create(path)?;
    writeln!(file, "index,phi_rad_m2")?;
    for (j, phi) in grid.phi().iter().enumerate() {
        writeln!(file, "{},{:.6}", j, phi)?;
    }
    Ok(())
}
