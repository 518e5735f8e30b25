//! Faraday-depth reconstruction command-line interface.
//!
//! Run reconstructions from TOML configuration files:
//! ```sh
//! faraday-cli run job.toml
//! faraday-cli validate job.toml
//! faraday-cli wavelets
//! ```

mod config;
mod cube;
mod runner;

use clap::{Parser, Subcommand};
use std::path::PathBuf;

use faraday_core::dictionary::filters::AVAILABLE;

#[derive(Parser)]
#[command(name = "faraday-cli")]
#[command(about = "Sparse Faraday-depth reconstruction of polarised image cubes")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Reconstruct a cube from a TOML configuration file.
    Run {
        /// Path to the job configuration file.
        config: PathBuf,
        /// Output directory (overrides config file setting).
        #[arg(short, long)]
        output: Option<PathBuf>,
    },
    /// Validate a configuration file and its cube without reconstructing.
    Validate {
        /// Path to the job configuration file.
        config: PathBuf,
    },
    /// List the wavelets available for sparse dictionaries.
    Wavelets,
}

fn main() -> anyhow::Result<()> {
    env_logger::init();
    let cli = Cli::parse();

    match cli.command {
        Commands::Run { config, output } => {
            println!("Faraday-depth reconstruction");
            println!("============================");
            let job = config::load_config(&config)?;
            println!("Configuration: {}", config.display());
            let cube = cube::Cube::load(&PathBuf::from(&job.input.cube))?;
            println!(
                "Cube: {} x {} pixels, {} channels",
                cube.rows,
                cube.cols,
                cube.n_channels()
            );

            let result = runner::run_cube(&job, &cube)?;

            // Determine output directory
            let out_dir = output.unwrap_or_else(|| PathBuf::from(&job.output.directory));

            if job.output.save_cubes {
                runner::write_cubes(&result, &out_dir, job.output.phi_limit)?;
            }
            if job.output.save_maps {
                runner::write_maps_csv(&result, &out_dir.join("maps.csv"))?;
            }
            runner::write_phi_csv(&result.grid, &out_dir.join("phi.csv"))?;

            println!("Reconstruction complete.");
            Ok(())
        }
        Commands::Validate { config } => {
            let job = config::load_config(&config)?;
            job.reconstruction_config()?;
            let cube = cube::Cube::load(&PathBuf::from(&job.input.cube))?;
            let template = cube.template(job.input.spectral_index)?;
            let grid = job.reconstruction_config()?.grid_for(&template)?;
            println!("Configuration is valid: {}", config.display());
            println!("Grid would have {} depths (cell {:.3} rad/m²)", grid.n(), grid.cellsize());
            Ok(())
        }
        Commands::Wavelets => {
            println!("Available wavelets (decimated and undecimated):");
            for name in AVAILABLE {
                println!("  {}", name);
            }
            println!();
            println!("Continuous wavelets are not supported.");
            Ok(())
        }
    }
}
