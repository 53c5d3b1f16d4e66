use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Parser;
use tracing_subscriber::EnvFilter;

use tiered_terrain::ascii;
use tiered_terrain::{generate, TerrainConfig, TerrainSeeds};

#[derive(Parser, Debug)]
#[command(name = "tiered_terrain")]
#[command(about = "Generate multi-level terrain with POIs, roads and progressive ramps")]
struct Args {
    /// Grid width in cells (overrides the config)
    #[arg(short = 'W', long)]
    width: Option<usize>,

    /// Grid height in cells (overrides the config)
    #[arg(short = 'H', long)]
    height: Option<usize>,

    /// Random seed (uses random seed if not specified)
    #[arg(short, long)]
    seed: Option<u64>,

    /// JSON config file; missing fields use defaults
    #[arg(short, long, value_name = "PATH")]
    config: Option<PathBuf>,

    /// Number of POIs to place (overrides the config)
    #[arg(short = 'p', long)]
    pois: Option<usize>,

    /// Write POIs, roads, report and the grid snapshot as JSON
    #[arg(short, long, value_name = "PATH")]
    output: Option<PathBuf>,

    /// Print an ASCII map of the result
    #[arg(long)]
    ascii: bool,
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with_target(false)
        .init();

    let args = Args::parse();

    let mut config = match &args.config {
        Some(path) => TerrainConfig::load(path).with_context(|| format!("loading config {}", path.display()))?,
        None => TerrainConfig::default(),
    };
    if let Some(width) = args.width {
        config.grid.cols = width;
    }
    if let Some(height) = args.height {
        config.grid.rows = height;
    }
    if let Some(pois) = args.pois {
        config.pois.count = pois;
    }

    let seeds = match args.seed {
        Some(seed) => TerrainSeeds::from_master(seed),
        None => TerrainSeeds::default(),
    };
    tracing::info!("Seed: {}", seeds.master);

    let terrain = generate(&config, &seeds).context("terrain generation failed")?;
    print!("{}", terrain.report);

    if args.ascii {
        println!();
        print!("{}", terrain.render_ascii());
        println!("{}", ascii::legend());
    }

    if let Some(path) = &args.output {
        let file = std::fs::File::create(path).with_context(|| format!("creating {}", path.display()))?;
        serde_json::to_writer(std::io::BufWriter::new(file), &terrain.export())
            .with_context(|| format!("writing {}", path.display()))?;
        tracing::info!("Wrote {}", path.display());
    }

    Ok(())
}
