use std::path::PathBuf;
use std::time::Instant;

use anyhow::{Context as _, Result};
use clap::{Parser, Subcommand};
use env_logger::Env;
use log::info;

use hexroot::{Octree, Settings, Surface};

/// Octree-based all-hexahedral mesh generator
#[derive(Parser)]
#[clap(author, version, about, long_about = None)]
struct Args {
    #[clap(subcommand)]
    cmd: Command,

    /// Input `.stl` file
    #[clap(short, long)]
    input: PathBuf,
}

#[derive(Subcommand)]
enum Command {
    /// Runs the full pipeline and writes a VTK mesh
    Mesh {
        #[clap(flatten)]
        settings: MeshSettings,

        /// Name of a `.vtk` file to write
        #[clap(short, long)]
        out: Option<PathBuf>,

        /// Skip boundary projection
        #[clap(long)]
        no_project: bool,
    },

    /// Builds and balances the octree, writing a snapshot
    Octree {
        #[clap(flatten)]
        settings: MeshSettings,

        /// Name of a snapshot file to write
        #[clap(short, long)]
        out: Option<PathBuf>,
    },
}

#[derive(Parser)]
struct MeshSettings {
    /// Octree depth
    #[clap(short, long, default_value_t = 4)]
    depth: u8,

    /// Bounding-cube margin, as a fraction of the largest extent
    #[clap(long, default_value_t = 0.2)]
    margin: f64,

    /// Scaled-Jacobian threshold for quality reporting
    #[clap(short, long, default_value_t = 0.2)]
    quality_threshold: f64,
}

impl MeshSettings {
    fn to_settings(&self) -> Settings {
        Settings {
            depth: self.depth,
            margin_ratio: self.margin,
            quality_threshold: self.quality_threshold,
            ..Settings::default()
        }
    }
}

fn load_surface(path: &PathBuf, margin_ratio: f64) -> Result<Surface> {
    let mut file = std::fs::File::open(path)
        .with_context(|| format!("failed to open {path:?}"))?;
    let (vertices, triangles) = hexroot::io::stl::read_stl(&mut file)?;
    info!(
        "Read {} vertices, {} triangles",
        vertices.len(),
        triangles.len()
    );
    Ok(Surface::new(vertices, triangles, margin_ratio)?)
}

fn build_octree(surface: &Surface, settings: &Settings) -> Result<Octree> {
    let start = Instant::now();
    let mut octree = Octree::build(surface, settings)?;
    info!(
        "Built octree in {:?} ({} leaves)",
        start.elapsed(),
        octree.leaves().len()
    );

    let start = Instant::now();
    octree.balance(surface, settings)?;
    info!(
        "Balanced octree in {:?} ({} leaves)",
        start.elapsed(),
        octree.leaves().len()
    );
    Ok(octree)
}

fn main() -> Result<()> {
    env_logger::Builder::from_env(Env::default().default_filter_or("info"))
        .init();

    let args = Args::parse();
    match args.cmd {
        Command::Mesh {
            settings,
            out,
            no_project,
        } => {
            let settings = settings.to_settings();
            let now = Instant::now();
            let surface = load_surface(&args.input, settings.margin_ratio)?;
            info!("Loaded file in {:?}", now.elapsed());
            let octree = build_octree(&surface, &settings)?;

            let start = Instant::now();
            let mut mesh = hexroot::dual::extract_dual_hex(&octree, &surface);
            hexroot::quality::remove_outside(&mut mesh);
            info!(
                "Extracted {} hexahedra in {:?}",
                mesh.elems.len(),
                start.elapsed()
            );

            if !no_project {
                let start = Instant::now();
                hexroot::project::project_boundary(&mut mesh, &surface, &octree);
                info!("Projected boundary in {:?}", start.elapsed());
            }

            let flags = hexroot::quality::flag_poor_quality(
                &mesh,
                settings.quality_threshold,
            );
            let bad = flags.iter().filter(|f| f.is_some()).count();
            info!(
                "{bad} elements at or below scaled Jacobian {}",
                settings.quality_threshold
            );

            if let Some(out) = out {
                info!("Writing VTK to {out:?}");
                let quality: Vec<f64> = (0..mesh.elems.len())
                    .map(|e| {
                        hexroot::geometry::scaled_jacobian(
                            &mesh.element_corners(e),
                        )
                    })
                    .collect();
                hexroot::io::vtk::write_vtk(
                    &mesh,
                    Some(&quality),
                    &mut std::fs::File::create(out)?,
                )?;
            }
        }
        Command::Octree { settings, out } => {
            let settings = settings.to_settings();
            let now = Instant::now();
            let surface = load_surface(&args.input, settings.margin_ratio)?;
            info!("Loaded file in {:?}", now.elapsed());
            let octree = build_octree(&surface, &settings)?;

            if let Some(out) = out {
                info!("Writing snapshot to {out:?}");
                hexroot::io::octree::write_octree(
                    &octree,
                    &mut std::fs::File::create(out)?,
                )?;
            }
        }
    }
    Ok(())
}
