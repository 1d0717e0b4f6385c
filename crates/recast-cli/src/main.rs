//! Command line baking and path queries for tiled navmeshes

use anyhow::{bail, Context, Result};
use clap::{Args, Parser, Subcommand};
use glam::Vec3;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use detour::QueryFilter;
use navmesh_generator::{BuildParameters, InputRecord, NavMeshGenerator, TileStrategy};
use recast::PartitionType;
use recast_common::TriMesh;

/// Bakes tiled navigation meshes from OBJ files and queries paths on them
#[derive(Parser, Debug)]
#[clap(author, version, about, long_about = None)]
struct Cli {
    #[clap(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Build a navmesh from an OBJ mesh and save it
    Bake {
        /// Input mesh file (OBJ format)
        #[clap(long, value_parser)]
        input: PathBuf,

        /// Output navmesh file
        #[clap(long, value_parser)]
        output: PathBuf,

        /// Build through a tile cache so the saved navmesh supports obstacles
        #[clap(long)]
        cached: bool,

        #[clap(flatten)]
        tuning: Tuning,
    },

    /// Find a path on a saved navmesh
    FindPath {
        /// Navmesh file written by `bake`
        #[clap(long, value_parser)]
        mesh: PathBuf,

        /// Start position (x,y,z)
        #[clap(long, value_parser = parse_vector)]
        start: Vec3,

        /// End position (x,y,z)
        #[clap(long, value_parser = parse_vector)]
        end: Vec3,

        /// Half size of the box searched for the nearest polygon (x,y,z)
        #[clap(long, value_parser = parse_vector, default_value = "2,4,2")]
        extents: Vec3,

        #[clap(flatten)]
        tuning: Tuning,
    },
}

/// Build settings. `find-path` uses them to polygonize cached navmeshes.
#[derive(Args, Debug)]
struct Tuning {
    /// Cell size (horizontal resolution)
    #[clap(long, default_value = "0.3")]
    cell_size: f32,

    /// Cell height (vertical resolution)
    #[clap(long, default_value = "0.2")]
    cell_height: f32,

    /// Height of the agent
    #[clap(long, default_value = "2.0")]
    agent_height: f32,

    /// Radius of the agent
    #[clap(long, default_value = "0.6")]
    agent_radius: f32,

    /// Highest ledge the agent can step up
    #[clap(long, default_value = "0.9")]
    agent_max_climb: f32,

    /// Steepest walkable slope in degrees
    #[clap(long, default_value = "45.0")]
    agent_max_slope: f32,

    /// Tile width in cells
    #[clap(long, default_value = "64")]
    tile_size: i32,

    /// Use monotone instead of watershed region partitioning
    #[clap(long)]
    monotone: bool,
}

impl Tuning {
    fn to_params(&self) -> BuildParameters {
        let partition = if self.monotone {
            PartitionType::Monotone
        } else {
            PartitionType::Watershed
        };
        BuildParameters::default()
            .with_cell_size(self.cell_size, self.cell_height)
            .with_agent(self.agent_height, self.agent_radius, self.agent_max_climb)
            .with_max_slope(self.agent_max_slope)
            .with_tile_size(self.tile_size)
            .with_partition_type(partition)
    }
}

/// Parse a comma-separated vector
fn parse_vector(s: &str) -> Result<Vec3, String> {
    let parts: Vec<&str> = s.split(',').collect();
    if parts.len() != 3 {
        return Err(format!("Vector must have 3 components, got {}", parts.len()));
    }

    let mut v = [0.0; 3];
    for (dst, part) in v.iter_mut().zip(&parts) {
        *dst = part.trim().parse::<f32>().map_err(|e| e.to_string())?;
    }
    Ok(Vec3::from_array(v))
}

fn main() -> Result<()> {
    env_logger::init();
    let cli = Cli::parse();

    match cli.command {
        Commands::Bake {
            input,
            output,
            cached,
            tuning,
        } => bake(&input, &output, cached, &tuning),
        Commands::FindPath {
            mesh,
            start,
            end,
            extents,
            tuning,
        } => find_path(&mesh, start, end, extents, &tuning),
    }
}

fn bake(input: &Path, output: &Path, cached: bool, tuning: &Tuning) -> Result<()> {
    println!("Loading mesh from {}...", input.display());
    let mesh = TriMesh::from_obj(input).with_context(|| format!("Failed to load mesh {}", input.display()))?;
    let (bmin, bmax) = mesh.calculate_bounds();
    println!(
        "Mesh loaded: {} vertices, {} triangles, bounds {:?} to {:?}",
        mesh.vert_count, mesh.tri_count, bmin, bmax
    );

    let strategy = if cached {
        TileStrategy::Cached
    } else {
        TileStrategy::Direct
    };
    let mut generator =
        NavMeshGenerator::new(tuning.to_params(), strategy).context("Invalid build settings")?;
    generator.add_geometry([InputRecord::new(Arc::new(mesh), glam::Affine3A::IDENTITY, 0)]);

    let built = generator.build().context("Failed to build navmesh")?;
    let (tiles_x, tiles_z) = generator.tile_counts().unwrap_or((0, 0));
    let tile_count = generator.nav_mesh().map_or(0, |n| n.tile_count());
    println!(
        "Built {} of {} tiles ({} with polygons)",
        built,
        tiles_x * tiles_z,
        tile_count
    );
    if tile_count == 0 {
        bail!("No walkable surface found in {}", input.display());
    }

    generator
        .save_to_file(output)
        .with_context(|| format!("Failed to save navmesh to {}", output.display()))?;
    println!("Saved navmesh to {}", output.display());
    Ok(())
}

fn find_path(mesh: &Path, start: Vec3, end: Vec3, extents: Vec3, tuning: &Tuning) -> Result<()> {
    println!("Loading navmesh from {}...", mesh.display());
    let generator = NavMeshGenerator::load_from_file(tuning.to_params(), mesh)
        .with_context(|| format!("Failed to load navmesh {}", mesh.display()))?;

    println!("Finding path from {:?} to {:?}...", start, end);
    let path = generator
        .find_path(start, end, extents, &QueryFilter::default())
        .context("Path query failed")?;

    if path.is_empty() {
        println!("No path found");
        return Ok(());
    }
    println!("Path with {} points:", path.points.len());
    for (i, (point, flags)) in path.points.iter().zip(&path.flags).enumerate() {
        println!("{}: {},{},{} {:?}", i, point.x, point.y, point.z, flags);
    }
    Ok(())
}
