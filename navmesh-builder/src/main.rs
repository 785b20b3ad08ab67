use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Parser;
use glam::Vec3;
use serde::Serialize;
use tracing::{error, info};
use tracing_subscriber::{fmt, EnvFilter};

use navmesh_core::{NavMesh, NavMeshParams, NavMeshQuery, QueryFilter};

mod build_tile;
mod scene;

use build_tile::build_tile;
use scene::Scene;

#[derive(Parser, Debug)]
#[command(name = "navmesh-builder", version, about = "Build navmesh tiles from a JSON scene description and assemble them into a queryable mesh")]
struct Args {
    /// Path to the scene description (see `scene::Scene`)
    #[arg(long = "scene", value_name = "PATH")]
    scene: PathBuf,

    /// Probe the assembled mesh with `findNearestPoly` at this point, given as "x,y,z"
    #[arg(long = "query-center", value_name = "X,Y,Z")]
    query_center: Option<String>,

    /// Half-extents for the nearest-poly probe, given as "x,y,z"
    #[arg(long = "query-half-extents", value_name = "X,Y,Z", default_value = "1,1,1")]
    query_half_extents: String,

    /// Write a JSON build summary to this path
    #[arg(long = "out", value_name = "PATH")]
    out: Option<PathBuf>,
}

#[derive(Debug, Serialize)]
struct ProbeSummary {
    center: [f32; 3],
    half_extents: [f32; 3],
    succeeded: bool,
    position: Option<[f32; 3]>,
}

#[derive(Debug, Serialize)]
struct BuildSummary {
    tile_count: usize,
    poly_count: usize,
    failed_tiles: usize,
    probe: Option<ProbeSummary>,
}

fn parse_vec3(raw: &str) -> Result<Vec3> {
    let parts: Vec<&str> = raw.split(',').collect();
    anyhow::ensure!(parts.len() == 3, "expected \"x,y,z\", got {raw:?}");
    let mut v = [0f32; 3];
    for (i, p) in parts.iter().enumerate() {
        v[i] = p.trim().parse::<f32>().with_context(|| format!("invalid component {p:?} in {raw:?}"))?;
    }
    Ok(Vec3::from_array(v))
}

fn main() -> Result<()> {
    let env_filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new("info,navmesh_builder=debug"))
        .expect("failed to init EnvFilter");
    fmt().with_env_filter(env_filter).init();

    let args = Args::parse();
    info!(?args, "starting builder");

    let raw = std::fs::read_to_string(&args.scene).with_context(|| format!("failed to read scene file {:?}", args.scene))?;
    let scene: Scene = serde_json::from_str(&raw).with_context(|| format!("failed to parse scene file {:?}", args.scene))?;

    let params = NavMeshParams { origin: Vec3::from_array(scene.origin), tile_width: scene.tile_width, tile_height: scene.tile_height };
    let mut nm = NavMesh::new(params);

    let mut poly_count = 0usize;
    let mut failed_tiles = 0usize;
    for tile_scene in scene.tiles {
        let (x, y, layer) = (tile_scene.tile_x, tile_scene.tile_y, tile_scene.tile_layer);
        let build_params = tile_scene.into_build_params();
        match build_tile(build_params) {
            Ok(tile) => {
                poly_count += tile.polys.len();
                if let Err(err) = nm.add_tile(tile) {
                    failed_tiles += 1;
                    error!(x, y, layer, %err, "tile rejected by navmesh");
                }
            }
            Err(err) => {
                failed_tiles += 1;
                error!(x, y, layer, %err, "tile build failed");
            }
        }
    }

    info!(tile_count = nm.tiles().count(), poly_count, failed_tiles, "mesh assembled");

    let probe = match &args.query_center {
        Some(raw) => {
            let center = parse_vec3(raw).context("invalid --query-center")?;
            let half_extents = parse_vec3(&args.query_half_extents).context("invalid --query-half-extents")?;
            let result = NavMeshQuery::new(&nm).find_nearest_poly(center, half_extents, &QueryFilter::default());
            info!(succeeded = result.status.succeeded(), position = ?result.position, "nearest-poly probe");
            Some(ProbeSummary {
                center: center.to_array(),
                half_extents: half_extents.to_array(),
                succeeded: result.status.succeeded(),
                position: result.position.map(|p| p.to_array()),
            })
        }
        None => None,
    };

    if let Some(out) = &args.out {
        let summary = BuildSummary { tile_count: nm.tiles().count(), poly_count, failed_tiles, probe };
        let json = serde_json::to_string_pretty(&summary)?;
        std::fs::write(out, json).with_context(|| format!("failed to write summary to {:?}", out))?;
        info!(path = ?out, "wrote build summary");
    }

    if failed_tiles > 0 {
        anyhow::bail!("{failed_tiles} tile(s) failed to build or attach to the mesh");
    }

    Ok(())
}
