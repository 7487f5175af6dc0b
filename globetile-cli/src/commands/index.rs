//! Spatial index commands: `locate` and `query`.

use globetile::config::GlobeConfig;
use globetile::geo::GeoBound;
use globetile::tiling::healpix::{lonlat2pix, ORDER_MAX};
use globetile::tiling::{SpatialIndex, TileAddress, Tiling};
use globetile::GlobeError;

use crate::error::CliError;

fn build_tiling(config: &GlobeConfig) -> Result<Tiling, CliError> {
    config.tiling.build().map_err(|e| CliError::Globe(GlobeError::from(e)))
}

fn check_point(lon: f64, lat: f64) -> Result<(), CliError> {
    if !(-180.0..=180.0).contains(&lon) || !(-90.0..=90.0).contains(&lat) {
        return Err(CliError::Config(format!(
            "({}, {}) is not a valid longitude/latitude pair",
            lon, lat
        )));
    }
    Ok(())
}

/// Level-zero index and address of the tile containing a point.
pub fn locate(config: &GlobeConfig, lon: f64, lat: f64) -> Result<(usize, TileAddress), CliError> {
    check_point(lon, lat)?;
    let tiling = build_tiling(config)?;
    let index = tiling.locate(lon, lat);
    let address = tiling
        .level_zero()
        .get(index)
        .copied()
        .ok_or_else(|| CliError::Config(format!("({}, {}) is outside the tiling", lon, lat)))?;
    Ok((index, address))
}

/// Level-zero tiles a bounding box may overlap.
pub fn query(
    config: &GlobeConfig,
    west: f64,
    south: f64,
    east: f64,
    north: f64,
) -> Result<Vec<(usize, TileAddress)>, CliError> {
    check_point(west, south)?;
    check_point(east, north)?;
    if south > north {
        return Err(CliError::Config(format!(
            "south ({}) must not exceed north ({})",
            south, north
        )));
    }
    let tiling = build_tiling(config)?;
    let level_zero = tiling.level_zero();
    let bbox = GeoBound::new(west, south, east, north);
    Ok(tiling
        .overlapped(&bbox)
        .into_iter()
        .filter_map(|index| level_zero.get(index).map(|address| (index, *address)))
        .collect())
}

/// Run the locate command.
pub fn run_locate(
    config: &GlobeConfig,
    lon: f64,
    lat: f64,
    order: Option<u32>,
) -> Result<(), CliError> {
    let (index, address) = locate(config, lon, lat)?;
    println!("Tiling:            {}", config.tiling.kind());
    println!("Level-zero index:  {}", index);
    println!("Tile:              {}", address);

    if let Some(order) = order {
        if order > ORDER_MAX {
            return Err(CliError::Config(format!(
                "order {} exceeds the maximum of {}",
                order, ORDER_MAX
            )));
        }
        println!("Nested pixel:      {} (order {})", lonlat2pix(order, lon, lat), order);
    }
    Ok(())
}

/// Run the query command.
pub fn run_query(
    config: &GlobeConfig,
    west: f64,
    south: f64,
    east: f64,
    north: f64,
) -> Result<(), CliError> {
    let tiles = query(config, west, south, east, north)?;
    println!(
        "{} level-zero tiles may overlap [{}, {}, {}, {}]",
        tiles.len(),
        west,
        south,
        east,
        north
    );
    for (index, address) in tiles {
        println!("  {:>6}  {}", index, address);
    }
    Ok(())
}
