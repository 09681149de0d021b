//! # Grid File Information
//!
//! Summarises a gridded NetCDF product before it is sampled: dimensions,
//! variables and, when the coordinate variables are found, the grid extent
//! and the number of cells with valid coordinates.

use crate::extract::{GridSource, load_coordinate_set};
use anyhow::{Context, Result};
use log::debug;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::Path;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DimensionInfo {
    pub name: String,
    pub length: usize,
    pub is_unlimited: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VariableInfo {
    pub name: String,
    pub dimensions: Vec<String>,
    pub shape: Vec<usize>,
    pub attributes: BTreeMap<String, String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GridExtent {
    pub min_lon: f64,
    pub min_lat: f64,
    pub max_lon: f64,
    pub max_lat: f64,
    pub cells: usize,
    pub valid_cells: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GridInfo {
    pub path: String,
    pub dimensions: Vec<DimensionInfo>,
    pub variables: Vec<VariableInfo>,
    pub extent: Option<GridExtent>,
}

/// Inspects `path`, using `lon_var`/`lat_var` to compute the grid extent.
pub fn get_grid_info(path: &Path, lon_var: &str, lat_var: &str) -> Result<GridInfo> {
    debug!("Opening NetCDF file: {}", path.display());
    let file = netcdf::open(path)
        .with_context(|| format!("Failed to open NetCDF file: {}", path.display()))?;

    let dimensions = file
        .dimensions()
        .map(|dim| DimensionInfo {
            name: dim.name().to_string(),
            length: dim.len(),
            is_unlimited: dim.is_unlimited(),
        })
        .collect();

    let variables = file
        .variables()
        .map(|var| VariableInfo {
            name: var.name().to_string(),
            dimensions: var.dimensions().iter().map(|d| d.name().to_string()).collect(),
            shape: var.dimensions().iter().map(|d| d.len()).collect(),
            attributes: var
                .attributes()
                .filter_map(|attr| {
                    let value = attr.value().ok()?;
                    Some((attr.name().to_string(), format!("{:?}", value)))
                })
                .collect(),
        })
        .collect();

    let source = GridSource::new(path, "").with_coordinate_names(lon_var, lat_var);
    let extent = match load_coordinate_set(&file, &source) {
        Ok((coords, _, _)) => coords.bounds().map(|(min_lon, min_lat, max_lon, max_lat)| GridExtent {
            min_lon,
            min_lat,
            max_lon,
            max_lat,
            cells: coords.len(),
            valid_cells: coords.valid_count(),
        }),
        Err(e) => {
            debug!("No grid extent for {}: {}", path.display(), e);
            None
        }
    };

    Ok(GridInfo {
        path: path.display().to_string(),
        dimensions,
        variables,
        extent,
    })
}

pub fn print_grid_info_human(info: &GridInfo) {
    println!("Grid File Information:");
    println!("  Path: {}", info.path);
    println!("  Dimensions: {} total", info.dimensions.len());
    for dim in &info.dimensions {
        println!(
            "    {} ({}{})",
            dim.name,
            dim.length,
            if dim.is_unlimited { ", unlimited" } else { "" }
        );
    }
    println!("  Variables: {} total", info.variables.len());
    for var in &info.variables {
        println!("    {} - dimensions: [{}]", var.name, var.dimensions.join(", "));
        for (name, value) in &var.attributes {
            println!("      @{}: {}", name, value);
        }
    }
    match &info.extent {
        Some(extent) => {
            println!(
                "  Extent: lon [{}, {}], lat [{}, {}]",
                extent.min_lon, extent.max_lon, extent.min_lat, extent.max_lat
            );
            println!("  Cells: {} ({} with valid coordinates)", extent.cells, extent.valid_cells);
        }
        None => println!("  Extent: unavailable (coordinate variables not found)"),
    }
}

pub fn print_grid_info_csv(info: &GridInfo) {
    println!("variable_name,dimensions,shape,attributes_count");
    for var in &info.variables {
        let shape: Vec<String> = var.shape.iter().map(|s| s.to_string()).collect();
        println!(
            "{},\"{}\",\"{}\",{}",
            var.name,
            var.dimensions.join(";"),
            shape.join(";"),
            var.attributes.len()
        );
    }
}
