//! # Job Configuration
//!
//! Parsing and validation of snowclim job files. A job file describes one
//! analysis run: where the station observations live, which water year
//! convention to use, an optional region and station list, an optional
//! gridded product to sample, and where to write the results.
//!
//! Files may be JSON or YAML; the format is chosen by extension.
//!
//! ## Example
//!
//! ```rust
//! use snowclim::input::JobConfig;
//!
//! let json = r#"
//! {
//!   "water_year": { "convention": "calendar", "reference_date": "2023-03-15" },
//!   "observations": { "path": "station_swe.parquet", "nodata": -99.9 },
//!   "output": { "climatology": "climatology.parquet" }
//! }"#;
//! let config = JobConfig::from_json(json)?;
//! assert!(config.observations.is_some());
//! # Ok::<(), Box<dyn std::error::Error>>(())
//! ```

use crate::compare::LengthUnit;
use crate::extract::GridSource;
use crate::grid::GridCoord;
use crate::region::RegionConfig;
use crate::water_year::WaterYearConvention;
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

/// Complete description of a snowclim run.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct JobConfig {
    #[serde(default)]
    pub water_year: WaterYearSection,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub observations: Option<ObservationSource>,

    /// JSON or YAML list of station metadata.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub stations: Option<PathBuf>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub region: Option<RegionConfig>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub grid: Option<GridSection>,

    /// Single point to sample the grid at, usually the station location.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub point: Option<GridCoord>,

    #[serde(default)]
    pub output: OutputSection,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct WaterYearSection {
    #[serde(default)]
    pub convention: WaterYearConvention,

    /// Date treated as "today". Defaults to the last observation date.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reference_date: Option<NaiveDate>,

    /// Leave the reference date's water year out of the climatology.
    #[serde(default)]
    pub exclude_current: bool,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub min_count: Option<u32>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ObservationSource {
    pub path: PathBuf,

    /// Sentinel the station network uses for missing readings.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub nodata: Option<f64>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub units: Option<LengthUnit>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GridSection {
    #[serde(flatten)]
    pub source: GridSource,

    /// Unit of the gridded variable, used to derive the comparison scale.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub units: Option<LengthUnit>,

    /// Explicit multiplier applied to grid values; wins over `units`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub scale: Option<f64>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct OutputSection {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub climatology: Option<PathBuf>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub season: Option<PathBuf>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub series: Option<PathBuf>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub comparison: Option<PathBuf>,
}

impl JobConfig {
    /// Loads a job configuration from a JSON or YAML file.
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self, Box<dyn std::error::Error>> {
        let path = path.as_ref();
        let content = fs::read_to_string(path)?;
        match path.extension().and_then(|e| e.to_str()) {
            Some("yaml") | Some("yml") => Self::from_yaml(&content),
            _ => Self::from_json(&content),
        }
    }

    pub fn from_json(json_str: &str) -> Result<Self, Box<dyn std::error::Error>> {
        let config: JobConfig = serde_json::from_str(json_str)?;
        Ok(config)
    }

    pub fn from_yaml(yaml_str: &str) -> Result<Self, Box<dyn std::error::Error>> {
        let config: JobConfig = serde_yaml::from_str(yaml_str)?;
        Ok(config)
    }

    /// Multiplier that brings grid values into the observation unit.
    pub fn comparison_scale(&self) -> f64 {
        let Some(grid) = &self.grid else {
            return 1.0;
        };
        if let Some(scale) = grid.scale {
            return scale;
        }
        let target = self.observations.as_ref().and_then(|o| o.units);
        match (grid.units, target) {
            (Some(from), Some(to)) => from.factor_to(to),
            _ => 1.0,
        }
    }

    /// Every consistency problem found in the configuration.
    pub fn problems(&self) -> Vec<String> {
        let mut problems = Vec::new();

        if self.observations.is_none() && self.grid.is_none() && self.stations.is_none() {
            problems.push("Nothing to do: configure observations, stations or grid".to_string());
        }
        if self.region.is_some() && self.stations.is_none() {
            problems.push("A region was given without a station list".to_string());
        }
        if let Some(region) = &self.region
            && let Err(e) = region.to_filter()
        {
            problems.push(format!("Invalid {} region: {}", region.kind(), e));
        }
        if self.grid.is_some() && self.point.is_none() && self.stations.is_none() {
            problems.push("A grid was given without a point or station list to sample".to_string());
        }
        if let Some(point) = &self.point
            && !point.is_valid()
        {
            problems.push(format!("Point ({}, {}) is not a valid coordinate", point.lon, point.lat));
        }
        if let Some(scale) = self.grid.as_ref().and_then(|g| g.scale)
            && (!scale.is_finite() || scale == 0.0)
        {
            problems.push(format!("Grid scale must be finite and non-zero, got {}", scale));
        }
        if self.observations.is_none()
            && (self.output.climatology.is_some() || self.output.season.is_some())
        {
            problems.push("Climatology outputs requested without observations".to_string());
        }
        if self.output.comparison.is_some()
            && (self.observations.is_none() || self.grid.is_none() || self.point.is_none())
        {
            problems.push("Comparison output needs observations, grid and point".to_string());
        }

        problems
    }

    pub fn validate(&self) -> Result<(), Box<dyn std::error::Error>> {
        match self.problems().into_iter().next() {
            Some(problem) => Err(problem.into()),
            None => Ok(()),
        }
    }
}
