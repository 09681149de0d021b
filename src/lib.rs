//! # snowclim
//!
//! Day-of-water-year snow climatologies for station networks such as
//! SNOTEL, and nearest-grid-cell sampling of gridded snow products for
//! comparison against those stations.
//!
//! ## Modules
//!
//! - [`water_year`]: calendar date to day-of-water-year (DOWY) conversion
//! - [`grid`]: nearest valid grid cell to a query point
//! - [`climatology`]: per-DOWY statistics across years of record
//! - [`region`]: bounding box and polygon station selection
//! - [`extract`]: NetCDF grid loading and point time series extraction
//! - [`compare`]: gridded vs. observed error summaries
//! - [`input`]: JSON/YAML job configuration
//! - [`output`]: parquet writing and terminal rendering
//!
//! ## Example
//!
//! ```rust
//! use chrono::NaiveDate;
//! use snowclim::grid::{CoordinateSet, GridCoord, nearest};
//! use snowclim::water_year::dowy;
//!
//! assert_eq!(dowy(NaiveDate::from_ymd_opt(2020, 10, 1).unwrap()), 1);
//!
//! let set = CoordinateSet::from_pairs(&[(-105.0, 40.0), (-106.0, 41.0)]);
//! let hit = nearest(&set, GridCoord::new(-105.1, 40.1)).unwrap();
//! assert_eq!(hit, GridCoord::new(-105.0, 40.0));
//! ```

pub mod cli;
pub mod climatology;
pub mod compare;
pub mod extract;
pub mod grid;
pub mod info;
pub mod input;
pub mod log;
pub mod output;
pub mod region;
pub mod water_year;

#[cfg(test)]
mod cli_tests;

pub use climatology::{Climatology, ClimatologyError, ClimatologyOptions, DowyStats, Observation};
pub use compare::{CompareError, ComparisonSummary, LengthUnit, compare_series};
pub use extract::{ExtractError, GridDataset, GridSource, PointSeries, extract_point_series};
pub use grid::{CoordinateSet, GridCell, GridCoord, LocateError, NearestCell, nearest, nearest_cell};
pub use water_year::{WaterYearConvention, WaterYearWindow, dowy, dowy_batch, water_year};

use crate::climatology::{load_observations, season_to_dataframe};
use crate::input::JobConfig;
use crate::output::write_dataframe_to_parquet;
use crate::region::{Station, load_stations, select_stations};
use ::log::{info, warn};
use anyhow::{Context, anyhow};
use chrono::NaiveDate;
use indicatif::{ProgressBar, ProgressStyle};
use polars::prelude::*;
use serde::Serialize;

/// What a job produced.
#[derive(Debug, Clone, Default, Serialize)]
pub struct JobReport {
    pub water_year: Option<i32>,
    pub reference_date: Option<NaiveDate>,
    pub climatology_days: usize,
    pub season_days: usize,
    pub selected_stations: Vec<String>,
    pub series_extracted: usize,
    pub comparison: Option<ComparisonSummary>,
}

impl JobReport {
    /// One-row table of the report; comparison columns are null when no
    /// comparison ran and stations are joined with `;`.
    pub fn to_dataframe(&self) -> PolarsResult<DataFrame> {
        let summary = self.comparison.as_ref();
        df! {
            "water_year" => [self.water_year],
            "reference_date" => [self.reference_date.map(|d| d.to_string())],
            "climatology_days" => [self.climatology_days as u64],
            "season_days" => [self.season_days as u64],
            "selected_stations" => [self.selected_stations.join(";")],
            "series_extracted" => [self.series_extracted as u64],
            "comparison_n" => [summary.map(|s| s.n as u64)],
            "bias" => [summary.map(|s| s.bias)],
            "mae" => [summary.map(|s| s.mae)],
            "rmse" => [summary.map(|s| s.rmse)],
        }
    }
}

/// Runs a configured job end to end.
///
/// 1. Loads observations and builds the DOWY climatology and current season
/// 2. Loads stations and keeps those inside the configured region
/// 3. Samples the grid at the configured point and at every selected station
/// 4. Compares the point series against the observations
///
/// Each step runs only when its inputs are configured; requested outputs are
/// written as parquet.
///
/// # Errors
///
/// Fails when the configuration is inconsistent or any input cannot be read.
pub fn process_job(config: &JobConfig) -> anyhow::Result<JobReport> {
    config.validate().map_err(|e| anyhow!("Invalid configuration: {}", e))?;
    let mut report = JobReport::default();

    let observations: Option<Vec<Observation>> = match &config.observations {
        Some(source) => Some(
            load_observations(&source.path, source.nodata)
                .with_context(|| format!("Failed to load observations from {}", source.path.display()))?,
        ),
        None => None,
    };

    if let Some(obs) = &observations {
        let reference = config
            .water_year
            .reference_date
            .or_else(|| obs.iter().filter(|o| o.value.is_some()).map(|o| o.date).max())
            .ok_or_else(|| anyhow!("No reference date configured and no observations with data"))?;
        let current = water_year(reference);
        info!("Reference date {} (water year {})", reference, current);

        let options = ClimatologyOptions {
            convention: config.water_year.convention,
            exclude_water_year: config.water_year.exclude_current.then_some(current),
            min_count: config.water_year.min_count,
        };
        let climo = Climatology::from_observations(obs, &options).context("Failed to build climatology")?;
        let season = climo.current_season(obs, reference);

        report.water_year = Some(current);
        report.reference_date = Some(reference);
        report.climatology_days = climo.len();
        report.season_days = season.len();

        if let Some(path) = &config.output.climatology {
            write_dataframe_to_parquet(&climo.to_dataframe()?, path)?;
        }
        if let Some(path) = &config.output.season {
            write_dataframe_to_parquet(&season_to_dataframe(&season)?, path)?;
        }
    }

    let stations: Vec<Station> = match &config.stations {
        Some(path) => {
            let all = load_stations(path)
                .map_err(|e| anyhow!("Failed to load stations from {}: {}", path.display(), e))?;
            match &config.region {
                Some(region) => {
                    let filter = region.to_filter().map_err(|e| anyhow!(e))?;
                    select_stations(&all, filter.as_ref()).into_iter().cloned().collect()
                }
                None => all,
            }
        }
        None => Vec::new(),
    };
    report.selected_stations = stations.iter().map(|s| s.id.clone()).collect();

    if let Some(grid) = &config.grid {
        let dataset = GridDataset::open(&grid.source)
            .with_context(|| format!("Failed to open grid {}", grid.source.path.display()))?;
        let mut frames: Vec<DataFrame> = Vec::new();

        if let Some(point) = config.point {
            let series = dataset.series_at(point)?;
            frames.push(series.to_site_dataframe("point")?);

            if let Some(obs) = &observations {
                let comparison = compare_series(&series, obs, config.comparison_scale())?;
                info!(
                    "Compared {} days: bias {:.3}, rmse {:.3}",
                    comparison.summary.n, comparison.summary.bias, comparison.summary.rmse
                );
                if let Some(path) = &config.output.comparison {
                    write_dataframe_to_parquet(&comparison.to_dataframe()?, path)?;
                }
                report.comparison = Some(comparison.summary);
            }
        }

        if !stations.is_empty() {
            let pb = if ::log::log_enabled!(::log::Level::Info) {
                ProgressBar::new(stations.len() as u64)
            } else {
                ProgressBar::hidden()
            };
            pb.set_style(ProgressStyle::default_bar());
            for station in &stations {
                match dataset.series_at(GridCoord::new(station.lon, station.lat)) {
                    Ok(series) => frames.push(series.to_site_dataframe(&station.id)?),
                    Err(e) => warn!("Skipping station {}: {}", station.id, e),
                }
                pb.inc(1);
            }
            pb.finish_with_message("Extraction complete");
        }

        report.series_extracted = frames.len();
        if let Some(path) = &config.output.series
            && let Some((first, rest)) = frames.split_first()
        {
            let mut stacked = first.clone();
            for df in rest {
                stacked.vstack_mut(df)?;
            }
            write_dataframe_to_parquet(&stacked, path)?;
        }
    }

    Ok(report)
}
