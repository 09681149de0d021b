//! # Grid Point Extraction
//!
//! Opens a gridded NetCDF product, turns its longitude/latitude variables
//! into a [`CoordinateSet`], and samples the data variable at the grid cell
//! nearest to a station.
//!
//! ## Key Components
//!
//! - [`GridSource`]: which file and variable names to read
//! - [`GridDataset`]: coordinates, decoded dates and values held in memory
//! - [`extract_point_series`]: one-shot nearest-cell time series extraction

use crate::grid::{CoordinateSet, GridCoord, LocateError, NearestCell, nearest_cell, normalize_longitude};
use chrono::{NaiveDate, NaiveDateTime, TimeDelta};
use log::{debug, info, warn};
use netcdf::AttributeValue;
use polars::prelude::*;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ExtractError {
    #[error("NetCDF error: {0}")]
    Netcdf(#[from] netcdf::Error),

    #[error(transparent)]
    Locate(#[from] LocateError),

    #[error("Polars error: {0}")]
    Polars(#[from] PolarsError),

    #[error("variable '{0}' not found in grid file")]
    MissingVariable(String),

    #[error("variable '{variable}' has unsupported dimension '{dimension}'")]
    UnsupportedDimension { variable: String, dimension: String },

    #[error("longitude and latitude variables have incompatible shapes")]
    CoordinateShape,

    #[error("invalid time units '{0}'")]
    InvalidTimeUnits(String),
}

pub type ExtractResult<T> = Result<T, ExtractError>;

fn default_lon_var() -> String {
    "lon".to_string()
}

fn default_lat_var() -> String {
    "lat".to_string()
}

fn default_time_var() -> String {
    "time".to_string()
}

/// Location and variable names of a gridded product.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GridSource {
    pub path: PathBuf,
    pub variable: String,
    #[serde(default = "default_lon_var")]
    pub lon_var: String,
    #[serde(default = "default_lat_var")]
    pub lat_var: String,
    #[serde(default = "default_time_var")]
    pub time_var: String,
}

impl GridSource {
    pub fn new<P: Into<PathBuf>>(path: P, variable: &str) -> Self {
        GridSource {
            path: path.into(),
            variable: variable.to_string(),
            lon_var: default_lon_var(),
            lat_var: default_lat_var(),
            time_var: default_time_var(),
        }
    }

    pub fn with_coordinate_names(mut self, lon_var: &str, lat_var: &str) -> Self {
        self.lon_var = lon_var.to_string();
        self.lat_var = lat_var.to_string();
        self
    }

    pub fn with_time_var(mut self, time_var: &str) -> Self {
        self.time_var = time_var.to_string();
        self
    }
}

/// Time step unit of a CF `"<unit> since <date>"` string.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TimeUnit {
    Seconds,
    Minutes,
    Hours,
    Days,
}

impl TimeUnit {
    pub fn to_seconds_multiplier(&self) -> f64 {
        match self {
            TimeUnit::Seconds => 1.0,
            TimeUnit::Minutes => 60.0,
            TimeUnit::Hours => 3600.0,
            TimeUnit::Days => 86400.0,
        }
    }
}

/// Parses CF time units such as `days since 2000-01-01` or
/// `hours since 1979-01-01 00:00:00`.
pub fn parse_cf_time_units(units: &str) -> ExtractResult<(TimeUnit, NaiveDateTime)> {
    let invalid = || ExtractError::InvalidTimeUnits(units.to_string());
    let parts: Vec<&str> = units.trim().splitn(3, ' ').collect();
    if parts.len() < 3 || parts[1] != "since" {
        return Err(invalid());
    }

    let unit = match parts[0].to_lowercase().as_str() {
        "second" | "seconds" | "s" => TimeUnit::Seconds,
        "minute" | "minutes" | "min" => TimeUnit::Minutes,
        "hour" | "hours" | "h" => TimeUnit::Hours,
        "day" | "days" | "d" => TimeUnit::Days,
        _ => return Err(invalid()),
    };

    let stamp = parts[2].trim().replace('T', " ");
    let stamp = stamp.trim_end_matches('Z').trim();
    let base = NaiveDateTime::parse_from_str(stamp, "%Y-%m-%d %H:%M:%S")
        .or_else(|_| NaiveDateTime::parse_from_str(stamp, "%Y-%m-%d %H:%M"))
        .or_else(|_| {
            NaiveDate::parse_from_str(stamp.get(..10).unwrap_or(stamp), "%Y-%m-%d")
                .map(|d| d.and_hms_opt(0, 0, 0).unwrap_or_default())
        })
        .map_err(|_| invalid())?;

    Ok((unit, base))
}

/// Decodes numeric CF time offsets into calendar dates.
pub fn decode_times(offsets: &[f64], unit: TimeUnit, base: NaiveDateTime) -> ExtractResult<Vec<NaiveDate>> {
    offsets
        .iter()
        .map(|&offset| {
            let seconds = (offset * unit.to_seconds_multiplier()).round() as i64;
            TimeDelta::try_seconds(seconds)
                .and_then(|delta| base.checked_add_signed(delta))
                .map(|dt| dt.date())
                .ok_or_else(|| ExtractError::InvalidTimeUnits(format!("offset {} out of range", offset)))
        })
        .collect()
}

/// Time series sampled at one grid cell.
#[derive(Debug, Clone, Serialize)]
pub struct PointSeries {
    pub variable: String,
    pub query: GridCoord,
    pub cell: NearestCell,
    pub dates: Vec<NaiveDate>,
    pub values: Vec<Option<f64>>,
}

impl PointSeries {
    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    pub fn to_dataframe(&self) -> ExtractResult<DataFrame> {
        let df = df! {
            "date" => self.dates.iter().map(|d| d.to_string()).collect::<Vec<_>>(),
            self.variable.as_str() => self.values.clone(),
        }?;
        Ok(df)
    }

    /// Like [`PointSeries::to_dataframe`] with a leading `site` column and the
    /// sampled cell's coordinates, so several sites can be stacked.
    pub fn to_site_dataframe(&self, site: &str) -> ExtractResult<DataFrame> {
        let n = self.len();
        let df = df! {
            "site" => vec![site; n],
            "date" => self.dates.iter().map(|d| d.to_string()).collect::<Vec<_>>(),
            "cell_lon" => vec![self.cell.coord.lon; n],
            "cell_lat" => vec![self.cell.coord.lat; n],
            "value" => self.values.clone(),
        }?;
        Ok(df)
    }
}

/// Gridded variable loaded into memory with its coordinates and dates.
#[derive(Debug, Clone)]
pub struct GridDataset {
    variable: String,
    coords: CoordinateSet,
    row_dim: String,
    col_dim: String,
    time_dim: String,
    dims: Vec<(String, usize)>,
    /// Unpacked values, with fills already replaced by NaN.
    data: Vec<f64>,
    dates: Vec<NaiveDate>,
}

impl GridDataset {
    pub fn open(source: &GridSource) -> ExtractResult<Self> {
        info!("Opening grid {}", source.path.display());
        let file = netcdf::open(&source.path)?;

        let (coords, row_dim, col_dim) = load_coordinate_set(&file, source)?;
        debug!(
            "Coordinate set: {} cells, {} valid, spatial dims ({}, {})",
            coords.len(),
            coords.valid_count(),
            row_dim,
            col_dim
        );

        let time = file
            .variable(&source.time_var)
            .ok_or_else(|| ExtractError::MissingVariable(source.time_var.clone()))?;
        let time_dim = time
            .dimensions()
            .first()
            .map(|d| d.name().to_string())
            .ok_or_else(|| ExtractError::MissingVariable(source.time_var.clone()))?;
        let units = string_attribute(&time, "units")
            .ok_or_else(|| ExtractError::InvalidTimeUnits(format!("{} has no units", source.time_var)))?;
        let (unit, base) = parse_cf_time_units(&units)?;
        if let Some(calendar) = string_attribute(&time, "calendar")
            && !matches!(calendar.as_str(), "standard" | "gregorian" | "proleptic_gregorian")
        {
            warn!("Calendar '{}' decoded as proleptic Gregorian", calendar);
        }
        let dates = decode_times(&time.get_values::<f64, _>(..)?, unit, base)?;

        let var = file
            .variable(&source.variable)
            .ok_or_else(|| ExtractError::MissingVariable(source.variable.clone()))?;
        let dims: Vec<(String, usize)> = var
            .dimensions()
            .iter()
            .map(|d| (d.name().to_string(), d.len()))
            .collect();
        for (name, len) in &dims {
            let known = *name == row_dim || *name == col_dim || *name == time_dim;
            if !known && *len != 1 {
                return Err(ExtractError::UnsupportedDimension {
                    variable: source.variable.clone(),
                    dimension: name.clone(),
                });
            }
        }

        let fill_value = fill_attribute(&var);
        let scale = numeric_attribute(&var, "scale_factor").unwrap_or(1.0);
        let offset = numeric_attribute(&var, "add_offset").unwrap_or(0.0);

        // Fills are compared against packed values, before unpacking.
        let mut data = var.get_values::<f64, _>(..)?;
        for v in data.iter_mut() {
            *v = if fill_value == Some(*v) { f64::NAN } else { *v * scale + offset };
        }

        Ok(GridDataset {
            variable: source.variable.clone(),
            coords,
            row_dim,
            col_dim,
            time_dim,
            dims,
            data,
            dates,
        })
    }

    pub fn coordinates(&self) -> &CoordinateSet {
        &self.coords
    }

    pub fn dates(&self) -> &[NaiveDate] {
        &self.dates
    }

    /// Nearest valid cell; the query longitude is normalized like the grid's.
    pub fn locate(&self, query: GridCoord) -> ExtractResult<NearestCell> {
        let query = GridCoord::new(normalize_longitude(query.lon), query.lat);
        Ok(nearest_cell(&self.coords, query)?)
    }

    pub fn series_at(&self, query: GridCoord) -> ExtractResult<PointSeries> {
        let cell = self.locate(query)?;
        let (row, col) = self.coords.unravel(cell.index).ok_or(ExtractError::CoordinateShape)?;
        debug!(
            "Nearest cell to ({}, {}) is ({}, {}) at [{}, {}], distance {:.4}",
            query.lon, query.lat, cell.coord.lon, cell.coord.lat, row, col, cell.distance
        );

        let values = (0..self.dates.len())
            .map(|t| self.value(t, row, col))
            .collect();

        Ok(PointSeries {
            variable: self.variable.clone(),
            query,
            cell,
            dates: self.dates.clone(),
            values,
        })
    }

    /// Time mean of every cell over `[start, end]`, in coordinate-set order.
    /// Cells with no data in the window are `None`.
    pub fn mean_field(&self, start: NaiveDate, end: NaiveDate) -> Vec<Option<f64>> {
        let steps: Vec<usize> = self
            .dates
            .iter()
            .enumerate()
            .filter(|(_, d)| **d >= start && **d <= end)
            .map(|(t, _)| t)
            .collect();

        (0..self.coords.len())
            .map(|index| {
                let (row, col) = self.coords.unravel(index)?;
                let values: Vec<f64> = steps.iter().filter_map(|&t| self.value(t, row, col)).collect();
                if values.is_empty() {
                    None
                } else {
                    Some(values.iter().sum::<f64>() / values.len() as f64)
                }
            })
            .collect()
    }

    fn value(&self, t: usize, row: usize, col: usize) -> Option<f64> {
        let mut flat = 0;
        for (name, len) in &self.dims {
            let idx = if *name == self.time_dim {
                t
            } else if *name == self.row_dim {
                row
            } else if *name == self.col_dim {
                col
            } else {
                0
            };
            flat = flat * len + idx;
        }
        let v = *self.data.get(flat)?;
        if !v.is_finite() {
            None
        } else {
            Some(v)
        }
    }
}

/// Builds the coordinate set from 1-D axes or 2-D coordinate arrays.
///
/// Returns the set together with the names of its row and column dimensions.
pub fn load_coordinate_set(
    file: &netcdf::File,
    source: &GridSource,
) -> ExtractResult<(CoordinateSet, String, String)> {
    let lon_var = file
        .variable(&source.lon_var)
        .ok_or_else(|| ExtractError::MissingVariable(source.lon_var.clone()))?;
    let lat_var = file
        .variable(&source.lat_var)
        .ok_or_else(|| ExtractError::MissingVariable(source.lat_var.clone()))?;

    let lon_dims: Vec<String> = lon_var.dimensions().iter().map(|d| d.name().to_string()).collect();
    let lat_dims: Vec<String> = lat_var.dimensions().iter().map(|d| d.name().to_string()).collect();
    let lons = lon_var.get_values::<f64, _>(..)?;
    let lats = lat_var.get_values::<f64, _>(..)?;

    let (set, row_dim, col_dim) = match (lon_dims.as_slice(), lat_dims.as_slice()) {
        ([x], [y]) if x != y => (CoordinateSet::from_axes(&lons, &lats), y.clone(), x.clone()),
        ([y, x], [y2, x2]) if y == y2 && x == x2 => {
            let shape = (lat_var.dimensions()[0].len(), lat_var.dimensions()[1].len());
            (CoordinateSet::from_2d(&lons, &lats, shape)?, y.clone(), x.clone())
        }
        _ => return Err(ExtractError::CoordinateShape),
    };

    let mut set = set;
    for fill in [fill_attribute(&lon_var), fill_attribute(&lat_var)]
        .into_iter()
        .flatten()
    {
        set = set.with_fill_value(fill);
    }

    Ok((set.with_normalized_longitudes(), row_dim, col_dim))
}

/// Opens `source` and extracts the series at the cell nearest `query`.
pub fn extract_point_series(source: &GridSource, query: GridCoord) -> ExtractResult<PointSeries> {
    GridDataset::open(source)?.series_at(query)
}

/// `_FillValue`, or `missing_value` when the variable has no `_FillValue`.
fn fill_attribute(var: &netcdf::Variable) -> Option<f64> {
    numeric_attribute(var, "_FillValue").or_else(|| numeric_attribute(var, "missing_value"))
}

/// First element of a numeric attribute, widened to `f64`.
fn numeric_attribute(var: &netcdf::Variable, name: &str) -> Option<f64> {
    match var.attribute_value(name)?.ok()? {
        AttributeValue::Uchar(v) => Some(f64::from(v)),
        AttributeValue::Schar(v) => Some(f64::from(v)),
        AttributeValue::Ushort(v) => Some(f64::from(v)),
        AttributeValue::Short(v) => Some(f64::from(v)),
        AttributeValue::Uint(v) => Some(f64::from(v)),
        AttributeValue::Int(v) => Some(f64::from(v)),
        AttributeValue::Ulonglong(v) => Some(v as f64),
        AttributeValue::Longlong(v) => Some(v as f64),
        AttributeValue::Float(v) => Some(f64::from(v)),
        AttributeValue::Double(v) => Some(v),
        AttributeValue::Uchars(v) => v.first().map(|&x| f64::from(x)),
        AttributeValue::Schars(v) => v.first().map(|&x| f64::from(x)),
        AttributeValue::Ushorts(v) => v.first().map(|&x| f64::from(x)),
        AttributeValue::Shorts(v) => v.first().map(|&x| f64::from(x)),
        AttributeValue::Uints(v) => v.first().map(|&x| f64::from(x)),
        AttributeValue::Ints(v) => v.first().map(|&x| f64::from(x)),
        AttributeValue::Ulonglongs(v) => v.first().map(|&x| x as f64),
        AttributeValue::Longlongs(v) => v.first().map(|&x| x as f64),
        AttributeValue::Floats(v) => v.first().map(|&x| f64::from(x)),
        AttributeValue::Doubles(v) => v.first().copied(),
        _ => None,
    }
}

fn string_attribute(var: &netcdf::Variable, name: &str) -> Option<String> {
    match var.attribute_value(name)?.ok()? {
        AttributeValue::Str(s) => Some(s),
        _ => None,
    }
}
