//! # Day-of-Water-Year Climatology
//!
//! Groups daily station observations by day of water year and summarises
//! every bucket across all years of record (count, minimum, maximum, mean,
//! sample standard deviation, median). The grouping runs through a polars
//! lazy `group_by`, after no-data observations have been dropped explicitly.
//!
//! ## Example
//!
//! ```rust
//! use chrono::NaiveDate;
//! use snowclim::climatology::{Climatology, ClimatologyOptions, Observation};
//!
//! let obs = vec![
//!     Observation::new(NaiveDate::from_ymd_opt(2019, 1, 1).unwrap(), Some(8.0)),
//!     Observation::new(NaiveDate::from_ymd_opt(2020, 1, 1).unwrap(), Some(12.0)),
//!     Observation::new(NaiveDate::from_ymd_opt(2021, 1, 1).unwrap(), None),
//! ];
//! let climo = Climatology::from_observations(&obs, &ClimatologyOptions::default()).unwrap();
//! assert_eq!(climo.stats(93).unwrap().count, 2);
//! ```

use crate::water_year::{WaterYearConvention, WaterYearWindow, water_year};
use chrono::NaiveDate;
use log::{debug, info};
use polars::prelude::*;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fs::File;
use std::path::Path;
use thiserror::Error;

/// Errors raised while loading observations or building a climatology.
#[derive(Error, Debug)]
pub enum ClimatologyError {
    #[error("no valid observations to aggregate")]
    NoObservations,

    #[error("column '{0}' not found in observation table")]
    MissingColumn(String),

    #[error("invalid date '{0}' in observation table")]
    InvalidDate(String),

    #[error("unsupported observation file format: {0}")]
    UnsupportedFormat(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Polars error: {0}")]
    Polars(#[from] PolarsError),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

pub type ClimatologyResult<T> = Result<T, ClimatologyError>;

/// A single dated observation. `None` means the station reported no data.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Observation {
    pub date: NaiveDate,
    pub value: Option<f64>,
}

impl Observation {
    pub fn new(date: NaiveDate, value: Option<f64>) -> Self {
        Observation { date, value }
    }

    /// Builds an observation from a raw reading, mapping NaN and the
    /// station's `nodata` sentinel to `None`.
    pub fn from_raw(date: NaiveDate, raw: f64, nodata: Option<f64>) -> Self {
        let value = if !raw.is_finite() || nodata.is_some_and(|s| raw == s) {
            None
        } else {
            Some(raw)
        };
        Observation { date, value }
    }
}

/// Per-DOWY summary across all years of record.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DowyStats {
    pub dowy: u32,
    pub count: u32,
    pub min: f64,
    pub max: f64,
    pub mean: f64,
    /// Sample standard deviation; `None` for single-value buckets.
    pub std: Option<f64>,
    pub median: f64,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ClimatologyOptions {
    #[serde(default)]
    pub convention: WaterYearConvention,
    /// Leave one water year out of the climatology, typically the current one.
    #[serde(default)]
    pub exclude_water_year: Option<i32>,
    /// Drop buckets backed by fewer observations than this.
    #[serde(default)]
    pub min_count: Option<u32>,
}

/// One day of the current season alongside the climatological median.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SeasonDay {
    pub date: NaiveDate,
    pub dowy: u32,
    pub value: Option<f64>,
    pub median: Option<f64>,
    pub percent_of_median: Option<f64>,
}

#[derive(Debug, Clone, Serialize)]
pub struct Climatology {
    convention: WaterYearConvention,
    water_years: Vec<i32>,
    stats: Vec<DowyStats>,
}

impl Climatology {
    pub fn from_observations(
        observations: &[Observation],
        options: &ClimatologyOptions,
    ) -> ClimatologyResult<Self> {
        let convention = options.convention;
        let mut wys = Vec::new();
        let mut dowys = Vec::new();
        let mut values = Vec::new();

        for obs in observations {
            let Some(value) = obs.value else {
                continue;
            };
            let wy = water_year(obs.date);
            if options.exclude_water_year == Some(wy) {
                continue;
            }
            wys.push(wy);
            dowys.push(convention.dowy(obs.date) as i32);
            values.push(value);
        }

        if values.is_empty() {
            return Err(ClimatologyError::NoObservations);
        }
        debug!(
            "Aggregating {} of {} observations by DOWY ({})",
            values.len(),
            observations.len(),
            convention
        );

        let mut water_years = wys.clone();
        water_years.sort_unstable();
        water_years.dedup();

        let df = df! {
            "water_year" => wys,
            "dowy" => dowys,
            "value" => values,
        }?;

        let grouped = df
            .lazy()
            .group_by([col("dowy")])
            .agg([
                col("value").count().alias("count"),
                col("value").min().alias("min"),
                col("value").max().alias("max"),
                col("value").mean().alias("mean"),
                col("value").std(1).alias("std"),
                col("value").median().alias("median"),
            ])
            .sort(["dowy"], SortMultipleOptions::default())
            .collect()?;

        let mut stats = stats_from_frame(&grouped)?;
        if let Some(min_count) = options.min_count {
            stats.retain(|s| s.count >= min_count);
        }

        info!(
            "Built climatology: {} DOWY buckets over {} water years",
            stats.len(),
            water_years.len()
        );

        Ok(Climatology {
            convention,
            water_years,
            stats,
        })
    }

    pub fn convention(&self) -> WaterYearConvention {
        self.convention
    }

    /// Water years that contributed at least one observation.
    pub fn water_years(&self) -> &[i32] {
        &self.water_years
    }

    pub fn stats(&self, dowy: u32) -> Option<&DowyStats> {
        self.stats
            .binary_search_by_key(&dowy, |s| s.dowy)
            .ok()
            .map(|i| &self.stats[i])
    }

    pub fn iter(&self) -> impl Iterator<Item = &DowyStats> {
        self.stats.iter()
    }

    pub fn len(&self) -> usize {
        self.stats.len()
    }

    pub fn is_empty(&self) -> bool {
        self.stats.is_empty()
    }

    /// Observations of the reference date's water year, up to and including
    /// the reference date, paired with this climatology's median.
    pub fn current_season(&self, observations: &[Observation], reference: NaiveDate) -> Vec<SeasonDay> {
        let window = WaterYearWindow::current(reference);
        let mut days: Vec<SeasonDay> = observations
            .iter()
            .filter(|o| window.contains_to_date(o.date))
            .map(|o| {
                let dowy = self.convention.dowy(o.date);
                let median = self.stats(dowy).map(|s| s.median);
                let percent_of_median = match (o.value, median) {
                    (Some(v), Some(m)) if m != 0.0 => Some(100.0 * v / m),
                    _ => None,
                };
                SeasonDay {
                    date: o.date,
                    dowy,
                    value: o.value,
                    median,
                    percent_of_median,
                }
            })
            .collect();
        days.sort_by_key(|d| d.date);
        days
    }

    pub fn to_dataframe(&self) -> ClimatologyResult<DataFrame> {
        let df = df! {
            "dowy" => self.stats.iter().map(|s| s.dowy).collect::<Vec<_>>(),
            "count" => self.stats.iter().map(|s| s.count).collect::<Vec<_>>(),
            "min" => self.stats.iter().map(|s| s.min).collect::<Vec<_>>(),
            "max" => self.stats.iter().map(|s| s.max).collect::<Vec<_>>(),
            "mean" => self.stats.iter().map(|s| s.mean).collect::<Vec<_>>(),
            "std" => self.stats.iter().map(|s| s.std).collect::<Vec<_>>(),
            "median" => self.stats.iter().map(|s| s.median).collect::<Vec<_>>(),
        }?;
        Ok(df)
    }
}

/// Tabulates current-season rows; dates are written as ISO strings.
pub fn season_to_dataframe(days: &[SeasonDay]) -> ClimatologyResult<DataFrame> {
    let df = df! {
        "date" => days.iter().map(|d| d.date.to_string()).collect::<Vec<_>>(),
        "dowy" => days.iter().map(|d| d.dowy).collect::<Vec<_>>(),
        "value" => days.iter().map(|d| d.value).collect::<Vec<_>>(),
        "median" => days.iter().map(|d| d.median).collect::<Vec<_>>(),
        "percent_of_median" => days.iter().map(|d| d.percent_of_median).collect::<Vec<_>>(),
    }?;
    Ok(df)
}

fn stats_from_frame(df: &DataFrame) -> ClimatologyResult<Vec<DowyStats>> {
    let dowy = df.column("dowy")?.i32()?;
    let count = df.column("count")?.cast(&DataType::UInt32)?;
    let count = count.u32()?;
    let min = df.column("min")?.f64()?;
    let max = df.column("max")?.f64()?;
    let mean = df.column("mean")?.f64()?;
    let sd = df.column("std")?.f64()?;
    let median = df.column("median")?.f64()?;

    let mut stats = Vec::with_capacity(df.height());
    for i in 0..df.height() {
        let (Some(d), Some(n), Some(lo), Some(hi), Some(avg), Some(mid)) = (
            dowy.get(i),
            count.get(i),
            min.get(i),
            max.get(i),
            mean.get(i),
            median.get(i),
        ) else {
            continue;
        };
        stats.push(DowyStats {
            dowy: d as u32,
            count: n,
            min: lo,
            max: hi,
            mean: avg,
            std: sd.get(i).filter(|v| v.is_finite()),
            median: mid,
        });
    }
    Ok(stats)
}

#[derive(Deserialize)]
struct ObservationRecord {
    date: NaiveDate,
    value: Option<f64>,
}

/// Loads observations from a parquet table (`date`, `value` columns) or a
/// JSON array of `{ "date": "YYYY-MM-DD", "value": number | null }`.
///
/// Values equal to `nodata` are read as missing.
pub fn load_observations<P: AsRef<Path>>(
    path: P,
    nodata: Option<f64>,
) -> ClimatologyResult<Vec<Observation>> {
    let path = path.as_ref();
    let extension = path
        .extension()
        .and_then(|e| e.to_str())
        .map(|e| e.to_lowercase())
        .unwrap_or_default();

    debug!("Loading observations from {}", path.display());
    let observations = match extension.as_str() {
        "parquet" => {
            let df = ParquetReader::new(File::open(path)?).finish()?;
            observations_from_frame(&df, nodata)?
        }
        "json" => {
            let content = std::fs::read_to_string(path)?;
            let records: Vec<ObservationRecord> = serde_json::from_str(&content)?;
            records
                .into_iter()
                .map(|r| match r.value {
                    Some(v) => Observation::from_raw(r.date, v, nodata),
                    None => Observation::new(r.date, None),
                })
                .collect()
        }
        other => return Err(ClimatologyError::UnsupportedFormat(other.to_string())),
    };

    debug!("Loaded {} observations", observations.len());
    Ok(observations)
}

/// Reads `date` and `value` columns from a frame. Any date dtype that
/// renders as `YYYY-MM-DD...` is accepted.
pub fn observations_from_frame(
    df: &DataFrame,
    nodata: Option<f64>,
) -> ClimatologyResult<Vec<Observation>> {
    let names: Vec<&str> = df.get_column_names().iter().map(|s| s.as_str()).collect();
    for required in ["date", "value"] {
        if !names.contains(&required) {
            return Err(ClimatologyError::MissingColumn(required.to_string()));
        }
    }

    let dates = df.column("date")?.cast(&DataType::String)?;
    let dates = dates.str()?;
    let values = df.column("value")?.cast(&DataType::Float64)?;
    let values = values.f64()?;

    let mut observations = Vec::with_capacity(df.height());
    for (date, value) in dates.into_iter().zip(values.into_iter()) {
        let Some(date) = date else {
            continue;
        };
        let day = date.get(..10).unwrap_or(date);
        let date = NaiveDate::parse_from_str(day, "%Y-%m-%d")
            .map_err(|_| ClimatologyError::InvalidDate(date.to_string()))?;
        observations.push(match value {
            Some(v) => Observation::from_raw(date, v, nodata),
            None => Observation::new(date, None),
        });
    }
    Ok(observations)
}

/// Groups valid values by DOWY without polars; used to cross-check the
/// aggregated table.
pub fn group_by_dowy(
    observations: &[Observation],
    convention: WaterYearConvention,
) -> HashMap<u32, Vec<f64>> {
    let mut groups: HashMap<u32, Vec<f64>> = HashMap::new();
    for obs in observations {
        if let Some(v) = obs.value {
            groups.entry(convention.dowy(obs.date)).or_default().push(v);
        }
    }
    groups
}
