//! Gridded product vs. station observation comparison.
//!
//! Grid values are joined to observations on date, rescaled into the
//! observation unit and summarised as bias, mean absolute error and RMSE.

use crate::climatology::Observation;
use crate::extract::PointSeries;
use chrono::NaiveDate;
use clap::ValueEnum;
use polars::prelude::*;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum CompareError {
    #[error("grid series and observations share no dates with data")]
    NoOverlap,

    #[error("scale factor must be finite and non-zero, got {0}")]
    InvalidScale(f64),
}

/// Length units snow products are commonly reported in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum LengthUnit {
    Mm,
    Cm,
    M,
    In,
}

impl LengthUnit {
    fn metres(self) -> f64 {
        match self {
            LengthUnit::Mm => 0.001,
            LengthUnit::Cm => 0.01,
            LengthUnit::M => 1.0,
            LengthUnit::In => 0.0254,
        }
    }

    /// Multiplier converting a value in `self` into `other`.
    pub fn factor_to(self, other: LengthUnit) -> f64 {
        self.metres() / other.metres()
    }
}

impl std::str::FromStr for LengthUnit {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "mm" => Ok(LengthUnit::Mm),
            "cm" => Ok(LengthUnit::Cm),
            "m" => Ok(LengthUnit::M),
            "in" | "inch" | "inches" => Ok(LengthUnit::In),
            other => Err(format!("Unknown length unit: {}", other)),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ComparedDay {
    pub date: NaiveDate,
    pub grid: f64,
    pub observed: f64,
}

impl ComparedDay {
    pub fn error(&self) -> f64 {
        self.grid - self.observed
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ComparisonSummary {
    pub n: usize,
    /// Mean of grid minus observed.
    pub bias: f64,
    pub mae: f64,
    pub rmse: f64,
}

#[derive(Debug, Clone, Serialize)]
pub struct Comparison {
    pub summary: ComparisonSummary,
    pub days: Vec<ComparedDay>,
}

impl Comparison {
    pub fn to_dataframe(&self) -> PolarsResult<DataFrame> {
        df! {
            "date" => self.days.iter().map(|d| d.date.to_string()).collect::<Vec<_>>(),
            "grid" => self.days.iter().map(|d| d.grid).collect::<Vec<_>>(),
            "observed" => self.days.iter().map(|d| d.observed).collect::<Vec<_>>(),
            "error" => self.days.iter().map(|d| d.error()).collect::<Vec<_>>(),
        }
    }
}

/// Pairs grid and observed values on shared dates, skipping days where
/// either side has no data. Grid values are multiplied by `scale` first.
pub fn compare_series(
    grid: &PointSeries,
    observations: &[Observation],
    scale: f64,
) -> Result<Comparison, CompareError> {
    if !scale.is_finite() || scale == 0.0 {
        return Err(CompareError::InvalidScale(scale));
    }

    let observed: HashMap<NaiveDate, f64> = observations
        .iter()
        .filter_map(|o| o.value.map(|v| (o.date, v)))
        .collect();

    let mut days: Vec<ComparedDay> = grid
        .dates
        .iter()
        .zip(&grid.values)
        .filter_map(|(date, value)| {
            let g = (*value)?;
            let o = *observed.get(date)?;
            Some(ComparedDay {
                date: *date,
                grid: g * scale,
                observed: o,
            })
        })
        .collect();
    days.sort_by_key(|d| d.date);
    days.dedup_by_key(|d| d.date);

    if days.is_empty() {
        return Err(CompareError::NoOverlap);
    }

    let n = days.len();
    let bias = days.iter().map(ComparedDay::error).sum::<f64>() / n as f64;
    let mae = days.iter().map(|d| d.error().abs()).sum::<f64>() / n as f64;
    let rmse = (days.iter().map(|d| d.error().powi(2)).sum::<f64>() / n as f64).sqrt();

    Ok(Comparison {
        summary: ComparisonSummary { n, bias, mae, rmse },
        days,
    })
}
