//! # Nearest Grid Cell
//!
//! Locates the valid grid cell closest to a query point. Cells are held as
//! explicit [`GridCell`] values so that missing coordinates are a branch in
//! the type, not a sentinel compared at lookup time.
//!
//! Distance is plain Euclidean distance in coordinate space. That is a
//! flat-plane approximation, acceptable for regularly spaced grids queried
//! within a single regional study area; no reprojection is performed.
//!
//! ```rust
//! use snowclim::grid::{CoordinateSet, GridCoord, nearest};
//!
//! let set = CoordinateSet::from_pairs(&[(-105.0, 40.0), (-106.0, 41.0), (-105.6, 40.3)]);
//! let hit = nearest(&set, GridCoord::new(-105.65, 40.35)).unwrap();
//! assert_eq!(hit, GridCoord::new(-105.6, 40.3));
//! ```

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Errors raised by the locator.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum LocateError {
    #[error("coordinate set contains no valid grid cells")]
    EmptyInput,

    #[error("query point ({lon}, {lat}) contains a no-data component")]
    InvalidQuery { lon: f64, lat: f64 },

    #[error("coordinate arrays have mismatched lengths: {lons} longitudes, {lats} latitudes")]
    ShapeMismatch { lons: usize, lats: usize },
}

/// A (longitude, latitude) pair.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct GridCoord {
    pub lon: f64,
    pub lat: f64,
}

impl GridCoord {
    pub fn new(lon: f64, lat: f64) -> Self {
        GridCoord { lon, lat }
    }

    pub fn is_valid(&self) -> bool {
        self.lon.is_finite() && self.lat.is_finite()
    }

    /// Euclidean distance in coordinate units.
    pub fn distance(&self, other: &GridCoord) -> f64 {
        self.distance_sq(other).sqrt()
    }

    fn distance_sq(&self, other: &GridCoord) -> f64 {
        let dx = self.lon - other.lon;
        let dy = self.lat - other.lat;
        dx * dx + dy * dy
    }
}

impl From<(f64, f64)> for GridCoord {
    fn from((lon, lat): (f64, f64)) -> Self {
        GridCoord { lon, lat }
    }
}

/// One entry of a coordinate set.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum GridCell {
    Valid(GridCoord),
    NoData,
}

impl GridCell {
    /// Classifies a raw pair; non-finite components are no-data.
    pub fn from_raw(lon: f64, lat: f64) -> Self {
        let coord = GridCoord::new(lon, lat);
        if coord.is_valid() {
            GridCell::Valid(coord)
        } else {
            GridCell::NoData
        }
    }

    pub fn coord(&self) -> Option<GridCoord> {
        match self {
            GridCell::Valid(c) => Some(*c),
            GridCell::NoData => None,
        }
    }
}

/// Result of a lookup with enough context to index the value array.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct NearestCell {
    pub coord: GridCoord,
    /// Position in the coordinate set's iteration order.
    pub index: usize,
    pub distance: f64,
}

/// Ordered grid cell coordinates, possibly with no-data entries.
///
/// `shape` is `(rows, cols)` when the set came from a 2-D grid, so that a
/// flat index can be turned back into array indices.
#[derive(Debug, Clone, PartialEq)]
pub struct CoordinateSet {
    cells: Vec<GridCell>,
    shape: Option<(usize, usize)>,
}

impl CoordinateSet {
    pub fn new(cells: Vec<GridCell>) -> Self {
        CoordinateSet { cells, shape: None }
    }

    pub fn from_pairs(pairs: &[(f64, f64)]) -> Self {
        CoordinateSet::new(
            pairs
                .iter()
                .map(|&(lon, lat)| GridCell::from_raw(lon, lat))
                .collect(),
        )
    }

    /// Meshes 1-D axes into a row-major grid: latitude rows, longitude columns.
    pub fn from_axes(lons: &[f64], lats: &[f64]) -> Self {
        let mut cells = Vec::with_capacity(lons.len() * lats.len());
        for &lat in lats {
            for &lon in lons {
                cells.push(GridCell::from_raw(lon, lat));
            }
        }
        CoordinateSet {
            cells,
            shape: Some((lats.len(), lons.len())),
        }
    }

    /// Builds a set from flattened 2-D (curvilinear) coordinate arrays.
    pub fn from_2d(
        lons: &[f64],
        lats: &[f64],
        shape: (usize, usize),
    ) -> Result<Self, LocateError> {
        if lons.len() != lats.len() || lons.len() != shape.0 * shape.1 {
            return Err(LocateError::ShapeMismatch {
                lons: lons.len(),
                lats: lats.len(),
            });
        }
        let cells = lons
            .iter()
            .zip(lats)
            .map(|(&lon, &lat)| GridCell::from_raw(lon, lat))
            .collect();
        Ok(CoordinateSet {
            cells,
            shape: Some(shape),
        })
    }

    /// Marks cells whose longitude or latitude equals `fill` as no-data.
    pub fn with_fill_value(mut self, fill: f64) -> Self {
        for cell in &mut self.cells {
            if let GridCell::Valid(c) = cell {
                if c.lon == fill || c.lat == fill {
                    *cell = GridCell::NoData;
                }
            }
        }
        self
    }

    /// Rewrites longitudes into `[-180, 180)`.
    pub fn with_normalized_longitudes(mut self) -> Self {
        for cell in &mut self.cells {
            if let GridCell::Valid(c) = cell {
                c.lon = normalize_longitude(c.lon);
            }
        }
        self
    }

    pub fn cells(&self) -> &[GridCell] {
        &self.cells
    }

    pub fn len(&self) -> usize {
        self.cells.len()
    }

    pub fn is_empty(&self) -> bool {
        self.cells.is_empty()
    }

    pub fn valid_count(&self) -> usize {
        self.cells.iter().filter(|c| c.coord().is_some()).count()
    }

    pub fn shape(&self) -> Option<(usize, usize)> {
        self.shape
    }

    /// Flat index → `(row, col)` for sets built from a 2-D grid.
    pub fn unravel(&self, index: usize) -> Option<(usize, usize)> {
        let (rows, cols) = self.shape?;
        if cols == 0 || index >= rows * cols {
            return None;
        }
        Some((index / cols, index % cols))
    }

    /// `(min_lon, min_lat, max_lon, max_lat)` over valid cells.
    pub fn bounds(&self) -> Option<(f64, f64, f64, f64)> {
        self.cells
            .iter()
            .filter_map(GridCell::coord)
            .fold(None, |acc, c| match acc {
                None => Some((c.lon, c.lat, c.lon, c.lat)),
                Some((x0, y0, x1, y1)) => {
                    Some((x0.min(c.lon), y0.min(c.lat), x1.max(c.lon), y1.max(c.lat)))
                }
            })
    }
}

/// Wraps a longitude into `[-180, 180)`, e.g. 254.35 → -105.65.
pub fn normalize_longitude(lon: f64) -> f64 {
    (lon + 180.0).rem_euclid(360.0) - 180.0
}

/// Closest valid cell to `query`, with its position and distance.
///
/// Ties keep the earliest cell. Fails with [`LocateError::InvalidQuery`]
/// when the query is not finite and [`LocateError::EmptyInput`] when the
/// set holds no valid cell.
pub fn nearest_cell(set: &CoordinateSet, query: GridCoord) -> Result<NearestCell, LocateError> {
    if !query.is_valid() {
        return Err(LocateError::InvalidQuery {
            lon: query.lon,
            lat: query.lat,
        });
    }

    let mut best: Option<(usize, GridCoord, f64)> = None;
    for (index, cell) in set.cells.iter().enumerate() {
        let GridCell::Valid(coord) = cell else {
            continue;
        };
        let d = coord.distance_sq(&query);
        match best {
            Some((_, _, best_d)) if d >= best_d => {}
            _ => best = Some((index, *coord, d)),
        }
    }

    best.map(|(index, coord, d)| NearestCell {
        coord,
        index,
        distance: d.sqrt(),
    })
    .ok_or(LocateError::EmptyInput)
}

/// Coordinate of the closest valid cell to `query`.
pub fn nearest(set: &CoordinateSet, query: GridCoord) -> Result<GridCoord, LocateError> {
    nearest_cell(set, query).map(|hit| hit.coord)
}
