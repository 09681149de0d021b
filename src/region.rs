//! # Region Selection
//!
//! Spatial filters used to pick the stations that fall inside a study area.
//! Filters implement [`RegionFilter`]; configuration files describe them
//! with [`RegionConfig`], tagged by `kind`.
//!
//! ```json
//! { "kind": "bbox", "params": { "min_lon": -106.5, "min_lat": 39.0, "max_lon": -105.0, "max_lat": 41.0 } }
//! ```

use log::debug;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;

/// Station metadata as supplied by the observation network.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Station {
    pub id: String,
    #[serde(default)]
    pub name: String,
    pub lon: f64,
    pub lat: f64,
    #[serde(default)]
    pub elevation_m: Option<f64>,
}

pub trait RegionFilter {
    fn contains(&self, lon: f64, lat: f64) -> bool;
    fn kind(&self) -> &'static str;
}

/// Inclusive longitude/latitude box.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BoundingBox {
    pub min_lon: f64,
    pub min_lat: f64,
    pub max_lon: f64,
    pub max_lat: f64,
}

impl BoundingBox {
    pub fn new(min_lon: f64, min_lat: f64, max_lon: f64, max_lat: f64) -> Result<Self, String> {
        if min_lon > max_lon || min_lat > max_lat {
            return Err(format!(
                "Invalid bounding box: ({}, {}) must not exceed ({}, {})",
                min_lon, min_lat, max_lon, max_lat
            ));
        }
        Ok(BoundingBox {
            min_lon,
            min_lat,
            max_lon,
            max_lat,
        })
    }

    /// Parses `min_lon,min_lat,max_lon,max_lat`.
    pub fn parse(s: &str) -> Result<Self, String> {
        let values: Result<Vec<f64>, _> = s.split(',').map(|v| v.trim().parse::<f64>()).collect();
        let values = values.map_err(|_| "Invalid numeric value in bounding box".to_string())?;
        if values.len() != 4 {
            return Err("Bounding box must be 'min_lon,min_lat,max_lon,max_lat'".to_string());
        }
        BoundingBox::new(values[0], values[1], values[2], values[3])
    }
}

impl RegionFilter for BoundingBox {
    fn contains(&self, lon: f64, lat: f64) -> bool {
        lon >= self.min_lon && lon <= self.max_lon && lat >= self.min_lat && lat <= self.max_lat
    }

    fn kind(&self) -> &'static str {
        "bbox"
    }
}

/// Simple polygon given as (lon, lat) vertices; the ring closes implicitly.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Polygon {
    pub vertices: Vec<(f64, f64)>,
}

impl Polygon {
    pub fn new(mut vertices: Vec<(f64, f64)>) -> Result<Self, String> {
        if vertices.len() > 1 && vertices.first() == vertices.last() {
            vertices.pop();
        }
        if vertices.len() < 3 {
            return Err("Polygon needs at least 3 distinct vertices".to_string());
        }
        Ok(Polygon { vertices })
    }

    /// Parses `"lon lat; lon lat; ..."`.
    pub fn parse(s: &str) -> Result<Self, String> {
        let mut vertices = Vec::new();
        for pair in s.split(';').map(str::trim).filter(|p| !p.is_empty()) {
            let coords: Vec<&str> = pair.split_whitespace().collect();
            if coords.len() != 2 {
                return Err(format!("Polygon vertex must be 'lon lat', got '{}'", pair));
            }
            let lon = coords[0]
                .parse::<f64>()
                .map_err(|_| format!("Invalid longitude in vertex '{}'", pair))?;
            let lat = coords[1]
                .parse::<f64>()
                .map_err(|_| format!("Invalid latitude in vertex '{}'", pair))?;
            vertices.push((lon, lat));
        }
        Polygon::new(vertices)
    }

    pub fn bounding_box(&self) -> BoundingBox {
        let (mut x0, mut y0) = (f64::INFINITY, f64::INFINITY);
        let (mut x1, mut y1) = (f64::NEG_INFINITY, f64::NEG_INFINITY);
        for &(x, y) in &self.vertices {
            x0 = x0.min(x);
            y0 = y0.min(y);
            x1 = x1.max(x);
            y1 = y1.max(y);
        }
        BoundingBox {
            min_lon: x0,
            min_lat: y0,
            max_lon: x1,
            max_lat: y1,
        }
    }
}

impl RegionFilter for Polygon {
    // Even-odd ray casting towards +lon.
    fn contains(&self, lon: f64, lat: f64) -> bool {
        let n = self.vertices.len();
        if n < 3 {
            return false;
        }
        let mut inside = false;
        let mut j = n - 1;
        for i in 0..n {
            let (xi, yi) = self.vertices[i];
            let (xj, yj) = self.vertices[j];
            if (yi > lat) != (yj > lat) {
                let x_cross = xi + (lat - yi) * (xj - xi) / (yj - yi);
                if lon < x_cross {
                    inside = !inside;
                }
            }
            j = i;
        }
        inside
    }

    fn kind(&self) -> &'static str {
        "polygon"
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "kind")]
pub enum RegionConfig {
    #[serde(rename = "bbox")]
    BoundingBox { params: BoundingBox },
    #[serde(rename = "polygon")]
    Polygon { params: Polygon },
}

impl RegionConfig {
    pub fn to_filter(&self) -> Result<Box<dyn RegionFilter>, String> {
        match self {
            RegionConfig::BoundingBox { params } => Ok(Box::new(BoundingBox::new(
                params.min_lon,
                params.min_lat,
                params.max_lon,
                params.max_lat,
            )?)),
            RegionConfig::Polygon { params } => {
                Ok(Box::new(Polygon::new(params.vertices.clone())?))
            }
        }
    }

    pub fn kind(&self) -> &'static str {
        match self {
            RegionConfig::BoundingBox { .. } => "bbox",
            RegionConfig::Polygon { .. } => "polygon",
        }
    }
}

/// Stations inside `filter`, in input order.
pub fn select_stations<'a>(stations: &'a [Station], filter: &dyn RegionFilter) -> Vec<&'a Station> {
    let selected: Vec<&Station> = stations
        .iter()
        .filter(|s| filter.contains(s.lon, s.lat))
        .collect();
    debug!(
        "{} of {} stations inside {} region",
        selected.len(),
        stations.len(),
        filter.kind()
    );
    selected
}

/// Reads a JSON or YAML array of [`Station`] records.
pub fn load_stations<P: AsRef<Path>>(path: P) -> Result<Vec<Station>, Box<dyn std::error::Error>> {
    let path = path.as_ref();
    let content = fs::read_to_string(path)?;
    let stations = match path.extension().and_then(|e| e.to_str()) {
        Some("yaml") | Some("yml") => serde_yaml::from_str(&content)?,
        _ => serde_json::from_str(&content)?,
    };
    Ok(stations)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn square() -> Polygon {
        Polygon::new(vec![(-106.0, 39.0), (-105.0, 39.0), (-105.0, 40.0), (-106.0, 40.0)]).unwrap()
    }

    #[test]
    fn test_bbox_contains_edges() {
        let bbox = BoundingBox::new(-106.0, 39.0, -105.0, 40.0).unwrap();
        assert!(bbox.contains(-105.5, 39.5));
        assert!(bbox.contains(-106.0, 40.0));
        assert!(!bbox.contains(-104.9, 39.5));
    }

    #[test]
    fn test_bbox_parse() {
        let bbox = BoundingBox::parse("-106, 39, -105, 40").unwrap();
        assert_eq!(bbox.max_lat, 40.0);
        assert!(BoundingBox::parse("-106,39,-105").is_err());
        assert!(BoundingBox::parse("-105,39,-106,40").is_err());
    }

    #[test]
    fn test_polygon_contains() {
        let poly = square();
        assert!(poly.contains(-105.5, 39.5));
        assert!(!poly.contains(-104.5, 39.5));
        assert!(!poly.contains(-105.5, 40.5));
    }

    #[test]
    fn test_polygon_concave() {
        // L-shape missing the upper right quadrant
        let poly = Polygon::new(vec![
            (0.0, 0.0),
            (2.0, 0.0),
            (2.0, 1.0),
            (1.0, 1.0),
            (1.0, 2.0),
            (0.0, 2.0),
        ])
        .unwrap();
        assert!(poly.contains(0.5, 1.5));
        assert!(poly.contains(1.5, 0.5));
        assert!(!poly.contains(1.5, 1.5));
    }

    #[test]
    fn test_degenerate_polygon_contains_nothing() {
        let empty = Polygon { vertices: vec![] };
        assert!(!empty.contains(0.0, 0.0));

        let segment: Polygon = serde_json::from_str(r#"{"vertices": [[0.0, 0.0], [1.0, 1.0]]}"#).unwrap();
        assert!(!segment.contains(0.5, 0.5));
    }

    #[test]
    fn test_polygon_parse_and_closure() {
        let poly = Polygon::parse("-106 39; -105 39; -105 40; -106 39").unwrap();
        assert_eq!(poly.vertices.len(), 3);
        assert!(Polygon::parse("-106 39; -105 39").is_err());
        assert!(Polygon::parse("-106,39; -105 39; -105 40").is_err());
    }

    #[test]
    fn test_select_stations_preserves_order() {
        let stations = vec![
            Station { id: "a".into(), name: "A".into(), lon: -105.5, lat: 39.5, elevation_m: None },
            Station { id: "b".into(), name: "B".into(), lon: -100.0, lat: 39.5, elevation_m: None },
            Station { id: "c".into(), name: "C".into(), lon: -105.2, lat: 39.9, elevation_m: Some(3200.0) },
        ];
        let poly = square();
        let ids: Vec<&str> = select_stations(&stations, &poly).iter().map(|s| s.id.as_str()).collect();
        assert_eq!(ids, vec!["a", "c"]);
    }

    #[test]
    fn test_region_config_from_json() {
        let json = r#"{ "kind": "polygon", "params": { "vertices": [[-106, 39], [-105, 39], [-105, 40]] } }"#;
        let config: RegionConfig = serde_json::from_str(json).unwrap();
        assert_eq!(config.kind(), "polygon");
        let filter = config.to_filter().unwrap();
        assert!(filter.contains(-105.2, 39.2));
    }
}
