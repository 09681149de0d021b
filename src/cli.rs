//! # CLI Module
//!
//! Command-line interface for snowclim:
//! - Argument parsing with clap
//! - Job file loading (JSON/YAML) and template generation
//! - `SNOWCLIM_` environment variable fallbacks
//! - Region parsing for bounding boxes and polygons
//!
//! Values are resolved in priority order: command-line arguments, then
//! environment variables, then the job file given with `--config`.

use crate::compare::LengthUnit;
use crate::extract::GridSource;
use crate::grid::GridCoord;
use crate::input::{GridSection, JobConfig, ObservationSource, OutputSection, WaterYearSection};
use crate::region::{BoundingBox, Polygon, RegionConfig};
use crate::water_year::WaterYearConvention;
use chrono::NaiveDate;
use clap::{Parser, Subcommand, ValueEnum};
use clap_complete::Shell;
use serde::{Deserialize, Serialize};
use std::env;
use std::path::PathBuf;

/// Water-year snow climatologies and gridded product sampling
#[derive(Parser, Debug)]
#[command(name = "snowclim")]
#[command(about = "Day-of-water-year snow climatologies and nearest-grid-cell sampling")]
#[command(version)]
#[command(long_about = "
snowclim builds day-of-water-year (DOWY) climatologies from daily snow station
observations and samples gridded snow products at station locations.

The water year runs from October 1 to September 30 and is named after the
calendar year in which it ends.

FEATURES:
  • DOWY conversion with calendar-correct or fixed-offset conventions
  • Per-DOWY statistics (count, min, max, mean, std, median) over years of record
  • Current-season percent of median against an explicit reference date
  • Station selection by bounding box or polygon
  • Nearest valid grid cell lookup and point time series extraction from NetCDF
  • Gridded vs. observed comparison (bias, MAE, RMSE)

EXAMPLES:
  # Day of water year for some dates
  snowclim dowy 2020-10-01 2021-01-01 2021-09-30

  # Climatology from a station record
  snowclim climatology -i station_swe.parquet --nodata -99.9 -o climatology.parquet

  # Stations inside a bounding box
  snowclim stations stations.json --bbox=-106.5,39,-105,41

  # Sample a gridded product at a station
  snowclim extract swe.nc -n SWE --lon=-105.65 --lat=40.35 -o series.parquet

  # Whole workflow from a job file
  snowclim run --config job.yaml
")]
pub struct Cli {
    /// Enable verbose logging
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Quiet mode - suppress all output except errors
    #[arg(short, long, global = true, conflicts_with = "verbose")]
    pub quiet: bool,

    /// Output format for structured data
    #[arg(long, global = true, value_enum, default_value_t = OutputFormat::Human)]
    pub output_format: OutputFormat,

    /// Job configuration file path (JSON or YAML)
    #[arg(short, long, global = true, env = "SNOWCLIM_CONFIG")]
    pub config: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Convert dates to day of water year
    #[command(long_about = "
Print the water year and day of water year (DOWY) for each date.

The calendar convention counts days from October 1 (1..=366). The fixed-offset
convention subtracts 273 from the day of year and wraps by 365 (1..=365); it
matches archived tables but is one day late after February 29 of leap years.

EXAMPLES:
  snowclim dowy 2021-01-01
  snowclim dowy 2020-10-01 2020-03-01 --convention fixed-offset
  snowclim dowy 2021-01-01 --output-format json
")]
    Dowy {
        /// Dates as YYYY-MM-DD
        #[arg(required = true, value_parser = parse_date)]
        dates: Vec<NaiveDate>,

        /// DOWY convention
        #[arg(long, value_enum, env = "SNOWCLIM_CONVENTION")]
        convention: Option<WaterYearConvention>,
    },

    /// Build a day-of-water-year climatology from station observations
    #[command(long_about = "
Group daily observations by day of water year and summarise each day across
all years of record. With --season, print the reference date's water year to
date alongside the climatological median instead.

Observations are a parquet table with 'date' and 'value' columns, or a JSON
array of {\"date\": \"YYYY-MM-DD\", \"value\": number|null} records.

EXAMPLES:
  snowclim climatology -i station_swe.parquet -o climatology.parquet
  snowclim climatology -i obs.json --nodata -99.9 --reference-date 2023-03-15 --season
  snowclim climatology --config job.yaml --exclude-current
")]
    Climatology {
        /// Observation file (parquet or JSON)
        #[arg(short = 'i', long)]
        observations: Option<PathBuf>,

        /// Write the climatology table to this parquet file
        #[arg(short, long)]
        output: Option<PathBuf>,

        /// Date treated as today (default: last observation date)
        #[arg(long, value_parser = parse_date, env = "SNOWCLIM_REFERENCE_DATE")]
        reference_date: Option<NaiveDate>,

        /// Exclude the reference date's water year from the climatology
        #[arg(long)]
        exclude_current: bool,

        /// No-data sentinel in the observation values
        #[arg(long, allow_negative_numbers = true, env = "SNOWCLIM_NODATA")]
        nodata: Option<f64>,

        /// DOWY convention
        #[arg(long, value_enum, env = "SNOWCLIM_CONVENTION")]
        convention: Option<WaterYearConvention>,

        /// Drop days backed by fewer observations
        #[arg(long)]
        min_count: Option<u32>,

        /// Print the current season with percent of median
        #[arg(long)]
        season: bool,
    },

    /// List stations inside a region
    #[command(long_about = "
Select stations from a JSON or YAML station list by bounding box or polygon.

The region may also come from SNOWCLIM_BBOX or SNOWCLIM_POLYGON, or from the
'region' section of the job file.

EXAMPLES:
  snowclim stations stations.json --bbox=-106.5,39,-105,41
  snowclim stations stations.yaml --polygon '-106 39; -105 39; -105 40'
")]
    Stations {
        /// Station list (JSON or YAML)
        stations: Option<PathBuf>,

        /// Bounding box: min_lon,min_lat,max_lon,max_lat
        #[arg(long, value_parser = BoundingBox::parse, allow_hyphen_values = true, conflicts_with = "polygon")]
        bbox: Option<BoundingBox>,

        /// Polygon: 'lon lat; lon lat; lon lat'
        #[arg(long, value_parser = Polygon::parse, allow_hyphen_values = true)]
        polygon: Option<Polygon>,
    },

    /// Find the nearest valid grid cell to a point
    #[command(long_about = "
Locate the grid cell nearest to a longitude/latitude point. Cells whose
coordinates are missing are ignored; ties go to the first cell in grid order.

EXAMPLES:
  snowclim nearest swe.nc --lon=-105.65 --lat=40.35
  snowclim nearest model.nc --lon=-105.65 --lat=40.35 --lon-var XLONG --lat-var XLAT
")]
    Nearest {
        /// Gridded NetCDF file
        grid: PathBuf,

        #[arg(long, allow_negative_numbers = true)]
        lon: f64,

        #[arg(long, allow_negative_numbers = true)]
        lat: f64,

        /// Longitude variable name
        #[arg(long, default_value = "lon")]
        lon_var: String,

        /// Latitude variable name
        #[arg(long, default_value = "lat")]
        lat_var: String,
    },

    /// Extract a grid time series at the nearest cell
    #[command(long_about = "
Read a variable's time series at the grid cell nearest to a point.

EXAMPLES:
  snowclim extract swe.nc -n SWE --lon=-105.65 --lat=40.35
  snowclim extract swe.nc -n SWE --lon=-105.65 --lat=40.35 -o series.parquet
")]
    Extract {
        /// Gridded NetCDF file
        grid: PathBuf,

        /// Variable to sample
        #[arg(short = 'n', long)]
        variable: String,

        #[arg(long, allow_negative_numbers = true)]
        lon: f64,

        #[arg(long, allow_negative_numbers = true)]
        lat: f64,

        #[arg(long, default_value = "lon")]
        lon_var: String,

        #[arg(long, default_value = "lat")]
        lat_var: String,

        #[arg(long, default_value = "time")]
        time_var: String,

        /// Write the series to this parquet file
        #[arg(short, long)]
        output: Option<PathBuf>,
    },

    /// Compare a grid time series against station observations
    #[command(long_about = "
Sample the grid at a station and compare against its observations on shared
dates. Grid values are scaled into the observation unit with --scale, or with
--grid-units/--obs-units.

EXAMPLES:
  snowclim compare swe.nc -n SWE -i obs.parquet --lon=-105.65 --lat=40.35 --grid-units m --obs-units in
  snowclim compare swe.nc -n SWE -i obs.json --lon=-105.65 --lat=40.35 --scale 39.37
")]
    Compare {
        /// Gridded NetCDF file
        grid: PathBuf,

        #[arg(short = 'n', long)]
        variable: String,

        /// Observation file (parquet or JSON)
        #[arg(short = 'i', long)]
        observations: PathBuf,

        #[arg(long, allow_negative_numbers = true)]
        lon: f64,

        #[arg(long, allow_negative_numbers = true)]
        lat: f64,

        /// Multiplier applied to grid values
        #[arg(long, conflicts_with_all = ["grid_units", "obs_units"])]
        scale: Option<f64>,

        #[arg(long, value_enum, requires = "obs_units")]
        grid_units: Option<LengthUnit>,

        #[arg(long, value_enum, requires = "grid_units")]
        obs_units: Option<LengthUnit>,

        #[arg(long, allow_negative_numbers = true, env = "SNOWCLIM_NODATA")]
        nodata: Option<f64>,

        #[arg(long, default_value = "lon")]
        lon_var: String,

        #[arg(long, default_value = "lat")]
        lat_var: String,

        /// Write the joined rows to this parquet file
        #[arg(short, long)]
        output: Option<PathBuf>,
    },

    /// Show dimensions, variables and extent of a grid file
    Info {
        /// NetCDF file
        file: PathBuf,

        #[arg(long, default_value = "lon")]
        lon_var: String,

        #[arg(long, default_value = "lat")]
        lat_var: String,
    },

    /// Run a whole job from a configuration file
    #[command(long_about = "
Run every configured step of a job file: climatology and current season,
region station selection, grid sampling and comparison.

EXAMPLES:
  snowclim run job.yaml
  snowclim run --config job.json --reference-date 2023-03-15
")]
    Run {
        /// Job file (overrides --config)
        config_file: Option<PathBuf>,

        /// Override the job's reference date
        #[arg(long, value_parser = parse_date, env = "SNOWCLIM_REFERENCE_DATE")]
        reference_date: Option<NaiveDate>,
    },

    /// Validate a job configuration file
    Validate {
        /// Job file to validate
        config_file: Option<PathBuf>,

        /// Show a detailed validation report
        #[arg(long)]
        detailed: bool,
    },

    /// Generate job file templates
    #[command(long_about = "
Generate job file templates for common use cases.

Available templates:
• basic: station climatology only
• region: station selection and grid sampling over a region
• comparison: grid vs. station comparison at one point
• full: every section filled in

EXAMPLES:
  snowclim template basic
  snowclim template full --format yaml -o job.yaml
")]
    Template {
        /// Template type to generate
        #[arg(value_enum)]
        template_type: TemplateType,

        /// Output file path (default: stdout)
        #[arg(short, long)]
        output: Option<PathBuf>,

        /// Configuration format
        #[arg(long, value_enum, default_value_t = ConfigFormat::Json)]
        format: ConfigFormat,
    },

    /// Generate shell completions
    Completions {
        /// Shell to generate completions for
        #[arg(value_enum)]
        shell: Shell,

        /// Output file path (default: stdout)
        #[arg(short, long)]
        output: Option<PathBuf>,
    },
}

#[derive(ValueEnum, Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum OutputFormat {
    /// Human-readable output
    Human,
    /// JSON structured output
    Json,
    /// YAML structured output
    Yaml,
    /// CSV output (where applicable)
    Csv,
}

#[derive(ValueEnum, Clone, Debug, PartialEq, Eq)]
pub enum TemplateType {
    /// Station climatology only
    Basic,
    /// Region station selection and grid sampling
    Region,
    /// Grid vs. station comparison
    Comparison,
    /// Every section
    Full,
}

#[derive(ValueEnum, Clone, Debug, PartialEq, Eq)]
pub enum ConfigFormat {
    /// JSON configuration format
    Json,
    /// YAML configuration format
    Yaml,
}

pub fn parse_date(s: &str) -> Result<NaiveDate, String> {
    NaiveDate::parse_from_str(s.trim(), "%Y-%m-%d")
        .map_err(|_| format!("Invalid date '{}': expected YYYY-MM-DD", s))
}

impl From<BoundingBox> for RegionConfig {
    fn from(params: BoundingBox) -> Self {
        RegionConfig::BoundingBox { params }
    }
}

impl From<Polygon> for RegionConfig {
    fn from(params: Polygon) -> Self {
        RegionConfig::Polygon { params }
    }
}

/// Region from `SNOWCLIM_BBOX` or `SNOWCLIM_POLYGON`; the box wins when both are set.
pub fn parse_region_from_env() -> Result<Option<RegionConfig>, String> {
    if let Ok(bbox) = env::var("SNOWCLIM_BBOX")
        && !bbox.trim().is_empty()
    {
        let bbox = BoundingBox::parse(&bbox)
            .map_err(|e| format!("Invalid bounding box in SNOWCLIM_BBOX: {}", e))?;
        return Ok(Some(bbox.into()));
    }

    if let Ok(polygon) = env::var("SNOWCLIM_POLYGON")
        && !polygon.trim().is_empty()
    {
        let polygon = Polygon::parse(&polygon)
            .map_err(|e| format!("Invalid polygon in SNOWCLIM_POLYGON: {}", e))?;
        return Ok(Some(polygon.into()));
    }

    Ok(None)
}

/// Command-line region if given, else the environment, else the job file.
pub fn merge_region(
    cli_bbox: Option<BoundingBox>,
    cli_polygon: Option<Polygon>,
    config: Option<&JobConfig>,
) -> Result<Option<RegionConfig>, String> {
    if let Some(bbox) = cli_bbox {
        return Ok(Some(bbox.into()));
    }
    if let Some(polygon) = cli_polygon {
        return Ok(Some(polygon.into()));
    }
    if let Some(region) = parse_region_from_env()? {
        return Ok(Some(region));
    }
    Ok(config.and_then(|c| c.region.clone()))
}

/// Command-line climatology arguments before merging with a job file.
#[derive(Debug, Clone, Default)]
pub struct ClimatologyArgs {
    pub observations: Option<PathBuf>,
    pub reference_date: Option<NaiveDate>,
    pub exclude_current: bool,
    pub nodata: Option<f64>,
    pub convention: Option<WaterYearConvention>,
    pub min_count: Option<u32>,
}

/// Fills unset arguments from the job file's `observations` and
/// `water_year` sections.
pub fn merge_climatology_args(
    args: ClimatologyArgs,
    config: Option<&JobConfig>,
) -> Result<(ObservationSource, WaterYearSection), String> {
    let file_obs = config.and_then(|c| c.observations.clone());
    let file_wy = config.map(|c| c.water_year.clone()).unwrap_or_default();

    let path = args
        .observations
        .or_else(|| file_obs.as_ref().map(|o| o.path.clone()))
        .ok_or("No observation file given: use --observations or a job file")?;

    let source = ObservationSource {
        path,
        nodata: args.nodata.or(file_obs.as_ref().and_then(|o| o.nodata)),
        units: file_obs.as_ref().and_then(|o| o.units),
    };
    let water_year = WaterYearSection {
        convention: args.convention.unwrap_or(file_wy.convention),
        reference_date: args.reference_date.or(file_wy.reference_date),
        exclude_current: args.exclude_current || file_wy.exclude_current,
        min_count: args.min_count.or(file_wy.min_count),
    };

    Ok((source, water_year))
}

pub fn generate_template(template_type: &TemplateType) -> JobConfig {
    let water_year = WaterYearSection {
        convention: WaterYearConvention::Calendar,
        reference_date: NaiveDate::from_ymd_opt(2023, 3, 15),
        exclude_current: true,
        min_count: None,
    };
    let observations = ObservationSource {
        path: PathBuf::from("station_swe.parquet"),
        nodata: Some(-99.9),
        units: Some(LengthUnit::In),
    };
    let grid = GridSection {
        source: GridSource::new("swe_daily.nc", "SWE"),
        units: Some(LengthUnit::M),
        scale: None,
    };
    let region: RegionConfig = BoundingBox {
        min_lon: -106.5,
        min_lat: 39.0,
        max_lon: -105.0,
        max_lat: 41.0,
    }
    .into();
    let point = GridCoord::new(-105.65, 40.35);

    match template_type {
        TemplateType::Basic => JobConfig {
            water_year,
            observations: Some(observations),
            output: OutputSection {
                climatology: Some(PathBuf::from("climatology.parquet")),
                season: Some(PathBuf::from("season.parquet")),
                ..Default::default()
            },
            ..Default::default()
        },
        TemplateType::Region => JobConfig {
            water_year,
            stations: Some(PathBuf::from("stations.json")),
            region: Some(region),
            grid: Some(grid),
            output: OutputSection {
                series: Some(PathBuf::from("station_series.parquet")),
                ..Default::default()
            },
            ..Default::default()
        },
        TemplateType::Comparison => JobConfig {
            water_year,
            observations: Some(observations),
            grid: Some(grid),
            point: Some(point),
            output: OutputSection {
                comparison: Some(PathBuf::from("comparison.parquet")),
                ..Default::default()
            },
            ..Default::default()
        },
        TemplateType::Full => JobConfig {
            water_year,
            observations: Some(observations),
            stations: Some(PathBuf::from("stations.json")),
            region: Some(region),
            grid: Some(grid),
            point: Some(point),
            output: OutputSection {
                climatology: Some(PathBuf::from("climatology.parquet")),
                season: Some(PathBuf::from("season.parquet")),
                series: Some(PathBuf::from("series.parquet")),
                comparison: Some(PathBuf::from("comparison.parquet")),
            },
        },
    }
}

pub fn render_template(config: &JobConfig, format: &ConfigFormat) -> Result<String, String> {
    match format {
        ConfigFormat::Json => serde_json::to_string_pretty(config).map_err(|e| e.to_string()),
        ConfigFormat::Yaml => serde_yaml::to_string(config).map_err(|e| e.to_string()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::region::RegionFilter;
    use std::sync::Mutex;

    // Global mutex to ensure environment variable tests run sequentially
    static ENV_TEST_MUTEX: Mutex<()> = Mutex::new(());

    fn clear_region_env() {
        unsafe {
            env::remove_var("SNOWCLIM_BBOX");
            env::remove_var("SNOWCLIM_POLYGON");
        }
    }

    #[test]
    fn test_parse_date() {
        assert_eq!(parse_date("2021-01-01"), Ok(NaiveDate::from_ymd_opt(2021, 1, 1).unwrap()));
        assert!(parse_date("2021-02-30").is_err());
        assert!(parse_date("01/01/2021").is_err());
    }

    #[test]
    fn test_region_conversion() {
        let bbox = BoundingBox::parse("-106,39,-105,40").unwrap();
        let config: RegionConfig = bbox.into();
        assert_eq!(config.kind(), "bbox");
        assert!(config.to_filter().unwrap().contains(-105.5, 39.5));
    }

    #[test]
    fn test_environment_region_parsing() {
        let _guard = ENV_TEST_MUTEX.lock().unwrap();
        let original_bbox = env::var("SNOWCLIM_BBOX").ok();
        let original_polygon = env::var("SNOWCLIM_POLYGON").ok();

        clear_region_env();
        assert!(parse_region_from_env().unwrap().is_none());

        unsafe {
            env::set_var("SNOWCLIM_POLYGON", "-106 39; -105 39; -105 40");
        }
        let region = parse_region_from_env().unwrap().unwrap();
        assert_eq!(region.kind(), "polygon");

        unsafe {
            env::set_var("SNOWCLIM_BBOX", "-106,39,-105,40");
        }
        assert_eq!(parse_region_from_env().unwrap().unwrap().kind(), "bbox");

        unsafe {
            env::set_var("SNOWCLIM_BBOX", "-106,39");
        }
        assert!(parse_region_from_env().is_err());

        clear_region_env();
        unsafe {
            if let Some(ref val) = original_bbox {
                env::set_var("SNOWCLIM_BBOX", val);
            }
            if let Some(ref val) = original_polygon {
                env::set_var("SNOWCLIM_POLYGON", val);
            }
        }
    }

    #[test]
    fn test_region_merging_priority() {
        let _guard = ENV_TEST_MUTEX.lock().unwrap();
        let original_bbox = env::var("SNOWCLIM_BBOX").ok();
        let original_polygon = env::var("SNOWCLIM_POLYGON").ok();
        clear_region_env();

        let config = JobConfig {
            region: Some(Polygon::parse("0 0; 1 0; 1 1").unwrap().into()),
            ..Default::default()
        };

        // Job file only
        let region = merge_region(None, None, Some(&config)).unwrap().unwrap();
        assert_eq!(region.kind(), "polygon");

        // Environment beats job file
        unsafe {
            env::set_var("SNOWCLIM_BBOX", "-106,39,-105,40");
        }
        let region = merge_region(None, None, Some(&config)).unwrap().unwrap();
        assert_eq!(region.kind(), "bbox");

        // Command line beats environment
        let cli_polygon = Polygon::parse("-106 39; -105 39; -105 40").unwrap();
        let region = merge_region(None, Some(cli_polygon), Some(&config)).unwrap().unwrap();
        assert_eq!(region.kind(), "polygon");
        assert!(!region.to_filter().unwrap().contains(0.5, 0.2));

        clear_region_env();
        unsafe {
            if let Some(ref val) = original_bbox {
                env::set_var("SNOWCLIM_BBOX", val);
            }
            if let Some(ref val) = original_polygon {
                env::set_var("SNOWCLIM_POLYGON", val);
            }
        }
    }

    #[test]
    fn test_merge_climatology_args() {
        let config = JobConfig::from_json(
            r#"{
                "water_year": { "convention": "fixed_offset", "reference_date": "2023-03-15", "min_count": 5 },
                "observations": { "path": "from_file.parquet", "nodata": -99.9 }
            }"#,
        )
        .unwrap();

        let args = ClimatologyArgs {
            reference_date: NaiveDate::from_ymd_opt(2024, 1, 1),
            ..Default::default()
        };
        let (source, wy) = merge_climatology_args(args, Some(&config)).unwrap();
        assert_eq!(source.path, PathBuf::from("from_file.parquet"));
        assert_eq!(source.nodata, Some(-99.9));
        assert_eq!(wy.convention, WaterYearConvention::FixedOffset);
        assert_eq!(wy.reference_date, NaiveDate::from_ymd_opt(2024, 1, 1));
        assert_eq!(wy.min_count, Some(5));

        let args = ClimatologyArgs {
            observations: Some(PathBuf::from("cli.json")),
            convention: Some(WaterYearConvention::Calendar),
            ..Default::default()
        };
        let (source, wy) = merge_climatology_args(args, Some(&config)).unwrap();
        assert_eq!(source.path, PathBuf::from("cli.json"));
        assert_eq!(wy.convention, WaterYearConvention::Calendar);

        assert!(merge_climatology_args(ClimatologyArgs::default(), None).is_err());
    }

    #[test]
    fn test_templates_are_valid_and_round_trip() {
        for template_type in [
            TemplateType::Basic,
            TemplateType::Region,
            TemplateType::Comparison,
            TemplateType::Full,
        ] {
            let config = generate_template(&template_type);
            assert!(config.problems().is_empty(), "{:?}: {:?}", template_type, config.problems());

            let json = render_template(&config, &ConfigFormat::Json).unwrap();
            assert!(JobConfig::from_json(&json).unwrap().problems().is_empty());

            let yaml = render_template(&config, &ConfigFormat::Yaml).unwrap();
            assert!(JobConfig::from_yaml(&yaml).unwrap().problems().is_empty());
        }
    }
}
