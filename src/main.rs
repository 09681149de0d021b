use anyhow::{Context, Result, anyhow};
use clap::{CommandFactory, Parser};
use clap_complete::generate;
use log::{debug, info};
use serde::Serialize;
use snowclim::cli::{
    ClimatologyArgs, Cli, Commands, OutputFormat, generate_template, merge_climatology_args, merge_region,
    render_template,
};
use snowclim::climatology::{Climatology, ClimatologyOptions, load_observations, season_to_dataframe};
use snowclim::compare::compare_series;
use snowclim::extract::{GridDataset, GridSource, load_coordinate_set};
use snowclim::grid::{GridCoord, nearest_cell, normalize_longitude};
use snowclim::info::{get_grid_info, print_grid_info_csv, print_grid_info_human};
use snowclim::input::JobConfig;
use snowclim::log::{config_echo, show_farewell_with_timing, show_greeting, show_report};
use snowclim::output::{print_result, write_dataframe_to_parquet};
use snowclim::region::{load_stations, select_stations};
use snowclim::water_year::{WaterYearWindow, water_year};
use snowclim::process_job;
use polars::prelude::*;
use std::fs;
use std::io::Write;
use std::path::Path;
use std::time::Instant;

fn main() -> Result<()> {
    let cli = Cli::parse();
    init_logging(&cli);

    let config = match &cli.config {
        Some(path) => Some(load_config(path)?),
        None => None,
    };

    match cli.command {
        Commands::Dowy { ref dates, convention } => {
            let convention = convention
                .or(config.as_ref().map(|c| c.water_year.convention))
                .unwrap_or_default();
            handle_dowy(dates, convention, &cli.output_format)
        }
        Commands::Climatology {
            ref observations,
            ref output,
            reference_date,
            exclude_current,
            nodata,
            convention,
            min_count,
            season,
        } => {
            let args = ClimatologyArgs {
                observations: observations.clone(),
                reference_date,
                exclude_current,
                nodata,
                convention,
                min_count,
            };
            handle_climatology(args, config.as_ref(), output.as_deref(), season, &cli.output_format)
        }
        Commands::Stations {
            ref stations,
            ref bbox,
            ref polygon,
        } => {
            let path = stations
                .clone()
                .or_else(|| config.as_ref().and_then(|c| c.stations.clone()))
                .ok_or_else(|| anyhow!("No station list given"))?;
            let region = merge_region(bbox.clone(), polygon.clone(), config.as_ref()).map_err(|e| anyhow!(e))?;
            handle_stations(&path, region, &cli.output_format)
        }
        Commands::Nearest {
            ref grid,
            lon,
            lat,
            ref lon_var,
            ref lat_var,
        } => {
            let source = GridSource::new(grid, "").with_coordinate_names(lon_var, lat_var);
            handle_nearest(&source, GridCoord::new(lon, lat), &cli.output_format)
        }
        Commands::Extract {
            ref grid,
            ref variable,
            lon,
            lat,
            ref lon_var,
            ref lat_var,
            ref time_var,
            ref output,
        } => {
            let source = GridSource::new(grid, variable)
                .with_coordinate_names(lon_var, lat_var)
                .with_time_var(time_var);
            handle_extract(&source, GridCoord::new(lon, lat), output.as_deref(), &cli.output_format)
        }
        Commands::Compare {
            ref grid,
            ref variable,
            ref observations,
            lon,
            lat,
            scale,
            grid_units,
            obs_units,
            nodata,
            ref lon_var,
            ref lat_var,
            ref output,
        } => {
            let source = GridSource::new(grid, variable).with_coordinate_names(lon_var, lat_var);
            let scale = match (scale, grid_units, obs_units) {
                (Some(scale), _, _) => scale,
                (None, Some(from), Some(to)) => from.factor_to(to),
                _ => 1.0,
            };
            handle_compare(
                &source,
                observations,
                nodata,
                GridCoord::new(lon, lat),
                scale,
                output.as_deref(),
                &cli.output_format,
            )
        }
        Commands::Info {
            ref file,
            ref lon_var,
            ref lat_var,
        } => handle_info(file, lon_var, lat_var, &cli.output_format),
        Commands::Run {
            ref config_file,
            reference_date,
        } => {
            let path = config_file
                .clone()
                .or_else(|| cli.config.clone())
                .ok_or_else(|| anyhow!("No job file given: pass one or use --config"))?;
            handle_run(&path, reference_date, &cli)
        }
        Commands::Validate {
            ref config_file,
            detailed,
        } => {
            let path = config_file
                .clone()
                .or_else(|| cli.config.clone())
                .ok_or_else(|| anyhow!("No job file given: pass one or use --config"))?;
            handle_validate(&path, detailed)
        }
        Commands::Template {
            ref template_type,
            ref output,
            ref format,
        } => {
            let rendered = render_template(&generate_template(template_type), format).map_err(|e| anyhow!(e))?;
            write_or_print(output.as_deref(), rendered.as_bytes())
        }
        Commands::Completions { shell, ref output } => {
            let mut cmd = Cli::command();
            let mut buf = Vec::new();
            generate(shell, &mut cmd, "snowclim", &mut buf);
            write_or_print(output.as_deref(), &buf)
        }
    }
}

fn init_logging(cli: &Cli) {
    let level = if cli.quiet {
        "error"
    } else if cli.verbose {
        "debug"
    } else {
        "info"
    };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(level))
        .format_timestamp(None)
        .init();
}

fn load_config(path: &Path) -> Result<JobConfig> {
    debug!("Loading job file {}", path.display());
    JobConfig::from_file(path).map_err(|e| anyhow!("Failed to load job file {}: {}", path.display(), e))
}

fn write_or_print(output: Option<&Path>, bytes: &[u8]) -> Result<()> {
    match output {
        Some(path) => {
            fs::write(path, bytes).with_context(|| format!("Failed to write {}", path.display()))?;
            info!("Wrote {}", path.display());
        }
        None => std::io::stdout().write_all(bytes)?,
    }
    Ok(())
}

#[derive(Serialize)]
struct DowyRow {
    date: chrono::NaiveDate,
    water_year: i32,
    dowy: u32,
}

fn handle_dowy(
    dates: &[chrono::NaiveDate],
    convention: snowclim::WaterYearConvention,
    format: &OutputFormat,
) -> Result<()> {
    let rows: Vec<DowyRow> = dates
        .iter()
        .map(|&date| DowyRow {
            date,
            water_year: water_year(date),
            dowy: convention.dowy(date),
        })
        .collect();
    let table = df! {
        "date" => rows.iter().map(|r| r.date.to_string()).collect::<Vec<_>>(),
        "water_year" => rows.iter().map(|r| r.water_year).collect::<Vec<_>>(),
        "dowy" => rows.iter().map(|r| r.dowy).collect::<Vec<_>>(),
    }?;
    print_result(&rows, &table, format)
}

fn handle_climatology(
    args: ClimatologyArgs,
    config: Option<&JobConfig>,
    output: Option<&Path>,
    season: bool,
    format: &OutputFormat,
) -> Result<()> {
    let (source, wy) = merge_climatology_args(args, config).map_err(|e| anyhow!(e))?;
    let observations = load_observations(&source.path, source.nodata)
        .with_context(|| format!("Failed to load observations from {}", source.path.display()))?;

    let reference = wy
        .reference_date
        .or_else(|| observations.iter().filter(|o| o.value.is_some()).map(|o| o.date).max())
        .ok_or_else(|| anyhow!("No observations with data"))?;
    let options = ClimatologyOptions {
        convention: wy.convention,
        exclude_water_year: wy.exclude_current.then(|| water_year(reference)),
        min_count: wy.min_count,
    };
    let climo = Climatology::from_observations(&observations, &options)?;
    info!(
        "Climatology over {} water years, {} days ({})",
        climo.water_years().len(),
        climo.len(),
        climo.convention()
    );

    let table = climo.to_dataframe()?;
    if let Some(path) = output {
        write_dataframe_to_parquet(&table, path)?;
    }

    if season {
        let window = WaterYearWindow::current(reference);
        info!(
            "Water year {} to date: {} days elapsed",
            window.water_year,
            window.days_elapsed()
        );
        let days = climo.current_season(&observations, reference);
        print_result(&days, &season_to_dataframe(&days)?, format)
    } else {
        let stats: Vec<_> = climo.iter().cloned().collect();
        print_result(&stats, &table, format)
    }
}

fn handle_stations(path: &Path, region: Option<snowclim::region::RegionConfig>, format: &OutputFormat) -> Result<()> {
    let stations = load_stations(path).map_err(|e| anyhow!("Failed to load stations from {}: {}", path.display(), e))?;
    let selected: Vec<_> = match region {
        Some(region) => {
            let filter = region.to_filter().map_err(|e| anyhow!(e))?;
            select_stations(&stations, filter.as_ref()).into_iter().cloned().collect()
        }
        None => stations,
    };
    let table = df! {
        "id" => selected.iter().map(|s| s.id.as_str()).collect::<Vec<_>>(),
        "name" => selected.iter().map(|s| s.name.as_str()).collect::<Vec<_>>(),
        "lon" => selected.iter().map(|s| s.lon).collect::<Vec<_>>(),
        "lat" => selected.iter().map(|s| s.lat).collect::<Vec<_>>(),
        "elevation_m" => selected.iter().map(|s| s.elevation_m).collect::<Vec<_>>(),
    }?;
    print_result(&selected, &table, format)
}

fn handle_nearest(source: &GridSource, query: GridCoord, format: &OutputFormat) -> Result<()> {
    let file = netcdf::open(&source.path)
        .with_context(|| format!("Failed to open NetCDF file: {}", source.path.display()))?;
    let (coords, row_dim, col_dim) = load_coordinate_set(&file, source)?;
    let query = GridCoord::new(normalize_longitude(query.lon), query.lat);
    let cell = nearest_cell(&coords, query)?;
    let (row, col) = coords.unravel(cell.index).unwrap_or_default();

    let table = df! {
        "lon" => [cell.coord.lon],
        "lat" => [cell.coord.lat],
        row_dim.as_str() => [row as u64],
        col_dim.as_str() => [col as u64],
        "distance" => [cell.distance],
    }?;
    print_result(&cell, &table, format)
}

fn handle_extract(source: &GridSource, query: GridCoord, output: Option<&Path>, format: &OutputFormat) -> Result<()> {
    let dataset = GridDataset::open(source)
        .with_context(|| format!("Failed to open grid {}", source.path.display()))?;
    let series = dataset.series_at(query)?;
    info!(
        "Sampled {} steps at cell ({}, {})",
        series.len(),
        series.cell.coord.lon,
        series.cell.coord.lat
    );
    let table = series.to_dataframe()?;
    if let Some(path) = output {
        write_dataframe_to_parquet(&table, path)?;
    }
    print_result(&series, &table, format)
}

fn handle_compare(
    source: &GridSource,
    observations: &Path,
    nodata: Option<f64>,
    query: GridCoord,
    scale: f64,
    output: Option<&Path>,
    format: &OutputFormat,
) -> Result<()> {
    let observations = load_observations(observations, nodata)
        .with_context(|| format!("Failed to load observations from {}", observations.display()))?;
    let series = GridDataset::open(source)
        .with_context(|| format!("Failed to open grid {}", source.path.display()))?
        .series_at(query)?;
    let comparison = compare_series(&series, &observations, scale)?;

    if let Some(path) = output {
        write_dataframe_to_parquet(&comparison.to_dataframe()?, path)?;
    }
    let summary = &comparison.summary;
    let table = df! {
        "n" => [summary.n as u64],
        "bias" => [summary.bias],
        "mae" => [summary.mae],
        "rmse" => [summary.rmse],
    }?;
    print_result(summary, &table, format)
}

fn handle_info(file: &Path, lon_var: &str, lat_var: &str, format: &OutputFormat) -> Result<()> {
    let info = get_grid_info(file, lon_var, lat_var)?;
    match format {
        OutputFormat::Human => print_grid_info_human(&info),
        OutputFormat::Json => println!("{}", serde_json::to_string_pretty(&info)?),
        OutputFormat::Yaml => println!("{}", serde_yaml::to_string(&info)?),
        OutputFormat::Csv => print_grid_info_csv(&info),
    }
    Ok(())
}

fn handle_run(path: &Path, reference_date: Option<chrono::NaiveDate>, cli: &Cli) -> Result<()> {
    let start_time = Instant::now();
    let human = cli.output_format == OutputFormat::Human && !cli.quiet;

    if human {
        show_greeting(&path.display().to_string());
    }
    let mut config = load_config(path)?;
    if reference_date.is_some() {
        config.water_year.reference_date = reference_date;
    }
    if human {
        config_echo(&config);
    }

    let report = process_job(&config)?;

    match cli.output_format {
        OutputFormat::Human => {
            if !cli.quiet {
                show_report(&report);
                show_farewell_with_timing(start_time.elapsed());
            }
        }
        ref format => print_result(&report, &report.to_dataframe()?, format)?,
    }
    Ok(())
}

fn handle_validate(path: &Path, detailed: bool) -> Result<()> {
    let config = load_config(path)?;
    let problems = config.problems();

    if detailed {
        config_echo(&config);
        println!();
    }
    if problems.is_empty() {
        println!("✓ {} is valid", path.display());
        return Ok(());
    }
    for problem in &problems {
        println!("✗ {}", problem);
    }
    Err(anyhow!("{} problem(s) found in {}", problems.len(), path.display()))
}
