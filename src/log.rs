use crate::JobReport;
use crate::input::JobConfig;
use std::time::Duration;

pub fn show_greeting(config_path: &str) {
    println!("=== snowclim: water-year snow climatology ===");
    println!("Loading configuration from: {}", config_path);
}

pub fn config_echo(config: &JobConfig) {
    println!("\nConfiguration:");
    println!("  Convention: {}", config.water_year.convention);
    match config.water_year.reference_date {
        Some(date) => println!("  Reference date: {}", date),
        None => println!("  Reference date: last observation"),
    }
    if let Some(obs) = &config.observations {
        println!("  Observations: {}", obs.path.display());
    }
    if let Some(stations) = &config.stations {
        println!("  Stations: {}", stations.display());
    }
    if let Some(region) = &config.region {
        println!("  Region: {}", region.kind());
    }
    if let Some(grid) = &config.grid {
        println!("  Grid: {} ({})", grid.source.path.display(), grid.source.variable);
    }
    if let Some(point) = &config.point {
        println!("  Point: ({}, {})", point.lon, point.lat);
    }
}

pub fn show_report(report: &JobReport) {
    println!("\nResults:");
    if let Some(wy) = report.water_year {
        println!("  Water year {} through {}", wy, report.reference_date.map(|d| d.to_string()).unwrap_or_default());
    }
    println!("  Climatology days: {}", report.climatology_days);
    println!("  Current season days: {}", report.season_days);
    if !report.selected_stations.is_empty() {
        println!("  Stations in region: {}", report.selected_stations.join(", "));
    }
    println!("  Grid series extracted: {}", report.series_extracted);
    if let Some(summary) = &report.comparison {
        println!(
            "  Grid vs observed: n={} bias={:.3} mae={:.3} rmse={:.3}",
            summary.n, summary.bias, summary.mae, summary.rmse
        );
    }
}

pub fn show_farewell_with_timing(elapsed: Duration) {
    println!("\n=== Run completed in {:.2?} ===", elapsed);
}
