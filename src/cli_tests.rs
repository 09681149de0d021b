//! # CLI Parsing Tests
//!
//! Argument parsing for every subcommand, including negative coordinates,
//! region arguments and conflicting flags.

#[cfg(test)]
mod tests {
    use chrono::NaiveDate;
    use clap::Parser;
    use std::path::PathBuf;

    use crate::cli::{Cli, Commands, ConfigFormat, OutputFormat, TemplateType};
    use crate::compare::LengthUnit;
    use crate::region::RegionFilter;
    use crate::water_year::WaterYearConvention;

    #[test]
    fn test_cli_help() {
        let result = Cli::try_parse_from(["snowclim", "--help"]);
        assert!(result.is_err());

        let error = result.unwrap_err();
        assert!(error.to_string().contains("day-of-water-year"));
    }

    #[test]
    fn test_cli_version() {
        let result = Cli::try_parse_from(["snowclim", "--version"]);
        assert!(result.is_err());
    }

    #[test]
    fn test_cli_global_flags() {
        let cli = Cli::parse_from([
            "snowclim",
            "--verbose",
            "--output-format",
            "json",
            "--config",
            "/path/to/job.yaml",
            "template",
            "basic",
        ]);

        assert!(cli.verbose);
        assert_eq!(cli.output_format, OutputFormat::Json);
        assert_eq!(cli.config, Some(PathBuf::from("/path/to/job.yaml")));
    }

    #[test]
    fn test_verbose_and_quiet_conflict() {
        let result = Cli::try_parse_from(["snowclim", "-v", "-q", "dowy", "2021-01-01"]);
        assert!(result.is_err());
    }

    #[test]
    fn test_dowy_command() {
        let cli = Cli::parse_from([
            "snowclim",
            "dowy",
            "2020-10-01",
            "2021-01-01",
            "--convention",
            "fixed-offset",
        ]);

        if let Commands::Dowy { dates, convention } = &cli.command {
            assert_eq!(dates.len(), 2);
            assert_eq!(dates[1], NaiveDate::from_ymd_opt(2021, 1, 1).unwrap());
            assert_eq!(*convention, Some(WaterYearConvention::FixedOffset));
        } else {
            panic!("Expected Dowy command");
        }
    }

    #[test]
    fn test_dowy_requires_valid_dates() {
        assert!(Cli::try_parse_from(["snowclim", "dowy"]).is_err());
        assert!(Cli::try_parse_from(["snowclim", "dowy", "2021-13-01"]).is_err());
    }

    #[test]
    fn test_climatology_command() {
        let cli = Cli::parse_from([
            "snowclim",
            "climatology",
            "-i",
            "obs.parquet",
            "-o",
            "climo.parquet",
            "--nodata",
            "-99.9",
            "--reference-date",
            "2023-03-15",
            "--exclude-current",
            "--min-count",
            "3",
            "--season",
        ]);

        if let Commands::Climatology {
            observations,
            output,
            reference_date,
            exclude_current,
            nodata,
            min_count,
            season,
            ..
        } = &cli.command
        {
            assert_eq!(observations, &Some(PathBuf::from("obs.parquet")));
            assert_eq!(output, &Some(PathBuf::from("climo.parquet")));
            assert_eq!(*reference_date, NaiveDate::from_ymd_opt(2023, 3, 15));
            assert!(*exclude_current);
            assert_eq!(*nodata, Some(-99.9));
            assert_eq!(*min_count, Some(3));
            assert!(*season);
        } else {
            panic!("Expected Climatology command");
        }
    }

    #[test]
    fn test_stations_command_bbox() {
        let cli = Cli::parse_from(["snowclim", "stations", "stations.json", "--bbox", "-106.5,39,-105,41"]);

        if let Commands::Stations { stations, bbox, polygon } = &cli.command {
            assert_eq!(stations, &Some(PathBuf::from("stations.json")));
            let bbox = bbox.as_ref().unwrap();
            assert_eq!(bbox.min_lon, -106.5);
            assert!(bbox.contains(-105.5, 40.0));
            assert!(polygon.is_none());
        } else {
            panic!("Expected Stations command");
        }
    }

    #[test]
    fn test_stations_command_polygon() {
        let cli = Cli::parse_from([
            "snowclim",
            "stations",
            "stations.yaml",
            "--polygon",
            "-106 39; -105 39; -105 40",
        ]);

        if let Commands::Stations { polygon, .. } = &cli.command {
            assert_eq!(polygon.as_ref().unwrap().vertices.len(), 3);
        } else {
            panic!("Expected Stations command");
        }
    }

    #[test]
    fn test_stations_region_conflict_and_validation() {
        assert!(
            Cli::try_parse_from([
                "snowclim",
                "stations",
                "s.json",
                "--bbox",
                "-106,39,-105,40",
                "--polygon",
                "0 0; 1 0; 1 1",
            ])
            .is_err()
        );
        assert!(Cli::try_parse_from(["snowclim", "stations", "s.json", "--bbox", "-105,39,-106,40"]).is_err());
    }

    #[test]
    fn test_nearest_command_negative_coordinates() {
        let cli = Cli::parse_from([
            "snowclim",
            "nearest",
            "swe.nc",
            "--lon",
            "-105.65",
            "--lat",
            "40.35",
            "--lon-var",
            "XLONG",
        ]);

        if let Commands::Nearest { grid, lon, lat, lon_var, lat_var } = &cli.command {
            assert_eq!(grid, &PathBuf::from("swe.nc"));
            assert_eq!(*lon, -105.65);
            assert_eq!(*lat, 40.35);
            assert_eq!(lon_var, "XLONG");
            assert_eq!(lat_var, "lat");
        } else {
            panic!("Expected Nearest command");
        }
    }

    #[test]
    fn test_extract_command() {
        let cli = Cli::parse_from([
            "snowclim",
            "extract",
            "swe.nc",
            "-n",
            "SWE",
            "--lon=-105.65",
            "--lat=40.35",
            "-o",
            "series.parquet",
        ]);

        if let Commands::Extract { variable, time_var, output, .. } = &cli.command {
            assert_eq!(variable, "SWE");
            assert_eq!(time_var, "time");
            assert_eq!(output, &Some(PathBuf::from("series.parquet")));
        } else {
            panic!("Expected Extract command");
        }
    }

    #[test]
    fn test_compare_command_units() {
        let cli = Cli::parse_from([
            "snowclim",
            "compare",
            "swe.nc",
            "-n",
            "SWE",
            "-i",
            "obs.json",
            "--lon=-105.65",
            "--lat=40.35",
            "--grid-units",
            "m",
            "--obs-units",
            "in",
        ]);

        if let Commands::Compare { grid_units, obs_units, scale, .. } = &cli.command {
            assert_eq!(*grid_units, Some(LengthUnit::M));
            assert_eq!(*obs_units, Some(LengthUnit::In));
            assert!(scale.is_none());
        } else {
            panic!("Expected Compare command");
        }
    }

    #[test]
    fn test_compare_scale_conflicts_with_units() {
        let result = Cli::try_parse_from([
            "snowclim",
            "compare",
            "swe.nc",
            "-n",
            "SWE",
            "-i",
            "obs.json",
            "--lon=-105.65",
            "--lat=40.35",
            "--scale",
            "39.37",
            "--grid-units",
            "m",
            "--obs-units",
            "in",
        ]);
        assert!(result.is_err());

        // Units must come in pairs
        let result = Cli::try_parse_from([
            "snowclim",
            "compare",
            "swe.nc",
            "-n",
            "SWE",
            "-i",
            "obs.json",
            "--lon=-105.65",
            "--lat=40.35",
            "--grid-units",
            "m",
        ]);
        assert!(result.is_err());
    }

    #[test]
    fn test_run_and_validate_commands() {
        let cli = Cli::parse_from(["snowclim", "run", "job.yaml", "--reference-date", "2023-03-15"]);
        if let Commands::Run { config_file, reference_date } = &cli.command {
            assert_eq!(config_file, &Some(PathBuf::from("job.yaml")));
            assert_eq!(*reference_date, NaiveDate::from_ymd_opt(2023, 3, 15));
        } else {
            panic!("Expected Run command");
        }

        let cli = Cli::parse_from(["snowclim", "validate", "job.json", "--detailed"]);
        if let Commands::Validate { config_file, detailed } = &cli.command {
            assert_eq!(config_file, &Some(PathBuf::from("job.json")));
            assert!(*detailed);
        } else {
            panic!("Expected Validate command");
        }
    }

    #[test]
    fn test_template_command() {
        let cli = Cli::parse_from(["snowclim", "template", "comparison", "--format", "yaml", "-o", "job.yaml"]);

        if let Commands::Template { template_type, output, format } = &cli.command {
            assert_eq!(*template_type, TemplateType::Comparison);
            assert_eq!(*format, ConfigFormat::Yaml);
            assert_eq!(output, &Some(PathBuf::from("job.yaml")));
        } else {
            panic!("Expected Template command");
        }
    }

    #[test]
    fn test_completions_command() {
        let cli = Cli::parse_from(["snowclim", "completions", "bash"]);
        assert!(matches!(cli.command, Commands::Completions { .. }));
    }

    #[test]
    fn test_invalid_subcommand() {
        assert!(Cli::try_parse_from(["snowclim", "convert", "in.nc"]).is_err());
    }
}
