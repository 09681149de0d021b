//! Writing result tables to parquet and rendering them for the terminal.

use crate::cli::OutputFormat;
use anyhow::{Context, Result};
use log::debug;
use polars::prelude::*;
use serde::Serialize;
use std::fs::File;
use std::path::Path;

pub fn write_dataframe_to_parquet(df: &DataFrame, output_path: &Path) -> Result<()> {
    debug!("Writing DataFrame to parquet file: {}", output_path.display());
    debug!("DataFrame shape: {:?}", df.shape());
    debug!("DataFrame schema:\n{:?}", df.schema());

    if let Some(parent) = output_path.parent()
        && !parent.as_os_str().is_empty()
    {
        std::fs::create_dir_all(parent)
            .with_context(|| format!("Failed to create directory {}", parent.display()))?;
    }

    let file = File::create(output_path)
        .with_context(|| format!("Failed to create {}", output_path.display()))?;
    let mut df = df.clone();
    ParquetWriter::new(file)
        .finish(&mut df)
        .with_context(|| format!("Failed to write parquet file {}", output_path.display()))?;

    debug!("Successfully wrote parquet file: {}", output_path.display());
    Ok(())
}

pub fn dataframe_to_csv(df: &DataFrame) -> Result<String> {
    let mut buf = Vec::new();
    let mut df = df.clone();
    CsvWriter::new(&mut buf)
        .include_header(true)
        .finish(&mut df)
        .context("Failed to render CSV")?;
    Ok(String::from_utf8(buf)?)
}

/// Renders a result as text: the table itself for human and CSV output,
/// the typed records for JSON and YAML.
pub fn render<T: Serialize + ?Sized>(
    records: &T,
    table: &DataFrame,
    format: &OutputFormat,
) -> Result<String> {
    match format {
        OutputFormat::Human => Ok(format!("{}", table)),
        OutputFormat::Json => Ok(serde_json::to_string_pretty(records)?),
        OutputFormat::Yaml => serde_yaml::to_string(records).context("Failed to serialize to YAML"),
        OutputFormat::Csv => dataframe_to_csv(table),
    }
}

pub fn print_result<T: Serialize + ?Sized>(
    records: &T,
    table: &DataFrame,
    format: &OutputFormat,
) -> Result<()> {
    println!("{}", render(records, table, format)?);
    Ok(())
}
