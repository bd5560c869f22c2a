//! One report run, top to bottom: catalog, queries, transforms, workbook,
//! index. Queries run strictly one after another on a single session.

use std::path::PathBuf;
use std::time::{Duration, Instant};

use anyhow::{Context, Result};
use serde::Serialize;
use tracing::Instrument;

use crate::aoi::AreaOfInterest;
use crate::catalog::{BindSet, QueryCatalog, SqlTemplates};
use crate::config::ReportConfig;
use crate::gateway::QueryExecutor;
use crate::logging::{query_span, report_span};
use crate::merge::prepend_index;
use crate::reports::{QueryResult, Report, report_for};
use crate::writer::ReportWriter;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SheetSummary {
    pub name: String,
    pub rows: usize,
}

/// What a finished run produced.
#[derive(Debug, Clone, Serialize)]
pub struct RunSummary {
    pub output: PathBuf,
    pub sheets: Vec<SheetSummary>,
    pub index_merged: bool,
    pub elapsed: Duration,
}

/// Runs the configured report against `executor`, then closes it.
pub async fn run(config: &ReportConfig, executor: &mut dyn QueryExecutor) -> Result<RunSummary> {
    let report = report_for(config.report);
    let span = report_span(&config.report.to_string());
    run_report(config, report.as_ref(), executor)
        .instrument(span)
        .await
}

pub async fn run_report(
    config: &ReportConfig,
    report: &dyn Report,
    executor: &mut dyn QueryExecutor,
) -> Result<RunSummary> {
    let started = Instant::now();
    config.ensure_output_dir()?;

    let templates = SqlTemplates::load()?;
    let catalog = report.catalog(&templates)?;

    let aoi = if report.needs_aoi() {
        let path = config
            .aoi_path
            .as_deref()
            .context("no area of interest configured")?;
        tracing::info!(path = %path.display(), "reading the area of interest");
        Some(
            AreaOfInterest::load(path, config.srid)
                .with_context(|| format!("failed to load area of interest {:?}", path))?,
        )
    } else {
        None
    };
    let shared = aoi.as_ref().map(AreaOfInterest::binds).unwrap_or_default();

    let results = match execute_catalog(&catalog, &shared, executor).await {
        Ok(results) => results,
        Err(error) => {
            if let Err(close_error) = executor.close().await {
                tracing::warn!(error = %close_error, "failed to close the connection");
            }
            return Err(error);
        }
    };

    if report.closes_before_export() {
        executor.close().await?;
    }

    let sheets = report.sheets(results, aoi.as_ref())?;
    let output = config.resolve_output(report.output_file_name(config.report_date));
    tracing::info!(path = %output.display(), sheets = sheets.len(), "exporting report");

    let writer = ReportWriter::new(config.writer_options());
    let (mut workbook, layouts) = writer.build(&sheets)?;
    let index_merged = if report.merges_index() {
        prepend_index(&mut workbook, &config.index_path)?
    } else {
        false
    };
    workbook
        .save(&output)
        .with_context(|| format!("failed to write report {:?}", output))?;

    executor.close().await?;

    let elapsed = started.elapsed();
    let seconds = elapsed.as_secs_f64().round() as u64;
    tracing::info!(
        minutes = seconds / 60,
        seconds = seconds % 60,
        "Processing Completed in {} minutes and {} seconds",
        seconds / 60,
        seconds % 60
    );

    Ok(RunSummary {
        output,
        sheets: layouts
            .into_iter()
            .zip(&sheets)
            .map(|(layout, sheet)| SheetSummary {
                name: layout.sheet_name,
                rows: sheet.table.row_count(),
            })
            .collect(),
        index_merged,
        elapsed,
    })
}

async fn execute_catalog(
    catalog: &QueryCatalog,
    shared: &BindSet,
    executor: &mut dyn QueryExecutor,
) -> Result<Vec<QueryResult>> {
    let total = catalog.len();
    let mut results = Vec::with_capacity(total);
    for (index, query) in catalog.iter().enumerate() {
        let position = index + 1;
        tracing::info!("working on: query {} of {}: {}", position, total, query.name());
        let binds = query.resolve_binds(shared)?;
        let table = executor
            .fetch(query, &binds)
            .instrument(query_span(query.name(), position, total))
            .await?;
        tracing::info!(query = query.name(), records = table.row_count(), "records returned");
        results.push(QueryResult {
            name: query.name().to_string(),
            table,
        });
    }
    Ok(results)
}
