use chrono::NaiveDate;
use tera::Context;

use super::{QueryResult, Report};
use crate::aoi::AreaOfInterest;
use crate::catalog::{QueryCatalog, SqlTemplates};
use crate::config::ReportKind;
use crate::error::{ReportError, Result};
use crate::transform::{aggregate_unique_files, drop_geometry};
use crate::writer::ReportSheet;

pub const CLEAN_ENERGY_QUERY: &str = "clean_energy";
pub const FULL_LIST_SHEET: &str = "query_results_full_list";
pub const AGGREGATE_SHEET: &str = "aggregate_unique_files";

/// Power-purpose Crown tenures intersecting the Nicola watershed.
#[derive(Debug, Clone, Copy, Default)]
pub struct NicolaCleanEnergyReport;

impl Report for NicolaCleanEnergyReport {
    fn kind(&self) -> ReportKind {
        ReportKind::NicolaCleanEnergy
    }

    fn catalog(&self, templates: &SqlTemplates) -> Result<QueryCatalog> {
        let mut catalog = QueryCatalog::new();
        catalog.insert(templates.definition(
            CLEAN_ENERGY_QUERY,
            "nicola/clean_energy.sql",
            &Context::new(),
        )?)?;
        Ok(catalog)
    }

    fn output_file_name(&self, date: NaiveDate) -> String {
        format!("{}_clean_energy_tenures_nicolaWSHD.xlsx", date.format("%Y%m%d"))
    }

    fn sheets(&self, results: Vec<QueryResult>, aoi: Option<&AreaOfInterest>) -> Result<Vec<ReportSheet>> {
        let aoi = aoi.ok_or_else(|| {
            ReportError::Config("the clean energy report needs an area of interest".to_string())
        })?;
        let result = results
            .into_iter()
            .find(|result| result.name == CLEAN_ENERGY_QUERY)
            .ok_or_else(|| ReportError::query(CLEAN_ENERGY_QUERY, "no result returned"))?;

        let full_list = drop_geometry(result.table)?;
        tracing::info!(
            rows = full_list.row_count(),
            watershed_ha = aoi.area_ha(),
            "aggregating results"
        );
        let aggregate = aggregate_unique_files(&full_list, aoi.area_m2())?;
        Ok(vec![
            ReportSheet::new(FULL_LIST_SHEET, full_list),
            ReportSheet::new(AGGREGATE_SHEET, aggregate),
        ])
    }

    fn needs_aoi(&self) -> bool {
        true
    }
}
