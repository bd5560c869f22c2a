//! The three report jobs.
//!
//! A report contributes its query catalog, its output file name and the
//! transform from raw query results to sheets. Connecting, querying, writing
//! and merging are shared and live in [`crate::pipeline`].

mod haida_gwaii;
mod kamloops;
mod nicola;

pub use haida_gwaii::HaidaGwaiiReport;
pub use kamloops::{KamloopsPmbcReport, OwnerType};
pub use nicola::NicolaCleanEnergyReport;

use chrono::NaiveDate;

use crate::aoi::AreaOfInterest;
use crate::catalog::{QueryCatalog, SqlTemplates};
use crate::config::ReportKind;
use crate::error::Result;
use crate::table::ResultTable;
use crate::writer::ReportSheet;

/// Result of one catalog query, in catalog order.
#[derive(Debug, Clone, PartialEq)]
pub struct QueryResult {
    pub name: String,
    pub table: ResultTable,
}

pub trait Report: Send + Sync {
    fn kind(&self) -> ReportKind;

    fn catalog(&self, templates: &SqlTemplates) -> Result<QueryCatalog>;

    fn output_file_name(&self, date: NaiveDate) -> String;

    /// Turns query results into sheets, in sheet order.
    fn sheets(&self, results: Vec<QueryResult>, aoi: Option<&AreaOfInterest>) -> Result<Vec<ReportSheet>>;

    fn needs_aoi(&self) -> bool {
        false
    }

    /// Whether the master index is prepended to the finished workbook.
    fn merges_index(&self) -> bool {
        false
    }

    /// Whether the session is released before the workbook is written.
    fn closes_before_export(&self) -> bool {
        false
    }
}

pub fn report_for(kind: ReportKind) -> Box<dyn Report> {
    match kind {
        ReportKind::HaidaGwaii => Box::new(HaidaGwaiiReport),
        ReportKind::NicolaCleanEnergy => Box::new(NicolaCleanEnergyReport),
        ReportKind::KamloopsPmbc => Box::new(KamloopsPmbcReport),
    }
}

/// One sheet per query, named after the query.
fn sheet_per_query(results: Vec<QueryResult>) -> Vec<ReportSheet> {
    results
        .into_iter()
        .map(|result| ReportSheet::new(result.name, result.table))
        .collect()
}
