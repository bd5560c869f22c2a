use chrono::NaiveDate;
use strum::{AsRefStr, EnumIter, IntoEnumIterator};
use tera::Context;

use super::{QueryResult, Report, sheet_per_query};
use crate::aoi::AreaOfInterest;
use crate::catalog::{BindValue, QueryCatalog, QueryDefinition, SqlTemplates};
use crate::config::ReportKind;
use crate::error::Result;
use crate::writer::ReportSheet;

const OWNER_TYPE_BIND: &str = "owner_type";
const TEMPLATE: &str = "kamloops/pmbc_crown_parcels.sql";

/// Parcel fabric owner classes, in sheet order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, EnumIter, AsRefStr)]
pub enum OwnerType {
    #[strum(serialize = "Crown Provincial")]
    CrownProvincial,
    #[strum(serialize = "Crown Agency")]
    CrownAgency,
    #[strum(serialize = "Untitled Provincial")]
    UntitledProvincial,
    #[strum(serialize = "Federal")]
    Federal,
}

/// Crown parcels within 20 km of Kamloops and the Land Act tenures on them.
#[derive(Debug, Clone, Copy, Default)]
pub struct KamloopsPmbcReport;

impl Report for KamloopsPmbcReport {
    fn kind(&self) -> ReportKind {
        ReportKind::KamloopsPmbc
    }

    fn catalog(&self, templates: &SqlTemplates) -> Result<QueryCatalog> {
        let sql = templates.render(TEMPLATE, &Context::new())?;
        let mut catalog = QueryCatalog::new();
        for owner in OwnerType::iter() {
            let query = QueryDefinition::new(owner.as_ref(), &sql)
                .with_bind(OWNER_TYPE_BIND, BindValue::Text(owner.as_ref().to_string()));
            catalog.insert(query)?;
        }
        Ok(catalog)
    }

    fn output_file_name(&self, date: NaiveDate) -> String {
        format!("{}_kamloops_crown_pmbc_tenure_analysis.xlsx", date.format("%Y%m%d"))
    }

    fn sheets(&self, results: Vec<QueryResult>, _aoi: Option<&AreaOfInterest>) -> Result<Vec<ReportSheet>> {
        Ok(sheet_per_query(results))
    }

    fn closes_before_export(&self) -> bool {
        true
    }
}
