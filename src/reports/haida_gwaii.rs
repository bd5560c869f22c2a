use chrono::NaiveDate;
use tera::Context;

use super::{QueryResult, Report, sheet_per_query};
use crate::aoi::AreaOfInterest;
use crate::catalog::{QueryCatalog, SqlTemplates};
use crate::config::ReportKind;
use crate::error::Result;
use crate::writer::ReportSheet;

/// Sheet name, template, and the `scope` of the shared Crown tenure query.
const QUERIES: [(&str, &str, Option<&str>); 25] = [
    ("1-Crown Land Tenures", "haida_gwaii/crown_tenures.sql", Some("tenures")),
    ("2-Crown Reserves-Notations", "haida_gwaii/crown_tenures.sql", Some("reserves")),
    ("3-Crown Reversions", "haida_gwaii/crown_reversions.sql", None),
    ("4-Crown Acquisitions", "haida_gwaii/crown_acquisitions.sql", None),
    ("5-Transfers Admin-Control", "haida_gwaii/crown_tenures.sql", Some("transfers")),
    ("6-Conservancy Areas", "haida_gwaii/conservancy_areas.sql", None),
    ("7-Forest Managed Licences", "haida_gwaii/forest_managed_licences.sql", None),
    ("8-Forest Harvest Auth", "haida_gwaii/forest_harvest_auth.sql", None),
    ("9-Old Growth Deferrals", "haida_gwaii/old_growth_deferrals.sql", None),
    ("10-Range Tenures", "haida_gwaii/range_tenures.sql", None),
    ("11-Recreation Polygons", "haida_gwaii/recreation_polygons.sql", None),
    ("12-Recreation Lines", "haida_gwaii/recreation_lines.sql", None),
    ("13-Mineral Tenures", "haida_gwaii/mineral_tenures.sql", None),
    ("14-CG Mineral Claims", "haida_gwaii/cg_mineral_claims.sql", None),
    ("15-Mining Permits", "haida_gwaii/mining_permits.sql", None),
    ("16-Water Licences", "haida_gwaii/water_licences.sql", None),
    ("17-Community Watersheds", "haida_gwaii/community_watersheds.sql", None),
    ("18-Traplines", "haida_gwaii/traplines.sql", None),
    ("19-Guide Outfitter Areas", "haida_gwaii/guide_outfitter_areas.sql", None),
    ("20-Parks-Protected Areas", "haida_gwaii/parks_protected_areas.sql", None),
    ("21-Ungulate Winter Ranges", "haida_gwaii/ungulate_winter_ranges.sql", None),
    ("22-Wildlife Habitat Areas", "haida_gwaii/wildlife_habitat_areas.sql", None),
    ("23-Legal OGMAs", "haida_gwaii/legal_ogmas.sql", None),
    ("24-ALR", "haida_gwaii/alr.sql", None),
    ("25-Archaeology Sites", "haida_gwaii/archaeology_sites.sql", None),
];

/// Interests on Haida Gwaii, filtered to its landscape units.
#[derive(Debug, Clone, Copy, Default)]
pub struct HaidaGwaiiReport;

impl Report for HaidaGwaiiReport {
    fn kind(&self) -> ReportKind {
        ReportKind::HaidaGwaii
    }

    fn catalog(&self, templates: &SqlTemplates) -> Result<QueryCatalog> {
        let mut catalog = QueryCatalog::new();
        for (name, template, scope) in QUERIES {
            let mut context = Context::new();
            if let Some(scope) = scope {
                context.insert("scope", scope);
            }
            catalog.insert(templates.definition(name, template, &context)?)?;
        }
        Ok(catalog)
    }

    fn output_file_name(&self, date: NaiveDate) -> String {
        format!("{}_Haida_Gwaii_Interests_Report.xlsx", date.format("%Y-%m-%d"))
    }

    fn sheets(&self, results: Vec<QueryResult>, _aoi: Option<&AreaOfInterest>) -> Result<Vec<ReportSheet>> {
        Ok(sheet_per_query(results))
    }

    fn merges_index(&self) -> bool {
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn catalog_keeps_the_numbered_order() {
        let templates = SqlTemplates::load().unwrap();
        let catalog = HaidaGwaiiReport.catalog(&templates).unwrap();
        let names: Vec<&str> = catalog.names().collect();
        assert_eq!(names.len(), 25);
        assert_eq!(names[0], "1-Crown Land Tenures");
        assert_eq!(names[4], "5-Transfers Admin-Control");
        assert_eq!(names[24], "25-Archaeology Sites");
        for (position, name) in names.iter().enumerate() {
            assert!(name.starts_with(&format!("{}-", position + 1)));
        }
    }

    #[test]
    fn crown_scopes_render_different_filters() {
        let templates = SqlTemplates::load().unwrap();
        let catalog = HaidaGwaiiReport.catalog(&templates).unwrap();
        let tenures = catalog.get("1-Crown Land Tenures").unwrap().sql();
        let reserves = catalog.get("2-Crown Reserves-Notations").unwrap().sql();
        let transfers = catalog.get("5-Transfers Admin-Control").unwrap().sql();
        assert_ne!(tenures, reserves);
        assert_ne!(reserves, transfers);
        assert!(catalog.iter().all(|query| query.bind_names().is_empty()));
    }

    #[test]
    fn file_name_carries_the_dashed_date() {
        let date = NaiveDate::from_ymd_opt(2026, 1, 27).unwrap();
        assert_eq!(
            HaidaGwaiiReport.output_file_name(date),
            "2026-01-27_Haida_Gwaii_Interests_Report.xlsx"
        );
    }
}
