//! Query catalog: named, ordered SQL statements with named bind slots.
//!
//! SQL text lives in `sql/` and is rendered through tera so shared fragments
//! (the landscape-unit filter, the Crown tenure join chain) exist once. After
//! rendering, `:name` bind slots are compiled to positional `$n` placeholders.

use indexmap::IndexMap;
use once_cell::sync::Lazy;
use regex::{Captures, Regex};
use serde::Serialize;
use std::fmt;
use tera::{Context, Tera};

use crate::error::{ReportError, Result};

const TEMPLATES: &[(&str, &str)] = &[
    (
        "partials/landscape_units.sql",
        include_str!("../sql/partials/landscape_units.sql"),
    ),
    (
        "partials/tantalis_tenure_joins.sql",
        include_str!("../sql/partials/tantalis_tenure_joins.sql"),
    ),
    (
        "haida_gwaii/crown_tenures.sql",
        include_str!("../sql/haida_gwaii/crown_tenures.sql"),
    ),
    (
        "haida_gwaii/crown_reversions.sql",
        include_str!("../sql/haida_gwaii/crown_reversions.sql"),
    ),
    (
        "haida_gwaii/crown_acquisitions.sql",
        include_str!("../sql/haida_gwaii/crown_acquisitions.sql"),
    ),
    (
        "haida_gwaii/conservancy_areas.sql",
        include_str!("../sql/haida_gwaii/conservancy_areas.sql"),
    ),
    (
        "haida_gwaii/forest_managed_licences.sql",
        include_str!("../sql/haida_gwaii/forest_managed_licences.sql"),
    ),
    (
        "haida_gwaii/forest_harvest_auth.sql",
        include_str!("../sql/haida_gwaii/forest_harvest_auth.sql"),
    ),
    (
        "haida_gwaii/old_growth_deferrals.sql",
        include_str!("../sql/haida_gwaii/old_growth_deferrals.sql"),
    ),
    (
        "haida_gwaii/range_tenures.sql",
        include_str!("../sql/haida_gwaii/range_tenures.sql"),
    ),
    (
        "haida_gwaii/recreation_polygons.sql",
        include_str!("../sql/haida_gwaii/recreation_polygons.sql"),
    ),
    (
        "haida_gwaii/recreation_lines.sql",
        include_str!("../sql/haida_gwaii/recreation_lines.sql"),
    ),
    (
        "haida_gwaii/mineral_tenures.sql",
        include_str!("../sql/haida_gwaii/mineral_tenures.sql"),
    ),
    (
        "haida_gwaii/cg_mineral_claims.sql",
        include_str!("../sql/haida_gwaii/cg_mineral_claims.sql"),
    ),
    (
        "haida_gwaii/mining_permits.sql",
        include_str!("../sql/haida_gwaii/mining_permits.sql"),
    ),
    (
        "haida_gwaii/water_licences.sql",
        include_str!("../sql/haida_gwaii/water_licences.sql"),
    ),
    (
        "haida_gwaii/community_watersheds.sql",
        include_str!("../sql/haida_gwaii/community_watersheds.sql"),
    ),
    (
        "haida_gwaii/traplines.sql",
        include_str!("../sql/haida_gwaii/traplines.sql"),
    ),
    (
        "haida_gwaii/guide_outfitter_areas.sql",
        include_str!("../sql/haida_gwaii/guide_outfitter_areas.sql"),
    ),
    (
        "haida_gwaii/parks_protected_areas.sql",
        include_str!("../sql/haida_gwaii/parks_protected_areas.sql"),
    ),
    (
        "haida_gwaii/ungulate_winter_ranges.sql",
        include_str!("../sql/haida_gwaii/ungulate_winter_ranges.sql"),
    ),
    (
        "haida_gwaii/wildlife_habitat_areas.sql",
        include_str!("../sql/haida_gwaii/wildlife_habitat_areas.sql"),
    ),
    (
        "haida_gwaii/legal_ogmas.sql",
        include_str!("../sql/haida_gwaii/legal_ogmas.sql"),
    ),
    (
        "haida_gwaii/alr.sql",
        include_str!("../sql/haida_gwaii/alr.sql"),
    ),
    (
        "haida_gwaii/archaeology_sites.sql",
        include_str!("../sql/haida_gwaii/archaeology_sites.sql"),
    ),
    (
        "nicola/clean_energy.sql",
        include_str!("../sql/nicola/clean_energy.sql"),
    ),
    (
        "kamloops/pmbc_crown_parcels.sql",
        include_str!("../sql/kamloops/pmbc_crown_parcels.sql"),
    ),
];

/// Literals, quoted identifiers, comments and `::` casts match first and are
/// copied through; only the last alternative captures a bind slot.
static BIND_SLOT: Lazy<Regex> = Lazy::new(|| {
    Regex::new(
        r#"'(?:[^']|'')*'|"(?:[^"]|"")*"|--[^\n]*|(?s:/\*.*?\*/)|::|:([A-Za-z_][A-Za-z0-9_]*)"#,
    )
    .expect("bind slot pattern")
});

/// A value supplied for a named bind slot.
#[derive(Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum BindValue {
    Bytes(Vec<u8>),
    Int(i32),
    Text(String),
}

impl fmt::Debug for BindValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BindValue::Bytes(bytes) => write!(f, "Bytes(<{} bytes>)", bytes.len()),
            BindValue::Int(value) => write!(f, "Int({value})"),
            BindValue::Text(value) => write!(f, "Text({value:?})"),
        }
    }
}

/// Named bind values, e.g. the area-of-interest geometry and its SRID.
pub type BindSet = IndexMap<String, BindValue>;

/// One catalog entry, immutable once built.
#[derive(Debug, Clone, PartialEq)]
pub struct QueryDefinition {
    name: String,
    sql: String,
    bind_names: Vec<String>,
    binds: BindSet,
}

impl QueryDefinition {
    /// Compiles `:name` slots in `sql` into `$n` placeholders.
    pub fn new(name: impl Into<String>, sql: &str) -> Self {
        let (sql, bind_names) = compile_bind_slots(sql);
        Self {
            name: name.into(),
            sql,
            bind_names,
            binds: BindSet::new(),
        }
    }

    /// Attaches a value that belongs to this query alone.
    pub fn with_bind(mut self, name: impl Into<String>, value: BindValue) -> Self {
        self.binds.insert(name.into(), value);
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn sql(&self) -> &str {
        &self.sql
    }

    /// Slot names in placeholder order: `bind_names()[0]` is `$1`.
    pub fn bind_names(&self) -> &[String] {
        &self.bind_names
    }

    /// Resolves positional values, preferring the query's own binds over run-wide ones.
    pub fn resolve_binds<'a>(&'a self, shared: &'a BindSet) -> Result<Vec<&'a BindValue>> {
        self.bind_names
            .iter()
            .map(|bind| {
                self.binds
                    .get(bind)
                    .or_else(|| shared.get(bind))
                    .ok_or_else(|| ReportError::MissingBind {
                        query: self.name.clone(),
                        bind: bind.clone(),
                    })
            })
            .collect()
    }
}

fn compile_bind_slots(sql: &str) -> (String, Vec<String>) {
    let mut names: Vec<String> = Vec::new();
    let compiled = BIND_SLOT.replace_all(sql, |caps: &Captures<'_>| {
        let Some(name) = caps.get(1).map(|slot| slot.as_str()) else {
            return caps[0].to_string();
        };
        let position = match names.iter().position(|existing| existing == name) {
            Some(index) => index + 1,
            None => {
                names.push(name.to_string());
                names.len()
            }
        };
        format!("${position}")
    });
    (compiled.into_owned(), names)
}

/// Ordered, uniquely named query definitions for one report run.
#[derive(Debug, Clone, Default)]
pub struct QueryCatalog {
    queries: IndexMap<String, QueryDefinition>,
}

impl QueryCatalog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, query: QueryDefinition) -> Result<()> {
        if self.queries.contains_key(query.name()) {
            return Err(ReportError::Config(format!(
                "query '{}' is defined twice",
                query.name()
            )));
        }
        self.queries.insert(query.name().to_string(), query);
        Ok(())
    }

    pub fn get(&self, name: &str) -> Option<&QueryDefinition> {
        self.queries.get(name)
    }

    pub fn len(&self) -> usize {
        self.queries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.queries.is_empty()
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.queries.keys().map(String::as_str)
    }

    /// Definitions in insertion order.
    pub fn iter(&self) -> impl Iterator<Item = &QueryDefinition> {
        self.queries.values()
    }
}

/// Embedded SQL templates.
pub struct SqlTemplates {
    tera: Tera,
}

impl SqlTemplates {
    pub fn load() -> Result<Self> {
        let mut tera = Tera::default();
        tera.add_raw_templates(TEMPLATES.iter().copied())
            .map_err(|error| ReportError::Template {
                template: "sql/".to_string(),
                message: render_chain(&error),
            })?;
        Ok(Self { tera })
    }

    pub fn render(&self, template: &str, context: &Context) -> Result<String> {
        self.tera
            .render(template, context)
            .map_err(|error| ReportError::Template {
                template: template.to_string(),
                message: render_chain(&error),
            })
    }

    /// Renders a template and compiles it into a named definition.
    pub fn definition(
        &self,
        name: &str,
        template: &str,
        context: &Context,
    ) -> Result<QueryDefinition> {
        let sql = self.render(template, context)?;
        Ok(QueryDefinition::new(name, &sql))
    }
}

fn render_chain(error: &tera::Error) -> String {
    let mut message = error.to_string();
    let mut source = std::error::Error::source(error);
    while let Some(cause) = source {
        message.push_str(": ");
        message.push_str(&cause.to_string());
        source = cause.source();
    }
    message
}
