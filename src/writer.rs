//! Report workbook writer.
//!
//! Every result table becomes one sheet. A table with rows is wrapped in a
//! worksheet table whose footer shows "Total" under the first column and a
//! SUBTOTAL sum under the last. A table without rows keeps its header row
//! and gets a bold placeholder line instead of a table.

use std::collections::{HashMap, HashSet};
use std::path::Path;

use rust_xlsxwriter::{Table, TableColumn, TableFunction, Workbook, Worksheet};
use serde::Serialize;

use crate::error::{ReportError, Result};
use crate::styles::{DATE_FORMAT, DATETIME_FORMAT, header_format, placeholder_format};
use crate::table::{CellValue, ResultTable};

pub const MAX_SHEET_NAME_LEN: usize = 31;
pub const EMPTY_RESULT_MESSAGE: &str = "No records returned for this query";
pub const TOTAL_LABEL: &str = "Total";
pub const DEFAULT_COLUMN_WIDTH: f64 = 20.0;

/// A result table paired with the name of the sheet it lands on.
#[derive(Debug, Clone, PartialEq)]
pub struct ReportSheet {
    pub name: String,
    pub table: ResultTable,
}

impl ReportSheet {
    pub fn new(name: impl Into<String>, table: ResultTable) -> Self {
        Self {
            name: name.into(),
            table,
        }
    }
}

/// Cuts a sheet name down to the longest name the format allows.
pub fn truncate_sheet_name(name: &str) -> String {
    name.chars().take(MAX_SHEET_NAME_LEN).collect()
}

/// Truncates every name and rejects pairs that end up equal, ignoring case.
pub fn resolve_sheet_names<S: AsRef<str>>(names: &[S]) -> Result<Vec<String>> {
    let mut seen: HashMap<String, &str> = HashMap::new();
    let mut resolved = Vec::with_capacity(names.len());
    for name in names {
        let name = name.as_ref();
        let sheet = truncate_sheet_name(name);
        if sheet.trim().is_empty() {
            return Err(ReportError::Workbook(format!(
                "sheet name for '{name}' is empty"
            )));
        }
        if let Some(first) = seen.insert(sheet.to_lowercase(), name) {
            return Err(ReportError::SheetNameConflict {
                first: first.to_string(),
                second: name.to_string(),
                sheet,
            });
        }
        resolved.push(sheet);
    }
    Ok(resolved)
}

/// Makes header labels unique by suffixing repeats with `.1`, `.2`, ...
fn unique_headers(columns: &[String]) -> Vec<String> {
    let mut taken: HashSet<String> = HashSet::new();
    columns
        .iter()
        .map(|column| {
            let mut candidate = column.clone();
            let mut suffix = 0;
            while !taken.insert(candidate.to_lowercase()) {
                suffix += 1;
                candidate = format!("{column}.{suffix}");
            }
            candidate
        })
        .collect()
}

/// Zero-based inclusive cell range.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct CellRange {
    pub first_row: u32,
    pub first_col: u16,
    pub last_row: u32,
    pub last_col: u16,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TotalsFooter {
    pub row: u32,
    pub label: String,
    /// Column carrying the sum; absent for single-column tables
    pub sum_column: Option<u16>,
    pub sum: f64,
}

/// What one sheet will look like, computed before anything is rendered.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SheetLayout {
    pub sheet_name: String,
    pub headers: Vec<String>,
    /// Display numbers of the data rows, starting at 1
    pub row_numbers: Vec<u32>,
    pub table_range: Option<CellRange>,
    pub footer: Option<TotalsFooter>,
    pub placeholder: Option<String>,
}

impl SheetLayout {
    pub fn plan(sheet_name: impl Into<String>, table: &ResultTable) -> Self {
        let headers = unique_headers(table.columns());
        let rows = table.row_count() as u32;
        let row_numbers = (1..=rows).collect();

        if table.is_empty() || table.column_count() == 0 {
            return Self {
                sheet_name: sheet_name.into(),
                headers,
                row_numbers,
                table_range: None,
                footer: None,
                placeholder: Some(EMPTY_RESULT_MESSAGE.to_string()),
            };
        }

        let last_col = (table.column_count() - 1) as u16;
        let footer_row = rows + 1;
        let sum_column = (last_col > 0).then_some(last_col);
        let sum = sum_column
            .map(|col| table.sheet_sum(col as usize))
            .unwrap_or_default();

        Self {
            sheet_name: sheet_name.into(),
            headers,
            row_numbers,
            table_range: Some(CellRange {
                first_row: 0,
                first_col: 0,
                last_row: footer_row,
                last_col,
            }),
            footer: Some(TotalsFooter {
                row: footer_row,
                label: TOTAL_LABEL.to_string(),
                sum_column,
                sum,
            }),
            placeholder: None,
        }
    }
}

#[derive(Debug, Clone)]
pub struct WriterOptions {
    pub column_width: f64,
}

impl Default for WriterOptions {
    fn default() -> Self {
        Self {
            column_width: DEFAULT_COLUMN_WIDTH,
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct ReportWriter {
    options: WriterOptions,
}

impl ReportWriter {
    pub fn new(options: WriterOptions) -> Self {
        Self { options }
    }

    /// Validates the sheet names and lays out every sheet.
    pub fn plan(&self, sheets: &[ReportSheet]) -> Result<Vec<SheetLayout>> {
        let names: Vec<&str> = sheets.iter().map(|sheet| sheet.name.as_str()).collect();
        let resolved = resolve_sheet_names(&names)?;
        Ok(sheets
            .iter()
            .zip(resolved)
            .map(|(sheet, name)| SheetLayout::plan(name, &sheet.table))
            .collect())
    }

    /// Renders the sheets, in order, into an unsaved workbook.
    pub fn build(&self, sheets: &[ReportSheet]) -> Result<(Workbook, Vec<SheetLayout>)> {
        let layouts = self.plan(sheets)?;
        let mut workbook = Workbook::new();
        for (sheet, layout) in sheets.iter().zip(&layouts) {
            let worksheet = workbook.add_worksheet();
            self.render(worksheet, &sheet.table, layout)?;
            tracing::debug!(
                sheet = %layout.sheet_name,
                rows = sheet.table.row_count(),
                columns = sheet.table.column_count(),
                "sheet rendered"
            );
        }
        Ok((workbook, layouts))
    }

    pub fn write(&self, sheets: &[ReportSheet], path: &Path) -> Result<Vec<SheetLayout>> {
        let (mut workbook, layouts) = self.build(sheets)?;
        workbook.save(path)?;
        Ok(layouts)
    }

    fn render(&self, worksheet: &mut Worksheet, table: &ResultTable, layout: &SheetLayout) -> Result<()> {
        worksheet.set_name(&layout.sheet_name)?;
        for col in 0..table.column_count() {
            worksheet.set_column_width(col as u16, self.options.column_width)?;
        }

        let (Some(range), Some(footer)) = (layout.table_range, layout.footer.as_ref()) else {
            let header = header_format();
            for (col, label) in layout.headers.iter().enumerate() {
                worksheet.write_string_with_format(0, col as u16, label, &header)?;
            }
            if let Some(message) = &layout.placeholder {
                worksheet.write_string_with_format(1, 0, message, &placeholder_format())?;
            }
            return Ok(());
        };

        write_rows(worksheet, table)?;

        let columns: Vec<TableColumn> = layout
            .headers
            .iter()
            .enumerate()
            .map(|(col, header)| {
                let column = TableColumn::new().set_header(header);
                if col == 0 {
                    column.set_total_label(&footer.label)
                } else if Some(col as u16) == footer.sum_column {
                    column.set_total_function(TableFunction::Sum)
                } else {
                    column
                }
            })
            .collect();
        let excel_table = Table::new().set_columns(&columns).set_total_row(true);
        worksheet.add_table(
            range.first_row,
            range.first_col,
            range.last_row,
            range.last_col,
            &excel_table,
        )?;

        if let Some(col) = footer.sum_column {
            worksheet.set_formula_result(footer.row, col, footer.sum.to_string());
        }
        Ok(())
    }
}

fn write_rows(worksheet: &mut Worksheet, table: &ResultTable) -> Result<()> {
    let date = rust_xlsxwriter::Format::new().set_num_format(DATE_FORMAT);
    let datetime = rust_xlsxwriter::Format::new().set_num_format(DATETIME_FORMAT);

    for (index, row) in table.rows().iter().enumerate() {
        let r = index as u32 + 1;
        for (col, value) in row.iter().enumerate() {
            let c = col as u16;
            match value {
                CellValue::Null => {}
                CellValue::Bool(value) => {
                    worksheet.write_boolean(r, c, *value)?;
                }
                CellValue::Int(value) => {
                    worksheet.write_number(r, c, *value as f64)?;
                }
                CellValue::Float(value) if value.is_finite() => {
                    worksheet.write_number(r, c, *value)?;
                }
                CellValue::Float(_) => {}
                CellValue::Text(value) => {
                    worksheet.write_string(r, c, value)?;
                }
                CellValue::Date(value) => {
                    worksheet.write_datetime_with_format(r, c, value, &date)?;
                }
                CellValue::DateTime(value) => {
                    worksheet.write_datetime_with_format(r, c, value, &datetime)?;
                }
            }
        }
    }
    Ok(())
}
