//! Master index merge.
//!
//! The index workbook is maintained by hand. Its "Master Index" sheet is read
//! with umya into a neutral [`IndexSheet`] (values, style descriptors, layout)
//! and rendered again as the first sheet of the report workbook.

use std::collections::HashMap;
use std::path::Path;

use indexmap::IndexMap;
use rust_xlsxwriter::{Format, Workbook, Worksheet};
use umya_spreadsheet::{CellRawValue, PaneStateValues};

use crate::error::{ReportError, Result};
use crate::model::StyleDescriptor;
use crate::styles::{descriptor_from_style, format_from_descriptor, stable_style_id};
use crate::utils::parse_range;

pub const MASTER_INDEX_SHEET: &str = "Master Index";
pub const MERGED_INDEX_SHEET: &str = "0-Master Index";

#[derive(Debug, Clone, PartialEq)]
pub enum IndexValue {
    Empty,
    Text(String),
    Number(f64),
    Bool(bool),
    Error(String),
    Formula { formula: String, cached: String },
}

#[derive(Debug, Clone, PartialEq)]
pub struct IndexCell {
    /// 1-based
    pub row: u32,
    /// 1-based
    pub col: u32,
    pub value: IndexValue,
    pub style_id: Option<String>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ColumnSpec {
    pub col: u32,
    pub width: Option<f64>,
    pub hidden: bool,
}

#[derive(Debug, Clone, PartialEq)]
pub struct RowSpec {
    pub row: u32,
    pub height: Option<f64>,
    pub hidden: bool,
}

/// Frozen rows above and columns left of the scrolling pane.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FreezePane {
    pub rows: u32,
    pub cols: u32,
}

/// Everything copied from the index sheet, independent of either xlsx library.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct IndexSheet {
    pub cells: Vec<IndexCell>,
    pub styles: IndexMap<String, StyleDescriptor>,
    pub columns: Vec<ColumnSpec>,
    pub rows: Vec<RowSpec>,
    pub merged_ranges: Vec<String>,
    pub autofilter: Option<String>,
    pub freeze: Option<FreezePane>,
}

impl IndexSheet {
    /// Reads the "Master Index" sheet of `path`.
    pub fn read(path: &Path) -> Result<Self> {
        let book = umya_spreadsheet::reader::xlsx::read(path)?;
        let sheet = book.get_sheet_by_name(MASTER_INDEX_SHEET).ok_or_else(|| {
            ReportError::Workbook(format!(
                "{} has no sheet named '{MASTER_INDEX_SHEET}'",
                path.display()
            ))
        })?;
        let theme = book.get_theme();

        let mut index = IndexSheet::default();

        let mut cells = sheet.get_cell_collection();
        cells.sort_by_key(|cell| {
            let coordinate = cell.get_coordinate();
            (*coordinate.get_row_num(), *coordinate.get_col_num())
        });
        for cell in cells {
            let coordinate = cell.get_coordinate();
            let descriptor = descriptor_from_style(cell.get_style(), theme);
            let style_id = if descriptor.is_default() {
                None
            } else {
                let id = stable_style_id(&descriptor);
                index.styles.entry(id.clone()).or_insert(descriptor);
                Some(id)
            };
            let value = index_value(cell);
            if value == IndexValue::Empty && style_id.is_none() {
                continue;
            }
            index.cells.push(IndexCell {
                row: *coordinate.get_row_num(),
                col: *coordinate.get_col_num(),
                value,
                style_id,
            });
        }

        for column in sheet.get_column_dimensions() {
            let width = Some(*column.get_width()).filter(|w| *w > 0.0);
            let hidden = *column.get_hidden();
            if width.is_some() || hidden {
                index.columns.push(ColumnSpec {
                    col: *column.get_col_num(),
                    width,
                    hidden,
                });
            }
        }

        for row in sheet.get_row_dimensions() {
            let height = Some(*row.get_height()).filter(|h| *h > 0.0 && *row.get_custom_height());
            let hidden = *row.get_hidden();
            if height.is_some() || hidden {
                index.rows.push(RowSpec {
                    row: *row.get_row_num(),
                    height,
                    hidden,
                });
            }
        }
        index.rows.sort_by_key(|row| row.row);

        index.merged_ranges = sheet
            .get_merge_cells()
            .iter()
            .map(|range| range.get_range())
            .collect();
        index.autofilter = sheet
            .get_auto_filter()
            .map(|filter| filter.get_range().get_range());
        index.freeze = sheet
            .get_sheets_views()
            .get_sheet_view_list()
            .iter()
            .find_map(|view| view.get_pane())
            .filter(|pane| {
                matches!(
                    pane.get_state(),
                    PaneStateValues::Frozen | PaneStateValues::FrozenSplit
                )
            })
            .and_then(|pane| {
                let rows = *pane.get_vertical_split() as u32;
                let cols = *pane.get_horizontal_split() as u32;
                if rows > 0 || cols > 0 {
                    return Some(FreezePane { rows, cols });
                }
                let top_left = pane.get_top_left_cell();
                let (col, row) = (*top_left.get_col_num(), *top_left.get_row_num());
                (row > 1 || col > 1).then(|| FreezePane {
                    rows: row.saturating_sub(1),
                    cols: col.saturating_sub(1),
                })
            });

        Ok(index)
    }

    /// Renders the sheet into a standalone worksheet named `name`.
    pub fn render(&self, name: &str) -> Result<Worksheet> {
        let mut worksheet = Worksheet::new();
        worksheet.set_name(name)?;

        let formats: HashMap<&str, Format> = self
            .styles
            .iter()
            .map(|(id, descriptor)| (id.as_str(), format_from_descriptor(descriptor)))
            .collect();
        let default_format = Format::new();

        for column in &self.columns {
            let col = zero_based_col(column.col)?;
            if let Some(width) = column.width {
                worksheet.set_column_width(col, unpadded_width(width))?;
            }
            if column.hidden {
                worksheet.set_column_hidden(col)?;
            }
        }
        for row in &self.rows {
            let r = row.row.saturating_sub(1);
            if let Some(height) = row.height {
                worksheet.set_row_height(r, height)?;
            }
            if row.hidden {
                worksheet.set_row_hidden(r)?;
            }
        }

        let by_position: HashMap<(u32, u32), &IndexCell> = self
            .cells
            .iter()
            .map(|cell| ((cell.row, cell.col), cell))
            .collect();
        for range in &self.merged_ranges {
            let Some(((c1, r1), (c2, r2))) = parse_range(range) else {
                tracing::warn!(range = %range, "skipping unreadable merged range");
                continue;
            };
            if (c1, r1) == (c2, r2) {
                continue;
            }
            let anchor = by_position.get(&(r1, c1));
            let format = format_for(
                &formats,
                &default_format,
                anchor.and_then(|cell| cell.style_id.as_ref()),
            );
            worksheet.merge_range(
                r1 - 1,
                zero_based_col(c1)?,
                r2 - 1,
                zero_based_col(c2)?,
                "",
                format,
            )?;
        }

        for cell in &self.cells {
            let (r, c) = (cell.row - 1, zero_based_col(cell.col)?);
            let format = format_for(&formats, &default_format, cell.style_id.as_ref());
            match &cell.value {
                IndexValue::Empty => {
                    worksheet.write_blank(r, c, format)?;
                }
                IndexValue::Text(text) | IndexValue::Error(text) => {
                    worksheet.write_string_with_format(r, c, text, format)?;
                }
                IndexValue::Number(number) => {
                    worksheet.write_number_with_format(r, c, *number, format)?;
                }
                IndexValue::Bool(value) => {
                    worksheet.write_boolean_with_format(r, c, *value, format)?;
                }
                IndexValue::Formula { formula, cached } => {
                    worksheet.write_formula_with_format(r, c, formula.as_str(), format)?;
                    if !cached.is_empty() {
                        worksheet.set_formula_result(r, c, cached);
                    }
                }
            }
        }

        if let Some(range) = &self.autofilter {
            match parse_range(range) {
                Some(((c1, r1), (c2, r2))) => {
                    worksheet.autofilter(
                        r1 - 1,
                        zero_based_col(c1)?,
                        r2 - 1,
                        zero_based_col(c2)?,
                    )?;
                }
                None => tracing::warn!(range = %range, "skipping unreadable autofilter range"),
            }
        }

        if let Some(freeze) = self.freeze {
            let cols = u16::try_from(freeze.cols)
                .map_err(|_| ReportError::Workbook(format!("cannot freeze {} columns", freeze.cols)))?;
            worksheet.set_freeze_panes(freeze.rows, cols)?;
        }

        Ok(worksheet)
    }
}

fn format_for<'a>(
    formats: &'a HashMap<&str, Format>,
    default: &'a Format,
    style_id: Option<&String>,
) -> &'a Format {
    style_id
        .and_then(|id| formats.get(id.as_str()))
        .unwrap_or(default)
}

/// Stored widths include cell padding, which the writer adds back.
fn unpadded_width(stored: f64) -> f64 {
    const PADDING: f64 = 5.0 / 7.0;
    if stored > 1.0 + PADDING {
        stored - PADDING
    } else {
        stored
    }
}

fn zero_based_col(col: u32) -> Result<u16> {
    u16::try_from(col.saturating_sub(1))
        .map_err(|_| ReportError::Workbook(format!("column {col} is out of range")))
}

fn index_value(cell: &umya_spreadsheet::Cell) -> IndexValue {
    let value = match cell.get_raw_value() {
        CellRawValue::String(text) => IndexValue::Text(text.to_string()),
        CellRawValue::RichText(rich) => IndexValue::Text(rich.get_text().into_owned()),
        CellRawValue::Lazy(raw) => match raw.parse::<f64>() {
            Ok(number) => IndexValue::Number(number),
            Err(_) => IndexValue::Text(raw.to_string()),
        },
        CellRawValue::Numeric(number) => IndexValue::Number(*number),
        CellRawValue::Bool(value) => IndexValue::Bool(*value),
        CellRawValue::Error(error) => IndexValue::Error(error.to_string()),
        CellRawValue::Empty => IndexValue::Empty,
    };

    if cell.is_formula() {
        let cached = match value {
            IndexValue::Empty => String::new(),
            IndexValue::Number(number) => number.to_string(),
            IndexValue::Bool(value) => (if value { "TRUE" } else { "FALSE" }).to_string(),
            IndexValue::Text(text) | IndexValue::Error(text) => text,
            IndexValue::Formula { cached, .. } => cached,
        };
        return IndexValue::Formula {
            formula: cell.get_formula().to_string(),
            cached,
        };
    }
    value
}

/// Inserts the index sheet of `index_path` as the first sheet of `workbook`.
///
/// A missing index file is not an error: the workbook is left untouched,
/// a warning is logged, and `false` is returned.
pub fn prepend_index(workbook: &mut Workbook, index_path: &Path) -> Result<bool> {
    if !index_path.exists() {
        tracing::warn!(
            path = %index_path.display(),
            "index file not found, master index not added"
        );
        return Ok(false);
    }

    tracing::info!(path = %index_path.display(), "adding master index");
    let index = IndexSheet::read(index_path)?;
    let worksheet = index.render(MERGED_INDEX_SHEET)?;
    workbook.worksheets_mut().insert(0, worksheet);
    tracing::info!(
        cells = index.cells.len(),
        merged_ranges = index.merged_ranges.len(),
        freeze = ?index.freeze.map(freeze_top_left),
        "master index inserted"
    );
    Ok(true)
}

/// Cell reference of the first frozen-free cell, for diagnostics.
pub fn freeze_top_left(freeze: FreezePane) -> String {
    crate::utils::cell_address(freeze.cols + 1, freeze.rows + 1)
}
