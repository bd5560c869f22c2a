use chrono::{NaiveDate, NaiveDateTime, NaiveTime};
use serde::Serialize;
use std::cmp::Ordering;
use std::fmt;

use crate::error::{ReportError, Result};

/// One value of a materialized result row.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum CellValue {
    Null,
    Bool(bool),
    Int(i64),
    Float(f64),
    Text(String),
    Date(NaiveDate),
    DateTime(NaiveDateTime),
}

impl CellValue {
    pub fn is_null(&self) -> bool {
        matches!(self, CellValue::Null)
    }

    /// Numeric view used by sums and derived columns. Text is never coerced.
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            CellValue::Int(value) => Some(*value as f64),
            CellValue::Float(value) if value.is_finite() => Some(*value),
            _ => None,
        }
    }

    /// The number a spreadsheet holds for this cell: numbers as-is, dates
    /// and timestamps as Excel serials. Text, booleans and nulls have none.
    pub fn as_sheet_number(&self) -> Option<f64> {
        match self {
            CellValue::Date(date) => Some(excel_serial(date.and_time(NaiveTime::MIN))),
            CellValue::DateTime(datetime) => Some(excel_serial(*datetime)),
            other => other.as_f64(),
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            CellValue::Text(value) => Some(value),
            _ => None,
        }
    }

    fn rank(&self) -> u8 {
        match self {
            CellValue::Null => 0,
            CellValue::Bool(_) => 1,
            CellValue::Int(_) | CellValue::Float(_) => 2,
            CellValue::Date(_) | CellValue::DateTime(_) => 3,
            CellValue::Text(_) => 4,
        }
    }

    /// Total order used when sorting grouping keys.
    pub fn total_cmp(&self, other: &CellValue) -> Ordering {
        match (self, other) {
            (CellValue::Bool(a), CellValue::Bool(b)) => a.cmp(b),
            (CellValue::Int(a), CellValue::Int(b)) => a.cmp(b),
            (CellValue::Text(a), CellValue::Text(b)) => a.cmp(b),
            (CellValue::Date(a), CellValue::Date(b)) => a.cmp(b),
            (CellValue::DateTime(a), CellValue::DateTime(b)) => a.cmp(b),
            (CellValue::Date(a), CellValue::DateTime(b)) => a.and_time(NaiveTime::MIN).cmp(b),
            (CellValue::DateTime(a), CellValue::Date(b)) => a.cmp(&b.and_time(NaiveTime::MIN)),
            (a, b) if a.rank() == 2 && b.rank() == 2 => {
                let (x, y) = (a.as_f64().unwrap_or(f64::NAN), b.as_f64().unwrap_or(f64::NAN));
                x.total_cmp(&y)
            }
            (a, b) => a.rank().cmp(&b.rank()),
        }
    }
}

/// Days since 1899-12-30, counting the phantom 1900-02-29 the 1900 date
/// system keeps.
fn excel_serial(datetime: NaiveDateTime) -> f64 {
    let epoch = NaiveDate::from_ymd_opt(1899, 12, 30)
        .unwrap_or(NaiveDate::MIN)
        .and_time(NaiveTime::MIN);
    let leap_bug_end = NaiveDate::from_ymd_opt(1900, 3, 1)
        .unwrap_or(NaiveDate::MIN)
        .and_time(NaiveTime::MIN);
    let elapsed = datetime - epoch;
    let mut serial = elapsed.num_milliseconds() as f64 / 86_400_000.0;
    if datetime < leap_bug_end {
        serial -= 1.0;
    }
    serial
}

impl fmt::Display for CellValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CellValue::Null => Ok(()),
            CellValue::Bool(value) => write!(f, "{value}"),
            CellValue::Int(value) => write!(f, "{value}"),
            CellValue::Float(value) => write!(f, "{value}"),
            CellValue::Text(value) => f.write_str(value),
            CellValue::Date(value) => write!(f, "{}", value.format("%Y-%m-%d")),
            CellValue::DateTime(value) => write!(f, "{}", value.format("%Y-%m-%d %H:%M:%S")),
        }
    }
}

impl From<&str> for CellValue {
    fn from(value: &str) -> Self {
        CellValue::Text(value.to_string())
    }
}

impl From<String> for CellValue {
    fn from(value: String) -> Self {
        CellValue::Text(value)
    }
}

impl From<bool> for CellValue {
    fn from(value: bool) -> Self {
        CellValue::Bool(value)
    }
}

impl From<i64> for CellValue {
    fn from(value: i64) -> Self {
        CellValue::Int(value)
    }
}

impl From<f64> for CellValue {
    fn from(value: f64) -> Self {
        CellValue::Float(value)
    }
}

impl From<NaiveDate> for CellValue {
    fn from(value: NaiveDate) -> Self {
        CellValue::Date(value)
    }
}

impl<T: Into<CellValue>> From<Option<T>> for CellValue {
    fn from(value: Option<T>) -> Self {
        value.map(Into::into).unwrap_or(CellValue::Null)
    }
}

/// Column-named rows returned by one catalog query.
///
/// Rows are always as wide as the column list.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct ResultTable {
    columns: Vec<String>,
    rows: Vec<Vec<CellValue>>,
}

impl ResultTable {
    pub fn new<I, S>(columns: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            columns: columns.into_iter().map(Into::into).collect(),
            rows: Vec::new(),
        }
    }

    pub fn with_rows(mut self, rows: Vec<Vec<CellValue>>) -> Result<Self> {
        for row in rows {
            self.push_row(row)?;
        }
        Ok(self)
    }

    pub fn push_row(&mut self, row: Vec<CellValue>) -> Result<()> {
        if row.len() != self.columns.len() {
            return Err(ReportError::Query {
                name: "result".to_string(),
                message: format!(
                    "row has {} values but the table has {} columns",
                    row.len(),
                    self.columns.len()
                ),
            });
        }
        self.rows.push(row);
        Ok(())
    }

    pub fn columns(&self) -> &[String] {
        &self.columns
    }

    pub fn rows(&self) -> &[Vec<CellValue>] {
        &self.rows
    }

    pub fn row_count(&self) -> usize {
        self.rows.len()
    }

    pub fn column_count(&self) -> usize {
        self.columns.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    pub fn column_index(&self, name: &str) -> Option<usize> {
        self.columns.iter().position(|column| column == name)
    }

    pub(crate) fn require_column(&self, name: &str) -> Result<usize> {
        self.column_index(name).ok_or_else(|| ReportError::Query {
            name: "result".to_string(),
            message: format!("column {name} not present in result"),
        })
    }

    pub fn column_values(&self, index: usize) -> impl Iterator<Item = &CellValue> {
        self.rows.iter().filter_map(move |row| row.get(index))
    }

    /// Arithmetic sum over the numeric values of one column; nulls and text are skipped.
    pub fn numeric_sum(&self, index: usize) -> f64 {
        self.column_values(index).filter_map(CellValue::as_f64).sum()
    }

    /// What a SUM over the rendered column evaluates to: numbers plus date serials.
    pub fn sheet_sum(&self, index: usize) -> f64 {
        self.column_values(index).filter_map(CellValue::as_sheet_number).sum()
    }

    /// Removes the named column, returning the remaining table.
    pub fn drop_column(mut self, name: &str) -> Result<Self> {
        let index = self.require_column(name)?;
        self.columns.remove(index);
        for row in &mut self.rows {
            row.remove(index);
        }
        Ok(self)
    }

    pub fn rename_column(&mut self, from: &str, to: impl Into<String>) -> Result<()> {
        let index = self.require_column(from)?;
        self.columns[index] = to.into();
        Ok(())
    }

    /// Appends a column computed from each existing row.
    pub fn push_column<F>(&mut self, name: impl Into<String>, mut compute: F)
    where
        F: FnMut(&[CellValue]) -> CellValue,
    {
        self.columns.push(name.into());
        for row in &mut self.rows {
            let value = compute(row);
            row.push(value);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_matches::assert_matches;

    fn sample() -> ResultTable {
        ResultTable::new(["UNIT", "SHAPE", "AREA_HA"])
            .with_rows(vec![
                vec!["Tlell".into(), "POLYGON(..)".into(), CellValue::Float(1.5)],
                vec!["Honna".into(), CellValue::Null, CellValue::Int(2)],
                vec!["Ian".into(), "POLYGON(..)".into(), CellValue::Null],
            ])
            .unwrap()
    }

    #[test]
    fn rejects_ragged_rows() {
        let mut table = ResultTable::new(["A", "B"]);
        assert_matches!(
            table.push_row(vec![CellValue::Int(1)]),
            Err(ReportError::Query { .. })
        );
    }

    #[test]
    fn numeric_sum_skips_nulls() {
        let table = sample();
        assert_eq!(table.numeric_sum(2), 3.5);
    }

    #[test]
    fn drop_column_keeps_order() {
        let table = sample().drop_column("SHAPE").unwrap();
        assert_eq!(table.columns(), ["UNIT", "AREA_HA"]);
        assert_eq!(table.rows()[1], vec![CellValue::from("Honna"), CellValue::Int(2)]);
        assert!(sample().drop_column("MISSING").is_err());
    }

    #[test]
    fn dates_sum_as_spreadsheet_serials() {
        let day = |y, m, d| CellValue::from(NaiveDate::from_ymd_opt(y, m, d).unwrap());
        assert_eq!(day(2024, 1, 1).as_sheet_number(), Some(45292.0));
        assert_eq!(day(1900, 1, 1).as_sheet_number(), Some(1.0));
        assert_eq!(day(1900, 3, 1).as_sheet_number(), Some(61.0));
        let noon = NaiveDate::from_ymd_opt(2024, 1, 1)
            .unwrap()
            .and_hms_opt(12, 0, 0)
            .unwrap();
        assert_eq!(CellValue::DateTime(noon).as_sheet_number(), Some(45292.5));
        assert_eq!(CellValue::Bool(true).as_sheet_number(), None);

        let table = ResultTable::new(["FILE_NBR", "EXPIRY_DATE"])
            .with_rows(vec![
                vec!["1".into(), day(2024, 1, 1)],
                vec!["2".into(), CellValue::Null],
                vec!["3".into(), day(2024, 3, 31)],
            ])
            .unwrap();
        assert_eq!(table.sheet_sum(1), 90674.0);
        assert_eq!(table.numeric_sum(1), 0.0);
    }

    #[test]
    fn cell_order_is_total() {
        assert_eq!(
            CellValue::Int(2).total_cmp(&CellValue::Float(1.5)),
            Ordering::Greater
        );
        assert_eq!(
            CellValue::Null.total_cmp(&CellValue::from("a")),
            Ordering::Less
        );
        assert_eq!(
            CellValue::from("LEASE").total_cmp(&CellValue::from("LICENCE")),
            Ordering::Less
        );
    }
}
