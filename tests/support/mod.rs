#![allow(dead_code)]

use std::collections::{BTreeMap, HashMap};
use std::io::{self, Cursor, Read};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use chrono::NaiveDate;
use land_interest_reports::error::Result as ReportResult;
use land_interest_reports::model::StyleDescriptor;
use land_interest_reports::styles::descriptor_from_style;
use land_interest_reports::{
    BindValue, CellValue, QueryDefinition, QueryExecutor, ReportConfig, ReportError, ReportKind,
    ResultTable,
};
use tempfile::{TempDir, tempdir};
use tracing_subscriber::fmt::MakeWriter;
use umya_spreadsheet::{self, Spreadsheet};

pub const BC_ALBERS_PRJ: &str = r#"PROJCS["NAD_1983_BC_Environment_Albers",GEOGCS["GCS_North_American_1983",DATUM["D_North_American_1983",SPHEROID["GRS_1980",6378137.0,298.257222101]],PRIMEM["Greenwich",0.0],UNIT["Degree",0.0174532925199433]],PROJECTION["Albers"],PARAMETER["False_Easting",1000000.0],PARAMETER["False_Northing",0.0],PARAMETER["Central_Meridian",-126.0],PARAMETER["Standard_Parallel_1",50.0],PARAMETER["Standard_Parallel_2",58.5],PARAMETER["Latitude_Of_Origin",45.0],UNIT["Meter",1.0]]"#;

pub fn write_workbook_to_path<F>(path: &Path, f: F)
where
    F: FnOnce(&mut Spreadsheet),
{
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent).expect("create dir");
    }
    let mut book = umya_spreadsheet::new_file();
    f(&mut book);
    umya_spreadsheet::writer::xlsx::write(&book, path).expect("write workbook");
}

pub fn read_workbook(path: &Path) -> Spreadsheet {
    umya_spreadsheet::reader::xlsx::read(path).expect("read workbook")
}

pub fn sheet_names(book: &Spreadsheet) -> Vec<String> {
    book.get_sheet_collection()
        .iter()
        .map(|sheet| sheet.get_name().to_string())
        .collect()
}

pub fn cell_style(book: &Spreadsheet, sheet: &str, coordinate: &str) -> StyleDescriptor {
    let worksheet = book.get_sheet_by_name(sheet).expect("sheet exists");
    descriptor_from_style(worksheet.get_style(coordinate), book.get_theme())
}

pub fn cell_text(book: &Spreadsheet, sheet: &str, coordinate: &str) -> String {
    book.get_sheet_by_name(sheet)
        .expect("sheet exists")
        .get_value(coordinate)
}

/// Package parts of a saved workbook, by name. The core properties part is
/// left out since it carries the creation time.
pub fn xlsx_parts(bytes: Vec<u8>) -> BTreeMap<String, Vec<u8>> {
    let mut archive = zip::ZipArchive::new(Cursor::new(bytes)).expect("xlsx is a zip package");
    let mut parts = BTreeMap::new();
    for index in 0..archive.len() {
        let mut part = archive.by_index(index).expect("zip entry");
        let name = part.name().to_string();
        if name == "docProps/core.xml" {
            continue;
        }
        let mut contents = Vec::new();
        part.read_to_end(&mut contents).expect("read zip entry");
        parts.insert(name, contents);
    }
    parts
}

/// In-memory log sink for a scoped fmt subscriber.
#[derive(Clone, Default)]
pub struct CapturedLogs(Arc<Mutex<Vec<u8>>>);

impl CapturedLogs {
    pub fn contents(&self) -> String {
        String::from_utf8_lossy(&self.0.lock().expect("log buffer")).into_owned()
    }
}

impl io::Write for CapturedLogs {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.0.lock().expect("log buffer").extend_from_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

impl<'a> MakeWriter<'a> for CapturedLogs {
    type Writer = CapturedLogs;

    fn make_writer(&'a self) -> Self::Writer {
        self.clone()
    }
}

/// Runs `f` with a plain-text subscriber installed and returns what it logged.
pub fn capture_logs<T>(f: impl FnOnce() -> T) -> (T, String) {
    let logs = CapturedLogs::default();
    let subscriber = tracing_subscriber::fmt()
        .with_writer(logs.clone())
        .with_ansi(false)
        .with_max_level(tracing::Level::DEBUG)
        .finish();
    let value = tracing::subscriber::with_default(subscriber, f);
    (value, logs.contents())
}

pub struct TestWorkspace {
    _tempdir: TempDir,
    root: PathBuf,
}

impl TestWorkspace {
    pub fn new() -> Self {
        let tempdir = tempdir().expect("tempdir");
        let root = tempdir.path().to_path_buf();
        Self {
            _tempdir: tempdir,
            root,
        }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn path(&self, name: &str) -> PathBuf {
        self.root.join(name)
    }

    pub fn create_workbook<F>(&self, name: &str, f: F) -> PathBuf
    where
        F: FnOnce(&mut Spreadsheet),
    {
        let path = self.path(name);
        write_workbook_to_path(&path, f);
        path
    }

    /// Writes a one-polygon shapefile: a `side` by `side` square at the origin.
    pub fn create_square_shapefile(&self, name: &str, side: f64, prj: Option<&str>) -> PathBuf {
        use shapefile::{Point, Polygon, PolygonRing, ShapeWriter};

        let path = self.path(name);
        let ring = vec![
            Point::new(0.0, 0.0),
            Point::new(0.0, side),
            Point::new(side, side),
            Point::new(side, 0.0),
            Point::new(0.0, 0.0),
        ];
        let shapes = vec![Polygon::new(PolygonRing::Outer(ring))];
        let mut writer = ShapeWriter::from_path(&path).expect("shape writer");
        writer.write_shapes(&shapes).expect("write shapes");
        if let Some(wkt) = prj {
            std::fs::write(path.with_extension("prj"), wkt).expect("write prj");
        }
        path
    }

    pub fn config(&self, report: ReportKind) -> ReportConfig {
        ReportConfig {
            report,
            db_host: "localhost".to_string(),
            db_port: 5432,
            db_name: "idwprod1".to_string(),
            user_env: "bcgw_user".to_string(),
            password_env: "bcgw_pwd".to_string(),
            output_dir: self.root.clone(),
            aoi_path: None,
            index_path: self.path("Haida_Gwaii_Interests_Report_Index.xlsx"),
            srid: None,
            report_date: report_date(),
            column_width: 20.0,
            slow_query_ms: 60_000,
        }
    }
}

pub fn report_date() -> NaiveDate {
    NaiveDate::from_ymd_opt(2026, 1, 27).expect("valid date")
}

pub fn table(columns: &[&str], rows: Vec<Vec<CellValue>>) -> ResultTable {
    ResultTable::new(columns.iter().copied())
        .with_rows(rows)
        .expect("rows match columns")
}

#[derive(Debug, Clone, PartialEq)]
pub struct RecordedCall {
    pub name: String,
    pub binds: Vec<BindValue>,
    pub after_close: bool,
}

/// In-memory stand-in for the warehouse.
///
/// Queries without a canned result return an empty table with a single
/// LANDSCAPE_UNIT_NAME column.
#[derive(Debug, Default)]
pub struct FakeExecutor {
    responses: HashMap<String, ResultTable>,
    fail_on: Option<String>,
    pub calls: Vec<RecordedCall>,
    pub close_count: usize,
    pub closed_after_calls: Option<usize>,
}

impl FakeExecutor {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn respond(mut self, name: &str, table: ResultTable) -> Self {
        self.responses.insert(name.to_string(), table);
        self
    }

    pub fn fail_on(mut self, name: &str) -> Self {
        self.fail_on = Some(name.to_string());
        self
    }

    pub fn call_names(&self) -> Vec<&str> {
        self.calls.iter().map(|call| call.name.as_str()).collect()
    }
}

#[async_trait]
impl QueryExecutor for FakeExecutor {
    async fn fetch(&mut self, query: &QueryDefinition, binds: &[&BindValue]) -> ReportResult<ResultTable> {
        self.calls.push(RecordedCall {
            name: query.name().to_string(),
            binds: binds.iter().map(|bind| (*bind).clone()).collect(),
            after_close: self.close_count > 0,
        });
        if self.fail_on.as_deref() == Some(query.name()) {
            return Err(ReportError::Query {
                name: query.name().to_string(),
                message: "relation \"whse_tantalis.ta_tenure\" does not exist".to_string(),
            });
        }
        Ok(self
            .responses
            .get(query.name())
            .cloned()
            .unwrap_or_else(|| ResultTable::new(["LANDSCAPE_UNIT_NAME"])))
    }

    async fn close(&mut self) -> ReportResult<()> {
        if self.close_count == 0 {
            self.closed_after_calls = Some(self.calls.len());
        }
        self.close_count += 1;
        Ok(())
    }
}
