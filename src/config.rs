use anyhow::{Context, Result};
use chrono::{Local, NaiveDate};
use clap::{Parser, ValueEnum};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

use crate::gateway::ConnectionSettings;
use crate::reports::report_for;
use crate::writer::{DEFAULT_COLUMN_WIDTH, WriterOptions};

const DEFAULT_DB_HOST: &str = "bcgw.bcgov";
const DEFAULT_DB_PORT: u16 = 5432;
const DEFAULT_DB_NAME: &str = "idwprod1";
const DEFAULT_USER_ENV: &str = "bcgw_user";
const DEFAULT_PASSWORD_ENV: &str = "bcgw_pwd";
const DEFAULT_SLOW_QUERY_MS: u64 = 60_000;
const DEFAULT_INDEX_FILE: &str = "Haida_Gwaii_Interests_Report_Index.xlsx";

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ReportKind {
    #[value(alias = "haida_gwaii", alias = "hg")]
    #[serde(alias = "haida_gwaii")]
    HaidaGwaii,
    #[value(alias = "nicola", alias = "nicola_clean_energy")]
    #[serde(alias = "nicola", alias = "nicola_clean_energy")]
    NicolaCleanEnergy,
    #[value(alias = "kamloops", alias = "kamloops_pmbc")]
    #[serde(alias = "kamloops", alias = "kamloops_pmbc")]
    KamloopsPmbc,
}

impl ReportKind {
    pub fn requires_aoi(&self) -> bool {
        report_for(*self).needs_aoi()
    }
}

impl std::fmt::Display for ReportKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ReportKind::HaidaGwaii => write!(f, "haida-gwaii"),
            ReportKind::NicolaCleanEnergy => write!(f, "nicola-clean-energy"),
            ReportKind::KamloopsPmbc => write!(f, "kamloops-pmbc"),
        }
    }
}

/// Everything one report run needs, validated.
#[derive(Debug, Clone)]
pub struct ReportConfig {
    pub report: ReportKind,
    pub db_host: String,
    pub db_port: u16,
    pub db_name: String,
    pub user_env: String,
    pub password_env: String,
    pub output_dir: PathBuf,
    pub aoi_path: Option<PathBuf>,
    pub index_path: PathBuf,
    pub srid: Option<i32>,
    pub report_date: NaiveDate,
    pub column_width: f64,
    pub slow_query_ms: u64,
}

impl ReportConfig {
    pub fn from_args(args: CliArgs) -> Result<Self> {
        let CliArgs {
            config,
            report: cli_report,
            db_host: cli_db_host,
            db_port: cli_db_port,
            db_name: cli_db_name,
            user_env: cli_user_env,
            password_env: cli_password_env,
            output_dir: cli_output_dir,
            aoi: cli_aoi,
            index: cli_index,
            srid: cli_srid,
            report_date: cli_report_date,
            column_width: cli_column_width,
            slow_query_ms: cli_slow_query_ms,
        } = args;

        let file_config = if let Some(path) = config.as_ref() {
            load_config_file(path)?
        } else {
            PartialConfig::default()
        };

        let PartialConfig {
            report: file_report,
            db_host: file_db_host,
            db_port: file_db_port,
            db_name: file_db_name,
            user_env: file_user_env,
            password_env: file_password_env,
            output_dir: file_output_dir,
            aoi_path: file_aoi_path,
            index_path: file_index_path,
            srid: file_srid,
            report_date: file_report_date,
            column_width: file_column_width,
            slow_query_ms: file_slow_query_ms,
        } = file_config;

        let report = cli_report
            .or(file_report)
            .context("a report must be selected with --report or in the config file")?;

        let output_dir = cli_output_dir
            .or(file_output_dir)
            .unwrap_or_else(|| PathBuf::from("."));

        let resolve = |path: PathBuf| {
            if path.is_absolute() {
                path
            } else {
                output_dir.join(path)
            }
        };

        let aoi_path = cli_aoi.or(file_aoi_path).map(&resolve);
        let index_path = cli_index
            .or(file_index_path)
            .map(&resolve)
            .unwrap_or_else(|| output_dir.join(DEFAULT_INDEX_FILE));

        let column_width = cli_column_width
            .or(file_column_width)
            .unwrap_or(DEFAULT_COLUMN_WIDTH);

        let config = Self {
            report,
            db_host: non_empty(cli_db_host.or(file_db_host), DEFAULT_DB_HOST),
            db_port: cli_db_port.or(file_db_port).unwrap_or(DEFAULT_DB_PORT),
            db_name: non_empty(cli_db_name.or(file_db_name), DEFAULT_DB_NAME),
            user_env: non_empty(cli_user_env.or(file_user_env), DEFAULT_USER_ENV),
            password_env: non_empty(cli_password_env.or(file_password_env), DEFAULT_PASSWORD_ENV),
            output_dir,
            aoi_path,
            index_path,
            srid: cli_srid.or(file_srid),
            report_date: cli_report_date
                .or(file_report_date)
                .unwrap_or_else(|| Local::now().date_naive()),
            column_width,
            slow_query_ms: cli_slow_query_ms
                .or(file_slow_query_ms)
                .unwrap_or(DEFAULT_SLOW_QUERY_MS),
        };
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        anyhow::ensure!(self.db_port != 0, "database port must be non-zero");
        anyhow::ensure!(
            self.column_width.is_finite() && self.column_width > 0.0,
            "column width must be a positive number, got {}",
            self.column_width
        );
        if self.report.requires_aoi() {
            let aoi = self
                .aoi_path
                .as_ref()
                .with_context(|| format!("report {} needs an area of interest (--aoi)", self.report))?;
            anyhow::ensure!(
                aoi.exists(),
                "area of interest {:?} does not exist",
                aoi
            );
        }
        if let Some(srid) = self.srid {
            anyhow::ensure!(srid > 0, "srid must be positive, got {srid}");
        }
        Ok(())
    }

    pub fn ensure_output_dir(&self) -> Result<()> {
        fs::create_dir_all(&self.output_dir)
            .with_context(|| format!("failed to create output directory {:?}", self.output_dir))?;
        anyhow::ensure!(
            self.output_dir.is_dir(),
            "output directory {:?} is not a directory",
            self.output_dir
        );
        Ok(())
    }

    pub fn connection_settings(&self) -> ConnectionSettings {
        ConnectionSettings {
            host: self.db_host.clone(),
            port: self.db_port,
            database: self.db_name.clone(),
        }
    }

    pub fn writer_options(&self) -> WriterOptions {
        WriterOptions {
            column_width: self.column_width,
        }
    }

    pub fn resolve_output<P: AsRef<Path>>(&self, file_name: P) -> PathBuf {
        self.output_dir.join(file_name)
    }
}

fn non_empty(value: Option<String>, default: &str) -> String {
    value
        .map(|value| value.trim().to_string())
        .filter(|value| !value.is_empty())
        .unwrap_or_else(|| default.to_string())
}

#[derive(Parser, Debug, Default, Clone)]
#[command(
    name = "land-interest-reports",
    about = "Land interest reports from the spatial warehouse",
    version
)]
pub struct CliArgs {
    #[arg(
        long,
        value_name = "FILE",
        help = "Path to a configuration file (YAML or JSON)",
        global = true
    )]
    pub config: Option<PathBuf>,

    #[arg(
        long,
        env = "LIR_REPORT",
        value_enum,
        value_name = "REPORT",
        help = "Report to generate"
    )]
    pub report: Option<ReportKind>,

    #[arg(long, env = "LIR_DB_HOST", value_name = "HOST", help = "Warehouse host")]
    pub db_host: Option<String>,

    #[arg(
        long,
        env = "LIR_DB_PORT",
        value_name = "PORT",
        help = "Warehouse port",
        value_parser = clap::value_parser!(u16)
    )]
    pub db_port: Option<u16>,

    #[arg(long, env = "LIR_DB_NAME", value_name = "NAME", help = "Warehouse database name")]
    pub db_name: Option<String>,

    #[arg(
        long,
        env = "LIR_USER_ENV",
        value_name = "VAR",
        help = "Environment variable holding the database user"
    )]
    pub user_env: Option<String>,

    #[arg(
        long,
        env = "LIR_PASSWORD_ENV",
        value_name = "VAR",
        help = "Environment variable holding the database password"
    )]
    pub password_env: Option<String>,

    #[arg(
        long,
        env = "LIR_OUTPUT_DIR",
        value_name = "DIR",
        help = "Directory the workbook is written to"
    )]
    pub output_dir: Option<PathBuf>,

    #[arg(
        long,
        env = "LIR_AOI",
        value_name = "PATH",
        help = "Area of interest: a .shp file or <file>.gdb/<layer>, relative to the output directory"
    )]
    pub aoi: Option<PathBuf>,

    #[arg(
        long,
        env = "LIR_INDEX",
        value_name = "FILE",
        help = "Workbook holding the Master Index sheet, relative to the output directory"
    )]
    pub index: Option<PathBuf>,

    #[arg(
        long,
        env = "LIR_SRID",
        value_name = "EPSG",
        help = "Spatial reference of the area of interest, overriding its .prj"
    )]
    pub srid: Option<i32>,

    #[arg(
        long,
        env = "LIR_REPORT_DATE",
        value_name = "YYYY-MM-DD",
        help = "Date stamped into the output file name (default: today)"
    )]
    pub report_date: Option<NaiveDate>,

    #[arg(
        long,
        env = "LIR_COLUMN_WIDTH",
        value_name = "WIDTH",
        help = "Display width of every report column"
    )]
    pub column_width: Option<f64>,

    #[arg(
        long,
        env = "LIR_SLOW_QUERY_MS",
        value_name = "MS",
        help = "Queries slower than this are logged as warnings"
    )]
    pub slow_query_ms: Option<u64>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
struct PartialConfig {
    report: Option<ReportKind>,
    db_host: Option<String>,
    db_port: Option<u16>,
    db_name: Option<String>,
    user_env: Option<String>,
    password_env: Option<String>,
    output_dir: Option<PathBuf>,
    aoi_path: Option<PathBuf>,
    index_path: Option<PathBuf>,
    srid: Option<i32>,
    report_date: Option<NaiveDate>,
    column_width: Option<f64>,
    slow_query_ms: Option<u64>,
}

fn load_config_file(path: &Path) -> Result<PartialConfig> {
    if !path.exists() {
        anyhow::bail!("config file {:?} does not exist", path);
    }
    let contents = fs::read_to_string(path)
        .with_context(|| format!("failed to read config file {:?}", path))?;
    let ext = path
        .extension()
        .and_then(|os| os.to_str())
        .unwrap_or("")
        .to_ascii_lowercase();

    let parsed = match ext.as_str() {
        "yaml" | "yml" => serde_yaml::from_str(&contents)
            .with_context(|| format!("failed to parse YAML config {:?}", path))?,
        "json" => serde_json::from_str(&contents)
            .with_context(|| format!("failed to parse JSON config {:?}", path))?,
        other => anyhow::bail!("unsupported config extension: {other}"),
    };
    Ok(parsed)
}
