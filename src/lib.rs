pub mod aoi;
pub mod catalog;
pub mod config;
pub mod error;
pub mod gateway;
pub mod logging;
pub mod merge;
pub mod model;
pub mod pipeline;
pub mod reports;
pub mod styles;
pub mod table;
pub mod transform;
pub mod utils;
pub mod writer;

pub use aoi::AreaOfInterest;
pub use catalog::{BindSet, BindValue, QueryCatalog, QueryDefinition, SqlTemplates};
pub use config::{CliArgs, ReportConfig, ReportKind};
pub use error::{ErrorCode, ReportError, classify};
pub use gateway::{ConnectionSettings, Credentials, PgGateway, QueryExecutor};
pub use logging::{LoggingConfig, init_logging};
pub use pipeline::{RunSummary, SheetSummary, run};
pub use table::{CellValue, ResultTable};
pub use writer::{ReportSheet, ReportWriter, WriterOptions};

use anyhow::{Context, Result};

/// Connects to the warehouse with the configured credentials and runs the report.
pub async fn run_with_warehouse(config: &ReportConfig) -> Result<RunSummary> {
    let credentials = Credentials::from_env(&config.user_env, &config.password_env)?;
    let mut gateway = PgGateway::connect(
        &config.connection_settings(),
        &credentials,
        config.slow_query_ms,
    )
    .await
    .context("connecting to the warehouse")?;
    run(config, &mut gateway).await
}
