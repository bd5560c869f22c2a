use clap::Parser;
use land_interest_reports::{
    CliArgs, LoggingConfig, ReportConfig, classify, init_logging, run_with_warehouse,
};

fn main() -> anyhow::Result<()> {
    let logging_config = LoggingConfig::from_env();
    let _guard = init_logging(logging_config)?;

    let cli = CliArgs::parse();
    let config = ReportConfig::from_args(cli)?;

    let runtime = tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()?;
    let result = runtime.block_on(run_with_warehouse(&config));

    match &result {
        Ok(summary) => tracing::info!(
            report = %config.report,
            output = %summary.output.display(),
            sheets = summary.sheets.len(),
            index_merged = summary.index_merged,
            "report written"
        ),
        Err(error) => match classify(error) {
            Some(code) => tracing::error!(
                error_code = code.code(),
                error_category = code.category(),
                "report failed: {error:#}"
            ),
            None => tracing::error!("report failed: {error:#}"),
        },
    }

    result.map(|_| ())
}
