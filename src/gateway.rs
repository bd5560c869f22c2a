//! Database gateway.
//!
//! One connection is opened per run and every catalog query goes through it
//! strictly in order. Results are materialized into [`ResultTable`]s whose
//! column labels come from the statement metadata, so a query returning no
//! rows still has its headers.

use std::env;
use std::fmt;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, NaiveDateTime, Utc};
use rust_decimal::Decimal;
use rust_decimal::prelude::ToPrimitive;
use sqlx::postgres::{PgConnectOptions, PgConnection, PgRow};
use sqlx::{Column, Connection, Executor, Row, Statement, TypeInfo};

use crate::catalog::{BindValue, QueryDefinition};
use crate::error::{ReportError, Result};
use crate::log_slow_query;
use crate::table::{CellValue, ResultTable};

/// Anything that can run catalog queries: the warehouse connection, or a fake in tests.
#[async_trait]
pub trait QueryExecutor: Send {
    async fn fetch(&mut self, query: &QueryDefinition, binds: &[&BindValue]) -> Result<ResultTable>;

    /// Releases the session. Calling it twice is harmless.
    async fn close(&mut self) -> Result<()>;
}

/// Database user and password, read from the environment.
#[derive(Clone)]
pub struct Credentials {
    user: String,
    password: String,
}

impl Credentials {
    pub fn new(user: impl Into<String>, password: impl Into<String>) -> Self {
        Self {
            user: user.into(),
            password: password.into(),
        }
    }

    pub fn from_env(user_var: &str, password_var: &str) -> Result<Self> {
        let read = |var: &str| {
            env::var(var)
                .ok()
                .filter(|value| !value.is_empty())
                .ok_or_else(|| {
                    ReportError::Connection(format!("environment variable {var} is not set"))
                })
        };
        Ok(Self::new(read(user_var)?, read(password_var)?))
    }

    pub fn user(&self) -> &str {
        &self.user
    }
}

impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credentials")
            .field("user", &self.user)
            .field("password", &"<redacted>")
            .finish()
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConnectionSettings {
    pub host: String,
    pub port: u16,
    pub database: String,
}

/// The warehouse session.
pub struct PgGateway {
    connection: Option<PgConnection>,
    slow_query_ms: u64,
}

impl PgGateway {
    pub async fn connect(
        settings: &ConnectionSettings,
        credentials: &Credentials,
        slow_query_ms: u64,
    ) -> Result<Self> {
        tracing::info!(
            host = %settings.host,
            port = settings.port,
            database = %settings.database,
            user = %credentials.user,
            "connecting to the warehouse"
        );
        let options = PgConnectOptions::new()
            .host(&settings.host)
            .port(settings.port)
            .username(&credentials.user)
            .password(&credentials.password)
            .database(&settings.database);
        let connection = PgConnection::connect_with(&options)
            .await
            .map_err(|error| ReportError::Connection(error.to_string()))?;
        tracing::info!("successfully connected to the database");
        Ok(Self {
            connection: Some(connection),
            slow_query_ms,
        })
    }
}

#[async_trait]
impl QueryExecutor for PgGateway {
    async fn fetch(&mut self, query: &QueryDefinition, binds: &[&BindValue]) -> Result<ResultTable> {
        let connection = self
            .connection
            .as_mut()
            .ok_or_else(|| ReportError::query(query.name(), "connection already closed"))?;
        let started = Instant::now();

        let statement = (&mut *connection)
            .prepare(query.sql())
            .await
            .map_err(|error| ReportError::query(query.name(), error))?;
        let columns: Vec<String> = statement
            .columns()
            .iter()
            .map(|column| column.name().to_uppercase())
            .collect();

        let mut prepared = statement.query();
        for bind in binds {
            prepared = match bind {
                BindValue::Bytes(bytes) => prepared.bind(bytes.clone()),
                BindValue::Int(value) => prepared.bind(*value),
                BindValue::Text(value) => prepared.bind(value.clone()),
            };
        }
        let rows = prepared
            .fetch_all(&mut *connection)
            .await
            .map_err(|error| ReportError::query(query.name(), error))?;

        let mut table = ResultTable::new(columns);
        for row in &rows {
            let values = decode_row(row).map_err(|message| ReportError::query(query.name(), message))?;
            table.push_row(values)?;
        }

        let elapsed: Duration = started.elapsed();
        log_slow_query!(
            elapsed,
            self.slow_query_ms,
            query = query.name(),
            rows = table.row_count(),
            "query finished"
        );
        Ok(table)
    }

    async fn close(&mut self) -> Result<()> {
        if let Some(connection) = self.connection.take() {
            connection
                .close()
                .await
                .map_err(|error| ReportError::Connection(error.to_string()))?;
            tracing::info!("database connection closed");
        }
        Ok(())
    }
}

fn decode_row(row: &PgRow) -> std::result::Result<Vec<CellValue>, String> {
    (0..row.columns().len())
        .map(|index| decode_cell(row, index))
        .collect()
}

fn decode_cell(row: &PgRow, index: usize) -> std::result::Result<CellValue, String> {
    let column = &row.columns()[index];
    let type_name = column.type_info().name();
    let failed = |error: sqlx::Error| format!("column {} ({type_name}): {error}", column.name());

    let value = match type_name {
        "BOOL" => row.try_get::<Option<bool>, _>(index).map_err(failed)?.into(),
        "INT2" => row
            .try_get::<Option<i16>, _>(index)
            .map_err(failed)?
            .map(i64::from)
            .into(),
        "INT4" => row
            .try_get::<Option<i32>, _>(index)
            .map_err(failed)?
            .map(i64::from)
            .into(),
        "INT8" => row.try_get::<Option<i64>, _>(index).map_err(failed)?.into(),
        "FLOAT4" => row
            .try_get::<Option<f32>, _>(index)
            .map_err(failed)?
            .map(f64::from)
            .into(),
        "FLOAT8" => row.try_get::<Option<f64>, _>(index).map_err(failed)?.into(),
        "NUMERIC" => row
            .try_get::<Option<Decimal>, _>(index)
            .map_err(failed)?
            .map(decimal_to_cell)
            .unwrap_or(CellValue::Null),
        "TEXT" | "VARCHAR" | "BPCHAR" | "NAME" | "CHAR" => {
            row.try_get::<Option<String>, _>(index).map_err(failed)?.into()
        }
        "DATE" => row.try_get::<Option<NaiveDate>, _>(index).map_err(failed)?.into(),
        "TIMESTAMP" => row
            .try_get::<Option<NaiveDateTime>, _>(index)
            .map_err(failed)?
            .map(CellValue::DateTime)
            .unwrap_or(CellValue::Null),
        "TIMESTAMPTZ" => row
            .try_get::<Option<DateTime<Utc>>, _>(index)
            .map_err(failed)?
            .map(|value| CellValue::DateTime(value.naive_utc()))
            .unwrap_or(CellValue::Null),
        "BYTEA" => row
            .try_get::<Option<Vec<u8>>, _>(index)
            .map_err(failed)?
            .map(|bytes| CellValue::Text(hex(&bytes)))
            .unwrap_or(CellValue::Null),
        _ => row
            .try_get_unchecked::<Option<String>, _>(index)
            .map_err(failed)?
            .into(),
    };
    Ok(value)
}

fn decimal_to_cell(value: Decimal) -> CellValue {
    if value.scale() == 0 {
        if let Some(int) = value.to_i64() {
            return CellValue::Int(int);
        }
    }
    value.to_f64().map(CellValue::Float).unwrap_or(CellValue::Null)
}

fn hex(bytes: &[u8]) -> String {
    bytes.iter().map(|byte| format!("{byte:02x}")).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_matches::assert_matches;
    use serial_test::serial;
    use std::str::FromStr;

    #[test]
    fn decimals_keep_integers_integral() {
        assert_eq!(decimal_to_cell(Decimal::from_str("42").unwrap()), CellValue::Int(42));
        assert_eq!(
            decimal_to_cell(Decimal::from_str("12.75").unwrap()),
            CellValue::Float(12.75)
        );
    }

    #[test]
    fn bytes_render_as_hex() {
        assert_eq!(hex(&[0x01, 0xab, 0xff]), "01abff");
    }

    #[test]
    fn credentials_debug_hides_password() {
        let credentials = Credentials::new("analyst", "s3cret");
        let rendered = format!("{credentials:?}");
        assert!(rendered.contains("analyst"));
        assert!(!rendered.contains("s3cret"));
    }

    #[test]
    #[serial]
    fn missing_credentials_are_a_connection_error() {
        unsafe {
            env::remove_var("LIR_TEST_USER");
            env::set_var("LIR_TEST_PWD", "pwd");
        }
        assert_matches!(
            Credentials::from_env("LIR_TEST_USER", "LIR_TEST_PWD"),
            Err(ReportError::Connection(message)) if message.contains("LIR_TEST_USER")
        );

        unsafe {
            env::set_var("LIR_TEST_USER", "analyst");
        }
        let credentials = Credentials::from_env("LIR_TEST_USER", "LIR_TEST_PWD").unwrap();
        assert_eq!(credentials.user(), "analyst");

        unsafe {
            env::remove_var("LIR_TEST_USER");
            env::remove_var("LIR_TEST_PWD");
        }
    }
}
