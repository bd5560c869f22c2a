//! Error taxonomy for the report jobs.
//!
//! Connection and input-format failures are the two classified fatal
//! conditions; everything else that goes wrong while querying propagates as a
//! `Query` error and stops the run. Nothing here is retried.

use std::fmt;
use std::path::PathBuf;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Stable codes attached to the final error log line of a failed run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[repr(i32)]
pub enum ErrorCode {
    /// Authentication or network failure reaching the warehouse
    Connection = 10,
    /// Area-of-interest file type not recognized or unreadable
    Format = 20,
    /// No polygon feature in the area-of-interest file
    NoPolygon = 21,
    /// Coordinate system could not be resolved to an EPSG code
    UnknownSpatialReference = 22,
    /// Query failed on the database side
    Query = 30,
    /// A bind parameter named in the SQL was not supplied
    MissingBind = 31,
    /// SQL template failed to render
    Template = 32,
    /// Two sheets collapse to the same name
    SheetNameConflict = 40,
    /// Workbook could not be written or read
    Workbook = 41,
    /// Invalid configuration
    Config = 50,
    /// File I/O error
    Io = 60,
}

impl ErrorCode {
    pub fn code(&self) -> i32 {
        *self as i32
    }

    pub fn category(&self) -> &'static str {
        match self {
            ErrorCode::Connection => "connection_error",
            ErrorCode::Format | ErrorCode::NoPolygon | ErrorCode::UnknownSpatialReference => {
                "input_error"
            }
            ErrorCode::Query | ErrorCode::MissingBind | ErrorCode::Template => "query_error",
            ErrorCode::SheetNameConflict | ErrorCode::Workbook => "output_error",
            ErrorCode::Config => "config_error",
            ErrorCode::Io => "io_error",
        }
    }
}

impl fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:?}({})", self, self.code())
    }
}

#[derive(Debug, Error)]
pub enum ReportError {
    #[error("connection failed: {0}. Please check your login parameters")]
    Connection(String),

    #[error("format not recognized for {path:?}: {message}")]
    Format { path: PathBuf, message: String },

    #[error("no polygon feature found in {path:?}")]
    NoPolygon { path: PathBuf },

    #[error("cannot determine the spatial reference of {path:?}; supply an explicit srid")]
    UnknownSpatialReference { path: PathBuf },

    #[error("query '{name}' failed: {message}")]
    Query { name: String, message: String },

    #[error("query '{query}' needs a value for bind parameter :{bind}")]
    MissingBind { query: String, bind: String },

    #[error("template '{template}' failed to render: {message}")]
    Template { template: String, message: String },

    #[error("sheet names '{first}' and '{second}' both resolve to '{sheet}'")]
    SheetNameConflict {
        first: String,
        second: String,
        sheet: String,
    },

    #[error("workbook error: {0}")]
    Workbook(String),

    #[error("invalid configuration: {0}")]
    Config(String),

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

impl ReportError {
    pub fn code(&self) -> ErrorCode {
        match self {
            ReportError::Connection(_) => ErrorCode::Connection,
            ReportError::Format { .. } => ErrorCode::Format,
            ReportError::NoPolygon { .. } => ErrorCode::NoPolygon,
            ReportError::UnknownSpatialReference { .. } => ErrorCode::UnknownSpatialReference,
            ReportError::Query { .. } => ErrorCode::Query,
            ReportError::MissingBind { .. } => ErrorCode::MissingBind,
            ReportError::Template { .. } => ErrorCode::Template,
            ReportError::SheetNameConflict { .. } => ErrorCode::SheetNameConflict,
            ReportError::Workbook(_) => ErrorCode::Workbook,
            ReportError::Config(_) => ErrorCode::Config,
            ReportError::Io(_) => ErrorCode::Io,
        }
    }

    pub(crate) fn format(path: impl Into<PathBuf>, message: impl Into<String>) -> Self {
        ReportError::Format {
            path: path.into(),
            message: message.into(),
        }
    }

    pub(crate) fn query(name: impl Into<String>, error: impl fmt::Display) -> Self {
        ReportError::Query {
            name: name.into(),
            message: error.to_string(),
        }
    }
}

impl From<rust_xlsxwriter::XlsxError> for ReportError {
    fn from(error: rust_xlsxwriter::XlsxError) -> Self {
        ReportError::Workbook(error.to_string())
    }
}

impl From<umya_spreadsheet::XlsxError> for ReportError {
    fn from(error: umya_spreadsheet::XlsxError) -> Self {
        ReportError::Workbook(error.to_string())
    }
}

/// Looks through an `anyhow` chain for the underlying `ReportError` code.
pub fn classify(error: &anyhow::Error) -> Option<ErrorCode> {
    error
        .chain()
        .find_map(|cause| cause.downcast_ref::<ReportError>())
        .map(ReportError::code)
}

pub type Result<T, E = ReportError> = std::result::Result<T, E>;

#[cfg(test)]
mod tests {
    use super::*;
    use anyhow::Context;

    #[test]
    fn categories_group_related_codes() {
        assert_eq!(ErrorCode::Connection.category(), "connection_error");
        assert_eq!(ErrorCode::Format.category(), "input_error");
        assert_eq!(ErrorCode::NoPolygon.category(), "input_error");
        assert_eq!(ErrorCode::MissingBind.category(), "query_error");
        assert_eq!(ErrorCode::SheetNameConflict.category(), "output_error");
    }

    #[test]
    fn classify_finds_code_under_context() {
        let failed: Result<()> = Err(ReportError::Connection("timeout".into()));
        let error = failed.context("connecting to warehouse").unwrap_err();
        assert_eq!(classify(&error), Some(ErrorCode::Connection));

        let plain = anyhow::anyhow!("something else");
        assert_eq!(classify(&plain), None);
    }

    #[test]
    fn display_includes_names() {
        let error = ReportError::SheetNameConflict {
            first: "a".into(),
            second: "A".into(),
            sheet: "a".into(),
        };
        assert_eq!(
            error.to_string(),
            "sheet names 'a' and 'A' both resolve to 'a'"
        );
        assert_eq!(error.code().to_string(), "SheetNameConflict(40)");
    }
}
