//! Domain error types.

use chrono::NaiveDateTime;

/// Top-level error type for ssbt.
#[derive(Debug, thiserror::Error)]
pub enum SsbtError {
    #[error("config parse error in {file}: {reason}")]
    ConfigParse { file: String, reason: String },

    #[error("missing config key [{section}] {key}")]
    ConfigMissing { section: String, key: String },

    #[error("invalid config value [{section}] {key}: {reason}")]
    ConfigInvalid {
        section: String,
        key: String,
        reason: String,
    },

    #[error("data error: {reason}")]
    Data { reason: String },

    #[error("unknown strategy: {name}")]
    UnknownStrategy { name: String },

    #[error("price series is empty")]
    EmptySeries,

    #[error("price series is missing required column '{column}'")]
    MissingColumn { column: String },

    #[error("column '{column}' has {actual} rows, expected {expected}")]
    ColumnLength {
        column: String,
        expected: usize,
        actual: usize,
    },

    #[error("timestamps not strictly increasing at row {index}: {previous} then {current}")]
    NonMonotonicTimestamps {
        index: usize,
        previous: NaiveDateTime,
        current: NaiveDateTime,
    },

    #[error("column '{column}' has a non-finite value at row {index}: {value}")]
    NonFiniteValue {
        column: String,
        index: usize,
        value: f64,
    },

    #[error("zero denominator in {operation}")]
    ZeroDenominator { operation: &'static str },

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

impl From<&SsbtError> for std::process::ExitCode {
    fn from(err: &SsbtError) -> Self {
        let code: u8 = match err {
            SsbtError::Io(_) => 1,
            SsbtError::ConfigParse { .. }
            | SsbtError::ConfigMissing { .. }
            | SsbtError::ConfigInvalid { .. } => 2,
            SsbtError::Data { .. } => 3,
            SsbtError::UnknownStrategy { .. } => 4,
            SsbtError::EmptySeries
            | SsbtError::MissingColumn { .. }
            | SsbtError::ColumnLength { .. }
            | SsbtError::NonMonotonicTimestamps { .. }
            | SsbtError::NonFiniteValue { .. } => 5,
            SsbtError::ZeroDenominator { .. } => 6,
        };
        std::process::ExitCode::from(code)
    }
}
