use thiserror::Error;

#[derive(Debug, Error, Clone)]
pub enum ChaletError {
    #[error("storage error: {0}")]
    Storage(String),
    #[error("adc error: {0}")]
    Adc(String),
    #[error("adc timeout")]
    AdcTimeout,
    #[error("record {name}: {source}")]
    Record {
        name: String,
        #[source]
        source: RecordError,
    },
    #[error("telemetry decode error: {0}")]
    Decode(#[from] DecodeError),
    #[error("configuration error: {0}")]
    Config(String),
}

/// A persisted text record that could not be parsed.
#[derive(Debug, Error, Clone, PartialEq)]
pub enum RecordError {
    #[error("field `{field}` has non-numeric token {token:?}")]
    BadToken { field: &'static str, token: String },
}

/// A received telemetry frame that does not match the record schema.
#[derive(Debug, Error, Clone, Copy, PartialEq, Eq)]
pub enum DecodeError {
    #[error("expected {expected} bytes, got {actual}")]
    WrongSize { expected: usize, actual: usize },
    #[error("unknown calibration mode {0}")]
    UnknownCalibrationMode(u8),
    #[error("decile {0} out of range 0..=9")]
    DecileOutOfRange(u8),
}

pub type Result<T, E = Report> = eyre::Result<T, E>;
pub use eyre::Report;
