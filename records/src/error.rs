use thiserror::Error;

#[derive(Error, Debug)]
pub enum RecordError {
    #[error("{0}")]
    Io(#[from] std::io::Error),

    #[error("invalid record format: {0}")]
    InvalidVersion(i16),

    #[error("invalid record size: {0}")]
    InvalidSize(i64),

    #[error("record {rectype} truncated at field {field}")]
    Truncated { rectype: String, field: String },

    #[error("no definition for record type {0}")]
    Definition(String),

    #[error("record type name is not ascii")]
    Utf8,
}
