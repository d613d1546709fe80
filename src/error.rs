// ⚠️ Error Types - structural, configuration and per-record failures
//
// ImportError aborts a source (or the whole run when raised during init).
// RecordError only ever drops the offending article/row.

use thiserror::Error;

use crate::tabular::Column;

#[derive(Error, Debug)]
pub enum ImportError {
    #[error("malformed {stream} stream at byte {position}: {message}")]
    Decode {
        stream: &'static str,
        position: u64,
        message: String,
    },

    #[error("price not found for id: {0}")]
    PriceNotFound(String),

    #[error("could not find header line")]
    HeaderNotFound,

    #[error("invalid pattern for column {column}: {source}")]
    InvalidPattern {
        column: Column,
        #[source]
        source: regex::Error,
    },

    #[error("unknown encoding '{0}'")]
    UnknownEncoding(String),

    #[error("no spreadsheets in file")]
    EmptyWorkbook,

    #[error("unsupported location '{0}' (expected a local path or an http(s) url)")]
    UnsupportedLocation(String),

    #[error("file is too big (limit: {limit} bytes)")]
    TooLarge { limit: u64 },

    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl ImportError {
    /// A missing price only drops one article; everything else ends the run
    pub fn is_recoverable(&self) -> bool {
        matches!(self, ImportError::PriceNotFound(_))
    }
}

#[derive(Error, Debug, Clone, PartialEq)]
pub enum RecordError {
    #[error("could not parse {column} '{value}'")]
    InvalidNumber { column: Column, value: String },

    #[error("can not get selling factor '{0}'")]
    UnknownSellingFactor(String),

    #[error("margin of {0}% does not give a selling factor")]
    InvalidMargin(f64),

    #[error("purchase price is zero, selling factor undefined")]
    ZeroPurchasePrice,
}

pub type Result<T> = std::result::Result<T, ImportError>;
