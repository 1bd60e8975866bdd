//! Error types for gridmet-cfsv2.
//!
//! One enum covers every failure the fetch core can report. Callers that
//! need to tell configuration mistakes apart from I/O or data problems use
//! [`Cfsv2Error::category`].

use thiserror::Error;

/// The main error type for gridmet-cfsv2 operations.
#[derive(Error, Debug)]
pub enum Cfsv2Error {
    /// NetCDF file operation errors
    #[error("NetCDF error: {0}")]
    NetCdf(#[from] netcdf::Error),

    /// IO errors
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Configuration errors
    #[error("Configuration error: {message}")]
    Config { message: String },

    /// A variable name that is not in the catalog
    #[error("Unknown variable: {name} (expected one of {expected})")]
    UnknownVariable { name: String, expected: String },

    /// An ensemble selector outside Day0..Median
    #[error("Unsupported ensemble type: {value} (expected one of {expected})")]
    UnsupportedEnsemble { value: String, expected: String },

    /// Malformed or out-of-order dates
    #[error("Invalid date: {message}")]
    InvalidDate { message: String },

    /// Invalid parameter errors
    #[error("Invalid parameter: {param} - {message}")]
    InvalidParameter { param: String, message: String },

    /// The remote server answered, but not with a usable dataset
    #[error("Remote error for {url}: {message}")]
    Remote { url: String, message: String },

    /// A fetch exceeded its per-request timeout or overall deadline
    #[error("Timed out: {message}")]
    Timeout { message: String },

    /// Dataset content errors (missing dimensions, mismatched members, ...)
    #[error("Data error: {message}")]
    Data { message: String },

    /// Array shape errors
    #[error("Shape error: {0}")]
    Shape(#[from] ndarray::ShapeError),

    /// JSON serialization/deserialization errors
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// CSV errors from the HRU weights file
    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    /// Transport-level HTTP errors
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),
}

/// Coarse classification of a [`Cfsv2Error`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorCategory {
    /// Bad input from the caller; never retried
    Configuration,
    /// Network or filesystem failures
    Io,
    /// Malformed or inconsistent dataset content
    Data,
}

impl Cfsv2Error {
    /// Classify this error.
    pub fn category(&self) -> ErrorCategory {
        match self {
            Cfsv2Error::Config { .. }
            | Cfsv2Error::UnknownVariable { .. }
            | Cfsv2Error::UnsupportedEnsemble { .. }
            | Cfsv2Error::InvalidDate { .. }
            | Cfsv2Error::InvalidParameter { .. }
            | Cfsv2Error::Json(_) => ErrorCategory::Configuration,
            Cfsv2Error::Io(_)
            | Cfsv2Error::Remote { .. }
            | Cfsv2Error::Timeout { .. }
            | Cfsv2Error::Http(_) => ErrorCategory::Io,
            Cfsv2Error::NetCdf(_)
            | Cfsv2Error::Data { .. }
            | Cfsv2Error::Shape(_)
            | Cfsv2Error::Csv(_) => ErrorCategory::Data,
        }
    }

    /// True for errors caused by caller input.
    pub fn is_config_error(&self) -> bool {
        self.category() == ErrorCategory::Configuration
    }
}

/// Convenience type alias for Results with Cfsv2Error
pub type Result<T> = std::result::Result<T, Cfsv2Error>;
