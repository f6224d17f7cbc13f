//! Error types for sigscan.

use thiserror::Error;

/// sigscan error type.
#[derive(Error, Debug)]
pub enum Error {
    /// I/O error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON parsing error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Missing file, histogram, or store entry
    #[error("not found: {0}")]
    NotFound(String),

    /// Bin layout mismatch between histograms that must be combined
    #[error("incompatible binning: {0}")]
    IncompatibleBinning(String),

    /// Non-positive integral (or similar) where normalization requires division
    #[error("invalid histogram: {0}")]
    InvalidHistogram(String),

    /// The null-toy distribution failed to bound the observed statistic
    #[error(
        "saturated p-value: {tail} of {n_toys} null toys at or above the observed statistic"
    )]
    SaturatedPValue {
        /// Tail count (`0` or `n_toys`).
        tail: usize,
        /// Number of valid null toys.
        n_toys: usize,
    },

    /// Likelihood maximization did not converge
    #[error("optimizer failure: {0}")]
    OptimizerFailure(String),

    /// Missing or inconsistent configuration for a declared channel
    #[error("configuration error: {0}")]
    ConfigurationError(String),

    /// Validation error
    #[error("validation error: {0}")]
    Validation(String),
}

impl Error {
    /// Stable reason code for this error, used in failed scan rows.
    pub fn code(&self) -> &'static str {
        match self {
            Error::Io(_) => "io",
            Error::Json(_) => "json",
            Error::NotFound(_) => "not_found",
            Error::IncompatibleBinning(_) => "incompatible_binning",
            Error::InvalidHistogram(_) => "invalid_histogram",
            Error::SaturatedPValue { .. } => "saturated_p_value",
            Error::OptimizerFailure(_) => "optimizer_failure",
            Error::ConfigurationError(_) => "configuration_error",
            Error::Validation(_) => "validation",
        }
    }
}

/// Result type alias.
pub type Result<T> = std::result::Result<T, Error>;
