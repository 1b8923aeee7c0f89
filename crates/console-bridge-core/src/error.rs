//! Error taxonomy for query-side operations.

use thiserror::Error;

/// Core error.
#[derive(Debug, Error)]
pub enum CoreError {
    #[error("Invalid pattern `{pattern}`: {source}")]
    InvalidPattern {
        pattern: String,
        #[source]
        source: regex::Error,
    },
    #[error("Invalid time bound: {0}")]
    InvalidTimeBound(String),
    #[error("At least one keyword is required")]
    EmptyKeywords,
    #[error("Log not found: {0}")]
    LogNotFound(String),
    #[error("Export failed: {0}")]
    Export(#[from] ExportError),
}

impl CoreError {
    /// Whether this error was caused by caller input rather than missing data.
    #[must_use]
    pub const fn is_input_error(&self) -> bool {
        matches!(
            self,
            Self::InvalidPattern { .. } | Self::InvalidTimeBound(_) | Self::EmptyKeywords
        )
    }

    pub(crate) fn invalid_pattern(pattern: &str, source: regex::Error) -> Self {
        Self::InvalidPattern {
            pattern: pattern.to_string(),
            source,
        }
    }
}

/// Export rendering error.
#[derive(Debug, Error)]
pub enum ExportError {
    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
    #[error("Output is not valid UTF-8")]
    Utf8(#[from] std::string::FromUtf8Error),
}
