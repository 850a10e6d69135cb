//! Error types for the scanning pipeline

use thiserror::Error;

/// Prompt rendering failure
#[derive(Debug, Error)]
pub enum PromptError {
    #[error("failed to compile prompt template '{name}': {message}")]
    Compile { name: String, message: String },

    #[error("failed to render prompt template '{name}': {message}")]
    Render { name: String, message: String },
}

impl PromptError {
    pub(crate) fn render(name: &str, err: minijinja::Error) -> Self {
        PromptError::Render {
            name: name.to_string(),
            message: err.to_string(),
        }
    }
}

/// Why a whole agent response could not be used
#[derive(Debug, Clone, Error, PartialEq)]
pub enum ParseFailure {
    #[error("agent reported a token or context limit")]
    TokenLimit,

    #[error("response is not valid JSON: {0}")]
    InvalidJson(String),

    #[error("response JSON is not an array")]
    NotAnArray,
}

/// Why one entity of a parsed batch gets a fallback result instead
#[derive(Debug, Clone, Error, PartialEq)]
pub enum ItemRejection {
    #[error("no item for this entity in the response")]
    Missing,

    #[error("item lacks required key '{0}'")]
    MissingKey(&'static str),

    #[error("rating {0} is outside 0..=5")]
    RatingOutOfRange(String),

    #[error("rating is not an integer: {0}")]
    RatingNotInteger(String),
}

/// Rejected scan requests; scans themselves never fail
#[derive(Debug, Error)]
pub enum ScanError {
    #[error(transparent)]
    InvalidRequest(#[from] hass_ai_config::ConfigError),

    #[error("entity {0} not found")]
    EntityNotFound(String),

    #[error("integration is not configured")]
    NotConfigured,

    #[error(transparent)]
    Correlation(#[from] crate::correlations::CorrelationError),
}

pub type ScanResult<T> = Result<T, ScanError>;
