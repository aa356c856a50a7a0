use thiserror::Error;

/// Errors raised by the COQL pipeline and its upstream clients
#[derive(Error, Debug)]
pub enum CoqlError {
    #[error("API Error: {0}")]
    ApiError(String),

    #[error("Configuration Error: {0}")]
    ConfigError(String),

    #[error("Request Error: {0}")]
    RequestError(String),

    #[error("Response Error: {0}")]
    ResponseError(String),

    #[error("Parsing Error: {0}")]
    ParsingError(String),

    #[error("Invalid COQL query: {0}")]
    ValidationError(String),

    #[error("HTTP Error: {status_code} - {message}")]
    HttpError { status_code: u16, message: String },

    #[error(transparent)]
    ReqwestError(#[from] reqwest::Error),

    #[error(transparent)]
    SerdeError(#[from] serde_json::Error),
}

impl From<::config::ConfigError> for CoqlError {
    fn from(err: ::config::ConfigError) -> Self {
        CoqlError::ConfigError(err.to_string())
    }
}

/// Result type for COQL operations
pub type CoqlResult<T> = Result<T, CoqlError>;
