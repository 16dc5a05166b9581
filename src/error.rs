use thiserror::Error;

#[derive(Debug, Error)]
pub enum ExplorerError {
    #[error("schema unavailable: {0}")]
    SchemaUnavailable(String),
    #[error("schema malformed: {0}")]
    SchemaMalformed(String),
    #[error("a file must be selected before sending this request")]
    FileRequired,
    #[error("request body is not valid JSON: {0}")]
    MalformedRequestBody(String),
    #[error("unknown operation: {0}")]
    UnknownOperation(String),
    #[error("invalid value for {name}: {reason}")]
    InvalidInput { name: String, reason: String },
    #[error("unsupported method {0}")]
    UnsupportedMethod(String),
    #[error("persistence failure: {0}")]
    Persistence(String),
    #[error("transport: {0}")]
    Transport(String),
}

impl ExplorerError {
    pub fn invalid_input(name: &str, reason: impl Into<String>) -> Self {
        Self::InvalidInput {
            name: name.to_string(),
            reason: reason.into(),
        }
    }

    /// True for failures that block a request before any network I/O.
    pub fn is_blocking(&self) -> bool {
        matches!(
            self,
            Self::FileRequired | Self::MalformedRequestBody(_) | Self::InvalidInput { .. }
        )
    }
}

pub type Result<T> = std::result::Result<T, ExplorerError>;
