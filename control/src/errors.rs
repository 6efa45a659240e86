//! Error types for the Caravel control plane

use thiserror::Error;

/// Main error type for the control plane
#[derive(Error, Debug)]
pub enum ControlError {
    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    JsonError(#[from] serde_json::Error),

    #[error("HTTP error: {0}")]
    HttpError(#[from] reqwest::Error),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Unauthorized: {0}")]
    Unauthorized(String),

    #[error("Precondition failed: {0}")]
    PreconditionFailed(String),

    #[error("Invalid transition: {from} does not accept '{label}'")]
    InvalidTransition { from: String, label: String },

    #[error("Routing store error: {0}")]
    RoutingError(String),

    #[error("Function platform error: {0}")]
    FunctionPlatformError(String),

    #[error("DNS error: {0}")]
    DnsError(String),

    #[error("Artifact storage error: {0}")]
    ArtifactError(String),

    #[error("Registry error: {0}")]
    RegistryError(String),

    #[error("Partial failure (rolled back): {0}")]
    PartialFailure(String),

    #[error("Configuration error: {0}")]
    ConfigError(String),

    #[error("Server error: {0}")]
    ServerError(String),

    #[error("Shutdown error: {0}")]
    ShutdownError(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl ControlError {
    /// Stable machine-readable kind for API responses. Raw internal detail
    /// never reaches external callers through this.
    pub fn kind(&self) -> &'static str {
        match self {
            ControlError::NotFound(_) => "not_found",
            ControlError::Unauthorized(_) => "unauthorized",
            ControlError::PreconditionFailed(_) | ControlError::InvalidTransition { .. } => {
                "precondition_failed"
            }
            ControlError::RoutingError(_)
            | ControlError::FunctionPlatformError(_)
            | ControlError::DnsError(_)
            | ControlError::ArtifactError(_) => "upstream_failure",
            ControlError::PartialFailure(_) => "partial_failure",
            _ => "internal",
        }
    }
}

impl From<anyhow::Error> for ControlError {
    fn from(err: anyhow::Error) -> Self {
        ControlError::Internal(err.to_string())
    }
}
