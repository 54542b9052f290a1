//! Error taxonomy for provisioning steps

use crate::core::config::ConfigError;
use std::fmt;
use thiserror::Error;

/// Sub-kind of a failed remote API call
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ApiErrorKind {
    /// Credentials rejected
    Auth,
    /// Request throttled by the remote service
    RateLimited,
    /// Resource already exists (name collision)
    Conflict,
    /// Resource does not exist
    NotFound,
    /// 5xx from the remote service
    Server,
    /// Transport failure before a response arrived
    Network,
    /// Anything else
    Other,
}

impl ApiErrorKind {
    /// Whether a call failing this way may succeed if repeated
    pub fn is_transient(self) -> bool {
        matches!(
            self,
            ApiErrorKind::RateLimited | ApiErrorKind::Server | ApiErrorKind::Network
        )
    }
}

impl fmt::Display for ApiErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            ApiErrorKind::Auth => "authentication failed",
            ApiErrorKind::RateLimited => "rate limited",
            ApiErrorKind::Conflict => "conflict",
            ApiErrorKind::NotFound => "not found",
            ApiErrorKind::Server => "server error",
            ApiErrorKind::Network => "network error",
            ApiErrorKind::Other => "request failed",
        };
        f.write_str(label)
    }
}

/// Errors produced by steps and the services they call
#[derive(Debug, Error)]
pub enum ProvisionError {
    #[error("configuration error: {0}")]
    Configuration(#[from] ConfigError),

    #[error("{context}: {source}")]
    LocalIo {
        context: String,
        #[source]
        source: std::io::Error,
    },

    #[error("{service} API {kind}: {message}")]
    RemoteApi {
        service: &'static str,
        kind: ApiErrorKind,
        message: String,
    },

    #[error("{program} exited with code {code}: {}", .stderr.trim())]
    ExternalProcess {
        program: String,
        code: i32,
        stdout: String,
        stderr: String,
    },

    #[error("Timeout after {secs} seconds")]
    Timeout { secs: u64 },

    #[error("interrupted")]
    Interrupted,
}

impl ProvisionError {
    /// Build a `LocalIo` error with a description of what was being attempted
    pub fn io(context: impl Into<String>, source: std::io::Error) -> Self {
        ProvisionError::LocalIo {
            context: context.into(),
            source,
        }
    }

    /// Whether a retry policy should be applied to this error
    pub fn is_transient(&self) -> bool {
        match self {
            ProvisionError::RemoteApi { kind, .. } => kind.is_transient(),
            ProvisionError::ExternalProcess { .. } | ProvisionError::Timeout { .. } => true,
            _ => false,
        }
    }

    /// The API error kind, if this is a remote API failure
    pub fn api_kind(&self) -> Option<ApiErrorKind> {
        match self {
            ProvisionError::RemoteApi { kind, .. } => Some(*kind),
            _ => None,
        }
    }
}

/// A step error annotated with the name of the step that produced it
#[derive(Debug, Error)]
#[error("step '{step}' failed: {error}")]
pub struct StepFailure {
    pub step: String,
    #[source]
    pub error: ProvisionError,
}
