//! Error types for LeadForge.
//!
//! Library crates use [`LeadForgeError`] via `thiserror`.
//! The CLI wraps this with `color-eyre` and turns it into user-facing copy
//! through [`LeadForgeError::user_message`].

use std::path::PathBuf;

use crate::types::Stage;

/// Coarse classification of an error, stable across variants.
///
/// Presentation layers map a kind to copy; the core keeps the full error.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    ConfigMissing,
    UpstreamUnavailable,
    RateLimited,
    ParseFailure,
    NotFound,
    StageBlocked,
    Cancelled,
    Validation,
    Storage,
    Io,
}

/// Top-level error type for all LeadForge operations.
#[derive(Debug, thiserror::Error)]
pub enum LeadForgeError {
    /// Missing API key, search engine id, or unreadable config file.
    #[error("config error: {message}")]
    Config { message: String },

    /// An external provider failed (transport error or non-success status).
    #[error("{service} request failed{}: {message}", status_suffix(.status))]
    Upstream {
        service: String,
        status: Option<u16>,
        message: String,
    },

    /// An external provider rejected the call for quota/rate reasons.
    #[error("{service} rate limited: {message}")]
    RateLimited { service: String, message: String },

    /// Malformed provider payload (bad JSON, missing fields).
    #[error("parse error: {message}")]
    Parse { message: String },

    /// A lead, activity, campaign, or provider match does not exist.
    #[error("not found: {0}")]
    NotFound(String),

    /// Database or storage layer error.
    #[error("storage error: {0}")]
    Storage(String),

    /// A stage was requested before its prerequisite completed.
    #[error("{stage} is blocked: {reason}")]
    StageBlocked { stage: Stage, reason: String },

    /// A long-running operation was cancelled by the caller.
    #[error("operation cancelled")]
    Cancelled,

    /// Filesystem I/O error.
    #[error("I/O error at {path:?}: {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },

    /// Input validation error.
    #[error("validation error: {message}")]
    Validation { message: String },
}

fn status_suffix(status: &Option<u16>) -> String {
    status.map(|s| format!(" (HTTP {s})")).unwrap_or_default()
}

/// Convenience alias used throughout the codebase.
pub type Result<T> = std::result::Result<T, LeadForgeError>;

impl LeadForgeError {
    /// Create a config error from any displayable message.
    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config {
            message: msg.into(),
        }
    }

    /// Create a parse error from any displayable message.
    pub fn parse(msg: impl Into<String>) -> Self {
        Self::Parse {
            message: msg.into(),
        }
    }

    /// Create a validation error from any displayable message.
    pub fn validation(msg: impl Into<String>) -> Self {
        Self::Validation {
            message: msg.into(),
        }
    }

    /// Create an upstream error for `service`.
    pub fn upstream(service: impl Into<String>, status: Option<u16>, msg: impl Into<String>) -> Self {
        Self::Upstream {
            service: service.into(),
            status,
            message: msg.into(),
        }
    }

    /// Map an HTTP error status from `service` to the matching variant.
    ///
    /// 429 becomes [`LeadForgeError::RateLimited`], everything else is
    /// [`LeadForgeError::Upstream`] with the status preserved.
    pub fn from_status(service: impl Into<String>, status: u16, body: impl Into<String>) -> Self {
        let service = service.into();
        let body = body.into();
        if status == 429 {
            Self::RateLimited {
                service,
                message: body,
            }
        } else {
            Self::Upstream {
                service,
                status: Some(status),
                message: body,
            }
        }
    }

    /// Wrap a `std::io::Error` with a path for context.
    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }

    /// Structured classification of this error.
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::Config { .. } => ErrorKind::ConfigMissing,
            Self::Upstream { .. } => ErrorKind::UpstreamUnavailable,
            Self::RateLimited { .. } => ErrorKind::RateLimited,
            Self::Parse { .. } => ErrorKind::ParseFailure,
            Self::NotFound(_) => ErrorKind::NotFound,
            Self::Storage(_) => ErrorKind::Storage,
            Self::StageBlocked { .. } => ErrorKind::StageBlocked,
            Self::Cancelled => ErrorKind::Cancelled,
            Self::Io { .. } => ErrorKind::Io,
            Self::Validation { .. } => ErrorKind::Validation,
        }
    }

    /// True when the provider rejected our credentials (HTTP 401/403).
    pub fn is_unauthorized(&self) -> bool {
        matches!(
            self,
            Self::Upstream {
                status: Some(401 | 403),
                ..
            }
        )
    }

    /// Short copy suitable for showing to an end user.
    pub fn user_message(&self) -> String {
        match self {
            Self::Config { message } => format!("Configuration needed: {message}"),
            Self::Upstream {
                service,
                status: Some(401 | 403),
                ..
            } => format!("{service} rejected the API key. Check your provider settings."),
            Self::Upstream { service, .. } => {
                format!("{service} is unavailable right now. Try again in a moment.")
            }
            Self::RateLimited { service, .. } => {
                format!("{service} is rate limiting requests. Wait a minute and retry.")
            }
            Self::Parse { .. } => {
                "The provider returned a response we could not read. Try running the step again."
                    .to_string()
            }
            Self::NotFound(what) => format!("Not found: {what}"),
            Self::StageBlocked { stage, reason } => format!("{} cannot run yet: {reason}", stage.label()),
            Self::Cancelled => "Cancelled.".to_string(),
            Self::Storage(_) | Self::Io { .. } => {
                "Local data could not be read or written. See logs for details.".to_string()
            }
            Self::Validation { message } => message.clone(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn error_display_formatting() {
        let err = LeadForgeError::config("missing API key");
        assert_eq!(err.to_string(), "config error: missing API key");

        let err = LeadForgeError::upstream("Google Places", Some(500), "boom");
        assert_eq!(err.to_string(), "Google Places request failed (HTTP 500): boom");

        let err = LeadForgeError::upstream("Apollo", None, "connection reset");
        assert_eq!(err.to_string(), "Apollo request failed: connection reset");
    }

    #[test]
    fn status_429_is_rate_limited() {
        let err = LeadForgeError::from_status("OpenAI", 429, "slow down");
        assert_eq!(err.kind(), ErrorKind::RateLimited);

        let err = LeadForgeError::from_status("OpenAI", 503, "overloaded");
        assert_eq!(err.kind(), ErrorKind::UpstreamUnavailable);
    }

    #[test]
    fn unauthorized_detection() {
        assert!(LeadForgeError::from_status("Perplexity", 401, "").is_unauthorized());
        assert!(!LeadForgeError::from_status("Perplexity", 500, "").is_unauthorized());
        assert!(!LeadForgeError::config("x").is_unauthorized());
    }

    #[test]
    fn user_message_hides_internals() {
        let err = LeadForgeError::Storage("disk I/O error at page 12".into());
        assert!(!err.user_message().contains("page 12"));

        let err = LeadForgeError::StageBlocked {
            stage: Stage::PropertyAnalysis,
            reason: "geo enrichment has not completed".into(),
        };
        assert!(err.user_message().starts_with("Property Analysis cannot run yet"));
        assert_eq!(err.kind(), ErrorKind::StageBlocked);
    }
}
