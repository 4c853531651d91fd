//! Error types for SiteBuilder.
//!
//! Library crates use [`SiteBuilderError`] via `thiserror`.
//! The CLI wraps this with `color-eyre` for rich diagnostics.

use std::fmt;
use std::path::PathBuf;

use crate::types::{QualityScore, Service};

/// Top-level error type for all SiteBuilder operations.
#[derive(Debug, thiserror::Error)]
pub enum SiteBuilderError {
    /// Configuration loading or validation error.
    #[error("config error: {message}")]
    Config { message: String },

    /// Missing or malformed build request fields.
    #[error("validation error: {message}")]
    Validation { message: String },

    /// An external content service (drafting, judging, tokens) failed.
    #[error("{service} service error: {message}")]
    Upstream { service: Service, message: String },

    /// Drafted copy did not pass the quality gate.
    #[error("content rejected by quality gate ({score})")]
    ContentRejected { score: QualityScore },

    /// The requested template does not exist in the template store.
    #[error("template '{template_id}' not found at {path:?}")]
    TemplateNotFound { template_id: String, path: PathBuf },

    /// Filesystem failure while materializing a build workspace.
    #[error("workspace error ({context}) at {path:?}: {source}")]
    Workspace {
        context: &'static str,
        path: PathBuf,
        source: std::io::Error,
    },

    /// Another run already holds the workspace for this organization.
    #[error("a build for organization '{organization_id}' is already in progress")]
    WorkspaceBusy { organization_id: String },

    /// The build tool could not be started.
    #[error("failed to start build tool `{command}`: {source}")]
    BuildSpawn {
        command: String,
        source: std::io::Error,
    },

    /// The build tool exited unsuccessfully.
    #[error("build tool exited with status {}: {diagnostics}", fmt_exit_code(.exit_code))]
    BuildTool {
        exit_code: Option<i32>,
        diagnostics: String,
    },

    /// The build tool was terminated before it finished.
    #[error("build cancelled: {reason}")]
    BuildCancelled { reason: String },

    /// Filesystem I/O error outside a workspace.
    #[error("I/O error at {path:?}: {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },
}

/// Convenience alias used throughout the codebase.
pub type Result<T> = std::result::Result<T, SiteBuilderError>;

fn fmt_exit_code(code: &Option<i32>) -> String {
    code.map_or_else(|| "unknown (terminated by signal)".into(), |c| c.to_string())
}

/// Caller-facing classification of a failed run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FailureCategory {
    Validation,
    Conflict,
    ContentQuality,
    WorkspaceError,
    BuildError,
    UpstreamServiceError,
    Config,
}

impl FailureCategory {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Validation => "validation",
            Self::Conflict => "conflict",
            Self::ContentQuality => "content-quality",
            Self::WorkspaceError => "workspace-error",
            Self::BuildError => "build-error",
            Self::UpstreamServiceError => "upstream-service-error",
            Self::Config => "config",
        }
    }
}

impl fmt::Display for FailureCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl SiteBuilderError {
    /// Create a config error from any displayable message.
    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config {
            message: msg.into(),
        }
    }

    /// Create a validation error from any displayable message.
    pub fn validation(msg: impl Into<String>) -> Self {
        Self::Validation {
            message: msg.into(),
        }
    }

    /// Create an upstream service error.
    pub fn upstream(service: Service, msg: impl Into<String>) -> Self {
        Self::Upstream {
            service,
            message: msg.into(),
        }
    }

    /// Wrap a `std::io::Error` raised while writing a workspace.
    pub fn workspace(
        context: &'static str,
        path: impl Into<PathBuf>,
        source: std::io::Error,
    ) -> Self {
        Self::Workspace {
            context,
            path: path.into(),
            source,
        }
    }

    /// Wrap a `std::io::Error` with a path for context.
    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }

    /// The failure category reported to callers of the pipeline.
    pub fn category(&self) -> FailureCategory {
        match self {
            Self::Config { .. } => FailureCategory::Config,
            Self::Validation { .. } => FailureCategory::Validation,
            Self::Upstream { .. } => FailureCategory::UpstreamServiceError,
            Self::ContentRejected { .. } => FailureCategory::ContentQuality,
            Self::TemplateNotFound { .. } | Self::Workspace { .. } | Self::Io { .. } => {
                FailureCategory::WorkspaceError
            }
            Self::WorkspaceBusy { .. } => FailureCategory::Conflict,
            Self::BuildSpawn { .. } | Self::BuildTool { .. } | Self::BuildCancelled { .. } => {
                FailureCategory::BuildError
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn error_display_formatting() {
        let err = SiteBuilderError::config("missing API key");
        assert_eq!(err.to_string(), "config error: missing API key");

        let err = SiteBuilderError::upstream(Service::Judging, "HTTP 502");
        assert_eq!(err.to_string(), "judging service error: HTTP 502");

        let err = SiteBuilderError::BuildTool {
            exit_code: Some(1),
            diagnostics: "error: missing config".into(),
        };
        assert!(err.to_string().contains("status 1"));
        assert!(err.to_string().contains("missing config"));
    }

    #[test]
    fn categories() {
        let rejected = SiteBuilderError::ContentRejected {
            score: QualityScore {
                fluency: 3.0,
                originality: 5.0,
            },
        };
        assert_eq!(rejected.category(), FailureCategory::ContentQuality);

        let missing = SiteBuilderError::TemplateNotFound {
            template_id: "nope".into(),
            path: PathBuf::from("/tmp/nope"),
        };
        assert_eq!(missing.category(), FailureCategory::WorkspaceError);

        let busy = SiteBuilderError::WorkspaceBusy {
            organization_id: "1".into(),
        };
        assert_eq!(busy.category().as_str(), "conflict");

        let cancelled = SiteBuilderError::BuildCancelled {
            reason: "timeout".into(),
        };
        assert_eq!(cancelled.category(), FailureCategory::BuildError);
    }

    #[test]
    fn signal_exit_is_reported() {
        let err = SiteBuilderError::BuildTool {
            exit_code: None,
            diagnostics: String::new(),
        };
        assert!(err.to_string().contains("terminated by signal"));
    }
}
