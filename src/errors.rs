//! Typed error hierarchy for pagesmith.
//!
//! One enum per subsystem:
//! - `GatewayError`: request rejection at the HTTP surface (the only errors a submitter sees)
//! - `GenerationError`: text-generation call and reply parsing
//! - `PublishError`: hosting API and version-control failures
//! - `NotifyError`: callback delivery after all retries
//! - `JobError`: anything that aborts a background job

use std::path::PathBuf;

use thiserror::Error;

/// Errors surfaced synchronously by the job gateway.
#[derive(Debug, Error)]
pub enum GatewayError {
    #[error("Invalid secret")]
    Authentication,

    #[error("Invalid request: {0}")]
    Validation(String),
}

/// Errors from the generation adapter.
#[derive(Debug, Error)]
pub enum GenerationError {
    #[error("Model output could not be parsed as a file list: {reason}")]
    MalformedModelOutput { reason: String, raw: String },

    #[error("Model proposed a path outside the workspace: {path}")]
    UnsafePath { path: String },

    #[error("Generation service returned {status}: {body}")]
    Service { status: u16, body: String },

    #[error("Generation request failed: {0}")]
    Transport(#[source] anyhow::Error),
}

/// Errors from the publisher.
#[derive(Debug, Error)]
pub enum PublishError {
    #[error("Repository creation failed for {repo} ({status}): {body}")]
    RepoCreation { repo: String, status: u16, body: String },

    #[error("Hosting API request failed: {0}")]
    HostingApi(#[source] anyhow::Error),

    #[error("git {command} failed: {message}")]
    Git { command: String, message: String },

    #[error("Workspace I/O failed at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl From<git2::Error> for PublishError {
    fn from(err: git2::Error) -> Self {
        PublishError::Git {
            command: "libgit2".to_string(),
            message: err.message().to_string(),
        }
    }
}

/// Callback delivery gave up.
#[derive(Debug, Error)]
pub enum NotifyError {
    #[error("Callback delivery failed after {attempts} attempts: {last_error}")]
    Exhausted { attempts: u32, last_error: String },
}

/// Errors that abort a background job. Never reaches an HTTP response.
#[derive(Debug, Error)]
pub enum JobError {
    #[error("Failed to prepare workspace {path}: {source}")]
    Workspace {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Attachment '{name}' rejected: {reason}")]
    Attachment { name: String, reason: String },

    #[error(transparent)]
    Generation(#[from] GenerationError),

    #[error(transparent)]
    Publish(#[from] PublishError),

    #[error("Background task failed: {0}")]
    Join(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn gateway_errors_are_matchable() {
        let err = GatewayError::Validation("missing field `email`".into());
        match &err {
            GatewayError::Validation(msg) => assert!(msg.contains("email")),
            _ => panic!("Expected Validation"),
        }
        assert!(matches!(GatewayError::Authentication, GatewayError::Authentication));
    }

    #[test]
    fn malformed_output_keeps_raw_reply() {
        let err = GenerationError::MalformedModelOutput {
            reason: "expected value".into(),
            raw: "Sure! Here are your files".into(),
        };
        match &err {
            GenerationError::MalformedModelOutput { raw, .. } => {
                assert!(raw.starts_with("Sure!"));
            }
            _ => panic!("Expected MalformedModelOutput"),
        }
        assert!(!err.to_string().contains("Sure!"));
    }

    #[test]
    fn repo_creation_carries_status() {
        let err = PublishError::RepoCreation {
            repo: "t1".into(),
            status: 401,
            body: "Bad credentials".into(),
        };
        assert!(err.to_string().contains("401"));
        assert!(err.to_string().contains("t1"));
    }

    #[test]
    fn git2_errors_convert_to_publish_errors() {
        let err: PublishError = git2::Error::from_str("reference not found").into();
        match err {
            PublishError::Git { message, .. } => assert_eq!(message, "reference not found"),
            _ => panic!("Expected Git"),
        }
    }

    #[test]
    fn job_error_wraps_step_errors() {
        let inner = GenerationError::UnsafePath { path: "../etc/passwd".into() };
        let job_err: JobError = inner.into();
        assert!(matches!(job_err, JobError::Generation(GenerationError::UnsafePath { .. })));

        let notify = NotifyError::Exhausted { attempts: 5, last_error: "HTTP 500".into() };
        assert!(notify.to_string().contains("5 attempts"));
    }

    #[test]
    fn all_error_types_implement_std_error_trait() {
        fn assert_std_error<E: std::error::Error>(_: &E) {}
        assert_std_error(&GatewayError::Authentication);
        assert_std_error(&GenerationError::UnsafePath { path: "x".into() });
        assert_std_error(&PublishError::Git { command: "push".into(), message: "x".into() });
        assert_std_error(&NotifyError::Exhausted { attempts: 1, last_error: "x".into() });
        assert_std_error(&JobError::Join("x".into()));
    }
}
