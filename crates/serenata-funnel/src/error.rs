//! Error types for the funnel.

use std::time::Duration;

use serenata_core::model::{RequiredField, SongId};
use thiserror::Error;

/// Errors from the remote collaborators (generation, datastore, checkout,
/// coupons, tracking).
#[derive(Debug, Error)]
pub enum ApiError {
    /// The service answered with a non-2xx status.
    #[error("HTTP error from {service}: {message}")]
    Http {
        service: &'static str,
        message: String,
    },

    /// The service answered, but declined the request.
    #[error("{service} rejected the request: {message}")]
    Rejected {
        service: &'static str,
        message: String,
    },

    /// A response body could not be parsed.
    #[error("parse error from {service}: {message}")]
    Parse {
        service: &'static str,
        message: String,
    },

    #[error("invalid endpoint: {0}")]
    Endpoint(#[from] url::ParseError),

    #[error("request error: {0}")]
    Request(#[from] reqwest::Error),
}

impl ApiError {
    /// Returns `true` when the error is transient and the operation may
    /// succeed if retried.
    pub fn is_transient(&self) -> bool {
        matches!(self, Self::Http { .. } | Self::Request(_))
    }
}

pub type ApiResult<T> = std::result::Result<T, ApiError>;

/// Why a generation run stopped without producing songs.
#[derive(Debug, Error)]
pub enum GenerationError {
    #[error("missing form data: {}", list_fields(.0))]
    Validation(Vec<RequiredField>),

    #[error("email address is not valid: {0}")]
    InvalidEmail(String),

    #[error("generation request failed: {0}")]
    Request(#[source] ApiError),

    #[error("the first song could not be generated")]
    FirstSongFailed,

    #[error("generation timed out after {} seconds", .after.as_secs())]
    TimedOut { after: Duration },

    #[error("generation was cancelled")]
    Cancelled,

    #[error("generation has already started")]
    AlreadyStarted,

    #[error("session error: {0}")]
    Session(#[from] serenata_core::Error),
}

impl GenerationError {
    /// Whether the "try again" path applies: go back to details and start a
    /// fresh run.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            Self::Request(_) | Self::FirstSongFailed | Self::TimedOut { .. }
        )
    }

    /// Whether the user has to fix their answers first.
    pub fn needs_input(&self) -> bool {
        matches!(self, Self::Validation(_) | Self::InvalidEmail(_))
    }
}

/// Errors on the comparison page.
#[derive(Debug, Error)]
pub enum ComparisonError {
    #[error("no songs available")]
    NoSongs,

    #[error("song {0} is not on this page")]
    UnknownSong(SongId),

    #[error("the bundle needs two songs")]
    BundleUnavailable,

    #[error("no song selected")]
    NoSelection,

    #[error("song {song_id} is missing {}; please generate it again", list_fields(.missing))]
    Integrity {
        song_id: SongId,
        missing: Vec<RequiredField>,
    },

    #[error(transparent)]
    Request(#[from] ApiError),

    #[error("session error: {0}")]
    Session(#[from] serenata_core::Error),
}

fn list_fields(fields: &[RequiredField]) -> String {
    fields
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join(", ")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_validation_message_lists_fields() {
        let err = GenerationError::Validation(vec![RequiredField::RecipientName, RequiredField::Email]);
        assert_eq!(err.to_string(), "missing form data: recipient name, email");
        assert!(err.needs_input());
        assert!(!err.is_retryable());
    }

    #[test]
    fn test_timeout_is_retryable() {
        let err = GenerationError::TimedOut {
            after: Duration::from_secs(600),
        };
        assert!(err.is_retryable());
        assert_eq!(err.to_string(), "generation timed out after 600 seconds");
    }

    #[test]
    fn test_integrity_message() {
        let err = ComparisonError::Integrity {
            song_id: SongId::new("s1"),
            missing: vec![RequiredField::Email],
        };
        assert_eq!(
            err.to_string(),
            "song s1 is missing email; please generate it again"
        );
    }

    #[test]
    fn test_rejections_are_not_transient() {
        let err = ApiError::Rejected {
            service: "coupons",
            message: "expired".to_string(),
        };
        assert!(!err.is_transient());
    }
}
