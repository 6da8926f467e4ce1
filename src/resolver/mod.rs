//! Resolution of caller-supplied references into a [`MergedFeedSpec`].
//!
//! The aggregation pipeline never looks at where a merge request came from.
//! Anything that can turn a reference token into feed metadata plus a source
//! list implements [`SourceResolver`]; the HTTP layer holds one behind an `Arc`.
//!
//! Unlike source failures, resolution failures are fatal to the request:
//! without a merge request there is nothing to aggregate.

mod gist;

pub use gist::{parse_gist_id, GistResolver, DEFAULT_GITHUB_API_BASE};

use crate::feed::{FetchError, MergedFeedSpec};
use async_trait::async_trait;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ResolveError {
    /// The reference does not name an existing document
    #[error("Reference not found")]
    NotFound,
    /// The reference itself is syntactically unusable
    #[error("Invalid reference: {0}")]
    InvalidReference(String),
    /// The backing document exists but does not have the expected shape
    #[error("Malformed document: {0}")]
    Malformed(String),
    /// A required metadata field is absent
    #[error("Missing required field: {0}")]
    MissingField(&'static str),
    #[error("Request failed: {0}")]
    Network(#[from] reqwest::Error),
    #[error("HTTP error: status {0}")]
    HttpStatus(u16),
    #[error("Request timed out")]
    Timeout,
    #[error("Response too large")]
    ResponseTooLarge,
    /// SEC-002: Credentials are only sent over HTTPS (localhost excepted)
    #[error("Insecure API base URL: HTTPS required (except localhost for testing)")]
    InsecureApiBase,
}

impl From<FetchError> for ResolveError {
    fn from(e: FetchError) -> Self {
        match e {
            FetchError::Network(e) => ResolveError::Network(e),
            FetchError::HttpStatus(404) => ResolveError::NotFound,
            FetchError::HttpStatus(status) => ResolveError::HttpStatus(status),
            FetchError::Timeout => ResolveError::Timeout,
            FetchError::ResponseTooLarge => ResolveError::ResponseTooLarge,
            FetchError::IncompleteResponse { expected, received } => ResolveError::Malformed(
                format!("truncated response: expected {expected} bytes, received {received}"),
            ),
        }
    }
}

/// Turns a reference token into a complete merge request.
#[async_trait]
pub trait SourceResolver: Send + Sync {
    /// Resolves `reference` into feed metadata and an ordered source list.
    async fn resolve(&self, reference: &str) -> Result<MergedFeedSpec, ResolveError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fetch_error_mapping() {
        assert!(matches!(
            ResolveError::from(FetchError::HttpStatus(404)),
            ResolveError::NotFound
        ));
        assert!(matches!(
            ResolveError::from(FetchError::HttpStatus(503)),
            ResolveError::HttpStatus(503)
        ));
        assert!(matches!(
            ResolveError::from(FetchError::Timeout),
            ResolveError::Timeout
        ));
        assert!(matches!(
            ResolveError::from(FetchError::IncompleteResponse {
                expected: 10,
                received: 4
            }),
            ResolveError::Malformed(_)
        ));
    }
}
