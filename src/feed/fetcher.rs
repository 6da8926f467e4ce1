use futures::StreamExt;
use std::time::Duration;
use thiserror::Error;

pub(crate) const MAX_FEED_SIZE: usize = 10 * 1024 * 1024; // 10MB

/// Errors that can occur while retrieving a single source feed.
///
/// None of these abort an aggregation: the aggregator turns every one of
/// them into an empty contribution for the failing source.
#[derive(Debug, Error)]
pub enum FetchError {
    /// Network-level error (DNS, connection, TLS, etc.)
    #[error("Request failed: {0}")]
    Network(#[from] reqwest::Error),
    /// HTTP response with non-2xx status code
    #[error("HTTP error: status {0}")]
    HttpStatus(u16),
    /// Request exceeded the configured fetch timeout
    #[error("Request timed out")]
    Timeout,
    /// Response body exceeded the size limit
    #[error("Response too large")]
    ResponseTooLarge,
    /// Response was incomplete (received fewer bytes than Content-Length)
    #[error("Incomplete response: expected {expected} bytes, received {received}")]
    IncompleteResponse { expected: u64, received: usize },
}

/// Retrieves the raw body of one source feed.
///
/// Performs a single GET. A 2xx response yields the body bytes; anything
/// else (transport error, non-2xx status, oversized or truncated body,
/// timeout) yields a [`FetchError`]. There is no retry: a failure is final
/// for this request.
///
/// Failures are logged here with the offending URL, so callers only need
/// to decide what an empty contribution looks like.
///
/// # Arguments
///
/// * `client` - HTTP client (caller controls pooling and redirects)
/// * `url` - Source feed URL
/// * `timeout` - Optional upper bound on the whole request, body included
pub async fn fetch_source(
    client: &reqwest::Client,
    url: &str,
    timeout: Option<Duration>,
) -> Result<Vec<u8>, FetchError> {
    let result = fetch_body(client, url, timeout).await;
    if let Err(e) = &result {
        tracing::warn!(url = %url, error = %e, "Couldn't load feed");
    }
    result
}

async fn fetch_body(
    client: &reqwest::Client,
    url: &str,
    timeout: Option<Duration>,
) -> Result<Vec<u8>, FetchError> {
    // The limit covers headers and body alike
    let request = download(client, url);
    match timeout {
        Some(limit) => tokio::time::timeout(limit, request)
            .await
            .map_err(|_| FetchError::Timeout)?,
        None => request.await,
    }
}

async fn download(client: &reqwest::Client, url: &str) -> Result<Vec<u8>, FetchError> {
    let response = client.get(url).send().await?;

    if !response.status().is_success() {
        return Err(FetchError::HttpStatus(response.status().as_u16()));
    }

    read_limited_bytes(response, MAX_FEED_SIZE).await
}

/// Reads a response body, refusing anything over `limit` bytes or shorter
/// than its advertised Content-Length.
pub(crate) async fn read_limited_bytes(
    response: reqwest::Response,
    limit: usize,
) -> Result<Vec<u8>, FetchError> {
    let expected_length = response.content_length();

    // Fast path: check Content-Length header
    if let Some(len) = expected_length {
        if len > limit as u64 {
            return Err(FetchError::ResponseTooLarge);
        }
    }

    let mut bytes = Vec::new();
    let mut stream = response.bytes_stream();

    while let Some(chunk) = stream.next().await {
        let chunk = chunk.map_err(FetchError::Network)?;
        if bytes.len().saturating_add(chunk.len()) > limit {
            return Err(FetchError::ResponseTooLarge);
        }
        bytes.extend_from_slice(&chunk);
    }

    if let Some(expected) = expected_length {
        if (bytes.len() as u64) < expected {
            return Err(FetchError::IncompleteResponse {
                expected,
                received: bytes.len(),
            });
        }
    }

    Ok(bytes)
}
