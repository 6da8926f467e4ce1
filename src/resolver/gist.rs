use crate::feed::fetcher::read_limited_bytes;
use crate::feed::MergedFeedSpec;
use crate::resolver::{ResolveError, SourceResolver};
use crate::util::parse_source_list;
use async_trait::async_trait;
use secrecy::{ExposeSecret, SecretString};
use serde::Deserialize;
use std::time::Duration;
use url::Url;

pub const DEFAULT_GITHUB_API_BASE: &str = "https://api.github.com";

const GIST_TIMEOUT: Duration = Duration::from_secs(10);
const MAX_GIST_SIZE: usize = 1024 * 1024; // 1MB
const FALLBACK_TITLE: &str = "Mashed Feed";

#[derive(Debug, Deserialize)]
struct GistResponse {
    #[serde(default)]
    description: Option<String>,
    #[serde(default)]
    files: serde_json::Map<String, serde_json::Value>,
    #[serde(default)]
    owner: Option<GistOwner>,
}

#[derive(Debug, Deserialize)]
struct GistOwner {
    login: String,
}

/// Resolves GitHub Gist ids into merge requests.
///
/// - author: `@<owner login>`
/// - title: the Gist description, or `"Mashed Feed"` when blank
/// - sources: one URL per line of the Gist's first file
/// - id: `gist:<id>`
pub struct GistResolver {
    client: reqwest::Client,
    api_base: String,
    token: Option<SecretString>,
}

impl GistResolver {
    pub fn new(
        client: reqwest::Client,
        api_base: impl Into<String>,
        token: Option<SecretString>,
    ) -> Self {
        Self {
            client,
            api_base: api_base.into().trim_end_matches('/').to_string(),
            token,
        }
    }

    fn check_api_base(&self) -> Result<(), ResolveError> {
        if is_trusted_api_base(&self.api_base) {
            return Ok(());
        }
        tracing::error!(api_base = %self.api_base, "Rejecting non-HTTPS GitHub API base URL");
        Err(ResolveError::InsecureApiBase)
    }

    async fn fetch_gist(&self, gist_id: &str) -> Result<GistResponse, ResolveError> {
        self.check_api_base()?;

        let url = format!("{}/gists/{}", self.api_base, gist_id);
        let mut request = self
            .client
            .get(&url)
            .header(reqwest::header::ACCEPT, "application/vnd.github.v3+json");
        if let Some(token) = &self.token {
            request = request.bearer_auth(token.expose_secret());
        }

        let download = async {
            let response = request.send().await?;

            let status = response.status();
            if status == reqwest::StatusCode::NOT_FOUND {
                return Err(ResolveError::NotFound);
            }
            if !status.is_success() {
                return Err(ResolveError::HttpStatus(status.as_u16()));
            }

            Ok::<_, ResolveError>(read_limited_bytes(response, MAX_GIST_SIZE).await?)
        };
        let bytes = tokio::time::timeout(GIST_TIMEOUT, download)
            .await
            .map_err(|_| ResolveError::Timeout)??;

        serde_json::from_slice(&bytes).map_err(|e| ResolveError::Malformed(e.to_string()))
    }
}

/// HTTPS anywhere, plain HTTP only when the host is exactly loopback.
fn is_trusted_api_base(api_base: &str) -> bool {
    let Ok(url) = Url::parse(api_base) else {
        return false;
    };
    match url.scheme() {
        "https" => true,
        "http" => matches!(url.host_str(), Some("localhost" | "127.0.0.1" | "[::1]")),
        _ => false,
    }
}

#[async_trait]
impl SourceResolver for GistResolver {
    async fn resolve(&self, reference: &str) -> Result<MergedFeedSpec, ResolveError> {
        let gist_id = parse_gist_id(reference)?;
        let gist = self.fetch_gist(&gist_id).await.inspect_err(|e| {
            tracing::warn!(gist = %gist_id, error = %e, "Failed to resolve gist");
        })?;

        let owner = gist.owner.ok_or(ResolveError::MissingField("owner"))?;
        let (_, first_file) = gist
            .files
            .iter()
            .next()
            .ok_or(ResolveError::MissingField("files"))?;
        let content = first_file
            .get("content")
            .and_then(serde_json::Value::as_str)
            .ok_or(ResolveError::MissingField("content"))?;

        let title = gist
            .description
            .map(|d| d.trim().to_string())
            .filter(|d| !d.is_empty())
            .unwrap_or_else(|| FALLBACK_TITLE.to_string());
        let sources = parse_source_list(content);

        tracing::info!(gist = %gist_id, sources = sources.len(), "Resolved gist");

        Ok(MergedFeedSpec {
            id: format!("gist:{}", gist_id),
            title,
            author: format!("@{}", owner.login),
            sources,
        })
    }
}

/// Extracts a Gist id from either a bare id or a gist.github.com URL.
///
/// Accepts `0123abcd`, `https://gist.github.com/user/0123abcd`,
/// `https://gist.github.com/0123abcd` (with an optional trailing slash,
/// fragment or `.git` suffix).
pub fn parse_gist_id(input: &str) -> Result<String, ResolveError> {
    let input = input.trim();
    let invalid = || ResolveError::InvalidReference(input.to_string());

    if is_gist_id(input) {
        return Ok(input.to_string());
    }

    let url = Url::parse(input).map_err(|_| invalid())?;
    if !matches!(url.scheme(), "http" | "https") || url.host_str() != Some("gist.github.com") {
        return Err(invalid());
    }
    let last = url
        .path_segments()
        .and_then(|segments| segments.filter(|s| !s.is_empty()).last())
        .ok_or_else(invalid)?;
    let candidate = last.trim_end_matches(".git");

    // gist.github.com/<user> is a profile page; gist ids in URLs are hex
    if !candidate.is_empty() && candidate.chars().all(|c| c.is_ascii_hexdigit()) {
        Ok(candidate.to_string())
    } else {
        Err(invalid())
    }
}

fn is_gist_id(s: &str) -> bool {
    !s.is_empty() && s.chars().all(|c| c.is_ascii_alphanumeric())
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use serde_json::json;
    use wiremock::matchers::{header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn resolver(server: &MockServer) -> GistResolver {
        GistResolver::new(reqwest::Client::new(), server.uri(), None)
    }

    async fn mount_gist(server: &MockServer, id: &str, body: serde_json::Value) {
        Mock::given(method("GET"))
            .and(path(format!("/gists/{id}")))
            .respond_with(ResponseTemplate::new(200).set_body_json(body))
            .mount(server)
            .await;
    }

    #[test]
    fn test_parse_gist_id_variants() {
        assert_eq!(parse_gist_id("abc123").unwrap(), "abc123");
        assert_eq!(
            parse_gist_id("https://gist.github.com/octocat/abc123").unwrap(),
            "abc123"
        );
        assert_eq!(
            parse_gist_id("https://gist.github.com/octocat/abc123/").unwrap(),
            "abc123"
        );
        assert_eq!(
            parse_gist_id("https://gist.github.com/abc123#file-feeds").unwrap(),
            "abc123"
        );
        assert_eq!(
            parse_gist_id("https://gist.github.com/abc123.git").unwrap(),
            "abc123"
        );
    }

    #[test]
    fn test_parse_gist_id_rejects_other_urls() {
        for input in [
            "",
            "https://github.com/octocat/abc123",
            "https://gist.github.com/",
            "https://gist.github.com/octocat",
            "https://gist.github.com/octocat/",
            "ftp://gist.github.com/abc123",
            "abc/../123",
            "not a gist",
        ] {
            assert!(
                matches!(parse_gist_id(input), Err(ResolveError::InvalidReference(_))),
                "{input:?} should be rejected"
            );
        }
    }

    #[tokio::test]
    async fn test_resolve_builds_spec_from_first_file() {
        let server = MockServer::start().await;
        mount_gist(
            &server,
            "abc123",
            json!({
                "description": "My tech feeds",
                "owner": { "login": "octocat" },
                "files": {
                    "zz-feeds.txt": {
                        "content": "https://a.example/feed\n\n  https://b.example/rss  \nhttp://10.0.0.1/feed\n"
                    },
                    "aa-notes.txt": { "content": "https://ignored.example/feed" }
                }
            }),
        )
        .await;

        let spec = resolver(&server).resolve("abc123").await.unwrap();
        assert_eq!(
            spec,
            MergedFeedSpec {
                id: "gist:abc123".to_string(),
                title: "My tech feeds".to_string(),
                author: "@octocat".to_string(),
                sources: vec![
                    "https://a.example/feed".to_string(),
                    "https://b.example/rss".to_string()
                ],
            }
        );
    }

    #[tokio::test]
    async fn test_blank_description_uses_fallback_title() {
        let server = MockServer::start().await;
        mount_gist(
            &server,
            "abc123",
            json!({
                "description": null,
                "owner": { "login": "octocat" },
                "files": { "feeds": { "content": "https://a.example/feed" } }
            }),
        )
        .await;

        let spec = resolver(&server).resolve("abc123").await.unwrap();
        assert_eq!(spec.title, "Mashed Feed");
    }

    #[tokio::test]
    async fn test_sends_accept_and_token_headers() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/gists/abc123"))
            .and(header("accept", "application/vnd.github.v3+json"))
            .and(header("authorization", "Bearer s3cret"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "description": "d",
                "owner": { "login": "o" },
                "files": { "f": { "content": "" } }
            })))
            .expect(1)
            .mount(&server)
            .await;

        let resolver = GistResolver::new(
            reqwest::Client::new(),
            server.uri(),
            Some(SecretString::from("s3cret".to_string())),
        );
        let spec = resolver.resolve("abc123").await.unwrap();
        assert!(spec.sources.is_empty());
    }

    #[tokio::test]
    async fn test_unknown_gist_is_not_found() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(404))
            .mount(&server)
            .await;

        let result = resolver(&server).resolve("missing1").await;
        assert!(matches!(result, Err(ResolveError::NotFound)));
    }

    #[tokio::test]
    async fn test_server_error_is_surfaced() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(502))
            .mount(&server)
            .await;

        let result = resolver(&server).resolve("abc123").await;
        assert!(matches!(result, Err(ResolveError::HttpStatus(502))));
    }

    #[tokio::test]
    async fn test_non_json_body_is_malformed() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(200).set_body_string("<html>"))
            .mount(&server)
            .await;

        let result = resolver(&server).resolve("abc123").await;
        assert!(matches!(result, Err(ResolveError::Malformed(_))));
    }

    #[tokio::test]
    async fn test_missing_owner_and_files() {
        let server = MockServer::start().await;
        mount_gist(
            &server,
            "noowner",
            json!({ "description": "d", "files": { "f": { "content": "" } } }),
        )
        .await;
        mount_gist(
            &server,
            "nofiles",
            json!({ "description": "d", "owner": { "login": "o" }, "files": {} }),
        )
        .await;
        mount_gist(
            &server,
            "nocontent",
            json!({ "description": "d", "owner": { "login": "o" }, "files": { "f": {} } }),
        )
        .await;

        let resolver = resolver(&server);
        assert!(matches!(
            resolver.resolve("noowner").await,
            Err(ResolveError::MissingField("owner"))
        ));
        assert!(matches!(
            resolver.resolve("nofiles").await,
            Err(ResolveError::MissingField("files"))
        ));
        assert!(matches!(
            resolver.resolve("nocontent").await,
            Err(ResolveError::MissingField("content"))
        ));
    }

    #[test]
    fn test_api_base_loopback_exemption_is_exact() {
        assert!(is_trusted_api_base("https://api.github.com"));
        assert!(is_trusted_api_base("http://127.0.0.1:8080"));
        assert!(is_trusted_api_base("http://localhost:3000"));
        assert!(is_trusted_api_base("http://[::1]:3000"));

        assert!(!is_trusted_api_base("http://localhost.attacker.example"));
        assert!(!is_trusted_api_base("http://127.0.0.1.evil.tld"));
        assert!(!is_trusted_api_base("http://api.example.com"));
        assert!(!is_trusted_api_base("ftp://localhost"));
        assert!(!is_trusted_api_base("not a url"));
    }

    #[tokio::test]
    async fn test_lookalike_localhost_gets_no_token() {
        let resolver = GistResolver::new(
            reqwest::Client::new(),
            "http://localhost.attacker.example",
            Some(SecretString::from("s3cret".to_string())),
        );
        let result = resolver.resolve("abc123").await;
        assert!(matches!(result, Err(ResolveError::InsecureApiBase)));
    }

    #[tokio::test]
    async fn test_insecure_api_base_rejected() {
        let resolver = GistResolver::new(reqwest::Client::new(), "http://api.example.com", None);
        let result = resolver.resolve("abc123").await;
        assert!(matches!(result, Err(ResolveError::InsecureApiBase)));
    }
}
