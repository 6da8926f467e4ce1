use reqwest::redirect::Policy;
use std::net::{IpAddr, Ipv6Addr};
use thiserror::Error;
use url::{Host, Url};

/// Reasons a source URL from an untrusted list is refused.
#[derive(Error, Debug)]
pub enum SourceUrlError {
    #[error("Invalid URL: {0}")]
    InvalidUrl(#[from] url::ParseError),
    #[error("Unsupported scheme: {0} (only http/https allowed)")]
    UnsupportedScheme(String),
    #[error("Internal address not allowed: {0}")]
    InternalAddress(String),
    #[error("Localhost not allowed")]
    Localhost,
}

/// Checks that a feed URL taken from untrusted input is safe to fetch
/// from the server.
///
/// Rejects:
/// - schemes other than `http` and `https`
/// - `localhost` and loopback addresses
/// - private, link-local, unique-local and unspecified IP addresses
///
/// Hostnames are not resolved; only literal IPs are range-checked.
///
/// # Examples
///
/// ```
/// use feed_masher::util::validate_source_url;
///
/// assert!(validate_source_url("https://blog.rust-lang.org/feed.xml").is_ok());
/// assert!(validate_source_url("http://localhost/feed").is_err());
/// assert!(validate_source_url("file:///etc/passwd").is_err());
/// ```
pub fn validate_source_url(input: &str) -> Result<Url, SourceUrlError> {
    let url = Url::parse(input)?;

    match url.scheme() {
        "http" | "https" => {}
        scheme => return Err(SourceUrlError::UnsupportedScheme(scheme.to_owned())),
    }

    match url.host() {
        Some(Host::Domain(domain)) if domain.eq_ignore_ascii_case("localhost") => {
            return Err(SourceUrlError::Localhost)
        }
        Some(Host::Ipv4(ip)) => check_ip(IpAddr::V4(ip))?,
        Some(Host::Ipv6(ip)) => check_ip(IpAddr::V6(ip))?,
        _ => {}
    }

    Ok(url)
}

fn check_ip(ip: IpAddr) -> Result<(), SourceUrlError> {
    // ::ffff:a.b.c.d reaches the IPv4 host, so it gets the IPv4 rules
    let ip = match ip {
        IpAddr::V6(v6) => v6.to_ipv4_mapped().map_or(ip, IpAddr::V4),
        v4 => v4,
    };
    if ip.is_loopback() {
        return Err(SourceUrlError::Localhost);
    }
    let internal = match ip {
        IpAddr::V4(v4) => v4.is_private() || v4.is_link_local() || v4.is_unspecified(),
        IpAddr::V6(v6) => v6.is_unspecified() || is_internal_v6(&v6),
    };
    if internal {
        return Err(SourceUrlError::InternalAddress(ip.to_string()));
    }
    Ok(())
}

fn is_internal_v6(ip: &Ipv6Addr) -> bool {
    let first = ip.segments()[0];
    // fc00::/7 unique local, fe80::/10 link-local
    (first & 0xfe00) == 0xfc00 || (first & 0xffc0) == 0xfe80
}

/// Redirect policy for clients that fetch untrusted sources.
///
/// Every hop is run through [`validate_source_url`], so a public URL cannot
/// bounce the request to an internal address. Also stops after `max_hops`
/// redirects and on loops.
pub fn redirect_policy(max_hops: usize) -> Policy {
    Policy::custom(move |attempt| {
        if attempt.previous().len() >= max_hops {
            return attempt.error(format!("Too many redirects (max {max_hops})"));
        }

        let url = attempt.url();
        if attempt.previous().iter().any(|prev| prev.as_str() == url.as_str()) {
            return attempt.error("Redirect loop detected");
        }
        if let Err(e) = validate_source_url(url.as_str()) {
            tracing::warn!(to = %url, error = %e, "Refusing redirect");
            return attempt.error(e);
        }

        tracing::debug!(
            from = %attempt.previous().last().map(|u| u.as_str()).unwrap_or("initial"),
            to = %url,
            hop = attempt.previous().len() + 1,
            "Following redirect"
        );

        attempt.follow()
    })
}

/// Splits a newline-separated list of feed URLs.
///
/// Lines are trimmed and blank lines dropped. Lines that fail
/// [`validate_source_url`] are logged and left out; the rest keep their
/// original order.
pub fn parse_source_list(content: &str) -> Vec<String> {
    content
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty())
        .filter_map(|line| match validate_source_url(line) {
            Ok(_) => Some(line.to_string()),
            Err(e) => {
                tracing::warn!(url = %line, error = %e, "Skipping invalid source URL");
                None
            }
        })
        .collect()
}
