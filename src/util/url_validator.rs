use std::net::IpAddr;
use thiserror::Error;
use url::Url;

/// Reasons an API base URL is refused.
#[derive(Error, Debug)]
pub enum BaseUrlError {
    #[error("Invalid URL: {0}")]
    InvalidUrl(#[from] url::ParseError),
    #[error("Unsupported scheme: {0} (only http/https allowed)")]
    UnsupportedScheme(String),
    #[error("Base URL has no host")]
    MissingHost,
    /// Plain HTTP to anything but loopback would leak the API token.
    #[error("Plain HTTP is only allowed for localhost; use https")]
    Insecure,
}

/// Validate the category API base URL.
///
/// HTTPS is required, except for loopback hosts (`localhost`, `127.0.0.1`,
/// `::1`) where plain HTTP is accepted for local development.
///
/// ```
/// use category_tree::util::validate_base_url;
///
/// assert!(validate_base_url("https://shop.example.com/api").is_ok());
/// assert!(validate_base_url("http://localhost:8080/api").is_ok());
/// assert!(validate_base_url("http://shop.example.com/api").is_err());
/// ```
pub fn validate_base_url(raw: &str) -> Result<Url, BaseUrlError> {
    let url = Url::parse(raw.trim())?;
    let host = url.host_str().ok_or(BaseUrlError::MissingHost)?;

    match url.scheme() {
        "https" => Ok(url),
        "http" if is_loopback_host(host) => Ok(url),
        "http" => Err(BaseUrlError::Insecure),
        other => Err(BaseUrlError::UnsupportedScheme(other.to_owned())),
    }
}

fn is_loopback_host(host: &str) -> bool {
    if host.eq_ignore_ascii_case("localhost") {
        return true;
    }
    let bare = host
        .strip_prefix('[')
        .and_then(|h| h.strip_suffix(']'))
        .unwrap_or(host);
    bare.parse::<IpAddr>().is_ok_and(|ip| ip.is_loopback())
}
