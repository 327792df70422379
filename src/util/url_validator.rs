use thiserror::Error;
use url::Url;

/// Errors that can occur during URL validation.
#[derive(Error, Debug)]
pub enum UrlValidationError {
    /// The URL string could not be parsed.
    #[error("Invalid URL: {0}")]
    InvalidUrl(#[from] url::ParseError),
    /// The URL uses a scheme other than http or https.
    #[error("Unsupported scheme: {0} (only http/https allowed)")]
    UnsupportedScheme(String),
    /// The URL has no host part.
    #[error("URL has no host")]
    MissingHost,
}

/// Validates a configured service or feed endpoint.
///
/// Only `http` and `https` URLs with a host are accepted. Private and
/// loopback hosts are allowed: the download client and the catalog usually
/// run on the local network.
///
/// # Examples
///
/// ```
/// use feedarr::util::validate_endpoint_url;
///
/// assert!(validate_endpoint_url("http://localhost:8080").is_ok());
/// assert!(validate_endpoint_url("file:///etc/passwd").is_err());
/// ```
pub fn validate_endpoint_url(url_str: &str) -> Result<Url, UrlValidationError> {
    let url = Url::parse(url_str.trim())?;

    match url.scheme() {
        "http" | "https" => {}
        scheme => return Err(UrlValidationError::UnsupportedScheme(scheme.to_owned())),
    }

    match url.host_str() {
        Some(host) if !host.is_empty() => Ok(url),
        _ => Err(UrlValidationError::MissingHost),
    }
}
