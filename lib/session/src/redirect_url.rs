//! Policy for URLs the service is willing to redirect to.

use url::Url;

use crate::error::RedirectUrlError;

/// Parses `raw` as an absolute `http` or `https` URL with a host.
///
/// # Errors
///
/// Returns a `RedirectUrlError` describing the first rule the value breaks.
pub fn parse_and_validate_url(raw: &str) -> Result<Url, RedirectUrlError> {
    if raw.trim().is_empty() {
        return Err(RedirectUrlError::Empty);
    }
    let url = Url::parse(raw).map_err(|e| RedirectUrlError::Parse {
        reason: e.to_string(),
    })?;
    match url.scheme() {
        "http" | "https" => {}
        other => {
            return Err(RedirectUrlError::UnsupportedScheme {
                scheme: other.to_string(),
            });
        }
    }
    if url.host_str().is_none_or(str::is_empty) {
        return Err(RedirectUrlError::MissingHost);
    }
    Ok(url)
}

/// Returns the host of `url` including a non-default port, as used in
/// session audiences.
#[must_use]
pub fn host_with_port(url: &Url) -> String {
    match (url.host_str(), url.port()) {
        (Some(host), Some(port)) => format!("{host}:{port}"),
        (Some(host), None) => host.to_string(),
        (None, _) => String::new(),
    }
}
