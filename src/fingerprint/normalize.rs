use crate::FingerprintError;
use url::Url;

/// Normalizes a URL so that equivalent requests fingerprint identically
///
/// # Normalization Steps
///
/// 1. Parse the URL; reject if malformed
/// 2. Validate scheme (http and https only)
/// 3. Lowercase the scheme and host (the parser does this for us)
/// 4. Strip the default port (80 for http, 443 for https)
/// 5. Empty path becomes /
/// 6. Remove the fragment (everything after #)
/// 7. Sort query parameters by key, then by value for duplicate keys
/// 8. Remove an empty query string (trailing ?)
///
/// Two URLs that differ only in query-parameter order, fragment, or
/// host/scheme case normalize to the same string.
///
/// # Arguments
///
/// * `url_str` - The URL string to normalize
///
/// # Returns
///
/// * `Ok(Url)` - Normalized URL
/// * `Err(FingerprintError)` - Failed to parse or normalize the URL
///
/// # Examples
///
/// ```
/// use crawlsink::fingerprint::normalize_url;
///
/// let url = normalize_url("HTTP://Example.COM:80/page?b=2&a=1#top").unwrap();
/// assert_eq!(url.as_str(), "http://example.com/page?a=1&b=2");
/// ```
pub fn normalize_url(url_str: &str) -> Result<Url, FingerprintError> {
    // Step 1: Parse the URL. The parser already lowercases the scheme and
    // host and drops the default port for http/https.
    let mut url = Url::parse(url_str).map_err(|e| FingerprintError::Parse(e.to_string()))?;

    // Step 2: Validate scheme
    if url.scheme() != "http" && url.scheme() != "https" {
        return Err(FingerprintError::InvalidScheme(format!(
            "Only HTTP and HTTPS schemes are supported, got: {}",
            url.scheme()
        )));
    }

    if url.host_str().is_none() {
        return Err(FingerprintError::MissingHost);
    }

    // Step 6: Remove fragment
    url.set_fragment(None);

    // Step 7 & 8: Sort query parameters or remove the empty query
    if url.query().is_some() {
        let mut params: Vec<(String, String)> = url
            .query_pairs()
            .map(|(k, v)| (k.into_owned(), v.into_owned()))
            .collect();
        params.sort();

        if params.is_empty() {
            url.set_query(None);
        } else {
            url.query_pairs_mut().clear().extend_pairs(params);
        }
    }

    Ok(url)
}
