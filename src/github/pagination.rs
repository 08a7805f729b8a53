//! Lazy traversal of GitHub's `Link: <...>; rel="next"` pagination.

use super::client::RateLimitedClient;
use crate::error::{Result, ScanError};
use futures::stream::{self, BoxStream, StreamExt, TryStreamExt};
use reqwest::header::{HeaderMap, LINK};
use reqwest::{Method, Url};
use serde::de::DeserializeOwned;

/// Page size requested from list endpoints (GitHub's maximum).
pub const PER_PAGE: &str = "100";

/// Returns the `rel="next"` target of a `Link` header, if any.
pub fn next_link(headers: &HeaderMap) -> Option<String> {
    let value = headers.get(LINK)?.to_str().ok()?;
    parse_link_header(value)
        .into_iter()
        .find(|(_, rel)| rel == "next")
        .map(|(url, _)| url)
}

/// Splits a `Link` header into `(url, rel)` pairs.
fn parse_link_header(value: &str) -> Vec<(String, String)> {
    value
        .split(',')
        .filter_map(|part| {
            let mut pieces = part.split(';');
            let url = pieces
                .next()?
                .trim()
                .strip_prefix('<')?
                .strip_suffix('>')?
                .to_string();
            let rel = pieces.find_map(|param| {
                let (key, value) = param.trim().split_once('=')?;
                (key.trim() == "rel").then(|| value.trim().trim_matches('"').to_string())
            })?;
            Some((url, rel))
        })
        .collect()
}

/// Streams the items of every page starting at `first`.
///
/// Nothing is fetched until the stream is polled, and pages are requested
/// one at a time as the previous one is drained. The stream ends after the
/// first page without a `next` link, or after the first error. Restarting
/// means calling this again.
pub fn paginate<'a, T>(client: &'a RateLimitedClient, first: Url) -> BoxStream<'a, Result<T>>
where
    T: DeserializeOwned + Send + 'a,
{
    stream::try_unfold(Some(first), move |next| async move {
        let Some(url) = next else {
            return Ok(None);
        };

        let response = client.request(Method::GET, url, None).await?;
        let next = next_link(response.headers())
            .map(|link| Url::parse(&link).map_err(|e| ScanError::InvalidUrl(e.to_string())))
            .transpose()?;
        let body = response.bytes().await?;
        let page: Vec<T> = serde_json::from_slice(&body)?;

        Ok::<_, ScanError>(Some((page, next)))
    })
    .map_ok(|page: Vec<T>| stream::iter(page.into_iter().map(Ok::<T, ScanError>)))
    .try_flatten()
    .boxed()
}

#[cfg(test)]
mod tests {
    use super::*;
    use reqwest::header::HeaderValue;

    #[test]
    fn test_next_link_found() {
        let mut headers = HeaderMap::new();
        headers.insert(
            LINK,
            HeaderValue::from_static(
                "<https://api.github.com/users/alice/repos?page=2>; rel=\"next\", \
                 <https://api.github.com/users/alice/repos?page=5>; rel=\"last\"",
            ),
        );
        assert_eq!(
            next_link(&headers).as_deref(),
            Some("https://api.github.com/users/alice/repos?page=2")
        );
    }

    #[test]
    fn test_next_link_absent_on_last_page() {
        let mut headers = HeaderMap::new();
        headers.insert(
            LINK,
            HeaderValue::from_static(
                "<https://api.github.com/users/alice/repos?page=1>; rel=\"first\", \
                 <https://api.github.com/users/alice/repos?page=4>; rel=\"prev\"",
            ),
        );
        assert_eq!(next_link(&headers), None);
        assert_eq!(next_link(&HeaderMap::new()), None);
    }

    #[test]
    fn test_parse_link_header_ignores_garbage() {
        let parsed = parse_link_header("garbage, <https://x/?page=3>; rel=next");
        assert_eq!(parsed, vec![("https://x/?page=3".to_string(), "next".to_string())]);
    }
}
