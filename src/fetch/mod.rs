//! HTTP Fetcher: two sequential GETs per URL, capturing timing and cache
//! status for cache-warming, grounded on the plain `reqwest::Client` usage
//! and mockito test style used for link/page fetching elsewhere in this
//! codebase's corpus.

use crate::domain::FetchOutcome;
use crate::engine::FetchError;
use reqwest::{Client, StatusCode};
use std::time::{Duration, Instant};

const FETCH_TIMEOUT_SECS: u64 = 30;
const USER_AGENT: &str = "BlueBandedBee/1.0 (+https://bluebandedbee.co)";

pub struct Fetcher {
    client: Client,
}

impl Default for Fetcher {
    fn default() -> Self {
        Self::new()
    }
}

impl Fetcher {
    #[must_use]
    pub fn new() -> Self {
        let client = Client::builder()
            .user_agent(USER_AGENT)
            .redirect(reqwest::redirect::Policy::limited(1))
            .build()
            .expect("reqwest client with static config always builds");
        Self { client }
    }

    #[cfg(test)]
    fn with_client(client: Client) -> Self {
        Self { client }
    }

    /// Perform the two-fetch cache-warming cycle against `url`.
    ///
    /// If the first fetch's final URL lands on a different host, the
    /// second fetch is skipped and `external_redirect` is set (the
    /// resolved policy for cross-host redirects, see design notes). When
    /// `find_links` is set and the first response is HTML, its body is
    /// returned alongside the outcome so the caller can pipe it to the
    /// Link Extractor without a third fetch.
    pub async fn warm(
        &self,
        url: &str,
        skip_if_cached: bool,
        find_links: bool,
        cancel: &tokio::sync::Notify,
    ) -> Result<(FetchOutcome, Option<String>, Option<String>), FetchError> {
        let original_host = reqwest::Url::parse(url).ok().and_then(|u| u.host_str().map(str::to_string));

        let capture_first_body = find_links;
        let first = self.get(url, capture_first_body, cancel).await?;
        let is_html = first.content_type.as_deref().is_some_and(|ct| ct.contains("text/html"));
        let body = if find_links && is_html { first.body.clone() } else { None };
        let retry_after = first.retry_after.clone();

        if let Some(original) = &original_host {
            if first.final_host.as_deref() != Some(original.as_str()) {
                return Ok((
                    FetchOutcome {
                        response_time_ms: first.elapsed_ms,
                        status_code: first.status,
                        cache_status: first.cache_status,
                        content_type: first.content_type,
                        second_response_time_ms: None,
                        second_cache_status: None,
                        external_redirect: true,
                    },
                    body,
                    retry_after,
                ));
            }
        }

        if skip_if_cached && first.cache_status.as_deref() == Some("HIT") {
            return Ok((
                FetchOutcome {
                    response_time_ms: first.elapsed_ms,
                    status_code: first.status,
                    cache_status: first.cache_status,
                    content_type: first.content_type,
                    second_response_time_ms: None,
                    second_cache_status: None,
                    external_redirect: false,
                },
                body,
                retry_after,
            ));
        }

        let second = self.get(url, false, cancel).await?;

        Ok((
            FetchOutcome {
                response_time_ms: first.elapsed_ms,
                status_code: first.status,
                cache_status: first.cache_status,
                content_type: first.content_type,
                second_response_time_ms: Some(second.elapsed_ms),
                second_cache_status: second.cache_status,
                external_redirect: false,
            },
            body,
            retry_after,
        ))
    }

    async fn get(
        &self,
        url: &str,
        capture_body: bool,
        cancel: &tokio::sync::Notify,
    ) -> Result<SingleFetch, FetchError> {
        let start = Instant::now();
        let response = tokio::select! {
            result = tokio::time::timeout(
                Duration::from_secs(FETCH_TIMEOUT_SECS),
                self.client.get(url).send(),
            ) => result.map_err(|_| FetchError::Timeout(FETCH_TIMEOUT_SECS))??,
            () = cancel.notified() => return Err(FetchError::Cancelled),
        };
        let elapsed_ms = start.elapsed().as_millis() as u32;
        let status = response.status().as_u16();
        let final_host = response.url().host_str().map(str::to_string);
        let cache_status = response
            .headers()
            .get("cf-cache-status")
            .or_else(|| response.headers().get("x-cache"))
            .and_then(|v| v.to_str().ok())
            .map(str::to_string);
        let content_type = response
            .headers()
            .get(reqwest::header::CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .map(str::to_string);
        let retry_after = response
            .headers()
            .get(reqwest::header::RETRY_AFTER)
            .and_then(|v| v.to_str().ok())
            .map(str::to_string);
        let body = if capture_body {
            response.text().await.ok()
        } else {
            None
        };

        Ok(SingleFetch {
            elapsed_ms,
            status,
            final_host,
            cache_status,
            content_type,
            retry_after,
            body,
        })
    }
}

struct SingleFetch {
    elapsed_ms: u32,
    status: u16,
    final_host: Option<String>,
    cache_status: Option<String>,
    content_type: Option<String>,
    retry_after: Option<String>,
    body: Option<String>,
}

/// A 429 response's `Retry-After` header, or the default 3s backoff.
#[must_use]
pub fn retry_after_or_default(status: StatusCode, header: Option<&str>) -> Duration {
    if status == StatusCode::TOO_MANY_REQUESTS {
        if let Some(secs) = header.and_then(|h| h.parse::<u64>().ok()) {
            return Duration::from_secs(secs);
        }
        return Duration::from_secs(3);
    }
    Duration::from_secs(0)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn warm_records_both_fetches() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("GET", "/")
            .with_status(200)
            .with_header("cf-cache-status", "MISS")
            .with_header("content-type", "text/html")
            .with_body("<html></html>")
            .expect(2)
            .create_async()
            .await;

        let fetcher = Fetcher::with_client(Client::new());
        let url = format!("{}/", server.url());
        let cancel = tokio::sync::Notify::new();
        let (outcome, body, _retry_after) = fetcher.warm(&url, false, true, &cancel).await.unwrap();

        assert_eq!(outcome.status_code, 200);
        assert_eq!(outcome.cache_status.as_deref(), Some("MISS"));
        assert!(outcome.second_response_time_ms.is_some());
        assert!(!outcome.external_redirect);
        assert_eq!(body.as_deref(), Some("<html></html>"));
        mock.assert_async().await;
    }

    #[tokio::test]
    async fn skip_if_cached_avoids_second_fetch() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("GET", "/")
            .with_status(200)
            .with_header("cf-cache-status", "HIT")
            .expect(1)
            .create_async()
            .await;

        let fetcher = Fetcher::with_client(Client::new());
        let url = format!("{}/", server.url());
        let cancel = tokio::sync::Notify::new();
        let (outcome, _body, _retry_after) = fetcher.warm(&url, true, false, &cancel).await.unwrap();

        assert!(outcome.second_response_time_ms.is_none());
        mock.assert_async().await;
    }

    #[tokio::test]
    async fn cancelled_notify_aborts_fetch() {
        let mut server = mockito::Server::new_async().await;
        let _mock = server.mock("GET", "/").with_status(200).create_async().await;

        let fetcher = Fetcher::with_client(Client::new());
        let url = format!("{}/", server.url());
        let cancel = tokio::sync::Notify::new();
        cancel.notify_one();

        let err = fetcher.warm(&url, false, false, &cancel).await.unwrap_err();
        assert!(matches!(err, FetchError::Cancelled));
        assert_eq!(
            crate::engine::FailureKind::classify(&anyhow::anyhow!(err.to_string())),
            crate::engine::FailureKind::Cancelled
        );
    }

    #[test]
    fn retry_after_defaults_to_three_seconds() {
        let d = retry_after_or_default(StatusCode::TOO_MANY_REQUESTS, None);
        assert_eq!(d, Duration::from_secs(3));
        let d = retry_after_or_default(StatusCode::TOO_MANY_REQUESTS, Some("10"));
        assert_eq!(d, Duration::from_secs(10));
        assert_eq!(retry_after_or_default(StatusCode::OK, None), Duration::from_secs(0));
    }
}
