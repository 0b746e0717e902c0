//! HTTP transport for the hosting API.
//!
//! [`ApiClient`] sends one request at a time and classifies the response into
//! a [`PageOutcome`]; pagination, retries, and throttle pauses are the
//! fetcher's and guard's business, not the transport's.

use chrono::{DateTime, Utc};
use ohno::bail;
use reqwest::header::HeaderMap;
use serde_json::Value;

use crate::Result;
use crate::config::ClientConfig;
use crate::mining::links::{PageLinks, parse_link_header};

const LOG_TARGET: &str = "    client";

const USER_AGENT: &str = "repo-vitals";

/// Quota state reported by response headers.
#[derive(Debug, Clone, Copy)]
pub struct RateLimitInfo {
    pub remaining: u64,
    pub reset_at: DateTime<Utc>,
}

/// Classified outcome of a single page request.
#[derive(Debug)]
pub enum PageOutcome {
    /// 2xx with a parsed JSON body and whatever pagination links came along.
    Success {
        body: Value,
        links: PageLinks,
        rate: Option<RateLimitInfo>,
    },

    /// Quota exhausted (403 or 429); resume once the disclosed window opens.
    Throttled { reset_at: DateTime<Utc> },

    /// Client error that repeating the request cannot fix.
    Denied { status: u16 },

    /// Transient failure: connection error, timeout, or a server-side status.
    Unavailable { reason: String },
}

/// Authenticated `reqwest` client bound to one API base URL.
#[derive(Debug, Clone)]
pub struct ApiClient {
    http: reqwest::Client,
    api_base: String,
}

impl ApiClient {
    /// Build the client. The token, when present, is attached to every
    /// request as a sensitive default header.
    pub fn new(config: &ClientConfig) -> Result<Self> {
        use reqwest::header::{AUTHORIZATION, HeaderValue};

        let mut builder = reqwest::Client::builder().user_agent(USER_AGENT).timeout(config.timeout);

        if let Some(token) = &config.token {
            let mut auth_val = HeaderValue::from_str(&format!("token {token}"))?;
            auth_val.set_sensitive(true);

            let mut headers = HeaderMap::new();
            let _ = headers.insert(AUTHORIZATION, auth_val);

            builder = builder.default_headers(headers);
        }

        Ok(Self {
            http: builder.build()?,
            api_base: config.api_base.trim_end_matches('/').to_owned(),
        })
    }

    /// Join a root-relative API path onto the configured base URL.
    #[must_use]
    pub fn api_url(&self, path: &str) -> String {
        format!("{}{path}", self.api_base)
    }

    /// Fetch one page and classify the response.
    ///
    /// A throttle response without a usable `X-RateLimit-Reset` header is a
    /// hard error: there is no resume time to wait for, which points at a
    /// credential or endpoint misconfiguration rather than ordinary quota
    /// exhaustion.
    pub async fn get_page(&self, url: &str) -> Result<PageOutcome> {
        log::trace!(target: LOG_TARGET, "GET {url}");

        let response = match self.http.get(url).send().await {
            Ok(response) => response,
            Err(e) => {
                return Ok(PageOutcome::Unavailable {
                    reason: format!("request to '{url}' failed: {e}"),
                });
            }
        };

        let rate = extract_rate_limit(response.headers());
        let links = parse_link_header(response.headers());
        let status = response.status();

        if status.is_success() {
            let body = match response.json::<Value>().await {
                Ok(body) => body,
                Err(e) => {
                    return Ok(PageOutcome::Unavailable {
                        reason: format!("could not read response body from '{url}': {e}"),
                    });
                }
            };
            return Ok(PageOutcome::Success { body, links, rate });
        }

        let code = status.as_u16();
        if matches!(code, 403 | 429) {
            let Some(rate) = rate else {
                bail!("rate limited (HTTP {code}) at '{url}' but the response carries no usable X-RateLimit-Reset header");
            };
            log::debug!(target: LOG_TARGET, "HTTP {code} from '{url}'; quota resets at {}", rate.reset_at);
            return Ok(PageOutcome::Throttled { reset_at: rate.reset_at });
        }

        if matches!(code, 400 | 401 | 404 | 406 | 410) {
            log::debug!(target: LOG_TARGET, "HTTP {code} from '{url}'");
            return Ok(PageOutcome::Denied { status: code });
        }

        Ok(PageOutcome::Unavailable {
            reason: format!("HTTP {code} from '{url}'"),
        })
    }
}

/// Read quota headers; any missing or malformed piece yields `None`.
fn extract_rate_limit(headers: &HeaderMap) -> Option<RateLimitInfo> {
    let remaining = headers.get("x-ratelimit-remaining")?.to_str().ok()?.parse::<u64>().ok()?;

    let reset_timestamp = headers.get("x-ratelimit-reset")?.to_str().ok()?.parse::<i64>().ok()?;

    let reset_at = DateTime::from_timestamp(reset_timestamp, 0)?;

    Some(RateLimitInfo { remaining, reset_at })
}

#[cfg(test)]
mod tests {
    use reqwest::header::HeaderValue;
    use serde_json::json;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    use super::*;

    fn config_for(server: &MockServer) -> ClientConfig {
        ClientConfig {
            api_base: server.uri(),
            ..ClientConfig::new(Some("token-1"))
        }
    }

    #[test]
    fn rate_limit_headers_parse() {
        let mut headers = HeaderMap::new();
        let _ = headers.insert("x-ratelimit-remaining", HeaderValue::from_static("4999"));
        let _ = headers.insert("x-ratelimit-reset", HeaderValue::from_static("1704067200"));

        let rate = extract_rate_limit(&headers).unwrap();
        assert_eq!(rate.remaining, 4999);
        assert_eq!(rate.reset_at.timestamp(), 1_704_067_200);
    }

    #[test]
    fn missing_rate_limit_headers_yield_none() {
        assert!(extract_rate_limit(&HeaderMap::new()).is_none());
    }

    #[test]
    fn malformed_rate_limit_headers_yield_none() {
        let mut headers = HeaderMap::new();
        let _ = headers.insert("x-ratelimit-remaining", HeaderValue::from_static("lots"));
        let _ = headers.insert("x-ratelimit-reset", HeaderValue::from_static("1704067200"));
        assert!(extract_rate_limit(&headers).is_none());
    }

    #[tokio::test]
    async fn success_carries_body_and_links() {
        let server = MockServer::start().await;
        let link = format!(r#"<{0}/items?page=2>; rel="next", <{0}/items?page=9>; rel="last""#, server.uri());

        Mock::given(method("GET"))
            .and(path("/items"))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_json(json!([{"id": 1}]))
                    .insert_header("Link", link.as_str()),
            )
            .mount(&server)
            .await;

        let client = ApiClient::new(&config_for(&server)).unwrap();
        let outcome = client.get_page(&client.api_url("/items")).await.unwrap();

        match outcome {
            PageOutcome::Success { body, links, .. } => {
                assert_eq!(body, json!([{"id": 1}]));
                assert!(links.next.unwrap().ends_with("/items?page=2"));
                assert_eq!(links.last_page, Some(9));
            }
            other => panic!("expected success, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn throttle_reports_reset_time() {
        let server = MockServer::start().await;

        Mock::given(method("GET"))
            .and(path("/items"))
            .respond_with(
                ResponseTemplate::new(403)
                    .insert_header("x-ratelimit-remaining", "0")
                    .insert_header("x-ratelimit-reset", "1704067200"),
            )
            .mount(&server)
            .await;

        let client = ApiClient::new(&config_for(&server)).unwrap();
        let outcome = client.get_page(&client.api_url("/items")).await.unwrap();

        match outcome {
            PageOutcome::Throttled { reset_at } => assert_eq!(reset_at.timestamp(), 1_704_067_200),
            other => panic!("expected a throttle, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn throttle_without_reset_header_is_fatal() {
        let server = MockServer::start().await;

        Mock::given(method("GET"))
            .and(path("/items"))
            .respond_with(ResponseTemplate::new(429))
            .mount(&server)
            .await;

        let client = ApiClient::new(&config_for(&server)).unwrap();
        assert!(client.get_page(&client.api_url("/items")).await.is_err());
    }

    #[tokio::test]
    async fn not_found_is_denied() {
        let server = MockServer::start().await;

        Mock::given(method("GET"))
            .and(path("/items"))
            .respond_with(ResponseTemplate::new(404))
            .mount(&server)
            .await;

        let client = ApiClient::new(&config_for(&server)).unwrap();
        let outcome = client.get_page(&client.api_url("/items")).await.unwrap();

        match outcome {
            PageOutcome::Denied { status } => assert_eq!(status, 404),
            other => panic!("expected a denial, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn server_error_is_transient() {
        let server = MockServer::start().await;

        Mock::given(method("GET"))
            .and(path("/items"))
            .respond_with(ResponseTemplate::new(502))
            .mount(&server)
            .await;

        let client = ApiClient::new(&config_for(&server)).unwrap();
        let outcome = client.get_page(&client.api_url("/items")).await.unwrap();

        match outcome {
            PageOutcome::Unavailable { reason } => assert!(reason.contains("502")),
            other => panic!("expected unavailable, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn malformed_body_is_transient() {
        let server = MockServer::start().await;

        Mock::given(method("GET"))
            .and(path("/items"))
            .respond_with(ResponseTemplate::new(200).set_body_string("not json"))
            .mount(&server)
            .await;

        let client = ApiClient::new(&config_for(&server)).unwrap();
        let outcome = client.get_page(&client.api_url("/items")).await.unwrap();

        assert!(matches!(outcome, PageOutcome::Unavailable { .. }));
    }
}
