use core::time::Duration;

/// Default REST API endpoint.
pub const GITHUB_API: &str = "https://api.github.com";

/// Default endpoint for the human-facing web pages the scraper reads.
pub const GITHUB_WEB: &str = "https://github.com";

/// Immutable settings shared by every fetch component.
///
/// Built once at startup and passed by reference (or cloned into an `Arc`);
/// fetch operations never mutate it, they return fresh result values.
#[derive(Debug, Clone)]
pub struct ClientConfig {
    /// Bearer credential, sent as `Authorization: token <value>`.
    pub token: Option<String>,

    /// Base URL for REST calls; descriptor URL prefixes are joined onto this.
    pub api_base: String,

    /// Base URL for scraped web pages.
    pub web_base: String,

    /// Fixed per-request timeout. A timeout behaves like a transient server error.
    pub timeout: Duration,

    /// Small fixed delay between successful calls, distinct from the computed
    /// sleep the rate-limit guard performs on a throttle.
    pub pacing: Duration,

    /// Fixed delay before restarting a repository fetch after a transient failure.
    pub retry_delay: Duration,

    /// Page size requested via `per_page` (the provider caps this at 100).
    pub per_page: u32,

    /// Worker-pool width across independent repositories. 1 means sequential.
    pub jobs: usize,

    /// Bounded attempts when a scraped page's container element is missing.
    pub scrape_retries: u32,

    /// Fixed delay between scrape attempts.
    pub scrape_retry_delay: Duration,

    /// Ceiling on rows collected across a scraped page's "Next" chain.
    pub scrape_row_ceiling: usize,
}

impl ClientConfig {
    #[must_use]
    pub fn new(token: Option<&str>) -> Self {
        Self {
            token: token.map(str::to_owned),
            api_base: GITHUB_API.to_owned(),
            web_base: GITHUB_WEB.to_owned(),
            timeout: Duration::from_secs(30),
            pacing: Duration::from_millis(500),
            retry_delay: Duration::from_secs(240),
            per_page: 100,
            jobs: 1,
            scrape_retries: 3,
            scrape_retry_delay: Duration::from_secs(2),
            scrape_row_ceiling: 500,
        }
    }
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self::new(None)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_sequential_and_authenticated_off() {
        let config = ClientConfig::default();
        assert_eq!(config.jobs, 1);
        assert!(config.token.is_none());
        assert_eq!(config.per_page, 100);
        assert_eq!(config.api_base, GITHUB_API);
    }

    #[test]
    fn token_is_stored() {
        let config = ClientConfig::new(Some("ghp_abc"));
        assert_eq!(config.token.as_deref(), Some("ghp_abc"));
    }
}
