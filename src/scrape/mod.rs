//! Scraping of repository web pages for data the REST API does not expose.
//!
//! Dependents, dependencies, and branch activity only exist as rendered
//! pages, so this layer fetches them with a plain unauthenticated client and
//! walks their markup. Every page type hides its selectors behind a
//! [`ScrapeAdapter`]; the [`ScrapeDriver`] owns the shared mechanics of
//! fetching, bounded retry, "Next" link walking, and per-repository
//! assembly. A page whose expected container never shows up yields zero
//! results rather than an error, since the pages themselves change without
//! notice.

pub mod branches;
pub mod dependencies;
pub mod dependents;

pub use branches::{BranchActivity, BranchesPage};
pub use dependencies::DependenciesPage;
pub use dependents::DependentsPage;

use core::time::Duration;
use ohno::{IntoAppError, app_err};
use scraper::{ElementRef, Html, Selector};

use crate::Result;
use crate::config::ClientConfig;
use crate::mining::payload::{Record, RecordSet};
use crate::mining::retry::{Attempt, RetryPolicy};
use crate::mining::ResourceMap;
use crate::mining::selector::WorkingSet;

const LOG_TARGET: &str = "    scrape";

const USER_AGENT: &str = "repo-vitals";

const PROGRESS_EVERY: usize = 100;

/// One fetched page, as an adapter saw it.
#[derive(Debug, Default)]
pub struct ScrapePage {
    /// Extracted row records.
    pub rows: Vec<Record>,

    /// A page-level total, for page types that publish one.
    pub total: Option<u64>,

    /// Where the page's "Next" link points, absolute or site-relative.
    pub next_url: Option<String>,
}

/// What an adapter found in a fetched document.
#[derive(Debug)]
pub enum Parsed {
    /// The page carried the expected container.
    Content(ScrapePage),

    /// The expected container is absent; the fetch may be retried.
    MissingContainer,
}

/// Everything gathered for one repository across a page chain.
#[derive(Debug, Default)]
pub struct Harvest {
    /// First page-level total seen on the chain.
    pub total: Option<u64>,

    /// Row records across all pages, in walk order.
    pub rows: Vec<Record>,
}

/// Markup knowledge for one scraped page type.
///
/// Implementations compile their selectors up front and keep `parse` free of
/// fallible setup; rows with missing sub-elements are skipped with a log
/// line rather than failing the page.
pub trait ScrapeAdapter {
    /// Snapshot name for the scraped data.
    fn resource_name(&self) -> &'static str;

    /// First page URL for one repository.
    fn page_url(&self, web_base: &str, owner: &str, name: &str) -> String;

    /// Extract rows, total, and the "Next" link from one document.
    fn parse(&self, document: &Html) -> Parsed;

    /// Fold a completed harvest into the snapshot shape for one repository.
    fn assemble(&self, harvest: Harvest) -> RecordSet;
}

/// Compile one selector, treating a malformed pattern as a configuration
/// error instead of a panic.
fn selector(css: &str) -> Result<Selector> {
    Selector::parse(css).map_err(|e| app_err!("invalid CSS selector '{css}': {e}"))
}

/// All text under an element, whitespace-trimmed.
fn element_text(element: ElementRef<'_>) -> String {
    element.text().collect::<String>().trim().to_owned()
}

/// The href of the first anchor under `scope` whose text is exactly "Next".
/// An anchor without an href means the chain has ended.
fn next_href(scope: ElementRef<'_>, anchors: &Selector) -> Option<String> {
    scope
        .select(anchors)
        .find(|anchor| element_text(*anchor) == "Next")
        .and_then(|anchor| anchor.attr("href").map(str::to_owned))
}

/// Fetches scraped page types for a working set of repositories.
///
/// Carries its own HTTP client: web pages are fetched without the API
/// credential, and never share the API rate budget.
#[derive(Debug)]
pub struct ScrapeDriver {
    http: reqwest::Client,
    web_base: String,
    retry: RetryPolicy,
    row_ceiling: usize,
    pacing: Duration,
}

impl ScrapeDriver {
    pub fn new(config: &ClientConfig) -> Result<Self> {
        let http = reqwest::Client::builder()
            .user_agent(USER_AGENT)
            .timeout(config.timeout)
            .build()
            .into_app_err("unable to create the scraping HTTP client")?;

        Ok(Self {
            http,
            web_base: config.web_base.trim_end_matches('/').to_owned(),
            retry: RetryPolicy::bounded(config.scrape_retries, config.scrape_retry_delay),
            row_ceiling: config.scrape_row_ceiling,
            pacing: config.pacing,
        })
    }

    /// Scrape one page type for every repository in the working set.
    ///
    /// Repositories whose identity record had no usable owner or name are
    /// kept in the result with an empty entry; their web pages cannot be
    /// addressed.
    pub async fn scrape(&self, adapter: &dyn ScrapeAdapter, repos: &WorkingSet) -> Result<ResourceMap> {
        let total = repos.len();
        log::info!(target: LOG_TARGET, "Scraping {} for {total} repositories", adapter.resource_name());

        let mut results = ResourceMap::new();
        for (index, identity) in repos.values().enumerate() {
            if identity.owner.is_empty() || identity.name.is_empty() {
                log::warn!(
                    target: LOG_TARGET,
                    "Repository {} has no usable owner/name, recording empty {}",
                    identity.id,
                    adapter.resource_name()
                );
                let _ = results.insert(identity.id, adapter.assemble(Harvest::default()));
                continue;
            }

            let assembled = self.scrape_repo(adapter, &identity.owner, &identity.name).await?;
            let _ = results.insert(identity.id, assembled);

            let done = index + 1;
            if done % PROGRESS_EVERY == 0 || done == total {
                log::info!(target: LOG_TARGET, "Scraped {} for {done} of {total} repositories", adapter.resource_name());
            }
        }

        Ok(results)
    }

    async fn scrape_repo(&self, adapter: &dyn ScrapeAdapter, owner: &str, name: &str) -> Result<RecordSet> {
        let mut harvest = Harvest::default();
        let mut url = adapter.page_url(&self.web_base, owner, name);

        loop {
            let Some(page) = self.fetch_page(adapter, &url).await? else {
                break;
            };

            if harvest.total.is_none() {
                harvest.total = page.total;
            }
            harvest.rows.extend(page.rows);

            if harvest.rows.len() >= self.row_ceiling {
                log::debug!(target: LOG_TARGET, "Row ceiling of {} reached at '{url}'", self.row_ceiling);
                break;
            }

            let Some(next) = page.next_url else {
                break;
            };
            url = self.resolve(&next);

            if !self.pacing.is_zero() {
                tokio::time::sleep(self.pacing).await;
            }
        }

        Ok(adapter.assemble(harvest))
    }

    /// Fetch and parse one page, retrying while the container is missing or
    /// the transport fails. `None` after the attempt budget is spent.
    async fn fetch_page(&self, adapter: &dyn ScrapeAdapter, url: &str) -> Result<Option<ScrapePage>> {
        let what = format!("scrape of '{url}'");
        self.retry
            .run(&what, || async {
                let body = match self.get_text(url).await {
                    Ok(body) => body,
                    Err(reason) => return Ok(Attempt::Again(reason)),
                };

                match adapter.parse(&Html::parse_document(&body)) {
                    Parsed::Content(page) => Ok(Attempt::Done(page)),
                    Parsed::MissingContainer => Ok(Attempt::Again(format!(
                        "page at '{url}' carries no {} container",
                        adapter.resource_name()
                    ))),
                }
            })
            .await
    }

    async fn get_text(&self, url: &str) -> core::result::Result<String, String> {
        let response = self
            .http
            .get(url)
            .send()
            .await
            .map_err(|e| format!("transport failure at '{url}': {e}"))?;

        let status = response.status();
        if !status.is_success() {
            return Err(format!("'{url}' answered HTTP {}", status.as_u16()));
        }

        response.text().await.map_err(|e| format!("unreadable body from '{url}': {e}"))
    }

    /// Site-relative "Next" hrefs are joined onto the configured web base.
    fn resolve(&self, href: &str) -> String {
        if href.starts_with("http://") || href.starts_with("https://") {
            href.to_owned()
        } else if href.starts_with('/') {
            format!("{}{href}", self.web_base)
        } else {
            format!("{}/{href}", self.web_base)
        }
    }
}
