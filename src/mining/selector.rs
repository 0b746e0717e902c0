//! Working-set selection.
//!
//! Two roads into a session's working set: resolve explicit references one
//! by one, or page through the search endpoint until enough distinct
//! repositories have been normalized. Both produce the same shape, a map
//! from repository id to its identity record.

use core::fmt::{Display, Formatter};
use core::str::FromStr;
use std::collections::BTreeMap;
use std::sync::Arc;

use ohno::bail;
use serde_json::Value;
use url::Url;

use crate::Result;
use crate::config::ClientConfig;
use crate::mining::client::{ApiClient, PageOutcome};
use crate::mining::guard::RateGuard;
use crate::mining::pages::Paginator;
use crate::mining::payload::{Record, project_record};

const LOG_TARGET: &str = "  selector";

/// Fields every working-set entry is reduced to.
const IDENTITY_FIELDS: [&str; 5] = ["id", "node_id", "name", "owner", "html_url"];

/// A repository reference as supplied by the operator: a numeric provider id
/// or an `owner/name` slug (a full GitHub URL is accepted and reduced to its
/// slug).
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RepoRef {
    Id(u64),
    Slug { owner: String, name: String },
}

impl RepoRef {
    pub fn parse(raw: &str) -> Result<Self> {
        let trimmed = raw.trim();
        if trimmed.is_empty() {
            bail!("empty repository reference");
        }

        if let Ok(id) = trimmed.parse::<u64>() {
            return Ok(Self::Id(id));
        }

        let path = trimmed
            .strip_prefix("https://github.com/")
            .or_else(|| trimmed.strip_prefix("github.com/"))
            .unwrap_or(trimmed);

        let segments: Vec<_> = path.split('/').collect();
        if segments.len() != 2 || segments[0].is_empty() || segments[1].is_empty() {
            bail!("invalid repository reference '{raw}': expected a numeric id or owner/name");
        }

        Ok(Self::Slug {
            owner: segments[0].to_owned(),
            name: segments[1].trim_end_matches(".git").to_owned(),
        })
    }

    /// Root-relative endpoint that resolves this reference.
    #[must_use]
    fn endpoint(&self) -> String {
        match self {
            Self::Id(id) => format!("/repositories/{id}"),
            Self::Slug { owner, name } => format!("/repos/{owner}/{name}"),
        }
    }
}

impl FromStr for RepoRef {
    type Err = ohno::AppError;

    fn from_str(s: &str) -> Result<Self> {
        Self::parse(s)
    }
}

impl Display for RepoRef {
    fn fmt(&self, f: &mut Formatter<'_>) -> core::fmt::Result {
        match self {
            Self::Id(id) => write!(f, "{id}"),
            Self::Slug { owner, name } => write!(f, "{owner}/{name}"),
        }
    }
}

/// One selected repository: typed handles for URL building plus the
/// projected identity record.
#[derive(Debug, Clone, PartialEq)]
pub struct RepoIdentity {
    pub id: u64,
    pub owner: String,
    pub name: String,
    pub record: Record,
}

impl RepoIdentity {
    /// Admit a raw item into the working set. Items without a numeric `id`
    /// are not admissible.
    fn from_raw(raw: &Record) -> Option<Self> {
        let id = raw.get("id")?.as_u64()?;
        let record = project_record(raw, &IDENTITY_FIELDS);
        let owner = record
            .get("owner")
            .and_then(|owner| owner.get("login"))
            .and_then(Value::as_str)
            .unwrap_or_default()
            .to_owned();
        let name = record.get("name").and_then(Value::as_str).unwrap_or_default().to_owned();

        Some(Self { id, owner, name, record })
    }

    /// The `owner/name` slug, used for web page URLs.
    #[must_use]
    pub fn slug(&self) -> String {
        format!("{}/{}", self.owner, self.name)
    }
}

/// The session's fixed repository set, keyed and ordered by id.
pub type WorkingSet = BTreeMap<u64, RepoIdentity>;

/// Resolves operator input into a [`WorkingSet`].
pub struct RepoSelector<'a> {
    client: &'a ApiClient,
    paginator: Paginator<'a>,
    per_page: u32,
}

impl<'a> RepoSelector<'a> {
    #[must_use]
    pub fn new(client: &'a ApiClient, guard: Arc<RateGuard>, config: &ClientConfig) -> Self {
        Self {
            client,
            paginator: Paginator::new(client, guard, config.pacing),
            per_page: config.per_page,
        }
    }

    /// Resolve each reference through the single-repository endpoint. A
    /// reference that cannot be resolved is logged and skipped; the rest of
    /// the list is unaffected.
    pub async fn select_explicit(&self, refs: &[RepoRef]) -> Result<WorkingSet> {
        let mut set = WorkingSet::new();

        for reference in refs {
            let url = self.client.api_url(&reference.endpoint());
            match self.paginator.get_guarded(&url).await? {
                PageOutcome::Success { body, .. } => {
                    let admitted = match &body {
                        Value::Object(raw) => RepoIdentity::from_raw(raw),
                        _ => None,
                    };
                    match admitted {
                        Some(identity) => {
                            let _ = set.insert(identity.id, identity);
                        }
                        None => log::warn!(target: LOG_TARGET, "Skipping '{reference}': response carries no usable repository object"),
                    }
                }
                PageOutcome::Denied { status } => {
                    log::warn!(target: LOG_TARGET, "Skipping '{reference}': HTTP {status}");
                }
                PageOutcome::Unavailable { reason } => {
                    log::warn!(target: LOG_TARGET, "Skipping '{reference}': {reason}");
                }
                PageOutcome::Throttled { .. } => unreachable!("get_guarded resolves throttles"),
            }
        }

        log::info!(target: LOG_TARGET, "Selected {} of {} requested repositories", set.len(), refs.len());
        Ok(set)
    }

    /// Page through search results until `target` distinct repositories have
    /// been normalized or the cursor runs out.
    ///
    /// The count that drives the stop decision is the working set's size,
    /// never the raw item tally: duplicates and items without an id do not
    /// shortchange the result.
    pub async fn select_search(&self, query: &str, target: usize) -> Result<WorkingSet> {
        let mut set = WorkingSet::new();
        let mut dropped = 0_usize;

        let mut first = Url::parse(&self.client.api_url("/search/repositories"))?;
        let _ = first
            .query_pairs_mut()
            .append_pair("q", query)
            .append_pair("per_page", &self.per_page.to_string());
        let mut url = String::from(first);

        loop {
            match self.paginator.get_guarded(&url).await? {
                PageOutcome::Success { body, links, .. } => {
                    let Some(items) = body.get("items").and_then(Value::as_array) else {
                        log::warn!(target: LOG_TARGET, "Search page at '{url}' carries no items array; stopping");
                        break;
                    };

                    for item in items {
                        let admitted = match item {
                            Value::Object(raw) => RepoIdentity::from_raw(raw),
                            _ => None,
                        };
                        match admitted {
                            Some(identity) => {
                                let _ = set.insert(identity.id, identity);
                            }
                            None => dropped += 1,
                        }
                    }

                    if set.len() >= target {
                        break;
                    }
                    match links.next {
                        Some(next) => url = next,
                        None => break,
                    }
                }
                PageOutcome::Denied { status } => {
                    log::warn!(target: LOG_TARGET, "Search rejected with HTTP {status}; keeping {} repositories", set.len());
                    break;
                }
                PageOutcome::Unavailable { reason } => {
                    log::warn!(target: LOG_TARGET, "Search unavailable ({reason}); keeping {} repositories", set.len());
                    break;
                }
                PageOutcome::Throttled { .. } => unreachable!("get_guarded resolves throttles"),
            }
        }

        if dropped > 0 {
            log::debug!(target: LOG_TARGET, "Dropped {dropped} search items without a usable id");
        }
        if set.len() < target {
            log::warn!(target: LOG_TARGET, "Search yielded {} of {target} requested repositories", set.len());
        }
        log::info!(target: LOG_TARGET, "Selected {} repositories for query '{query}'", set.len());

        Ok(set)
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;
    use wiremock::matchers::{method, path, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    use super::*;

    fn selector_config(server: &MockServer) -> ClientConfig {
        ClientConfig {
            api_base: server.uri(),
            pacing: core::time::Duration::ZERO,
            ..ClientConfig::new(Some("token-1"))
        }
    }

    fn repo_item(id: u64) -> Value {
        json!({
            "id": id,
            "node_id": format!("R_{id}"),
            "name": format!("repo-{id}"),
            "owner": {"login": "acme", "id": 900},
            "html_url": format!("https://github.com/acme/repo-{id}"),
            "private": false
        })
    }

    #[test]
    fn parses_numeric_ids_and_slugs() {
        assert_eq!(RepoRef::parse("8649239").unwrap(), RepoRef::Id(8_649_239));
        assert_eq!(
            RepoRef::parse("rust-lang/rust").unwrap(),
            RepoRef::Slug {
                owner: "rust-lang".to_owned(),
                name: "rust".to_owned()
            }
        );
        assert_eq!(
            RepoRef::parse("https://github.com/acme/widget.git").unwrap(),
            RepoRef::Slug {
                owner: "acme".to_owned(),
                name: "widget".to_owned()
            }
        );
    }

    #[test]
    fn rejects_malformed_references() {
        assert!(RepoRef::parse("").is_err());
        assert!(RepoRef::parse("  ").is_err());
        assert!(RepoRef::parse("/widget").is_err());
        assert!(RepoRef::parse("acme/").is_err());
        assert!(RepoRef::parse("a/b/c").is_err());
    }

    #[test]
    fn reference_endpoints() {
        assert_eq!(RepoRef::Id(55).endpoint(), "/repositories/55");
        assert_eq!(RepoRef::parse("acme/widget").unwrap().endpoint(), "/repos/acme/widget");
    }

    #[test]
    fn identity_requires_a_numeric_id() {
        let with_id = match repo_item(7) {
            Value::Object(map) => map,
            _ => unreachable!(),
        };
        let identity = RepoIdentity::from_raw(&with_id).unwrap();
        assert_eq!(identity.id, 7);
        assert_eq!(identity.slug(), "acme/repo-7");
        assert_eq!(identity.record.len(), IDENTITY_FIELDS.len());

        let without_id = match json!({"name": "x"}) {
            Value::Object(map) => map,
            _ => unreachable!(),
        };
        assert!(RepoIdentity::from_raw(&without_id).is_none());
    }

    #[tokio::test]
    async fn explicit_mode_resolves_ids_and_slugs() {
        let server = MockServer::start().await;

        Mock::given(method("GET"))
            .and(path("/repositories/55"))
            .respond_with(ResponseTemplate::new(200).set_body_json(repo_item(55)))
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/repos/acme/repo-7"))
            .respond_with(ResponseTemplate::new(200).set_body_json(repo_item(7)))
            .mount(&server)
            .await;

        let config = selector_config(&server);
        let client = ApiClient::new(&config).unwrap();
        let selector = RepoSelector::new(&client, RateGuard::new(2), &config);

        let refs = [RepoRef::Id(55), RepoRef::parse("acme/repo-7").unwrap()];
        let set = selector.select_explicit(&refs).await.unwrap();

        assert_eq!(set.len(), 2);
        assert_eq!(set[&55].name, "repo-55");
        assert_eq!(set[&7].owner, "acme");
    }

    #[tokio::test]
    async fn explicit_mode_skips_failures() {
        let server = MockServer::start().await;

        Mock::given(method("GET"))
            .and(path("/repositories/55"))
            .respond_with(ResponseTemplate::new(200).set_body_json(repo_item(55)))
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/repositories/56"))
            .respond_with(ResponseTemplate::new(404))
            .mount(&server)
            .await;

        let config = selector_config(&server);
        let client = ApiClient::new(&config).unwrap();
        let selector = RepoSelector::new(&client, RateGuard::new(2), &config);

        let set = selector.select_explicit(&[RepoRef::Id(55), RepoRef::Id(56)]).await.unwrap();
        assert_eq!(set.len(), 1);
        assert!(set.contains_key(&55));
    }

    #[tokio::test]
    async fn search_counts_distinct_normalized_repositories() {
        let server = MockServer::start().await;

        // 150 raw items over two pages, ids 91..=100 appearing on both.
        let page_one: Vec<Value> = (1..=100).map(repo_item).collect();
        let page_two: Vec<Value> = (91..=140).map(repo_item).collect();
        let next = format!("{}/search/repositories?q=x&per_page=100&page=2", server.uri());
        let link = format!(r#"<{next}>; rel="next", <{next}>; rel="last""#);

        Mock::given(method("GET"))
            .and(path("/search/repositories"))
            .and(query_param("page", "2"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({"total_count": 150, "items": page_two})))
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/search/repositories"))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_json(json!({"total_count": 150, "items": page_one}))
                    .insert_header("Link", link.as_str()),
            )
            .mount(&server)
            .await;

        let config = selector_config(&server);
        let client = ApiClient::new(&config).unwrap();
        let selector = RepoSelector::new(&client, RateGuard::new(2), &config);

        // After page one only 100 distinct ids exist, so the second page
        // must be fetched to satisfy a target of 120.
        let set = selector.select_search("language:rust stars:>100", 120).await.unwrap();
        assert_eq!(set.len(), 140);
    }

    #[tokio::test]
    async fn search_stops_at_exhaustion_below_target() {
        let server = MockServer::start().await;

        let items: Vec<Value> = (1..=3).map(repo_item).collect();
        Mock::given(method("GET"))
            .and(path("/search/repositories"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({"total_count": 3, "items": items})))
            .mount(&server)
            .await;

        let config = selector_config(&server);
        let client = ApiClient::new(&config).unwrap();
        let selector = RepoSelector::new(&client, RateGuard::new(2), &config);

        let set = selector.select_search("language:rust", 10).await.unwrap();
        assert_eq!(set.len(), 3);
    }

    #[tokio::test]
    async fn search_page_without_items_is_a_stop() {
        let server = MockServer::start().await;

        Mock::given(method("GET"))
            .and(path("/search/repositories"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({"message": "validation failed"})))
            .mount(&server)
            .await;

        let config = selector_config(&server);
        let client = ApiClient::new(&config).unwrap();
        let selector = RepoSelector::new(&client, RateGuard::new(2), &config);

        let set = selector.select_search("???", 10).await.unwrap();
        assert!(set.is_empty());
    }
}
