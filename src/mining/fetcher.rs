//! Descriptor-driven resource fetching across a working set.
//!
//! One resource name, one descriptor, one result map per repository.
//! Transient failures restart the affected repository from page one with a
//! fixed delay, indefinitely; terminal failures leave that repository in the
//! result as [`RecordSet::Empty`] so downstream consumers always find every
//! repository they asked about.

use std::collections::BTreeMap;
use std::sync::Arc;

use futures::stream::{self, StreamExt};
use ohno::bail;
use serde_json::Value;
use url::Url;

use crate::Result;
use crate::config::{ClientConfig, DescriptorTable, NestedScope, ResourceDescriptor};
use crate::mining::client::ApiClient;
use crate::mining::guard::RateGuard;
use crate::mining::pages::{AgeCutoff, Paginator};
use crate::mining::payload::RecordSet;
use crate::mining::retry::RetryPolicy;
use crate::mining::selector::WorkingSet;

const LOG_TARGET: &str = "   fetcher";

const PROGRESS_EVERY: usize = 100;

/// Query parameters sent with the first page of each repository's fetch.
pub type Filters = BTreeMap<String, String>;

/// One resource's results: repository id to its projected data.
pub type ResourceMap = BTreeMap<u64, RecordSet>;

/// Several resources fetched together, keyed by resource name.
pub type ResourceGroups = BTreeMap<String, ResourceMap>;

/// Nested results: repository id to a map from stringified parent id to the
/// sub-items fetched under that parent.
pub type SubResourceMap = BTreeMap<u64, BTreeMap<String, RecordSet>>;

/// Fetches named resources for every repository in a working set.
pub struct ResourceFetcher<'a> {
    config: &'a ClientConfig,
    client: &'a ApiClient,
    guard: Arc<RateGuard>,
    descriptors: &'a DescriptorTable,
    retry: RetryPolicy,
}

impl<'a> ResourceFetcher<'a> {
    #[must_use]
    pub fn new(config: &'a ClientConfig, client: &'a ApiClient, guard: Arc<RateGuard>, descriptors: &'a DescriptorTable) -> Self {
        Self {
            config,
            client,
            guard,
            descriptors,
            retry: RetryPolicy::unbounded(config.retry_delay),
        }
    }

    /// Fetch each named resource for every repository in `repos`.
    ///
    /// Every name is resolved against the descriptor table before any
    /// network work starts, so an unknown resource fails the call instead of
    /// wasting a partial run. Each repository appears in every returned map,
    /// as `Empty` when its fetch ended in a terminal failure.
    pub async fn fetch_resource(
        &self,
        repos: &WorkingSet,
        names: &[&str],
        filters: &Filters,
        cutoff: Option<&AgeCutoff>,
    ) -> Result<ResourceGroups> {
        let mut resolved = Vec::with_capacity(names.len());
        for name in names {
            resolved.push((*name, self.descriptors.get(name)?));
        }

        let mut groups = ResourceGroups::new();
        for (name, descriptor) in resolved {
            let map = self.fetch_group(repos, name, descriptor, filters, cutoff).await?;
            let _ = groups.insert(name.to_owned(), map);
        }
        Ok(groups)
    }

    /// Fetch a nested resource under previously fetched parent items.
    ///
    /// Results are keyed by the parent item's id, stringified. Parent items
    /// lacking a usable id value are skipped with a log line; a repository
    /// whose parent set is empty stays present with an empty map.
    pub async fn fetch_subresource(&self, parents: &ResourceMap, name: &str, cutoff: Option<&AgeCutoff>) -> Result<SubResourceMap> {
        let descriptor = self.descriptors.get(name)?;
        let Some(parent_field) = descriptor.parent_id_field.as_deref() else {
            bail!("resource '{name}' is not nested: it defines no parent_id_field");
        };

        let total = parents.len();
        log::info!(target: LOG_TARGET, "Fetching {name} under {total} repositories");

        let mut pending = stream::iter(
            parents
                .iter()
                .map(|(&repo_id, parent_set)| self.fetch_nested_for_repo(name, descriptor, parent_field, repo_id, parent_set, cutoff)),
        )
        .buffer_unordered(self.config.jobs.max(1));

        let mut map = SubResourceMap::new();
        let mut done = 0_usize;
        while let Some(fetched) = pending.next().await {
            let (repo_id, children) = fetched?;
            let _ = map.insert(repo_id, children);
            done += 1;
            if done % PROGRESS_EVERY == 0 || done == total {
                log::info!(target: LOG_TARGET, "{name}: processed {done} of {total} repositories");
            }
        }
        Ok(map)
    }

    async fn fetch_group(
        &self,
        repos: &WorkingSet,
        name: &str,
        descriptor: &ResourceDescriptor,
        filters: &Filters,
        cutoff: Option<&AgeCutoff>,
    ) -> Result<ResourceMap> {
        let total = repos.len();
        log::info!(target: LOG_TARGET, "Fetching {name} for {total} repositories");

        let mut pending = stream::iter(repos.keys().map(|&repo_id| self.fetch_one(name, descriptor, repo_id, filters, cutoff)))
            .buffer_unordered(self.config.jobs.max(1));

        let mut map = ResourceMap::new();
        let mut done = 0_usize;
        while let Some(fetched) = pending.next().await {
            let (repo_id, set) = fetched?;
            let _ = map.insert(repo_id, set);
            done += 1;
            if done % PROGRESS_EVERY == 0 || done == total {
                log::info!(target: LOG_TARGET, "{name}: processed {done} of {total} repositories");
            }
        }
        Ok(map)
    }

    async fn fetch_one(
        &self,
        name: &str,
        descriptor: &ResourceDescriptor,
        repo_id: u64,
        filters: &Filters,
        cutoff: Option<&AgeCutoff>,
    ) -> Result<(u64, RecordSet)> {
        let first_url = self.first_page_url(descriptor, repo_id, filters)?;
        let paginator = Paginator::new(self.client, self.guard.clone(), self.config.pacing);
        let what = format!("{name} for repository {repo_id}");

        let harvested = self.retry.run(&what, || paginator.collect(&first_url, None, cutoff)).await?;
        let set = harvested.unwrap_or(RecordSet::Empty).project(&descriptor.fields);
        Ok((repo_id, set))
    }

    async fn fetch_nested_for_repo(
        &self,
        name: &str,
        descriptor: &ResourceDescriptor,
        parent_field: &str,
        repo_id: u64,
        parents: &RecordSet,
        cutoff: Option<&AgeCutoff>,
    ) -> Result<(u64, BTreeMap<String, RecordSet>)> {
        let mut children = BTreeMap::new();

        for parent in parents.records() {
            let Some(parent_key) = parent.get(parent_field).and_then(stringify_id) else {
                log::debug!(target: LOG_TARGET, "Skipping a {name} parent in repository {repo_id}: no usable '{parent_field}' value");
                continue;
            };

            let first_url = self.nested_first_url(descriptor, repo_id, &parent_key)?;
            let paginator = Paginator::new(self.client, self.guard.clone(), self.config.pacing);
            let what = format!("{name} {parent_key} in repository {repo_id}");

            let harvested = self.retry.run(&what, || paginator.collect(&first_url, None, cutoff)).await?;
            let set = harvested.unwrap_or(RecordSet::Empty).project(&descriptor.fields);
            let _ = children.insert(parent_key, set);
        }

        Ok((repo_id, children))
    }

    fn first_page_url(&self, descriptor: &ResourceDescriptor, repo_id: u64, filters: &Filters) -> Result<String> {
        let path = format!("{}{repo_id}{}", descriptor.url_prefix, descriptor.url_suffix);
        let mut url = Url::parse(&self.client.api_url(&path))?;
        {
            let mut pairs = url.query_pairs_mut();
            for (key, value) in filters {
                let _ = pairs.append_pair(key, value);
            }
            let _ = pairs.append_pair("per_page", &self.config.per_page.to_string());
            let _ = pairs.append_pair("page", "1");
        }
        Ok(String::from(url))
    }

    fn nested_first_url(&self, descriptor: &ResourceDescriptor, repo_id: u64, parent_key: &str) -> Result<String> {
        let nested_suffix = descriptor.nested_suffix.as_deref().unwrap_or_default();
        let path = match descriptor.nested_scope {
            NestedScope::Repository => {
                format!("{}{repo_id}{}/{parent_key}{nested_suffix}", descriptor.url_prefix, descriptor.url_suffix)
            }
            NestedScope::Parent => format!("{}{parent_key}{nested_suffix}", descriptor.url_prefix),
        };

        let mut url = Url::parse(&self.client.api_url(&path))?;
        {
            let mut pairs = url.query_pairs_mut();
            let _ = pairs.append_pair("per_page", &self.config.per_page.to_string());
            let _ = pairs.append_pair("page", "1");
        }
        Ok(String::from(url))
    }
}

/// JSON object keys are strings; numeric parent ids are rendered as decimal.
fn stringify_id(value: &Value) -> Option<String> {
    match value {
        Value::String(text) => Some(text.clone()),
        Value::Number(number) => Some(number.to_string()),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use core::time::Duration;

    use serde_json::json;
    use wiremock::matchers::{method, path, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    use super::*;
    use crate::mining::payload::Record;
    use crate::mining::selector::RepoIdentity;

    fn fetch_config(server: &MockServer) -> ClientConfig {
        ClientConfig {
            api_base: server.uri(),
            pacing: Duration::ZERO,
            retry_delay: Duration::from_millis(10),
            ..ClientConfig::new(Some("token-1"))
        }
    }

    fn working_set(ids: &[u64]) -> WorkingSet {
        ids.iter()
            .map(|&id| {
                (
                    id,
                    RepoIdentity {
                        id,
                        owner: "acme".to_owned(),
                        name: format!("repo-{id}"),
                        record: Record::new(),
                    },
                )
            })
            .collect()
    }

    fn record_set(items: Value) -> RecordSet {
        RecordSet::classify(items, "test")
    }

    #[tokio::test]
    async fn terminal_failure_is_isolated_per_repository() {
        let server = MockServer::start().await;

        Mock::given(method("GET"))
            .and(path("/repositories/1/forks"))
            .respond_with(ResponseTemplate::new(404))
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/repositories/2/forks"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!([{"id": 7}, {"id": 8}])))
            .mount(&server)
            .await;

        let config = fetch_config(&server);
        let client = ApiClient::new(&config).unwrap();
        let descriptors = DescriptorTable::builtin().unwrap();
        let fetcher = ResourceFetcher::new(&config, &client, RateGuard::new(2), &descriptors);

        let groups = fetcher
            .fetch_resource(&working_set(&[1, 2]), &["forks"], &Filters::new(), None)
            .await
            .unwrap();

        let forks = &groups["forks"];
        assert_eq!(forks.len(), 2);
        assert_eq!(forks[&1], RecordSet::Empty);
        assert_eq!(forks[&2].record_count(), 2);
    }

    #[tokio::test]
    async fn unknown_resource_fails_before_any_fetch() {
        let server = MockServer::start().await;
        let config = fetch_config(&server);
        let client = ApiClient::new(&config).unwrap();
        let descriptors = DescriptorTable::builtin().unwrap();
        let fetcher = ResourceFetcher::new(&config, &client, RateGuard::new(2), &descriptors);

        let outcome = fetcher
            .fetch_resource(&working_set(&[1]), &["forks", "no_such_resource"], &Filters::new(), None)
            .await;
        assert!(outcome.is_err());
    }

    #[tokio::test]
    async fn records_are_projected_onto_the_descriptor_whitelist() {
        let server = MockServer::start().await;

        Mock::given(method("GET"))
            .and(path("/repositories/1/forks"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!([{"id": 7, "full_name": "acme/fork-7"}])))
            .mount(&server)
            .await;

        let config = fetch_config(&server);
        let client = ApiClient::new(&config).unwrap();
        let descriptors = DescriptorTable::builtin().unwrap();
        let fetcher = ResourceFetcher::new(&config, &client, RateGuard::new(2), &descriptors);

        let groups = fetcher
            .fetch_resource(&working_set(&[1]), &["forks"], &Filters::new(), None)
            .await
            .unwrap();

        let record = &groups["forks"][&1].records()[0];
        let expected_fields = &descriptors.get("forks").unwrap().fields;
        assert_eq!(record.len(), expected_fields.len());
        assert_eq!(record.get("id"), Some(&json!(7)));
        assert_eq!(record.get("name"), Some(&Value::Null));
        assert!(!record.contains_key("full_name"));
    }

    #[tokio::test]
    #[cfg_attr(miri, ignore = "miri doesn't support the tokio runtime's timers")]
    async fn transient_failure_restarts_the_repository_fetch() {
        let server = MockServer::start().await;

        Mock::given(method("GET"))
            .and(path("/repositories/1/forks"))
            .respond_with(ResponseTemplate::new(503))
            .up_to_n_times(1)
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/repositories/1/forks"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!([{"id": 7}, {"id": 8}])))
            .mount(&server)
            .await;

        let config = fetch_config(&server);
        let client = ApiClient::new(&config).unwrap();
        let descriptors = DescriptorTable::builtin().unwrap();
        let fetcher = ResourceFetcher::new(&config, &client, RateGuard::new(2), &descriptors);

        let groups = fetcher
            .fetch_resource(&working_set(&[1]), &["forks"], &Filters::new(), None)
            .await
            .unwrap();
        assert_eq!(groups["forks"][&1].record_count(), 2);
    }

    #[tokio::test]
    async fn filters_and_page_size_reach_the_wire() {
        let server = MockServer::start().await;

        Mock::given(method("GET"))
            .and(path("/repositories/1/issues"))
            .and(query_param("state", "all"))
            .and(query_param("per_page", "100"))
            .and(query_param("page", "1"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!([{"id": 5, "number": 42}])))
            .mount(&server)
            .await;

        let config = fetch_config(&server);
        let client = ApiClient::new(&config).unwrap();
        let descriptors = DescriptorTable::builtin().unwrap();
        let fetcher = ResourceFetcher::new(&config, &client, RateGuard::new(2), &descriptors);

        let filters = Filters::from([("state".to_owned(), "all".to_owned())]);
        let groups = fetcher
            .fetch_resource(&working_set(&[1]), &["issues"], &filters, None)
            .await
            .unwrap();
        assert_eq!(groups["issues"][&1].record_count(), 1);
    }

    #[tokio::test]
    async fn nested_results_are_keyed_by_stringified_parent_id() {
        let server = MockServer::start().await;

        Mock::given(method("GET"))
            .and(path("/repositories/1/issues/42/comments"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!([{"id": 900, "user": {"login": "a"}}, {"id": 901, "user": {"login": "b"}}])))
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/repositories/1/issues/43/comments"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!([])))
            .mount(&server)
            .await;

        let config = fetch_config(&server);
        let client = ApiClient::new(&config).unwrap();
        let descriptors = DescriptorTable::builtin().unwrap();
        let fetcher = ResourceFetcher::new(&config, &client, RateGuard::new(2), &descriptors);

        // The third parent has no `number` value and is skipped.
        let parents = ResourceMap::from([(1, record_set(json!([{"number": 42}, {"number": 43}, {"id": 9}])))]);
        let subs = fetcher.fetch_subresource(&parents, "issue_comments", None).await.unwrap();

        let per_repo = &subs[&1];
        let keys: Vec<_> = per_repo.keys().cloned().collect();
        assert_eq!(keys, ["42", "43"]);
        assert_eq!(per_repo["42"].record_count(), 2);
        assert_eq!(per_repo["43"].record_count(), 0);
    }

    #[tokio::test]
    async fn parent_scoped_nested_resources_use_the_parent_root() {
        let server = MockServer::start().await;

        Mock::given(method("GET"))
            .and(path("/users/alice/orgs"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!([{"id": 11, "login": "acme-org"}])))
            .mount(&server)
            .await;

        let config = fetch_config(&server);
        let client = ApiClient::new(&config).unwrap();
        let descriptors = DescriptorTable::builtin().unwrap();
        let fetcher = ResourceFetcher::new(&config, &client, RateGuard::new(2), &descriptors);

        let parents = ResourceMap::from([(1, record_set(json!([{"login": "alice"}])))]);
        let subs = fetcher.fetch_subresource(&parents, "organization_users", None).await.unwrap();

        assert_eq!(subs[&1]["alice"].record_count(), 1);
    }

    #[tokio::test]
    async fn plain_resources_cannot_be_fetched_as_nested() {
        let server = MockServer::start().await;
        let config = fetch_config(&server);
        let client = ApiClient::new(&config).unwrap();
        let descriptors = DescriptorTable::builtin().unwrap();
        let fetcher = ResourceFetcher::new(&config, &client, RateGuard::new(2), &descriptors);

        let parents = ResourceMap::from([(1, record_set(json!([{"id": 5}])))]);
        assert!(fetcher.fetch_subresource(&parents, "forks", None).await.is_err());
    }

    #[tokio::test]
    async fn empty_parent_sets_stay_present() {
        let server = MockServer::start().await;
        let config = fetch_config(&server);
        let client = ApiClient::new(&config).unwrap();
        let descriptors = DescriptorTable::builtin().unwrap();
        let fetcher = ResourceFetcher::new(&config, &client, RateGuard::new(2), &descriptors);

        let parents = ResourceMap::from([(1, RecordSet::Empty)]);
        let subs = fetcher.fetch_subresource(&parents, "issue_comments", None).await.unwrap();

        assert_eq!(subs.len(), 1);
        assert!(subs[&1].is_empty());
    }
}
