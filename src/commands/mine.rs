use super::common::{CommonArgs, init_logging};
use camino::{Utf8Path, Utf8PathBuf};
use chrono::{DateTime, Months, Utc};
use clap::Parser;
use ohno::bail;
use repo_vitals::Result;
use repo_vitals::config::{ClientConfig, DescriptorTable};
use repo_vitals::mining::{AgeCutoff, ApiClient, Filters, RateGuard, RepoRef, RepoSelector, ResourceFetcher, ResourceMap, WorkingSet};
use repo_vitals::scrape::{BranchActivity, BranchesPage, DependenciesPage, DependentsPage, ScrapeDriver};
use repo_vitals::snapshot;
use serde::Serialize;
use std::sync::Arc;

const LOG_TARGET: &str = "      mine";

/// Snapshot names the mine command can produce.
const MINED_RESOURCES: &[&str] = &[
    "repository",
    "releases",
    "community_health",
    "advisories",
    "contributors",
    "organization_users",
    "forks",
    "pull_requests",
    "issues",
    "commits",
    "single_commits",
    "issue_comments",
    "dependents",
    "dependencies",
    "active_branches",
    "stale_branches",
];

#[derive(Parser, Debug)]
pub struct MineArgs {
    /// GitHub personal access token
    #[arg(long, value_name = "TOKEN", env = "GITHUB_TOKEN")]
    pub github_token: Option<String>,

    /// Search query selecting the repositories to mine
    #[arg(long, value_name = "QUERY", conflicts_with = "repo")]
    pub query: Option<String>,

    /// Number of repositories to take from the search results
    #[arg(long, value_name = "N", default_value_t = 100, requires = "query")]
    pub count: usize,

    /// Repository to mine (format: `owner/name` or a numeric id)
    #[arg(long, value_name = "REPO", value_parser = parse_repo_ref)]
    pub repo: Vec<RepoRef>,

    /// Mine only the named resources [default: all resources]
    #[arg(long, value_name = "NAME")]
    pub resource: Vec<String>,

    /// Path to a resource descriptor file replacing the built-in table
    #[arg(long, value_name = "PATH")]
    pub resources: Option<Utf8PathBuf>,

    /// Number of repositories to fetch concurrently
    #[arg(long, value_name = "N", default_value_t = 1)]
    pub jobs: usize,

    #[command(flatten)]
    pub common: CommonArgs,
}

pub async fn mine_snapshots(args: &MineArgs) -> Result<()> {
    init_logging(args.common.log_level);

    let Some(token) = args.github_token.as_deref() else {
        bail!("a GitHub access token is required: pass --github-token or set GITHUB_TOKEN");
    };

    if args.query.is_none() && args.repo.is_empty() {
        bail!("nothing to mine: pass --query or at least one --repo");
    }

    for name in &args.resource {
        if !MINED_RESOURCES.contains(&name.as_str()) {
            bail!("unknown resource '{name}'; expected one of: {}", MINED_RESOURCES.join(", "));
        }
    }

    let descriptors = match &args.resources {
        Some(path) => DescriptorTable::load(path)?,
        None => DescriptorTable::builtin()?,
    };

    for warning in descriptors.validate() {
        log::warn!(target: LOG_TARGET, "Resource table: {warning}");
    }

    let mut config = ClientConfig::new(Some(token));
    config.jobs = args.jobs.max(1);

    let client = ApiClient::new(&config)?;
    let guard = RateGuard::new(config.jobs);
    let selector = RepoSelector::new(&client, Arc::clone(&guard), &config);

    let repos = match &args.query {
        Some(query) => selector.select_search(query, args.count).await?,
        None => selector.select_explicit(&args.repo).await?,
    };

    if repos.is_empty() {
        bail!("no repositories selected; nothing to mine");
    }

    log::info!(target: LOG_TARGET, "Mining {} repositories into {}", repos.len(), args.common.out);

    let plan = MinePlan {
        fetcher: ResourceFetcher::new(&config, &client, Arc::clone(&guard), &descriptors),
        scraper: ScrapeDriver::new(&config)?,
        repos: &repos,
        out: &args.common.out,
        language: &args.common.language,
        only: &args.resource,
        started: Utc::now(),
    };

    plan.run().await?;

    log::info!(target: LOG_TARGET, "Mining complete");
    Ok(())
}

/// One mining run: which repositories, which resources, where snapshots land.
struct MinePlan<'a> {
    fetcher: ResourceFetcher<'a>,
    scraper: ScrapeDriver,
    repos: &'a WorkingSet,
    out: &'a Utf8Path,
    language: &'a str,
    only: &'a [String],
    started: DateTime<Utc>,
}

impl MinePlan<'_> {
    fn wanted(&self, name: &str) -> bool {
        self.only.is_empty() || self.only.iter().any(|wanted| wanted == name)
    }

    fn write<T: Serialize>(&self, resource: &str, data: &T) -> Result<()> {
        let _ = snapshot::write_snapshot(self.out, self.language, resource, data)?;
        Ok(())
    }

    async fn fetch_plain(&self, name: &str, filters: &Filters, cutoff: Option<&AgeCutoff>) -> Result<ResourceMap> {
        let mut groups = self.fetcher.fetch_resource(self.repos, &[name], filters, cutoff).await?;
        Ok(groups.remove(name).unwrap_or_default())
    }

    async fn run(&self) -> Result<()> {
        let unfiltered = Filters::new();
        let all_states = Filters::from([("state".to_owned(), "all".to_owned())]);

        for name in ["repository", "releases", "community_health", "advisories"] {
            if self.wanted(name) {
                let map = self.fetch_plain(name, &unfiltered, None).await?;
                self.write(name, &map)?;
            }
        }

        // Organization memberships hang off the contributor accounts, so the
        // contributor fetch runs whenever either snapshot is wanted.
        if self.wanted("contributors") || self.wanted("organization_users") {
            let contributors = self.fetch_plain("contributors", &unfiltered, None).await?;
            if self.wanted("contributors") {
                self.write("contributors", &contributors)?;
            }

            if self.wanted("organization_users") {
                let memberships = self.fetcher.fetch_subresource(&contributors, "organization_users", None).await?;
                self.write("organization_users", &memberships)?;
            }
        }

        // The forks endpoint lists in creation order, so the one-year activity
        // window filters records without ending pagination early.
        if self.wanted("forks") {
            let cutoff = AgeCutoff::new("updated_at", self.started - Months::new(12));
            let map = self.fetch_plain("forks", &unfiltered, Some(&cutoff)).await?;
            self.write("forks", &map)?;
        }

        for name in ["pull_requests", "issues"] {
            if self.wanted(name) {
                let map = self.fetch_plain(name, &all_states, None).await?;
                self.write(name, &map)?;
            }
        }

        if self.wanted("commits") {
            let filters = since_filter(self.started - Months::new(12));
            let map = self.fetch_plain("commits", &filters, None).await?;
            self.write("commits", &map)?;
        }

        // Per-commit detail is expensive, so its parent listing uses a
        // one-month window of its own instead of reusing the commits snapshot.
        if self.wanted("single_commits") {
            let filters = since_filter(self.started - Months::new(1));
            let recent = self.fetch_plain("commits", &filters, None).await?;
            let details = self.fetcher.fetch_subresource(&recent, "single_commits", None).await?;
            self.write("single_commits", &details)?;
        }

        // Comment threads cover issues touched in the last six months; the
        // threads list ascending by creation date, so the same window filters
        // individual comments without ending pagination early.
        if self.wanted("issue_comments") {
            let six_months_ago = self.started - Months::new(6);
            let mut filters = since_filter(six_months_ago);
            let _ = filters.insert("state".to_owned(), "all".to_owned());
            let parents = self.fetch_plain("issues", &filters, None).await?;

            let cutoff = AgeCutoff::new("created_at", six_months_ago);
            let comments = self.fetcher.fetch_subresource(&parents, "issue_comments", Some(&cutoff)).await?;
            self.write("issue_comments", &comments)?;
        }

        self.run_scrapes().await
    }

    async fn run_scrapes(&self) -> Result<()> {
        if self.wanted("dependents") {
            let adapter = DependentsPage::new()?;
            let map = self.scraper.scrape(&adapter, self.repos).await?;
            self.write("dependents", &map)?;
        }

        if self.wanted("dependencies") {
            let adapter = DependenciesPage::new()?;
            let map = self.scraper.scrape(&adapter, self.repos).await?;
            self.write("dependencies", &map)?;
        }

        for activity in [BranchActivity::Active, BranchActivity::Stale] {
            let name = activity.resource_name();
            if self.wanted(name) {
                let adapter = BranchesPage::new(activity)?;
                let map = self.scraper.scrape(&adapter, self.repos).await?;
                self.write(name, &map)?;
            }
        }

        Ok(())
    }
}

/// Clap cannot infer a parser from `RepoRef`'s `FromStr` because its error
/// type does not convert into a boxed `std::error::Error`.
fn parse_repo_ref(raw: &str) -> core::result::Result<RepoRef, String> {
    RepoRef::parse(raw).map_err(|e| e.to_string())
}

/// `since` query parameter in the timestamp shape the listing endpoints accept.
fn since_filter(not_before: DateTime<Utc>) -> Filters {
    Filters::from([("since".to_owned(), not_before.format("%Y-%m-%dT%H:%M:%SZ").to_string())])
}
