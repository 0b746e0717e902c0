use super::common::{CommonArgs, init_logging};
use camino::{Utf8Path, Utf8PathBuf};
use chrono::{Months, Utc};
use clap::Parser;
use core::time::Duration;
use ohno::{IntoAppError, bail};
use repo_vitals::Result;
use repo_vitals::external::{self, LicenseCatalog, NVD_WEB_BASE, SPDX_CATALOG_URL};
use repo_vitals::mining::{Record, ResourceMap, SubResourceMap};
use repo_vitals::snapshot::{self, snapshot_path};
use repo_vitals::vitals::{
    MetricMap, SignalInputs, advisory_exposure, branch_lifecycle, bus_factor, churn, community_health, criticality_signals,
    criticality_weights, elephant_factor, maturity, osi_approved_license, project_velocity, size_of_community, support_contributors,
    support_rate, technical_fork,
};
use serde::de::DeserializeOwned;
use serde_json::Value;
use std::collections::{BTreeMap, BTreeSet};

const LOG_TARGET: &str = "     score";

const USER_AGENT: &str = "repo-vitals";

const HTTP_TIMEOUT: Duration = Duration::from_secs(30);

/// Metric column order for the CSV table.
const METRIC_COLUMNS: &[&str] = &[
    "maturity",
    "osi_approved_license",
    "technical_fork",
    "criticality_score",
    "project_velocity",
    "community_health",
    "support_rate",
    "elephant_factor",
    "size_of_community",
    "churn",
    "branch_lifecycle",
    "bus_factor",
    "support_contributors",
    "advisory_exposure",
];

#[derive(Parser, Debug)]
pub struct ScoreArgs {
    /// Also write the scores as a CSV table to this path
    #[arg(long, value_name = "PATH")]
    pub csv: Option<Utf8PathBuf>,

    #[command(flatten)]
    pub common: CommonArgs,
}

pub async fn score_snapshots(args: &ScoreArgs) -> Result<()> {
    init_logging(args.common.log_level);

    let out = &args.common.out;
    let language = &args.common.language;

    let repository_path = snapshot_path(out, language, "repository");
    if !repository_path.exists() {
        bail!("no repository snapshot at '{repository_path}'; run the mine command first");
    }

    let repos: ResourceMap = snapshot::load(&repository_path)?;
    let contributors: ResourceMap = load_optional(out, language, "contributors")?;
    let commits: ResourceMap = load_optional(out, language, "commits")?;
    let releases: ResourceMap = load_optional(out, language, "releases")?;
    let issues: ResourceMap = load_optional(out, language, "issues")?;
    let community: ResourceMap = load_optional(out, language, "community_health")?;
    let advisories: ResourceMap = load_optional(out, language, "advisories")?;
    let forks: ResourceMap = load_optional(out, language, "forks")?;
    let dependents: ResourceMap = load_optional(out, language, "dependents")?;
    let stale_branches: ResourceMap = load_optional(out, language, "stale_branches")?;
    let active_branches: ResourceMap = load_optional(out, language, "active_branches")?;
    let org_memberships: SubResourceMap = load_optional(out, language, "organization_users")?;
    let commit_details: SubResourceMap = load_optional(out, language, "single_commits")?;
    let comments: SubResourceMap = load_optional(out, language, "issue_comments")?;

    let http = reqwest::Client::builder()
        .user_agent(USER_AGENT)
        .timeout(HTTP_TIMEOUT)
        .build()
        .into_app_err("unable to build HTTP client")?;

    let catalog = match LicenseCatalog::fetch(&http, SPDX_CATALOG_URL).await {
        Ok(catalog) => catalog,
        Err(e) => {
            log::warn!(target: LOG_TARGET, "Unable to fetch the SPDX license catalog ({e}); licenses will score as unapproved");
            LicenseCatalog::default()
        }
    };

    let nvd_scores = nvd_backfill(&http, &advisories).await;

    let today = Utc::now();
    let one_year_ago = today - Months::new(12);

    let signals = criticality_signals(
        SignalInputs {
            repos: &repos,
            contributors: &contributors,
            org_memberships: &org_memberships,
            commits: &commits,
            releases: &releases,
            issues: &issues,
            comments: &comments,
            dependents: &dependents,
        },
        today,
    );

    let mut scores: BTreeMap<u64, Record> = BTreeMap::new();
    merge_metric(&mut scores, "maturity", as_values(maturity(&repos, &issues, &releases, today)));
    merge_metric(&mut scores, "osi_approved_license", as_values(osi_approved_license(&repos, &catalog)));
    merge_metric(&mut scores, "technical_fork", records_as_values(technical_fork(&forks, one_year_ago)));
    merge_metric(&mut scores, "criticality_score", as_values(criticality_weights(&signals)));
    merge_metric(&mut scores, "project_velocity", records_as_values(project_velocity(&issues)));
    merge_metric(&mut scores, "community_health", records_as_values(community_health(&community)));
    merge_metric(&mut scores, "support_rate", as_values(support_rate(&issues, &comments)));
    merge_metric(&mut scores, "elephant_factor", as_values(elephant_factor(&contributors, &org_memberships)));
    merge_metric(&mut scores, "size_of_community", as_values(size_of_community(&repos, &contributors)));
    merge_metric(
        &mut scores,
        "churn",
        churn(&commit_details).into_iter().map(|(repo, ratio)| (repo, ratio.map_or(Value::Null, Value::from))),
    );
    merge_metric(&mut scores, "branch_lifecycle", records_as_values(branch_lifecycle(&stale_branches, &active_branches)));
    merge_metric(&mut scores, "bus_factor", records_as_values(bus_factor(&commits)));
    merge_metric(&mut scores, "support_contributors", as_values(support_contributors(&commits)));
    merge_metric(&mut scores, "advisory_exposure", records_as_values(advisory_exposure(&advisories, &nvd_scores)));

    let _ = snapshot::write_snapshot(out, language, "scores", &scores)?;
    log::info!(target: LOG_TARGET, "Scored {} repositories", scores.len());

    if let Some(path) = &args.csv {
        write_csv(path, &scores)?;
        log::info!(target: LOG_TARGET, "Score table written to '{path}'");
    }

    Ok(())
}

/// Load a snapshot that scoring can do without; a missing file is an empty map.
fn load_optional<T>(out: &Utf8Path, language: &str, resource: &str) -> Result<T>
where
    T: DeserializeOwned + Default,
{
    let path = snapshot_path(out, language, resource);
    if path.exists() {
        snapshot::load(&path)
    } else {
        log::warn!(target: LOG_TARGET, "No {resource} snapshot at '{path}'; scoring without it");
        Ok(T::default())
    }
}

/// CVSS base scores for advisories whose own record carries none.
async fn nvd_backfill(http: &reqwest::Client, advisories: &ResourceMap) -> BTreeMap<String, f64> {
    let mut candidates = BTreeSet::new();
    for set in advisories.values() {
        for advisory in set.records() {
            if advisory.get("withdrawn_at").is_some_and(|value| !value.is_null()) {
                continue;
            }

            let own_score = advisory.get("cvss").and_then(|cvss| cvss.get("score")).and_then(Value::as_f64);
            if own_score.is_some_and(|score| score > 0.0) {
                continue;
            }

            if let Some(cve_id) = advisory.get("cve_id").and_then(Value::as_str) {
                let _ = candidates.insert(cve_id.to_owned());
            }
        }
    }

    if candidates.is_empty() {
        return BTreeMap::new();
    }

    log::info!(target: LOG_TARGET, "Looking up {} CVE scores from NVD", candidates.len());

    let mut scores = BTreeMap::new();
    for cve_id in candidates {
        if let Some(score) = external::nvd_base_score(http, NVD_WEB_BASE, &cve_id).await {
            let _ = scores.insert(cve_id, score);
        }
    }
    scores
}

fn as_values<T: Into<Value>>(values: MetricMap<T>) -> impl Iterator<Item = (u64, Value)> {
    values.into_iter().map(|(repo, value)| (repo, value.into()))
}

fn records_as_values(values: MetricMap<Record>) -> impl Iterator<Item = (u64, Value)> {
    values.into_iter().map(|(repo, record)| (repo, Value::Object(record.into_iter().collect())))
}

fn merge_metric(scores: &mut BTreeMap<u64, Record>, name: &str, values: impl IntoIterator<Item = (u64, Value)>) {
    for (repo, value) in values {
        let _ = scores.entry(repo).or_default().insert(name.to_owned(), value);
    }
}

/// Render one metric value as a CSV cell; nested structures stay JSON text.
fn csv_cell(value: &Value) -> String {
    match value {
        Value::Null => String::new(),
        Value::String(text) => text.clone(),
        other => other.to_string(),
    }
}

fn write_csv(path: &Utf8Path, scores: &BTreeMap<u64, Record>) -> Result<()> {
    let mut writer = csv::Writer::from_path(path).into_app_err_with(|| format!("unable to create score table '{path}'"))?;

    let mut header = vec!["repository_id"];
    header.extend_from_slice(METRIC_COLUMNS);
    writer.write_record(&header).into_app_err("writing score table header")?;

    for (repo, record) in scores {
        let mut row = vec![repo.to_string()];
        for name in METRIC_COLUMNS {
            row.push(record.get(*name).map_or_else(String::new, csv_cell));
        }
        writer.write_record(&row).into_app_err_with(|| format!("writing score row for repository {repo}"))?;
    }

    writer.flush().into_app_err("flushing score table")?;
    Ok(())
}
