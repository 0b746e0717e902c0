//! Responsiveness metrics: issue velocity, support behavior, and branch
//! lifecycle.
//!
//! The issue tracker mixes issues and pull requests; records carrying a
//! `pull_request` reference are pull requests and are split out where the
//! distinction matters.

use serde_json::Value;
use std::collections::{BTreeMap, BTreeSet};

use super::{MetricMap, days_between, field_stamp, mean, number_or_null, percentage, records_of, truthy};
use crate::mining::payload::Record;
use crate::mining::{ResourceMap, SubResourceMap};

/// Issue and pull-request flow for each repository: state counts, the
/// pull/issue split, and the mean days from creation to close.
#[must_use]
pub fn project_velocity(issues: &ResourceMap) -> MetricMap<Record> {
    let mut results = MetricMap::new();
    for (&repo, set) in issues {
        let records = set.records();
        let total = records.len();
        let mut open = 0_usize;
        let mut closed = 0_usize;
        let mut pulls = 0_usize;
        let mut resolve_days = Vec::new();

        for issue in records {
            if truthy(issue.get("pull_request")) {
                pulls += 1;
            }
            match issue.get("state").and_then(Value::as_str) {
                Some("open") => open += 1,
                Some("closed") => {
                    closed += 1;
                    if let Some(created) = field_stamp(issue, "created_at")
                        && let Some(closed_at) = field_stamp(issue, "closed_at")
                        && let Some(days) = days_between(created, closed_at)
                    {
                        resolve_days.push(days);
                    }
                }
                _ => {}
            }
        }

        let mut out = Record::new();
        let _ = out.insert("total_issues".to_owned(), Value::from(total));
        let _ = out.insert("open_issues".to_owned(), Value::from(open));
        let _ = out.insert("closed_issues".to_owned(), Value::from(closed));
        let _ = out.insert("pull_count".to_owned(), Value::from(pulls));
        let _ = out.insert("no_pull_count".to_owned(), Value::from(total - pulls));
        let _ = out.insert("ratio_pull_issue".to_owned(), number_or_null(percentage(pulls, total)));
        let _ = out.insert(
            "avg_issue_resolving_days".to_owned(),
            number_or_null(mean(&resolve_days).map(f64::round)),
        );
        let _ = out.insert("ratio_open_total".to_owned(), number_or_null(percentage(open, total)));
        let _ = out.insert("ratio_closed_total".to_owned(), number_or_null(percentage(closed, total)));
        let _ = results.insert(repo, out);
    }
    results
}

/// Share of issues and pull requests that received at least one user
/// comment, averaged over the two populations.
///
/// Comment threads are keyed by issue number; a thread belongs to the pull
/// population when the issue record of the same number carries a
/// `pull_request` reference. Comments without an id are automated and do
/// not count as a response.
#[must_use]
pub fn support_rate(issues: &ResourceMap, comments: &SubResourceMap) -> MetricMap<f64> {
    let mut results = MetricMap::new();
    for (&repo, threads) in comments {
        let mut pull_numbers: BTreeMap<String, bool> = BTreeMap::new();
        for issue in records_of(issues, repo) {
            if let Some(number) = issue.get("number").and_then(Value::as_u64) {
                let _ = pull_numbers.insert(number.to_string(), truthy(issue.get("pull_request")));
            }
        }

        let mut issues_total = 0_usize;
        let mut issues_responded = 0_usize;
        let mut pulls_total = 0_usize;
        let mut pulls_responded = 0_usize;
        for (number, thread) in threads {
            let responded = thread.records().iter().any(|comment| truthy(comment.get("id")));
            if pull_numbers.get(number).copied().unwrap_or(false) {
                pulls_total += 1;
                pulls_responded += usize::from(responded);
            } else {
                issues_total += 1;
                issues_responded += usize::from(responded);
            }
        }

        let issue_share = percentage(issues_responded, issues_total).map_or(0.0, |p| p / 100.0);
        let pull_share = percentage(pulls_responded, pulls_total).map_or(0.0, |p| p / 100.0);
        let _ = results.insert(repo, (issue_share + pull_share) / 2.0 * 100.0);
    }
    results
}

/// Distinct committing accounts over the commit window, banded 1..=5 and
/// scaled to 0..=100.
#[must_use]
pub fn support_contributors(commits: &ResourceMap) -> MetricMap<u64> {
    let mut results = MetricMap::new();
    for (&repo, set) in commits {
        let committers: BTreeSet<u64> = set
            .records()
            .iter()
            .filter_map(|commit| commit.get("committer").and_then(|c| c.get("id")).and_then(Value::as_u64))
            .collect();

        let band: u64 = match committers.len() {
            0..=4 => 1,
            5..=10 => 2,
            11..=20 => 3,
            21..=50 => 4,
            _ => 5,
        };
        let _ = results.insert(repo, band * 20);
    }
    results
}

fn state_map(records: &[Record]) -> BTreeMap<String, String> {
    let mut states = BTreeMap::new();
    for record in records {
        if let Some(name) = record.get("name").and_then(Value::as_str) {
            let state = record.get("state").and_then(Value::as_str).unwrap_or_default();
            let _ = states.insert(name.to_owned(), state.to_owned());
        }
    }
    states
}

/// Stale/active partition of the branch set, with per-state ratios.
///
/// Branch states come from the scraped branch pages: a pull-request state
/// label ("Merged", "Open", ...), "Compare" for branches with no pull
/// request, or empty. A branch on both pages keeps the active page's state.
#[must_use]
pub fn branch_lifecycle(stale: &ResourceMap, active: &ResourceMap) -> MetricMap<Record> {
    let mut results = MetricMap::new();
    let repos: BTreeSet<u64> = stale.keys().chain(active.keys()).copied().collect();

    for repo in repos {
        let stale_states = state_map(records_of(stale, repo));
        let active_states = state_map(records_of(active, repo));
        let stale_total = stale_states.len();
        let active_total = active_states.len();

        let mut all = stale_states;
        all.extend(active_states);
        let total = all.len();

        let mut state_counts: BTreeMap<&str, usize> = BTreeMap::new();
        for state in all.values() {
            *state_counts.entry(state).or_default() += 1;
        }
        let count = |state: &str| state_counts.get(state).copied().unwrap_or(0);
        let unresolved = count("Open") + count("Compare");
        let resolved = count("Closed") + count("Merged");

        let mut out = Record::new();
        let _ = out.insert("total_branches".to_owned(), Value::from(total));
        let _ = out.insert("stale_ratio".to_owned(), number_or_null(percentage(stale_total, total)));
        let _ = out.insert("active_ratio".to_owned(), number_or_null(percentage(active_total, total)));
        let _ = out.insert("unresolved_ratio".to_owned(), number_or_null(percentage(unresolved, total)));
        let _ = out.insert("resolved_ratio".to_owned(), number_or_null(percentage(resolved, total)));
        let _ = out.insert(
            "state_counts".to_owned(),
            Value::Object(state_counts.into_iter().map(|(k, v)| (k.to_owned(), Value::from(v))).collect()),
        );
        let _ = results.insert(repo, out);
    }
    results
}
