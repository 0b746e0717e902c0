//! Contributor-concentration metrics: who does the work, which
//! organizations they sit in, and what forks do with the code.

use regex::Regex;
use serde_json::Value;
use std::collections::BTreeMap;
use std::sync::LazyLock;

use chrono::{DateTime, Utc};

use super::{MetricMap, field_stamp, nested_str, number_or_null, percentage, weekly_average};
use crate::mining::payload::Record;
use crate::mining::{ResourceMap, SubResourceMap};

static CO_AUTHOR_REGEX: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"Co-authored-by:(.*?)>").expect("invalid regex"));

/// Smallest number of heavy hitters whose combined tallies reach half of
/// the total.
fn count_to_half(mut tallies: Vec<u64>) -> u64 {
    tallies.sort_unstable_by(|a, b| b.cmp(a));
    let total: u64 = tallies.iter().sum();
    let mut covered = 0_u64;
    let mut count = 0_u64;
    for tally in tallies {
        if covered * 2 <= total {
            covered += tally;
            count += 1;
        } else {
            break;
        }
    }
    count
}

fn commit_identity(commit: &Record) -> Option<&str> {
    let author = nested_str(commit, &["commit", "author", "email"]);
    let committer = nested_str(commit, &["commit", "committer", "email"]);
    match (author, committer) {
        (Some(author), Some(committer)) if author != committer => Some(author),
        (_, Some(committer)) => Some(committer),
        (Some(author), None) => Some(author),
        (None, None) => None,
    }
}

/// Bus factor per repository: how many people account for half of the
/// commits in the window.
///
/// A commit is attributed to its author email when author and committer
/// differ, otherwise to the committer email. `Co-authored-by` trailers in
/// the commit message count as additional full commits for the named
/// addresses. Commits without any email are left out.
#[must_use]
pub fn bus_factor(commits: &ResourceMap) -> MetricMap<Record> {
    let mut results = MetricMap::new();
    for (&repo, set) in commits {
        let mut tallies: BTreeMap<String, u64> = BTreeMap::new();
        let mut counted = 0_usize;
        for commit in set.records() {
            let Some(identity) = commit_identity(commit) else {
                continue;
            };
            counted += 1;
            *tallies.entry(identity.to_owned()).or_default() += 1;

            if let Some(message) = nested_str(commit, &["commit", "message"]) {
                for capture in CO_AUTHOR_REGEX.captures_iter(message) {
                    if let Some(trailer) = capture.get(1)
                        && let Some(address) = trailer.as_str().rsplit('<').next()
                        && !address.trim().is_empty()
                    {
                        *tallies.entry(address.trim().to_owned()).or_default() += 1;
                    }
                }
            }
        }

        let total_contributors = tallies.len();
        let mut out = Record::new();
        let _ = out.insert("bus_factor_score".to_owned(), Value::from(count_to_half(tallies.into_values().collect())));
        let _ = out.insert("total_contributors".to_owned(), Value::from(total_contributors));
        let _ = out.insert("commits_counted".to_owned(), Value::from(counted));
        let _ = results.insert(repo, out);
    }
    results
}

/// Elephant factor per repository: how many organizations account for half
/// of the contributions attributable to any organization.
///
/// Each contributor's contribution count is credited to every organization
/// they belong to; contributors without an organization do not take part.
#[must_use]
pub fn elephant_factor(contributors: &ResourceMap, org_memberships: &SubResourceMap) -> MetricMap<u64> {
    let mut results = MetricMap::new();
    for (&repo, set) in contributors {
        let mut weights: BTreeMap<&str, u64> = BTreeMap::new();
        for contributor in set.records() {
            if let Some(login) = contributor.get("login").and_then(Value::as_str)
                && let Some(contributions) = contributor.get("contributions").and_then(Value::as_u64)
            {
                let _ = weights.insert(login, contributions);
            }
        }

        let mut org_tallies: BTreeMap<String, u64> = BTreeMap::new();
        if let Some(memberships) = org_memberships.get(&repo) {
            for (login, orgs) in memberships {
                let Some(&weight) = weights.get(login.as_str()) else {
                    continue;
                };
                for org in orgs.records() {
                    if let Some(org_login) = org.get("login").and_then(Value::as_str) {
                        *org_tallies.entry(org_login.to_owned()).or_default() += weight;
                    }
                }
            }
        }

        let _ = results.insert(repo, count_to_half(org_tallies.into_values().collect()));
    }
    results
}

/// Fork activity per repository: the share of forks pushed to since
/// `active_since` and the average weekly fork creation rate.
#[must_use]
pub fn technical_fork(forks: &ResourceMap, active_since: DateTime<Utc>) -> MetricMap<Record> {
    let mut results = MetricMap::new();
    for (&repo, set) in forks {
        let records = set.records();
        let total = records.len();
        let active = records
            .iter()
            .filter(|fork| field_stamp(fork, "pushed_at").is_some_and(|pushed| pushed >= active_since))
            .count();
        let created: Vec<_> = records
            .iter()
            .filter_map(|fork| field_stamp(fork, "created_at"))
            .map(|stamp| stamp.date_naive())
            .collect();

        let mut out = Record::new();
        let _ = out.insert("total_forks".to_owned(), Value::from(total));
        let _ = out.insert("active_forks".to_owned(), Value::from(active));
        let _ = out.insert("active_ratio".to_owned(), number_or_null(percentage(active, total)));
        let _ = out.insert(
            "average_forks_created_per_week".to_owned(),
            number_or_null(weekly_average(&created).map(f64::round)),
        );
        let _ = results.insert(repo, out);
    }
    results
}

/// Deleted lines as a percentage of added lines across the detailed
/// commits of each repository, `None` when nothing was added.
#[must_use]
pub fn churn(commit_details: &SubResourceMap) -> MetricMap<Option<f64>> {
    let mut results = MetricMap::new();
    for (&repo, details) in commit_details {
        let mut added = 0.0;
        let mut deleted = 0.0;
        for detail in details.values() {
            for commit in detail.records() {
                let Some(stats) = commit.get("stats") else {
                    continue;
                };
                added += stats.get("additions").and_then(Value::as_f64).unwrap_or(0.0);
                deleted += stats.get("deletions").and_then(Value::as_f64).unwrap_or(0.0);
            }
        }
        let _ = results.insert(repo, (added > 0.0).then(|| deleted / added * 100.0));
    }
    results
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;
    use crate::mining::payload::RecordSet;

    fn set_of(value: serde_json::Value) -> RecordSet {
        RecordSet::classify(value, "test")
    }

    fn commit(author: Option<&str>, committer: Option<&str>, message: &str) -> serde_json::Value {
        json!({
            "sha": "abc",
            "commit": {
                "author": {"email": author},
                "committer": {"email": committer},
                "message": message,
            }
        })
    }

    #[test]
    fn bus_factor_attributes_commits_and_counts_half_coverage() {
        let commits = ResourceMap::from([(
            1,
            set_of(json!([
                commit(Some("a@example.com"), Some("a@example.com"), "one"),
                commit(Some("a@example.com"), Some("noreply@github.com"), "two"),
                commit(Some("b@example.com"), Some("b@example.com"), "three"),
                commit(Some("c@example.com"), Some("c@example.com"), "four"),
            ])),
        )]);

        let scores = bus_factor(&commits);
        let record = &scores[&1];

        assert_eq!(record["bus_factor_score"], 2);
        assert_eq!(record["total_contributors"], 3);
        assert_eq!(record["commits_counted"], 4);
    }

    #[test]
    fn bus_factor_credits_co_authors_and_skips_anonymous_commits() {
        let commits = ResourceMap::from([(
            1,
            set_of(json!([
                commit(Some("lead@example.com"), Some("lead@example.com"), "pairing\n\nCo-authored-by: Pal <pal@example.com>"),
                commit(None, None, "imported"),
            ])),
        )]);

        let scores = bus_factor(&commits);
        let record = &scores[&1];

        assert_eq!(record["total_contributors"], 2);
        assert_eq!(record["commits_counted"], 1);
    }

    #[test]
    fn elephant_factor_rolls_contributions_up_to_organizations() {
        let contributors = ResourceMap::from([(
            1,
            set_of(json!([
                {"login": "alice", "contributions": 100},
                {"login": "bob", "contributions": 50},
                {"login": "carol", "contributions": 10},
                {"login": "drifter", "contributions": 9000},
            ])),
        )]);
        let memberships = SubResourceMap::from([(
            1,
            std::collections::BTreeMap::from([
                ("alice".to_owned(), set_of(json!([{"login": "acme"}]))),
                ("bob".to_owned(), set_of(json!([{"login": "acme"}]))),
                ("carol".to_owned(), set_of(json!([{"login": "other"}]))),
            ]),
        )]);

        let scores = elephant_factor(&contributors, &memberships);

        // acme covers 150 of 160 organization-attributed contributions.
        assert_eq!(scores[&1], 1);
    }

    #[test]
    fn technical_fork_separates_active_forks() {
        let active_since = "2024-01-01T00:00:00Z".parse::<DateTime<Utc>>().unwrap();
        let forks = ResourceMap::from([(
            1,
            set_of(json!([
                {"id": 10, "created_at": "2023-06-01T00:00:00Z", "pushed_at": "2024-03-01T00:00:00Z"},
                {"id": 11, "created_at": "2023-06-08T00:00:00Z", "pushed_at": "2023-07-01T00:00:00Z"},
                {"id": 12, "created_at": "2023-06-08T00:00:00Z", "pushed_at": null},
            ])),
        )]);

        let scores = technical_fork(&forks, active_since);
        let record = &scores[&1];

        assert_eq!(record["total_forks"], 3);
        assert_eq!(record["active_forks"], 1);
        let ratio = record["active_ratio"].as_f64().unwrap();
        assert!((ratio - 100.0 / 3.0).abs() < 0.001);
        assert_eq!(record["average_forks_created_per_week"], 2.0);
    }

    #[test]
    fn churn_relates_deletions_to_additions() {
        let details = SubResourceMap::from([
            (
                1,
                std::collections::BTreeMap::from([
                    ("abc".to_owned(), set_of(json!({"sha": "abc", "stats": {"additions": 100, "deletions": 40}}))),
                    ("def".to_owned(), set_of(json!({"sha": "def", "stats": {"additions": 100, "deletions": 10}}))),
                ]),
            ),
            (2, std::collections::BTreeMap::from([("ghi".to_owned(), set_of(json!({"sha": "ghi", "stats": {"additions": 0, "deletions": 0}})))])),
        ]);

        let scores = churn(&details);

        assert!((scores[&1].unwrap() - 25.0).abs() < f64::EPSILON);
        assert_eq!(scores[&2], None);
    }
}
