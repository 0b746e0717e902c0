//! Risk metrics: license standing, criticality in the wider ecosystem, and
//! exposure through published security advisories.

use serde_json::Value;
use std::collections::{BTreeMap, BTreeSet};

use chrono::{DateTime, Utc};

use super::{MetricMap, field_stamp, mean, nested_stamp, nested_str, number_or_null, percentage, records_of, truthy, weekly_average, whole_months_between};
use crate::external::LicenseCatalog;
use crate::mining::payload::Record;
use crate::mining::{ResourceMap, SubResourceMap};

/// Whether each repository carries a license the SPDX catalog marks as OSI
/// approved. Repositories without a license, or with an identifier the
/// catalog does not know, come out `false`.
#[must_use]
pub fn osi_approved_license(repos: &ResourceMap, catalog: &LicenseCatalog) -> MetricMap<bool> {
    let mut results = MetricMap::new();
    for (&repo, set) in repos {
        let approved = set
            .records()
            .first()
            .and_then(|record| nested_str(record, &["license", "spdx_id"]))
            .and_then(|spdx_id| catalog.is_osi_approved(spdx_id))
            .unwrap_or(false);
        let _ = results.insert(repo, approved);
    }
    results
}

/// Raw inputs to the criticality formula, one value per signal.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct CriticalitySignals {
    pub created_since_months: f64,
    pub updated_since_months: f64,
    pub contributor_count: f64,
    pub org_count: f64,
    pub commit_frequency: f64,
    pub recent_releases_count: f64,
    pub closed_issues_count: f64,
    pub updated_issues_count: f64,
    pub comment_frequency: f64,
    pub dependents_count: f64,
}

impl CriticalitySignals {
    /// Signal values paired with their weight and threshold.
    ///
    /// Weights and thresholds are the published constants of the OpenSSF
    /// criticality score; `updated_since_months` carries a negative weight
    /// since going unmaintained lowers criticality.
    fn rows(&self) -> [(f64, f64, f64); 10] {
        [
            (self.created_since_months, 1.0, 120.0),
            (self.updated_since_months, -1.0, 120.0),
            (self.contributor_count, 2.0, 5000.0),
            (self.org_count, 1.0, 10.0),
            (self.commit_frequency, 1.0, 1000.0),
            (self.recent_releases_count, 0.5, 26.0),
            (self.closed_issues_count, 0.5, 5000.0),
            (self.updated_issues_count, 0.5, 5000.0),
            (self.comment_frequency, 1.0, 15.0),
            (self.dependents_count, 2.0, 500_000.0),
        ]
    }
}

/// The data sets the criticality signals are read from.
#[derive(Debug, Clone, Copy)]
pub struct SignalInputs<'a> {
    pub repos: &'a ResourceMap,
    pub contributors: &'a ResourceMap,
    pub org_memberships: &'a SubResourceMap,
    pub commits: &'a ResourceMap,
    pub releases: &'a ResourceMap,
    pub issues: &'a ResourceMap,
    pub comments: &'a SubResourceMap,
    pub dependents: &'a ResourceMap,
}

fn approx_count(count: usize) -> f64 {
    u32::try_from(count).map_or(f64::from(u32::MAX), f64::from)
}

fn months_since(record: &Record, field: &str, today: DateTime<Utc>) -> f64 {
    let months = field_stamp(record, field).map_or(0, |stamp| whole_months_between(stamp, today));
    i32::try_from(months).map_or(0.0, f64::from).max(0.0)
}

/// Collects the per-repository criticality signals from the mined data.
///
/// Issue signals look 90 days back from `today`; commit frequency is the
/// average number of commits per week over the span of the commit window.
#[must_use]
pub fn criticality_signals(inputs: SignalInputs<'_>, today: DateTime<Utc>) -> MetricMap<CriticalitySignals> {
    let quarter_ago = today - chrono::Duration::days(90);
    let mut results = MetricMap::new();

    for (&repo, set) in inputs.repos {
        let Some(record) = set.records().first() else {
            continue;
        };

        let contributor_count = records_of(inputs.contributors, repo)
            .iter()
            .filter(|contributor| truthy(contributor.get("contributions")))
            .count();

        let orgs: BTreeSet<&str> = inputs
            .org_memberships
            .get(&repo)
            .into_iter()
            .flat_map(BTreeMap::values)
            .flat_map(|memberships| memberships.records())
            .filter_map(|org| org.get("login").and_then(Value::as_str))
            .collect();

        let commit_dates: Vec<_> = records_of(inputs.commits, repo)
            .iter()
            .filter_map(|commit| nested_stamp(commit, &["commit", "author", "date"]))
            .map(|stamp| stamp.date_naive())
            .collect();
        let commit_frequency = if commit_dates.len() > 1 {
            weekly_average(&commit_dates).unwrap_or(0.0)
        } else {
            0.0
        };

        let issues = records_of(inputs.issues, repo);
        let closed_recently = issues
            .iter()
            .filter(|issue| field_stamp(issue, "closed_at").is_some_and(|stamp| stamp >= quarter_ago))
            .count();
        let updated_recently = issues
            .iter()
            .filter(|issue| field_stamp(issue, "updated_at").is_some_and(|stamp| stamp >= quarter_ago))
            .count();

        let comment_counts: Vec<f64> = inputs
            .comments
            .get(&repo)
            .map(|threads| {
                threads
                    .values()
                    .map(|thread| approx_count(thread.records().iter().filter(|comment| truthy(comment.get("id"))).count()))
                    .collect()
            })
            .unwrap_or_default();

        let dependents_count = records_of(inputs.dependents, repo)
            .first()
            .and_then(|dependents| dependents.get("total_dependents"))
            .and_then(Value::as_f64)
            .unwrap_or(0.0);

        let signals = CriticalitySignals {
            created_since_months: months_since(record, "created_at", today),
            updated_since_months: months_since(record, "updated_at", today),
            contributor_count: approx_count(contributor_count),
            org_count: approx_count(orgs.len()),
            commit_frequency,
            recent_releases_count: approx_count(records_of(inputs.releases, repo).len()),
            closed_issues_count: approx_count(closed_recently),
            updated_issues_count: approx_count(updated_recently),
            comment_frequency: mean(&comment_counts).unwrap_or(0.0),
            dependents_count,
        };
        let _ = results.insert(repo, signals);
    }
    results
}

/// Folds each repository's signals into one criticality score in 0..=100.
///
/// Every signal contributes `weight * ln(1 + value) / ln(1 + max(value,
/// threshold))`; the weighted sum is normalized by the sum of weights and
/// scaled to a percentage.
#[must_use]
pub fn criticality_weights(signals: &MetricMap<CriticalitySignals>) -> MetricMap<f64> {
    let mut results = MetricMap::new();
    for (&repo, signal) in signals {
        let mut acc = 0.0;
        let mut weight_sum = 0.0;
        for (value, weight, threshold) in signal.rows() {
            let denominator = (1.0 + value.max(threshold)).ln();
            let fraction = if denominator > 0.0 { (1.0 + value).ln() / denominator } else { 1.0 };
            acc += weight * fraction;
            weight_sum += weight;
        }
        let _ = results.insert(repo, (acc / weight_sum * 100.0).round());
    }
    results
}

/// Advisory exposure per repository: counts, severity mix, patch coverage,
/// and the average CVSS base score over non-withdrawn advisories.
///
/// Advisories missing a CVSS score fall back to `nvd_scores`, keyed by CVE
/// id.
#[must_use]
pub fn advisory_exposure(advisories: &ResourceMap, nvd_scores: &BTreeMap<String, f64>) -> MetricMap<Record> {
    let mut results = MetricMap::new();
    for (&repo, set) in advisories {
        let mut counted = 0_usize;
        let mut closed = 0_usize;
        let mut severe = 0_usize;
        let mut patched = 0_usize;
        let mut unpatched = 0_usize;
        let mut cvss_scores = Vec::new();

        for advisory in set.records() {
            if truthy(advisory.get("withdrawn_at")) {
                continue;
            }
            counted += 1;

            if advisory.get("state").and_then(Value::as_str) == Some("closed") {
                closed += 1;
            }
            if matches!(advisory.get("severity").and_then(Value::as_str), Some("high" | "critical")) {
                severe += 1;
            }

            let own_score = advisory.get("cvss").and_then(|cvss| cvss.get("score")).and_then(Value::as_f64).filter(|&score| score > 0.0);
            let score = own_score.or_else(|| {
                advisory
                    .get("cve_id")
                    .and_then(Value::as_str)
                    .and_then(|cve_id| nvd_scores.get(cve_id).copied())
            });
            if let Some(score) = score {
                cvss_scores.push(score);
            }

            if let Some(vulnerabilities) = advisory.get("vulnerabilities").and_then(Value::as_array) {
                for vulnerability in vulnerabilities {
                    if truthy(vulnerability.get("patched_versions")) {
                        patched += 1;
                    } else {
                        unpatched += 1;
                    }
                }
            }
        }

        let mut out = Record::new();
        let _ = out.insert("advisories_available".to_owned(), Value::from(counted > 0));
        let _ = out.insert("total_advisories".to_owned(), Value::from(counted));
        let _ = out.insert("closed_advisories".to_owned(), Value::from(closed));
        let _ = out.insert("average_cvss_score".to_owned(), number_or_null(mean(&cvss_scores)));
        let _ = out.insert("ratio_severity_high_crit".to_owned(), number_or_null(percentage(severe, counted)));
        let _ = out.insert("patch_ratio".to_owned(), number_or_null(percentage(patched, patched + unpatched)));
        let _ = results.insert(repo, out);
    }
    results
}
