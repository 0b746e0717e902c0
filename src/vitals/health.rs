//! Banded health scores: project maturity, profile completeness, and
//! community size.

use chrono::{DateTime, Utc};
use serde_json::Value;

use super::{MetricMap, field_stamp, number_or_null, percentage, truthy, whole_months_between};
use crate::mining::ResourceMap;
use crate::mining::payload::{Record, RecordSet};

/// Age, issue-load, and release-count bands folded into one 0..=100 score.
///
/// Each signal maps onto a 1..=5 band; the three bands average into the
/// final score. Repositories without a parseable creation date are skipped.
#[must_use]
pub fn maturity(repos: &ResourceMap, issues: &ResourceMap, releases: &ResourceMap, today: DateTime<Utc>) -> MetricMap<f64> {
    let mut results = MetricMap::new();
    for (&repo, set) in repos {
        let Some(record) = set.records().first() else {
            continue;
        };
        let Some(created_at) = field_stamp(record, "created_at") else {
            continue;
        };

        let age_band = match whole_months_between(created_at, today) {
            i64::MIN..=1 => 1.0,
            2..=12 => 2.0,
            13..=24 => 3.0,
            25..=36 => 4.0,
            _ => 5.0,
        };

        let issue_band = match issues.get(&repo).map_or(0, RecordSet::record_count) {
            0..=50 => 5.0,
            51..=100 => 4.0,
            101..=500 => 3.0,
            501..=1000 => 2.0,
            _ => 1.0,
        };

        let release_band = match releases.get(&repo).map_or(0, RecordSet::record_count) {
            0 => 1.0,
            1..=3 => 3.0,
            _ => 5.0,
        };

        let score = (age_band + issue_band + release_band) / 15.0 * 100.0;
        let _ = results.insert(repo, score);
    }
    results
}

/// Community profile completeness.
///
/// Keeps the provider's own `health_percentage` and adds a completeness
/// score over eight profile signals, plus the individual flags.
#[must_use]
pub fn community_health(profiles: &ResourceMap) -> MetricMap<Record> {
    let mut results = MetricMap::new();
    for (&repo, set) in profiles {
        let Some(record) = set.records().first() else {
            continue;
        };

        let files = record.get("files");
        let file_flag = |name: &str| truthy(files.and_then(|f| f.get(name)));
        let flags = [
            ("description", truthy(record.get("description"))),
            ("documentation", truthy(record.get("documentation"))),
            ("code_of_conduct", file_flag("code_of_conduct")),
            ("contributing", file_flag("contributing")),
            ("issue_template", file_flag("issue_template")),
            ("pull_request_template", file_flag("pull_request_template")),
            ("license", file_flag("license")),
            ("readme", file_flag("readme")),
        ];
        let true_count = flags.iter().filter(|(_, present)| *present).count();

        let mut out = Record::new();
        let _ = out.insert(
            "community_health_score".to_owned(),
            record.get("health_percentage").cloned().unwrap_or(Value::Null),
        );
        let _ = out.insert("custom_health_score".to_owned(), number_or_null(percentage(true_count, flags.len())));
        let _ = out.insert("true_count".to_owned(), Value::from(true_count));
        let _ = out.insert("false_count".to_owned(), Value::from(flags.len() - true_count));
        for (name, present) in flags {
            let _ = out.insert(name.to_owned(), Value::Bool(present));
        }

        let _ = results.insert(repo, out);
    }
    results
}

/// Subscribers plus contributors, banded into a 0..=100 score.
#[must_use]
pub fn size_of_community(repos: &ResourceMap, contributors: &ResourceMap) -> MetricMap<u64> {
    let mut results = MetricMap::new();
    for (&repo, set) in repos {
        let Some(record) = set.records().first() else {
            continue;
        };

        let subscribers = record
            .get("subscribers_count")
            .and_then(Value::as_u64)
            .and_then(|v| usize::try_from(v).ok())
            .unwrap_or(0);
        let community = subscribers + contributors.get(&repo).map_or(0, RecordSet::record_count);

        let band: u64 = match community {
            0..=49 => 1,
            50..=100 => 2,
            101..=200 => 3,
            201..=300 => 4,
            _ => 5,
        };
        let _ = results.insert(repo, band * 20);
    }
    results
}
