//! Health vitals computed from snapshot data.
//!
//! Every function here is pure: it consumes the maps the fetch phase wrote
//! and returns per-repository values, with no network or filesystem access.
//! Formulas follow the open-source health literature the original survey
//! drew on; repositories missing an input resource are simply absent from
//! that metric's output rather than defaulted.
//!
//! Timestamps are the provider's RFC 3339 strings. A record with a missing
//! or unparseable stamp is skipped by the individual metric, never treated
//! as an error.

pub mod activity;
pub mod contributions;
pub mod health;
pub mod risk;

pub use activity::{branch_lifecycle, project_velocity, support_contributors, support_rate};
pub use contributions::{bus_factor, churn, elephant_factor, technical_fork};
pub use health::{community_health, maturity, size_of_community};
pub use risk::{CriticalitySignals, SignalInputs, advisory_exposure, criticality_signals, criticality_weights, osi_approved_license};

use chrono::{DateTime, Datelike, NaiveDate, Utc};
use serde_json::Value;

use crate::mining::payload::Record;

/// Per-repository metric values.
pub type MetricMap<T> = std::collections::BTreeMap<u64, T>;

fn stamp(text: &str) -> Option<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(text).ok().map(|t| t.with_timezone(&Utc))
}

/// A record field holding one of the provider's UTC timestamps.
fn field_stamp(record: &Record, field: &str) -> Option<DateTime<Utc>> {
    stamp(record.get(field)?.as_str()?)
}

/// A string buried under a path of nested objects.
fn nested_str<'a>(record: &'a Record, path: &[&str]) -> Option<&'a str> {
    let (first, rest) = path.split_first()?;
    let mut value = record.get(*first)?;
    for key in rest {
        value = value.get(*key)?;
    }
    value.as_str()
}

fn nested_stamp(record: &Record, path: &[&str]) -> Option<DateTime<Utc>> {
    stamp(nested_str(record, path)?)
}

/// Day span between two stamps, as a float for averaging.
fn days_between(from: DateTime<Utc>, to: DateTime<Utc>) -> Option<f64> {
    i32::try_from((to - from).num_days()).ok().map(f64::from)
}

/// Whether a field reads as present: missing, null, empty, and zero values
/// all count as absent, the way the provider's optional fields behave.
fn truthy(value: Option<&Value>) -> bool {
    match value {
        None | Some(Value::Null) => false,
        Some(Value::Bool(b)) => *b,
        Some(Value::String(s)) => !s.is_empty(),
        Some(Value::Array(list)) => !list.is_empty(),
        Some(Value::Object(map)) => !map.is_empty(),
        Some(Value::Number(n)) => n.as_f64() != Some(0.0),
    }
}

/// All records for one repository, or none when the map has no entry.
fn records_of(map: &crate::mining::ResourceMap, repo: u64) -> &[Record] {
    map.get(&repo).map_or(&[], crate::mining::payload::RecordSet::records)
}

/// Whole calendar months from `from` to `to`, partial months dropped.
fn whole_months_between(from: DateTime<Utc>, to: DateTime<Utc>) -> i64 {
    let mut months = (i64::from(to.year()) - i64::from(from.year())) * 12 + i64::from(to.month()) - i64::from(from.month());
    if to.day() < from.day() {
        months -= 1;
    }
    months
}

fn mean(values: &[f64]) -> Option<f64> {
    let count = u32::try_from(values.len()).ok()?;
    if count == 0 {
        return None;
    }
    Some(values.iter().sum::<f64>() / f64::from(count))
}

/// `part` of `total` as a percentage; `None` for an empty total.
fn percentage(part: usize, total: usize) -> Option<f64> {
    if total == 0 {
        return None;
    }
    let part = u32::try_from(part).ok()?;
    let total = u32::try_from(total).ok()?;
    Some(f64::from(part) / f64::from(total) * 100.0)
}

/// Mean events per calendar week across the span of `dates`.
fn weekly_average(dates: &[NaiveDate]) -> Option<f64> {
    let first = *dates.iter().min()?;
    let last = *dates.iter().max()?;

    let weeks = usize::try_from((last - first).num_days() / 7 + 1).ok()?;
    let mut per_week = vec![0.0_f64; weeks];
    for &date in dates {
        if let Some(slot) = usize::try_from((date - first).num_days() / 7)
            .ok()
            .and_then(|index| per_week.get_mut(index))
        {
            *slot += 1.0;
        }
    }

    mean(&per_week)
}

/// Json number for an optional float, `Null` when the value is undefined.
fn number_or_null(value: Option<f64>) -> Value {
    value.and_then(|v| serde_json::Number::from_f64(v).map(Value::Number)).unwrap_or(Value::Null)
}
