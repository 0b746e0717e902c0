//! Guarded pagination over `Link`-header cursors.
//!
//! [`Paginator::collect`] walks `rel="next"` links from a first page and
//! reports its outcome in the retry protocol's terms: a terminal page status
//! ends the walk with partial results, a transient failure asks the caller
//! to restart from page one.

use core::time::Duration;
use std::sync::Arc;

use chrono::{DateTime, Utc};

use crate::Result;
use crate::mining::client::{ApiClient, PageOutcome};
use crate::mining::guard::RateGuard;
use crate::mining::payload::{Record, RecordSet};
use crate::mining::retry::Attempt;

const LOG_TARGET: &str = "     pages";

/// Timestamp window applied to fetched items.
///
/// `stop_when_page_older` additionally ends pagination once a page's last
/// item falls outside the window; only valid for endpoints ordered
/// descending by `field`.
#[derive(Debug, Clone)]
pub struct AgeCutoff {
    pub field: String,
    pub not_before: DateTime<Utc>,
    pub stop_when_page_older: bool,
}

impl AgeCutoff {
    #[must_use]
    pub fn new(field: &str, not_before: DateTime<Utc>) -> Self {
        Self {
            field: field.to_owned(),
            not_before,
            stop_when_page_older: false,
        }
    }

    #[must_use]
    pub fn with_early_exit(mut self) -> Self {
        self.stop_when_page_older = true;
        self
    }

    /// Whether a record falls inside the window. Records lacking the field
    /// or carrying an unparseable timestamp are retained.
    #[must_use]
    pub fn retains(&self, record: &Record) -> bool {
        let Some(serde_json::Value::String(raw)) = record.get(&self.field) else {
            return true;
        };
        match DateTime::parse_from_rfc3339(raw) {
            Ok(stamp) => stamp.with_timezone(&Utc) >= self.not_before,
            Err(_) => true,
        }
    }
}

/// Drives guarded page requests for one logical fetch.
pub struct Paginator<'a> {
    client: &'a ApiClient,
    guard: Arc<RateGuard>,
    pacing: Duration,
}

impl<'a> Paginator<'a> {
    #[must_use]
    pub fn new(client: &'a ApiClient, guard: Arc<RateGuard>, pacing: Duration) -> Self {
        Self { client, guard, pacing }
    }

    /// One request through the guard. Throttles pause the guard and repeat
    /// the identical request once the pause lifts; every other outcome is
    /// returned to the caller. Successful calls are followed by the fixed
    /// pacing delay.
    pub async fn get_guarded(&self, url: &str) -> Result<PageOutcome> {
        loop {
            let permit = self.guard.acquire().await;
            let outcome = self.client.get_page(url).await?;
            drop(permit);

            if let PageOutcome::Throttled { reset_at } = outcome {
                self.guard.pause_until_reset(reset_at);
                continue;
            }

            if matches!(outcome, PageOutcome::Success { .. }) && !self.pacing.is_zero() {
                tokio::time::sleep(self.pacing).await;
            }

            return Ok(outcome);
        }
    }

    /// Walk pages from `first_url` until the cursor runs out, a terminal
    /// status ends the walk, `limit` records have accumulated, or the cutoff
    /// says later pages are out of window.
    ///
    /// A single-object body on the first page is a complete result; on any
    /// later page it is a data-shape error ending the walk with what was
    /// gathered so far.
    pub async fn collect(&self, first_url: &str, limit: Option<usize>, cutoff: Option<&AgeCutoff>) -> Result<Attempt<RecordSet>> {
        let mut records: Vec<Record> = Vec::new();
        let mut url = first_url.to_owned();
        let mut first_page = true;

        loop {
            let outcome = self.get_guarded(&url).await?;

            let (body, links) = match outcome {
                PageOutcome::Success { body, links, .. } => (body, links),
                PageOutcome::Denied { status } => {
                    log::warn!(target: LOG_TARGET, "HTTP {status} at '{url}'; keeping {} records gathered so far", records.len());
                    if first_page {
                        return Ok(Attempt::Done(RecordSet::Empty));
                    }
                    return Ok(Attempt::Done(RecordSet::Collection(records)));
                }
                PageOutcome::Unavailable { reason } => return Ok(Attempt::Again(reason)),
                PageOutcome::Throttled { .. } => unreachable!("get_guarded resolves throttles"),
            };

            match RecordSet::classify(body, &url) {
                RecordSet::Singleton(record) => {
                    if first_page {
                        return Ok(Attempt::Done(RecordSet::Singleton(record)));
                    }
                    log::warn!(target: LOG_TARGET, "Expected a list page at '{url}', got a single object; ending pagination");
                    return Ok(Attempt::Done(RecordSet::Collection(records)));
                }
                RecordSet::Collection(page_records) => {
                    let page_exhausts_window = cutoff.is_some_and(|c| {
                        c.stop_when_page_older && page_records.last().is_some_and(|last| !c.retains(last))
                    });

                    match cutoff {
                        Some(c) => records.extend(page_records.into_iter().filter(|r| c.retains(r))),
                        None => records.extend(page_records),
                    }

                    if page_exhausts_window {
                        log::debug!(target: LOG_TARGET, "Remaining pages at '{url}' fall outside the cutoff window");
                        break;
                    }
                }
                RecordSet::Empty => {
                    if first_page {
                        return Ok(Attempt::Done(RecordSet::Empty));
                    }
                    break;
                }
            }

            if let Some(limit) = limit
                && records.len() >= limit
            {
                break;
            }

            match links.next {
                Some(next) => url = next,
                None => break,
            }
            first_page = false;
        }

        Ok(Attempt::Done(RecordSet::Collection(records)))
    }
}
