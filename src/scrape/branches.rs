//! The branches page, filtered by activity.
//!
//! The REST API reports branches without their lifecycle, so the page is
//! the only source for stale/active partitions and per-branch states. Each
//! activity filter is a separate resource with its own snapshot; a driver
//! run walks one filter at a time.

use scraper::{Html, Selector};
use serde_json::Value;

use super::{Harvest, Parsed, ScrapeAdapter, ScrapePage, element_text, next_href, selector};
use crate::Result;
use crate::mining::payload::{Record, RecordSet};

/// Which activity filter of the branches page to walk.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BranchActivity {
    All,
    Active,
    Stale,
}

impl BranchActivity {
    const fn path_segment(self) -> &'static str {
        match self {
            Self::All => "all",
            Self::Active => "active",
            Self::Stale => "stale",
        }
    }

    pub const fn resource_name(self) -> &'static str {
        match self {
            Self::All => "branches",
            Self::Active => "active_branches",
            Self::Stale => "stale_branches",
        }
    }
}

#[derive(Debug)]
pub struct BranchesPage {
    activity: BranchActivity,
    container: Selector,
    row: Selector,
    item: Selector,
    name_link: Selector,
    state_label: Selector,
    state_button: Selector,
    next_anchor: Selector,
}

impl BranchesPage {
    pub fn new(activity: BranchActivity) -> Result<Self> {
        Ok(Self {
            activity,
            container: selector(r#"div[data-target="branch-filter.result"]"#)?,
            row: selector("li.Box-row")?,
            item: selector("branch-filter-item")?,
            name_link: selector(r#"a[class*="branch-name"]"#)?,
            state_label: selector(r#"span[class*="State State"]"#)?,
            state_button: selector(r#"a[class*="btn "]"#)?,
            next_anchor: selector("div.paginate-container a")?,
        })
    }
}

impl ScrapeAdapter for BranchesPage {
    fn resource_name(&self) -> &'static str {
        self.activity.resource_name()
    }

    fn page_url(&self, web_base: &str, owner: &str, name: &str) -> String {
        format!("{web_base}/{owner}/{name}/branches/{}", self.activity.path_segment())
    }

    fn parse(&self, document: &Html) -> Parsed {
        let Some(container) = document.select(&self.container).next() else {
            return Parsed::MissingContainer;
        };

        let mut rows = Vec::new();
        for element in container.select(&self.row) {
            let Some(item) = element.select(&self.item).next() else {
                log::debug!(target: super::LOG_TARGET, "Skipping a branch row with no filter item");
                continue;
            };

            let Some(name) = item.select(&self.name_link).next().map(element_text) else {
                log::debug!(target: super::LOG_TARGET, "Skipping a branch row with no name link");
                continue;
            };

            // A branch shows either a pull-request state label or a bare
            // "Compare" button; some show neither.
            let state = item
                .select(&self.state_label)
                .next()
                .or_else(|| item.select(&self.state_button).next())
                .map_or_else(String::new, element_text);

            let mut record = Record::new();
            let _ = record.insert("name".to_owned(), Value::String(name));
            let _ = record.insert("state".to_owned(), Value::String(state));
            rows.push(record);
        }

        Parsed::Content(ScrapePage {
            rows,
            total: None,
            next_url: next_href(document.root_element(), &self.next_anchor),
        })
    }

    fn assemble(&self, harvest: Harvest) -> RecordSet {
        if harvest.rows.is_empty() {
            RecordSet::Empty
        } else {
            RecordSet::Collection(harvest.rows)
        }
    }
}
