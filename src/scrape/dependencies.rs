//! The dependency graph page: what a repository depends on.
//!
//! Package rows usually carry a primary link with the package name; rows for
//! packages the graph could not resolve fall back to a plain text cell. The
//! same package shows up once per manifest, so assembly dedupes.

use scraper::{Html, Selector};
use serde_json::Value;
use std::collections::BTreeSet;

use super::{Harvest, Parsed, ScrapeAdapter, ScrapePage, element_text, next_href, selector};
use crate::Result;
use crate::mining::payload::{Record, RecordSet};

#[derive(Debug)]
pub struct DependenciesPage {
    container: Selector,
    row: Selector,
    package_link: Selector,
    package_cell: Selector,
    next_anchor: Selector,
}

impl DependenciesPage {
    pub fn new() -> Result<Self> {
        Ok(Self {
            container: selector("div#dependencies")?,
            row: selector("li.Box-row")?,
            package_link: selector("a.h4.Link--primary")?,
            package_cell: selector("div.d-flex.flex-items-baseline")?,
            next_anchor: selector("div.paginate-container a")?,
        })
    }
}

impl ScrapeAdapter for DependenciesPage {
    fn resource_name(&self) -> &'static str {
        "dependencies"
    }

    fn page_url(&self, web_base: &str, owner: &str, name: &str) -> String {
        format!("{web_base}/{owner}/{name}/network/dependencies")
    }

    fn parse(&self, document: &Html) -> Parsed {
        let Some(container) = document.select(&self.container).next() else {
            return Parsed::MissingContainer;
        };

        let mut rows = Vec::new();
        for element in container.select(&self.row) {
            let name = element
                .select(&self.package_link)
                .next()
                .or_else(|| element.select(&self.package_cell).next())
                .map(element_text);

            if let Some(name) = name {
                let mut record = Record::new();
                let _ = record.insert("dependency".to_owned(), Value::String(name));
                rows.push(record);
            } else {
                log::debug!(target: super::LOG_TARGET, "Skipping a dependency row with no package name");
            }
        }

        // The pagination block sits outside the container element.
        Parsed::Content(ScrapePage {
            rows,
            total: None,
            next_url: next_href(document.root_element(), &self.next_anchor),
        })
    }

    fn assemble(&self, harvest: Harvest) -> RecordSet {
        let names: BTreeSet<String> = harvest
            .rows
            .into_iter()
            .filter_map(|mut row| match row.remove("dependency") {
                Some(Value::String(name)) => Some(name),
                _ => None,
            })
            .collect();

        let mut record = Record::new();
        let _ = record.insert("total_dependencies".to_owned(), Value::from(names.len()));
        let _ = record.insert(
            "visible_dependencies".to_owned(),
            Value::Array(names.into_iter().map(Value::String).collect()),
        );
        RecordSet::Singleton(record)
    }
}
