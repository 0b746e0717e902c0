//! The dependents page: who depends on a repository.
//!
//! Each row names one dependent repository; the selected filter button
//! carries the full count, which reaches far beyond the rows any reasonable
//! walk would visit. The assembled record therefore keeps the two apart:
//! the published total and the visible sample.

use scraper::{Html, Selector};
use serde_json::Value;

use super::{Harvest, Parsed, ScrapeAdapter, ScrapePage, element_text, next_href, selector};
use crate::Result;
use crate::mining::payload::{Record, RecordSet};

#[derive(Debug)]
pub struct DependentsPage {
    container: Selector,
    row: Selector,
    owner_link: Selector,
    repo_link: Selector,
    count_button: Selector,
    next_anchor: Selector,
}

impl DependentsPage {
    pub fn new() -> Result<Self> {
        Ok(Self {
            container: selector("div#dependents")?,
            row: selector(r#"div.Box-row[data-test-id="dg-repo-pkg-dependent"]"#)?,
            owner_link: selector(r#"a[data-hovercard-type="user"], a[data-hovercard-type="organization"]"#)?,
            repo_link: selector(r#"a.text-bold[data-hovercard-type="repository"]"#)?,
            count_button: selector("a.btn-link.selected")?,
            next_anchor: selector("div.BtnGroup a")?,
        })
    }
}

impl ScrapeAdapter for DependentsPage {
    fn resource_name(&self) -> &'static str {
        "dependents"
    }

    fn page_url(&self, web_base: &str, owner: &str, name: &str) -> String {
        format!("{web_base}/{owner}/{name}/network/dependents?dependent_type=REPOSITORY")
    }

    fn parse(&self, document: &Html) -> Parsed {
        let Some(container) = document.select(&self.container).next() else {
            return Parsed::MissingContainer;
        };

        let total = container
            .select(&self.count_button)
            .next()
            .and_then(|button| parse_count(&element_text(button)));

        let mut rows = Vec::new();
        for element in container.select(&self.row) {
            let owner = element.select(&self.owner_link).next().map(element_text);
            let repo = element.select(&self.repo_link).next().map(element_text);

            if let (Some(owner), Some(repo)) = (owner, repo) {
                let mut record = Record::new();
                let _ = record.insert("dependent".to_owned(), Value::String(format!("{owner}/{repo}")));
                rows.push(record);
            } else {
                log::debug!(target: super::LOG_TARGET, "Skipping a dependent row with no owner or repository link");
            }
        }

        Parsed::Content(ScrapePage {
            rows,
            total,
            next_url: next_href(container, &self.next_anchor),
        })
    }

    fn assemble(&self, harvest: Harvest) -> RecordSet {
        let visible: Vec<Value> = harvest
            .rows
            .into_iter()
            .filter_map(|mut row| row.remove("dependent"))
            .collect();

        let mut record = Record::new();
        let _ = record.insert("total_dependents".to_owned(), Value::from(harvest.total.unwrap_or(0)));
        let _ = record.insert("visible_dependents".to_owned(), Value::Array(visible));
        RecordSet::Singleton(record)
    }
}

/// Counts on the filter button read like "146,392 Repositories".
fn parse_count(text: &str) -> Option<u64> {
    text.split_whitespace().next()?.replace(',', "").parse().ok()
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    const FRAGMENT: &str = r##"
        <html><body><div id="dependents">
          <details class="select-menu float-right position-relative details-reset details-overlay">
            <summary>Package: widget</summary>
          </details>
          <a class="btn-link selected" href="#">146,392 Repositories</a>
          <div class="Box">
            <div class="Box-row d-flex flex-items-center" data-test-id="dg-repo-pkg-dependent">
              <span class="f5 color-fg-muted">
                <a data-hovercard-type="user" href="/alice">alice</a> /
              </span>
              <a class="text-bold" data-hovercard-type="repository" href="/alice/app">app</a>
            </div>
            <div class="Box-row d-flex flex-items-center" data-test-id="dg-repo-pkg-dependent">
              <span class="f5 color-fg-muted">
                <a data-hovercard-type="organization" href="/megacorp">megacorp</a> /
              </span>
              <a class="text-bold" data-hovercard-type="repository" href="/megacorp/service">service</a>
            </div>
            <div class="Box-row d-flex flex-items-center" data-test-id="dg-repo-pkg-dependent">
              <span class="f5 color-fg-muted">ghost user</span>
            </div>
          </div>
          <div class="BtnGroup">
            <a class="btn btn-outline BtnGroup-item" href="/acme/widget/network/dependents?after=xyz">Next</a>
          </div>
        </div></body></html>"##;

    #[test]
    fn rows_count_and_next_link_are_extracted() {
        let adapter = DependentsPage::new().unwrap();
        let Parsed::Content(page) = adapter.parse(&Html::parse_document(FRAGMENT)) else {
            panic!("container is present in the fragment");
        };

        assert_eq!(page.total, Some(146_392));
        assert_eq!(page.rows.len(), 2);
        assert_eq!(page.rows[0]["dependent"], "alice/app");
        assert_eq!(page.rows[1]["dependent"], "megacorp/service");
        assert_eq!(page.next_url.as_deref(), Some("/acme/widget/network/dependents?after=xyz"));
    }

    #[test]
    fn absent_container_is_reported_for_retry() {
        let adapter = DependentsPage::new().unwrap();
        let parsed = adapter.parse(&Html::parse_document("<html><body><p>rate limited</p></body></html>"));
        assert!(matches!(parsed, Parsed::MissingContainer));
    }

    #[test]
    fn disabled_next_button_ends_the_chain() {
        let body = r#"
            <div id="dependents">
              <div class="BtnGroup">
                <button disabled>Next</button>
                <a href="/prev">Previous</a>
              </div>
            </div>"#;
        let adapter = DependentsPage::new().unwrap();
        let Parsed::Content(page) = adapter.parse(&Html::parse_document(body)) else {
            panic!("container is present in the fragment");
        };

        assert_eq!(page.next_url, None);
        assert!(page.rows.is_empty());
    }

    #[test]
    fn empty_harvest_assembles_to_zero_results() {
        let adapter = DependentsPage::new().unwrap();
        let assembled = adapter.assemble(Harvest::default());

        let records = assembled.records();
        assert_eq!(records.len(), 1);
        assert_eq!(records[0]["total_dependents"], 0);
        assert_eq!(records[0]["visible_dependents"], json!([]));
    }

    #[test]
    fn harvest_totals_and_rows_land_in_one_record() {
        let adapter = DependentsPage::new().unwrap();
        let mut row = Record::new();
        let _ = row.insert("dependent".to_owned(), json!("alice/app"));
        let harvest = Harvest {
            total: Some(9),
            rows: vec![row],
        };

        let records = adapter.assemble(harvest).into_records();
        assert_eq!(records[0]["total_dependents"], 9);
        assert_eq!(records[0]["visible_dependents"], json!(["alice/app"]));
    }

    #[test]
    fn page_urls_filter_to_repository_dependents() {
        let adapter = DependentsPage::new().unwrap();
        assert_eq!(
            adapter.page_url("https://github.example", "acme", "widget"),
            "https://github.example/acme/widget/network/dependents?dependent_type=REPOSITORY"
        );
    }

    #[test]
    fn comma_separated_counts_parse() {
        assert_eq!(parse_count("146,392 Repositories"), Some(146_392));
        assert_eq!(parse_count("3 Repositories"), Some(3));
        assert_eq!(parse_count(""), None);
        assert_eq!(parse_count("many"), None);
    }
}
