//! Single-shot lookups against catalogs outside the hosting API.
//!
//! Both collaborators here are one GET plus one parse, with none of the
//! pagination or retry machinery the mining layer carries. The SPDX catalog
//! feeds the license metric; the NVD page scrape backfills CVSS scores for
//! advisories that name a CVE but carry no score of their own.

use ohno::{IntoAppError, app_err};
use scraper::{Html, Selector};
use serde::Deserialize;
use std::collections::BTreeMap;

use crate::Result;

const LOG_TARGET: &str = "  external";

/// Published SPDX license list, as consumed by [`LicenseCatalog::fetch`].
pub const SPDX_CATALOG_URL: &str = "https://raw.githubusercontent.com/spdx/license-list-data/master/json/licenses.json";

/// Web root of the National Vulnerability Database.
pub const NVD_WEB_BASE: &str = "https://nvd.nist.gov";

#[derive(Debug, Deserialize)]
struct CatalogDoc {
    licenses: Vec<CatalogEntry>,
}

#[derive(Debug, Deserialize)]
struct CatalogEntry {
    #[serde(rename = "licenseId")]
    license_id: String,

    #[serde(rename = "isOsiApproved", default)]
    osi_approved: bool,
}

/// SPDX license ids and their OSI approval flags.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LicenseCatalog {
    entries: BTreeMap<String, bool>,
}

impl LicenseCatalog {
    /// Download and parse the SPDX license list.
    pub async fn fetch(http: &reqwest::Client, url: &str) -> Result<Self> {
        let response = http
            .get(url)
            .send()
            .await
            .into_app_err_with(|| format!("unable to fetch the SPDX license catalog from '{url}'"))?;

        let status = response.status();
        if !status.is_success() {
            return Err(app_err!("SPDX license catalog request to '{url}' failed with HTTP {}", status.as_u16()));
        }

        let doc: CatalogDoc = response
            .json()
            .await
            .into_app_err_with(|| format!("unable to parse the SPDX license catalog from '{url}'"))?;

        let catalog = Self::from_pairs(doc.licenses.into_iter().map(|entry| (entry.license_id, entry.osi_approved)));
        log::info!(target: LOG_TARGET, "Loaded {} licenses from the SPDX catalog", catalog.len());
        Ok(catalog)
    }

    /// Build a catalog directly from `(id, osi_approved)` pairs. Ids are
    /// trimmed, matching how lookups trim their argument.
    pub fn from_pairs(pairs: impl IntoIterator<Item = (String, bool)>) -> Self {
        let entries = pairs.into_iter().map(|(id, approved)| (id.trim().to_owned(), approved)).collect();
        Self { entries }
    }

    /// Whether `spdx_id` is OSI approved. `None` when the id is not in the
    /// catalog at all.
    #[must_use]
    pub fn is_osi_approved(&self, spdx_id: &str) -> Option<bool> {
        self.entries.get(spdx_id.trim()).copied()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// Scrape the CVSS base score for one CVE from its NVD detail page.
///
/// The score is taken only when the severity panel attributes an assessment
/// to NVD itself. Any failure along the way, from transport to markup, reads
/// as "no score published" and yields `None`.
pub async fn nvd_base_score(http: &reqwest::Client, web_base: &str, cve_id: &str) -> Option<f64> {
    let url = format!("{}/vuln/detail/{cve_id}", web_base.trim_end_matches('/'));

    let response = match http.get(&url).send().await {
        Ok(response) if response.status().is_success() => response,
        Ok(response) => {
            log::debug!(target: LOG_TARGET, "NVD page for {cve_id} answered HTTP {}", response.status().as_u16());
            return None;
        }
        Err(e) => {
            log::debug!(target: LOG_TARGET, "NVD page for {cve_id} unreachable: {e}");
            return None;
        }
    };

    let body = response.text().await.ok()?;
    let score = parse_nvd_score(&body);
    if score.is_none() {
        log::debug!(target: LOG_TARGET, "NVD page for {cve_id} carries no NVD-attributed CVSS score");
    }

    score
}

/// Pull the base score out of the severity panel markup. The panel lists one
/// assessment row per source; only an "NVD" row counts, and the score is the
/// panel's leading severity figure, shaped like "9.8 CRITICAL".
fn parse_nvd_score(body: &str) -> Option<f64> {
    let panel_selector = Selector::parse("div#Vuln3CvssPanel").ok()?;
    let row_selector = Selector::parse("div.row.no-gutters").ok()?;
    let source_selector = Selector::parse("span.wrapData").ok()?;
    let severity_selector = Selector::parse("span.severityDetail").ok()?;

    let document = Html::parse_document(body);
    let panel = document.select(&panel_selector).next()?;

    let nvd_assessed = panel.select(&row_selector).any(|row| {
        row.select(&source_selector)
            .any(|source| source.text().collect::<String>().trim() == "NVD")
    });
    if !nvd_assessed {
        return None;
    }

    let severity = panel.select(&severity_selector).next()?.text().collect::<String>();
    severity.split_whitespace().next()?.parse().ok()
}

#[cfg(test)]
mod tests {
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    use super::*;

    const NVD_PAGE: &str = r##"
        <html><body>
        <div id="Vuln3CvssPanel">
          <div class="row no-gutters">
            <div class="col-lg-3"><span class="wrapData">NVD</span></div>
            <div class="col-lg-9"><span class="severityDetail"><a href="#">9.8 CRITICAL</a></span></div>
          </div>
          <div class="row no-gutters">
            <div class="col-lg-3"><span class="wrapData">CNA</span></div>
            <div class="col-lg-9"><span class="severityDetail"><a href="#">8.1 HIGH</a></span></div>
          </div>
        </div>
        </body></html>"##;

    #[tokio::test]
    #[cfg_attr(miri, ignore = "miri cannot intercept network calls")]
    async fn catalog_fetch_parses_ids_and_osi_flags() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/licenses.json"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "licenseVersion": "3.21",
                "licenses": [
                    {"licenseId": "MIT", "isOsiApproved": true, "name": "MIT License"},
                    {"licenseId": "WTFPL", "isOsiApproved": false},
                    {"licenseId": " 0BSD ", "isOsiApproved": true},
                ],
            })))
            .mount(&server)
            .await;

        let http = reqwest::Client::new();
        let catalog = LicenseCatalog::fetch(&http, &format!("{}/licenses.json", server.uri())).await.unwrap();

        assert_eq!(catalog.len(), 3);
        assert_eq!(catalog.is_osi_approved("MIT"), Some(true));
        assert_eq!(catalog.is_osi_approved("WTFPL"), Some(false));
        assert_eq!(catalog.is_osi_approved("0BSD"), Some(true));
        assert_eq!(catalog.is_osi_approved(" MIT "), Some(true));
        assert_eq!(catalog.is_osi_approved("Proprietary-1.0"), None);
    }

    #[tokio::test]
    #[cfg_attr(miri, ignore = "miri cannot intercept network calls")]
    async fn catalog_fetch_rejects_http_failure() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(500))
            .mount(&server)
            .await;

        let http = reqwest::Client::new();
        let outcome = LicenseCatalog::fetch(&http, &format!("{}/licenses.json", server.uri())).await;

        assert!(outcome.unwrap_err().to_string().contains("HTTP 500"));
    }

    #[tokio::test]
    #[cfg_attr(miri, ignore = "miri cannot intercept network calls")]
    async fn catalog_fetch_rejects_malformed_body() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(200).set_body_string("<html>not json</html>"))
            .mount(&server)
            .await;

        let http = reqwest::Client::new();
        let outcome = LicenseCatalog::fetch(&http, &format!("{}/licenses.json", server.uri())).await;

        assert!(outcome.unwrap_err().to_string().contains("unable to parse"));
    }

    #[test]
    fn score_is_read_from_an_nvd_attributed_panel() {
        assert_eq!(parse_nvd_score(NVD_PAGE), Some(9.8));
    }

    #[test]
    fn missing_panel_yields_no_score() {
        assert_eq!(parse_nvd_score("<html><body><p>Page not found</p></body></html>"), None);
    }

    #[test]
    fn panel_without_an_nvd_row_yields_no_score() {
        let body = r#"
            <div id="Vuln3CvssPanel">
              <div class="row no-gutters">
                <span class="wrapData">CNA</span>
                <span class="severityDetail">8.1 HIGH</span>
              </div>
            </div>"#;
        assert_eq!(parse_nvd_score(body), None);
    }

    #[test]
    fn garbled_severity_text_yields_no_score() {
        let body = r#"
            <div id="Vuln3CvssPanel">
              <div class="row no-gutters">
                <span class="wrapData">NVD</span>
                <span class="severityDetail">pending analysis</span>
              </div>
            </div>"#;
        assert_eq!(parse_nvd_score(body), None);
    }

    #[tokio::test]
    #[cfg_attr(miri, ignore = "miri cannot intercept network calls")]
    async fn nvd_lookup_reads_live_markup() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/vuln/detail/CVE-2022-35920"))
            .respond_with(ResponseTemplate::new(200).set_body_string(NVD_PAGE))
            .mount(&server)
            .await;

        let http = reqwest::Client::new();
        let score = nvd_base_score(&http, &server.uri(), "CVE-2022-35920").await;

        assert_eq!(score, Some(9.8));
    }

    #[tokio::test]
    #[cfg_attr(miri, ignore = "miri cannot intercept network calls")]
    async fn nvd_lookup_treats_missing_pages_as_unscored() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(404))
            .mount(&server)
            .await;

        let http = reqwest::Client::new();
        assert_eq!(nvd_base_score(&http, &server.uri(), "CVE-0000-0000").await, None);
    }
}
