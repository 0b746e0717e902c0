//! The resource descriptor table: static, per-resource fetch configuration.
//!
//! A descriptor says how to reach a named resource (URL prefix and suffix
//! around the repository id), which fields to keep from its records, and, for
//! nested resources, how to reach the sub-resource under one parent item.
//! The table is loaded once at startup and read-only afterwards; resource
//! definitions can be extended without code changes by pointing the CLI at an
//! external table file.

use crate::Result;
use camino::Utf8Path;
use ohno::{IntoAppError, app_err};
use serde::Deserialize;
use std::collections::BTreeMap;
use std::fs;

/// The default descriptor table, embedded from `default_resources.json`.
/// `build.rs` parses this at compile time, so a malformed default fails the build.
pub const DEFAULT_RESOURCES: &str = include_str!("default_resources.json");

/// Where a nested resource's URL is rooted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NestedScope {
    /// `<prefix><repo_id><suffix>/<parent_id><nested_suffix>` (comments under an issue).
    #[default]
    Repository,
    /// `<prefix><parent_id><nested_suffix>` (organizations under a contributor login).
    Parent,
}

/// Static configuration for one named resource.
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ResourceDescriptor {
    /// URL path prefix, joined onto the configured API base, up to the id.
    pub url_prefix: String,

    /// URL path suffix appended after the repository id.
    #[serde(default)]
    pub url_suffix: String,

    /// Field whitelist applied to every record. Empty keeps records unprojected.
    #[serde(default)]
    pub fields: Vec<String>,

    /// Nested resources: the parent item field whose value is interpolated
    /// into the sub-resource URL (`"number"` for issues, `"sha"` for commits).
    #[serde(default)]
    pub parent_id_field: Option<String>,

    /// Nested resources: suffix appended after the interpolated parent id.
    #[serde(default)]
    pub nested_suffix: Option<String>,

    /// Nested resources: whether the nested URL is repository- or parent-rooted.
    #[serde(default)]
    pub nested_scope: NestedScope,
}

impl ResourceDescriptor {
    /// Whether this descriptor can drive the sub-resource fetcher.
    #[must_use]
    pub const fn is_nested(&self) -> bool {
        self.parent_id_field.is_some()
    }
}

/// All known resource descriptors, keyed by resource name.
#[derive(Debug, Clone, Deserialize)]
#[serde(transparent)]
pub struct DescriptorTable {
    resources: BTreeMap<String, ResourceDescriptor>,
}

impl DescriptorTable {
    /// The embedded default table.
    pub fn builtin() -> Result<Self> {
        serde_json::from_str(DEFAULT_RESOURCES).into_app_err("parsing embedded default resource table")
    }

    /// Load a table from a file, dispatching on the extension
    /// (`.json`, `.yml`, `.yaml`, or `.toml`).
    pub fn load(path: &Utf8Path) -> Result<Self> {
        let text = fs::read_to_string(path).into_app_err_with(|| format!("reading resource table from {path}"))?;

        let extension = path.extension().unwrap_or_default();
        let table: Self = match extension {
            "json" => serde_json::from_str(&text).into_app_err_with(|| format!("parsing JSON resource table from {path}"))?,
            "yml" | "yaml" => serde_yaml::from_str(&text).into_app_err_with(|| format!("parsing YAML resource table from {path}"))?,
            "toml" => toml::from_str(&text).into_app_err_with(|| format!("parsing TOML resource table from {path}"))?,
            _ => return Err(app_err!("unsupported resource table extension: {extension}")),
        };

        Ok(table)
    }

    /// Look up a descriptor. An unknown name is a configuration error, not a
    /// skippable condition: the caller asked for a resource the table cannot
    /// describe, so the run must fail fast.
    pub fn get(&self, name: &str) -> Result<&ResourceDescriptor> {
        self.resources
            .get(name)
            .ok_or_else(|| app_err!("resource '{name}' is not defined in the descriptor table"))
    }

    /// All resource names, in table order.
    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.resources.keys().map(String::as_str)
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.resources.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.resources.is_empty()
    }

    /// Detect inconsistent entries. Warnings, not errors: a table with an
    /// unusable nested entry still serves every other resource.
    #[must_use]
    pub fn validate(&self) -> Vec<String> {
        let mut warnings = Vec::new();
        for (name, descriptor) in &self.resources {
            if descriptor.url_prefix.is_empty() {
                warnings.push(format!("resource '{name}' has an empty url_prefix"));
            }
            if descriptor.nested_suffix.is_some() && descriptor.parent_id_field.is_none() {
                warnings.push(format!("resource '{name}' has a nested_suffix but no parent_id_field"));
            }
        }
        warnings
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn builtin_table_parses() {
        let table = DescriptorTable::builtin().unwrap();
        assert!(!table.is_empty());
        assert!(table.validate().is_empty());
    }

    #[test]
    fn builtin_covers_the_standard_resources() {
        let table = DescriptorTable::builtin().unwrap();
        for name in [
            "repository",
            "contributors",
            "commits",
            "single_commits",
            "issues",
            "issue_comments",
            "pull_requests",
            "releases",
            "forks",
            "stargazers",
            "subscribers",
            "community_health",
            "advisories",
        ] {
            assert!(table.get(name).is_ok(), "missing descriptor for {name}");
        }
    }

    #[test]
    fn unknown_resource_is_an_error() {
        let table = DescriptorTable::builtin().unwrap();
        let err = table.get("no_such_resource").unwrap_err();
        assert!(err.to_string().contains("no_such_resource"));
    }

    #[test]
    fn nested_descriptors_carry_parent_fields() {
        let table = DescriptorTable::builtin().unwrap();

        let comments = table.get("issue_comments").unwrap();
        assert!(comments.is_nested());
        assert_eq!(comments.parent_id_field.as_deref(), Some("number"));
        assert_eq!(comments.nested_suffix.as_deref(), Some("/comments"));
        assert_eq!(comments.nested_scope, NestedScope::Repository);

        let orgs = table.get("organization_users").unwrap();
        assert_eq!(orgs.nested_scope, NestedScope::Parent);
        assert_eq!(orgs.parent_id_field.as_deref(), Some("login"));
    }

    #[test]
    fn parses_json_with_defaults() {
        let text = r#"{ "things": { "url_prefix": "/repositories/", "url_suffix": "/things" } }"#;
        let table: DescriptorTable = serde_json::from_str(text).unwrap();
        let descriptor = table.get("things").unwrap();
        assert!(descriptor.fields.is_empty());
        assert!(!descriptor.is_nested());
    }

    #[test]
    fn unknown_descriptor_key_is_rejected() {
        let text = r#"{ "things": { "url_prefix": "/x/", "url_sufix": "/y" } }"#;
        let result: core::result::Result<DescriptorTable, _> = serde_json::from_str(text);
        assert!(result.is_err());
    }

    #[test]
    fn validate_flags_orphan_nested_suffix() {
        let text = r#"{ "broken": { "url_prefix": "/repositories/", "nested_suffix": "/comments" } }"#;
        let table: DescriptorTable = serde_json::from_str(text).unwrap();
        let warnings = table.validate();
        assert_eq!(warnings.len(), 1);
        assert!(warnings[0].contains("broken"));
    }
}
