//! A tool to mine GitHub repository metadata and compute open-source health vitals.
//!
//! # Overview
//!
//! `repo-vitals` is a two-stage batch pipeline. The **mine** stage selects a set of
//! repositories, pulls their metadata from the GitHub REST API (plus a few web pages
//! the API does not cover), and writes each resource group to a JSON snapshot file.
//! The **score** stage reads those snapshots back and computes a collection of
//! community-health metrics per repository, with no further network traffic against
//! GitHub.
//!
//! Because every mined resource lands in its own file before the next fetch starts,
//! a run that dies halfway keeps everything it already gathered, and scoring can be
//! re-run against the same snapshots as often as the metric definitions change.
//!
//! # Installation
//!
//! ```bash
//! cargo install repo-vitals
//! ```
//!
//! # Quick Start
//!
//! Mine the top 50 Rust repositories by stars, then score them:
//!
//! ```bash
//! export GITHUB_TOKEN=ghp_xxxxxxxxxxxxxxxxxxxx
//! repo-vitals mine --language rust --query "language:rust stars:>500" --count 50
//! repo-vitals score --language rust
//! ```
//!
//! This leaves one snapshot file per resource under `snapshots/` and a combined
//! `snapshots/rust_scores.json` keyed by repository id.
//!
//! # Mining
//!
//! ## Selecting Repositories
//!
//! **By search query** (any GitHub repository search expression):
//!
//! ```bash
//! repo-vitals mine --language rust --query "language:rust stars:>500" --count 100
//! ```
//!
//! `--count` caps how many repositories are taken from the search results, walking
//! result pages until the cap or the end of the results is reached.
//!
//! **By explicit reference** (repeatable; `owner/name` or a numeric id):
//!
//! ```bash
//! repo-vitals mine --language go --repo golang/go --repo kubernetes/kubernetes
//! repo-vitals mine --language misc --repo 10270250
//! ```
//!
//! `--query` and `--repo` are mutually exclusive.
//!
//! ## What Gets Mined
//!
//! Each run fetches the standard resource groups, every one written to its own
//! snapshot before the next begins:
//!
//! - `repository`, `contributors`, `releases`, `community_health`, `advisories`
//! - `organization_users` (the organizations each contributor belongs to)
//! - `forks` (only those updated within the last year)
//! - `pull_requests` and `issues` (all states)
//! - `commits` (last year), `single_commits` (per-commit stats, last month)
//! - `issue_comments` (threads of issues touched in the last six months)
//! - `dependents`, `dependencies`, `active_branches`, `stale_branches` (scraped
//!   from the repository's web pages)
//!
//! **Restrict a run to specific resources:**
//!
//! ```bash
//! repo-vitals mine --language rust --repo rust-lang/rust --resource issues --resource issue_comments
//! ```
//!
//! ## Resource Tables
//!
//! The REST endpoints, the fields kept from each response, and the nesting rules
//! all come from a resource descriptor table. The built-in table covers everything
//! listed above; `--resources path/to/table.json` (also `.yml`, `.yaml`, or
//! `.toml`) replaces it, which is how new endpoints or trimmed field sets are
//! introduced without a rebuild.
//!
//! ## Concurrency and Rate Limits
//!
//! ```bash
//! repo-vitals mine --language rust --query "language:rust stars:>500" --jobs 4
//! ```
//!
//! `--jobs` fetches that many repositories concurrently. All workers share one
//! rate-limit guard: when GitHub reports the quota exhausted, every worker parks
//! until the advertised reset time and the interrupted repository restarts from
//! its first page, so a long run survives crossing a quota window.
//!
//! # Snapshot Files
//!
//! Snapshots are plain JSON under `--out` (default `snapshots/`), named
//! `{language}_{resource}.json`. The `--language` label is just a series name
//! shared by a mine run and the score run that reads it; nothing checks it
//! against the repositories' actual languages.
//!
//! ```text
//! snapshots/
//!   rust_repository.json
//!   rust_issues.json
//!   rust_issue_comments.json
//!   ...
//!   rust_scores.json
//! ```
//!
//! Top-level maps are keyed by repository id. Nested resources
//! (`organization_users`, `single_commits`, `issue_comments`) hold one inner map
//! per repository, keyed by the parent item (contributor login, commit sha, issue
//! number).
//!
//! # Scoring
//!
//! ```bash
//! repo-vitals score --language rust
//! repo-vitals score --language rust --csv rust_scores.csv
//! ```
//!
//! Scoring computes, per repository: `maturity`, `osi_approved_license`,
//! `technical_fork`, `criticality_score`, `project_velocity`, `community_health`,
//! `support_rate`, `elephant_factor`, `size_of_community`, `churn`,
//! `branch_lifecycle`, `bus_factor`, `support_contributors`, and
//! `advisory_exposure`. The results land in `{language}_scores.json`; `--csv`
//! additionally writes a one-row-per-repository table, with the structured
//! metrics kept as JSON text in their cells.
//!
//! Only the `repository` snapshot is required. Any other snapshot that is missing
//! (say, from a `--resource`-restricted mine run) is treated as empty and the
//! metrics that depend on it degrade accordingly.
//!
//! Two small outside lookups happen during scoring: the SPDX license catalog is
//! fetched once to decide OSI approval, and advisories that carry a CVE id but no
//! CVSS score get their base score looked up from the NVD website. Both degrade
//! gracefully when unreachable.
//!
//! # GitHub Access
//!
//! Mining requires an access token; without one the REST quota (60 requests per
//! hour) cannot sustain even a single repository.
//!
//! 1. Create a personal access token at <https://github.com/settings/tokens>
//! 2. No special permissions are needed for public repositories
//! 3. Provide it via `GITHUB_TOKEN` or `--github-token`
//!
//! ```bash
//! export GITHUB_TOKEN=ghp_xxxxxxxxxxxxxxxxxxxx
//! repo-vitals mine --language rust --repo rust-lang/rust
//! ```
//!
//! # Complete Examples
//!
//! ## Example 1: Weekly Ecosystem Sweep
//!
//! ```bash
//! export GITHUB_TOKEN=$GITHUB_PAT
//! repo-vitals mine --language python --query "language:python stars:>1000" --count 200 --jobs 4
//! repo-vitals score --language python --csv python_health.csv
//! ```
//!
//! ## Example 2: Track a Fixed Fleet
//!
//! ```bash
//! repo-vitals mine --language infra \
//!   --repo kubernetes/kubernetes \
//!   --repo hashicorp/terraform \
//!   --repo prometheus/prometheus
//! repo-vitals score --language infra
//! ```
//!
//! ## Example 3: Refresh One Resource
//!
//! Issues move faster than the rest; refresh just those snapshots and re-score:
//!
//! ```bash
//! repo-vitals mine --language rust --repo rust-lang/rust \
//!   --resource issues --resource issue_comments
//! repo-vitals score --language rust
//! ```
//!
//! # Troubleshooting
//!
//! ## Rate Limiting
//!
//! Long mining runs routinely exhaust the hourly quota. This is handled, not
//! fatal: the run logs the pause, sleeps until the reset time GitHub advertises,
//! and resumes. Lower `--jobs` or split the repository set if the pauses dominate
//! the run.
//!
//! ## Missing Snapshots at Score Time
//!
//! `score` fails only when the `repository` snapshot is absent. Every other
//! missing snapshot logs a warning and scores as empty, which is expected when
//! mining was restricted with `--resource`.
//!
//! ## Scraped Pages
//!
//! Dependents, dependencies, and branch activity come from web pages rather than
//! the API, and those pages change without notice. A page whose expected markup
//! never appears yields an empty result for that repository after bounded
//! retries; it does not fail the run.

use clap::builder::Styles;
use clap::builder::styling::{AnsiColor, Effects};
use clap::{Parser, Subcommand};
use repo_vitals::Result;

mod commands;

use crate::commands::{MineArgs, ScoreArgs, mine_snapshots, score_snapshots};

const CLAP_STYLES: Styles = Styles::styled()
    .header(AnsiColor::Green.on_default().effects(Effects::BOLD))
    .usage(AnsiColor::Green.on_default().effects(Effects::BOLD))
    .literal(AnsiColor::Cyan.on_default().effects(Effects::BOLD))
    .placeholder(AnsiColor::Cyan.on_default());

#[derive(Parser, Debug)]
#[command(name = "repo-vitals", version, about)]
#[command(styles = CLAP_STYLES)]
struct Cli {
    #[command(subcommand)]
    command: PipelineCommand,
}

#[derive(Subcommand, Debug)]
enum PipelineCommand {
    /// Mine repository metadata into snapshot files
    Mine(Box<MineArgs>),
    /// Compute health metrics from existing snapshot files
    Score(ScoreArgs),
}

#[tokio::main]
async fn main() -> Result<()> {
    match &Cli::parse().command {
        PipelineCommand::Mine(mine_args) => mine_snapshots(mine_args).await,
        PipelineCommand::Score(score_args) => score_snapshots(score_args).await,
    }
}
