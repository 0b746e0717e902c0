//! Command-line interface and orchestration for repo-vitals
//!
//! This module implements the CLI commands and coordinates the library's
//! mining, scraping, snapshot, and vitals layers into end-to-end runs. It
//! handles argument parsing, logging setup, and the high-level workflows.
//!
//! # Commands
//!
//! - **mine**: Select repositories (by search query or explicit reference),
//!   fetch their REST resources and scraped web pages, and write each
//!   resource group to a snapshot file
//! - **score**: Read the snapshot files for a series, compute the health
//!   metrics per repository, and write a combined scores snapshot plus an
//!   optional CSV table
//!
//! The two commands share nothing at run time beyond the snapshot files on
//! disk, so a mining run can be repeated or resumed independently of
//! scoring. The `common` module provides the shared arguments (series
//! label, snapshot directory, log level) and logger setup.

mod common;
mod mine;
mod score;

pub use mine::{MineArgs, mine_snapshots};
pub use score::{ScoreArgs, score_snapshots};
