//! Repository-metadata mining against the hosting API.
//!
//! The pipeline decomposes into small collaborators:
//! - [`RateGuard`] coordinates throttle pauses and bounds in-flight requests;
//! - [`ApiClient`] sends one request and classifies the response;
//! - [`Paginator`] walks `Link`-header cursors through the guard;
//! - [`RecordSet`] carries fetched payloads in their tagged shape, reduced to
//!   descriptor field whitelists;
//! - [`RepoSelector`] builds the session's working set;
//! - [`ResourceFetcher`] drives whole resources, plain and nested, across the
//!   working set with one shared [`RetryPolicy`].

pub mod client;
pub mod fetcher;
pub mod guard;
pub mod links;
pub mod pages;
pub mod payload;
pub mod retry;
pub mod selector;

pub use client::{ApiClient, PageOutcome, RateLimitInfo};
pub use fetcher::{Filters, ResourceFetcher, ResourceGroups, ResourceMap, SubResourceMap};
pub use guard::RateGuard;
pub use links::PageLinks;
pub use pages::{AgeCutoff, Paginator};
pub use payload::{Record, RecordSet, project_record};
pub use retry::{Attempt, RetryPolicy};
pub use selector::{RepoIdentity, RepoRef, RepoSelector, WorkingSet};
