//! # gitdex Search
//!
//! The derived search index of a gitdex workspace.
//!
//! Every record type maps to one document type inside an index named
//! `<prefix>-<branch>`. The index is a cache: it can always be rebuilt
//! from the records in the working trees.
//!
//! - [`SearchBackend`] is the storage seam, with an
//!   [`InMemorySearchBackend`] for tests and an [`ElasticsearchBackend`]
//!   speaking HTTP through any [`gitdex_http::HttpClient`].
//! - [`IndexManager`] names indexes, converts records to documents and
//!   back, and waits for readiness under a [`ReadinessPolicy`].
//! - [`Query`] expresses term and range filters with sorting and paging.

#![deny(unsafe_code)]
#![warn(missing_docs)]

mod backend;
mod elasticsearch;
mod error;
mod manager;
mod memory;
mod query;
mod readiness;

pub use backend::{Hit, IndexStatus, ScrollPage, SearchBackend, ShardState};
pub use elasticsearch::ElasticsearchBackend;
pub use error::{SearchError, SearchResult};
pub use manager::{IndexManager, PAGE_SIZE};
pub use memory::InMemorySearchBackend;
pub use query::{Filter, Query, SortOrder};
pub use readiness::ReadinessPolicy;
