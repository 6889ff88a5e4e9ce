//! # gitdex Core
//!
//! JSON records versioned in git and kept in step with a search index.
//!
//! A [`Workspace`] owns one or more git working trees and the index
//! derived from them:
//!
//! - `save` and `delete` commit first, then update the index
//! - `pull` merges upstream commits and applies the diff to the index
//! - `sync` rebuilds the index for a type from the trees and prunes
//!   documents with no backing record
//!
//! The index is a cache. Whatever happens to it, `sync` restores it from
//! the records in git.
//!
//! ## Example
//!
//! ```rust,no_run
//! use gitdex_core::{Workspace, WorkspaceConfig};
//! use gitdex_model::{FieldKind, FieldSpec, Record, Schema, TypeId};
//! use gitdex_search::{InMemorySearchBackend, Query};
//! use gitdex_storage::Identity;
//! use serde_json::json;
//!
//! let person = Schema::shared(
//!     TypeId::new("myapp.models", "Person").unwrap(),
//!     vec![FieldSpec::new("name", FieldKind::Text)],
//! )
//! .unwrap();
//!
//! let mut workspace =
//!     Workspace::open(WorkspaceConfig::new("/tmp/people"), InMemorySearchBackend::new()).unwrap();
//! workspace.register(person.clone());
//! workspace.setup(&Identity::new("Jane", "jane@example.org")).unwrap();
//!
//! let values = json!({"name": "Foo"}).as_object().cloned().unwrap();
//! let mut record = Record::create(&person, values).unwrap();
//! workspace.save(&mut record, "Add Foo").unwrap();
//!
//! let found = workspace
//!     .search(person.type_id(), &Query::all().term("name", "Foo"))
//!     .unwrap();
//! assert_eq!(found.len(), 1);
//! ```

#![deny(unsafe_code)]
#![warn(missing_docs)]

mod config;
mod error;
mod reconcile;
mod remote;
mod workspace;

pub use config::WorkspaceConfig;
pub use error::{CoreError, CoreResult};
pub use reconcile::{
    DiffOutcome, FallbackReason, ReconciliationEngine, ReconciliationResult, ReindexIter,
};
pub use remote::RemoteWorkspace;
pub use workspace::{PullReport, Workspace};

pub use gitdex_storage::Identity;
