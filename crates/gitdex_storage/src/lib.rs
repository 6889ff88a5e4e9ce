//! # gitdex Storage
//!
//! Git-backed storage for gitdex records.
//!
//! Every record lives in its own file at `<namespace>/<Name>/<id>.json`
//! inside one or more git working trees, and every mutation is a commit.
//! This crate provides:
//!
//! - [`PathScheme`]: the mapping between record identities and paths
//! - [`GitStorage`]: reads, commits, config and pull with diffing
//! - [`StorageRouter`]: picks the working tree a write goes to
//! - [`RemoteStorage`]: a read-only mirror served over HTTP
//! - [`RecordStore`]: the read-side trait both storages implement
//!
//! Commit messages are transliterated to ASCII before they reach git.

#![deny(unsafe_code)]
#![warn(missing_docs)]

mod commit;
mod error;
mod git;
mod message;
mod path;
mod remote;
mod router;
mod store;

pub use commit::{Commit, CommitOptions, DiffEntry, Identity};
pub use error::{StorageError, StorageResult};
pub use git::{GitStorage, INIT_MESSAGE};
pub use message::commit_message;
pub use path::PathScheme;
pub use remote::RemoteStorage;
pub use router::{StorageRouter, WorkingTree};
pub use store::{RecordIter, RecordStore};
