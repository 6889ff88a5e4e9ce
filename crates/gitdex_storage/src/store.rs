//! Read-side storage abstraction shared by local and mirrored storage.

use crate::commit::DiffEntry;
use crate::error::StorageResult;
use gitdex_model::{Record, RecordId, Schema, TypeId};
use std::sync::Arc;

/// A lazily loaded sequence of records.
pub type RecordIter<'a> = Box<dyn Iterator<Item = StorageResult<Record>> + 'a>;

/// Read operations the reconciliation engine needs from a record store.
///
/// Implemented by [`crate::GitStorage`] and [`crate::RemoteStorage`].
pub trait RecordStore {
    /// Returns the schema registered for a type.
    fn schema(&self, type_id: &TypeId) -> StorageResult<Arc<Schema>>;

    /// Loads one record.
    ///
    /// # Errors
    ///
    /// Returns [`crate::StorageError::NotFound`] if it does not exist and
    /// [`crate::StorageError::IdMismatch`] if the stored id differs.
    fn get(&self, type_id: &TypeId, id: &RecordId) -> StorageResult<Record>;

    /// Lists and lazily loads every record of a type. Each call lists afresh.
    fn iterate<'a>(&'a self, type_id: &TypeId) -> StorageResult<RecordIter<'a>>;

    /// Resolves a repository path to a registered type and an id.
    ///
    /// Returns `None` for paths that are not record files.
    fn path_info(&self, path: &str) -> Option<(Arc<Schema>, RecordId)>;

    /// Returns the branch name of the primary tree.
    fn active_branch(&self) -> StorageResult<String>;

    /// Returns true if the storage exists.
    fn storage_exists(&self) -> bool;

    /// Returns the number of upstream remotes configured.
    fn remote_count(&self) -> StorageResult<usize>;

    /// Fetches and merges upstream commits, returning what changed.
    fn pull(&self, branch: &str, remote: &str) -> StorageResult<Vec<DiffEntry>>;
}
