//! A read-only workspace over a published mirror.

use crate::error::CoreResult;
use crate::reconcile::{ReconciliationEngine, ReconciliationResult};
use gitdex_http::HttpClient;
use gitdex_model::{Record, RecordId, Schema, TypeId};
use gitdex_search::{IndexManager, Query, SearchBackend};
use gitdex_storage::{Commit, CommitOptions, RemoteStorage};
use serde_json::Value;
use std::collections::BTreeSet;
use std::sync::Arc;
use tracing::warn;

/// Reads records from a [`RemoteStorage`] mirror and indexes them locally.
///
/// Saving and deleting fail with
/// [`gitdex_storage::StorageError::ReadOnlyBackend`].
pub struct RemoteWorkspace<C: HttpClient, B> {
    storage: RemoteStorage<C>,
    index: IndexManager<B>,
}

impl<C: HttpClient, B: SearchBackend> RemoteWorkspace<C, B> {
    /// Creates a workspace; the index prefix defaults to the mirror's
    /// repository name.
    pub fn new(storage: RemoteStorage<C>, backend: B, index_prefix: Option<&str>) -> Self {
        let prefix = index_prefix.unwrap_or(storage.repo_name()).to_string();
        Self {
            index: IndexManager::new(backend, prefix),
            storage,
        }
    }

    /// Returns the mirror.
    pub fn storage(&self) -> &RemoteStorage<C> {
        &self.storage
    }

    /// Returns the index manager.
    pub fn index(&self) -> &IndexManager<B> {
        &self.index
    }

    /// Registers a record type.
    pub fn register(&mut self, schema: Arc<Schema>) -> Option<Arc<Schema>> {
        self.storage.register(schema)
    }

    fn branch(&self) -> CoreResult<String> {
        Ok(self.storage.active_branch()?)
    }

    fn engine(&self) -> CoreResult<ReconciliationEngine<'_, RemoteStorage<C>, B>> {
        Ok(ReconciliationEngine::new(&self.storage, &self.index, self.branch()?))
    }

    /// Creates the index for the mirror's branch if it is missing.
    pub fn setup(&self) -> CoreResult<()> {
        let branch = self.branch()?;
        if !self.index.index_exists(&branch)? {
            self.index.create_index(&branch)?;
        }
        Ok(())
    }

    /// Returns true if the mirror answers and the index exists.
    pub fn exists(&self) -> CoreResult<bool> {
        if !self.storage.storage_exists() {
            return Ok(false);
        }
        Ok(self.index.index_exists(&self.branch()?)?)
    }

    /// Removes the local index. The mirror is left alone.
    pub fn destroy(&self) -> CoreResult<()> {
        self.index.destroy_index(&self.branch()?)?;
        Ok(())
    }

    /// Always fails: the mirror is read only.
    pub fn save(&self, record: &mut Record, message: &str) -> CoreResult<Commit> {
        Ok(self.storage.store(record, message, &CommitOptions::new())?)
    }

    /// Always fails: the mirror is read only.
    pub fn delete(&self, record: &Record, message: &str) -> CoreResult<Commit> {
        Ok(self.storage.delete(record, message, &CommitOptions::new())?)
    }

    /// Loads a record from the mirror.
    pub fn get(&self, type_id: &TypeId, id: &RecordId) -> CoreResult<Record> {
        Ok(self.storage.get(type_id, id)?)
    }

    /// Queries the local index.
    pub fn search(&self, type_id: &TypeId, query: &Query) -> CoreResult<Vec<Record>> {
        let schema = self.storage.schema(type_id)?;
        Ok(self.index.search(&self.branch()?, &schema, query)?)
    }

    /// Asks the mirror to pull. The mirror reports no diff, so the index
    /// is left as it is; follow up with [`RemoteWorkspace::sync`].
    pub fn pull(&self, branch: &str, remote: &str) -> CoreResult<Value> {
        warn!(branch, remote, "pulling without updating the index");
        Ok(self.storage.pull_remote(branch, remote)?)
    }

    /// Indexes every record the mirror serves for a type.
    pub fn reindex(&self, type_id: &TypeId) -> CoreResult<BTreeSet<RecordId>> {
        self.engine()?.reindex(type_id)
    }

    /// Makes the local index match the mirror for one type.
    pub fn sync(&self, type_id: &TypeId) -> CoreResult<ReconciliationResult> {
        self.engine()?.sync(type_id)
    }

    /// Makes recent index writes visible to searches.
    pub fn refresh_index(&self) -> CoreResult<()> {
        Ok(self.index.refresh_indices(&self.branch()?)?)
    }

    /// Returns true once any shard of the index has started.
    pub fn index_ready(&self) -> CoreResult<bool> {
        Ok(self.index.index_ready(&self.branch()?)?)
    }

    /// Installs the mapping derived from a type's schema.
    pub fn setup_mapping(&self, type_id: &TypeId) -> CoreResult<Value> {
        let schema = self.storage.schema(type_id)?;
        Ok(self.index.setup_mapping(&self.branch()?, &schema)?)
    }

    /// Returns the installed mapping for a type.
    pub fn get_mapping(&self, type_id: &TypeId) -> CoreResult<Value> {
        Ok(self.index.get_mapping(&self.branch()?, type_id)?)
    }
}
