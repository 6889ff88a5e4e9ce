//! The workspace façade.

use crate::config::WorkspaceConfig;
use crate::error::CoreResult;
use crate::reconcile::{DiffOutcome, ReconciliationEngine, ReconciliationResult, ReindexIter};
use gitdex_model::{Record, RecordId, Schema, TypeId};
use gitdex_search::{IndexManager, Query, SearchBackend};
use gitdex_storage::{Commit, CommitOptions, DiffEntry, GitStorage, Identity};
use serde_json::Value;
use std::collections::BTreeSet;
use std::sync::atomic::AtomicBool;
use std::sync::Arc;
use tracing::{debug, info};

/// What a pull brought in and how the index was updated.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PullReport {
    /// Changes between the old and new head.
    pub diff: Vec<DiffEntry>,
    /// How the changes reached the index.
    pub outcome: DiffOutcome,
}

/// Git working trees plus the search index derived from them.
///
/// Writes commit first and index second. If indexing fails after a
/// successful commit nothing is rolled back; the next [`Workspace::sync`]
/// or pull repairs the index.
///
/// ```rust,no_run
/// use gitdex_core::{Workspace, WorkspaceConfig};
/// use gitdex_search::InMemorySearchBackend;
/// use gitdex_storage::Identity;
///
/// let workspace = Workspace::open(
///     WorkspaceConfig::new("/var/lib/gitdex/people"),
///     InMemorySearchBackend::new(),
/// )
/// .unwrap();
/// workspace.setup(&Identity::new("Jane", "jane@example.org")).unwrap();
/// assert!(workspace.exists().unwrap());
/// ```
#[derive(Debug)]
pub struct Workspace<B> {
    config: WorkspaceConfig,
    storage: GitStorage,
    index: IndexManager<B>,
}

impl<B: SearchBackend> Workspace<B> {
    /// Opens a workspace. Nothing is created until [`Workspace::setup`].
    pub fn open(config: WorkspaceConfig, backend: B) -> CoreResult<Self> {
        config.validate()?;
        let storage = GitStorage::new(config.working_trees.iter().cloned())?
            .with_default_branch(config.default_branch.clone())
            .with_runtime(config.runtime.clone());
        let index = IndexManager::new(backend, config.index_prefix.clone());
        Ok(Self {
            config,
            storage,
            index,
        })
    }

    /// Returns the configuration.
    pub fn config(&self) -> &WorkspaceConfig {
        &self.config
    }

    /// Returns the underlying storage.
    pub fn storage(&self) -> &GitStorage {
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

    /// Returns the branch labelling the index: the primary tree's branch,
    /// or the default branch before the storage exists.
    pub fn active_branch(&self) -> CoreResult<String> {
        if self.storage.storage_exists() {
            Ok(self.storage.active_branch()?)
        } else {
            Ok(self.config.default_branch.clone())
        }
    }

    fn engine(&self) -> CoreResult<ReconciliationEngine<'_, GitStorage, B>> {
        Ok(
            ReconciliationEngine::new(&self.storage, &self.index, self.active_branch()?)
                .with_refresh(self.config.refresh_after_reindex),
        )
    }

    // --- lifecycle ---------------------------------------------------------

    /// Creates whatever is missing: the repositories, the identity in
    /// their local config, and the index for the current branch.
    pub fn setup(&self, identity: &Identity) -> CoreResult<()> {
        if !self.storage.storage_exists() {
            self.storage.create_storage()?;
        }
        self.storage.write_config(
            "user",
            &[("name", identity.name.as_str()), ("email", identity.email.as_str())],
            None,
        )?;
        let branch = self.active_branch()?;
        if !self.index.index_exists(&branch)? {
            self.index.create_index(&branch)?;
        }
        info!(identity = %identity, branch = %branch, "workspace ready");
        Ok(())
    }

    /// Returns true if both the repositories and the index exist.
    pub fn exists(&self) -> CoreResult<bool> {
        if !self.storage.storage_exists() {
            return Ok(false);
        }
        Ok(self.index.index_exists(&self.active_branch()?)?)
    }

    /// Removes the index, then the working trees. Either may already be
    /// gone.
    pub fn destroy(&self) -> CoreResult<()> {
        let branch = self.active_branch()?;
        self.index.destroy_index(&branch)?;
        self.storage.destroy_storage()?;
        Ok(())
    }

    // --- writes ------------------------------------------------------------

    /// Commits a record and indexes it.
    pub fn save(&self, record: &mut Record, message: &str) -> CoreResult<Commit> {
        self.save_with(record, message, &CommitOptions::new())
    }

    /// Commits a record with explicit author, committer or tree, and
    /// indexes it.
    pub fn save_with(
        &self,
        record: &mut Record,
        message: &str,
        opts: &CommitOptions,
    ) -> CoreResult<Commit> {
        let commit = self.storage.store(record, message, opts)?;
        self.index.index(&self.active_branch()?, record, false)?;
        debug!(commit = commit.short_id(), "saved");
        Ok(commit)
    }

    /// Commits the removal of a record and unindexes it.
    pub fn delete(&self, record: &Record, message: &str) -> CoreResult<Commit> {
        self.delete_with(record, message, &CommitOptions::new())
    }

    /// As [`Workspace::delete`] with explicit commit options.
    pub fn delete_with(
        &self,
        record: &Record,
        message: &str,
        opts: &CommitOptions,
    ) -> CoreResult<Commit> {
        let commit = self.storage.delete(record, message, opts)?;
        self.index.unindex(&self.active_branch()?, record, false)?;
        debug!(commit = commit.short_id(), "deleted");
        Ok(commit)
    }

    // --- reads -------------------------------------------------------------

    /// Loads a record from the store.
    pub fn get(&self, type_id: &TypeId, id: &RecordId) -> CoreResult<Record> {
        Ok(self.storage.get(type_id, id)?)
    }

    /// Queries the index. The records returned are read-only.
    pub fn search(&self, type_id: &TypeId, query: &Query) -> CoreResult<Vec<Record>> {
        let schema = self.storage.schema(type_id)?;
        Ok(self.index.search(&self.active_branch()?, &schema, query)?)
    }

    /// Counts indexed documents of a type matching a query.
    pub fn count(&self, type_id: &TypeId, query: &Query) -> CoreResult<u64> {
        Ok(self.index.count(&self.active_branch()?, type_id, query)?)
    }

    // --- reconciliation ----------------------------------------------------

    /// Fetches and merges `remote/branch`, then brings the index up to date
    /// with what changed.
    pub fn pull(&self, branch: &str, remote: &str) -> CoreResult<PullReport> {
        let diff = self.storage.pull_from(branch, remote, None)?;
        let outcome = self.engine()?.apply_diff(&diff)?;
        Ok(PullReport { diff, outcome })
    }

    /// Pulls the configured default branch from the default remote.
    pub fn pull_default(&self) -> CoreResult<PullReport> {
        self.pull(&self.config.default_branch, &self.config.default_remote)
    }

    /// Lazily indexes every record of a type.
    pub fn reindex_iter(&self, type_id: &TypeId) -> CoreResult<ReindexIter<'_, B>> {
        self.engine()?.reindex_iter(type_id)
    }

    /// Indexes every record of a type and returns their ids.
    pub fn reindex(&self, type_id: &TypeId) -> CoreResult<BTreeSet<RecordId>> {
        self.engine()?.reindex(type_id)
    }

    /// Makes the index match the store for one type.
    pub fn sync(&self, type_id: &TypeId) -> CoreResult<ReconciliationResult> {
        self.engine()?.sync(type_id)
    }

    // --- index -------------------------------------------------------------

    /// Makes recent index writes visible to searches.
    pub fn refresh_index(&self) -> CoreResult<()> {
        Ok(self.index.refresh_indices(&self.active_branch()?)?)
    }

    /// Returns true once any shard of the index has started.
    pub fn index_ready(&self) -> CoreResult<bool> {
        Ok(self.index.index_ready(&self.active_branch()?)?)
    }

    /// Polls the index under the configured readiness policy.
    pub fn wait_until_ready(&self, cancel: &AtomicBool) -> CoreResult<u32> {
        Ok(self
            .index
            .wait_until_ready(&self.active_branch()?, &self.config.readiness, cancel)?)
    }

    /// Installs the mapping derived from a type's schema.
    pub fn setup_mapping(&self, type_id: &TypeId) -> CoreResult<Value> {
        let schema = self.storage.schema(type_id)?;
        Ok(self.index.setup_mapping(&self.active_branch()?, &schema)?)
    }

    /// Installs a hand-written mapping for a type.
    pub fn setup_custom_mapping(&self, type_id: &TypeId, mapping: &Value) -> CoreResult<Value> {
        Ok(self
            .index
            .setup_custom_mapping(&self.active_branch()?, type_id, mapping)?)
    }

    /// Returns the installed mapping for a type.
    pub fn get_mapping(&self, type_id: &TypeId) -> CoreResult<Value> {
        Ok(self.index.get_mapping(&self.active_branch()?, type_id)?)
    }

    // --- remotes -----------------------------------------------------------

    /// Adds a remote to the only tree, or to the named one.
    pub fn add_remote(&self, name: &str, url: &str, repo_name: Option<&str>) -> CoreResult<()> {
        Ok(self.storage.add_remote(name, url, repo_name)?)
    }
}
