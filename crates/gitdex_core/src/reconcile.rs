//! Keeping the search index in step with the record store.
//!
//! Two paths exist. [`ReconciliationEngine::apply_diff`] turns the diff of
//! a pull into targeted index writes. [`ReconciliationEngine::sync`]
//! treats the store as ground truth: it reindexes every record of a type
//! and then prunes documents that have no backing record.

use crate::error::{CoreError, CoreResult};
use gitdex_model::{Record, RecordId, TypeId};
use gitdex_search::{IndexManager, SearchBackend};
use gitdex_storage::{DiffEntry, RecordIter, RecordStore};
use std::collections::BTreeSet;
use std::fmt;
use tracing::{debug, info, warn};

/// Outcome of a full reconciliation of one type.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReconciliationResult {
    /// The reconciled type.
    pub type_id: TypeId,
    /// Ids of every record written to the index.
    pub reindexed: BTreeSet<RecordId>,
    /// Ids of documents removed because no record backs them.
    pub removed: BTreeSet<RecordId>,
}

impl ReconciliationResult {
    /// Returns a one-line report such as `"Person: 3 updated, 1 removed."`.
    pub fn summary(&self) -> String {
        format!(
            "{}: {} updated, {} removed.",
            self.type_id.name(),
            self.reindexed.len(),
            self.removed.len()
        )
    }

    /// Returns true if the index had drifted from the store.
    pub fn found_drift(&self) -> bool {
        !self.removed.is_empty()
    }
}

/// Why a diff was not applied entry by entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FallbackReason {
    /// More than one remote is configured, so deletions cannot be trusted.
    MultipleRemotes,
    /// The diff contains renames.
    Renames,
}

impl fmt::Display for FallbackReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FallbackReason::MultipleRemotes => f.write_str("multiple remotes"),
            FallbackReason::Renames => f.write_str("renames"),
        }
    }
}

/// How a pull diff was applied to the index.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DiffOutcome {
    /// Each entry became one index write.
    Incremental {
        /// Records (re)indexed for added or modified files.
        indexed: BTreeSet<RecordId>,
        /// Documents removed for deleted files.
        unindexed: BTreeSet<RecordId>,
        /// Entries whose paths are not record files.
        skipped: usize,
    },
    /// Every touched type was fully reconciled instead.
    Reconciled {
        /// Why the diff was not applied entry by entry.
        reason: FallbackReason,
        /// One result per touched type.
        results: Vec<ReconciliationResult>,
    },
}

impl DiffOutcome {
    fn unchanged() -> Self {
        DiffOutcome::Incremental {
            indexed: BTreeSet::new(),
            unindexed: BTreeSet::new(),
            skipped: 0,
        }
    }
}

/// Applies store changes to the index labelled with one branch.
pub struct ReconciliationEngine<'a, S: ?Sized, B> {
    store: &'a S,
    index: &'a IndexManager<B>,
    label: String,
    refresh: bool,
}

impl<'a, S, B> ReconciliationEngine<'a, S, B>
where
    S: RecordStore + ?Sized,
    B: SearchBackend,
{
    /// Creates an engine writing to the index for `label`. Bulk operations
    /// refresh the index when done.
    pub fn new(store: &'a S, index: &'a IndexManager<B>, label: impl Into<String>) -> Self {
        Self {
            store,
            index,
            label: label.into(),
            refresh: true,
        }
    }

    /// Sets whether bulk operations refresh the index when done.
    #[must_use]
    pub fn with_refresh(mut self, refresh: bool) -> Self {
        self.refresh = refresh;
        self
    }

    /// Returns the index label.
    pub fn label(&self) -> &str {
        &self.label
    }

    fn ensure_index(&self) -> CoreResult<()> {
        if !self.index.index_exists(&self.label)? {
            self.index.create_index(&self.label)?;
        }
        Ok(())
    }

    fn fallback_reason(&self, diff: &[DiffEntry]) -> CoreResult<Option<FallbackReason>> {
        if self.store.remote_count()? > 1 {
            return Ok(Some(FallbackReason::MultipleRemotes));
        }
        if diff.iter().any(DiffEntry::is_rename) {
            return Ok(Some(FallbackReason::Renames));
        }
        Ok(None)
    }

    /// Returns the registered types any diff path belongs to.
    fn touched_types(&self, diff: &[DiffEntry]) -> BTreeSet<TypeId> {
        diff.iter()
            .flat_map(DiffEntry::paths)
            .filter_map(|path| self.store.path_info(path))
            .map(|(schema, _)| schema.type_id().clone())
            .collect()
    }

    /// Applies a pull diff to the index.
    ///
    /// With more than one remote configured, or when the diff holds a
    /// rename, every type the diff touches is fully reconciled instead.
    /// Paths that are not record files are skipped.
    pub fn apply_diff(&self, diff: &[DiffEntry]) -> CoreResult<DiffOutcome> {
        if diff.is_empty() {
            return Ok(DiffOutcome::unchanged());
        }
        self.ensure_index()?;

        if let Some(reason) = self.fallback_reason(diff)? {
            let types = self.touched_types(diff);
            info!(%reason, types = types.len(), "reconciling touched types");
            let results = types
                .iter()
                .map(|type_id| self.sync(type_id))
                .collect::<CoreResult<Vec<_>>>()?;
            return Ok(DiffOutcome::Reconciled { reason, results });
        }

        let mut indexed = BTreeSet::new();
        let mut unindexed = BTreeSet::new();
        let mut skipped = 0;
        for entry in diff {
            let (path, deleted) = match entry {
                DiffEntry::Deleted { path } => (path, true),
                DiffEntry::Added { path } | DiffEntry::Modified { path } => (path, false),
                // Renames always take the fallback above.
                DiffEntry::Renamed { .. } => continue,
            };
            let Some((schema, id)) = self.store.path_info(path) else {
                debug!(path = %path, "skipping non-record path");
                skipped += 1;
                continue;
            };
            if deleted {
                self.index
                    .raw_unindex(&self.label, schema.type_id(), id.as_str(), false)?;
                unindexed.insert(id);
            } else {
                let record = self.store.get(schema.type_id(), &id)?;
                self.index.index(&self.label, &record, false)?;
                indexed.insert(id);
            }
        }

        if self.refresh && (!indexed.is_empty() || !unindexed.is_empty()) {
            self.index.refresh_indices(&self.label)?;
        }
        info!(
            indexed = indexed.len(),
            unindexed = unindexed.len(),
            skipped,
            "applied diff"
        );
        Ok(DiffOutcome::Incremental {
            indexed,
            unindexed,
            skipped,
        })
    }

    /// Indexes every stored record of a type as the iterator advances,
    /// creating the index first if needed.
    pub fn reindex_iter(&self, type_id: &TypeId) -> CoreResult<ReindexIter<'a, B>> {
        self.ensure_index()?;
        let store: &'a S = self.store;
        Ok(ReindexIter {
            records: store.iterate(type_id)?,
            index: self.index,
            label: self.label.clone(),
            refresh: self.refresh,
            finished: false,
        })
    }

    /// Indexes every stored record of a type and returns their ids.
    pub fn reindex(&self, type_id: &TypeId) -> CoreResult<BTreeSet<RecordId>> {
        let mut ids = BTreeSet::new();
        for record in self.reindex_iter(type_id)? {
            if let Some(id) = record?.id() {
                ids.insert(id.clone());
            }
        }
        Ok(ids)
    }

    /// Reindexes a type, then removes every document of that type whose id
    /// was not reindexed.
    ///
    /// Running it twice without writes in between removes nothing the
    /// second time.
    pub fn sync(&self, type_id: &TypeId) -> CoreResult<ReconciliationResult> {
        let reindexed = self.reindex(type_id)?;
        let known: BTreeSet<&str> = reindexed.iter().map(RecordId::as_str).collect();

        let mut removed = BTreeSet::new();
        for id in self.index.all_ids(&self.label, type_id)? {
            if known.contains(id.as_str()) {
                continue;
            }
            self.index.raw_unindex(&self.label, type_id, &id, false)?;
            match RecordId::new(id.as_str()) {
                Ok(id) => {
                    removed.insert(id);
                }
                Err(_) => warn!(type_id = %type_id, id = %id, "removed document with a malformed id"),
            }
        }
        if self.refresh && !removed.is_empty() {
            self.index.refresh_indices(&self.label)?;
        }

        let result = ReconciliationResult {
            type_id: type_id.clone(),
            reindexed,
            removed,
        };
        if result.found_drift() {
            warn!(summary = %result.summary(), "index had drifted from the store");
        } else {
            info!(summary = %result.summary(), "synced");
        }
        Ok(result)
    }
}

/// Lazy reindexing, returned by [`ReconciliationEngine::reindex_iter`].
///
/// Yields each record after it has been indexed. When the records run out
/// the index is refreshed if the engine was configured to.
pub struct ReindexIter<'a, B> {
    records: RecordIter<'a>,
    index: &'a IndexManager<B>,
    label: String,
    refresh: bool,
    finished: bool,
}

impl<B: SearchBackend> Iterator for ReindexIter<'_, B> {
    type Item = CoreResult<Record>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.finished {
            return None;
        }
        match self.records.next() {
            Some(Ok(record)) => Some(
                self.index
                    .index(&self.label, &record, false)
                    .map(|()| record)
                    .map_err(CoreError::from),
            ),
            Some(Err(e)) => Some(Err(e.into())),
            None => {
                self.finished = true;
                if self.refresh {
                    self.index.refresh_indices(&self.label).err().map(|e| Err(e.into()))
                } else {
                    None
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use gitdex_model::{FieldKind, FieldSpec, Schema, SchemaRegistry};
    use gitdex_search::InMemorySearchBackend;
    use gitdex_storage::{PathScheme, StorageError, StorageResult};
    use serde_json::json;
    use std::collections::BTreeMap;
    use std::sync::Arc;

    /// A record store held in memory, for exercising the engine without git.
    struct MemoryStore {
        registry: SchemaRegistry,
        scheme: PathScheme,
        records: BTreeMap<String, Record>,
        remotes: usize,
    }

    impl MemoryStore {
        fn new(remotes: usize) -> Self {
            let mut registry = SchemaRegistry::new();
            registry.register(person());
            Self {
                registry,
                scheme: PathScheme::default(),
                records: BTreeMap::new(),
                remotes,
            }
        }

        fn put(&mut self, id: &str, age: i64) -> String {
            let record = person_record(id, age);
            let path = self.scheme.path_for(record.type_id(), record.id().unwrap());
            self.records.insert(path.clone(), record);
            path
        }

        fn remove(&mut self, id: &str) -> String {
            let path = self
                .scheme
                .path_for(person().type_id(), &RecordId::new(id).unwrap());
            self.records.remove(&path);
            path
        }
    }

    impl RecordStore for MemoryStore {
        fn schema(&self, type_id: &TypeId) -> StorageResult<Arc<Schema>> {
            self.registry
                .get(type_id)
                .cloned()
                .ok_or_else(|| StorageError::UnregisteredType {
                    type_id: type_id.clone(),
                })
        }

        fn get(&self, type_id: &TypeId, id: &RecordId) -> StorageResult<Record> {
            let path = self.scheme.path_for(type_id, id);
            self.records
                .get(&path)
                .cloned()
                .ok_or_else(|| StorageError::not_found(path))
        }

        fn iterate<'a>(&'a self, type_id: &TypeId) -> StorageResult<RecordIter<'a>> {
            let type_id = type_id.clone();
            Ok(Box::new(
                self.records
                    .values()
                    .filter(move |r| *r.type_id() == type_id)
                    .cloned()
                    .map(Ok),
            ))
        }

        fn path_info(&self, path: &str) -> Option<(Arc<Schema>, RecordId)> {
            let (type_id, id) = self.scheme.parse(path)?;
            Some((self.registry.get(&type_id)?.clone(), id))
        }

        fn active_branch(&self) -> StorageResult<String> {
            Ok("master".into())
        }

        fn storage_exists(&self) -> bool {
            true
        }

        fn remote_count(&self) -> StorageResult<usize> {
            Ok(self.remotes)
        }

        fn pull(&self, _branch: &str, _remote: &str) -> StorageResult<Vec<DiffEntry>> {
            Ok(Vec::new())
        }
    }

    fn person() -> Arc<Schema> {
        Schema::shared(
            TypeId::new("gitdex.tests", "Person").unwrap(),
            vec![
                FieldSpec::new("age", FieldKind::Integer),
                FieldSpec::new("name", FieldKind::Text),
            ],
        )
        .unwrap()
    }

    fn person_record(id: &str, age: i64) -> Record {
        let values = json!({"age": age, "name": id}).as_object().cloned().unwrap();
        Record::new(&person(), values)
            .unwrap()
            .with_id(RecordId::new(id).unwrap())
    }

    fn ids(items: &[&str]) -> BTreeSet<RecordId> {
        items.iter().map(|id| RecordId::new(*id).unwrap()).collect()
    }

    fn indexed_ids(index: &IndexManager<InMemorySearchBackend>) -> BTreeSet<String> {
        index.all_ids("master", person().type_id()).unwrap()
    }

    #[test]
    fn sync_reindexes_and_prunes() {
        let mut store = MemoryStore::new(0);
        store.put("p1", 1);
        let index = IndexManager::new(InMemorySearchBackend::new(), "repo");
        index.index("master", &person_record("stray", 9), false).unwrap();

        let engine = ReconciliationEngine::new(&store, &index, "master");
        let result = engine.sync(person().type_id()).unwrap();
        assert_eq!(result.reindexed, ids(&["p1"]));
        assert_eq!(result.removed, ids(&["stray"]));
        assert_eq!(result.summary(), "Person: 1 updated, 1 removed.");

        let again = engine.sync(person().type_id()).unwrap();
        assert_eq!(again.reindexed, ids(&["p1"]));
        assert!(again.removed.is_empty());
        assert!(!again.found_drift());
    }

    #[test]
    fn incremental_diff_touches_only_listed_records() {
        let mut store = MemoryStore::new(1);
        let p1 = store.put("p1", 1);
        let p2 = store.put("p2", 2);
        let index = IndexManager::new(InMemorySearchBackend::new(), "repo");
        index.index("master", &person_record("gone", 3), false).unwrap();
        let gone = store.remove("gone");

        let engine = ReconciliationEngine::new(&store, &index, "master");
        let diff = [
            DiffEntry::Added { path: p1 },
            DiffEntry::Modified { path: p2 },
            DiffEntry::Deleted { path: gone },
            DiffEntry::Added {
                path: "README.md".into(),
            },
        ];
        let outcome = engine.apply_diff(&diff).unwrap();
        assert_eq!(
            outcome,
            DiffOutcome::Incremental {
                indexed: ids(&["p1", "p2"]),
                unindexed: ids(&["gone"]),
                skipped: 1,
            }
        );
        let expected: BTreeSet<String> = ["p1", "p2"].map(String::from).into();
        assert_eq!(indexed_ids(&index), expected);
        assert_eq!(index.backend().refresh_count(), 1);
    }

    #[test]
    fn multiple_remotes_fall_back_to_reconciliation() {
        let mut store = MemoryStore::new(2);
        let p1 = store.put("p1", 1);
        store.put("p2", 2);
        let index = IndexManager::new(InMemorySearchBackend::new(), "repo");
        index.index("master", &person_record("stale", 3), false).unwrap();

        let engine = ReconciliationEngine::new(&store, &index, "master");
        let outcome = engine.apply_diff(&[DiffEntry::Added { path: p1 }]).unwrap();
        let DiffOutcome::Reconciled { reason, results } = outcome else {
            panic!("expected reconciliation, got {outcome:?}");
        };
        assert_eq!(reason, FallbackReason::MultipleRemotes);
        assert_eq!(results.len(), 1);
        assert_eq!(results[0].reindexed, ids(&["p1", "p2"]));
        assert_eq!(results[0].removed, ids(&["stale"]));
    }

    #[test]
    fn renames_fall_back_to_reconciliation() {
        let mut store = MemoryStore::new(0);
        let p1 = store.put("p1", 1);
        let index = IndexManager::new(InMemorySearchBackend::new(), "repo");

        let engine = ReconciliationEngine::new(&store, &index, "master");
        let outcome = engine
            .apply_diff(&[DiffEntry::Renamed {
                from: "old/p1.json".into(),
                to: p1,
            }])
            .unwrap();
        assert!(matches!(
            outcome,
            DiffOutcome::Reconciled {
                reason: FallbackReason::Renames,
                ..
            }
        ));
        assert_eq!(indexed_ids(&index).len(), 1);
    }

    #[test]
    fn empty_diff_changes_nothing() {
        let store = MemoryStore::new(3);
        let index = IndexManager::new(InMemorySearchBackend::new(), "repo");
        let engine = ReconciliationEngine::new(&store, &index, "master");
        assert_eq!(engine.apply_diff(&[]).unwrap(), DiffOutcome::unchanged());
        assert!(!index.index_exists("master").unwrap());
    }

    #[test]
    fn reindex_iter_is_lazy_and_refreshes_at_the_end() {
        let mut store = MemoryStore::new(0);
        store.put("p1", 1);
        store.put("p2", 2);
        let index = IndexManager::new(InMemorySearchBackend::new(), "repo");
        let engine = ReconciliationEngine::new(&store, &index, "master");

        let mut iter = engine.reindex_iter(person().type_id()).unwrap();
        assert!(index.index_exists("master").unwrap());
        assert!(indexed_ids(&index).is_empty());

        assert!(iter.next().unwrap().is_ok());
        assert_eq!(indexed_ids(&index).len(), 1);
        assert_eq!(index.backend().refresh_count(), 0);

        assert!(iter.next().unwrap().is_ok());
        assert!(iter.next().is_none());
        assert_eq!(index.backend().refresh_count(), 1);
        assert!(iter.next().is_none());
        assert_eq!(index.backend().refresh_count(), 1);
    }

    #[test]
    fn refresh_can_be_disabled() {
        let mut store = MemoryStore::new(0);
        store.put("p1", 1);
        let index = IndexManager::new(InMemorySearchBackend::new(), "repo");
        let engine = ReconciliationEngine::new(&store, &index, "master").with_refresh(false);
        assert_eq!(engine.reindex(person().type_id()).unwrap(), ids(&["p1"]));
        assert_eq!(index.backend().refresh_count(), 0);
    }
}
