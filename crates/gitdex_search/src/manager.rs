//! Index naming, document conversion and readiness on top of a backend.

use crate::backend::{IndexStatus, SearchBackend};
use crate::error::{SearchError, SearchResult};
use crate::query::Query;
use crate::readiness::ReadinessPolicy;
use gitdex_http::quote;
use gitdex_model::{JsonCodec, Record, RecordId, Schema, TypeId};
use serde_json::{Map, Value};
use std::collections::BTreeSet;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::Instant;
use tracing::{debug, info, warn};

/// Hits fetched per request when listing every document of a type.
pub const PAGE_SIZE: usize = 500;

/// Maps records onto indexes named `<prefix>-<label>`, where the label is
/// usually a branch name.
///
/// Each record type becomes one document type named after
/// [`TypeId::doc_type_name`]; the document id is the record id.
#[derive(Debug)]
pub struct IndexManager<B> {
    backend: B,
    prefix: String,
    codec: JsonCodec,
}

impl<B: SearchBackend> IndexManager<B> {
    /// Creates a manager for indexes starting with `prefix`.
    pub fn new(backend: B, prefix: impl Into<String>) -> Self {
        Self {
            backend,
            prefix: prefix.into(),
            codec: JsonCodec::new(),
        }
    }

    /// Returns the index prefix.
    pub fn prefix(&self) -> &str {
        &self.prefix
    }

    /// Returns the backend.
    pub fn backend(&self) -> &B {
        &self.backend
    }

    /// Returns the index name for a label. Both parts are percent-quoted,
    /// keeping `/`.
    ///
    /// ```rust
    /// use gitdex_search::{IndexManager, InMemorySearchBackend};
    ///
    /// let manager = IndexManager::new(InMemorySearchBackend::new(), "my repo");
    /// assert_eq!(manager.index_name("feature/x"), "my%20repo-feature/x");
    /// ```
    pub fn index_name(&self, label: &str) -> String {
        format!("{}-{}", quote(&self.prefix, "/"), quote(label, "/"))
    }

    // --- lifecycle ---------------------------------------------------------

    /// Returns true if the index for `label` exists.
    pub fn index_exists(&self, label: &str) -> SearchResult<bool> {
        self.backend.index_exists(&self.index_name(label))
    }

    /// Creates the index for `label`.
    pub fn create_index(&self, label: &str) -> SearchResult<()> {
        let index = self.index_name(label);
        self.backend.create_index(&index)?;
        info!(index = %index, "created index");
        Ok(())
    }

    /// Deletes the index for `label`. Returns false if there was none.
    pub fn destroy_index(&self, label: &str) -> SearchResult<bool> {
        let index = self.index_name(label);
        let removed = self.backend.delete_index(&index)?;
        if removed {
            info!(index = %index, "destroyed index");
        }
        Ok(removed)
    }

    /// Returns the shard status of the index for `label`.
    pub fn index_status(&self, label: &str) -> SearchResult<IndexStatus> {
        self.backend.index_status(&self.index_name(label))
    }

    /// Returns true once any shard of the index has started.
    pub fn index_ready(&self, label: &str) -> SearchResult<bool> {
        Ok(self.index_status(label)?.is_ready())
    }

    /// Makes recent writes to the index visible to searches.
    pub fn refresh_indices(&self, label: &str) -> SearchResult<()> {
        self.backend.refresh(&self.index_name(label))
    }

    /// Polls until the index is ready.
    ///
    /// Returns the number of polls made. Retryable errors count as "not
    /// ready yet"; others are returned at once.
    ///
    /// # Errors
    ///
    /// [`SearchError::Cancelled`] if `cancel` is set between polls, and
    /// [`SearchError::Timeout`] when the attempts or the deadline run out.
    pub fn wait_until_ready(
        &self,
        label: &str,
        policy: &ReadinessPolicy,
        cancel: &AtomicBool,
    ) -> SearchResult<u32> {
        let index = self.index_name(label);
        let started = Instant::now();
        let timeout = |attempts| SearchError::Timeout {
            index: index.clone(),
            attempts,
        };

        for attempt in 0..policy.max_attempts {
            let delay = policy.delay_for_attempt(attempt);
            if let Some(deadline) = policy.deadline {
                if started.elapsed() + delay > deadline {
                    return Err(timeout(attempt));
                }
            }
            if !delay.is_zero() {
                thread::sleep(delay);
            }
            if cancel.load(Ordering::Relaxed) {
                return Err(SearchError::Cancelled);
            }

            match self.backend.index_status(&index) {
                Ok(status) if status.is_ready() => return Ok(attempt + 1),
                Ok(_) => debug!(index = %index, attempt, "index not ready"),
                Err(e) if e.is_retryable() => {
                    debug!(index = %index, attempt, error = %e, "status poll failed")
                }
                Err(e) => return Err(e),
            }
        }
        Err(timeout(policy.max_attempts))
    }

    // --- documents ---------------------------------------------------------

    fn document(record: &Record) -> SearchResult<(RecordId, Map<String, Value>)> {
        let id = record.id().cloned().ok_or_else(|| SearchError::MissingId {
            type_id: record.type_id().clone(),
        })?;
        let mut doc = record.to_document();
        if let Some(version) = record.version() {
            doc.insert("version".into(), serde_json::to_value(version)?);
        }
        Ok((id, doc))
    }

    /// Inserts or replaces the document for a record.
    pub fn index(&self, label: &str, record: &Record, refresh: bool) -> SearchResult<()> {
        let (id, doc) = Self::document(record)?;
        let index = self.index_name(label);
        let doc_type = record.type_id().doc_type_name();
        self.backend.put_document(&index, &doc_type, id.as_str(), &doc)?;
        debug!(index = %index, doc_type = %doc_type, id = %id, "indexed");
        if refresh {
            self.backend.refresh(&index)?;
        }
        Ok(())
    }

    /// Removes the document for a record. Returns false if it was absent.
    pub fn unindex(&self, label: &str, record: &Record, refresh: bool) -> SearchResult<bool> {
        let id = record.id().ok_or_else(|| SearchError::MissingId {
            type_id: record.type_id().clone(),
        })?;
        self.raw_unindex(label, record.type_id(), id.as_str(), refresh)
    }

    /// Removes a document by type and id, without needing the record.
    pub fn raw_unindex(
        &self,
        label: &str,
        type_id: &TypeId,
        id: &str,
        refresh: bool,
    ) -> SearchResult<bool> {
        let index = self.index_name(label);
        let doc_type = type_id.doc_type_name();
        let removed = self.backend.delete_document(&index, &doc_type, id)?;
        debug!(index = %index, doc_type = %doc_type, id, removed, "unindexed");
        if refresh {
            self.backend.refresh(&index)?;
        }
        Ok(removed)
    }

    // --- mappings ----------------------------------------------------------

    /// Installs the mapping derived from a schema.
    pub fn setup_mapping(&self, label: &str, schema: &Schema) -> SearchResult<Value> {
        self.setup_custom_mapping(label, schema.type_id(), &schema.mapping())
    }

    /// Installs a caller-supplied mapping for a record type.
    pub fn setup_custom_mapping(
        &self,
        label: &str,
        type_id: &TypeId,
        mapping: &Value,
    ) -> SearchResult<Value> {
        self.backend
            .put_mapping(&self.index_name(label), &type_id.doc_type_name(), mapping)
    }

    /// Returns the installed mapping for a record type.
    pub fn get_mapping(&self, label: &str, type_id: &TypeId) -> SearchResult<Value> {
        self.backend
            .get_mapping(&self.index_name(label), &type_id.doc_type_name())
    }

    // --- queries -----------------------------------------------------------

    fn decode(&self, schema: &Arc<Schema>, id: &str, source: Map<String, Value>) -> SearchResult<Record> {
        let mut record = self.codec.decode_value(schema, Value::Object(source))?;
        if record.id().is_none() {
            record = record.with_id(RecordId::new(id)?);
        }
        Ok(record.into_read_only())
    }

    /// Fetches the indexed copy of one record.
    pub fn get(
        &self,
        label: &str,
        schema: &Arc<Schema>,
        id: &RecordId,
    ) -> SearchResult<Option<Record>> {
        let found = self.backend.get_document(
            &self.index_name(label),
            &schema.type_id().doc_type_name(),
            id.as_str(),
        )?;
        found
            .map(|source| self.decode(schema, id.as_str(), source))
            .transpose()
    }

    /// Runs a query and returns the hits as read-only records.
    pub fn search(
        &self,
        label: &str,
        schema: &Arc<Schema>,
        query: &Query,
    ) -> SearchResult<Vec<Record>> {
        let hits = self.backend.search(
            &self.index_name(label),
            &schema.type_id().doc_type_name(),
            query,
        )?;
        hits.into_iter()
            .map(|hit| self.decode(schema, &hit.id, hit.source))
            .collect()
    }

    /// Counts the documents of a type matching a query.
    pub fn count(&self, label: &str, type_id: &TypeId, query: &Query) -> SearchResult<u64> {
        self.backend
            .count(&self.index_name(label), &type_id.doc_type_name(), query)
    }

    /// Returns the ids of every indexed document of a type.
    ///
    /// Scrolls in batches of [`PAGE_SIZE`], so the listing is not bounded
    /// by the backend's result window and is taken from one snapshot.
    pub fn all_ids(&self, label: &str, type_id: &TypeId) -> SearchResult<BTreeSet<String>> {
        let index = self.index_name(label);
        let doc_type = type_id.doc_type_name();
        let mut page = self
            .backend
            .open_scroll(&index, &doc_type, &Query::all().size(PAGE_SIZE))?;
        let mut ids = BTreeSet::new();
        let listed = loop {
            if page.hits.is_empty() {
                break Ok(ids);
            }
            ids.extend(page.hits.into_iter().map(|hit| hit.id));
            match self.backend.next_scroll(&page.scroll_id) {
                Ok(next) => page = next,
                Err(e) => break Err(e),
            }
        };
        if let Err(e) = self.backend.clear_scroll(&page.scroll_id) {
            warn!(index = %index, error = %e, "could not clear scroll");
        }
        listed
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::InMemorySearchBackend;
    use gitdex_model::{FieldKind, FieldSpec, RuntimeInfo};
    use serde_json::json;
    use std::time::Duration;

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

    fn manager() -> IndexManager<InMemorySearchBackend> {
        let manager = IndexManager::new(InMemorySearchBackend::new(), "repo");
        manager.create_index("master").unwrap();
        manager
    }

    #[test]
    fn index_names_are_quoted() {
        let manager = IndexManager::new(InMemorySearchBackend::new(), "a b");
        assert_eq!(manager.index_name("master"), "a%20b-master");
        assert_eq!(manager.index_name("feature/ü"), "a%20b-feature/%C3%BC");
    }

    #[test]
    fn index_get_and_unindex() {
        let manager = manager();
        let mut record = person_record("p1", 10);
        record.set_version(RuntimeInfo::current());
        manager.index("master", &record, true).unwrap();
        assert_eq!(manager.backend().refresh_count(), 1);

        let doc = manager
            .backend()
            .get_document("repo-master", "gitdex-tests-PersonType", "p1")
            .unwrap()
            .unwrap();
        assert_eq!(doc["uuid"], "p1");
        assert_eq!(doc["version"]["package"], "gitdex");

        let found = manager
            .get("master", &person(), &RecordId::new("p1").unwrap())
            .unwrap()
            .unwrap();
        assert_eq!(found, record);
        assert!(found.is_read_only());

        assert!(manager.unindex("master", &record, false).unwrap());
        assert!(!manager
            .raw_unindex("master", person().type_id(), "p1", false)
            .unwrap());
        assert!(manager
            .get("master", &person(), &RecordId::new("p1").unwrap())
            .unwrap()
            .is_none());
    }

    #[test]
    fn records_without_ids_are_rejected() {
        let manager = manager();
        let record = Record::new(&person(), Map::new()).unwrap();
        assert!(matches!(
            manager.index("master", &record, false),
            Err(SearchError::MissingId { .. })
        ));
    }

    #[test]
    fn search_returns_read_only_records() {
        let manager = manager();
        for (id, age) in [("a", 1), ("b", 2), ("c", 3)] {
            manager.index("master", &person_record(id, age), false).unwrap();
        }
        let hits = manager
            .search("master", &person(), &Query::all().range("age", Some(json!(2)), None))
            .unwrap();
        let ids: Vec<&str> = hits.iter().map(|r| r.id().unwrap().as_str()).collect();
        assert_eq!(ids, ["b", "c"]);
        assert!(hits.iter().all(Record::is_read_only));
        assert_eq!(
            manager
                .count("master", person().type_id(), &Query::all())
                .unwrap(),
            3
        );
    }

    #[test]
    fn all_ids_pages_through_everything() {
        let manager = manager();
        for i in 0..(PAGE_SIZE + 3) {
            manager
                .index("master", &person_record(&format!("p{i:04}"), 1), false)
                .unwrap();
        }
        let ids = manager.all_ids("master", person().type_id()).unwrap();
        assert_eq!(ids.len(), PAGE_SIZE + 3);
        assert!(ids.contains("p0000"));
        assert_eq!(manager.backend().open_scrolls(), 0);
    }

    #[test]
    fn mappings_use_the_schema() {
        let manager = manager();
        manager.setup_mapping("master", &person()).unwrap();
        let mapping = manager.get_mapping("master", person().type_id()).unwrap();
        assert_eq!(mapping, person().mapping());
        assert_eq!(mapping["properties"]["uuid"]["type"], "string");

        let custom = json!({"properties": {"name": {"type": "string", "index": "not_analyzed"}}});
        manager
            .setup_custom_mapping("master", person().type_id(), &custom)
            .unwrap();
        assert_eq!(
            manager.get_mapping("master", person().type_id()).unwrap(),
            custom
        );
    }

    #[test]
    fn waits_for_the_first_started_shard() {
        let manager = IndexManager::new(InMemorySearchBackend::new().with_startup_polls(2), "repo");
        manager.create_index("master").unwrap();
        let cancel = AtomicBool::new(false);
        let polls = manager
            .wait_until_ready("master", &ReadinessPolicy::no_wait(5), &cancel)
            .unwrap();
        assert_eq!(polls, 3);
        assert!(manager.index_ready("master").unwrap());
    }

    #[test]
    fn waiting_times_out_or_cancels() {
        let manager = IndexManager::new(InMemorySearchBackend::new().with_startup_polls(10), "repo");
        manager.create_index("master").unwrap();
        let cancel = AtomicBool::new(false);
        assert!(matches!(
            manager.wait_until_ready("master", &ReadinessPolicy::no_wait(3), &cancel),
            Err(SearchError::Timeout { attempts: 3, .. })
        ));

        let policy = ReadinessPolicy::new(100)
            .with_initial_delay(Duration::from_millis(50))
            .with_deadline(Duration::from_millis(120));
        assert!(matches!(
            manager.wait_until_ready("master", &policy, &cancel),
            Err(SearchError::Timeout { .. })
        ));

        cancel.store(true, Ordering::Relaxed);
        assert!(matches!(
            manager.wait_until_ready("master", &ReadinessPolicy::no_wait(3), &cancel),
            Err(SearchError::Cancelled)
        ));
    }

    #[test]
    fn waiting_on_a_missing_index_fails_fast() {
        let manager = IndexManager::new(InMemorySearchBackend::new(), "repo");
        let cancel = AtomicBool::new(false);
        assert!(matches!(
            manager.wait_until_ready("master", &ReadinessPolicy::no_wait(3), &cancel),
            Err(SearchError::IndexNotFound { .. })
        ));
    }
}
