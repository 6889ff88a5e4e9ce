//! In-memory search backend for testing.

use crate::backend::{Hit, IndexStatus, ScrollPage, SearchBackend, ShardState};
use crate::error::{SearchError, SearchResult};
use crate::query::Query;
use parking_lot::{Mutex, RwLock};
use serde_json::{json, Map, Value};
use std::collections::{BTreeMap, HashMap, VecDeque};
use std::sync::atomic::{AtomicU64, Ordering};

#[derive(Debug, Default)]
struct MemoryIndex {
    /// Document type to id to body.
    documents: BTreeMap<String, BTreeMap<String, Map<String, Value>>>,
    mappings: BTreeMap<String, Value>,
    /// Status polls left before the single shard reports `STARTED`.
    pending_polls: u32,
}

/// Hits of an open scroll not handed out yet.
#[derive(Debug)]
struct MemoryScroll {
    remaining: VecDeque<Hit>,
    batch: usize,
}

impl MemoryScroll {
    fn page(&mut self, scroll_id: &str) -> ScrollPage {
        let take = self.batch.min(self.remaining.len());
        ScrollPage {
            hits: self.remaining.drain(..take).collect(),
            scroll_id: scroll_id.to_string(),
        }
    }
}

/// A search backend that keeps every index in memory.
///
/// Writes are searchable immediately. Documents put into a missing index
/// create it, as Elasticsearch does.
///
/// ```rust
/// use gitdex_search::{InMemorySearchBackend, SearchBackend};
///
/// let backend = InMemorySearchBackend::new().with_startup_polls(1);
/// backend.create_index("idx").unwrap();
/// assert!(!backend.index_status("idx").unwrap().is_ready());
/// assert!(backend.index_status("idx").unwrap().is_ready());
/// ```
#[derive(Debug, Default)]
pub struct InMemorySearchBackend {
    indices: RwLock<HashMap<String, MemoryIndex>>,
    startup_polls: u32,
    refreshes: AtomicU64,
    scrolls: Mutex<HashMap<String, MemoryScroll>>,
    next_scroll: AtomicU64,
}

impl InMemorySearchBackend {
    /// Creates an empty backend whose indexes are ready immediately.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Makes new indexes report an initializing shard for the first
    /// `polls` status requests.
    #[must_use]
    pub fn with_startup_polls(mut self, polls: u32) -> Self {
        self.startup_polls = polls;
        self
    }

    /// Returns how many refreshes were requested.
    pub fn refresh_count(&self) -> u64 {
        self.refreshes.load(Ordering::Relaxed)
    }

    /// Returns how many scrolls are open.
    pub fn open_scrolls(&self) -> usize {
        self.scrolls.lock().len()
    }

    /// Returns the names of all indexes, sorted.
    pub fn index_names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.indices.read().keys().cloned().collect();
        names.sort();
        names
    }

    /// Returns the number of documents of one type in an index.
    pub fn document_count(&self, index: &str, doc_type: &str) -> usize {
        self.indices
            .read()
            .get(index)
            .and_then(|idx| idx.documents.get(doc_type))
            .map_or(0, BTreeMap::len)
    }

    fn not_found(index: &str) -> SearchError {
        SearchError::IndexNotFound {
            index: index.to_string(),
        }
    }

    fn matching(&self, index: &str, doc_type: &str, query: &Query) -> SearchResult<Vec<Hit>> {
        let indices = self.indices.read();
        let idx = indices.get(index).ok_or_else(|| Self::not_found(index))?;
        let mut hits: Vec<Hit> = idx
            .documents
            .get(doc_type)
            .into_iter()
            .flatten()
            .filter(|(_, source)| query.matches(source))
            .map(|(id, source)| Hit {
                id: id.clone(),
                source: source.clone(),
            })
            .collect();
        query.sort_documents(&mut hits, |hit| &hit.source);
        Ok(hits)
    }
}

impl SearchBackend for InMemorySearchBackend {
    fn index_exists(&self, index: &str) -> SearchResult<bool> {
        Ok(self.indices.read().contains_key(index))
    }

    fn create_index(&self, index: &str) -> SearchResult<()> {
        let mut indices = self.indices.write();
        if indices.contains_key(index) {
            return Err(SearchError::IndexExists {
                index: index.to_string(),
            });
        }
        indices.insert(
            index.to_string(),
            MemoryIndex {
                pending_polls: self.startup_polls,
                ..MemoryIndex::default()
            },
        );
        Ok(())
    }

    fn delete_index(&self, index: &str) -> SearchResult<bool> {
        Ok(self.indices.write().remove(index).is_some())
    }

    fn index_status(&self, index: &str) -> SearchResult<IndexStatus> {
        let mut indices = self.indices.write();
        let idx = indices.get_mut(index).ok_or_else(|| Self::not_found(index))?;
        let state = if idx.pending_polls > 0 {
            idx.pending_polls -= 1;
            ShardState::Initializing
        } else {
            ShardState::Started
        };
        let mut status = IndexStatus::default();
        status.shards.insert(0, vec![state]);
        Ok(status)
    }

    fn refresh(&self, index: &str) -> SearchResult<()> {
        if !self.indices.read().contains_key(index) {
            return Err(Self::not_found(index));
        }
        self.refreshes.fetch_add(1, Ordering::Relaxed);
        Ok(())
    }

    fn put_document(
        &self,
        index: &str,
        doc_type: &str,
        id: &str,
        source: &Map<String, Value>,
    ) -> SearchResult<()> {
        self.indices
            .write()
            .entry(index.to_string())
            .or_default()
            .documents
            .entry(doc_type.to_string())
            .or_default()
            .insert(id.to_string(), source.clone());
        Ok(())
    }

    fn delete_document(&self, index: &str, doc_type: &str, id: &str) -> SearchResult<bool> {
        let mut indices = self.indices.write();
        Ok(indices
            .get_mut(index)
            .and_then(|idx| idx.documents.get_mut(doc_type))
            .and_then(|docs| docs.remove(id))
            .is_some())
    }

    fn get_document(
        &self,
        index: &str,
        doc_type: &str,
        id: &str,
    ) -> SearchResult<Option<Map<String, Value>>> {
        let indices = self.indices.read();
        let idx = indices.get(index).ok_or_else(|| Self::not_found(index))?;
        Ok(idx
            .documents
            .get(doc_type)
            .and_then(|docs| docs.get(id))
            .cloned())
    }

    fn search(&self, index: &str, doc_type: &str, query: &Query) -> SearchResult<Vec<Hit>> {
        Ok(self
            .matching(index, doc_type, query)?
            .into_iter()
            .skip(query.offset())
            .take(query.limit())
            .collect())
    }

    fn count(&self, index: &str, doc_type: &str, query: &Query) -> SearchResult<u64> {
        Ok(self.matching(index, doc_type, query)?.len() as u64)
    }

    fn open_scroll(&self, index: &str, doc_type: &str, query: &Query) -> SearchResult<ScrollPage> {
        let mut scroll = MemoryScroll {
            remaining: self.matching(index, doc_type, query)?.into(),
            batch: query.limit().max(1),
        };
        let scroll_id = format!("scroll-{}", self.next_scroll.fetch_add(1, Ordering::Relaxed));
        let page = scroll.page(&scroll_id);
        self.scrolls.lock().insert(scroll_id, scroll);
        Ok(page)
    }

    fn next_scroll(&self, scroll_id: &str) -> SearchResult<ScrollPage> {
        let mut scrolls = self.scrolls.lock();
        let scroll = scrolls
            .get_mut(scroll_id)
            .ok_or_else(|| SearchError::ScrollExpired {
                scroll_id: scroll_id.to_string(),
            })?;
        Ok(scroll.page(scroll_id))
    }

    fn clear_scroll(&self, scroll_id: &str) -> SearchResult<()> {
        self.scrolls.lock().remove(scroll_id);
        Ok(())
    }

    fn put_mapping(&self, index: &str, doc_type: &str, mapping: &Value) -> SearchResult<Value> {
        let mut indices = self.indices.write();
        let idx = indices.get_mut(index).ok_or_else(|| Self::not_found(index))?;
        idx.mappings.insert(doc_type.to_string(), mapping.clone());
        Ok(json!({ "acknowledged": true }))
    }

    fn get_mapping(&self, index: &str, doc_type: &str) -> SearchResult<Value> {
        let indices = self.indices.read();
        let idx = indices.get(index).ok_or_else(|| Self::not_found(index))?;
        Ok(idx
            .mappings
            .get(doc_type)
            .cloned()
            .unwrap_or_else(|| Value::Object(Map::new())))
    }
}
