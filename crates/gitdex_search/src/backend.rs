//! Search backend abstraction.

use crate::error::SearchResult;
use crate::query::Query;
use serde_json::{Map, Value};
use std::collections::BTreeMap;
use std::sync::Arc;

/// Allocation state of one shard copy.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ShardState {
    /// Serving requests.
    Started,
    /// Still being allocated or recovered.
    Initializing,
    /// Moving between nodes.
    Relocating,
    /// Not allocated to any node.
    Unassigned,
    /// Any state this crate does not know about.
    Other(String),
}

impl ShardState {
    /// Parses a state as reported by the backend.
    pub fn parse(state: &str) -> Self {
        match state {
            "STARTED" => Self::Started,
            "INITIALIZING" => Self::Initializing,
            "RELOCATING" => Self::Relocating,
            "UNASSIGNED" => Self::Unassigned,
            other => Self::Other(other.to_string()),
        }
    }
}

/// Shard status of an index: shard number to the states of its copies.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct IndexStatus {
    /// Copies of each shard.
    pub shards: BTreeMap<u32, Vec<ShardState>>,
}

impl IndexStatus {
    /// An index is ready once any copy of any shard has started.
    pub fn is_ready(&self) -> bool {
        self.shards
            .values()
            .any(|copies| copies.contains(&ShardState::Started))
    }
}

/// One search hit.
#[derive(Debug, Clone, PartialEq)]
pub struct Hit {
    /// Document id.
    pub id: String,
    /// Stored document body.
    pub source: Map<String, Value>,
}

/// One batch of a scrolled search.
#[derive(Debug, Clone, PartialEq)]
pub struct ScrollPage {
    /// Hits in this batch; empty once the scroll is exhausted.
    pub hits: Vec<Hit>,
    /// Cursor for the next batch.
    pub scroll_id: String,
}

/// Storage and query operations a search index must provide.
///
/// Documents are addressed by index name, document type and id. Writes
/// may stay invisible to searches until [`refresh`](Self::refresh); direct
/// gets see them immediately.
pub trait SearchBackend: Send + Sync {
    /// Returns true if the index exists.
    fn index_exists(&self, index: &str) -> SearchResult<bool>;

    /// Creates an empty index.
    fn create_index(&self, index: &str) -> SearchResult<()>;

    /// Deletes an index and all its documents. Returns false if it did
    /// not exist.
    fn delete_index(&self, index: &str) -> SearchResult<bool>;

    /// Returns the shard status of an index.
    fn index_status(&self, index: &str) -> SearchResult<IndexStatus>;

    /// Makes recent writes visible to searches.
    fn refresh(&self, index: &str) -> SearchResult<()>;

    /// Inserts or replaces a document.
    fn put_document(
        &self,
        index: &str,
        doc_type: &str,
        id: &str,
        source: &Map<String, Value>,
    ) -> SearchResult<()>;

    /// Deletes a document. Returns false if it did not exist.
    fn delete_document(&self, index: &str, doc_type: &str, id: &str) -> SearchResult<bool>;

    /// Fetches a document by id.
    fn get_document(
        &self,
        index: &str,
        doc_type: &str,
        id: &str,
    ) -> SearchResult<Option<Map<String, Value>>>;

    /// Runs a query against one document type.
    fn search(&self, index: &str, doc_type: &str, query: &Query) -> SearchResult<Vec<Hit>>;

    /// Counts the documents matching a query, ignoring paging.
    fn count(&self, index: &str, doc_type: &str, query: &Query) -> SearchResult<u64>;

    /// Opens a scroll over every document matching `query` and returns the
    /// first batch of at most [`Query::limit`] hits.
    ///
    /// The result set is fixed when the scroll opens, so writes made while
    /// scrolling do not shift later batches. The query's offset is ignored.
    fn open_scroll(&self, index: &str, doc_type: &str, query: &Query) -> SearchResult<ScrollPage>;

    /// Returns the next batch of an open scroll.
    fn next_scroll(&self, scroll_id: &str) -> SearchResult<ScrollPage>;

    /// Releases an open scroll.
    fn clear_scroll(&self, scroll_id: &str) -> SearchResult<()>;

    /// Installs a mapping for a document type and returns the backend's
    /// acknowledgement.
    fn put_mapping(&self, index: &str, doc_type: &str, mapping: &Value) -> SearchResult<Value>;

    /// Returns the mapping of a document type, or an empty object if none
    /// is installed.
    fn get_mapping(&self, index: &str, doc_type: &str) -> SearchResult<Value>;
}

impl<B: SearchBackend + ?Sized> SearchBackend for Arc<B> {
    fn index_exists(&self, index: &str) -> SearchResult<bool> {
        (**self).index_exists(index)
    }

    fn create_index(&self, index: &str) -> SearchResult<()> {
        (**self).create_index(index)
    }

    fn delete_index(&self, index: &str) -> SearchResult<bool> {
        (**self).delete_index(index)
    }

    fn index_status(&self, index: &str) -> SearchResult<IndexStatus> {
        (**self).index_status(index)
    }

    fn refresh(&self, index: &str) -> SearchResult<()> {
        (**self).refresh(index)
    }

    fn put_document(
        &self,
        index: &str,
        doc_type: &str,
        id: &str,
        source: &Map<String, Value>,
    ) -> SearchResult<()> {
        (**self).put_document(index, doc_type, id, source)
    }

    fn delete_document(&self, index: &str, doc_type: &str, id: &str) -> SearchResult<bool> {
        (**self).delete_document(index, doc_type, id)
    }

    fn get_document(
        &self,
        index: &str,
        doc_type: &str,
        id: &str,
    ) -> SearchResult<Option<Map<String, Value>>> {
        (**self).get_document(index, doc_type, id)
    }

    fn search(&self, index: &str, doc_type: &str, query: &Query) -> SearchResult<Vec<Hit>> {
        (**self).search(index, doc_type, query)
    }

    fn count(&self, index: &str, doc_type: &str, query: &Query) -> SearchResult<u64> {
        (**self).count(index, doc_type, query)
    }

    fn open_scroll(&self, index: &str, doc_type: &str, query: &Query) -> SearchResult<ScrollPage> {
        (**self).open_scroll(index, doc_type, query)
    }

    fn next_scroll(&self, scroll_id: &str) -> SearchResult<ScrollPage> {
        (**self).next_scroll(scroll_id)
    }

    fn clear_scroll(&self, scroll_id: &str) -> SearchResult<()> {
        (**self).clear_scroll(scroll_id)
    }

    fn put_mapping(&self, index: &str, doc_type: &str, mapping: &Value) -> SearchResult<Value> {
        (**self).put_mapping(index, doc_type, mapping)
    }

    fn get_mapping(&self, index: &str, doc_type: &str) -> SearchResult<Value> {
        (**self).get_mapping(index, doc_type)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ready_when_any_copy_started() {
        let mut status = IndexStatus::default();
        assert!(!status.is_ready());

        status.shards.insert(0, vec![ShardState::Initializing, ShardState::Unassigned]);
        status.shards.insert(1, vec![ShardState::Unassigned]);
        assert!(!status.is_ready());

        status.shards.insert(2, vec![ShardState::Unassigned, ShardState::Started]);
        assert!(status.is_ready());
    }

    #[test]
    fn shard_states_parse() {
        assert_eq!(ShardState::parse("STARTED"), ShardState::Started);
        assert_eq!(ShardState::parse("RELOCATING"), ShardState::Relocating);
        assert_eq!(ShardState::parse("weird"), ShardState::Other("weird".into()));
    }
}
