//! Elasticsearch backend over a pluggable HTTP client.

use crate::backend::{Hit, IndexStatus, ScrollPage, SearchBackend, ShardState};
use crate::error::{SearchError, SearchResult};
use crate::query::Query;
use gitdex_http::{quote, HttpClient, HttpError, HttpRequest, HttpResponse, Method};
use serde::Deserialize;
use serde_json::{Map, Value};
use tracing::debug;

/// How long the node keeps a scroll alive between batches.
const SCROLL_KEEP_ALIVE: &str = "1m";

#[derive(Debug, Deserialize)]
struct SearchResponse {
    hits: Hits,
}

#[derive(Debug, Deserialize)]
struct ScrollResponse {
    #[serde(rename = "_scroll_id")]
    scroll_id: String,
    hits: Hits,
}

impl Hits {
    fn into_hits(self) -> Vec<Hit> {
        self.hits
            .into_iter()
            .map(|hit| Hit {
                id: hit.id,
                source: hit.source,
            })
            .collect()
    }
}

impl From<ScrollResponse> for ScrollPage {
    fn from(response: ScrollResponse) -> Self {
        Self {
            hits: response.hits.into_hits(),
            scroll_id: response.scroll_id,
        }
    }
}

#[derive(Debug, Deserialize)]
struct Hits {
    hits: Vec<RawHit>,
}

#[derive(Debug, Deserialize)]
struct RawHit {
    #[serde(rename = "_id")]
    id: String,
    #[serde(rename = "_source", default)]
    source: Map<String, Value>,
}

#[derive(Debug, Deserialize)]
struct CountResponse {
    count: u64,
}

#[derive(Debug, Deserialize)]
struct GetResponse {
    #[serde(rename = "_source", default)]
    source: Map<String, Value>,
}

/// One row of `/_cat/shards?format=json`; every value is a string.
#[derive(Debug, Deserialize)]
struct CatShard {
    shard: String,
    state: String,
}

/// Talks to an Elasticsearch node through `/{index}/{type}/{id}` style
/// endpoints.
pub struct ElasticsearchBackend<C: HttpClient> {
    client: C,
    base_url: String,
}

impl<C: HttpClient> ElasticsearchBackend<C> {
    /// Creates a backend for the node at `base_url`
    /// (e.g. `http://localhost:9200`).
    pub fn new(client: C, base_url: impl Into<String>) -> Self {
        let base_url = base_url.into().trim_end_matches('/').to_string();
        Self { client, base_url }
    }

    /// Returns the node URL.
    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn url(&self, path: &str) -> String {
        format!("{}/{}", self.base_url, path)
    }

    fn doc_url(&self, index: &str, doc_type: &str, id: &str) -> String {
        self.url(&format!("{index}/{doc_type}/{}", quote(id, "")))
    }

    fn send(&self, request: HttpRequest) -> SearchResult<HttpResponse> {
        debug!(method = %request.method, url = %request.url, "search request");
        self.client
            .send(request)
            .map_err(|e| SearchError::Http(HttpError::Transport(e)))
    }

    /// Sends a request, mapping 404 to [`SearchError::IndexNotFound`].
    fn send_in(&self, index: &str, request: HttpRequest) -> SearchResult<HttpResponse> {
        let response = self.send(request)?;
        if response.status == 404 {
            return Err(SearchError::IndexNotFound {
                index: index.to_string(),
            });
        }
        Ok(response.error_for_status()?)
    }
}

impl<C: HttpClient> SearchBackend for ElasticsearchBackend<C> {
    fn index_exists(&self, index: &str) -> SearchResult<bool> {
        let response = self.send(HttpRequest::new(Method::Head, self.url(index)))?;
        match response.status {
            404 => Ok(false),
            _ => Ok(response.error_for_status()?.is_success()),
        }
    }

    fn create_index(&self, index: &str) -> SearchResult<()> {
        let response = self.send(HttpRequest::new(Method::Put, self.url(index)))?;
        if response.status == 400 && String::from_utf8_lossy(&response.body).contains("already_exists") {
            return Err(SearchError::IndexExists {
                index: index.to_string(),
            });
        }
        response.error_for_status()?;
        Ok(())
    }

    fn delete_index(&self, index: &str) -> SearchResult<bool> {
        let response = self.send(HttpRequest::new(Method::Delete, self.url(index)))?;
        if response.status == 404 {
            return Ok(false);
        }
        response.error_for_status()?;
        Ok(true)
    }

    fn index_status(&self, index: &str) -> SearchResult<IndexStatus> {
        let url = self.url(&format!("_cat/shards/{index}?format=json"));
        let rows: Vec<CatShard> = self.send_in(index, HttpRequest::new(Method::Get, url))?.json()?;
        let mut status = IndexStatus::default();
        for row in rows {
            let shard = row
                .shard
                .parse::<u32>()
                .map_err(|_| SearchError::protocol(format!("bad shard number {:?}", row.shard)))?;
            status
                .shards
                .entry(shard)
                .or_default()
                .push(ShardState::parse(&row.state));
        }
        Ok(status)
    }

    fn refresh(&self, index: &str) -> SearchResult<()> {
        let url = self.url(&format!("{index}/_refresh"));
        self.send_in(index, HttpRequest::new(Method::Post, url))?;
        Ok(())
    }

    fn put_document(
        &self,
        index: &str,
        doc_type: &str,
        id: &str,
        source: &Map<String, Value>,
    ) -> SearchResult<()> {
        let body = Value::Object(source.clone());
        let request = HttpRequest::json(Method::Put, self.doc_url(index, doc_type, id), &body);
        self.send(request)?.error_for_status()?;
        Ok(())
    }

    fn delete_document(&self, index: &str, doc_type: &str, id: &str) -> SearchResult<bool> {
        let request = HttpRequest::new(Method::Delete, self.doc_url(index, doc_type, id));
        let response = self.send(request)?;
        if response.status == 404 {
            return Ok(false);
        }
        response.error_for_status()?;
        Ok(true)
    }

    fn get_document(
        &self,
        index: &str,
        doc_type: &str,
        id: &str,
    ) -> SearchResult<Option<Map<String, Value>>> {
        let request = HttpRequest::new(Method::Get, self.doc_url(index, doc_type, id));
        let response = self.send(request)?;
        if response.status == 404 {
            // Distinguish a missing document from a missing index.
            if !self.index_exists(index)? {
                return Err(SearchError::IndexNotFound {
                    index: index.to_string(),
                });
            }
            return Ok(None);
        }
        let found: GetResponse = response.error_for_status()?.json()?;
        Ok(Some(found.source))
    }

    fn search(&self, index: &str, doc_type: &str, query: &Query) -> SearchResult<Vec<Hit>> {
        let url = self.url(&format!("{index}/{doc_type}/_search"));
        let request = HttpRequest::json(Method::Post, url, &query.to_body());
        let response: SearchResponse = self.send_in(index, request)?.json()?;
        Ok(response.hits.into_hits())
    }

    fn count(&self, index: &str, doc_type: &str, query: &Query) -> SearchResult<u64> {
        let url = self.url(&format!("{index}/{doc_type}/_count"));
        let body = serde_json::json!({ "query": query.query_clause() });
        let response: CountResponse = self
            .send_in(index, HttpRequest::json(Method::Post, url, &body))?
            .json()?;
        Ok(response.count)
    }

    fn open_scroll(&self, index: &str, doc_type: &str, query: &Query) -> SearchResult<ScrollPage> {
        let url = self.url(&format!("{index}/{doc_type}/_search?scroll={SCROLL_KEEP_ALIVE}"));
        let request = HttpRequest::json(Method::Post, url, &query.to_scroll_body());
        let response: ScrollResponse = self.send_in(index, request)?.json()?;
        Ok(response.into())
    }

    fn next_scroll(&self, scroll_id: &str) -> SearchResult<ScrollPage> {
        let body = serde_json::json!({ "scroll": SCROLL_KEEP_ALIVE, "scroll_id": scroll_id });
        let request = HttpRequest::json(Method::Post, self.url("_search/scroll"), &body);
        let response = self.send(request)?;
        if response.status == 404 {
            return Err(SearchError::ScrollExpired {
                scroll_id: scroll_id.to_string(),
            });
        }
        let response: ScrollResponse = response.error_for_status()?.json()?;
        Ok(response.into())
    }

    fn clear_scroll(&self, scroll_id: &str) -> SearchResult<()> {
        let body = serde_json::json!({ "scroll_id": [scroll_id] });
        let request = HttpRequest::json(Method::Delete, self.url("_search/scroll"), &body);
        let response = self.send(request)?;
        // Already expired.
        if response.status == 404 {
            return Ok(());
        }
        response.error_for_status()?;
        Ok(())
    }

    fn put_mapping(&self, index: &str, doc_type: &str, mapping: &Value) -> SearchResult<Value> {
        let url = self.url(&format!("{index}/_mapping/{doc_type}"));
        let body = serde_json::json!({ doc_type: mapping });
        Ok(self
            .send_in(index, HttpRequest::json(Method::Put, url, &body))?
            .json()?)
    }

    fn get_mapping(&self, index: &str, doc_type: &str) -> SearchResult<Value> {
        let url = self.url(&format!("{index}/_mapping/{doc_type}"));
        let data: Value = self.send_in(index, HttpRequest::new(Method::Get, url))?.json()?;
        Ok(data
            .get(index)
            .and_then(|i| i.get("mappings"))
            .and_then(|m| m.get(doc_type))
            .cloned()
            .unwrap_or_else(|| Value::Object(Map::new())))
    }
}
