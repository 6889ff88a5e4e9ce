//! Read-only storage served over HTTP by a mirror.

use crate::commit::{Commit, CommitOptions, DiffEntry};
use crate::error::{StorageError, StorageResult};
use crate::path::PathScheme;
use crate::store::{RecordIter, RecordStore};
use gitdex_http::{encode_query, HttpClient, HttpError, HttpRequest, HttpResponse, Method};
use gitdex_model::{JsonCodec, Record, RecordId, Schema, SchemaRegistry, TypeId};
use serde::Deserialize;
use serde_json::Value;
use std::sync::Arc;
use tracing::{debug, warn};

/// A published snapshot of a repository, reachable through a mirror URL
/// such as `http://host/repos/foo.json`.
///
/// Other resources are addressed relative to it:
///
/// | Resource | URL |
/// |---|---|
/// | repository info | `http://host/repos/foo.json` |
/// | all records of a type | `http://host/repos/foo/<ns>.<Name>.json` |
/// | one record | `http://host/repos/foo/<ns>.<Name>/<id>.json` |
///
/// Every record returned is read-only and every mutating call fails with
/// [`StorageError::ReadOnlyBackend`].
pub struct RemoteStorage<C: HttpClient> {
    client: C,
    repo_url: String,
    scheme: String,
    netloc: String,
    dir_name: String,
    repo_name: String,
    suffix: String,
    registry: SchemaRegistry,
    codec: JsonCodec,
}

#[derive(Debug, Deserialize)]
struct RepoInfo {
    branch: String,
}

impl<C: HttpClient> RemoteStorage<C> {
    /// Creates a mirror client.
    ///
    /// # Errors
    ///
    /// Returns [`StorageError::InvalidUrl`] unless the URL has a scheme, a
    /// host and a path ending in `<repo>.<suffix>`.
    pub fn new(client: C, repo_url: impl Into<String>) -> StorageResult<Self> {
        let repo_url = repo_url.into();
        let invalid = || StorageError::InvalidUrl {
            url: repo_url.clone(),
        };

        let (scheme, rest) = repo_url.split_once("://").ok_or_else(invalid)?;
        let slash = rest.find('/').ok_or_else(invalid)?;
        let (netloc, path) = rest.split_at(slash);
        let path = path.split(['?', '#']).next().unwrap_or_default();
        let (dir_name, basename) = path.rsplit_once('/').ok_or_else(invalid)?;
        let (repo_name, suffix) = basename.split_once('.').ok_or_else(invalid)?;
        if scheme.is_empty() || netloc.is_empty() || repo_name.is_empty() || suffix.is_empty() {
            return Err(invalid());
        }

        Ok(Self {
            scheme: scheme.to_string(),
            netloc: netloc.to_string(),
            dir_name: dir_name.to_string(),
            repo_name: repo_name.to_string(),
            suffix: suffix.to_string(),
            client,
            repo_url,
            registry: SchemaRegistry::new(),
            codec: JsonCodec::new(),
        })
    }

    /// Registers a record type.
    pub fn register(&mut self, schema: Arc<Schema>) -> Option<Arc<Schema>> {
        self.registry.register(schema)
    }

    /// Returns the repository name taken from the URL.
    pub fn repo_name(&self) -> &str {
        &self.repo_name
    }

    /// Returns the mirror URL.
    pub fn repo_url(&self) -> &str {
        &self.repo_url
    }

    /// Returns the URL of a resource below the repository.
    pub fn url(&self, parts: &[&str]) -> String {
        let mut path = vec![self.repo_name.as_str()];
        path.extend_from_slice(parts);
        format!(
            "{}://{}{}/{}.{}",
            self.scheme,
            self.netloc,
            self.dir_name,
            path.join("/"),
            self.suffix
        )
    }

    fn send(&self, request: HttpRequest) -> StorageResult<HttpResponse> {
        debug!(method = %request.method, url = %request.url, "mirror request");
        self.client
            .send(request)
            .map_err(|e| StorageError::Http(HttpError::Transport(e)))
    }

    fn fetch_json(&self, url: String) -> StorageResult<Value> {
        let response = self.send(HttpRequest::new(Method::Get, url.clone()))?;
        if response.status == 404 {
            return Err(StorageError::not_found(url));
        }
        Ok(response.error_for_status()?.json()?)
    }

    fn decode(&self, schema: &Arc<Schema>, value: Value) -> StorageResult<Record> {
        Ok(self.codec.decode_value(schema, value)?.into_read_only())
    }

    // --- reads -----------------------------------------------------------

    /// Returns true if the mirror answers for the repository.
    pub fn storage_exists(&self) -> bool {
        match self.send(HttpRequest::new(Method::Get, self.repo_url.clone())) {
            Ok(response) => response.is_success(),
            Err(e) => {
                warn!(url = %self.repo_url, error = %e, "mirror unreachable");
                false
            }
        }
    }

    /// Returns the branch the mirror publishes.
    pub fn active_branch(&self) -> StorageResult<String> {
        let info: RepoInfo = serde_json::from_value(self.fetch_json(self.url(&[]))?)?;
        Ok(info.branch)
    }

    /// Returns the schema registered for a type.
    pub fn schema(&self, type_id: &TypeId) -> StorageResult<Arc<Schema>> {
        self.registry
            .get(type_id)
            .cloned()
            .ok_or_else(|| StorageError::UnregisteredType {
                type_id: type_id.clone(),
            })
    }

    /// Fetches one record.
    pub fn get(&self, type_id: &TypeId, id: &RecordId) -> StorageResult<Record> {
        let schema = self.schema(type_id)?;
        let name = type_id.qualified_name();
        let value = self.fetch_json(self.url(&[name.as_str(), id.as_str()]))?;
        let record = self.decode(&schema, value)?;
        match record.id() {
            Some(found) if found == id => Ok(record),
            found => Err(StorageError::IdMismatch {
                requested: id.clone(),
                found: found.map(ToString::to_string).unwrap_or_default(),
            }),
        }
    }

    /// Fetches every record of a type in one request.
    pub fn list(&self, type_id: &TypeId) -> StorageResult<Vec<Record>> {
        let schema = self.schema(type_id)?;
        let name = type_id.qualified_name();
        let items: Vec<Value> = serde_json::from_value(self.fetch_json(self.url(&[name.as_str()]))?)?;
        items
            .into_iter()
            .map(|item| self.decode(&schema, item))
            .collect()
    }

    /// Resolves a path to a registered record type and id.
    pub fn path_info(&self, path: &str) -> Option<(Arc<Schema>, RecordId)> {
        let (type_id, id) = PathScheme::new(self.suffix.as_str()).parse(path)?;
        self.registry.get(&type_id).map(|schema| (Arc::clone(schema), id))
    }

    /// Asks the mirror to pull from its upstream and returns its reply.
    pub fn pull_remote(&self, branch: &str, remote: &str) -> StorageResult<Value> {
        let url = format!(
            "{}?{}",
            self.url(&[]),
            encode_query([("branch", branch), ("remote", remote)])
        );
        let response = self.send(HttpRequest::new(Method::Post, url))?;
        Ok(response.error_for_status()?.json()?)
    }

    // --- refused writes --------------------------------------------------

    /// Always fails: the mirror is read only.
    pub fn store(&self, _record: &mut Record, _message: &str, _opts: &CommitOptions) -> StorageResult<Commit> {
        Err(StorageError::ReadOnlyBackend)
    }

    /// Always fails: the mirror is read only.
    pub fn delete(&self, _record: &Record, _message: &str, _opts: &CommitOptions) -> StorageResult<Commit> {
        Err(StorageError::ReadOnlyBackend)
    }

    /// Always fails: the mirror is read only.
    pub fn store_data(
        &self,
        _repo_path: &str,
        _data: &[u8],
        _message: &str,
        _opts: &CommitOptions,
    ) -> StorageResult<Commit> {
        Err(StorageError::ReadOnlyBackend)
    }

    /// Always fails: the mirror is read only.
    pub fn delete_data(&self, _repo_path: &str, _message: &str, _opts: &CommitOptions) -> StorageResult<Commit> {
        Err(StorageError::ReadOnlyBackend)
    }

    /// Always fails: the mirror is read only.
    pub fn write_config(&self, _section: &str, _values: &[(&str, &str)]) -> StorageResult<()> {
        Err(StorageError::ReadOnlyBackend)
    }

    /// Always fails: mirrors do not expose git config.
    pub fn read_config(&self, _section: &str) -> StorageResult<()> {
        Err(StorageError::Unsupported {
            operation: "read_config",
        })
    }

    /// Always fails: the mirror is read only.
    pub fn create_storage(&self) -> StorageResult<Vec<Commit>> {
        Err(StorageError::ReadOnlyBackend)
    }

    /// Always fails: the mirror is read only.
    pub fn destroy_storage(&self) -> StorageResult<()> {
        Err(StorageError::ReadOnlyBackend)
    }
}

impl<C: HttpClient> RecordStore for RemoteStorage<C> {
    fn schema(&self, type_id: &TypeId) -> StorageResult<Arc<Schema>> {
        RemoteStorage::schema(self, type_id)
    }

    fn get(&self, type_id: &TypeId, id: &RecordId) -> StorageResult<Record> {
        RemoteStorage::get(self, type_id, id)
    }

    fn iterate<'a>(&'a self, type_id: &TypeId) -> StorageResult<RecordIter<'a>> {
        Ok(Box::new(self.list(type_id)?.into_iter().map(Ok)))
    }

    fn path_info(&self, path: &str) -> Option<(Arc<Schema>, RecordId)> {
        RemoteStorage::path_info(self, path)
    }

    fn active_branch(&self) -> StorageResult<String> {
        RemoteStorage::active_branch(self)
    }

    fn storage_exists(&self) -> bool {
        RemoteStorage::storage_exists(self)
    }

    fn remote_count(&self) -> StorageResult<usize> {
        Ok(0)
    }

    /// The mirror reports no diff, so the result is always empty.
    fn pull(&self, branch: &str, remote: &str) -> StorageResult<Vec<DiffEntry>> {
        self.pull_remote(branch, remote)?;
        Ok(Vec::new())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use gitdex_http::{LoopbackClient, LoopbackServer};
    use gitdex_model::{FieldKind, FieldSpec};
    use serde_json::json;
    use std::sync::Mutex;

    #[derive(Default)]
    struct Mirror {
        requests: Mutex<Vec<(Method, String)>>,
    }

    impl LoopbackServer for Mirror {
        fn handle(&self, request: &HttpRequest) -> HttpResponse {
            let path = request.path().to_string();
            self.requests
                .lock()
                .unwrap()
                .push((request.method, path.clone()));
            match (request.method, path.as_str()) {
                (Method::Get, "/repos/foo.json") => {
                    HttpResponse::json_body(200, &json!({"branch": "develop"}))
                }
                (Method::Get, "/repos/foo/gitdex.tests.Person.json") => HttpResponse::json_body(
                    200,
                    &json!([
                        {"age": 1, "name": "A", "uuid": "p1"},
                        {"age": 2, "name": "B", "uuid": "p2"},
                    ]),
                ),
                (Method::Get, "/repos/foo/gitdex.tests.Person/p1.json") => {
                    HttpResponse::json_body(200, &json!({"age": 1, "name": "A", "uuid": "p1"}))
                }
                (Method::Get, "/repos/foo/gitdex.tests.Person/bad.json") => {
                    HttpResponse::json_body(200, &json!({"age": 1, "uuid": "p1"}))
                }
                (Method::Post, "/repos/foo.json?branch=master&remote=origin") => {
                    HttpResponse::json_body(200, &json!({"pulled": true}))
                }
                _ => HttpResponse::new(404, "not found"),
            }
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

    fn storage() -> RemoteStorage<LoopbackClient<Mirror>> {
        let mut storage = RemoteStorage::new(
            LoopbackClient::new(Mirror::default()),
            "http://www.example.org/repos/foo.json",
        )
        .unwrap();
        storage.register(person());
        storage
    }

    #[test]
    fn parses_mirror_url() {
        let storage = storage();
        assert_eq!(storage.repo_name(), "foo");
        assert_eq!(
            storage.url(&["gitdex.tests.Person"]),
            "http://www.example.org/repos/foo/gitdex.tests.Person.json"
        );
        assert_eq!(storage.url(&[]), "http://www.example.org/repos/foo.json");
    }

    #[test]
    fn rejects_bad_urls() {
        for url in ["www.example.org/foo.json", "http://host", "http://host/repos/foo"] {
            assert!(matches!(
                RemoteStorage::new(LoopbackClient::new(Mirror::default()), url),
                Err(StorageError::InvalidUrl { .. })
            ));
        }
    }

    #[test]
    fn reads_are_read_only_records() {
        let storage = storage();
        let ty = person().type_id().clone();
        assert!(storage.storage_exists());
        assert_eq!(storage.active_branch().unwrap(), "develop");

        let record = storage.get(&ty, &RecordId::new("p1").unwrap()).unwrap();
        assert!(record.is_read_only());
        assert_eq!(record.get("name"), Some(&json!("A")));

        let records: Vec<Record> = RecordStore::iterate(&storage, &ty)
            .unwrap()
            .collect::<StorageResult<_>>()
            .unwrap();
        assert_eq!(records.len(), 2);
        assert!(records.iter().all(Record::is_read_only));
    }

    #[test]
    fn get_checks_ids_and_missing_records() {
        let storage = storage();
        let ty = person().type_id().clone();
        assert!(matches!(
            storage.get(&ty, &RecordId::new("bad").unwrap()),
            Err(StorageError::IdMismatch { .. })
        ));
        assert!(storage
            .get(&ty, &RecordId::new("nope").unwrap())
            .unwrap_err()
            .is_not_found());
    }

    #[test]
    fn pull_posts_branch_and_remote() {
        let storage = storage();
        assert!(RecordStore::pull(&storage, "master", "origin").unwrap().is_empty());
        let requests = storage.client.server().requests.lock().unwrap();
        assert_eq!(
            requests.last().unwrap(),
            &(Method::Post, "/repos/foo.json?branch=master&remote=origin".to_string())
        );
    }

    #[test]
    fn mutations_are_refused() {
        let storage = storage();
        let mut record = Record::create(&person(), serde_json::Map::new()).unwrap();
        let opts = CommitOptions::new();
        assert!(matches!(
            storage.store(&mut record, "m", &opts),
            Err(StorageError::ReadOnlyBackend)
        ));
        assert!(matches!(storage.delete(&record, "m", &opts), Err(StorageError::ReadOnlyBackend)));
        assert!(matches!(
            storage.store_data("a", b"x", "m", &opts),
            Err(StorageError::ReadOnlyBackend)
        ));
        assert!(matches!(storage.delete_data("a", "m", &opts), Err(StorageError::ReadOnlyBackend)));
        assert!(matches!(storage.write_config("user", &[]), Err(StorageError::ReadOnlyBackend)));
        assert!(matches!(storage.read_config("user"), Err(StorageError::Unsupported { .. })));
        assert!(matches!(storage.destroy_storage(), Err(StorageError::ReadOnlyBackend)));
        assert!(matches!(storage.create_storage(), Err(StorageError::ReadOnlyBackend)));
    }
}
