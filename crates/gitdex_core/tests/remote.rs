//! A read-only workspace over a mirror.

use gitdex_core::{CoreError, RemoteWorkspace};
use gitdex_http::{HttpRequest, HttpResponse, LoopbackClient, LoopbackServer, Method};
use gitdex_model::RecordId;
use gitdex_search::{InMemorySearchBackend, Query};
use gitdex_storage::{RemoteStorage, StorageError};
use gitdex_testkit::prelude::*;
use serde_json::json;
use std::sync::atomic::{AtomicUsize, Ordering};

#[derive(Default)]
struct Mirror {
    pulls: AtomicUsize,
}

impl LoopbackServer for Mirror {
    fn handle(&self, request: &HttpRequest) -> HttpResponse {
        match (request.method, request.path()) {
            (Method::Get, "/repos/people.json") => {
                HttpResponse::json_body(200, &json!({"branch": "master"}))
            }
            (Method::Get, "/repos/people/gitdex.tests.Person.json") => HttpResponse::json_body(
                200,
                &json!([
                    {"age": 1, "name": "A", "uuid": "p1"},
                    {"age": 2, "name": "B", "uuid": "p2"}
                ]),
            ),
            (Method::Get, "/repos/people/gitdex.tests.Person/p1.json") => {
                HttpResponse::json_body(200, &json!({"age": 1, "name": "A", "uuid": "p1"}))
            }
            (Method::Post, path) if path.starts_with("/repos/people.json?") => {
                self.pulls.fetch_add(1, Ordering::Relaxed);
                HttpResponse::json_body(200, &json!({}))
            }
            _ => HttpResponse::new(404, "not found"),
        }
    }
}

type Remote = RemoteWorkspace<LoopbackClient<Mirror>, InMemorySearchBackend>;

fn workspace() -> Remote {
    let storage = RemoteStorage::new(
        LoopbackClient::new(Mirror::default()),
        "http://mirror.example.org/repos/people.json",
    )
    .unwrap();
    let mut ws = RemoteWorkspace::new(storage, InMemorySearchBackend::new(), None);
    ws.register(person_schema());
    ws
}

#[test]
fn indexes_what_the_mirror_serves() {
    let ws = workspace();
    assert_eq!(ws.index().prefix(), "people");
    assert!(!ws.exists().unwrap());
    ws.setup().unwrap();
    assert!(ws.exists().unwrap());

    let result = ws.sync(person_schema().type_id()).unwrap();
    assert_eq!(result.reindexed.len(), 2);
    let hits = ws
        .search(person_schema().type_id(), &Query::all().term("name", "B"))
        .unwrap();
    assert_eq!(hits.len(), 1);
    assert_eq!(hits[0].id().unwrap().as_str(), "p2");

    let record = ws
        .get(person_schema().type_id(), &RecordId::new("p1").unwrap())
        .unwrap();
    assert!(record.is_read_only());

    ws.destroy().unwrap();
    assert!(!ws.exists().unwrap());
}

#[test]
fn pull_leaves_the_index_alone() {
    let ws = workspace();
    ws.setup().unwrap();
    ws.pull("master", "origin").unwrap();
    assert_eq!(ws.storage().repo_name(), "people");
    assert_eq!(
        ws.index()
            .count("master", person_schema().type_id(), &Query::all())
            .unwrap(),
        0
    );
}

#[test]
fn writes_are_refused() {
    let ws = workspace();
    let mut record = person("p9", 9, "Nope");
    assert!(matches!(
        ws.save(&mut record, "Nope"),
        Err(CoreError::Storage(StorageError::ReadOnlyBackend))
    ));
    assert!(matches!(
        ws.delete(&record, "Nope"),
        Err(CoreError::Storage(StorageError::ReadOnlyBackend))
    ));
}
