//! Workspaces and repositories in temporary directories.
//!
//! Fixtures panic on setup failures; they are only meant for tests.

use gitdex_core::{Identity, Workspace, WorkspaceConfig};
use gitdex_model::{FieldKind, FieldSpec, Record, RecordId, Schema, TypeId};
use gitdex_search::InMemorySearchBackend;
use gitdex_storage::{CommitOptions, GitStorage};
use serde_json::{json, Map, Value};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tempfile::TempDir;

/// Branch every fixture repository uses.
pub const BRANCH: &str = "master";

/// The `gitdex.tests.Person` record type: `age` (integer) and `name` (text).
pub fn person_schema() -> Arc<Schema> {
    Schema::shared(
        TypeId::new("gitdex.tests", "Person").expect("valid type id"),
        vec![
            FieldSpec::new("age", FieldKind::Integer),
            FieldSpec::new("name", FieldKind::Text),
        ],
    )
    .expect("valid schema")
}

/// Builds a person record with an explicit id.
pub fn person(id: &str, age: i64, name: &str) -> Record {
    Record::new(&person_schema(), person_values(age, name))
        .expect("valid person")
        .with_id(RecordId::new(id).expect("valid record id"))
}

/// Field values of a person.
pub fn person_values(age: i64, name: &str) -> Map<String, Value> {
    let mut values = Map::new();
    values.insert("age".into(), json!(age));
    values.insert("name".into(), json!(name));
    values
}

/// Identity used for fixture commits.
pub fn test_identity() -> Identity {
    Identity::new("Test Kit", "testkit@example.org")
}

/// A set-up workspace in a temporary directory, backed by an in-memory
/// search index and with [`person_schema`] registered.
pub struct TestWorkspace {
    /// The workspace instance.
    pub workspace: Workspace<Arc<InMemorySearchBackend>>,
    /// The search backend, shared with the workspace.
    pub backend: Arc<InMemorySearchBackend>,
    /// The temporary directory (kept alive to prevent cleanup).
    temp_dir: TempDir,
}

impl TestWorkspace {
    /// Creates a workspace with one working tree named `test-repo`.
    pub fn new() -> Self {
        Self::with_trees(&["test-repo"])
    }

    /// Creates a workspace with one working tree per name. The first tree
    /// is primary.
    pub fn with_trees(names: &[&str]) -> Self {
        Self::build(names, |config| config)
    }

    /// Creates a single-tree workspace after adjusting its configuration.
    pub fn with_config(adjust: impl FnOnce(WorkspaceConfig) -> WorkspaceConfig) -> Self {
        Self::build(&["test-repo"], adjust)
    }

    fn build(names: &[&str], adjust: impl FnOnce(WorkspaceConfig) -> WorkspaceConfig) -> Self {
        let temp_dir = TempDir::new().expect("Failed to create temp directory");
        let (first, rest) = names.split_first().expect("at least one tree");
        let mut config = WorkspaceConfig::new(temp_dir.path().join(first))
            .with_default_branch(BRANCH);
        for name in rest {
            config = config.with_tree(temp_dir.path().join(name));
        }
        let backend = Arc::new(InMemorySearchBackend::new());
        let mut workspace =
            Workspace::open(adjust(config), Arc::clone(&backend)).expect("Failed to open workspace");
        workspace.register(person_schema());
        workspace
            .setup(&test_identity())
            .expect("Failed to set up workspace");
        Self {
            workspace,
            backend,
            temp_dir,
        }
    }

    /// Returns the temporary directory holding every tree.
    pub fn dir(&self) -> &Path {
        self.temp_dir.path()
    }

    /// Returns the primary working tree.
    pub fn workdir(&self) -> PathBuf {
        self.workspace.config().working_trees[0].clone()
    }

    /// Saves a person and returns it as stored.
    pub fn save_person(&self, id: &str, age: i64, name: &str) -> Record {
        let mut record = person(id, age, name);
        self.workspace
            .save(&mut record, &format!("Save {id}"))
            .expect("Failed to save person");
        record
    }

    /// Number of indexed persons.
    pub fn indexed_persons(&self) -> usize {
        let index = self
            .workspace
            .index()
            .index_name(&self.workspace.active_branch().expect("branch"));
        self.backend
            .document_count(&index, &person_schema().type_id().doc_type_name())
    }

    /// Clones the primary tree into a sibling directory, so the clone
    /// shares the workspace's history and can be added as a remote.
    pub fn clone_source(&self, name: &str) -> SourceRepo {
        let path = self.dir().join(name);
        git2::Repository::clone(&self.workdir().to_string_lossy(), &path)
            .expect("Failed to clone workspace");
        SourceRepo::open(path)
    }
}

impl Default for TestWorkspace {
    fn default() -> Self {
        Self::new()
    }
}

impl std::ops::Deref for TestWorkspace {
    type Target = Workspace<Arc<InMemorySearchBackend>>;

    fn deref(&self) -> &Self::Target {
        &self.workspace
    }
}

impl std::ops::DerefMut for TestWorkspace {
    fn deref_mut(&mut self) -> &mut Self::Target {
        &mut self.workspace
    }
}

/// A plain repository that records are committed to directly, standing in
/// for an upstream that a workspace pulls from.
pub struct SourceRepo {
    /// Storage over the repository.
    pub storage: GitStorage,
    path: PathBuf,
}

impl SourceRepo {
    /// Opens an existing repository.
    pub fn open(path: impl Into<PathBuf>) -> Self {
        let path = path.into();
        let mut storage = GitStorage::new([path.clone()]).expect("valid storage");
        storage.register(person_schema());
        Self { storage, path }
    }

    /// Creates a new repository with only an initial commit.
    pub fn create(path: impl Into<PathBuf>) -> Self {
        let source = Self::open(path);
        source.storage.create_storage().expect("Failed to create storage");
        source
    }

    /// Returns the repository path.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Returns the path as a remote URL.
    pub fn url(&self) -> String {
        self.path.to_string_lossy().into_owned()
    }

    /// Commits a person.
    pub fn save_person(&self, id: &str, age: i64, name: &str) -> Record {
        let mut record = person(id, age, name);
        self.storage
            .store(&mut record, &format!("Save {id}"), &CommitOptions::new())
            .expect("Failed to store person");
        record
    }

    /// Commits the removal of a person.
    pub fn delete_person(&self, id: &str) {
        let record = self
            .storage
            .get(person_schema().type_id(), &RecordId::new(id).expect("valid id"))
            .expect("person exists");
        self.storage
            .delete(&record, &format!("Delete {id}"), &CommitOptions::new())
            .expect("Failed to delete person");
    }
}
