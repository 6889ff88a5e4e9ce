//! Git-backed record storage.

use crate::commit::{Commit, CommitOptions, DiffEntry, Identity};
use crate::error::{StorageError, StorageResult};
use crate::message::commit_message;
use crate::path::PathScheme;
use crate::router::{StorageRouter, WorkingTree};
use crate::store::{RecordIter, RecordStore};
use git2::build::CheckoutBuilder;
use git2::{
    ConfigLevel, DiffFindOptions, ErrorCode, IndexEntry, ObjectType, Repository,
    RepositoryInitOptions, Signature,
};
use gitdex_model::{
    JsonCodec, Record, RecordCodec, RecordId, RuntimeInfo, Schema, SchemaRegistry, TypeId,
};
use std::collections::BTreeMap;
use std::fmt;
use std::fs;
use std::path::{Component, Path, PathBuf};
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Message of the first commit in every tree this storage creates.
pub const INIT_MESSAGE: &str = "Initialize repository.";

/// Stores records as files in one or more git working trees, one commit per
/// mutation.
///
/// Reads come from the committed blob on the current branch, not from the
/// working directory. Handles are not safe to share between concurrent
/// writers; commits on one tree must not interleave.
pub struct GitStorage {
    router: StorageRouter,
    scheme: PathScheme,
    codec: Box<dyn RecordCodec>,
    registry: SchemaRegistry,
    runtime: RuntimeInfo,
    default_branch: String,
}

impl fmt::Debug for GitStorage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("GitStorage")
            .field("trees", &self.router.trees())
            .field("suffix", &self.scheme.suffix())
            .field("types", &self.registry.len())
            .field("default_branch", &self.default_branch)
            .finish_non_exhaustive()
    }
}

impl GitStorage {
    /// Creates a storage over the given working directories.
    ///
    /// Nothing is touched on disk until [`GitStorage::create_storage`].
    ///
    /// # Errors
    ///
    /// Fails if no directories are given or two share a basename.
    pub fn new<I, P>(workdirs: I) -> StorageResult<Self>
    where
        I: IntoIterator<Item = P>,
        P: Into<PathBuf>,
    {
        let router = StorageRouter::new(workdirs.into_iter().map(WorkingTree::new).collect())?;
        let codec = JsonCodec::new();
        Ok(Self {
            router,
            scheme: PathScheme::new(codec.suffix()),
            codec: Box::new(codec),
            registry: SchemaRegistry::new(),
            runtime: RuntimeInfo::current(),
            default_branch: "master".to_string(),
        })
    }

    /// Replaces the record codec; the file suffix follows the codec.
    #[must_use]
    pub fn with_codec(mut self, codec: impl RecordCodec + 'static) -> Self {
        self.scheme = PathScheme::new(codec.suffix());
        self.codec = Box::new(codec);
        self
    }

    /// Sets the runtime stamp written into every record.
    #[must_use]
    pub fn with_runtime(mut self, runtime: RuntimeInfo) -> Self {
        self.runtime = runtime;
        self
    }

    /// Sets the branch new trees start on.
    #[must_use]
    pub fn with_default_branch(mut self, branch: impl Into<String>) -> Self {
        self.default_branch = branch.into();
        self
    }

    /// Registers a record type so its files are recognised.
    pub fn register(&mut self, schema: Arc<Schema>) -> Option<Arc<Schema>> {
        self.registry.register(schema)
    }

    /// Returns the registered types.
    pub fn registry(&self) -> &SchemaRegistry {
        &self.registry
    }

    /// Returns the router.
    pub fn router(&self) -> &StorageRouter {
        &self.router
    }

    /// Returns the path scheme.
    pub fn scheme(&self) -> &PathScheme {
        &self.scheme
    }

    /// Returns the repository path of a record.
    pub fn path_for(&self, record: &Record) -> StorageResult<String> {
        let id = record.id().ok_or_else(|| StorageError::MissingId {
            type_id: record.type_id().clone(),
        })?;
        Ok(self.scheme.path_for(record.type_id(), id))
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

    // --- lifecycle -------------------------------------------------------

    /// Returns true if every working tree holds a repository.
    pub fn storage_exists(&self) -> bool {
        self.router.trees().iter().all(WorkingTree::is_repository)
    }

    /// Initialises every missing repository with an initial empty commit.
    ///
    /// Returns the initial commits created; trees that already exist are
    /// left alone.
    pub fn create_storage(&self) -> StorageResult<Vec<Commit>> {
        let mut commits = Vec::new();
        for tree in self.router.trees() {
            if tree.is_repository() {
                continue;
            }
            fs::create_dir_all(tree.workdir())?;
            let mut opts = RepositoryInitOptions::new();
            opts.initial_head(&self.default_branch);
            let repo = Repository::init_opts(tree.workdir(), &opts)?;
            let signatures = Signatures::resolve(&repo, &CommitOptions::default())?;
            let commit = commit_index(&repo, tree, INIT_MESSAGE, &signatures)?;
            info!(tree = tree.name(), commit = commit.short_id(), "created storage");
            commits.push(commit);
        }
        Ok(commits)
    }

    /// Removes every working directory. Missing directories are skipped.
    pub fn destroy_storage(&self) -> StorageResult<()> {
        for tree in self.router.trees() {
            if tree.workdir().exists() {
                fs::remove_dir_all(tree.workdir())?;
                info!(tree = tree.name(), "destroyed storage");
            }
        }
        Ok(())
    }

    /// Writes `section.key = value` pairs into the local git config of the
    /// named tree, or of every tree.
    pub fn write_config(
        &self,
        section: &str,
        values: &[(&str, &str)],
        repo_name: Option<&str>,
    ) -> StorageResult<()> {
        for tree in self.router.select(repo_name)? {
            let repo = tree.open()?;
            let mut config = repo.config()?.open_level(ConfigLevel::Local)?;
            for (key, value) in values {
                config.set_str(&format!("{section}.{key}"), value)?;
            }
        }
        Ok(())
    }

    /// Reads a section of the local git config, one map per selected tree.
    pub fn read_config(
        &self,
        section: &str,
        repo_name: Option<&str>,
    ) -> StorageResult<Vec<BTreeMap<String, String>>> {
        let prefix = format!("{section}.");
        let pattern = format!("^{}\\.", section.replace('.', "\\."));
        let mut sections = Vec::new();
        for tree in self.router.select(repo_name)? {
            let repo = tree.open()?;
            let config = repo.config()?.open_level(ConfigLevel::Local)?;
            let mut values = BTreeMap::new();
            let mut entries = config.entries(Some(pattern.as_str()))?;
            while let Some(entry) = entries.next() {
                let entry = entry?;
                if let (Some(name), Some(value)) = (entry.name(), entry.value()) {
                    if let Some(key) = name.strip_prefix(&prefix) {
                        values.insert(key.to_string(), value.to_string());
                    }
                }
            }
            sections.push(values);
        }
        Ok(sections)
    }

    /// Returns the branch checked out in the primary tree.
    pub fn active_branch(&self) -> StorageResult<String> {
        let tree = self.router.primary();
        branch_name(&tree.open()?, tree)
    }

    /// Lists the remotes of a tree.
    pub fn remotes(&self, repo_name: Option<&str>) -> StorageResult<Vec<String>> {
        let repo = self.router.route(repo_name, None)?.open()?;
        let names = repo.remotes()?;
        Ok(names.iter().flatten().map(str::to_string).collect())
    }

    /// Adds a remote to a tree.
    pub fn add_remote(&self, name: &str, url: &str, repo_name: Option<&str>) -> StorageResult<()> {
        let tree = self.router.route(repo_name, None)?;
        tree.open()?.remote(name, url)?;
        debug!(tree = tree.name(), remote = name, url, "added remote");
        Ok(())
    }

    // --- reads -----------------------------------------------------------

    /// Loads a record from the committed state of the current branch.
    ///
    /// The returned record carries the tree it was found in as its
    /// affinity, so saving it again routes back to the same tree.
    ///
    /// # Errors
    ///
    /// - [`StorageError::NotFound`] if no tree holds the file
    /// - [`StorageError::AmbiguousRouting`] if several trees hold it
    /// - [`StorageError::IdMismatch`] if the stored id differs from `id`
    pub fn get(&self, type_id: &TypeId, id: &RecordId) -> StorageResult<Record> {
        let schema = self.schema(type_id)?;
        let path = self.scheme.path_for(type_id, id);

        let mut holders = Vec::new();
        for tree in self.router.trees() {
            if let Some(bytes) = committed_blob(&tree.open()?, &path)? {
                holders.push((tree, bytes));
            }
        }
        let (tree, bytes) = match holders.len() {
            0 => return Err(StorageError::not_found(path)),
            1 => holders.swap_remove(0),
            _ => {
                return Err(StorageError::ambiguous(format!(
                    "several working trees contain {path}"
                )))
            }
        };

        let mut record = self.codec.deserialize(&schema, &bytes)?;
        match record.id() {
            Some(found) if found == id => {}
            found => {
                return Err(StorageError::IdMismatch {
                    requested: id.clone(),
                    found: found.map(ToString::to_string).unwrap_or_default(),
                })
            }
        }
        record.set_tree_affinity(tree.name());
        Ok(record)
    }

    /// Reads a committed file from the named tree (or the only tree).
    pub fn get_data(&self, repo_path: &str, repo_name: Option<&str>) -> StorageResult<Vec<u8>> {
        let tree = self.router.route(repo_name, None)?;
        read_committed(&tree.open()?, repo_path)
    }

    /// Lists every committed record of a type and loads them lazily.
    ///
    /// The listing is taken from each tree's HEAD when this is called, so
    /// files that are staged or left in the working directory are never
    /// listed. Each item is loaded as the iterator advances.
    pub fn iterate(
        &self,
        type_id: &TypeId,
    ) -> StorageResult<impl Iterator<Item = StorageResult<Record>> + '_> {
        self.schema(type_id)?;
        let dir = self.scheme.type_dir(type_id);
        let mut ids = Vec::new();
        for tree in self.router.trees() {
            let repo = tree.open()?;
            for name in committed_names(&repo, &dir)? {
                if let Some((ty, id)) = self.scheme.parse(&format!("{dir}/{name}")) {
                    if ty == *type_id {
                        ids.push(id);
                    }
                }
            }
        }
        let type_id = type_id.clone();
        Ok(ids.into_iter().map(move |id| self.get(&type_id, &id)))
    }

    /// Resolves a path to a registered record type and id.
    pub fn path_info(&self, path: &str) -> Option<(Arc<Schema>, RecordId)> {
        let Some((type_id, id)) = self.scheme.parse(path) else {
            debug!(path, "not a record path");
            return None;
        };
        match self.registry.get(&type_id) {
            Some(schema) => Some((Arc::clone(schema), id)),
            None => {
                debug!(path, %type_id, "record type is not registered");
                None
            }
        }
    }

    /// Loads the record stored at `path`.
    ///
    /// # Errors
    ///
    /// Returns [`StorageError::NotARecordPath`] if the path is not a record
    /// file of a registered type.
    pub fn load(&self, path: &str) -> StorageResult<Record> {
        let (schema, id) = self
            .path_info(path)
            .ok_or_else(|| StorageError::NotARecordPath {
                path: path.to_string(),
            })?;
        self.get(schema.type_id(), &id)
    }

    // --- writes ----------------------------------------------------------

    /// Serializes a record, writes it and commits it.
    ///
    /// The record's tree affinity is set to the tree it was written to.
    ///
    /// # Errors
    ///
    /// - [`StorageError::MissingId`] if the record has no id
    /// - [`StorageError::ReadOnlyRecord`] if it is read-only
    /// - [`StorageError::Encoding`] if the message cannot be committed
    /// - [`StorageError::AmbiguousRouting`] if no tree can be chosen
    pub fn store(
        &self,
        record: &mut Record,
        message: &str,
        opts: &CommitOptions,
    ) -> StorageResult<Commit> {
        let path = self.writable_path(record)?;
        let message = commit_message(message)?;
        let tree = self
            .router
            .route(opts.repo_name.as_deref(), record.tree_affinity())?;

        let bytes = self.codec.serialize(record, &self.runtime)?;
        let commit = write_and_commit(tree, &path, &bytes, &message, opts)?;
        record.set_tree_affinity(tree.name());
        record.set_version(self.runtime.clone());
        Ok(commit)
    }

    /// Removes a record's file and commits the removal.
    ///
    /// # Errors
    ///
    /// As [`GitStorage::store`], plus [`StorageError::NotFound`] if the file
    /// does not exist.
    pub fn delete(&self, record: &Record, message: &str, opts: &CommitOptions) -> StorageResult<Commit> {
        let path = self.writable_path(record)?;
        let message = commit_message(message)?;
        let tree = self
            .router
            .route(opts.repo_name.as_deref(), record.tree_affinity())?;
        remove_and_commit(tree, &path, &message, opts)
    }

    /// Writes arbitrary data to `repo_path` and commits it.
    pub fn store_data(
        &self,
        repo_path: &str,
        data: &[u8],
        message: &str,
        opts: &CommitOptions,
    ) -> StorageResult<Commit> {
        check_repo_path(repo_path)?;
        let message = commit_message(message)?;
        let tree = self.router.route(opts.repo_name.as_deref(), None)?;
        write_and_commit(tree, repo_path, data, &message, opts)
    }

    /// Removes an arbitrary file and commits the removal.
    ///
    /// # Errors
    ///
    /// Returns [`StorageError::NotFound`] if the file does not exist.
    pub fn delete_data(&self, repo_path: &str, message: &str, opts: &CommitOptions) -> StorageResult<Commit> {
        check_repo_path(repo_path)?;
        let message = commit_message(message)?;
        let tree = self.router.route(opts.repo_name.as_deref(), None)?;
        remove_and_commit(tree, repo_path, &message, opts)
    }

    fn writable_path(&self, record: &Record) -> StorageResult<String> {
        let path = self.path_for(record)?;
        if record.is_read_only() {
            return Err(StorageError::ReadOnlyRecord {
                type_id: record.type_id().clone(),
            });
        }
        Ok(path)
    }

    // --- pull ------------------------------------------------------------

    /// Fetches `branch` from `remote` into the named tree (or the only
    /// tree), merges it and returns the changes the merge brought in.
    ///
    /// - Already up to date: nothing happens and the diff is empty.
    /// - No local commits yet: the fetched history is adopted and the diff
    ///   is empty.
    /// - Fast-forward: the branch moves to the fetched commit.
    /// - Diverged: a merge commit is created if the trees merge cleanly,
    ///   otherwise [`StorageError::MergeConflict`] is returned and nothing
    ///   changes.
    ///
    /// The diff is taken between the old and new head trees, with rename
    /// detection. The search index is never touched here.
    pub fn pull_from(
        &self,
        branch: &str,
        remote_name: &str,
        repo_name: Option<&str>,
    ) -> StorageResult<Vec<DiffEntry>> {
        let tree = self.router.route(repo_name, None)?;
        let repo = tree.open()?;
        let mut remote = repo.find_remote(remote_name).map_err(|e| match e.code() {
            ErrorCode::NotFound | ErrorCode::InvalidSpec => StorageError::UnknownRemote {
                name: remote_name.to_string(),
            },
            _ => StorageError::Git(e),
        })?;

        let tracking = format!("refs/remotes/{remote_name}/{branch}");
        remote.fetch(&[format!("+refs/heads/{branch}:{tracking}")], None, None)?;
        let fetched = match repo.refname_to_id(&tracking) {
            Ok(oid) => repo.find_commit(oid)?,
            Err(e) if e.code() == ErrorCode::NotFound => {
                debug!(tree = tree.name(), remote = remote_name, branch, "nothing fetched");
                return Ok(Vec::new());
            }
            Err(e) => return Err(e.into()),
        };

        let Some(head) = head_commit(&repo)? else {
            let local = format!("refs/heads/{}", branch_name(&repo, tree)?);
            checkout_tree(&repo, &fetched.tree()?)?;
            repo.reference(&local, fetched.id(), true, &format!("pull: {remote_name}/{branch}"))?;
            info!(tree = tree.name(), remote = remote_name, branch, "adopted fetched history");
            return Ok(Vec::new());
        };

        if head.id() == fetched.id() || repo.graph_descendant_of(head.id(), fetched.id())? {
            debug!(tree = tree.name(), remote = remote_name, branch, "already up to date");
            return Ok(Vec::new());
        }

        let old_tree = head.tree()?;
        let (new_tree, kind) = if repo.graph_descendant_of(fetched.id(), head.id())? {
            let new_tree = fetched.tree()?;
            checkout_tree(&repo, &new_tree)?;
            repo.head()?.set_target(
                fetched.id(),
                &format!("pull: fast-forward to {remote_name}/{branch}"),
            )?;
            (new_tree, "fast-forward")
        } else {
            let mut merged = repo.merge_commits(&head, &fetched, None)?;
            if merged.has_conflicts() {
                return Err(StorageError::MergeConflict {
                    remote: remote_name.to_string(),
                    branch: branch.to_string(),
                });
            }
            let new_tree = repo.find_tree(merged.write_tree_to(&repo)?)?;
            checkout_tree(&repo, &new_tree)?;
            let signature = default_signature(&repo)?;
            repo.commit(
                Some("HEAD"),
                &signature,
                &signature,
                &format!("Merge {remote_name}/{branch}"),
                &new_tree,
                &[&head, &fetched],
            )?;
            (new_tree, "merge")
        };

        let mut diff = repo.diff_tree_to_tree(Some(&old_tree), Some(&new_tree), None)?;
        diff.find_similar(Some(DiffFindOptions::new().renames(true)))?;
        let changes: Vec<DiffEntry> = diff
            .deltas()
            .filter_map(|delta| DiffEntry::from_delta(&delta))
            .collect();

        info!(
            tree = tree.name(),
            remote = remote_name,
            branch,
            kind,
            changes = changes.len(),
            "pulled"
        );
        Ok(changes)
    }
}

impl RecordStore for GitStorage {
    fn schema(&self, type_id: &TypeId) -> StorageResult<Arc<Schema>> {
        GitStorage::schema(self, type_id)
    }

    fn get(&self, type_id: &TypeId, id: &RecordId) -> StorageResult<Record> {
        GitStorage::get(self, type_id, id)
    }

    fn iterate<'a>(&'a self, type_id: &TypeId) -> StorageResult<RecordIter<'a>> {
        Ok(Box::new(GitStorage::iterate(self, type_id)?))
    }

    fn path_info(&self, path: &str) -> Option<(Arc<Schema>, RecordId)> {
        GitStorage::path_info(self, path)
    }

    fn active_branch(&self) -> StorageResult<String> {
        GitStorage::active_branch(self)
    }

    fn storage_exists(&self) -> bool {
        GitStorage::storage_exists(self)
    }

    fn remote_count(&self) -> StorageResult<usize> {
        let mut count = 0;
        for tree in self.router.trees() {
            count += tree.open()?.remotes()?.len();
        }
        Ok(count)
    }

    fn pull(&self, branch: &str, remote: &str) -> StorageResult<Vec<DiffEntry>> {
        self.pull_from(branch, remote, None)
    }
}

fn check_repo_path(repo_path: &str) -> StorageResult<()> {
    let path = Path::new(repo_path);
    let escapes = path
        .components()
        .any(|c| !matches!(c, Component::Normal(_)));
    if repo_path.is_empty() || escapes {
        return Err(StorageError::InvalidPath {
            path: repo_path.to_string(),
        });
    }
    Ok(())
}

fn head_commit(repo: &Repository) -> StorageResult<Option<git2::Commit<'_>>> {
    match repo.head() {
        Ok(head) => Ok(Some(head.peel_to_commit()?)),
        Err(e) if matches!(e.code(), ErrorCode::UnbornBranch | ErrorCode::NotFound) => Ok(None),
        Err(e) => Err(e.into()),
    }
}

fn branch_name(repo: &Repository, tree: &WorkingTree) -> StorageResult<String> {
    let head = repo.find_reference("HEAD")?;
    match head.symbolic_target() {
        Some(target) => Ok(target.strip_prefix("refs/heads/").unwrap_or(target).to_string()),
        None => Err(StorageError::DetachedHead {
            tree: tree.name().to_string(),
        }),
    }
}

fn read_committed(repo: &Repository, path: &str) -> StorageResult<Vec<u8>> {
    committed_blob(repo, path)?.ok_or_else(|| StorageError::not_found(path))
}

/// Reads a blob from the HEAD tree; `None` if HEAD is unborn or the path
/// is not a committed file.
fn committed_blob(repo: &Repository, path: &str) -> StorageResult<Option<Vec<u8>>> {
    let Some(head) = head_commit(repo)? else {
        return Ok(None);
    };
    let entry = match head.tree()?.get_path(Path::new(path)) {
        Ok(entry) => entry,
        Err(e) if e.code() == ErrorCode::NotFound => return Ok(None),
        Err(e) => return Err(e.into()),
    };
    if entry.kind() != Some(ObjectType::Blob) {
        return Ok(None);
    }
    Ok(Some(repo.find_blob(entry.id())?.content().to_vec()))
}

/// Names of the files directly under `dir` in the HEAD tree.
fn committed_names(repo: &Repository, dir: &str) -> StorageResult<Vec<String>> {
    let Some(head) = head_commit(repo)? else {
        return Ok(Vec::new());
    };
    let entry = match head.tree()?.get_path(Path::new(dir)) {
        Ok(entry) => entry,
        Err(e) if e.code() == ErrorCode::NotFound => return Ok(Vec::new()),
        Err(e) => return Err(e.into()),
    };
    let Ok(subtree) = entry.to_object(repo)?.into_tree() else {
        return Ok(Vec::new());
    };
    let names = subtree
        .iter()
        .filter(|entry| entry.kind() == Some(ObjectType::Blob))
        .filter_map(|entry| entry.name().map(str::to_string))
        .collect();
    Ok(names)
}

fn default_signature(repo: &Repository) -> StorageResult<Signature<'static>> {
    match repo.signature() {
        Ok(signature) => Ok(signature),
        Err(e) if e.code() == ErrorCode::NotFound => Ok(Identity::default().signature()?),
        Err(e) => Err(e.into()),
    }
}

fn checkout_tree(repo: &Repository, tree: &git2::Tree<'_>) -> StorageResult<()> {
    let mut checkout = CheckoutBuilder::new();
    checkout.force();
    repo.checkout_tree(tree.as_object(), Some(&mut checkout))?;
    Ok(())
}

/// Author and committer for one commit, resolved before anything on disk
/// changes.
struct Signatures {
    author: Signature<'static>,
    committer: Signature<'static>,
}

impl Signatures {
    fn resolve(repo: &Repository, opts: &CommitOptions) -> StorageResult<Self> {
        let author = match &opts.author {
            Some(author) => author.signature()?,
            None => default_signature(repo)?,
        };
        let committer = match &opts.committer {
            Some(committer) => committer.signature()?,
            None => author.clone(),
        };
        Ok(Self { author, committer })
    }
}

/// Commits the current index on top of HEAD.
fn commit_index(
    repo: &Repository,
    tree: &WorkingTree,
    message: &str,
    signatures: &Signatures,
) -> StorageResult<Commit> {
    let tree_oid = repo.index()?.write_tree()?;
    let git_tree = repo.find_tree(tree_oid)?;
    let parent = head_commit(repo)?;
    let parents: Vec<&git2::Commit<'_>> = parent.iter().collect();

    let oid = repo.commit(
        Some("HEAD"),
        &signatures.author,
        &signatures.committer,
        message,
        &git_tree,
        &parents,
    )?;
    Ok(Commit::from_git(&repo.find_commit(oid)?, tree.name()))
}

/// What a path looked like before a mutation, on disk and in the index.
struct Snapshot {
    path: String,
    file: PathBuf,
    contents: Option<Vec<u8>>,
    entry: Option<IndexEntry>,
}

impl Snapshot {
    fn take(repo: &Repository, tree: &WorkingTree, repo_path: &str) -> StorageResult<Self> {
        let file = tree.workdir().join(repo_path);
        let contents = if file.is_file() { Some(fs::read(&file)?) } else { None };
        let entry = repo.index()?.get_path(Path::new(repo_path), 0);
        Ok(Self {
            path: repo_path.to_string(),
            file,
            contents,
            entry,
        })
    }

    /// Puts the file and its index entry back as they were.
    fn restore(self, repo: &Repository) -> StorageResult<()> {
        match &self.contents {
            Some(contents) => fs::write(&self.file, contents)?,
            None if self.file.is_file() => fs::remove_file(&self.file)?,
            None => {}
        }
        let mut index = repo.index()?;
        match self.entry {
            Some(entry) => index.add(&entry)?,
            None => match index.remove_path(Path::new(&self.path)) {
                Ok(()) => {}
                Err(e) if e.code() == ErrorCode::NotFound => {}
                Err(e) => return Err(e.into()),
            },
        }
        index.write()?;
        Ok(())
    }
}

/// Applies `change` to the working tree and index, then commits. If either
/// step fails the path is restored, so no half-written file is left behind
/// for a later commit to pick up.
fn mutate_and_commit(
    tree: &WorkingTree,
    repo_path: &str,
    message: &str,
    opts: &CommitOptions,
    change: impl FnOnce(&Repository, &Path) -> StorageResult<()>,
) -> StorageResult<Commit> {
    let repo = tree.open()?;
    let signatures = Signatures::resolve(&repo, opts)?;
    let snapshot = Snapshot::take(&repo, tree, repo_path)?;

    let result = change(&repo, &snapshot.file)
        .and_then(|()| commit_index(&repo, tree, message, &signatures));
    if let Err(e) = &result {
        warn!(tree = tree.name(), path = repo_path, error = %e, "commit failed, restoring");
        if let Err(restore) = snapshot.restore(&repo) {
            warn!(tree = tree.name(), path = repo_path, error = %restore, "restore failed");
        }
    }
    result
}

fn write_and_commit(
    tree: &WorkingTree,
    repo_path: &str,
    data: &[u8],
    message: &str,
    opts: &CommitOptions,
) -> StorageResult<Commit> {
    let commit = mutate_and_commit(tree, repo_path, message, opts, |repo, file| {
        if let Some(dir) = file.parent() {
            fs::create_dir_all(dir)?;
        }
        fs::write(file, data)?;
        let mut index = repo.index()?;
        index.add_path(Path::new(repo_path))?;
        index.write()?;
        Ok(())
    })?;
    debug!(tree = tree.name(), path = repo_path, commit = commit.short_id(), "stored");
    Ok(commit)
}

fn remove_and_commit(
    tree: &WorkingTree,
    repo_path: &str,
    message: &str,
    opts: &CommitOptions,
) -> StorageResult<Commit> {
    if !tree.workdir().join(repo_path).is_file() {
        return Err(StorageError::not_found(repo_path));
    }
    let commit = mutate_and_commit(tree, repo_path, message, opts, |repo, file| {
        fs::remove_file(file)?;
        let mut index = repo.index()?;
        index.remove_path(Path::new(repo_path))?;
        index.write()?;
        Ok(())
    })?;
    debug!(tree = tree.name(), path = repo_path, commit = commit.short_id(), "deleted");
    Ok(commit)
}
