//! Working trees and write routing.

use crate::error::{StorageError, StorageResult};
use git2::Repository;
use std::path::{Path, PathBuf};

/// One git working directory managed by a storage.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WorkingTree {
    name: String,
    workdir: PathBuf,
}

impl WorkingTree {
    /// Creates a tree handle named after the directory's basename.
    pub fn new(workdir: impl Into<PathBuf>) -> Self {
        let workdir = workdir.into();
        let name = workdir
            .file_name()
            .map(|name| name.to_string_lossy().into_owned())
            .unwrap_or_default();
        Self { name, workdir }
    }

    /// Returns the routing name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Returns the working directory.
    pub fn workdir(&self) -> &Path {
        &self.workdir
    }

    /// Opens the repository.
    pub fn open(&self) -> StorageResult<Repository> {
        Ok(Repository::open(&self.workdir)?)
    }

    /// Returns true if the directory holds a git repository.
    pub fn is_repository(&self) -> bool {
        Repository::open(&self.workdir).is_ok()
    }
}

/// Picks the working tree a write goes to.
///
/// With a single tree everything goes there. With several, the caller must
/// name the tree, either explicitly or through the record's tree affinity.
#[derive(Debug, Clone)]
pub struct StorageRouter {
    trees: Vec<WorkingTree>,
}

impl StorageRouter {
    /// Creates a router.
    ///
    /// # Errors
    ///
    /// Fails if no trees are given or two trees share a basename, since such
    /// trees could never be told apart.
    pub fn new(trees: Vec<WorkingTree>) -> StorageResult<Self> {
        if trees.is_empty() {
            return Err(StorageError::ambiguous("no working trees configured"));
        }
        for (i, tree) in trees.iter().enumerate() {
            if trees[..i].iter().any(|other| other.name == tree.name) {
                return Err(StorageError::ambiguous(format!(
                    "two working trees are named {:?}",
                    tree.name
                )));
            }
        }
        Ok(Self { trees })
    }

    /// Returns all trees; the first one is the primary tree.
    pub fn trees(&self) -> &[WorkingTree] {
        &self.trees
    }

    /// Returns the primary tree.
    pub fn primary(&self) -> &WorkingTree {
        &self.trees[0]
    }

    /// Looks up a tree by name.
    pub fn by_name(&self, name: &str) -> Option<&WorkingTree> {
        self.trees.iter().find(|tree| tree.name == name)
    }

    /// Routes an operation.
    ///
    /// `repo_name` wins over `affinity`.
    ///
    /// # Errors
    ///
    /// Returns [`StorageError::AmbiguousRouting`] if several trees are
    /// managed and neither hint names one of them.
    pub fn route(&self, repo_name: Option<&str>, affinity: Option<&str>) -> StorageResult<&WorkingTree> {
        if self.trees.len() == 1 {
            return Ok(&self.trees[0]);
        }
        match repo_name.or(affinity) {
            Some(name) => self.by_name(name).ok_or_else(|| {
                StorageError::ambiguous(format!("no working tree is named {name:?}"))
            }),
            None => Err(StorageError::ambiguous(format!(
                "{} working trees are managed and no tree was named",
                self.trees.len()
            ))),
        }
    }

    /// Returns the named tree, or every tree when no name is given.
    pub fn select(&self, repo_name: Option<&str>) -> StorageResult<Vec<&WorkingTree>> {
        match repo_name {
            Some(name) => Ok(vec![self.route(Some(name), None)?]),
            None => Ok(self.trees.iter().collect()),
        }
    }
}
