//! Commit metadata and authorship.

use std::fmt;

/// A name and email pair used for git signatures.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Identity {
    /// Display name.
    pub name: String,
    /// Email address.
    pub email: String,
}

impl Identity {
    /// Creates an identity.
    pub fn new(name: impl Into<String>, email: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            email: email.into(),
        }
    }

    pub(crate) fn signature(&self) -> Result<git2::Signature<'static>, git2::Error> {
        git2::Signature::now(&self.name, &self.email)
    }

    pub(crate) fn from_signature(signature: &git2::Signature<'_>) -> Self {
        Self::new(
            signature.name().unwrap_or_default(),
            signature.email().unwrap_or_default(),
        )
    }
}

impl Default for Identity {
    /// Used when neither the caller nor the tree config names anyone.
    fn default() -> Self {
        Self::new("gitdex", "gitdex@localhost")
    }
}

impl fmt::Display for Identity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} <{}>", self.name, self.email)
    }
}

/// Options for a mutating storage call.
///
/// The author defaults to the tree's configured `user.name`/`user.email`
/// and the committer defaults to the author.
#[derive(Debug, Clone, Default)]
pub struct CommitOptions {
    /// Commit author.
    pub author: Option<Identity>,
    /// Commit committer.
    pub committer: Option<Identity>,
    /// Working tree to write to, by name.
    pub repo_name: Option<String>,
}

impl CommitOptions {
    /// Creates default options.
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the author.
    #[must_use]
    pub fn author(mut self, author: Identity) -> Self {
        self.author = Some(author);
        self
    }

    /// Sets the committer.
    #[must_use]
    pub fn committer(mut self, committer: Identity) -> Self {
        self.committer = Some(committer);
        self
    }

    /// Routes the write to the named working tree.
    #[must_use]
    pub fn repo(mut self, name: impl Into<String>) -> Self {
        self.repo_name = Some(name.into());
        self
    }
}

/// A commit produced by a storage mutation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Commit {
    /// Hex object id.
    pub id: String,
    /// Commit message as stored.
    pub message: String,
    /// Author.
    pub author: Identity,
    /// Committer.
    pub committer: Identity,
    /// Hex ids of the parent commits.
    pub parents: Vec<String>,
    /// Name of the working tree the commit was made in.
    pub tree: String,
}

impl Commit {
    pub(crate) fn from_git(commit: &git2::Commit<'_>, tree: &str) -> Self {
        Self {
            id: commit.id().to_string(),
            message: commit.message().unwrap_or_default().to_string(),
            author: Identity::from_signature(&commit.author()),
            committer: Identity::from_signature(&commit.committer()),
            parents: commit.parent_ids().map(|id| id.to_string()).collect(),
            tree: tree.to_string(),
        }
    }

    /// Returns the abbreviated id used in log lines.
    pub fn short_id(&self) -> &str {
        &self.id[..self.id.len().min(7)]
    }
}

/// One change between two commits.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DiffEntry {
    /// A file was added.
    Added {
        /// New path.
        path: String,
    },
    /// A file's content changed.
    Modified {
        /// Path.
        path: String,
    },
    /// A file was removed.
    Deleted {
        /// Old path.
        path: String,
    },
    /// A file moved.
    Renamed {
        /// Old path.
        from: String,
        /// New path.
        to: String,
    },
}

impl DiffEntry {
    /// Returns true for renames.
    pub fn is_rename(&self) -> bool {
        matches!(self, DiffEntry::Renamed { .. })
    }

    /// Returns every path the entry touches.
    pub fn paths(&self) -> Vec<&str> {
        match self {
            DiffEntry::Added { path } | DiffEntry::Modified { path } | DiffEntry::Deleted { path } => {
                vec![path.as_str()]
            }
            DiffEntry::Renamed { from, to } => vec![from.as_str(), to.as_str()],
        }
    }

    pub(crate) fn from_delta(delta: &git2::DiffDelta<'_>) -> Option<Self> {
        fn path_of(file: git2::DiffFile<'_>) -> Option<String> {
            file.path_bytes()
                .map(|bytes| String::from_utf8_lossy(bytes).into_owned())
        }

        use git2::Delta;
        match delta.status() {
            Delta::Added | Delta::Copied => Some(DiffEntry::Added {
                path: path_of(delta.new_file())?,
            }),
            Delta::Modified | Delta::Typechange => Some(DiffEntry::Modified {
                path: path_of(delta.new_file())?,
            }),
            Delta::Deleted => Some(DiffEntry::Deleted {
                path: path_of(delta.old_file())?,
            }),
            Delta::Renamed => Some(DiffEntry::Renamed {
                from: path_of(delta.old_file())?,
                to: path_of(delta.new_file())?,
            }),
            _ => None,
        }
    }
}
