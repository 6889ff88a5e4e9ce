//! Workspace configuration.

use crate::error::{CoreError, CoreResult};
use gitdex_model::RuntimeInfo;
use gitdex_search::ReadinessPolicy;
use std::path::{Path, PathBuf};

/// Configuration for opening a [`crate::Workspace`].
#[derive(Debug, Clone)]
pub struct WorkspaceConfig {
    /// Working trees; the first one is primary and names the branch that
    /// labels the index.
    pub working_trees: Vec<PathBuf>,

    /// Prefix of every index name.
    pub index_prefix: String,

    /// Branch new repositories start on and the default branch to pull.
    pub default_branch: String,

    /// Remote pulled by [`crate::Workspace::pull_default`].
    pub default_remote: String,

    /// Whether `reindex`, `sync` and pulls refresh the index when done.
    pub refresh_after_reindex: bool,

    /// How [`crate::Workspace::wait_until_ready`] polls.
    pub readiness: ReadinessPolicy,

    /// Stamp written into every stored record.
    pub runtime: RuntimeInfo,
}

impl WorkspaceConfig {
    /// Creates a configuration for a single working tree. The index prefix
    /// defaults to the tree's directory name.
    pub fn new(workdir: impl Into<PathBuf>) -> Self {
        let workdir = workdir.into();
        Self {
            index_prefix: basename(&workdir),
            working_trees: vec![workdir],
            default_branch: "master".to_string(),
            default_remote: "origin".to_string(),
            refresh_after_reindex: true,
            readiness: ReadinessPolicy::default(),
            runtime: RuntimeInfo::current(),
        }
    }

    /// Adds another working tree.
    #[must_use]
    pub fn with_tree(mut self, workdir: impl Into<PathBuf>) -> Self {
        self.working_trees.push(workdir.into());
        self
    }

    /// Sets the index prefix.
    #[must_use]
    pub fn with_index_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.index_prefix = prefix.into();
        self
    }

    /// Sets the default branch.
    #[must_use]
    pub fn with_default_branch(mut self, branch: impl Into<String>) -> Self {
        self.default_branch = branch.into();
        self
    }

    /// Sets the default remote.
    #[must_use]
    pub fn with_default_remote(mut self, remote: impl Into<String>) -> Self {
        self.default_remote = remote.into();
        self
    }

    /// Sets whether bulk operations refresh the index.
    #[must_use]
    pub fn with_refresh_after_reindex(mut self, refresh: bool) -> Self {
        self.refresh_after_reindex = refresh;
        self
    }

    /// Sets the readiness polling policy.
    #[must_use]
    pub fn with_readiness(mut self, policy: ReadinessPolicy) -> Self {
        self.readiness = policy;
        self
    }

    /// Sets the runtime stamp.
    #[must_use]
    pub fn with_runtime(mut self, runtime: RuntimeInfo) -> Self {
        self.runtime = runtime;
        self
    }

    /// Checks that the configuration can be used.
    pub fn validate(&self) -> CoreResult<()> {
        if self.working_trees.is_empty() {
            return Err(CoreError::invalid_config("no working trees"));
        }
        if self.index_prefix.is_empty() {
            return Err(CoreError::invalid_config("empty index prefix"));
        }
        if self.default_branch.is_empty() {
            return Err(CoreError::invalid_config("empty default branch"));
        }
        Ok(())
    }
}

fn basename(path: &Path) -> String {
    path.file_name()
        .map(|name| name.to_string_lossy().into_owned())
        .unwrap_or_default()
}
