//! Repository path resolution.
//!
//! Maps the `<dir>/<name>` pair from a URL onto a bare repository at
//! `<repos_path>/<dir>/<name>.git`. Both segments are restricted to a plain
//! character set, so a resolved path never leaves `repos_path`.

use crate::api::ApiError;
use once_cell::sync::Lazy;
use regex::Regex;
use std::collections::HashSet;
use std::path::{Path, PathBuf};

/// Characters allowed in a directory or repository name.
pub static NAME_REGEX: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^[a-zA-Z0-9_-]+$").expect("Invalid regex"));

/// Maximum length of a directory or repository name.
pub const MAX_NAME_LENGTH: usize = 100;

/// Returns true if `name` may be used as a path segment.
pub fn is_valid_name(name: &str) -> bool {
    name.len() <= MAX_NAME_LENGTH && NAME_REGEX.is_match(name)
}

/// Resolves repository names to paths on disk.
#[derive(Debug, Clone)]
pub struct RepoResolver {
    repos_path: PathBuf,
    disallowed_dirs: HashSet<String>,
}

impl RepoResolver {
    /// Creates a resolver rooted at `repos_path`.
    pub fn new(
        repos_path: impl Into<PathBuf>,
        disallowed_dirs: impl IntoIterator<Item = String>,
    ) -> Self {
        Self {
            repos_path: repos_path.into(),
            disallowed_dirs: disallowed_dirs.into_iter().collect(),
        }
    }

    /// Root directory of all repositories.
    pub fn repos_path(&self) -> &Path {
        &self.repos_path
    }

    /// Returns the path of an existing bare repository.
    ///
    /// Invalid names, disallowed directories and missing repositories are
    /// all reported as [`ApiError::RepoNotFound`].
    pub async fn repository_path_for(&self, dir: &str, name: &str) -> Result<PathBuf, ApiError> {
        let not_found = || ApiError::RepoNotFound(format!("{dir}/{name}"));

        if !is_valid_name(dir) || !is_valid_name(name) || self.disallowed_dirs.contains(dir) {
            tracing::debug!(dir, name, "Rejected repository name");
            return Err(not_found());
        }

        let path = self.repos_path.join(dir).join(format!("{name}.git"));
        match tokio::fs::metadata(&path).await {
            Ok(meta) if meta.is_dir() => Ok(path),
            Ok(_) => Err(not_found()),
            Err(e) => {
                tracing::debug!(path = %path.display(), error = %e, "Repository not found");
                Err(not_found())
            }
        }
    }
}
