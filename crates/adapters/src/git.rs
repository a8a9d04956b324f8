// SPDX-License-Identifier: MIT

//! `GitClient` capability: `clone/remote/fetch/rev-parse/checkout/reset/clean`.

use crate::error::GitError;
use async_trait::async_trait;
use std::path::{Path, PathBuf};

#[async_trait]
pub trait GitClient: Send + Sync {
    async fn clone(&self, url: &str, dest: &Path) -> Result<(), GitError>;
    async fn set_remote(&self, dest: &Path, url: &str) -> Result<(), GitError>;
    async fn fetch_all(&self, dest: &Path) -> Result<(), GitError>;
    /// Resolve `reference` against `dest` by trying, in order: the
    /// literal ref, `origin/<ref>`, `refs/tags/<ref>`. Returns the resolved 40-hex commit.
    async fn resolve_commit(&self, dest: &Path, reference: &str) -> Result<String, GitError>;
    async fn checkout_reset_clean(&self, dest: &Path, commit: &str) -> Result<(), GitError>;
}

/// Shells out to the `git` binary via `tokio::process::Command` to
/// fetch, resolve, and check out a working tree.
pub struct ProcessGitClient {
    binary: PathBuf,
}

impl ProcessGitClient {
    pub fn new(binary: impl Into<PathBuf>) -> Self {
        Self { binary: binary.into() }
    }

    async fn run(&self, dir: Option<&Path>, args: &[&str]) -> Result<std::process::Output, GitError> {
        let mut cmd = tokio::process::Command::new(&self.binary);
        if let Some(dir) = dir {
            cmd.current_dir(dir);
        }
        cmd.args(args);
        cmd.output().await.map_err(|e| GitError::Unavailable(e.to_string()))
    }

    fn check(out: std::process::Output) -> Result<std::process::Output, GitError> {
        if out.status.success() {
            Ok(out)
        } else {
            Err(GitError::CommandFailed(String::from_utf8_lossy(&out.stderr).trim().to_string()))
        }
    }
}

#[async_trait]
impl GitClient for ProcessGitClient {
    async fn clone(&self, url: &str, dest: &Path) -> Result<(), GitError> {
        if let Some(parent) = dest.parent() {
            tokio::fs::create_dir_all(parent).await.map_err(|e| GitError::Unavailable(e.to_string()))?;
        }
        let dest_str = dest.display().to_string();
        let out = self.run(None, &["clone", url, &dest_str]).await?;
        Self::check(out)?;
        Ok(())
    }

    async fn set_remote(&self, dest: &Path, url: &str) -> Result<(), GitError> {
        let out = self.run(Some(dest), &["remote", "set-url", "origin", url]).await?;
        Self::check(out)?;
        Ok(())
    }

    async fn fetch_all(&self, dest: &Path) -> Result<(), GitError> {
        let out = self.run(Some(dest), &["fetch", "--all", "--tags", "--prune"]).await?;
        Self::check(out)?;
        Ok(())
    }

    async fn resolve_commit(&self, dest: &Path, reference: &str) -> Result<String, GitError> {
        for candidate in [reference.to_string(), format!("origin/{reference}"), format!("refs/tags/{reference}")] {
            let out = self.run(Some(dest), &["rev-parse", "--verify", &format!("{candidate}^{{commit}}")]).await?;
            if out.status.success() {
                let sha = String::from_utf8_lossy(&out.stdout).trim().to_string();
                if sha.len() == 40 && sha.bytes().all(|b| b.is_ascii_hexdigit()) {
                    return Ok(sha);
                }
            }
        }
        Err(GitError::UnresolvableRef(reference.to_string()))
    }

    async fn checkout_reset_clean(&self, dest: &Path, commit: &str) -> Result<(), GitError> {
        Self::check(self.run(Some(dest), &["checkout", commit]).await?)?;
        Self::check(self.run(Some(dest), &["reset", "--hard", commit]).await?)?;
        Self::check(self.run(Some(dest), &["clean", "-fdx"]).await?)?;
        Ok(())
    }
}

#[cfg(any(test, feature = "test-support"))]
pub mod fake {
    use super::*;
    use parking_lot::Mutex;
    use std::collections::HashMap;

    #[derive(Default)]
    pub struct FakeGitClient {
        pub resolved: Mutex<HashMap<String, String>>,
        pub cloned: Mutex<Vec<(String, PathBuf)>>,
        pub fail_resolve: Mutex<bool>,
    }

    impl FakeGitClient {
        pub fn new() -> Self {
            Self::default()
        }

        pub fn with_ref(&self, reference: &str, commit: &str) {
            self.resolved.lock().insert(reference.to_string(), commit.to_string());
        }
    }

    #[async_trait]
    impl GitClient for FakeGitClient {
        async fn clone(&self, url: &str, dest: &Path) -> Result<(), GitError> {
            self.cloned.lock().push((url.to_string(), dest.to_path_buf()));
            Ok(())
        }

        async fn set_remote(&self, _dest: &Path, _url: &str) -> Result<(), GitError> {
            Ok(())
        }

        async fn fetch_all(&self, _dest: &Path) -> Result<(), GitError> {
            Ok(())
        }

        async fn resolve_commit(&self, _dest: &Path, reference: &str) -> Result<String, GitError> {
            if *self.fail_resolve.lock() {
                return Err(GitError::UnresolvableRef(reference.to_string()));
            }
            self.resolved
                .lock()
                .get(reference)
                .cloned()
                .ok_or_else(|| GitError::UnresolvableRef(reference.to_string()))
        }

        async fn checkout_reset_clean(&self, _dest: &Path, _commit: &str) -> Result<(), GitError> {
            Ok(())
        }
    }
}
