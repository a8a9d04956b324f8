// SPDX-License-Identifier: MIT

//! Errors surfaced by the external collaborator adapters.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum RuntimeError {
    #[error("container runtime unavailable: {0}")]
    Unavailable(String),
    #[error("container runtime command failed: {0}")]
    CommandFailed(String),
    #[error("image inspect returned malformed output: {0}")]
    MalformedOutput(String),
    #[error("container name already in use: {0}")]
    NameConflict(String),
}

#[derive(Debug, Error)]
pub enum VerifyError {
    #[error("signature verification tool unavailable: {0}")]
    Unavailable(String),
    #[error("signature verification failed: {0}")]
    Failed(String),
}

#[derive(Debug, Error)]
pub enum GitError {
    #[error("git binary unavailable: {0}")]
    Unavailable(String),
    #[error("git command failed: {0}")]
    CommandFailed(String),
    #[error("could not resolve ref '{0}'")]
    UnresolvableRef(String),
}
