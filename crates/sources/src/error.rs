// SPDX-License-Identifier: MIT

//! Source manager error taxonomy.

use flowd_core::ErrorCode;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum SourceError {
    #[error("path '{path}' escapes the configured allow-root")]
    NotAllowed { path: String },

    #[error("source name '{0}' is invalid")]
    InvalidName(String),

    #[error("source '{0}' is not registered")]
    NotFound(String),

    #[error("git operation failed: {0}")]
    Git(#[from] flowd_adapters::error::GitError),

    #[error("container runtime operation failed: {0}")]
    Runtime(#[from] flowd_adapters::error::RuntimeError),

    #[error("image verification failed: {0}")]
    Verify(#[from] flowd_adapters::error::VerifyError),

    #[error("signature verification required but failed: {0}")]
    SignatureInvalid(String),

    #[error("manifest is invalid: {0}")]
    InvalidManifest(#[from] flowd_core::ManifestError),

    #[error("policy denied this source: {0}")]
    PolicyDenied(String),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("yaml decode error: {0}")]
    Yaml(#[from] serde_yaml::Error),
}

impl SourceError {
    pub fn code(&self) -> ErrorCode {
        match self {
            SourceError::NotAllowed { .. } => ErrorCode::SourceNotAllowed,
            SourceError::InvalidName(_) => ErrorCode::ValidationFailed,
            SourceError::NotFound(_) => ErrorCode::NotFound,
            SourceError::Git(_) | SourceError::Runtime(_) => ErrorCode::ContainerRuntimeUnavailable,
            SourceError::Verify(_) => ErrorCode::ImageSignatureRequired,
            SourceError::SignatureInvalid(_) => ErrorCode::SourceSignatureInvalid,
            SourceError::InvalidManifest(_) => ErrorCode::ValidationFailed,
            SourceError::PolicyDenied(_) => ErrorCode::PolicyDenied,
            SourceError::Io(_) => ErrorCode::StorageFailure,
            SourceError::Yaml(_) => ErrorCode::ValidationFailed,
        }
    }
}
