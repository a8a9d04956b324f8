// SPDX-License-Identifier: MIT

//! Run Lifecycle Controller error taxonomy.

use flowd_core::{ArgError, ErrorCode};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ControllerError {
    #[error("request is invalid: {0}")]
    Validation(String),

    #[error("argument validation failed")]
    ArgumentInvalid(Vec<ArgError>),

    #[error("Idempotency-Key header is missing or malformed")]
    IdempotencyKeyInvalid,

    #[error("idempotency key reused with a different request body")]
    IdempotencyConflict { expected_sha256: String, got_sha256: String },

    #[error("job id '{0}' is ambiguous")]
    JobAmbiguous(String),

    #[error("alias '{0}' is invalid: {1}")]
    JobAliasInvalid(String, String),

    #[error("job '{0}' was not found")]
    JobNotFound(String),

    #[error("source '{0}' does not expose runnable jobs via POST /runs yet")]
    OciRunUnsupported(String),

    #[error("policy evaluation failed: {0}")]
    Policy(#[from] flowd_policy::PolicyError),

    #[error("source manager error: {0}")]
    Source(#[from] flowd_sources::SourceError),

    #[error("job discovery failed: {0}")]
    Discovery(#[from] flowd_sources::DiscoveryError),

    #[error("container runtime error: {0}")]
    Runtime(#[from] flowd_adapters::RuntimeError),

    #[error("container name '{0}' is already in use")]
    ContainerNameConflict(String),

    #[error("storage error: {0}")]
    Storage(#[from] flowd_storage::StorageError),

    #[error("run '{0}' was not found")]
    RunNotFound(String),

    #[error("cursor {0} is no longer retained")]
    CursorExpired(i64),

    #[error("extension '{0}' is not enabled")]
    ExtensionUnsupported(String),

    #[error("encoding error: {0}")]
    Encoding(#[from] serde_json::Error),
}

impl ControllerError {
    pub fn code(&self) -> ErrorCode {
        match self {
            ControllerError::Validation(_) => ErrorCode::ValidationFailed,
            ControllerError::ArgumentInvalid(_) => ErrorCode::ArgumentInvalid,
            ControllerError::IdempotencyKeyInvalid => ErrorCode::ValidationFailed,
            ControllerError::IdempotencyConflict { .. } => ErrorCode::IdempotencyKeyConflict,
            ControllerError::JobAmbiguous(_) => ErrorCode::AliasCollision,
            ControllerError::JobAliasInvalid(..) => ErrorCode::AliasTargetInvalid,
            ControllerError::JobNotFound(_) => ErrorCode::NotFound,
            ControllerError::OciRunUnsupported(_) => ErrorCode::OciRunUnsupported,
            ControllerError::Policy(e) => e.code(),
            ControllerError::Source(e) => e.code(),
            ControllerError::Discovery(_) => ErrorCode::StorageFailure,
            ControllerError::Runtime(_) => ErrorCode::ContainerRuntimeUnavailable,
            ControllerError::ContainerNameConflict(_) => ErrorCode::ContainerNameConflict,
            ControllerError::Storage(e) => {
                if e.is_quota_exceeded() {
                    ErrorCode::StorageQuotaExceeded
                } else {
                    ErrorCode::StorageFailure
                }
            }
            ControllerError::RunNotFound(_) => ErrorCode::NotFound,
            ControllerError::CursorExpired(_) => ErrorCode::CursorExpired,
            ControllerError::ExtensionUnsupported(_) => ErrorCode::ExtensionUnsupported,
            ControllerError::Encoding(_) => ErrorCode::EncodingFailure,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn argument_invalid_maps_to_422() {
        let err = ControllerError::ArgumentInvalid(vec![]);
        assert_eq!(err.code().http_status(), 422);
    }

    #[test]
    fn storage_quota_maps_to_429() {
        let err = ControllerError::Storage(flowd_storage::StorageError::QuotaExceeded);
        assert_eq!(err.code(), ErrorCode::StorageQuotaExceeded);
    }

    #[test]
    fn oci_run_unsupported_maps_to_501() {
        let err = ControllerError::OciRunUnsupported("demo".into());
        assert_eq!(err.code().http_status(), 501);
    }
}
