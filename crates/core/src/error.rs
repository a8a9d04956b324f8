// SPDX-License-Identifier: MIT

//! The machine-readable error code taxonomy shared across the workspace.
//!
//! Every fallible operation in the core surfaces one of these codes so the
//! daemon's HTTP layer can map it to a stable `problem+json` response
//! without re-deriving the mapping per call site.

use serde::{Deserialize, Serialize};

/// A stable, machine-readable error code plus the HTTP status bucket it
/// belongs to. `Display` renders the code string alone.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ErrorCode {
    // 400
    ValidationFailed,
    UnknownArgument,
    AliasTargetInvalid,
    AliasReserved,
    AliasNameConflict,
    AliasConfigurationInvalid,
    // 401 / 403
    Unauthorized,
    Forbidden,
    // 404
    NotFound,
    ExtensionUnsupported,
    // 409
    IdempotencyKeyConflict,
    AliasCollision,
    // 410
    CursorExpired,
    // 422
    PolicyInvalidProfile,
    ImageRegistryNotAllowed,
    ImageSignatureRequired,
    ImagePolicyViolation,
    PolicyDenied,
    ContainerRuntimeUnavailable,
    ContainerNameConflict,
    ArgumentInvalid,
    SourceNotAllowed,
    SourceSignatureInvalid,
    OciRunUnsupported,
    // 429
    StorageQuotaExceeded,
    // 500 / 503
    StorageFailure,
    StorageDegraded,
    EncodingFailure,
}

impl ErrorCode {
    /// The stable string used in `problem+json` bodies and log fields.
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorCode::ValidationFailed => "validation.failed",
            ErrorCode::UnknownArgument => "validation.unknown_argument",
            ErrorCode::AliasTargetInvalid => "alias.target.invalid",
            ErrorCode::AliasReserved => "alias.reserved",
            ErrorCode::AliasNameConflict => "alias.name.conflict",
            ErrorCode::AliasConfigurationInvalid => "alias.configuration.invalid",
            ErrorCode::Unauthorized => "unauthorized",
            ErrorCode::Forbidden => "forbidden",
            ErrorCode::NotFound => "not.found",
            ErrorCode::ExtensionUnsupported => "extension-unsupported",
            ErrorCode::IdempotencyKeyConflict => "idempotency-key-conflict",
            ErrorCode::AliasCollision => "alias.collision",
            ErrorCode::CursorExpired => "cursor-expired",
            ErrorCode::PolicyInvalidProfile => "E_POLICY",
            ErrorCode::ImageRegistryNotAllowed => "image.registry.not.allowed",
            ErrorCode::ImageSignatureRequired => "image.signature.required",
            ErrorCode::ImagePolicyViolation => "E_IMAGE_POLICY",
            ErrorCode::PolicyDenied => "policy.denied",
            ErrorCode::ContainerRuntimeUnavailable => "container.runtime.unavailable",
            ErrorCode::ContainerNameConflict => "container.name.conflict",
            ErrorCode::ArgumentInvalid => "argument.invalid",
            ErrorCode::SourceNotAllowed => "source.not.allowed",
            ErrorCode::SourceSignatureInvalid => "source-signature-invalid",
            ErrorCode::OciRunUnsupported => "E_OCI_RUN_UNSUPPORTED",
            ErrorCode::StorageQuotaExceeded => "storage-quota-exceeded",
            ErrorCode::StorageFailure => "storage.failure",
            ErrorCode::StorageDegraded => "storage-degraded",
            ErrorCode::EncodingFailure => "encoding.failure",
        }
    }

    /// The HTTP status this code is always reported under.
    pub fn http_status(&self) -> u16 {
        match self {
            ErrorCode::ValidationFailed
            | ErrorCode::UnknownArgument
            | ErrorCode::AliasTargetInvalid
            | ErrorCode::AliasReserved
            | ErrorCode::AliasNameConflict
            | ErrorCode::AliasConfigurationInvalid => 400,
            ErrorCode::Unauthorized => 401,
            ErrorCode::Forbidden => 403,
            ErrorCode::NotFound | ErrorCode::ExtensionUnsupported => 404,
            ErrorCode::IdempotencyKeyConflict | ErrorCode::AliasCollision => 409,
            ErrorCode::CursorExpired => 410,
            ErrorCode::PolicyInvalidProfile
            | ErrorCode::ImageRegistryNotAllowed
            | ErrorCode::ImageSignatureRequired
            | ErrorCode::ImagePolicyViolation
            | ErrorCode::PolicyDenied
            | ErrorCode::ContainerRuntimeUnavailable
            | ErrorCode::ContainerNameConflict
            | ErrorCode::ArgumentInvalid
            | ErrorCode::SourceNotAllowed
            | ErrorCode::SourceSignatureInvalid => 422,
            ErrorCode::StorageQuotaExceeded => 429,
            ErrorCode::StorageFailure | ErrorCode::EncodingFailure => 500,
            ErrorCode::OciRunUnsupported => 501,
            ErrorCode::StorageDegraded => 503,
        }
    }
}

impl std::fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_matches_spec_bucket() {
        assert_eq!(ErrorCode::StorageQuotaExceeded.http_status(), 429);
        assert_eq!(ErrorCode::CursorExpired.http_status(), 410);
        assert_eq!(ErrorCode::IdempotencyKeyConflict.http_status(), 409);
        assert_eq!(ErrorCode::ImageSignatureRequired.http_status(), 422);
        assert_eq!(ErrorCode::OciRunUnsupported.http_status(), 501);
    }
}
