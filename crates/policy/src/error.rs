// SPDX-License-Identifier: MIT

//! Policy-gate error taxonomy.

use flowd_core::ErrorCode;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum PolicyError {
    #[error("invalid security profile '{0}'")]
    InvalidProfile(String),

    #[error("registry '{registry}' is not in the allow-list")]
    RegistryNotAllowed { registry: String },

    #[error("image signature verification is required: {reason}")]
    SignatureRequired { reason: String },

    #[error("resource request exceeds ceiling: {0}")]
    ResourceCeilingExceeded(String),

    #[error("override for '{subject}' is denied by policy: {reason}")]
    OverrideDenied { subject: String, reason: String },

    #[error("could not load policy file: {0}")]
    ConfigLoad(String),
}

impl PolicyError {
    pub fn code(&self) -> ErrorCode {
        match self {
            PolicyError::InvalidProfile(_) => ErrorCode::PolicyInvalidProfile,
            PolicyError::RegistryNotAllowed { .. } => ErrorCode::ImageRegistryNotAllowed,
            PolicyError::SignatureRequired { .. } => ErrorCode::ImageSignatureRequired,
            PolicyError::ResourceCeilingExceeded(_) => ErrorCode::ImagePolicyViolation,
            PolicyError::OverrideDenied { .. } => ErrorCode::PolicyDenied,
            PolicyError::ConfigLoad(_) => ErrorCode::StorageFailure,
        }
    }
}
