// SPDX-License-Identifier: MIT

//! HTTP error mapping. Every fallible handler path returns an [`ApiError`],
//! which renders as an RFC 7807 `application/problem+json` body carrying
//! the stable machine code from `flowd_core::ErrorCode`.

use axum::http::{HeaderValue, StatusCode};
use axum::response::{IntoResponse, Response};
use flowd_core::{AliasInfo, ArgError, ErrorCode};
use serde_json::{json, Value};

const PROBLEM_BASE: &str = "https://flowd.dev/problems";

#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    #[error(transparent)]
    Controller(#[from] flowd_engine::ControllerError),

    #[error(transparent)]
    Storage(#[from] flowd_storage::StorageError),

    #[error(transparent)]
    Policy(#[from] flowd_policy::PolicyError),

    #[error(transparent)]
    Source(#[from] flowd_sources::SourceError),

    #[error(transparent)]
    Discovery(#[from] flowd_sources::DiscoveryError),

    #[error(transparent)]
    Manifest(#[from] flowd_core::ManifestError),

    #[error(transparent)]
    Encoding(#[from] serde_json::Error),

    #[error("missing or invalid bearer token")]
    Unauthorized,

    #[error("missing required scope '{0}'")]
    Forbidden(&'static str),

    #[error("{0}")]
    BadRequest(String),

    #[error("argument validation failed")]
    ArgumentsInvalid(Vec<ArgError>),

    #[error("alias '{name}' is ambiguous")]
    AliasCollision { name: String, contenders: Vec<AliasInfo> },

    #[error("idempotency key conflict")]
    IdempotencyConflict { expected_sha256: String, got_sha256: String },

    #[error("cursor {0} no longer retained")]
    CursorExpired(i64),

    #[error("extension '{0}' is disabled")]
    ExtensionUnsupported(String),

    #[error("namespace '{0}' is not permitted")]
    NamespaceForbidden(String),

    #[error("storage is degraded")]
    StorageDegraded,

    #[error("{0} not found")]
    NotFound(String),
}

impl ApiError {
    pub fn code(&self) -> ErrorCode {
        match self {
            ApiError::Controller(e) => e.code(),
            ApiError::Storage(e) => {
                if e.is_quota_exceeded() {
                    ErrorCode::StorageQuotaExceeded
                } else {
                    ErrorCode::StorageFailure
                }
            }
            ApiError::Policy(e) => e.code(),
            ApiError::Source(e) => e.code(),
            ApiError::Discovery(_) => ErrorCode::ValidationFailed,
            ApiError::Manifest(_) => ErrorCode::ValidationFailed,
            ApiError::Encoding(_) => ErrorCode::EncodingFailure,
            ApiError::Unauthorized => ErrorCode::Unauthorized,
            ApiError::Forbidden(_) => ErrorCode::Forbidden,
            ApiError::BadRequest(_) => ErrorCode::ValidationFailed,
            ApiError::ArgumentsInvalid(_) => ErrorCode::ArgumentInvalid,
            ApiError::AliasCollision { .. } => ErrorCode::AliasCollision,
            ApiError::IdempotencyConflict { .. } => ErrorCode::IdempotencyKeyConflict,
            ApiError::CursorExpired(_) => ErrorCode::CursorExpired,
            ApiError::ExtensionUnsupported(_) => ErrorCode::ExtensionUnsupported,
            ApiError::NamespaceForbidden(_) => ErrorCode::Forbidden,
            ApiError::StorageDegraded => ErrorCode::StorageDegraded,
            ApiError::NotFound(_) => ErrorCode::NotFound,
        }
    }

    /// The problem-type URI suffix. Most codes just reuse their own
    /// string; a handful of well-known ones get a friendlier literal
    /// slug instead.
    fn problem_suffix(&self) -> &'static str {
        match self {
            ApiError::Storage(e) if e.is_quota_exceeded() => "storage-quota-exceeded",
            ApiError::StorageDegraded => "storage-degraded",
            ApiError::IdempotencyConflict { .. } => "idempotency-key-conflict",
            ApiError::CursorExpired(_) => "cursor-expired",
            ApiError::NamespaceForbidden(_) => "namespace-forbidden",
            ApiError::Source(flowd_sources::SourceError::SignatureInvalid(_)) => "source-signature-invalid",
            ApiError::ExtensionUnsupported(_) => "extension-unsupported",
            other => other.code().as_str(),
        }
    }

    fn extensions(&self) -> Value {
        match self {
            ApiError::ArgumentsInvalid(errors) => json!({
                "errors": errors.iter().map(|e| json!({"arg": e.arg, "code": e.code, "message": e.detail})).collect::<Vec<_>>(),
            }),
            ApiError::AliasCollision { name, contenders } => json!({
                "name": name,
                "contenders": contenders.iter().map(|c| json!({
                    "name": c.name,
                    "target_id": c.target_id,
                    "source": c.source,
                })).collect::<Vec<_>>(),
            }),
            ApiError::IdempotencyConflict { expected_sha256, got_sha256 } => json!({
                "expected_sha256": expected_sha256,
                "got_sha256": got_sha256,
            }),
            ApiError::Controller(flowd_engine::ControllerError::IdempotencyConflict { expected_sha256, got_sha256 }) => json!({
                "expected_sha256": expected_sha256,
                "got_sha256": got_sha256,
            }),
            ApiError::CursorExpired(cursor) => json!({ "cursor": cursor }),
            _ => Value::Null,
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = StatusCode::from_u16(self.code().http_status()).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
        if !matches!(status.as_u16() as u16, 500..=599) {
            tracing::warn!(code = %self.code(), status = %status.as_u16(), error = %self, "request rejected");
        } else {
            tracing::error!(code = %self.code(), status = %status.as_u16(), error = %self, "request failed");
        }

        let mut body = json!({
            "type": format!("{PROBLEM_BASE}/{}", self.problem_suffix()),
            "title": self.code().to_string(),
            "status": status.as_u16(),
            "detail": self.to_string(),
            "code": self.code().as_str(),
        });
        if let Value::Object(extra) = self.extensions() {
            if let Value::Object(map) = &mut body {
                map.extend(extra);
            }
        }

        let mut response = axum::Json(body).into_response();
        *response.status_mut() = status;
        response
            .headers_mut()
            .insert(axum::http::header::CONTENT_TYPE, HeaderValue::from_static("application/problem+json"));
        if status == StatusCode::UNAUTHORIZED {
            response
                .headers_mut()
                .insert(axum::http::header::WWW_AUTHENTICATE, HeaderValue::from_static("Bearer"));
        }
        response
    }
}

pub type ApiResult<T> = Result<T, ApiError>;
