// SPDX-License-Identifier: MIT

//! Storage-layer error taxonomy.

use thiserror::Error;

/// Errors surfaced by the persistence core and its three stores.
#[derive(Debug, Error)]
pub enum StorageError {
    #[error("sqlite error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    #[error("the incoming payload exceeds the journal byte budget")]
    QuotaExceeded,

    #[error("namespace '{namespace}' byte budget exceeded")]
    NamespaceQuota { namespace: String },

    #[error("invalid namespace identifier '{0}'")]
    InvalidNamespace(String),

    #[error("key or value exceeds the configured size bound")]
    EntryTooLarge,

    #[error("validation failed: {0}")]
    Validation(String),

    #[error("malformed cursor: {0}")]
    MalformedCursor(String),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

impl StorageError {
    /// Whether this error should be reported to callers as the
    /// quota-exceeded condition: the store's full-disk
    /// code, a matching message, or our own `QuotaExceeded` sentinel.
    pub fn is_quota_exceeded(&self) -> bool {
        match self {
            StorageError::QuotaExceeded | StorageError::NamespaceQuota { .. } => true,
            StorageError::Sqlite(e) => sqlite_error_is_quota(e),
            _ => false,
        }
    }
}

fn sqlite_error_is_quota(err: &rusqlite::Error) -> bool {
    if let rusqlite::Error::SqliteFailure(sqlite_err, msg) = err {
        if sqlite_err.code == rusqlite::ErrorCode::DiskFull {
            return true;
        }
        if let Some(msg) = msg {
            return message_indicates_quota(msg);
        }
    }
    message_indicates_quota(&err.to_string())
}

fn message_indicates_quota(msg: &str) -> bool {
    let lower = msg.to_ascii_lowercase();
    lower.contains("database or disk is full") || (lower.contains("quota") && lower.contains("exceeded"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn quota_sentinel_is_quota_exceeded() {
        assert!(StorageError::QuotaExceeded.is_quota_exceeded());
        assert!(StorageError::NamespaceQuota { namespace: "n".into() }.is_quota_exceeded());
    }

    #[test]
    fn message_matching_is_case_insensitive() {
        assert!(message_indicates_quota("Database Or Disk Is Full"));
        assert!(message_indicates_quota("storage quota has been exceeded"));
        assert!(!message_indicates_quota("unrelated failure"));
    }
}
