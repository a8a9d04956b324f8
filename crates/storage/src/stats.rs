// SPDX-License-Identifier: MIT

//! Storage statistics, backing `GET /health/storage`.

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct StorageStats {
    pub page_count: u64,
    pub page_size: u64,
    pub used_bytes: u64,
    pub max_bytes: u64,
    pub journal_bytes: u64,
    pub journal_max_bytes: u64,
    pub schema_version: i64,
    pub ok: bool,
    pub eviction_active: bool,
}
