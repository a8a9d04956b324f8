// SPDX-License-Identifier: MIT

//! Environment-driven configuration.

use std::path::PathBuf;

#[derive(Debug, Clone)]
pub struct Config {
    pub data_dir: PathBuf,
    pub jwt_secret: String,
    pub policy_file: Option<PathBuf>,
    /// Raw `FLWD_PROFILE` value, fed to `flowd_policy::resolve_profile`
    /// alongside the per-request field and the config-file value.
    pub env_profile: Option<String>,
    pub version: String,
    pub bind_addr: String,
    pub extensions_ndjson: bool,
    pub storage_max_bytes: u64,
    pub journal_max_bytes: u64,
    pub idempotency_ttl_seconds: i64,
    pub kv_namespace_quota_bytes: u64,
    pub local_allow_roots: Vec<PathBuf>,
    pub git_checkout_dir: PathBuf,
    pub oci_cache_root: PathBuf,
    pub runs_dir: PathBuf,
    pub container_runtime_binary: PathBuf,
    pub git_binary: PathBuf,
    pub verifier_binary: PathBuf,
    /// Bare hostnames permitted as a `git` source's URL host
    /// (`FLWD_GIT_ALLOW_HOSTS`, colon-separated).
    pub git_allow_hosts: Vec<String>,
    /// `file://` roots permitted as a `git` source's URL
    /// (`FLWD_GIT_ALLOW_FILE_ROOTS`, colon-separated).
    pub git_allow_file_roots: Vec<PathBuf>,
    /// Seconds to wait for in-flight requests and runs to wind down after
    /// a shutdown signal before forcing exit (`FLWD_SHUTDOWN_GRACE_SECONDS`).
    pub shutdown_grace_seconds: u64,
}

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("FLWD_JWT_SECRET must be set and non-empty")]
    MissingJwtSecret,
}

impl Config {
    /// Load from process environment. `FLWD_JWT_SECRET` is mandatory;
    /// everything else has a usable default for local/dev operation.
    pub fn from_env() -> Result<Self, ConfigError> {
        let jwt_secret = std::env::var("FLWD_JWT_SECRET").unwrap_or_default();
        if jwt_secret.trim().is_empty() {
            return Err(ConfigError::MissingJwtSecret);
        }
        let data_dir = std::env::var("DATA_DIR").map(PathBuf::from).unwrap_or_else(|_| PathBuf::from("./data"));
        let policy_file = std::env::var("FLWD_POLICY_FILE").ok().map(PathBuf::from);
        let env_profile = std::env::var("FLWD_PROFILE").ok().filter(|s| !s.is_empty());
        let version = std::env::var("FLWD_VERSION").unwrap_or_else(|_| env!("CARGO_PKG_VERSION").to_string());
        let bind_addr = std::env::var("FLWD_BIND_ADDR").unwrap_or_else(|_| "127.0.0.1:8080".to_string());
        let extensions_ndjson = std::env::var("FLWD_EXT_NDJSON").map(|v| v == "1" || v == "true").unwrap_or(false);
        let storage_max_bytes = env_u64("FLWD_STORAGE_MAX_BYTES", 256 * 1024 * 1024);
        let journal_max_bytes = env_u64("FLWD_JOURNAL_MAX_BYTES", 64 * 1024 * 1024);
        let idempotency_ttl_seconds = env_u64("FLWD_IDEMPOTENCY_TTL_SECONDS", 86_400) as i64;
        let kv_namespace_quota_bytes = env_u64("FLWD_KV_NAMESPACE_BYTES", 0);
        let local_allow_roots = std::env::var("FLWD_LOCAL_ALLOW_ROOTS")
            .ok()
            .map(|v| v.split(':').filter(|s| !s.is_empty()).map(PathBuf::from).collect())
            .unwrap_or_else(|| vec![data_dir.join("sources").join("local")]);
        let git_checkout_dir = std::env::var("FLWD_GIT_CHECKOUT_DIR")
            .map(PathBuf::from)
            .unwrap_or_else(|_| data_dir.join("sources").join("git"));
        let oci_cache_root = std::env::var("FLWD_OCI_CACHE_ROOT")
            .map(PathBuf::from)
            .unwrap_or_else(|_| data_dir.join("sources").join("oci"));
        let runs_dir = std::env::var("FLWD_RUNS_DIR").map(PathBuf::from).unwrap_or_else(|_| data_dir.join("runs"));
        let container_runtime_binary =
            std::env::var("FLWD_CONTAINER_RUNTIME").map(PathBuf::from).unwrap_or_else(|_| PathBuf::from("docker"));
        let git_binary = std::env::var("FLWD_GIT_BINARY").map(PathBuf::from).unwrap_or_else(|_| PathBuf::from("git"));
        let verifier_binary =
            std::env::var("FLWD_VERIFIER_BINARY").map(PathBuf::from).unwrap_or_else(|_| PathBuf::from("cosign"));
        let git_allow_hosts = std::env::var("FLWD_GIT_ALLOW_HOSTS")
            .ok()
            .map(|v| v.split(':').filter(|s| !s.is_empty()).map(str::to_string).collect())
            .unwrap_or_default();
        let git_allow_file_roots = std::env::var("FLWD_GIT_ALLOW_FILE_ROOTS")
            .ok()
            .map(|v| v.split(':').filter(|s| !s.is_empty()).map(PathBuf::from).collect())
            .unwrap_or_default();
        let shutdown_grace_seconds = env_u64("FLWD_SHUTDOWN_GRACE_SECONDS", 15);

        Ok(Self {
            data_dir,
            jwt_secret,
            policy_file,
            env_profile,
            version,
            bind_addr,
            extensions_ndjson,
            storage_max_bytes,
            journal_max_bytes,
            idempotency_ttl_seconds,
            kv_namespace_quota_bytes,
            local_allow_roots,
            git_checkout_dir,
            oci_cache_root,
            runs_dir,
            container_runtime_binary,
            git_binary,
            verifier_binary,
            git_allow_hosts,
            git_allow_file_roots,
            shutdown_grace_seconds,
        })
    }
}

fn env_u64(name: &str, default: u64) -> u64 {
    std::env::var(name).ok().and_then(|v| v.parse().ok()).unwrap_or(default)
}
