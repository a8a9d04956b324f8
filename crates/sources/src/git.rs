// SPDX-License-Identifier: MIT

//! Git source registration and materialisation.

use crate::error::SourceError;
use flowd_adapters::GitClient;
use flowd_core::run::Provenance;
use flowd_core::source::{is_valid_source_name, Expose, PullPolicy, Source, SourceType};
use std::collections::HashMap;
use std::path::{Path, PathBuf};

/// Allow-list entry for a `git` source: either a `file://` root, or a
/// bare host that may appear as the URL's host.
pub enum GitAllow {
    FileRoot(PathBuf),
    Host(String),
}

fn url_is_allowed(url: &str, allow: &[GitAllow]) -> bool {
    if let Some(path) = url.strip_prefix("file://") {
        let candidate = PathBuf::from(path);
        return allow.iter().any(|a| matches!(a, GitAllow::FileRoot(root) if candidate.starts_with(root)));
    }
    let host = url
        .split("://")
        .nth(1)
        .unwrap_or(url)
        .split(['/', '@'])
        .find(|s| !s.is_empty() && !s.contains(':'))
        .unwrap_or("");
    allow.iter().any(|a| matches!(a, GitAllow::Host(h) if h == host))
}

/// Clone-or-fetch the source at `checkout_dir/<name>`, resolve `reference`
/// to a commit, and check it out clean.
pub async fn materialize_git(
    client: &dyn GitClient,
    checkout_dir: &Path,
    allow: &[GitAllow],
    name: &str,
    url: &str,
    reference: &str,
) -> Result<Source, SourceError> {
    if !is_valid_source_name(name) {
        return Err(SourceError::InvalidName(name.to_string()));
    }
    if !url_is_allowed(url, allow) {
        return Err(SourceError::NotAllowed { path: url.to_string() });
    }

    let dest = checkout_dir.join(name);
    if !dest.exists() {
        client.clone(url, &dest).await?;
    } else {
        client.set_remote(&dest, url).await?;
        client.fetch_all(&dest).await?;
    }

    let commit = client.resolve_commit(&dest, reference).await?;
    client.checkout_reset_clean(&dest, &commit).await?;

    Ok(Source {
        name: name.to_string(),
        r#type: SourceType::Git,
        r#ref: reference.to_string(),
        url: Some(url.to_string()),
        resolved_ref: Some(reference.to_string()),
        resolved_commit: Some(commit),
        digest: None,
        pull_policy: PullPolicy::IfNotPresent,
        verify_signatures: false,
        local_path: dest.to_string_lossy().to_string(),
        aliases: Vec::new(),
        metadata: HashMap::new(),
        provenance: Provenance {
            source_name: Some(name.to_string()),
            source_type: Some("git".to_string()),
            resolved_ref: Some(reference.to_string()),
            ..Provenance::default()
        },
        expose: Expose::None,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn file_url_must_resolve_into_an_allow_root() {
        let allow = vec![GitAllow::FileRoot(PathBuf::from("/srv/git"))];
        assert!(url_is_allowed("file:///srv/git/repo", &allow));
        assert!(!url_is_allowed("file:///etc/repo", &allow));
    }

    #[test]
    fn remote_url_host_must_be_allow_listed() {
        let allow = vec![GitAllow::Host("github.com".to_string())];
        assert!(url_is_allowed("https://github.com/acme/app.git", &allow));
        assert!(!url_is_allowed("https://evil.example/acme/app.git", &allow));
    }
}
