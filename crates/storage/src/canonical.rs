// SPDX-License-Identifier: MIT

//! Canonical JSON body hashing:
//! decode, sort object keys ascending, re-serialize with `serde_json`'s
//! shortest-decimal number form, array order preserved, then SHA-256.

use serde_json::Value;
use sha2::{Digest, Sha256};

/// Re-serialize `value` with object keys sorted ascending at every
/// nesting level. `serde_json` already emits the shortest decimal form
/// for numbers and preserves array order, so sorting keys is the only
/// transformation needed for canonical bytes.
pub fn canonicalize(value: &Value) -> Value {
    match value {
        Value::Object(map) => {
            let mut sorted: std::collections::BTreeMap<String, Value> = std::collections::BTreeMap::new();
            for (k, v) in map {
                sorted.insert(k.clone(), canonicalize(v));
            }
            let mut out = serde_json::Map::new();
            for (k, v) in sorted {
                out.insert(k, v);
            }
            Value::Object(out)
        }
        Value::Array(items) => Value::Array(items.iter().map(canonicalize).collect()),
        other => other.clone(),
    }
}

/// Parse `raw` as JSON, canonicalize, and return the SHA-256 hex digest
/// of the canonical UTF-8 bytes. An empty body hashes as `{}`'s digest
/// only if the caller passes `b"{}"`; callers decide what "no body"
/// means upstream.
pub fn canonical_body_sha256(raw: &[u8]) -> Result<String, serde_json::Error> {
    let value: Value = serde_json::from_slice(raw)?;
    let canonical = canonicalize(&value);
    let bytes = serde_json::to_vec(&canonical).expect("canonical value always serializes");
    Ok(sha256_hex(&bytes))
}

pub fn sha256_hex(bytes: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(bytes);
    let digest = hasher.finalize();
    let mut out = String::with_capacity(digest.len() * 2);
    for b in digest {
        out.push_str(&format!("{b:02x}"));
    }
    out
}

/// `true` iff `s` is 64 lowercase hex characters.
pub fn is_hex_sha256(s: &str) -> bool {
    s.len() == 64 && s.bytes().all(|b| b.is_ascii_digit() || (b'a'..=b'f').contains(&b))
}
