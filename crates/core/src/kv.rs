// SPDX-License-Identifier: MIT

//! Rule-Y KV entry and namespace validation.

pub const MAX_KEY_BYTES: usize = 256;
pub const MAX_VALUE_BYTES: usize = 8192;

/// One row of a namespaced KV table.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KvEntry {
    pub key: Vec<u8>,
    pub value: Vec<u8>,
    pub ts: i64,
}

/// Validate a namespace identifier: `[A-Za-z0-9_]+`.
pub fn is_valid_namespace(ns: &str) -> bool {
    !ns.is_empty() && ns.bytes().all(|b| b.is_ascii_alphanumeric() || b == b'_')
}

/// Compute the exclusive upper bound of a prefix scan: increments the last
/// byte of `prefix` that is not `0xFF`, dropping any trailing `0xFF` bytes.
/// Returns `None` when the prefix is empty or entirely `0xFF` (unbounded
/// scan — there is no finite upper bound).
pub fn next_prefix(prefix: &[u8]) -> Option<Vec<u8>> {
    let mut out = prefix.to_vec();
    while let Some(&last) = out.last() {
        if last == 0xFF {
            out.pop();
            continue;
        }
        *out.last_mut().expect("checked non-empty above") += 1;
        return Some(out);
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn namespace_validation() {
        assert!(is_valid_namespace("agent_runs"));
        assert!(is_valid_namespace("A1"));
        assert!(!is_valid_namespace(""));
        assert!(!is_valid_namespace("has/slash"));
        assert!(!is_valid_namespace("has space"));
    }

    #[test]
    fn next_prefix_increments_last_non_ff_byte() {
        assert_eq!(next_prefix(b"ab"), Some(b"ac".to_vec()));
        assert_eq!(next_prefix(&[0x01, 0xFF]), Some(vec![0x02]));
        assert_eq!(next_prefix(&[0xFF, 0xFF]), None);
        assert_eq!(next_prefix(&[]), None);
    }
}
