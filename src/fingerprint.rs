//! Deterministic fingerprinting of call parameters.
//!
//! The fingerprint is a SHA-256 over a canonical JSON rendering of the
//! `params` value and serves as the dedup/audit key. Object keys are sorted
//! so that key insertion order cannot change the hash, while array order is
//! preserved because positional params are order-significant.

use serde_json::Value;
use sha2::{Digest, Sha256};

use crate::error::ProxyError;

/// Maximum recursion depth for canonical JSON serialization.
///
/// Caps hostile deeply nested payloads before they can overflow the stack.
/// Exceeding the cap is an error rather than a sentinel value, which could
/// collide across different over-deep inputs.
const MAX_CANONICAL_JSON_DEPTH: usize = 64;

/// A stable, hex-encoded identifier derived from a call's params.
///
/// 64 lowercase hex characters (256 bits); usable directly as a storage key.
#[derive(Debug, Clone, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize)]
#[serde(transparent)]
pub struct Fingerprint(String);

impl Fingerprint {
    /// The hex string form of the fingerprint.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for Fingerprint {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// Computes the fingerprint of a params value.
///
/// Structurally identical values (same keys, values, nesting, and array
/// order) always produce the same fingerprint; any structural difference
/// produces a different one with overwhelming probability.
///
/// # Errors
///
/// Returns [`ProxyError::Fingerprint`] if the value nests deeper than
/// [`MAX_CANONICAL_JSON_DEPTH`]. Callers must treat this as a rejection:
/// a submission that cannot be fingerprinted is never forwarded unaudited.
pub fn fingerprint(params: &Value) -> Result<Fingerprint, ProxyError> {
    let canonical = canonical_json(params).map_err(|details| ProxyError::Fingerprint { details })?;
    let mut hasher = Sha256::new();
    hasher.update(canonical.as_bytes());
    Ok(Fingerprint(format!("{:x}", hasher.finalize())))
}

/// Produces a canonical JSON string with object keys sorted alphabetically.
///
/// Leaf values (strings, numbers, bools, null) already serialize
/// deterministically through `serde_json`.
fn canonical_json(value: &Value) -> Result<String, String> {
    canonical_json_inner(value, 0)
}

fn canonical_json_inner(value: &Value, depth: usize) -> Result<String, String> {
    if depth > MAX_CANONICAL_JSON_DEPTH {
        return Err(format!(
            "JSON nesting depth exceeds maximum of {MAX_CANONICAL_JSON_DEPTH}"
        ));
    }

    match value {
        Value::Object(map) => {
            let mut sorted: Vec<(&String, &Value)> = map.iter().collect();
            sorted.sort_by_key(|(k, _)| *k);
            let mut entries = Vec::with_capacity(sorted.len());
            for (k, v) in sorted {
                let key_str = serde_json::to_string(k).unwrap_or_default();
                entries.push(format!("{}:{}", key_str, canonical_json_inner(v, depth + 1)?));
            }
            Ok(format!("{{{}}}", entries.join(",")))
        }
        Value::Array(arr) => {
            let mut items = Vec::with_capacity(arr.len());
            for v in arr {
                items.push(canonical_json_inner(v, depth + 1)?);
            }
            Ok(format!("[{}]", items.join(",")))
        }
        other => Ok(serde_json::to_string(other).unwrap_or_default()),
    }
}
