//! Canonical JSON forms used for content comparison and hashing.
//!
//! Two documents that differ only in key order or in `null` versus absent
//! fields have the same canonical form. Empty collections are kept: templates
//! fill defaults for absent fields but not for `[]` or `{}`.

use serde_json::{Map, Value};
use sha2::{Digest, Sha256};

/// Length in hex characters of [`content_hash`] results.
pub const HASH_LEN: usize = 16;

/// Drops null object members, recursively.
///
/// Array elements are kept in place, since positions carry meaning.
pub fn canonicalize(value: &Value) -> Value {
    match value {
        Value::Object(map) => {
            let mut out = Map::new();
            for (k, v) in map {
                if !v.is_null() {
                    out.insert(k.clone(), canonicalize(v));
                }
            }
            Value::Object(out)
        }
        Value::Array(items) => Value::Array(items.iter().map(canonicalize).collect()),
        other => other.clone(),
    }
}

/// Serializes with object keys sorted, independent of map implementation.
pub fn to_canonical_string(value: &Value) -> String {
    let mut out = String::new();
    write_sorted(&canonicalize(value), &mut out);
    out
}

fn write_sorted(value: &Value, out: &mut String) {
    match value {
        Value::Object(map) => {
            let mut keys: Vec<&String> = map.keys().collect();
            keys.sort();
            out.push('{');
            for (i, k) in keys.iter().enumerate() {
                if i > 0 {
                    out.push(',');
                }
                out.push_str(&Value::String((*k).clone()).to_string());
                out.push(':');
                write_sorted(&map[k.as_str()], out);
            }
            out.push('}');
        }
        Value::Array(items) => {
            out.push('[');
            for (i, item) in items.iter().enumerate() {
                if i > 0 {
                    out.push(',');
                }
                write_sorted(item, out);
            }
            out.push(']');
        }
        scalar => out.push_str(&scalar.to_string()),
    }
}

/// Truncated SHA-256 of the canonical form.
pub fn content_hash(value: &Value) -> String {
    let mut hasher = Sha256::new();
    hasher.update(to_canonical_string(value).as_bytes());
    let mut digest = hex::encode(hasher.finalize());
    digest.truncate(HASH_LEN);
    digest
}

/// Structural equality of canonical forms.
pub fn content_equal(a: &Value, b: &Value) -> bool {
    canonicalize(a) == canonicalize(b)
}
