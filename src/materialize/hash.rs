// src/materialize/hash.rs

use blake3::Hasher;

use crate::types::OutputConfigSet;

/// Written after every (key, content) pair.
pub const ENTRY_SEPARATOR: &[u8] = b"\n";

/// Compute a deterministic content hash over an output set.
///
/// Keys are sorted first so the hash does not depend on map iteration order.
/// Each key, its content and [`ENTRY_SEPARATOR`] are fed into one flat blake3
/// stream; key and value boundaries are not length-prefixed, so crafted
/// inputs can collide. This hash is for change detection only.
pub fn content_hash(output: &OutputConfigSet) -> String {
    let mut keys: Vec<&String> = output.keys().collect();
    keys.sort();

    let mut hasher = Hasher::new();
    for key in keys {
        hasher.update(key.as_bytes());
        hasher.update(&output[key]);
        hasher.update(ENTRY_SEPARATOR);
    }
    hasher.finalize().to_hex().to_string()
}
