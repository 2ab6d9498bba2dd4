//! Node-level result caching, keyed by a deterministic input
//! fingerprint (`spec.md` §4.3).

use std::num::NonZeroUsize;
use std::sync::Mutex;

use lru::LruCache;
use sha2::{Digest, Sha256};
use serde_json::Value;

use crate::node::NodeOutput;

/// Declares which channels feed a node's cache fingerprint, and the
/// cache's capacity.
#[derive(Debug, Clone)]
pub struct CachePolicy {
    pub fingerprint_channels: Vec<String>,
    pub capacity: usize,
}

impl CachePolicy {
    pub fn new(fingerprint_channels: Vec<String>, capacity: usize) -> Self {
        Self {
            fingerprint_channels,
            capacity,
        }
    }
}

/// Hashes the node-id, graph-version, and the current values of the
/// channels a [`CachePolicy`] names into one fingerprint.
pub fn fingerprint(node_id: &str, graph_version: &str, channel_values: &[(&str, &Value)]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(node_id.as_bytes());
    hasher.update(b"\0");
    hasher.update(graph_version.as_bytes());
    for (channel_id, value) in channel_values {
        hasher.update(b"\0");
        hasher.update(channel_id.as_bytes());
        hasher.update(b"=");
        hasher.update(value.to_string().as_bytes());
    }
    hex::encode(hasher.finalize())
}

/// A bounded-size, in-memory, per-node LRU of fingerprint → output.
pub struct NodeCache {
    entries: Mutex<LruCache<String, NodeOutput>>,
}

impl NodeCache {
    pub fn new(capacity: usize) -> Self {
        Self {
            entries: Mutex::new(LruCache::new(NonZeroUsize::new(capacity.max(1)).expect("capacity is nonzero"))),
        }
    }

    /// Returns a clone of the cached output for `key`, if present,
    /// without disturbing the caller's ability to insert on miss.
    pub fn get(&self, key: &str) -> Option<NodeOutput> {
        self.entries.lock().expect("cache lock poisoned").get(key).cloned()
    }

    pub fn put(&self, key: String, output: NodeOutput) {
        self.entries.lock().expect("cache lock poisoned").put(key, output);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::node::NextDirective;
    use crate::store::WriteBatch;

    #[test]
    fn fingerprint_changes_when_a_watched_channel_changes() {
        let a = Value::from(1);
        let b = Value::from(2);
        let fp1 = fingerprint("n1", "g1", &[("c", &a)]);
        let fp2 = fingerprint("n1", "g1", &[("c", &b)]);
        assert_ne!(fp1, fp2);
    }

    #[test]
    fn fingerprint_is_stable_for_same_inputs() {
        let v = Value::from("x");
        assert_eq!(fingerprint("n1", "g1", &[("c", &v)]), fingerprint("n1", "g1", &[("c", &v)]));
    }

    #[test]
    fn cache_put_then_get_round_trips() {
        let cache = NodeCache::new(4);
        let output = NodeOutput::commit(WriteBatch::new(), NextDirective::End);
        cache.put("k1".to_string(), output);
        assert!(cache.get("k1").is_some());
        assert!(cache.get("missing").is_none());
    }
}
