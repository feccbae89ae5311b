//! Flying vertices: global ids a master learns about from the handshake
//! without ever having seen them locally.
//!
//! Resolver threads may hit the same unknown id concurrently; the lock
//! guarantees a single entry (and later a single local id) per global id
//! no matter which thread records it first.

use crate::types::{MirrorSet, ProcId, VertexId};
use parking_lot::Mutex;
use rustc_hash::FxHashMap;

#[derive(Default)]
pub struct FlyingVertices {
    inner: Mutex<FxHashMap<VertexId, MirrorSet>>,
}

impl FlyingVertices {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record that `sender` holds a replica of the unknown vertex `vid`.
    pub fn record(&self, vid: VertexId, sender: ProcId) {
        self.inner.lock().entry(vid).or_default().set(sender);
    }

    pub fn len(&self) -> usize {
        self.inner.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.lock().is_empty()
    }

    /// Consume the table for local id allocation.
    pub fn into_map(self) -> FxHashMap<VertexId, MirrorSet> {
        self.inner.into_inner()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn one_entry_per_global_id() {
        let flying = FlyingVertices::new();
        flying.record(10, 1);
        flying.record(10, 2);
        flying.record(11, 1);
        assert_eq!(flying.len(), 2);
        let map = flying.into_map();
        assert_eq!(map[&10].count(), 2);
        assert_eq!(map[&11].count(), 1);
    }
}
