//! Deterministic protocol hashing.
//!
//! Every machine must compute identical values for identical input, across
//! runs and across the cluster: first-pass routing, greedy tie-breaking and
//! master election all assume it. xxh3 with a fixed seed provides that.

use crate::types::{ProcId, VertexId};
use xxhash_rust::xxh3::xxh3_64_with_seed;

const VERTEX_SEED: u64 = 0x9e37_79b9_7f4a_7c15;
const EDGE_SEED: u64 = 0xc2b2_ae3d_27d4_eb4f;

pub fn hash_vertex(vid: VertexId) -> u64 {
    xxh3_64_with_seed(&vid.to_le_bytes(), VERTEX_SEED)
}

/// Hash of the canonicalized edge `(min, max)`, independent of direction.
pub fn hash_edge(a: VertexId, b: VertexId) -> u64 {
    let (lo, hi) = if a <= b { (a, b) } else { (b, a) };
    let mut buf = [0u8; 16];
    buf[..8].copy_from_slice(&lo.to_le_bytes());
    buf[8..].copy_from_slice(&hi.to_le_bytes());
    xxh3_64_with_seed(&buf, EDGE_SEED)
}

/// First-pass owner of a vertex: `hash(vid) mod num_procs`.
pub fn hash_owner(vid: VertexId, num_procs: usize) -> ProcId {
    (hash_vertex(vid) % num_procs as u64) as ProcId
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn vertex_hash_is_stable() {
        assert_eq!(hash_vertex(7), hash_vertex(7));
        assert_ne!(hash_vertex(7), hash_vertex(8));
    }

    #[test]
    fn edge_hash_ignores_direction() {
        assert_eq!(hash_edge(3, 9), hash_edge(9, 3));
    }

    #[test]
    fn owner_in_range() {
        for vid in 0..1000 {
            assert!((hash_owner(vid, 5) as usize) < 5);
        }
    }
}
