//! Greedy edge placement.
//!
//! Scores every machine on load balance plus mirror affinity and breaks
//! ties by hashing the canonicalized edge, so the choice is reproducible
//! for identical mirror and load state regardless of arrival order.

use crate::hash;
use crate::types::{MirrorSet, ProcId, VertexId};

const EPSILON: f64 = 1.0;
const SCORE_TOLERANCE: f64 = 1e-5;

/// Pick the machine that stores `(source, target)`.
///
/// A machine already mirroring the lower-degree endpoint is preferred: the
/// high-degree endpoint will fan out anyway, so placing the edge with the
/// small side bounds future mirror growth. The balance term keeps edge
/// counts level across the cluster.
pub fn pick_machine(
    source: VertexId,
    target: VertexId,
    source_degree: u64,
    target_degree: u64,
    src_mirrors: &MirrorSet,
    dst_mirrors: &MirrorSet,
    loads: &[u64],
) -> ProcId {
    let num_procs = loads.len();
    debug_assert!(num_procs >= 1);
    let min_load = loads.iter().copied().min().unwrap_or(0);
    let max_load = loads.iter().copied().max().unwrap_or(0);

    let source_small = target_degree >= source_degree;
    let target_small = target_degree <= source_degree;

    let mut scores = Vec::with_capacity(num_procs);
    let mut best = f64::NEG_INFINITY;
    for i in 0..num_procs {
        let balance = (max_load - loads[i]) as f64 / (EPSILON + (max_load - min_load) as f64);
        let sd1 = src_mirrors.contains(i as ProcId);
        let td1 = dst_mirrors.contains(i as ProcId);
        let sd2 = sd1 && source_small;
        let td2 = td1 && target_small;
        // A machine mirroring the small side of both endpoints would be
        // counted twice; d0 removes the double reward.
        let d0 = sd2 && td2;
        let affinity = sd1 as i32 + sd2 as i32 + td1 as i32 + td2 as i32 - d0 as i32;
        let score = balance + affinity as f64;
        best = best.max(score);
        scores.push(score);
    }

    let top: Vec<ProcId> = (0..num_procs)
        .filter(|&i| (scores[i] - best).abs() < SCORE_TOLERANCE)
        .map(|i| i as ProcId)
        .collect();
    top[(hash::hash_edge(source, target) % top.len() as u64) as usize]
}

#[cfg(test)]
mod tests {
    use super::*;

    fn mirrors(procs: &[ProcId]) -> MirrorSet {
        let mut set = MirrorSet::new();
        for &p in procs {
            set.set(p);
        }
        set
    }

    #[test]
    fn tie_break_is_deterministic() {
        let empty = MirrorSet::new();
        let loads = [0, 0, 0, 0];
        let first = pick_machine(1, 2, 1, 1, &empty, &empty, &loads);
        for _ in 0..10 {
            assert_eq!(pick_machine(1, 2, 1, 1, &empty, &empty, &loads), first);
        }
        // Direction does not matter: the edge is canonicalized.
        assert_eq!(pick_machine(2, 1, 1, 1, &empty, &empty, &loads), first);
    }

    #[test]
    fn prefers_machine_mirroring_an_endpoint() {
        let empty = MirrorSet::new();
        let loads = [0, 0, 0, 0];
        let picked = pick_machine(1, 2, 3, 3, &mirrors(&[2]), &empty, &loads);
        assert_eq!(picked, 2);
    }

    #[test]
    fn prefers_machine_mirroring_both_endpoints() {
        let loads = [0, 0, 0, 0];
        let picked = pick_machine(1, 2, 3, 3, &mirrors(&[1, 3]), &mirrors(&[3]), &loads);
        assert_eq!(picked, 3);
    }

    #[test]
    fn prefers_underloaded_machine_without_mirrors() {
        let empty = MirrorSet::new();
        let loads = [50, 0, 50, 50];
        assert_eq!(pick_machine(1, 2, 1, 1, &empty, &empty, &loads), 1);
    }

    #[test]
    fn mirror_affinity_outweighs_balance() {
        // Machine 0 mirrors the small-degree source: +2 affinity beats the
        // at-most-1.0 balance edge of an idle machine.
        let loads = [10, 0, 0, 0];
        let picked = pick_machine(1, 2, 1, 5, &mirrors(&[0]), &MirrorSet::new(), &loads);
        assert_eq!(picked, 0);
    }
}
