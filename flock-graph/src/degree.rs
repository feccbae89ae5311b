//! Degree collection and edge de-duplication.
//!
//! An edge whose endpoints hash to different machines is delivered twice.
//! Before assignment, every machine counts endpoint appearances in the
//! records it received (exact for vertices it is the hash owner of) and
//! ships the counts the other flagged-side owner needs. Both owners then
//! apply the same keep rule, so each edge survives on exactly one machine.

use crate::hash;
use crate::records::{EdgeRecord, HashFlag};
use crate::types::VertexId;
use flock_common::{Error, Result};
use rustc_hash::{FxHashMap, FxHashSet};

/// Total in+out degree per vertex, cluster-consistent for every vertex
/// referenced locally once the exchange has run.
pub type DegreeSet = FxHashMap<VertexId, u64>;

/// Count endpoint appearances in locally received records. One increment
/// per endpoint per record, regardless of flag; a self-loop counts 2.
pub(crate) fn count_local<E>(records: &[EdgeRecord<E>]) -> DegreeSet {
    let mut degrees = DegreeSet::default();
    for rec in records {
        *degrees.entry(rec.source).or_insert(0) += 1;
        *degrees.entry(rec.target).or_insert(0) += 1;
    }
    degrees
}

/// For every flagged record, the far endpoint's hash owner also holds a
/// copy of this edge and needs the near endpoint's exact degree for the
/// keep decision. Returns, per destination machine, the vertex ids whose
/// counts must be shipped there.
pub(crate) fn request_sets<E>(
    records: &[EdgeRecord<E>],
    num_procs: usize,
) -> Vec<FxHashSet<VertexId>> {
    let mut wanted = vec![FxHashSet::default(); num_procs];
    for rec in records {
        match rec.flag {
            HashFlag::Unflagged => {}
            HashFlag::ObservedViaSource => {
                let dest = hash::hash_owner(rec.target, num_procs);
                wanted[dest as usize].insert(rec.source);
            }
            HashFlag::ObservedViaTarget => {
                let dest = hash::hash_owner(rec.source, num_procs);
                wanted[dest as usize].insert(rec.target);
            }
        }
    }
    wanted
}

/// Whether this machine keeps a record for assignment. Exactly one of the
/// two flagged copies survives: the target-side copy when
/// `degree(source) >= degree(target)` (ties included), the source-side copy
/// otherwise.
pub(crate) fn keeps(flag: HashFlag, source_degree: u64, target_degree: u64) -> bool {
    match flag {
        HashFlag::Unflagged => true,
        HashFlag::ObservedViaSource => source_degree < target_degree,
        HashFlag::ObservedViaTarget => source_degree >= target_degree,
    }
}

pub(crate) fn degree_of(degrees: &DegreeSet, vid: VertexId) -> Result<u64> {
    degrees
        .get(&vid)
        .copied()
        .ok_or(Error::DegreeUnavailable(vid))
}

/// Drop the duplicate copies of doubly-delivered edges, then regroup the
/// survivors by source vertex so the greedy pass revisits each source's
/// mirror entry in one run.
pub(crate) fn filter_and_regroup<E>(
    records: Vec<EdgeRecord<E>>,
    degrees: &DegreeSet,
) -> Result<Vec<EdgeRecord<E>>> {
    let mut by_source: FxHashMap<VertexId, Vec<EdgeRecord<E>>> = FxHashMap::default();
    let mut kept = 0usize;
    for rec in records {
        let source_degree = degree_of(degrees, rec.source)?;
        let target_degree = degree_of(degrees, rec.target)?;
        if keeps(rec.flag, source_degree, target_degree) {
            kept += 1;
            by_source.entry(rec.source).or_default().push(rec);
        }
    }
    let mut out = Vec::with_capacity(kept);
    for (_, group) in by_source {
        out.extend(group);
    }
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn rec(source: VertexId, target: VertexId, flag: HashFlag) -> EdgeRecord<()> {
        EdgeRecord {
            source,
            target,
            data: (),
            flag,
        }
    }

    #[test]
    fn unflagged_always_kept() {
        assert!(keeps(HashFlag::Unflagged, 0, 0));
        assert!(keeps(HashFlag::Unflagged, 1, 100));
    }

    #[test]
    fn higher_degree_source_keeps_target_side_copy() {
        assert!(keeps(HashFlag::ObservedViaTarget, 5, 3));
        assert!(!keeps(HashFlag::ObservedViaSource, 5, 3));
    }

    #[test]
    fn higher_degree_target_keeps_source_side_copy() {
        assert!(keeps(HashFlag::ObservedViaSource, 2, 9));
        assert!(!keeps(HashFlag::ObservedViaTarget, 2, 9));
    }

    #[test]
    fn ties_keep_the_target_side_copy() {
        assert!(keeps(HashFlag::ObservedViaTarget, 4, 4));
        assert!(!keeps(HashFlag::ObservedViaSource, 4, 4));
    }

    #[test]
    fn exactly_one_copy_survives() {
        for (s, t) in [(0u64, 1u64), (1, 0), (3, 3)] {
            let kept = [HashFlag::ObservedViaSource, HashFlag::ObservedViaTarget]
                .iter()
                .filter(|&&f| keeps(f, s, t))
                .count();
            assert_eq!(kept, 1, "degrees ({s}, {t})");
        }
    }

    #[test]
    fn self_loop_counts_twice() {
        let degrees = count_local(&[rec(7, 7, HashFlag::Unflagged)]);
        assert_eq!(degrees[&7], 2);
    }

    #[test]
    fn regroup_clusters_by_source() {
        let records = vec![
            rec(1, 2, HashFlag::Unflagged),
            rec(3, 4, HashFlag::Unflagged),
            rec(1, 5, HashFlag::Unflagged),
        ];
        let degrees = count_local(&records);
        let out = filter_and_regroup(records, &degrees).expect("regroup");
        assert_eq!(out.len(), 3);
        let first_pos = out.iter().position(|r| r.source == 1).unwrap();
        assert_eq!(
            out[first_pos + 1].source,
            1,
            "records with the same source must be adjacent"
        );
    }

    #[test]
    fn missing_degree_is_fatal() {
        let records = vec![rec(1, 2, HashFlag::Unflagged)];
        let degrees = DegreeSet::default();
        assert!(filter_and_regroup(records, &degrees).is_err());
    }
}
