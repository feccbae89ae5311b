//! Eventually-consistent mirror table.
//!
//! Every machine keeps its own vertex → replica-set map. Entries appear
//! lazily on first reference and bits are only ever set, never cleared, so
//! applying broadcast notices in any order converges to the same table.
//! Completeness holds only after the assignment pass's final flush+drain;
//! between partial flushes the views are allowed to differ.

use crate::records::MirrorNotice;
use crate::types::{MirrorSet, ProcId, VertexId};
use rustc_hash::FxHashMap;

#[derive(Default)]
pub struct MirrorTable {
    entries: FxHashMap<VertexId, MirrorSet>,
}

impl MirrorTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Entry for `vid`, created empty on first reference.
    pub fn entry(&mut self, vid: VertexId) -> &mut MirrorSet {
        self.entries.entry(vid).or_default()
    }

    pub fn get(&self, vid: VertexId) -> Option<&MirrorSet> {
        self.entries.get(&vid)
    }

    /// Record "machine `proc` holds a replica of `vid`" locally. Returns
    /// true when the bit was not set before, i.e. the caller must
    /// broadcast a notice.
    pub fn note(&mut self, vid: VertexId, proc: ProcId) -> bool {
        let set = self.entry(vid);
        if set.contains(proc) {
            return false;
        }
        set.set(proc);
        true
    }

    pub fn apply(&mut self, notice: &MirrorNotice) {
        self.entry(notice.vid).set(notice.proc);
    }

    pub fn iter(&self) -> impl Iterator<Item = (VertexId, &MirrorSet)> + '_ {
        self.entries.iter().map(|(&vid, set)| (vid, set))
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn note_reports_new_bits_once() {
        let mut table = MirrorTable::new();
        assert!(table.note(1, 3));
        assert!(!table.note(1, 3));
        assert!(table.note(1, 4));
        assert_eq!(table.get(1).unwrap().count(), 2);
    }

    #[test]
    fn apply_matches_note() {
        let mut a = MirrorTable::new();
        let mut b = MirrorTable::new();
        a.note(9, 0);
        a.note(9, 2);
        // Applying the equivalent notices in reverse order converges.
        b.apply(&MirrorNotice { vid: 9, proc: 2 });
        b.apply(&MirrorNotice { vid: 9, proc: 0 });
        assert_eq!(a.get(9), b.get(9));
    }
}
