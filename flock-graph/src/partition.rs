//! The machine-local partition: id tables, vertex records, edge storage.
//!
//! This is the structure `finalize` hands to the execution engine: a
//! global↔local id table, one `VertexRecord` per local vertex, the vertex
//! payload array and the local adjacency store, plus the cluster-wide
//! aggregate totals from the last finalize.

use crate::types::{LocalVertexId, MirrorSet, ProcId, VertexId};
use rustc_hash::FxHashMap;

/// Per-vertex metadata held for every local replica.
///
/// `mirrors` lists the machines holding non-owning replicas; the owner is
/// not a member of its own mirror set.
#[derive(Debug, Clone, Default)]
pub struct VertexRecord {
    pub gvid: VertexId,
    pub owner: ProcId,
    pub mirrors: MirrorSet,
    pub num_in: u64,
    pub num_out: u64,
}

/// Append-only local adjacency storage over local vertex ids.
#[derive(Debug)]
pub struct EdgeStore<E> {
    src: Vec<LocalVertexId>,
    dst: Vec<LocalVertexId>,
    data: Vec<E>,
    num_vertices: usize,
}

impl<E> Default for EdgeStore<E> {
    fn default() -> Self {
        Self {
            src: Vec::new(),
            dst: Vec::new(),
            data: Vec::new(),
            num_vertices: 0,
        }
    }
}

impl<E> EdgeStore<E> {
    pub fn add(&mut self, src: LocalVertexId, dst: LocalVertexId, data: E) {
        self.num_vertices = self.num_vertices.max(src.max(dst) as usize + 1);
        self.src.push(src);
        self.dst.push(dst);
        self.data.push(data);
    }

    pub fn len(&self) -> usize {
        self.src.len()
    }

    pub fn is_empty(&self) -> bool {
        self.src.is_empty()
    }

    pub fn num_vertices(&self) -> usize {
        self.num_vertices
    }

    /// Grow the vertex space. Never shrinks.
    pub fn resize_vertices(&mut self, n: usize) {
        self.num_vertices = self.num_vertices.max(n);
    }

    pub fn iter(&self) -> impl Iterator<Item = (LocalVertexId, LocalVertexId, &E)> + '_ {
        self.src
            .iter()
            .zip(self.dst.iter())
            .zip(self.data.iter())
            .map(|((&s, &d), e)| (s, d, e))
    }

    /// Recount local in/out degree per vertex.
    pub fn degree_counts(&self) -> (Vec<u64>, Vec<u64>) {
        let mut num_in = vec![0u64; self.num_vertices];
        let mut num_out = vec![0u64; self.num_vertices];
        for (&s, &d) in self.src.iter().zip(self.dst.iter()) {
            num_out[s as usize] += 1;
            num_in[d as usize] += 1;
        }
        (num_in, num_out)
    }
}

/// Cluster-wide totals after a finalize, identical on every machine.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct GraphStats {
    /// Vertices with a master anywhere in the cluster.
    pub num_vertices: u64,
    /// Edges stored anywhere in the cluster.
    pub num_edges: u64,
    /// Local vertex replicas summed over all machines.
    pub num_replicas: u64,
}

/// One machine's view of the distributed graph.
pub struct Partition<V, E> {
    pub(crate) vid2lvid: FxHashMap<VertexId, LocalVertexId>,
    pub(crate) records: Vec<VertexRecord>,
    pub(crate) data: Vec<V>,
    pub(crate) edges: EdgeStore<E>,
    pub(crate) stats: GraphStats,
}

impl<V: Clone + Default, E> Default for Partition<V, E> {
    fn default() -> Self {
        Self::new()
    }
}

impl<V: Clone + Default, E> Partition<V, E> {
    pub fn new() -> Self {
        Self {
            vid2lvid: FxHashMap::default(),
            records: Vec::new(),
            data: Vec::new(),
            edges: EdgeStore::default(),
            stats: GraphStats::default(),
        }
    }

    pub fn num_local_vertices(&self) -> usize {
        self.records.len()
    }

    pub fn num_local_edges(&self) -> usize {
        self.edges.len()
    }

    /// Local id of a global vertex, if this machine holds a replica.
    pub fn lvid(&self, vid: VertexId) -> Option<LocalVertexId> {
        self.vid2lvid.get(&vid).copied()
    }

    pub fn record(&self, lvid: LocalVertexId) -> &VertexRecord {
        &self.records[lvid as usize]
    }

    pub fn records(&self) -> &[VertexRecord] {
        &self.records
    }

    pub fn vertex_data(&self, lvid: LocalVertexId) -> &V {
        &self.data[lvid as usize]
    }

    pub fn edges(&self) -> &EdgeStore<E> {
        &self.edges
    }

    /// The global↔local id table.
    pub fn local_ids(&self) -> impl Iterator<Item = (VertexId, LocalVertexId)> + '_ {
        self.vid2lvid.iter().map(|(&g, &l)| (g, l))
    }

    /// Totals from the last finalize.
    pub fn stats(&self) -> GraphStats {
        self.stats
    }

    /// Grow records, payload slots and the edge store's vertex space to
    /// hold `n` local vertices.
    pub(crate) fn ensure_len(&mut self, n: usize) {
        if self.records.len() < n {
            self.records.resize_with(n, VertexRecord::default);
        }
        if self.data.len() < n {
            self.data.resize_with(n, V::default);
        }
        self.edges.resize_vertices(n);
    }

    /// Grow payload slots only (edge construction precedes record setup).
    pub(crate) fn ensure_data(&mut self, n: usize) {
        if self.data.len() < n {
            self.data.resize_with(n, V::default);
        }
    }

    pub(crate) fn set_vertex_data(&mut self, lvid: LocalVertexId, value: V) {
        self.ensure_data(lvid as usize + 1);
        self.data[lvid as usize] = value;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn edge_store_counts_degrees() {
        let mut store: EdgeStore<()> = EdgeStore::default();
        store.add(0, 1, ());
        store.add(0, 2, ());
        store.add(2, 0, ());
        let (num_in, num_out) = store.degree_counts();
        assert_eq!(num_out, vec![2, 0, 1]);
        assert_eq!(num_in, vec![1, 1, 1]);
        assert_eq!(store.num_vertices(), 3);
    }

    #[test]
    fn ensure_len_never_shrinks() {
        let mut p: Partition<u32, ()> = Partition::new();
        p.ensure_len(4);
        p.ensure_len(2);
        assert_eq!(p.num_local_vertices(), 4);
        assert_eq!(p.data.len(), 4);
    }
}
