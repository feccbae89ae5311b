//! Streaming ingress: routes arriving edges and vertices to their
//! first-pass owners, and runs the barrier-synchronized finalize protocol
//! that turns buffered submissions into a consistent local partition.
//!
//! Every machine executes the same phase sequence in lockstep; cross-machine
//! state is read only after the flush or reduction that synchronized it.

use crate::assign;
use crate::config::IngressConfig;
use crate::degree::{self, DegreeSet};
use crate::exchange::{channel, BufferedExchange, Transport};
use crate::flying::FlyingVertices;
use crate::hash;
use crate::master;
use crate::mirror::MirrorTable;
use crate::partition::{GraphStats, Partition};
use crate::records::{DegreeRecord, EdgeRecord, GatherRecord, HashFlag, MetaRecord, MirrorNotice, VertexMsg};
use crate::types::{LocalVertexId, MirrorSet, ProcId, VertexId};
use flock_common::Result;
use rustc_hash::{FxHashMap, FxHashSet};
use serde::de::DeserializeOwned;
use serde::Serialize;
use tracing::{debug, info};

/// Merge strategy for duplicate vertex submissions.
pub type VertexCombiner<V> = Box<dyn Fn(&mut V, V) + Send + Sync>;

/// Degree-aware streaming edge partitioner.
///
/// `add_edge` and `add_vertex` only buffer; `finalize` runs the full
/// protocol and populates the local `Partition`. One instance per machine,
/// all driven in lockstep.
pub struct GreedyIngress<X: Transport + Clone, V, E> {
    transport: X,
    config: IngressConfig,
    standalone: bool,
    edge_exchange: BufferedExchange<EdgeRecord<E>, X>,
    vertex_exchange: BufferedExchange<VertexMsg<V>, X>,
    mirror_exchange: BufferedExchange<MirrorNotice, X>,
    mirrors: MirrorTable,
    combiner: Option<VertexCombiner<V>>,
}

impl<X, V, E> GreedyIngress<X, V, E>
where
    X: Transport + Clone,
    V: Clone + Default + Serialize + DeserializeOwned,
    E: Clone + Serialize + DeserializeOwned,
{
    pub fn new(transport: X, config: IngressConfig) -> Self {
        assert!(config.interval >= 1, "mirror broadcast interval must be at least 1");
        let standalone = transport.num_procs() == 1;
        Self {
            edge_exchange: BufferedExchange::new(transport.clone(), channel::EDGES),
            vertex_exchange: BufferedExchange::new(transport.clone(), channel::VERTICES),
            mirror_exchange: BufferedExchange::new(transport.clone(), channel::MIRRORS),
            transport,
            config,
            standalone,
            mirrors: MirrorTable::new(),
            combiner: None,
        }
    }

    /// Install a merge function applied when a vertex submission targets an
    /// already-populated slot. Without one, later submissions overwrite.
    pub fn set_vertex_combiner(&mut self, combiner: VertexCombiner<V>) {
        self.combiner = Some(combiner);
    }

    pub fn procid(&self) -> ProcId {
        self.transport.procid()
    }

    pub fn num_procs(&self) -> usize {
        self.transport.num_procs()
    }

    /// Buffer an edge. The record lands at each endpoint's hash owner; when
    /// the owners differ, both get a flagged copy so each endpoint's
    /// canonical observer sees the edge at least once. Never blocks.
    pub fn add_edge(&mut self, source: VertexId, target: VertexId, data: E) {
        if self.standalone {
            self.edge_exchange.send(
                0,
                EdgeRecord { source, target, data, flag: HashFlag::Unflagged },
            );
            return;
        }
        let num_procs = self.transport.num_procs();
        let source_owner = hash::hash_owner(source, num_procs);
        let target_owner = hash::hash_owner(target, num_procs);
        if source_owner == target_owner {
            self.edge_exchange.send(
                source_owner,
                EdgeRecord { source, target, data, flag: HashFlag::Unflagged },
            );
        } else {
            self.edge_exchange.send(
                source_owner,
                EdgeRecord {
                    source,
                    target,
                    data: data.clone(),
                    flag: HashFlag::ObservedViaSource,
                },
            );
            self.edge_exchange.send(
                target_owner,
                EdgeRecord { source, target, data, flag: HashFlag::ObservedViaTarget },
            );
        }
    }

    /// Buffer a vertex attribute update, routed to the vertex's hash owner.
    pub fn add_vertex(&mut self, vid: VertexId, data: V) {
        let owner = if self.standalone {
            0
        } else {
            hash::hash_owner(vid, self.transport.num_procs())
        };
        self.vertex_exchange.send(owner, VertexMsg { vid, data });
    }

    /// Run the finalize protocol: flush & fast-exit, degree exchange,
    /// greedy assignment, master election, local construction, payload
    /// merge, ownership, master handshake, id-table merge, metadata
    /// synchronization, aggregate statistics. Idempotent when nothing is
    /// pending anywhere in the cluster.
    pub fn finalize(&mut self, graph: &mut Partition<V, E>) -> Result<()> {
        let me = self.transport.procid();
        self.transport.barrier();

        let first_finalize =
            self.transport.all_reduce_sum(graph.num_local_vertices() as u64) == 0;

        if me == 0 {
            info!("finalizing graph");
        }

        // Flush pending submissions; fast-exit when the whole cluster has
        // nothing new.
        self.edge_exchange.flush()?;
        self.vertex_exchange.flush()?;
        let pending = (self.edge_exchange.len() + self.vertex_exchange.len()) as u64;
        if self.transport.all_reduce_sum(pending) == 0 {
            if me == 0 {
                info!("skipping finalize, no pending changes");
            }
            return Ok(());
        }

        // Degree exchange, greedy assignment, master election. Standalone
        // skips straight to construction: everything is owned by machine 0.
        let masters = if self.standalone {
            FxHashMap::default()
        } else {
            self.assign_pending()?
        };

        let lvid_start = graph.vid2lvid.len() as LocalVertexId;
        let mut new_ids: FxHashMap<VertexId, LocalVertexId> = FxHashMap::default();
        let mut touched: FxHashSet<LocalVertexId> = FxHashSet::default();

        // Local graph construction: map endpoints to stable local ids and
        // insert into the local adjacency store.
        for (_, batch) in self.edge_exchange.drain() {
            for rec in batch {
                let s = resolve(&graph.vid2lvid, &mut new_ids, &mut touched, lvid_start, rec.source);
                let t = resolve(&graph.vid2lvid, &mut new_ids, &mut touched, lvid_start, rec.target);
                graph.edges.add(s, t, rec.data);
            }
        }
        assert_eq!(
            graph.vid2lvid.len() + new_ids.len(),
            graph.edges.num_vertices(),
            "local id tables out of sync with the edge store"
        );
        debug!(
            proc = me,
            vertices = graph.edges.num_vertices(),
            edges = graph.edges.len(),
            "local graph populated"
        );

        // Vertex payload merge.
        graph.ensure_data(graph.edges.num_vertices());
        for (_, batch) in self.vertex_exchange.drain() {
            for msg in batch {
                let lvid = resolve(&graph.vid2lvid, &mut new_ids, &mut touched, lvid_start, msg.vid);
                match &self.combiner {
                    Some(combine) if (lvid as usize) < graph.data.len() => {
                        combine(&mut graph.data[lvid as usize], msg.data);
                    }
                    _ => graph.set_vertex_data(lvid, msg.data),
                }
            }
        }

        // Ownership assignment for newly allocated vertices. A vertex that
        // never entered the mirror table (payload-only) defaults to machine
        // 0; its hash owner hands it over in the handshake below.
        let local_nverts = graph.vid2lvid.len() + new_ids.len();
        graph.ensure_len(local_nverts);
        for (&gvid, &lvid) in &new_ids {
            let rec = &mut graph.records[lvid as usize];
            rec.gvid = gvid;
            rec.owner = masters.get(&gvid).copied().unwrap_or(0);
        }
        // Re-derive ownership for vertices this machine already held: new
        // replicas may have shifted the election, and every holder must
        // land on the same owner.
        for (&gvid, &lvid) in &graph.vid2lvid {
            if let Some(&owner) = masters.get(&gvid) {
                graph.records[lvid as usize].owner = owner;
            }
        }
        assert_eq!(
            local_nverts,
            graph.edges.num_vertices(),
            "vertex records out of sync with the edge store"
        );

        // Master handshake: announce every locally held, non-owned vertex
        // to its master; masters record the sender as a mirror and allocate
        // local ids for vertices they have never seen (flying vertices).
        let mut handshake: BufferedExchange<VertexId, X> =
            BufferedExchange::new(self.transport.clone(), channel::HANDSHAKE);
        for rec in graph.records.iter() {
            if rec.owner != me {
                handshake.send(rec.owner, rec.gvid);
            }
        }
        handshake.flush()?;
        // Masters rebuild their mirror lists from this round's
        // announcements. Every non-owned holder re-announces, so the
        // rebuilt set is complete; keeping the old bits would leave a
        // machine that just took over mastership listing itself.
        for rec in graph.records.iter_mut() {
            if rec.owner == me {
                rec.mirrors = MirrorSet::new();
            }
        }
        let flying = FlyingVertices::new();
        for (sender, batch) in handshake.drain() {
            for vid in batch {
                if let Some(&lvid) = graph.vid2lvid.get(&vid) {
                    graph.records[lvid as usize].mirrors.set(sender);
                    touched.insert(lvid);
                } else if let Some(&lvid) = new_ids.get(&vid) {
                    graph.records[lvid as usize].mirrors.set(sender);
                } else {
                    flying.record(vid, sender);
                }
            }
        }
        if !flying.is_empty() {
            debug!(proc = me, count = flying.len(), "allocating flying vertices");
        }
        for (gvid, mirrors) in flying.into_map() {
            let lvid = graph.records.len() as LocalVertexId;
            graph.ensure_len(lvid as usize + 1);
            let rec = &mut graph.records[lvid as usize];
            rec.gvid = gvid;
            rec.owner = me;
            rec.mirrors = mirrors;
            new_ids.insert(gvid, lvid);
        }

        // Fold the new mappings into the durable id table.
        if graph.vid2lvid.is_empty() {
            graph.vid2lvid = std::mem::take(&mut new_ids);
        } else {
            graph.vid2lvid.reserve(new_ids.len());
            for (gvid, lvid) in new_ids.drain() {
                graph.vid2lvid.insert(gvid, lvid);
            }
        }
        assert_eq!(
            graph.vid2lvid.len(),
            graph.records.len(),
            "id table out of sync with vertex records"
        );

        self.sync_metadata(graph, first_finalize, lvid_start, touched)?;

        // Aggregate statistics, read back by the analytics drivers.
        let owned = graph.records.iter().filter(|r| r.owner == me).count() as u64;
        graph.stats = GraphStats {
            num_vertices: self.transport.all_reduce_sum(owned),
            num_edges: self.transport.all_reduce_sum(graph.edges.len() as u64),
            num_replicas: self.transport.all_reduce_sum(graph.records.len() as u64),
        };
        if me == 0 {
            info!(
                vertices = graph.stats.num_vertices,
                edges = graph.stats.num_edges,
                replicas = graph.stats.num_replicas,
                "graph finalized"
            );
        }
        Ok(())
    }

    /// Degree phase plus the synchronous assignment pass. Returns the
    /// cluster-consistent master map derived from the converged mirror
    /// table.
    fn assign_pending(&mut self) -> Result<FxHashMap<VertexId, ProcId>> {
        let num_procs = self.transport.num_procs();

        // Count degree for everything we received; exact for vertices this
        // machine is the hash owner of.
        let mut received: Vec<EdgeRecord<E>> = Vec::with_capacity(self.edge_exchange.len());
        for (_, batch) in self.edge_exchange.drain() {
            received.extend(batch);
        }
        let mut degrees = degree::count_local(&received);

        // Ship exact counts to the other flagged-side owners, and take in
        // the counts they computed for us.
        let wanted = degree::request_sets(&received, num_procs);
        let mut degree_exchange: BufferedExchange<DegreeRecord, X> =
            BufferedExchange::new(self.transport.clone(), channel::DEGREES);
        for (dest, vids) in wanted.iter().enumerate() {
            for &vid in vids {
                let deg = degree::degree_of(&degrees, vid)?;
                degree_exchange.send(dest as ProcId, DegreeRecord { vid, degree: deg });
            }
        }
        degree_exchange.flush()?;
        for (_, batch) in degree_exchange.drain() {
            for rec in batch {
                degrees.insert(rec.vid, rec.degree);
            }
        }

        let kept = degree::filter_and_regroup(received, &degrees)?;
        let mut loads = vec![0u64; num_procs];

        self.transport.barrier();
        self.assignment_pass(kept, &degrees, &mut loads)?;
        self.edge_exchange.flush()?;

        Ok(master::elect_masters(&self.mirrors))
    }

    /// Stream the filtered, regrouped records through the greedy scorer,
    /// updating loads and the mirror table as bits appear. Broadcasts are
    /// batched: every `interval` edges, outstanding notices are pushed out
    /// and received ones drained in, bounding staleness; a final flush and
    /// drain leaves every machine's table complete.
    fn assignment_pass(
        &mut self,
        records: Vec<EdgeRecord<E>>,
        degrees: &DegreeSet,
        loads: &mut [u64],
    ) -> Result<()> {
        for (count, rec) in records.into_iter().enumerate() {
            let source_degree = degree::degree_of(degrees, rec.source)?;
            let target_degree = degree::degree_of(degrees, rec.target)?;
            let src_set = *self.mirrors.entry(rec.source);
            let dst_set = *self.mirrors.entry(rec.target);
            let best = assign::pick_machine(
                rec.source,
                rec.target,
                source_degree,
                target_degree,
                &src_set,
                &dst_set,
                loads,
            );
            let (source, target) = (rec.source, rec.target);
            self.edge_exchange.send(best, rec);
            self.note_mirror(source, best);
            self.note_mirror(target, best);
            loads[best as usize] += 1;

            if count % self.config.interval == 0 {
                self.mirror_exchange.partial_flush()?;
                self.drain_mirror_notices()?;
            }
        }
        // Residual notices: every machine flushes (synchronizing) and
        // drains, so the tables are complete before master election.
        self.mirror_exchange.flush()?;
        self.drain_mirror_notices()
    }

    /// Set the bit locally and, when it is new, notify every other machine.
    fn note_mirror(&mut self, vid: VertexId, proc: ProcId) {
        if self.mirrors.note(vid, proc) {
            let me = self.transport.procid();
            let notice = MirrorNotice { vid, proc };
            for p in 0..self.transport.num_procs() as ProcId {
                if p != me {
                    self.mirror_exchange.send(p, notice);
                }
            }
        }
    }

    fn drain_mirror_notices(&mut self) -> Result<()> {
        self.mirror_exchange.fetch()?;
        for (_, batch) in self.mirror_exchange.drain() {
            for notice in batch {
                self.mirrors.apply(&notice);
            }
        }
        Ok(())
    }

    /// Gather in/out degree, payload and mirror set at each changed
    /// vertex's master, then push the authoritative copy down to every
    /// replica. On the very first finalize every vertex is synchronized;
    /// afterwards master and mirrors first agree on the touched set.
    fn sync_metadata(
        &mut self,
        graph: &mut Partition<V, E>,
        first_finalize: bool,
        lvid_start: LocalVertexId,
        touched: FxHashSet<LocalVertexId>,
    ) -> Result<()> {
        let me = self.transport.procid();
        let total_lvids = graph.records.len();
        let (local_in, local_out) = graph.edges.degree_counts();

        let changed: FxHashSet<LocalVertexId> = if first_finalize {
            (0..total_lvids as LocalVertexId).collect()
        } else {
            let mut set = touched;
            for lvid in lvid_start..total_lvids as LocalVertexId {
                set.insert(lvid);
            }
            let mut sync_exchange: BufferedExchange<VertexId, X> =
                BufferedExchange::new(self.transport.clone(), channel::SYNC_SET);
            // Mirrors tell masters what they touched...
            for &lvid in &set {
                let rec = &graph.records[lvid as usize];
                if rec.owner != me {
                    sync_exchange.send(rec.owner, rec.gvid);
                }
            }
            sync_exchange.flush()?;
            for (_, batch) in sync_exchange.drain() {
                for vid in batch {
                    set.insert(graph.vid2lvid[&vid]);
                }
            }
            // ...and masters pull every other replica of a changed vertex in.
            let owned_changed: Vec<LocalVertexId> = set
                .iter()
                .copied()
                .filter(|&lvid| graph.records[lvid as usize].owner == me)
                .collect();
            for lvid in owned_changed {
                let rec = &graph.records[lvid as usize];
                for p in rec.mirrors.iter() {
                    if p != me {
                        sync_exchange.send(p, rec.gvid);
                    }
                }
            }
            sync_exchange.flush()?;
            for (_, batch) in sync_exchange.drain() {
                for vid in batch {
                    set.insert(graph.vid2lvid[&vid]);
                }
            }
            set
        };

        // Every replica contributes its local edge counts to the master.
        let mut gather_exchange: BufferedExchange<GatherRecord, X> =
            BufferedExchange::new(self.transport.clone(), channel::GATHER);
        for &lvid in &changed {
            let rec = &graph.records[lvid as usize];
            gather_exchange.send(
                rec.owner,
                GatherRecord {
                    vid: rec.gvid,
                    num_in: local_in[lvid as usize],
                    num_out: local_out[lvid as usize],
                },
            );
        }
        gather_exchange.flush()?;
        let mut totals: FxHashMap<VertexId, (u64, u64)> = FxHashMap::default();
        for (_, batch) in gather_exchange.drain() {
            for rec in batch {
                let entry = totals.entry(rec.vid).or_insert((0, 0));
                entry.0 += rec.num_in;
                entry.1 += rec.num_out;
            }
        }

        // Masters apply the totals and push the authoritative metadata to
        // every mirror, so all replicas read current values.
        let mut scatter_exchange: BufferedExchange<MetaRecord<V>, X> =
            BufferedExchange::new(self.transport.clone(), channel::SCATTER);
        for (&vid, &(num_in, num_out)) in &totals {
            let lvid = graph.vid2lvid[&vid] as usize;
            let rec = &mut graph.records[lvid];
            debug_assert_eq!(rec.owner, me, "gather for vertex {vid} landed on a non-master");
            rec.num_in = num_in;
            rec.num_out = num_out;
            let meta = MetaRecord {
                vid,
                num_in,
                num_out,
                data: graph.data[lvid].clone(),
                mirrors: rec.mirrors,
            };
            for p in meta.mirrors.iter() {
                if p != me {
                    scatter_exchange.send(p, meta.clone());
                }
            }
        }
        scatter_exchange.flush()?;
        for (_, batch) in scatter_exchange.drain() {
            for meta in batch {
                let lvid = graph.vid2lvid[&meta.vid] as usize;
                let rec = &mut graph.records[lvid];
                rec.num_in = meta.num_in;
                rec.num_out = meta.num_out;
                rec.mirrors = meta.mirrors;
                graph.data[lvid] = meta.data;
            }
        }
        Ok(())
    }
}

/// Stable local id for a global id: reuse the durable mapping, then this
/// round's allocations, then allocate the next dense id. Pre-existing
/// vertices are marked touched.
fn resolve(
    vid2lvid: &FxHashMap<VertexId, LocalVertexId>,
    new_ids: &mut FxHashMap<VertexId, LocalVertexId>,
    touched: &mut FxHashSet<LocalVertexId>,
    lvid_start: LocalVertexId,
    vid: VertexId,
) -> LocalVertexId {
    if let Some(&lvid) = vid2lvid.get(&vid) {
        touched.insert(lvid);
        return lvid;
    }
    if let Some(&lvid) = new_ids.get(&vid) {
        return lvid;
    }
    let lvid = lvid_start + new_ids.len() as LocalVertexId;
    new_ids.insert(vid, lvid);
    lvid
}
