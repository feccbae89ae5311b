//! Wire records exchanged between machines during ingestion and finalize.
//!
//! Batches of these records are bincode-encoded before they reach the
//! transport, so the field order of every struct here is part of the wire
//! contract. The transport itself treats the payloads as opaque bytes.

use crate::types::{MirrorSet, ProcId, VertexId};
use serde::{Deserialize, Serialize};

/// Which endpoint's hash owner an edge record was addressed to.
///
/// An edge whose endpoints hash to different machines is delivered twice,
/// once per owner, and the flag tells each receiver which copy it holds.
/// Consumed only by the degree-counting de-duplication decision.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum HashFlag {
    /// Both endpoints hash to the same machine; single delivery.
    Unflagged,
    /// Copy held by the source vertex's hash owner.
    ObservedViaSource,
    /// Copy held by the target vertex's hash owner.
    ObservedViaTarget,
}

/// A buffered edge submission.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EdgeRecord<E> {
    pub source: VertexId,
    pub target: VertexId,
    pub data: E,
    pub flag: HashFlag,
}

/// A buffered vertex attribute submission.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VertexMsg<V> {
    pub vid: VertexId,
    pub data: V,
}

/// "Machine `proc` now holds a replica of `vid`", broadcast to every
/// machine so mirror tables converge without polling.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct MirrorNotice {
    pub vid: VertexId,
    pub proc: ProcId,
}

/// Exact degree of a vertex, shipped from its hash owner.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct DegreeRecord {
    pub vid: VertexId,
    pub degree: u64,
}

/// Per-replica contribution gathered at a vertex's master during metadata
/// synchronization.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct GatherRecord {
    pub vid: VertexId,
    pub num_in: u64,
    pub num_out: u64,
}

/// Authoritative metadata pushed from a master down to every replica.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MetaRecord<V> {
    pub vid: VertexId,
    pub num_in: u64,
    pub num_out: u64,
    pub data: V,
    pub mirrors: MirrorSet,
}
