//! Streaming ingestion and partitioning for distributed graph-parallel
//! computation.
//!
//! Edges and vertex attributes arrive in arbitrary batches on any machine;
//! `finalize` decides which machine permanently owns each vertex and which
//! machine stores each edge, leaving every machine with a mutually
//! consistent, non-overlapping slice of the graph.

pub mod assign;
pub mod cluster;
pub mod config;
pub mod degree;
pub mod exchange;
pub mod flying;
pub mod hash;
pub mod ingress;
pub mod master;
pub mod mirror;
pub mod partition;
pub mod records;
pub mod types;

pub use cluster::{ClusterHandle, LocalCluster};
pub use config::IngressConfig;
pub use exchange::Transport;
pub use ingress::GreedyIngress;
pub use partition::{GraphStats, Partition, VertexRecord};
pub use types::{LocalVertexId, MirrorSet, ProcId, VertexId, MAX_PROCS};
