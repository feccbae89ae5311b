//! Statistical load-balance property: on a uniform random edge stream the
//! per-machine edge counts stay close to each other.

use flock_graph::{GreedyIngress, IngressConfig, LocalCluster, Partition, Transport, VertexId};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

const NUM_PROCS: usize = 4;
const NUM_VERTICES: u64 = 1_200;
const NUM_EDGES: usize = 12_000;

#[test]
fn uniform_stream_stays_balanced() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .try_init();

    let mut rng = StdRng::seed_from_u64(42);
    let edges: Vec<(VertexId, VertexId)> = (0..NUM_EDGES)
        .map(|_| {
            (
                rng.gen_range(0..NUM_VERTICES),
                rng.gen_range(0..NUM_VERTICES),
            )
        })
        .collect();

    let partitions = LocalCluster::run(NUM_PROCS, |handle| {
        let me = handle.procid() as usize;
        let mut ingress: GreedyIngress<_, (), ()> =
            GreedyIngress::new(handle, IngressConfig::default());
        let mut graph: Partition<(), ()> = Partition::new();
        for (i, &(source, target)) in edges.iter().enumerate() {
            if i % NUM_PROCS == me {
                ingress.add_edge(source, target, ());
            }
        }
        ingress.finalize(&mut graph).expect("finalize");
        graph
    });

    let counts: Vec<usize> = partitions.iter().map(|g| g.num_local_edges()).collect();
    let total: usize = counts.iter().sum();
    assert_eq!(total, NUM_EDGES, "every edge stored exactly once");

    let max = *counts.iter().max().unwrap();
    let min = *counts.iter().min().unwrap();
    assert!(min > 0, "a machine ended up with no edges: {counts:?}");
    let ratio = max as f64 / min as f64;
    assert!(
        ratio < 2.0,
        "per-machine edge counts too skewed: {counts:?} (ratio {ratio:.3})"
    );

    // Replication cannot be below one replica per vertex or above one per
    // machine per vertex.
    let stats = partitions[0].stats();
    assert!(stats.num_replicas >= stats.num_vertices);
    assert!(stats.num_replicas <= stats.num_vertices * NUM_PROCS as u64);
}
