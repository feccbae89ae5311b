//! In-process cluster transport.
//!
//! One participant per thread, mutexed per-channel mailboxes, a shared
//! barrier and a slot-vector reduction. This backs the test suites and
//! single-process deployments; a real deployment supplies its own
//! `Transport` over the network.

use crate::exchange::{channel, Transport};
use crate::types::{ProcId, MAX_PROCS};
use flock_common::Result;
use parking_lot::Mutex;
use std::sync::{Arc, Barrier};

struct Shared {
    num_procs: usize,
    // One mailbox per (channel, destination).
    mailboxes: Vec<Mutex<Vec<(ProcId, Vec<u8>)>>>,
    barrier: Barrier,
    reduce: Mutex<Vec<u64>>,
}

pub struct LocalCluster {
    shared: Arc<Shared>,
}

/// One machine's endpoint into a `LocalCluster`. Cheap to clone.
#[derive(Clone)]
pub struct ClusterHandle {
    shared: Arc<Shared>,
    proc: ProcId,
}

impl LocalCluster {
    pub fn new(num_procs: usize) -> Self {
        assert!(
            num_procs >= 1 && num_procs <= MAX_PROCS,
            "cluster size {num_procs} out of range"
        );
        let mailboxes = (0..channel::COUNT * num_procs)
            .map(|_| Mutex::new(Vec::new()))
            .collect();
        Self {
            shared: Arc::new(Shared {
                num_procs,
                mailboxes,
                barrier: Barrier::new(num_procs),
                reduce: Mutex::new(vec![0; num_procs]),
            }),
        }
    }

    pub fn handle(&self, proc: ProcId) -> ClusterHandle {
        assert!((proc as usize) < self.shared.num_procs);
        ClusterHandle {
            shared: Arc::clone(&self.shared),
            proc,
        }
    }

    /// Run one closure per machine on its own thread, returning the results
    /// in machine order. Panics in any participant propagate.
    pub fn run<R, F>(num_procs: usize, f: F) -> Vec<R>
    where
        R: Send,
        F: Fn(ClusterHandle) -> R + Send + Sync,
    {
        let cluster = Self::new(num_procs);
        std::thread::scope(|s| {
            let f = &f;
            let joins: Vec<_> = (0..num_procs)
                .map(|p| {
                    let handle = cluster.handle(p as ProcId);
                    s.spawn(move || f(handle))
                })
                .collect();
            joins
                .into_iter()
                .map(|j| j.join().expect("cluster participant panicked"))
                .collect()
        })
    }
}

impl Shared {
    fn mailbox(&self, chan: u8, dest: ProcId) -> &Mutex<Vec<(ProcId, Vec<u8>)>> {
        assert!((chan as usize) < channel::COUNT, "unknown channel {chan}");
        &self.mailboxes[chan as usize * self.num_procs + dest as usize]
    }
}

impl Transport for ClusterHandle {
    fn procid(&self) -> ProcId {
        self.proc
    }

    fn num_procs(&self) -> usize {
        self.shared.num_procs
    }

    fn post(&self, chan: u8, to: ProcId, payload: Vec<u8>) -> Result<()> {
        self.shared.mailbox(chan, to).lock().push((self.proc, payload));
        Ok(())
    }

    fn collect(&self, chan: u8) -> Result<Vec<(ProcId, Vec<u8>)>> {
        Ok(std::mem::take(
            &mut *self.shared.mailbox(chan, self.proc).lock(),
        ))
    }

    fn barrier(&self) {
        self.shared.barrier.wait();
    }

    fn all_reduce_sum(&self, value: u64) -> u64 {
        {
            let mut slots = self.shared.reduce.lock();
            slots[self.proc as usize] = value;
        }
        self.shared.barrier.wait();
        let total = self.shared.reduce.lock().iter().sum();
        // Hold everyone until the slots have been read on all machines.
        self.shared.barrier.wait();
        total
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::exchange::BufferedExchange;

    #[test]
    fn all_reduce_sums_across_participants() {
        let totals = LocalCluster::run(4, |h| {
            let first = h.all_reduce_sum(h.procid() as u64 + 1);
            // Reusable: a second reduction must not see stale slots.
            let second = h.all_reduce_sum(1);
            (first, second)
        });
        for (first, second) in totals {
            assert_eq!(first, 1 + 2 + 3 + 4);
            assert_eq!(second, 4);
        }
    }

    #[test]
    fn exchange_roundtrip_between_two_machines() {
        let results = LocalCluster::run(2, |h| {
            let me = h.procid();
            let other = 1 - me;
            let mut ex: BufferedExchange<u64, _> =
                BufferedExchange::new(h, channel::EDGES);
            ex.send(other, 100 + me as u64);
            ex.send(other, 200 + me as u64);
            ex.flush().expect("flush");
            ex.drain()
        });
        assert_eq!(results[0], vec![(1, vec![101, 201])]);
        assert_eq!(results[1], vec![(0, vec![100, 200])]);
    }

    #[test]
    fn loopback_delivery_to_self() {
        let results = LocalCluster::run(1, |h| {
            let mut ex: BufferedExchange<u32, _> =
                BufferedExchange::new(h, channel::GATHER);
            ex.send(0, 9);
            ex.flush().expect("flush");
            ex.drain()
        });
        assert_eq!(results[0], vec![(0, vec![9])]);
    }

    #[test]
    fn channels_are_isolated() {
        let results = LocalCluster::run(1, |h| {
            let mut a: BufferedExchange<u32, _> =
                BufferedExchange::new(h.clone(), channel::EDGES);
            let mut b: BufferedExchange<u32, _> =
                BufferedExchange::new(h, channel::MIRRORS);
            a.send(0, 1);
            a.flush().expect("flush");
            b.fetch().expect("fetch");
            (a.len(), b.len())
        });
        assert_eq!(results[0], (1, 0));
    }
}
