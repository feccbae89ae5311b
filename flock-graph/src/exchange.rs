//! Buffered record exchange over an abstract transport.
//!
//! The network layer is an external collaborator: this module owns record
//! batching and encoding, not delivery. A `flush` is the only operation
//! that synchronizes; `send` never blocks.

use crate::types::ProcId;
use flock_common::{Error, Result};
use serde::de::DeserializeOwned;
use serde::Serialize;

/// Channels multiplexed over one transport. Each exchange binds to one.
pub mod channel {
    pub const EDGES: u8 = 0;
    pub const VERTICES: u8 = 1;
    pub const MIRRORS: u8 = 2;
    pub const DEGREES: u8 = 3;
    pub const HANDSHAKE: u8 = 4;
    pub const SYNC_SET: u8 = 5;
    pub const GATHER: u8 = 6;
    pub const SCATTER: u8 = 7;

    pub const COUNT: usize = 8;
}

/// Message-exchange transport between cluster machines.
///
/// Implementations must deliver posted payloads reliably and preserve the
/// posting order per (sender, channel). `barrier` and `all_reduce_sum`
/// block until every machine participates; there is no timeout, so a
/// stalled participant stalls the whole group (fail-stop).
pub trait Transport: Send + Sync {
    fn procid(&self) -> ProcId;

    fn num_procs(&self) -> usize;

    /// Deliver an opaque payload to machine `to` on `chan`. Sending to the
    /// local machine is valid and loops back.
    fn post(&self, chan: u8, to: ProcId, payload: Vec<u8>) -> Result<()>;

    /// Drain every payload delivered to this machine on `chan` so far.
    fn collect(&self, chan: u8) -> Result<Vec<(ProcId, Vec<u8>)>>;

    fn barrier(&self);

    fn all_reduce_sum(&self, value: u64) -> u64;
}

/// Per-destination record buffering on top of one transport channel.
///
/// Mirrors the protocol's buffered-exchange contract: records accumulate
/// locally until a partial flush (posts without synchronizing) or a flush
/// (posts, waits for every machine, then pulls everything delivered here,
/// so the inbox is phase-complete on return).
pub struct BufferedExchange<T, X: Transport> {
    transport: X,
    chan: u8,
    outbound: Vec<Vec<T>>,
    inbox: Vec<(ProcId, Vec<T>)>,
    received: usize,
}

impl<T, X> BufferedExchange<T, X>
where
    T: Serialize + DeserializeOwned,
    X: Transport,
{
    pub fn new(transport: X, chan: u8) -> Self {
        let num_procs = transport.num_procs();
        Self {
            transport,
            chan,
            outbound: (0..num_procs).map(|_| Vec::new()).collect(),
            inbox: Vec::new(),
            received: 0,
        }
    }

    /// Buffer a record for `to`. Never blocks, never touches the network.
    pub fn send(&mut self, to: ProcId, record: T) {
        self.outbound[to as usize].push(record);
    }

    /// Post all buffered records without synchronizing. Receivers may or
    /// may not have picked them up when this returns.
    pub fn partial_flush(&mut self) -> Result<()> {
        for (dest, buf) in self.outbound.iter_mut().enumerate() {
            if buf.is_empty() {
                continue;
            }
            let batch = std::mem::take(buf);
            let payload =
                bincode::serialize(&batch).map_err(|e| Error::Transport(e.to_string()))?;
            self.transport.post(self.chan, dest as ProcId, payload)?;
        }
        Ok(())
    }

    /// Post, wait for every machine to do the same, then pull everything
    /// delivered here. On return the inbox holds every record any machine
    /// sent to us on this channel during the phase.
    pub fn flush(&mut self) -> Result<()> {
        self.partial_flush()?;
        self.transport.barrier();
        self.fetch()
    }

    /// Pull delivered batches into the inbox without synchronizing.
    pub fn fetch(&mut self) -> Result<()> {
        for (from, payload) in self.transport.collect(self.chan)? {
            let batch: Vec<T> =
                bincode::deserialize(&payload).map_err(|e| Error::Transport(e.to_string()))?;
            self.received += batch.len();
            self.inbox.push((from, batch));
        }
        Ok(())
    }

    /// Number of records currently in the inbox.
    pub fn len(&self) -> usize {
        self.received
    }

    pub fn is_empty(&self) -> bool {
        self.received == 0
    }

    /// Consume the inbox, batch by batch with the sending machine.
    pub fn drain(&mut self) -> Vec<(ProcId, Vec<T>)> {
        self.received = 0;
        std::mem::take(&mut self.inbox)
    }
}
