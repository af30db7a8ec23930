//! Authority side of the delta stream
//!
//! [`DeltaOutbox`] is the [`ReplicationBridge`] a server world pushes into.
//! It numbers every change per entity and holds the packets until
//! [`flush`](DeltaOutbox::flush) sends them over a [`Connection`].

use crate::packet::{Packet, StreamBody, StreamPacket};
use crate::transport::Connection;
use crate::{Error, Result};
use indexmap::IndexMap;
use spellbind_core::{
    AttributeDelta, Delta, EntityId, EntitySnapshot, ReplicationBridge, TagDelta, World,
};
use std::collections::VecDeque;

/// Sequenced packet queue for every replicated entity
#[derive(Debug, Default)]
pub struct DeltaOutbox {
    /// Last sequence number assigned per entity
    seqs: IndexMap<EntityId, u64>,
    queue: VecDeque<Packet>,
}

impl DeltaOutbox {
    /// Create an empty outbox
    pub fn new() -> Self {
        Self::default()
    }

    /// Last sequence number assigned to an entity (0 before the first delta)
    pub fn last_seq(&self, entity: EntityId) -> u64 {
        self.seqs.get(&entity).copied().unwrap_or(0)
    }

    /// Number of packets waiting to be sent
    pub fn len(&self) -> usize {
        self.queue.len()
    }

    /// Check if nothing is waiting
    pub fn is_empty(&self) -> bool {
        self.queue.is_empty()
    }

    /// Take every waiting packet
    pub fn drain(&mut self) -> Vec<Packet> {
        self.queue.drain(..).collect()
    }

    /// Send every waiting packet reliably, returning how many were sent
    ///
    /// On a transport failure the unsent packets stay queued.
    pub fn flush<C: Connection>(&mut self, connection: &C) -> Result<usize> {
        let mut sent = 0;
        while let Some(packet) = self.queue.front() {
            let bytes = packet.encode()?;
            connection
                .send_reliable(&bytes)
                .map_err(|e| Error::Transport(e.to_string()))?;
            self.queue.pop_front();
            sent += 1;
        }
        Ok(sent)
    }

    /// Answer a resync request
    ///
    /// A known entity gets a fresh snapshot; an unknown one gets a despawn so
    /// the mirror drops it.
    pub fn handle_request(&mut self, entity: EntityId, snapshot: Option<EntitySnapshot>) {
        match snapshot {
            Some(snapshot) => self.push_snapshot(snapshot),
            None => {
                tracing::debug!(%entity, "resync requested for unknown entity");
                let seq = self.last_seq(entity);
                self.queue.push_back(Packet::Stream(StreamPacket {
                    entity,
                    seq,
                    body: StreamBody::Despawn,
                }));
            }
        }
    }

    fn enqueue(&mut self, entity: EntityId, delta: Delta) {
        let seq = self.seqs.entry(entity).or_insert(0);
        *seq += 1;
        let seq = *seq;
        self.queue.push_back(Packet::Stream(StreamPacket {
            entity,
            seq,
            body: StreamBody::Delta(delta),
        }));
    }
}

impl ReplicationBridge for DeltaOutbox {
    fn push_delta(&mut self, entity: EntityId, delta: AttributeDelta) {
        self.enqueue(entity, Delta::Attribute(delta));
    }

    fn push_tag_delta(&mut self, entity: EntityId, delta: TagDelta) {
        self.enqueue(entity, Delta::Tag(delta));
    }

    fn push_snapshot(&mut self, snapshot: EntitySnapshot) {
        let entity = snapshot.entity;
        let seq = *self.seqs.entry(entity).or_insert(0);
        self.queue.push_back(Packet::Stream(StreamPacket {
            entity,
            seq,
            body: StreamBody::Snapshot(snapshot),
        }));
    }

    fn push_despawn(&mut self, entity: EntityId) {
        let seq = self.seqs.shift_remove(&entity).unwrap_or(0);
        self.queue.push_back(Packet::Stream(StreamPacket {
            entity,
            seq,
            body: StreamBody::Despawn,
        }));
    }
}

/// Read resync requests from `connection`, answer them and flush the outbox
///
/// Returns the number of packets sent.
pub fn serve_requests<C: Connection>(world: &mut World<DeltaOutbox>, connection: &C) -> Result<usize> {
    loop {
        let bytes = connection
            .recv()
            .map_err(|e| Error::Transport(e.to_string()))?;
        let Some(bytes) = bytes else {
            break;
        };
        match Packet::decode(&bytes) {
            Ok(Packet::ResyncRequest(entity)) => {
                tracing::info!(%entity, "answering resync request");
                let snapshot = world.snapshot(entity).ok();
                world.bridge_mut().handle_request(entity, snapshot);
            }
            Ok(other) => {
                tracing::warn!(entity = %other.entity(), "authority ignored a stream packet");
            }
            Err(e) => tracing::warn!(error = %e, "undecodable packet from mirror"),
        }
    }
    world.bridge_mut().flush(connection)
}
