//! Wire packets
//!
//! The authority sends one [`StreamPacket`] per replicated change. Each
//! entity has its own stream with sequence numbers starting at 1; a snapshot
//! carries the last sequence number assigned so far, so the mirror knows
//! which delta comes next.

use crate::Result;
use serde::{Deserialize, Serialize};
use spellbind_core::{Delta, EntityId, EntitySnapshot};

/// Payload of a stream packet
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum StreamBody {
    Delta(Delta),
    Snapshot(EntitySnapshot),
    Despawn,
}

/// One entry of an entity's ordered stream
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StreamPacket {
    pub entity: EntityId,
    pub seq: u64,
    pub body: StreamBody,
}

/// Everything that crosses the connection
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Packet {
    /// Authority to mirror
    Stream(StreamPacket),
    /// Mirror to authority: send a fresh snapshot of this entity
    ResyncRequest(EntityId),
}

impl Packet {
    /// Encode with bincode
    pub fn encode(&self) -> Result<Vec<u8>> {
        Ok(bincode::serialize(self)?)
    }

    /// Decode with bincode
    pub fn decode(bytes: &[u8]) -> Result<Packet> {
        Ok(bincode::deserialize(bytes)?)
    }

    /// The entity this packet is about
    pub fn entity(&self) -> EntityId {
        match self {
            Packet::Stream(p) => p.entity,
            Packet::ResyncRequest(entity) => *entity,
        }
    }
}
