//! Mirror side of the delta stream
//!
//! A [`Mirror`] keeps one [`Replica`] per entity and applies stream packets
//! strictly in sequence order:
//!
//! - a sequence number below the expected one is a duplicate and is dropped
//! - a sequence number above it means packets were lost: the entity is
//!   marked as awaiting a snapshot, a resync request is queued and
//!   [`Error::Desync`] is returned
//! - while awaiting a snapshot, deltas are dropped
//!
//! Incremental repair is never attempted after a gap.

use crate::packet::{Packet, StreamBody, StreamPacket};
use crate::transport::Connection;
use crate::{Error, Result};
use indexmap::IndexMap;
use spellbind_core::{EntityId, Replica};

/// Synchronization state of one mirrored entity
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SyncState {
    Synced,
    /// A gap was detected; deltas are dropped until a snapshot arrives
    AwaitingSnapshot,
}

/// What happened to one received packet
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Applied {
    Delta,
    /// Duplicate sequence number or stale field version
    Stale,
    Snapshot,
    Despawned,
    /// Dropped while awaiting a snapshot
    Ignored,
}

/// Counters for one [`Mirror::poll`] call
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PollReport {
    pub applied: usize,
    pub stale: usize,
    pub desyncs: usize,
    pub requests_sent: usize,
}

#[derive(Debug)]
struct Tracked {
    replica: Option<Replica>,
    next_seq: u64,
    state: SyncState,
}

/// Read-only copies of remote entities
#[derive(Debug, Default)]
pub struct Mirror {
    entities: IndexMap<EntityId, Tracked>,
    requests: Vec<EntityId>,
}

impl Mirror {
    /// Create an empty mirror
    pub fn new() -> Self {
        Self::default()
    }

    /// Handle any packet
    pub fn on_packet(&mut self, packet: Packet) -> Result<Applied> {
        match packet {
            Packet::Stream(packet) => self.on_delta_received(packet),
            Packet::ResyncRequest(entity) => {
                tracing::debug!(%entity, "mirror ignored a resync request");
                Ok(Applied::Ignored)
            }
        }
    }

    /// Apply one stream packet in order
    pub fn on_delta_received(&mut self, packet: StreamPacket) -> Result<Applied> {
        let entity = packet.entity;
        match packet.body {
            StreamBody::Snapshot(snapshot) => {
                let tracked = self.entities.entry(entity).or_insert(Tracked {
                    replica: None,
                    next_seq: 1,
                    state: SyncState::AwaitingSnapshot,
                });
                match tracked.replica.as_mut() {
                    Some(replica) => replica.restore(&snapshot),
                    None => tracked.replica = Some(Replica::from_snapshot(&snapshot)),
                }
                tracked.next_seq = packet.seq + 1;
                tracked.state = SyncState::Synced;
                self.requests.retain(|e| *e != entity);
                Ok(Applied::Snapshot)
            }
            StreamBody::Despawn => {
                self.entities.shift_remove(&entity);
                self.requests.retain(|e| *e != entity);
                Ok(Applied::Despawned)
            }
            StreamBody::Delta(delta) => {
                let Some(tracked) = self.entities.get_mut(&entity) else {
                    Self::request(&mut self.requests, entity);
                    return Err(Error::UnknownEntity(entity));
                };
                if tracked.state == SyncState::AwaitingSnapshot {
                    return Ok(Applied::Ignored);
                }
                if packet.seq < tracked.next_seq {
                    return Ok(Applied::Stale);
                }
                if packet.seq > tracked.next_seq {
                    let expected = tracked.next_seq;
                    tracked.state = SyncState::AwaitingSnapshot;
                    Self::request(&mut self.requests, entity);
                    tracing::warn!(%entity, expected, got = packet.seq, "delta stream gap");
                    return Err(Error::Desync {
                        entity,
                        expected,
                        got: packet.seq,
                    });
                }
                tracked.next_seq += 1;
                let Some(replica) = tracked.replica.as_mut() else {
                    return Ok(Applied::Ignored);
                };
                if replica.apply(&delta)? {
                    Ok(Applied::Delta)
                } else {
                    Ok(Applied::Stale)
                }
            }
        }
    }

    /// Drain the connection, apply everything, send queued resync requests
    ///
    /// Desyncs are absorbed here (they become resync requests); decoding,
    /// transport and replica errors are returned.
    pub fn poll<C: Connection>(&mut self, connection: &C) -> Result<PollReport> {
        let mut report = PollReport::default();
        while let Some(bytes) = connection
            .recv()
            .map_err(|e| Error::Transport(e.to_string()))?
        {
            match self.on_packet(Packet::decode(&bytes)?) {
                Ok(Applied::Delta) | Ok(Applied::Snapshot) | Ok(Applied::Despawned) => report.applied += 1,
                Ok(Applied::Stale) => report.stale += 1,
                Ok(Applied::Ignored) => {}
                Err(e) if e.needs_resync() => report.desyncs += 1,
                Err(e) => return Err(e),
            }
        }
        for entity in self.take_requests() {
            let bytes = Packet::ResyncRequest(entity).encode()?;
            connection
                .send_reliable(&bytes)
                .map_err(|e| Error::Transport(e.to_string()))?;
            report.requests_sent += 1;
        }
        Ok(report)
    }

    /// Take the queued resync requests
    pub fn take_requests(&mut self) -> Vec<EntityId> {
        std::mem::take(&mut self.requests)
    }

    /// The replica of an entity, once a snapshot has arrived
    pub fn replica(&self, entity: EntityId) -> Option<&Replica> {
        self.entities.get(&entity).and_then(|t| t.replica.as_ref())
    }

    /// Mutable replica access (for registering UI listeners)
    pub fn replica_mut(&mut self, entity: EntityId) -> Option<&mut Replica> {
        self.entities.get_mut(&entity).and_then(|t| t.replica.as_mut())
    }

    pub fn sync_state(&self, entity: EntityId) -> Option<SyncState> {
        self.entities.get(&entity).map(|t| t.state)
    }

    /// Mirrored entity ids
    pub fn entities(&self) -> impl Iterator<Item = EntityId> + '_ {
        self.entities.keys().copied()
    }

    pub fn len(&self) -> usize {
        self.entities.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entities.is_empty()
    }

    fn request(requests: &mut Vec<EntityId>, entity: EntityId) {
        if !requests.contains(&entity) {
            requests.push(entity);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::outbox::{serve_requests, DeltaOutbox};
    use crate::transport::MemoryConnection;
    use spellbind_core::{
        CharacterTemplate, DefId, DefinitionSet, EffectDef, EffectDuration, GameplayTag, ModifierOp,
        NullAvatar, RuntimeConfig, World,
    };

    fn world() -> World<DeltaOutbox> {
        let mut defs = DefinitionSet::new();
        defs.insert_effect(
            EffectDef::new("Poison")
                .duration(EffectDuration::Timed(6))
                .period(2)
                .modifier("Health", ModifierOp::Add, -7.0)
                .grants("State.Debuff.Poison"),
        );
        defs.insert_character(CharacterTemplate::new("Goblin"));
        World::new(defs, RuntimeConfig::default(), DeltaOutbox::new()).unwrap()
    }

    #[test]
    fn test_mirror_tracks_authority_in_order() {
        let (server, client) = MemoryConnection::pair("server", "client");
        let mut world = world();
        let mut mirror = Mirror::new();

        let goblin = world.spawn(&DefId::new("Goblin"), Box::new(NullAvatar)).unwrap();
        world
            .apply_effect(None, goblin, &DefId::new("Poison"), 1)
            .unwrap();
        for _ in 0..3 {
            world.tick();
        }
        world.bridge_mut().flush(&server).unwrap();

        let report = mirror.poll(&client).unwrap();
        assert_eq!(report.desyncs, 0);
        assert_eq!(mirror.sync_state(goblin), Some(SyncState::Synced));
        assert_eq!(
            mirror.replica(goblin).map(|r| r.snapshot()),
            Some(world.snapshot(goblin).unwrap())
        );
        let health = mirror.replica(goblin).unwrap().attributes().get("Health");
        assert_eq!(health, Ok(86.0));
        assert!(mirror
            .replica(goblin)
            .unwrap()
            .tags()
            .has_tag(&GameplayTag::new("State.Debuff.Poison")));
    }

    #[test]
    fn test_duplicates_are_stale() {
        let mut world = world();
        let goblin = world.spawn(&DefId::new("Goblin"), Box::new(NullAvatar)).unwrap();
        world.damage(None, goblin, 10.0).unwrap();
        let packets = world.bridge_mut().drain();

        let mut mirror = Mirror::new();
        for packet in packets.iter().cloned() {
            mirror.on_packet(packet).unwrap();
        }
        let last = packets.last().cloned().unwrap();
        assert_eq!(mirror.on_packet(last).unwrap(), Applied::Stale);
    }

    #[test]
    fn test_gap_requests_resync_and_recovers() {
        let (server, client) = MemoryConnection::pair("server", "client");
        let mut world = world();
        let mut mirror = Mirror::new();

        let goblin = world.spawn(&DefId::new("Goblin"), Box::new(NullAvatar)).unwrap();
        world.bridge_mut().flush(&server).unwrap();
        mirror.poll(&client).unwrap();

        world.damage(None, goblin, 10.0).unwrap();
        world.damage(None, goblin, 15.0).unwrap();
        world.bridge_mut().flush(&server).unwrap();
        assert!(client.drop_next());

        let report = mirror.poll(&client).unwrap();
        assert_eq!(report.desyncs, 1);
        assert_eq!(report.requests_sent, 1);
        assert_eq!(mirror.sync_state(goblin), Some(SyncState::AwaitingSnapshot));

        serve_requests(&mut world, &server).unwrap();
        mirror.poll(&client).unwrap();
        assert_eq!(mirror.sync_state(goblin), Some(SyncState::Synced));
        assert_eq!(
            mirror.replica(goblin).unwrap().attributes().get("Health"),
            Ok(75.0)
        );

        world.damage(None, goblin, 5.0).unwrap();
        world.bridge_mut().flush(&server).unwrap();
        assert_eq!(mirror.poll(&client).unwrap().applied, 1);
        assert_eq!(
            mirror.replica(goblin).map(|r| r.snapshot()),
            Some(world.snapshot(goblin).unwrap())
        );
    }

    #[test]
    fn test_delta_for_unknown_entity() {
        let mut mirror = Mirror::new();
        let mut outbox = DeltaOutbox::new();
        spellbind_core::ReplicationBridge::push_tag_delta(
            &mut outbox,
            EntityId(5),
            spellbind_core::TagDelta {
                tag: GameplayTag::new("State.Dead"),
                count: 1,
                version: 1,
            },
        );
        let packet = outbox.drain().remove(0);
        assert!(matches!(mirror.on_packet(packet), Err(Error::UnknownEntity(_))));
        assert_eq!(mirror.take_requests(), vec![EntityId(5)]);
    }

    #[test]
    fn test_despawn_removes_replica() {
        let mut world = world();
        let goblin = world.spawn(&DefId::new("Goblin"), Box::new(NullAvatar)).unwrap();
        world.despawn(goblin).unwrap();

        let mut mirror = Mirror::new();
        for packet in world.bridge_mut().drain() {
            mirror.on_packet(packet).unwrap();
        }
        assert!(mirror.is_empty());
    }
}
