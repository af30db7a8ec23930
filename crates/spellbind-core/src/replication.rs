//! Replication seam between authoritative characters and their mirrors
//!
//! Characters buffer one [`Delta`] per journaled attribute or tag change.
//! The world pushes them through a [`ReplicationBridge`] after every
//! operation; how they cross the network is the bridge's business. On the
//! other side a [`Replica`] applies them in order and drops stale versions.

use crate::attribute::{AttributeDelta, AttributeSnapshot, AttributeStore};
use crate::tag::{TagDelta, TagSet};
use crate::{EntityId, Result};
use serde::{Deserialize, Serialize};

/// One versioned change of a character's replicated state
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Delta {
    Attribute(AttributeDelta),
    Tag(TagDelta),
}

/// Full replicated state of one character
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EntitySnapshot {
    pub entity: EntityId,
    pub attributes: Vec<AttributeSnapshot>,
    pub tags: Vec<TagDelta>,
}

/// Outbound side of replication, called on every authoritative change
pub trait ReplicationBridge {
    /// An attribute changed
    fn push_delta(&mut self, entity: EntityId, delta: AttributeDelta);

    /// A tag count changed
    fn push_tag_delta(&mut self, entity: EntityId, delta: TagDelta);

    /// A character appeared (or its full state must be resent)
    fn push_snapshot(&mut self, snapshot: EntitySnapshot) {
        let _ = snapshot;
    }

    /// A character was despawned
    fn push_despawn(&mut self, entity: EntityId) {
        let _ = entity;
    }

    /// Push a buffered delta to the matching method
    fn push(&mut self, entity: EntityId, delta: Delta) {
        match delta {
            Delta::Attribute(d) => self.push_delta(entity, d),
            Delta::Tag(d) => self.push_tag_delta(entity, d),
        }
    }
}

/// Bridge for local play that drops everything
#[derive(Debug, Clone, Copy, Default)]
pub struct NullBridge;

impl ReplicationBridge for NullBridge {
    fn push_delta(&mut self, _entity: EntityId, _delta: AttributeDelta) {}

    fn push_tag_delta(&mut self, _entity: EntityId, _delta: TagDelta) {}
}

/// Bridge that records everything in memory
#[derive(Debug, Clone, Default)]
pub struct DeltaLog {
    pub deltas: Vec<(EntityId, Delta)>,
    pub snapshots: Vec<EntitySnapshot>,
    pub despawned: Vec<EntityId>,
}

impl DeltaLog {
    pub fn new() -> Self {
        Self::default()
    }

    /// Deltas recorded for one entity, in push order
    pub fn for_entity(&self, entity: EntityId) -> impl Iterator<Item = &Delta> {
        self.deltas
            .iter()
            .filter(move |(e, _)| *e == entity)
            .map(|(_, d)| d)
    }
}

impl ReplicationBridge for DeltaLog {
    fn push_delta(&mut self, entity: EntityId, delta: AttributeDelta) {
        self.deltas.push((entity, Delta::Attribute(delta)));
    }

    fn push_tag_delta(&mut self, entity: EntityId, delta: TagDelta) {
        self.deltas.push((entity, Delta::Tag(delta)));
    }

    fn push_snapshot(&mut self, snapshot: EntitySnapshot) {
        self.snapshots.push(snapshot);
    }

    fn push_despawn(&mut self, entity: EntityId) {
        self.despawned.push(entity);
    }
}

/// Read-only mirror of one character
#[derive(Debug)]
pub struct Replica {
    entity: EntityId,
    attributes: AttributeStore,
    tags: TagSet,
}

impl Replica {
    /// Build a replica from a full snapshot
    pub fn from_snapshot(snapshot: &EntitySnapshot) -> Self {
        Self {
            entity: snapshot.entity,
            attributes: AttributeStore::from_snapshot(&snapshot.attributes),
            tags: TagSet::from_snapshot(&snapshot.tags),
        }
    }

    /// Apply one delta; `Ok(false)` if it was stale
    pub fn apply(&mut self, delta: &Delta) -> Result<bool> {
        match delta {
            Delta::Attribute(d) => self.attributes.apply_replicated(d),
            Delta::Tag(d) => Ok(self.tags.apply_replicated(d)),
        }
    }

    /// Replace the whole state, keeping registered listeners
    pub fn restore(&mut self, snapshot: &EntitySnapshot) {
        self.entity = snapshot.entity;
        self.attributes.restore(&snapshot.attributes);
        self.tags.restore(&snapshot.tags);
    }

    /// Current state as a snapshot
    pub fn snapshot(&self) -> EntitySnapshot {
        EntitySnapshot {
            entity: self.entity,
            attributes: self.attributes.snapshot(),
            tags: self.tags.snapshot(),
        }
    }

    pub fn entity(&self) -> EntityId {
        self.entity
    }

    pub fn attributes(&self) -> &AttributeStore {
        &self.attributes
    }

    pub fn tags(&self) -> &TagSet {
        &self.tags
    }

    /// Mutable access for registering listeners (UI bindings)
    pub fn attributes_mut(&mut self) -> &mut AttributeStore {
        &mut self.attributes
    }

    /// Mutable access for registering listeners
    pub fn tags_mut(&mut self) -> &mut TagSet {
        &mut self.tags
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::attribute::{names, AttributeDef};
    use crate::tag::GameplayTag;

    #[test]
    fn test_replica_follows_authority() {
        let entity = EntityId(3);
        let mut attributes = AttributeStore::with_defs(AttributeDef::character_set(100.0, 40.0)).unwrap();
        let mut tags = TagSet::new();
        let mut replica = Replica::from_snapshot(&EntitySnapshot {
            entity,
            attributes: attributes.snapshot(),
            tags: tags.snapshot(),
        });

        attributes.set(names::HEALTH, 35.0).unwrap();
        tags.add_tag("State.Debuff.Stun", 1);
        tags.add_tag("State.Dead", 1);
        tags.remove_tag(&GameplayTag::new("State.Debuff.Stun"), 1);

        let mut log = DeltaLog::new();
        for change in attributes.take_journal() {
            log.push(entity, Delta::Attribute(change.delta()));
        }
        for change in tags.take_journal() {
            log.push(entity, Delta::Tag(change.delta()));
        }
        for delta in log.for_entity(entity) {
            assert_eq!(replica.apply(delta), Ok(true));
        }

        assert_eq!(replica.attributes().get(names::HEALTH), Ok(35.0));
        assert!(replica.tags().has_tag(&GameplayTag::new("State.Dead")));
        assert!(!replica.tags().has_tag(&GameplayTag::new("State.Debuff.Stun")));
        assert_eq!(replica.attributes().snapshot(), attributes.snapshot());
        assert_eq!(replica.tags().snapshot(), tags.snapshot());
    }

    #[test]
    fn test_unknown_attribute_delta() {
        let mut replica = Replica::from_snapshot(&EntitySnapshot {
            entity: EntityId(1),
            attributes: Vec::new(),
            tags: Vec::new(),
        });
        let delta = Delta::Attribute(AttributeDelta {
            attribute: "Health".to_string(),
            base: 1.0,
            current: 1.0,
            version: 1,
        });
        assert!(replica.apply(&delta).unwrap_err().is_not_found());
    }
}
