//! The authoritative world: every character, one clock, one bridge
//!
//! After each operation the world routes effects that abilities aimed at
//! other characters, then pushes every character's buffered deltas through
//! the replication bridge, so a mirror sees changes in the order they
//! happened.

use crate::ability::Activation;
use crate::avatar::Avatar;
use crate::character::Character;
use crate::config::RuntimeConfig;
use crate::defs::DefinitionSet;
use crate::effect::EffectSpec;
use crate::event::CharacterEvent;
use crate::replication::{EntitySnapshot, NullBridge, ReplicationBridge};
use crate::time::{Clock, Tick};
use crate::{AbilityHandle, DefId, EffectHandle, EntityId, Error, InputId, Result};
use indexmap::IndexMap;
use std::sync::Arc;

/// What happened during one [`World::tick`]
#[derive(Debug, Clone, Default, PartialEq)]
pub struct TickReport {
    pub tick: Tick,
    pub events: Vec<(EntityId, CharacterEvent)>,
}

/// Authoritative container of characters
pub struct World<B: ReplicationBridge = NullBridge> {
    characters: IndexMap<EntityId, Character>,
    defs: Arc<DefinitionSet>,
    config: Arc<RuntimeConfig>,
    clock: Clock,
    bridge: B,
    next_id: u64,
}

impl World<NullBridge> {
    /// Create a world that does not replicate
    pub fn local(defs: DefinitionSet, config: RuntimeConfig) -> Result<Self> {
        Self::new(defs, config, NullBridge)
    }
}

impl<B: ReplicationBridge> World<B> {
    /// Create a world; fails if a definition references a missing one
    pub fn new(defs: DefinitionSet, config: RuntimeConfig, bridge: B) -> Result<Self> {
        defs.validate()?;
        Ok(Self {
            characters: IndexMap::new(),
            defs: Arc::new(defs),
            config: Arc::new(config),
            clock: Clock::new(),
            bridge,
            next_id: 0,
        })
    }

    /// Spawn a character from a template
    pub fn spawn(&mut self, template: &DefId, avatar: Box<dyn Avatar>) -> Result<EntityId> {
        let template = self.defs.character(template)?;
        self.next_id += 1;
        let id = EntityId(self.next_id);
        let mut character = Character::spawn(
            id,
            template,
            self.defs.clone(),
            self.config.clone(),
            avatar,
        )?;
        // the snapshot already carries the spawn-time changes
        character.take_deltas();
        self.bridge.push_snapshot(character.snapshot());
        self.characters.insert(id, character);
        tracing::info!(entity = %id, "spawned character");
        self.flush();
        Ok(id)
    }

    /// Remove a character
    pub fn despawn(&mut self, id: EntityId) -> Result<Character> {
        let mut character = self
            .characters
            .shift_remove(&id)
            .ok_or(Error::EntityNotFound(id))?;
        character.replicate_to(&mut self.bridge);
        self.bridge.push_despawn(id);
        tracing::info!(entity = %id, "despawned character");
        Ok(character)
    }

    /// Re-initialize a character, optionally with a new avatar
    pub fn respawn(&mut self, id: EntityId, avatar: Option<Box<dyn Avatar>>) -> Result<()> {
        let character = self.character_mut(id)?;
        if let Some(avatar) = avatar {
            character.set_avatar(avatar);
        }
        let result = character.initialize();
        self.flush();
        result
    }

    /// Advance every character by one tick
    pub fn tick(&mut self) -> TickReport {
        self.clock.advance();
        for character in self.characters.values_mut() {
            character.tick(1);
        }
        self.flush();
        TickReport {
            tick: self.clock.tick,
            events: self.drain_events(),
        }
    }

    /// Apply an effect to a character
    pub fn apply_effect(
        &mut self,
        source: Option<EntityId>,
        target: EntityId,
        effect: &DefId,
        level: u32,
    ) -> Result<EffectHandle> {
        let result = self.character_mut(target)?.apply_effect(effect, source, level);
        self.flush();
        result
    }

    /// Damage a character's Health
    pub fn damage(&mut self, source: Option<EntityId>, target: EntityId, amount: f64) -> Result<()> {
        let result = self.character_mut(target)?.receive_damage(source, amount);
        self.flush();
        result
    }

    /// Forward an input press
    pub fn press_input(
        &mut self,
        id: EntityId,
        input: InputId,
        target: Option<EntityId>,
    ) -> Result<Vec<(AbilityHandle, Result<Activation>)>> {
        let results = self.character_mut(id)?.on_input_pressed(input, target);
        self.flush();
        Ok(results)
    }

    /// Forward an input release
    pub fn release_input(&mut self, id: EntityId, input: InputId) -> Result<Vec<AbilityHandle>> {
        let ended = self.character_mut(id)?.on_input_released(input);
        self.flush();
        Ok(ended)
    }

    /// Activate one ability
    pub fn try_activate(
        &mut self,
        id: EntityId,
        handle: AbilityHandle,
        target: Option<EntityId>,
    ) -> Result<Activation> {
        let result = self.character_mut(id)?.try_activate(handle, target);
        self.flush();
        result
    }

    /// Run a closure against a character, then route and replicate
    pub fn with_character<R>(&mut self, id: EntityId, f: impl FnOnce(&mut Character) -> R) -> Result<R> {
        let out = f(self.character_mut(id)?);
        self.flush();
        Ok(out)
    }

    /// Full state of a character, for resynchronizing a mirror
    pub fn snapshot(&self, id: EntityId) -> Result<EntitySnapshot> {
        self.character(id).map(Character::snapshot)
    }

    /// Push a fresh snapshot of a character through the bridge
    pub fn resync(&mut self, id: EntityId) -> Result<()> {
        let snapshot = self.snapshot(id)?;
        self.bridge.push_snapshot(snapshot);
        Ok(())
    }

    /// Take events from every character
    pub fn drain_events(&mut self) -> Vec<(EntityId, CharacterEvent)> {
        let mut events = Vec::new();
        for (id, character) in self.characters.iter_mut() {
            events.extend(character.drain_events().into_iter().map(|e| (*id, e)));
        }
        events
    }

    pub fn character(&self, id: EntityId) -> Result<&Character> {
        self.characters.get(&id).ok_or(Error::EntityNotFound(id))
    }

    pub fn characters(&self) -> impl Iterator<Item = &Character> {
        self.characters.values()
    }

    pub fn len(&self) -> usize {
        self.characters.len()
    }

    pub fn is_empty(&self) -> bool {
        self.characters.is_empty()
    }

    pub fn clock(&self) -> &Clock {
        &self.clock
    }

    pub fn defs(&self) -> &DefinitionSet {
        &self.defs
    }

    pub fn config(&self) -> &RuntimeConfig {
        &self.config
    }

    pub fn bridge(&self) -> &B {
        &self.bridge
    }

    pub fn bridge_mut(&mut self) -> &mut B {
        &mut self.bridge
    }

    fn character_mut(&mut self, id: EntityId) -> Result<&mut Character> {
        self.characters.get_mut(&id).ok_or(Error::EntityNotFound(id))
    }

    /// Route outgoing effects until none are left, then replicate
    fn flush(&mut self) {
        for _ in 0..self.config.max_settle_passes() {
            let outgoing: Vec<_> = self
                .characters
                .values_mut()
                .flat_map(|c| c.take_outgoing())
                .collect();
            if outgoing.is_empty() {
                break;
            }
            for effect in outgoing {
                let def = match self.defs.effect(&effect.effect) {
                    Ok(def) => def,
                    Err(e) => {
                        tracing::warn!(error = %e, "dropping outgoing effect");
                        continue;
                    }
                };
                let Some(target) = self.characters.get_mut(&effect.target) else {
                    tracing::warn!(
                        source = %effect.source,
                        target = %effect.target,
                        effect = %effect.effect,
                        "effect target is gone"
                    );
                    continue;
                };
                let spec = EffectSpec::new(def)
                    .from_source(effect.source)
                    .at_level(effect.level);
                if let Err(e) = target.apply_spec(spec) {
                    tracing::warn!(target = %effect.target, error = %e, "routed effect failed");
                }
            }
        }
        for character in self.characters.values_mut() {
            character.replicate_to(&mut self.bridge);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ability::{AbilityDef, StepTarget};
    use crate::attribute::names;
    use crate::avatar::NullAvatar;
    use crate::character::{CharacterTemplate, Lifecycle};
    use crate::effect::{EffectDef, EffectDuration, ModifierOp};
    use crate::replication::{DeltaLog, Replica};
    use crate::tag::GameplayTag;

    fn arena() -> World<DeltaLog> {
        let mut defs = DefinitionSet::new();
        defs.insert_effect(EffectDef::new("Smite").modifier(names::HEALTH, ModifierOp::Add, -40.0));
        defs.insert_effect(
            EffectDef::new("Bleed")
                .duration(EffectDuration::Timed(4))
                .period(2)
                .modifier(names::HEALTH, ModifierOp::Add, -5.0)
                .grants("State.Debuff.Bleed"),
        );
        defs.insert_ability(
            AbilityDef::new("Smite")
                .input(InputId::new(1))
                .tag("Ability.Skill")
                .cost(names::MANA, 5.0)
                .step("Smite", StepTarget::Target, 0)
                .step("Bleed", StepTarget::Target, 1),
        );
        let mut template = CharacterTemplate::new("Knight");
        template.abilities = vec![DefId::new("Smite")];
        defs.insert_character(template);
        World::new(defs, RuntimeConfig::default(), DeltaLog::new()).unwrap()
    }

    #[test]
    fn test_spawn_pushes_snapshot() {
        let mut world = arena();
        let id = world.spawn(&DefId::new("Knight"), Box::new(NullAvatar)).unwrap();
        assert_eq!(world.bridge().snapshots.len(), 1);
        assert_eq!(world.bridge().snapshots[0].entity, id);
        assert!(world.bridge().deltas.is_empty());
        assert!(world
            .spawn(&DefId::new("Dragon"), Box::new(NullAvatar))
            .unwrap_err()
            .is_not_found());
    }

    #[test]
    fn test_cross_entity_routing_and_mirror() {
        let mut world = arena();
        let a = world.spawn(&DefId::new("Knight"), Box::new(NullAvatar)).unwrap();
        let b = world.spawn(&DefId::new("Knight"), Box::new(NullAvatar)).unwrap();
        let mut mirror = Replica::from_snapshot(&world.bridge().snapshots[1]);

        let results = world.press_input(a, InputId::new(1), Some(b)).unwrap();
        assert!(results[0].1.is_ok());
        assert_eq!(world.character(b).unwrap().attributes().get(names::HEALTH), Ok(60.0));

        world.tick();
        let target = world.character(b).unwrap();
        assert_eq!(target.attributes().get(names::HEALTH), Ok(55.0));
        assert!(target.tags().has_tag(&GameplayTag::new("State.Debuff.Bleed")));

        for _ in 0..4 {
            world.tick();
        }
        assert_eq!(world.character(b).unwrap().attributes().get(names::HEALTH), Ok(45.0));

        for delta in world.bridge().for_entity(b) {
            mirror.apply(delta).unwrap();
        }
        assert_eq!(mirror.snapshot(), world.snapshot(b).unwrap());
    }

    #[test]
    fn test_missing_target_is_skipped() {
        let mut world = arena();
        let a = world.spawn(&DefId::new("Knight"), Box::new(NullAvatar)).unwrap();
        let results = world.press_input(a, InputId::new(1), Some(EntityId(77))).unwrap();
        assert!(results[0].1.is_ok());
        assert_eq!(world.character(a).unwrap().attributes().get(names::MANA), Ok(95.0));
    }

    #[test]
    fn test_death_and_respawn_through_world() {
        let mut world = arena();
        let a = world.spawn(&DefId::new("Knight"), Box::new(NullAvatar)).unwrap();
        world.damage(None, a, 250.0).unwrap();
        assert_eq!(world.character(a).unwrap().lifecycle(), Lifecycle::Dead);
        let report = world.tick();
        assert_eq!(report.tick, 1);

        world.respawn(a, None).unwrap();
        let character = world.character(a).unwrap();
        assert!(character.is_alive());
        assert_eq!(character.abilities().len(), 1);
        assert!(!character.tags().has_tag(&GameplayTag::new("State.Dead")));
    }

    #[test]
    fn test_despawn() {
        let mut world = arena();
        let a = world.spawn(&DefId::new("Knight"), Box::new(NullAvatar)).unwrap();
        world.despawn(a).unwrap();
        assert!(world.is_empty());
        assert_eq!(world.bridge().despawned, vec![a]);
        assert_eq!(world.despawn(a).unwrap_err(), Error::EntityNotFound(a));
    }
}
