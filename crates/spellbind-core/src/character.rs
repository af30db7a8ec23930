//! A character: one authoritative entity and its stores
//!
//! The character owns its attributes, tags, active effects and granted
//! abilities, and coordinates them. After every mutation it *settles*: it
//! drains the store journals into replication deltas and reacts to what
//! changed. Health reaching zero runs the death sequence, the stun tag
//! cancels abilities, and effects removed by present tags are dropped.
//!
//! ## Death sequence
//!
//! 1. revoke loadout abilities sourced from this character
//! 2. disable movement and collision on the avatar
//! 3. notify "died" listeners
//! 4. cancel every running ability
//! 5. remove effects marked remove-on-death
//! 6. add the Dead tag
//! 7. play the death animation, or destroy the avatar right away
//!
//! Abilities are stopped before the Dead tag appears, so nothing in flight
//! can observe a half-dead character.

use crate::ability::{AbilityRegistry, AbilityStep, Activation, StepTarget, Stopped};
use crate::attribute::{AttributeChange, AttributeDef, AttributeStore};
use crate::avatar::Avatar;
use crate::config::RuntimeConfig;
use crate::defs::DefinitionSet;
use crate::effect::{EffectEngine, EffectSpec, ModifierOp};
use crate::event::{CharacterEvent, OutgoingEffect};
use crate::gate::ActivationGate;
use crate::observer::{ListenerId, Observers};
use crate::replication::{Delta, EntitySnapshot, ReplicationBridge};
use crate::tag::{GameplayTag, TagContainer, TagEvent, TagEventKind, TagSet};
use crate::time::Tick;
use crate::{AbilityHandle, DefId, EffectHandle, EntityId, Error, InputId, Result};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;

fn default_level() -> u32 {
    1
}

/// Static loadout of a character kind
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CharacterTemplate {
    pub id: DefId,
    /// Attribute definitions; empty means the standard character set
    #[serde(default)]
    pub attributes: Vec<AttributeDef>,
    /// Abilities granted on spawn and respawn
    #[serde(default)]
    pub abilities: Vec<DefId>,
    /// Effect applied on every (re)initialization to set attribute defaults
    #[serde(default)]
    pub default_attributes: Option<DefId>,
    /// Effects applied once per character lifetime
    #[serde(default)]
    pub startup_effects: Vec<DefId>,
    #[serde(default = "default_level")]
    pub level: u32,
    /// Played on death before the avatar is destroyed
    #[serde(default)]
    pub death_animation: Option<String>,
}

impl CharacterTemplate {
    /// Create an empty template using the standard attribute set
    pub fn new(id: impl Into<DefId>) -> Self {
        Self {
            id: id.into(),
            attributes: Vec::new(),
            abilities: Vec::new(),
            default_attributes: None,
            startup_effects: Vec::new(),
            level: 1,
            death_animation: None,
        }
    }

    fn attribute_defs(&self) -> Vec<AttributeDef> {
        if self.attributes.is_empty() {
            AttributeDef::character_set(100.0, 100.0)
        } else {
            self.attributes.clone()
        }
    }
}

/// Where a character is in its life
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Lifecycle {
    Alive,
    /// Dead, waiting for the death animation to finish
    Dying,
    /// Dead and destroyed; only `initialize()` brings it back
    Dead,
}

/// One authoritative character
pub struct Character {
    id: EntityId,
    template: Arc<CharacterTemplate>,
    defs: Arc<DefinitionSet>,
    config: Arc<RuntimeConfig>,
    gate: ActivationGate,
    attributes: AttributeStore,
    tags: TagSet,
    effects: EffectEngine,
    abilities: AbilityRegistry,
    avatar: Box<dyn Avatar>,
    lifecycle: Lifecycle,
    abilities_given: bool,
    startup_applied: bool,
    initialized: bool,
    died: Observers<EntityId>,
    events: Vec<CharacterEvent>,
    outgoing: Vec<OutgoingEffect>,
    pending: Vec<Delta>,
}

impl Character {
    /// Create a character without initializing it
    pub fn new(
        id: EntityId,
        template: Arc<CharacterTemplate>,
        defs: Arc<DefinitionSet>,
        config: Arc<RuntimeConfig>,
        avatar: Box<dyn Avatar>,
    ) -> Result<Self> {
        let attributes = AttributeStore::with_defs(template.attribute_defs())?;
        Ok(Self {
            id,
            gate: ActivationGate::new(config.blocking_tags.clone()),
            template,
            defs,
            config,
            attributes,
            tags: TagSet::new(),
            effects: EffectEngine::new(),
            abilities: AbilityRegistry::new(),
            avatar,
            lifecycle: Lifecycle::Alive,
            abilities_given: false,
            startup_applied: false,
            initialized: false,
            died: Observers::new(),
            events: Vec::new(),
            outgoing: Vec::new(),
            pending: Vec::new(),
        })
    }

    /// Create and initialize a character
    pub fn spawn(
        id: EntityId,
        template: Arc<CharacterTemplate>,
        defs: Arc<DefinitionSet>,
        config: Arc<RuntimeConfig>,
        avatar: Box<dyn Avatar>,
    ) -> Result<Self> {
        let mut character = Self::new(id, template, defs, config, avatar)?;
        character.initialize()?;
        Ok(character)
    }

    /// Bring the character to life (spawn and respawn)
    ///
    /// Steps, in order: clear the Dead tag, mark alive, apply the
    /// default-attributes effect, fill Health and Mana, apply startup effects
    /// (first time only), then on respawn revoke everything and grant the
    /// loadout again.
    pub fn initialize(&mut self) -> Result<()> {
        let respawn = self.initialized;
        self.tags.set_count(self.config.dead_tag.clone(), 0);
        self.lifecycle = Lifecycle::Alive;

        if let Some(id) = self.template.default_attributes.clone() {
            self.apply_own_effect(&id)?;
        }
        self.fill_to_max(&self.config.health_attribute.clone())?;
        self.fill_to_max(&self.config.mana_attribute.clone())?;

        if !self.startup_applied {
            for id in self.template.startup_effects.clone() {
                self.apply_own_effect(&id)?;
            }
            self.startup_applied = true;
        }

        if respawn {
            let stopped = self.abilities.revoke_all();
            self.revert_all(stopped, true);
            self.abilities_given = false;
        }
        self.initialized = true;
        self.grant_loadout()?;

        if respawn {
            tracing::info!(entity = %self.id, "character respawned");
        } else {
            tracing::debug!(entity = %self.id, template = %self.template.id, "character spawned");
        }
        self.events.push(CharacterEvent::Initialized { respawn });
        self.settle();
        Ok(())
    }

    /// Grant the template's abilities, sourced from this character
    ///
    /// Fails with `AlreadyGranted` while the loadout is held. Abilities
    /// flagged `activate_on_grant` are activated once.
    pub fn grant_loadout(&mut self) -> Result<Vec<AbilityHandle>> {
        if self.abilities_given {
            return Err(Error::AlreadyGranted(self.template.id.to_string()));
        }
        let defs = self
            .template
            .abilities
            .iter()
            .map(|id| self.defs.ability(id))
            .collect::<Result<Vec<_>>>()?;

        let mut handles = Vec::with_capacity(defs.len());
        for def in defs {
            let activate = def.activate_on_grant;
            let granted = self
                .abilities
                .grant(def, None, self.template.level, Some(self.id));
            if activate && granted.is_new() {
                if let Err(e) = self.try_activate(granted.handle(), None) {
                    tracing::debug!(entity = %self.id, error = %e, "activate-on-grant failed");
                }
            }
            handles.push(granted.handle());
        }
        self.abilities_given = true;
        self.settle();
        Ok(handles)
    }

    /// Revoke the template's abilities, returning how many were removed
    pub fn remove_loadout(&mut self) -> usize {
        let stopped = self.abilities.revoke_from(self.id);
        let count = stopped.len();
        self.revert_all(stopped, true);
        self.abilities_given = false;
        self.settle();
        count
    }

    /// Grant an extra ability (not part of the loadout)
    pub fn grant_ability(
        &mut self,
        id: &DefId,
        input: Option<InputId>,
        level: u32,
        source: Option<EntityId>,
    ) -> Result<crate::ability::Granted> {
        let def = self.defs.ability(id)?;
        Ok(self.abilities.grant(def, input, level, source))
    }

    /// Remove one ability regardless of its state
    pub fn clear_ability(&mut self, handle: AbilityHandle) -> Result<()> {
        let (_, stopped) = self.abilities.clear(handle)?;
        self.revert_all(vec![stopped], true);
        self.settle();
        Ok(())
    }

    /// Try to activate an ability
    ///
    /// Denials are returned as `Error::Denied` and also reported as an event.
    pub fn try_activate(&mut self, handle: AbilityHandle, target: Option<EntityId>) -> Result<Activation> {
        let begun = self.abilities.begin(
            handle,
            target,
            &self.gate,
            &self.tags,
            &self.attributes,
            self.config.max_queued_activations(),
        );
        match begun {
            Ok(Activation::Started) => {}
            Ok(Activation::Queued) => return Ok(Activation::Queued),
            Err(Error::Denied(reason)) => {
                tracing::debug!(entity = %self.id, ability = %handle, %reason, "activation denied");
                self.events.push(CharacterEvent::ActivationDenied {
                    handle,
                    reason: reason.clone(),
                });
                return Err(Error::Denied(reason));
            }
            Err(e) => return Err(e),
        }

        let (costs, ability, level) = match self.abilities.get(handle) {
            Some(spec) => (spec.def.costs.clone(), spec.def.id.clone(), spec.level),
            None => return Err(Error::AbilityNotFound(handle)),
        };
        let commit: Vec<_> = costs
            .iter()
            .map(|c| (c.attribute.clone(), ModifierOp::Add, -c.amount))
            .collect();
        if let Err(e) = self.attributes.execute(&commit) {
            self.abilities.cancel(handle)?;
            return Err(e);
        }

        let steps = self.abilities.activate(handle)?;
        tracing::debug!(entity = %self.id, %ability, %handle, "ability activated");
        self.events.push(CharacterEvent::AbilityActivated { handle, ability });
        self.run_steps(handle, target, level, steps);
        if self.abilities.is_finished(handle) {
            self.end_ability(handle);
        }
        self.settle();
        Ok(Activation::Started)
    }

    /// Activate every ability bound to `input`
    pub fn on_input_pressed(
        &mut self,
        input: InputId,
        target: Option<EntityId>,
    ) -> Vec<(AbilityHandle, Result<Activation>)> {
        let handles = self.abilities.bound(input).to_vec();
        handles
            .into_iter()
            .map(|h| (h, self.try_activate(h, target)))
            .collect()
    }

    /// End held abilities bound to `input`
    pub fn on_input_released(&mut self, input: InputId) -> Vec<AbilityHandle> {
        let held = self.abilities.held_by(input);
        for handle in &held {
            self.end_ability(*handle);
        }
        self.settle();
        held
    }

    /// Bind an input to a granted ability
    pub fn bind_input(&mut self, input: InputId, handle: AbilityHandle) -> Result<()> {
        self.abilities.bind_input(input, handle)
    }

    /// Cancel a running ability
    pub fn cancel_ability(&mut self, handle: AbilityHandle) -> Result<()> {
        let stopped = self.abilities.cancel(handle)?;
        self.revert_all(vec![stopped], true);
        self.settle();
        Ok(())
    }

    /// Apply an effect definition to this character
    pub fn apply_effect(&mut self, id: &DefId, source: Option<EntityId>, level: u32) -> Result<EffectHandle> {
        let def = self.defs.effect(id)?;
        let mut spec = EffectSpec::new(def).at_level(level);
        spec.source = source;
        self.apply_spec(spec)
    }

    /// Apply an effect spec to this character
    pub fn apply_spec(&mut self, spec: EffectSpec) -> Result<EffectHandle> {
        let effect = spec.def.id.clone();
        let source = spec.source;
        let handle = self.effects.apply(spec, &mut self.attributes, &mut self.tags)?;
        self.events.push(CharacterEvent::EffectApplied {
            handle,
            effect,
            source,
        });
        self.settle();
        Ok(handle)
    }

    /// Remove one active effect
    pub fn remove_effect(&mut self, handle: EffectHandle) -> Result<()> {
        self.effects.remove(handle, &mut self.attributes, &mut self.tags)?;
        self.settle();
        Ok(())
    }

    /// Remove active effects whose granted or effect tags match `queries`
    pub fn remove_effects_by_tag(&mut self, queries: &TagContainer) -> usize {
        let removed = self
            .effects
            .remove_by_tag(queries, &mut self.attributes, &mut self.tags);
        self.settle();
        removed
    }

    /// Take damage to Health
    pub fn receive_damage(&mut self, source: Option<EntityId>, amount: f64) -> Result<()> {
        let amount = amount.max(0.0);
        let health = self.config.health_attribute.clone();
        self.attributes
            .execute(&[(health, ModifierOp::Add, -amount)])?;
        self.events.push(CharacterEvent::Damaged { source, amount });
        self.settle();
        Ok(())
    }

    /// Set an attribute's base value
    pub fn set_attribute(&mut self, name: &str, value: f64) -> Result<()> {
        self.attributes.set(name, value)?;
        self.settle();
        Ok(())
    }

    /// Adjust an attribute's ceiling
    pub fn set_attribute_max(&mut self, name: &str, value: f64) -> Result<()> {
        self.attributes.set_max(name, value)?;
        self.settle();
        Ok(())
    }

    /// Add tag counts from an outside source
    pub fn add_tag(&mut self, tag: impl Into<GameplayTag>, count: u32) {
        self.tags.add_tag(tag, count);
        self.settle();
    }

    /// Remove tag counts added from an outside source
    pub fn remove_tag(&mut self, tag: &GameplayTag, count: u32) {
        self.tags.remove_tag(tag, count);
        self.settle();
    }

    /// Advance effects, abilities and a pending death animation by `dt` ticks
    pub fn tick(&mut self, dt: Tick) {
        if self.lifecycle == Lifecycle::Dying && self.avatar.death_animation_finished() {
            self.finish_dying();
        }

        self.effects.tick(dt, &mut self.attributes, &mut self.tags);
        self.settle();

        let ticked = self.abilities.tick(dt);
        for (handle, target, step) in ticked.due {
            let level = self.abilities.get(handle).map(|s| s.level).unwrap_or(1);
            self.run_steps(handle, target, level, vec![step]);
        }
        for handle in ticked.finished {
            self.end_ability(handle);
        }
        self.settle();
    }

    /// Run the death sequence
    ///
    /// Called automatically when Health drops to zero. Does nothing unless
    /// the character is alive.
    pub fn die(&mut self) {
        if self.lifecycle != Lifecycle::Alive {
            return;
        }
        self.lifecycle = Lifecycle::Dying;

        let stopped = self.abilities.revoke_from(self.id);
        self.revert_all(stopped, true);
        self.abilities_given = false;

        self.avatar.disable_movement_and_collision();

        self.died.notify(&self.id);
        self.events.push(CharacterEvent::Died);

        let stopped = self.abilities.cancel_all();
        self.revert_all(stopped, true);

        let marker: TagContainer = [self.config.remove_on_death_tag.clone()].into_iter().collect();
        self.effects
            .remove_by_tag(&marker, &mut self.attributes, &mut self.tags);

        self.tags.add_tag(self.config.dead_tag.clone(), 1);
        tracing::info!(entity = %self.id, "character died");

        let animation = self.template.death_animation.clone();
        let playing = match animation {
            Some(name) => self.avatar.play_death_animation(&name),
            None => false,
        };
        if !playing {
            self.finish_dying();
        }
    }

    /// Destroy the avatar after the death animation
    pub fn finish_dying(&mut self) {
        if self.lifecycle != Lifecycle::Dying {
            return;
        }
        self.lifecycle = Lifecycle::Dead;
        self.avatar.destroy();
        self.events.push(CharacterEvent::Destroyed);
    }

    /// Register a listener for the "died" broadcast
    pub fn on_died(&mut self, listener: impl FnMut(&EntityId) + 'static) -> ListenerId {
        self.died.subscribe(listener)
    }

    /// Unregister a "died" listener
    pub fn remove_died_listener(&mut self, id: ListenerId) -> bool {
        self.died.unsubscribe(id)
    }

    /// Register an attribute change listener
    pub fn on_attribute_changed(&mut self, listener: impl FnMut(&AttributeChange) + 'static) -> ListenerId {
        self.attributes.subscribe(listener)
    }

    /// Register a tag presence listener
    pub fn on_tag_event(&mut self, listener: impl FnMut(&TagEvent) + 'static) -> ListenerId {
        self.tags.subscribe(listener)
    }

    /// Replace the avatar (respawn with a new body)
    pub fn set_avatar(&mut self, avatar: Box<dyn Avatar>) {
        self.avatar = avatar;
    }

    /// Push buffered deltas through a bridge
    pub fn replicate_to<B: ReplicationBridge + ?Sized>(&mut self, bridge: &mut B) {
        for delta in self.pending.drain(..) {
            bridge.push(self.id, delta);
        }
    }

    /// Take buffered deltas
    pub fn take_deltas(&mut self) -> Vec<Delta> {
        std::mem::take(&mut self.pending)
    }

    /// Take events emitted since the last call
    pub fn drain_events(&mut self) -> Vec<CharacterEvent> {
        std::mem::take(&mut self.events)
    }

    /// Take effects aimed at other characters
    pub fn take_outgoing(&mut self) -> Vec<OutgoingEffect> {
        std::mem::take(&mut self.outgoing)
    }

    /// Full replicated state
    pub fn snapshot(&self) -> EntitySnapshot {
        EntitySnapshot {
            entity: self.id,
            attributes: self.attributes.snapshot(),
            tags: self.tags.snapshot(),
        }
    }

    pub fn id(&self) -> EntityId {
        self.id
    }

    pub fn template(&self) -> &CharacterTemplate {
        &self.template
    }

    pub fn lifecycle(&self) -> Lifecycle {
        self.lifecycle
    }

    pub fn is_alive(&self) -> bool {
        self.lifecycle == Lifecycle::Alive
    }

    pub fn attributes(&self) -> &AttributeStore {
        &self.attributes
    }

    pub fn tags(&self) -> &TagSet {
        &self.tags
    }

    pub fn effects(&self) -> &EffectEngine {
        &self.effects
    }

    pub fn abilities(&self) -> &AbilityRegistry {
        &self.abilities
    }

    pub fn has_loadout(&self) -> bool {
        self.abilities_given
    }

    fn apply_own_effect(&mut self, id: &DefId) -> Result<EffectHandle> {
        let def = self.defs.effect(id)?;
        let spec = EffectSpec::new(def)
            .from_source(self.id)
            .at_level(self.template.level);
        self.effects.apply(spec, &mut self.attributes, &mut self.tags)
    }

    fn fill_to_max(&mut self, name: &str) -> Result<()> {
        if !self.attributes.contains(name) {
            return Ok(());
        }
        let (_, max) = self.attributes.bounds(name)?;
        if max.is_finite() {
            self.attributes.set(name, max)?;
        }
        Ok(())
    }

    fn run_steps(&mut self, handle: AbilityHandle, target: Option<EntityId>, level: u32, steps: Vec<AbilityStep>) {
        for step in steps {
            match step.target {
                StepTarget::Owner => {
                    let applied = self.defs.effect(&step.effect).and_then(|def| {
                        let spec = EffectSpec::new(def).from_source(self.id).at_level(level);
                        self.effects.apply(spec, &mut self.attributes, &mut self.tags)
                    });
                    match applied {
                        Ok(effect) if self.effects.is_active(effect) => {
                            if let Err(e) = self.abilities.record_applied(handle, effect) {
                                tracing::warn!(entity = %self.id, error = %e, "could not track ability effect");
                            }
                        }
                        Ok(_) => {}
                        Err(e) => {
                            tracing::warn!(entity = %self.id, effect = %step.effect, error = %e, "ability step failed")
                        }
                    }
                }
                StepTarget::Target => match target {
                    Some(target) => self.outgoing.push(OutgoingEffect {
                        source: self.id,
                        target,
                        effect: step.effect,
                        level,
                    }),
                    None => {
                        tracing::debug!(entity = %self.id, effect = %step.effect, "step has no target")
                    }
                },
            }
        }
    }

    fn end_ability(&mut self, handle: AbilityHandle) {
        match self.abilities.end(handle) {
            Ok(stopped) => self.revert_all(vec![stopped], false),
            Err(e) => {
                tracing::debug!(entity = %self.id, error = %e, "end ignored");
                return;
            }
        }
        if let Some(target) = self.abilities.pop_queued(handle) {
            if let Err(e) = self.try_activate(handle, target) {
                tracing::debug!(entity = %self.id, error = %e, "queued activation failed");
            }
        }
    }

    fn revert_all(&mut self, stopped: Vec<Stopped>, cancelled: bool) {
        for stop in stopped {
            for effect in stop.revert {
                // the effect may already have expired
                let _ = self.effects.remove(effect, &mut self.attributes, &mut self.tags);
            }
            self.events.push(CharacterEvent::AbilityEnded {
                handle: stop.handle,
                ability: stop.def,
                cancelled,
            });
        }
    }

    /// Drain journals into deltas and react to what changed
    fn settle(&mut self) {
        let passes = self.config.max_settle_passes();
        for _ in 0..passes {
            let attribute_changes = self.attributes.take_journal();
            let tag_changes = self.tags.take_journal();
            if attribute_changes.is_empty() && tag_changes.is_empty() {
                return;
            }

            let mut dying = false;
            for change in attribute_changes {
                if change.attribute == self.config.health_attribute
                    && change.old_value > 0.0
                    && change.new_value <= 0.0
                {
                    dying = true;
                }
                self.pending.push(Delta::Attribute(change.delta()));
            }

            let mut stunned = false;
            for change in tag_changes {
                if change.tag == self.config.stun_tag && change.transition() == Some(TagEventKind::Added) {
                    stunned = true;
                }
                self.pending.push(Delta::Tag(change.delta()));
            }

            if dying && self.lifecycle == Lifecycle::Alive {
                self.die();
            }
            if stunned {
                let stopped = self
                    .abilities
                    .cancel_matching(&self.config.stun_cancel_tags, &self.config.stun_ignore_tags);
                if !stopped.is_empty() {
                    tracing::debug!(entity = %self.id, cancelled = stopped.len(), "stun cancelled abilities");
                }
                self.revert_all(stopped, true);
            }
            self.effects
                .remove_blocked(&mut self.attributes, &mut self.tags);
        }
        tracing::warn!(entity = %self.id, passes, "change settling hit its pass limit");
    }
}

impl fmt::Debug for Character {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Character")
            .field("id", &self.id)
            .field("template", &self.template.id)
            .field("lifecycle", &self.lifecycle)
            .field("attributes", &self.attributes)
            .field("tags", &self.tags)
            .field("effects", &self.effects.len())
            .field("abilities", &self.abilities.len())
            .finish()
    }
}
