//! Ability definitions and the per-character ability registry
//!
//! Every granted ability runs through a small state machine:
//!
//! ```text
//! Granted -> Activating -> Active -> Ending -> Granted
//! Granted -> Removed (revoked; the AbilitySpec leaves the registry)
//! ```
//!
//! The registry only tracks state. Applying the effects of an ability's steps
//! and committing its costs is the owning character's job; the registry tells
//! it which steps are due and which effect handles to revert when an ability
//! stops.

use crate::attribute::AttributeStore;
use crate::gate::{ActivationGate, Cost};
use crate::tag::{TagContainer, TagSet};
use crate::time::Tick;
use crate::{AbilityHandle, DefId, EffectHandle, EntityId, Error, InputId, Result};
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use std::sync::Arc;

/// Lifecycle state of a granted ability
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum AbilityState {
    Granted,
    Activating,
    Active,
    Ending,
    Removed,
}

impl AbilityState {
    /// Check if an activation is in flight
    pub fn is_running(&self) -> bool {
        matches!(
            self,
            AbilityState::Activating | AbilityState::Active | AbilityState::Ending
        )
    }
}

/// What to do with an activation request while one is in flight
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
pub enum ConcurrencyPolicy {
    #[default]
    Reject,
    /// Hold the request and start it when the current activation ends
    Queue,
}

/// Who receives a step's effect
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
pub enum StepTarget {
    #[default]
    Owner,
    /// The activation target (another character)
    Target,
}

/// One effect application performed by an ability
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AbilityStep {
    pub effect: DefId,
    #[serde(default)]
    pub target: StepTarget,
    /// Ticks after activation
    #[serde(default)]
    pub delay: Tick,
}

/// Static definition of an ability
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AbilityDef {
    pub id: DefId,
    /// Default input binding
    #[serde(default)]
    pub input: InputId,
    /// Tags describing the ability (used by cancel queries)
    #[serde(default)]
    pub tags: TagContainer,
    /// Activation is denied while any of these is present on the owner
    #[serde(default)]
    pub blocked_by: TagContainer,
    #[serde(default)]
    pub costs: Vec<Cost>,
    #[serde(default)]
    pub cooldown: Tick,
    /// Minimum active time; the ability also stays active until its last step
    #[serde(default)]
    pub duration: Tick,
    #[serde(default)]
    pub concurrency: ConcurrencyPolicy,
    #[serde(default)]
    pub steps: Vec<AbilityStep>,
    /// Activate once as soon as the ability is granted
    #[serde(default)]
    pub activate_on_grant: bool,
    /// Stay active while the input is held
    #[serde(default)]
    pub end_on_release: bool,
    /// Revert owner effects applied by the ability when it stops
    #[serde(default)]
    pub remove_effects_on_end: bool,
}

impl AbilityDef {
    /// Create an ability with no steps, costs or cooldown
    pub fn new(id: impl Into<DefId>) -> Self {
        Self {
            id: id.into(),
            input: InputId::NONE,
            tags: TagContainer::new(),
            blocked_by: TagContainer::new(),
            costs: Vec::new(),
            cooldown: 0,
            duration: 0,
            concurrency: ConcurrencyPolicy::Reject,
            steps: Vec::new(),
            activate_on_grant: false,
            end_on_release: false,
            remove_effects_on_end: false,
        }
    }

    pub fn input(mut self, input: InputId) -> Self {
        self.input = input;
        self
    }

    pub fn tag(mut self, tag: &str) -> Self {
        self.tags.add(tag);
        self
    }

    pub fn blocked_by(mut self, tag: &str) -> Self {
        self.blocked_by.add(tag);
        self
    }

    pub fn cost(mut self, attribute: &str, amount: f64) -> Self {
        self.costs.push(Cost::new(attribute, amount));
        self
    }

    pub fn cooldown(mut self, ticks: Tick) -> Self {
        self.cooldown = ticks;
        self
    }

    pub fn duration(mut self, ticks: Tick) -> Self {
        self.duration = ticks;
        self
    }

    pub fn concurrency(mut self, policy: ConcurrencyPolicy) -> Self {
        self.concurrency = policy;
        self
    }

    pub fn step(mut self, effect: &str, target: StepTarget, delay: Tick) -> Self {
        self.steps.push(AbilityStep {
            effect: DefId::new(effect),
            target,
            delay,
        });
        self
    }

    pub fn activate_on_grant(mut self) -> Self {
        self.activate_on_grant = true;
        self
    }

    pub fn end_on_release(mut self) -> Self {
        self.end_on_release = true;
        self
    }

    pub fn remove_effects_on_end(mut self) -> Self {
        self.remove_effects_on_end = true;
        self
    }

    /// Ticks the ability stays active, or `None` if it is held until released
    fn active_ticks(&self) -> Option<Tick> {
        let last_step = self.steps.iter().map(|s| s.delay).max().unwrap_or(0);
        if self.end_on_release && self.duration == 0 {
            return None;
        }
        Some(self.duration.max(last_step))
    }
}

/// A running activation
#[derive(Debug, Clone, PartialEq)]
pub struct AbilityInstance {
    pub target: Option<EntityId>,
    /// Ticks until the activation ends; `None` while held
    pub remaining: Option<Tick>,
    /// Delayed steps with their remaining delay
    pub pending: Vec<(Tick, AbilityStep)>,
    /// Owner effects applied by this activation
    pub applied: Vec<EffectHandle>,
}

/// A granted ability
#[derive(Debug, Clone)]
pub struct AbilitySpec {
    pub handle: AbilityHandle,
    pub def: Arc<AbilityDef>,
    pub input: InputId,
    pub level: u32,
    pub source: Option<EntityId>,
    pub state: AbilityState,
    pub cooldown_remaining: Tick,
    /// Targets of activations waiting behind the current one
    pub queued: Vec<Option<EntityId>>,
    pub instance: Option<AbilityInstance>,
}

/// Result of [`AbilityRegistry::grant`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Granted {
    New(AbilityHandle),
    /// An equivalent ability (same definition and source) was already granted
    Existing(AbilityHandle),
}

impl Granted {
    pub fn handle(&self) -> AbilityHandle {
        match self {
            Granted::New(h) | Granted::Existing(h) => *h,
        }
    }

    pub fn is_new(&self) -> bool {
        matches!(self, Granted::New(_))
    }
}

/// Result of [`AbilityRegistry::begin`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Activation {
    /// The ability moved to `Activating`
    Started,
    /// The request waits behind the running activation
    Queued,
}

/// An activation that stopped (ended, cancelled or cleared)
#[derive(Debug, Clone, PartialEq)]
pub struct Stopped {
    pub handle: AbilityHandle,
    pub def: DefId,
    /// Owner effects that must be reverted
    pub revert: Vec<EffectHandle>,
}

/// Work produced by [`AbilityRegistry::tick`]
#[derive(Debug, Clone, Default, PartialEq)]
pub struct AbilityTick {
    /// Delayed steps that came due, with the activation target
    pub due: Vec<(AbilityHandle, Option<EntityId>, AbilityStep)>,
    /// Activations whose time ran out
    pub finished: Vec<AbilityHandle>,
}

/// Abilities granted to one character
#[derive(Debug, Default)]
pub struct AbilityRegistry {
    next_handle: u64,
    specs: IndexMap<AbilityHandle, AbilitySpec>,
    bindings: IndexMap<InputId, Vec<AbilityHandle>>,
}

impl AbilityRegistry {
    /// Create an empty registry
    pub fn new() -> Self {
        Self::default()
    }

    /// Grant an ability
    ///
    /// Idempotent on (definition id, source). `input` overrides the
    /// definition's default binding.
    pub fn grant(
        &mut self,
        def: Arc<AbilityDef>,
        input: Option<InputId>,
        level: u32,
        source: Option<EntityId>,
    ) -> Granted {
        if let Some(existing) = self.find(&def.id, source) {
            return Granted::Existing(existing);
        }
        self.next_handle += 1;
        let handle = AbilityHandle(self.next_handle);
        let input = input.unwrap_or(def.input);
        tracing::debug!(ability = %def.id, %handle, %input, "granted ability");
        self.specs.insert(
            handle,
            AbilitySpec {
                handle,
                def,
                input,
                level: level.max(1),
                source,
                state: AbilityState::Granted,
                cooldown_remaining: 0,
                queued: Vec::new(),
                instance: None,
            },
        );
        if !input.is_none() {
            self.bindings.entry(input).or_default().push(handle);
        }
        Granted::New(handle)
    }

    /// Find a granted ability by definition and source
    pub fn find(&self, id: &DefId, source: Option<EntityId>) -> Option<AbilityHandle> {
        self.specs
            .values()
            .find(|s| &s.def.id == id && s.source == source)
            .map(|s| s.handle)
    }

    /// Request an activation
    ///
    /// Runs the gate against the owner's tags and attributes. Blocking tags
    /// deny even a request that would otherwise be queued behind a running
    /// activation. On success the ability is `Activating`; the caller commits
    /// costs and then calls [`activate`](Self::activate).
    pub fn begin(
        &mut self,
        handle: AbilityHandle,
        target: Option<EntityId>,
        gate: &ActivationGate,
        tags: &TagSet,
        attributes: &AttributeStore,
        max_queued: usize,
    ) -> Result<Activation> {
        let spec = self.spec_mut(handle)?;
        gate.check_tags(tags, &spec.def.blocked_by)
            .map_err(Error::Denied)?;
        if spec.state.is_running() {
            return match spec.def.concurrency {
                ConcurrencyPolicy::Queue if spec.queued.len() < max_queued => {
                    spec.queued.push(target);
                    Ok(Activation::Queued)
                }
                _ => Err(Error::AlreadyActive(handle)),
            };
        }

        gate.check(
            tags,
            &spec.def.blocked_by,
            spec.cooldown_remaining,
            &spec.def.costs,
            attributes,
        )
        .map_err(Error::Denied)?;

        spec.state = AbilityState::Activating;
        spec.instance = Some(AbilityInstance {
            target,
            remaining: spec.def.active_ticks(),
            pending: Vec::new(),
            applied: Vec::new(),
        });
        Ok(Activation::Started)
    }

    /// Move an `Activating` ability to `Active`
    ///
    /// Starts the cooldown and returns the steps due immediately; delayed
    /// steps are held until [`tick`](Self::tick) releases them.
    pub fn activate(&mut self, handle: AbilityHandle) -> Result<Vec<AbilityStep>> {
        let spec = self.spec_mut(handle)?;
        if spec.state != AbilityState::Activating {
            return Err(Error::InvalidOperation(format!(
                "{} is {:?}, not activating",
                handle, spec.state
            )));
        }
        spec.state = AbilityState::Active;
        spec.cooldown_remaining = spec.def.cooldown;

        let (now, later): (Vec<_>, Vec<_>) = spec.def.steps.iter().cloned().partition(|s| s.delay == 0);
        if let Some(instance) = spec.instance.as_mut() {
            instance.pending = later.into_iter().map(|s| (s.delay, s)).collect();
        }
        Ok(now)
    }

    /// Remember an owner effect applied by the running activation
    pub fn record_applied(&mut self, handle: AbilityHandle, effect: EffectHandle) -> Result<()> {
        let spec = self.spec_mut(handle)?;
        match spec.instance.as_mut() {
            Some(instance) => {
                instance.applied.push(effect);
                Ok(())
            }
            None => Err(Error::InvalidOperation(format!("{} is not running", handle))),
        }
    }

    /// Check if a running activation has nothing left to do
    pub fn is_finished(&self, handle: AbilityHandle) -> bool {
        self.specs
            .get(&handle)
            .and_then(|s| s.instance.as_ref())
            .map(|i| i.remaining == Some(0) && i.pending.is_empty())
            .unwrap_or(false)
    }

    /// End a running activation normally
    ///
    /// Queued requests stay queued; take them with
    /// [`pop_queued`](Self::pop_queued).
    pub fn end(&mut self, handle: AbilityHandle) -> Result<Stopped> {
        let spec = self.spec_mut(handle)?;
        if !spec.state.is_running() {
            return Err(Error::InvalidOperation(format!("{} is not running", handle)));
        }
        Ok(Self::stop(spec))
    }

    /// Cancel a running activation, dropping pending steps and queued requests
    ///
    /// Cancelling an idle ability is a no-op with nothing to revert.
    pub fn cancel(&mut self, handle: AbilityHandle) -> Result<Stopped> {
        let spec = self.spec_mut(handle)?;
        spec.queued.clear();
        if !spec.state.is_running() {
            return Ok(Stopped {
                handle,
                def: spec.def.id.clone(),
                revert: Vec::new(),
            });
        }
        Ok(Self::stop(spec))
    }

    /// Cancel running abilities tagged with any of `with` and none of `without`
    pub fn cancel_matching(&mut self, with: &TagContainer, without: &TagContainer) -> Vec<Stopped> {
        let mut stopped = Vec::new();
        for spec in self.specs.values_mut() {
            let tags = &spec.def.tags;
            if spec.state.is_running() && tags.matches_any(with) && !tags.matches_any(without) {
                spec.queued.clear();
                stopped.push(Self::stop(spec));
            }
        }
        stopped
    }

    /// Cancel every running ability
    pub fn cancel_all(&mut self) -> Vec<Stopped> {
        let mut stopped = Vec::new();
        for spec in self.specs.values_mut() {
            spec.queued.clear();
            if spec.state.is_running() {
                stopped.push(Self::stop(spec));
            }
        }
        stopped
    }

    /// Take the next queued activation target
    pub fn pop_queued(&mut self, handle: AbilityHandle) -> Option<Option<EntityId>> {
        let spec = self.specs.get_mut(&handle)?;
        if spec.queued.is_empty() {
            None
        } else {
            Some(spec.queued.remove(0))
        }
    }

    /// Remove an ability regardless of its state
    ///
    /// A running activation is cancelled first; the `AbilitySpec` ends in `Removed`
    /// and is returned.
    pub fn clear(&mut self, handle: AbilityHandle) -> Result<(AbilitySpec, Stopped)> {
        let stopped = self.cancel(handle)?;
        self.unbind(handle);
        let mut spec = self
            .specs
            .shift_remove(&handle)
            .ok_or(Error::AbilityNotFound(handle))?;
        spec.state = AbilityState::Removed;
        tracing::debug!(ability = %spec.def.id, %handle, "cleared ability");
        Ok((spec, stopped))
    }

    /// Remove every ability granted by `source`
    pub fn revoke_from(&mut self, source: EntityId) -> Vec<Stopped> {
        let handles: Vec<_> = self
            .specs
            .values()
            .filter(|s| s.source == Some(source))
            .map(|s| s.handle)
            .collect();
        self.clear_all(handles)
    }

    /// Remove every ability
    pub fn revoke_all(&mut self) -> Vec<Stopped> {
        let handles: Vec<_> = self.specs.keys().copied().collect();
        self.clear_all(handles)
    }

    /// Advance cooldowns, step delays and activation timers
    pub fn tick(&mut self, dt: Tick) -> AbilityTick {
        let mut out = AbilityTick::default();
        for spec in self.specs.values_mut() {
            spec.cooldown_remaining = spec.cooldown_remaining.saturating_sub(dt);
            if spec.state != AbilityState::Active {
                continue;
            }
            let Some(instance) = spec.instance.as_mut() else {
                continue;
            };
            let mut waiting = Vec::with_capacity(instance.pending.len());
            for (delay, step) in instance.pending.drain(..) {
                if delay <= dt {
                    out.due.push((spec.handle, instance.target, step));
                } else {
                    waiting.push((delay - dt, step));
                }
            }
            instance.pending = waiting;
            if let Some(remaining) = instance.remaining.as_mut() {
                *remaining = remaining.saturating_sub(dt);
                if *remaining == 0 && instance.pending.is_empty() {
                    out.finished.push(spec.handle);
                }
            }
        }
        out
    }

    /// Bind an input to an ability, replacing its previous binding
    pub fn bind_input(&mut self, input: InputId, handle: AbilityHandle) -> Result<()> {
        self.unbind(handle);
        let spec = self.spec_mut(handle)?;
        spec.input = input;
        if !input.is_none() {
            self.bindings.entry(input).or_default().push(handle);
        }
        Ok(())
    }

    /// Remove every binding of an ability
    pub fn unbind(&mut self, handle: AbilityHandle) {
        for handles in self.bindings.values_mut() {
            handles.retain(|h| *h != handle);
        }
        self.bindings.retain(|_, handles| !handles.is_empty());
    }

    /// Abilities bound to an input, in binding order
    pub fn bound(&self, input: InputId) -> &[AbilityHandle] {
        self.bindings.get(&input).map(Vec::as_slice).unwrap_or(&[])
    }

    /// Running abilities bound to `input` that end when it is released
    pub fn held_by(&self, input: InputId) -> Vec<AbilityHandle> {
        self.bound(input)
            .iter()
            .copied()
            .filter(|h| {
                self.specs
                    .get(h)
                    .map(|s| s.def.end_on_release && s.state.is_running())
                    .unwrap_or(false)
            })
            .collect()
    }

    /// Get a granted ability
    pub fn get(&self, handle: AbilityHandle) -> Option<&AbilitySpec> {
        self.specs.get(&handle)
    }

    /// State of a granted ability
    pub fn state(&self, handle: AbilityHandle) -> Option<AbilityState> {
        self.specs.get(&handle).map(|s| s.state)
    }

    /// Iterate over granted abilities in grant order
    pub fn iter(&self) -> impl Iterator<Item = &AbilitySpec> {
        self.specs.values()
    }

    /// Number of granted abilities
    pub fn len(&self) -> usize {
        self.specs.len()
    }

    /// Check if nothing is granted
    pub fn is_empty(&self) -> bool {
        self.specs.is_empty()
    }

    /// Number of abilities in `Activating` or `Active`
    pub fn running_count(&self) -> usize {
        self.specs.values().filter(|s| s.state.is_running()).count()
    }

    fn spec_mut(&mut self, handle: AbilityHandle) -> Result<&mut AbilitySpec> {
        self.specs
            .get_mut(&handle)
            .ok_or(Error::AbilityNotFound(handle))
    }

    fn clear_all(&mut self, handles: Vec<AbilityHandle>) -> Vec<Stopped> {
        handles
            .into_iter()
            .filter_map(|h| self.clear(h).ok())
            .map(|(_, stopped)| stopped)
            .collect()
    }

    fn stop(spec: &mut AbilitySpec) -> Stopped {
        spec.state = AbilityState::Ending;
        let instance = spec.instance.take();
        let revert = match instance {
            Some(instance) if spec.def.remove_effects_on_end => instance.applied,
            _ => Vec::new(),
        };
        spec.state = AbilityState::Granted;
        Stopped {
            handle: spec.handle,
            def: spec.def.id.clone(),
            revert,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::attribute::{names, AttributeDef};
    use crate::config::RuntimeConfig;

    struct Fixture {
        registry: AbilityRegistry,
        gate: ActivationGate,
        tags: TagSet,
        attributes: AttributeStore,
    }

    impl Fixture {
        fn new() -> Self {
            Self {
                registry: AbilityRegistry::new(),
                gate: ActivationGate::new(RuntimeConfig::default().blocking_tags),
                tags: TagSet::new(),
                attributes: AttributeStore::with_defs(AttributeDef::character_set(100.0, 50.0)).unwrap(),
            }
        }

        fn begin(&mut self, handle: AbilityHandle) -> Result<Activation> {
            self.registry
                .begin(handle, None, &self.gate, &self.tags, &self.attributes, 1)
        }
    }

    fn fireball() -> Arc<AbilityDef> {
        Arc::new(
            AbilityDef::new("Fireball")
                .input(InputId::new(1))
                .tag("Ability.Skill")
                .cost(names::MANA, 10.0)
                .cooldown(5)
                .step("Burn", StepTarget::Target, 0)
                .step("Afterburn", StepTarget::Target, 3),
        )
    }

    #[test]
    fn test_grant_is_idempotent() {
        let mut f = Fixture::new();
        let source = Some(EntityId(1));
        let first = f.registry.grant(fireball(), None, 1, source);
        let second = f.registry.grant(fireball(), None, 1, source);

        assert!(first.is_new());
        assert_eq!(second, Granted::Existing(first.handle()));
        assert_eq!(f.registry.len(), 1);
        assert_eq!(f.registry.bound(InputId::new(1)), &[first.handle()]);

        let other = f.registry.grant(fireball(), None, 1, Some(EntityId(2)));
        assert!(other.is_new());
        assert_eq!(f.registry.len(), 2);
    }

    #[test]
    fn test_state_machine() {
        let mut f = Fixture::new();
        let handle = f.registry.grant(fireball(), None, 1, None).handle();
        assert_eq!(f.registry.state(handle), Some(AbilityState::Granted));

        assert_eq!(f.begin(handle), Ok(Activation::Started));
        assert_eq!(f.registry.state(handle), Some(AbilityState::Activating));

        let now = f.registry.activate(handle).unwrap();
        assert_eq!(now.len(), 1);
        assert_eq!(now[0].effect, DefId::new("Burn"));
        assert_eq!(f.registry.state(handle), Some(AbilityState::Active));
        assert!(!f.registry.is_finished(handle));

        let ticked = f.registry.tick(2);
        assert!(ticked.due.is_empty());
        let ticked = f.registry.tick(1);
        assert_eq!(ticked.due.len(), 1);
        assert_eq!(ticked.finished, vec![handle]);

        let stopped = f.registry.end(handle).unwrap();
        assert!(stopped.revert.is_empty());
        assert_eq!(f.registry.state(handle), Some(AbilityState::Granted));
    }

    #[test]
    fn test_reject_while_running_and_cooldown() {
        let mut f = Fixture::new();
        let handle = f.registry.grant(fireball(), None, 1, None).handle();
        f.begin(handle).unwrap();
        assert_eq!(f.begin(handle), Err(Error::AlreadyActive(handle)));

        f.registry.activate(handle).unwrap();
        f.registry.end(handle).unwrap();
        let denied = f.begin(handle).unwrap_err();
        assert_eq!(denied.deny_reason(), Some(&crate::gate::DenyReason::Cooldown { remaining: 5 }));

        f.registry.tick(5);
        assert_eq!(f.begin(handle), Ok(Activation::Started));
    }

    #[test]
    fn test_dead_tag_denies() {
        let mut f = Fixture::new();
        let handle = f.registry.grant(fireball(), None, 1, None).handle();
        f.tags.add_tag("State.Dead", 1);
        for _ in 0..3 {
            assert!(matches!(f.begin(handle), Err(Error::Denied(_))));
        }
        assert_eq!(f.registry.state(handle), Some(AbilityState::Granted));
    }

    #[test]
    fn test_queue_policy() {
        let mut f = Fixture::new();
        let def = Arc::new(AbilityDef::new("Combo").duration(2).concurrency(ConcurrencyPolicy::Queue));
        let handle = f.registry.grant(def, None, 1, None).handle();

        f.begin(handle).unwrap();
        f.registry.activate(handle).unwrap();
        assert_eq!(f.begin(handle), Ok(Activation::Queued));
        assert_eq!(f.begin(handle), Err(Error::AlreadyActive(handle)));

        f.registry.end(handle).unwrap();
        assert_eq!(f.registry.pop_queued(handle), Some(None));
        assert_eq!(f.registry.pop_queued(handle), None);
    }

    #[test]
    fn test_cancel_drops_pending_and_reverts() {
        let mut f = Fixture::new();
        let def = Arc::new(
            AbilityDef::new("Channel")
                .step("Drain", StepTarget::Owner, 0)
                .step("Burst", StepTarget::Owner, 10)
                .remove_effects_on_end(),
        );
        let handle = f.registry.grant(def, None, 1, None).handle();
        f.begin(handle).unwrap();
        f.registry.activate(handle).unwrap();
        f.registry.record_applied(handle, EffectHandle(4)).unwrap();

        let stopped = f.registry.cancel(handle).unwrap();
        assert_eq!(stopped.revert, vec![EffectHandle(4)]);
        assert!(f.registry.tick(20).due.is_empty());
        assert_eq!(f.registry.running_count(), 0);
    }

    #[test]
    fn test_cancel_matching() {
        let mut f = Fixture::new();
        let stunnable = Arc::new(AbilityDef::new("Swing").tag("Ability.Melee").duration(5));
        let immune = Arc::new(
            AbilityDef::new("Cleanse")
                .tag("Ability.Skill")
                .tag("Ability.NotCanceledByStun")
                .duration(5),
        );
        let a = f.registry.grant(stunnable, None, 1, None).handle();
        let b = f.registry.grant(immune, None, 1, None).handle();
        for h in [a, b] {
            f.begin(h).unwrap();
            f.registry.activate(h).unwrap();
        }

        let config = RuntimeConfig::default();
        let stopped = f
            .registry
            .cancel_matching(&config.stun_cancel_tags, &config.stun_ignore_tags);
        assert_eq!(stopped.len(), 1);
        assert_eq!(stopped[0].handle, a);
        assert_eq!(f.registry.state(b), Some(AbilityState::Active));
    }

    #[test]
    fn test_clear_and_revoke() {
        let mut f = Fixture::new();
        let me = EntityId(1);
        let a = f.registry.grant(fireball(), None, 1, Some(me)).handle();
        let b = f
            .registry
            .grant(Arc::new(AbilityDef::new("Potion")), None, 1, Some(EntityId(2)))
            .handle();

        f.begin(a).unwrap();
        let (spec, _) = f.registry.clear(a).unwrap();
        assert_eq!(spec.state, AbilityState::Removed);
        assert!(f.registry.get(a).is_none());
        assert!(f.registry.bound(InputId::new(1)).is_empty());
        assert_eq!(f.registry.clear(a).unwrap_err(), Error::AbilityNotFound(a));

        f.registry.grant(fireball(), None, 1, Some(me));
        assert_eq!(f.registry.revoke_from(me).len(), 1);
        assert_eq!(f.registry.len(), 1);
        assert!(f.registry.get(b).is_some());

        f.registry.revoke_all();
        assert!(f.registry.is_empty());
    }

    #[test]
    fn test_held_abilities() {
        let mut f = Fixture::new();
        let def = Arc::new(AbilityDef::new("Block").input(InputId::new(3)).end_on_release());
        let handle = f.registry.grant(def, None, 1, None).handle();
        f.begin(handle).unwrap();
        f.registry.activate(handle).unwrap();

        assert!(!f.registry.is_finished(handle));
        assert!(f.registry.tick(100).finished.is_empty());
        assert_eq!(f.registry.held_by(InputId::new(3)), vec![handle]);
    }

    #[test]
    fn test_bind_input() {
        let mut f = Fixture::new();
        let handle = f.registry.grant(fireball(), None, 1, None).handle();
        f.registry.bind_input(InputId::new(7), handle).unwrap();
        assert!(f.registry.bound(InputId::new(1)).is_empty());
        assert_eq!(f.registry.bound(InputId::new(7)), &[handle]);
        assert!(f.registry.bind_input(InputId::new(7), AbilityHandle(99)).is_err());
    }
}
