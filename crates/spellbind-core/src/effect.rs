//! Effect definitions and the per-character effect engine
//!
//! Effects are the "write" side of the runtime. An [`EffectDef`] describes a
//! bundle of attribute modifiers plus tag grants; an [`EffectSpec`] is one
//! application of it (definition, source, level). The [`EffectEngine`] owns the
//! active instances applied *to* one character and drives their lifetime.

use crate::attribute::AttributeStore;
use crate::tag::{TagContainer, TagSet};
use crate::time::Tick;
use crate::{DefId, EffectHandle, EntityId, Error, Result};
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use std::sync::Arc;

/// How a modifier combines with an attribute value
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ModifierOp {
    /// Add the magnitude (after overrides)
    Add,
    /// Multiply the post-additive value
    Multiply,
    /// Replace the base value; the last override wins
    Override,
}

/// One attribute modifier of an effect
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Modifier {
    pub attribute: String,
    pub op: ModifierOp,
    pub magnitude: f64,
    /// Added to the magnitude for every level above 1
    #[serde(default)]
    pub per_level: f64,
}

impl Modifier {
    /// Create a modifier with no level scaling
    pub fn new(attribute: impl Into<String>, op: ModifierOp, magnitude: f64) -> Self {
        Self {
            attribute: attribute.into(),
            op,
            magnitude,
            per_level: 0.0,
        }
    }

    /// Magnitude at a given effect level
    pub fn magnitude_at(&self, level: u32) -> f64 {
        self.magnitude + self.per_level * level.saturating_sub(1) as f64
    }
}

/// Lifetime of an effect
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
pub enum EffectDuration {
    /// Executes once against base values and is never active
    #[default]
    Instant,
    /// Active for a number of ticks
    Timed(Tick),
    /// Active until removed
    Infinite,
}

/// What happens when the same effect is applied again
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
pub enum StackingPolicy {
    /// Every application is its own instance
    #[default]
    Independent,
    /// Re-application resets the timer of the single existing instance,
    /// whichever source applies it
    RefreshDuration,
}

/// Static definition of an effect
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EffectDef {
    pub id: DefId,
    #[serde(default)]
    pub modifiers: Vec<Modifier>,
    #[serde(default)]
    pub duration: EffectDuration,
    /// Execute the modifiers every `period` ticks instead of holding them
    #[serde(default)]
    pub period: Option<Tick>,
    #[serde(default)]
    pub stacking: StackingPolicy,
    /// Tags added to the target while the effect is active
    #[serde(default)]
    pub granted_tags: TagContainer,
    /// Tags describing the effect itself (used by removal queries)
    #[serde(default)]
    pub effect_tags: TagContainer,
    /// The effect is removed when any of these tags is present on the target
    #[serde(default)]
    pub remove_when_tags: TagContainer,
}

impl EffectDef {
    /// Create an instant effect with no modifiers
    pub fn new(id: impl Into<DefId>) -> Self {
        Self {
            id: id.into(),
            modifiers: Vec::new(),
            duration: EffectDuration::Instant,
            period: None,
            stacking: StackingPolicy::Independent,
            granted_tags: TagContainer::new(),
            effect_tags: TagContainer::new(),
            remove_when_tags: TagContainer::new(),
        }
    }

    /// Builder: add a modifier
    pub fn modifier(mut self, attribute: impl Into<String>, op: ModifierOp, magnitude: f64) -> Self {
        self.modifiers.push(Modifier::new(attribute, op, magnitude));
        self
    }

    /// Builder: set the duration
    pub fn duration(mut self, duration: EffectDuration) -> Self {
        self.duration = duration;
        self
    }

    /// Builder: execute every `ticks`
    pub fn period(mut self, ticks: Tick) -> Self {
        self.period = Some(ticks);
        self
    }

    /// Builder: set the stacking policy
    pub fn stacking(mut self, stacking: StackingPolicy) -> Self {
        self.stacking = stacking;
        self
    }

    /// Builder: grant a tag while active
    pub fn grants(mut self, tag: &str) -> Self {
        self.granted_tags.add(tag);
        self
    }

    /// Builder: tag the effect itself
    pub fn tagged(mut self, tag: &str) -> Self {
        self.effect_tags.add(tag);
        self
    }

    /// Builder: remove the effect when `tag` is present on the target
    pub fn removed_by(mut self, tag: &str) -> Self {
        self.remove_when_tags.add(tag);
        self
    }

    /// Check if this effect never becomes active
    pub fn is_instant(&self) -> bool {
        self.duration == EffectDuration::Instant
    }

    /// Period in ticks, if the effect is periodic
    pub fn periodic(&self) -> Option<Tick> {
        if self.is_instant() {
            return None;
        }
        self.period.filter(|p| *p > 0)
    }
}

/// One application of an effect definition
#[derive(Debug, Clone)]
pub struct EffectSpec {
    pub def: Arc<EffectDef>,
    /// Entity that caused the application (lookup only; may be gone)
    pub source: Option<EntityId>,
    pub level: u32,
}

impl EffectSpec {
    /// Create a level 1 spec with no source
    pub fn new(def: Arc<EffectDef>) -> Self {
        Self {
            def,
            source: None,
            level: 1,
        }
    }

    /// Builder: set the source entity
    pub fn from_source(mut self, source: EntityId) -> Self {
        self.source = Some(source);
        self
    }

    /// Builder: set the level
    pub fn at_level(mut self, level: u32) -> Self {
        self.level = level.max(1);
        self
    }

    /// Modifiers with their magnitudes resolved for this level
    pub fn resolved(&self) -> Vec<(String, ModifierOp, f64)> {
        self.def
            .modifiers
            .iter()
            .map(|m| (m.attribute.clone(), m.op, m.magnitude_at(self.level)))
            .collect()
    }
}

/// An effect instance currently active on a character
#[derive(Debug, Clone)]
pub struct ActiveEffect {
    pub handle: EffectHandle,
    pub spec: EffectSpec,
    /// Ticks left; `None` for infinite effects
    pub remaining: Option<Tick>,
    /// Ticks accumulated toward the next period
    pub period_elapsed: Tick,
}

impl ActiveEffect {
    fn granted_or_tagged(&self, queries: &TagContainer) -> bool {
        self.spec.def.granted_tags.matches_any(queries) || self.spec.def.effect_tags.matches_any(queries)
    }
}

/// Active effects applied to one character
#[derive(Debug, Default)]
pub struct EffectEngine {
    next_handle: u64,
    active: IndexMap<EffectHandle, ActiveEffect>,
}

impl EffectEngine {
    /// Create an empty engine
    pub fn new() -> Self {
        Self::default()
    }

    /// Apply an effect to the owner's attributes and tags
    ///
    /// Every modifier target is validated first; on failure nothing is
    /// applied and `Error::InvalidTarget` is returned. Instant effects return
    /// a handle that is never active.
    pub fn apply(
        &mut self,
        spec: EffectSpec,
        attributes: &mut AttributeStore,
        tags: &mut TagSet,
    ) -> Result<EffectHandle> {
        let def = spec.def.clone();
        if let Some(missing) = def.modifiers.iter().find(|m| !attributes.contains(&m.attribute)) {
            return Err(Error::InvalidTarget {
                effect: def.id.clone(),
                reason: format!("unknown attribute {}", missing.attribute),
            });
        }

        if def.stacking == StackingPolicy::RefreshDuration && !def.is_instant() {
            if let Some(existing) = self
                .active
                .values_mut()
                .find(|a| a.spec.def.id == def.id)
            {
                existing.remaining = Self::initial_remaining(&def);
                existing.period_elapsed = 0;
                tracing::debug!(effect = %def.id, handle = %existing.handle, "refreshed effect duration");
                return Ok(existing.handle);
            }
        }

        let handle = self.allocate();
        let resolved = spec.resolved();
        if def.is_instant() {
            attributes.execute(&resolved)?;
            tracing::debug!(effect = %def.id, "executed instant effect");
            return Ok(handle);
        }

        if def.periodic().is_some() {
            attributes.execute(&resolved)?;
        } else {
            attributes.add_modifiers(handle, &resolved)?;
        }
        for tag in def.granted_tags.iter() {
            tags.add_tag(tag.clone(), 1);
        }
        tracing::debug!(effect = %def.id, %handle, "applied effect");
        self.active.insert(
            handle,
            ActiveEffect {
                handle,
                remaining: Self::initial_remaining(&def),
                spec,
                period_elapsed: 0,
            },
        );
        Ok(handle)
    }

    /// Remove an active effect, reverting its modifiers and granted tags
    pub fn remove(
        &mut self,
        handle: EffectHandle,
        attributes: &mut AttributeStore,
        tags: &mut TagSet,
    ) -> Result<()> {
        let effect = self
            .active
            .shift_remove(&handle)
            .ok_or(Error::EffectNotFound(handle))?;
        Self::revert(&effect, attributes, tags);
        Ok(())
    }

    /// Remove every active effect whose granted tags or effect tags match any
    /// query tag (hierarchically), returning how many were removed
    pub fn remove_by_tag(
        &mut self,
        queries: &TagContainer,
        attributes: &mut AttributeStore,
        tags: &mut TagSet,
    ) -> usize {
        self.remove_where(|effect, _| effect.granted_or_tagged(queries), attributes, tags)
    }

    /// Remove active effects whose removal tags are present on the owner
    pub fn remove_blocked(&mut self, attributes: &mut AttributeStore, tags: &mut TagSet) -> usize {
        self.remove_where(
            |effect, tags| {
                !effect.spec.def.remove_when_tags.is_empty() && tags.has_any(&effect.spec.def.remove_when_tags)
            },
            attributes,
            tags,
        )
    }

    /// Remove every active effect
    pub fn clear(&mut self, attributes: &mut AttributeStore, tags: &mut TagSet) -> usize {
        self.remove_where(|_, _| true, attributes, tags)
    }

    /// Advance every active effect by `dt` ticks
    ///
    /// Periodic effects execute once per elapsed period (including a period
    /// that completes on the expiry tick). Returns the handles that expired.
    pub fn tick(&mut self, dt: Tick, attributes: &mut AttributeStore, tags: &mut TagSet) -> Vec<EffectHandle> {
        let mut expired = Vec::new();
        for effect in self.active.values_mut() {
            let advance = effect.remaining.map_or(dt, |r| dt.min(r));
            if let Some(period) = effect.spec.def.periodic() {
                effect.period_elapsed += advance;
                let executions = effect.period_elapsed / period;
                effect.period_elapsed %= period;
                if executions > 0 {
                    let resolved = effect.spec.resolved();
                    for _ in 0..executions {
                        if let Err(e) = attributes.execute(&resolved) {
                            tracing::warn!(effect = %effect.spec.def.id, error = %e, "periodic execution failed");
                        }
                    }
                }
            }
            if let Some(remaining) = effect.remaining.as_mut() {
                *remaining -= advance;
                if *remaining == 0 {
                    expired.push(effect.handle);
                }
            }
        }
        for handle in &expired {
            if let Some(effect) = self.active.shift_remove(handle) {
                tracing::debug!(effect = %effect.spec.def.id, %handle, "effect expired");
                Self::revert(&effect, attributes, tags);
            }
        }
        expired
    }

    /// Get an active effect
    pub fn get(&self, handle: EffectHandle) -> Option<&ActiveEffect> {
        self.active.get(&handle)
    }

    /// Check if an effect is active
    pub fn is_active(&self, handle: EffectHandle) -> bool {
        self.active.contains_key(&handle)
    }

    /// Number of active effects
    pub fn len(&self) -> usize {
        self.active.len()
    }

    /// Check if no effect is active
    pub fn is_empty(&self) -> bool {
        self.active.is_empty()
    }

    /// Iterate over active effects in application order
    pub fn iter(&self) -> impl Iterator<Item = &ActiveEffect> {
        self.active.values()
    }

    /// Number of active instances of a definition
    pub fn count_of(&self, id: &DefId) -> usize {
        self.active.values().filter(|a| &a.spec.def.id == id).count()
    }

    fn allocate(&mut self) -> EffectHandle {
        self.next_handle += 1;
        EffectHandle(self.next_handle)
    }

    fn initial_remaining(def: &EffectDef) -> Option<Tick> {
        match def.duration {
            EffectDuration::Timed(ticks) => Some(ticks.max(1)),
            _ => None,
        }
    }

    fn remove_where(
        &mut self,
        mut predicate: impl FnMut(&ActiveEffect, &TagSet) -> bool,
        attributes: &mut AttributeStore,
        tags: &mut TagSet,
    ) -> usize {
        let doomed: Vec<EffectHandle> = self
            .active
            .values()
            .filter(|effect| predicate(effect, &*tags))
            .map(|effect| effect.handle)
            .collect();
        for handle in &doomed {
            if let Some(effect) = self.active.shift_remove(handle) {
                tracing::debug!(effect = %effect.spec.def.id, %handle, "removed effect");
                Self::revert(&effect, attributes, tags);
            }
        }
        doomed.len()
    }

    fn revert(effect: &ActiveEffect, attributes: &mut AttributeStore, tags: &mut TagSet) {
        attributes.remove_modifiers(effect.handle);
        for tag in effect.spec.def.granted_tags.iter() {
            tags.remove_tag(tag, 1);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::attribute::{names, AttributeDef};
    use crate::tag::GameplayTag;

    fn stores() -> (AttributeStore, TagSet) {
        let mut attributes = AttributeStore::with_defs(AttributeDef::character_set(100.0, 50.0)).unwrap();
        attributes.define(AttributeDef::new("Armor").initial(100.0)).unwrap();
        (attributes, TagSet::new())
    }

    fn spec(def: EffectDef) -> EffectSpec {
        EffectSpec::new(Arc::new(def))
    }

    #[test]
    fn test_additive_before_multiplicative() {
        let (mut attributes, mut tags) = stores();
        let mut engine = EffectEngine::new();
        let def = EffectDef::new("Fortify")
            .duration(EffectDuration::Infinite)
            .modifier("Armor", ModifierOp::Multiply, 1.5)
            .modifier("Armor", ModifierOp::Add, 10.0);

        let handle = engine.apply(spec(def), &mut attributes, &mut tags).unwrap();
        assert_eq!(attributes.get("Armor"), Ok(165.0));

        engine.remove(handle, &mut attributes, &mut tags).unwrap();
        assert_eq!(attributes.get("Armor"), Ok(100.0));
        assert_eq!(
            engine.remove(handle, &mut attributes, &mut tags),
            Err(Error::EffectNotFound(handle))
        );
    }

    #[test]
    fn test_instant_changes_base_and_is_not_active() {
        let (mut attributes, mut tags) = stores();
        let mut engine = EffectEngine::new();
        let damage = EffectDef::new("Damage")
            .modifier(names::HEALTH, ModifierOp::Add, -25.0)
            .grants("State.Ignored");

        let handle = engine.apply(spec(damage), &mut attributes, &mut tags).unwrap();
        assert!(!engine.is_active(handle));
        assert_eq!(attributes.base(names::HEALTH), Ok(75.0));
        assert!(!tags.has_tag(&GameplayTag::new("State.Ignored")));
    }

    #[test]
    fn test_invalid_target_applies_nothing() {
        let (mut attributes, mut tags) = stores();
        let mut engine = EffectEngine::new();
        let def = EffectDef::new("Broken")
            .duration(EffectDuration::Infinite)
            .modifier(names::HEALTH, ModifierOp::Add, -10.0)
            .modifier("Stamina", ModifierOp::Add, 10.0)
            .grants("State.Broken");

        let err = engine.apply(spec(def), &mut attributes, &mut tags).unwrap_err();
        assert!(matches!(err, Error::InvalidTarget { .. }));
        assert!(engine.is_empty());
        assert_eq!(attributes.get(names::HEALTH), Ok(100.0));
        assert!(!tags.has_tag(&GameplayTag::new("State.Broken")));
    }

    #[test]
    fn test_timed_effect_expires_and_reverts() {
        let (mut attributes, mut tags) = stores();
        let mut engine = EffectEngine::new();
        let haste = EffectDef::new("Haste")
            .duration(EffectDuration::Timed(3))
            .modifier("Armor", ModifierOp::Add, 20.0)
            .grants("State.Buff.Haste");

        let handle = engine.apply(spec(haste), &mut attributes, &mut tags).unwrap();
        assert!(tags.has_matching(&GameplayTag::new("State.Buff")));

        assert!(engine.tick(2, &mut attributes, &mut tags).is_empty());
        assert_eq!(attributes.get("Armor"), Ok(120.0));
        assert_eq!(engine.tick(1, &mut attributes, &mut tags), vec![handle]);
        assert_eq!(attributes.get("Armor"), Ok(100.0));
        assert!(!tags.has_tag(&GameplayTag::new("State.Buff.Haste")));
    }

    #[test]
    fn test_refresh_duration_keeps_one_instance() {
        let (mut attributes, mut tags) = stores();
        let mut engine = EffectEngine::new();
        let def = Arc::new(
            EffectDef::new("Shield")
                .duration(EffectDuration::Timed(10))
                .stacking(StackingPolicy::RefreshDuration)
                .modifier("Armor", ModifierOp::Add, 5.0)
                .grants("State.Buff.Shield"),
        );

        let first = engine
            .apply(EffectSpec::new(def.clone()).from_source(EntityId(9)), &mut attributes, &mut tags)
            .unwrap();
        engine.tick(6, &mut attributes, &mut tags);
        let second = engine
            .apply(EffectSpec::new(def.clone()).from_source(EntityId(9)), &mut attributes, &mut tags)
            .unwrap();

        assert_eq!(first, second);
        assert_eq!(engine.len(), 1);
        assert_eq!(engine.get(first).and_then(|a| a.remaining), Some(10));
        assert_eq!(attributes.get("Armor"), Ok(105.0));

        // another source refreshes the same instance
        engine.tick(4, &mut attributes, &mut tags);
        let third = engine
            .apply(EffectSpec::new(def).from_source(EntityId(10)), &mut attributes, &mut tags)
            .unwrap();
        assert_eq!(third, first);
        assert_eq!(engine.count_of(&DefId::new("Shield")), 1);
        assert_eq!(engine.get(first).and_then(|a| a.remaining), Some(10));
        assert_eq!(attributes.get("Armor"), Ok(105.0));
        assert_eq!(tags.count(&GameplayTag::new("State.Buff.Shield")), 1);
    }

    #[test]
    fn test_independent_stacks() {
        let (mut attributes, mut tags) = stores();
        let mut engine = EffectEngine::new();
        let def = Arc::new(
            EffectDef::new("Sunder")
                .duration(EffectDuration::Infinite)
                .modifier("Armor", ModifierOp::Add, -10.0)
                .grants("State.Debuff.Sunder"),
        );
        engine.apply(EffectSpec::new(def.clone()), &mut attributes, &mut tags).unwrap();
        engine.apply(EffectSpec::new(def), &mut attributes, &mut tags).unwrap();

        assert_eq!(engine.len(), 2);
        assert_eq!(attributes.get("Armor"), Ok(80.0));
        assert_eq!(tags.count(&GameplayTag::new("State.Debuff.Sunder")), 2);
    }

    #[test]
    fn test_periodic_executes_on_apply_and_every_period() {
        let (mut attributes, mut tags) = stores();
        let mut engine = EffectEngine::new();
        let poison = EffectDef::new("Poison")
            .duration(EffectDuration::Timed(30))
            .period(10)
            .modifier(names::HEALTH, ModifierOp::Add, -5.0)
            .grants("State.Debuff.Poison");

        engine.apply(spec(poison), &mut attributes, &mut tags).unwrap();
        assert_eq!(attributes.get(names::HEALTH), Ok(95.0));

        engine.tick(9, &mut attributes, &mut tags);
        assert_eq!(attributes.get(names::HEALTH), Ok(95.0));
        engine.tick(1, &mut attributes, &mut tags);
        assert_eq!(attributes.get(names::HEALTH), Ok(90.0));

        let expired = engine.tick(100, &mut attributes, &mut tags);
        assert_eq!(expired.len(), 1);
        assert_eq!(attributes.get(names::HEALTH), Ok(80.0));
        assert!(!tags.has_tag(&GameplayTag::new("State.Debuff.Poison")));
    }

    #[test]
    fn test_remove_by_tag_reverts_matching_only() {
        let (mut attributes, mut tags) = stores();
        let mut engine = EffectEngine::new();
        let on_death = EffectDef::new("Rage")
            .duration(EffectDuration::Infinite)
            .modifier("Armor", ModifierOp::Add, 30.0)
            .grants("State.RemoveOnDeath");
        let keep = EffectDef::new("Blessing")
            .duration(EffectDuration::Infinite)
            .modifier("Armor", ModifierOp::Multiply, 2.0);
        let tagged = EffectDef::new("Curse")
            .duration(EffectDuration::Infinite)
            .modifier("Armor", ModifierOp::Add, -5.0)
            .tagged("State.RemoveOnDeath.Curse");

        engine.apply(spec(on_death), &mut attributes, &mut tags).unwrap();
        engine.apply(spec(keep), &mut attributes, &mut tags).unwrap();
        engine.apply(spec(tagged), &mut attributes, &mut tags).unwrap();
        assert_eq!(attributes.get("Armor"), Ok((100.0 + 30.0 - 5.0) * 2.0));

        let query: TagContainer = ["State.RemoveOnDeath"].into_iter().collect();
        assert_eq!(engine.remove_by_tag(&query, &mut attributes, &mut tags), 2);
        assert_eq!(attributes.get("Armor"), Ok(200.0));
        assert_eq!(engine.len(), 1);
        assert!(!tags.has_tag(&GameplayTag::new("State.RemoveOnDeath")));
    }

    #[test]
    fn test_remove_blocked() {
        let (mut attributes, mut tags) = stores();
        let mut engine = EffectEngine::new();
        let regen = EffectDef::new("Regen")
            .duration(EffectDuration::Infinite)
            .modifier("Armor", ModifierOp::Add, 1.0)
            .removed_by("State.Dead");
        engine.apply(spec(regen), &mut attributes, &mut tags).unwrap();

        assert_eq!(engine.remove_blocked(&mut attributes, &mut tags), 0);
        tags.add_tag("State.Dead", 1);
        assert_eq!(engine.remove_blocked(&mut attributes, &mut tags), 1);
        assert!(engine.is_empty());
        assert_eq!(attributes.get("Armor"), Ok(100.0));
    }

    #[test]
    fn test_level_scaling() {
        let modifier = Modifier {
            per_level: 2.5,
            ..Modifier::new(names::HEALTH, ModifierOp::Add, 10.0)
        };
        assert_eq!(modifier.magnitude_at(1), 10.0);
        assert_eq!(modifier.magnitude_at(3), 15.0);
        assert_eq!(modifier.magnitude_at(0), 10.0);
    }
}
