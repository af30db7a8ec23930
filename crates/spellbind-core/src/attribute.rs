//! Attribute storage for one character
//!
//! Every attribute has a *base* value (changed by instant effects and direct
//! sets) and a *current* value: the base run through the ongoing modifiers of
//! active effects. Both are clamped to `[min, max]` after every mutation, where
//! `max` is either fixed or paired with another attribute (Health is capped by
//! MaxHealth).
//!
//! Modifiers aggregate in a fixed order per attribute:
//!
//! ```text
//! value = override (last writer wins) or base
//! value = value + sum(additive)
//! value = value * product(multiplicative)
//! ```
//!
//! Every authoritative change is journaled with a per-attribute version so it
//! can be replicated; mirrors apply those deltas verbatim through
//! [`AttributeStore::apply_replicated`].

use crate::effect::ModifierOp;
use crate::observer::{ListenerId, Observers};
use crate::{EffectHandle, Error, Result};
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

/// Well-known attribute names used by character templates
pub mod names {
    pub const HEALTH: &str = "Health";
    pub const MAX_HEALTH: &str = "MaxHealth";
    pub const MANA: &str = "Mana";
    pub const MAX_MANA: &str = "MaxMana";
    pub const LEVEL: &str = "Level";
}

/// Upper bound of an attribute
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
pub enum Ceiling {
    /// No upper bound
    #[default]
    Unbounded,
    /// A fixed upper bound
    Fixed(f64),
    /// Bounded by the current value of another attribute
    Attribute(String),
}

/// Static definition of one attribute
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AttributeDef {
    pub name: String,
    /// Base value when the attribute is created
    #[serde(default)]
    pub initial: f64,
    /// Lower bound
    #[serde(default)]
    pub min: f64,
    /// Upper bound
    #[serde(default)]
    pub max: Ceiling,
}

impl AttributeDef {
    /// Create an unbounded attribute with a floor of zero
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            initial: 0.0,
            min: 0.0,
            max: Ceiling::Unbounded,
        }
    }

    /// Set the initial base value
    pub fn initial(mut self, value: f64) -> Self {
        self.initial = value;
        self
    }

    /// Set the lower bound
    pub fn min(mut self, value: f64) -> Self {
        self.min = value;
        self
    }

    /// Cap the attribute at a fixed value
    pub fn max_fixed(mut self, value: f64) -> Self {
        self.max = Ceiling::Fixed(value);
        self
    }

    /// Cap the attribute by another attribute's current value
    pub fn max_attribute(mut self, name: impl Into<String>) -> Self {
        self.max = Ceiling::Attribute(name.into());
        self
    }

    /// The standard character set: Level, MaxHealth, Health, MaxMana, Mana
    pub fn character_set(max_health: f64, max_mana: f64) -> Vec<AttributeDef> {
        vec![
            AttributeDef::new(names::LEVEL).initial(1.0).min(1.0),
            AttributeDef::new(names::MAX_HEALTH).initial(max_health),
            AttributeDef::new(names::HEALTH)
                .initial(max_health)
                .max_attribute(names::MAX_HEALTH),
            AttributeDef::new(names::MAX_MANA).initial(max_mana),
            AttributeDef::new(names::MANA)
                .initial(max_mana)
                .max_attribute(names::MAX_MANA),
        ]
    }
}

/// Accumulates modifiers for one attribute in the documented order
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Aggregate {
    override_value: Option<f64>,
    additive: f64,
    multiplier: f64,
}

impl Aggregate {
    /// An aggregate with no modifiers (evaluates to the base value)
    pub fn new() -> Self {
        Self {
            override_value: None,
            additive: 0.0,
            multiplier: 1.0,
        }
    }

    /// Fold one modifier into the aggregate
    pub fn push(&mut self, op: ModifierOp, magnitude: f64) {
        match op {
            ModifierOp::Override => self.override_value = Some(magnitude),
            ModifierOp::Add => self.additive += magnitude,
            ModifierOp::Multiply => self.multiplier *= magnitude,
        }
    }

    /// Evaluate against a base value
    pub fn evaluate(&self, base: f64) -> f64 {
        (self.override_value.unwrap_or(base) + self.additive) * self.multiplier
    }
}

impl Default for Aggregate {
    fn default() -> Self {
        Self::new()
    }
}

/// Journal entry and listener payload for one attribute change
#[derive(Debug, Clone, PartialEq)]
pub struct AttributeChange {
    pub attribute: String,
    /// Current value before the change
    pub old_value: f64,
    /// Current value after the change
    pub new_value: f64,
    /// Base value after the change
    pub base: f64,
    pub version: u64,
}

impl AttributeChange {
    /// The replication delta for this change
    pub fn delta(&self) -> AttributeDelta {
        AttributeDelta {
            attribute: self.attribute.clone(),
            base: self.base,
            current: self.new_value,
            version: self.version,
        }
    }
}

/// Replicated state of one attribute
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AttributeDelta {
    pub attribute: String,
    pub base: f64,
    pub current: f64,
    /// Per-attribute monotonic version assigned by the authority
    pub version: u64,
}

/// Full state of one attribute, for resynchronization
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AttributeSnapshot {
    pub def: AttributeDef,
    pub base: f64,
    pub current: f64,
    /// Fixed ceiling in effect (after `set_max` on an unpaired attribute)
    pub ceiling: Option<f64>,
    pub version: u64,
}

#[derive(Debug, Clone)]
struct Slot {
    def: AttributeDef,
    base: f64,
    current: f64,
    ceiling: Option<f64>,
    version: u64,
    modifiers: Vec<(EffectHandle, ModifierOp, f64)>,
}

impl Slot {
    fn new(def: AttributeDef) -> Self {
        let ceiling = match def.max {
            Ceiling::Fixed(v) => Some(v),
            _ => None,
        };
        Self {
            base: def.initial,
            current: def.initial,
            def,
            ceiling,
            version: 0,
            modifiers: Vec::new(),
        }
    }

    fn aggregate(&self) -> Aggregate {
        let mut aggregate = Aggregate::new();
        for (_, op, magnitude) in &self.modifiers {
            aggregate.push(*op, *magnitude);
        }
        aggregate
    }
}

/// Named numeric attributes of one character
#[derive(Debug, Default)]
pub struct AttributeStore {
    slots: IndexMap<String, Slot>,
    journal: Vec<AttributeChange>,
    observers: Observers<AttributeChange>,
}

impl AttributeStore {
    /// Create an empty store
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a store from a list of definitions
    ///
    /// Fails if a name is defined twice or a paired ceiling names an
    /// attribute that is not in the list.
    pub fn with_defs(defs: impl IntoIterator<Item = AttributeDef>) -> Result<Self> {
        let mut store = Self::new();
        for def in defs {
            store.define(def)?;
        }
        store.validate()?;
        for name in store.names().map(str::to_string).collect::<Vec<_>>() {
            store.settle_initial(&name);
        }
        Ok(store)
    }

    /// Define a new attribute
    pub fn define(&mut self, def: AttributeDef) -> Result<()> {
        if self.slots.contains_key(&def.name) {
            return Err(Error::InvalidOperation(format!(
                "attribute {} defined twice",
                def.name
            )));
        }
        let name = def.name.clone();
        self.slots.insert(name.clone(), Slot::new(def));
        self.settle_initial(&name);
        Ok(())
    }

    /// Check that every paired ceiling refers to a defined attribute
    pub fn validate(&self) -> Result<()> {
        for slot in self.slots.values() {
            if let Ceiling::Attribute(other) = &slot.def.max {
                if !self.slots.contains_key(other) {
                    return Err(Error::AttributeNotFound(other.clone()));
                }
            }
        }
        Ok(())
    }

    /// Check if an attribute is defined
    pub fn contains(&self, name: &str) -> bool {
        self.slots.contains_key(name)
    }

    /// Names of all attributes in definition order
    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.slots.keys().map(String::as_str)
    }

    /// Number of attributes
    pub fn len(&self) -> usize {
        self.slots.len()
    }

    /// Check if no attribute is defined
    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }

    /// Current value
    pub fn get(&self, name: &str) -> Result<f64> {
        self.slot(name).map(|s| s.current)
    }

    /// Base value (before ongoing modifiers)
    pub fn base(&self, name: &str) -> Result<f64> {
        self.slot(name).map(|s| s.base)
    }

    /// Replication version of an attribute
    pub fn version(&self, name: &str) -> Result<u64> {
        self.slot(name).map(|s| s.version)
    }

    /// Current `[min, max]` bounds
    pub fn bounds(&self, name: &str) -> Result<(f64, f64)> {
        let slot = self.slot(name)?;
        Ok((slot.def.min, self.ceiling_of(slot)))
    }

    /// Set the base value, clamped to the attribute's bounds
    ///
    /// Listeners fire if the current value changes.
    pub fn set(&mut self, name: &str, value: f64) -> Result<()> {
        if value.is_nan() {
            return Err(Error::InvalidOperation(format!("NaN written to {}", name)));
        }
        self.slot_mut(name)?.base = value;
        self.recompute(name);
        Ok(())
    }

    /// Adjust an attribute's ceiling and re-clamp it
    ///
    /// For a paired attribute (Health capped by MaxHealth) this writes the
    /// paired attribute; otherwise the fixed ceiling itself changes.
    pub fn set_max(&mut self, name: &str, value: f64) -> Result<()> {
        let slot = self.slot_mut(name)?;
        match slot.def.max.clone() {
            Ceiling::Attribute(paired) => self.set(&paired, value),
            _ => {
                if value.is_nan() {
                    return Err(Error::InvalidOperation(format!("NaN ceiling for {}", name)));
                }
                slot.ceiling = Some(value);
                self.recompute(name);
                Ok(())
            }
        }
    }

    /// Register a change listener
    pub fn subscribe(&mut self, listener: impl FnMut(&AttributeChange) + 'static) -> ListenerId {
        self.observers.subscribe(listener)
    }

    /// Unregister a change listener
    pub fn unsubscribe(&mut self, id: ListenerId) -> bool {
        self.observers.unsubscribe(id)
    }

    /// Take the journal of changes recorded since the last call
    pub fn take_journal(&mut self) -> Vec<AttributeChange> {
        std::mem::take(&mut self.journal)
    }

    /// Execute modifiers once against base values
    ///
    /// Modifiers are grouped per attribute and aggregated in the documented
    /// order. Every target is checked before anything is written.
    pub fn execute(&mut self, modifiers: &[(String, ModifierOp, f64)]) -> Result<()> {
        let mut grouped: IndexMap<&str, Aggregate> = IndexMap::new();
        for (name, op, magnitude) in modifiers {
            self.slot(name)?;
            grouped.entry(name.as_str()).or_default().push(*op, *magnitude);
        }
        for (name, aggregate) in grouped {
            let base = self.base(name)?;
            self.set(name, aggregate.evaluate(base))?;
        }
        Ok(())
    }

    /// Attach ongoing modifiers owned by an effect instance
    ///
    /// Every target is checked before anything is attached.
    pub fn add_modifiers(
        &mut self,
        source: EffectHandle,
        modifiers: &[(String, ModifierOp, f64)],
    ) -> Result<()> {
        for (name, _, _) in modifiers {
            self.slot(name)?;
        }
        let mut touched: Vec<&str> = Vec::new();
        for (name, op, magnitude) in modifiers {
            if let Some(slot) = self.slots.get_mut(name) {
                slot.modifiers.push((source, *op, *magnitude));
            }
            if !touched.contains(&name.as_str()) {
                touched.push(name);
            }
        }
        for name in touched {
            self.recompute(name);
        }
        Ok(())
    }

    /// Detach every modifier owned by an effect instance
    ///
    /// Returns the number of modifiers removed.
    pub fn remove_modifiers(&mut self, source: EffectHandle) -> usize {
        let mut removed = 0;
        let mut touched = Vec::new();
        for (name, slot) in self.slots.iter_mut() {
            let before = slot.modifiers.len();
            slot.modifiers.retain(|(owner, _, _)| *owner != source);
            if slot.modifiers.len() != before {
                removed += before - slot.modifiers.len();
                touched.push(name.clone());
            }
        }
        for name in touched {
            self.recompute(&name);
        }
        removed
    }

    /// Number of ongoing modifiers attached to an attribute
    pub fn modifier_count(&self, name: &str) -> Result<usize> {
        self.slot(name).map(|s| s.modifiers.len())
    }

    /// Apply a delta received from the authority
    ///
    /// Values are taken verbatim (the authority already clamped them).
    /// Returns `Ok(false)` for a stale delta.
    pub fn apply_replicated(&mut self, delta: &AttributeDelta) -> Result<bool> {
        let slot = self.slot_mut(&delta.attribute)?;
        if delta.version <= slot.version {
            return Ok(false);
        }
        let old_value = slot.current;
        slot.base = delta.base;
        slot.current = delta.current;
        slot.version = delta.version;
        if old_value != delta.current {
            self.observers.notify(&AttributeChange {
                attribute: delta.attribute.clone(),
                old_value,
                new_value: delta.current,
                base: delta.base,
                version: delta.version,
            });
        }
        Ok(true)
    }

    /// Full state of every attribute
    pub fn snapshot(&self) -> Vec<AttributeSnapshot> {
        self.slots
            .values()
            .map(|slot| AttributeSnapshot {
                def: slot.def.clone(),
                base: slot.base,
                current: slot.current,
                ceiling: slot.ceiling,
                version: slot.version,
            })
            .collect()
    }

    /// Rebuild a store from a snapshot
    pub fn from_snapshot(entries: &[AttributeSnapshot]) -> Self {
        let mut store = Self::new();
        store.restore(entries);
        store
    }

    /// Replace every attribute with a snapshot, keeping listeners
    pub fn restore(&mut self, entries: &[AttributeSnapshot]) {
        let previous = std::mem::take(&mut self.slots);
        for entry in entries {
            let mut slot = Slot::new(entry.def.clone());
            slot.base = entry.base;
            slot.current = entry.current;
            slot.ceiling = entry.ceiling;
            slot.version = entry.version;
            self.slots.insert(entry.def.name.clone(), slot);
        }
        for entry in entries {
            let old_value = previous.get(&entry.def.name).map(|s| s.current);
            if old_value != Some(entry.current) {
                self.observers.notify(&AttributeChange {
                    attribute: entry.def.name.clone(),
                    old_value: old_value.unwrap_or(entry.current),
                    new_value: entry.current,
                    base: entry.base,
                    version: entry.version,
                });
            }
        }
    }

    fn slot(&self, name: &str) -> Result<&Slot> {
        self.slots
            .get(name)
            .ok_or_else(|| Error::AttributeNotFound(name.to_string()))
    }

    fn slot_mut(&mut self, name: &str) -> Result<&mut Slot> {
        self.slots
            .get_mut(name)
            .ok_or_else(|| Error::AttributeNotFound(name.to_string()))
    }

    fn ceiling_of(&self, slot: &Slot) -> f64 {
        let ceiling = match &slot.def.max {
            Ceiling::Attribute(other) => self
                .slots
                .get(other)
                .map(|s| s.current)
                .unwrap_or(f64::INFINITY),
            _ => slot.ceiling.unwrap_or(f64::INFINITY),
        };
        ceiling.max(slot.def.min)
    }

    /// Clamp without journaling (definition time)
    fn settle_initial(&mut self, name: &str) {
        let Some(slot) = self.slots.get(name) else {
            return;
        };
        let hi = self.ceiling_of(slot);
        let lo = slot.def.min;
        if let Some(slot) = self.slots.get_mut(name) {
            slot.base = slot.base.clamp(lo, hi);
            slot.current = slot.aggregate().evaluate(slot.base).clamp(lo, hi);
        }
    }

    fn recompute(&mut self, name: &str) {
        self.recompute_depth(name, 0);
    }

    fn recompute_depth(&mut self, name: &str, depth: usize) {
        let Some(slot) = self.slots.get(name) else {
            return;
        };
        let lo = slot.def.min;
        let hi = self.ceiling_of(slot);
        let old_base = slot.base;
        let old_value = slot.current;
        let base = slot.base.clamp(lo, hi);
        let current = slot.aggregate().evaluate(base).clamp(lo, hi);

        if base == old_base && current == old_value {
            return;
        }
        let Some(slot) = self.slots.get_mut(name) else {
            return;
        };
        slot.base = base;
        slot.current = current;
        slot.version += 1;
        let change = AttributeChange {
            attribute: name.to_string(),
            old_value,
            new_value: current,
            base,
            version: slot.version,
        };
        if old_value != current {
            self.observers.notify(&change);
        }
        self.journal.push(change);

        if old_value != current && depth < self.slots.len() {
            let dependents: Vec<String> = self
                .slots
                .values()
                .filter(|s| matches!(&s.def.max, Ceiling::Attribute(other) if other == name))
                .map(|s| s.def.name.clone())
                .collect();
            for dependent in dependents {
                self.recompute_depth(&dependent, depth + 1);
            }
        }
    }
}
