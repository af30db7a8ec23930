//! Runtime configuration - well-known tags and settling limits
//!
//! Every field has a default, so a RON file only needs to name what it
//! changes. Numeric limits are clamped on read as well as on write, since
//! deserialized values bypass the setters.

use crate::attribute::names;
use crate::tag::{GameplayTag, TagContainer};
use serde::{Deserialize, Serialize};

/// Upper bound for [`RuntimeConfig::max_settle_passes`]
pub const MAX_SETTLE_PASSES: usize = 64;

/// Upper bound for [`RuntimeConfig::max_queued_activations`]
pub const MAX_QUEUED_ACTIVATIONS: usize = 16;

/// Configuration shared by every character of a world
///
/// # Example
///
/// ```
/// use spellbind_core::RuntimeConfig;
///
/// let mut config = RuntimeConfig::default();
/// assert_eq!(config.dead_tag.as_str(), "State.Dead");
///
/// config.set_max_settle_passes(0);
/// assert_eq!(config.max_settle_passes(), 1);
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RuntimeConfig {
    /// Added when a character dies, cleared on (re)initialization
    pub dead_tag: GameplayTag,
    /// Presence of this tag cancels running abilities
    pub stun_tag: GameplayTag,
    /// Effects granting (or tagged with) this are removed on death
    pub remove_on_death_tag: GameplayTag,
    /// Added to every ability's blocking tags
    pub blocking_tags: TagContainer,
    /// Abilities tagged with any of these are cancelled by stun
    pub stun_cancel_tags: TagContainer,
    /// ...unless they are also tagged with one of these
    pub stun_ignore_tags: TagContainer,
    pub health_attribute: String,
    pub mana_attribute: String,
    max_settle_passes: usize,
    max_queued_activations: usize,
}

impl RuntimeConfig {
    /// Number of journal-drain passes a character runs after one mutation
    ///
    /// Clamped to `[1, MAX_SETTLE_PASSES]`.
    pub fn max_settle_passes(&self) -> usize {
        self.max_settle_passes.clamp(1, MAX_SETTLE_PASSES)
    }

    /// Set the settle pass limit (clamped)
    pub fn set_max_settle_passes(&mut self, n: usize) {
        self.max_settle_passes = n.clamp(1, MAX_SETTLE_PASSES);
    }

    /// Activations a `Queue` ability may hold while in flight
    ///
    /// Clamped to `[1, MAX_QUEUED_ACTIVATIONS]`.
    pub fn max_queued_activations(&self) -> usize {
        self.max_queued_activations.clamp(1, MAX_QUEUED_ACTIVATIONS)
    }

    /// Set the activation queue limit (clamped)
    pub fn set_max_queued_activations(&mut self, n: usize) {
        self.max_queued_activations = n.clamp(1, MAX_QUEUED_ACTIVATIONS);
    }
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        Self {
            dead_tag: GameplayTag::new("State.Dead"),
            stun_tag: GameplayTag::new("State.Debuff.Stun"),
            remove_on_death_tag: GameplayTag::new("State.RemoveOnDeath"),
            blocking_tags: ["State.Dead", "State.Debuff.Stun"].into_iter().collect(),
            stun_cancel_tags: ["Ability"].into_iter().collect(),
            stun_ignore_tags: ["Ability.NotCanceledByStun"].into_iter().collect(),
            health_attribute: names::HEALTH.to_string(),
            mana_attribute: names::MANA.to_string(),
            max_settle_passes: 8,
            max_queued_activations: 1,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = RuntimeConfig::default();
        assert!(config.blocking_tags.contains(&GameplayTag::new("State.Dead")));
        assert!(config.blocking_tags.contains(&config.stun_tag));
        assert_eq!(config.health_attribute, "Health");
        assert_eq!(config.max_settle_passes(), 8);
        assert_eq!(config.max_queued_activations(), 1);
    }

    #[test]
    fn test_limits_are_clamped() {
        let mut config = RuntimeConfig::default();
        config.set_max_settle_passes(1000);
        assert_eq!(config.max_settle_passes(), MAX_SETTLE_PASSES);
        config.set_max_queued_activations(0);
        assert_eq!(config.max_queued_activations(), 1);
    }

    #[test]
    fn test_partial_ron() {
        let config: RuntimeConfig =
            ron::from_str(r#"(dead_tag: "Status.Dead", max_queued_activations: 99)"#).unwrap();
        assert_eq!(config.dead_tag.as_str(), "Status.Dead");
        assert_eq!(config.stun_tag.as_str(), "State.Debuff.Stun");
        assert_eq!(config.max_queued_activations(), MAX_QUEUED_ACTIVATIONS);
    }
}
