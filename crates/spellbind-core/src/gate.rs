//! Activation gating
//!
//! The gate decides whether an ability may start. Checks run cheapest first
//! and stop at the first failure:
//!
//! 1. blocking tags (hierarchical, e.g. `State.Dead` or anything under `State.Debuff.Stun`)
//! 2. cooldown
//! 3. resource costs

use crate::attribute::AttributeStore;
use crate::tag::{GameplayTag, TagContainer, TagSet};
use crate::time::Tick;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Resource consumed when an ability commits
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Cost {
    pub attribute: String,
    pub amount: f64,
}

impl Cost {
    pub fn new(attribute: impl Into<String>, amount: f64) -> Self {
        Self {
            attribute: attribute.into(),
            amount,
        }
    }
}

/// Why the gate refused an activation
#[derive(Debug, Clone, PartialEq)]
pub enum DenyReason {
    /// A present tag matched the blocking set
    Blocked(GameplayTag),
    /// The ability is still cooling down
    Cooldown { remaining: Tick },
    /// A cost attribute is below the required amount
    InsufficientResource {
        attribute: String,
        required: f64,
        available: f64,
    },
    /// A cost names an attribute the character does not have
    MissingResource(String),
}

impl fmt::Display for DenyReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DenyReason::Blocked(tag) => write!(f, "blocked by {}", tag),
            DenyReason::Cooldown { remaining } => write!(f, "on cooldown for {} ticks", remaining),
            DenyReason::InsufficientResource {
                attribute,
                required,
                available,
            } => write!(f, "{} {} required, {} available", attribute, required, available),
            DenyReason::MissingResource(attribute) => write!(f, "no {} attribute", attribute),
        }
    }
}

/// Decides whether abilities may activate
#[derive(Debug, Clone, Default)]
pub struct ActivationGate {
    default_blocking: TagContainer,
}

impl ActivationGate {
    /// Create a gate that adds `default_blocking` to every ability's blocking tags
    pub fn new(default_blocking: TagContainer) -> Self {
        Self { default_blocking }
    }

    /// Tags added to every check
    pub fn default_blocking(&self) -> &TagContainer {
        &self.default_blocking
    }

    /// Run every check in order, reporting the first failure
    pub fn check(
        &self,
        tags: &TagSet,
        blocking: &TagContainer,
        cooldown_remaining: Tick,
        costs: &[Cost],
        attributes: &AttributeStore,
    ) -> Result<(), DenyReason> {
        self.check_tags(tags, blocking)?;

        if cooldown_remaining > 0 {
            return Err(DenyReason::Cooldown {
                remaining: cooldown_remaining,
            });
        }

        for cost in costs {
            let available = attributes
                .get(&cost.attribute)
                .map_err(|_| DenyReason::MissingResource(cost.attribute.clone()))?;
            if available < cost.amount {
                return Err(DenyReason::InsufficientResource {
                    attribute: cost.attribute.clone(),
                    required: cost.amount,
                    available,
                });
            }
        }
        Ok(())
    }

    /// Only the blocking-tag step of [`check`](Self::check)
    pub fn check_tags(&self, tags: &TagSet, blocking: &TagContainer) -> Result<(), DenyReason> {
        match tags
            .first_match(&self.default_blocking)
            .or_else(|| tags.first_match(blocking))
        {
            Some(tag) => Err(DenyReason::Blocked(tag.clone())),
            None => Ok(()),
        }
    }

    /// Boolean form of [`check`](Self::check)
    pub fn can_activate(
        &self,
        tags: &TagSet,
        blocking: &TagContainer,
        cooldown_remaining: Tick,
        costs: &[Cost],
        attributes: &AttributeStore,
    ) -> bool {
        self.check(tags, blocking, cooldown_remaining, costs, attributes)
            .is_ok()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::attribute::{names, AttributeDef};
    use crate::config::RuntimeConfig;

    fn setup() -> (ActivationGate, TagSet, AttributeStore) {
        let gate = ActivationGate::new(RuntimeConfig::default().blocking_tags);
        let attributes = AttributeStore::with_defs(AttributeDef::character_set(100.0, 50.0)).unwrap();
        (gate, TagSet::new(), attributes)
    }

    #[test]
    fn test_allows_when_clear() {
        let (gate, tags, attributes) = setup();
        let costs = [Cost::new(names::MANA, 20.0)];
        assert!(gate.can_activate(&tags, &TagContainer::new(), 0, &costs, &attributes));
    }

    #[test]
    fn test_dead_always_denies() {
        let (gate, mut tags, attributes) = setup();
        tags.add_tag("State.Dead", 1);
        assert_eq!(
            gate.check(&tags, &TagContainer::new(), 0, &[], &attributes),
            Err(DenyReason::Blocked(GameplayTag::new("State.Dead")))
        );
    }

    #[test]
    fn test_blocking_is_hierarchical() {
        let (gate, mut tags, attributes) = setup();
        let blocking: TagContainer = ["State.Debuff"].into_iter().collect();
        tags.add_tag("State.Debuff.Silence", 1);
        assert_eq!(
            gate.check(&tags, &blocking, 0, &[], &attributes),
            Err(DenyReason::Blocked(GameplayTag::new("State.Debuff.Silence")))
        );
    }

    #[test]
    fn test_check_order() {
        let (gate, mut tags, mut attributes) = setup();
        attributes.set(names::MANA, 5.0).unwrap();
        let costs = [Cost::new(names::MANA, 20.0)];

        tags.add_tag("State.Debuff.Stun", 1);
        assert!(matches!(
            gate.check(&tags, &TagContainer::new(), 10, &costs, &attributes),
            Err(DenyReason::Blocked(_))
        ));

        tags.remove_tag(&GameplayTag::new("State.Debuff.Stun"), 1);
        assert_eq!(
            gate.check(&tags, &TagContainer::new(), 10, &costs, &attributes),
            Err(DenyReason::Cooldown { remaining: 10 })
        );

        assert_eq!(
            gate.check(&tags, &TagContainer::new(), 0, &costs, &attributes),
            Err(DenyReason::InsufficientResource {
                attribute: names::MANA.to_string(),
                required: 20.0,
                available: 5.0,
            })
        );
    }

    #[test]
    fn test_missing_resource() {
        let (gate, tags, attributes) = setup();
        let costs = [Cost::new("Energy", 1.0)];
        assert_eq!(
            gate.check(&tags, &TagContainer::new(), 0, &costs, &attributes),
            Err(DenyReason::MissingResource("Energy".to_string()))
        );
    }
}
