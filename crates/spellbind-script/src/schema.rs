//! File layouts accepted by the loader
//!
//! A content file holds one or more lists of definitions:
//!
//! ```text
//! (
//!     effects: [ (id: "Burn", duration: Timed(90), period: Some(30),
//!                 modifiers: [ (attribute: "Health", op: Add, magnitude: -4.0) ]) ],
//!     abilities: [ (id: "Fireball", costs: [ (attribute: "Mana", amount: 20.0) ],
//!                   steps: [ (effect: "Burn", target: Target) ]) ],
//! )
//! ```
//!
//! Single-kind files (`(abilities: [...])`) and bare definitions are also
//! accepted.

use crate::error::{Error, Result};
use serde::Deserialize;
use spellbind_core::{AbilityDef, CharacterTemplate, EffectDef, EffectDuration};

/// Any mix of definition lists
#[derive(Debug, Default, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ContentFile {
    pub abilities: Vec<AbilityDef>,
    pub effects: Vec<EffectDef>,
    pub characters: Vec<CharacterTemplate>,
}

impl ContentFile {
    pub fn is_empty(&self) -> bool {
        self.abilities.is_empty() && self.effects.is_empty() && self.characters.is_empty()
    }
}

/// Shape checks that serde cannot express
pub fn check_ability(def: &AbilityDef) -> Result<()> {
    require_id("ability", def.id.as_str())?;
    for cost in &def.costs {
        if cost.amount.is_nan() || cost.amount < 0.0 {
            return Err(Error::InvalidSchema(format!(
                "ability {}: cost of {} must be non-negative, got {}",
                def.id, cost.attribute, cost.amount
            )));
        }
    }
    Ok(())
}

pub fn check_effect(def: &EffectDef) -> Result<()> {
    require_id("effect", def.id.as_str())?;
    match (def.duration, def.period) {
        (_, Some(0)) => Err(Error::InvalidSchema(format!(
            "effect {}: period must be at least one tick",
            def.id
        ))),
        (EffectDuration::Instant, Some(_)) => Err(Error::InvalidSchema(format!(
            "effect {}: an instant effect cannot be periodic",
            def.id
        ))),
        (EffectDuration::Timed(0), _) => Err(Error::InvalidSchema(format!(
            "effect {}: a timed effect needs a non-zero duration",
            def.id
        ))),
        _ => Ok(()),
    }
}

pub fn check_character(template: &CharacterTemplate) -> Result<()> {
    require_id("character", template.id.as_str())?;
    if template.level == 0 {
        return Err(Error::InvalidSchema(format!(
            "character {}: level starts at 1",
            template.id
        )));
    }
    Ok(())
}

fn require_id(kind: &str, id: &str) -> Result<()> {
    if id.trim().is_empty() {
        return Err(Error::InvalidSchema(format!("{} with an empty id", kind)));
    }
    Ok(())
}
