//! Immutable definition tables shared by every character of a world

use crate::ability::AbilityDef;
use crate::character::CharacterTemplate;
use crate::effect::EffectDef;
use crate::{DefId, Error, Result};
use indexmap::IndexMap;
use std::sync::Arc;

/// Ability, effect and character definitions keyed by id
#[derive(Debug, Clone, Default)]
pub struct DefinitionSet {
    abilities: IndexMap<DefId, Arc<AbilityDef>>,
    effects: IndexMap<DefId, Arc<EffectDef>>,
    characters: IndexMap<DefId, Arc<CharacterTemplate>>,
}

impl DefinitionSet {
    /// Create an empty set
    pub fn new() -> Self {
        Self::default()
    }

    /// Add an ability, returning the definition it replaced
    pub fn insert_ability(&mut self, def: AbilityDef) -> Option<Arc<AbilityDef>> {
        self.abilities.insert(def.id.clone(), Arc::new(def))
    }

    /// Add an effect, returning the definition it replaced
    pub fn insert_effect(&mut self, def: EffectDef) -> Option<Arc<EffectDef>> {
        self.effects.insert(def.id.clone(), Arc::new(def))
    }

    /// Add a character template, returning the template it replaced
    pub fn insert_character(&mut self, template: CharacterTemplate) -> Option<Arc<CharacterTemplate>> {
        self.characters.insert(template.id.clone(), Arc::new(template))
    }

    pub fn ability(&self, id: &DefId) -> Result<Arc<AbilityDef>> {
        self.abilities
            .get(id)
            .cloned()
            .ok_or_else(|| Error::DefinitionNotFound(format!("ability {}", id)))
    }

    pub fn effect(&self, id: &DefId) -> Result<Arc<EffectDef>> {
        self.effects
            .get(id)
            .cloned()
            .ok_or_else(|| Error::DefinitionNotFound(format!("effect {}", id)))
    }

    pub fn character(&self, id: &DefId) -> Result<Arc<CharacterTemplate>> {
        self.characters
            .get(id)
            .cloned()
            .ok_or_else(|| Error::DefinitionNotFound(format!("character {}", id)))
    }

    pub fn has_ability(&self, id: &DefId) -> bool {
        self.abilities.contains_key(id)
    }

    pub fn has_effect(&self, id: &DefId) -> bool {
        self.effects.contains_key(id)
    }

    pub fn has_character(&self, id: &DefId) -> bool {
        self.characters.contains_key(id)
    }

    pub fn abilities(&self) -> impl Iterator<Item = &Arc<AbilityDef>> {
        self.abilities.values()
    }

    pub fn effects(&self) -> impl Iterator<Item = &Arc<EffectDef>> {
        self.effects.values()
    }

    pub fn characters(&self) -> impl Iterator<Item = &Arc<CharacterTemplate>> {
        self.characters.values()
    }

    /// Every id referenced by a definition, paired with what it must name
    ///
    /// Yields `(referrer, kind, id)` where kind is `"ability"` or `"effect"`.
    pub fn references(&self) -> Vec<(DefId, &'static str, DefId)> {
        let mut refs = Vec::new();
        for ability in self.abilities.values() {
            for step in &ability.steps {
                refs.push((ability.id.clone(), "effect", step.effect.clone()));
            }
        }
        for template in self.characters.values() {
            for id in &template.abilities {
                refs.push((template.id.clone(), "ability", id.clone()));
            }
            for id in template.default_attributes.iter().chain(&template.startup_effects) {
                refs.push((template.id.clone(), "effect", id.clone()));
            }
        }
        refs
    }

    /// The first reference that names no loaded definition
    pub fn unresolved(&self) -> Option<(DefId, &'static str, DefId)> {
        self.references().into_iter().find(|(_, kind, id)| match *kind {
            "ability" => !self.has_ability(id),
            _ => !self.has_effect(id),
        })
    }

    /// Check that every reference resolves
    pub fn validate(&self) -> Result<()> {
        match self.unresolved() {
            Some((referrer, kind, id)) => Err(Error::DefinitionNotFound(format!(
                "{} {} referenced by {}",
                kind, id, referrer
            ))),
            None => Ok(()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ability::StepTarget;

    #[test]
    fn test_lookup_and_validate() {
        let mut defs = DefinitionSet::new();
        defs.insert_ability(AbilityDef::new("Fireball").step("Burn", StepTarget::Target, 0));
        assert!(defs.ability(&DefId::new("Fireball")).is_ok());
        assert!(defs.effect(&DefId::new("Burn")).unwrap_err().is_not_found());

        assert_eq!(
            defs.validate(),
            Err(Error::DefinitionNotFound(
                "effect Burn referenced by Fireball".to_string()
            ))
        );
        defs.insert_effect(EffectDef::new("Burn"));
        assert_eq!(defs.validate(), Ok(()));
    }

    #[test]
    fn test_template_references() {
        let mut defs = DefinitionSet::new();
        let mut template = CharacterTemplate::new("Hero");
        template.abilities.push(DefId::new("Dash"));
        defs.insert_character(template);
        assert!(defs.validate().is_err());
        assert_eq!(
            defs.unresolved(),
            Some((DefId::new("Hero"), "ability", DefId::new("Dash")))
        );
        defs.insert_ability(AbilityDef::new("Dash"));
        assert!(defs.validate().is_ok());
        assert_eq!(defs.unresolved(), None);
        assert!(defs.insert_ability(AbilityDef::new("Dash")).is_some());
    }
}
