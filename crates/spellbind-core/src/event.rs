//! Events emitted by characters for the host (UI, audio, logs)

use crate::gate::DenyReason;
use crate::{AbilityHandle, DefId, EffectHandle, EntityId};

/// Something that happened to one character
#[derive(Debug, Clone, PartialEq)]
pub enum CharacterEvent {
    /// `initialize()` finished
    Initialized { respawn: bool },
    AbilityActivated {
        handle: AbilityHandle,
        ability: DefId,
    },
    AbilityEnded {
        handle: AbilityHandle,
        ability: DefId,
        cancelled: bool,
    },
    ActivationDenied {
        handle: AbilityHandle,
        reason: DenyReason,
    },
    EffectApplied {
        handle: EffectHandle,
        effect: DefId,
        source: Option<EntityId>,
    },
    Damaged {
        source: Option<EntityId>,
        amount: f64,
    },
    Died,
    /// The body was destroyed (after the death animation, if any)
    Destroyed,
}

/// An effect an ability aimed at another character
///
/// The world routes it to `target`; a missing target is skipped.
#[derive(Debug, Clone, PartialEq)]
pub struct OutgoingEffect {
    pub source: EntityId,
    pub target: EntityId,
    pub effect: DefId,
    pub level: u32,
}
