//! Error types for spellbind-core

use crate::gate::DenyReason;
use crate::{AbilityHandle, DefId, EffectHandle, EntityId};
use thiserror::Error;

/// Core error type
#[derive(Error, Debug, Clone, PartialEq)]
pub enum Error {
    #[error("Attribute not found: {0}")]
    AttributeNotFound(String),

    #[error("Ability not found: {0}")]
    AbilityNotFound(AbilityHandle),

    #[error("Effect not found: {0}")]
    EffectNotFound(EffectHandle),

    #[error("Entity not found: {0}")]
    EntityNotFound(EntityId),

    #[error("Definition not found: {0}")]
    DefinitionNotFound(String),

    #[error("Invalid target for effect {effect}: {reason}")]
    InvalidTarget { effect: DefId, reason: String },

    #[error("Activation denied: {0}")]
    Denied(DenyReason),

    #[error("Already granted: {0}")]
    AlreadyGranted(String),

    #[error("Ability already active: {0}")]
    AlreadyActive(AbilityHandle),

    #[error("Invalid operation: {0}")]
    InvalidOperation(String),
}

impl Error {
    /// Check if this is one of the "unknown name or handle" errors
    pub fn is_not_found(&self) -> bool {
        matches!(
            self,
            Error::AttributeNotFound(_)
                | Error::AbilityNotFound(_)
                | Error::EffectNotFound(_)
                | Error::EntityNotFound(_)
                | Error::DefinitionNotFound(_)
        )
    }

    /// Get the denial reason if this is an activation denial
    pub fn deny_reason(&self) -> Option<&DenyReason> {
        match self {
            Error::Denied(reason) => Some(reason),
            _ => None,
        }
    }
}

/// Result type alias
pub type Result<T> = std::result::Result<T, Error>;
