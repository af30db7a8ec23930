//! Error types for spellbind-netcode

use spellbind_core::EntityId;
use thiserror::Error;

/// Netcode error type
#[derive(Debug, Error)]
pub enum Error {
    /// A sequence gap: the mirror can no longer repair this entity incrementally
    #[error("Desync on {entity}: expected packet {expected}, got {got}")]
    Desync { entity: EntityId, expected: u64, got: u64 },

    /// A delta arrived for an entity the mirror has no snapshot of
    #[error("Unknown entity: {0}")]
    UnknownEntity(EntityId),

    /// Packet encoding or decoding failed
    #[error("Serialization error: {0}")]
    Serialization(String),

    /// Transport error
    #[error("Transport error: {0}")]
    Transport(String),

    /// A delta could not be applied to the replica
    #[error(transparent)]
    Core(#[from] spellbind_core::Error),
}

impl Error {
    /// Check if this error leaves the entity waiting for a snapshot
    pub fn needs_resync(&self) -> bool {
        matches!(self, Error::Desync { .. } | Error::UnknownEntity(_))
    }
}

impl From<bincode::Error> for Error {
    fn from(e: bincode::Error) -> Self {
        Error::Serialization(e.to_string())
    }
}

/// Result type for netcode operations
pub type Result<T> = std::result::Result<T, Error>;
