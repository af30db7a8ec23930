//! Error types for spellbind-script

use thiserror::Error;

/// Script loading error type
#[derive(Error, Debug)]
pub enum Error {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("RON parse error: {0}")]
    Ron(#[from] ron::error::SpannedError),

    #[error("Invalid schema: {0}")]
    InvalidSchema(String),

    #[error("Duplicate definition: {0}")]
    DuplicateDefinition(String),

    /// A definition names an ability or effect that was never loaded
    #[error("Missing reference: {kind} {id} referenced by {referrer}")]
    MissingReference {
        referrer: String,
        kind: &'static str,
        id: String,
    },
}

/// Result type alias
pub type Result<T> = std::result::Result<T, Error>;
