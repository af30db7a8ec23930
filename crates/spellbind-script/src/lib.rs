//! Spellbind Script - RON content loader
//!
//! Loads game content from RON files into a validated
//! [`DefinitionSet`](spellbind_core::DefinitionSet):
//! - Effect definitions (modifiers, duration, period, tags)
//! - Ability definitions (costs, cooldown, steps, input binding)
//! - Character templates (attributes, loadout, startup effects)
//! - The [`RuntimeConfig`](spellbind_core::RuntimeConfig)
//!
//! ```rust
//! use spellbind_script::Loader;
//!
//! let mut loader = Loader::new();
//! loader.load_str(r#"(
//!     effects: [ (id: "Smite", modifiers: [ (attribute: "Health", op: Add, magnitude: -30.0) ]) ],
//!     characters: [ (id: "Knight") ],
//! )"#).unwrap();
//! let content = loader.finish().unwrap();
//! assert!(content.defs.has_character(&"Knight".into()));
//! ```

mod error;
mod loader;
mod schema;

pub use error::{Error, Result};
pub use loader::{Content, Loader, CONFIG_FILE_STEM};
pub use schema::ContentFile;
