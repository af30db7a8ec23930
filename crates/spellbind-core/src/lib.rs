//! Spellbind Core - attribute, effect and ability runtime for game characters
//!
//! This crate provides the authoritative side of the runtime:
//! - Attributes with base/current values, clamping and paired maxima (`AttributeStore`)
//! - Reference-counted hierarchical tags (`TagSet`)
//! - Instant, timed, infinite and periodic effects (`EffectEngine`)
//! - Granted abilities with a per-ability state machine (`AbilityRegistry`)
//! - Tag, cooldown and cost gating (`ActivationGate`)
//! - Characters with a death and respawn sequence (`Character`)
//! - A multi-character tick loop with replication (`World`)
//!
//! ## Replication
//!
//! Every authoritative change is journaled with a per-field version and pushed
//! through a [`ReplicationBridge`]. Mirrors hold a [`Replica`] and apply the
//! deltas in order; stale versions are dropped.
//!
//! ## Example
//!
//! ```
//! use spellbind_core::{
//!     AbilityDef, CharacterTemplate, DefId, DefinitionSet, EffectDef, InputId, ModifierOp,
//!     NullAvatar, RuntimeConfig, StepTarget, World,
//! };
//!
//! let mut defs = DefinitionSet::new();
//! defs.insert_effect(EffectDef::new("Smite").modifier("Health", ModifierOp::Add, -30.0));
//! defs.insert_ability(
//!     AbilityDef::new("Smite")
//!         .input(InputId::new(1))
//!         .step("Smite", StepTarget::Target, 0),
//! );
//! let mut knight = CharacterTemplate::new("Knight");
//! knight.abilities.push(DefId::new("Smite"));
//! defs.insert_character(knight);
//!
//! let mut world = World::local(defs, RuntimeConfig::default()).unwrap();
//! let a = world.spawn(&DefId::new("Knight"), Box::new(NullAvatar)).unwrap();
//! let b = world.spawn(&DefId::new("Knight"), Box::new(NullAvatar)).unwrap();
//!
//! world.press_input(a, InputId::new(1), Some(b)).unwrap();
//! let health = world.character(b).unwrap().attributes().get("Health").unwrap();
//! assert_eq!(health, 70.0);
//! ```

pub mod ability;
pub mod attribute;
mod avatar;
pub mod character;
mod config;
mod defs;
pub mod effect;
mod error;
mod event;
mod gate;
mod identity;
pub mod observer;
pub mod replication;
pub mod tag;
pub mod time;
mod world;

pub use ability::{
    AbilityDef, AbilityRegistry, AbilitySpec, AbilityState, AbilityStep, Activation,
    ConcurrencyPolicy, Granted, StepTarget,
};
pub use attribute::{AttributeChange, AttributeDef, AttributeDelta, AttributeStore, Ceiling};
pub use avatar::{Avatar, NullAvatar};
pub use character::{Character, CharacterTemplate, Lifecycle};
pub use config::RuntimeConfig;
pub use defs::DefinitionSet;
pub use effect::{
    EffectDef, EffectDuration, EffectEngine, EffectSpec, Modifier, ModifierOp, StackingPolicy,
};
pub use error::{Error, Result};
pub use event::{CharacterEvent, OutgoingEffect};
pub use gate::{ActivationGate, Cost, DenyReason};
pub use identity::{AbilityHandle, DefId, EffectHandle, EntityId, InputId};
pub use observer::ListenerId;
pub use replication::{Delta, DeltaLog, EntitySnapshot, NullBridge, ReplicationBridge, Replica};
pub use tag::{GameplayTag, TagContainer, TagDelta, TagEvent, TagEventKind, TagSet};
pub use time::{Clock, Tick};
pub use world::{TickReport, World};
