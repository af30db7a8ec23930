//! Spellbind Netcode - delta streaming between an authority and its mirrors
//!
//! The authority world pushes every attribute and tag change into a
//! [`DeltaOutbox`], which numbers the changes per entity and sends them over
//! any [`Connection`]. A [`Mirror`] applies them in order to read-only
//! [`Replica`](spellbind_core::Replica)s and asks for a fresh snapshot
//! whenever it sees a gap.
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────────────────┐                 ┌──────────────────────────┐
//! │        Authority         │                 │          Mirror          │
//! │  ┌───────┐  ┌─────────┐  │  StreamPacket   │  ┌────────┐  ┌────────┐  │
//! │  │ World │─▶│ Outbox  │──┼────────────────▶┼─▶│ Mirror │─▶│Replica │  │
//! │  └───────┘  └─────────┘  │                 │  └────────┘  └────────┘  │
//! │       ▲                  │  ResyncRequest  │       │                  │
//! │       └──────────────────┼◀────────────────┼───────┘                  │
//! └──────────────────────────┘                 └──────────────────────────┘
//! ```
//!
//! # Example
//!
//! ```rust
//! use spellbind_core::{CharacterTemplate, DefId, DefinitionSet, NullAvatar, RuntimeConfig, World};
//! use spellbind_netcode::{DeltaOutbox, MemoryConnection, Mirror};
//!
//! let mut defs = DefinitionSet::new();
//! defs.insert_character(CharacterTemplate::new("Goblin"));
//! let mut world = World::new(defs, RuntimeConfig::default(), DeltaOutbox::new()).unwrap();
//! let (server, client) = MemoryConnection::pair("server", "client");
//!
//! let goblin = world.spawn(&DefId::new("Goblin"), Box::new(NullAvatar)).unwrap();
//! world.damage(None, goblin, 30.0).unwrap();
//! world.bridge_mut().flush(&server).unwrap();
//!
//! let mut mirror = Mirror::new();
//! mirror.poll(&client).unwrap();
//! assert_eq!(mirror.replica(goblin).unwrap().attributes().get("Health").unwrap(), 70.0);
//! ```

mod error;
mod mirror;
mod outbox;
mod packet;
mod transport;

pub use error::{Error, Result};
pub use mirror::{Applied, Mirror, PollReport, SyncState};
pub use outbox::{serve_requests, DeltaOutbox};
pub use packet::{Packet, StreamBody, StreamPacket};
pub use transport::{Address, Connection, MemoryConnection, MemoryError};
