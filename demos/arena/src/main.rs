//! Arena Example
//!
//! A knight and a mage fight on an authority world. Every change streams over
//! an in-process connection to a mirror, which renders the health bars. One
//! packet is dropped on purpose to show the mirror resynchronizing, and the
//! mage respawns after its death animation.
//!
//! Content is loaded from `data/` (or the directory given as the first
//! argument). Set `RUST_LOG=debug` to see denials and resync traffic.

use spellbind_core::{Avatar, CharacterEvent, DefId, EntityId, InputId, World};
use spellbind_netcode::{serve_requests, DeltaOutbox, MemoryConnection, Mirror};
use spellbind_script::Loader;
use std::cell::Cell;
use std::path::PathBuf;
use tracing_subscriber::filter::EnvFilter;

const ATTACK: InputId = InputId(1);
const BASH: InputId = InputId(2);

/// Ticks the mage stays down before respawning
const RESPAWN_DELAY: u64 = 60;
/// Tick at which the link loses one packet
const LOSSY_TICK: u64 = 100;
const MAX_TICKS: u64 = 900;

/// Console stand-in for a rendered character
struct ArenaAvatar {
    name: &'static str,
    animation_frames: Cell<u32>,
}

impl ArenaAvatar {
    fn boxed(name: &'static str) -> Box<dyn Avatar> {
        Box::new(Self {
            name,
            animation_frames: Cell::new(0),
        })
    }
}

impl Avatar for ArenaAvatar {
    fn disable_movement_and_collision(&mut self) {
        tracing::info!(avatar = self.name, "movement and collision disabled");
    }

    fn play_death_animation(&mut self, animation: &str) -> bool {
        tracing::info!(avatar = self.name, animation, "playing death animation");
        self.animation_frames.set(45);
        true
    }

    fn death_animation_finished(&self) -> bool {
        let left = self.animation_frames.get().saturating_sub(1);
        self.animation_frames.set(left);
        left == 0
    }

    fn destroy(&mut self) {
        tracing::info!(avatar = self.name, "avatar destroyed");
    }
}

/// Initialize logging to stderr, INFO unless `RUST_LOG` says otherwise
fn init_logging() {
    let filter = EnvFilter::builder()
        .with_default_directive(tracing::Level::INFO.into())
        .from_env_lossy();

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .init();
}

fn health_bar(mirror: &Mirror, id: EntityId) -> String {
    let Some(replica) = mirror.replica(id) else {
        return "(no replica)".to_string();
    };
    let attrs = replica.attributes();
    let health = attrs.get("Health").unwrap_or(0.0);
    let max = attrs.get("MaxHealth").unwrap_or(health);
    let mana = attrs.get("Mana").unwrap_or(0.0);
    let filled = if max > 0.0 {
        ((health / max) * 20.0).round() as usize
    } else {
        0
    };
    format!(
        "[{:<20}] {:>5.1}/{:<5.1} mana {:>5.1}",
        "#".repeat(filled.min(20)),
        health,
        max,
        mana
    )
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    init_logging();

    let data = std::env::args()
        .nth(1)
        .map(PathBuf::from)
        .unwrap_or_else(|| PathBuf::from(env!("CARGO_MANIFEST_DIR")).join("data"));

    let mut loader = Loader::new();
    loader.load_directory(&data)?;
    let content = loader.finish()?;

    let mut world = World::new(content.defs, content.config, DeltaOutbox::new())?;
    let (server, client) = MemoryConnection::pair("authority", "mirror");
    let mut mirror = Mirror::new();

    let knight = world.spawn(&DefId::new("Knight"), ArenaAvatar::boxed("knight"))?;
    let mage = world.spawn(&DefId::new("Mage"), ArenaAvatar::boxed("mage"))?;

    println!("=== Spellbind Arena ===\n");

    let mut respawn_at = None;
    let mut respawned = None;

    for _ in 0..MAX_TICKS {
        let tick = world.clock().tick + 1;

        if world.character(knight)?.is_alive() && world.character(mage)?.is_alive() {
            world.press_input(knight, ATTACK, Some(mage))?;
            world.press_input(mage, ATTACK, Some(knight))?;
            if tick % 50 == 0 {
                for (handle, result) in world.press_input(knight, BASH, Some(mage))? {
                    if let Err(e) = result {
                        tracing::debug!(%handle, error = %e, "shield bash refused");
                    }
                }
            }
        }

        let report = world.tick();
        for (id, event) in &report.events {
            let who = if *id == knight { "knight" } else { "mage" };
            match event {
                CharacterEvent::Died => println!("tick {:>4}: the {} falls", report.tick, who),
                CharacterEvent::Destroyed if *id == mage => {
                    respawn_at = Some(report.tick + RESPAWN_DELAY);
                }
                CharacterEvent::Initialized { respawn: true } => {
                    println!("tick {:>4}: the {} returns to the arena", report.tick, who)
                }
                CharacterEvent::AbilityEnded {
                    ability,
                    cancelled: true,
                    ..
                } => println!("tick {:>4}: the {}'s {} is interrupted", report.tick, who, ability),
                _ => {}
            }
        }

        if respawn_at == Some(report.tick) {
            world.respawn(mage, Some(ArenaAvatar::boxed("mage")))?;
            respawned = Some(report.tick);
            respawn_at = None;
        }

        world.bridge_mut().flush(&server)?;
        if report.tick == LOSSY_TICK && client.drop_next() {
            println!("tick {:>4}: a packet is lost on the way to the mirror", report.tick);
        }
        let polled = mirror.poll(&client)?;
        if polled.requests_sent > 0 {
            println!(
                "tick {:>4}: mirror detected a gap and asked for {} snapshot(s)",
                report.tick, polled.requests_sent
            );
        }
        serve_requests(&mut world, &server)?;
        mirror.poll(&client)?;

        if report.tick % 30 == 0 {
            println!(
                "tick {:>4}: knight {}  mage {}",
                report.tick,
                health_bar(&mirror, knight),
                health_bar(&mirror, mage)
            );
        }

        if respawned.is_some_and(|at| report.tick >= at + 90) {
            break;
        }
    }

    println!();
    for (name, id) in [("knight", knight), ("mage", mage)] {
        let authority = world.snapshot(id)?;
        let in_sync = mirror.replica(id).map(|r| r.snapshot()) == Some(authority);
        println!(
            "{:<6} {}  mirror in sync: {}",
            name,
            health_bar(&mirror, id),
            in_sync
        );
    }

    Ok(())
}
