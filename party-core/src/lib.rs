//! Party membership and combat engine.
//!
//! Agents (host processes) may each own one character. Characters band
//! together in parties led by one agent; joining, leaving and termination
//! keep the leader graph and every party's ordered roster consistent, and a
//! fight levels a whole party up or down at once.
//!
//! This crate provides:
//! - The agent registry and per-leader party store
//! - The membership engine (create, join, leave, spawn/terminate hooks)
//! - Combat resolution and party statistics
//! - An integer ABI in the shape of a system-call surface
//!
//! # Quick Start
//!
//! ```
//! use party_core::{CharacterClass, Creature, EngineConfig, FightOutcome, PartyEngine};
//!
//! let engine = PartyEngine::new(EngineConfig::default());
//! let thorin = engine.spawn_agent(None);
//! let gandalf = engine.spawn_agent(Some(thorin));
//!
//! engine.session(thorin).create_character(CharacterClass::Fighter)?;
//! engine.session(gandalf).create_character(CharacterClass::Mage)?;
//! engine.session(gandalf).join(thorin)?;
//!
//! let outcome = engine.session(thorin).fight(Creature::Orc, 3)?;
//! assert_eq!(outcome, FightOutcome::Win);
//! assert_eq!(engine.session(gandalf).get_stats()?.party_size, 2);
//! # Ok::<(), party_core::PartyError>(())
//! ```

/// Log and abort on a broken party invariant.
///
/// These indicate a bug in the engine, never bad input.
macro_rules! invariant_violation {
    ($($arg:tt)*) => {{
        let message = format!($($arg)*);
        tracing::error!(%message, "party invariant violated");
        panic!("party invariant violated: {message}")
    }};
}

pub mod abi;
pub mod engine;
pub mod party;
pub mod registry;
pub mod rules;
pub mod session;
pub mod snapshot;
pub mod stats;
pub mod testing;
pub mod world;

// Primary public API
pub use engine::{ConfigError, EngineConfig, PartyEngine, PartyError};
pub use party::Party;
pub use registry::{AgentRegistry, AgentSlot, RegistryError};
pub use rules::{Creature, FightOutcome, FightReport};
pub use session::AgentSession;
pub use snapshot::{AgentView, InvariantViolation, WorldSnapshot};
pub use stats::{PartyStats, StatsSink, TransferError};
pub use testing::PartyHarness;
pub use world::{AgentId, Character, CharacterClass, CharacterId, MemberFlag};
