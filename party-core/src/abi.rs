//! Integer ABI.
//!
//! Mirrors the system-call surface the engine was first exposed through:
//! plain integers in, a non-negative result or a negated errno out. Class and
//! creature codes are the wire values from [`CharacterClass::code`] and
//! [`Creature::code`].

use crate::engine::{PartyEngine, PartyError};
use crate::rules::Creature;
use crate::stats::{PartyStats, StatsSink, TransferError};
use crate::world::{AgentId, CharacterClass};

pub const CLASS_FIGHTER: i32 = 0;
pub const CLASS_MAGE: i32 = 1;
pub const CREATURE_ORC: i32 = 0;
pub const CREATURE_DEMON: i32 = 1;
pub const LOSE: i32 = 0;
pub const WIN: i32 = 1;

/// Stats as laid out for the caller.
#[repr(C)]
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RpgStats {
    pub cclass: i32,
    pub level: i32,
    pub party_size: i32,
    pub fighter_levels: i32,
    pub mage_levels: i32,
}

impl StatsSink for RpgStats {
    fn deliver(&mut self, stats: &PartyStats) -> Result<(), TransferError> {
        let narrow = |value: u64, field: &str| {
            i32::try_from(value)
                .map_err(|_| TransferError::new(format!("{field} does not fit in i32")))
        };
        *self = RpgStats {
            cclass: stats.class.code(),
            level: narrow(u64::from(stats.level), "level")?,
            party_size: narrow(stats.party_size as u64, "party_size")?,
            fighter_levels: narrow(stats.fighter_levels, "fighter_levels")?,
            mage_levels: narrow(stats.mage_levels, "mage_levels")?,
        };
        Ok(())
    }
}

impl PartyError {
    /// The errno value reported for this error.
    pub fn errno(&self) -> i32 {
        match self {
            PartyError::AlreadyExists => libc::EEXIST,
            PartyError::InvalidArgument(_) => libc::EINVAL,
            PartyError::NoSuchAgent(_) => libc::ESRCH,
            PartyError::OutOfMemory => libc::ENOMEM,
            PartyError::BadAddress => libc::EFAULT,
        }
    }
}

fn status(result: Result<i32, PartyError>) -> i32 {
    match result {
        Ok(value) => value,
        Err(err) => -err.errno(),
    }
}

pub fn rpg_create_character(engine: &PartyEngine, caller: AgentId, cclass: i32) -> i32 {
    status(
        CharacterClass::from_code(cclass)
            .ok_or(PartyError::InvalidArgument("unknown character class"))
            .and_then(|class| engine.create_character(caller, class))
            .map(|()| 0),
    )
}

/// Returns [`WIN`] or [`LOSE`] on success.
pub fn rpg_fight(engine: &PartyEngine, caller: AgentId, creature: i32, level: i32) -> i32 {
    status(
        Creature::from_code(creature)
            .ok_or(PartyError::InvalidArgument("unknown creature type"))
            .and_then(|creature| engine.fight(caller, creature, i64::from(level)))
            .map(|report| report.outcome.code()),
    )
}

/// `None` stands for a null destination and is rejected before anything else.
pub fn rpg_get_stats(engine: &PartyEngine, caller: AgentId, out: Option<&mut RpgStats>) -> i32 {
    let Some(out) = out else {
        return -libc::EINVAL;
    };
    status(engine.get_stats_into(caller, out).map(|()| 0))
}

pub fn rpg_join(engine: &PartyEngine, caller: AgentId, player: i32) -> i32 {
    let Ok(raw) = u32::try_from(player) else {
        return -libc::ESRCH;
    };
    status(engine.join(caller, AgentId(raw)).map(|()| 0))
}
