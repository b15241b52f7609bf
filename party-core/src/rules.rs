//! Combat rules.
//!
//! A fight pits a whole party against a single creature of a given level.
//! Each member contributes its level, doubled when its class is favored
//! against the creature. A party at least as strong as the creature wins and
//! every member gains a level; otherwise every member loses one.

use crate::party::Party;
use crate::world::CharacterClass;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Creatures a party can fight.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Creature {
    Orc,
    Demon,
}

impl Creature {
    pub fn name(&self) -> &'static str {
        match self {
            Creature::Orc => "Orc",
            Creature::Demon => "Demon",
        }
    }

    pub fn code(&self) -> i32 {
        match self {
            Creature::Orc => 0,
            Creature::Demon => 1,
        }
    }

    pub fn from_code(code: i32) -> Option<Creature> {
        match code {
            0 => Some(Creature::Orc),
            1 => Some(Creature::Demon),
            _ => None,
        }
    }

    /// The class that fights this creature at double weight.
    pub fn favored_class(&self) -> CharacterClass {
        match self {
            Creature::Orc => CharacterClass::Fighter,
            Creature::Demon => CharacterClass::Mage,
        }
    }

    /// Multiplier applied to a member's level against this creature.
    pub fn weight(&self, class: CharacterClass) -> u64 {
        if class == self.favored_class() {
            2
        } else {
            1
        }
    }
}

impl fmt::Display for Creature {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.name())
    }
}

impl FromStr for Creature {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "orc" => Ok(Creature::Orc),
            "demon" => Ok(Creature::Demon),
            other => Err(format!("unknown creature '{other}'")),
        }
    }
}

/// Result of a fight from the party's point of view.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum FightOutcome {
    Lose,
    Win,
}

impl FightOutcome {
    /// Wire value: 1 for a win, 0 for a loss.
    pub fn code(&self) -> i32 {
        match self {
            FightOutcome::Lose => 0,
            FightOutcome::Win => 1,
        }
    }

    pub fn is_win(&self) -> bool {
        matches!(self, FightOutcome::Win)
    }
}

/// What happened in a resolved fight.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct FightReport {
    pub creature: Creature,
    pub creature_level: u64,
    pub strength: u64,
    pub outcome: FightOutcome,
}

/// Total strength of a party against a creature.
pub fn party_strength(party: &Party, creature: Creature) -> u64 {
    party
        .iter()
        .map(|member| creature.weight(member.class) * u64::from(member.level))
        .sum()
}

/// Resolve a fight and apply the level changes to every member.
pub fn resolve_fight(party: &mut Party, creature: Creature, creature_level: u64) -> FightReport {
    let strength = party_strength(party, creature);
    let outcome = if strength >= creature_level {
        FightOutcome::Win
    } else {
        FightOutcome::Lose
    };

    for member in party.iter_mut() {
        match outcome {
            FightOutcome::Win => member.level_up(),
            FightOutcome::Lose => member.level_down(),
        }
    }

    FightReport {
        creature,
        creature_level,
        strength,
        outcome,
    }
}
