//! Party game world types.
//!
//! Contains the identifiers and records shared by every part of the engine:
//! agents, characters, classes and membership flags.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

// ============================================================================
// ID Types
// ============================================================================

/// Identifier of a host agent, such as a process id.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct AgentId(pub u32);

impl AgentId {
    pub fn raw(&self) -> u32 {
        self.0
    }
}

impl fmt::Display for AgentId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<u32> for AgentId {
    fn from(raw: u32) -> Self {
        Self(raw)
    }
}

/// Unique identifier for character records.
///
/// A record keeps its id for its whole life, across every relocation
/// between parties.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct CharacterId(pub Uuid);

impl CharacterId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for CharacterId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for CharacterId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

// ============================================================================
// Classes
// ============================================================================

/// Character classes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum CharacterClass {
    Fighter,
    Mage,
}

impl CharacterClass {
    pub fn name(&self) -> &'static str {
        match self {
            CharacterClass::Fighter => "Fighter",
            CharacterClass::Mage => "Mage",
        }
    }

    /// Wire value used by the integer ABI.
    pub fn code(&self) -> i32 {
        match self {
            CharacterClass::Fighter => 0,
            CharacterClass::Mage => 1,
        }
    }

    pub fn from_code(code: i32) -> Option<CharacterClass> {
        match code {
            0 => Some(CharacterClass::Fighter),
            1 => Some(CharacterClass::Mage),
            _ => None,
        }
    }
}

impl fmt::Display for CharacterClass {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.name())
    }
}

impl FromStr for CharacterClass {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "fighter" => Ok(CharacterClass::Fighter),
            "mage" => Ok(CharacterClass::Mage),
            other => Err(format!("unknown class '{other}'")),
        }
    }
}

// ============================================================================
// Membership
// ============================================================================

/// Whether an agent has ever taken part in a join.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum MemberFlag {
    #[default]
    NotAMember,
    Member,
}

impl MemberFlag {
    pub fn is_member(&self) -> bool {
        matches!(self, MemberFlag::Member)
    }

    pub fn from_bool(member: bool) -> Self {
        if member {
            MemberFlag::Member
        } else {
            MemberFlag::NotAMember
        }
    }
}

// ============================================================================
// Character
// ============================================================================

/// A character record owned by exactly one party sequence at a time.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Character {
    pub id: CharacterId,
    pub owner: AgentId,
    pub class: CharacterClass,
    pub level: u32,
}

impl Character {
    pub fn new(owner: AgentId, class: CharacterClass, level: u32) -> Self {
        Self {
            id: CharacterId::new(),
            owner,
            class,
            level,
        }
    }

    pub fn level_up(&mut self) {
        self.level = self.level.saturating_add(1);
    }

    /// Lose one level, never dropping below zero.
    pub fn level_down(&mut self) {
        self.level = self.level.saturating_sub(1);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_class_codes() {
        assert_eq!(CharacterClass::from_code(0), Some(CharacterClass::Fighter));
        assert_eq!(CharacterClass::from_code(1), Some(CharacterClass::Mage));
        assert_eq!(CharacterClass::from_code(2), None);
        assert_eq!(CharacterClass::from_code(-1), None);
        assert_eq!(CharacterClass::Mage.code(), 1);
    }

    #[test]
    fn test_class_parse() {
        assert_eq!("Fighter".parse::<CharacterClass>(), Ok(CharacterClass::Fighter));
        assert_eq!("mage".parse::<CharacterClass>(), Ok(CharacterClass::Mage));
        assert!("bard".parse::<CharacterClass>().is_err());
    }

    #[test]
    fn test_level_floor() {
        let mut character = Character::new(AgentId(7), CharacterClass::Mage, 1);
        character.level_down();
        assert_eq!(character.level, 0);
        character.level_down();
        assert_eq!(character.level, 0);
        character.level_up();
        assert_eq!(character.level, 1);
    }

    #[test]
    fn test_agent_ordering() {
        assert!(AgentId(3) < AgentId(10));
        assert_eq!(AgentId::from(4).to_string(), "4");
    }
}
