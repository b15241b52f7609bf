//! Party store.
//!
//! A `Party` is the ordered character sequence owned by one leader. Order is
//! join order and decides who gets promoted when a leader departs. This type
//! knows nothing about leader references; keeping those consistent is the
//! membership engine's job.

use crate::world::{AgentId, Character, CharacterClass};
use serde::{Deserialize, Serialize};

/// Ordered character sequence owned by a leader.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Party {
    members: Vec<Character>,
}

impl Party {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.members.len()
    }

    pub fn is_empty(&self) -> bool {
        self.members.is_empty()
    }

    /// Append a character at the tail (newest member).
    pub fn push(&mut self, character: Character) {
        self.members.push(character);
    }

    /// Remove the entry owned by `owner`, keeping the order of the rest.
    pub fn remove_owner(&mut self, owner: AgentId) -> Option<Character> {
        let index = self.members.iter().position(|c| c.owner == owner)?;
        Some(self.members.remove(index))
    }

    pub fn find(&self, owner: AgentId) -> Option<&Character> {
        self.members.iter().find(|c| c.owner == owner)
    }

    pub fn contains(&self, owner: AgentId) -> bool {
        self.find(owner).is_some()
    }

    /// First member in join order that is not `excluded`.
    pub fn first_other(&self, excluded: AgentId) -> Option<AgentId> {
        self.members
            .iter()
            .map(|c| c.owner)
            .find(|owner| *owner != excluded)
    }

    /// Detach the whole sequence, leaving this party empty.
    pub fn take(&mut self) -> Party {
        std::mem::take(self)
    }

    /// Splice another sequence onto the tail of this one.
    ///
    /// When this party is empty the buffer is moved, not copied.
    pub fn absorb(&mut self, mut other: Party) {
        if self.members.is_empty() {
            self.members = other.members;
        } else {
            self.members.append(&mut other.members);
        }
    }

    pub fn owners(&self) -> impl Iterator<Item = AgentId> + '_ {
        self.members.iter().map(|c| c.owner)
    }

    pub fn iter(&self) -> impl Iterator<Item = &Character> {
        self.members.iter()
    }

    pub fn iter_mut(&mut self) -> impl Iterator<Item = &mut Character> {
        self.members.iter_mut()
    }

    /// Sum of levels over members of one class.
    pub fn level_sum(&self, class: CharacterClass) -> u64 {
        self.members
            .iter()
            .filter(|c| c.class == class)
            .map(|c| u64::from(c.level))
            .sum()
    }

    pub fn as_slice(&self) -> &[Character] {
        &self.members
    }
}
