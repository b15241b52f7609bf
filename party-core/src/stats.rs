//! Party statistics.
//!
//! Stats are computed under the party lock and then handed across the
//! calling boundary by value through a [`StatsSink`].

use crate::party::Party;
use crate::world::{AgentId, CharacterClass};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Snapshot of a party as seen by one of its members.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PartyStats {
    /// Class of the requesting agent's character.
    pub class: CharacterClass,
    /// Level of the requesting agent's character.
    pub level: u32,
    pub party_size: usize,
    pub fighter_levels: u64,
    pub mage_levels: u64,
}

/// Build the stats for `agent` from its leader's party.
///
/// Returns `None` when the party has no entry for `agent`.
pub fn report(party: &Party, agent: AgentId) -> Option<PartyStats> {
    let own = party.find(agent)?;
    Some(PartyStats {
        class: own.class,
        level: own.level,
        party_size: party.len(),
        fighter_levels: party.level_sum(CharacterClass::Fighter),
        mage_levels: party.level_sum(CharacterClass::Mage),
    })
}

/// Failure to copy stats out to the caller.
#[derive(Debug, Error, PartialEq, Eq)]
#[error("failed to deliver stats: {reason}")]
pub struct TransferError {
    pub reason: String,
}

impl TransferError {
    pub fn new(reason: impl Into<String>) -> Self {
        Self {
            reason: reason.into(),
        }
    }
}

/// Destination for stats crossing the calling boundary.
pub trait StatsSink {
    fn deliver(&mut self, stats: &PartyStats) -> Result<(), TransferError>;
}

impl StatsSink for Option<PartyStats> {
    fn deliver(&mut self, stats: &PartyStats) -> Result<(), TransferError> {
        *self = Some(*stats);
        Ok(())
    }
}

impl StatsSink for Vec<PartyStats> {
    fn deliver(&mut self, stats: &PartyStats) -> Result<(), TransferError> {
        self.push(*stats);
        Ok(())
    }
}
