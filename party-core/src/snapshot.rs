//! Whole-world snapshots and invariant verification.

use crate::registry::{AgentRegistry, PartyLocks};
use crate::world::{AgentId, Character, CharacterId, MemberFlag};
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};
use thiserror::Error;

/// One agent as captured in a snapshot.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AgentView {
    pub id: AgentId,
    pub leader: AgentId,
    pub member_flag: MemberFlag,
    /// Sequence owned by this agent; empty unless it leads a party.
    pub party: Vec<Character>,
}

impl AgentView {
    pub fn has_character(&self) -> bool {
        self.member_flag.is_member() || !self.party.is_empty()
    }
}

/// Every agent and party at a single point in time.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct WorldSnapshot {
    pub agents: Vec<AgentView>,
}

/// A broken membership invariant found in a snapshot.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum InvariantViolation {
    #[error("agent {agent} points at unregistered leader {leader}")]
    LeaderMissing { agent: AgentId, leader: AgentId },

    #[error("agent {agent} follows {leader}, which does not lead itself")]
    LeaderNotSelfLed { agent: AgentId, leader: AgentId },

    #[error("agent {agent} owns a party while following someone else")]
    FollowerOwnsParty { agent: AgentId },

    #[error("agent {agent} has a character but no entry in the party of {leader}")]
    MissingEntry { agent: AgentId, leader: AgentId },

    #[error("agent {agent} has {count} entries in the party of {leader}")]
    DuplicateEntry {
        agent: AgentId,
        leader: AgentId,
        count: usize,
    },

    #[error("agent {agent} has an entry in the party of {leader} but no character")]
    UnexpectedEntry { agent: AgentId, leader: AgentId },

    #[error("party of {leader} holds an entry for {owner}, who does not follow it")]
    StrayEntry { leader: AgentId, owner: AgentId },

    #[error("character {0} appears more than once")]
    DuplicateCharacter(CharacterId),
}

impl WorldSnapshot {
    pub fn agent(&self, id: AgentId) -> Option<&AgentView> {
        self.agents.iter().find(|a| a.id == id)
    }

    pub fn leader_of(&self, id: AgentId) -> Option<AgentId> {
        self.agent(id).map(|a| a.leader)
    }

    /// Owners in the party led by `leader`, in join order.
    pub fn roster(&self, leader: AgentId) -> Vec<AgentId> {
        self.agent(leader)
            .map(|a| a.party.iter().map(|c| c.owner).collect())
            .unwrap_or_default()
    }

    /// Agents that currently lead a non-empty party.
    pub fn leaders(&self) -> Vec<AgentId> {
        self.agents
            .iter()
            .filter(|a| !a.party.is_empty())
            .map(|a| a.id)
            .collect()
    }

    /// Find the live record owned by `owner`, wherever it sits.
    pub fn character_of(&self, owner: AgentId) -> Option<&Character> {
        self.agents
            .iter()
            .flat_map(|a| a.party.iter())
            .find(|c| c.owner == owner)
    }

    pub fn character_count(&self) -> usize {
        self.agents.iter().map(|a| a.party.len()).sum()
    }

    pub fn to_json_pretty(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string_pretty(self)
    }

    /// Check the leader graph and every roster for consistency.
    pub fn verify(&self) -> Result<(), InvariantViolation> {
        let by_id: HashMap<AgentId, &AgentView> = self.agents.iter().map(|a| (a.id, a)).collect();

        for agent in &self.agents {
            let Some(leader) = by_id.get(&agent.leader) else {
                return Err(InvariantViolation::LeaderMissing {
                    agent: agent.id,
                    leader: agent.leader,
                });
            };
            if leader.leader != leader.id {
                return Err(InvariantViolation::LeaderNotSelfLed {
                    agent: agent.id,
                    leader: leader.id,
                });
            }
            if agent.leader != agent.id && !agent.party.is_empty() {
                return Err(InvariantViolation::FollowerOwnsParty { agent: agent.id });
            }

            let entries = leader.party.iter().filter(|c| c.owner == agent.id).count();
            match (agent.has_character(), entries) {
                (true, 1) | (false, 0) => {}
                (true, 0) => {
                    return Err(InvariantViolation::MissingEntry {
                        agent: agent.id,
                        leader: leader.id,
                    })
                }
                (false, _) => {
                    return Err(InvariantViolation::UnexpectedEntry {
                        agent: agent.id,
                        leader: leader.id,
                    })
                }
                (true, count) => {
                    return Err(InvariantViolation::DuplicateEntry {
                        agent: agent.id,
                        leader: leader.id,
                        count,
                    })
                }
            }
        }

        let mut seen = HashSet::new();
        for leader in &self.agents {
            for character in &leader.party {
                let follows = by_id
                    .get(&character.owner)
                    .is_some_and(|owner| owner.leader == leader.id);
                if !follows {
                    return Err(InvariantViolation::StrayEntry {
                        leader: leader.id,
                        owner: character.owner,
                    });
                }
                if !seen.insert(character.id) {
                    return Err(InvariantViolation::DuplicateCharacter(character.id));
                }
            }
        }

        Ok(())
    }
}

/// Capture every registered agent with all party locks held.
pub(crate) fn capture(registry: &AgentRegistry) -> WorldSnapshot {
    loop {
        let slots = registry.all_sorted();
        let locks = PartyLocks::acquire(&slots);

        // Retry if an agent appeared or vanished while we were locking.
        let unchanged = registry
            .all_sorted()
            .iter()
            .map(|s| s.id())
            .eq(slots.iter().map(|s| s.id()));
        if !unchanged {
            continue;
        }

        let agents = slots
            .iter()
            .map(|slot| AgentView {
                id: slot.id(),
                leader: slot.leader(),
                member_flag: slot.member_flag(),
                party: locks.party(slot.id()).as_slice().to_vec(),
            })
            .collect();
        return WorldSnapshot { agents };
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::world::CharacterClass;

    fn view(id: u32, leader: u32, member: bool, party: &[u32]) -> AgentView {
        AgentView {
            id: AgentId(id),
            leader: AgentId(leader),
            member_flag: MemberFlag::from_bool(member),
            party: party
                .iter()
                .map(|owner| Character::new(AgentId(*owner), CharacterClass::Fighter, 1))
                .collect(),
        }
    }

    #[test]
    fn test_consistent_world() {
        let world = WorldSnapshot {
            agents: vec![view(1, 1, true, &[1, 2]), view(2, 1, true, &[]), view(3, 3, false, &[])],
        };
        assert_eq!(world.verify(), Ok(()));
        assert_eq!(world.roster(AgentId(1)), vec![AgentId(1), AgentId(2)]);
        assert_eq!(world.leaders(), vec![AgentId(1)]);
        assert_eq!(world.character_count(), 2);
    }

    #[test]
    fn test_missing_leader() {
        let world = WorldSnapshot {
            agents: vec![view(2, 9, true, &[])],
        };
        assert_eq!(
            world.verify(),
            Err(InvariantViolation::LeaderMissing {
                agent: AgentId(2),
                leader: AgentId(9)
            })
        );
    }

    #[test]
    fn test_chained_leaders() {
        let world = WorldSnapshot {
            agents: vec![view(1, 2, true, &[]), view(2, 3, true, &[]), view(3, 3, true, &[3, 2])],
        };
        assert!(matches!(
            world.verify(),
            Err(InvariantViolation::LeaderNotSelfLed { .. })
        ));
    }

    #[test]
    fn test_member_without_entry() {
        let world = WorldSnapshot {
            agents: vec![view(1, 1, true, &[1]), view(2, 1, true, &[])],
        };
        assert_eq!(
            world.verify(),
            Err(InvariantViolation::MissingEntry {
                agent: AgentId(2),
                leader: AgentId(1)
            })
        );
    }

    #[test]
    fn test_stray_entry() {
        let world = WorldSnapshot {
            agents: vec![view(1, 1, true, &[1, 3]), view(3, 3, false, &[])],
        };
        assert!(matches!(
            world.verify(),
            Err(InvariantViolation::UnexpectedEntry { .. })
                | Err(InvariantViolation::StrayEntry { .. })
        ));
    }

    #[test]
    fn test_duplicate_record() {
        let mut world = WorldSnapshot {
            agents: vec![view(1, 1, true, &[1]), view(2, 2, true, &[2])],
        };
        let copied = world.agents[0].party[0].id;
        world.agents[1].party[0].id = copied;
        assert_eq!(world.verify(), Err(InvariantViolation::DuplicateCharacter(copied)));
    }
}
