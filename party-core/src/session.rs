//! AgentSession - the per-agent public API.
//!
//! Every call is made on behalf of one calling agent, the way a process
//! would issue system calls for itself. The session only binds the caller;
//! all state lives in the [`PartyEngine`].

use crate::engine::{PartyEngine, PartyError};
use crate::rules::{Creature, FightOutcome};
use crate::stats::{PartyStats, StatsSink};
use crate::world::{AgentId, CharacterClass};

/// Operations issued by a single agent.
#[derive(Debug, Clone, Copy)]
pub struct AgentSession<'e> {
    engine: &'e PartyEngine,
    agent: AgentId,
}

impl<'e> AgentSession<'e> {
    pub fn new(engine: &'e PartyEngine, agent: AgentId) -> Self {
        Self { engine, agent }
    }

    /// The calling agent.
    pub fn agent(&self) -> AgentId {
        self.agent
    }

    /// Create this agent's character.
    pub fn create_character(&self, class: CharacterClass) -> Result<(), PartyError> {
        self.engine.create_character(self.agent, class)
    }

    /// Fight a creature of `level` with this agent's whole party.
    pub fn fight(&self, creature: Creature, level: i64) -> Result<FightOutcome, PartyError> {
        self.engine
            .fight(self.agent, creature, level)
            .map(|report| report.outcome)
    }

    /// Stats for this agent's character and party.
    pub fn get_stats(&self) -> Result<PartyStats, PartyError> {
        self.engine.get_stats(self.agent)
    }

    /// Stats delivered through a caller-provided sink.
    pub fn get_stats_into<S: StatsSink + ?Sized>(&self, sink: &mut S) -> Result<(), PartyError> {
        self.engine.get_stats_into(self.agent, sink)
    }

    /// Join the party of `target`.
    pub fn join(&self, target: AgentId) -> Result<(), PartyError> {
        self.engine.join(self.agent, target)
    }

    /// Whether this agent owns a character.
    pub fn has_character(&self) -> bool {
        self.engine.has_character(self.agent)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::EngineConfig;

    #[test]
    fn test_session_round() {
        let engine = PartyEngine::new(EngineConfig::default());
        let a = engine.session(engine.spawn_agent(None));
        let b = engine.session(engine.spawn_agent(None));

        assert!(!a.has_character());
        a.create_character(CharacterClass::Fighter).unwrap();
        b.create_character(CharacterClass::Fighter).unwrap();
        a.join(b.agent()).unwrap();

        let stats = b.get_stats().unwrap();
        assert_eq!(stats.party_size, 2);
        assert_eq!(stats.fighter_levels, 2);
        assert_eq!(a.fight(Creature::Demon, 2).unwrap(), FightOutcome::Win);
        assert_eq!(a.get_stats().unwrap().level, 2);
    }

    #[test]
    fn test_stats_without_character() {
        let engine = PartyEngine::new(EngineConfig::default());
        let a = engine.session(engine.spawn_agent(None));
        assert!(matches!(a.get_stats(), Err(PartyError::InvalidArgument(_))));
        assert!(!a.has_character());
    }
}
