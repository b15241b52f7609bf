//! Testing utilities for the party engine.
//!
//! This module provides tools for integration testing:
//! - `PartyHarness` for building parties in a few lines
//! - Assertion helpers for verifying leaders, rosters and invariants
//! - `random_walk` for seeded random operation sequences

use crate::engine::{EngineConfig, PartyEngine, PartyError};
use crate::rules::Creature;
use crate::session::AgentSession;
use crate::snapshot::{InvariantViolation, WorldSnapshot};
use crate::world::{AgentId, CharacterClass, MemberFlag};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

/// Test harness wrapping an engine with convenience helpers.
pub struct PartyHarness {
    /// The engine under test.
    pub engine: PartyEngine,
}

impl PartyHarness {
    /// Create a harness with the default configuration.
    pub fn new() -> Self {
        Self::with_config(EngineConfig::default())
    }

    pub fn with_config(config: EngineConfig) -> Self {
        Self {
            engine: PartyEngine::new(config),
        }
    }

    /// Spawn an agent without a character.
    pub fn spawn(&self) -> AgentId {
        self.engine.spawn_agent(None)
    }

    /// Spawn an agent and create its character.
    pub fn spawn_with(&self, class: CharacterClass) -> AgentId {
        let agent = self.spawn();
        self.engine
            .create_character(agent, class)
            .unwrap_or_else(|err| panic!("creating a {class} for {agent} failed: {err}"));
        agent
    }

    /// Build a party: the first class leads, the rest join in order.
    ///
    /// Returns the agents in join order, leader first.
    pub fn party(&self, classes: &[CharacterClass]) -> Vec<AgentId> {
        let agents: Vec<AgentId> = classes.iter().map(|c| self.spawn_with(*c)).collect();
        if let Some((leader, rest)) = agents.split_first() {
            for member in rest {
                self.engine
                    .join(*member, *leader)
                    .unwrap_or_else(|err| panic!("{member} joining {leader} failed: {err}"));
            }
        }
        agents
    }

    pub fn session(&self, agent: AgentId) -> AgentSession<'_> {
        self.engine.session(agent)
    }

    pub fn join(&self, caller: AgentId, target: AgentId) -> Result<(), PartyError> {
        self.engine.join(caller, target)
    }

    pub fn terminate(&self, agent: AgentId) {
        self.engine.on_agent_terminated(agent);
    }

    pub fn snapshot(&self) -> WorldSnapshot {
        self.engine.snapshot()
    }

    /// Current leader of `agent`, or `None` if it is not registered.
    pub fn leader_of(&self, agent: AgentId) -> Option<AgentId> {
        self.snapshot().leader_of(agent)
    }

    pub fn member_flag(&self, agent: AgentId) -> Option<MemberFlag> {
        self.snapshot().agent(agent).map(|a| a.member_flag)
    }

    /// Owners in `leader`'s party, in join order.
    pub fn roster(&self, leader: AgentId) -> Vec<AgentId> {
        self.snapshot().roster(leader)
    }

    pub fn level_of(&self, agent: AgentId) -> Option<u32> {
        self.snapshot().character_of(agent).map(|c| c.level)
    }
}

impl Default for PartyHarness {
    fn default() -> Self {
        Self::new()
    }
}

// ============================================================================
// Assertion Helpers
// ============================================================================

/// Assert that every membership invariant holds.
#[track_caller]
pub fn assert_invariants(harness: &PartyHarness) {
    let snapshot = harness.snapshot();
    if let Err(violation) = snapshot.verify() {
        panic!("invariant violated: {violation}\nworld: {snapshot:#?}");
    }
}

/// Assert that `agent` is led by `leader`.
#[track_caller]
pub fn assert_leader(harness: &PartyHarness, agent: AgentId, leader: AgentId) {
    let actual = harness.leader_of(agent);
    assert_eq!(
        actual,
        Some(leader),
        "Expected {agent} to be led by {leader}, got {actual:?}"
    );
}

/// Assert the exact roster of `leader`'s party, in join order.
#[track_caller]
pub fn assert_roster(harness: &PartyHarness, leader: AgentId, expected: &[AgentId]) {
    let actual = harness.roster(leader);
    assert_eq!(
        actual, expected,
        "Expected party of {leader} to be {expected:?}, got {actual:?}"
    );
}

/// Assert that `agent` has no character anywhere.
#[track_caller]
pub fn assert_no_character(harness: &PartyHarness, agent: AgentId) {
    assert!(
        harness.snapshot().character_of(agent).is_none(),
        "Expected {agent} to have no character"
    );
}

// ============================================================================
// Random Walks
// ============================================================================

/// One step of a random walk.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WalkOp {
    Spawn,
    Create(AgentId, CharacterClass),
    Join(AgentId, AgentId),
    Leave(AgentId),
    Terminate(AgentId),
    Fight(AgentId, Creature, i64),
    Stats(AgentId),
}

/// Counters from a finished walk.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct WalkSummary {
    pub steps: usize,
    pub joins: usize,
    pub rejected: usize,
    pub terminated: usize,
}

/// A walk step after which the world no longer checked out.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WalkFailure {
    pub step: usize,
    pub op: WalkOp,
    pub violation: InvariantViolation,
}

/// Drive `steps` random operations over a pool of about `agents` agents,
/// verifying every invariant after each one.
pub fn random_walk(seed: u64, agents: usize, steps: usize) -> Result<WalkSummary, WalkFailure> {
    let mut rng = StdRng::seed_from_u64(seed);
    let harness = PartyHarness::new();
    let mut live: Vec<AgentId> = (0..agents.max(1)).map(|_| harness.spawn()).collect();
    let mut summary = WalkSummary::default();

    for step in 0..steps {
        let op = pick_op(&mut rng, &live);
        let result = apply_op(&harness, op, &mut live);
        match (op, result) {
            (_, Err(_)) => summary.rejected += 1,
            (WalkOp::Join(..), Ok(())) => summary.joins += 1,
            (WalkOp::Terminate(_), Ok(())) => summary.terminated += 1,
            _ => {}
        }
        summary.steps += 1;

        let snapshot = harness.snapshot();
        if let Err(violation) = snapshot.verify() {
            return Err(WalkFailure {
                step,
                op,
                violation,
            });
        }
        assert_eq!(
            snapshot.character_count(),
            harness.engine.character_count(),
            "character accounting drifted at step {step} after {op:?}"
        );
    }

    Ok(summary)
}

fn pick_op(rng: &mut StdRng, live: &[AgentId]) -> WalkOp {
    if live.is_empty() {
        return WalkOp::Spawn;
    }
    match rng.gen_range(0..100) {
        0..=9 => WalkOp::Spawn,
        10..=29 => {
            let class = if rng.gen_bool(0.5) {
                CharacterClass::Fighter
            } else {
                CharacterClass::Mage
            };
            WalkOp::Create(pick(rng, live), class)
        }
        30..=64 => {
            let caller = pick(rng, live);
            // Occasionally aim at an id that was never spawned.
            let target = if rng.gen_bool(0.05) {
                AgentId(u32::MAX)
            } else {
                pick(rng, live)
            };
            WalkOp::Join(caller, target)
        }
        65..=72 => WalkOp::Leave(pick(rng, live)),
        73..=82 => WalkOp::Terminate(pick(rng, live)),
        83..=92 => {
            let creature = if rng.gen_bool(0.5) {
                Creature::Orc
            } else {
                Creature::Demon
            };
            WalkOp::Fight(pick(rng, live), creature, rng.gen_range(-1..12))
        }
        _ => WalkOp::Stats(pick(rng, live)),
    }
}

fn pick(rng: &mut StdRng, live: &[AgentId]) -> AgentId {
    live[rng.gen_range(0..live.len())]
}

fn apply_op(harness: &PartyHarness, op: WalkOp, live: &mut Vec<AgentId>) -> Result<(), PartyError> {
    let engine = &harness.engine;
    match op {
        WalkOp::Spawn => {
            let parent = live.first().copied();
            live.push(engine.spawn_agent(parent));
            Ok(())
        }
        WalkOp::Create(agent, class) => engine.create_character(agent, class),
        WalkOp::Join(caller, target) => engine.join(caller, target),
        WalkOp::Leave(agent) => {
            engine.leave(agent);
            Ok(())
        }
        WalkOp::Terminate(agent) => {
            engine.on_agent_terminated(agent);
            live.retain(|a| *a != agent);
            Ok(())
        }
        WalkOp::Fight(agent, creature, level) => engine.fight(agent, creature, level).map(|_| ()),
        WalkOp::Stats(agent) => engine.get_stats(agent).map(|_| ()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_harness_party() {
        let harness = PartyHarness::new();
        let agents = harness.party(&[
            CharacterClass::Fighter,
            CharacterClass::Mage,
            CharacterClass::Mage,
        ]);

        assert_roster(&harness, agents[0], &agents);
        assert_leader(&harness, agents[2], agents[0]);
        assert_invariants(&harness);
    }

    #[test]
    fn test_harness_levels() {
        let harness = PartyHarness::new();
        let a = harness.spawn_with(CharacterClass::Mage);
        let b = harness.spawn();
        assert_eq!(harness.level_of(a), Some(1));
        assert_eq!(harness.level_of(b), None);
        assert_no_character(&harness, b);
    }

    #[test]
    fn test_short_walk() {
        let summary = random_walk(7, 4, 200).unwrap();
        assert_eq!(summary.steps, 200);
    }
}
