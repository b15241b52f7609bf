//! Membership engine.
//!
//! Implements character creation, join, leave and the host lifecycle hooks on
//! top of the agent registry and party store. Every operation runs as a small
//! transaction:
//!
//! 1. read the leaders it needs without locking
//! 2. lock those leaders in ascending id order
//! 3. re-check under the locks that the leaders are still current
//! 4. mutate, or retry if something moved in between
//!
//! When an operation finds it has to promote a member it does not yet hold,
//! it widens the lock set and starts over before touching anything.

use crate::registry::{AgentRegistry, AgentSlot, PartyLocks, RegistryError};
use crate::party::Party;
use crate::rules::{self, Creature, FightReport};
use crate::session::AgentSession;
use crate::snapshot::{self, WorldSnapshot};
use crate::stats::{self, PartyStats, StatsSink};
use crate::world::{AgentId, Character, CharacterClass, MemberFlag};
use std::str::FromStr;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use thiserror::Error;
use tracing::{debug, info, trace, warn};

/// Upper bound on lock/validate rounds for a single operation.
const MAX_LOCK_ATTEMPTS: u32 = 1 << 16;

/// Errors returned to callers of the engine.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum PartyError {
    #[error("agent already has a character")]
    AlreadyExists,

    #[error("invalid argument: {0}")]
    InvalidArgument(&'static str),

    #[error("no such agent: {0}")]
    NoSuchAgent(AgentId),

    #[error("out of memory: character capacity exhausted")]
    OutOfMemory,

    #[error("bad address: stats could not be delivered")]
    BadAddress,
}

/// Errors from reading configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("invalid value for {name}: {value:?}")]
    Invalid { name: &'static str, value: String },

    #[error("{0} is not valid unicode")]
    NotUnicode(&'static str),
}

/// Configuration for a party engine.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EngineConfig {
    /// Level of a freshly created character.
    pub initial_level: u32,

    /// Maximum number of live characters. `None` is unlimited.
    pub max_characters: Option<usize>,

    /// First id handed out by [`PartyEngine::spawn_agent`].
    pub first_agent_id: u32,
}

impl EngineConfig {
    pub fn new() -> Self {
        Self {
            initial_level: 1,
            max_characters: None,
            first_agent_id: 1,
        }
    }

    /// Set the starting level for new characters.
    pub fn with_initial_level(mut self, level: u32) -> Self {
        self.initial_level = level;
        self
    }

    /// Cap the number of live characters.
    pub fn with_max_characters(mut self, max: usize) -> Self {
        self.max_characters = Some(max);
        self
    }

    /// Set the first id used when spawning agents.
    pub fn with_first_agent_id(mut self, id: u32) -> Self {
        self.first_agent_id = id;
        self
    }

    /// Build a config from `PARTY_*` environment variables.
    ///
    /// Unset variables keep their defaults.
    pub fn from_env() -> Result<Self, ConfigError> {
        let mut config = Self::new();
        if let Some(level) = env_var("PARTY_INITIAL_LEVEL")? {
            config.initial_level = level;
        }
        if let Some(max) = env_var("PARTY_MAX_CHARACTERS")? {
            config.max_characters = Some(max);
        }
        if let Some(first) = env_var("PARTY_FIRST_AGENT_ID")? {
            config.first_agent_id = first;
        }
        Ok(config)
    }
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self::new()
    }
}

fn env_var<T: FromStr>(name: &'static str) -> Result<Option<T>, ConfigError> {
    match std::env::var(name) {
        Ok(raw) => raw
            .trim()
            .parse()
            .map(Some)
            .map_err(|_| ConfigError::Invalid { name, value: raw }),
        Err(std::env::VarError::NotPresent) => Ok(None),
        Err(std::env::VarError::NotUnicode(_)) => Err(ConfigError::NotUnicode(name)),
    }
}

/// Outcome of one locked round of a transaction.
enum Attempt<T> {
    Done(T),
    /// A leader moved between reading and locking.
    Retry,
    /// Another leader must be locked as well.
    Widen(AgentId),
}

/// The party engine.
///
/// Shareable across threads; every operation takes `&self`.
#[derive(Debug)]
pub struct PartyEngine {
    config: EngineConfig,
    registry: AgentRegistry,
    characters: AtomicUsize,
}

impl PartyEngine {
    pub fn new(config: EngineConfig) -> Self {
        let registry = AgentRegistry::new(config.first_agent_id);
        Self {
            config,
            registry,
            characters: AtomicUsize::new(0),
        }
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn registry(&self) -> &AgentRegistry {
        &self.registry
    }

    /// Number of live characters.
    pub fn character_count(&self) -> usize {
        self.characters.load(Ordering::Acquire)
    }

    /// Per-agent view with the calling agent bound.
    pub fn session(&self, agent: AgentId) -> AgentSession<'_> {
        AgentSession::new(self, agent)
    }

    // ========================================================================
    // Host hooks
    // ========================================================================

    /// Register a new agent under the next free id.
    pub fn spawn_agent(&self, parent: Option<AgentId>) -> AgentId {
        loop {
            let id = self.registry.allocate_id();
            match self.on_agent_spawned(id, parent) {
                Ok(()) => return id,
                Err(RegistryError::DuplicateAgent(_)) => continue,
            }
        }
    }

    /// Host notification that `new` was created.
    ///
    /// The new agent leads itself, has never joined and owns nothing; nothing
    /// is inherited from `parent`.
    pub fn on_agent_spawned(
        &self,
        new: AgentId,
        parent: Option<AgentId>,
    ) -> Result<(), RegistryError> {
        self.registry.insert(new)?;
        match parent {
            Some(parent) => info!(agent = %new, parent = %parent, "agent spawned"),
            None => info!(agent = %new, "agent spawned"),
        }
        Ok(())
    }

    /// Host notification that `agent` exited.
    ///
    /// The agent's character is destroyed as by [`PartyEngine::leave`] and the
    /// agent is dropped from the registry. The host must not issue further
    /// calls on behalf of a terminated agent.
    pub fn on_agent_terminated(&self, agent: AgentId) {
        self.leave(agent);
        if self.registry.remove(agent).is_some() {
            info!(agent = %agent, "agent terminated");
        } else {
            warn!(agent = %agent, "termination for unknown agent");
        }
    }

    pub fn resolve_agent(&self, id: AgentId) -> Option<Arc<AgentSlot>> {
        self.registry.resolve(id)
    }

    // ========================================================================
    // Membership
    // ========================================================================

    /// Create a character for `agent`, who starts as leader of a party of one.
    pub fn create_character(
        &self,
        agent: AgentId,
        class: CharacterClass,
    ) -> Result<(), PartyError> {
        let slot = self.resolve_caller(agent)?;
        self.transact(
            "create_character",
            &[agent],
            || vec![slot.leader(), agent],
            |locks| {
                let Some(leader) = locks.leader_of(&slot) else {
                    return Attempt::Retry;
                };
                if has_character(locks, &slot) {
                    return Attempt::Done(Err(PartyError::AlreadyExists));
                }
                if leader != agent {
                    invariant_violation!("agent {agent} follows {leader} without a character");
                }
                if let Err(err) = self.reserve_character() {
                    return Attempt::Done(Err(err));
                }

                let character = Character::new(agent, class, self.config.initial_level);
                debug!(
                    agent = %agent,
                    class = %class,
                    character = %character.id,
                    "character created"
                );
                locks.party_mut(agent).push(character);
                slot.set_leader(agent);
                Attempt::Done(Ok(()))
            },
        )?
    }

    /// Move `caller`'s character into `target`'s party.
    ///
    /// Only the caller's character moves. A leader who joins elsewhere hands
    /// its remaining party to the oldest other member.
    pub fn join(&self, caller: AgentId, target: AgentId) -> Result<(), PartyError> {
        let target_slot = self
            .registry
            .resolve(target)
            .ok_or(PartyError::NoSuchAgent(target))?;
        let caller_slot = self.resolve_caller(caller)?;

        self.transact(
            "join",
            &[caller, target],
            || vec![caller_slot.leader(), target_slot.leader()],
            |locks| {
                let (Some(old_leader), Some(_)) =
                    (locks.leader_of(&caller_slot), locks.leader_of(&target_slot))
                else {
                    return Attempt::Retry;
                };
                if !has_character(locks, &caller_slot) || !has_character(locks, &target_slot) {
                    return Attempt::Done(Err(PartyError::InvalidArgument(
                        "both agents need a character to join",
                    )));
                }

                let character = if !caller_slot.member_flag().is_member() {
                    if old_leader != caller {
                        invariant_violation!(
                            "agent {caller} follows {old_leader} but never joined"
                        );
                    }
                    debug!(agent = %caller, target = %target, "first join from a solo party");
                    take_own_entry(locks, old_leader, caller)
                } else if old_leader == caller {
                    let promoted = locks.party(caller).first_other(caller);
                    if let Some(promoted) = promoted {
                        if !locks.holds(promoted) {
                            return Attempt::Widen(promoted);
                        }
                    }
                    let character = take_own_entry(locks, caller, caller);
                    if let Some(promoted) = promoted {
                        self.promote(locks, caller, promoted);
                    }
                    debug!(agent = %caller, target = %target, "leader left its party to join");
                    character
                } else {
                    debug!(
                        agent = %caller,
                        leader = %old_leader,
                        target = %target,
                        "member switching parties"
                    );
                    take_own_entry(locks, old_leader, caller)
                };

                // A promotion may have put the target under a new leader.
                let Some(new_leader) = locks.leader_of(&target_slot) else {
                    invariant_violation!("join target {target} moved to an unlocked leader");
                };
                locks.party_mut(new_leader).push(character);
                caller_slot.set_leader(new_leader);
                caller_slot.set_member_flag(MemberFlag::Member);
                target_slot.set_member_flag(MemberFlag::Member);
                debug!(
                    agent = %caller,
                    leader = %new_leader,
                    size = locks.party(new_leader).len(),
                    "joined party"
                );
                Attempt::Done(Ok(()))
            },
        )?
    }

    /// Destroy `agent`'s character and remove it from its party.
    ///
    /// A departing leader hands the party to the oldest remaining member. The
    /// agent stays registered and may create a new character afterwards.
    /// Agents without a character are left untouched.
    pub fn leave(&self, agent: AgentId) {
        let Some(slot) = self.registry.resolve(agent) else {
            debug!(agent = %agent, "leave for unknown agent");
            return;
        };

        let outcome = self.transact(
            "leave",
            &[agent],
            || vec![slot.leader(), agent],
            |locks| {
                let Some(leader) = locks.leader_of(&slot) else {
                    return Attempt::Retry;
                };
                if !has_character(locks, &slot) {
                    return Attempt::Done(());
                }

                let character = if leader != agent {
                    take_own_entry(locks, leader, agent)
                } else if slot.member_flag().is_member() {
                    let promoted = locks.party(agent).first_other(agent);
                    if let Some(promoted) = promoted {
                        if !locks.holds(promoted) {
                            return Attempt::Widen(promoted);
                        }
                    }
                    let character = take_own_entry(locks, agent, agent);
                    if let Some(promoted) = promoted {
                        self.promote(locks, agent, promoted);
                    }
                    character
                } else {
                    let character = take_own_entry(locks, agent, agent);
                    if !locks.party(agent).is_empty() {
                        invariant_violation!("agent {agent} never joined but leads others");
                    }
                    character
                };

                slot.set_leader(agent);
                slot.set_member_flag(MemberFlag::NotAMember);
                self.destroy(character, leader);
                Attempt::Done(())
            },
        );
        if let Err(err) = outcome {
            debug!(agent = %agent, error = %err, "agent vanished during leave");
        }
    }

    // ========================================================================
    // Combat and stats
    // ========================================================================

    /// Fight a creature with the caller's whole party.
    pub fn fight(
        &self,
        agent: AgentId,
        creature: Creature,
        level: i64,
    ) -> Result<FightReport, PartyError> {
        let creature_level = u64::try_from(level)
            .map_err(|_| PartyError::InvalidArgument("creature level must not be negative"))?;
        let slot = self.resolve_caller(agent)?;

        self.transact(
            "fight",
            &[agent],
            || vec![slot.leader()],
            |locks| {
                let Some(leader) = locks.leader_of(&slot) else {
                    return Attempt::Retry;
                };
                if !has_character(locks, &slot) {
                    return Attempt::Done(Err(PartyError::InvalidArgument(
                        "agent has no character",
                    )));
                }
                let report =
                    rules::resolve_fight(locks.party_mut(leader), creature, creature_level);
                debug!(
                    agent = %agent,
                    leader = %leader,
                    creature = %creature,
                    level = creature_level,
                    strength = report.strength,
                    outcome = ?report.outcome,
                    "fight resolved"
                );
                Attempt::Done(Ok(report))
            },
        )?
    }

    /// Stats of the caller's character and party.
    pub fn get_stats(&self, agent: AgentId) -> Result<PartyStats, PartyError> {
        let slot = self.resolve_caller(agent)?;
        self.transact(
            "get_stats",
            &[agent],
            || vec![slot.leader()],
            |locks| {
                let Some(leader) = locks.leader_of(&slot) else {
                    return Attempt::Retry;
                };
                if !has_character(locks, &slot) {
                    return Attempt::Done(Err(PartyError::InvalidArgument(
                        "agent has no character",
                    )));
                }
                match stats::report(locks.party(leader), agent) {
                    Some(stats) => Attempt::Done(Ok(stats)),
                    None => {
                        invariant_violation!("agent {agent} missing from the party of {leader}")
                    }
                }
            },
        )?
    }

    /// Compute the caller's stats and hand them to `sink`.
    ///
    /// Nothing is mutated, so a failed delivery can simply be retried.
    pub fn get_stats_into<S>(&self, agent: AgentId, sink: &mut S) -> Result<(), PartyError>
    where
        S: StatsSink + ?Sized,
    {
        let stats = self.get_stats(agent)?;
        sink.deliver(&stats).map_err(|err| {
            warn!(agent = %agent, error = %err, "stats delivery failed");
            PartyError::BadAddress
        })
    }

    // ========================================================================
    // Queries
    // ========================================================================

    /// Whether `agent` currently owns a character.
    pub fn has_character(&self, agent: AgentId) -> bool {
        let Some(slot) = self.registry.resolve(agent) else {
            return false;
        };
        self.transact(
            "has_character",
            &[agent],
            || vec![slot.leader()],
            |locks| match locks.leader_of(&slot) {
                Some(_) => Attempt::Done(has_character(locks, &slot)),
                None => Attempt::Retry,
            },
        )
        .unwrap_or(false)
    }

    /// The agent's leader together with a copy of that leader's party.
    pub fn party_of(&self, agent: AgentId) -> Result<(AgentId, Party), PartyError> {
        let slot = self.resolve_caller(agent)?;
        self.transact(
            "party_of",
            &[agent],
            || vec![slot.leader()],
            |locks| match locks.leader_of(&slot) {
                Some(leader) => Attempt::Done((leader, locks.party(leader).clone())),
                None => Attempt::Retry,
            },
        )
    }

    /// Consistent copy of every agent and party.
    pub fn snapshot(&self) -> WorldSnapshot {
        snapshot::capture(&self.registry)
    }

    // ========================================================================
    // Internals
    // ========================================================================

    fn resolve_caller(&self, agent: AgentId) -> Result<Arc<AgentSlot>, PartyError> {
        self.registry
            .resolve(agent)
            .ok_or(PartyError::NoSuchAgent(agent))
    }

    /// Run `body` with the leaders named by `wanted` locked.
    ///
    /// `named` lists the agents the caller asked about. If one of them leaves
    /// the registry mid-operation the transaction ends with `NoSuchAgent`
    /// instead of waiting on a leader that will never come back.
    fn transact<T>(
        &self,
        op: &'static str,
        named: &[AgentId],
        mut wanted: impl FnMut() -> Vec<AgentId>,
        mut body: impl FnMut(&mut PartyLocks<'_>) -> Attempt<T>,
    ) -> Result<T, PartyError> {
        let mut extra: Vec<AgentId> = Vec::new();
        for attempt in 1..=MAX_LOCK_ATTEMPTS {
            let mut ids = wanted();
            ids.extend_from_slice(&extra);
            let Some(slots) = self.registry.resolve_sorted(&ids) else {
                if let Some(gone) = self.first_unregistered(named) {
                    debug!(op, agent = %gone, "agent vanished before locking");
                    return Err(PartyError::NoSuchAgent(gone));
                }
                trace!(op, attempt, "leader vanished before locking; retrying");
                extra.clear();
                continue;
            };

            let mut locks = PartyLocks::acquire(&slots);
            match body(&mut locks) {
                Attempt::Done(value) => return Ok(value),
                Attempt::Retry => trace!(op, attempt, "leader changed while locking; retrying"),
                Attempt::Widen(leader) => {
                    trace!(op, attempt, leader = %leader, "widening lock set");
                    extra.push(leader);
                }
            }
        }
        invariant_violation!("{op}: party locks did not settle after {MAX_LOCK_ATTEMPTS} attempts")
    }

    fn first_unregistered(&self, agents: &[AgentId]) -> Option<AgentId> {
        agents
            .iter()
            .copied()
            .find(|agent| self.registry.resolve(*agent).is_none())
    }

    /// Hand `old_leader`'s remaining party to `promoted` and re-point everyone.
    fn promote(&self, locks: &mut PartyLocks<'_>, old_leader: AgentId, promoted: AgentId) {
        let remaining = locks.party_mut(old_leader).take();
        let destination = locks.party_mut(promoted);
        if !destination.is_empty() {
            invariant_violation!("promoted agent {promoted} already owns a party");
        }
        destination.absorb(remaining);

        for member in locks.party(promoted).owners() {
            match self.registry.resolve(member) {
                Some(slot) => slot.set_leader(promoted),
                None => invariant_violation!("party member {member} is not registered"),
            }
        }
        debug!(
            old_leader = %old_leader,
            leader = %promoted,
            size = locks.party(promoted).len(),
            "leadership handed over"
        );
    }

    fn reserve_character(&self) -> Result<(), PartyError> {
        let max = self.config.max_characters;
        self.characters
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |live| match max {
                Some(max) if live >= max => None,
                _ => Some(live + 1),
            })
            .map(|_| ())
            .map_err(|live| {
                warn!(live, "character capacity exhausted");
                PartyError::OutOfMemory
            })
    }

    fn destroy(&self, character: Character, leader: AgentId) {
        self.characters.fetch_sub(1, Ordering::AcqRel);
        debug!(
            agent = %character.owner,
            leader = %leader,
            character = %character.id,
            level = character.level,
            "character destroyed"
        );
    }
}

/// Whether `agent` owns a character. Its leader must be locked.
fn has_character(locks: &PartyLocks<'_>, agent: &AgentSlot) -> bool {
    agent.member_flag().is_member() || (agent.is_leader() && !locks.party(agent.id()).is_empty())
}

/// Remove `agent`'s entry from `leader`'s party, which must contain it.
fn take_own_entry(locks: &mut PartyLocks<'_>, leader: AgentId, agent: AgentId) -> Character {
    match locks.party_mut(leader).remove_owner(agent) {
        Some(character) => character,
        None => invariant_violation!("agent {agent} has no entry in the party of {leader}"),
    }
}
