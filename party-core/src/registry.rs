//! Agent registry and party locks.
//!
//! The registry maps agent ids to the state the engine owns for each agent.
//! Every agent slot carries the party sequence it owns as a leader behind its
//! own mutex. That mutex guards the whole party: the sequence itself plus the
//! `leader` and `member` fields of every agent whose leader is this slot.
//!
//! `leader` and `member` are atomics so lock discovery can read them without
//! holding anything. A read is only trusted after the named leader's lock has
//! been taken and the field re-read; writes happen only while both the old
//! and the new leader are locked.

use crate::party::Party;
use crate::world::{AgentId, MemberFlag};
use parking_lot::{Mutex, MutexGuard, RwLock};
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::sync::Arc;
use thiserror::Error;

/// Errors from host-side registry operations.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum RegistryError {
    #[error("agent {0} is already registered")]
    DuplicateAgent(AgentId),
}

/// Engine-visible state of one agent.
#[derive(Debug)]
pub struct AgentSlot {
    id: AgentId,
    leader: AtomicU32,
    member: AtomicBool,
    party: Mutex<Party>,
}

impl AgentSlot {
    /// A fresh agent: its own leader, never joined, owning an empty sequence.
    fn new(id: AgentId) -> Self {
        Self {
            id,
            leader: AtomicU32::new(id.raw()),
            member: AtomicBool::new(false),
            party: Mutex::new(Party::new()),
        }
    }

    pub fn id(&self) -> AgentId {
        self.id
    }

    /// Current leader. Unlocked callers get a hint, not a fact.
    pub fn leader(&self) -> AgentId {
        AgentId(self.leader.load(Ordering::Acquire))
    }

    pub fn member_flag(&self) -> MemberFlag {
        MemberFlag::from_bool(self.member.load(Ordering::Acquire))
    }

    pub fn is_leader(&self) -> bool {
        self.leader() == self.id
    }

    /// Caller must hold the old and the new leader's locks.
    pub(crate) fn set_leader(&self, leader: AgentId) {
        self.leader.store(leader.raw(), Ordering::Release);
    }

    /// Caller must hold this agent's leader lock.
    pub(crate) fn set_member_flag(&self, flag: MemberFlag) {
        self.member.store(flag.is_member(), Ordering::Release);
    }
}

/// Registry of live agents.
#[derive(Debug)]
pub struct AgentRegistry {
    next_id: AtomicU32,
    agents: RwLock<HashMap<AgentId, Arc<AgentSlot>>>,
}

impl AgentRegistry {
    pub fn new(first_id: u32) -> Self {
        Self {
            next_id: AtomicU32::new(first_id),
            agents: RwLock::new(HashMap::new()),
        }
    }

    /// Hand out the next id not currently registered.
    pub fn allocate_id(&self) -> AgentId {
        loop {
            let id = AgentId(self.next_id.fetch_add(1, Ordering::Relaxed));
            if !self.agents.read().contains_key(&id) {
                return id;
            }
        }
    }

    pub fn insert(&self, id: AgentId) -> Result<Arc<AgentSlot>, RegistryError> {
        let mut agents = self.agents.write();
        if agents.contains_key(&id) {
            return Err(RegistryError::DuplicateAgent(id));
        }
        let slot = Arc::new(AgentSlot::new(id));
        agents.insert(id, Arc::clone(&slot));
        Ok(slot)
    }

    pub fn remove(&self, id: AgentId) -> Option<Arc<AgentSlot>> {
        self.agents.write().remove(&id)
    }

    pub fn resolve(&self, id: AgentId) -> Option<Arc<AgentSlot>> {
        self.agents.read().get(&id).cloned()
    }

    /// Resolve a set of ids in ascending, de-duplicated order.
    ///
    /// Returns `None` if any id is not registered.
    pub fn resolve_sorted(&self, ids: &[AgentId]) -> Option<Vec<Arc<AgentSlot>>> {
        let mut ids = ids.to_vec();
        ids.sort_unstable();
        ids.dedup();
        let agents = self.agents.read();
        ids.iter().map(|id| agents.get(id).cloned()).collect()
    }

    /// Every registered agent in ascending id order.
    pub fn all_sorted(&self) -> Vec<Arc<AgentSlot>> {
        let mut slots: Vec<_> = self.agents.read().values().cloned().collect();
        slots.sort_unstable_by_key(|slot| slot.id());
        slots
    }

    pub fn len(&self) -> usize {
        self.agents.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.agents.read().is_empty()
    }
}

/// A set of held party locks, always taken in ascending agent order.
pub(crate) struct PartyLocks<'a> {
    held: Vec<(AgentId, MutexGuard<'a, Party>)>,
}

impl<'a> PartyLocks<'a> {
    /// Lock every slot in order. `slots` must be sorted and de-duplicated.
    pub(crate) fn acquire(slots: &'a [Arc<AgentSlot>]) -> Self {
        debug_assert!(slots.windows(2).all(|w| w[0].id() < w[1].id()));
        let held = slots
            .iter()
            .map(|slot| (slot.id(), slot.party.lock()))
            .collect();
        Self { held }
    }

    pub(crate) fn holds(&self, leader: AgentId) -> bool {
        self.index(leader).is_some()
    }

    /// The agent's leader, if that leader's lock is held.
    ///
    /// Under the lock the answer cannot change until the locks are dropped.
    pub(crate) fn leader_of(&self, agent: &AgentSlot) -> Option<AgentId> {
        let leader = agent.leader();
        self.holds(leader).then_some(leader)
    }

    pub(crate) fn party(&self, leader: AgentId) -> &Party {
        match self.index(leader) {
            Some(i) => &self.held[i].1,
            None => invariant_violation!("party of {leader} used without its lock"),
        }
    }

    pub(crate) fn party_mut(&mut self, leader: AgentId) -> &mut Party {
        match self.index(leader) {
            Some(i) => &mut self.held[i].1,
            None => invariant_violation!("party of {leader} mutated without its lock"),
        }
    }

    fn index(&self, leader: AgentId) -> Option<usize> {
        self.held.binary_search_by_key(&leader, |(id, _)| *id).ok()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fresh_slot_leads_itself() {
        let registry = AgentRegistry::new(1);
        let slot = registry.insert(AgentId(3)).unwrap();
        assert_eq!(slot.leader(), AgentId(3));
        assert!(slot.is_leader());
        assert_eq!(slot.member_flag(), MemberFlag::NotAMember);
    }

    #[test]
    fn test_duplicate_insert() {
        let registry = AgentRegistry::new(1);
        registry.insert(AgentId(3)).unwrap();
        assert_eq!(
            registry.insert(AgentId(3)).unwrap_err(),
            RegistryError::DuplicateAgent(AgentId(3))
        );
    }

    #[test]
    fn test_allocate_skips_registered() {
        let registry = AgentRegistry::new(1);
        registry.insert(AgentId(1)).unwrap();
        registry.insert(AgentId(2)).unwrap();
        assert_eq!(registry.allocate_id(), AgentId(3));
        assert_eq!(registry.allocate_id(), AgentId(4));
    }

    #[test]
    fn test_resolve_sorted() {
        let registry = AgentRegistry::new(1);
        for raw in [5, 2, 9] {
            registry.insert(AgentId(raw)).unwrap();
        }
        let slots = registry
            .resolve_sorted(&[AgentId(9), AgentId(2), AgentId(9)])
            .unwrap();
        let ids: Vec<_> = slots.iter().map(|s| s.id()).collect();
        assert_eq!(ids, vec![AgentId(2), AgentId(9)]);

        assert!(registry.resolve_sorted(&[AgentId(2), AgentId(4)]).is_none());
    }

    #[test]
    fn test_locks_report_held_leaders() {
        let registry = AgentRegistry::new(1);
        let a = registry.insert(AgentId(1)).unwrap();
        let b = registry.insert(AgentId(2)).unwrap();
        b.set_leader(AgentId(1));

        let slots = registry.resolve_sorted(&[AgentId(1)]).unwrap();
        let locks = PartyLocks::acquire(&slots);
        assert_eq!(locks.leader_of(&a), Some(AgentId(1)));
        assert_eq!(locks.leader_of(&b), Some(AgentId(1)));
        assert!(!locks.holds(AgentId(2)));
        assert!(locks.party(AgentId(1)).is_empty());
    }
}
