//! QA tests for fights and stats.
//!
//! Run with: `cargo test -p party-core --test qa_combat`

use party_core::testing::{assert_invariants, PartyHarness};
use party_core::{
    AgentId, CharacterClass, Creature, EngineConfig, FightOutcome, PartyError, PartyStats,
};

use CharacterClass::{Fighter, Mage};

/// Raise a solo character to `level` with fights it is sure to win.
fn train(harness: &PartyHarness, agent: AgentId, creature: Creature, level: u32) {
    while harness.level_of(agent).unwrap_or(0) < level {
        let outcome = harness.session(agent).fight(creature, 0).unwrap();
        assert_eq!(outcome, FightOutcome::Win);
    }
}

// =============================================================================
// TEST 1: Solo fights
// =============================================================================

#[test]
fn test_fighter_beats_orc_at_double_weight() {
    let harness = PartyHarness::new();
    let fighter = harness.spawn_with(Fighter);
    train(&harness, fighter, Creature::Orc, 2);

    // 2 * 2 = 4 against level 3.
    let outcome = harness.session(fighter).fight(Creature::Orc, 3).unwrap();

    assert_eq!(outcome, FightOutcome::Win);
    assert_eq!(harness.level_of(fighter), Some(3));
}

#[test]
fn test_mage_loses_to_strong_demon() {
    let harness = PartyHarness::new();
    let mage = harness.spawn_with(Mage);
    train(&harness, mage, Creature::Demon, 2);

    // 2 * 2 = 4 against level 10.
    let outcome = harness.session(mage).fight(Creature::Demon, 10).unwrap();

    assert_eq!(outcome, FightOutcome::Lose);
    assert_eq!(harness.level_of(mage), Some(1));
}

#[test]
fn test_strength_ties_are_wins() {
    let harness = PartyHarness::new();
    let mage = harness.spawn_with(Mage);

    // Mage against Orc has weight 1, so strength is exactly 1.
    let report = harness.engine.fight(mage, Creature::Orc, 1).unwrap();

    assert_eq!(report.strength, 1);
    assert_eq!(report.outcome, FightOutcome::Win);
}

#[test]
fn test_level_never_drops_below_zero() {
    let harness = PartyHarness::new();
    let mage = harness.spawn_with(Mage);

    assert_eq!(harness.session(mage).fight(Creature::Orc, 50).unwrap(), FightOutcome::Lose);
    assert_eq!(harness.level_of(mage), Some(0));
    assert_eq!(harness.session(mage).fight(Creature::Orc, 50).unwrap(), FightOutcome::Lose);
    assert_eq!(harness.level_of(mage), Some(0));

    // A level-zero party still beats a level-zero creature.
    assert_eq!(harness.session(mage).fight(Creature::Demon, 0).unwrap(), FightOutcome::Win);
    assert_eq!(harness.level_of(mage), Some(1));
}

#[test]
fn test_fight_argument_errors() {
    let harness = PartyHarness::new();
    let bare = harness.spawn();
    let fighter = harness.spawn_with(Fighter);

    assert!(matches!(
        harness.session(bare).fight(Creature::Orc, 1),
        Err(PartyError::InvalidArgument(_))
    ));
    assert!(matches!(
        harness.session(fighter).fight(Creature::Orc, -1),
        Err(PartyError::InvalidArgument(_))
    ));
    assert_eq!(harness.level_of(fighter), Some(1));
}

// =============================================================================
// TEST 2: Party fights
// =============================================================================

#[test]
fn test_any_member_fights_for_the_whole_party() {
    let harness = PartyHarness::new();
    let party = harness.party(&[Fighter, Mage, Mage]);

    // Against a Demon: 1 + 2 + 2 = 5.
    let report = harness.engine.fight(party[2], Creature::Demon, 5).unwrap();
    assert_eq!(report.strength, 5);
    assert!(report.outcome.is_win());

    for agent in &party {
        assert_eq!(harness.level_of(*agent), Some(2));
    }
    assert_invariants(&harness);
}

#[test]
fn test_party_loss_hits_everyone() {
    let harness = PartyHarness::new();
    let party = harness.party(&[Fighter, Mage]);
    let outsider = harness.spawn_with(Fighter);

    let outcome = harness.session(party[0]).fight(Creature::Orc, 100).unwrap();

    assert_eq!(outcome, FightOutcome::Lose);
    assert_eq!(harness.level_of(party[0]), Some(0));
    assert_eq!(harness.level_of(party[1]), Some(0));
    assert_eq!(harness.level_of(outsider), Some(1));
}

#[test]
fn test_levels_travel_with_the_character() {
    let harness = PartyHarness::new();
    let fighter = harness.spawn_with(Fighter);
    train(&harness, fighter, Creature::Orc, 4);
    let mage = harness.spawn_with(Mage);

    harness.join(fighter, mage).unwrap();

    let stats = harness.session(mage).get_stats().unwrap();
    assert_eq!(stats.level, 1);
    assert_eq!(stats.party_size, 2);
    assert_eq!(stats.fighter_levels, 4);
    assert_eq!(stats.mage_levels, 1);
}

// =============================================================================
// TEST 3: Stats
// =============================================================================

#[test]
fn test_stats_are_the_callers_own() {
    let harness = PartyHarness::new();
    let party = harness.party(&[Mage, Fighter, Fighter]);
    train(&harness, party[0], Creature::Orc, 2);

    let stats = harness.session(party[1]).get_stats().unwrap();

    assert_eq!(stats.class, Fighter);
    assert_eq!(stats.level, 2);
    assert_eq!(stats.party_size, 3);
    assert_eq!(stats.fighter_levels, 4);
    assert_eq!(stats.mage_levels, 2);
}

#[test]
fn test_initial_level_from_config() {
    let harness = PartyHarness::with_config(EngineConfig::new().with_initial_level(0));
    let mage = harness.spawn_with(Mage);

    let stats = harness.session(mage).get_stats().unwrap();
    assert_eq!(stats.level, 0);
    assert_eq!(stats.mage_levels, 0);

    assert_eq!(harness.session(mage).fight(Creature::Demon, 1).unwrap(), FightOutcome::Lose);
    assert_eq!(harness.level_of(mage), Some(0));
}

#[test]
fn test_stats_into_a_collecting_sink() {
    let harness = PartyHarness::new();
    let party = harness.party(&[Fighter, Mage]);
    let mut collected: Vec<PartyStats> = Vec::new();

    for agent in &party {
        harness.session(*agent).get_stats_into(&mut collected).unwrap();
    }

    assert_eq!(collected.len(), 2);
    assert_eq!(collected[0].class, Fighter);
    assert_eq!(collected[1].class, Mage);
    assert!(collected.iter().all(|s| s.party_size == 2));
}
