//! QA tests driving seeded random operation sequences.
//!
//! Every step is followed by a full invariant check of the world.
//! Run with: `cargo test -p party-core --test qa_invariants`

use party_core::testing::random_walk;

#[test]
fn test_random_walks_keep_invariants() {
    for seed in 0..16 {
        let summary = random_walk(seed, 6, 400)
            .unwrap_or_else(|failure| panic!("seed {seed} broke the world: {failure:?}"));
        assert_eq!(summary.steps, 400);
    }
}

#[test]
fn test_crowded_walk_joins_often() {
    let summary = random_walk(0xDEAD_BEEF, 24, 2_000).unwrap();
    assert!(summary.joins > 0, "no join succeeded in {summary:?}");
    assert!(summary.terminated > 0, "nobody terminated in {summary:?}");
}

#[test]
fn test_tiny_world_walk() {
    // A single agent mostly exercises self-joins and re-creation.
    let summary = random_walk(3, 1, 500).unwrap();
    assert_eq!(summary.steps, 500);
}

#[test]
fn test_walks_are_reproducible() {
    assert_eq!(random_walk(11, 8, 300), random_walk(11, 8, 300));
}
