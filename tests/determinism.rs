//! Property tests for the engine's determinism guarantees: plan and drift
//! stability, no-op idempotence, fingerprint order-independence, the reset
//! threshold policy, and the topological invariant.

mod common;

use std::collections::BTreeMap;

use proptest::prelude::*;

use cadenza::checkout::plan::build_checkout_plan;
use cadenza::config::EngineConfig;
use cadenza::drift::compute_drift;
use cadenza::graph;
use cadenza::model::{MidiNote, ProjectId, RegionId, Snapshot, VariationId};
use cadenza::store::VariationRepository as _;
use cadenza::store::memory::MemoryRepository;

use common::commit;

fn pid() -> ProjectId {
    ProjectId::new("prop").unwrap()
}

fn vid(s: &str) -> VariationId {
    VariationId::new(s).unwrap()
}

fn region() -> RegionId {
    RegionId::new("r1").unwrap()
}

/// Notes deduplicated by identity (pitch, quarter-beat start) so matcher
/// identities are unambiguous.
fn arb_notes() -> impl Strategy<Value = Vec<MidiNote>> {
    proptest::collection::btree_map(
        (0u8..=127, 0u32..64),
        (1u32..16, 0u8..=127),
        0..24,
    )
    .prop_map(|entries| {
        entries
            .into_iter()
            .map(|((pitch, start_q), (dur_q, velocity))| {
                MidiNote::new(
                    pitch,
                    f64::from(start_q) * 0.25,
                    f64::from(dur_q) * 0.25,
                    velocity,
                )
            })
            .collect()
    })
}

fn snapshot_of(notes: Vec<MidiNote>) -> Snapshot {
    let mut snapshot = Snapshot::new();
    snapshot.notes.insert(region(), notes);
    snapshot
}

proptest! {
    #[test]
    fn plan_of_snapshot_against_itself_is_noop(notes in arb_notes()) {
        let snapshot = snapshot_of(notes);
        let plan = build_checkout_plan(
            &pid(),
            &vid("target"),
            &snapshot,
            &snapshot.clone(),
            &EngineConfig::default(),
        );
        prop_assert!(plan.is_noop);
        prop_assert!(plan.operations.is_empty());
    }

    #[test]
    fn plan_is_deterministic(target in arb_notes(), working in arb_notes()) {
        let target = snapshot_of(target);
        let working = snapshot_of(working);
        let config = EngineConfig::default();
        let a = build_checkout_plan(&pid(), &vid("t"), &target, &working, &config);
        let b = build_checkout_plan(&pid(), &vid("t"), &target, &working, &config);
        prop_assert_eq!(a.plan_hash(), b.plan_hash());
        prop_assert_eq!(a, b);
    }

    #[test]
    fn fingerprint_ignores_event_order(notes in arb_notes()) {
        let forward = snapshot_of(notes.clone());
        let mut reversed_notes = notes;
        reversed_notes.reverse();
        let reversed = snapshot_of(reversed_notes);
        prop_assert_eq!(
            forward.region_fingerprint(&region()),
            reversed.region_fingerprint(&region())
        );
    }

    #[test]
    fn fingerprint_changes_when_any_velocity_changes(notes in arb_notes(), idx: usize) {
        prop_assume!(!notes.is_empty());
        let i = idx % notes.len();
        let mut mutated = notes.clone();
        mutated[i].velocity = mutated[i].velocity.wrapping_add(1) & 0x7f;
        prop_assume!(mutated[i].velocity != notes[i].velocity);

        let a = snapshot_of(notes);
        let b = snapshot_of(mutated);
        prop_assert_ne!(
            a.region_fingerprint(&region()),
            b.region_fingerprint(&region())
        );
    }

    #[test]
    fn pure_additions_below_threshold_never_clear(notes in arb_notes()) {
        prop_assume!(notes.len() < 20);
        let target = snapshot_of(notes);
        let working = Snapshot::new();
        let plan = build_checkout_plan(
            &pid(),
            &vid("t"),
            &target,
            &working,
            &EngineConfig::default(),
        );
        prop_assert!(
            plan.operations
                .iter()
                .all(|op| op.tool_name() != "clear_notes")
        );
        prop_assert!(plan.regions_reset.is_empty());
    }

    #[test]
    fn any_removal_always_clears(notes in arb_notes()) {
        prop_assume!(!notes.is_empty());
        // Working carries everything the target has plus one extra note at
        // an identity no generated note occupies (start beat 100).
        let mut working_notes = notes.clone();
        working_notes.push(MidiNote::new(0, 100.0, 1.0, 1));
        let target = snapshot_of(notes);
        let working = snapshot_of(working_notes);

        let plan = build_checkout_plan(
            &pid(),
            &vid("t"),
            &target,
            &working,
            &EngineConfig::default(),
        );
        prop_assert!(plan.regions_reset.contains(&region()));
        prop_assert_eq!(plan.operations[0].tool_name(), "clear_notes");
    }

    #[test]
    fn drift_is_deterministic(head in arb_notes(), working in arb_notes()) {
        let head = snapshot_of(head);
        let working = snapshot_of(working);
        let config = EngineConfig::default();
        let a = compute_drift(&pid(), &vid("h"), &head, &working, &config);
        let b = compute_drift(&pid(), &vid("h"), &head, &working, &config);
        prop_assert_eq!(a, b);
    }

    #[test]
    fn topological_order_is_stable_and_valid(
        shape in proptest::collection::vec((any::<u16>(), any::<u8>(), any::<bool>()), 1..12)
    ) {
        // Build a random DAG: each commit may pick any earlier commit as
        // its parent, timestamps are arbitrary (ties exercised via u16).
        let mut repo = MemoryRepository::new();
        for (i, (ts, parent_seed, has_parent)) in shape.iter().enumerate() {
            let parent = if *has_parent && i > 0 {
                Some(format!("c{}", usize::from(*parent_seed) % i))
            } else {
                None
            };
            let v = commit(
                &format!("c{i}"),
                parent.as_deref(),
                u64::from(*ts),
                Vec::new(),
            );
            repo.save_variation(&pid(), v).unwrap();
        }

        let a = graph::build(&repo, &pid()).unwrap();
        let b = graph::build(&repo, &pid()).unwrap();
        prop_assert_eq!(&a, &b);

        // Every node appears once; every parent precedes its children.
        let positions: BTreeMap<&str, usize> = a
            .nodes
            .iter()
            .enumerate()
            .map(|(i, n)| (n.id.as_str(), i))
            .collect();
        prop_assert_eq!(positions.len(), shape.len());
        for node in &a.nodes {
            for parent in [&node.parent, &node.parent2].into_iter().flatten() {
                prop_assert!(positions[parent.as_str()] < positions[node.id.as_str()]);
            }
        }
    }
}
