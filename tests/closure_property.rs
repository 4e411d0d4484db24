//! Property test for the closure-correctness invariant (spec §8: "ancestors(c)
//! equals the set of nodes reachable from c via active ISA edges of the
//! selected form. Random graphs of <=10k concepts verify this property").
//! Runs over smaller seeded random DAGs than the spec's upper bound, trading
//! graph size for proptest's shrink-on-failure iteration count; the
//! reference BFS below is what a correctness bug would have to diverge from.

use std::collections::{HashMap, HashSet};

use proptest::prelude::*;
use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;

use snowcore::ids::ComponentId;
use snowcore::model::{BranchPath, CharacteristicType, ComponentVersion, Relationship, ISA_TYPE_ID};
use snowcore::semantic_index::SemanticIndex;

/// Builds a random DAG on `n` nodes: node `i` may point (ISA) at any node
/// `j < i`, each included independently with probability `density`. Edges
/// only ever point to lower-numbered nodes, so the graph is acyclic by
/// construction — this is a closure-correctness property test, not a cycle
/// detector (that's covered separately in `semantic_index::tests`).
fn random_dag(seed: u64, n: usize, density: f64) -> Vec<Relationship> {
    let mut rng = ChaCha8Rng::seed_from_u64(seed);
    let mut rels = Vec::new();
    let mut next_rel_id = 1u64;
    for i in 1..n {
        for j in 0..i {
            if rng.gen_bool(density) {
                rels.push(isa_relationship(next_rel_id, i as u64, j as u64));
                next_rel_id += 1;
            }
        }
    }
    rels
}

fn isa_relationship(id: u64, source: u64, dest: u64) -> Relationship {
    Relationship {
        relationship_id: ComponentId(id),
        source_id: ComponentId(source),
        destination_id: ComponentId(dest),
        type_id: ComponentId(ISA_TYPE_ID),
        group: 0,
        characteristic_type: CharacteristicType::Inferred,
        modifier_id: ComponentId(900000000000451002),
        version: ComponentVersion {
            path: BranchPath::main(),
            start: 1,
            end: None,
            active: true,
            module_id: ComponentId(900000000000207008),
            effective_time: None,
            release_hash: None,
            released_effective_time: None,
            deleted: false,
        },
    }
}

/// Reference ancestor computation: plain reachability BFS over the direct
/// ISA parent edges, independent of `SemanticIndex`'s incremental machinery.
fn reference_ancestors(n: usize, rels: &[Relationship]) -> HashMap<ComponentId, HashSet<ComponentId>> {
    let mut parents: HashMap<ComponentId, Vec<ComponentId>> = HashMap::new();
    for r in rels {
        parents.entry(r.source_id).or_default().push(r.destination_id);
    }
    let mut out = HashMap::new();
    for i in 0..n {
        let id = ComponentId(i as u64);
        let mut seen = HashSet::new();
        let mut stack: Vec<ComponentId> = parents.get(&id).cloned().unwrap_or_default();
        while let Some(p) = stack.pop() {
            if seen.insert(p) {
                stack.extend(parents.get(&p).cloned().unwrap_or_default());
            }
        }
        out.insert(id, seen);
    }
    out
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(32))]

    #[test]
    fn full_rebuild_matches_reference_closure(seed in any::<u64>(), n in 1usize..60, density in 0.05f64..0.6) {
        let rels = random_dag(seed, n, density);
        let all: Vec<ComponentId> = (0..n as u64).map(ComponentId).collect();

        let index = SemanticIndex::new();
        let path = BranchPath::main();
        index.full_rebuild(&path, false, &all, &rels).unwrap();

        let expected = reference_ancestors(n, &rels);
        for id in &all {
            let row = index.get(&path, *id, false).unwrap();
            let actual: HashSet<ComponentId> = row.map(|r| r.ancestors).unwrap_or_default();
            prop_assert_eq!(&actual, expected.get(id).unwrap());
        }
    }

    #[test]
    fn incremental_update_matches_full_rebuild(seed in any::<u64>(), n in 1usize..40, density in 0.05f64..0.5) {
        let rels = random_dag(seed, n, density);
        let all: Vec<ComponentId> = (0..n as u64).map(ComponentId).collect();
        let dirty: HashSet<ComponentId> = all.iter().copied().collect();

        let incremental = SemanticIndex::new();
        incremental.incremental_update(&BranchPath::main(), false, &dirty, &rels).unwrap();

        let rebuilt = SemanticIndex::new();
        rebuilt.full_rebuild(&BranchPath::main(), false, &all, &rels).unwrap();

        for id in &all {
            let a = incremental.get(&BranchPath::main(), *id, false).unwrap().map(|r| r.ancestors).unwrap_or_default();
            let b = rebuilt.get(&BranchPath::main(), *id, false).unwrap().map(|r| r.ancestors).unwrap_or_default();
            prop_assert_eq!(a, b);
        }
    }
}
