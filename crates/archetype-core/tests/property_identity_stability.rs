//! Randomized check of the identity invariants: whatever sequence of
//! insertions, removals, and updates a derived collection goes through,
//! surviving entries keep their id and the position↔id mapping stays a
//! bijection.

use archetype_core::{ItemId, ItemIndex, NodeId, PrototypeGraph};
use proptest::prelude::*;
use serde_json::json;

#[derive(Debug, Clone)]
enum Op {
    Insert(usize),
    Remove(usize),
    Update(usize),
}

fn op_strategy() -> impl Strategy<Value = Op> {
    prop_oneof![
        (0usize..64).prop_map(Op::Insert),
        (0usize..64).prop_map(Op::Remove),
        (0usize..64).prop_map(Op::Update),
    ]
}

fn derive_list(len: usize) -> (PrototypeGraph, NodeId) {
    let mut g = PrototypeGraph::new();
    let base_root = g.insert_root();
    let values: Vec<i64> = (0..len as i64).collect();
    g.insert_member(base_root, "items", json!(values))
        .expect("base member");
    let derived_root = g.derive(base_root);
    let derived = g.graph().member(derived_root, "items").expect("derived");
    (g, derived)
}

fn live_ids(g: &PrototypeGraph, node: NodeId) -> Vec<ItemId> {
    g.item_identifiers(node).expect("registry").live_ids()
}

proptest! {
    #[test]
    fn ids_stay_stable_under_random_edits(ops in proptest::collection::vec(op_strategy(), 1..40)) {
        let (mut g, derived) = derive_list(3);
        // shadow model: the ids we expect at each position
        let mut shadow = live_ids(&g, derived);
        let mut counter = 0i64;

        for op in ops {
            let len = g.graph().item_count(derived);
            match op {
                Op::Insert(raw) => {
                    let at = raw % (len + 1);
                    counter += 1;
                    g.insert_item(derived, at, json!(counter)).expect("insert");
                    let id = g
                        .index_to_id(derived, &ItemIndex::Ordinal(at))
                        .expect("fresh id");
                    prop_assert!(!shadow.contains(&id));
                    shadow.insert(at, id);
                }
                Op::Remove(raw) => {
                    if len == 0 {
                        continue;
                    }
                    let at = raw % len;
                    let expected = shadow.remove(at);
                    let actual = g
                        .index_to_id(derived, &ItemIndex::Ordinal(at))
                        .expect("id before removal");
                    prop_assert_eq!(expected, actual);
                    g.remove_item(derived, at).expect("remove");
                    prop_assert!(g.try_id_to_index(derived, expected).is_none());
                }
                Op::Update(raw) => {
                    if len == 0 {
                        continue;
                    }
                    let at = raw % len;
                    counter += 1;
                    g.update_item(derived, at, json!(counter)).expect("update");
                    prop_assert_eq!(
                        g.index_to_id(derived, &ItemIndex::Ordinal(at)).expect("id"),
                        shadow[at]
                    );
                }
            }

            // the registry mirrors the shadow exactly
            prop_assert_eq!(&live_ids(&g, derived), &shadow);
            // and the mapping is a bijection over live positions
            for (i, &id) in shadow.iter().enumerate() {
                let index = ItemIndex::Ordinal(i);
                prop_assert_eq!(
                    g.index_to_id(derived, &index).expect("index to id"),
                    id
                );
                prop_assert_eq!(
                    g.id_to_index(derived, id).expect("id to index"),
                    index
                );
            }
        }
    }
}
