use archetype_core::{ItemId, ItemIndex, NodeId, NodePolicy, OverrideError, PrototypeGraph};
use serde_json::json;

fn derive_strings(values: &[&str]) -> (PrototypeGraph, NodeId, NodeId) {
    let mut g = PrototypeGraph::new();
    let base_root = g.insert_root();
    g.insert_member(base_root, "strings", json!(values))
        .expect("base member");
    let derived_root = g.derive(base_root);
    let base_strings = g.graph().member(base_root, "strings").expect("base strings");
    let derived_strings = g
        .graph()
        .member(derived_root, "strings")
        .expect("derived strings");
    (g, base_strings, derived_strings)
}

fn id_at(g: &PrototypeGraph, node: NodeId, i: usize) -> ItemId {
    g.index_to_id(node, &ItemIndex::Ordinal(i)).expect("id at index")
}

#[test]
fn local_add_is_an_override() {
    let (mut g, base, derived) = derive_strings(&["String1", "String2"]);
    g.push_item(derived, json!("String3")).expect("push");

    assert_eq!(g.graph().item_count(base), 2);
    assert_eq!(g.graph().item_count(derived), 3);
    assert!(g.is_item_overridden(derived, &ItemIndex::Ordinal(2)));
    assert!(!g.is_item_overridden(derived, &ItemIndex::Ordinal(0)));
    assert_eq!(
        g.overridden_item_indices(derived),
        vec![ItemIndex::Ordinal(2)]
    );
    // the base collection has no base of its own, so it reports nothing
    assert!(g.overridden_item_indices(base).is_empty());
}

#[test]
fn base_add_propagates_under_the_same_id() {
    let (mut g, base, derived) = derive_strings(&["String1", "String2"]);
    g.push_item(base, json!("String4")).expect("base push");

    assert_eq!(g.graph().item_count(derived), 3);
    assert_eq!(
        g.graph().retrieve_item(derived, &ItemIndex::Ordinal(2)),
        Some(json!("String4"))
    );
    assert_eq!(id_at(&g, base, 2), id_at(&g, derived, 2));
    assert!(!g.is_item_overridden(derived, &ItemIndex::Ordinal(2)));
    assert!(g.overridden_item_indices(derived).is_empty());
}

#[test]
fn base_remove_propagates_without_tombstone() {
    let (mut g, base, derived) = derive_strings(&["String1", "String2"]);
    let removed = id_at(&g, base, 1);
    g.remove_item(base, 1).expect("base remove");

    assert_eq!(g.graph().retrieve(derived), json!(["String1"]));
    assert!(!g.is_item_deleted(derived, removed).expect("deleted query"));
    assert!(!g.is_item_overridden_deleted(derived, removed));
}

#[test]
fn base_update_reaches_unpinned_items_only() {
    let (mut g, base, derived) = derive_strings(&["String1", "String2"]);
    // pin index 0 locally
    g.update_item(derived, 0, json!("Local1")).expect("pin");
    assert!(g.is_item_overridden(derived, &ItemIndex::Ordinal(0)));

    g.update_item(base, 0, json!("Base1")).expect("base update");
    g.update_item(base, 1, json!("Base2")).expect("base update");

    assert_eq!(g.graph().retrieve(derived), json!(["Local1", "Base2"]));
}

#[test]
fn overridden_removal_records_both_facts() {
    let (mut g, _base, derived) = derive_strings(&["A", "B", "C"]);
    let b = id_at(&g, derived, 1);
    g.remove_item(derived, 1).expect("remove");

    assert!(g.is_item_deleted(derived, b).expect("deleted query"));
    assert!(g.is_item_overridden_deleted(derived, b));
    let ids = g.item_identifiers(derived).expect("registry");
    assert_eq!(ids.deleted_len(), 1);
}

#[test]
fn tombstone_blocks_base_resurrection() {
    let (mut g, base, derived) = derive_strings(&["A", "B"]);
    let b = id_at(&g, derived, 1);
    g.remove_item(derived, 1).expect("remove");

    // any base-side churn triggers reconciliation; the tombstoned item must
    // not come back
    g.update_item(base, 0, json!("A2")).expect("base update");
    assert_eq!(g.graph().retrieve(derived), json!(["A2"]));
    assert!(g.is_item_deleted(derived, b).expect("deleted query"));
}

#[test]
fn removing_a_local_only_item_is_not_a_divergence() {
    let (mut g, _base, derived) = derive_strings(&["A"]);
    g.push_item(derived, json!("local")).expect("push");
    let local = id_at(&g, derived, 1);

    g.remove_item(derived, 1).expect("remove local");

    // the base never knew the id, so the removal is not an overridden
    // deletion
    assert!(!g.is_item_deleted(derived, local).expect("deleted query"));
    assert!(!g.is_item_overridden_deleted(derived, local));
}

#[test]
fn restore_roundtrip_resumes_the_old_id() {
    let (mut g, _base, derived) = derive_strings(&["A", "B", "C"]);
    let b = id_at(&g, derived, 1);
    let value = g
        .graph()
        .retrieve_item(derived, &ItemIndex::Ordinal(1))
        .expect("value");
    g.remove_item(derived, 1).expect("remove");
    assert!(g.is_item_deleted(derived, b).expect("deleted query"));

    let index = g
        .restore_item(derived, value, Some(1), b)
        .expect("restore");
    assert_eq!(index, ItemIndex::Ordinal(1));
    assert!(!g.is_item_deleted(derived, b).expect("deleted query"));
    assert_eq!(g.id_to_index(derived, b).expect("id to index"), ItemIndex::Ordinal(1));
    assert_eq!(g.graph().retrieve(derived), json!(["A", "B", "C"]));
}

#[test]
fn remove_and_discard_leaves_no_trace() {
    let (mut g, _base, derived) = derive_strings(&["A"]);
    g.push_item(derived, json!("local")).expect("push");
    let local = id_at(&g, derived, 1);
    assert!(g.is_item_overridden(derived, &ItemIndex::Ordinal(1)));

    g.remove_and_discard(derived, &ItemIndex::Ordinal(1))
        .expect("discard");

    assert!(!g.is_item_deleted(derived, local).expect("deleted query"));
    assert!(!g.is_item_overridden_deleted(derived, local));
    assert!(g.overridden_item_indices(derived).is_empty());
}

#[test]
fn disconnect_keeps_answering_through_the_ledger() {
    let (mut g, _base, derived) = derive_strings(&["A", "B"]);
    let b = id_at(&g, derived, 1);
    g.remove_item(derived, 1).expect("remove");

    g.disconnect_overridden_deleted_item(derived, b)
        .expect("disconnect");

    // the registry no longer lists the tombstone, but the ledger does
    let ids = g.item_identifiers(derived).expect("registry");
    assert_eq!(ids.deleted_len(), 0);
    assert!(g.is_item_deleted(derived, b).expect("deleted query"));
    assert!(g.is_item_overridden_deleted(derived, b));
}

#[test]
fn queries_on_unidentifiable_collections_fail() {
    let mut g = PrototypeGraph::new();
    let base_root = g.insert_root();
    g.insert_member_with_policy(
        base_root,
        "raw",
        json!([1, 2]),
        NodePolicy::non_identifiable_items(),
    )
    .expect("member");
    let derived_root = g.derive(base_root);
    let raw = g.graph().member(derived_root, "raw").expect("member");

    let err = g
        .is_item_deleted(raw, ItemId::generate())
        .expect_err("no identity metadata");
    assert!(matches!(err, OverrideError::MissingItemIds));
    assert!(g.item_identifiers(raw).is_none());
}
