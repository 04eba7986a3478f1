use archetype_graph::{ChangeKind, Content, Graph, GraphError, ItemIndex};
use serde_json::json;

#[test]
fn members_and_deep_views() {
    let mut graph = Graph::new();
    let root = graph.insert_root();
    graph
        .insert_member(root, "name", json!("thing"))
        .expect("scalar member");
    graph
        .insert_member(root, "tags", json!(["a", "b"]))
        .expect("list member");
    graph
        .insert_member(root, "settings", json!({"x": 1, "y": 2}))
        .expect("map member");

    assert_eq!(
        graph.retrieve(root),
        json!({"name": "thing", "tags": ["a", "b"], "settings": {"x": 1, "y": 2}})
    );

    let tags = graph.member(root, "tags").expect("tags node");
    assert!(graph.node(tags).content().is_collection());
    assert!(!graph.node(tags).content().is_keyed());
    let settings = graph.member(root, "settings").expect("settings node");
    assert!(graph.node(settings).content().is_keyed());
    assert_eq!(graph.member(root, "missing"), None);
}

#[test]
fn json_conversion_builds_nested_nodes() {
    let mut graph = Graph::new();
    let root = graph.insert_root();
    let member = graph
        .insert_member(root, "rows", json!([{"id": 1}, {"id": 2}]))
        .expect("member");
    let first = graph
        .item_node(member, &ItemIndex::Ordinal(0))
        .expect("first row");
    assert!(matches!(graph.node(first).content(), Content::Map(_)));
    assert_eq!(
        graph.retrieve_item(first, &ItemIndex::Key("id".into())),
        Some(json!(1))
    );
}

#[test]
fn item_changes_carry_kind_and_values() {
    let mut graph = Graph::new();
    let root = graph.insert_root();
    let list = graph
        .insert_member(root, "list", json!([1, 2, 3]))
        .expect("member");

    let add = graph
        .insert_item(list, ItemIndex::Ordinal(1), json!(9))
        .expect("insert");
    assert_eq!(add.kind, ChangeKind::Add);
    assert_eq!(add.new, Some(json!(9)));
    assert_eq!(graph.retrieve(list), json!([1, 9, 2, 3]));

    let update = graph
        .update_item(list, &ItemIndex::Ordinal(0), json!(7))
        .expect("update");
    assert_eq!(update.kind, ChangeKind::Update);
    assert_eq!(update.old, Some(json!(1)));
    assert_eq!(update.new, Some(json!(7)));

    let remove = graph
        .remove_item(list, &ItemIndex::Ordinal(2))
        .expect("remove");
    assert_eq!(remove.kind, ChangeKind::Remove);
    assert_eq!(remove.old, Some(json!(2)));
    assert_eq!(graph.retrieve(list), json!([7, 9, 3]));
}

#[test]
fn update_keeps_the_item_node_id() {
    let mut graph = Graph::new();
    let root = graph.insert_root();
    let list = graph
        .insert_member(root, "list", json!(["a"]))
        .expect("member");
    let before = graph.item_node(list, &ItemIndex::Ordinal(0)).expect("item");
    graph
        .update_item(list, &ItemIndex::Ordinal(0), json!("b"))
        .expect("update");
    let after = graph.item_node(list, &ItemIndex::Ordinal(0)).expect("item");
    assert_eq!(before, after);
}

#[test]
fn collection_errors() {
    let mut graph = Graph::new();
    let root = graph.insert_root();
    let list = graph
        .insert_member(root, "list", json!([1]))
        .expect("list");
    let map = graph
        .insert_member(root, "map", json!({"k": 1}))
        .expect("map");
    let scalar = graph
        .insert_member(root, "scalar", json!(0))
        .expect("scalar");

    assert!(matches!(
        graph.insert_item(list, ItemIndex::Ordinal(5), json!(2)),
        Err(GraphError::IndexOutOfBounds { index: 5, len: 1 })
    ));
    assert!(matches!(
        graph.insert_item(map, ItemIndex::Key("k".into()), json!(2)),
        Err(GraphError::DuplicateKey(_))
    ));
    assert!(matches!(
        graph.insert_item(list, ItemIndex::Key("k".into()), json!(2)),
        Err(GraphError::UnsupportedIndex(_))
    ));
    assert!(matches!(
        graph.insert_item(scalar, ItemIndex::Ordinal(0), json!(2)),
        Err(GraphError::NotACollection)
    ));
    assert!(matches!(
        graph.remove_item(map, &ItemIndex::Key("gone".into())),
        Err(GraphError::UnknownKey(_))
    ));
}

#[test]
fn clone_subtree_is_deep_and_fresh() {
    let mut graph = Graph::new();
    let root = graph.insert_root();
    graph
        .insert_member(root, "list", json!([{"v": 1}, {"v": 2}]))
        .expect("member");
    let clone = graph.clone_subtree(root);
    assert_ne!(clone, root);
    assert_eq!(graph.retrieve(clone), graph.retrieve(root));

    // mutating the clone leaves the source alone
    let cloned_list = graph.member(clone, "list").expect("cloned list");
    graph
        .remove_item(cloned_list, &ItemIndex::Ordinal(0))
        .expect("remove");
    assert_eq!(graph.retrieve(root)["list"], json!([{"v": 1}, {"v": 2}]));
    assert_eq!(graph.retrieve(clone)["list"], json!([{"v": 2}]));
}

#[test]
fn set_value_replaces_content_in_place() {
    let mut graph = Graph::new();
    let root = graph.insert_root();
    let member = graph
        .insert_member(root, "value", json!("scalar"))
        .expect("member");
    let change = graph.set_value(member, json!([1, 2]));
    assert_eq!(change.old, json!("scalar"));
    assert_eq!(change.new, json!([1, 2]));
    assert!(graph.node(member).content().is_collection());
}
