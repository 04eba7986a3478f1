use crate::index::ItemIndex;
use crate::policy::NodePolicy;
use crate::Json;
use indexmap::IndexMap;
use thiserror::Error;

/// Arena index of a node. Minted by [`Graph`] and never invalidated while
/// the graph lives; replaced subtrees leave their nodes orphaned in the
/// arena rather than freeing them.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct NodeId(u32);

impl NodeId {
    pub fn index(self) -> usize {
        self.0 as usize
    }
}

/// Kind of an item-level mutation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChangeKind {
    Add,
    Remove,
    Update,
}

/// Record of a whole-value replacement on a node.
#[derive(Debug, Clone)]
pub struct ValueChange {
    pub node: NodeId,
    pub old: Json,
    pub new: Json,
}

/// Record of a single item mutation on a collection-valued node.
#[derive(Debug, Clone)]
pub struct ItemChange {
    pub collection: NodeId,
    pub index: ItemIndex,
    pub kind: ChangeKind,
    pub old: Option<Json>,
    pub new: Option<Json>,
}

/// How a node is reached from its parent. Item positions are not stored
/// (they shift); they are recomputed from the parent when needed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ParentLink {
    Root,
    Member { parent: NodeId, name: String },
    Item { parent: NodeId },
}

/// Value held by a node.
#[derive(Debug, Clone)]
pub enum Content {
    /// Scalar leaf.
    Value(Json),
    /// Named members declared by the graph owner; each member is a child node.
    Object(IndexMap<String, NodeId>),
    /// Ordered collection of child item nodes.
    List(Vec<NodeId>),
    /// Keyed collection of child item nodes.
    Map(IndexMap<String, NodeId>),
}

impl Content {
    pub fn is_collection(&self) -> bool {
        matches!(self, Content::List(_) | Content::Map(_))
    }

    pub fn is_keyed(&self) -> bool {
        matches!(self, Content::Map(_))
    }
}

#[derive(Debug, Clone)]
pub struct Node {
    content: Content,
    link: ParentLink,
    policy: NodePolicy,
}

impl Node {
    pub fn content(&self) -> &Content {
        &self.content
    }

    pub fn link(&self) -> &ParentLink {
        &self.link
    }

    pub fn policy(&self) -> NodePolicy {
        self.policy
    }
}

#[derive(Debug, Error)]
pub enum GraphError {
    #[error("node is not a collection")]
    NotACollection,
    #[error("node is not an object")]
    NotAnObject,
    #[error("index {index} out of bounds for collection of length {len}")]
    IndexOutOfBounds { index: usize, len: usize },
    #[error("unknown member `{0}`")]
    UnknownMember(String),
    #[error("duplicate member `{0}`")]
    DuplicateMember(String),
    #[error("unknown key `{0}`")]
    UnknownKey(String),
    #[error("duplicate key `{0}`")]
    DuplicateKey(String),
    #[error("index {0} cannot address this collection")]
    UnsupportedIndex(ItemIndex),
}

/// Arena-backed value graph.
#[derive(Debug, Default)]
pub struct Graph {
    nodes: Vec<Node>,
}

impl Graph {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn node(&self, id: NodeId) -> &Node {
        &self.nodes[id.index()]
    }

    /// Number of nodes ever allocated, orphans included.
    pub fn node_count(&self) -> usize {
        self.nodes.len()
    }

    fn alloc(&mut self, content: Content, link: ParentLink, policy: NodePolicy) -> NodeId {
        let id = NodeId(self.nodes.len() as u32);
        self.nodes.push(Node {
            content,
            link,
            policy,
        });
        id
    }

    /// Creates an empty root object node.
    pub fn insert_root(&mut self) -> NodeId {
        self.alloc(Content::Object(IndexMap::new()), ParentLink::Root, NodePolicy::default())
    }

    /// Declares a member on an object node, converting `value` to content
    /// (arrays become lists, objects become maps, everything else a scalar).
    pub fn insert_member(
        &mut self,
        object: NodeId,
        name: &str,
        value: Json,
    ) -> Result<NodeId, GraphError> {
        self.insert_member_with_policy(object, name, value, NodePolicy::default())
    }

    pub fn insert_member_with_policy(
        &mut self,
        object: NodeId,
        name: &str,
        value: Json,
        policy: NodePolicy,
    ) -> Result<NodeId, GraphError> {
        match &self.nodes[object.index()].content {
            Content::Object(members) => {
                if members.contains_key(name) {
                    return Err(GraphError::DuplicateMember(name.to_owned()));
                }
            }
            _ => return Err(GraphError::NotAnObject),
        }
        let member = self.build_node(
            value,
            ParentLink::Member {
                parent: object,
                name: name.to_owned(),
            },
            policy,
        );
        if let Content::Object(members) = &mut self.nodes[object.index()].content {
            members.insert(name.to_owned(), member);
        }
        Ok(member)
    }

    fn build_node(&mut self, value: Json, link: ParentLink, policy: NodePolicy) -> NodeId {
        match value {
            Json::Array(items) => {
                let id = self.alloc(Content::List(Vec::new()), link, policy);
                let children = items
                    .into_iter()
                    .map(|item| {
                        self.build_node(item, ParentLink::Item { parent: id }, NodePolicy::default())
                    })
                    .collect();
                self.nodes[id.index()].content = Content::List(children);
                id
            }
            Json::Object(entries) => {
                let id = self.alloc(Content::Map(IndexMap::new()), link, policy);
                let mut children = IndexMap::with_capacity(entries.len());
                for (key, item) in entries {
                    let child = self.build_node(
                        item,
                        ParentLink::Item { parent: id },
                        NodePolicy::default(),
                    );
                    children.insert(key, child);
                }
                self.nodes[id.index()].content = Content::Map(children);
                id
            }
            other => self.alloc(Content::Value(other), link, policy),
        }
    }

    pub fn member(&self, object: NodeId, name: &str) -> Option<NodeId> {
        match &self.nodes[object.index()].content {
            Content::Object(members) => members.get(name).copied(),
            _ => None,
        }
    }

    pub fn members(&self, object: NodeId) -> Vec<(String, NodeId)> {
        match &self.nodes[object.index()].content {
            Content::Object(members) => members
                .iter()
                .map(|(name, &child)| (name.clone(), child))
                .collect(),
            _ => Vec::new(),
        }
    }

    /// Child node occupying `index` in a collection-valued node.
    pub fn item_node(&self, collection: NodeId, index: &ItemIndex) -> Option<NodeId> {
        match (&self.nodes[collection.index()].content, index) {
            (Content::List(items), ItemIndex::Ordinal(i)) => items.get(*i).copied(),
            (Content::Map(entries), ItemIndex::Key(k)) => entries.get(k).copied(),
            _ => None,
        }
    }

    /// Current positions of a collection-valued node, in order.
    pub fn indices(&self, collection: NodeId) -> Vec<ItemIndex> {
        match &self.nodes[collection.index()].content {
            Content::List(items) => (0..items.len()).map(ItemIndex::Ordinal).collect(),
            Content::Map(entries) => entries.keys().cloned().map(ItemIndex::Key).collect(),
            _ => Vec::new(),
        }
    }

    pub fn item_count(&self, collection: NodeId) -> usize {
        match &self.nodes[collection.index()].content {
            Content::List(items) => items.len(),
            Content::Map(entries) => entries.len(),
            _ => 0,
        }
    }

    /// Position of `child` inside its parent collection.
    pub fn index_of_child(&self, collection: NodeId, child: NodeId) -> Option<ItemIndex> {
        match &self.nodes[collection.index()].content {
            Content::List(items) => items
                .iter()
                .position(|&c| c == child)
                .map(ItemIndex::Ordinal),
            Content::Map(entries) => entries
                .iter()
                .find(|(_, &c)| c == child)
                .map(|(k, _)| ItemIndex::Key(k.clone())),
            _ => None,
        }
    }

    /// All direct child nodes: members of objects, items of collections.
    pub fn children(&self, id: NodeId) -> Vec<NodeId> {
        match &self.nodes[id.index()].content {
            Content::Value(_) => Vec::new(),
            Content::Object(members) => members.values().copied().collect(),
            Content::List(items) => items.clone(),
            Content::Map(entries) => entries.values().copied().collect(),
        }
    }

    /// Deep JSON view of a node.
    pub fn retrieve(&self, id: NodeId) -> Json {
        match &self.nodes[id.index()].content {
            Content::Value(v) => v.clone(),
            Content::Object(members) => Json::Object(
                members
                    .iter()
                    .map(|(name, &child)| (name.clone(), self.retrieve(child)))
                    .collect(),
            ),
            Content::List(items) => {
                Json::Array(items.iter().map(|&child| self.retrieve(child)).collect())
            }
            Content::Map(entries) => Json::Object(
                entries
                    .iter()
                    .map(|(key, &child)| (key.clone(), self.retrieve(child)))
                    .collect(),
            ),
        }
    }

    pub fn retrieve_item(&self, collection: NodeId, index: &ItemIndex) -> Option<Json> {
        self.item_node(collection, index).map(|c| self.retrieve(c))
    }

    /// Replaces a node's entire value, rebuilding child nodes from `value`.
    /// The previous children stay orphaned in the arena.
    pub fn set_value(&mut self, node: NodeId, value: Json) -> ValueChange {
        let old = self.retrieve(node);
        let link = self.nodes[node.index()].link.clone();
        let policy = self.nodes[node.index()].policy;
        // Rebuild in place so the node id survives the replacement.
        let rebuilt = self.build_node(value, link, policy);
        let content = self.nodes[rebuilt.index()].content.clone();
        self.nodes[node.index()].content = content;
        self.reparent_children(node);
        let new = self.retrieve(node);
        ValueChange { node, old, new }
    }

    fn reparent_children(&mut self, node: NodeId) {
        for child in self.children(node) {
            let link = match &self.nodes[child.index()].link {
                ParentLink::Member { name, .. } => ParentLink::Member {
                    parent: node,
                    name: name.clone(),
                },
                _ => ParentLink::Item { parent: node },
            };
            self.nodes[child.index()].link = link;
        }
    }

    /// Inserts an item at `index` (ordinal for lists, key for maps).
    pub fn insert_item(
        &mut self,
        collection: NodeId,
        index: ItemIndex,
        value: Json,
    ) -> Result<ItemChange, GraphError> {
        match (&self.nodes[collection.index()].content, &index) {
            (Content::List(items), ItemIndex::Ordinal(i)) => {
                if *i > items.len() {
                    return Err(GraphError::IndexOutOfBounds {
                        index: *i,
                        len: items.len(),
                    });
                }
            }
            (Content::Map(entries), ItemIndex::Key(k)) => {
                if entries.contains_key(k) {
                    return Err(GraphError::DuplicateKey(k.clone()));
                }
            }
            (Content::List(_) | Content::Map(_), other) => {
                return Err(GraphError::UnsupportedIndex(other.clone()))
            }
            _ => return Err(GraphError::NotACollection),
        }
        let child = self.build_node(
            value.clone(),
            ParentLink::Item { parent: collection },
            NodePolicy::default(),
        );
        match (&mut self.nodes[collection.index()].content, &index) {
            (Content::List(items), ItemIndex::Ordinal(i)) => items.insert(*i, child),
            (Content::Map(entries), ItemIndex::Key(k)) => {
                entries.insert(k.clone(), child);
            }
            _ => {}
        }
        Ok(ItemChange {
            collection,
            index,
            kind: ChangeKind::Add,
            old: None,
            new: Some(value),
        })
    }

    /// Replaces the value at `index` in place; the item node keeps its id.
    pub fn update_item(
        &mut self,
        collection: NodeId,
        index: &ItemIndex,
        value: Json,
    ) -> Result<ItemChange, GraphError> {
        let child = self.resolve_item(collection, index)?;
        let old = self.retrieve(child);
        self.set_value(child, value.clone());
        Ok(ItemChange {
            collection,
            index: index.clone(),
            kind: ChangeKind::Update,
            old: Some(old),
            new: Some(value),
        })
    }

    /// Removes the item at `index`. Lists shift subsequent items down; maps
    /// drop the key and leave the rest untouched.
    pub fn remove_item(
        &mut self,
        collection: NodeId,
        index: &ItemIndex,
    ) -> Result<ItemChange, GraphError> {
        let child = self.resolve_item(collection, index)?;
        let old = self.retrieve(child);
        match (&mut self.nodes[collection.index()].content, index) {
            (Content::List(items), ItemIndex::Ordinal(i)) => {
                items.remove(*i);
            }
            (Content::Map(entries), ItemIndex::Key(k)) => {
                entries.shift_remove(k);
            }
            _ => {}
        }
        Ok(ItemChange {
            collection,
            index: index.clone(),
            kind: ChangeKind::Remove,
            old: Some(old),
            new: None,
        })
    }

    fn resolve_item(&self, collection: NodeId, index: &ItemIndex) -> Result<NodeId, GraphError> {
        match (&self.nodes[collection.index()].content, index) {
            (Content::List(items), ItemIndex::Ordinal(i)) => {
                items.get(*i).copied().ok_or(GraphError::IndexOutOfBounds {
                    index: *i,
                    len: items.len(),
                })
            }
            (Content::Map(entries), ItemIndex::Key(k)) => entries
                .get(k)
                .copied()
                .ok_or_else(|| GraphError::UnknownKey(k.clone())),
            (Content::List(_) | Content::Map(_), other) => {
                Err(GraphError::UnsupportedIndex(other.clone()))
            }
            _ => Err(GraphError::NotACollection),
        }
    }

    /// Deep-clones a subtree into fresh nodes; the clone becomes a root.
    pub fn clone_subtree(&mut self, src: NodeId) -> NodeId {
        self.clone_node(src, ParentLink::Root)
    }

    fn clone_node(&mut self, src: NodeId, link: ParentLink) -> NodeId {
        let policy = self.nodes[src.index()].policy;
        match self.nodes[src.index()].content.clone() {
            Content::Value(v) => self.alloc(Content::Value(v), link, policy),
            Content::Object(members) => {
                let id = self.alloc(Content::Object(IndexMap::new()), link, policy);
                let mut cloned = IndexMap::with_capacity(members.len());
                for (name, child) in members {
                    let c = self.clone_node(
                        child,
                        ParentLink::Member {
                            parent: id,
                            name: name.clone(),
                        },
                    );
                    cloned.insert(name, c);
                }
                self.nodes[id.index()].content = Content::Object(cloned);
                id
            }
            Content::List(items) => {
                let id = self.alloc(Content::List(Vec::new()), link, policy);
                let cloned = items
                    .into_iter()
                    .map(|child| self.clone_node(child, ParentLink::Item { parent: id }))
                    .collect();
                self.nodes[id.index()].content = Content::List(cloned);
                id
            }
            Content::Map(entries) => {
                let id = self.alloc(Content::Map(IndexMap::new()), link, policy);
                let mut cloned = IndexMap::with_capacity(entries.len());
                for (key, child) in entries {
                    let c = self.clone_node(child, ParentLink::Item { parent: id });
                    cloned.insert(key, c);
                }
                self.nodes[id.index()].content = Content::Map(cloned);
                id
            }
        }
    }
}
