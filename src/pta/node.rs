// Copyright (c) 2024 <Wei Li>.
//
// This source code is licensed under the GNU license found in the
// LICENSE file in the root directory of this source tree.

//! Node records for points-to graphs.
//!
//! All nodes are arena-interned records addressed by stable `u32` handles,
//! scoped to one analysis pass. Graphs store only handles; the owning
//! [`NodeTable`] resolves them back to records for queries and dumps.

use std::collections::HashMap;
use std::fmt::{Debug, Display, Formatter, Result};
use std::rc::Rc;

/// The unique identifier for each index node.
#[derive(Copy, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct IndexNodeId(u32);

impl IndexNodeId {
    #[inline]
    pub fn index(self) -> usize {
        self.0 as usize
    }
}

impl Debug for IndexNodeId {
    fn fmt(&self, f: &mut Formatter<'_>) -> Result {
        write!(f, "IndexNodeId({})", self.0)
    }
}

/// The unique identifier for each storage node.
#[derive(Copy, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct StorageNodeId(u32);

impl StorageNodeId {
    #[inline]
    pub fn index(self) -> usize {
        self.0 as usize
    }
}

impl Debug for StorageNodeId {
    fn fmt(&self, f: &mut Formatter<'_>) -> Result {
        write!(f, "StorageNodeId({})", self.0)
    }
}

/// An abstract addressable location: a variable or field, identified by
/// the storage node owning it and the index name within that storage.
#[derive(Clone, PartialEq, Eq, Hash)]
pub struct IndexNode {
    pub storage: String,
    pub name: String,
}

impl IndexNode {
    pub fn new(storage: impl Into<String>, name: impl Into<String>) -> Self {
        IndexNode {
            storage: storage.into(),
            name: name.into(),
        }
    }
}

impl Debug for IndexNode {
    fn fmt(&self, f: &mut Formatter<'_>) -> Result {
        Display::fmt(self, f)
    }
}

impl Display for IndexNode {
    fn fmt(&self, f: &mut Formatter<'_>) -> Result {
        write!(f, "{}::{}", self.storage, self.name)
    }
}

/// An abstract heap object or array, identified by name. A storage node
/// may summarize an unbounded set of concrete allocations; that
/// abstractness is per-graph state, not part of the identity.
#[derive(Clone, PartialEq, Eq, Hash)]
pub struct StorageNode {
    pub name: String,
}

impl StorageNode {
    pub fn new(name: impl Into<String>) -> Self {
        StorageNode { name: name.into() }
    }
}

impl Debug for StorageNode {
    fn fmt(&self, f: &mut Formatter<'_>) -> Result {
        Display::fmt(self, f)
    }
}

impl Display for StorageNode {
    fn fmt(&self, f: &mut Formatter<'_>) -> Result {
        f.write_str(&self.name)
    }
}

/// The scalar slot of a storage node, materialized by `set_scalar`.
#[derive(Copy, Clone, PartialEq, Eq, Hash, Debug)]
pub struct ValueNode {
    pub storage: StorageNodeId,
}

/// Interner handing out stable handles for index and storage nodes.
/// Shared by every graph of one analysis instance.
#[derive(Debug, Default)]
pub struct NodeTable {
    index_nodes: Vec<Rc<IndexNode>>,
    index_map: HashMap<Rc<IndexNode>, IndexNodeId>,
    storage_nodes: Vec<Rc<StorageNode>>,
    storage_map: HashMap<Rc<StorageNode>, StorageNodeId>,
}

impl NodeTable {
    pub fn new() -> NodeTable {
        NodeTable::default()
    }

    /// Returns the handle for `node`, interning it on first sight.
    pub fn index_id(&mut self, node: IndexNode) -> IndexNodeId {
        if let Some(id) = self.index_map.get(&node) {
            *id
        } else {
            let id = IndexNodeId(self.index_nodes.len() as u32);
            let node = Rc::new(node);
            self.index_nodes.push(node.clone());
            self.index_map.insert(node, id);
            id
        }
    }

    /// Returns the handle for the storage node named `name`.
    pub fn storage_id(&mut self, name: &str) -> StorageNodeId {
        let node = StorageNode::new(name);
        if let Some(id) = self.storage_map.get(&node) {
            *id
        } else {
            let id = StorageNodeId(self.storage_nodes.len() as u32);
            let node = Rc::new(node);
            self.storage_nodes.push(node.clone());
            self.storage_map.insert(node, id);
            id
        }
    }

    /// Returns the handle for the storage node named `name` without
    /// interning it.
    pub fn try_storage_id(&self, name: &str) -> Option<StorageNodeId> {
        self.storage_map.get(&StorageNode::new(name)).copied()
    }

    #[inline]
    pub fn index(&self, id: IndexNodeId) -> &IndexNode {
        &self.index_nodes[id.index()]
    }

    #[inline]
    pub fn storage(&self, id: StorageNodeId) -> &StorageNode {
        &self.storage_nodes[id.index()]
    }

    /// The storage node owning `id`, interned on demand.
    pub fn owner_of(&mut self, id: IndexNodeId) -> StorageNodeId {
        let owner = self.index_nodes[id.index()].storage.clone();
        self.storage_id(&owner)
    }

    /// The storage node owning `id`, if it has been interned.
    pub fn try_owner_of(&self, id: IndexNodeId) -> Option<StorageNodeId> {
        self.try_storage_id(&self.index_nodes[id.index()].storage)
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn interning_is_stable() {
        let mut nodes = NodeTable::new();
        let a = nodes.index_id(IndexNode::new("f", "x"));
        let b = nodes.index_id(IndexNode::new("f", "y"));
        assert_ne!(a, b);
        assert_eq!(nodes.index_id(IndexNode::new("f", "x")), a);
        assert_eq!(nodes.index(a).name, "x");

        let s = nodes.storage_id("HEAP_1");
        assert_eq!(nodes.storage_id("HEAP_1"), s);
        assert_eq!(nodes.try_storage_id("HEAP_1"), Some(s));
        assert_eq!(nodes.try_storage_id("HEAP_2"), None);
    }

    #[test]
    fn owner_resolution() {
        let mut nodes = NodeTable::new();
        let x = nodes.index_id(IndexNode::new("f", "x"));
        assert_eq!(nodes.try_owner_of(x), None);
        let f = nodes.owner_of(x);
        assert_eq!(nodes.storage(f).name, "f");
        assert_eq!(nodes.try_owner_of(x), Some(f));
    }
}
