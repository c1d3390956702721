// Copyright (c) 2024 <Wei Li>.
//
// This source code is licensed under the GNU license found in the
// LICENSE file in the root directory of this source tree.

use std::fmt::{Debug, Display, Formatter, Result};
use std::rc::Rc;

use crate::pta::node::IndexNode;

/// A `Path` names some dereferencing of a source-level lvalue.
///
/// Paths translate lvalues into graph node identities. The set of variants
/// is closed: a symbol-table reference, a bare index name, and their
/// composition.
#[derive(Clone, PartialEq, Eq, Hash)]
pub enum Path {
    /// A method's symbol table; names a storage node.
    SymTable(String),
    /// A bare index name (variable or field).
    Index(String),
    /// Indexing composition: `base[index]`.
    Composed { base: Rc<Path>, index: Rc<Path> },
}

impl Path {
    pub fn sym(name: impl Into<String>) -> Rc<Path> {
        Rc::new(Path::SymTable(name.into()))
    }

    pub fn index(name: impl Into<String>) -> Rc<Path> {
        Rc::new(Path::Index(name.into()))
    }

    pub fn composed(base: Rc<Path>, index: Rc<Path>) -> Rc<Path> {
        Rc::new(Path::Composed { base, index })
    }

    /// The common lvalue shape: variable `name` in `method`'s symbol table.
    pub fn var(method: impl Into<String>, name: impl Into<String>) -> Rc<Path> {
        Path::composed(Path::sym(method), Path::index(name))
    }

    /// Flattens this path to an index-node identity.
    ///
    /// Only compositions are addressable; a bare symbol table is a storage
    /// node and a bare index names no owner.
    pub fn to_index_node(&self) -> Option<IndexNode> {
        match self {
            Path::Composed { base, index } => {
                Some(IndexNode::new(base.storage_name(), index.index_name()))
            }
            _ => None,
        }
    }

    fn storage_name(&self) -> String {
        match self {
            Path::SymTable(name) => name.clone(),
            Path::Index(name) => name.clone(),
            // A nested base names a derived storage by its rendering.
            Path::Composed { .. } => self.to_string(),
        }
    }

    fn index_name(&self) -> String {
        match self {
            Path::Index(name) => name.clone(),
            other => other.to_string(),
        }
    }
}

impl Debug for Path {
    fn fmt(&self, f: &mut Formatter<'_>) -> Result {
        Display::fmt(self, f)
    }
}

impl Display for Path {
    fn fmt(&self, f: &mut Formatter<'_>) -> Result {
        match self {
            Path::SymTable(name) => write!(f, "ST({})", name),
            Path::Index(name) => f.write_str(name),
            Path::Composed { base, index } => write!(f, "{}[{}]", base, index),
        }
    }
}
