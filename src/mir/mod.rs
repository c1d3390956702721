// Copyright (c) 2024 <Wei Li>.
//
// This source code is licensed under the GNU license found in the
// LICENSE file in the root directory of this source tree.

//! Opaque intermediate-representation values supplied by the front end:
//! block identities, literals, call sites and actual-parameter lists.

use std::fmt;
use std::rc::Rc;

use crate::mir::path::Path;

pub mod context;
pub mod path;

/// Name of the program's entry pseudo-method.
pub const MAIN_METHOD: &str = "__MAIN__";

/// Name of the per-method return-value slot.
pub const RETURN_NAME: &str = "__RETURN__";

/// Wildcard index name, summarizing all indices of a storage node.
pub const UNKNOWN: &str = "*";

/// The unique identifier for a basic block.
///
/// Block ids are assigned by the driver and are unique across the whole
/// program, not per method.
#[derive(Copy, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct BlockId(pub u32);

impl fmt::Debug for BlockId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "BB{}", self.0)
    }
}

impl fmt::Display for BlockId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "BB{}", self.0)
    }
}

/// Scalar constants the source IR can produce.
#[derive(Clone, PartialEq, Eq, Hash, Debug)]
pub enum Literal {
    Int(i64),
    Str(String),
    Bool(bool),
    Null,
}

impl fmt::Display for Literal {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Literal::Int(i) => write!(f, "{}", i),
            Literal::Str(s) => write!(f, "'{}'", s),
            Literal::Bool(b) => write!(f, "{}", b),
            Literal::Null => f.write_str("NULL"),
        }
    }
}

/// One actual parameter at a call site, paired with the formal it binds.
#[derive(Clone, PartialEq, Eq, Hash, Debug)]
pub struct ActualArg {
    /// Name of the formal parameter in the callee.
    pub formal: String,
    /// The lvalue passed by the caller.
    pub arg: Rc<Path>,
    /// Whether the source call passes this argument by reference.
    pub by_ref: bool,
}

impl ActualArg {
    pub fn new(formal: impl Into<String>, arg: Rc<Path>, by_ref: bool) -> Self {
        ActualArg {
            formal: formal.into(),
            arg,
            by_ref,
        }
    }
}

/// One call site, identified by the method owning it and the block
/// containing it.
#[derive(Clone, PartialEq, Eq, Hash)]
pub struct CallSite {
    pub method: String,
    pub block: BlockId,
}

impl CallSite {
    pub fn new(method: impl Into<String>, block: BlockId) -> Self {
        CallSite {
            method: method.into(),
            block,
        }
    }
}

impl fmt::Debug for CallSite {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}@{}", self.method, self.block)
    }
}

impl fmt::Display for CallSite {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}@{}", self.method, self.block)
    }
}
