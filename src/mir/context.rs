// Copyright (c) 2024 <Wei Li>.
//
// This source code is licensed under the GNU license found in the
// LICENSE file in the root directory of this source tree.

use std::collections::HashMap;
use std::fmt::{Debug, Display, Formatter, Result};
use std::rc::Rc;

use itertools::Itertools;

use super::{BlockId, CallSite, MAIN_METHOD};

/// The unique identifier for each interned context.
#[derive(Copy, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ContextId(u32);

impl ContextId {
    #[inline]
    pub fn index(self) -> usize {
        self.0 as usize
    }
}

impl Debug for ContextId {
    fn fmt(&self, f: &mut Formatter<'_>) -> Result {
        write!(f, "ContextId({})", self.0)
    }
}

/// One calling history ending at a specific program point.
///
/// A context is an immutable call-string (the sequence of call sites leading
/// here) plus the method and basic block currently executing. Contexts are
/// structurally comparable: two contexts constructed along different routes
/// compare and hash equal whenever their content is equal. The call string
/// is unbounded by default; [`Context::suffix`] produces the k-limited
/// representative used when contexts are merged into an approximation.
#[derive(Clone, PartialEq, Eq, Hash)]
pub struct Context {
    call_string: Vec<CallSite>,
    method: String,
    block: BlockId,
}

impl Context {
    /// The program's outermost context, entering `__MAIN__` at `block`.
    pub fn outer(block: BlockId) -> Rc<Self> {
        Rc::new(Context {
            call_string: Vec::new(),
            method: MAIN_METHOD.to_string(),
            block,
        })
    }

    /// Same calling history and method, different basic block.
    pub fn inside(cx: &Rc<Context>, block: BlockId) -> Rc<Self> {
        Rc::new(Context {
            call_string: cx.call_string.clone(),
            method: cx.method.clone(),
            block,
        })
    }

    /// Enter `callee` at `entry_block`, pushing the caller's current site
    /// onto the call string.
    pub fn contextual(caller: &Rc<Context>, callee: &str, entry_block: BlockId) -> Rc<Self> {
        let mut call_string = caller.call_string.clone();
        call_string.push(CallSite::new(caller.method.clone(), caller.block));
        Rc::new(Context {
            call_string,
            method: callee.to_string(),
            block: entry_block,
        })
    }

    #[inline]
    pub fn method(&self) -> &str {
        &self.method
    }

    #[inline]
    pub fn block(&self) -> BlockId {
        self.block
    }

    #[inline]
    pub fn call_string(&self) -> &[CallSite] {
        &self.call_string
    }

    #[inline]
    pub fn depth(&self) -> usize {
        self.call_string.len()
    }

    /// The k-limited variant of this context: the call string truncated to
    /// its most recent `k` sites.
    pub fn suffix(cx: &Rc<Context>, k: usize) -> Rc<Context> {
        if cx.call_string.len() <= k {
            cx.clone()
        } else {
            Rc::new(Context {
                call_string: cx.call_string[cx.call_string.len() - k..].to_vec(),
                method: cx.method.clone(),
                block: cx.block,
            })
        }
    }
}

impl Debug for Context {
    fn fmt(&self, f: &mut Formatter<'_>) -> Result {
        Display::fmt(self, f)
    }
}

impl Display for Context {
    fn fmt(&self, f: &mut Formatter<'_>) -> Result {
        if self.call_string.is_empty() {
            write!(f, "{}@{}", self.method, self.block)
        } else {
            write!(
                f,
                "[{}] {}@{}",
                self.call_string.iter().map(|cs| cs.to_string()).join(" > "),
                self.method,
                self.block
            )
        }
    }
}

/// Interns contexts and hands out stable [`ContextId`]s for use as cheap
/// map keys within one analysis pass.
#[derive(Debug, Default)]
pub struct ContextCache {
    context_list: Vec<Rc<Context>>,
    context_to_index_map: HashMap<Rc<Context>, ContextId>,
}

impl ContextCache {
    pub fn new() -> ContextCache {
        ContextCache::default()
    }

    /// Returns the id for `context`, interning it on first sight.
    pub fn get_context_id(&mut self, context: &Rc<Context>) -> ContextId {
        if let Some(id) = self.context_to_index_map.get(context) {
            *id
        } else {
            let id = ContextId(self.context_list.len() as u32);
            self.context_list.push(context.clone());
            self.context_to_index_map.insert(context.clone(), id);
            id
        }
    }

    /// Returns the id for `context` without interning it.
    pub fn lookup(&self, context: &Rc<Context>) -> Option<ContextId> {
        self.context_to_index_map.get(context).copied()
    }

    /// Returns the context stored at this id, if any.
    pub fn get_context(&self, id: ContextId) -> Option<Rc<Context>> {
        self.context_list.get(id.index()).cloned()
    }

    pub fn context_list(&self) -> &[Rc<Context>] {
        &self.context_list
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn structural_equality() {
        let outer = Context::outer(BlockId(0));
        let a = Context::contextual(&outer, "f", BlockId(1));
        let b = Context::inside(&Context::contextual(&outer, "f", BlockId(9)), BlockId(1));
        assert_eq!(a, b);
        assert_eq!(a.method(), "f");
        assert_eq!(a.depth(), 1);
    }

    #[test]
    fn cache_ids_are_stable() {
        let mut cache = ContextCache::new();
        let outer = Context::outer(BlockId(0));
        let inner = Context::contextual(&outer, "f", BlockId(1));
        let id1 = cache.get_context_id(&outer);
        let id2 = cache.get_context_id(&inner);
        assert_ne!(id1, id2);
        assert_eq!(cache.get_context_id(&outer), id1);
        assert_eq!(cache.lookup(&inner), Some(id2));
        assert_eq!(cache.get_context(id2).unwrap(), inner);
    }

    #[test]
    fn suffix_limits_the_call_string() {
        let outer = Context::outer(BlockId(0));
        let f = Context::contextual(&outer, "f", BlockId(1));
        let g = Context::contextual(&f, "g", BlockId(2));
        let h = Context::contextual(&g, "h", BlockId(3));
        assert_eq!(h.depth(), 3);

        let s = Context::suffix(&h, 1);
        assert_eq!(s.depth(), 1);
        assert_eq!(s.method(), "h");
        assert_eq!(s.call_string()[0], CallSite::new("g", BlockId(2)));

        // Already short enough: returned unchanged.
        assert_eq!(Context::suffix(&f, 2), f);
    }
}
